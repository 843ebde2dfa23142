//! Gen1 structural validators: each TREP has a fixed field layout whose
//! section sizes derive from embedded counters. Sections are skipped, not
//! decoded; the 128-byte trailing RSA signature is required but not
//! cryptographically checked here.

use crate::bytes::ByteReader;

type Verdict = std::result::Result<Option<String>, String>;

const SIGNATURE_LEN: usize = 128;

fn skip_section(reader: &mut ByteReader, len: usize, reason: &str) -> Result<(), String> {
    reader.skip(len).map_err(|_| reason.to_string())
}

fn read_count_u8(reader: &mut ByteReader, reason: &str) -> Result<usize, String> {
    reader
        .read_u8()
        .map(usize::from)
        .map_err(|_| reason.to_string())
}

fn read_count_u16(reader: &mut ByteReader, reason: &str) -> Result<usize, String> {
    reader
        .read_u16_be()
        .map(usize::from)
        .map_err(|_| reason.to_string())
}

fn structure_ok() -> Verdict {
    Ok(Some("Structure OK (signature not verified)".to_string()))
}

/// Validate one Gen1 segment body (cursor past SID/TREP).
pub fn validate_part(reader: &mut ByteReader, trep: u8) -> Verdict {
    match trep {
        0x01 => validate_overview(reader),
        0x02 => validate_activities(reader),
        0x03 => validate_events_faults(reader),
        0x04 => validate_detailed_speed(reader),
        0x05 => validate_technical_data(reader),
        _ => Err(format!("Unsupported Gen1 TREP 0x{:02X}", trep)),
    }
}

fn validate_overview(reader: &mut ByteReader) -> Verdict {
    skip_section(reader, 194, "Overview certificates truncated")?;
    skip_section(reader, 194, "Overview certificates truncated")?;
    skip_section(reader, 103, "Overview header truncated")?;
    let locks = read_count_u8(reader, "Overview locks count missing")?;
    skip_section(reader, locks * 98, "Overview locks truncated")?;
    let controls = read_count_u8(reader, "Overview controls count missing")?;
    skip_section(reader, controls * 31, "Overview controls truncated")?;
    skip_section(reader, SIGNATURE_LEN, "Overview signature truncated")?;
    structure_ok()
}

fn validate_activities(reader: &mut ByteReader) -> Verdict {
    skip_section(reader, 7, "Activities header truncated")?;
    let card_iw = read_count_u16(reader, "Activities card IW count missing")?;
    skip_section(reader, card_iw * 129, "Activities card IW records truncated")?;
    let changes = read_count_u16(reader, "Activities change count missing")?;
    skip_section(reader, changes * 2, "Activities change records truncated")?;
    let places = read_count_u8(reader, "Activities place count missing")?;
    skip_section(reader, places * 28, "Activities place records truncated")?;
    let conditions = read_count_u16(reader, "Activities condition count missing")?;
    skip_section(reader, conditions * 5, "Activities condition records truncated")?;
    skip_section(reader, SIGNATURE_LEN, "Activities signature truncated")?;
    structure_ok()
}

fn validate_events_faults(reader: &mut ByteReader) -> Verdict {
    let faults = read_count_u8(reader, "Events faults count missing")?;
    skip_section(reader, faults * 82, "Fault records truncated")?;
    let events = read_count_u8(reader, "Events count missing")?;
    skip_section(reader, events * 83, "Event records truncated")?;
    skip_section(reader, 9, "Overspeed control truncated")?;
    let overspeed = read_count_u8(reader, "Overspeed events count missing")?;
    skip_section(reader, overspeed * 31, "Overspeed events truncated")?;
    let time_adjustments = read_count_u8(reader, "Time adjustment count missing")?;
    skip_section(
        reader,
        time_adjustments * 98,
        "Time adjustment records truncated",
    )?;
    skip_section(reader, SIGNATURE_LEN, "Events signature truncated")?;
    structure_ok()
}

fn validate_detailed_speed(reader: &mut ByteReader) -> Verdict {
    let blocks = read_count_u16(reader, "Speed block count missing")?;
    skip_section(reader, blocks * 64, "Speed blocks truncated")?;
    skip_section(reader, SIGNATURE_LEN, "Speed signature truncated")?;
    structure_ok()
}

fn validate_technical_data(reader: &mut ByteReader) -> Verdict {
    skip_section(reader, 88, "Technical data header truncated")?;
    skip_section(reader, 8, "Technical data block truncated")?;
    skip_section(reader, 12, "Technical data reserved truncated")?;
    skip_section(reader, 24, "Technical data block truncated")?;
    skip_section(reader, 4, "Technical data reserved truncated")?;
    let calibrations = read_count_u8(reader, "Calibration count missing")?;
    skip_section(reader, calibrations * 167, "Calibration records truncated")?;
    skip_section(reader, SIGNATURE_LEN, "Technical data signature truncated")?;
    structure_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_layout_with_counts() {
        let mut body = vec![0u8; 194 + 194 + 103];
        body.push(2); // locks
        body.extend(std::iter::repeat(0u8).take(2 * 98));
        body.push(1); // controls
        body.extend(std::iter::repeat(0u8).take(31));
        body.extend(std::iter::repeat(0u8).take(128));
        let mut reader = ByteReader::new(&body);
        assert!(validate_part(&mut reader, 0x01).is_ok());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn overview_truncated_locks() {
        let mut body = vec![0u8; 194 + 194 + 103];
        body.push(3);
        body.extend(std::iter::repeat(0u8).take(97)); // less than one lock
        let mut reader = ByteReader::new(&body);
        let err = validate_part(&mut reader, 0x01).unwrap_err();
        assert_eq!(err, "Overview locks truncated");
    }

    #[test]
    fn activities_missing_change_count() {
        let mut body = vec![0u8; 7];
        body.extend_from_slice(&0u16.to_be_bytes()); // no card IW records
        // change count cut off after one byte
        body.push(0x00);
        let mut reader = ByteReader::new(&body);
        let err = validate_part(&mut reader, 0x02).unwrap_err();
        assert_eq!(err, "Activities change count missing");
    }

    #[test]
    fn events_faults_full_layout() {
        let mut body = Vec::new();
        body.push(1); // faults
        body.extend(std::iter::repeat(0u8).take(82));
        body.push(2); // events
        body.extend(std::iter::repeat(0u8).take(2 * 83));
        body.extend(std::iter::repeat(0u8).take(9)); // overspeed control
        body.push(0); // overspeed events
        body.push(1); // time adjustments
        body.extend(std::iter::repeat(0u8).take(98));
        body.extend(std::iter::repeat(0u8).take(128));
        let mut reader = ByteReader::new(&body);
        assert!(validate_part(&mut reader, 0x03).is_ok());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn detailed_speed_missing_signature() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend(std::iter::repeat(0u8).take(64));
        body.extend(std::iter::repeat(0u8).take(127)); // one byte short
        let mut reader = ByteReader::new(&body);
        let err = validate_part(&mut reader, 0x04).unwrap_err();
        assert_eq!(err, "Speed signature truncated");
    }

    #[test]
    fn technical_data_layout() {
        let mut body = vec![0u8; 88 + 8 + 12 + 24 + 4];
        body.push(2);
        body.extend(std::iter::repeat(0u8).take(2 * 167));
        body.extend(std::iter::repeat(0u8).take(128));
        let mut reader = ByteReader::new(&body);
        assert!(validate_part(&mut reader, 0x05).is_ok());
        assert_eq!(reader.remaining(), 0);
    }
}
