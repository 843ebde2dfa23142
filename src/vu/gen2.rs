//! Gen2 record arrays: `(recordType:u8, recordSize:u16, recordCount:u16)`
//! triples, and the per-TREP ordered sequences of record types a segment must
//! contain.

use crate::bytes::ByteReader;
use crate::error::Result;
use crate::header::Generation;

/// Record type of the signature array that closes every Gen2 segment.
pub const SIGNATURE_RECORD_TYPE: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordArrayHeader {
    pub record_type: u8,
    pub record_size: u16,
    pub record_count: u16,
}

impl RecordArrayHeader {
    pub const SIZE: usize = 5;

    pub fn total_len(&self) -> usize {
        self.record_size as usize * self.record_count as usize
    }
}

/// Read one `(type, size, count)` triple and its payload. Fails with
/// `Exhausted` when the declared payload exceeds the remaining bytes.
pub fn read_record_array<'a>(reader: &mut ByteReader<'a>) -> Result<(RecordArrayHeader, &'a [u8])> {
    let record_type = reader.read_u8()?;
    let record_size = reader.read_u16_be()?;
    let record_count = reader.read_u16_be()?;
    let header = RecordArrayHeader {
        record_type,
        record_size,
        record_count,
    };
    let data = reader.read_bytes(header.total_len())?;
    Ok((header, data))
}

// Ordered record-type sequences per Appendix 7. Validation consumes exactly
// one record array per position; a zero-count array still occupies its
// position. The signature array terminates the segment.
const OVERVIEW_SEQUENCE: &[&[u8]] = &[
    &[0x04],
    &[0x0F],
    &[0x0A],
    &[0x0B],
    &[0x03],
    &[0x13],
    &[0x02],
    &[0x14],
    &[0x10],
    &[0x11],
    &[SIGNATURE_RECORD_TYPE],
];
const ACTIVITIES_SEQUENCE: &[&[u8]] = &[
    &[0x06],
    &[0x05],
    &[0x0D],
    &[0x01],
    &[0x1C],
    &[0x16],
    &[0x09],
    &[SIGNATURE_RECORD_TYPE],
];
const EVENTS_SEQUENCE: &[&[u8]] = &[
    &[0x18],
    &[0x15],
    &[0x1A],
    &[0x1B],
    &[0x1E],
    &[SIGNATURE_RECORD_TYPE],
];
const SPEED_SEQUENCE: &[&[u8]] = &[&[0x17], &[SIGNATURE_RECORD_TYPE]];
const TECH_SEQUENCE: &[&[u8]] = &[
    &[0x19],
    &[0x20],
    &[0x21],
    &[0x0C],
    &[0x0E],
    &[0x17],
    &[0x1F],
    &[SIGNATURE_RECORD_TYPE],
];

/// The allowed sequence for a TREP. Gen2 v2 overviews may carry `0x12`
/// instead of the `0x0B` registration record in the fourth position.
pub fn allowed_sequence(trep: u8, generation: Generation) -> Option<Vec<&'static [u8]>> {
    let base: &[&[u8]] = match trep {
        0x21 | 0x31 => OVERVIEW_SEQUENCE,
        0x22 | 0x32 => ACTIVITIES_SEQUENCE,
        0x23 | 0x33 => EVENTS_SEQUENCE,
        0x24 => SPEED_SEQUENCE,
        0x25 | 0x35 => TECH_SEQUENCE,
        _ => return None,
    };
    let mut sequence: Vec<&'static [u8]> = base.to_vec();
    if generation == Generation::Gen2V2 && trep == 0x31 {
        sequence[3] = &[0x0B, 0x12];
    }
    Some(sequence)
}

/// Structural validation of one Gen2 segment body (cursor past SID/TREP).
///
/// One record array is consumed per sequence position and must carry that
/// position's type; anything else marks the part invalid. Gen2 v2
/// activities/technical segments consume the fixed prologue the same way,
/// then accept arbitrary extension records until the signature array.
pub fn validate_part(
    reader: &mut ByteReader,
    trep: u8,
    generation: Generation,
) -> std::result::Result<Option<String>, String> {
    let Some(sequence) = allowed_sequence(trep, generation) else {
        return Err(format!("Unsupported Gen2 TREP 0x{:02X}", trep));
    };
    let allow_extras = generation == Generation::Gen2V2 && matches!(trep, 0x32 | 0x35);

    if allow_extras {
        for allowed in &sequence[..sequence.len() - 1] {
            let (header, _data) =
                read_record_array(reader).map_err(|_| "Truncated record".to_string())?;
            if !allowed.contains(&header.record_type) {
                return Err(format!("Unexpected record 0x{:02X}", header.record_type));
            }
        }
        let mut signature_seen = false;
        while reader.remaining() >= RecordArrayHeader::SIZE {
            let (header, _data) =
                read_record_array(reader).map_err(|_| "Truncated record".to_string())?;
            if header.record_type == SIGNATURE_RECORD_TYPE {
                signature_seen = true;
                break;
            }
        }
        if !signature_seen {
            return Err("Missing signature record".to_string());
        }
        return Ok(Some("Structure OK (signature not verified)".to_string()));
    }

    for allowed in &sequence {
        let (header, _data) =
            read_record_array(reader).map_err(|_| "Truncated record".to_string())?;
        if !allowed.contains(&header.record_type) {
            return Err(format!("Unexpected record 0x{:02X}", header.record_type));
        }
    }
    Ok(Some("Structure OK (signature not verified)".to_string()))
}
