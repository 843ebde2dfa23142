//! The immutable result tree of a parse and the orchestrator that builds it.

use crate::card::{self, DriverCardSummary};
use crate::dt::records::{
    ActivityDay, EventRecord, FaultRecord, OverspeedingEventRecord, VuCalibrationRecord,
    VuIdentification, VuOverSpeedingControlData, VuOverview, VuSensorPairedRecord,
};
use crate::header::{self, FileType, Header};
use crate::vu::{vu_parser, walker};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    Valid,
    Invalid,
    Missing,
    NotApplicable,
}

/// Status of one logical section of the download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub name: String,
    pub status: PartStatus,
    pub note: Option<String>,
}

/// Everything decoded from one download file. Owns all its records; nothing
/// references the input buffer after parsing returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub header: Header,
    pub parts: Vec<Part>,
    pub vu_identification: Option<VuIdentification>,
    pub overview: Option<VuOverview>,
    pub activity_days: Vec<ActivityDay>,
    pub events: Vec<EventRecord>,
    pub faults: Vec<FaultRecord>,
    pub overspeed_control: Option<VuOverSpeedingControlData>,
    pub overspeed_events: Vec<OverspeedingEventRecord>,
    pub sensor_paired: Option<VuSensorPairedRecord>,
    pub calibration_records: Vec<VuCalibrationRecord>,
    pub driver_card: Option<DriverCardSummary>,
}

impl Summary {
    fn from_header(header: Header, parts: Vec<Part>) -> Self {
        Summary {
            header,
            parts,
            vu_identification: None,
            overview: None,
            activity_days: Vec::new(),
            events: Vec::new(),
            faults: Vec::new(),
            overspeed_control: None,
            overspeed_events: Vec::new(),
            sensor_paired: None,
            calibration_records: Vec::new(),
            driver_card: None,
        }
    }
}

fn not_applicable_parts(note: &str) -> Vec<Part> {
    walker::VU_PART_NAMES
        .iter()
        .map(|name| Part {
            name: (*name).to_string(),
            status: PartStatus::NotApplicable,
            note: Some(note.to_string()),
        })
        .collect()
}

/// Parse a whole download file into its summary. Total: any input, including
/// an empty or damaged one, yields a summary; decode failures surface as
/// part statuses and absent fields, never as an error.
pub fn parse_summary(bytes: &[u8]) -> Summary {
    let header = header::parse_header(bytes, bytes.len());

    if bytes.is_empty() {
        return Summary::from_header(header, not_applicable_parts("Empty file"));
    }

    match header.detected_type {
        FileType::DriverCard => {
            let parts = card::card_parser::validate_parts(bytes);
            let driver_card = card::card_parser::parse_summary(bytes);
            let mut summary = Summary::from_header(header, parts);
            summary.driver_card = Some(driver_card);
            summary
        }
        FileType::VehicleUnit => {
            let parts = walker::validate_parts(bytes);
            let segments = walker::scan_segments(bytes);
            let vu_identification = vu_parser::find_identification(bytes, &segments);
            let overview = vu_parser::parse_overview(bytes, &segments);
            let activity_days = vu_parser::parse_activities(bytes, &segments);
            let (events, faults, overspeed_control, overspeed_events) =
                vu_parser::parse_events_faults(bytes, &segments);
            let (sensor_paired, calibration_records) =
                vu_parser::parse_technical(bytes, &segments, vu_identification.as_ref());

            let mut summary = Summary::from_header(header, parts);
            summary.vu_identification = vu_identification;
            summary.overview = overview;
            summary.activity_days = activity_days;
            summary.events = events;
            summary.faults = faults;
            summary.overspeed_control = overspeed_control;
            summary.overspeed_events = overspeed_events;
            summary.sensor_paired = sensor_paired;
            summary.calibration_records = calibration_records;
            summary
        }
        FileType::Unknown => Summary::from_header(header, not_applicable_parts("Unknown file type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn part<'a>(parts: &'a [Part], name: &str) -> &'a Part {
        parts.iter().find(|p| p.name == name).unwrap()
    }

    #[test]
    fn empty_input_yields_invalid_header_and_na_parts() {
        let summary = parse_summary(&[]);
        assert!(!summary.header.is_valid);
        assert_eq!(
            summary.header.invalid_reason.as_deref(),
            Some("Header (empty)")
        );
        assert!(summary.driver_card.is_none());
        assert!(summary
            .parts
            .iter()
            .all(|part| part.status == PartStatus::NotApplicable));
        assert_eq!(
            summary.parts[0].note.as_deref(),
            Some("Empty file")
        );
    }

    #[test]
    fn unknown_trep_yields_missing_parts() {
        let summary = parse_summary(&[0x76, 0xAB]);
        assert!(!summary.header.is_valid);
        assert_eq!(
            summary.header.invalid_reason.as_deref(),
            Some("Header (unknown TREP#2 0xAB)")
        );
        assert!(summary
            .parts
            .iter()
            .all(|part| part.status == PartStatus::Missing));
    }

    #[test]
    fn unknown_signature_yields_not_applicable_parts() {
        let summary = parse_summary(&[0x00, 0x11, 0x22, 0x33]);
        assert!(!summary.header.is_valid);
        assert!(summary
            .parts
            .iter()
            .all(|part| part.status == PartStatus::NotApplicable));
        assert_eq!(summary.parts[0].note.as_deref(), Some("Unknown file type"));
    }

    fn gen2_record(record_type: u8, payload: &[u8], record_size: u16) -> Vec<u8> {
        let count = if record_size == 0 {
            0
        } else {
            (payload.len() / record_size as usize) as u16
        };
        let mut out = vec![record_type];
        out.extend_from_slice(&record_size.to_be_bytes());
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn vu_fixture() -> Vec<u8> {
        let mut data = Vec::new();
        // Overview segment carrying a VIN; every other array is present but
        // empty, in sequence order.
        data.extend_from_slice(&[0x76, 0x21]);
        data.extend(gen2_record(0x04, &[], 194));
        data.extend(gen2_record(0x0F, &[], 194));
        let mut vin = b"WDB9634031L999999".to_vec();
        vin.resize(17, 0);
        data.extend(gen2_record(0x0A, &vin, 17));
        data.extend(gen2_record(0x0B, &[], 15));
        data.extend(gen2_record(0x03, &[], 4));
        data.extend(gen2_record(0x13, &[], 8));
        data.extend(gen2_record(0x02, &[], 1));
        data.extend(gen2_record(0x14, &[], 59));
        data.extend(gen2_record(0x10, &[], 99));
        data.extend(gen2_record(0x11, &[], 31));
        data.extend(gen2_record(0x08, &[0u8; 64], 64));
        // Activities segment: one day, driving from minute 0 on slot 0.
        data.extend_from_slice(&[0x76, 0x22]);
        data.extend(gen2_record(0x06, &1_600_000_000u32.to_be_bytes(), 4));
        data.extend(gen2_record(0x05, &[], 3));
        data.extend(gen2_record(0x0D, &[], 129));
        data.extend(gen2_record(0x01, &[0x18, 0x00], 2));
        data.extend(gen2_record(0x1C, &[], 8));
        data.extend(gen2_record(0x16, &[], 10));
        data.extend(gen2_record(0x09, &[], 5));
        data.extend(gen2_record(0x08, &[0u8; 64], 64));
        data
    }

    #[test]
    fn vu_fixture_summary() {
        let data = vu_fixture();
        let summary = parse_summary(&data);
        assert!(summary.header.is_valid);
        assert_eq!(summary.header.detected_type, FileType::VehicleUnit);
        assert_eq!(part(&summary.parts, "Overview").status, PartStatus::Valid);
        assert_eq!(part(&summary.parts, "Activities").status, PartStatus::Valid);
        assert_eq!(part(&summary.parts, "Events and faults").status, PartStatus::Missing);

        let overview = summary.overview.as_ref().unwrap();
        assert_eq!(overview.vin.as_deref(), Some("WDB9634031L999999"));

        assert_eq!(summary.activity_days.len(), 1);
        let day = &summary.activity_days[0];
        assert_eq!(day.date_raw, 1_600_000_000);
        assert_eq!(day.segments.len(), 1);
        assert_eq!(day.segments[0].activity, 3);
        assert_eq!(day.segments[0].start_minute, 0);
        assert_eq!(day.segments[0].end_minute, 1440);
    }

    fn ef(file_id: u16, appendix: u8, data: &[u8]) -> Vec<u8> {
        let mut out = file_id.to_be_bytes().to_vec();
        out.push(appendix);
        out.extend_from_slice(&(data.len() as u16).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    fn card_fixture() -> Vec<u8> {
        // The ICC EF opens the image and doubles as the pinned driver-card
        // prefix (00 02 00 00 19 00).
        let mut image = ef(0x0002, 0, &[0u8; 25]);
        let app = [0x01u8, 0x00, 0x00, 0x0C, 0x06, 0x15, 0xAC, 0x00, 0xC8, 0x70];
        image.extend(ef(0x0501, 0, &app));
        image.extend(ef(0x0501, 1, &[0u8; 128]));
        image
    }

    #[test]
    fn card_fixture_summary() {
        let image = card_fixture();
        let summary = parse_summary(&image);
        assert!(summary.header.is_valid);
        assert_eq!(summary.header.detected_type, FileType::DriverCard);
        assert_eq!(
            part(&summary.parts, "Application identification").status,
            PartStatus::Valid
        );
        assert_eq!(part(&summary.parts, "Events").status, PartStatus::Missing);

        let card = summary.driver_card.as_ref().unwrap();
        let app = card.application_identification.as_ref().unwrap();
        assert_eq!(app.events_per_type, 12);
        assert_eq!(app.card_generation, Some(1));
        assert_eq!(app.place_records, 112); // single-byte count in a 10-byte EF
        assert!(summary.vu_identification.is_none());
    }

    #[test]
    fn summary_serializes_to_json() {
        let summary = parse_summary(&vu_fixture());
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"detectedType\":\"vehicle_unit\""));
        assert!(json.contains("\"activityDays\""));
    }

    proptest! {
        #[test]
        fn parse_summary_is_total_and_pure(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let first = parse_summary(&bytes);
            prop_assert_eq!(first.header.file_size, bytes.len());
            let second = parse_summary(&bytes);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn vu_prefixed_inputs_never_panic(mut bytes in proptest::collection::vec(any::<u8>(), 0..1024)) {
            bytes.insert(0, 0x76);
            bytes.insert(1, 0x21);
            let summary = parse_summary(&bytes);
            prop_assert_eq!(summary.header.detected_type, FileType::VehicleUnit);
        }

        #[test]
        fn activity_segments_cover_each_slot(words in proptest::collection::vec(any::<u16>(), 1..64)) {
            use crate::dt::ActivityChangeInfo;
            use crate::vu::activity::build_segments;
            let changes: Vec<ActivityChangeInfo> =
                words.iter().map(|word| ActivityChangeInfo::decode(*word)).collect();
            let segments = build_segments(1_600_000_000, &changes);
            for slot in [0u8, 1] {
                let slot_segments: Vec<_> =
                    segments.iter().filter(|segment| segment.slot == slot).collect();
                if slot_segments.is_empty() {
                    continue;
                }
                // Strictly increasing, abutting, and closed at midnight.
                for pair in slot_segments.windows(2) {
                    prop_assert!(pair[0].end_minute == pair[1].start_minute);
                    prop_assert!(pair[0].start_minute < pair[0].end_minute);
                }
                prop_assert_eq!(slot_segments.last().unwrap().end_minute, 1440);
            }
        }
    }
}
