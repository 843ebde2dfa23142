//! Domain extraction passes over an already-scanned VU segment map.
//!
//! Each pass walks the segments it cares about and decodes records
//! tolerantly: a record that fails to decode is skipped, never fatal.

use crate::bytes::{decode_latin1_trimmed, ByteReader};
use crate::dt::records::{
    ActivityDay, EventRecord, FaultRecord, OverspeedingEventRecord, VuCalibrationRecord,
    VuCardIWRecord, VuCompanyLock, VuControlActivity, VuDownloadActivityData, VuIdentification,
    VuOverSpeedingControlData, VuOverview, VuSensorPairedRecord,
};
use crate::dt::{ActivityChangeInfo, TimeReal, VehicleRegistrationNumber};
use crate::heuristics;
use crate::vu::activity;
use crate::vu::gen2::{self, RecordArrayHeader};
use crate::vu::walker::{segment_slice, SegmentRef};

/// TREPs that carry technical data (and somewhere inside it, the
/// identification block).
const TECHNICAL_TREPS: [u8; 3] = [0x05, 0x25, 0x35];

const EVENT_TREPS: [u8; 3] = [0x03, 0x23, 0x33];

/// Iterate the record arrays of one segment, stopping quietly at damage.
fn record_arrays(segment: &[u8]) -> impl Iterator<Item = (RecordArrayHeader, &[u8])> + '_ {
    let mut reader = ByteReader::new(segment);
    let _ = reader.skip(2); // SID + TREP
    std::iter::from_fn(move || {
        if reader.remaining() < RecordArrayHeader::SIZE {
            return None;
        }
        gen2::read_record_array(&mut reader).ok()
    })
}

fn record_chunks<'a>(
    header: &RecordArrayHeader,
    data: &'a [u8],
) -> impl Iterator<Item = &'a [u8]> + 'a {
    let size = header.record_size as usize;
    let count = header.record_count as usize;
    data.chunks_exact(size.max(1)).take(count)
}

/// Heuristic VuIdentification locator. The block's offset inside a
/// technical-data segment is not fixed (manufacturers pad the segment head
/// differently), so every prefix width up to 12 bytes is probed and the
/// first decode whose text fields pass the plausibility predicates wins.
pub fn find_identification(data: &[u8], segments: &[SegmentRef]) -> Option<VuIdentification> {
    for segment in segments
        .iter()
        .filter(|segment| TECHNICAL_TREPS.contains(&segment.trep))
    {
        for prefix in 0..=12usize {
            let mut reader = ByteReader::new(data);
            if reader.seek(segment.offset + 2 + prefix).is_err() {
                continue;
            }
            let Ok(ident) = VuIdentification::parse(&mut reader) else {
                continue;
            };
            if !heuristics::looks_like_identification(
                &ident.manufacturer_name.text,
                &ident.manufacturer_address.text,
                &ident.part_number,
                &ident.approval_number,
            ) {
                continue;
            }
            log::debug!(
                "Accepted VuIdentification in TREP {:#04x} segment at {} (+{} prefix)",
                segment.trep,
                segment.offset,
                prefix
            );
            return Some(VuIdentification {
                source_trep: segment.trep,
                source_offset: segment.offset,
                prefix_bytes: prefix,
                ..ident
            });
        }
    }
    None
}

/// Decode the first Gen2 v1 overview segment. Gen1 and Gen2 v2 overviews are
/// structurally validated but not decoded.
pub fn parse_overview(data: &[u8], segments: &[SegmentRef]) -> Option<VuOverview> {
    for (index, segment) in segments.iter().enumerate() {
        if segment.trep == 0x21 {
            return Some(parse_overview_gen2(segment_slice(data, segments, index)));
        }
    }
    None
}

fn parse_overview_gen2(segment: &[u8]) -> VuOverview {
    let mut overview = VuOverview::default();

    for (header, record_data) in record_arrays(segment) {
        let record_size = header.record_size as usize;
        // The VIN array is meaningful even with a zero count: its presence
        // says the field exists, possibly blank.
        if header.record_type == 0x0A {
            let end = record_size.min(record_data.len());
            overview.vin = Some(decode_latin1_trimmed(&record_data[..end]));
            continue;
        }
        if header.record_count == 0 {
            continue;
        }
        match header.record_type {
            0x0B => {
                let mut reader = ByteReader::new(&record_data[..record_size.min(record_data.len())]);
                if let Ok(registration) = VehicleRegistrationNumber::parse(&mut reader) {
                    overview.registration_number = Some(registration);
                }
            }
            0x03 => {
                let mut reader = ByteReader::new(record_data);
                if let Ok(raw) = reader.read_u32_be() {
                    overview.current_time = TimeReal::decode(raw);
                }
            }
            0x13 => {
                let mut reader = ByteReader::new(record_data);
                if let (Ok(begin), Ok(end)) = (reader.read_u32_be(), reader.read_u32_be()) {
                    overview.download_period_begin = TimeReal::decode(begin);
                    overview.download_period_end = TimeReal::decode(end);
                }
            }
            0x02 => {
                overview.card_slots_status = record_data.first().copied();
            }
            0x14 => {
                let mut reader = ByteReader::new(record_data);
                if let Ok(download) = VuDownloadActivityData::parse(&mut reader) {
                    overview.last_download = Some(download);
                }
            }
            0x10 => {
                let mut reader = ByteReader::new(record_data);
                for _ in 0..header.record_count {
                    match VuCompanyLock::parse(&mut reader) {
                        Ok(lock) => overview.company_locks.push(lock),
                        Err(_) => break,
                    }
                }
            }
            0x11 => {
                let mut reader = ByteReader::new(record_data);
                for _ in 0..header.record_count {
                    match VuControlActivity::parse(&mut reader) {
                        Ok(control) => overview.control_activities.push(control),
                        Err(_) => break,
                    }
                }
            }
            _ => {}
        }
    }

    overview
}

/// Decode every Gen2 activities segment (TREP 0x22) into a day of segments.
pub fn parse_activities(data: &[u8], segments: &[SegmentRef]) -> Vec<ActivityDay> {
    let mut days = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        if segment.trep != 0x22 {
            continue;
        }
        if let Some(day) = parse_activity_day(segment_slice(data, segments, index)) {
            days.push(day);
        }
    }
    days
}

fn parse_activity_day(segment: &[u8]) -> Option<ActivityDay> {
    let mut date_raw: Option<u32> = None;
    let mut odometer_midnight: Option<u32> = None;
    let mut changes: Vec<ActivityChangeInfo> = Vec::new();
    let mut card_iw_records: Vec<VuCardIWRecord> = Vec::new();

    for (header, record_data) in record_arrays(segment) {
        if header.record_count == 0 {
            continue;
        }
        match header.record_type {
            0x06 => {
                let mut reader = ByteReader::new(record_data);
                if let Ok(raw) = reader.read_u32_be() {
                    date_raw = Some(raw);
                }
            }
            0x05 => {
                if header.record_size >= 3 {
                    let mut reader = ByteReader::new(record_data);
                    if let Ok(odometer) = reader.read_u24_be() {
                        odometer_midnight = Some(odometer);
                    }
                }
            }
            0x01 => {
                changes = ActivityChangeInfo::decode_all(record_data);
            }
            0x0D => {
                for chunk in record_chunks(&header, record_data) {
                    if let Ok(record) = VuCardIWRecord::parse_chunk(chunk) {
                        card_iw_records.push(record);
                    }
                }
            }
            _ => {}
        }
    }

    let date_raw = date_raw?;
    if changes.is_empty() {
        return None;
    }
    let segments = activity::build_segments(date_raw, &changes);
    Some(ActivityDay {
        date_raw,
        date: TimeReal::decode(date_raw),
        odometer_midnight,
        changes,
        segments,
        card_iw_records,
    })
}

/// Events, faults and overspeeding extracted from the events-and-faults
/// segments of all generations that use record arrays.
pub fn parse_events_faults(
    data: &[u8],
    segments: &[SegmentRef],
) -> (
    Vec<EventRecord>,
    Vec<FaultRecord>,
    Option<VuOverSpeedingControlData>,
    Vec<OverspeedingEventRecord>,
) {
    let mut events = Vec::new();
    let mut faults = Vec::new();
    let mut overspeed_control: Option<VuOverSpeedingControlData> = None;
    let mut overspeed_events = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        if !EVENT_TREPS.contains(&segment.trep) {
            continue;
        }
        for (header, record_data) in record_arrays(segment_slice(data, segments, index)) {
            if header.record_count == 0 {
                continue;
            }
            match header.record_type {
                0x15 => {
                    for chunk in record_chunks(&header, record_data) {
                        if let Ok(record) = EventRecord::parse_chunk(chunk) {
                            events.push(record);
                        }
                    }
                }
                0x18 => {
                    for chunk in record_chunks(&header, record_data) {
                        if let Ok(record) = FaultRecord::parse_chunk(chunk) {
                            faults.push(record);
                        }
                    }
                }
                0x1A => {
                    for chunk in record_chunks(&header, record_data) {
                        if let Ok(record) = VuOverSpeedingControlData::parse_chunk(chunk) {
                            overspeed_control = Some(record);
                        }
                    }
                }
                0x1B => {
                    for chunk in record_chunks(&header, record_data) {
                        if let Ok(record) = OverspeedingEventRecord::parse_chunk(chunk) {
                            overspeed_events.push(record);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    (events, faults, overspeed_control, overspeed_events)
}

/// Technical-data extras beyond the identification block: the paired motion
/// sensor directly after it and the Gen1 calibration record array, located
/// with the same block-discovery scanner the card side uses.
pub fn parse_technical(
    data: &[u8],
    segments: &[SegmentRef],
    identification: Option<&VuIdentification>,
) -> (Option<VuSensorPairedRecord>, Vec<VuCalibrationRecord>) {
    let sensor_paired = identification
        .filter(|ident| ident.source_trep == 0x05)
        .and_then(|ident| parse_sensor_paired(data, segments, ident));

    let mut calibration_records = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        if segment.trep != 0x05 {
            continue;
        }
        let slice = segment_slice(data, segments, index);
        let payload = &slice[2.min(slice.len())..];
        let Some((start, count)) =
            heuristics::find_record_block(payload, VuCalibrationRecord::SIZE, |chunk| {
                plausible_calibration(chunk)
            })
        else {
            continue;
        };
        for idx in 0..count {
            let offset = start + idx * VuCalibrationRecord::SIZE;
            let chunk = &payload[offset..offset + VuCalibrationRecord::SIZE];
            if let Ok(record) = VuCalibrationRecord::parse_chunk(chunk) {
                calibration_records.push(record);
            }
        }
    }

    (sensor_paired, calibration_records)
}

fn plausible_calibration(chunk: &[u8]) -> bool {
    let Ok(record) = VuCalibrationRecord::parse_chunk(chunk) else {
        return false;
    };
    record.calibration_purpose <= 0x04 && heuristics::looks_like_text(&record.workshop_name.text, 4, 4)
}

fn parse_sensor_paired(
    data: &[u8],
    segments: &[SegmentRef],
    ident: &VuIdentification,
) -> Option<VuSensorPairedRecord> {
    let index = segments
        .iter()
        .position(|segment| segment.offset == ident.source_offset)?;
    let slice = segment_slice(data, segments, index);
    let ident_end = 2 + ident.prefix_bytes + VuIdentification::SIZE;
    if ident_end >= slice.len() {
        return None;
    }
    let window = &slice[ident_end..(ident_end + 28).min(slice.len())];
    if window.len() < 16 {
        return None;
    }
    let record = VuSensorPairedRecord::parse_chunk(window).ok()?;
    if !heuristics::looks_like_text(&record.sensor_approval_number, 2, 2) {
        return None;
    }
    Some(record)
}
