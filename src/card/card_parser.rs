//! Driver-card image parsing: the EF entry walk, per-part scheme validation,
//! and the record-discovery passes that build a [`DriverCardSummary`].

use crate::bytes::{decode_latin1_trimmed, ByteReader};
use crate::card::{
    AppendixScheme, CardApplicationIdentification, CardEventRecord, CardFileEntry,
    CardIdentification, CardPartDef, CardPlaceRecord, CardSpecificCondition, CardVehicleRecord,
    CardVehicleUnitRecord, DriverCardSummary, DrivingLicenceInformation, CARD_PART_DEFS,
};
use crate::certs;
use crate::dt::{bcd_date_to_iso, decode_bcd_date, FullCardNumber, Name, TimeReal,
    VehicleRegistrationNumber};
use crate::error::CertificateError;
use crate::heuristics;
use crate::summary::{Part, PartStatus};
use std::collections::{BTreeSet, HashMap};

const EVENT_RECORD_LEN: usize = 24;
const CONDITION_RECORD_LEN: usize = 5;

/// Legacy segment IDs used by the tag-window passes: the identification
/// region and the miscellaneous tail of the image.
const SEGMENT_IDENTIFICATION: u16 = 0x120D;
const SEGMENT_MISC: u16 = 0x4420;

/// Walk the flat `{fileID, appendix, length, data}` concatenation.
/// Returns the entries plus whether trailing bytes or a truncated entry were
/// seen (a truncated entry ends the walk).
pub fn parse_ef_entries(data: &[u8]) -> (Vec<CardFileEntry<'_>>, bool, bool) {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    let mut truncated = false;
    while offset + 5 <= data.len() {
        let file_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let appendix = data[offset + 2];
        let length = u16::from_be_bytes([data[offset + 3], data[offset + 4]]) as usize;
        let end = offset + 5 + length;
        if end > data.len() {
            truncated = true;
            break;
        }
        entries.push(CardFileEntry {
            file_id,
            appendix,
            length,
            offset,
            data: &data[offset + 5..end],
        });
        offset = end;
    }
    let trailing = offset != data.len();
    (entries, trailing, truncated)
}

fn entries_by_id<'a, 'b>(
    entries: &'b [CardFileEntry<'a>],
) -> HashMap<u16, Vec<&'b CardFileEntry<'a>>> {
    let mut map: HashMap<u16, Vec<&CardFileEntry>> = HashMap::new();
    for entry in entries {
        map.entry(entry.file_id).or_default().push(entry);
    }
    map
}

fn file_entry<'a, 'b>(
    map: &'b HashMap<u16, Vec<&'b CardFileEntry<'a>>>,
    file_id: u16,
    appendices: &[u8],
) -> Option<&'b CardFileEntry<'a>> {
    for appendix in appendices {
        for entry in map.get(&file_id).into_iter().flatten().copied() {
            if entry.appendix == *appendix {
                return Some(entry);
            }
        }
    }
    None
}

fn file_data<'a>(
    map: &HashMap<u16, Vec<&CardFileEntry<'a>>>,
    file_id: u16,
    appendices: &[u8],
) -> Option<&'a [u8]> {
    file_entry(map, file_id, appendices).map(|entry| entry.data)
}

fn validate_entries(
    entries: &[&CardFileEntry],
    def: &CardPartDef,
) -> (PartStatus, Option<String>) {
    if entries.is_empty() {
        return (PartStatus::Missing, None);
    }

    struct SchemeResult {
        scheme: AppendixScheme,
        valid: bool,
        notes: Vec<String>,
    }

    let mut results: Vec<SchemeResult> = Vec::new();
    for scheme in def.schemes {
        let data_entries: Vec<_> = entries
            .iter()
            .filter(|entry| entry.appendix == scheme.data_appendix)
            .collect();
        let sig_entries: Vec<_> = entries
            .iter()
            .filter(|entry| entry.appendix == scheme.sig_appendix)
            .collect();
        if data_entries.is_empty() && sig_entries.is_empty() {
            continue;
        }
        let mut notes = Vec::new();
        let mut valid = true;
        if data_entries.len() > 1 {
            notes.push("Duplicate data entries".to_string());
        }
        if sig_entries.len() > 1 {
            notes.push("Duplicate signature entries".to_string());
        }
        match data_entries.first() {
            None => {
                valid = false;
                notes.push("Missing data appendix".to_string());
            }
            Some(entry) => {
                if !def.length_rule.accepts(entry.length) {
                    valid = false;
                    notes.push("Unexpected length".to_string());
                }
            }
        }
        if def.requires_signature {
            match sig_entries.first() {
                None => {
                    valid = false;
                    notes.push("Missing signature appendix".to_string());
                }
                Some(entry) if entry.length != scheme.sig_len => {
                    valid = false;
                    notes.push("Invalid signature length".to_string());
                }
                Some(_) => {}
            }
        }
        results.push(SchemeResult {
            scheme: *scheme,
            valid,
            notes,
        });
    }

    if results.is_empty() {
        return (PartStatus::Missing, None);
    }

    let status = if results.iter().any(|result| result.valid) {
        PartStatus::Valid
    } else {
        PartStatus::Invalid
    };
    let combined: Vec<String> = results
        .iter()
        .filter(|result| !result.notes.is_empty())
        .map(|result| format!("{}: {}", result.scheme.label, result.notes.join(", ")))
        .collect();
    let note = if combined.is_empty() {
        None
    } else {
        Some(combined.join("; "))
    };
    (status, note)
}

/// Per-part status of a card image, including the certificate chain check.
pub fn validate_parts(data: &[u8]) -> Vec<Part> {
    let (entries, trailing, truncated) = parse_ef_entries(data);
    let map = entries_by_id(&entries);

    let known_ids: BTreeSet<u16> = CARD_PART_DEFS.iter().filter_map(|def| def.file_id).collect();
    let unknown_ids: BTreeSet<u16> = entries
        .iter()
        .filter(|entry| matches!(entry.appendix, 0 | 1) && !known_ids.contains(&entry.file_id))
        .map(|entry| entry.file_id)
        .collect();

    let mut structure_notes = Vec::new();
    if truncated {
        structure_notes.push("Truncated file entry".to_string());
    }
    if trailing {
        structure_notes.push("Trailing bytes after last file entry".to_string());
    }
    if !unknown_ids.is_empty() {
        let listed: Vec<String> = unknown_ids.iter().map(|id| format!("0x{:04X}", id)).collect();
        structure_notes.push(format!("Unknown EF file IDs: {}", listed.join(", ")));
    }
    let structure_note = if structure_notes.is_empty() {
        None
    } else {
        Some(structure_notes.join("; "))
    };

    let chain_error: Option<CertificateError> = match (
        file_data(&map, 0xC108, &[0]),
        file_data(&map, 0xC100, &[0]),
    ) {
        (Some(ca), Some(card)) => certs::verify_chain(ca, card).err(),
        _ => None,
    };

    CARD_PART_DEFS
        .iter()
        .map(|def| {
            let Some(file_id) = def.file_id else {
                let status = if truncated || trailing {
                    PartStatus::Invalid
                } else {
                    PartStatus::Valid
                };
                return Part {
                    name: def.name.to_string(),
                    status,
                    note: structure_note.clone(),
                };
            };

            let part_entries: Vec<&CardFileEntry> =
                map.get(&file_id).map(|list| list.to_vec()).unwrap_or_default();
            let (mut status, note) = validate_entries(&part_entries, def);
            let mut notes: Vec<String> = note.into_iter().collect();

            if matches!(file_id, 0xC108 | 0xC100) {
                if let Some(error) = chain_error {
                    status = PartStatus::Invalid;
                    let message = error.to_string();
                    if !notes.contains(&message) {
                        notes.push(message);
                    }
                }
            }
            if matches!(file_id, 0xC101 | 0xC109) && status == PartStatus::Valid {
                notes.push("ECC certificate not verified".to_string());
            }

            Part {
                name: def.name.to_string(),
                status,
                note: if notes.is_empty() {
                    None
                } else {
                    Some(notes.join("; "))
                },
            }
        })
        .collect()
}

/// First-wins map of the legacy `{id:u16, length:u16}` framed segments that
/// follow the 6-byte image prologue. The identification and miscellaneous
/// regions surface here under fixed ids.
fn parse_legacy_segments(data: &[u8]) -> HashMap<u16, &[u8]> {
    let mut segments: HashMap<u16, &[u8]> = HashMap::new();
    if data.len() < 10 {
        return segments;
    }
    let mut offset = 6usize;
    while offset + 4 <= data.len() {
        let id = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let length = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        if length == 0 {
            break;
        }
        let end = offset + 4 + length;
        if end > data.len() {
            break;
        }
        segments.entry(id).or_insert(&data[offset + 4..end]);
        offset = end;
    }
    segments
}

/// Scan for a `tag ‖ len24` framed record of a plausible length. Matches the
/// EF header shape when the appendix byte is zero, and skips collisions with
/// payload bytes via the length gate.
fn find_tag_record(
    data: &[u8],
    record_id: u16,
    min_length: usize,
    max_length: Option<usize>,
) -> Option<(usize, usize)> {
    let needle = record_id.to_be_bytes();
    let mut start = 0usize;
    while start + 2 <= data.len() {
        let Some(found) = data[start..]
            .windows(2)
            .position(|window| window == needle)
        else {
            return None;
        };
        let idx = start + found;
        if idx + 5 <= data.len() {
            let length = u32::from_be_bytes([0, data[idx + 2], data[idx + 3], data[idx + 4]]) as usize;
            if length >= min_length && max_length.map_or(true, |max| length <= max) {
                let end = idx + 5 + length;
                if end <= data.len() {
                    return Some((idx + 5, length));
                }
            }
        }
        start = idx + 1;
    }
    None
}

pub(crate) fn parse_application_identification(
    data: &[u8],
    entry: Option<&CardFileEntry>,
) -> Option<CardApplicationIdentification> {
    let (payload, length, appendix) = match entry {
        Some(entry) => (entry.data, entry.length, Some(entry.appendix)),
        None => {
            let (start, length) = find_tag_record(data, 0x0501, 10, Some(17))?;
            (&data[start..start + length], length, None)
        }
    };
    if payload.len() < 10 {
        return None;
    }
    let card_type = payload[0];
    if !(1..=6).contains(&card_type) {
        return None;
    }
    let card_structure_version = u16::from_be_bytes([payload[1], payload[2]]);
    let events_per_type = payload[3];
    let faults_per_type = payload[4];
    let activity_structure_length = u16::from_be_bytes([payload[5], payload[6]]);
    let vehicle_records = u16::from_be_bytes([payload[7], payload[8]]);
    let place_records = if length >= 11 && payload.len() >= 11 {
        u16::from_be_bytes([payload[9], payload[10]])
    } else {
        u16::from(payload[9])
    };
    let card_generation = match appendix {
        Some(2) => Some(2),
        Some(0) => Some(1),
        _ => None,
    };
    Some(CardApplicationIdentification {
        card_type,
        card_structure_version,
        events_per_type,
        faults_per_type,
        activity_structure_length,
        vehicle_records,
        place_records,
        card_generation,
    })
}

pub(crate) fn parse_driving_licence(data: &[u8]) -> Option<DrivingLicenceInformation> {
    let (start, _length) = find_tag_record(data, 0x0521, 53, Some(80))?;
    let mut reader = ByteReader::new(data);
    reader.seek(start).ok()?;
    let issuing_authority = Name::parse(&mut reader).ok()?;
    let issuing_nation = reader.read_u8().ok()?;
    let licence_number = reader.read_fixed_str(16).ok()?;
    if issuing_authority.text.is_empty() || licence_number.is_empty() {
        return None;
    }
    Some(DrivingLicenceInformation {
        issuing_nation,
        issuing_authority,
        licence_number,
    })
}

pub(crate) fn parse_card_identification(
    data: &[u8],
    card_app: Option<&CardApplicationIdentification>,
) -> Option<CardIdentification> {
    let (start, length) = find_tag_record(data, 0x0520, 140, Some(200))?;
    let required_len = 1 + 16 + 36 + 12 + 36 + 36 + 4;
    if length < required_len {
        return None;
    }
    let mut reader = ByteReader::new(data);
    reader.seek(start).ok()?;
    let issuing_nation = reader.read_u8().ok()?;
    let card_number = reader.read_fixed_str(16).ok()?;
    let issuing_authority = Name::parse(&mut reader).ok()?;
    let issue_raw = reader.read_u32_be().ok()?;
    let validity_raw = reader.read_u32_be().ok()?;
    let expiry_raw = reader.read_u32_be().ok()?;
    // Three plausible, monotone timestamps separate a real identification
    // block from payload that happens to carry the tag bytes.
    if !heuristics::looks_like_time_real(issue_raw)
        || !heuristics::looks_like_time_real(validity_raw)
        || !heuristics::looks_like_time_real(expiry_raw)
    {
        return None;
    }
    if !(issue_raw <= validity_raw && validity_raw <= expiry_raw) {
        return None;
    }
    let holder_surname = Name::parse(&mut reader).ok()?;
    let holder_first_names = Name::parse(&mut reader).ok()?;
    let birth_raw = reader.read_bytes(4).ok()?;
    let birth_date_bcd = decode_bcd_date(birth_raw);
    let birth_date_iso = bcd_date_to_iso(&birth_date_bcd)?;
    if !heuristics::looks_like_card_number(&card_number) {
        return None;
    }

    let card_type = card_app.map_or(1, |app| app.card_type);
    let card_generation = card_app.and_then(|app| app.card_generation).unwrap_or(0);
    Some(CardIdentification {
        card_number: FullCardNumber {
            card_type,
            issuing_nation,
            card_number,
            card_generation,
        },
        issuing_authority,
        issue_date: TimeReal::decode(issue_raw),
        validity_begin: TimeReal::decode(validity_raw),
        expiry_date: TimeReal::decode(expiry_raw),
        holder_surname,
        holder_first_names,
        birth_date_bcd,
        birth_date_iso: Some(birth_date_iso),
    })
}

fn parse_event_chunk(chunk: &[u8]) -> Option<CardEventRecord> {
    let event_type = chunk[0];
    if event_type == 0 {
        return None;
    }
    let begin_raw = u32::from_be_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]);
    let end_raw = u32::from_be_bytes([chunk[5], chunk[6], chunk[7], chunk[8]]);
    let registration_nation = chunk[9];
    let mut reader = ByteReader::new(&chunk[10..EVENT_RECORD_LEN]);
    let registration_number = VehicleRegistrationNumber::parse(&mut reader).ok()?;
    Some(CardEventRecord {
        event_type,
        begin_time: TimeReal::decode(begin_raw),
        end_time: TimeReal::decode(end_raw),
        registration_nation,
        registration_number,
    })
}

/// Events and faults share the 24-byte record shape; the block is discovered
/// by alignment scan because the header padding before it varies by card.
pub(crate) fn parse_card_events(data: &[u8], per_type: Option<u8>, min_run: Option<usize>) -> Vec<CardEventRecord> {
    if data.is_empty() || per_type.map_or(true, |count| count == 0) {
        return Vec::new();
    }
    let Some((start, count)) =
        heuristics::find_record_block(data, EVENT_RECORD_LEN, heuristics::looks_like_driver_card_record)
    else {
        return Vec::new();
    };
    if min_run.is_some_and(|min| count < min) {
        return Vec::new();
    }
    (0..count)
        .filter_map(|idx| {
            let offset = start + idx * EVENT_RECORD_LEN;
            parse_event_chunk(&data[offset..offset + EVENT_RECORD_LEN])
        })
        .collect()
}

pub(crate) fn parse_vehicles_used(
    data: Option<&[u8]>,
    vehicle_records: Option<u16>,
) -> Vec<CardVehicleRecord> {
    let Some(data) = data else {
        return Vec::new();
    };
    if data.len() < 33 {
        return Vec::new();
    }
    // Two bytes of newest-record pointer precede the array.
    let payload_len = data.len() - 2;

    let record_len = [48usize, 31]
        .into_iter()
        .find(|candidate| payload_len % candidate == 0)
        .or_else(|| {
            if payload_len >= 48 {
                Some(48)
            } else if payload_len >= 31 {
                Some(31)
            } else {
                None
            }
        });
    let Some(record_len) = record_len else {
        return Vec::new();
    };
    let has_vin = record_len == 48;
    let mut record_count = payload_len / record_len;
    if let Some(limit) = vehicle_records {
        if limit > 0 {
            record_count = record_count.min(limit as usize);
        }
    }

    let mut records = Vec::new();
    for idx in 0..record_count {
        let offset = 2 + idx * record_len;
        if offset + record_len > data.len() {
            break;
        }
        let record = &data[offset..offset + record_len];
        let odometer_begin = u32::from_be_bytes([0, record[0], record[1], record[2]]);
        let odometer_end = u32::from_be_bytes([0, record[3], record[4], record[5]]);
        let first_use = u32::from_be_bytes([record[6], record[7], record[8], record[9]]);
        let last_use = u32::from_be_bytes([record[10], record[11], record[12], record[13]]);
        let registration_nation = record[14];
        let mut reader = ByteReader::new(&record[15..29]);
        let Ok(registration_number) = VehicleRegistrationNumber::parse(&mut reader) else {
            continue;
        };
        let vin = if has_vin {
            decode_latin1_trimmed(&record[31..48])
        } else {
            String::new()
        };
        records.push(CardVehicleRecord {
            first_use: TimeReal::decode(first_use),
            last_use: TimeReal::decode(last_use),
            odometer_begin,
            odometer_end,
            registration_nation,
            registration_number,
            vin,
        });
    }
    records
}

pub(crate) fn parse_places(
    entry: Option<&CardFileEntry>,
    place_records: Option<u16>,
) -> Vec<CardPlaceRecord> {
    let Some(entry) = entry else {
        return Vec::new();
    };
    let data = entry.data;
    if data.is_empty() {
        return Vec::new();
    }
    let header_len = if entry.appendix == 2 { 2 } else { 1 };
    if data.len() <= header_len {
        return Vec::new();
    }
    let body_len = data.len() - header_len;

    let mut record_len = place_records
        .filter(|&count| count > 0 && body_len % count as usize == 0)
        .map(|count| body_len / count as usize);
    if !matches!(record_len, Some(10) | Some(21)) {
        record_len = Some(if entry.appendix == 2 { 21 } else { 10 });
    }
    let record_len = record_len.unwrap_or(10);

    let mut record_count = body_len / record_len;
    if let Some(limit) = place_records {
        if limit > 0 {
            record_count = record_count.min(limit as usize);
        }
    }

    let mut records = Vec::new();
    for idx in 0..record_count {
        let offset = header_len + idx * record_len;
        if offset + record_len > data.len() {
            break;
        }
        let record = &data[offset..offset + record_len];
        if record.iter().all(|&b| b == 0) {
            continue;
        }

        let time_raw = u32::from_be_bytes([record[0], record[1], record[2], record[3]]);
        let entry_type = record[4];
        let country = record[5];
        let region = record[6];
        let odometer = u32::from_be_bytes([0, record[7], record[8], record[9]]);

        let mut gnss_time = None;
        let mut accuracy = None;
        let mut latitude = None;
        let mut longitude = None;
        if record_len >= 21 {
            let gnss_raw = u32::from_be_bytes([record[10], record[11], record[12], record[13]]);
            gnss_time = TimeReal::decode(gnss_raw);
            accuracy = Some(record[14]);
            latitude = Some(heuristics::decode_signed_24(u32::from_be_bytes([
                0, record[15], record[16], record[17],
            ])));
            longitude = Some(heuristics::decode_signed_24(u32::from_be_bytes([
                0, record[18], record[19], record[20],
            ])));
        }

        let time = TimeReal::decode(time_raw);
        if time.is_none()
            && gnss_time.is_none()
            && country == 0
            && region == 0
            && odometer == 0
            && entry_type == 0
        {
            continue;
        }

        records.push(CardPlaceRecord {
            time,
            entry_type,
            country,
            region,
            odometer: (odometer != 0).then_some(odometer),
            gnss_time,
            accuracy,
            latitude,
            longitude,
        });
    }
    records
}

pub(crate) fn parse_specific_conditions(data: &[u8]) -> Vec<CardSpecificCondition> {
    if data.is_empty() {
        return Vec::new();
    }
    let Some((start, count)) = heuristics::find_record_block(data, CONDITION_RECORD_LEN, |chunk| {
        let time_raw = u32::from_be_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]);
        matches!(chunk[0], 1..=4) && heuristics::looks_like_time_real(time_raw)
    }) else {
        return Vec::new();
    };
    (0..count)
        .map(|idx| {
            let offset = start + idx * CONDITION_RECORD_LEN;
            let chunk = &data[offset..offset + CONDITION_RECORD_LEN];
            let time_raw = u32::from_be_bytes([chunk[1], chunk[2], chunk[3], chunk[4]]);
            CardSpecificCondition {
                time: TimeReal::decode(time_raw),
                condition_type: chunk[0],
            }
        })
        .collect()
}

fn parse_vehicle_units_from_gnss(entry: Option<&CardFileEntry>) -> Vec<CardVehicleUnitRecord> {
    let Some(entry) = entry else {
        return Vec::new();
    };
    let data = entry.data;
    if data.len() < 12 {
        return Vec::new();
    }
    let raw = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
    let Some(timestamp) = TimeReal::decode(raw) else {
        return Vec::new();
    };
    vec![CardVehicleUnitRecord {
        timestamp,
        manufacturer_code: data[6],
        device_id: data[7],
        software_version: decode_latin1_trimmed(&data[8..12]),
        from_gnss: true,
    }]
}

/// Fallback VU-seen scan: any 10-byte window whose head decodes as a
/// plausible TimeReal and whose tail is four ASCII digits. May false-match
/// on lucky payload, which `from_gnss = false` lets a renderer qualify.
pub(crate) fn parse_vehicle_units_fallback(data: &[u8]) -> Vec<CardVehicleUnitRecord> {
    let mut records = Vec::new();
    if data.len() < 10 {
        return records;
    }
    for idx in 0..data.len() - 10 {
        let raw = u32::from_be_bytes([data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]);
        let Some(timestamp) = TimeReal::decode(raw) else {
            continue;
        };
        let version = &data[idx + 6..idx + 10];
        if !version.iter().all(u8::is_ascii_digit) {
            continue;
        }
        records.push(CardVehicleUnitRecord {
            timestamp,
            manufacturer_code: data[idx + 4],
            device_id: data[idx + 5],
            software_version: decode_latin1_trimmed(version),
            from_gnss: false,
        });
    }
    records
}

/// Assemble the driver-card summary from every discovery pass.
pub fn parse_summary(data: &[u8]) -> DriverCardSummary {
    let segments = parse_legacy_segments(data);
    let seg_identification = segments.get(&SEGMENT_IDENTIFICATION).copied().unwrap_or(&[]);
    let seg_misc = segments.get(&SEGMENT_MISC).copied().unwrap_or(&[]);

    let (entries, _trailing, _truncated) = parse_ef_entries(data);
    let map = entries_by_id(&entries);

    let app_entry = file_entry(&map, 0x0501, &[2, 0]);
    let application_identification = parse_application_identification(data, app_entry);
    let app = application_identification.as_ref();

    let driving_licence = parse_driving_licence(data);
    let card_identification = parse_card_identification(data, app);
    let events = parse_card_events(
        seg_identification,
        app.map(|app| app.events_per_type),
        None,
    );
    let faults = parse_card_events(
        seg_identification,
        app.map(|app| app.faults_per_type),
        app.map(|app| app.faults_per_type as usize),
    );
    let vehicles_used = parse_vehicles_used(
        file_data(&map, 0x0505, &[2, 0]),
        app.map(|app| app.vehicle_records),
    );
    let places = parse_places(
        file_entry(&map, 0x0506, &[2, 0]),
        app.map(|app| app.place_records),
    );
    let specific_conditions = parse_specific_conditions(seg_misc);
    let mut vehicle_units = parse_vehicle_units_from_gnss(file_entry(&map, 0x0523, &[2, 0]));
    if vehicle_units.is_empty() {
        vehicle_units = parse_vehicle_units_fallback(seg_misc);
    }

    DriverCardSummary {
        application_identification,
        driving_licence,
        card_identification,
        events,
        faults,
        vehicles_used,
        places,
        specific_conditions,
        vehicle_units,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ef(file_id: u16, appendix: u8, data: &[u8]) -> Vec<u8> {
        let mut out = file_id.to_be_bytes().to_vec();
        out.push(appendix);
        out.extend_from_slice(&(data.len() as u16).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    fn part<'a>(parts: &'a [Part], name: &str) -> &'a Part {
        parts.iter().find(|p| p.name == name).unwrap()
    }

    #[test]
    fn ef_walk_splits_entries() {
        let mut image = ef(0x0002, 0, &[0xAA; 25]);
        image.extend(ef(0x0501, 0, &[0x01; 10]));
        let (entries, trailing, truncated) = parse_ef_entries(&image);
        assert_eq!(entries.len(), 2);
        assert!(!trailing);
        assert!(!truncated);
        assert_eq!(entries[0].file_id, 0x0002);
        assert_eq!(entries[1].file_id, 0x0501);
        assert_eq!(entries[1].length, 10);
    }

    #[test]
    fn ef_walk_flags_truncation_and_trailing() {
        let mut image = ef(0x0002, 0, &[0xAA; 25]);
        image.extend_from_slice(&[0x05, 0x01, 0x00, 0x10, 0x00]); // declares 0x1000 bytes
        let (entries, _trailing, truncated) = parse_ef_entries(&image);
        assert_eq!(entries.len(), 1);
        assert!(truncated);

        let mut image = ef(0x0002, 0, &[0xAA; 25]);
        image.extend_from_slice(&[0x01, 0x02]); // dangling bytes
        let (_, trailing, truncated) = parse_ef_entries(&image);
        assert!(trailing);
        assert!(!truncated);
    }

    #[test]
    fn gen1_scheme_part_valid() {
        let mut image = ef(0x0502, 0, &[0x01; 40]);
        image.extend(ef(0x0502, 1, &[0x00; 128]));
        let parts = validate_parts(&image);
        let events = part(&parts, "Events");
        assert_eq!(events.status, PartStatus::Valid);
        assert_eq!(events.note, None);
    }

    #[test]
    fn gen2_scheme_with_wrong_signature_length() {
        let mut image = ef(0x0502, 2, &[0x01; 40]);
        image.extend(ef(0x0502, 3, &[0x00; 128])); // Gen2 signatures are 64 bytes
        let parts = validate_parts(&image);
        let events = part(&parts, "Events");
        assert_eq!(events.status, PartStatus::Invalid);
        assert_eq!(
            events.note.as_deref(),
            Some("Gen2: Invalid signature length")
        );
    }

    #[test]
    fn best_scheme_wins() {
        // Gen1 data lacks its signature, but the Gen2 pair is complete.
        let mut image = ef(0x0502, 0, &[0x01; 40]);
        image.extend(ef(0x0502, 2, &[0x01; 40]));
        image.extend(ef(0x0502, 3, &[0x00; 64]));
        let parts = validate_parts(&image);
        let events = part(&parts, "Events");
        assert_eq!(events.status, PartStatus::Valid);
        assert_eq!(
            events.note.as_deref(),
            Some("Gen1: Missing signature appendix")
        );
    }

    #[test]
    fn missing_part_and_unknown_ids() {
        let image = ef(0x7777, 0, &[0x01; 4]);
        let parts = validate_parts(&image);
        assert_eq!(part(&parts, "Events").status, PartStatus::Missing);
        let structure = part(&parts, "File structure");
        assert_eq!(structure.status, PartStatus::Valid);
        assert_eq!(
            structure.note.as_deref(),
            Some("Unknown EF file IDs: 0x7777")
        );
    }

    #[test]
    fn truncated_entry_invalidates_file_structure() {
        let mut image = ef(0x0002, 0, &[0xAA; 25]);
        image.extend_from_slice(&[0x05, 0x01, 0x00, 0x10, 0x00]);
        let parts = validate_parts(&image);
        let structure = part(&parts, "File structure");
        assert_eq!(structure.status, PartStatus::Invalid);
        assert!(structure.note.as_deref().unwrap().contains("Truncated file entry"));
    }

    #[test]
    fn broken_certificates_invalidate_both_parts() {
        let mut image = ef(0xC108, 0, &[0xA5; 194]);
        image.extend(ef(0xC100, 0, &[0xA5; 194]));
        let parts = validate_parts(&image);
        let ca = part(&parts, "CA certificate");
        assert_eq!(ca.status, PartStatus::Invalid);
        assert!(ca.note.as_deref().unwrap().contains("CA certificate invalid"));
        let card = part(&parts, "Card certificate");
        assert_eq!(card.status, PartStatus::Invalid);
        assert!(card.note.as_deref().unwrap().contains("CA certificate invalid"));
    }

    #[test]
    fn gen2_certificates_note_not_verified() {
        let image = ef(0xC109, 2, &[0xA5; 194]);
        let parts = validate_parts(&image);
        let ca = part(&parts, "CA certificate (Gen2)");
        assert_eq!(ca.status, PartStatus::Valid);
        assert_eq!(ca.note.as_deref(), Some("ECC certificate not verified"));
    }

    #[test]
    fn application_identification_from_gen2_entry() {
        let payload = [
            0x01, // driver card
            0x00, 0x01, // structure version
            0x0C, // events per type
            0x06, // faults per type
            0x15, 0xAC, // activity structure length
            0x00, 0xC8, // vehicle records
            0x00, 0x70, // place records (u16 in Gen2)
        ];
        let image = ef(0x0501, 2, &payload);
        let (entries, _, _) = parse_ef_entries(&image);
        let map = entries_by_id(&entries);
        let entry = file_entry(&map, 0x0501, &[2, 0]).unwrap();
        let app = parse_application_identification(&image, Some(entry)).unwrap();
        assert_eq!(app.card_type, 1);
        assert_eq!(app.events_per_type, 12);
        assert_eq!(app.faults_per_type, 6);
        assert_eq!(app.activity_structure_length, 0x15AC);
        assert_eq!(app.vehicle_records, 200);
        assert_eq!(app.place_records, 112);
        assert_eq!(app.card_generation, Some(2));
    }

    #[test]
    fn application_identification_rejects_bad_card_type() {
        let payload = [0x09, 0, 1, 1, 1, 0, 10, 0, 1, 8];
        let image = ef(0x0501, 0, &payload);
        let (entries, _, _) = parse_ef_entries(&image);
        let map = entries_by_id(&entries);
        let entry = file_entry(&map, 0x0501, &[2, 0]);
        assert!(parse_application_identification(&image, entry).is_none());
    }

    fn name_bytes(text: &str) -> Vec<u8> {
        let mut out = vec![0x01];
        let mut body = text.as_bytes().to_vec();
        body.resize(35, 0);
        out.extend(body);
        out
    }

    #[test]
    fn card_identification_via_tag_scan() {
        let mut payload = vec![0x0D]; // issuing nation
        let mut number = b"D123456789012345".to_vec();
        number.resize(16, 0);
        payload.extend(number);
        payload.extend(name_bytes("Kraftfahrt-Bundesamt"));
        payload.extend_from_slice(&1_400_000_000u32.to_be_bytes());
        payload.extend_from_slice(&1_400_000_100u32.to_be_bytes());
        payload.extend_from_slice(&1_700_000_000u32.to_be_bytes());
        payload.extend(name_bytes("Mustermann"));
        payload.extend(name_bytes("Max"));
        payload.extend_from_slice(&[0x19, 0x85, 0x11, 0x30]);
        assert_eq!(payload.len(), 141);
        // Pad to the min tag length so the scan accepts it.
        payload.resize(143, 0);
        let image = ef(0x0520, 0, &payload);

        let ident = parse_card_identification(&image, None).unwrap();
        assert_eq!(ident.card_number.card_number, "D123456789012345");
        assert_eq!(ident.card_number.card_type, 1);
        assert_eq!(ident.issuing_authority.text, "Kraftfahrt-Bundesamt");
        assert_eq!(ident.issue_date.unwrap().raw(), 1_400_000_000);
        assert_eq!(ident.holder_surname.text, "Mustermann");
        assert_eq!(ident.birth_date_bcd, "19851130");
        assert_eq!(ident.birth_date_iso.as_deref(), Some("1985-11-30"));
    }

    #[test]
    fn card_identification_rejects_unordered_dates() {
        let mut payload = vec![0x0D];
        let mut number = b"D123456789012345".to_vec();
        number.resize(16, 0);
        payload.extend(number);
        payload.extend(name_bytes("Authority"));
        payload.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // issue after expiry
        payload.extend_from_slice(&1_400_000_000u32.to_be_bytes());
        payload.extend_from_slice(&1_500_000_000u32.to_be_bytes());
        payload.extend(name_bytes("Mustermann"));
        payload.extend(name_bytes("Max"));
        payload.extend_from_slice(&[0x19, 0x85, 0x11, 0x30]);
        payload.resize(143, 0);
        let image = ef(0x0520, 0, &payload);
        assert!(parse_card_identification(&image, None).is_none());
    }

    #[test]
    fn event_block_discovery_with_padding() {
        let mut chunk = vec![0x06]; // event type
        chunk.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        chunk.extend_from_slice(&1_600_003_600u32.to_be_bytes());
        chunk.push(0x0D); // nation
        chunk.push(0x01); // code page
        let mut reg = b"B AB 123".to_vec();
        reg.resize(13, 0x20);
        chunk.extend(reg);
        assert_eq!(chunk.len(), EVENT_RECORD_LEN);

        let mut data = vec![0xFF; 7]; // card-specific padding
        for _ in 0..3 {
            data.extend(chunk.clone());
        }
        let events = parse_card_events(&data, Some(12), None);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, 0x06);
        assert_eq!(events[0].begin_time.unwrap().raw(), 1_600_000_000);
        assert_eq!(events[0].registration_number.registration_number, "B AB 123");
    }

    #[test]
    fn fault_block_requires_min_run() {
        let mut chunk = vec![0x06];
        chunk.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        chunk.extend_from_slice(&1_600_003_600u32.to_be_bytes());
        chunk.push(0x0D);
        chunk.push(0x01);
        chunk.extend(std::iter::repeat(0x20u8).take(13));
        let mut data = Vec::new();
        for _ in 0..2 {
            data.extend(chunk.clone());
        }
        assert_eq!(parse_card_events(&data, Some(6), Some(6)).len(), 0);
        assert_eq!(parse_card_events(&data, Some(6), Some(2)).len(), 2);
    }

    #[test]
    fn vehicles_used_gen2_with_vin() {
        let mut record = Vec::new();
        record.extend_from_slice(&[0x00, 0x10, 0x00]); // odometer begin
        record.extend_from_slice(&[0x00, 0x10, 0x80]); // odometer end
        record.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        record.extend_from_slice(&1_600_100_000u32.to_be_bytes());
        record.push(0x0D);
        record.push(0x01);
        let mut reg = b"HH XY 99".to_vec();
        reg.resize(13, 0x20);
        record.extend(reg);
        record.extend_from_slice(&[0x00, 0x00]); // counter
        let mut vin = b"WDB9634031L000001".to_vec();
        vin.resize(17, 0);
        record.extend(vin);
        assert_eq!(record.len(), 48);

        let mut data = vec![0x00, 0x00]; // newest-record pointer
        data.extend(record);
        let records = parse_vehicles_used(Some(&data), Some(200));
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.odometer_begin, 0x1000);
        assert_eq!(record.odometer_end, 0x1080);
        assert_eq!(record.registration_number.registration_number, "HH XY 99");
        assert_eq!(record.vin, "WDB9634031L000001");
    }

    #[test]
    fn vehicles_used_gen1_without_vin() {
        let mut record = Vec::new();
        record.extend_from_slice(&[0x00, 0x10, 0x00]);
        record.extend_from_slice(&[0x00, 0x10, 0x80]);
        record.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        record.extend_from_slice(&1_600_100_000u32.to_be_bytes());
        record.push(0x0D);
        record.push(0x01);
        record.extend(std::iter::repeat(0x20u8).take(13));
        record.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(record.len(), 31);
        let mut data = vec![0x00, 0x00];
        data.extend(record);
        let records = parse_vehicles_used(Some(&data), None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vin, "");
    }

    #[test]
    fn places_gen2_with_gnss() {
        let mut record = Vec::new();
        record.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        record.push(0x01); // entry type
        record.push(0x0D); // country
        record.push(0x00);
        record.extend_from_slice(&[0x00, 0x30, 0x00]); // odometer
        record.extend_from_slice(&1_600_000_060u32.to_be_bytes());
        record.push(0x05); // accuracy
        record.extend_from_slice(&[0xFF, 0xFF, 0xFF]); // latitude -1
        record.extend_from_slice(&[0x00, 0x00, 0x2A]); // longitude 42
        assert_eq!(record.len(), 21);

        let mut payload = vec![0x00, 0x01]; // Gen2 pointer header
        payload.extend(record);
        payload.extend(std::iter::repeat(0u8).take(21)); // blank record, skipped
        let image = ef(0x0506, 2, &payload);
        let (entries, _, _) = parse_ef_entries(&image);
        let map = entries_by_id(&entries);
        let entry = file_entry(&map, 0x0506, &[2, 0]).unwrap();

        let places = parse_places(Some(entry), Some(2));
        assert_eq!(places.len(), 1);
        let place = &places[0];
        assert_eq!(place.time.unwrap().raw(), 1_600_000_000);
        assert_eq!(place.entry_type, 1);
        assert_eq!(place.odometer, Some(0x3000));
        assert_eq!(place.gnss_time.unwrap().raw(), 1_600_000_060);
        assert_eq!(place.latitude, Some(-1));
        assert_eq!(place.longitude, Some(42));
    }

    #[test]
    fn specific_conditions_block() {
        let mut data = vec![0xEE; 3];
        for (condition, time) in [(1u8, 1_600_000_000u32), (3, 1_600_050_000)] {
            data.push(condition);
            data.extend_from_slice(&time.to_be_bytes());
        }
        let conditions = parse_specific_conditions(&data);
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].condition_type, 1);
        assert_eq!(conditions[1].time.unwrap().raw(), 1_600_050_000);
    }

    #[test]
    fn vehicle_units_prefer_gnss_over_fallback() {
        let mut gnss = vec![0x00, 0x01];
        gnss.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        gnss.push(0xAA); // manufacturer
        gnss.push(0x05); // device
        gnss.extend_from_slice(b"0412");
        gnss.extend(std::iter::repeat(0u8).take(8));
        let image = ef(0x0523, 2, &gnss);
        let (entries, _, _) = parse_ef_entries(&image);
        let map = entries_by_id(&entries);
        let units = parse_vehicle_units_from_gnss(file_entry(&map, 0x0523, &[2, 0]));
        assert_eq!(units.len(), 1);
        assert!(units[0].from_gnss);
        assert_eq!(units[0].software_version, "0412");
        assert_eq!(units[0].manufacturer_code, 0xAA);
    }

    #[test]
    fn vehicle_unit_fallback_scan() {
        let mut data = vec![0xFF; 4];
        data.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        data.push(0xAA);
        data.push(0x07);
        data.extend_from_slice(b"0411");
        data.extend_from_slice(&[0xFF; 4]);
        let units = parse_vehicle_units_fallback(&data);
        assert_eq!(units.len(), 1);
        assert!(!units[0].from_gnss);
        assert_eq!(units[0].device_id, 0x07);
        assert_eq!(units[0].software_version, "0411");
    }
}
