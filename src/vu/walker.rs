//! VU stream walking: slice the download into TREP-prefixed segments,
//! structurally validate each one, recover at the next legal segment start
//! after damage, and aggregate per-part statistics.

use crate::bytes::ByteReader;
use crate::header::{
    is_known_trep, trep_data_type, trep_generation, Generation,
    TRANSFER_DATA_POSITIVE_RESPONSE_SID,
};
use crate::summary::{Part, PartStatus};
use crate::vu::{gen1, gen2};
use std::collections::HashMap;

/// Logical VU parts, in presentation order. The last three are proxies whose
/// status mirrors the part that physically contains their data.
pub const VU_PART_NAMES: &[&str] = &[
    "Overview",
    "Activities",
    "Events and faults",
    "Detailed speed",
    "Technical data",
    "Company locks",
    "Overspeeding",
    "Faults",
];

fn proxy_source(name: &str) -> Option<(&'static str, &'static str)> {
    match name {
        "Company locks" => Some(("Technical data", "Contained in Technical data")),
        "Overspeeding" => Some(("Events and faults", "Contained in Events and faults")),
        "Faults" => Some(("Events and faults", "Contained in Events and faults")),
        _ => None,
    }
}

/// A `(0x76, knownTREP)` pair found in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRef {
    pub offset: usize,
    pub trep: u8,
}

/// Every position where a segment could legally start. Over-approximates on
/// adversarial payloads, which is fine: the domain passes re-validate what
/// they decode.
pub fn scan_segments(data: &[u8]) -> Vec<SegmentRef> {
    let mut segments = Vec::new();
    for offset in 0..data.len().saturating_sub(1) {
        if data[offset] == TRANSFER_DATA_POSITIVE_RESPONSE_SID && is_known_trep(data[offset + 1]) {
            segments.push(SegmentRef {
                offset,
                trep: data[offset + 1],
            });
        }
    }
    segments
}

/// The bytes of segment `index`, from its SID up to the next candidate start
/// (or end of input).
pub fn segment_slice<'a>(data: &'a [u8], segments: &[SegmentRef], index: usize) -> &'a [u8] {
    let start = segments[index].offset;
    let end = segments
        .get(index + 1)
        .map_or(data.len(), |next| next.offset);
    &data[start..end]
}

#[derive(Debug, Default)]
struct PartStats {
    count: usize,
    invalid: usize,
    notes: Vec<String>,
}

fn append_note(stats: &mut HashMap<&'static str, PartStats>, name: &str, note: String, invalid: bool) {
    let Some(stat) = stats.get_mut(name) else {
        return;
    };
    if stat.count == 0 {
        stat.count = 1;
    }
    if invalid {
        stat.invalid += 1;
    }
    stat.notes.push(note);
}

fn resync_to_next_part(data: &[u8], reader: &mut ByteReader) -> bool {
    let mut pos = reader.tell();
    while pos + 1 < data.len() {
        if data[pos] == TRANSFER_DATA_POSITIVE_RESPONSE_SID && is_known_trep(data[pos + 1]) {
            // pos is in range, the seek cannot fail
            return reader.seek(pos).is_ok();
        }
        pos += 1;
    }
    false
}

fn validate_vu_part(reader: &mut ByteReader, trep: u8) -> Result<Option<String>, String> {
    if trep == 0x00 {
        if reader.remaining() < 2 {
            return Err("Download interface version truncated".to_string());
        }
        let _ = reader.skip(2);
        return Ok(Some("Download interface version (not validated)".to_string()));
    }
    match trep_generation(trep) {
        Some(Generation::Gen1) => gen1::validate_part(reader, trep),
        Some(
            generation @ (Generation::Gen2V1 | Generation::Gen2V2 | Generation::Gen2V1OrV2),
        ) => gen2::validate_part(reader, trep, generation),
        _ => Err(format!("Unknown TREP 0x{:02X}", trep)),
    }
}

fn resolve_status(count: usize, invalid: usize) -> PartStatus {
    if count == 0 {
        PartStatus::Missing
    } else if invalid > 0 {
        PartStatus::Invalid
    } else {
        PartStatus::Valid
    }
}

fn build_note(stat: &PartStats, base_note: Option<&str>) -> Option<String> {
    let mut notes: Vec<String> = Vec::new();
    if stat.count > 0 {
        if stat.invalid > 0 {
            notes.push(format!(
                "Segments valid: {}/{}",
                stat.count - stat.invalid,
                stat.count
            ));
        } else if stat.count > 1 {
            notes.push(format!("Segments: {}", stat.count));
        }
    }
    notes.extend(stat.notes.iter().cloned());
    if let Some(base) = base_note {
        notes.push(base.to_string());
    }
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    }
}

/// Walk the whole VU stream and derive the status of every logical part.
pub fn validate_parts(data: &[u8]) -> Vec<Part> {
    let mut stats: HashMap<&'static str, PartStats> = HashMap::new();
    for name in VU_PART_NAMES {
        if proxy_source(name).is_none() {
            stats.insert(name, PartStats::default());
        }
    }

    let mut reader = ByteReader::new(data);
    while reader.remaining() > 0 {
        if reader.remaining() < 2 {
            append_note(
                &mut stats,
                "Overview",
                "Trailing bytes after last part".to_string(),
                false,
            );
            break;
        }
        let Ok(sid) = reader.read_u8() else { break };
        if sid != TRANSFER_DATA_POSITIVE_RESPONSE_SID {
            append_note(
                &mut stats,
                "Overview",
                format!("Missing SID at offset {}", reader.tell() - 1),
                true,
            );
            if !resync_to_next_part(data, &mut reader) {
                break;
            }
            continue;
        }
        let Ok(trep) = reader.read_u8() else { break };
        log::debug!("Validating segment with sid {:#04x}, trep {:#04x}", sid, trep);

        let verdict = validate_vu_part(&mut reader, trep);
        let (mut ok, mut note) = match verdict {
            Ok(note) => (true, note),
            Err(reason) => (false, Some(reason)),
        };
        if ok
            && reader.remaining() > 0
            && reader
                .peek_bytes(1)
                .map(|next| next[0] != TRANSFER_DATA_POSITIVE_RESPONSE_SID)
                .unwrap_or(false)
        {
            ok = false;
            note = Some("Unexpected bytes after part".to_string());
        }

        if let Some(name) = trep_data_type(trep) {
            if let Some(stat) = stats.get_mut(name) {
                stat.count += 1;
                if ok {
                    if let Some(note) = note {
                        if !stat.notes.contains(&note) {
                            stat.notes.push(note);
                        }
                    }
                } else {
                    stat.invalid += 1;
                    stat.notes
                        .push(note.unwrap_or_else(|| "Invalid structure".to_string()));
                }
            }
        } else if !ok {
            log::warn!("Unknown TREP {:#04x} in stream", trep);
        }

        if !ok && !resync_to_next_part(data, &mut reader) {
            break;
        }
    }

    VU_PART_NAMES
        .iter()
        .map(|name| {
            let (stat_name, base_note) = match proxy_source(name) {
                Some((source, base)) => (source, Some(base)),
                None => (*name, None),
            };
            let stat = &stats[stat_name];
            Part {
                name: (*name).to_string(),
                status: resolve_status(stat.count, stat.invalid),
                note: build_note(stat, base_note),
            }
        })
        .collect()
}
