//! Header classification: decide from the first bytes whether a file is a
//! Vehicle Unit download or a driver-card image, and which generation wrote
//! it.

use serde::{Deserialize, Serialize};

/// SID of the "transfer data positive response" that opens every VU segment.
pub const TRANSFER_DATA_POSITIVE_RESPONSE_SID: u8 = 0x76;

/// How many bytes of the file the classifier looks at.
pub const HEADER_READ_LEN: usize = 32;

/// Known whole-file prefixes from sample downloads; kept small and explicit.
const DRIVER_CARD_SIGNATURES: &[&[u8]] = &[&[0x00, 0x02, 0x00, 0x00, 0x19, 0x00]];
const VU_SIGNATURES: &[&[u8]] = &[&[0x76, 0x21, 0x04, 0x00, 0xCD, 0x00]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    VehicleUnit,
    DriverCard,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Gen1,
    Gen2V1,
    Gen2V2,
    Gen2V1OrV2,
    Unknown,
}

/// Decoded file header (first ≤32 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub file_size: usize,
    pub detected_type: FileType,
    pub detected_generation: Generation,
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
    pub signature_hex: String,
    pub header_hex: String,
    pub header_length: usize,
    pub service_id: Option<u8>,
    pub trep: Option<u8>,
    pub trep_generation: Option<Generation>,
    pub trep_data_type: Option<String>,
    pub download_interface_version: Option<String>,
}

/// Data-type label per TREP, Annex 1C Appendix 7 (Gen1 / Gen2 v1 / Gen2 v2).
pub fn trep_data_type(trep: u8) -> Option<&'static str> {
    match trep {
        0x00 => Some("Download interface version"),
        0x01 | 0x21 | 0x31 => Some("Overview"),
        0x02 | 0x22 | 0x32 => Some("Activities"),
        0x03 | 0x23 | 0x33 => Some("Events and faults"),
        0x04 | 0x24 => Some("Detailed speed"),
        0x05 | 0x25 | 0x35 => Some("Technical data"),
        _ => None,
    }
}

pub fn is_known_trep(trep: u8) -> bool {
    trep_data_type(trep).is_some()
}

/// Map a TREP to the generation that produces it. `0x24` (detailed speed) is
/// shared between Gen2 v1 and v2 and stays ambiguous.
pub fn trep_generation(trep: u8) -> Option<Generation> {
    match trep {
        0x01..=0x05 => Some(Generation::Gen1),
        0x24 => Some(Generation::Gen2V1OrV2),
        0x21..=0x25 => Some(Generation::Gen2V1),
        0x00 | 0x31 | 0x32 | 0x33 | 0x35 => Some(Generation::Gen2V2),
        _ => None,
    }
}

fn parse_download_interface_version(data: &[u8]) -> String {
    if data.len() < 2 {
        return "unknown".to_string();
    }
    let (gen, version) = (data[0], data[1]);
    match (gen, version) {
        (0x01, 0x01) => "gen2_v2 (0x01 0x01)".to_string(),
        (0x01, _) => format!("gen2 (0x01 {:02X})", version),
        _ => format!("0x{:02X} 0x{:02X}", gen, version),
    }
}

fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

fn detect_file_type(
    header: &[u8],
    service_id: Option<u8>,
    trep: Option<u8>,
    generation: Option<Generation>,
) -> (FileType, Generation) {
    if service_id == Some(TRANSFER_DATA_POSITIVE_RESPONSE_SID) && trep.is_some() {
        return (
            FileType::VehicleUnit,
            generation.unwrap_or(Generation::Unknown),
        );
    }
    if DRIVER_CARD_SIGNATURES.iter().any(|sig| header.starts_with(sig)) {
        return (FileType::DriverCard, Generation::Unknown);
    }
    if VU_SIGNATURES.iter().any(|sig| header.starts_with(sig)) {
        return (FileType::VehicleUnit, Generation::Unknown);
    }
    (FileType::Unknown, Generation::Unknown)
}

fn validate_header(
    header: &[u8],
    service_id: Option<u8>,
    trep: Option<u8>,
    generation: Option<Generation>,
    detected_type: FileType,
) -> (bool, Option<String>) {
    if header.is_empty() {
        return (false, Some("Header (empty)".to_string()));
    }
    if service_id == Some(TRANSFER_DATA_POSITIVE_RESPONSE_SID) {
        let Some(trep) = trep else {
            return (false, Some("Header (missing TREP#2)".to_string()));
        };
        if generation.is_none() {
            return (
                false,
                Some(format!("Header (unknown TREP#2 0x{:02X})", trep)),
            );
        }
        if trep == 0x00 && header.len() < 4 {
            return (
                false,
                Some("Header (download interface version missing)".to_string()),
            );
        }
        return (true, None);
    }
    if matches!(detected_type, FileType::DriverCard | FileType::VehicleUnit) {
        return (true, None);
    }
    (false, Some("Header (unknown signature)".to_string()))
}

/// Classify the first bytes of a download file. Total over any input — an
/// empty slice yields an invalid header rather than an error.
pub fn parse_header(bytes: &[u8], file_size: usize) -> Header {
    let header = &bytes[..bytes.len().min(HEADER_READ_LEN)];

    let mut service_id = None;
    let mut trep = None;
    if header.first() == Some(&TRANSFER_DATA_POSITIVE_RESPONSE_SID) {
        service_id = Some(TRANSFER_DATA_POSITIVE_RESPONSE_SID);
        trep = header.get(1).copied();
    }

    let mut generation = None;
    let mut data_type = None;
    let mut download_interface_version = None;
    if service_id.is_some() {
        if let Some(trep) = trep {
            generation = trep_generation(trep);
            data_type = trep_data_type(trep).map(str::to_string);
            if trep == 0x00 && header.len() >= 4 {
                download_interface_version = Some(parse_download_interface_version(&header[2..4]));
            }
        }
    }

    let (detected_type, detected_generation) =
        detect_file_type(header, service_id, trep, generation);
    let (is_valid, invalid_reason) =
        validate_header(header, service_id, trep, generation, detected_type);

    let signature = &header[..header.len().min(6)];
    Header {
        file_size,
        detected_type,
        detected_generation,
        is_valid,
        invalid_reason,
        signature_hex: hex_bytes(signature),
        header_hex: hex_bytes(header),
        header_length: header.len(),
        service_id,
        trep,
        trep_generation: generation,
        trep_data_type: data_type,
        download_interface_version,
    }
}
