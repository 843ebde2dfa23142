pub mod card_parser;

use crate::dt::{FullCardNumber, Name, TimeReal, VehicleRegistrationNumber};
use serde::{Deserialize, Serialize};

/// One `{fileID, appendix, length, data}` entry of a card image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardFileEntry<'a> {
    pub file_id: u16,
    pub appendix: u8,
    pub length: usize,
    pub offset: usize,
    pub data: &'a [u8],
}

/// Appendix coding of a download scheme: which appendix value carries the EF
/// data, which one the signature, and how long that signature must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendixScheme {
    pub label: &'static str,
    pub data_appendix: u8,
    pub sig_appendix: u8,
    pub sig_len: usize,
}

pub const SCHEME_GEN1: AppendixScheme = AppendixScheme {
    label: "Gen1",
    data_appendix: 0,
    sig_appendix: 1,
    sig_len: 128,
};

pub const SCHEME_GEN2: AppendixScheme = AppendixScheme {
    label: "Gen2",
    data_appendix: 2,
    sig_appendix: 3,
    sig_len: 64,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Any,
    Min(usize),
    Range(usize, usize),
}

impl LengthRule {
    pub fn accepts(&self, length: usize) -> bool {
        match *self {
            LengthRule::Any => true,
            LengthRule::Min(min) => length >= min,
            LengthRule::Range(min, max) => (min..=max).contains(&length),
        }
    }
}

/// One logical card part: display name, EF file ID (`None` for the synthetic
/// file-structure part), whether a signature appendix is required, the
/// accepted data length, and which schemes may carry it.
pub struct CardPartDef {
    pub name: &'static str,
    pub file_id: Option<u16>,
    pub requires_signature: bool,
    pub length_rule: LengthRule,
    pub schemes: &'static [AppendixScheme],
}

const BOTH: &[AppendixScheme] = &[SCHEME_GEN1, SCHEME_GEN2];
const GEN1_ONLY: &[AppendixScheme] = &[SCHEME_GEN1];
const GEN2_ONLY: &[AppendixScheme] = &[SCHEME_GEN2];

pub const CARD_PART_DEFS: &[CardPartDef] = &[
    CardPartDef {
        name: "File structure",
        file_id: None,
        requires_signature: false,
        length_rule: LengthRule::Any,
        schemes: &[],
    },
    CardPartDef {
        name: "Application identification",
        file_id: Some(0x0501),
        requires_signature: true,
        length_rule: LengthRule::Min(10),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Card identification",
        file_id: Some(0x0520),
        requires_signature: true,
        length_rule: LengthRule::Min(143),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Driving licence info",
        file_id: Some(0x0521),
        requires_signature: true,
        length_rule: LengthRule::Min(53),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Events",
        file_id: Some(0x0502),
        requires_signature: true,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Faults",
        file_id: Some(0x0503),
        requires_signature: true,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Driver activity",
        file_id: Some(0x0504),
        requires_signature: true,
        length_rule: LengthRule::Range(5548, 13780),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Vehicles used",
        file_id: Some(0x0505),
        requires_signature: true,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Places",
        file_id: Some(0x0506),
        requires_signature: true,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Current usage",
        file_id: Some(0x0507),
        requires_signature: true,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Control activity",
        file_id: Some(0x0508),
        requires_signature: true,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Specific conditions",
        file_id: Some(0x0522),
        requires_signature: true,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
    CardPartDef {
        name: "GNSS places (Gen2)",
        file_id: Some(0x0523),
        requires_signature: true,
        length_rule: LengthRule::Min(2002),
        schemes: GEN2_ONLY,
    },
    CardPartDef {
        name: "Border crossings (Gen2)",
        file_id: Some(0x0524),
        requires_signature: true,
        length_rule: LengthRule::Min(6050),
        schemes: GEN2_ONLY,
    },
    CardPartDef {
        name: "Card download",
        file_id: Some(0x050E),
        requires_signature: true,
        length_rule: LengthRule::Min(4),
        schemes: BOTH,
    },
    CardPartDef {
        name: "Card certificate",
        file_id: Some(0xC100),
        requires_signature: false,
        length_rule: LengthRule::Min(194),
        schemes: GEN1_ONLY,
    },
    CardPartDef {
        name: "CA certificate",
        file_id: Some(0xC108),
        requires_signature: false,
        length_rule: LengthRule::Min(194),
        schemes: GEN1_ONLY,
    },
    CardPartDef {
        name: "Card certificate (Gen2)",
        file_id: Some(0xC101),
        requires_signature: false,
        length_rule: LengthRule::Min(194),
        schemes: GEN2_ONLY,
    },
    CardPartDef {
        name: "CA certificate (Gen2)",
        file_id: Some(0xC109),
        requires_signature: false,
        length_rule: LengthRule::Min(194),
        schemes: GEN2_ONLY,
    },
    CardPartDef {
        name: "ICC identification",
        file_id: Some(0x0002),
        requires_signature: false,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
    CardPartDef {
        name: "IC identification",
        file_id: Some(0x0005),
        requires_signature: false,
        length_rule: LengthRule::Min(1),
        schemes: BOTH,
    },
];

/// EF_Application_Identification of a driver card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardApplicationIdentification {
    pub card_type: u8,
    pub card_structure_version: u16,
    pub events_per_type: u8,
    pub faults_per_type: u8,
    pub activity_structure_length: u16,
    pub vehicle_records: u16,
    pub place_records: u16,
    pub card_generation: Option<u8>,
}

/// EF_Driving_Licence_Info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrivingLicenceInformation {
    pub issuing_nation: u8,
    pub issuing_authority: Name,
    pub licence_number: String,
}

/// EF_Identification: card plus holder identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardIdentification {
    pub card_number: FullCardNumber,
    pub issuing_authority: Name,
    pub issue_date: Option<TimeReal>,
    pub validity_begin: Option<TimeReal>,
    pub expiry_date: Option<TimeReal>,
    pub holder_surname: Name,
    pub holder_first_names: Name,
    pub birth_date_bcd: String,
    pub birth_date_iso: Option<String>,
}

/// One event or fault stored on the card (both share this 24-byte shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEventRecord {
    pub event_type: u8,
    pub begin_time: Option<TimeReal>,
    pub end_time: Option<TimeReal>,
    pub registration_nation: u8,
    pub registration_number: VehicleRegistrationNumber,
}

/// A place of daily work period record; 21-byte records carry the GNSS
/// extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPlaceRecord {
    pub time: Option<TimeReal>,
    pub entry_type: u8,
    pub country: u8,
    pub region: u8,
    pub odometer: Option<u32>,
    pub gnss_time: Option<TimeReal>,
    pub accuracy: Option<u8>,
    pub latitude: Option<i32>,
    pub longitude: Option<i32>,
}

/// One vehicle-used record (31 bytes Gen1, 48 bytes Gen2 with trailing VIN).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardVehicleRecord {
    pub first_use: Option<TimeReal>,
    pub last_use: Option<TimeReal>,
    pub odometer_begin: u32,
    pub odometer_end: u32,
    pub registration_nation: u8,
    pub registration_number: VehicleRegistrationNumber,
    pub vin: String,
}

/// A vehicle unit the card has been inserted into. `from_gnss` records where
/// the record came from: the GNSS places EF, or the lower-confidence window
/// scan over the miscellaneous segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardVehicleUnitRecord {
    pub timestamp: TimeReal,
    pub manufacturer_code: u8,
    pub device_id: u8,
    pub software_version: String,
    pub from_gnss: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSpecificCondition {
    pub time: Option<TimeReal>,
    pub condition_type: u8,
}

/// Everything the card passes decode into.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverCardSummary {
    pub application_identification: Option<CardApplicationIdentification>,
    pub driving_licence: Option<DrivingLicenceInformation>,
    pub card_identification: Option<CardIdentification>,
    pub events: Vec<CardEventRecord>,
    pub faults: Vec<CardEventRecord>,
    pub vehicles_used: Vec<CardVehicleRecord>,
    pub places: Vec<CardPlaceRecord>,
    pub specific_conditions: Vec<CardSpecificCondition>,
    pub vehicle_units: Vec<CardVehicleUnitRecord>,
}
