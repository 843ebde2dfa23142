pub mod records;

use crate::bytes::ByteReader;
use crate::error::Result;
use crate::heuristics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// [TimeReal: appendix 2.162.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e24993)
///
/// Sentinel handling is concentrated here: raw values outside the plausible
/// 2000..2030 window (which includes the `0xFFFFFFFF` "not yet" marker and
/// the common `00`/`FF`/space filler words) decode to `None`, so the record
/// decoders never see a raw 32-bit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeReal(pub DateTime<Utc>);

impl TimeReal {
    pub fn decode(raw: u32) -> Option<Self> {
        if !heuristics::looks_like_time_real(raw) {
            return None;
        }
        DateTime::from_timestamp(i64::from(raw), 0).map(TimeReal)
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Option<Self>> {
        let raw = reader.read_time_real_raw()?;
        Ok(Self::decode(raw))
    }

    pub fn raw(&self) -> u32 {
        self.0.timestamp() as u32
    }
}

/// [Name: appendix 2.99.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e22398)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    pub code_page: u8,
    pub text: String,
}

impl Name {
    pub const SIZE: usize = 36;

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let code_page = reader.read_u8()?;
        let text = reader.read_fixed_str_code_page(35, code_page)?;
        Ok(Name { code_page, text })
    }
}

/// [Address: appendix 2.2.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e16375)
///
/// Same wire shape as [`Name`] but semantically distinct; modelled as its own
/// type so the two cannot be conflated downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub code_page: u8,
    pub text: String,
}

impl Address {
    pub const SIZE: usize = 36;

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let code_page = reader.read_u8()?;
        let text = reader.read_fixed_str_code_page(35, code_page)?;
        Ok(Address { code_page, text })
    }
}

/// [VehicleRegistrationNumber: appendix 2.168.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e25188)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRegistrationNumber {
    pub code_page: u8,
    pub registration_number: String,
}

impl VehicleRegistrationNumber {
    pub const SIZE: usize = 14;

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let code_page = reader.read_u8()?;
        let registration_number = reader.read_fixed_str_code_page(13, code_page)?;
        Ok(VehicleRegistrationNumber {
            code_page,
            registration_number,
        })
    }
}

/// [FullCardNumber: appendix 2.73.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e21400)
///
/// The Gen2 shape appends a one-byte card generation; Gen1 records leave it
/// at 0. Codes stay numeric, label translation is a renderer concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullCardNumber {
    pub card_type: u8,
    pub issuing_nation: u8,
    pub card_number: String,
    pub card_generation: u8,
}

impl FullCardNumber {
    pub const SIZE_GEN1: usize = 18;
    pub const SIZE_GEN2: usize = 19;

    pub fn parse_gen1(reader: &mut ByteReader) -> Result<Self> {
        let card_type = reader.read_u8()?;
        let issuing_nation = reader.read_u8()?;
        let card_number = reader.read_fixed_str(16)?;
        Ok(FullCardNumber {
            card_type,
            issuing_nation,
            card_number,
            card_generation: 0,
        })
    }

    pub fn parse_gen2(reader: &mut ByteReader) -> Result<Self> {
        let card_type = reader.read_u8()?;
        let issuing_nation = reader.read_u8()?;
        let card_number = reader.read_fixed_str(16)?;
        let card_generation = reader.read_u8()?;
        Ok(FullCardNumber {
            card_type,
            issuing_nation,
            card_number,
            card_generation,
        })
    }

    /// A slot without a card is encoded as all-`0xFF` (or left empty).
    pub fn is_missing(&self) -> bool {
        if self.card_type == 0xFF && self.issuing_nation == 0xFF {
            return true;
        }
        if self.card_number.is_empty() {
            return true;
        }
        self.card_number.chars().all(|ch| ch == '\u{FF}')
    }
}

/// [ExtendedSerialNumber: appendix 2.72.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e21307)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedSerialNumber {
    pub serial_number: u32,
    pub month_year_bcd: String,
    pub equipment_type: u8,
    pub manufacturer_code: u8,
}

impl ExtendedSerialNumber {
    pub const SIZE: usize = 8;

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let serial_number = reader.read_u32_be()?;
        let month_year_bcd = reader.read_bcd(2)?;
        let equipment_type = reader.read_u8()?;
        let manufacturer_code = reader.read_u8()?;
        Ok(ExtendedSerialNumber {
            serial_number,
            month_year_bcd,
            equipment_type,
            manufacturer_code,
        })
    }
}

/// [VuSoftwareIdentification: appendix 2.225.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e28538)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuSoftwareIdentification {
    pub version: String,
    pub installation_time: Option<TimeReal>,
}

impl VuSoftwareIdentification {
    pub const SIZE: usize = 8;

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let version = reader.read_fixed_str(4)?;
        let installation_time = TimeReal::parse(reader)?;
        Ok(VuSoftwareIdentification {
            version,
            installation_time,
        })
    }
}

/// [ActivityChangeInfo: appendix 2.1.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e16027)
///
/// Packed big-endian 16-bit word, MSB first:
/// `slot:1, drivingStatus:1, cardStatus:1, activity:2, minutes:11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityChangeInfo {
    pub slot: u8,
    pub driving_status: u8,
    pub card_status: u8,
    pub activity: u8,
    pub minutes: u16,
}

impl ActivityChangeInfo {
    pub const SIZE: usize = 2;

    pub fn decode(word: u16) -> Self {
        ActivityChangeInfo {
            slot: ((word >> 15) & 0x1) as u8,
            driving_status: ((word >> 14) & 0x1) as u8,
            card_status: ((word >> 13) & 0x1) as u8,
            activity: ((word >> 11) & 0x3) as u8,
            minutes: word & 0x7FF,
        }
    }

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        Ok(Self::decode(reader.read_u16_be()?))
    }

    /// Decode the whole packed array, ignoring a trailing odd byte.
    pub fn decode_all(raw: &[u8]) -> Vec<Self> {
        raw.chunks_exact(Self::SIZE)
            .map(|pair| Self::decode(u16::from_be_bytes([pair[0], pair[1]])))
            .collect()
    }
}

/// Decode a 4-byte BCD birth date into its 8 digits (`?` for bad nibbles).
pub fn decode_bcd_date(raw: &[u8]) -> String {
    let mut digits = String::with_capacity(raw.len() * 2);
    for byte in raw {
        for nibble in [byte >> 4, byte & 0x0F] {
            digits.push(match nibble {
                0..=9 => (b'0' + nibble) as char,
                _ => '?',
            });
        }
    }
    digits
}

/// `"YYYYMMDD"` → `"YYYY-MM-DD"`, or `None` when the digits do not form one.
pub fn bcd_date_to_iso(value: &str) -> Option<String> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}-{}", &value[..4], &value[4..6], &value[6..8]))
}
