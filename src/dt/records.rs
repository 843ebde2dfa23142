//! Domain record decoders shared by the VU passes.
//!
//! Each decoder consumes the fixed Appendix 7 width for its record; callers
//! hand in either a positioned reader or a `recordSize` chunk from a Gen2
//! record array. Trailing manufacturer padding inside a chunk is ignored.

use crate::bytes::ByteReader;
use crate::error::Result;
use crate::dt::{
    Address, ActivityChangeInfo, ExtendedSerialNumber, FullCardNumber, Name, TimeReal,
    VehicleRegistrationNumber, VuSoftwareIdentification,
};
use serde::{Deserialize, Serialize};

/// [VuIdentification: appendix 2.205.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e27697)
///
/// The `source_*` fields record where the heuristic locator accepted the
/// block (segment offset and padding width vary by manufacturer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuIdentification {
    pub manufacturer_name: Name,
    pub manufacturer_address: Address,
    pub part_number: String,
    pub serial_number: ExtendedSerialNumber,
    pub software_identification: VuSoftwareIdentification,
    pub manufacturing_date: Option<TimeReal>,
    pub approval_number: String,
    pub source_trep: u8,
    pub source_offset: usize,
    pub prefix_bytes: usize,
}

impl VuIdentification {
    pub const SIZE: usize = 116;

    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let manufacturer_name = Name::parse(reader)?;
        let manufacturer_address = Address::parse(reader)?;
        let part_number = reader.read_fixed_str(16)?;
        let serial_number = ExtendedSerialNumber::parse(reader)?;
        let software_identification = VuSoftwareIdentification::parse(reader)?;
        let manufacturing_date = TimeReal::parse(reader)?;
        let approval_number = reader.read_fixed_str(8)?;
        Ok(VuIdentification {
            manufacturer_name,
            manufacturer_address,
            part_number,
            serial_number,
            software_identification,
            manufacturing_date,
            approval_number,
            source_trep: 0,
            source_offset: 0,
            prefix_bytes: 0,
        })
    }
}

/// [VuDownloadActivityData: appendix 2.195.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e26731)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuDownloadActivityData {
    pub downloading_time: Option<TimeReal>,
    pub card_number: FullCardNumber,
    pub company_name: Name,
}

impl VuDownloadActivityData {
    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let downloading_time = TimeReal::parse(reader)?;
        let card_number = FullCardNumber::parse_gen2(reader)?;
        let company_name = Name::parse(reader)?;
        Ok(VuDownloadActivityData {
            downloading_time,
            card_number,
            company_name,
        })
    }
}

/// [VuCompanyLocksRecord: appendix 2.184.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e26233)
///
/// An open-ended lock carries `0xFFFFFFFF` as its lock-out time, which
/// decodes to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuCompanyLock {
    pub lock_in_time: Option<TimeReal>,
    pub lock_out_time: Option<TimeReal>,
    pub company_name: Name,
    pub company_address: Address,
    pub company_card_number: FullCardNumber,
}

impl VuCompanyLock {
    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let lock_in_time = TimeReal::parse(reader)?;
        let lock_out_time = TimeReal::parse(reader)?;
        let company_name = Name::parse(reader)?;
        let company_address = Address::parse(reader)?;
        let company_card_number = FullCardNumber::parse_gen2(reader)?;
        Ok(VuCompanyLock {
            lock_in_time,
            lock_out_time,
            company_name,
            company_address,
            company_card_number,
        })
    }
}

/// [VuControlActivityRecord: appendix 2.187.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e26399)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuControlActivity {
    pub control_type: u8,
    pub control_time: Option<TimeReal>,
    pub control_card_number: FullCardNumber,
    pub download_period_begin: Option<TimeReal>,
    pub download_period_end: Option<TimeReal>,
}

impl VuControlActivity {
    pub fn parse(reader: &mut ByteReader) -> Result<Self> {
        let control_type = reader.read_u8()?;
        let control_time = TimeReal::parse(reader)?;
        let control_card_number = FullCardNumber::parse_gen2(reader)?;
        let download_period_begin = TimeReal::parse(reader)?;
        let download_period_end = TimeReal::parse(reader)?;
        Ok(VuControlActivity {
            control_type,
            control_time,
            control_card_number,
            download_period_begin,
            download_period_end,
        })
    }
}

/// Decoded VU overview (TREP 0x21 record array).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuOverview {
    pub vin: Option<String>,
    pub registration_number: Option<VehicleRegistrationNumber>,
    pub current_time: Option<TimeReal>,
    pub download_period_begin: Option<TimeReal>,
    pub download_period_end: Option<TimeReal>,
    pub card_slots_status: Option<u8>,
    pub last_download: Option<VuDownloadActivityData>,
    pub company_locks: Vec<VuCompanyLock>,
    pub control_activities: Vec<VuControlActivity>,
}

/// [VuEventRecord: appendix 2.196.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e26794)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_type: u8,
    pub record_purpose: u8,
    pub begin_time: Option<TimeReal>,
    pub end_time: Option<TimeReal>,
    pub driver_card_begin: FullCardNumber,
    pub driver_card_end: FullCardNumber,
    pub codriver_card_begin: FullCardNumber,
    pub codriver_card_end: FullCardNumber,
    pub similar_events: Option<u8>,
}

impl EventRecord {
    pub fn parse_chunk(chunk: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(chunk);
        let event_type = reader.read_u8()?;
        let record_purpose = reader.read_u8()?;
        let begin_time = TimeReal::parse(&mut reader)?;
        let end_time = TimeReal::parse(&mut reader)?;
        let driver_card_begin = FullCardNumber::parse_gen2(&mut reader)?;
        let driver_card_end = FullCardNumber::parse_gen2(&mut reader)?;
        let codriver_card_begin = FullCardNumber::parse_gen2(&mut reader)?;
        let codriver_card_end = FullCardNumber::parse_gen2(&mut reader)?;
        let similar_events = if reader.remaining() >= 1 {
            Some(reader.read_u8()?)
        } else {
            None
        };
        Ok(EventRecord {
            event_type,
            record_purpose,
            begin_time,
            end_time,
            driver_card_begin,
            driver_card_end,
            codriver_card_begin,
            codriver_card_end,
            similar_events,
        })
    }
}

/// [VuFaultRecord: appendix 2.198.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e26892)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRecord {
    pub fault_type: u8,
    pub record_purpose: u8,
    pub begin_time: Option<TimeReal>,
    pub end_time: Option<TimeReal>,
    pub driver_card_begin: FullCardNumber,
    pub driver_card_end: FullCardNumber,
    pub codriver_card_begin: FullCardNumber,
    pub codriver_card_end: FullCardNumber,
}

impl FaultRecord {
    pub fn parse_chunk(chunk: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(chunk);
        let fault_type = reader.read_u8()?;
        let record_purpose = reader.read_u8()?;
        let begin_time = TimeReal::parse(&mut reader)?;
        let end_time = TimeReal::parse(&mut reader)?;
        let driver_card_begin = FullCardNumber::parse_gen2(&mut reader)?;
        let driver_card_end = FullCardNumber::parse_gen2(&mut reader)?;
        let codriver_card_begin = FullCardNumber::parse_gen2(&mut reader)?;
        let codriver_card_end = FullCardNumber::parse_gen2(&mut reader)?;
        Ok(FaultRecord {
            fault_type,
            record_purpose,
            begin_time,
            end_time,
            driver_card_begin,
            driver_card_end,
            codriver_card_begin,
            codriver_card_end,
        })
    }
}

/// [VuOverSpeedingControlData: appendix 2.212.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e28004)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuOverSpeedingControlData {
    pub last_overspeed_control_time: Option<TimeReal>,
    pub first_overspeed_since: Option<TimeReal>,
    pub number_of_overspeed_since: u8,
}

impl VuOverSpeedingControlData {
    pub fn parse_chunk(chunk: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(chunk);
        let last_overspeed_control_time = TimeReal::parse(&mut reader)?;
        let first_overspeed_since = TimeReal::parse(&mut reader)?;
        let number_of_overspeed_since = if reader.remaining() >= 1 {
            reader.read_u8()?
        } else {
            0
        };
        Ok(VuOverSpeedingControlData {
            last_overspeed_control_time,
            first_overspeed_since,
            number_of_overspeed_since,
        })
    }
}

/// [VuOverSpeedingEventRecord: appendix 2.214.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e28097)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverspeedingEventRecord {
    pub event_type: u8,
    pub record_purpose: u8,
    pub begin_time: Option<TimeReal>,
    pub end_time: Option<TimeReal>,
    pub max_speed: u8,
    pub average_speed: u8,
    pub card_number: FullCardNumber,
    pub similar_events: u8,
}

impl OverspeedingEventRecord {
    pub fn parse_chunk(chunk: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(chunk);
        let event_type = reader.read_u8()?;
        let record_purpose = reader.read_u8()?;
        let begin_time = TimeReal::parse(&mut reader)?;
        let end_time = TimeReal::parse(&mut reader)?;
        let max_speed = reader.read_u8()?;
        let average_speed = reader.read_u8()?;
        let card_number = FullCardNumber::parse_gen2(&mut reader)?;
        let similar_events = if reader.remaining() >= 1 {
            reader.read_u8()?
        } else {
            0
        };
        Ok(OverspeedingEventRecord {
            event_type,
            record_purpose,
            begin_time,
            end_time,
            max_speed,
            average_speed,
            card_number,
            similar_events,
        })
    }
}

/// [VuCardIWRecord: appendix 2.177.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e25617)
///
/// Card insertion/withdrawal cycle; a still-inserted card has the
/// withdrawal time at `0xFFFFFFFF`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuCardIWRecord {
    pub holder_surname: Name,
    pub holder_first_names: Name,
    pub card_number: FullCardNumber,
    pub card_expiry: Option<TimeReal>,
    pub card_insertion_time: Option<TimeReal>,
    pub odometer_insertion: u32,
    pub slot_number: u8,
    pub card_withdrawal_time: Option<TimeReal>,
    pub odometer_withdrawal: u32,
    pub previous_vehicle_nation: u8,
    pub previous_vehicle_reg: VehicleRegistrationNumber,
    pub previous_withdrawal_time: Option<TimeReal>,
}

impl VuCardIWRecord {
    pub const SIZE: usize = 129;

    pub fn parse_chunk(chunk: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(chunk);
        let holder_surname = Name::parse(&mut reader)?;
        let holder_first_names = Name::parse(&mut reader)?;
        let card_number = FullCardNumber::parse_gen2(&mut reader)?;
        let card_expiry = TimeReal::parse(&mut reader)?;
        let card_insertion_time = TimeReal::parse(&mut reader)?;
        let odometer_insertion = reader.read_u24_be()?;
        let slot_number = reader.read_u8()?;
        let card_withdrawal_time = TimeReal::parse(&mut reader)?;
        let odometer_withdrawal = reader.read_u24_be()?;
        let previous_vehicle_nation = reader.read_u8()?;
        let previous_vehicle_reg = VehicleRegistrationNumber::parse(&mut reader)?;
        let previous_withdrawal_time = TimeReal::parse(&mut reader)?;
        Ok(VuCardIWRecord {
            holder_surname,
            holder_first_names,
            card_number,
            card_expiry,
            card_insertion_time,
            odometer_insertion,
            slot_number,
            card_withdrawal_time,
            odometer_withdrawal,
            previous_vehicle_nation,
            previous_vehicle_reg,
            previous_withdrawal_time,
        })
    }
}

/// [VuCalibrationRecord: appendix 2.174.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e25453)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuCalibrationRecord {
    pub calibration_purpose: u8,
    pub workshop_name: Name,
    pub workshop_address: Address,
    pub workshop_card: FullCardNumber,
    pub workshop_card_expiry: Option<TimeReal>,
    pub vin: String,
    pub registration_nation: u8,
    pub registration_number: VehicleRegistrationNumber,
    pub w_vehicle_characteristic_constant: u16,
    pub k_constant_of_recording_equipment: u16,
    pub l_tyre_circumference: u16,
    pub tyre_size: String,
    pub authorised_speed: u8,
    pub odometer_old: u32,
    pub odometer_new: u32,
    pub time_old: Option<TimeReal>,
    pub time_new: Option<TimeReal>,
    pub next_calibration_date: Option<TimeReal>,
}

impl VuCalibrationRecord {
    pub const SIZE: usize = 167;

    pub fn parse_chunk(chunk: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(chunk);
        let calibration_purpose = reader.read_u8()?;
        let workshop_name = Name::parse(&mut reader)?;
        let workshop_address = Address::parse(&mut reader)?;
        let workshop_card = FullCardNumber::parse_gen1(&mut reader)?;
        let workshop_card_expiry = TimeReal::parse(&mut reader)?;
        let vin = reader.read_fixed_str(17)?;
        let registration_nation = reader.read_u8()?;
        let registration_number = VehicleRegistrationNumber::parse(&mut reader)?;
        let w_vehicle_characteristic_constant = reader.read_u16_be()?;
        let k_constant_of_recording_equipment = reader.read_u16_be()?;
        let l_tyre_circumference = reader.read_u16_be()?;
        let tyre_size = reader.read_fixed_str(15)?;
        let authorised_speed = reader.read_u8()?;
        let odometer_old = reader.read_u24_be()?;
        let odometer_new = reader.read_u24_be()?;
        let time_old = TimeReal::parse(&mut reader)?;
        let time_new = TimeReal::parse(&mut reader)?;
        let next_calibration_date = TimeReal::parse(&mut reader)?;
        Ok(VuCalibrationRecord {
            calibration_purpose,
            workshop_name,
            workshop_address,
            workshop_card,
            workshop_card_expiry,
            vin,
            registration_nation,
            registration_number,
            w_vehicle_characteristic_constant,
            k_constant_of_recording_equipment,
            l_tyre_circumference,
            tyre_size,
            authorised_speed,
            odometer_old,
            odometer_new,
            time_old,
            time_new,
            next_calibration_date,
        })
    }
}

/// [SensorPaired: appendix 2.141.](https://eur-lex.europa.eu/legal-content/EN/TXT/PDF/?uri=CELEX:02016R0799-20230821#cons_toc_d1e24259)
///
/// The pairing-time position differs between VU firmwares: some carry an
/// 8-byte OS identifier before it, some only the time, some nothing. The
/// decoder keys on how much of the window remains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VuSensorPairedRecord {
    pub sensor_serial_number: ExtendedSerialNumber,
    pub sensor_approval_number: String,
    pub pairing_time: Option<TimeReal>,
}

impl VuSensorPairedRecord {
    pub fn parse_chunk(chunk: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(chunk);
        let sensor_serial_number = ExtendedSerialNumber::parse(&mut reader)?;
        let sensor_approval_number = reader.read_fixed_str(8)?;

        let remaining = reader.remaining();
        let pairing_time = if remaining >= 12 {
            reader.skip(8)?;
            TimeReal::parse(&mut reader)?
        } else if remaining >= 4 {
            TimeReal::parse(&mut reader)?
        } else {
            None
        };

        Ok(VuSensorPairedRecord {
            sensor_serial_number,
            sensor_approval_number,
            pairing_time,
        })
    }
}

/// One contiguous stretch of a single activity within a day and slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySegment {
    pub date_raw: u32,
    pub date: Option<TimeReal>,
    pub slot: u8,
    pub start_minute: u16,
    pub end_minute: u16,
    pub activity: u8,
    pub card_status: u8,
    pub driving_status: u8,
}

/// One recorded day of a VU activities segment (TREP 0x22).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDay {
    pub date_raw: u32,
    pub date: Option<TimeReal>,
    pub odometer_midnight: Option<u32>,
    pub changes: Vec<ActivityChangeInfo>,
    pub segments: Vec<ActivitySegment>,
    pub card_iw_records: Vec<VuCardIWRecord>,
}
