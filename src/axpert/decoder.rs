use crate::axpert::packet::TERMINATOR;

use enum_dispatch::*;
use serde::Serialize;

/// Trailing checksum bytes in front of the terminator.
const CHECKSUM_LEN: usize = 2;

/// Turns a raw response payload into a structured record.
///
/// Decoders never fail: an empty payload gives `None`, and anything that
/// can't be parsed inside a non-empty payload is zeroed rather than
/// rejected.
#[enum_dispatch]
pub trait Decode {
    fn decode(&self, raw: &[u8]) -> Option<Record>;
}

#[enum_dispatch(Decode)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decoder {
    Status(StatusDecoder),
    Settings(SettingsDecoder),
    OperationMode(OperationModeDecoder),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Status(StatusRecord),
    Settings(SettingsRecord),
    OperationMode(OperationMode),
}

// Fields {{{
/// Space separated values between the leading `(` and the checksum.
struct Fields {
    tokens: std::vec::IntoIter<String>,
}

impl Fields {
    fn new(raw: &[u8]) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }

        let tokens: Vec<String> = String::from_utf8_lossy(Self::payload(raw))
            .split(' ')
            .map(|t| t.trim_matches(|c: char| c.is_control()).to_string())
            .collect();

        Some(Self {
            tokens: tokens.into_iter(),
        })
    }

    // strips `(`, NUL padding, `\r` and the two checksum bytes
    fn payload(raw: &[u8]) -> &[u8] {
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let mut data = &raw[..end];

        if let Some((&TERMINATOR, rest)) = data.split_last() {
            data = &rest[..rest.len().saturating_sub(CHECKSUM_LEN)];
        }

        data.strip_prefix(b"(").unwrap_or(data)
    }

    fn string(&mut self) -> String {
        self.tokens.next().unwrap_or_default()
    }

    fn float(&mut self) -> f64 {
        to_float(&self.string())
    }

    fn int(&mut self) -> i64 {
        to_int(&self.string())
    }
}

/// Two decimal float; `NA`, blanks and garbage become 0.
fn to_float(token: &str) -> f64 {
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => (v * 100.0).round() / 100.0,
        _ => 0.0,
    }
}

fn to_int(token: &str) -> i64 {
    token
        .parse::<i64>()
        .ok()
        .or_else(|| {
            token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64)
        })
        .unwrap_or(0)
} // }}}

// DeviceStatusBits {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ChargeSource {
    #[serde(rename = "ac_charging")]
    Ac,
    #[serde(rename = "solar_charging")]
    Solar,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStatusBits {
    pub charge_source: Vec<ChargeSource>,
    pub batt_volt_to_steady: bool,
    pub load_status: bool,
    pub ssc_firmware_updated: bool,
    pub configuration_changed: bool,
    pub sbu_priority_version: bool,
}

impl DeviceStatusBits {
    const CHARGE_SOURCES: [(u8, ChargeSource); 2] =
        [(0b101, ChargeSource::Ac), (0b110, ChargeSource::Solar)];

    /// Parses the 8 character binary status string. Anything shorter, or
    /// containing characters other than `0`/`1`, gives `None`. Longer input
    /// is read by its low 8 bits.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() < 8 || !raw.bytes().all(|b| b == b'0' || b == b'1') {
            return None;
        }

        let bits = u8::from_str_radix(&raw[raw.len() - 8..], 2).ok()?;

        Some(Self {
            charge_source: Self::CHARGE_SOURCES
                .iter()
                .filter(|(mask, _)| bits & mask == *mask)
                .map(|(_, source)| *source)
                .collect(),
            batt_volt_to_steady: Self::is_bit_set(bits, 1 << 3),
            load_status: Self::is_bit_set(bits, 1 << 4),
            ssc_firmware_updated: Self::is_bit_set(bits, 1 << 5),
            configuration_changed: Self::is_bit_set(bits, 1 << 6),
            sbu_priority_version: Self::is_bit_set(bits, 1 << 7),
        })
    }

    fn is_bit_set(data: u8, mask: u8) -> bool {
        (data & mask) == mask
    }
} // }}}

// StatusRecord (QPIGS) {{{
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusDecoder;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusRecord {
    pub grid_volt: f64,
    pub grid_freq: f64,
    pub ac_volt: f64,
    pub ac_freq: f64,
    pub ac_va: i64,
    pub ac_watt: i64,
    pub load_percent: i64,
    pub bus_volt: i64,
    pub batt_volt: f64,
    pub batt_charge_amps: i64,
    pub batt_capacity: i64,
    pub temp: i64,
    pub pv_amps: i64,
    pub pv_volts: f64,
    pub batt_volt_scc: f64,
    pub batt_discharge_amps: i64,
    pub raw_status: String,
    pub mask_b: String,
    pub mask_c: String,
    pub pv_watts: i64,
    pub mask_d: String,

    #[serde(flatten)]
    pub device_status: Option<DeviceStatusBits>,
}

impl StatusRecord {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let mut f = Fields::new(raw)?;

        // field order is the wire order
        let mut record = Self {
            grid_volt: f.float(),
            grid_freq: f.float(),
            ac_volt: f.float(),
            ac_freq: f.float(),
            ac_va: f.int(),
            ac_watt: f.int(),
            load_percent: f.int(),
            bus_volt: f.int(),
            batt_volt: f.float(),
            batt_charge_amps: f.int(),
            batt_capacity: f.int(),
            temp: f.int(),
            pv_amps: f.int(),
            pv_volts: f.float(),
            batt_volt_scc: f.float(),
            batt_discharge_amps: f.int(),
            raw_status: f.string(),
            mask_b: f.string(),
            mask_c: f.string(),
            pv_watts: f.int(),
            mask_d: f.string(),
            device_status: None,
        };

        // a truncated response reads as "no flags set"
        record.device_status = if record.raw_status.is_empty() {
            DeviceStatusBits::parse("00000000")
        } else {
            DeviceStatusBits::parse(&record.raw_status)
        };

        Some(record)
    }
}

impl Decode for StatusDecoder {
    fn decode(&self, raw: &[u8]) -> Option<Record> {
        StatusRecord::parse(raw).map(Record::Status)
    }
} // }}}

// SettingsRecord (QPIRI) {{{
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettingsDecoder;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SettingsRecord {
    pub grid_volt_rating: f64,
    pub grid_current_rating: f64,
    pub ac_volt_rating: f64,
    pub ac_freq_rating: f64,
    pub ac_amps_rating: f64,
    pub ac_va_rating: i64,
    pub ac_watt_rating: i64,
    pub batt_rating: f64,
    pub batt_recharge_volt: f64,
    pub batt_under_volt: f64,
    pub batt_bulk_volt: f64,
    pub batt_float_volt: f64,
    pub batt_type: i64,
    pub max_grid_charge_current: i64,
    pub max_charge_current: i64,
    pub in_volt_range: i64,
    pub out_source_priority: i64,
    pub charger_source_priority: i64,
    pub machine_type: i64,
    pub topology: i64,
    pub out_mode: i64,
    pub batt_redischarge_volt: f64,
}

impl SettingsRecord {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let mut f = Fields::new(raw)?;

        Some(Self {
            grid_volt_rating: f.float(),
            grid_current_rating: f.float(),
            ac_volt_rating: f.float(),
            ac_freq_rating: f.float(),
            ac_amps_rating: f.float(),
            ac_va_rating: f.int(),
            ac_watt_rating: f.int(),
            batt_rating: f.float(),
            batt_recharge_volt: f.float(),
            batt_under_volt: f.float(),
            batt_bulk_volt: f.float(),
            batt_float_volt: f.float(),
            batt_type: f.int(),
            max_grid_charge_current: f.int(),
            max_charge_current: f.int(),
            in_volt_range: f.int(),
            out_source_priority: f.int(),
            charger_source_priority: f.int(),
            machine_type: f.int(),
            topology: f.int(),
            out_mode: f.int(),
            batt_redischarge_volt: f.float(),
        })
    }

    /// `(bulk, float)` charge voltages, if the inverter reported both.
    pub fn charge_voltages(&self) -> Option<(f64, f64)> {
        if self.batt_bulk_volt > 0.0 && self.batt_float_volt > 0.0 {
            Some((self.batt_bulk_volt, self.batt_float_volt))
        } else {
            None
        }
    }
}

impl Decode for SettingsDecoder {
    fn decode(&self, raw: &[u8]) -> Option<Record> {
        SettingsRecord::parse(raw).map(Record::Settings)
    }
} // }}}

// OperationMode (QMOD) {{{
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationModeDecoder;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OperationMode {
    pub mode: &'static str,
}

impl OperationMode {
    pub const UNKNOWN: &'static str = "00";

    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }

        let mode = match raw.get(1) {
            Some(b'P') => "PM", // power on
            Some(b'S') => "SB", // standby
            Some(b'L') => "LN", // line
            Some(b'B') => "BT", // battery
            Some(b'F') => "FA", // fault
            Some(b'H') => "PS", // power saving
            _ => Self::UNKNOWN,
        };

        Some(Self { mode })
    }
}

impl Decode for OperationModeDecoder {
    fn decode(&self, raw: &[u8]) -> Option<Record> {
        OperationMode::parse(raw).map(Record::OperationMode)
    }
} // }}}
