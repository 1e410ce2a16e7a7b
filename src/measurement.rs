use crate::constants::MG_DL_PER_MMOL_L;
use crate::packet::{InfoPacket, ResultPacket};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device identity reported during the connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub version_code: u8,
    pub client_code: u8,
}

impl From<&InfoPacket> for DeviceInfo {
    fn from(packet: &InfoPacket) -> Self {
        DeviceInfo {
            version_code: packet.version_code,
            client_code: packet.client_code,
        }
    }
}

/// A completed glucose reading in caller-facing units.
///
/// Immutable once constructed; the session hands batches of these to the
/// application when the device signals end of transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Glucose concentration in mmol/L.
    pub glucose_mmol_l: f64,
    /// Four-digit year.
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    /// Hex dump of the declared packet bytes, kept for diagnostics.
    pub raw: String,
}

impl From<&ResultPacket> for Measurement {
    fn from(packet: &ResultPacket) -> Self {
        let fields = &packet.fields;
        Measurement {
            glucose_mmol_l: f64::from(packet.glucose_mg_dl()) / MG_DL_PER_MMOL_L,
            year: 2000 + u16::from(fields.year),
            month: fields.month,
            day: fields.day,
            hour: fields.hour,
            minute: fields.min,
            raw: hex::encode(packet.field_bytes()),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} mmol/L at {:04}-{:02}-{:02} {:02}:{:02}",
            self.glucose_mmol_l, self.year, self.month, self.day, self.hour, self.minute
        )
    }
}
