use crate::error::ProtocolError;
use crate::packet::{AppPacket, DevicePacket, InfoPacket, ResultPacket, TimingPacket};
use bytes::Bytes;
use chrono::NaiveDateTime;

/// Builder and parser hooks a concrete protocol version provides.
///
/// The session holds some implementation of this trait and stays
/// version-agnostic: a version may reshape any packet kind, but every
/// parser hook must keep the `IllegalLength`/`IllegalContent` error
/// contract so the session's recovery logic is unaffected.
pub trait ProtocolVersion: Send + Sync {
    /// Version label used in logs and error messages.
    fn label(&self) -> &str;

    /// Width in bytes of the trailing checksum on outbound packets.
    fn checksum_width(&self) -> usize {
        1
    }

    /// Builds the request that asks the device to identify itself.
    fn build_info_request(&self, stamp: NaiveDateTime) -> AppPacket {
        AppPacket::new(stamp)
    }

    /// Builds the request for the next stored measurement.
    fn build_measurement_request(&self, stamp: NaiveDateTime) -> AppPacket {
        AppPacket::new(stamp)
    }

    /// Preamble sent once when the connection opens. Empty for most
    /// versions.
    fn build_handshake(&self) -> Bytes {
        Bytes::new()
    }

    fn parse_timing(&self, raw: &[u8]) -> Result<TimingPacket, ProtocolError> {
        let _ = raw;
        Err(ProtocolError::IllegalContent(format!(
            "protocol {} does not support timing packets",
            self.label()
        )))
    }

    fn parse_info(&self, raw: &[u8]) -> Result<InfoPacket, ProtocolError> {
        InfoPacket::try_from(raw)
    }

    fn parse_result(&self, raw: &[u8]) -> Result<ResultPacket, ProtocolError> {
        ResultPacket::try_from(raw)
    }

    /// Any structurally valid device packet terminates a transfer unless
    /// the version narrows this down.
    fn parse_end(&self, raw: &[u8]) -> Result<DevicePacket, ProtocolError> {
        DevicePacket::try_from(raw)
    }
}

/// The canonical single-byte-checksum protocol version.
#[derive(Debug, Default, Clone, Copy)]
pub struct Canonical;

impl ProtocolVersion for Canonical {
    fn label(&self) -> &str {
        "canonical"
    }
}
