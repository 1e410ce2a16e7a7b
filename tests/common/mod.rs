//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use chrono::{NaiveDate, NaiveDateTime};
#[allow(unused_imports)]
pub use glucolink::error::ProtocolError;
#[allow(unused_imports)]
pub use glucolink::measurement::{DeviceInfo, Measurement};
#[allow(unused_imports)]
pub use glucolink::packet::{
    AppPacket, Category, DevicePacket, InfoPacket, PacketHeader, ResultPacket, TimingPacket,
    checksum, verify_checksum,
};
#[allow(unused_imports)]
pub use glucolink::protocol::{Canonical, ProtocolVersion};
#[allow(unused_imports)]
pub use glucolink::session::{Clock, Session, SessionCallbacks, SessionState, Transport};
#[allow(unused_imports)]
pub use num_enum::FromPrimitive;

use std::sync::{Arc, Mutex};

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Vec<u8> {
    hex::decode(hex_data).expect("Failed to decode hex")
}

/// Result burst carrying 100 mg/dL stamped 2024-06-01 09:30
#[allow(dead_code)]
pub const RESULT_BURST_100: &[u8] = &[0x55, 0x0B, 0x03, 24, 5, 1, 9, 30, 0, 0x64, 0x00];

/// Result burst carrying 180 mg/dL stamped 2024-06-01 12:15
#[allow(dead_code)]
pub const RESULT_BURST_180: &[u8] = &[0x55, 0x0B, 0x03, 24, 5, 1, 12, 15, 0, 0xB4, 0x00];

/// Info burst with version code 0x42 and client code 0x07
#[allow(dead_code)]
pub const INFO_BURST: &[u8] = &[0x42, 0x05, 0x00, 0x42, 0x07];

/// Burst that parses as neither info nor result, only as a bare device
/// packet - the canonical end-of-transmission marker
#[allow(dead_code)]
pub const END_BURST: &[u8] = &[0xAA, 0x03, 0x00];

/// Fixed timestamp used across tests: 2024-06-01 00:00
#[allow(dead_code)]
pub fn test_stamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .expect("valid date")
        .and_hms_opt(0, 0, 0)
        .expect("valid time")
}

/// Request bytes the canonical version emits for `test_stamp()`
#[allow(dead_code)]
pub const TEST_STAMP_REQUEST: &[u8] = &[0, 0, 0, 24, 5, 1, 0, 0, 32];

/// Clock pinned to a single instant
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Transport that records every outbound burst
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().expect("transport log poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("transport log poisoned").len()
    }
}

impl Transport for RecordingTransport {
    fn send_bytes(&self, bytes: Bytes) {
        self.sent
            .lock()
            .expect("transport log poisoned")
            .push(bytes.to_vec());
    }
}

/// Callback sink that records every notification
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct RecordingCallbacks {
    infos: Arc<Mutex<Vec<DeviceInfo>>>,
    countdowns: Arc<Mutex<Vec<u8>>>,
    batches: Arc<Mutex<Vec<Vec<Measurement>>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RecordingCallbacks {
    pub fn infos(&self) -> Vec<DeviceInfo> {
        self.infos.lock().expect("callback log poisoned").clone()
    }

    pub fn countdowns(&self) -> Vec<u8> {
        self.countdowns.lock().expect("callback log poisoned").clone()
    }

    pub fn batches(&self) -> Vec<Vec<Measurement>> {
        self.batches.lock().expect("callback log poisoned").clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("callback log poisoned").clone()
    }
}

impl SessionCallbacks for RecordingCallbacks {
    fn on_device_info_received(&self, info: DeviceInfo) {
        self.infos.lock().expect("callback log poisoned").push(info);
    }

    fn on_countdown_received(&self, seconds_remaining: u8) {
        self.countdowns
            .lock()
            .expect("callback log poisoned")
            .push(seconds_remaining);
    }

    fn on_measurements_received(&self, measurements: Vec<Measurement>) {
        self.batches
            .lock()
            .expect("callback log poisoned")
            .push(measurements);
    }

    fn on_protocol_error(&self, message: &str) {
        self.errors
            .lock()
            .expect("callback log poisoned")
            .push(message.to_string());
    }
}

/// Version that accepts timing packets structurally, like field units
/// that report a countdown while the strip is measuring
#[allow(dead_code)]
#[derive(Debug, Default, Clone, Copy)]
pub struct TimedVersion;

impl ProtocolVersion for TimedVersion {
    fn label(&self) -> &str {
        "timed-test"
    }

    fn parse_timing(&self, raw: &[u8]) -> Result<TimingPacket, ProtocolError> {
        TimingPacket::try_from(raw)
    }
}

/// Version whose info packets must carry a 0x42 start code, so result
/// packets are not mistaken for info replies
#[allow(dead_code)]
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictInfoVersion;

impl ProtocolVersion for StrictInfoVersion {
    fn label(&self) -> &str {
        "strict-info-test"
    }

    fn parse_info(&self, raw: &[u8]) -> Result<InfoPacket, ProtocolError> {
        let packet = InfoPacket::try_from(raw)?;
        if packet.header.start_code != 0x42 {
            return Err(ProtocolError::IllegalContent(format!(
                "info start code must be 0x42, got {:#04x}",
                packet.header.start_code
            )));
        }
        Ok(packet)
    }
}

/// Install a fmt subscriber once so failing session tests show the
/// session's own log output
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
