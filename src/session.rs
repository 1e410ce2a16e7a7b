use crate::constants::{MAX_RETRIES, RETRY_DELAY};
use crate::error::ProtocolError;
use crate::measurement::{DeviceInfo, Measurement};
use crate::packet::ResultPacket;
use crate::protocol::ProtocolVersion;
use bytes::Bytes;
use chrono::NaiveDateTime;
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where the session is in the polling handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Disconnected,
    WaitingInfoPacket,
    WaitingMeasurement,
    WaitingResultOrEndPacket,
}

/// Byte-stream transport the session writes to.
pub trait Transport: Send + Sync + 'static {
    /// Fire-and-forget transmission request; the session never observes
    /// a result.
    fn send_bytes(&self, bytes: Bytes);
}

/// Application-facing notifications raised by the session.
pub trait SessionCallbacks: Send + Sync + 'static {
    fn on_device_info_received(&self, info: DeviceInfo);
    fn on_countdown_received(&self, seconds_remaining: u8);
    fn on_measurements_received(&self, measurements: Vec<Measurement>);
    fn on_protocol_error(&self, message: &str);
}

/// Source of the timestamps stamped onto outbound packets.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// Wall-clock time in the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

struct SessionShared {
    version: Box<dyn ProtocolVersion>,
    transport: Box<dyn Transport>,
    callbacks: Box<dyn SessionCallbacks>,
    clock: Box<dyn Clock>,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    state: SessionState,
    retries_on_current_packet: u8,
    pending_results: Vec<ResultPacket>,
    retry_timer: Option<JoinHandle<()>>,
    // Bumped on every cancel; a fired timer that lost the race for the
    // lock sees a stale generation and backs off.
    timer_generation: u64,
}

impl SessionInner {
    fn cancel_retry_timer(&mut self) {
        self.timer_generation += 1;
        if let Some(handle) = self.retry_timer.take() {
            handle.abort();
        }
    }
}

/// Drives one device's handshake/measurement/termination lifecycle.
///
/// All state mutation is funneled through one mutex: inbound bursts,
/// manual requests and timer-driven retries never run concurrently for
/// the same session. A `Session` is a cheap cloneable handle; clones
/// share the same underlying state.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    pub fn new(
        version: impl ProtocolVersion + 'static,
        transport: impl Transport,
        callbacks: impl SessionCallbacks,
    ) -> Self {
        Self::with_clock(version, transport, callbacks, SystemClock)
    }

    pub fn with_clock(
        version: impl ProtocolVersion + 'static,
        transport: impl Transport,
        callbacks: impl SessionCallbacks,
        clock: impl Clock,
    ) -> Self {
        Session {
            shared: Arc::new(SessionShared {
                version: Box::new(version),
                transport: Box::new(transport),
                callbacks: Box::new(callbacks),
                clock: Box::new(clock),
                inner: Mutex::new(SessionInner {
                    state: SessionState::Disconnected,
                    retries_on_current_packet: 0,
                    pending_results: Vec::new(),
                    retry_timer: None,
                    timer_generation: 0,
                }),
            }),
        }
    }

    /// Opens the polling handshake. No-op unless currently disconnected.
    pub async fn connect(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != SessionState::Disconnected {
            return;
        }
        info!("connecting, protocol {}", self.shared.version.label());
        inner.state = SessionState::WaitingInfoPacket;
        inner.retries_on_current_packet = 0;
        let handshake = self.shared.version.build_handshake();
        if !handshake.is_empty() {
            self.shared.transport.send_bytes(handshake);
        }
        self.send_current_request(&mut inner, true);
    }

    /// Skips the info handshake and asks for stored measurements
    /// directly. Used by protocol versions whose devices do not answer
    /// the info request.
    ///
    /// Returns `true` once exclusive access to the session was obtained
    /// and the request was handed to the transport; cancelling the
    /// future while it waits for the session aborts without side
    /// effects.
    pub async fn request_measurements(&self) -> bool {
        let mut inner = self.shared.inner.lock().await;
        let request = self
            .shared
            .version
            .build_measurement_request(self.shared.clock.now());
        self.shared
            .transport
            .send_bytes(request.encode(self.shared.version.checksum_width()));
        inner.state = SessionState::WaitingResultOrEndPacket;
        inner.retries_on_current_packet = 0;
        self.arm_retry_timer(&mut inner);
        true
    }

    /// Cancels any pending retry and drops back to `Disconnected`.
    /// Idempotent; an in-flight transport send is not aborted, but its
    /// eventual response is ignored.
    pub async fn disconnect(&self) {
        let mut inner = self.shared.inner.lock().await;
        inner.cancel_retry_timer();
        inner.state = SessionState::Disconnected;
    }

    /// Feeds one inbound burst to the state machine. One burst is
    /// treated as one packet attempt; reassembly is the transport's
    /// concern.
    pub async fn on_data_received(&self, raw: &[u8]) {
        let mut inner = self.shared.inner.lock().await;
        inner.cancel_retry_timer();
        match inner.state {
            SessionState::Disconnected => {
                debug!("burst of {} bytes ignored while disconnected", raw.len());
            }
            SessionState::WaitingInfoPacket => self.handle_waiting_info(&mut inner, raw),
            SessionState::WaitingMeasurement => self.handle_waiting_measurement(&mut inner, raw),
            SessionState::WaitingResultOrEndPacket => {
                self.handle_waiting_result_or_end(&mut inner, raw)
            }
        }
    }

    /// Current protocol state, for diagnostics.
    pub async fn state(&self) -> SessionState {
        self.shared.inner.lock().await.state
    }

    /// Send attempts consumed for the packet currently awaited.
    pub async fn retry_count(&self) -> u8 {
        self.shared.inner.lock().await.retries_on_current_packet
    }

    /// Number of results collected but not yet flushed to the caller.
    pub async fn pending_result_count(&self) -> usize {
        self.shared.inner.lock().await.pending_results.len()
    }

    fn handle_waiting_info(&self, inner: &mut SessionInner, raw: &[u8]) {
        match self.shared.version.parse_info(raw) {
            Ok(info_packet) => {
                inner.retries_on_current_packet = 0;
                inner.state = SessionState::WaitingMeasurement;
                debug!(
                    "device info received, version_code={:#04x} client_code={:#04x}",
                    info_packet.version_code, info_packet.client_code
                );
                self.shared
                    .callbacks
                    .on_device_info_received(DeviceInfo::from(&info_packet));
            }
            // The device may already be streaming results.
            Err(info_err) => match self.shared.version.parse_result(raw) {
                Ok(result) => {
                    inner.retries_on_current_packet = 0;
                    inner.pending_results.push(result);
                    inner.state = SessionState::WaitingResultOrEndPacket;
                    self.send_current_request(inner, false);
                }
                Err(result_err) => {
                    warn!(
                        "wrong packet received while waiting for info packet ({info_err}; {result_err})"
                    );
                }
            },
        }
    }

    fn handle_waiting_measurement(&self, inner: &mut SessionInner, raw: &[u8]) {
        match self.shared.version.parse_timing(raw) {
            Ok(timing) => {
                inner.retries_on_current_packet = 0;
                let remaining = timing.countdown();
                if remaining == 0 {
                    inner.state = SessionState::WaitingResultOrEndPacket;
                }
                self.shared.callbacks.on_countdown_received(remaining);
            }
            Err(err) => {
                warn!("wrong packet received while waiting for timing packet ({err})");
            }
        }
    }

    fn handle_waiting_result_or_end(&self, inner: &mut SessionInner, raw: &[u8]) {
        match self.shared.version.parse_result(raw) {
            Ok(result) => {
                inner.retries_on_current_packet = 0;
                inner.pending_results.push(result);
                // The device keeps streaming; ask for the next record
                // without re-arming the retry timer.
                self.send_current_request(inner, false);
            }
            Err(result_err) => match self.shared.version.parse_end(raw) {
                Ok(_) => {
                    inner.retries_on_current_packet = 0;
                    if !inner.pending_results.is_empty() {
                        let measurements: Vec<Measurement> =
                            inner.pending_results.iter().map(Measurement::from).collect();
                        inner.pending_results.clear();
                        debug!("end of transmission, flushing {} records", measurements.len());
                        self.shared.callbacks.on_measurements_received(measurements);
                    }
                    inner.state = SessionState::WaitingMeasurement;
                }
                Err(end_err) => {
                    warn!(
                        "wrong packet received while waiting for result or end packet ({result_err}; {end_err})"
                    );
                }
            },
        }
    }

    /// Shared send/retry entry point, invoked by state entry actions and
    /// by timer expiry. `arm` is false when a result arrival triggers
    /// the next request.
    fn send_current_request(&self, inner: &mut SessionInner, arm: bool) {
        if inner.retries_on_current_packet >= MAX_RETRIES {
            inner.retries_on_current_packet = 0;
            inner.cancel_retry_timer();
            inner.state = SessionState::Disconnected;
            error!("max retries reached, dropping connection");
            self.shared
                .callbacks
                .on_protocol_error(&ProtocolError::RetriesExhausted.to_string());
            return;
        }
        inner.retries_on_current_packet += 1;
        let width = self.shared.version.checksum_width();
        match inner.state {
            SessionState::WaitingInfoPacket => {
                let request = self.shared.version.build_info_request(self.shared.clock.now());
                self.shared.transport.send_bytes(request.encode(width));
                self.arm_retry_timer(inner);
            }
            SessionState::WaitingResultOrEndPacket => {
                let request = self
                    .shared
                    .version
                    .build_measurement_request(self.shared.clock.now());
                self.shared.transport.send_bytes(request.encode(width));
                if arm {
                    self.arm_retry_timer(inner);
                }
            }
            // The device drives countdown updates unsolicited; there is
            // nothing to send and nothing to retry.
            SessionState::Disconnected | SessionState::WaitingMeasurement => {}
        }
    }

    fn arm_retry_timer(&self, inner: &mut SessionInner) {
        inner.cancel_retry_timer();
        let generation = inner.timer_generation;
        let session = self.clone();
        inner.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY).await;
            let mut inner = session.shared.inner.lock().await;
            if inner.timer_generation != generation {
                return;
            }
            debug!(
                "retry timer fired in state {}, attempt {}",
                inner.state, inner.retries_on_current_packet
            );
            session.send_current_request(&mut inner, true);
        }));
    }
}
