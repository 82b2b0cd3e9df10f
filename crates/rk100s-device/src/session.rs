//! Device Session: port lifecycle plus async request/response
//! correlation against a device that only speaks back via unsolicited
//! SysEx callbacks.
//!
//! Generalizes `eldad-mpk-mini-ctl::util::midi_in_connect`/
//! `midi_out_connect`'s port-matching-and-callback idiom from a
//! blocking single-purpose tool to an async session that a foreground
//! caller can `pull_slot` against while a background worker owns the
//! actual MIDI callback thread (per the concurrency split this module
//! is built against).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rk100s_proto::sysex::Codec;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::transport::OutputSink;

/// Name fragment used to recognize the device among the system's MIDI
/// ports. Matching is substring, case-sensitive, as the device always
/// reports its own name verbatim through `midir`.
pub const DEVICE_NAME_FRAGMENT: &str = "RK-100S";

const DEFAULT_PULL_DEADLINE_MS: u64 = 2000;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device is not connected")]
    NotConnected,
    #[error("a pull_slot request is already in flight")]
    RequestInFlight,
    #[error("no response within the deadline")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Sysex(#[from] rk100s_proto::sysex::SysexError),
}

struct PendingRequest {
    sender: oneshot::Sender<Vec<u8>>,
}

struct Shared {
    codec: Codec,
    channel: u8,
    output: Mutex<Option<Box<dyn OutputSink + Send>>>,
    pending: Mutex<Option<PendingRequest>>,
    connected: AtomicBool,
    /// Kept alive only to hold the `midir` input port open; the session
    /// never reads from it directly, `handle_incoming` is reached via
    /// the callback registered in [`DeviceSession::connect`].
    input_conn: Mutex<Option<midir::MidiInputConnection<()>>>,
}

/// Cheaply cloneable handle to a device session; clones share the same
/// underlying connection state, so the MIDI input callback can hold one
/// independently of the foreground caller.
#[derive(Clone)]
pub struct DeviceSession {
    shared: Arc<Shared>,
}

impl DeviceSession {
    pub fn new(codec: Codec, channel: u8) -> Self {
        Self {
            shared: Arc::new(Shared {
                codec,
                channel,
                output: Mutex::new(None),
                pending: Mutex::new(None),
                connected: AtomicBool::new(false),
                input_conn: Mutex::new(None),
            }),
        }
    }

    /// Open a real `midir` input+output pair at `port_index` and start
    /// routing the input's unsolicited SysEx callback into
    /// [`Self::handle_incoming`]. `port_name` is only used for the
    /// client-facing connection name `midir` requires.
    pub fn connect(&self, port_index: usize, port_name: &str) -> Result<(), DeviceError> {
        let midi_out = midir::MidiOutput::new("rk100s-session-out")
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        let out_ports = midi_out.ports();
        let out_port = out_ports
            .get(port_index)
            .ok_or_else(|| DeviceError::Transport(format!("no output port at index {port_index}")))?;
        let out_conn = midi_out
            .connect(out_port, port_name)
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        let midi_in = midir::MidiInput::new("rk100s-session-in")
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        let in_ports = midi_in.ports();
        let in_port = in_ports
            .get(port_index)
            .ok_or_else(|| DeviceError::Transport(format!("no input port at index {port_index}")))?;

        let session_for_callback = self.clone();
        let in_conn = midi_in
            .connect(
                in_port,
                port_name,
                move |_timestamp_us, message, _| {
                    session_for_callback.handle_incoming(message);
                },
                (),
            )
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        *self.shared.output.lock() = Some(Box::new(out_conn));
        *self.shared.input_conn.lock() = Some(in_conn);
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Enumerate MIDI input port names visible to the system.
    pub fn list_ports() -> Result<Vec<String>, DeviceError> {
        let midi_in = midir::MidiInput::new("rk100s-device-enum")
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        midi_in
            .ports()
            .iter()
            .map(|p| {
                midi_in
                    .port_name(p)
                    .map_err(|e| DeviceError::Transport(e.to_string()))
            })
            .collect()
    }

    /// Index of the first port whose name contains [`DEVICE_NAME_FRAGMENT`].
    pub fn find_device(port_names: &[String]) -> Option<usize> {
        port_names
            .iter()
            .position(|name| name.contains(DEVICE_NAME_FRAGMENT))
    }

    /// Install a transport directly, bypassing `midir`. Used by tests
    /// and by any caller that already owns an open port.
    pub fn attach_output(&self, sink: Box<dyn OutputSink + Send>) {
        *self.shared.output.lock() = Some(sink);
        self.shared.connected.store(true, Ordering::Release);
    }

    pub fn disconnect(&self) {
        *self.shared.output.lock() = None;
        *self.shared.input_conn.lock() = None;
        *self.shared.pending.lock() = None;
        self.shared.connected.store(false, Ordering::Release);
    }

    /// Feed inbound bytes from the device's unsolicited SysEx callback.
    /// If a `pull_slot` is waiting, and the bytes parse as a program
    /// dump, wakes it with the raw payload. Otherwise logged and
    /// dropped: unsolicited dumps outside a pending pull are not this
    /// session's concern.
    pub fn handle_incoming(&self, bytes: &[u8]) {
        trace!(len = bytes.len(), "inbound sysex");
        let payload = match self.shared.codec.parse_program_dump(bytes) {
            Ok(p) => p.to_vec(),
            Err(_) => {
                trace!("inbound bytes did not parse as a program dump, dropping");
                return;
            }
        };
        let pending = self.shared.pending.lock().take();
        if let Some(pending) = pending {
            debug!(len = payload.len(), "resolved pending pull_slot");
            let _ = pending.sender.send(payload);
        }
    }

    fn send_raw(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut guard = self.shared.output.lock();
        match guard.as_mut() {
            Some(sink) => sink.send(bytes),
            None => Err(DeviceError::NotConnected),
        }
    }

    pub fn send(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.send_raw(bytes)
    }

    pub fn send_nrpn(&self, channel: u8, msb: u8, lsb: u8, value: u8) -> Result<(), DeviceError> {
        let status = 0xB0 | (channel.wrapping_sub(1) & 0x0F);
        let bytes = [
            status,
            99,
            msb & 0x7F,
            status,
            98,
            lsb & 0x7F,
            status,
            6,
            value & 0x7F,
        ];
        self.send_raw(&bytes)
    }

    pub fn send_cc(&self, channel: u8, cc: u8, value: u8) -> Result<(), DeviceError> {
        let status = 0xB0 | (channel.wrapping_sub(1) & 0x0F);
        self.send_raw(&[status, cc & 0x7F, value & 0x7F])
    }

    pub fn send_note_on(&self, channel: u8, note: u8, velocity: u8) -> Result<(), DeviceError> {
        let status = 0x90 | (channel.wrapping_sub(1) & 0x0F);
        self.send_raw(&[status, note & 0x7F, velocity & 0x7F])
    }

    pub fn send_note_off(&self, channel: u8, note: u8) -> Result<(), DeviceError> {
        let status = 0x80 | (channel.wrapping_sub(1) & 0x0F);
        self.send_raw(&[status, note & 0x7F, 0])
    }

    /// Request the program stored at `slot`, waiting up to
    /// `deadline_ms` for the device's unsolicited reply. Only one
    /// `pull_slot` may be in flight at a time; a concurrent call fails
    /// immediately with [`DeviceError::RequestInFlight`] rather than
    /// queuing behind the first.
    pub async fn pull_slot(&self, slot: u8, deadline_ms: u64) -> Result<Vec<u8>, DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock();
            if pending.is_some() {
                return Err(DeviceError::RequestInFlight);
            }
            *pending = Some(PendingRequest { sender: tx });
        }

        let request = self.shared.codec.program_dump_request(self.shared.channel, slot);
        if let Err(e) = self.send_raw(&request) {
            self.shared.pending.lock().take();
            return Err(e);
        }

        let result = tokio::time::timeout(Duration::from_millis(deadline_ms), rx).await;
        self.shared.pending.lock().take();

        match result {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => {
                warn!("pending sender dropped without a response");
                Err(DeviceError::Timeout)
            }
            Err(_) => Err(DeviceError::Timeout),
        }
    }

    pub async fn pull_slot_default(&self, slot: u8) -> Result<Vec<u8>, DeviceError> {
        self.pull_slot(slot, DEFAULT_PULL_DEADLINE_MS).await
    }

    /// Pull `start..=end` one slot at a time (never concurrently),
    /// collecting each outcome rather than aborting on the first error.
    pub async fn pull_range(
        &self,
        start: u8,
        end: u8,
        deadline_each_ms: u64,
    ) -> Vec<(u8, Result<Vec<u8>, DeviceError>)> {
        let mut out = Vec::new();
        for slot in start..=end {
            let result = self.pull_slot(slot, deadline_each_ms).await;
            out.push((slot, result));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingSink;

    fn session_with_mock() -> (DeviceSession, Codec) {
        let codec = Codec::default();
        let session = DeviceSession::new(codec, 1);
        session.attach_output(Box::new(RecordingSink::default()));
        (session, codec)
    }

    fn session_with_recording_sink() -> (DeviceSession, RecordingSink) {
        let session = DeviceSession::new(Codec::default(), 1);
        let sink = RecordingSink::default();
        session.attach_output(Box::new(sink.clone()));
        (session, sink)
    }

    #[test]
    fn find_device_matches_name_fragment() {
        let ports = vec![
            "Midi Through Port-0".to_string(),
            "RK-100S 2 MIDI 1".to_string(),
            "Some Other Synth".to_string(),
        ];
        assert_eq!(DeviceSession::find_device(&ports), Some(1));

        let no_match = vec!["Midi Through Port-0".to_string()];
        assert_eq!(DeviceSession::find_device(&no_match), None);
    }

    #[tokio::test]
    async fn not_connected_before_attach() {
        let session = DeviceSession::new(Codec::default(), 1);
        assert!(!session.is_connected());
        let err = session.send(&[0xF0]).unwrap_err();
        assert!(matches!(err, DeviceError::NotConnected));
    }

    #[tokio::test]
    async fn pull_slot_times_out_without_a_reply() {
        let (session, _codec) = session_with_mock();
        let err = session.pull_slot(5, 20).await.unwrap_err();
        assert!(matches!(err, DeviceError::Timeout));
    }

    #[tokio::test]
    async fn pull_slot_resolves_from_handle_incoming() {
        let (session, codec) = session_with_mock();
        let responder = session.clone();
        let handle = tokio::spawn(async move { responder.pull_slot(5, 2000).await });

        // give pull_slot a chance to register its pending request
        tokio::time::sleep(Duration::from_millis(20)).await;

        let dump = codec.build_program_write(1, b"hello world payload");
        session.handle_incoming(&dump);

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, b"hello world payload");
    }

    #[tokio::test]
    async fn concurrent_pull_slot_fails_fast() {
        let (session, _codec) = session_with_mock();
        let first = session.clone();
        let first_handle = tokio::spawn(async move { first.pull_slot(1, 200).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second_result = session.pull_slot(2, 200).await;
        assert!(matches!(second_result, Err(DeviceError::RequestInFlight)));

        let _ = first_handle.await.unwrap();
    }

    #[tokio::test]
    async fn note_and_cc_helpers_mask_to_seven_bits() {
        let (session, sink) = session_with_recording_sink();
        session.send_note_on(1, 200, 255).unwrap();
        session.send_cc(1, 200, 255).unwrap();
        session.send_nrpn(1, 200, 200, 255).unwrap();

        let sent = sink.sent.lock();
        assert_eq!(sent[0], vec![0x90, 72, 127]);
        assert_eq!(sent[1], vec![0xB0, 72, 127]);
        assert_eq!(sent[2], vec![0xB0, 99, 72, 0xB0, 98, 72, 0xB0, 6, 127]);
    }

    #[tokio::test]
    async fn channel_is_a_per_call_parameter_not_session_state() {
        let (session, sink) = session_with_recording_sink();
        session.send_cc(3, 7, 100).unwrap();
        session.send_note_on(3, 60, 100).unwrap();
        session.send_note_off(3, 60).unwrap();

        let sent = sink.sent.lock();
        assert_eq!(sent[0][0], 0xB2);
        assert_eq!(sent[1][0], 0x92);
        assert_eq!(sent[2][0], 0x82);
    }
}
