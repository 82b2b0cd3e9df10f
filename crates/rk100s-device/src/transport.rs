//! Abstraction over "a thing bytes can be sent to", so the session logic
//! can be exercised against a mock in tests without opening a real MIDI
//! port (grounded in `eldad-mpk-mini-ctl`'s `midi_out_connect`, which
//! wraps the same `midir::MidiOutputConnection::send` call this trait's
//! real implementation forwards to).

use crate::DeviceError;

pub trait OutputSink: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<(), DeviceError>;
}

impl OutputSink for midir::MidiOutputConnection {
    fn send(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        midir::MidiOutputConnection::send(self, bytes)
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }
}

/// Records every message handed to it, for assertions in tests. Shares
/// its buffer through an `Arc` so a test can keep a handle after the
/// sink itself is boxed and moved into a [`super::DeviceSession`].
#[cfg(any(test, feature = "test-util"))]
#[derive(Default, Clone)]
pub struct RecordingSink {
    pub sent: std::sync::Arc<parking_lot::Mutex<Vec<Vec<u8>>>>,
}

#[cfg(any(test, feature = "test-util"))]
impl OutputSink for RecordingSink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.sent.lock().push(bytes.to_vec());
        Ok(())
    }
}
