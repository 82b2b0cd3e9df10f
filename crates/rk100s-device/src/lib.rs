//! Device Session: cross-platform MIDI port lifecycle and async
//! request/response correlation against the RK-100S 2, which only
//! answers pulled-program requests via an unsolicited SysEx callback.

pub mod session;
pub mod transport;

pub use session::{DeviceError, DeviceSession, DEVICE_NAME_FRAGMENT};
pub use transport::OutputSink;
