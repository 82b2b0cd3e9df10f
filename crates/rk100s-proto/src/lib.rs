//! SysEx/NRPN protocol engine and parameter registry for the Korg RK-100S 2.
//!
//! This crate has no I/O of its own: it turns parameter names and values
//! into MIDI bytes, and turns program-dump bytes back into named fields.
//! Transport (MIDI ports, request/response correlation) lives in
//! `rk100s-device`.

pub mod registry;
pub mod sysex;

pub use registry::{EffectType, MidiAddress, ParamDef, Registry, RegistryError};
pub use sysex::{Codec, FxSlot, SysexError, RIBBON_OFF};
