//! Patch Buffer: a named program's raw SysEx payload, plus effect-type
//! aware resolution of which ribbon/parameter bytes are currently live.

use rk100s_device::{DeviceError, DeviceSession};
use rk100s_proto::registry::{MidiAddress, ParamDef, Registry};
use rk100s_proto::sysex::{self, Codec, FxSlot, SysexError, RIBBON_OFF};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("buffer is too short to hold a program: need at least {needed} bytes, got {actual}")]
    BufferTooShort { needed: usize, actual: usize },
    #[error("effect type byte at slot {0:?} is out of range 0..=17")]
    CorruptEffectType(FxSlot),
    #[error("program slot {0} is out of range 0..=199")]
    ProgramSlotOutOfRange(u16),
    #[error(transparent)]
    Sysex(#[from] SysexError),
    #[error("parameter is not addressed via NRPN/CC")]
    NotALiveParameter,
    #[error("parameter does not belong to the effect type currently active in this slot")]
    ParameterNotInActiveEffect,
    #[error("parameter is not an effect-slot parameter")]
    NotAnEffectParameter,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

const MIN_BUFFER_LEN: usize = 378;
const MAX_PROGRAM_SLOT: u16 = 199;

/// Either an active effect parameter slot, or the "off" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RibbonAssign {
    Active(u8),
    Off,
}

impl RibbonAssign {
    fn from_byte(byte: u8) -> Self {
        if byte == RIBBON_OFF {
            RibbonAssign::Off
        } else {
            RibbonAssign::Active(byte)
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            RibbonAssign::Active(slot_index) => slot_index,
            RibbonAssign::Off => RIBBON_OFF,
        }
    }
}

/// A program's display metadata plus its raw device buffer. Name is
/// derived from the buffer at construction and does not independently
/// drift from it; category and notes are librarian-only metadata the
/// device never sees.
///
/// `Serialize`/`Deserialize` back the CLI's bank-file glue (spec.md §6).
/// Construct via [`Patch::from_buffer`] rather than deserializing
/// directly if the source isn't trusted — that path re-derives `name`
/// from the buffer instead of accepting whatever a file claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    name: Option<String>,
    pub program_slot: u16,
    pub category: String,
    pub notes: String,
    buffer: Vec<u8>,
}

impl Patch {
    /// Build a patch from a freshly pulled or loaded program buffer.
    /// Rejects the buffer outright if either effect slot's type byte or
    /// `program_slot` is out of range — per spec.md, a buffer failing
    /// either check is corrupt and must not be accepted, not merely
    /// flagged the first time something reads the bad field.
    pub fn from_buffer(
        buffer: Vec<u8>,
        program_slot: u16,
        category: String,
        notes: String,
    ) -> Result<Self, PatchError> {
        if buffer.len() < MIN_BUFFER_LEN {
            return Err(PatchError::BufferTooShort {
                needed: MIN_BUFFER_LEN,
                actual: buffer.len(),
            });
        }
        if program_slot > MAX_PROGRAM_SLOT {
            return Err(PatchError::ProgramSlotOutOfRange(program_slot));
        }
        let name = sysex::extract_name(&buffer);
        let patch = Self {
            name,
            program_slot,
            category,
            notes,
            buffer,
        };
        patch.fx_type_byte(FxSlot::One)?;
        patch.fx_type_byte(FxSlot::Two)?;
        Ok(patch)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn fx_type_byte(&self, slot: FxSlot) -> Result<u8, PatchError> {
        let byte = sysex::read_byte(&self.buffer, sysex::fx_type_packed(slot))?;
        if byte > 17 {
            return Err(PatchError::CorruptEffectType(slot));
        }
        Ok(byte)
    }

    pub fn fx_type(&self, slot: FxSlot) -> Result<u8, PatchError> {
        self.fx_type_byte(slot)
    }

    pub fn fx_ribbon_assign(&self, slot: FxSlot) -> Result<RibbonAssign, PatchError> {
        let byte = sysex::read_byte(&self.buffer, sysex::fx_ribbon_assign_packed(slot))?;
        Ok(RibbonAssign::from_byte(byte))
    }

    /// Switch the effect type active in `slot`. Buffer bytes for that
    /// slot's parameters are left untouched — only the type byte
    /// changes — but if the current ribbon assignment no longer names
    /// a valid parameter under the new effect type, it resets to
    /// [`RibbonAssign::Off`].
    pub fn set_fx_type(
        &mut self,
        registry: &Registry,
        slot: FxSlot,
        new_type: u8,
    ) -> Result<(), PatchError> {
        let effect = registry
            .effect_type(new_type)
            .ok_or(PatchError::CorruptEffectType(slot))?;
        sysex::write_byte(&mut self.buffer, sysex::fx_type_packed(slot), new_type)?;

        if let RibbonAssign::Active(slot_index) = self.fx_ribbon_assign(slot)? {
            let still_valid = effect
                .params
                .iter()
                .any(|p| matches!(p.address, MidiAddress::EffectSlot { slot_index: si } if si == slot_index));
            if !still_valid {
                debug!(?slot, new_type, "ribbon assignment invalidated by effect type switch, resetting to off");
                sysex::write_byte(
                    &mut self.buffer,
                    sysex::fx_ribbon_assign_packed(slot),
                    RIBBON_OFF,
                )?;
            }
        }
        Ok(())
    }

    pub fn set_fx_ribbon_assign(
        &mut self,
        slot: FxSlot,
        assign: RibbonAssign,
    ) -> Result<(), PatchError> {
        sysex::write_byte(
            &mut self.buffer,
            sysex::fx_ribbon_assign_packed(slot),
            assign.to_byte(),
        )?;
        Ok(())
    }

    /// Write a live-only NRPN/CC parameter straight to the device; the
    /// patch buffer is never mutated for these, matching the device's
    /// own behavior of not echoing such changes into the dump format.
    pub fn write_live_param(
        &self,
        device: &DeviceSession,
        channel: u8,
        param: &ParamDef,
        value: i32,
    ) -> Result<(), PatchError> {
        let message = param
            .build_message(channel, value)
            .map_err(|_| PatchError::NotALiveParameter)?;
        device.send(&message)?;
        Ok(())
    }

    /// Write an effect-slot parameter: mutates the buffer at its packed
    /// offset, and — if `device` is attached — also pushes the updated
    /// buffer live as a full program-dump write, since no reverse
    /// engineered per-parameter effect SysEx message is available.
    pub fn write_effect_param(
        &mut self,
        registry: &Registry,
        slot: FxSlot,
        param: &ParamDef,
        value: i32,
        live: Option<(&DeviceSession, &Codec, u8)>,
    ) -> Result<(), PatchError> {
        let slot_index = match param.address {
            MidiAddress::EffectSlot { slot_index } => slot_index,
            _ => return Err(PatchError::NotAnEffectParameter),
        };

        let active_type = self.fx_type_byte(slot)?;
        let effect = registry
            .effect_type(active_type)
            .ok_or(PatchError::CorruptEffectType(slot))?;
        let belongs = effect
            .params
            .iter()
            .any(|p| matches!(p.address, MidiAddress::EffectSlot { slot_index: si } if si == slot_index));
        if !belongs {
            return Err(PatchError::ParameterNotInActiveEffect);
        }

        let clamped = (param.clamp(value) & 0x7F) as u8;
        sysex::write_byte(&mut self.buffer, sysex::fx_param_packed(slot, slot_index), clamped)?;

        if let Some((device, codec, channel)) = live {
            device.send(&codec.build_program_write(channel, &self.buffer))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_buffer() -> Vec<u8> {
        let mut buf = vec![0u8; MIN_BUFFER_LEN];
        buf[..10].copy_from_slice(b"TestPatch ");
        buf[sysex::fx_type_packed(FxSlot::One)] = 2; // Filter
        buf[sysex::fx_ribbon_assign_packed(FxSlot::One)] = RIBBON_OFF;
        buf[sysex::fx_type_packed(FxSlot::Two)] = 0; // Off
        buf[sysex::fx_ribbon_assign_packed(FxSlot::Two)] = RIBBON_OFF;
        buf
    }

    #[test]
    fn rejects_short_buffer() {
        let err = Patch::from_buffer(vec![0u8; 4], 0, String::new(), String::new()).unwrap_err();
        assert!(matches!(err, PatchError::BufferTooShort { .. }));
    }

    #[test]
    fn name_derived_from_buffer() {
        let patch = Patch::from_buffer(test_buffer(), 0, String::new(), String::new()).unwrap();
        assert_eq!(patch.name(), Some("TestPatch"));
    }

    #[test]
    fn fx_type_out_of_range_is_corrupt() {
        let mut buf = test_buffer();
        buf[sysex::fx_type_packed(FxSlot::One)] = 18;
        let err = Patch::from_buffer(buf, 0, String::new(), String::new()).unwrap_err();
        assert!(matches!(err, PatchError::CorruptEffectType(FxSlot::One)));
    }

    #[test]
    fn program_slot_out_of_range_is_rejected() {
        let err = Patch::from_buffer(test_buffer(), 200, String::new(), String::new()).unwrap_err();
        assert!(matches!(err, PatchError::ProgramSlotOutOfRange(200)));
    }

    #[test]
    fn set_fx_type_resets_invalid_ribbon_assignment() {
        let registry = Registry::new();
        let mut patch = Patch::from_buffer(test_buffer(), 0, String::new(), String::new()).unwrap();
        patch
            .set_fx_ribbon_assign(FxSlot::One, RibbonAssign::Active(2))
            .unwrap();
        assert_eq!(patch.fx_ribbon_assign(FxSlot::One).unwrap(), RibbonAssign::Active(2));

        // Vibrato (id 13) only has 2 params (slot_index 0,1); index 2 is invalid there
        patch.set_fx_type(&registry, FxSlot::One, 13).unwrap();
        assert_eq!(patch.fx_ribbon_assign(FxSlot::One).unwrap(), RibbonAssign::Off);
    }

    #[test]
    fn write_effect_param_rejects_param_from_inactive_effect() {
        let registry = Registry::new();
        let mut patch = Patch::from_buffer(test_buffer(), 0, String::new(), String::new()).unwrap();
        // patch has Filter (id 2) active in slot one; reach for a Chorus param instead
        let chorus = registry.effect_type(11).unwrap();
        let chorus_rate = &chorus.params[0];
        let err = patch
            .write_effect_param(&registry, FxSlot::One, chorus_rate, 64, None)
            .unwrap_err();
        assert!(matches!(err, PatchError::ParameterNotInActiveEffect));
    }

    #[test]
    fn write_effect_param_succeeds_for_active_effect() {
        let registry = Registry::new();
        let mut patch = Patch::from_buffer(test_buffer(), 0, String::new(), String::new()).unwrap();
        let filter = registry.effect_type(2).unwrap();
        let cutoff = &filter.params[0];
        patch
            .write_effect_param(&registry, FxSlot::One, cutoff, 100, None)
            .unwrap();
        let offset = sysex::fx_param_packed(FxSlot::One, 0);
        assert_eq!(patch.buffer()[offset], 100);
    }

    #[test]
    fn write_live_param_rejects_effect_slot_params() {
        let registry = Registry::new();
        let patch = Patch::from_buffer(test_buffer(), 0, String::new(), String::new()).unwrap();
        let filter = registry.effect_type(2).unwrap();
        let cutoff = &filter.params[0];
        let session = DeviceSession::new(Codec::default(), 1);
        let err = patch
            .write_live_param(&session, 1, cutoff, 50)
            .unwrap_err();
        assert!(matches!(err, PatchError::NotALiveParameter));
    }
}
