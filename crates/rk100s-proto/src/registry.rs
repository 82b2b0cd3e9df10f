//! Static catalog of named synth parameters and the 18 effect-type
//! definitions, plus MIDI message construction for NRPN/CC parameters.

use std::collections::HashMap;

use smallvec::SmallVec;
use thiserror::Error;

use crate::sysex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("parameter {0:?} has no MIDI address")]
    NoMidiAddress(String),
    #[error("unknown parameter {0:?}")]
    UnknownParameter(String),
}

/// How a parameter's value reaches (or is read from) the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiAddress {
    Nrpn { msb: u8, lsb: u8 },
    Cc(u8),
    /// Offset into the patch buffer, resolved via [`sysex::packed_offset`]
    /// from a logical index documented by the manufacturer.
    SysexOffset(usize),
    /// An effect parameter, addressed relative to whichever FX slot it is
    /// currently assigned to; `slot_index` is the position within that
    /// slot's data area.
    EffectSlot { slot_index: u8 },
}

/// An immutable, named synth parameter.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub id: &'static str,
    pub description: &'static str,
    pub sonic_effect: &'static str,
    pub min: i32,
    pub max: i32,
    pub address: MidiAddress,
    pub ribbon_assignable: bool,
}

impl ParamDef {
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }

    /// Build the MIDI bytes for writing `value` to this parameter on
    /// `channel`. Values are clamped to `[min, max]` first. Parameters
    /// lacking NRPN/CC addressing fail with `NoMidiAddress`.
    pub fn build_message(
        &self,
        channel: u8,
        value: i32,
    ) -> Result<SmallVec<[u8; 9]>, RegistryError> {
        let clamped = (self.clamp(value) & 0x7F) as u8;
        let status = 0xB0 | (channel.wrapping_sub(1) & 0x0F);
        let mut out = SmallVec::new();
        match self.address {
            MidiAddress::Nrpn { msb, lsb } => {
                out.extend_from_slice(&[status, 99, msb]);
                out.extend_from_slice(&[status, 98, lsb]);
                out.extend_from_slice(&[status, 6, clamped]);
            }
            MidiAddress::Cc(cc) => {
                out.extend_from_slice(&[status, cc, clamped]);
            }
            MidiAddress::SysexOffset(_) | MidiAddress::EffectSlot { .. } => {
                return Err(RegistryError::NoMidiAddress(self.id.to_string()));
            }
        }
        Ok(out)
    }
}

/// One of the device's 18 effect types.
#[derive(Debug, Clone)]
pub struct EffectType {
    pub id: u8,
    pub name: &'static str,
    pub params: Vec<ParamDef>,
}

impl EffectType {
    pub fn ribbon_assignable_params(&self) -> impl Iterator<Item = &ParamDef> {
        self.params.iter().filter(|p| p.ribbon_assignable)
    }

    fn max_slot_index(&self) -> Option<u8> {
        self.params
            .iter()
            .filter_map(|p| match p.address {
                MidiAddress::EffectSlot { slot_index } => Some(slot_index),
                _ => None,
            })
            .max()
    }
}

fn effect_param(
    id: &'static str,
    description: &'static str,
    sonic_effect: &'static str,
    min: i32,
    max: i32,
    slot_index: u8,
    ribbon_assignable: bool,
) -> ParamDef {
    ParamDef {
        id,
        description,
        sonic_effect,
        min,
        max,
        address: MidiAddress::EffectSlot { slot_index },
        ribbon_assignable,
    }
}

/// Build an effect type, assigning contiguous `slot_index`es by
/// construction order so the uniqueness/contiguity invariant from the
/// spec can never be violated by a typo.
fn effect_type(
    id: u8,
    name: &'static str,
    specs: &[(&'static str, &'static str, &'static str, i32, i32, bool)],
) -> EffectType {
    let params = specs
        .iter()
        .enumerate()
        .map(|(idx, &(pid, desc, sonic, min, max, ribbon))| {
            effect_param(pid, desc, sonic, min, max, idx as u8, ribbon)
        })
        .collect();
    EffectType { id, name, params }
}

fn build_effect_types() -> Vec<EffectType> {
    vec![
        effect_type(0, "Off", &[]),
        effect_type(
            1,
            "Compressor",
            &[
                ("fx_sensitivity", "Compressor sensitivity", "louder sustain on soft playing", 0, 127, true),
                ("fx_attack", "Compressor attack time", "softens or sharpens transients", 0, 127, true),
                ("fx_output_level", "Compressor makeup gain", "overall loudness after compression", 0, 127, false),
            ],
        ),
        effect_type(
            2,
            "Filter",
            &[
                ("fx_cutoff", "Filter cutoff frequency", "brighter or darker tone", 0, 127, true),
                ("fx_resonance", "Filter resonance", "emphasizes the cutoff frequency", 0, 127, true),
                ("fx_lfo_depth", "Filter LFO depth", "wobble amount", 0, 127, true),
                ("fx_lfo_rate", "Filter LFO rate", "wobble speed", 0, 127, false),
            ],
        ),
        effect_type(
            3,
            "4Band EQ",
            &[
                ("fx_low_gain", "Low band gain", "bass boost or cut", 0, 127, true),
                ("fx_low_mid_gain", "Low-mid band gain", "warmth boost or cut", 0, 127, true),
                ("fx_high_mid_gain", "High-mid band gain", "presence boost or cut", 0, 127, true),
                ("fx_high_gain", "High band gain", "air boost or cut", 0, 127, true),
            ],
        ),
        effect_type(
            4,
            "Distortion",
            &[
                ("fx_drive", "Distortion drive", "grittiness and saturation", 0, 127, true),
                ("fx_tone", "Distortion tone", "brightness of the clipped signal", 0, 127, true),
                ("fx_output_level", "Distortion output level", "overall loudness", 0, 127, false),
            ],
        ),
        effect_type(
            5,
            "Decimator",
            &[
                ("fx_sample_rate_reduction", "Sample rate reduction", "lo-fi aliasing", 0, 127, true),
                ("fx_bit_reduction", "Bit depth reduction", "crunchy quantization noise", 0, 127, true),
            ],
        ),
        effect_type(
            6,
            "Delay",
            &[
                ("fx_time", "Delay time", "echo spacing", 0, 127, true),
                ("fx_feedback", "Delay feedback", "number of repeats", 0, 127, true),
                ("fx_mix", "Delay wet/dry mix", "how prominent the echoes are", 0, 127, true),
            ],
        ),
        effect_type(
            7,
            "L/C/R Delay",
            &[
                ("fx_time", "Delay time", "echo spacing", 0, 127, true),
                ("fx_feedback", "Delay feedback", "number of repeats", 0, 127, true),
                ("fx_spread", "Stereo spread", "width of the left/center/right taps", 0, 127, true),
                ("fx_mix", "Delay wet/dry mix", "how prominent the echoes are", 0, 127, false),
            ],
        ),
        effect_type(
            8,
            "Auto Panning Delay",
            &[
                ("fx_time", "Delay time", "echo spacing", 0, 127, true),
                ("fx_feedback", "Delay feedback", "number of repeats", 0, 127, true),
                ("fx_pan_rate", "Auto-pan rate", "speed of stereo movement", 0, 127, true),
                ("fx_pan_depth", "Auto-pan depth", "width of stereo movement", 0, 127, true),
            ],
        ),
        effect_type(
            9,
            "Modulation Delay",
            &[
                ("fx_time", "Delay time", "echo spacing", 0, 127, true),
                ("fx_feedback", "Delay feedback", "number of repeats", 0, 127, true),
                ("fx_mod_rate", "Modulation rate", "chorus-like wobble speed on the repeats", 0, 127, true),
                ("fx_mod_depth", "Modulation depth", "chorus-like wobble depth on the repeats", 0, 127, true),
            ],
        ),
        effect_type(
            10,
            "Tape Echo",
            &[
                ("fx_time", "Echo time", "echo spacing", 0, 127, true),
                ("fx_feedback", "Echo feedback", "number of repeats", 0, 127, true),
                ("fx_saturation", "Tape saturation", "warmth and wow/flutter character", 0, 127, true),
                ("fx_mix", "Echo wet/dry mix", "how prominent the echoes are", 0, 127, false),
            ],
        ),
        effect_type(
            11,
            "Chorus",
            &[
                ("fx_rate", "Chorus rate", "speed of the pitch wobble", 0, 127, true),
                ("fx_depth", "Chorus depth", "width of the pitch wobble", 0, 127, true),
                ("fx_mix", "Chorus wet/dry mix", "thickness of the doubled voice", 0, 127, true),
            ],
        ),
        effect_type(
            12,
            "Flanger",
            &[
                ("fx_rate", "Flanger rate", "speed of the sweeping comb filter", 0, 127, true),
                ("fx_depth", "Flanger depth", "width of the sweep", 0, 127, true),
                ("fx_feedback", "Flanger feedback", "intensity of the jet-like resonance", 0, 127, true),
            ],
        ),
        effect_type(
            13,
            "Vibrato",
            &[
                ("fx_rate", "Vibrato rate", "speed of the pitch wobble", 0, 127, true),
                ("fx_depth", "Vibrato depth", "width of the pitch wobble", 0, 127, true),
            ],
        ),
        effect_type(
            14,
            "Phaser",
            &[
                ("fx_rate", "Phaser rate", "speed of the sweeping notches", 0, 127, true),
                ("fx_depth", "Phaser depth", "width of the sweep", 0, 127, true),
                ("fx_feedback", "Phaser feedback", "intensity of the swirl", 0, 127, true),
            ],
        ),
        effect_type(
            15,
            "Tremolo",
            &[
                ("fx_rate", "Tremolo rate", "speed of the volume pulsing", 0, 127, true),
                ("fx_depth", "Tremolo depth", "amount of the volume pulsing", 0, 127, true),
            ],
        ),
        effect_type(
            16,
            "Ring Modulator",
            &[
                ("fx_frequency", "Ring modulator frequency", "metallic, bell-like inharmonicity", 0, 127, true),
                ("fx_mix", "Ring modulator wet/dry mix", "how prominent the metallic tone is", 0, 127, true),
            ],
        ),
        effect_type(
            17,
            "Grain Shifter",
            &[
                ("fx_grain_size", "Grain size", "granularity of the stutter effect", 0, 127, true),
                ("fx_shift_rate", "Shift rate", "speed of the granular stutter", 0, 127, true),
                ("fx_mix", "Grain shifter wet/dry mix", "how prominent the stutter is", 0, 127, false),
            ],
        ),
    ]
}

fn core_params() -> Vec<ParamDef> {
    fn nrpn(
        id: &'static str,
        description: &'static str,
        sonic_effect: &'static str,
        msb: u8,
        lsb: u8,
        min: i32,
        max: i32,
    ) -> ParamDef {
        ParamDef {
            id,
            description,
            sonic_effect,
            min,
            max,
            address: MidiAddress::Nrpn { msb, lsb },
            ribbon_assignable: false,
        }
    }
    fn cc(
        id: &'static str,
        description: &'static str,
        sonic_effect: &'static str,
        cc: u8,
        min: i32,
        max: i32,
    ) -> ParamDef {
        ParamDef {
            id,
            description,
            sonic_effect,
            min,
            max,
            address: MidiAddress::Cc(cc),
            ribbon_assignable: false,
        }
    }

    vec![
        nrpn("osc1_waveform", "Oscillator 1 waveform", "changes the basic timbre", 0x01, 0x00, 0, 7),
        nrpn("osc1_pitch", "Oscillator 1 pitch", "transposes the note", 0x01, 0x01, -24, 24),
        nrpn("osc2_waveform", "Oscillator 2 waveform", "changes the basic timbre of the sub oscillator", 0x01, 0x02, 0, 7),
        nrpn("osc2_pitch", "Oscillator 2 pitch", "detunes or transposes the sub oscillator", 0x01, 0x03, -24, 24),
        nrpn("osc_mix", "Oscillator mix", "balance between osc 1 and osc 2", 0x01, 0x04, 0, 127),
        nrpn("filter_cutoff", "Filter cutoff frequency", "brighter or darker tone", 0x02, 0x00, 0, 127),
        nrpn("filter_resonance", "Filter resonance", "emphasizes the cutoff frequency", 0x02, 0x01, 0, 127),
        nrpn("filter_eg_int", "Filter envelope intensity", "how strongly the envelope sweeps the filter", 0x02, 0x02, -63, 63),
        nrpn("amp_eg_attack", "Amp envelope attack", "how quickly the sound fades in", 0x03, 0x00, 0, 127),
        nrpn("amp_eg_decay", "Amp envelope decay", "how quickly the sound settles after attack", 0x03, 0x01, 0, 127),
        nrpn("amp_eg_sustain", "Amp envelope sustain", "held loudness while a key is down", 0x03, 0x02, 0, 127),
        nrpn("amp_eg_release", "Amp envelope release", "how quickly the sound fades out after release", 0x03, 0x03, 0, 127),
        nrpn("lfo1_rate", "LFO 1 rate", "speed of the primary modulation cycle", 0x04, 0x00, 0, 127),
        nrpn("lfo1_depth", "LFO 1 depth", "intensity of the primary modulation", 0x04, 0x01, 0, 127),
        nrpn("portamento_time", "Portamento time", "how quickly pitch glides between notes", 0x05, 0x00, 0, 127),
        nrpn("arp_tempo", "Arpeggiator tempo", "speed of the arpeggio", 0x06, 0x00, 20, 240),
        nrpn("vocoder_balance", "Vocoder dry/wet balance", "balance between the synth and the vocoder carrier", 0x07, 0x00, 0, 127),
        cc("master_volume", "Master volume", "overall loudness", 7, 0, 127),
        cc("arp_on_off", "Arpeggiator on/off", "toggles the arpeggiator", 9, 0, 1),
        cc("ribbon_hold", "Ribbon hold", "latches the last ribbon value when enabled", 65, 0, 1),
    ]
}

/// Name-indexed catalog of all user-addressable parameters, plus the
/// 18 effect-type definitions.
pub struct Registry {
    params: Vec<ParamDef>,
    by_name: HashMap<&'static str, usize>,
    effect_types: Vec<EffectType>,
}

impl Registry {
    pub fn new() -> Self {
        let params = core_params();
        let by_name = params
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.id, idx))
            .collect();
        let effect_types = build_effect_types();

        for effect in &effect_types {
            if effect.id == 0 {
                debug_assert!(effect.params.is_empty());
                continue;
            }
            let mut seen = std::collections::HashSet::new();
            for p in &effect.params {
                if let MidiAddress::EffectSlot { slot_index } = p.address {
                    debug_assert_ne!(slot_index, sysex::RIBBON_OFF, "slot_index 31 is reserved");
                    debug_assert!(seen.insert(slot_index), "duplicate slot_index in {}", effect.name);
                }
            }
            debug_assert!(effect.max_slot_index().unwrap_or(0) <= 22);
        }

        Self {
            params,
            by_name,
            effect_types,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamDef> {
        self.by_name.get(name).map(|&idx| &self.params[idx])
    }

    /// Stable (insertion) order, used for AI tool enumeration and
    /// deterministic test output.
    pub fn list_all(&self) -> &[ParamDef] {
        &self.params
    }

    pub fn effect_types(&self) -> &[EffectType] {
        &self.effect_types
    }

    pub fn effect_type(&self, id: u8) -> Option<&EffectType> {
        self.effect_types.get(id as usize)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nrpn_byte_exactness() {
        let param = ParamDef {
            id: "test",
            description: "",
            sonic_effect: "",
            min: 0,
            max: 127,
            address: MidiAddress::Nrpn { msb: 0x05, lsb: 0x00 },
            ribbon_assignable: false,
        };
        let msg = param.build_message(1, 63).unwrap();
        assert_eq!(&msg[..], &[0xB0, 99, 5, 0xB0, 98, 0, 0xB0, 6, 63]);

        let cc_param = ParamDef {
            id: "cc_test",
            description: "",
            sonic_effect: "",
            min: 0,
            max: 127,
            address: MidiAddress::Cc(7),
            ribbon_assignable: false,
        };
        let msg = cc_param.build_message(1, 100).unwrap();
        assert_eq!(&msg[..], &[0xB0, 7, 100]);

        let msg = cc_param.build_message(3, 100).unwrap();
        assert_eq!(msg[0], 0xB2);
    }

    #[test]
    fn clamping() {
        let param = ParamDef {
            id: "clamped",
            description: "",
            sonic_effect: "",
            min: 10,
            max: 20,
            address: MidiAddress::Cc(1),
            ribbon_assignable: false,
        };
        assert_eq!(param.build_message(1, 100).unwrap()[2], 20);
        assert_eq!(param.build_message(1, -5).unwrap()[2], 10);
    }

    #[test]
    fn sysex_offset_params_have_no_midi_address() {
        let registry = Registry::new();
        let compressor = registry.effect_type(1).unwrap();
        let sensitivity = &compressor.params[0];
        assert!(matches!(
            sensitivity.build_message(1, 10),
            Err(RegistryError::NoMidiAddress(_))
        ));
    }

    #[test]
    fn effect_type_invariants() {
        let registry = Registry::new();
        let types = registry.effect_types();
        assert_eq!(types.len(), 18);
        for (idx, effect) in types.iter().enumerate() {
            assert_eq!(effect.id as usize, idx);
        }
        assert!(types[0].params.is_empty());
        for effect in &types[1..] {
            let mut slots: Vec<u8> = effect
                .params
                .iter()
                .filter_map(|p| match p.address {
                    MidiAddress::EffectSlot { slot_index } => Some(slot_index),
                    _ => None,
                })
                .collect();
            slots.sort_unstable();
            let expected: Vec<u8> = (0..slots.len() as u8).collect();
            assert_eq!(slots, expected, "{} must have contiguous slot indices", effect.name);
            assert!(slots.iter().all(|&s| s != sysex::RIBBON_OFF));
            assert!(slots.iter().all(|&s| s <= 22));
        }
    }

    #[test]
    fn get_is_case_sensitive_and_stable() {
        let registry = Registry::new();
        assert!(registry.get("master_volume").is_some());
        assert!(registry.get("nonexistent").is_none());
        let all = registry.list_all();
        assert_eq!(all[0].id, "osc1_waveform");
    }

    #[test]
    fn ribbon_assignable_filter() {
        let registry = Registry::new();
        let filter = registry.effect_type(2).unwrap();
        let assignable: Vec<_> = filter.ribbon_assignable_params().collect();
        assert_eq!(assignable.len(), 3);
    }
}
