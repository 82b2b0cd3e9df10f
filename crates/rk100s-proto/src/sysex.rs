//! Korg-framed SysEx message construction and parsing.
//!
//! All outbound messages have shape
//! `[0xF0, 0x42, 0x30 + (channel-1), MODEL_ID, FUNC, <body>, 0xF7]`.
//! See `packed_offset` for the 7-bit "gap" addressing used by program dumps.

use smallvec::SmallVec;
use thiserror::Error;
use tracing::trace;

/// Exclusive status magic.
pub const EST: u8 = 0xF0;
/// End of exclusive magic.
pub const EOX: u8 = 0xF7;
/// KORG manufacturer ID.
pub const KORG_ID: u8 = 0x42;

/// Placeholder model id pending empirical verification against the
/// manufacturer's parameter guide (spec §9 open question). Never hardcode
/// this in message-building code; always go through [`Codec::model_id`].
pub const DEFAULT_MODEL_ID: u8 = 0x57;

const FUNC_PROGRAM_DUMP_REQUEST: u8 = 0x10;
const FUNC_ALL_DUMP_REQUEST: u8 = 0x0E;
const FUNC_PROGRAM_DUMP: u8 = 0x40;

/// Base byte offset of the packed "gap" region (effect parameters) within
/// a program-dump payload.
const BASE: usize = 283;
/// Gap-framing constant: an MSB-carrier byte is inserted every 7 data
/// bytes, offset by this many bytes into the stream.
const GAP_K: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SysexError {
    #[error("not a Korg program dump")]
    NotAKorgDump,
    #[error("payload too short: need at least {needed} bytes, got {actual}")]
    PayloadTooShort { needed: usize, actual: usize },
}

/// Stateless framer/parser for one device's SysEx dialect, parameterized
/// by the manufacturer's (currently unconfirmed) model id.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    model_id: u8,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_ID)
    }
}

impl Codec {
    pub fn new(model_id: u8) -> Self {
        Self { model_id }
    }

    pub fn model_id(&self) -> u8 {
        self.model_id
    }

    fn status_byte(channel: u8) -> u8 {
        debug_assert!((1..=16).contains(&channel));
        0x30 + (channel - 1)
    }

    /// Build a program-dump request for `program` (low 7 bits).
    pub fn program_dump_request(&self, channel: u8, program: u8) -> SmallVec<[u8; 6]> {
        let mut buf = SmallVec::new();
        buf.push(EST);
        buf.push(KORG_ID);
        buf.push(Self::status_byte(channel));
        buf.push(self.model_id);
        buf.push(FUNC_PROGRAM_DUMP_REQUEST);
        buf.push(program & 0x7F);
        buf.push(EOX);
        buf
    }

    /// Build an all-dump request (empty body).
    pub fn all_dump_request(&self, channel: u8) -> SmallVec<[u8; 6]> {
        let mut buf = SmallVec::new();
        buf.push(EST);
        buf.push(KORG_ID);
        buf.push(Self::status_byte(channel));
        buf.push(self.model_id);
        buf.push(FUNC_ALL_DUMP_REQUEST);
        buf.push(EOX);
        buf
    }

    /// Build a full program-dump (write) message wrapping `payload`.
    pub fn build_program_write(&self, channel: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(payload.len() + 6);
        buf.push(EST);
        buf.push(KORG_ID);
        buf.push(Self::status_byte(channel));
        buf.push(self.model_id);
        buf.push(FUNC_PROGRAM_DUMP);
        buf.extend_from_slice(payload);
        buf.push(EOX);
        buf
    }

    /// Parse an inbound program dump, returning the opaque payload between
    /// the function byte and the terminating `0xF7`. The channel byte
    /// (index 2) is not validated.
    pub fn parse_program_dump<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8], SysexError> {
        trace!(len = bytes.len(), "parsing program dump");
        if bytes.len() < 6
            || bytes[0] != EST
            || bytes[1] != KORG_ID
            || bytes[3] != self.model_id
            || bytes[4] != FUNC_PROGRAM_DUMP
        {
            return Err(SysexError::NotAKorgDump);
        }
        let body = &bytes[5..];
        match body.last() {
            Some(&EOX) => Ok(&body[..body.len() - 1]),
            _ => Err(SysexError::NotAKorgDump),
        }
    }
}

/// Extract and right-trim the 12-byte program name from a parsed payload.
/// Returns `None` when no printable bytes remain.
pub fn extract_name(payload: &[u8]) -> Option<String> {
    let name_region = payload.get(0..12)?;
    let filtered: Vec<u8> = name_region
        .iter()
        .copied()
        .filter(|&b| (0x20..=0x7E).contains(&b))
        .collect();
    let name = String::from_utf8_lossy(&filtered).trim_end().to_string();
    (!name.is_empty()).then_some(name)
}

/// Translate a logical parameter index in the device's documented "gap"
/// region into its physical byte offset within the packed program buffer.
/// This is the only permitted way to translate a documented logical field
/// into a buffer index; it does not attempt a general bitstream unpack.
pub fn packed_offset(logical: usize) -> usize {
    BASE + logical + (logical + GAP_K).div_ceil(7)
}

fn require_len(buf: &[u8], offset: usize) -> Result<(), SysexError> {
    if buf.len() <= offset {
        return Err(SysexError::PayloadTooShort {
            needed: offset + 1,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// One of the two effect slots an effect type can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxSlot {
    One,
    Two,
}

impl FxSlot {
    fn logical_base(self) -> usize {
        match self {
            FxSlot::One => 42,
            FxSlot::Two => 66,
        }
    }
}

/// Packed offset of an effect parameter's `slot_index` (0..=22) within
/// `slot`'s data area.
pub fn fx_param_packed(slot: FxSlot, slot_index: u8) -> usize {
    packed_offset(slot.logical_base() + slot_index as usize)
}

/// Packed offset of the effect-type byte for `slot` (must hold 0..=17).
pub fn fx_type_packed(slot: FxSlot) -> usize {
    packed_offset(slot.logical_base() - 4)
}

/// Packed offset of the ribbon-assign byte for `slot` (slot_index of the
/// active parameter, or sentinel 31 for "off").
pub fn fx_ribbon_assign_packed(slot: FxSlot) -> usize {
    packed_offset(slot.logical_base() - 2)
}

/// Packed offset of the ribbon-polarity byte for `slot`.
pub fn fx_ribbon_polarity_packed(slot: FxSlot) -> usize {
    packed_offset(slot.logical_base() - 1)
}

/// Sentinel ribbon-assign value meaning "no parameter assigned".
pub const RIBBON_OFF: u8 = 31;

/// Read a single byte at `packed`, failing rather than panicking on a
/// short buffer.
pub fn read_byte(buf: &[u8], packed: usize) -> Result<u8, SysexError> {
    require_len(buf, packed)?;
    Ok(buf[packed])
}

/// Write a single byte at `packed`, failing rather than panicking on a
/// short buffer.
pub fn write_byte(buf: &mut [u8], packed: usize, value: u8) -> Result<(), SysexError> {
    require_len(buf, packed)?;
    buf[packed] = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn packed_offset_fixed_vectors() {
        assert_eq!(fx_param_packed(FxSlot::One, 0), 332);
        assert_eq!(fx_param_packed(FxSlot::One, 17), 354);
        assert_eq!(fx_param_packed(FxSlot::Two, 0), 359);
        assert_eq!(fx_param_packed(FxSlot::Two, 17), 377);

        assert_eq!(fx_type_packed(FxSlot::One), 327);
        assert_eq!(fx_ribbon_assign_packed(FxSlot::One), 330);
        assert_eq!(fx_ribbon_polarity_packed(FxSlot::One), 331);

        assert_eq!(fx_type_packed(FxSlot::Two), 355);
        assert_eq!(fx_ribbon_assign_packed(FxSlot::Two), 357);
        assert_eq!(fx_ribbon_polarity_packed(FxSlot::Two), 358);
    }

    #[test]
    fn name_extraction() {
        let mut payload = b"BrassLead   ".to_vec();
        payload.extend([0u8; 20]);
        assert_eq!(extract_name(&payload).as_deref(), Some("BrassLead"));

        let mut payload = b"Pad         ".to_vec();
        payload.extend([0u8; 20]);
        assert_eq!(extract_name(&payload).as_deref(), Some("Pad"));

        let empty = [0u8; 12];
        assert_eq!(extract_name(&empty), None);

        let too_short = [b'A'; 4];
        assert_eq!(extract_name(&too_short), None);
    }

    #[test]
    fn parse_rejects_wrong_manufacturer() {
        let codec = Codec::default();
        let mut msg = codec.build_program_write(1, b"payload");
        msg[1] = 0x41; // not Korg
        assert_eq!(codec.parse_program_dump(&msg), Err(SysexError::NotAKorgDump));
    }

    #[test]
    fn parse_rejects_short_buffer() {
        let codec = Codec::default();
        assert_eq!(
            codec.parse_program_dump(&[0xF0, 0x42, 0x30]),
            Err(SysexError::NotAKorgDump)
        );
    }

    proptest! {
        #[test]
        fn framing_round_trip(channel in 1u8..=16, program in 0u8..=127, payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let codec = Codec::default();
            let msg = codec.build_program_write(channel, &payload);
            let parsed = codec.parse_program_dump(&msg).unwrap();
            prop_assert_eq!(parsed, payload.as_slice());

            // the request itself is well formed for any legal channel/program
            let req = codec.program_dump_request(channel, program);
            prop_assert_eq!(req[2], 0x30 + (channel - 1));
            prop_assert_eq!(req[5] & 0x80, 0);
        }

        #[test]
        fn packed_offset_matches_formula(logical in 0usize..200) {
            prop_assert_eq!(packed_offset(logical), 283 + logical + (logical + 4).div_ceil(7));
        }
    }
}
