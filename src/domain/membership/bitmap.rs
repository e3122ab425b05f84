use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

use crate::error::{Error, Result};

/// Fixed-length set of node slots, one bit per slot.
///
/// Slot `i` lives in byte `i / 8`, bit `i % 8`. The text form is the standard base64
/// encoding of the bytes, so every subset (including the empty one) round-trips exactly.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MemberBitmap {
    bytes: Vec<u8>,
    max_nodes: usize,
}

impl MemberBitmap {
    pub const DEFAULT_MAX_NODES: usize = 256;

    pub fn new(max_nodes: usize) -> Self {
        MemberBitmap { bytes: vec![0; Self::byte_len(max_nodes)], max_nodes }
    }

    pub fn from_slots(max_nodes: usize, slots: impl IntoIterator<Item = usize>) -> Result<Self> {
        let mut bitmap = Self::new(max_nodes);
        for slot in slots {
            bitmap.insert(slot)?;
        }
        Ok(bitmap)
    }

    fn byte_len(max_nodes: usize) -> usize {
        max_nodes.div_ceil(8)
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.max_nodes {
            return Err(Error::MembershipCodec(format!("slot {} out of range (max {} nodes)", slot, self.max_nodes)));
        }
        Ok(())
    }

    pub fn insert(&mut self, slot: usize) -> Result<bool> {
        self.check_slot(slot)?;
        let was_set = self.contains(slot);
        self.bytes[slot / 8] |= 1 << (slot % 8);
        Ok(!was_set)
    }

    pub fn remove(&mut self, slot: usize) -> bool {
        if slot >= self.max_nodes {
            return false;
        }
        let was_set = self.contains(slot);
        self.bytes[slot / 8] &= !(1 << (slot % 8));
        was_set
    }

    pub fn contains(&self, slot: usize) -> bool {
        slot < self.max_nodes && self.bytes[slot / 8] & (1 << (slot % 8)) != 0
    }

    pub fn len(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    /// Set slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.max_nodes).filter(move |slot| self.contains(*slot))
    }

    pub fn union(&self, other: &MemberBitmap) -> MemberBitmap {
        self.combine(other, |a, b| a | b)
    }

    pub fn intersection(&self, other: &MemberBitmap) -> MemberBitmap {
        self.combine(other, |a, b| a & b)
    }

    fn combine(&self, other: &MemberBitmap, op: impl Fn(u8, u8) -> u8) -> MemberBitmap {
        let max_nodes = self.max_nodes.max(other.max_nodes);
        let mut result = MemberBitmap::new(max_nodes);
        for (i, byte) in result.bytes.iter_mut().enumerate() {
            let a = self.bytes.get(i).copied().unwrap_or(0);
            let b = other.bytes.get(i).copied().unwrap_or(0);
            *byte = op(a, b);
        }
        result
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Decodes a bitmap produced by [`MemberBitmap::encode`] for the same `max_nodes`.
    pub fn decode(text: &str, max_nodes: usize) -> Result<Self> {
        let bytes = STANDARD.decode(text.trim()).map_err(|e| Error::MembershipCodec(format!("'{}' is not valid base64: {}", text, e)))?;

        let expected = Self::byte_len(max_nodes);
        if bytes.len() != expected {
            return Err(Error::MembershipCodec(format!("expected {} bytes for {} node slots, got {}", expected, max_nodes, bytes.len())));
        }

        let bitmap = MemberBitmap { bytes, max_nodes };
        // padding bits in the last byte must stay clear
        if let Some(stray) = (max_nodes..expected * 8).find(|slot| bitmap.bytes[slot / 8] & (1 << (slot % 8)) != 0) {
            return Err(Error::MembershipCodec(format!("bit {} is set beyond the {} node slots", stray, max_nodes)));
        }
        Ok(bitmap)
    }
}

impl fmt::Debug for MemberBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_encodes_to_zero_bits() {
        let empty = MemberBitmap::new(16);
        let text = empty.encode();
        assert_eq!(text, "AAA=");

        let decoded = MemberBitmap::decode(&text, 16).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded, empty);
    }

    #[test]
    fn test_full_set_round_trip() {
        let full = MemberBitmap::from_slots(10, 0..10).unwrap();
        let decoded = MemberBitmap::decode(&full.encode(), 10).unwrap();
        assert_eq!(decoded.iter().collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_insert_out_of_range() {
        let mut bitmap = MemberBitmap::new(8);
        assert!(bitmap.insert(8).is_err());
        assert!(bitmap.insert(7).unwrap());
        assert!(!bitmap.insert(7).unwrap());
    }

    #[test]
    fn test_decode_rejects_wrong_length_and_garbage() {
        let text = MemberBitmap::new(32).encode();
        assert!(matches!(MemberBitmap::decode(&text, 64), Err(Error::MembershipCodec(_))));
        assert!(matches!(MemberBitmap::decode("not base64!", 32), Err(Error::MembershipCodec(_))));
    }

    #[test]
    fn test_decode_rejects_padding_bits() {
        // 10 slots use two bytes; bit 15 is padding
        let text = STANDARD.encode([0u8, 0b1000_0000]);
        assert!(MemberBitmap::decode(&text, 10).is_err());
    }

    #[test]
    fn test_union_and_intersection() {
        let a = MemberBitmap::from_slots(16, [1, 3, 5]).unwrap();
        let b = MemberBitmap::from_slots(16, [3, 4]).unwrap();
        assert_eq!(a.union(&b).iter().collect::<Vec<_>>(), vec![1, 3, 4, 5]);
        assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), vec![3]);
    }
}
