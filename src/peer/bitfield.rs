//! The `bitfield` message payload: which pieces a peer already has.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    pub fn new(data: Vec<u8>) -> Self {
        Bitfield(data)
    }

    /// An all-zero bitfield large enough to hold `num_pieces` bits.
    pub fn empty(num_pieces: usize) -> Self {
        Bitfield(vec![0u8; num_pieces.div_ceil(8)])
    }

    pub fn has_piece(&self, index: usize) -> bool {
        let byte_index = index / 8;
        let offset = index % 8;
        match self.0.get(byte_index) {
            Some(byte) => byte >> (7 - offset) & 1 != 0,
            None => false,
        }
    }

    pub fn set_piece(&mut self, index: usize) {
        let byte_index = index / 8;
        let offset = index % 8;
        if let Some(byte) = self.0.get_mut(byte_index) {
            *byte |= 1 << (7 - offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_sets_individual_bits_msb_first() {
        let mut bf = Bitfield::empty(10);
        assert!(!bf.has_piece(0));
        assert!(!bf.has_piece(9));

        bf.set_piece(0);
        bf.set_piece(9);
        assert!(bf.has_piece(0));
        assert!(bf.has_piece(9));
        assert!(!bf.has_piece(1));
    }

    #[test]
    fn matches_reference_byte_layout() {
        let bf = Bitfield::new(vec![0b1010_0000]);
        assert!(bf.has_piece(0));
        assert!(!bf.has_piece(1));
        assert!(bf.has_piece(2));
        assert!(!bf.has_piece(3));
    }

    #[test]
    fn out_of_range_index_is_treated_as_unset() {
        let bf = Bitfield::empty(4);
        assert!(!bf.has_piece(100));
    }
}
