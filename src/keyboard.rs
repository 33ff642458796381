//! Keyboard: a 64-key bitmap split across four 16-bit words (§4.2).

use crate::error::Result;
use crate::state_io::{StateReader, StateWriter};

/// Snapshot of all 64 key states, copied in from the host once per
/// frame (mirrors `keyboard_update_from`'s whole-bitmap copy-in).
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyState {
    pub words: [u16; 4],
}

#[derive(Debug, Clone, Default)]
pub struct Keyboard {
    /// Bit `n` of `words[w]` set means the corresponding key is pressed.
    pub keys: [u16; 4],
}

impl Keyboard {
    /// Copies a full snapshot from the host, replacing prior state.
    pub fn update_from(&mut self, state: &KeyState) {
        self.keys = state.words;
    }

    /// Reads one of the four bitmap words, inverted per Alto hardware
    /// polarity (1 = not pressed, 0 = pressed).
    pub fn read_word(&self, index: usize) -> u16 {
        !self.keys[index & 0x3]
    }

    pub fn serialize(&self, w: &mut StateWriter) {
        w.put_u16_array(&self.keys);
    }

    pub fn deserialize(r: &mut StateReader) -> Result<Self> {
        let mut kb = Keyboard::default();
        r.get_u16_array(&mut kb.keys)?;
        Ok(kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpressed_reads_all_ones() {
        let kb = Keyboard::default();
        assert_eq!(kb.read_word(0), 0xFFFF);
    }

    #[test]
    fn pressed_bit_reads_as_zero() {
        let mut kb = Keyboard::default();
        kb.update_from(&KeyState {
            words: [0x0001, 0, 0, 0],
        });
        assert_eq!(kb.read_word(0), 0xFFFE);
    }
}
