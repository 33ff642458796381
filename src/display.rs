//! The display controller: pixel FIFO, vertical/horizontal/word
//! interrupts, and cursor overlay (§4.4). Mirrors `display.c` from the
//! reference implementation. Pixel data is tracked only well enough to
//! drive the state machine correctly; actual screen rendering is a GUI
//! concern and out of scope here.

use crate::error::{Error, Result};
use crate::interrupt::compute_intr_cycle;
use crate::state_io::{StateReader, StateWriter};
use crate::task::{TASK_CURSOR, TASK_DISPLAY_HORIZONTAL, TASK_DISPLAY_VERTICAL, TASK_DISPLAY_WORD, TASK_MEMORY_REFRESH};

pub const FIFO_SIZE: usize = 16;
pub const WORDS_PER_LINE: usize = 38;
pub const NUM_SCANLINES: usize = 875;

pub const VBLANK_DURATION: i32 = 3911;
pub const SCANLINE_DURATION: i32 = 224;
pub const HBLANK_DURATION: i32 = 35;
pub const WORD_DURATION: i32 = 5;

#[derive(Debug, Clone)]
pub struct Display {
    fifo: [u16; FIFO_SIZE],
    fifo_start: u8,
    fifo_end: u8,

    pub scanline: u16,
    vblank_lines: u16,
    pub even_field: bool,
    pub word_index: u16,

    pub cursor_x: u16,
    cursor_x_latch: u16,
    cursor_x_has_new: bool,
    pub cursor_data: u16,
    cursor_data_latch: u16,
    cursor_data_has_new: bool,

    pub mode_lowres: bool,
    pub mode_wob: bool,
    mode_lowres_shadow: bool,
    mode_wob_shadow: bool,
    mode_pending: bool,

    pub dw_blocked: bool,
    pub dh_blocked: bool,

    pub dv_intr_cycle: Option<i32>,
    pub dh_intr_cycle: Option<i32>,
    pub dw_intr_cycle: Option<i32>,
    pub pending: u16,

    framebuffer: Vec<[u16; WORDS_PER_LINE]>,
}

impl Default for Display {
    fn default() -> Self {
        let mut d = Display {
            fifo: [0; FIFO_SIZE],
            fifo_start: 0,
            fifo_end: 0,
            scanline: 0,
            vblank_lines: 0,
            even_field: false,
            word_index: 0,
            cursor_x: 0,
            cursor_x_latch: 0,
            cursor_x_has_new: false,
            cursor_data: 0,
            cursor_data_latch: 0,
            cursor_data_has_new: false,
            mode_lowres: false,
            mode_wob: false,
            mode_lowres_shadow: false,
            mode_wob_shadow: false,
            mode_pending: false,
            dw_blocked: true,
            dh_blocked: false,
            dv_intr_cycle: Some(VBLANK_DURATION),
            dh_intr_cycle: None,
            dw_intr_cycle: None,
            pending: 0,
            framebuffer: vec![[0; WORDS_PER_LINE]; NUM_SCANLINES],
        };
        d.framebuffer.shrink_to_fit();
        d
    }
}

impl Display {
    fn fifo_count(&self) -> u8 {
        self.fifo_end.wrapping_sub(self.fifo_start) & 0x1F
    }

    fn fifo_push(&mut self, word: u16) {
        let idx = (self.fifo_end & 0xF) as usize;
        self.fifo[idx] = word;
        self.fifo_end = (self.fifo_end + 1) & 0x1F;
    }

    fn fifo_pop(&mut self) -> Option<u16> {
        if self.fifo_count() == 0 {
            return None;
        }
        let idx = (self.fifo_start & 0xF) as usize;
        let word = self.fifo[idx];
        self.fifo_start = (self.fifo_start + 1) & 0x1F;
        Some(word)
    }

    /// Resets to the power-on state: word task blocked, horizontal task
    /// not blocked, only the vertical interrupt armed.
    pub fn reset(&mut self) {
        *self = Display::default();
    }

    /// `LOAD_DDR`: pushes one word into the pixel FIFO, waking the word
    /// task if there is still room and neither display task is blocked.
    pub fn load_ddr(&mut self, word: u16) -> Result<()> {
        if self.fifo_count() == FIFO_SIZE as u8 {
            return Err(Error::Microcode("display pixel FIFO overflow".into()));
        }
        self.fifo_push(word);
        if self.fifo_count() < FIFO_SIZE as u8 && !self.dh_blocked && !self.dw_blocked {
            self.pending |= 1 << TASK_DISPLAY_WORD;
        }
        Ok(())
    }

    /// `LOAD_XPREG`: latches the (bus-inverted) cursor X position unless
    /// a latch is already pending.
    pub fn load_xpreg(&mut self, bus: u16) {
        if !self.cursor_x_has_new {
            self.cursor_x_latch = !bus;
            self.cursor_x_has_new = true;
        }
    }

    /// `LOAD_CSR`: latches the cursor bit pattern unless a latch is
    /// already pending.
    pub fn load_csr(&mut self, bus: u16) {
        if !self.cursor_data_has_new {
            self.cursor_data_latch = bus;
            self.cursor_data_has_new = true;
        }
    }

    /// `EVENFIELD`: 1 iff the current field is the even one.
    pub fn evenfield(&self) -> u16 {
        u16::from(self.even_field)
    }

    /// `SETMODE`: stages a mode change for the next horizontal blank,
    /// returning 1 iff the requested mode is low-resolution.
    pub fn setmode(&mut self, bus: u16) -> u16 {
        self.mode_lowres_shadow = bus & 0x1 != 0;
        self.mode_wob_shadow = bus & 0x2 != 0;
        self.mode_pending = true;
        u16::from(self.mode_lowres_shadow)
    }

    /// Clears the named task's pending bit; blocking the word task also
    /// wakes the horizontal task on the next cycle.
    pub fn block_task(&mut self, task: u8) {
        if task == TASK_DISPLAY_WORD {
            self.dw_blocked = true;
            self.pending &= !(1 << TASK_DISPLAY_WORD);
            self.pending |= 1 << TASK_DISPLAY_HORIZONTAL;
        } else if task == TASK_DISPLAY_HORIZONTAL {
            self.dh_blocked = true;
            self.pending &= !(1 << TASK_DISPLAY_HORIZONTAL);
        } else if task == TASK_CURSOR || task == TASK_DISPLAY_VERTICAL {
            self.pending &= !(1 << task);
        }
    }

    /// Dispatched by the engine whenever the current task changes to
    /// this controller's tasks. The horizontal/vertical/cursor tasks
    /// auto-block themselves on switch; the word task does not.
    pub fn on_switch_task(&mut self, task: u8) {
        if task == TASK_DISPLAY_HORIZONTAL || task == TASK_DISPLAY_VERTICAL || task == TASK_CURSOR {
            self.pending &= !(1 << task);
        }
    }

    fn dv_interrupt(&mut self, cycle: i32) {
        self.vblank_lines += 1;
        self.pending |= 1 << TASK_MEMORY_REFRESH;
        let target = if self.even_field { 34 } else { 33 };
        if self.vblank_lines >= target {
            self.vblank_lines = 0;
            self.dw_blocked = false;
            self.dh_blocked = false;
            self.pending |= (1 << TASK_DISPLAY_WORD) | (1 << TASK_DISPLAY_HORIZONTAL);
            self.dv_intr_cycle = None;
            self.dh_intr_cycle = Some(cycle + HBLANK_DURATION);
        } else {
            self.dv_intr_cycle = Some(cycle + SCANLINE_DURATION);
        }
    }

    fn dh_interrupt(&mut self, cycle: i32) {
        self.word_index = 0;
        if self.cursor_x_has_new {
            self.cursor_x = self.cursor_x_latch;
            self.cursor_x_has_new = false;
        }
        if self.cursor_data_has_new {
            self.cursor_data = self.cursor_data_latch;
            self.cursor_data_has_new = false;
        }
        if self.mode_pending {
            self.mode_lowres = self.mode_lowres_shadow;
            self.mode_wob = self.mode_wob_shadow;
            self.mode_pending = false;
        }
        self.dh_intr_cycle = None;
        self.dw_intr_cycle = Some(cycle + 2 * WORD_DURATION);
    }

    fn dw_interrupt(&mut self, cycle: i32) {
        let mut word = self.fifo_pop().unwrap_or(0);
        if self.mode_wob {
            word = !word;
        }
        let line = self.scanline as usize % NUM_SCANLINES;
        if self.mode_lowres {
            let col = (self.word_index as usize * 2).min(WORDS_PER_LINE - 2);
            self.framebuffer[line][col] = word;
            self.framebuffer[line][col + 1] = word;
        } else {
            let col = (self.word_index as usize).min(WORDS_PER_LINE - 1);
            self.framebuffer[line][col] = word;
        }
        self.word_index += 1;

        let threshold = if self.mode_lowres { 19 } else { 38 };
        if self.word_index >= threshold {
            let cursor_col = (self.cursor_x as usize) % WORDS_PER_LINE;
            if self.mode_wob {
                self.framebuffer[line][cursor_col] &= self.cursor_data;
            } else {
                self.framebuffer[line][cursor_col] |= self.cursor_data;
            }
            self.word_index = 0;
            self.scanline += 2;
            if self.scanline as usize >= NUM_SCANLINES {
                self.even_field = !self.even_field;
                self.scanline = u16::from(self.even_field);
                self.vblank_lines = 0;
                self.dw_blocked = true;
                self.dh_blocked = true;
                self.dw_intr_cycle = None;
                self.dh_intr_cycle = None;
                self.dv_intr_cycle = Some(cycle + VBLANK_DURATION);
            } else {
                self.dw_intr_cycle = None;
                self.dh_intr_cycle = Some(cycle + SCANLINE_DURATION - 2 * WORD_DURATION);
            }
        } else {
            self.dw_intr_cycle = Some(cycle + WORD_DURATION);
        }
    }

    /// Services whichever of DV/DH/DW is due at `cycle`, then recomputes
    /// the combined scheduling cycle.
    pub fn interrupt(&mut self, cycle: i32) -> Result<()> {
        if self.dv_intr_cycle == Some(cycle) {
            self.dv_interrupt(cycle);
        }
        if self.dh_intr_cycle == Some(cycle) {
            self.dh_interrupt(cycle);
        }
        if self.dw_intr_cycle == Some(cycle) {
            self.dw_interrupt(cycle);
        }
        self.update_intr_cycle(cycle)
    }

    /// The single earliest of the three scheduled cycles, used by the
    /// engine to decide when this controller needs servicing next.
    pub fn next_intr_cycle(&self) -> Option<i32> {
        [self.dv_intr_cycle, self.dh_intr_cycle, self.dw_intr_cycle]
            .into_iter()
            .flatten()
            .min()
    }

    fn update_intr_cycle(&mut self, cycle: i32) -> Result<()> {
        let candidates = [self.dv_intr_cycle, self.dh_intr_cycle, self.dw_intr_cycle];
        compute_intr_cycle(cycle, false, &candidates)?;
        Ok(())
    }

    pub fn serialize(&self, w: &mut StateWriter) {
        w.put_u16_array(&self.fifo);
        w.put_u8(self.fifo_start);
        w.put_u8(self.fifo_end);
        w.put_u16(self.scanline);
        w.put_u16(self.vblank_lines);
        w.put_bool(self.even_field);
        w.put_u16(self.word_index);
        w.put_u16(self.cursor_x);
        w.put_u16(self.cursor_x_latch);
        w.put_bool(self.cursor_x_has_new);
        w.put_u16(self.cursor_data);
        w.put_u16(self.cursor_data_latch);
        w.put_bool(self.cursor_data_has_new);
        w.put_bool(self.mode_lowres);
        w.put_bool(self.mode_wob);
        w.put_bool(self.mode_lowres_shadow);
        w.put_bool(self.mode_wob_shadow);
        w.put_bool(self.mode_pending);
        w.put_bool(self.dw_blocked);
        w.put_bool(self.dh_blocked);
        w.put_cycle(self.dv_intr_cycle);
        w.put_cycle(self.dh_intr_cycle);
        w.put_cycle(self.dw_intr_cycle);
        w.put_u16(self.pending);
    }

    pub fn deserialize(r: &mut StateReader) -> Result<Self> {
        let mut d = Display::default();
        r.get_u16_array(&mut d.fifo)?;
        d.fifo_start = r.get_u8()?;
        d.fifo_end = r.get_u8()?;
        d.scanline = r.get_u16()?;
        d.vblank_lines = r.get_u16()?;
        d.even_field = r.get_bool()?;
        d.word_index = r.get_u16()?;
        d.cursor_x = r.get_u16()?;
        d.cursor_x_latch = r.get_u16()?;
        d.cursor_x_has_new = r.get_bool()?;
        d.cursor_data = r.get_u16()?;
        d.cursor_data_latch = r.get_u16()?;
        d.cursor_data_has_new = r.get_bool()?;
        d.mode_lowres = r.get_bool()?;
        d.mode_wob = r.get_bool()?;
        d.mode_lowres_shadow = r.get_bool()?;
        d.mode_wob_shadow = r.get_bool()?;
        d.mode_pending = r.get_bool()?;
        d.dw_blocked = r.get_bool()?;
        d.dh_blocked = r.get_bool()?;
        d.dv_intr_cycle = r.get_cycle()?;
        d.dh_intr_cycle = r.get_cycle()?;
        d.dw_intr_cycle = r.get_cycle()?;
        d.pending = r.get_u16()?;
        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_state_matches_documented_quirks() {
        let d = Display::default();
        assert!(d.dw_blocked);
        assert!(!d.dh_blocked);
        assert_eq!(d.dv_intr_cycle, Some(VBLANK_DURATION));
        assert_eq!(d.dh_intr_cycle, None);
        assert_eq!(d.dw_intr_cycle, None);
    }

    #[test]
    fn load_xpreg_inverts_bus() {
        let mut d = Display::default();
        d.load_xpreg(0x00FF);
        assert_eq!(d.cursor_x_latch, !0x00FFu16);
        assert!(d.cursor_x_has_new);
    }

    #[test]
    fn second_xpreg_latch_is_dropped_while_pending() {
        let mut d = Display::default();
        d.load_xpreg(0x1111);
        d.load_xpreg(0x2222);
        assert_eq!(d.cursor_x_latch, !0x1111u16);
    }

    #[test]
    fn dh_interrupt_latches_pending_cursor_values() {
        let mut d = Display::default();
        d.load_xpreg(0);
        d.load_csr(0xABCD);
        d.dh_interrupt(0);
        assert_eq!(d.cursor_x, !0u16);
        assert_eq!(d.cursor_data, 0xABCD);
        assert!(!d.cursor_x_has_new);
        assert_eq!(d.dw_intr_cycle, Some(2 * WORD_DURATION));
    }

    #[test]
    fn load_ddr_wakes_word_task_when_unblocked() {
        let mut d = Display::default();
        d.dw_blocked = false;
        d.load_ddr(0x1234).unwrap();
        assert_ne!(d.pending & (1 << TASK_DISPLAY_WORD), 0);
    }

    #[test]
    fn dv_interrupt_unblocks_after_threshold_lines() {
        let mut d = Display::default();
        for _ in 0..33 {
            d.dv_interrupt(0);
        }
        assert!(!d.dw_blocked);
        assert!(!d.dh_blocked);
        assert!(d.dh_intr_cycle.is_some());
    }

    #[test]
    fn block_word_task_also_wakes_horizontal_task() {
        let mut d = Display::default();
        d.block_task(TASK_DISPLAY_WORD);
        assert!(d.dw_blocked);
        assert_ne!(d.pending & (1 << TASK_DISPLAY_HORIZONTAL), 0);
    }

    #[test]
    fn setmode_reports_lowres_request() {
        let mut d = Display::default();
        assert_eq!(d.setmode(0x1), 1);
        assert_eq!(d.setmode(0x2), 0);
    }
}
