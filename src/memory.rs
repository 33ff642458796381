//! Main memory: 4 banks of 64K words, extended-memory banking, the I/O
//! address window, and the memory-access timing window (§4.6).

use crate::keyboard::Keyboard;
use crate::mouse::Mouse;
use crate::registers::BankSelectors;
use crate::system::SystemType;

pub const NUM_BANKS: usize = 4;
pub const MEMORY_SIZE: usize = 0x10000;

const IO_BASE: u16 = 0xFE00;
const KEYBOARD_BASE: u16 = 0xFE1C;
const MOUSE_BASE: u16 = 0xFE18;
const DONT_CARE_LOW: u16 = 0xFEF0;
const DONT_CARE_HIGH: u16 = 0xFFDF;
const XM_BANK_BASE: u16 = 0xFFE0;

pub const MA_EXTENDED: u16 = 0x01;
pub const MA_HAS_STORE: u16 = 0x02;

/// The in-flight memory-access window opened by a `LOAD_MAR`.
#[derive(Debug, Clone, Default)]
pub struct MemoryWindow {
    pub mem_cycle: u16,
    pub mem_task: u8,
    pub mem_low: u16,
    pub mem_high: u16,
    pub mem_status: u16,
}

/// Four 64K-word banks of main memory plus the in-flight access window.
pub struct Memory {
    pub banks: Vec<Vec<u16>>,
    pub window: MemoryWindow,
}

impl Default for Memory {
    fn default() -> Self {
        Memory {
            banks: (0..NUM_BANKS).map(|_| vec![0u16; MEMORY_SIZE]).collect(),
            window: MemoryWindow::default(),
        }
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("banks", &format!("[{} x {} words]", NUM_BANKS, MEMORY_SIZE))
            .field("window", &self.window)
            .finish()
    }
}

impl Memory {
    /// Resolves the 0..4 bank index for `addr` given the current task's
    /// XM bank register and whether this is an extended access.
    fn bank_index(xm: u16, extended: bool) -> usize {
        if extended {
            (xm & 0x3) as usize
        } else {
            ((xm >> 2) & 0x3) as usize
        }
    }

    /// Reads a word, routing I/O addresses through keyboard/mouse/XM-bank
    /// register handling before falling back to a plain bank access.
    pub fn read(
        &self,
        addr: u16,
        task: u8,
        extended: bool,
        banks: &BankSelectors,
        keyboard: &Keyboard,
        mouse: &mut Mouse,
    ) -> u16 {
        if addr >= IO_BASE {
            if (KEYBOARD_BASE..=0xFE1F).contains(&addr) {
                return keyboard.read_word((addr - KEYBOARD_BASE) as usize & 0x3);
            }
            if (MOUSE_BASE..=0xFE1B).contains(&addr) {
                return mouse.read_buttons();
            }
            if (XM_BANK_BASE..=0xFFEF).contains(&addr) {
                let task_idx = (addr - XM_BANK_BASE) as usize & 0xF;
                return banks.xm_banks[task_idx.min(banks.xm_banks.len() - 1)];
            }
            if (DONT_CARE_LOW..=DONT_CARE_HIGH).contains(&addr) {
                return 0xFFFF;
            }
            return 0xFFFF;
        }
        let bank = Self::bank_index(banks.xm_banks[task as usize], extended);
        self.banks[bank][addr as usize]
    }

    /// Writes a word, routing XM bank register writes appropriately and
    /// silently discarding writes to other I/O addresses (the hardware
    /// has no writable latch there besides the bank registers).
    pub fn write(&mut self, addr: u16, value: u16, task: u8, extended: bool, banks: &mut BankSelectors) {
        if addr >= IO_BASE {
            if (XM_BANK_BASE..=0xFFEF).contains(&addr) {
                let task_idx = (addr - XM_BANK_BASE) as usize & 0xF;
                if task_idx < banks.xm_banks.len() {
                    banks.xm_banks[task_idx] = value;
                }
            }
            return;
        }
        let bank = Self::bank_index(banks.xm_banks[task as usize], extended);
        self.banks[bank][addr as usize] = value;
    }

    /// Opens a new memory-access window for a `LOAD_MAR`, immediately
    /// latching the low and high words (§4.6).
    pub fn load_mar(
        &mut self,
        sys_type: SystemType,
        mar: u16,
        task: u8,
        extended: bool,
        banks: &BankSelectors,
        keyboard: &Keyboard,
        mouse: &mut Mouse,
    ) {
        self.window.mem_task = task;
        self.window.mem_cycle = 1;
        self.window.mem_status = if extended { MA_EXTENDED } else { 0 };

        self.window.mem_low = self.read(mar, task, extended, banks, keyboard, mouse);
        let partner = if sys_type == SystemType::AltoI {
            mar | 1
        } else {
            mar ^ 1
        };
        self.window.mem_high = self.read(partner, task, extended, banks, keyboard, mouse);
    }

    /// Advances the window's cycle counter, saturating at 10 once the
    /// window has closed (mirrors `update_cycles`'s memory-cycle clamp).
    pub fn tick_window(&mut self) {
        if self.window.mem_cycle != 0xFFFF && self.window.mem_cycle < 10 {
            self.window.mem_cycle += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bank_read_write_round_trips() {
        let mut mem = Memory::default();
        let mut banks = BankSelectors::default();
        let keyboard = Keyboard::default();
        let mut mouse = Mouse::default();
        mem.write(0x1234, 0xBEEF, TASK_EMULATOR_FOR_TEST, false, &mut banks);
        assert_eq!(
            mem.read(0x1234, TASK_EMULATOR_FOR_TEST, false, &banks, &keyboard, &mut mouse),
            0xBEEF
        );
    }

    #[test]
    fn xm_bank_register_write_then_read() {
        let mut mem = Memory::default();
        let mut banks = BankSelectors::default();
        let keyboard = Keyboard::default();
        let mut mouse = Mouse::default();
        mem.write(0xFFE0, 0x0005, 0, false, &mut banks);
        assert_eq!(banks.xm_banks[0], 0x0005);
        assert_eq!(
            mem.read(0xFFE0, 0, false, &banks, &keyboard, &mut mouse),
            0x0005
        );
    }

    #[test]
    fn dont_care_range_returns_fixed_value() {
        let mem = Memory::default();
        let banks = BankSelectors::default();
        let keyboard = Keyboard::default();
        let mut mouse = Mouse::default();
        assert_eq!(
            mem.read(0xFE50, 0, false, &banks, &keyboard, &mut mouse),
            0xFFFF
        );
    }

    const TASK_EMULATOR_FOR_TEST: u8 = 0;
}
