//! The Alto system variants this crate can emulate.

/// Which physical Alto variant is being emulated. Affects microcode bank
/// layout, memory-access window timing, and SWMODE bank-selection tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemType {
    AltoI,
    AltoIi1KRom,
    AltoIi2KRom,
    AltoIi3KRam,
}

impl SystemType {
    /// Number of 1024-word microcode banks this variant has (ROM + RAM).
    pub fn num_microcode_banks(self) -> usize {
        match self {
            SystemType::AltoI => 2,
            SystemType::AltoIi1KRom => 2,
            SystemType::AltoIi2KRom => 3,
            SystemType::AltoIi3KRam => 4,
        }
    }

    /// Memory-access window duration, in cycles, for a `LOAD_MAR`.
    pub fn mar_window_cycles(self) -> u16 {
        match self {
            SystemType::AltoI => 7,
            _ => 5,
        }
    }

    /// True if this variant has the 3K-RAM S-register bank selection.
    pub fn has_sreg_banks(self) -> bool {
        matches!(self, SystemType::AltoIi3KRam)
    }

    /// Default microcode bank a task's MPC resets into after a soft
    /// reset, for tasks whose RMR bit is set.
    pub fn default_reset_bank(self) -> u16 {
        match self {
            SystemType::AltoIi2KRom => 2,
            _ => 1,
        }
    }
}
