//! Program counter update, SWMODE bank remapping, and soft reset.
//! Mirrors `update_program_counters` and `do_soft_reset` from the
//! reference implementation.

use crate::system::SystemType;
use crate::task::{
    NUM_TASKS, TASK_CURSOR, TASK_DISK_SECTOR, TASK_DISK_WORD, TASK_DISPLAY_HORIZONTAL, TASK_DISPLAY_VERTICAL,
    TASK_DISPLAY_WORD, TASK_EMULATOR,
};

use super::{Engine, MPC_ADDR_MASK, MPC_BANK_MASK, MPC_BANK_SHIFT};

/// Computes the post-SWMODE bank index for the upcoming address,
/// per-variant (§4.1 "SWMODE").
fn remap_bank(sys_type: SystemType, bank: u16, next_addr: u16) -> u16 {
    match sys_type {
        SystemType::AltoI | SystemType::AltoIi1KRom => bank ^ 1,
        SystemType::AltoIi2KRom => match bank {
            0 => {
                if next_addr & 0x100 != 0 {
                    1
                } else {
                    2
                }
            }
            1 => {
                if next_addr & 0x100 != 0 {
                    2
                } else {
                    0
                }
            }
            2 => {
                if next_addr & 0x100 != 0 {
                    1
                } else {
                    0
                }
            }
            other => other,
        },
        SystemType::AltoIi3KRam => {
            if next_addr & 0x100 != 0 {
                match bank {
                    0 => {
                        if next_addr & 0x80 != 0 {
                            1
                        } else {
                            2
                        }
                    }
                    1 => 2,
                    2 | 3 => 1,
                    other => other,
                }
            } else {
                match bank {
                    0 => {
                        if next_addr & 0x80 != 0 {
                            3
                        } else {
                            1
                        }
                    }
                    1 | 2 => {
                        if next_addr & 0x80 != 0 {
                            3
                        } else {
                            0
                        }
                    }
                    3 => {
                        if next_addr & 0x80 != 0 {
                            2
                        } else {
                            0
                        }
                    }
                    other => other,
                }
            }
        }
    }
}

/// Updates the MPC/MIR for the about-to-run task and latches the next
/// task decided by this cycle's F1. Dispatches `on_switch_task` to the
/// display/disk controllers on an actual task change.
pub fn update_program_counters(engine: &mut Engine, next_extra: u16, nntask: u8, swmode: bool) {
    engine.scalars.task_switch = engine.scalars.ctask != engine.scalars.ntask;
    engine.scalars.ctask = engine.scalars.ntask;

    let task = engine.scalars.ctask;
    let mpc = engine.task_mpc[task as usize];
    let mcode = engine.microcode[mpc as usize];

    let next_addr = ((mcode as u16) & MPC_ADDR_MASK) | next_extra;
    let mut bank = (mpc >> MPC_BANK_SHIFT) & MPC_BANK_MASK;
    if swmode {
        bank = remap_bank(engine.sys_type, bank, next_addr);
    }
    engine.task_mpc[task as usize] = (bank << MPC_BANK_SHIFT) | next_addr;

    engine.scalars.mir = mcode;
    engine.scalars.mpc = mpc;
    engine.scalars.ntask = nntask;

    if !engine.scalars.task_switch {
        return;
    }

    match engine.scalars.ctask {
        TASK_DISPLAY_WORD | TASK_DISPLAY_HORIZONTAL | TASK_DISPLAY_VERTICAL | TASK_CURSOR => {
            engine.display.on_switch_task(engine.scalars.ctask);
        }
        TASK_DISK_SECTOR | TASK_DISK_WORD => {
            engine.disk.on_switch_task(engine.scalars.ctask);
        }
        _ => {}
    }
}

/// Performs a soft reset: rebinds every task's MPC into ROM0 or the
/// variant's reset RAM bank depending on its RMR bit, and applies the
/// disk-pending hack copied from the reference implementation.
pub fn do_soft_reset(engine: &mut Engine) {
    engine.banks.xm_banks = [0; NUM_TASKS];
    let bank = engine.sys_type.default_reset_bank();

    for task in 0..NUM_TASKS {
        let addr = if (1 << task) & engine.scalars.rmr != 0 {
            task as u16
        } else {
            (bank << MPC_BANK_SHIFT) | task as u16
        };
        engine.task_mpc[task] = addr;
    }

    engine.scalars.ctask = TASK_EMULATOR;
    engine.scalars.ntask = TASK_EMULATOR;
    engine.scalars.mpc = engine.task_mpc[TASK_EMULATOR as usize];
    engine.scalars.mir = engine.microcode[engine.scalars.mpc as usize];
    let bank2 = (engine.scalars.mpc >> MPC_BANK_SHIFT) & MPC_BANK_MASK;
    engine.task_mpc[TASK_EMULATOR as usize] = (bank2 << MPC_BANK_SHIFT) | ((engine.scalars.mir as u16) & MPC_ADDR_MASK);

    // Hack copied from ContrAlto.
    engine.disk.pending |= 1 << TASK_DISK_SECTOR;
    engine.disk.pending &= !(1 << TASK_DISK_WORD);
    engine.scalars.rmr = 0xFFFF;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swmode_toggles_between_rom_banks_on_alto_i() {
        assert_eq!(remap_bank(SystemType::AltoI, 0, 0), 1);
        assert_eq!(remap_bank(SystemType::AltoI, 1, 0), 0);
    }

    #[test]
    fn soft_reset_applies_disk_pending_hack() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.disk.pending = 1 << TASK_DISK_WORD;
        do_soft_reset(&mut engine);
        assert_ne!(engine.disk.pending & (1 << TASK_DISK_SECTOR), 0);
        assert_eq!(engine.disk.pending & (1 << TASK_DISK_WORD), 0);
        assert_eq!(engine.scalars.rmr, 0xFFFF);
    }

    #[test]
    fn soft_reset_resets_ctask_to_emulator() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.scalars.ctask = TASK_DISK_SECTOR;
        do_soft_reset(&mut engine);
        assert_eq!(engine.scalars.ctask, TASK_EMULATOR);
        assert_eq!(engine.scalars.ntask, TASK_EMULATOR);
    }
}
