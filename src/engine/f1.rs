//! The F1 function: memory-access control, task switching, BLOCK, and
//! the per-task special registers. Mirrors `do_f1` from the reference
//! implementation.

use crate::error::{Error, Result};
use crate::microcode::*;
use crate::system::SystemType;
use crate::task::{highest_priority_pending, TASK_DISK_SECTOR, TASK_DISK_WORD, TASK_EMULATOR, TASK_ETHERNET};

use super::Engine;

/// Performs the F1 function. Returns the next task (absent a later
/// override from a different stage) and whether a SWMODE bank swap was
/// requested.
pub fn do_f1(engine: &mut Engine, mc: &Microcode, bus: u16, alu: u16) -> Result<(u8, bool)> {
    let ntask = engine.scalars.ntask;

    match mc.f1 {
        F1_NONE | F1_CONSTANT | F1_LLSH1 | F1_LRSH1 | F1_LLCY8 => return Ok((ntask, false)),
        F1_LOAD_MAR => {
            let min_cycles = if mc.sys_type == SystemType::AltoI { 7 } else { 5 };
            while engine.memory.window.mem_cycle < min_cycles {
                engine.update_cycles();
            }
            let extended = mc.sys_type != SystemType::AltoI && mc.f2 == F2_STORE_MD;
            engine.load_mar(alu, mc.task, extended);
            if mc.task == crate::task::TASK_MEMORY_REFRESH && mc.sys_type == SystemType::AltoI && mc.rsel == 0o37 {
                engine.display.pending &= !(1 << mc.task);
            }
            return Ok((ntask, false));
        }
        F1_TASK => {
            if engine.scalars.task_switch {
                return Ok((ntask, false));
            }
            let pending = engine.get_pending();
            return Ok((highest_priority_pending(pending), false));
        }
        F1_BLOCK => {
            if mc.task == TASK_EMULATOR {
                return Err(Error::Microcode("emulator task cannot block".into()));
            }
            // Actually performing the block is deferred to `do_block`,
            // called by the caller once this stage completes, to avoid
            // racing F2 functions that check the task's blocked state.
            return Ok((ntask, false));
        }
        _ => {}
    }

    if mc.ram_task {
        match mc.f1 {
            F1_RAM_SWMODE => {
                if mc.task != TASK_EMULATOR {
                    return Err(Error::Microcode("SWMODE only allowed in emulator task".into()));
                }
                return Ok((ntask, true));
            }
            F1_RAM_WRTRAM => {
                engine.scalars.wrtram = true;
                return Ok((ntask, false));
            }
            F1_RAM_RDRAM => {
                engine.scalars.rdram = true;
                return Ok((ntask, false));
            }
            F1_RAM_LOAD_SRB if mc.task != TASK_EMULATOR => {
                let mut tmp = ((bus >> 1) & 0x7) as u8;
                if mc.sys_type != SystemType::AltoIi3KRam {
                    tmp = 0;
                }
                engine.banks.sreg_banks[mc.task as usize] = tmp;
                return Ok((ntask, false));
            }
            _ => {}
        }
    }

    match mc.task {
        TASK_EMULATOR => match mc.f1 {
            F1_EMU_LOAD_RMR => engine.scalars.rmr = bus,
            F1_EMU_LOAD_ESRB => {
                let mut tmp = ((bus >> 1) & 0x7) as u8;
                if mc.sys_type != SystemType::AltoIi3KRam {
                    tmp = 0;
                }
                engine.banks.sreg_banks[TASK_EMULATOR as usize] = tmp;
            }
            F1_EMU_RSNF => {
                // Already folded into the bus value by `read_bus`.
            }
            F1_EMU_STARTF => {
                if bus & 0x8000 != 0 {
                    engine.scalars.soft_reset = true;
                } else {
                    match bus {
                        0x00 => {}
                        0x01..=0x03 => engine.ethernet.startf(bus),
                        0x04 => { /* Orbit, not emulated. */ }
                        0x10 | 0x20 => { /* Trident, not emulated. */ }
                        other => return Err(Error::Microcode(format!("invalid STARTF value: {other:#o}"))),
                    }
                }
            }
            other => return Err(Error::Microcode(format!("invalid F1 function {other:#o} for emulator"))),
        },
        TASK_DISK_SECTOR | TASK_DISK_WORD => match mc.f1 {
            F1_DSK_STROBE => engine.disk.func_strobe(engine.cycle)?,
            F1_DSK_LOAD_KSTAT => engine.disk.load_kstat(bus),
            F1_DSK_INCRECNO => engine.disk.func_increcno()?,
            F1_DSK_CLRSTAT => engine.disk.func_clrstat(),
            F1_DSK_LOAD_KCOMM => engine.disk.load_kcomm(bus),
            F1_DSK_LOAD_KADR => engine.disk.load_kadr(bus),
            F1_DSK_LOAD_KDATA => engine.disk.load_kdata(bus),
            other => return Err(Error::Microcode(format!("invalid F1 function {other:#o} for disk tasks"))),
        },
        TASK_ETHERNET => match mc.f1 {
            F1_ETH_EILFCT | F1_ETH_EPFCT => {
                // Already folded into the bus value by `read_bus`.
            }
            F1_ETH_EWFCT => engine.ethernet.ewfct(),
            other => return Err(Error::Microcode(format!("invalid F1 function {other:#o} for ethernet"))),
        },
        _ => {}
    }

    Ok((ntask, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemType;

    #[test]
    fn task_switch_picks_highest_priority_pending() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.disk.pending |= 1 << TASK_DISK_SECTOR;
        let mir = (F1_TASK as u32) << 16;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_EMULATOR);
        let (nntask, swmode) = do_f1(&mut engine, &mc, 0, 0).unwrap();
        assert_eq!(nntask, TASK_DISK_SECTOR);
        assert!(!swmode);
    }

    #[test]
    fn block_on_emulator_task_is_an_error() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        let mir = (F1_BLOCK as u32) << 16;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_EMULATOR);
        assert!(do_f1(&mut engine, &mc, 0, 0).is_err());
    }

    #[test]
    fn swmode_only_allowed_for_emulator() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        let mir = (F1_RAM_SWMODE as u32) << 16;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_DISK_SECTOR);
        assert!(do_f1(&mut engine, &mc, 0, 0).is_err());
    }

    /// `F1_DSK_STROBE` collides numerically with `F1_RAM_WRTRAM` (both
    /// 0o11). A disk-task STROBE must still reach `Disk::func_strobe`
    /// rather than being swallowed by the generic RAM-task block.
    #[test]
    fn disk_strobe_dispatches_to_disk_not_the_ram_task_block() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.disk.drives[0].loaded = true;
        engine.disk.load_kcomm(1 << 10); // sets KCOMM_SENDADR
        engine.disk.load_kdata(5 << 3); // cylinder 5, head/disk/restore bits clear

        let mir = (F1_DSK_STROBE as u32) << 16;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_DISK_SECTOR);
        do_f1(&mut engine, &mc, 0, 0).unwrap();

        assert!(engine.disk.seek_intr_cycle.is_some());
        assert_eq!(engine.disk.drives[0].target_cylinder, 5);
        assert!(!engine.scalars.wrtram, "STROBE must not be swallowed by the RAM-task WRTRAM case");
    }

    #[test]
    fn rdram_sets_the_pending_flag() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        let mir = (F1_RAM_RDRAM as u32) << 16;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_EMULATOR);
        do_f1(&mut engine, &mc, 0, 0).unwrap();
        assert!(engine.scalars.rdram);
    }
}
