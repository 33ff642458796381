//! The bus: the open-collector AND-wired dispatch that feeds every
//! other stage of a cycle (§4.1 "Bus"). Mirrors `read_bus` from the
//! reference implementation.

use crate::error::{Error, Result};
use crate::microcode::*;
use crate::task::{TASK_DISK_SECTOR, TASK_DISK_WORD, TASK_EMULATOR, TASK_ETHERNET};

use super::Engine;

/// Computes the bus value for the current microinstruction. `modified_rsel`
/// is the RSEL as adjusted by `Engine::modified_rsel` for ACSOURCE/ACDEST/
/// LOAD_DNS; `mc.rsel` (the raw field) is used instead wherever the
/// hardware reads the S-register file directly.
pub fn read_bus(engine: &mut Engine, mc: &Microcode, modified_rsel: u8) -> Result<u16> {
    let mut output = engine.do_rdram()?;

    if mc.use_constant {
        // The constant ROM masks the raw RDRAM value; modified_rsel is
        // not used here, only the raw RSEL/BS pair baked into const_addr.
        output &= engine.constant_rom[mc.const_addr as usize & 0xFF];
        return Ok(output);
    }

    if mc.bs_use_crom {
        output &= engine.constant_rom[mc.const_addr as usize & 0xFF];
    }

    if mc.task == TASK_EMULATOR && mc.f1 == F1_EMU_RSNF {
        output &= engine.ethernet.rsnf();
    } else if mc.task == TASK_ETHERNET {
        if mc.f1 == F1_ETH_EILFCT {
            output &= engine.ethernet.eilfct();
        } else if mc.f1 == F1_ETH_EPFCT {
            output &= engine.ethernet.epfct(engine.transport.as_mut());
        }
    }

    match mc.bs {
        BS_READ_R => output &= engine.registers.r[modified_rsel as usize & 0x1F],
        BS_LOAD_R => output &= 0,
        BS_NONE => {}
        BS_READ_MD => {
            while engine.memory.window.mem_cycle < 5 {
                engine.update_cycles();
            }
            if mc.sys_type == crate::system::SystemType::AltoI {
                match engine.memory.window.mem_cycle {
                    5 => output &= engine.memory.window.mem_low,
                    6 => output &= engine.memory.window.mem_high,
                    _ => return Err(Error::Microcode("unexpected read memory cycle".into())),
                }
            } else if engine.memory.window.mem_cycle == 5 {
                if engine.memory.window.mem_status & crate::memory::MA_HAS_STORE != 0 {
                    output &= engine.memory.window.mem_high;
                } else {
                    output &= engine.memory.window.mem_low;
                }
            } else if engine.memory.window.mem_cycle == 6 {
                output &= engine.memory.window.mem_high;
            } else {
                output &= engine.memory.window.mem_low;
            }
        }
        BS_READ_MOUSE => output &= engine.mouse.poll_bits(),
        BS_READ_DISP => {
            let ir = engine.scalars.ir;
            let mut t = ir & 0x00FF;
            if ir & 0x300 != 0 && ir & 0x80 != 0 {
                t |= 0xFF00;
            }
            output &= t;
        }
        _ => {
            if mc.task == TASK_EMULATOR && mc.ram_task {
                let rb = engine.banks.sreg_banks[mc.task as usize];
                if mc.bs == BS_TASK_SPECIFIC1 {
                    if mc.rsel == 0 {
                        output &= engine.scalars.m;
                    } else {
                        output &= engine.registers.s_at(rb, mc.rsel);
                    }
                } else if mc.bs == BS_TASK_SPECIFIC2 {
                    output &= 0xFFFF;
                } else {
                    return Err(Error::Microcode("invalid bus source".into()));
                }
            } else if mc.task == TASK_ETHERNET && mc.bs == BS_ETH_EIDFCT {
                output &= engine.ethernet.eidfct();
            } else if mc.task == TASK_DISK_SECTOR || mc.task == TASK_DISK_WORD {
                if mc.bs == BS_DSK_READ_KSTAT {
                    output &= engine.disk.read_kstat();
                } else if mc.bs == BS_DSK_READ_KDATA {
                    output &= engine.disk.read_kdata();
                } else {
                    return Err(Error::Microcode("invalid bus source".into()));
                }
            } else {
                return Err(Error::Microcode("invalid bus source".into()));
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemType;

    #[test]
    fn read_r_masks_with_register_contents() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.registers.r[5] = 0xBEEF;
        let mc = predecode(SystemType::AltoIi2KRom, 0, TASK_EMULATOR);
        let bus = read_bus(&mut engine, &mc, 5).unwrap();
        assert_eq!(bus, 0xBEEF);
    }

    #[test]
    fn load_r_reads_as_zero() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        let mir = (BS_LOAD_R as u32) << 20;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_EMULATOR);
        let bus = read_bus(&mut engine, &mc, 0).unwrap();
        assert_eq!(bus, 0);
    }

    #[test]
    fn disk_kstat_is_reachable_for_disk_tasks() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        let mir = (BS_DSK_READ_KSTAT as u32) << 20;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_DISK_SECTOR);
        let bus = read_bus(&mut engine, &mc, 0).unwrap();
        assert_eq!(bus, engine.disk.read_kstat());
    }
}
