//! The F2 function: ALU/shifter condition bits, `<-MD`, and the
//! per-task dispatch to the peripheral controllers. Mirrors `do_f2`
//! from the reference implementation.

use crate::error::{Error, Result};
use crate::memory::MA_HAS_STORE;
use crate::microcode::*;
use crate::system::SystemType;
use crate::task::{
    TASK_CURSOR, TASK_DISK_SECTOR, TASK_DISK_WORD, TASK_DISPLAY_HORIZONTAL, TASK_DISPLAY_VERTICAL, TASK_DISPLAY_WORD,
    TASK_EMULATOR, TASK_ETHERNET,
};

use super::Engine;

/// Performs the F2 function. Returns the bits to fold into the NEXT
/// field of the *following* microinstruction.
pub fn do_f2(engine: &mut Engine, mc: &Microcode, bus: u16, shifter_output: u16, nova_carry: bool) -> Result<u16> {
    match mc.f2 {
        F2_NONE => return Ok(0),
        F2_CONSTANT => return Ok(0),
        F2_BUSEQ0 => return Ok(u16::from(bus == 0)),
        F2_SHLT0 => return Ok(u16::from(shifter_output & 0x8000 != 0)),
        F2_SHEQ0 => return Ok(u16::from(shifter_output == 0)),
        F2_BUS => return Ok(bus & 0x3FF),
        F2_ALUCY => return Ok(u16::from(engine.scalars.alu_c0)),
        F2_STORE_MD => {
            if mc.f1 == F1_LOAD_MAR && mc.sys_type != SystemType::AltoI {
                // On Alto II, MAR<- and <-MD in the same microinstruction
                // becomes XMAR<-.
                return Ok(0);
            }
            let mut addr = engine.scalars.mar;
            if mc.sys_type == SystemType::AltoI {
                while engine.memory.window.mem_cycle < 5 {
                    engine.update_cycles();
                }
                match engine.memory.window.mem_cycle {
                    5 => engine.memory.window.mem_status |= MA_HAS_STORE,
                    6 => {
                        if engine.memory.window.mem_status & MA_HAS_STORE == 0 {
                            return Err(Error::Microcode("first write on cycle 6".into()));
                        }
                        addr |= 1;
                    }
                    _ => return Err(Error::Microcode("unexpected write memory cycle".into())),
                }
            } else {
                while engine.memory.window.mem_cycle < 3 {
                    engine.update_cycles();
                }
                match engine.memory.window.mem_cycle {
                    3 => engine.memory.window.mem_status |= MA_HAS_STORE,
                    4 => {
                        if engine.memory.window.mem_status & MA_HAS_STORE != 0 {
                            addr ^= 1;
                        }
                    }
                    _ => return Err(Error::Microcode("unexpected write memory cycle".into())),
                }
            }
            engine.mem_write(addr, bus);
            return Ok(0);
        }
        _ => {}
    }

    match mc.task {
        TASK_EMULATOR => match mc.f2 {
            F2_EMU_MAGIC | F2_EMU_ACDEST => Ok(0),
            F2_EMU_BUSODD => Ok(bus & 1),
            F2_EMU_LOAD_DNS => {
                let ir = engine.scalars.ir;
                engine.scalars.skip = match ir & 7 {
                    0 => false,
                    1 => true,
                    2 => !nova_carry,
                    3 => nova_carry,
                    4 => shifter_output == 0,
                    5 => shifter_output != 0,
                    6 => shifter_output == 0 || !nova_carry,
                    _ => shifter_output != 0 && nova_carry,
                };
                if ir & 0x0008 == 0 {
                    engine.scalars.carry = nova_carry;
                }
                Ok(0)
            }
            F2_EMU_LOAD_IR => {
                engine.scalars.ir = bus;
                engine.scalars.skip = false;
                let mut next_extra = (bus >> 8) & 0x7;
                if bus & 0x8000 != 0 {
                    next_extra |= 0x8;
                }
                Ok(next_extra)
            }
            F2_EMU_IDISP => {
                let ir = engine.scalars.ir;
                if ir & 0x8000 != 0 {
                    Ok(3 - ((ir >> 6) & 3))
                } else {
                    Ok(engine.acs_rom[(((ir >> 8) & 0x7F) + 0x80) as usize] as u16)
                }
            }
            F2_EMU_ACSOURCE => {
                let ir = engine.scalars.ir;
                if ir & 0x8000 != 0 {
                    Ok(3 - ((ir >> 6) & 3))
                } else {
                    Ok(engine.acs_rom[((ir >> 8) & 0x7F) as usize] as u16)
                }
            }
            other => Err(Error::Microcode(format!("invalid F2 function {other:#o} for emulator"))),
        },
        TASK_DISK_SECTOR | TASK_DISK_WORD => match mc.f2 {
            F2_DSK_INIT => Ok(engine.disk.func_init(mc.task)),
            F2_DSK_RWC => Ok(engine.disk.func_rwc(mc.task)),
            F2_DSK_RECNO => Ok(engine.disk.func_recno(mc.task)),
            F2_DSK_XFRDAT => Ok(engine.disk.func_xfrdat(mc.task)),
            F2_DSK_SWRNRDY => Ok(engine.disk.func_swrnrdy(mc.task)),
            F2_DSK_NFER => Ok(engine.disk.func_nfer(mc.task)),
            F2_DSK_STROBON => Ok(engine.disk.func_strobon(mc.task)),
            other => Err(Error::Microcode(format!("invalid F2 function {other:#o} for disk tasks"))),
        },
        TASK_ETHERNET => match mc.f2 {
            F2_ETH_EODFCT => {
                engine.ethernet.eodfct(bus, engine.cycle)?;
                Ok(0)
            }
            F2_ETH_EOSFCT => {
                engine.ethernet.eosfct();
                Ok(0)
            }
            F2_ETH_ERBFCT => Ok(engine.ethernet.erbfct()),
            F2_ETH_EEFCT => {
                engine.ethernet.eefct(engine.cycle)?;
                Ok(0)
            }
            F2_ETH_EBFCT => Ok(engine.ethernet.ebfct()),
            F2_ETH_ECBFCT => Ok(engine.ethernet.ecbfct()),
            F2_ETH_EISFCT => {
                engine.ethernet.eisfct(engine.cycle, engine.transport.as_mut())?;
                Ok(0)
            }
            other => Err(Error::Microcode(format!("invalid F2 function {other:#o} for ethernet"))),
        },
        TASK_DISPLAY_WORD => match mc.f2 {
            F2_DW_LOAD_DDR => {
                engine.display.load_ddr(bus)?;
                Ok(0)
            }
            other => Err(Error::Microcode(format!("invalid F2 function {other:#o} for display word"))),
        },
        TASK_CURSOR => match mc.f2 {
            F2_CUR_LOAD_XPREG => {
                engine.display.load_xpreg(bus);
                Ok(0)
            }
            F2_CUR_LOAD_CSR => {
                engine.display.load_csr(bus);
                Ok(0)
            }
            other => Err(Error::Microcode(format!("invalid F2 function {other:#o} for cursor"))),
        },
        TASK_DISPLAY_HORIZONTAL => match mc.f2 {
            F2_DH_EVENFIELD => Ok(engine.display.evenfield()),
            F2_DH_SETMODE => Ok(engine.display.setmode(bus)),
            other => Err(Error::Microcode(format!("invalid F2 function {other:#o} for display horizontal"))),
        },
        TASK_DISPLAY_VERTICAL => match mc.f2 {
            F2_DV_EVENFIELD => Ok(engine.display.evenfield()),
            other => Err(Error::Microcode(format!("invalid F2 function {other:#o} for display vertical"))),
        },
        _ => Err(Error::Microcode(format!("invalid F2 function {:#o}", mc.f2))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemType;

    #[test]
    fn load_ir_splits_next_extra_from_high_bits() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        let mir = (F2_EMU_LOAD_IR as u32) << 12;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_EMULATOR);
        let next_extra = do_f2(&mut engine, &mc, 0x8700, 0, false).unwrap();
        assert_eq!(engine.scalars.ir, 0x8700);
        assert_eq!(next_extra, 0xF);
    }

    #[test]
    fn dns_skp_always_skips() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.scalars.ir = 0o000001;
        let mir = (F2_EMU_LOAD_DNS as u32) << 12;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_EMULATOR);
        do_f2(&mut engine, &mc, 0, 0, false).unwrap();
        assert!(engine.scalars.skip);
    }

    #[test]
    fn busodd_reports_low_bit() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        let mir = (F2_EMU_BUSODD as u32) << 12;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_EMULATOR);
        assert_eq!(do_f2(&mut engine, &mc, 0x0003, 0, false).unwrap(), 1);
    }

    #[test]
    fn invalid_f2_for_display_vertical_is_an_error() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        let mir = (F2_CUR_LOAD_CSR as u32) << 12;
        let mc = predecode(SystemType::AltoIi2KRom, mir, TASK_DISPLAY_VERTICAL);
        assert!(do_f2(&mut engine, &mc, 0, 0, false).is_err());
    }
}
