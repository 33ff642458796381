//! Microword bit layout, predecode, and the RSEL/ALUF/BS/F1/F2 constant
//! tables. Mirrors `microcode.h` from the reference implementation.

use crate::system::SystemType;
use crate::task::TASK_EMULATOR;

pub const CONSTANT_SIZE: usize = 256;
pub const MICROCODE_SIZE: usize = 1024;
pub const R_MASK: u16 = 0o37;

/// XOR mask the hardware (and this emulator) applies to every microword
/// on both read and write of microcode RAM.
pub const MC_INVERT_MASK: u32 = 0x00088400;

// ALU function codes (ALUF field).
pub const ALU_BUS: u8 = 0;
pub const ALU_T: u8 = 0o1;
pub const ALU_BUS_OR_T: u8 = 0o2;
pub const ALU_BUS_AND_T: u8 = 0o3;
pub const ALU_BUS_XOR_T: u8 = 0o4;
pub const ALU_BUS_PLUS_1: u8 = 0o5;
pub const ALU_BUS_MINUS_1: u8 = 0o6;
pub const ALU_BUS_PLUS_T: u8 = 0o7;
pub const ALU_BUS_MINUS_T: u8 = 0o10;
pub const ALU_BUS_MINUS_T_MINUS_1: u8 = 0o11;
pub const ALU_BUS_PLUS_T_PLUS_1: u8 = 0o12;
pub const ALU_BUS_PLUS_SKIP: u8 = 0o13;
pub const ALU_BUS_AND_T_WB: u8 = 0o14;
pub const ALU_BUS_AND_NOT_T: u8 = 0o15;
pub const ALU_UNDEFINED1: u8 = 0o16;
pub const ALU_UNDEFINED2: u8 = 0o17;

const LOAD_T_FROM_ALU_MASK: u32 = 0x1C65;

/// Whether LoadT should take its value directly from the ALU result
/// (rather than from the raw bus) for a given ALUF code.
pub fn load_t_from_alu(aluf: u8) -> bool {
    (1u32 << aluf) & LOAD_T_FROM_ALU_MASK != 0
}

// BS (bus select) field.
pub const BS_READ_R: u8 = 0;
pub const BS_LOAD_R: u8 = 0o1;
pub const BS_NONE: u8 = 0o2;
pub const BS_TASK_SPECIFIC1: u8 = 0o3;
pub const BS_TASK_SPECIFIC2: u8 = 0o4;
pub const BS_READ_MD: u8 = 0o5;
pub const BS_READ_MOUSE: u8 = 0o6;
pub const BS_READ_DISP: u8 = 0o7;

pub const BS_EMU_READ_S_LOCATION: u8 = BS_TASK_SPECIFIC1;
pub const BS_EMU_LOAD_S_LOCATION: u8 = BS_TASK_SPECIFIC2;
pub const BS_DSK_READ_KSTAT: u8 = BS_TASK_SPECIFIC1;
pub const BS_DSK_READ_KDATA: u8 = BS_TASK_SPECIFIC2;
pub const BS_ETH_EIDFCT: u8 = BS_TASK_SPECIFIC2;

/// Whether this BS value consults the constant ROM.
pub fn bs_use_crom(bs: u8) -> bool {
    bs >= 4
}

// F1 field.
pub const F1_NONE: u8 = 0;
pub const F1_LOAD_MAR: u8 = 0o1;
pub const F1_TASK: u8 = 0o2;
pub const F1_BLOCK: u8 = 0o3;
pub const F1_LLSH1: u8 = 0o4;
pub const F1_LRSH1: u8 = 0o5;
pub const F1_LLCY8: u8 = 0o6;
pub const F1_CONSTANT: u8 = 0o7;

pub const F1_EMU_SWMODE: u8 = 0o10;
pub const F1_EMU_WRTRAM: u8 = 0o11;
pub const F1_EMU_RDRAM: u8 = 0o12;
pub const F1_EMU_LOAD_RMR: u8 = 0o13;
pub const F1_EMU_LOAD_ESRB: u8 = 0o15;
pub const F1_EMU_RSNF: u8 = 0o16;
pub const F1_EMU_STARTF: u8 = 0o17;

pub const F1_RAM_SWMODE: u8 = F1_EMU_SWMODE;
pub const F1_RAM_WRTRAM: u8 = F1_EMU_WRTRAM;
pub const F1_RAM_RDRAM: u8 = F1_EMU_RDRAM;
pub const F1_RAM_LOAD_SRB: u8 = F1_EMU_LOAD_ESRB;

pub const F1_DSK_STROBE: u8 = 0o11;
pub const F1_DSK_LOAD_KSTAT: u8 = 0o12;
pub const F1_DSK_INCRECNO: u8 = 0o13;
pub const F1_DSK_CLRSTAT: u8 = 0o14;
pub const F1_DSK_LOAD_KCOMM: u8 = 0o15;
pub const F1_DSK_LOAD_KADR: u8 = 0o16;
pub const F1_DSK_LOAD_KDATA: u8 = 0o17;

pub const F1_ETH_EILFCT: u8 = 0o13;
pub const F1_ETH_EPFCT: u8 = 0o14;
pub const F1_ETH_EWFCT: u8 = 0o15;

// F2 field.
pub const F2_NONE: u8 = 0;
pub const F2_BUSEQ0: u8 = 0o1;
pub const F2_SHLT0: u8 = 0o2;
pub const F2_SHEQ0: u8 = 0o3;
pub const F2_BUS: u8 = 0o4;
pub const F2_ALUCY: u8 = 0o5;
pub const F2_STORE_MD: u8 = 0o6;
pub const F2_CONSTANT: u8 = 0o7;

pub const F2_EMU_BUSODD: u8 = 0o10;
pub const F2_EMU_MAGIC: u8 = 0o11;
pub const F2_EMU_LOAD_DNS: u8 = 0o12;
pub const F2_EMU_ACDEST: u8 = 0o13;
pub const F2_EMU_LOAD_IR: u8 = 0o14;
pub const F2_EMU_IDISP: u8 = 0o15;
pub const F2_EMU_ACSOURCE: u8 = 0o16;

pub const F2_DSK_INIT: u8 = 0o10;
pub const F2_DSK_RWC: u8 = 0o11;
pub const F2_DSK_RECNO: u8 = 0o12;
pub const F2_DSK_XFRDAT: u8 = 0o13;
pub const F2_DSK_SWRNRDY: u8 = 0o14;
pub const F2_DSK_NFER: u8 = 0o15;
pub const F2_DSK_STROBON: u8 = 0o16;

pub const F2_ETH_EODFCT: u8 = 0o10;
pub const F2_ETH_EOSFCT: u8 = 0o11;
pub const F2_ETH_ERBFCT: u8 = 0o12;
pub const F2_ETH_EEFCT: u8 = 0o13;
pub const F2_ETH_EBFCT: u8 = 0o14;
pub const F2_ETH_ECBFCT: u8 = 0o15;
pub const F2_ETH_EISFCT: u8 = 0o16;

pub const F2_DW_LOAD_DDR: u8 = 0o10;
pub const F2_CUR_LOAD_XPREG: u8 = 0o10;
pub const F2_CUR_LOAD_CSR: u8 = 0o11;
pub const F2_DH_EVENFIELD: u8 = 0o10;
pub const F2_DH_SETMODE: u8 = 0o11;
pub const F2_DV_EVENFIELD: u8 = 0o10;

/// Microword field decode (raw bit extraction, no task-dependent
/// interpretation).
#[derive(Debug, Clone, Copy)]
pub struct RawFields {
    pub rsel: u8,
    pub aluf: u8,
    pub bs: u8,
    pub f1: u8,
    pub f2: u8,
    pub load_t: bool,
    pub load_l: bool,
    pub next: u16,
}

pub fn decode_raw(mc: u32) -> RawFields {
    RawFields {
        rsel: ((mc >> 27) & 0x1F) as u8,
        aluf: ((mc >> 23) & 0x0F) as u8,
        bs: ((mc >> 20) & 0x07) as u8,
        f1: ((mc >> 16) & 0x0F) as u8,
        f2: ((mc >> 12) & 0x0F) as u8,
        load_t: (mc >> 11) & 1 != 0,
        load_l: (mc >> 10) & 1 != 0,
        next: (mc & 0x3FF) as u16,
    }
}

/// A fully predecoded microword, carrying the derived task-context
/// booleans the engine's `step()` consults on every field.
#[derive(Debug, Clone, Copy)]
pub struct Microcode {
    pub sys_type: SystemType,
    pub task: u8,
    pub rsel: u8,
    pub aluf: u8,
    pub bs: u8,
    pub f1: u8,
    pub f2: u8,
    pub load_t: bool,
    pub load_l: bool,
    pub next: u16,
    pub use_constant: bool,
    pub bs_use_crom: bool,
    pub ram_task: bool,
    pub const_addr: u16,
}

/// Whether `task` is the RAM-capable task that may issue SWMODE/
/// WRTRAM/RDRAM/LOAD_SRB-family F1 functions. Only the emulator task
/// qualifies: `microcode.h` reuses the same octal F1 codes across
/// tasks (`F1_EMU_WRTRAM == F1_DSK_STROBE`, `F1_EMU_RDRAM ==
/// F1_DSK_LOAD_KSTAT`, `F1_EMU_LOAD_ESRB == F1_DSK_LOAD_KCOMM ==
/// F1_ETH_EWFCT`), and `do_f1` dispatches the RAM-task block before
/// the per-task switch, so treating disk/ethernet as RAM-capable here
/// would make that generic block swallow their task-specific F1s.
pub fn is_ram_task(task: u8) -> bool {
    task == TASK_EMULATOR
}

pub fn predecode(sys_type: SystemType, mir: u32, task: u8) -> Microcode {
    let raw = decode_raw(mir);
    let use_constant = raw.f1 == F1_CONSTANT || raw.f2 == F2_CONSTANT;
    Microcode {
        sys_type,
        task,
        rsel: raw.rsel,
        aluf: raw.aluf,
        bs: raw.bs,
        f1: raw.f1,
        f2: raw.f2,
        load_t: raw.load_t,
        load_l: raw.load_l,
        next: raw.next,
        use_constant,
        bs_use_crom: bs_use_crom(raw.bs),
        ram_task: is_ram_task(task),
        const_addr: const_addr(raw.rsel, raw.bs),
    }
}

/// Computes the constant-ROM address from an RSEL/BS pair, the same
/// encoding used when assembling `CONST_ADDR`.
pub fn const_addr(rsel: u8, bs: u8) -> u16 {
    (((rsel & 0x1F) as u16) << 3) | (bs & 0x7) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fields_at_documented_positions() {
        // RSEL=0o17, ALUF=0o3, BS=0o5, F1=0o2, F2=0o6, loadT=1, loadL=0, next=0x155
        let mc: u32 = (0o17u32 << 27)
            | (0o3u32 << 23)
            | (0o5u32 << 20)
            | (0o2u32 << 16)
            | (0o6u32 << 12)
            | (1 << 11)
            | (0 << 10)
            | 0x155;
        let f = decode_raw(mc);
        assert_eq!(f.rsel, 0o17);
        assert_eq!(f.aluf, 0o3);
        assert_eq!(f.bs, 0o5);
        assert_eq!(f.f1, 0o2);
        assert_eq!(f.f2, 0o6);
        assert!(f.load_t);
        assert!(!f.load_l);
        assert_eq!(f.next, 0x155);
    }

    #[test]
    fn use_constant_set_by_either_f1_or_f2() {
        let mir_f1 = (F1_CONSTANT as u32) << 16;
        let mc = predecode(SystemType::AltoIi2KRom, mir_f1, TASK_EMULATOR);
        assert!(mc.use_constant);

        let mir_f2 = (F2_CONSTANT as u32) << 12;
        let mc = predecode(SystemType::AltoIi2KRom, mir_f2, TASK_EMULATOR);
        assert!(mc.use_constant);
    }

    #[test]
    fn load_t_from_alu_matches_mask() {
        assert!(load_t_from_alu(ALU_BUS_AND_T_WB));
        assert!(!load_t_from_alu(ALU_BUS_AND_T));
    }
}
