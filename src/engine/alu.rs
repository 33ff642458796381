//! The ALU: bus/T arithmetic and logic per the ALUF field.

use crate::error::{Error, Result};
use crate::microcode::*;

/// Computes the ALU result and carry-out for one microinstruction.
/// `skip` is the engine's sticky NOVA skip flag, consumed by
/// `ALU_BUS_PLUS_SKIP`.
pub fn compute_alu(aluf: u8, bus: u16, t: u16, skip: bool) -> Result<(u16, bool)> {
    let a = bus as u32;
    let b = t as u32;

    let res: u32 = match aluf {
        ALU_BUS => a,
        ALU_T => b,
        ALU_BUS_OR_T => a | b,
        ALU_BUS_AND_T | ALU_BUS_AND_T_WB => a & b,
        ALU_BUS_XOR_T => a ^ b,
        ALU_BUS_PLUS_1 => a + 1,
        ALU_BUS_MINUS_1 => a + 0xFFFF,
        ALU_BUS_PLUS_T => a + b,
        ALU_BUS_MINUS_T => a + ((!b) & 0xFFFF) + 1,
        ALU_BUS_MINUS_T_MINUS_1 => a + ((!b) & 0xFFFF),
        ALU_BUS_PLUS_T_PLUS_1 => a + b + 1,
        ALU_BUS_PLUS_SKIP => a + u32::from(skip),
        ALU_BUS_AND_NOT_T => a & (!b) & 0xFFFF,
        other => return Err(Error::Microcode(format!("invalid ALUF {other:#o}"))),
    };

    let carry = res & 0xFFFF_0000 != 0;
    Ok((res as u16, carry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_plus_t_reports_carry_on_overflow() {
        let (alu, carry) = compute_alu(ALU_BUS_PLUS_T, 0xFFFF, 1, false).unwrap();
        assert_eq!(alu, 0);
        assert!(carry);
    }

    #[test]
    fn bus_minus_t_is_twos_complement_subtraction() {
        let (alu, _) = compute_alu(ALU_BUS_MINUS_T, 10, 3, false).unwrap();
        assert_eq!(alu, 7);
    }

    #[test]
    fn plus_skip_adds_the_skip_flag() {
        let (alu, _) = compute_alu(ALU_BUS_PLUS_SKIP, 5, 0, true).unwrap();
        assert_eq!(alu, 6);
    }

    #[test]
    fn undefined_aluf_is_an_error() {
        assert!(compute_alu(ALU_UNDEFINED1, 0, 0, false).is_err());
    }
}
