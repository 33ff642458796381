//! The engine: the per-cycle orchestrator tying the bus, ALU, shifter,
//! F1/F2 dispatch, and program-counter update into one `step()`, plus
//! the state a running emulation carries between steps. Mirrors
//! `simulator.c`/`simulator.h` from the reference implementation.

mod alu;
mod bus;
mod f1;
mod f2;
mod mpc;
mod shift;

use crate::disk::Disk;
use crate::display::Display;
use crate::error::{Error, Result};
use crate::ethernet::Ethernet;
use crate::interrupt::compute_intr_cycle;
use crate::keyboard::Keyboard;
use crate::memory::{Memory, MA_EXTENDED};
use crate::microcode::{self, Microcode, CONSTANT_SIZE};
use crate::mouse::Mouse;
use crate::registers::{BankSelectors, RegisterFile, Scalars};
use crate::state_io::{load_constant_rom, load_microcode_rom, StateReader, StateWriter};
use crate::system::SystemType;
use crate::task::{NUM_TASKS, TASK_EMULATOR, TASK_ETHERNET};
use crate::transport::{NullTransport, Transport};

/// Bits of the MPC given over to the microcode bank index.
pub(crate) const MPC_BANK_SHIFT: u16 = 10;
pub(crate) const MPC_BANK_MASK: u16 = 0x3;
/// Bits of the MPC (or of a raw microword's NEXT field) given over to
/// the in-bank address.
pub(crate) const MPC_ADDR_MASK: u16 = 0x3FF;

/// Every microcode bank this emulator could possibly address, across
/// all four system variants; unused banks for a given variant simply
/// stay unreferenced.
const MAX_MICROCODE_BANKS: usize = 4;

/// Size of the (not-emulated-in-detail) alternate character-set ROM,
/// consulted only by `ACSOURCE`/`IDISP` in non-NOVA IR modes.
pub const ACSROM_SIZE: usize = 256;

/// A complete, runnable Alto. Owns every register file and peripheral
/// controller, plus the loaded ROM/microcode contents.
pub struct Engine {
    pub sys_type: SystemType,
    pub error: bool,

    pub registers: RegisterFile,
    pub banks: BankSelectors,
    pub scalars: Scalars,
    pub memory: Memory,

    pub disk: Disk,
    pub display: Display,
    pub ethernet: Ethernet,
    pub keyboard: Keyboard,
    pub mouse: Mouse,
    pub transport: Box<dyn Transport>,

    pub constant_rom: Vec<u16>,
    pub microcode: Vec<u32>,
    pub acs_rom: Vec<u8>,

    pub task_mpc: [u16; NUM_TASKS],
    pub task_cycle: [i32; NUM_TASKS],
    pub cycle: i32,
    pub intr_cycle: Option<i32>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sys_type", &self.sys_type)
            .field("cycle", &self.cycle)
            .field("scalars", &self.scalars)
            .finish()
    }
}

impl Engine {
    /// Builds a freshly reset engine with zero-filled ROMs. Real ROM
    /// contents are loaded afterward with `load_constant_rom`/
    /// `load_microcode_rom`.
    pub fn new(sys_type: SystemType) -> Self {
        let mut engine = Engine {
            sys_type,
            error: false,
            registers: RegisterFile::default(),
            banks: BankSelectors::default(),
            scalars: Scalars::default(),
            memory: Memory::default(),
            disk: Disk::default(),
            display: Display::default(),
            ethernet: Ethernet::default(),
            keyboard: Keyboard::default(),
            mouse: Mouse::default(),
            transport: Box::new(NullTransport::default()),
            constant_rom: vec![0; CONSTANT_SIZE],
            microcode: vec![0; MAX_MICROCODE_BANKS * microcode::MICROCODE_SIZE],
            acs_rom: vec![0; ACSROM_SIZE],
            task_mpc: [0; NUM_TASKS],
            task_cycle: [0; NUM_TASKS],
            cycle: 0,
            intr_cycle: None,
        };
        engine.reset();
        engine
    }

    /// Loads a microcode ROM/RAM image into bank `bank` (§6.1).
    pub fn load_microcode_rom(&mut self, bytes: &[u8], bank: usize) -> Result<()> {
        let words = load_microcode_rom(bytes, microcode::MICROCODE_SIZE)?;
        let base = bank * microcode::MICROCODE_SIZE;
        self.microcode[base..base + microcode::MICROCODE_SIZE].copy_from_slice(&words);
        Ok(())
    }

    /// Loads the 256-word constant ROM (§6.2).
    pub fn load_constant_rom(&mut self, bytes: &[u8]) -> Result<()> {
        self.constant_rom = load_constant_rom(bytes)?;
        Ok(())
    }

    /// Restores every piece of state to power-on defaults (mirrors
    /// `simulator_reset`).
    pub fn reset(&mut self) {
        self.registers = RegisterFile::default();
        self.banks = BankSelectors::default();
        self.scalars = Scalars::default();
        self.scalars.rmr = 0xFFFF;

        self.memory.window = Default::default();
        self.memory.window.mem_cycle = 0xFFFF;
        self.memory.window.mem_task = TASK_EMULATOR;
        self.memory.window.mem_low = 0xFFFF;
        self.memory.window.mem_high = 0xFFFF;

        self.disk.reset();
        self.display.reset();
        self.ethernet.reset(self.transport.as_mut());

        for task in 0..NUM_TASKS {
            self.task_mpc[task] = task as u16;
        }
        self.task_cycle = [0; NUM_TASKS];
        self.cycle = 0;
        self.error = false;

        let candidates = [
            Some(self.disk.intr_cycle),
            self.display.next_intr_cycle(),
            self.ethernet.intr_cycle,
        ];
        // `cycle` is freshly zeroed and every controller was just reset
        // to its own power-on schedule, so none of these candidates can
        // be at or before cycle 0; this can never actually error.
        self.intr_cycle =
            compute_intr_cycle(0, false, &candidates).expect("reset always yields a valid initial intr_cycle");
    }

    fn modified_rsel(&self, mc: &Microcode) -> u8 {
        let mut rsel = mc.rsel;
        if mc.task == TASK_EMULATOR {
            let ir = self.scalars.ir;
            if mc.f2 == microcode::F2_EMU_ACSOURCE {
                rsel = (rsel & !0x3) | (((!(ir >> 13)) & 0x3) as u8);
            } else if mc.f2 == microcode::F2_EMU_ACDEST || mc.f2 == microcode::F2_EMU_LOAD_DNS {
                rsel = (rsel & !0x3) | (((!(ir >> 11)) & 0x3) as u8);
            }
        }
        rsel
    }

    fn decode_ram_address(&self) -> Result<(usize, bool)> {
        if self.scalars.cram_addr & 0x0800 != 0 {
            return Err(Error::Microcode("reading/writing microcode ROM is not supported".into()));
        }
        let low_half = self.scalars.cram_addr & 0x0400 == 0;
        let bank = match self.sys_type {
            SystemType::AltoIi3KRam => {
                let b = (self.scalars.cram_addr >> 12) & 0x3;
                if b == 3 {
                    return Err(Error::Microcode("microcode RAM bank 3 does not exist".into()));
                }
                b + 1
            }
            SystemType::AltoIi2KRom => 2,
            _ => 1,
        };
        let addr = (self.scalars.cram_addr & MPC_ADDR_MASK) as usize + bank as usize * microcode::MICROCODE_SIZE;
        Ok((addr, low_half))
    }

    fn do_rdram(&mut self) -> Result<u16> {
        if !self.scalars.rdram {
            return Ok(0xFFFF);
        }
        let (addr, low_half) = self.decode_ram_address()?;
        let mcode = self.microcode[addr] ^ microcode::MC_INVERT_MASK;
        self.scalars.rdram = false;
        Ok(if low_half { mcode as u16 } else { (mcode >> 16) as u16 })
    }

    fn do_wrtram(&mut self, alu: u16) -> Result<()> {
        if !self.scalars.wrtram {
            return Ok(());
        }
        let (addr, _low_half) = self.decode_ram_address()?;
        self.microcode[addr] = (((self.scalars.m as u32) << 16) | alu as u32) ^ microcode::MC_INVERT_MASK;
        self.scalars.wrtram = false;
        Ok(())
    }

    fn get_pending(&self) -> u16 {
        (1 << TASK_EMULATOR) | self.disk.pending | self.display.pending | self.ethernet.pending
    }

    fn do_block(&mut self, task: u8) {
        self.disk.block_task(task);
        self.display.block_task(task);
        self.ethernet.block_task(task);
    }

    fn load_mar(&mut self, mar: u16, task: u8, extended: bool) {
        self.memory
            .load_mar(self.sys_type, mar, task, extended, &self.banks, &self.keyboard, &mut self.mouse);
    }

    fn mem_write(&mut self, addr: u16, value: u16) {
        let task = self.memory.window.mem_task;
        let extended = self.memory.window.mem_status & MA_EXTENDED != 0;
        self.memory.write(addr, value, task, extended, &mut self.banks);
    }

    fn wb_registers(&mut self, mc: &Microcode, modified_rsel: u8, load_r: bool, bus: u16, alu: u16, shifter_output: u16, alu_c0: bool) {
        if load_r {
            self.registers.r[modified_rsel as usize & 0x1F] = shifter_output;
        }
        if !mc.use_constant && mc.task == TASK_EMULATOR && mc.ram_task && mc.bs == microcode::BS_TASK_SPECIFIC2 {
            let rb = self.banks.sreg_banks[mc.task as usize];
            self.registers.set_s_at(rb, mc.rsel, self.scalars.m);
        }
        if mc.load_l {
            self.scalars.l = alu;
            if mc.task == TASK_EMULATOR {
                self.scalars.m = alu;
            }
            self.scalars.alu_c0 = alu_c0;
        }
        if mc.load_t {
            self.scalars.t = if microcode::load_t_from_alu(mc.aluf) { alu } else { bus };
            self.scalars.cram_addr = alu;
        }
    }

    fn update_cycles(&mut self) {
        self.cycle = (self.cycle + 1) & 0x7FFF_FFFF;
        let task = self.scalars.ctask as usize;
        self.task_cycle[task] = (self.task_cycle[task] + 1) & 0x7FFF_FFFF;
        self.memory.tick_window();
    }

    /// Runs one microinstruction. Once this returns `Err`, the engine is
    /// latched in its error state and every subsequent call fails too
    /// (mirrors `simulator_step`'s `sim->error` short-circuit).
    pub fn step(&mut self) -> Result<()> {
        if self.error {
            return Err(Error::Microcode("engine is in an error state; call reset() to continue".into()));
        }

        let prev_cycle = self.cycle;
        self.update_cycles();

        if self.scalars.ctask == TASK_ETHERNET {
            self.ethernet.before_step();
        }

        let soft_reset = self.scalars.soft_reset;
        self.scalars.soft_reset = false;

        let mc = microcode::predecode(self.sys_type, self.scalars.mir, self.scalars.ctask);
        let mut load_r = !mc.use_constant && mc.bs == microcode::BS_LOAD_R;
        let modified_rsel = self.modified_rsel(&mc);

        match self.run_cycle(&mc, modified_rsel, &mut load_r, soft_reset, prev_cycle) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.error = true;
                Err(e)
            }
        }
    }

    fn run_cycle(&mut self, mc: &Microcode, modified_rsel: u8, load_r: &mut bool, soft_reset: bool, prev_cycle: i32) -> Result<()> {
        let bus = bus::read_bus(self, mc, modified_rsel)?;
        let (alu, alu_c0) = alu::compute_alu(mc.aluf, bus, self.scalars.t, self.scalars.skip)?;
        self.do_wrtram(alu)?;

        let (shifter_output, nova_carry) = shift::do_shift(
            mc.task,
            mc.f1,
            mc.f2,
            self.scalars.l,
            self.scalars.t,
            self.scalars.ir,
            self.scalars.alu_c0,
            self.scalars.carry,
            load_r,
        );

        let (nntask, swmode) = f1::do_f1(self, mc, bus, alu)?;
        let next_extra = f2::do_f2(self, mc, bus, shifter_output, nova_carry)?;

        if mc.f1 == microcode::F1_BLOCK {
            self.do_block(mc.task);
        }

        self.wb_registers(mc, modified_rsel, *load_r, bus, alu, shifter_output, alu_c0);
        mpc::update_program_counters(self, next_extra, nntask, swmode);

        if soft_reset {
            mpc::do_soft_reset(self);
        }

        self.check_for_interrupts(prev_cycle)
    }

    /// Services every peripheral interrupt that has come due since
    /// `prev_cycle`, re-folding the combined schedule after each one
    /// (mirrors `check_for_interrupts`).
    fn check_for_interrupts(&mut self, prev_cycle: i32) -> Result<()> {
        let mut prev = prev_cycle;
        loop {
            let Some(intr_cycle) = self.intr_cycle else { return Ok(()) };
            let diff = self.cycle.wrapping_sub(prev) & 0x7FFF_FFFF;
            let intr_diff = intr_cycle.wrapping_sub(prev) & 0x7FFF_FFFF;
            if diff <= intr_diff {
                return Ok(());
            }
            prev = prev.wrapping_add(intr_diff);

            if intr_cycle == self.disk.intr_cycle {
                self.disk.interrupt()?;
            }
            if Some(intr_cycle) == self.display.next_intr_cycle() {
                self.display.interrupt(intr_cycle)?;
                if self.display.pending & (1 << TASK_ETHERNET) != 0 {
                    self.display.pending &= !(1 << TASK_ETHERNET);
                    if self.ethernet.countdown_wakeup {
                        self.ethernet.pending |= 1 << TASK_ETHERNET;
                    }
                }
            }
            if Some(intr_cycle) == self.ethernet.intr_cycle {
                self.ethernet.interrupt(intr_cycle, self.transport.as_mut())?;
            }

            let candidates = [
                Some(self.disk.intr_cycle),
                self.display.next_intr_cycle(),
                self.ethernet.intr_cycle,
            ];
            self.intr_cycle = compute_intr_cycle(prev, true, &candidates)?;
        }
    }

    /// Serializes the complete engine state (§4.9, §6.5).
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = StateWriter::new();
        w.put_u8(match self.sys_type {
            SystemType::AltoI => 0,
            SystemType::AltoIi1KRom => 1,
            SystemType::AltoIi2KRom => 2,
            SystemType::AltoIi3KRam => 3,
        });
        w.put_bool(self.error);

        w.put_u16_array(&self.registers.r);
        w.put_u16_array(&self.registers.s);
        w.put_u16_array(&self.banks.sreg_banks.map(u16::from));
        w.put_u16_array(&self.banks.xm_banks);

        w.put_u16(self.scalars.t);
        w.put_u16(self.scalars.l);
        w.put_u16(self.scalars.m);
        w.put_u16(self.scalars.mar);
        w.put_u16(self.scalars.ir);
        w.put_u32(self.scalars.mir);
        w.put_u16(self.scalars.mpc);
        w.put_u8(self.scalars.ctask);
        w.put_u8(self.scalars.ntask);
        w.put_bool(self.scalars.task_switch);
        w.put_bool(self.scalars.alu_c0);
        w.put_bool(self.scalars.skip);
        w.put_bool(self.scalars.carry);
        w.put_u16(self.scalars.rmr);
        w.put_u16(self.scalars.cram_addr);
        w.put_bool(self.scalars.rdram);
        w.put_bool(self.scalars.wrtram);
        w.put_bool(self.scalars.soft_reset);

        w.put_u16_array(&self.constant_rom);
        w.put_u32_array(&self.microcode);
        w.put_u8_array(&self.acs_rom);

        for v in self.task_mpc {
            w.put_u16(v);
        }
        for v in self.task_cycle {
            w.put_i32(v);
        }
        w.put_i32(self.cycle);
        w.put_cycle(self.intr_cycle);

        for bank in &self.memory.banks {
            w.put_u16_array(bank);
        }
        w.put_u16(self.memory.window.mem_cycle);
        w.put_u8(self.memory.window.mem_task);
        w.put_u16(self.memory.window.mem_low);
        w.put_u16(self.memory.window.mem_high);
        w.put_u16(self.memory.window.mem_status);

        self.disk.serialize(&mut w);
        self.display.serialize(&mut w);
        self.ethernet.serialize(&mut w);
        self.keyboard.serialize(&mut w);
        self.mouse.serialize(&mut w);

        w.into_bytes()
    }

    /// Restores a complete engine state produced by `serialize`.
    /// `sys_type` must match the variant the snapshot was taken from;
    /// ROM/microcode contents travel with the snapshot unchanged.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut r = StateReader::new(bytes);
        let sys_type = match r.get_u8()? {
            0 => SystemType::AltoI,
            1 => SystemType::AltoIi1KRom,
            2 => SystemType::AltoIi2KRom,
            3 => SystemType::AltoIi3KRam,
            other => return Err(Error::Serialization(format!("invalid system type tag {other}"))),
        };
        let mut engine = Engine::new(sys_type);
        engine.error = r.get_bool()?;

        r.get_u16_array(&mut engine.registers.r)?;
        r.get_u16_array(&mut engine.registers.s)?;
        let mut sreg_banks = [0u16; NUM_TASKS];
        r.get_u16_array(&mut sreg_banks)?;
        for (dst, src) in engine.banks.sreg_banks.iter_mut().zip(sreg_banks) {
            *dst = src as u8;
        }
        r.get_u16_array(&mut engine.banks.xm_banks)?;

        engine.scalars.t = r.get_u16()?;
        engine.scalars.l = r.get_u16()?;
        engine.scalars.m = r.get_u16()?;
        engine.scalars.mar = r.get_u16()?;
        engine.scalars.ir = r.get_u16()?;
        engine.scalars.mir = r.get_u32()?;
        engine.scalars.mpc = r.get_u16()?;
        engine.scalars.ctask = r.get_u8()?;
        engine.scalars.ntask = r.get_u8()?;
        engine.scalars.task_switch = r.get_bool()?;
        engine.scalars.alu_c0 = r.get_bool()?;
        engine.scalars.skip = r.get_bool()?;
        engine.scalars.carry = r.get_bool()?;
        engine.scalars.rmr = r.get_u16()?;
        engine.scalars.cram_addr = r.get_u16()?;
        engine.scalars.rdram = r.get_bool()?;
        engine.scalars.wrtram = r.get_bool()?;
        engine.scalars.soft_reset = r.get_bool()?;

        r.get_u16_array(&mut engine.constant_rom)?;
        r.get_u32_array(&mut engine.microcode)?;
        r.get_u8_array(&mut engine.acs_rom)?;

        for slot in engine.task_mpc.iter_mut() {
            *slot = r.get_u16()?;
        }
        for slot in engine.task_cycle.iter_mut() {
            *slot = r.get_i32()?;
        }
        engine.cycle = r.get_i32()?;
        engine.intr_cycle = r.get_cycle()?;

        for bank in engine.memory.banks.iter_mut() {
            r.get_u16_array(bank)?;
        }
        engine.memory.window.mem_cycle = r.get_u16()?;
        engine.memory.window.mem_task = r.get_u8()?;
        engine.memory.window.mem_low = r.get_u16()?;
        engine.memory.window.mem_high = r.get_u16()?;
        engine.memory.window.mem_status = r.get_u16()?;

        engine.disk = Disk::deserialize(&mut r)?;
        engine.display = Display::deserialize(&mut r)?;
        engine.ethernet = Ethernet::deserialize(&mut r)?;
        engine.keyboard = Keyboard::deserialize(&mut r)?;
        engine.mouse = Mouse::deserialize(&mut r)?;

        r.finish()?;
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TASK_DISK_SECTOR;

    #[test]
    fn fresh_engine_starts_on_the_emulator_task() {
        let engine = Engine::new(SystemType::AltoIi2KRom);
        assert_eq!(engine.scalars.ctask, TASK_EMULATOR);
        assert_eq!(engine.scalars.ntask, TASK_EMULATOR);
        assert!(!engine.error);
    }

    #[test]
    fn stepping_a_blank_emulator_fetches_and_runs_bank_zero() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.step().unwrap();
        assert_eq!(engine.cycle, 1);
    }

    #[test]
    fn serialize_deserialize_round_trips_register_state() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.registers.r[3] = 0xBEEF;
        engine.disk.pending |= 1 << TASK_DISK_SECTOR;
        let bytes = engine.serialize();
        let restored = Engine::deserialize(&bytes).unwrap();
        assert_eq!(restored.registers.r[3], 0xBEEF);
        assert_ne!(restored.disk.pending & (1 << TASK_DISK_SECTOR), 0);
    }

    #[test]
    fn error_state_is_sticky() {
        let mut engine = Engine::new(SystemType::AltoIi2KRom);
        engine.error = true;
        assert!(engine.step().is_err());
    }
}
