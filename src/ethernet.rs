//! The Ethernet controller: a 16-word FIFO plus TX/RX state machines
//! driven by scheduled interrupts (§4.3). Mirrors `ethernet.c` from the
//! reference implementation.

use crate::error::{Error, Result};
use crate::interrupt::{self, compute_intr_cycle};
use crate::state_io::{StateReader, StateWriter};
use crate::task::TASK_ETHERNET;
use crate::transport::Transport;

pub const FIFO_SIZE: usize = 16;
const TX_DURATION: i32 = 512;
const RX_DURATION: i32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputState {
    #[default]
    Off,
    Waiting,
    Receiving,
    Done,
}

impl InputState {
    fn to_u8(self) -> u8 {
        match self {
            InputState::Off => 0,
            InputState::Waiting => 1,
            InputState::Receiving => 2,
            InputState::Done => 3,
        }
    }

    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0 => InputState::Off,
            1 => InputState::Waiting,
            2 => InputState::Receiving,
            3 => InputState::Done,
            other => return Err(Error::Serialization(format!("invalid ethernet input_state {other}"))),
        })
    }
}

/// Bit set in the controller's pending mask when the Ethernet task wants
/// to run. There is only one Ethernet task so this is just its own bit.
const PENDING_BIT: u16 = 1 << TASK_ETHERNET;

#[derive(Debug, Clone)]
pub struct Ethernet {
    pub address: u16,
    fifo: [u16; FIFO_SIZE],
    fifo_start: u8,
    fifo_end: u8,
    pub iocmd: u16,
    pub out_busy: bool,
    pub in_busy: bool,
    pub in_gone: bool,
    pub input_state: InputState,
    pub data_late: bool,
    pub collision: bool,
    pub crc_bad: bool,
    pub incomplete: bool,
    pub status: u16,
    pub countdown_wakeup: bool,
    pub end_tx: bool,
    pub intr_cycle: Option<i32>,
    pub tx_intr_cycle: Option<i32>,
    pub rx_intr_cycle: Option<i32>,
    pub pending: u16,
}

impl Default for Ethernet {
    fn default() -> Self {
        Ethernet {
            address: 0,
            fifo: [0; FIFO_SIZE],
            fifo_start: 0,
            fifo_end: 0,
            iocmd: 0,
            out_busy: false,
            in_busy: false,
            in_gone: false,
            input_state: InputState::Off,
            data_late: false,
            collision: false,
            crc_bad: false,
            incomplete: false,
            status: 0,
            countdown_wakeup: false,
            end_tx: false,
            intr_cycle: None,
            tx_intr_cycle: None,
            rx_intr_cycle: None,
            pending: 0,
        }
    }
}

impl Ethernet {
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

    fn fifo_peek(&self) -> Option<u16> {
        if self.fifo_count() == 0 {
            return None;
        }
        Some(self.fifo[(self.fifo_start & 0xF) as usize])
    }

    /// Sets the station address used by `RSNF`.
    pub fn set_address(&mut self, address: u16) {
        self.address = address;
    }

    /// `RSNF`: read station number, high byte all-ones.
    pub fn rsnf(&self) -> u16 {
        0xFF00 | self.address
    }

    /// `STARTF`: latches the low two bits of the bus as the I/O command
    /// and marks the task pending.
    pub fn startf(&mut self, bus: u16) {
        self.iocmd = bus & 0x3;
        self.pending |= PENDING_BIT;
    }

    /// `EILFCT`: peeks the head of the input FIFO without dequeuing.
    pub fn eilfct(&self) -> u16 {
        self.fifo_peek().unwrap_or(0)
    }

    /// `EIDFCT`: dequeues the head of the input FIFO.
    pub fn eidfct(&mut self) -> u16 {
        let word = self.fifo_pop().unwrap_or(0);
        if self.fifo_count() < 2 {
            if self.in_gone {
                self.in_busy = false;
                self.pending |= PENDING_BIT;
            } else {
                self.pending &= !PENDING_BIT;
            }
        }
        word
    }

    /// `EPFCT`: reads the status word and resets the interface.
    pub fn epfct(&mut self, transport: &mut dyn Transport) -> u16 {
        let status = self.status;
        self.reset_interface(transport);
        status
    }

    /// `EWFCT`: arms the countdown-wakeup flag.
    pub fn ewfct(&mut self) {
        self.countdown_wakeup = true;
    }

    /// `EODFCT`: enqueues a word onto the output FIFO, kicking off a TX
    /// interrupt once the FIFO is one slot from full and a transfer is
    /// already underway.
    pub fn eodfct(&mut self, bus: u16, cycle: i32) -> Result<()> {
        if self.fifo_count() == FIFO_SIZE as u8 {
            return Err(Error::Transport("ethernet output FIFO overflow".into()));
        }
        self.fifo_push(bus);
        if self.fifo_count() == (FIFO_SIZE - 1) as u8 && self.out_busy {
            self.transmit_fifo(cycle, false)?;
        }
        Ok(())
    }

    /// `EOSFCT`: marks the interface busy transmitting and pending.
    pub fn eosfct(&mut self) {
        self.out_busy = true;
        self.pending |= PENDING_BIT;
    }

    /// `ERBFCT`: reads back the latched I/O command, shifted into place.
    pub fn erbfct(&self) -> u16 {
        (self.iocmd & 0x3) << 2
    }

    /// `EEFCT`: marks the end of a transmission and schedules its TX
    /// interrupt, clearing pending immediately.
    pub fn eefct(&mut self, cycle: i32) -> Result<()> {
        self.transmit_fifo(cycle, true)?;
        self.pending &= !PENDING_BIT;
        Ok(())
    }

    /// `EBFCT`: reports data-late/collision/idle-busy conditions.
    pub fn ebfct(&self) -> u16 {
        let mut bits = 0u16;
        if self.data_late || self.iocmd != 0 || (!self.in_busy && !self.out_busy) {
            bits |= 0x4;
        }
        if self.collision {
            bits |= 0x8;
        }
        bits
    }

    /// `ECBFCT`: reports whether the input FIFO holds data.
    pub fn ecbfct(&self) -> u16 {
        if self.fifo_count() != 0 {
            0x4
        } else {
            0
        }
    }

    /// `EISFCT`: enables reception and arms the first RX interrupt.
    pub fn eisfct(&mut self, cycle: i32, transport: &mut dyn Transport) -> Result<()> {
        if self.in_busy {
            transport.clear_rx();
        }
        transport.enable_rx(true);
        self.input_state = InputState::Waiting;
        self.in_busy = true;
        self.pending &= !PENDING_BIT;
        if self.rx_intr_cycle.is_none() {
            self.rx_intr_cycle = Some(cycle + RX_DURATION);
            self.update_intr_cycle(cycle, false)?;
        }
        Ok(())
    }

    /// Clears the ethernet task's pending bit if the block function names
    /// this task.
    pub fn block_task(&mut self, task: u8) {
        if task == TASK_ETHERNET {
            self.pending &= !PENDING_BIT;
        }
    }

    /// Runs once at the top of every cycle, clearing the one-shot
    /// countdown-wakeup flag and acknowledging any pending bit left over
    /// from a prior `EWFCT`.
    pub fn before_step(&mut self) {
        self.countdown_wakeup = false;
        self.pending &= !PENDING_BIT;
    }

    fn transmit_fifo(&mut self, cycle: i32, end_tx: bool) -> Result<()> {
        self.tx_intr_cycle = Some(cycle + TX_DURATION);
        self.end_tx = end_tx;
        self.update_intr_cycle(cycle, false)
    }

    fn tx_interrupt(&mut self, transport: &mut dyn Transport) {
        while let Some(word) = self.fifo_pop() {
            transport.append_tx(word);
        }
        self.fifo_start = 0;
        self.fifo_end = 0;
        self.pending |= PENDING_BIT;
        if self.end_tx {
            self.out_busy = false;
            transport.send();
        }
    }

    fn rx_interrupt(&mut self, cycle: i32, transport: &mut dyn Transport) {
        match self.input_state {
            InputState::Waiting => {
                let len = transport.receive();
                if len > 0 {
                    self.input_state = InputState::Receiving;
                }
                self.rx_intr_cycle = Some(cycle + RX_DURATION);
            }
            InputState::Receiving => {
                if self.fifo_count() < FIFO_SIZE as u8 && transport.has_rx_data() {
                    let word = transport.get_rx_word();
                    self.fifo_push(word);
                }
                if !transport.has_rx_data() {
                    self.in_gone = true;
                    transport.clear_rx();
                    self.input_state = InputState::Done;
                    self.pending |= PENDING_BIT;
                } else if self.fifo_count() >= 2 {
                    self.pending |= PENDING_BIT;
                }
                if self.input_state != InputState::Done {
                    self.rx_intr_cycle = Some(cycle + RX_DURATION);
                } else {
                    self.rx_intr_cycle = None;
                }
            }
            InputState::Off | InputState::Done => {
                self.rx_intr_cycle = None;
            }
        }
    }

    /// Services whichever of the TX/RX interrupts is due at `cycle`, then
    /// recomputes the combined `intr_cycle`.
    pub fn interrupt(&mut self, cycle: i32, transport: &mut dyn Transport) -> Result<()> {
        if self.tx_intr_cycle == Some(cycle) {
            self.tx_intr_cycle = None;
            self.tx_interrupt(transport);
        }
        if self.rx_intr_cycle == Some(cycle) {
            self.rx_interrupt(cycle, transport);
        }
        self.update_intr_cycle(cycle, true)
    }

    fn update_intr_cycle(&mut self, cycle: i32, must_advance: bool) -> Result<()> {
        let base = match self.intr_cycle {
            Some(c) if !interrupt::is_in_past(c, cycle) => c,
            _ => cycle,
        };
        self.intr_cycle = compute_intr_cycle(base, must_advance, &[self.tx_intr_cycle, self.rx_intr_cycle])?;
        Ok(())
    }

    fn reset_interface(&mut self, transport: &mut dyn Transport) {
        self.status = 0xFFC0
            | if self.data_late { 0 } else { 0x20 }
            | if self.collision { 0 } else { 0x10 }
            | if self.crc_bad { 0 } else { 0x08 }
            | 0x06
            | if self.incomplete { 0 } else { 0x01 };
        self.iocmd = 0;
        self.out_busy = false;
        self.in_busy = false;
        self.in_gone = false;
        self.data_late = false;
        self.collision = false;
        self.crc_bad = false;
        self.incomplete = false;
        self.input_state = InputState::Off;
        transport.enable_rx(false);
        transport.clear_rx();
        self.fifo_start = 0;
        self.fifo_end = 0;
        self.pending = 0;
    }

    /// Full controller reset, e.g. on `SIO` or a system soft reset.
    pub fn reset(&mut self, transport: &mut dyn Transport) {
        self.pending = 0;
        self.countdown_wakeup = false;
        self.end_tx = false;
        transport.reset_tx();
        self.intr_cycle = None;
        self.tx_intr_cycle = None;
        self.rx_intr_cycle = None;
        self.reset_interface(transport);
    }

    pub fn serialize(&self, w: &mut StateWriter) {
        w.put_u16(self.address);
        w.put_u16_array(&self.fifo);
        w.put_u8(self.fifo_start);
        w.put_u8(self.fifo_end);
        w.put_u16(self.iocmd);
        w.put_bool(self.out_busy);
        w.put_bool(self.in_busy);
        w.put_bool(self.in_gone);
        w.put_u8(self.input_state.to_u8());
        w.put_bool(self.data_late);
        w.put_bool(self.collision);
        w.put_bool(self.crc_bad);
        w.put_bool(self.incomplete);
        w.put_u16(self.status);
        w.put_bool(self.countdown_wakeup);
        w.put_bool(self.end_tx);
        w.put_cycle(self.intr_cycle);
        w.put_cycle(self.tx_intr_cycle);
        w.put_cycle(self.rx_intr_cycle);
        w.put_u16(self.pending);
    }

    pub fn deserialize(r: &mut StateReader) -> Result<Self> {
        let mut e = Ethernet {
            address: r.get_u16()?,
            ..Ethernet::default()
        };
        r.get_u16_array(&mut e.fifo)?;
        e.fifo_start = r.get_u8()?;
        e.fifo_end = r.get_u8()?;
        e.iocmd = r.get_u16()?;
        e.out_busy = r.get_bool()?;
        e.in_busy = r.get_bool()?;
        e.in_gone = r.get_bool()?;
        e.input_state = InputState::from_u8(r.get_u8()?)?;
        e.data_late = r.get_bool()?;
        e.collision = r.get_bool()?;
        e.crc_bad = r.get_bool()?;
        e.incomplete = r.get_bool()?;
        e.status = r.get_u16()?;
        e.countdown_wakeup = r.get_bool()?;
        e.end_tx = r.get_bool()?;
        e.intr_cycle = r.get_cycle()?;
        e.tx_intr_cycle = r.get_cycle()?;
        e.rx_intr_cycle = r.get_cycle()?;
        e.pending = r.get_u16()?;
        Ok(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NullTransport;

    #[test]
    fn rsnf_reports_high_byte_all_ones() {
        let mut e = Ethernet::default();
        e.set_address(0x42);
        assert_eq!(e.rsnf(), 0xFF42);
    }

    #[test]
    fn output_fifo_round_trips_and_rejects_overflow() {
        let mut e = Ethernet::default();
        for i in 0..FIFO_SIZE {
            e.eodfct(i as u16, 0).unwrap();
        }
        assert!(e.eodfct(0xFFFF, 0).is_err());
    }

    #[test]
    fn eodfct_schedules_tx_when_out_busy_and_nearly_full() {
        let mut e = Ethernet::default();
        e.eosfct();
        for i in 0..(FIFO_SIZE - 1) {
            e.eodfct(i as u16, 100).unwrap();
        }
        assert_eq!(e.tx_intr_cycle, Some(100 + TX_DURATION));
    }

    #[test]
    fn eefct_schedules_final_tx_and_clears_pending() {
        let mut e = Ethernet::default();
        e.pending = PENDING_BIT;
        e.eefct(10).unwrap();
        assert_eq!(e.tx_intr_cycle, Some(10 + TX_DURATION));
        assert!(e.end_tx);
        assert_eq!(e.pending & PENDING_BIT, 0);
    }

    #[test]
    fn tx_interrupt_flushes_fifo_into_transport() {
        let mut transport = NullTransport::default();
        let mut e = Ethernet::default();
        e.eodfct(0xAAAA, 0).unwrap();
        e.eodfct(0xBBBB, 0).unwrap();
        e.eefct(0).unwrap();
        e.interrupt(TX_DURATION, &mut transport).unwrap();
        assert!(!e.out_busy);
        assert_eq!(e.fifo_count(), 0);
    }

    #[test]
    fn epfct_reads_status_and_resets() {
        let mut transport = NullTransport::default();
        let mut e = Ethernet::default();
        e.eosfct();
        let status = e.epfct(&mut transport);
        assert_eq!(status & 0xFFC0, 0xFFC0);
        assert!(!e.out_busy);
    }

    #[test]
    fn eisfct_arms_first_rx_interrupt() {
        let mut transport = NullTransport::default();
        let mut e = Ethernet::default();
        e.eisfct(5, &mut transport).unwrap();
        assert_eq!(e.rx_intr_cycle, Some(5 + RX_DURATION));
        assert!(e.in_busy);
    }

    #[test]
    fn eidfct_dequeues_and_tracks_low_water_mark() {
        let mut e = Ethernet::default();
        e.fifo_push(1);
        e.fifo_push(2);
        e.fifo_push(3);
        e.pending = PENDING_BIT;
        assert_eq!(e.eidfct(), 1);
        assert_ne!(e.pending & PENDING_BIT, 0);
        e.eidfct();
        // below 2 remaining and in_gone is false: pending is cleared
        assert_eq!(e.pending & PENDING_BIT, 0);
    }
}
