//! The disk controller: two Diablo-30 drives, KSTAT/KDATA/KADR/KCOMM
//! registers, and the sector/word/seek/seclate interrupt family (§4.5).
//! Mirrors `disk.c` from the reference implementation.

use crate::error::{Error, Result};
use crate::interrupt::compute_intr_cycle;
use crate::state_io::{StateReader, StateWriter};
use crate::task::{TASK_DISK_SECTOR, TASK_DISK_WORD};

pub const NUM_DRIVES: usize = 2;
pub const NUM_CYLINDERS: u16 = 203;
pub const NUM_HEADS: u16 = 2;
pub const NUM_SECTORS: u16 = 12;

pub const HEADER_WORDS: usize = 4;
pub const LABEL_WORDS: usize = 10;
pub const DATA_WORDS: usize = 258;

const SEEK_DURATION: i32 = 5882;
const SECTOR_DURATION: i32 = 19607;
const WORD_DURATION: i32 = 56;
const SECLATE_DURATION: i32 = 505;

const AW_SECTOR_SHIFT: u16 = 12;
const AW_SECTOR_MASK: u16 = 0x000F;
const AW_CYLINDER_SHIFT: u16 = 3;
const AW_CYLINDER_MASK: u16 = 0x01FF;
const AW_HEAD_SHIFT: u16 = 2;
const AW_DISK_SHIFT: u16 = 1;
const AW_RESTORE_SHIFT: u16 = 0;

const KSTAT_ALWAYS_ONE: u16 = 0x0F00;
const KSTAT_SEEK_FAIL: u16 = 0x0080;
const KSTAT_SEEKING: u16 = 0x0040;
const KSTAT_NOT_READY: u16 = 0x0020;
const KSTAT_LATE: u16 = 0x0010;
const KSTAT_CHECKSUM_ERROR: u16 = 0x0004;
const KSTAT_COMPLETION_MASK: u16 = 0x0003;
const KSTAT_IDLE: u16 = 0x0008;

const KCOMM_SHIFT: u16 = 10;
const KCOMM_WDINHB: u16 = 0x08;
const KCOMM_BCLKSRC: u16 = 0x04;
const KCOMM_WFFO: u16 = 0x02;
const KCOMM_SENDADR: u16 = 0x01;
const KCOMM_XFEROFF: u16 = 0x10;
const KCOMM_MASK: u16 = 0x1F;

const KADR_HEADER_SHIFT: u16 = 6;
const KADR_SINGLE_SHIFT: u16 = 2;
const KADR_BLOCK_MASK: u16 = 0x0003;
const KADR_NO_XFER: u16 = 0x0002;

pub const DS_HEADER: u16 = 44;
pub const DS_LABEL: u16 = 58;
pub const DS_DATA: u16 = 78;
pub const DS_END: u16 = 347;

const RECNO_MAP: [u16; 4] = [0, 2, 3, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordType {
    Gap,
    Data,
    Sync,
    Checksum,
}

/// A single sector's on-disk contents, in Diablo reverse-word order.
#[derive(Debug, Clone)]
pub struct DiskSector {
    pub header: [u16; HEADER_WORDS],
    pub label: [u16; LABEL_WORDS],
    pub data: [u16; DATA_WORDS],
}

impl Default for DiskSector {
    fn default() -> Self {
        DiskSector {
            header: [0; HEADER_WORDS],
            label: [0; LABEL_WORDS],
            data: [0; DATA_WORDS],
        }
    }
}

/// One physical drive: geometry state plus its sector store.
#[derive(Debug, Clone, Default)]
pub struct DiskDrive {
    pub head: u16,
    pub cylinder: u16,
    pub target_cylinder: u16,
    pub sector: u16,
    pub sector_word: u16,
    pub loaded: bool,
    sectors: Vec<DiskSector>,
}

impl DiskDrive {
    fn length(&self) -> usize {
        NUM_CYLINDERS as usize * NUM_HEADS as usize * NUM_SECTORS as usize
    }

    /// Loads sector contents from a raw disk-image byte buffer (§6.3).
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<()> {
        let sector_words = HEADER_WORDS + LABEL_WORDS + DATA_WORDS;
        let per_sector = 2 + sector_words * 2;
        let length = self.length();
        let expected = per_sector * length;
        if bytes.len() != expected {
            return Err(Error::InvalidRomSize {
                expected,
                actual: bytes.len(),
            });
        }
        let mut sectors = Vec::with_capacity(length);
        for i in 0..length {
            let base = i * per_sector + 2;
            let mut ds = DiskSector::default();
            let mut off = base;
            for w in ds.header.iter_mut() {
                *w = u16::from_le_bytes([bytes[off], bytes[off + 1]]);
                off += 2;
            }
            for w in ds.label.iter_mut() {
                *w = u16::from_le_bytes([bytes[off], bytes[off + 1]]);
                off += 2;
            }
            for w in ds.data.iter_mut() {
                *w = u16::from_le_bytes([bytes[off], bytes[off + 1]]);
                off += 2;
            }
            sectors.push(ds);
        }
        self.sectors = sectors;
        self.loaded = true;
        Ok(())
    }

    fn vda(&self) -> usize {
        let mut vda = self.cylinder as usize;
        vda *= NUM_HEADS as usize;
        vda += self.head as usize;
        vda *= NUM_SECTORS as usize;
        vda += self.sector as usize;
        vda
    }

    fn sector_mut(&mut self) -> Option<&mut DiskSector> {
        let idx = self.vda();
        self.sectors.get_mut(idx)
    }

    fn sector(&self) -> Option<&DiskSector> {
        let idx = self.vda();
        self.sectors.get(idx)
    }
}

/// Decodes the word at `sector_word` within a sector, returning its type
/// and (for checksum words) the computed checksum value.
fn get_sector_word(ds: Option<&DiskSector>, sector_word: u16) -> (WordType, u16) {
    if sector_word < DS_HEADER {
        return (WordType::Gap, 0);
    }
    if sector_word <= DS_HEADER {
        return (WordType::Sync, 0);
    }
    if sector_word <= DS_HEADER + 2 {
        return (WordType::Data, 0);
    }
    if sector_word <= DS_HEADER + 3 {
        let checksum = ds.map(|d| compute_checksum(&d.header)).unwrap_or(0);
        return (WordType::Checksum, checksum);
    }
    if sector_word < DS_LABEL {
        return (WordType::Gap, 0);
    }
    if sector_word <= DS_LABEL {
        return (WordType::Sync, 0);
    }
    if sector_word <= DS_LABEL + 8 {
        return (WordType::Data, 0);
    }
    if sector_word <= DS_LABEL + 9 {
        let checksum = ds.map(|d| compute_checksum(&d.label)).unwrap_or(0);
        return (WordType::Checksum, checksum);
    }
    if sector_word < DS_DATA {
        return (WordType::Gap, 0);
    }
    if sector_word <= DS_DATA {
        return (WordType::Sync, 0);
    }
    if sector_word <= DS_DATA + 256 {
        return (WordType::Data, 0);
    }
    if sector_word <= DS_DATA + 257 {
        let checksum = ds.map(|d| compute_checksum(&d.data)).unwrap_or(0);
        return (WordType::Checksum, checksum);
    }
    (WordType::Gap, 0)
}

fn compute_checksum(data: &[u16]) -> u16 {
    data.iter().fold(0x0151u16, |acc, &w| acc ^ w)
}

fn data_word_mut<'a>(ds: &'a mut DiskSector, sector_word: u16) -> Option<&'a mut u16> {
    if sector_word > DS_HEADER && sector_word <= DS_HEADER + 2 {
        Some(&mut ds.header[(DS_HEADER + 2 - sector_word) as usize])
    } else if sector_word > DS_LABEL && sector_word <= DS_LABEL + 8 {
        Some(&mut ds.label[(DS_LABEL + 8 - sector_word) as usize])
    } else if sector_word > DS_DATA && sector_word <= DS_DATA + 256 {
        Some(&mut ds.data[(DS_DATA + 256 - sector_word) as usize])
    } else {
        None
    }
}

fn data_word(ds: &DiskSector, sector_word: u16) -> Option<u16> {
    if sector_word > DS_HEADER && sector_word <= DS_HEADER + 2 {
        Some(ds.header[(DS_HEADER + 2 - sector_word) as usize])
    } else if sector_word > DS_LABEL && sector_word <= DS_LABEL + 8 {
        Some(ds.label[(DS_LABEL + 8 - sector_word) as usize])
    } else if sector_word > DS_DATA && sector_word <= DS_DATA + 256 {
        Some(ds.data[(DS_DATA + 256 - sector_word) as usize])
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Disk {
    pub drives: [DiskDrive; NUM_DRIVES],
    pub kstat: u16,
    pub kdata_read: u16,
    pub kdata: u16,
    pub has_kdata: bool,
    pub kadr: u16,
    pub kcomm: u16,
    pub disk: usize,
    pub rec_no: u8,
    pub restore: bool,
    pub sync_word_written: bool,
    pub bitclk_enable: bool,
    pub wdinit: bool,
    pub seclate_enable: bool,
    pub intr_cycle: i32,
    pub ds_intr_cycle: Option<i32>,
    pub dw_intr_cycle: Option<i32>,
    pub seek_intr_cycle: Option<i32>,
    pub seclate_intr_cycle: Option<i32>,
    pub pending: u16,
}

impl Default for Disk {
    fn default() -> Self {
        Disk {
            drives: [DiskDrive::default(), DiskDrive::default()],
            kstat: 0,
            kdata_read: 0,
            kdata: 0,
            has_kdata: false,
            kadr: 0,
            kcomm: 0,
            disk: 0,
            rec_no: 0,
            restore: false,
            sync_word_written: false,
            bitclk_enable: false,
            wdinit: false,
            seclate_enable: false,
            intr_cycle: 1,
            ds_intr_cycle: Some(1),
            dw_intr_cycle: None,
            seek_intr_cycle: None,
            seclate_intr_cycle: None,
            pending: 0,
        }
    }
}

impl Disk {
    /// Resets all controller registers; drive geometry state is also
    /// reset to cylinder/head/sector 0, but `loaded` / sector contents
    /// are untouched (disk images survive a soft reset).
    pub fn reset(&mut self) {
        self.kstat = 0;
        self.kdata_read = 0;
        self.kdata = 0;
        self.has_kdata = false;
        self.kadr = 0;
        self.kcomm = 0;
        self.disk = 0;
        for d in self.drives.iter_mut() {
            d.head = 0;
            d.cylinder = 0;
            d.target_cylinder = 0;
            d.sector = 0;
            d.sector_word = 0;
        }
        self.rec_no = 0;
        self.restore = false;
        self.sync_word_written = false;
        self.bitclk_enable = false;
        self.wdinit = false;
        self.intr_cycle = 1;
        self.ds_intr_cycle = Some(1);
        self.dw_intr_cycle = None;
        self.seek_intr_cycle = None;
        self.seclate_intr_cycle = None;
        self.pending = 0;
    }

    pub fn read_kstat(&self) -> u16 {
        KSTAT_ALWAYS_ONE | self.kstat
    }

    pub fn load_kstat(&mut self, bus: u16) {
        self.kstat &= !(KSTAT_COMPLETION_MASK | KSTAT_IDLE);
        self.kstat |= bus & (KSTAT_COMPLETION_MASK | KSTAT_IDLE);
        self.kstat |= (!bus) & KSTAT_CHECKSUM_ERROR;
    }

    pub fn read_kdata(&self) -> u16 {
        self.kdata_read
    }

    pub fn load_kdata(&mut self, bus: u16) {
        self.kdata = bus;
        self.has_kdata = true;
    }

    pub fn load_kcomm(&mut self, bus: u16) {
        self.kcomm = (bus >> KCOMM_SHIFT) & KCOMM_MASK;
        if self.kcomm & KCOMM_WDINHB != 0 {
            self.wdinit = true;
        }
        self.bitclk_enable = self.kcomm & KCOMM_WFFO != 0;
        if self.kcomm & KCOMM_SENDADR != 0 && (self.kdata >> AW_DISK_SHIFT) & 1 != 0 {
            self.kstat &= !KSTAT_SEEKING;
        }
    }

    pub fn load_kadr(&mut self, bus: u16) {
        self.kadr = bus & 0xFF;
        self.rec_no = 0;
        self.sync_word_written = false;

        let drive = &mut self.drives[self.disk];
        drive.head = (self.kdata >> AW_HEAD_SHIFT) & 1;
        self.disk = ((self.kdata >> AW_DISK_SHIFT) & 1) as usize;
        if (self.kdata >> AW_RESTORE_SHIFT) & 1 != 0 {
            self.restore = true;
        }
    }

    /// `STROBE`: initiates a seek using KDATA's cylinder field.
    pub fn func_strobe(&mut self, cycle: i32) -> Result<()> {
        if self.kcomm & KCOMM_SENDADR == 0 {
            return Err(Error::Microcode("STROBE issued while SENDADR is not set".into()));
        }
        let mut cylinder = (self.kdata >> AW_CYLINDER_SHIFT) & AW_CYLINDER_MASK;
        if self.restore {
            cylinder = 0;
        }

        let drive = &mut self.drives[self.disk];
        if !drive.loaded || cylinder >= NUM_CYLINDERS {
            self.kstat &= !KSTAT_SEEKING;
            self.kstat |= KSTAT_SEEK_FAIL;
            return Ok(());
        }
        if cylinder == drive.cylinder {
            self.kstat &= !(KSTAT_SEEKING | KSTAT_SEEK_FAIL);
            return Ok(());
        }

        self.kstat &= !KSTAT_SEEK_FAIL;
        self.kstat |= KSTAT_SEEKING;
        drive.target_cylinder = cylinder;
        self.seek_intr_cycle = Some(cycle + SEEK_DURATION);
        Ok(())
    }

    /// `INCRECNO`: advances the record number, erroring on wraparound.
    pub fn func_increcno(&mut self) -> Result<()> {
        self.rec_no = (self.rec_no + 1) & 3;
        self.sync_word_written = false;
        if self.rec_no == 0 {
            return Err(Error::Microcode("INCRECNO overflowed the record number".into()));
        }
        Ok(())
    }

    /// `CLRSTAT`: clears checksum-error/late/not-ready/seek-fail bits.
    pub fn func_clrstat(&mut self) {
        self.kstat &= !(KSTAT_CHECKSUM_ERROR | KSTAT_LATE | KSTAT_NOT_READY | KSTAT_SEEK_FAIL);
    }

    /// `INIT`: also folded into the start of RWC/RECNO/XFRDAT/SWRNRDY/
    /// NFER/STROBON, but reachable directly as its own F2 function too.
    pub fn func_init(&self, task: u8) -> u16 {
        if task != TASK_DISK_WORD {
            return 0;
        }
        if self.wdinit {
            0x1F
        } else {
            0
        }
    }

    fn rwc_shift(&self) -> u16 {
        KADR_HEADER_SHIFT - KADR_SINGLE_SHIFT * (self.rec_no as u16 & 3)
    }

    /// `RWC`: derives READ/CHECK/WRITE bits from KADR and the current
    /// record number.
    pub fn func_rwc(&self, task: u8) -> u16 {
        let mut next_extra = self.func_init(task);
        let oper = (self.kadr >> self.rwc_shift()) & KADR_BLOCK_MASK;
        match oper {
            0 => {}
            1 => next_extra |= 2,
            _ => next_extra |= 3,
        }
        next_extra
    }

    /// `RECNO`: returns the record number through the flip-flop-wiring
    /// remap (0,1,2,3 -> 0,2,3,1).
    pub fn func_recno(&self, task: u8) -> u16 {
        let mut next_extra = self.func_init(task);
        next_extra |= RECNO_MAP[(self.rec_no & 3) as usize];
        next_extra
    }

    pub fn func_xfrdat(&self, task: u8) -> u16 {
        let mut next_extra = self.func_init(task);
        next_extra |= u16::from(self.kadr & KADR_NO_XFER == 0);
        next_extra
    }

    pub fn func_swrnrdy(&self, task: u8) -> u16 {
        let mut next_extra = self.func_init(task);
        let drive = &self.drives[self.disk];
        if !drive.loaded || self.kstat & KSTAT_SEEKING != 0 {
            next_extra |= 1;
        }
        next_extra
    }

    pub fn func_nfer(&self, task: u8) -> u16 {
        let mut next_extra = self.func_init(task);
        let drive = &self.drives[self.disk];
        if !drive.loaded || self.kstat & KSTAT_SEEKING != 0 {
            return next_extra;
        }
        if self.kstat & (KSTAT_LATE | KSTAT_SEEK_FAIL | KSTAT_NOT_READY) != 0 {
            return next_extra;
        }
        next_extra |= 1;
        next_extra
    }

    pub fn func_strobon(&self, task: u8) -> u16 {
        let mut next_extra = self.func_init(task);
        next_extra |= u16::from(self.kstat & KSTAT_SEEKING != 0);
        next_extra
    }

    pub fn block_task(&mut self, task: u8) {
        if task == TASK_DISK_WORD {
            self.wdinit = false;
        }
        self.pending &= !(1 << task);
    }

    fn ds_interrupt(&mut self) {
        let drive = &mut self.drives[self.disk];
        drive.sector += 1;
        if drive.sector == NUM_SECTORS {
            drive.sector = 0;
        }

        self.kstat &= !(AW_SECTOR_MASK << AW_SECTOR_SHIFT);
        self.kstat |= drive.sector << AW_SECTOR_SHIFT;

        if !drive.loaded {
            self.kstat |= KSTAT_NOT_READY;
        } else {
            self.kstat &= !KSTAT_NOT_READY;
        }

        drive.sector_word = 0;
        self.sync_word_written = false;
        self.kdata_read = 0;

        if self.kstat & KSTAT_SEEKING == 0 {
            self.pending |= 1 << TASK_DISK_SECTOR;
            self.seclate_enable = true;
            self.kstat &= !KSTAT_LATE;
            self.dw_intr_cycle = Some(self.intr_cycle + WORD_DURATION);
            self.ds_intr_cycle = None;
            self.seclate_intr_cycle = Some(self.intr_cycle + SECLATE_DURATION);
        } else {
            self.ds_intr_cycle = Some(self.intr_cycle + SECTOR_DURATION);
        }
    }

    fn dw_interrupt(&mut self) {
        let shift = self.rwc_shift();
        let oper = (self.kadr >> shift) & KADR_BLOCK_MASK;
        let is_write = oper >= 2;
        let sync_word_written = self.sync_word_written;
        let rec_no = self.rec_no;

        let drive = &mut self.drives[self.disk];
        let sector_word = drive.sector_word;
        let (word_type, checksum) = get_sector_word(drive.sector(), sector_word);
        let wv = match word_type {
            WordType::Data => drive.sector().and_then(|ds| data_word(ds, sector_word)).unwrap_or(0),
            WordType::Sync => 1,
            WordType::Checksum => checksum,
            WordType::Gap => 0,
        };

        let seclate = self.kstat & KSTAT_LATE != 0;
        let wd_inhib = self.kcomm & KCOMM_WDINHB != 0;
        let bclk_source = self.kcomm & KCOMM_BCLKSRC != 0;
        let wffo = self.kcomm & KCOMM_WFFO != 0;
        let xfer_off = self.kcomm & KCOMM_XFEROFF != 0;

        let mut bwakeup = !seclate && !wd_inhib && !bclk_source;

        if !seclate && (wffo || self.bitclk_enable) {
            if !xfer_off {
                if !is_write {
                    self.kdata_read = wv;
                } else {
                    if self.has_kdata {
                        self.kdata_read = self.kdata;
                        self.has_kdata = false;
                    }
                    if sync_word_written {
                        if let Some(ds) = drive.sector_mut() {
                            if let Some(word) = data_word_mut(ds, sector_word) {
                                *word = self.kdata;
                            }
                        }
                    }
                }
            }
            if !wd_inhib {
                bwakeup = true;
            }
        }

        if !is_write && !wffo && wv == 1 {
            self.bitclk_enable = true;
        } else if is_write && wffo && self.kdata == 1 && !sync_word_written {
            self.sync_word_written = true;
            drive.sector_word = match rec_no & 3 {
                0 => DS_HEADER,
                1 => DS_LABEL,
                _ => DS_DATA,
            };
        }

        drive.sector_word += 1;

        if bwakeup {
            self.pending |= 1 << TASK_DISK_WORD;
        }

        if drive.sector_word < DS_END {
            self.dw_intr_cycle = Some(self.intr_cycle + WORD_DURATION);
        } else {
            self.dw_intr_cycle = None;
            self.ds_intr_cycle = Some(self.intr_cycle + 1);
        }
    }

    fn seek_interrupt(&mut self) {
        let drive = &mut self.drives[self.disk];
        match drive.cylinder.cmp(&drive.target_cylinder) {
            std::cmp::Ordering::Less => drive.cylinder += 1,
            std::cmp::Ordering::Greater => drive.cylinder -= 1,
            std::cmp::Ordering::Equal => {}
        }
        if drive.cylinder == drive.target_cylinder {
            self.kstat &= !KSTAT_SEEKING;
            self.restore = false;
            self.seek_intr_cycle = None;
        } else {
            self.seek_intr_cycle = Some(self.intr_cycle + SEEK_DURATION);
        }
    }

    fn seclate_interrupt(&mut self) {
        if self.seclate_enable {
            self.kstat |= KSTAT_LATE;
        }
        self.seclate_intr_cycle = None;
    }

    /// Services whichever scheduled interrupts are due, then recomputes
    /// the combined `intr_cycle`.
    pub fn interrupt(&mut self) -> Result<()> {
        let has_ds = self.ds_intr_cycle == Some(self.intr_cycle);
        let has_dw = self.dw_intr_cycle == Some(self.intr_cycle);
        let has_seek = self.seek_intr_cycle == Some(self.intr_cycle);
        let has_seclate = self.seclate_intr_cycle == Some(self.intr_cycle);

        if has_ds {
            self.ds_interrupt();
        }
        if has_dw {
            self.dw_interrupt();
        }
        if has_seek {
            self.seek_interrupt();
        }
        if has_seclate {
            self.seclate_interrupt();
        }

        self.intr_cycle = compute_intr_cycle(
            self.intr_cycle,
            false,
            &[self.ds_intr_cycle, self.dw_intr_cycle, self.seek_intr_cycle, self.seclate_intr_cycle],
        )?
        .unwrap_or(self.intr_cycle);
        Ok(())
    }

    /// Called whenever the engine switches onto a disk task; clears the
    /// SECLATE-arming flag specifically when the sector task runs.
    pub fn on_switch_task(&mut self, task: u8) {
        if task == TASK_DISK_SECTOR {
            self.seclate_enable = false;
        }
    }

    pub fn serialize(&self, w: &mut StateWriter) {
        for d in &self.drives {
            w.put_u16(d.head);
            w.put_u16(d.cylinder);
            w.put_u16(d.target_cylinder);
            w.put_u16(d.sector);
            w.put_u16(d.sector_word);
            w.put_bool(d.loaded);
        }
        w.put_u16(self.kstat);
        w.put_u16(self.kdata_read);
        w.put_u16(self.kdata);
        w.put_bool(self.has_kdata);
        w.put_u16(self.kadr);
        w.put_u16(self.kcomm);
        w.put_u16(self.disk as u16);
        w.put_u8(self.rec_no);
        w.put_bool(self.restore);
        w.put_bool(self.sync_word_written);
        w.put_bool(self.bitclk_enable);
        w.put_bool(self.wdinit);
        w.put_bool(self.seclate_enable);
        w.put_i32(self.intr_cycle);
        w.put_cycle(self.ds_intr_cycle);
        w.put_cycle(self.dw_intr_cycle);
        w.put_cycle(self.seek_intr_cycle);
        w.put_cycle(self.seclate_intr_cycle);
        w.put_u16(self.pending);
    }

    pub fn deserialize(r: &mut StateReader) -> Result<Self> {
        let mut disk = Disk::default();
        for d in disk.drives.iter_mut() {
            d.head = r.get_u16()?;
            d.cylinder = r.get_u16()?;
            d.target_cylinder = r.get_u16()?;
            d.sector = r.get_u16()?;
            d.sector_word = r.get_u16()?;
            d.loaded = r.get_bool()?;
        }
        disk.kstat = r.get_u16()?;
        disk.kdata_read = r.get_u16()?;
        disk.kdata = r.get_u16()?;
        disk.has_kdata = r.get_bool()?;
        disk.kadr = r.get_u16()?;
        disk.kcomm = r.get_u16()?;
        disk.disk = r.get_u16()? as usize;
        disk.rec_no = r.get_u8()?;
        disk.restore = r.get_bool()?;
        disk.sync_word_written = r.get_bool()?;
        disk.bitclk_enable = r.get_bool()?;
        disk.wdinit = r.get_bool()?;
        disk.seclate_enable = r.get_bool()?;
        disk.intr_cycle = r.get_i32()?;
        disk.ds_intr_cycle = r.get_cycle()?;
        disk.dw_intr_cycle = r.get_cycle()?;
        disk.seek_intr_cycle = r.get_cycle()?;
        disk.seclate_intr_cycle = r.get_cycle()?;
        disk.pending = r.get_u16()?;
        Ok(disk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_kstat_always_sets_bits_8_through_11() {
        let d = Disk::default();
        assert_eq!(d.read_kstat() & KSTAT_ALWAYS_ONE, KSTAT_ALWAYS_ONE);
    }

    #[test]
    fn load_kstat_inverts_bus_bit_13_into_checksum_error() {
        let mut d = Disk::default();
        d.load_kstat(0);
        assert_ne!(d.kstat & KSTAT_CHECKSUM_ERROR, 0);
        d.load_kstat(KSTAT_CHECKSUM_ERROR);
        assert_eq!(d.kstat & KSTAT_CHECKSUM_ERROR, 0);
    }

    #[test]
    fn strobe_fails_without_sendadr() {
        let mut d = Disk::default();
        assert!(d.func_strobe(0).is_err());
    }

    #[test]
    fn strobe_reports_seek_fail_for_unloaded_drive() {
        let mut d = Disk::default();
        d.load_kcomm(KCOMM_SENDADR << KCOMM_SHIFT);
        d.load_kdata(5 << AW_CYLINDER_SHIFT);
        d.func_strobe(0).unwrap();
        assert_ne!(d.kstat & KSTAT_SEEK_FAIL, 0);
    }

    #[test]
    fn strobe_schedules_seek_for_loaded_drive_different_cylinder() {
        let mut d = Disk::default();
        d.drives[0].loaded = true;
        d.load_kcomm(KCOMM_SENDADR << KCOMM_SHIFT);
        d.load_kdata(5 << AW_CYLINDER_SHIFT);
        d.func_strobe(100).unwrap();
        assert_ne!(d.kstat & KSTAT_SEEKING, 0);
        assert_eq!(d.seek_intr_cycle, Some(100 + SEEK_DURATION));
    }

    #[test]
    fn increcno_cycles_through_four_records_then_errors() {
        let mut d = Disk::default();
        d.func_increcno().unwrap();
        d.func_increcno().unwrap();
        d.func_increcno().unwrap();
        assert!(d.func_increcno().is_err());
    }

    #[test]
    fn recno_applies_flip_flop_remap() {
        let mut d = Disk::default();
        assert_eq!(d.func_recno(TASK_DISK_SECTOR), 0);
        d.rec_no = 1;
        assert_eq!(d.func_recno(TASK_DISK_SECTOR), 2);
        d.rec_no = 2;
        assert_eq!(d.func_recno(TASK_DISK_SECTOR), 3);
        d.rec_no = 3;
        assert_eq!(d.func_recno(TASK_DISK_SECTOR), 1);
    }

    #[test]
    fn sector_interrupt_advances_sector_and_sets_not_ready_when_unloaded() {
        let mut d = Disk::default();
        d.ds_interrupt();
        assert_eq!(d.drives[0].sector, 1);
        assert_ne!(d.kstat & KSTAT_NOT_READY, 0);
        assert_ne!(d.pending & (1 << TASK_DISK_SECTOR), 0);
    }

    #[test]
    fn sector_word_layout_boundaries_match_reference_offsets() {
        assert_eq!(get_sector_word(None, DS_HEADER).0, WordType::Sync);
        assert_eq!(get_sector_word(None, DS_HEADER - 1).0, WordType::Gap);
        assert_eq!(get_sector_word(None, DS_HEADER + 1).0, WordType::Data);
        assert_eq!(get_sector_word(None, DS_LABEL).0, WordType::Sync);
        assert_eq!(get_sector_word(None, DS_DATA).0, WordType::Sync);
    }

    #[test]
    fn clrstat_clears_only_the_documented_bits() {
        let mut d = Disk::default();
        d.kstat = KSTAT_CHECKSUM_ERROR | KSTAT_LATE | KSTAT_NOT_READY | KSTAT_SEEK_FAIL | KSTAT_SEEKING;
        d.func_clrstat();
        assert_eq!(d.kstat, KSTAT_SEEKING);
    }

    #[test]
    fn load_image_round_trips_a_single_synthetic_disk() {
        let mut d = DiskDrive::default();
        let sector_words = HEADER_WORDS + LABEL_WORDS + DATA_WORDS;
        let per_sector = 2 + sector_words * 2;
        let length = NUM_CYLINDERS as usize * NUM_HEADS as usize * NUM_SECTORS as usize;
        let bytes = vec![0u8; per_sector * length];
        d.load_image(&bytes).unwrap();
        assert!(d.loaded);
    }
}
