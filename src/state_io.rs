//! Byte-exact state serialization (§4.9, §6.5) plus little-endian ROM
//! and disk-image binary I/O (§6.1-6.3). Fixed-endianness helpers built
//! on `byteorder`, used the way the corpus's emulator tooling wraps
//! binary ROM/state formats.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Appends fields to a byte-exact state buffer, big-endian throughout.
#[derive(Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    pub fn new() -> Self {
        StateWriter { buf: Vec::new() }
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(if v { 1 } else { 0 });
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        let mut tmp = [0u8; 2];
        BigEndian::write_u16(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn put_u32(&mut self, v: u32) {
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }

    /// Cycle fields are `Option<i32>`: `None` is written as -1, mirroring
    /// the reference's "negative means no event" convention.
    pub fn put_cycle(&mut self, v: Option<i32>) {
        self.put_i32(v.unwrap_or(-1));
    }

    pub fn put_u8_array(&mut self, arr: &[u8]) {
        self.buf.extend_from_slice(arr);
    }

    pub fn put_u16_array(&mut self, arr: &[u16]) {
        for &v in arr {
            self.put_u16(v);
        }
    }

    pub fn put_u32_array(&mut self, arr: &[u32]) {
        for &v in arr {
            self.put_u32(v);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Consumes fields from a byte-exact state buffer, erroring on short
/// reads or leftover trailing bytes (§4.9's "refuses any file that does
/// not consume exactly the expected number of bytes").
pub struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        StateReader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::Serialization(format!(
                "unexpected end of state data: wanted {n} bytes at offset {}, have {}",
                self.pos,
                self.data.len()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_cycle(&mut self) -> Result<Option<i32>> {
        let v = self.get_i32()?;
        Ok(if v < 0 { None } else { Some(v) })
    }

    pub fn get_u8_array(&mut self, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(self.take(out.len())?);
        Ok(())
    }

    pub fn get_u16_array(&mut self, out: &mut [u16]) -> Result<()> {
        for slot in out.iter_mut() {
            *slot = self.get_u16()?;
        }
        Ok(())
    }

    pub fn get_u32_array(&mut self, out: &mut [u32]) -> Result<()> {
        for slot in out.iter_mut() {
            *slot = self.get_u32()?;
        }
        Ok(())
    }

    /// Confirms every byte of the buffer was consumed.
    pub fn finish(self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(Error::Serialization(format!(
                "trailing {} bytes after deserializing state",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}

/// Loads a microcode ROM bank: `count` little-endian 32-bit words, each
/// XORed with the hardware's invert mask on the way in (§6.1).
pub fn load_microcode_rom(bytes: &[u8], count: usize) -> Result<Vec<u32>> {
    let expected = count * 4;
    if bytes.len() != expected {
        return Err(Error::InvalidRomSize {
            expected,
            actual: bytes.len(),
        });
    }
    Ok((0..count)
        .map(|i| byteorder::LittleEndian::read_u32(&bytes[i * 4..i * 4 + 4]) ^ crate::microcode::MC_INVERT_MASK)
        .collect())
}

/// Loads the 256-word constant ROM: little-endian 16-bit words (§6.2).
pub fn load_constant_rom(bytes: &[u8]) -> Result<Vec<u16>> {
    let expected = crate::microcode::CONSTANT_SIZE * 2;
    if bytes.len() != expected {
        return Err(Error::InvalidRomSize {
            expected,
            actual: bytes.len(),
        });
    }
    Ok((0..crate::microcode::CONSTANT_SIZE)
        .map(|i| byteorder::LittleEndian::read_u16(&bytes[i * 2..i * 2 + 2]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_fields() {
        let mut w = StateWriter::new();
        w.put_u32(0xDEAD_BEEF);
        w.put_bool(true);
        w.put_u16(0x1234);
        w.put_cycle(None);
        w.put_cycle(Some(42));
        let bytes = w.into_bytes();

        let mut r = StateReader::new(&bytes);
        assert_eq!(r.get_u32().unwrap(), 0xDEAD_BEEF);
        assert!(r.get_bool().unwrap());
        assert_eq!(r.get_u16().unwrap(), 0x1234);
        assert_eq!(r.get_cycle().unwrap(), None);
        assert_eq!(r.get_cycle().unwrap(), Some(42));
        r.finish().unwrap();
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut w = StateWriter::new();
        w.put_u8(1);
        w.put_u8(2);
        let bytes = w.into_bytes();
        let mut r = StateReader::new(&bytes);
        r.get_u8().unwrap();
        assert!(r.finish().is_err());
    }

    #[test]
    fn wrong_rom_size_is_rejected() {
        let bytes = vec![0u8; 10];
        assert!(load_constant_rom(&bytes).is_err());
    }
}
