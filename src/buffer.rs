//! Bounds checked byte sink used by all record copy operations.
use crate::{Error, Result};

/// Wraps a caller owned byte slice with a write cursor. A write either fully succeeds and advances the cursor, or fails with [`Error::BufferTooSmall`] and leaves the cursor unchanged.
#[derive(Debug)]
pub struct DestinationBuffer<'a> {
    buffer: &'a mut [u8],
    write_index: usize,
}

impl<'a> DestinationBuffer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            write_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.write_index
    }

    pub fn has_space(&self, size: usize) -> bool {
        size <= self.remaining()
    }

    /// Moves the write cursor. Used to reserve room for a header that is written after the payload.
    pub fn set_write_index(&mut self, index: usize) -> Result<()> {
        if index > self.capacity() {
            return Err(Error::BufferTooSmall);
        }
        self.write_index = index;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Writes the lower three bytes, big endian. Used for UDS DTCs.
    pub fn write_u24(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes()[1..])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if !self.has_space(data.len()) {
            return Err(Error::BufferTooSmall);
        }
        let end = self.write_index + data.len();
        self.buffer[self.write_index..end].copy_from_slice(data);
        self.write_index = end;
        Ok(())
    }

    pub fn fill(&mut self, value: u8, count: usize) -> Result<()> {
        if !self.has_space(count) {
            return Err(Error::BufferTooSmall);
        }
        let end = self.write_index + count;
        self.buffer[self.write_index..end].fill(value);
        self.write_index = end;
        Ok(())
    }

    /// Bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.buffer[..self.write_index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_advances_cursor() {
        let mut data = [0u8; 8];
        let mut buffer = DestinationBuffer::new(&mut data);

        buffer.write_u8(0x01).unwrap();
        buffer.write_u16(0x0203).unwrap();
        buffer.write_u24(0xaa040506).unwrap();

        assert_eq!(buffer.write_index(), 6);
        assert_eq!(buffer.remaining(), 2);
        assert_eq!(buffer.written(), &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn rejected_write_keeps_cursor() {
        let mut data = [0u8; 4];
        let mut buffer = DestinationBuffer::new(&mut data);

        buffer.write_u16(0xbeef).unwrap();
        assert_eq!(buffer.write_u32(0x01020304), Err(Error::BufferTooSmall));
        assert_eq!(buffer.fill(0xff, 3), Err(Error::BufferTooSmall));
        assert_eq!(buffer.write_index(), 2);

        buffer.fill(0xff, 2).unwrap();
        assert_eq!(buffer.written(), &[0xbe, 0xef, 0xff, 0xff]);
    }

    #[test]
    fn cursor_is_movable_within_capacity() {
        let mut data = [0u8; 4];
        let mut buffer = DestinationBuffer::new(&mut data);

        buffer.set_write_index(1).unwrap();
        buffer.write_u8(0x42).unwrap();
        assert_eq!(buffer.set_write_index(5), Err(Error::BufferTooSmall));
        assert_eq!(buffer.write_index(), 2);

        buffer.set_write_index(0).unwrap();
        buffer.write_u8(0x01).unwrap();
        buffer.set_write_index(2).unwrap();
        assert_eq!(buffer.written(), &[0x01, 0x42]);
    }
}
