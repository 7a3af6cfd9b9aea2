//! Low-level components dedicated to bit manipulation for CAN buffers.
//! The reader/writer pair addresses arbitrary bit positions in either byte
//! order, since translated signals seldom align with byte boundaries.
use crate::core::ByteOrder;
use crate::error::{BitReaderError, BitWriterError};

/// Generic reader that extracts bit segments from a `&[u8]`
/// without extra allocation or copies.
pub struct BitReader<'a> {
    /// Shared source buffer (typically the received CAN payload).
    buffer: &'a [u8],
    /// Current index in bits, numbered according to the byte order of the next read.
    bit_cursor: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the start of the provided buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    /// Move the cursor to an absolute bit position.
    pub fn seek(&mut self, bit: usize) -> Result<(), BitReaderError> {
        let buffer_len_bits = self.buffer.len() * 8;
        if bit > buffer_len_bits {
            return Err(BitReaderError::OutOfBounds {
                asked: bit,
                available: buffer_len_bits,
            });
        }
        self.bit_cursor = bit;
        Ok(())
    }

    /// Read `num_bits` bits in the given byte order and return them right-aligned.
    pub fn read(&mut self, order: ByteOrder, num_bits: u8) -> Result<u64, BitReaderError> {
        match order {
            ByteOrder::LittleEndian => self.read_u64(num_bits),
            ByteOrder::BigEndian => self.read_u64_msb_first(num_bits),
        }
    }

    /// Check the admissible length and the remaining room before a read.
    fn check(&self, num_bits: u8) -> Result<(), BitReaderError> {
        if !(1..=64).contains(&num_bits) {
            return Err(BitReaderError::TooLongForType {
                max: 64,
                asked: num_bits,
            });
        }
        let buffer_len_bits = self.buffer.len() * 8;
        if self.bit_cursor + num_bits as usize > buffer_len_bits {
            return Err(BitReaderError::OutOfBounds {
                asked: num_bits as usize,
                available: buffer_len_bits.saturating_sub(self.bit_cursor),
            });
        }
        Ok(())
    }

    /// Read `num_bits` bits LSB-first (Intel numbering) starting at the cursor.
    /// `num_bits` must stay in the [1, 64] range.
    pub fn read_u64(&mut self, num_bits: u8) -> Result<u64, BitReaderError> {
        self.check(num_bits)?;

        // Assemble the requested bits.
        let mut result: u64 = 0;
        let mut bits_read = 0;

        while bits_read < num_bits {
            let current_byte_index = (self.bit_cursor + bits_read as usize) / 8;
            let current_bit_offset = (self.bit_cursor + bits_read as usize) % 8;

            let byte = self.buffer[current_byte_index];

            // Number of bits available within the current byte.
            let bits_to_read_this_iteration =
                (8 - current_bit_offset).min(num_bits as usize - bits_read as usize);

            let mask = ((1u16 << bits_to_read_this_iteration) - 1) as u8;
            let masked_value = (byte >> current_bit_offset) & mask;

            // Lower bytes carry the lower bits.
            result |= (masked_value as u64) << bits_read;

            bits_read += bits_to_read_this_iteration as u8;
        }
        self.bit_cursor += num_bits as usize;
        Ok(result)
    }

    /// Read `num_bits` bits MSB-first (sequential Motorola numbering: bit 0 is
    /// the MSB of byte 0) starting at the cursor.
    pub fn read_u64_msb_first(&mut self, num_bits: u8) -> Result<u64, BitReaderError> {
        self.check(num_bits)?;

        let mut result: u64 = 0;
        let mut bits_read = 0;

        while bits_read < num_bits {
            let position = self.bit_cursor + bits_read as usize;
            let byte = self.buffer[position / 8];

            // Bits left in this byte, counted from the current position down to the LSB.
            let available = 8 - position % 8;
            let take = available.min(num_bits as usize - bits_read as usize);

            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (byte >> (available - take)) & mask;

            // Earlier bytes carry the higher bits. `take` may be 8 on a 64-bit read.
            result = (result << (take - 1) << 1) | chunk as u64;

            bits_read += take as u8;
        }
        self.bit_cursor += num_bits as usize;
        Ok(result)
    }
}
//==================================================================================BITWRITER

/// Generic writer able to lay bit segments into a `&mut [u8]` without
/// assuming byte alignment. Bits outside the written range are preserved,
/// which is what lets several rules share one destination payload.
pub struct BitWriter<'a> {
    /// Target buffer (typically the destination payload under construction).
    buffer: &'a mut [u8],
    /// Current position in bits.
    bit_cursor: usize,
}

impl<'a> BitWriter<'a> {
    /// Create a writer positioned at the start of the buffer.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    /// Expose the cursor position in bits.
    pub fn bit_cursor(&self) -> usize {
        self.bit_cursor
    }

    /// Move the cursor to an absolute bit position.
    pub fn seek(&mut self, bit: usize) -> Result<(), BitWriterError> {
        let buffer_len_bits = self.buffer.len() * 8;
        if bit > buffer_len_bits {
            return Err(BitWriterError::OutOfBounds {
                asked: bit,
                available: buffer_len_bits,
            });
        }
        self.bit_cursor = bit;
        Ok(())
    }

    /// Write the low `num_bits` bits of `value` in the given byte order.
    pub fn write(&mut self, order: ByteOrder, value: u64, num_bits: u8) -> Result<(), BitWriterError> {
        match order {
            ByteOrder::LittleEndian => self.write_u64(value, num_bits),
            ByteOrder::BigEndian => self.write_u64_msb_first(value, num_bits),
        }
    }

    fn check(&self, num_bits: u8) -> Result<(), BitWriterError> {
        if !(1..=64).contains(&num_bits) {
            return Err(BitWriterError::TooLongForType {
                max: 64,
                asked: num_bits,
            });
        }
        let buffer_len_bits = self.buffer.len() * 8;
        if self.bit_cursor + num_bits as usize > buffer_len_bits {
            return Err(BitWriterError::OutOfBounds {
                asked: num_bits as usize,
                available: buffer_len_bits.saturating_sub(self.bit_cursor),
            });
        }
        Ok(())
    }

    /// Write `num_bits` bits LSB-first (Intel numbering) from the provided `u64`.
    pub fn write_u64(&mut self, value: u64, num_bits: u8) -> Result<(), BitWriterError> {
        self.check(num_bits)?;

        let mut val_to_write = value;
        let mut bits_write = 0;

        while bits_write < num_bits {
            let current_byte_index = (self.bit_cursor + bits_write as usize) / 8;
            let current_bit_offset = (self.bit_cursor + bits_write as usize) % 8;

            // Number of bits available in the current byte.
            let bits_to_write_this_iteration =
                (8 - current_bit_offset).min(num_bits as usize - bits_write as usize);

            // Update only the relevant bits.
            let mask = ((1u16 << bits_to_write_this_iteration) - 1) as u8;
            self.buffer[current_byte_index] &= !(mask << current_bit_offset);
            self.buffer[current_byte_index] |= (val_to_write as u8 & mask) << current_bit_offset;

            // `bits_to_write_this_iteration` may be 8 on the last byte of a 64-bit write.
            val_to_write = val_to_write >> (bits_to_write_this_iteration - 1) >> 1;

            bits_write += bits_to_write_this_iteration as u8;
        }

        self.bit_cursor += num_bits as usize;

        Ok(())
    }

    /// Write `num_bits` bits MSB-first (sequential Motorola numbering) from the provided `u64`.
    pub fn write_u64_msb_first(&mut self, value: u64, num_bits: u8) -> Result<(), BitWriterError> {
        self.check(num_bits)?;

        let mut bits_write = 0;

        while bits_write < num_bits {
            let position = self.bit_cursor + bits_write as usize;
            let available = 8 - position % 8;
            let remaining = num_bits as usize - bits_write as usize;
            let take = available.min(remaining);

            // Highest not-yet-written bits of `value` first.
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (value >> (remaining - take)) as u8 & mask;
            let shift = available - take;

            self.buffer[position / 8] &= !(mask << shift);
            self.buffer[position / 8] |= chunk << shift;

            bits_write += take as u8;
        }

        self.bit_cursor += num_bits as usize;

        Ok(())
    }
}
