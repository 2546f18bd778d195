//! MSB-first bit cursor with Exp-Golomb decoding.

use crate::error::{Error, Result};

/// Bit reader over a byte slice with a bit-length ceiling.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_limit(data, data.len() * 8)
    }

    /// Reader that refuses to read past `limit` bits.
    pub fn with_limit(data: &'a [u8], limit: usize) -> Self {
        Self {
            data,
            pos: 0,
            limit: limit.min(data.len() * 8),
        }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bits_remaining(&self) -> usize {
        self.limit - self.pos
    }

    /// Read `n` bits (1..=32), most significant first.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if !(1..=32).contains(&n) {
            return Err(Error::InvalidBitCount(n));
        }
        if self.bits_remaining() < n as usize {
            return Err(Error::BitstreamExhausted);
        }

        let mut result = 0u32;
        for _ in 0..n {
            let bit = (self.data[self.pos / 8] >> (7 - self.pos % 8)) & 1;
            result = (result << 1) | bit as u32;
            self.pos += 1;
        }
        Ok(result)
    }

    pub fn read_flag(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        if self.bits_remaining() < n {
            return Err(Error::BitstreamExhausted);
        }
        self.pos += n;
        Ok(())
    }

    /// Unsigned Exp-Golomb: `k` zeros, a one, then `k` bits; 2^k - 1 + bits.
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.read_flag()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(Error::ExpGolombOverflow);
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Ok((1u32 << leading_zeros) - 1 + suffix)
    }

    /// Signed Exp-Golomb: odd codes map to positive values, even to negative.
    pub fn read_se(&mut self) -> Result<i32> {
        let code = self.read_ue()? as i64;
        let value = if code % 2 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };
        Ok(value as i32)
    }
}
