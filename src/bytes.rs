use crate::error::{DecodeError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// A positioned view over an immutable byte buffer. Every read advances the
/// position by exactly the consumed length; running past the end fails with
/// [`DecodeError::Exhausted`] and leaves the position untouched.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn tell(&self) -> usize {
        self.offset
    }

    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(DecodeError::SeekOutOfRange {
                offset,
                len: self.data.len(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(DecodeError::Exhausted {
                offset: self.offset,
                needed: count,
                remaining: self.remaining(),
            });
        }
        let chunk = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(chunk)
    }

    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(DecodeError::Exhausted {
                offset: self.offset,
                needed: count,
                remaining: self.remaining(),
            });
        }
        Ok(&self.data[self.offset..self.offset + count])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u24_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u24(self.read_bytes(3)?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    /// Fixed-width Latin-1 string: trailing NULs stripped, surrounding
    /// whitespace trimmed. Malformed bytes become replacement characters,
    /// never a failure.
    pub fn read_fixed_str(&mut self, length: usize) -> Result<String> {
        let raw = self.read_bytes(length)?;
        Ok(decode_latin1_trimmed(raw))
    }

    /// Fixed-width string decoded through an Appendix 1 code page. Unknown
    /// code pages fall back to lossy UTF-8, matching what downstream viewers
    /// tolerate.
    pub fn read_fixed_str_code_page(&mut self, length: usize, code_page: u8) -> Result<String> {
        let raw = self.read_bytes(length)?;
        let stripped = strip_trailing_nuls(raw);
        let text = match code_page {
            1 => textcode::iso8859_1::decode_to_string(stripped),
            2 => textcode::iso8859_2::decode_to_string(stripped),
            3 => textcode::iso8859_3::decode_to_string(stripped),
            4 => textcode::iso8859_4::decode_to_string(stripped),
            5 => textcode::iso8859_5::decode_to_string(stripped),
            6 => textcode::iso8859_6::decode_to_string(stripped),
            7 => textcode::iso8859_7::decode_to_string(stripped),
            8 => textcode::iso8859_8::decode_to_string(stripped),
            9 => textcode::iso8859_9::decode_to_string(stripped),
            13 => textcode::iso8859_13::decode_to_string(stripped),
            14 => textcode::iso8859_14::decode_to_string(stripped),
            15 => textcode::iso8859_15::decode_to_string(stripped),
            16 => textcode::iso8859_16::decode_to_string(stripped),
            80 => encoding_rs::KOI8_U.decode(stripped).0.to_string(),
            85 => encoding_rs::KOI8_R.decode(stripped).0.to_string(),
            _ => textcode::iso8859_1::decode_to_string(stripped),
        };
        Ok(text.trim().to_string())
    }

    /// BCD digits as text, two digits per byte; nibbles above 9 become `?`.
    pub fn read_bcd(&mut self, length: usize) -> Result<String> {
        let raw = self.read_bytes(length)?;
        let mut digits = String::with_capacity(length * 2);
        for byte in raw {
            digits.push(bcd_digit(byte >> 4));
            digits.push(bcd_digit(byte & 0x0F));
        }
        Ok(digits)
    }

    /// Raw 32-bit TimeReal second count; range/sentinel interpretation is the
    /// caller's concern.
    pub fn read_time_real_raw(&mut self) -> Result<u32> {
        self.read_u32_be()
    }
}

fn bcd_digit(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => '?',
    }
}

fn strip_trailing_nuls(raw: &[u8]) -> &[u8] {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
    &raw[..end]
}

pub fn decode_latin1_trimmed(raw: &[u8]) -> String {
    textcode::iso8859_1::decode_to_string(strip_trailing_nuls(raw))
        .trim()
        .to_string()
}
