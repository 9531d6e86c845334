//! Bit-level cursors for layer-3 PDUs.
//!
//! `BitReader` walks an immutable byte slice MSB-first at arbitrary bit
//! offsets and never moves past its bound. `BitWriter` appends bits to a
//! growable buffer. Every access is bounds-checked and reported through
//! [`BitError`] instead of panicking, so untrusted input can be fed to the
//! reader directly.

use std::cell::Cell;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors raised by the bit cursors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitError {
    /// Fewer bits remain than the access requires
    #[error("Truncated input: requested {requested} bits, {remaining} remaining")]
    Truncated {
        /// Number of bits requested
        requested: usize,
        /// Number of bits left before the bound
        remaining: usize,
    },

    /// Value does not fit the declared field width
    #[error("Value {value:#x} does not fit in {width} bits")]
    Overflow {
        /// Offending value
        value: u64,
        /// Declared width
        width: usize,
    },

    /// Field width outside 0..=64
    #[error("Invalid field width: {0} bits")]
    InvalidWidth(usize),
}

/// Result type for bit cursor operations.
pub type BitResult<T> = Result<T, BitError>;

/// A bounded, read-only bit cursor.
///
/// The reader keeps its position in a `Cell`, so decoders can share a
/// `&BitReader` while still consuming bits. Sub-readers created with
/// [`BitReader::sub_reader`] are restricted to a window of the parent and
/// are used to enforce declared IE lengths.
///
/// # Example
/// ```
/// use pscore_common::BitReader;
///
/// let data = [0x08, 0x01];
/// let reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bits(4).unwrap(), 0x0);
/// assert_eq!(reader.read_bits(4).unwrap(), 0x8);
/// assert_eq!(reader.read_bits(8).unwrap(), 0x01);
/// assert!(reader.read_bits(1).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    start: usize,
    end: usize,
    index: Cell<usize>, // absolute bit index into `data`
}

impl<'a> BitReader<'a> {
    /// Creates a reader over the whole slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            start: 0,
            end: data.len() * 8,
            index: Cell::new(0),
        }
    }

    /// Returns the number of bits consumed since the start of this reader's window.
    #[inline]
    pub fn position(&self) -> usize {
        self.index.get() - self.start
    }

    /// Returns the number of bits left before the bound.
    #[inline]
    pub fn remaining_bits(&self) -> usize {
        self.end - self.index.get()
    }

    /// Returns true when every bit of the window has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0
    }

    /// Returns the number of bits to skip to reach the next octet boundary
    /// of the underlying buffer.
    #[inline]
    pub fn bits_to_octet_boundary(&self) -> usize {
        (8 - self.index.get() % 8) % 8
    }

    fn ensure(&self, bits: usize) -> BitResult<()> {
        let remaining = self.remaining_bits();
        if bits > remaining {
            return Err(BitError::Truncated {
                requested: bits,
                remaining,
            });
        }
        Ok(())
    }

    fn extract(&self, mut pos: usize, len: usize) -> u64 {
        let mut value = 0u64;
        let mut left = len;
        while left > 0 {
            let byte = self.data[pos / 8];
            let avail = 8 - pos % 8;
            let take = avail.min(left);
            let chunk = (byte >> (avail - take)) & (((1u16 << take) - 1) as u8);
            value = (value << take) | u64::from(chunk);
            pos += take;
            left -= take;
        }
        value
    }

    /// Reads a single bit.
    #[inline]
    pub fn read_bit(&self) -> BitResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads `len` bits as an unsigned integer.
    ///
    /// # Arguments
    /// * `len` - Number of bits to read (0-64)
    ///
    /// # Errors
    /// `Truncated` if fewer than `len` bits remain, `InvalidWidth` if `len > 64`.
    pub fn read_bits(&self, len: usize) -> BitResult<u64> {
        if len > 64 {
            return Err(BitError::InvalidWidth(len));
        }
        self.ensure(len)?;
        let value = self.extract(self.index.get(), len);
        self.index.set(self.index.get() + len);
        Ok(value)
    }

    /// Reads `len` bits located `offset` bits ahead without consuming anything.
    pub fn peek_bits(&self, offset: usize, len: usize) -> BitResult<u64> {
        if len > 64 {
            return Err(BitError::InvalidWidth(len));
        }
        self.ensure(offset + len)?;
        Ok(self.extract(self.index.get() + offset, len))
    }

    /// Reads `n` octets. The read does not need to be octet aligned.
    pub fn read_bytes(&self, n: usize) -> BitResult<Vec<u8>> {
        self.ensure(n * 8)?;
        let pos = self.index.get();
        if pos % 8 == 0 {
            let first = pos / 8;
            self.index.set(pos + n * 8);
            return Ok(self.data[first..first + n].to_vec());
        }
        (0..n).map(|_| self.read_bits(8).map(|b| b as u8)).collect()
    }

    /// Reads `bits` bits into a left-aligned byte vector.
    ///
    /// The unused low-order bits of the last octet are zero.
    pub fn read_bits_as_bytes(&self, bits: usize) -> BitResult<Vec<u8>> {
        self.ensure(bits)?;
        let mut out = self.read_bytes(bits / 8)?;
        let tail = bits % 8;
        if tail > 0 {
            let last = self.read_bits(tail)? as u8;
            out.push(last << (8 - tail));
        }
        Ok(out)
    }

    /// Skips `bits` bits.
    pub fn skip(&self, bits: usize) -> BitResult<()> {
        self.ensure(bits)?;
        self.index.set(self.index.get() + bits);
        Ok(())
    }

    /// Splits off a reader restricted to the next `bits` bits and advances
    /// this reader past them.
    pub fn sub_reader(&self, bits: usize) -> BitResult<BitReader<'a>> {
        self.ensure(bits)?;
        let pos = self.index.get();
        self.index.set(pos + bits);
        Ok(BitReader {
            data: self.data,
            start: pos,
            end: pos + bits,
            index: Cell::new(pos),
        })
    }
}

/// An append-only bit writer.
///
/// # Example
/// ```
/// use pscore_common::BitWriter;
///
/// let mut writer = BitWriter::new();
/// writer.write_bits(0x0, 4).unwrap();
/// writer.write_bits(0x8, 4).unwrap();
/// writer.write_bits(0x02, 8).unwrap();
/// assert_eq!(writer.as_bytes(), &[0x08, 0x02]);
///
/// // Width violations are reported, not truncated
/// assert!(writer.write_bits(0x10, 4).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buf: BytesMut,
    bit_len: usize,
}

impl BitWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `octets` octets.
    pub fn with_capacity(octets: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(octets),
            bit_len: 0,
        }
    }

    /// Number of bits written so far.
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Number of octets touched so far (partially written octets count).
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bit_len.div_ceil(8)
    }

    /// Returns true when the write position sits on an octet boundary.
    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.bit_len % 8 == 0
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        // Width 1 cannot overflow
        let _ = self.write_bits(u64::from(bit), 1);
    }

    /// Writes the low `width` bits of `value`, MSB first.
    ///
    /// # Errors
    /// `Overflow` if `value` needs more than `width` bits, `InvalidWidth` if
    /// `width > 64`.
    pub fn write_bits(&mut self, value: u64, width: usize) -> BitResult<()> {
        if width > 64 {
            return Err(BitError::InvalidWidth(width));
        }
        if width < 64 && value >> width != 0 {
            return Err(BitError::Overflow { value, width });
        }
        let mut left = width;
        while left > 0 {
            let bit_off = self.bit_len % 8;
            if bit_off == 0 {
                self.buf.put_u8(0);
            }
            let free = 8 - bit_off;
            let take = free.min(left);
            let chunk = ((value >> (left - take)) & ((1u64 << take) - 1)) as u8;
            let last = self.buf.len() - 1;
            self.buf[last] |= chunk << (free - take);
            self.bit_len += take;
            left -= take;
        }
        Ok(())
    }

    /// Writes whole octets.
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.is_aligned() {
            self.buf.put_slice(data);
            self.bit_len += data.len() * 8;
        } else {
            for &b in data {
                let _ = self.write_bits(u64::from(b), 8);
            }
        }
    }

    /// Writes the first `bits` bits of a left-aligned byte slice.
    pub fn write_bits_from_bytes(&mut self, data: &[u8], bits: usize) -> BitResult<()> {
        if data.len() * 8 < bits {
            return Err(BitError::Truncated {
                requested: bits,
                remaining: data.len() * 8,
            });
        }
        self.write_bytes(&data[..bits / 8]);
        let tail = bits % 8;
        if tail > 0 {
            let last = data[bits / 8] >> (8 - tail);
            self.write_bits(u64::from(last), tail)?;
        }
        Ok(())
    }

    /// Appends everything written to `other`.
    pub fn append(&mut self, other: &BitWriter) {
        // The source holds at least `bit_len` bits by construction
        let _ = self.write_bits_from_bytes(&other.buf, other.bit_len);
    }

    /// Pads with zero bits up to the next octet boundary and returns the
    /// number of padding bits written.
    pub fn pad_to_octet(&mut self) -> usize {
        let pad = (8 - self.bit_len % 8) % 8;
        self.bit_len += pad;
        pad
    }

    /// Returns the written octets; a partial last octet is zero-padded.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns the encoded octets.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}
