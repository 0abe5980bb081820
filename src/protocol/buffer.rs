//! Endian-aware cursor primitives for reading and writing wire buffers.
//!
//! Unlike PulseAudio's self-tagging tagstruct format, PVAccess fields are
//! positional: there is no leading type-tag byte per field, only the values
//! themselves in a fixed order determined by the message or introspected
//! type. What is kept from the tagstruct idiom is the typed `read_*`/`write_*`
//! pair and the `DataRead`/`DataWrite` traits that let a type serialize itself
//! against any reader/writer.

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use super::error::ProtocolError;

/// The one-byte threshold below which a size is encoded directly. Values at
/// or above this switch to the medium (5-byte) or large (14-byte) encoding.
pub const SHORT_SIZE_MAX: u8 = 254;

const MEDIUM_SIZE_MARKER: u8 = 0xFF;
const LARGE_SIZE_MARKER: u32 = 0x7FFF_FFFF;

/// A cursor over a borrowed byte slice, with endian-parameterized primitive
/// reads.
pub struct WireReader<'a> {
    buf: &'a [u8],
    index: usize,
    big_endian: bool,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over `buf`, interpreting multi-byte integers with the
    /// given endianness.
    pub fn new(buf: &'a [u8], big_endian: bool) -> Self {
        WireReader {
            buf,
            index: 0,
            big_endian,
        }
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.index
    }

    /// True if there is at least one more byte to read.
    pub fn has_data_left(&self) -> bool {
        self.remaining() > 0
    }

    fn require(&self, n: usize) -> Result<(), ProtocolError> {
        if self.remaining() < n {
            Err(ProtocolError::ShortBuffer)
        } else {
            Ok(())
        }
    }

    /// Reads `n` raw bytes.
    pub fn raw(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        self.require(n)?;
        let slice = &self.buf[self.index..self.index + n];
        self.index += n;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.raw(1)?[0])
    }

    /// Reads a `u16` using the reader's configured endianness.
    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.raw(2)?;
        Ok(if self.big_endian {
            BigEndian::read_u16(bytes)
        } else {
            LittleEndian::read_u16(bytes)
        })
    }

    /// Reads a `u32` using the reader's configured endianness.
    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.raw(4)?;
        Ok(if self.big_endian {
            BigEndian::read_u32(bytes)
        } else {
            LittleEndian::read_u32(bytes)
        })
    }

    /// Reads a `u64` using the reader's configured endianness.
    pub fn u64(&mut self) -> Result<u64, ProtocolError> {
        let bytes = self.raw(8)?;
        Ok(if self.big_endian {
            BigEndian::read_u64(bytes)
        } else {
            LittleEndian::read_u64(bytes)
        })
    }

    /// Reads an `i32` using the reader's configured endianness.
    pub fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.u32()? as i32)
    }

    /// Reads an `i64` using the reader's configured endianness.
    pub fn i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(self.u64()? as i64)
    }

    /// Reads the "compressed size" varint: a 1-byte value below
    /// `SHORT_SIZE_MAX`, or a marker byte introducing a 4-byte medium size,
    /// or (if that's itself a marker) an 8-byte large size.
    pub fn size(&mut self) -> Result<u64, ProtocolError> {
        let first = self.u8()?;
        if first < SHORT_SIZE_MAX {
            return Ok(first as u64);
        }

        if first != MEDIUM_SIZE_MARKER {
            // This encoder never emits 254 standalone, but a peer using a
            // 255 threshold may; accept it as a short size rather than error.
            return Ok(first as u64);
        }

        let medium = self.u32()?;
        if medium != LARGE_SIZE_MARKER {
            return Ok(medium as u64);
        }

        self.u64()
    }

    /// Reads a length-prefixed byte string.
    pub fn byte_string(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.size()? as usize;
        Ok(self.raw(len)?.to_vec())
    }

    /// Reads a length-prefixed UTF-8 string, rejecting invalid UTF-8.
    pub fn string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.byte_string()?;
        String::from_utf8(bytes).map_err(|_| ProtocolError::Invalid("non-utf8 string".into()))
    }

    /// Reads a 16-byte IPv6 address.
    pub fn ipv6(&mut self) -> Result<[u8; 16], ProtocolError> {
        let mut addr = [0u8; 16];
        addr.copy_from_slice(self.raw(16)?);
        Ok(addr)
    }

    /// Reads a length-prefixed array of `u32` values.
    pub fn u32_array(&mut self) -> Result<Vec<u32>, ProtocolError> {
        let len = self.size()? as usize;
        (0..len).map(|_| self.u32()).collect()
    }

    /// Reads a length-prefixed array of strings.
    pub fn string_array(&mut self) -> Result<Vec<String>, ProtocolError> {
        let len = self.size()? as usize;
        (0..len).map(|_| self.string()).collect()
    }

    /// Whether this reader decodes big-endian integers.
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }
}

/// A growable byte buffer with endian-parameterized primitive writes.
pub struct WireWriter {
    buf: Vec<u8>,
    big_endian: bool,
}

impl WireWriter {
    /// Creates an empty writer, encoding multi-byte integers with the given
    /// endianness.
    pub fn new(big_endian: bool) -> Self {
        WireWriter {
            buf: Vec::new(),
            big_endian,
        }
    }

    /// Consumes the writer, returning the accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Current length of the accumulated buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends a single byte.
    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Appends a `u16` using the writer's configured endianness.
    pub fn u16(&mut self, v: u16) {
        if self.big_endian {
            self.buf.write_u16::<BigEndian>(v).unwrap();
        } else {
            self.buf.write_u16::<LittleEndian>(v).unwrap();
        }
    }

    /// Appends a `u32` using the writer's configured endianness.
    pub fn u32(&mut self, v: u32) {
        if self.big_endian {
            self.buf.write_u32::<BigEndian>(v).unwrap();
        } else {
            self.buf.write_u32::<LittleEndian>(v).unwrap();
        }
    }

    /// Appends a `u64` using the writer's configured endianness.
    pub fn u64(&mut self, v: u64) {
        if self.big_endian {
            self.buf.write_u64::<BigEndian>(v).unwrap();
        } else {
            self.buf.write_u64::<LittleEndian>(v).unwrap();
        }
    }

    /// Appends an `i32` using the writer's configured endianness.
    pub fn i32(&mut self, v: i32) {
        self.u32(v as u32);
    }

    /// Appends an `i64` using the writer's configured endianness.
    pub fn i64(&mut self, v: i64) {
        self.u64(v as u64);
    }

    /// Appends the "compressed size" varint, choosing the shortest encoding
    /// that fits `size`.
    pub fn size(&mut self, size: u64) {
        if size < SHORT_SIZE_MAX as u64 {
            self.u8(size as u8);
        } else if size < LARGE_SIZE_MARKER as u64 {
            self.u8(MEDIUM_SIZE_MARKER);
            self.u32(size as u32);
        } else {
            self.u8(MEDIUM_SIZE_MARKER);
            self.u32(LARGE_SIZE_MARKER);
            self.u64(size);
        }
    }

    /// Appends a length-prefixed byte string.
    pub fn byte_string(&mut self, bytes: &[u8]) {
        self.size(bytes.len() as u64);
        self.raw(bytes);
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn string(&mut self, s: &str) {
        self.byte_string(s.as_bytes());
    }

    /// Appends a 16-byte IPv6 address.
    pub fn ipv6(&mut self, addr: &[u8; 16]) {
        self.raw(addr);
    }

    /// Appends a length-prefixed array of `u32` values.
    pub fn u32_array(&mut self, items: &[u32]) {
        self.size(items.len() as u64);
        for &item in items {
            self.u32(item);
        }
    }

    /// Appends a length-prefixed array of strings.
    pub fn string_array(&mut self, items: &[String]) {
        self.size(items.len() as u64);
        for item in items {
            self.string(item);
        }
    }

    /// Whether this writer encodes big-endian integers.
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }
}

/// Implemented by wire types that can decode themselves from a [`WireReader`].
pub trait DataRead: Sized {
    /// Decodes a value, advancing the reader past it.
    fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError>;
}

/// Implemented by wire types that can encode themselves into a [`WireWriter`].
pub trait DataWrite {
    /// Encodes this value, appending it to the writer.
    fn write(&self, writer: &mut WireWriter);
}

impl<T: DataWrite> DataWrite for &T {
    fn write(&self, writer: &mut WireWriter) {
        (*self).write(writer)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Encodes `value`, decodes it back, and asserts the round-trip is
    /// structurally equal.
    pub(crate) fn roundtrip<T>(value: &T, big_endian: bool)
    where
        T: DataRead + DataWrite + std::fmt::Debug + PartialEq,
    {
        let mut writer = WireWriter::new(big_endian);
        value.write(&mut writer);
        let bytes = writer.into_bytes();

        let mut reader = WireReader::new(&bytes, big_endian);
        let decoded = T::read(&mut reader).expect("decode failed");
        pretty_assertions::assert_eq!(value, &decoded);
        assert!(!reader.has_data_left(), "trailing bytes after decode");
    }
}
