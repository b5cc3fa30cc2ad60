//! Compact binary codec for fitted models and sample tables.
//!
//! The format carries no field names, tags or framing: a value is the
//! concatenation of its fields in a fixed order, so the decoder must read in
//! exactly the order the encoder wrote. All multi-byte values are
//! little-endian regardless of host byte order:
//!
//! - `bool`: one byte, `0` or `1`
//! - `u32`: 4 bytes
//! - `u64`, `usize`: 8 bytes (`usize` is always written as `u64`)
//! - `f64`: the IEEE-754 bit pattern as 8 bytes
//! - sequences: element count as `u64`, then each element
//! - matrices: row count and column count as `u64`, then entries row-major

use ndarray::Array2;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Corrupt stream at byte {offset}: {reason}")]
    CorruptStream { offset: usize, reason: String },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Append-only byte sink.
#[derive(Debug, Default)]
pub struct Serializer {
    stream: Vec<u8>,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bool(&mut self, value: bool) {
        self.stream.push(u8::from(value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.stream.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.stream.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.stream.extend_from_slice(&value.to_bits().to_le_bytes());
    }

    pub fn write_len(&mut self, len: usize) {
        self.write_u64(len as u64);
    }

    pub fn len(&self) -> usize {
        self.stream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.stream
    }
}

/// Read cursor over a borrowed byte buffer.
#[derive(Debug)]
pub struct Deserializer<'a> {
    stream: &'a [u8],
    read: usize,
}

impl<'a> Deserializer<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        Self { stream, read: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.stream.len() - self.read
    }

    pub fn position(&self) -> usize {
        self.read
    }

    fn corrupt(&self, reason: impl Into<String>) -> CodecError {
        CodecError::CorruptStream {
            offset: self.read,
            reason: reason.into(),
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        if self.remaining() < N {
            return Err(self.corrupt(format!(
                "need {N} bytes but only {} remain",
                self.remaining()
            )));
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.stream[self.read..self.read + N]);
        self.read += N;
        Ok(bytes)
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.take::<1>()? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => {
                self.read -= 1;
                Err(self.corrupt(format!("invalid boolean byte {other:#04x}")))
            }
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take::<8>()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(u64::from_le_bytes(self.take::<8>()?)))
    }

    pub fn read_usize(&mut self) -> Result<usize, CodecError> {
        let value = self.read_u64()?;
        usize::try_from(value).map_err(|_| self.corrupt(format!("count {value} overflows usize")))
    }

    /// Reads a sequence length; every element occupies at least one byte, so a
    /// length beyond the remaining buffer cannot be valid.
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_usize()?;
        if len > self.remaining() {
            return Err(self.corrupt(format!(
                "sequence length {len} exceeds the {} remaining bytes",
                self.remaining()
            )));
        }
        Ok(len)
    }

    /// Fails unless the whole buffer has been consumed.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.remaining() != 0 {
            return Err(self.corrupt(format!("{} trailing bytes", self.remaining())));
        }
        Ok(())
    }
}

pub trait Encode {
    fn encode(&self, out: &mut Serializer);
}

pub trait Decode: Sized {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError>;
}

impl Encode for bool {
    fn encode(&self, out: &mut Serializer) {
        out.write_bool(*self);
    }
}

impl Decode for bool {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        input.read_bool()
    }
}

impl Encode for u32 {
    fn encode(&self, out: &mut Serializer) {
        out.write_u32(*self);
    }
}

impl Decode for u32 {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        input.read_u32()
    }
}

impl Encode for u64 {
    fn encode(&self, out: &mut Serializer) {
        out.write_u64(*self);
    }
}

impl Decode for u64 {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        input.read_u64()
    }
}

impl Encode for usize {
    fn encode(&self, out: &mut Serializer) {
        out.write_u64(*self as u64);
    }
}

impl Decode for usize {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        input.read_usize()
    }
}

impl Encode for f64 {
    fn encode(&self, out: &mut Serializer) {
        out.write_f64(*self);
    }
}

impl Decode for f64 {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        input.read_f64()
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, out: &mut Serializer) {
        out.write_len(self.len());
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, out: &mut Serializer) {
        self.as_slice().encode(out);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let len = input.read_len()?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::decode(input)?);
        }
        Ok(items)
    }
}

impl Encode for Array2<f64> {
    fn encode(&self, out: &mut Serializer) {
        out.write_len(self.nrows());
        out.write_len(self.ncols());
        for value in self.iter() {
            out.write_f64(*value);
        }
    }
}

impl Decode for Array2<f64> {
    fn decode(input: &mut Deserializer<'_>) -> Result<Self, CodecError> {
        let rows = input.read_usize()?;
        let cols = input.read_usize()?;
        let count = rows.checked_mul(cols).filter(|&n| {
            n.checked_mul(8)
                .is_some_and(|bytes| bytes <= input.remaining())
        });
        let Some(count) = count else {
            return Err(input.corrupt(format!(
                "matrix of shape {rows}x{cols} does not fit in the remaining {} bytes",
                input.remaining()
            )));
        };
        let mut data = Vec::with_capacity(count);
        for _ in 0..count {
            data.push(input.read_f64()?);
        }
        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| input.corrupt(format!("matrix shape rejected: {e}")))
    }
}

pub fn to_bytes<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut out = Serializer::new();
    value.encode(&mut out);
    out.into_bytes()
}

/// Decodes a value that must span the entire buffer.
pub fn from_bytes<T: Decode>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut input = Deserializer::new(bytes);
    let value = T::decode(&mut input)?;
    input.finish()?;
    Ok(value)
}

pub fn save_to_file<T: Encode + ?Sized>(value: &T, path: &Path) -> Result<(), CodecError> {
    let bytes = to_bytes(value);
    std::fs::write(path, &bytes).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Reads the whole file into memory, then decodes it.
pub fn load_from_file<T: Decode>(path: &Path) -> Result<T, CodecError> {
    let bytes = std::fs::read(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_bytes(&bytes)
}
