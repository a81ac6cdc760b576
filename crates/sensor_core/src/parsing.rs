//! Little-endian payload readers
//!
//! Sample payloads are walked field by field with a [`PayloadReader`]; reply
//! payloads are converted whole with [`read_value`] / [`read_vec`].

use bytemuck::Pod;
use contracts::{ZenError, ZenResult};

/// Exactly one `T`.
pub fn read_value<T: Pod>(payload: &[u8]) -> ZenResult<T> {
    if payload.len() != std::mem::size_of::<T>() {
        return Err(ZenError::IoMsgCorrupt);
    }
    Ok(bytemuck::pod_read_unaligned(payload))
}

/// A whole number of `T`s.
pub fn read_vec<T: Pod>(payload: &[u8]) -> ZenResult<Vec<T>> {
    let size = std::mem::size_of::<T>();
    if size == 0 || payload.len() % size != 0 {
        return Err(ZenError::IoMsgCorrupt);
    }
    Ok(payload.chunks_exact(size).map(bytemuck::pod_read_unaligned).collect())
}

/// Sequential reader; running past the end is `IoMsgCorrupt`.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    payload: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { payload, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }

    fn take(&mut self, len: usize) -> ZenResult<&'a [u8]> {
        let end = self.offset.checked_add(len).ok_or(ZenError::IoMsgCorrupt)?;
        let bytes = self.payload.get(self.offset..end).ok_or(ZenError::IoMsgCorrupt)?;
        self.offset = end;
        Ok(bytes)
    }

    pub fn read<T: Pod>(&mut self) -> ZenResult<T> {
        let bytes = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn u8(&mut self) -> ZenResult<u8> {
        self.read()
    }

    pub fn u16(&mut self) -> ZenResult<u16> {
        self.read::<[u8; 2]>().map(u16::from_le_bytes)
    }

    pub fn i16(&mut self) -> ZenResult<i16> {
        self.read::<[u8; 2]>().map(i16::from_le_bytes)
    }

    pub fn u32(&mut self) -> ZenResult<u32> {
        self.read::<[u8; 4]>().map(u32::from_le_bytes)
    }

    pub fn i32(&mut self) -> ZenResult<i32> {
        self.read::<[u8; 4]>().map(i32::from_le_bytes)
    }

    pub fn f32(&mut self) -> ZenResult<f32> {
        self.read::<[u8; 4]>().map(f32::from_le_bytes)
    }

    /// `N` floats, each either a full IEEE value or an `i16` over `divisor`.
    pub fn scaled<const N: usize>(&mut self, low_precision: bool, divisor: f32) -> ZenResult<[f32; N]> {
        let mut out = [0.0; N];
        for value in &mut out {
            *value = if low_precision {
                f32::from(self.i16()?) / divisor
            } else {
                self.f32()?
            };
        }
        Ok(out)
    }

    pub fn floats<const N: usize>(&mut self) -> ZenResult<[f32; N]> {
        self.scaled(false, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_value_checks_size() {
        assert_eq!(read_value::<u32>(&[1, 0, 0, 0]), Ok(1));
        assert_eq!(read_value::<u32>(&[1, 0]), Err(ZenError::IoMsgCorrupt));
    }

    #[test]
    fn test_read_vec_unaligned() {
        let mut bytes = vec![0u8];
        bytes.extend(1.5f32.to_le_bytes());
        bytes.extend(2.5f32.to_le_bytes());
        assert_eq!(read_vec::<f32>(&bytes[1..]), Ok(vec![1.5, 2.5]));
        assert_eq!(read_vec::<f32>(&bytes), Err(ZenError::IoMsgCorrupt));
    }

    #[test]
    fn test_reader_walks_fields() {
        let mut bytes = Vec::new();
        bytes.extend(7u32.to_le_bytes());
        bytes.extend((-1500i16).to_le_bytes());
        bytes.extend(250i16.to_le_bytes());
        bytes.push(3);

        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(reader.u32(), Ok(7));
        assert_eq!(reader.scaled::<2>(true, 1000.0), Ok([-1.5, 0.25]));
        assert_eq!(reader.u8(), Ok(3));
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.u8(), Err(ZenError::IoMsgCorrupt));
    }
}
