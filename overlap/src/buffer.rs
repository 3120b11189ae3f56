use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

/// An ordered sequence of byte slices
///
/// Reads append the received bytes as new slices; writes drain the slices in order. Slices are
/// reference counted, so handing part of a buffer to the socket never copies it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceBuffer {
    slices: VecDeque<Bytes>,
    len: usize,
}

impl SliceBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slices making up the buffer
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    /// Remove all bytes
    pub fn clear(&mut self) {
        self.slices.clear();
        self.len = 0;
    }

    /// Append `slice` without copying it
    pub fn append(&mut self, slice: impl Into<Bytes>) {
        let slice = slice.into();
        if slice.is_empty() {
            return;
        }
        self.len += slice.len();
        self.slices.push_back(slice);
    }

    /// Append a copy of `data`
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.append(Bytes::copy_from_slice(data));
    }

    /// Iterate over the slices in order
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> + '_ {
        self.slices.iter()
    }

    /// Copy the contents into a contiguous vector
    pub fn copy_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for slice in &self.slices {
            out.extend_from_slice(slice);
        }
        out
    }

    /// The contents as a single contiguous slice
    ///
    /// Only copies when the buffer is made of more than one slice.
    pub fn to_bytes(&self) -> Bytes {
        match self.slices.len() {
            0 => Bytes::new(),
            1 => self.slices[0].clone(),
            _ => {
                let mut out = BytesMut::with_capacity(self.len);
                for slice in &self.slices {
                    out.extend_from_slice(slice);
                }
                out.freeze()
            }
        }
    }

    /// Up to `max_slices` slices covering the bytes after `offset`, limited to `max_bytes` bytes
    pub(crate) fn slices_from(
        &self,
        offset: usize,
        max_slices: usize,
        max_bytes: usize,
    ) -> Vec<Bytes> {
        let mut out = Vec::new();
        let mut skip = offset;
        let mut budget = max_bytes;
        for slice in &self.slices {
            if out.len() == max_slices || budget == 0 {
                break;
            }
            if skip >= slice.len() {
                skip -= slice.len();
                continue;
            }
            let take = (slice.len() - skip).min(budget);
            out.push(slice.slice(skip..skip + take));
            budget -= take;
            skip = 0;
        }
        out
    }
}

impl From<Bytes> for SliceBuffer {
    fn from(slice: Bytes) -> Self {
        let mut buf = Self::new();
        buf.append(slice);
        buf
    }
}

impl From<Vec<u8>> for SliceBuffer {
    fn from(data: Vec<u8>) -> Self {
        Bytes::from(data).into()
    }
}

impl From<&'static [u8]> for SliceBuffer {
    fn from(data: &'static [u8]) -> Self {
        Bytes::from_static(data).into()
    }
}

impl From<&'static str> for SliceBuffer {
    fn from(data: &'static str) -> Self {
        Bytes::from_static(data.as_bytes()).into()
    }
}
