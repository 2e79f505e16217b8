//! The reference-counted opaque buffer that flows through the store.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{KelpieError, Result};

const HEADER_MAGIC: u32 = 0x4b45_4c50; // "KELP"
const HEADER_LEN: u64 = 16;

/// Whether a [`DataObject`]'s backing memory has been registered with the transport
/// layer already (`Eager`) or will be registered lazily on first use (`Lazy`). The core
/// treats this purely as a hint; registration itself is a `Transport` concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    Eager,
    Lazy,
}

#[derive(Debug)]
struct Inner {
    type_id: u16,
    meta: Bytes,
    data: Bytes,
    mode: MemoryMode,
}

/// A reference-counted opaque buffer of `(meta, data)` with a small type tag.
///
/// Cloning a `DataObject` is cheap: it shares the underlying allocation via `Arc`, so the
/// core can hand the same object to many waiters without copying `data`.
#[derive(Debug, Clone)]
pub struct DataObject {
    inner: Arc<Inner>,
}

impl DataObject {
    pub fn new(type_id: u16, meta: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Self::with_mode(type_id, meta, data, MemoryMode::Lazy)
    }

    pub fn with_mode(
        type_id: u16,
        meta: impl Into<Bytes>,
        data: impl Into<Bytes>,
        mode: MemoryMode,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                type_id,
                meta: meta.into(),
                data: data.into(),
                mode,
            }),
        }
    }

    pub fn type_id(&self) -> u16 {
        self.inner.type_id
    }

    pub fn meta(&self) -> &[u8] {
        &self.inner.meta
    }

    pub fn data(&self) -> &[u8] {
        &self.inner.data
    }

    pub fn mode(&self) -> MemoryMode {
        self.inner.mode
    }

    pub fn meta_size(&self) -> u64 {
        self.inner.meta.len() as u64
    }

    pub fn data_size(&self) -> u64 {
        self.inner.data.len() as u64
    }

    pub fn user_size(&self) -> u64 {
        self.meta_size() + self.data_size()
    }

    pub fn wire_size(&self) -> u64 {
        HEADER_LEN + self.user_size()
    }

    /// Number of outstanding handles sharing this object's allocation.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Serializes header || meta || data verbatim to `path`, creating or truncating it.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut f = File::create(path)?;
        f.write_all(&self.encode_header())?;
        f.write_all(&self.inner.meta)?;
        f.write_all(&self.inner.data)?;
        Ok(())
    }

    /// Reads back an object written by [`DataObject::write_to_file`].
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut f = File::open(path)?;
        let mut header = [0u8; HEADER_LEN as usize];
        f.read_exact(&mut header)?;

        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if magic != HEADER_MAGIC {
            return Err(KelpieError::io("corrupt data object header"));
        }
        let type_id = u16::from_le_bytes(header[4..6].try_into().unwrap());
        let meta_len = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
        let data_len = u32::from_le_bytes(header[12..16].try_into().unwrap()) as usize;

        let mut meta = vec![0u8; meta_len];
        f.read_exact(&mut meta)?;
        let mut data = vec![0u8; data_len];
        f.read_exact(&mut data)?;

        Ok(Self::new(type_id, meta, data))
    }

    fn encode_header(&self) -> [u8; HEADER_LEN as usize] {
        let mut header = [0u8; HEADER_LEN as usize];
        header[0..4].copy_from_slice(&HEADER_MAGIC.to_le_bytes());
        header[4..6].copy_from_slice(&self.inner.type_id.to_le_bytes());
        // bytes 6..8 reserved
        header[8..12].copy_from_slice(&(self.inner.meta.len() as u32).to_le_bytes());
        header[12..16].copy_from_slice(&(self.inner.data.len() as u32).to_le_bytes());
        header
    }
}

impl PartialEq for DataObject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.type_id == other.inner.type_id
            && self.inner.meta == other.inner.meta
            && self.inner.data == other.inner.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_additive() {
        let obj = DataObject::new(7, vec![1, 2, 3], vec![0u8; 100]);
        assert_eq!(obj.meta_size(), 3);
        assert_eq!(obj.data_size(), 100);
        assert_eq!(obj.user_size(), 103);
        assert_eq!(obj.wire_size(), 103 + HEADER_LEN);
    }

    #[test]
    fn clone_shares_allocation() {
        let obj = DataObject::new(1, vec![], vec![9; 10]);
        let clone = obj.clone();
        assert_eq!(obj.ref_count(), 2);
        drop(clone);
        assert_eq!(obj.ref_count(), 1);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir::TempDir::new("kelpie-do-test").unwrap();
        let path = dir.path().join("obj.kelp");

        let obj = DataObject::new(42, b"meta-bytes".to_vec(), b"data-bytes-longer".to_vec());
        obj.write_to_file(&path).unwrap();

        let read_back = DataObject::read_from_file(&path).unwrap();
        assert_eq!(obj, read_back);
        assert_eq!(read_back.type_id(), 42);
    }
}
