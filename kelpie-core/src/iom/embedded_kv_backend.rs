//! Embedded ordered-KV persistence, backed by one `leveldb` database per bucket.
//!
//! Each object is split across two records: a `.info` record holding just the sizes (so
//! `get_info`/`list` don't have to pull the whole payload off disk) and the main record
//! holding the wire-encoded object itself. The upstream object store this is modeled on
//! never implemented `list` for this backend; this one does, since nothing about an
//! ordered KV store makes that harder than for the per-file backend.

use std::collections::HashMap;
use std::convert::TryInto;
use std::mem;
use std::path::PathBuf;

use leveldb::database::iterator::{Iterable, LevelDBIterator};
use leveldb::database::options::{Options, ReadOptions, WriteOptions};
use leveldb::database::Database;
use leveldb::kv::KV;
use parking_lot::Mutex;

use crate::bucket::Bucket;
use crate::cell::{Availability, ObjectInfo};
use crate::data_object::DataObject;
use crate::error::{KelpieError, Result};
use crate::iom::{IomBackend, ObjectCapacities};
use crate::key::Key;

const INFO_SUFFIX: &[u8] = b"\0info";

#[derive(Clone)]
struct LevelKey(Vec<u8>);

impl db_key::Key for LevelKey {
    fn from_u8(key: &[u8]) -> Self {
        Self(key.to_vec())
    }

    fn as_slice<T, F: Fn(&[u8]) -> T>(&self, f: F) -> T {
        f(&self.0)
    }
}

fn main_key(key: &Key) -> LevelKey {
    LevelKey(key.pup().into_bytes())
}

fn info_key(key: &Key) -> LevelKey {
    let mut bytes = key.pup().into_bytes();
    bytes.extend_from_slice(INFO_SUFFIX);
    LevelKey(bytes)
}

fn encode_info(object: &DataObject) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&(object.meta_size() as u32).to_be_bytes());
    out.extend_from_slice(&(object.data_size() as u32).to_be_bytes());
    out
}

fn decode_info(bytes: &[u8]) -> Option<u64> {
    if bytes.len() != 8 {
        return None;
    }
    let meta_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as u64;
    let data_len = u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as u64;
    Some(meta_len + data_len)
}

fn encode_object(object: &DataObject) -> Vec<u8> {
    let header_len = mem::size_of::<u16>() + 2 * mem::size_of::<u32>();
    let mut out = Vec::with_capacity(header_len + object.user_size() as usize);
    out.extend_from_slice(&object.type_id().to_be_bytes());
    out.extend_from_slice(&(object.meta_size() as u32).to_be_bytes());
    out.extend_from_slice(&(object.data_size() as u32).to_be_bytes());
    out.extend_from_slice(object.meta());
    out.extend_from_slice(object.data());
    out
}

fn decode_object(bytes: &[u8]) -> Option<DataObject> {
    if bytes.len() < 10 {
        return None;
    }
    let type_id = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
    let meta_len = u32::from_be_bytes(bytes[2..6].try_into().unwrap()) as usize;
    let data_len = u32::from_be_bytes(bytes[6..10].try_into().unwrap()) as usize;
    if bytes.len() != 10 + meta_len + data_len {
        return None;
    }
    let meta = bytes[10..10 + meta_len].to_vec();
    let data = bytes[10 + meta_len..10 + meta_len + data_len].to_vec();
    Some(DataObject::new(type_id, meta, data))
}

/// Lazily opens (and keeps open) one `leveldb` database per bucket under `root`.
pub struct EmbeddedKvBackend {
    name: String,
    root: PathBuf,
    open: Mutex<HashMap<Bucket, std::sync::Arc<Database<LevelKey>>>>,
}

impl EmbeddedKvBackend {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            open: Mutex::new(HashMap::new()),
        }
    }

    fn db_for(&self, bucket: Bucket) -> Result<std::sync::Arc<Database<LevelKey>>> {
        let mut open = self.open.lock();
        if let Some(db) = open.get(&bucket) {
            return Ok(std::sync::Arc::clone(db));
        }
        let path = self.root.join(bucket.hex());
        std::fs::create_dir_all(&path)?;
        let mut options = Options::new();
        options.create_if_missing = true;
        let db = Database::open(&path, options)
            .map_err(|e| KelpieError::io(format!("leveldb open failed for {}: {e}", path.display())))?;
        let db = std::sync::Arc::new(db);
        open.insert(bucket, std::sync::Arc::clone(&db));
        Ok(db)
    }
}

impl IomBackend for EmbeddedKvBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_object(&self, bucket: Bucket, key: &Key, object: &DataObject) -> Result<()> {
        let db = self.db_for(bucket)?;
        db.put(WriteOptions::new(), &main_key(key), &encode_object(object))
            .map_err(|e| KelpieError::io(e.to_string()))?;
        db.put(WriteOptions::new(), &info_key(key), &encode_info(object))
            .map_err(|e| KelpieError::io(e.to_string()))?;
        Ok(())
    }

    fn read_object(&self, bucket: Bucket, key: &Key) -> Result<DataObject> {
        let db = self.db_for(bucket)?;
        let bytes = db
            .get(ReadOptions::new(), &main_key(key))
            .map_err(|e| KelpieError::io(e.to_string()))?
            .ok_or_else(KelpieError::not_found)?;
        decode_object(&bytes).ok_or_else(|| KelpieError::io("corrupt embedded-kv record"))
    }

    fn get_info(&self, bucket: Bucket, key: &Key) -> Result<ObjectInfo> {
        let db = self.db_for(bucket)?;
        let bytes = db
            .get(ReadOptions::new(), &info_key(key))
            .map_err(|e| KelpieError::io(e.to_string()))?
            .ok_or_else(KelpieError::not_found)?;
        let user_bytes = decode_info(&bytes).ok_or_else(|| KelpieError::io("corrupt embedded-kv info record"))?;
        Ok(ObjectInfo {
            availability: Availability::InDisk,
            user_bytes,
            dependencies: 0,
            row_num_columns: 0,
            row_user_bytes: 0,
        })
    }

    fn drop_object(&self, bucket: Bucket, key: &Key) -> Result<()> {
        let db = self.db_for(bucket)?;
        if db
            .get(ReadOptions::new(), &main_key(key))
            .map_err(|e| KelpieError::io(e.to_string()))?
            .is_none()
        {
            return Err(KelpieError::not_found());
        }
        db.delete(WriteOptions::new(), &main_key(key))
            .map_err(|e| KelpieError::io(e.to_string()))?;
        db.delete(WriteOptions::new(), &info_key(key))
            .map_err(|e| KelpieError::io(e.to_string()))?;
        Ok(())
    }

    fn list(&self, bucket: Bucket, key: &Key) -> Result<ObjectCapacities> {
        let db = self.db_for(bucket)?;
        let mut out = ObjectCapacities::default();
        for (level_key, value) in db.iter(ReadOptions::new()) {
            if level_key.0.ends_with(INFO_SUFFIX) {
                continue;
            }
            let Ok(pup) = String::from_utf8(level_key.0.clone()) else {
                continue;
            };
            let Some(candidate) = Key::from_pup(&pup) else {
                continue;
            };
            if !key.matches(candidate.k1(), candidate.k2()) {
                continue;
            }
            let size = decode_object(&value).map(|o| o.user_size()).unwrap_or(0);
            out.keys.push(candidate);
            out.capacities.push(size);
        }

        if out.keys.is_empty() {
            Err(KelpieError::not_found())
        } else {
            Ok(out)
        }
    }
}
