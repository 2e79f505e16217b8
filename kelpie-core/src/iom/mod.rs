//! Pluggable persistence backends ("I/O modules").
//!
//! A backend is anything that can durably hold objects a [`crate::table::LocalKv`] has
//! evicted or never held in memory. The trait is deliberately narrow and synchronous —
//! async backends (the remote-tabular one) bridge in their own executor underneath.

pub mod embedded_kv_backend;
pub mod file_backend;
pub mod registry;
pub mod remote_backend;

use tracing::warn;

use crate::bucket::Bucket;
use crate::cell::ObjectInfo;
use crate::data_object::DataObject;
use crate::error::{KelpieError, Result};
use crate::key::Key;

/// Keys and their `user_size()`s returned by a [`IomBackend::list`] call, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct ObjectCapacities {
    pub keys: Vec<Key>,
    pub capacities: Vec<u64>,
}

/// A durable store for objects a `LocalKv` doesn't want to (or can't) hold in memory.
///
/// Implementations differ in where they put the bytes (one file per object, an embedded
/// ordered KV store, a remote table) but share this surface so `LocalKv`/`Pool` can treat
/// them interchangeably.
pub trait IomBackend: Send + Sync {
    fn name(&self) -> &str;

    fn write_object(&self, bucket: Bucket, key: &Key, object: &DataObject) -> Result<()>;

    fn read_object(&self, bucket: Bucket, key: &Key) -> Result<DataObject>;

    fn get_info(&self, bucket: Bucket, key: &Key) -> Result<ObjectInfo>;

    fn drop_object(&self, bucket: Bucket, key: &Key) -> Result<()>;

    /// Lists keys matching `key`'s row/column pattern. The default rejects listing
    /// outright — a backend must opt in by overriding this, which the embedded-KV and
    /// per-file backends below both do.
    fn list(&self, bucket: Bucket, key: &Key) -> Result<ObjectCapacities> {
        warn!(backend = self.name(), bucket = %bucket, key = %key, "list not supported by this backend");
        Err(KelpieError::not_found())
    }
}
