//! The policy front-end: routes `Publish`/`Need`/`Info`/`Drop`/`List`/`Compute` across a
//! [`LocalKv`], an optional [`IomBackend`], and an optional [`Transport`].

use std::sync::Arc;

use bitflags::bitflags;

use crate::bucket::Bucket;
use crate::cell::{Callback, MailboxId, ObjectInfo};
use crate::compute::ComputeRegistry;
use crate::data_object::DataObject;
use crate::error::{KelpieError, Outcome, Result};
use crate::iom::{IomBackend, ObjectCapacities};
use crate::key::Key;
use crate::table::{LocalKv, Overwrite};

bitflags! {
    /// Which collaborators a `Pool` consults, and in which direction, for each op.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PoolBehavior: u16 {
        const WRITE_TO_LOCAL = 1 << 0;
        const WRITE_TO_REMOTE = 1 << 1;
        const WRITE_TO_IOM = 1 << 2;
        const READ_TO_LOCAL = 1 << 3;
        const READ_TO_REMOTE = 1 << 4;
        const ENABLE_OVERWRITES = 1 << 5;
    }
}

impl PoolBehavior {
    /// In-memory only, single node, no overwrites: the safe default.
    pub const DEFAULT_BASE_CLASS: Self = Self::WRITE_TO_LOCAL.union(Self::READ_TO_LOCAL);

    /// Same as the base class; named separately because it's the preset most pools in
    /// practice are configured with.
    pub const DEFAULT_LOCAL: Self = Self::DEFAULT_BASE_CLASS;

    /// Local memory backed by a persistence tier.
    pub const DEFAULT_LOCAL_IOM: Self = Self::DEFAULT_BASE_CLASS.union(Self::WRITE_TO_IOM);

    /// Writes fan out to a remote copy as well as local memory.
    pub const DEFAULT_REMOTE: Self = Self::DEFAULT_BASE_CLASS
        .union(Self::WRITE_TO_REMOTE)
        .union(Self::READ_TO_REMOTE);
}

/// Front-end combining a local table with its backing collaborators.
pub struct Pool {
    local: Arc<LocalKv>,
    iom: Option<Arc<dyn IomBackend>>,
    behavior: PoolBehavior,
    computes: ComputeRegistry,
}

impl Pool {
    pub fn new(local: Arc<LocalKv>, behavior: PoolBehavior) -> Self {
        Self {
            local,
            iom: None,
            behavior,
            computes: ComputeRegistry::new(),
        }
    }

    pub fn with_iom(mut self, iom: Arc<dyn IomBackend>) -> Self {
        self.iom = Some(iom);
        self
    }

    pub fn with_computes(mut self, computes: ComputeRegistry) -> Self {
        self.computes = computes;
        self
    }

    pub fn behavior(&self) -> PoolBehavior {
        self.behavior
    }

    /// Stores `object` at `(bucket, key)`. Fails with `Exists` if the cell is already
    /// populated and `ENABLE_OVERWRITES` isn't set.
    pub fn publish(&self, bucket: Bucket, key: &Key, object: DataObject) -> Result<Outcome<ObjectInfo>> {
        if !self.behavior.contains(PoolBehavior::WRITE_TO_LOCAL) {
            return Err(KelpieError::invalid_arg("pool is not configured to write locally"));
        }
        let overwrite = if self.behavior.contains(PoolBehavior::ENABLE_OVERWRITES) {
            Overwrite::Allow
        } else {
            Overwrite::Disallow
        };
        let write_to_iom = self.behavior.contains(PoolBehavior::WRITE_TO_IOM);
        self.local.put(bucket, key, object, overwrite, self.iom.as_deref(), write_to_iom)
    }

    /// Requests `key`, consulting the IOM on a local miss and parking `mailbox` if it's
    /// not found anywhere.
    pub fn need(&self, bucket: Bucket, key: &Key, mailbox: MailboxId) -> Result<DataObject> {
        let iom = self.behavior.contains(PoolBehavior::READ_TO_REMOTE).then(|| self.iom.as_deref()).flatten();
        let cache_from_iom = self.behavior.contains(PoolBehavior::READ_TO_LOCAL);
        self.local.get_for_op(bucket, key, mailbox, iom, cache_from_iom)
    }

    /// Registers `callback` to fire when `key` becomes locally available.
    pub fn want(&self, bucket: Bucket, key: &Key, caller_will_fetch: bool, callback: Callback) -> Result<()> {
        self.local.want_local(bucket, key, caller_will_fetch, callback)
    }

    pub fn info(&self, bucket: Bucket, key: &Key) -> Result<ObjectInfo> {
        let iom = self.iom.as_deref();
        self.local.info(bucket, key, iom)
    }

    pub fn drop(&self, bucket: Bucket, key: &Key) -> Result<()> {
        self.local.drop_matching(bucket, key)
    }

    pub fn list(&self, bucket: Bucket, key: &Key) -> Result<ObjectCapacities> {
        self.local.list(bucket, key, self.iom.as_deref())
    }

    /// Gathers every in-memory object matching `key` and reduces it with the named
    /// computation.
    pub fn compute(&self, bucket: Bucket, key: &Key, compute_name: &str) -> Result<DataObject> {
        let objects = self.local.get_available(bucket, key)?;
        self.computes.run(compute_name, &objects)
    }
}
