//! The top-level 2-D store: a bucket-qualified row map with table-level locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use tracing::warn;

use crate::bucket::Bucket;
use crate::cell::{Availability, Callback, LocalKvCell, MailboxId, ObjectInfo};
use crate::data_object::DataObject;
use crate::error::{KelpieError, Kind, Outcome, Result};
use crate::iom::{IomBackend, ObjectCapacities};
use crate::key::Key;
use crate::row::{LocalKvRow, RowStats};
use crate::transport::Transport;

bitflags! {
    /// Flags threaded through the two workhorse primitives, `do_row_op`/`do_col_op`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpFlags: u8 {
        /// Create the row (and column, for column ops) if it's absent.
        const CREATE_IF_MISSING = 0b01;
        /// After the closure, if the cell transitioned into `InLocalMemory`, fire all
        /// pending waiters exactly once and clear the waiter lists.
        const TRIGGER_DEPENDENCIES = 0b10;
    }
}

/// Whether a `put` is allowed to overwrite a cell that's already `InLocalMemory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    Disallow,
    Allow,
}

/// Bucket-qualified row map with table-level and per-row locking.
///
/// Row names are `bucket.hex() || k1`, so buckets are disjoint in the map and a bucket's
/// rows form a contiguous lexicographic range, letting wildcard row operations use a
/// single lower-bound seek.
pub struct LocalKv {
    rows: RwLock<BTreeMap<String, Arc<LocalKvRow>>>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for LocalKv {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalKv {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            transport: None,
        }
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            transport: Some(transport),
        }
    }

    /// Drops every row, bypassing per-row teardown. Takes the table write lock.
    pub fn wipe_all(&self) {
        self.rows.write().clear();
    }

    fn full_row_name(bucket: Bucket, k1: &str) -> String {
        format!("{}{}", bucket.hex(), k1)
    }

    /// §4.5 locking discipline: read the table map; create the row under the write lock
    /// only if `CREATE_IF_MISSING` is set and it's still missing after re-checking.
    fn do_row_op(&self, bucket: Bucket, k1: &str, flags: OpFlags) -> Option<Arc<LocalKvRow>> {
        let full_name = Self::full_row_name(bucket, k1);
        {
            let rows = self.rows.read();
            if let Some(row) = rows.get(&full_name) {
                return Some(Arc::clone(row));
            }
        }
        if !flags.contains(OpFlags::CREATE_IF_MISSING) {
            return None;
        }
        let mut rows = self.rows.write();
        if let Some(row) = rows.get(&full_name) {
            return Some(Arc::clone(row));
        }
        let row = Arc::new(LocalKvRow::new(full_name.clone()));
        rows.insert(full_name, Arc::clone(&row));
        Some(row)
    }

    /// Runs `f` against the cell at `key`, handling row/column creation and dependency
    /// triggering per `flags`. Returns `None` if the row or column doesn't exist and
    /// `CREATE_IF_MISSING` wasn't set. On success, also returns the row's aggregate
    /// stats observed under the same write lock `f` ran in — callers need these for
    /// `ObjectInfo` and must not call back into the row to get them, since the row's
    /// lock isn't reentrant.
    fn do_col_op<R>(
        &self,
        bucket: Bucket,
        key: &Key,
        flags: OpFlags,
        f: impl FnOnce(&mut LocalKvCell) -> R,
    ) -> Option<(R, RowStats)> {
        let row = self.do_row_op(bucket, key.k1(), flags)?;
        let create_col = flags.contains(OpFlags::CREATE_IF_MISSING);
        let trigger = flags.contains(OpFlags::TRIGGER_DEPENDENCIES);

        let mut to_fire: Option<(Vec<MailboxId>, Vec<Callback>, Option<DataObject>, Availability, u64)> = None;

        let (result, stats) = row.with_col_mut(key.k2(), create_col, |cell| {
            let was_local = cell.availability() == Availability::InLocalMemory;
            let result = f(cell);

            if trigger && !was_local && cell.availability() == Availability::InLocalMemory {
                let (mailboxes, callbacks) = cell.drain_waiters();
                to_fire = Some((mailboxes, callbacks, cell.ldo().cloned(), cell.availability(), cell.user_bytes()));
            }
            result
        })?;

        if let Some((mailboxes, callbacks, ldo, availability, user_bytes)) = to_fire {
            let info = ObjectInfo {
                availability,
                user_bytes,
                dependencies: 0,
                row_num_columns: stats.num_columns,
                row_user_bytes: stats.user_bytes,
            };
            self.fire_waiters(mailboxes, callbacks, key.clone(), ldo, info);
        }

        Some((result, stats))
    }

    /// Drains and dispatches a cell's waiter lists. Mailbox ids go to the transport;
    /// callbacks run synchronously, in FIFO order, on the calling thread.
    fn fire_waiters(
        &self,
        mailboxes: Vec<MailboxId>,
        callbacks: Vec<Callback>,
        key: Key,
        ldo: Option<DataObject>,
        info: ObjectInfo,
    ) {
        if let Some(transport) = &self.transport {
            for mailbox in mailboxes {
                transport.notify(mailbox);
            }
        }
        let Some(ldo) = ldo else {
            debug_assert!(callbacks.is_empty(), "callbacks can't fire without an object");
            return;
        };
        for callback in callbacks {
            callback(true, key.clone(), ldo.clone(), info.clone());
        }
    }

    fn object_info(stats: RowStats, cell_availability: Availability, cell_user_bytes: u64, deps: usize) -> ObjectInfo {
        ObjectInfo {
            availability: cell_availability,
            user_bytes: cell_user_bytes,
            dependencies: deps,
            row_num_columns: stats.num_columns,
            row_user_bytes: stats.user_bytes,
        }
    }

    /// Publishes `object` at `(bucket, key)`. `key` must be non-wildcard and valid.
    ///
    /// `WriteToLocal` is implied by calling this at all; dependency triggering always
    /// runs. If the cell is already `InLocalMemory` and `overwrite` is `Disallow`,
    /// returns `Exists` without mutating anything (and therefore triggers nothing — the
    /// pending-waiter invariant guarantees no waiters exist on an already-populated cell).
    pub fn put(
        &self,
        bucket: Bucket,
        key: &Key,
        object: DataObject,
        overwrite: Overwrite,
        iom: Option<&dyn IomBackend>,
        write_to_iom: bool,
    ) -> Result<Outcome<ObjectInfo>> {
        if !key.is_valid() || key.is_row_wildcard() || key.is_col_wildcard() {
            return Err(KelpieError::invalid_arg("put requires a non-wildcard, valid key"));
        }

        let mut iom_error: Option<KelpieError> = None;
        let mut already_existed = false;
        let mut post: Option<(Availability, u64, usize)> = None;

        let flags = OpFlags::CREATE_IF_MISSING | OpFlags::TRIGGER_DEPENDENCIES;
        let (_, stats) = self
            .do_col_op(bucket, key, flags, |cell| {
                if cell.availability() == Availability::InLocalMemory && overwrite == Overwrite::Disallow {
                    already_existed = true;
                    return;
                }
                cell.set_local(object.clone());
                if write_to_iom {
                    match iom {
                        Some(iom) => {
                            if let Err(e) = iom.write_object(bucket, key, &object) {
                                iom_error = Some(e);
                            }
                        }
                        None => iom_error = Some(KelpieError::io("write_to_iom requested with no IOM configured")),
                    }
                }
                post = Some((cell.availability(), cell.user_bytes(), cell.dependency_count()));
            })
            .expect("row/col just created");

        if already_existed {
            return Err(KelpieError::exists());
        }

        let (availability, user_bytes, dependencies) = post.expect("post set on every non-already_existed path");
        let info = Self::object_info(stats, availability, user_bytes, dependencies);

        if let Some(e) = iom_error {
            return Err(e);
        }
        Ok(Outcome::triggered(info))
    }

    /// Plain lookup: doesn't create, doesn't trigger. Only succeeds for objects already
    /// `InLocalMemory`.
    pub fn get(&self, bucket: Bucket, key: &Key) -> Result<DataObject> {
        if key.is_row_wildcard() || key.is_col_wildcard() {
            return Err(KelpieError::invalid_arg("get requires a non-wildcard key"));
        }
        let row = self.do_row_op(bucket, key.k1(), OpFlags::empty());
        let Some(row) = row else {
            return Err(KelpieError::not_found());
        };
        row.with_col(key.k2(), |cell| cell.ldo().cloned())
            .flatten()
            .ok_or_else(KelpieError::not_found)
    }

    /// Like `get`, but tolerates a column wildcard and returns every currently
    /// in-memory match. Row wildcards are rejected.
    pub fn get_available(&self, bucket: Bucket, key: &Key) -> Result<BTreeMap<Key, DataObject>> {
        if key.is_row_wildcard() {
            return Err(KelpieError::invalid_arg("get_available rejects a row wildcard"));
        }
        let mut out = BTreeMap::new();
        if let Some(row) = self.do_row_op(bucket, key.k1(), OpFlags::empty()) {
            row.for_each_matching(key.is_col_wildcard(), key.col_prefix(), |k2, cell| {
                if let Some(ldo) = cell.ldo() {
                    out.insert(Key::new(key.k1(), k2), ldo.clone());
                }
            });
        }
        Ok(out)
    }

    /// `get`, but on a miss consults `iom` (if `iom_hash != 0`... concretely: if `iom` is
    /// `Some`) and, failing that, parks `mailbox` on the cell's waiter list.
    ///
    /// `cache_from_iom` controls whether a successful IOM load is cached in memory
    /// (`ReadToRemote`); otherwise only the `InDisk` marker is kept.
    pub fn get_for_op(
        &self,
        bucket: Bucket,
        key: &Key,
        mailbox: MailboxId,
        iom: Option<&dyn IomBackend>,
        cache_from_iom: bool,
    ) -> Result<DataObject> {
        if let Ok(ldo) = self.get(bucket, key) {
            return Ok(ldo);
        }

        if let Some(iom) = iom {
            match iom.read_object(bucket, key) {
                Ok(ldo) => {
                    let flags = OpFlags::CREATE_IF_MISSING | OpFlags::TRIGGER_DEPENDENCIES;
                    self.do_col_op(bucket, key, flags, |cell| {
                        if cache_from_iom {
                            cell.set_local(ldo.clone());
                        } else {
                            cell.set_availability(Availability::InDisk);
                        }
                    });
                    return Ok(ldo);
                }
                Err(e) if e.kind() == Kind::NotFound => {
                    // fall through to parking a waiter
                }
                Err(e) => return Err(e),
            }
        }

        let flags = OpFlags::CREATE_IF_MISSING;
        self.do_col_op(bucket, key, flags, |cell| {
            cell.mark_requested_if_unavailable();
            cell.push_mailbox_waiter(mailbox);
        });
        Err(KelpieError::not_found())
    }

    /// Registers `callback` to run when `key` becomes available. Runs it synchronously
    /// (and returns `Ok`) if the object is already in memory; otherwise parks it and
    /// returns `NotFound` the first time, `Waiting` on every subsequent registration
    /// while the cell is still `Requested`.
    pub fn want_local(
        &self,
        bucket: Bucket,
        key: &Key,
        caller_will_fetch_if_missing: bool,
        callback: Callback,
    ) -> Result<()> {
        let flags = OpFlags::CREATE_IF_MISSING;
        let mut already_requested = false;
        let mut fired: Option<(DataObject, Availability, u64, usize)> = None;
        let mut callback_slot = Some(callback);

        let (_, stats) = self
            .do_col_op(bucket, key, flags, |cell| {
                if let Some(ldo) = cell.ldo().cloned() {
                    fired = Some((ldo, cell.availability(), cell.user_bytes(), cell.dependency_count()));
                    return;
                }
                if caller_will_fetch_if_missing {
                    already_requested = !cell.mark_requested_if_unavailable();
                }
                cell.push_callback_waiter(callback_slot.take().expect("callback not yet consumed"));
            })
            .expect("create_if_missing yields a cell");

        if let Some((ldo, availability, user_bytes, dependencies)) = fired {
            let info = Self::object_info(stats, availability, user_bytes, dependencies);
            let callback = callback_slot.take().expect("callback still held when already available");
            callback(true, key.clone(), ldo, info);
            return Ok(());
        }

        if already_requested {
            Err(KelpieError::waiting())
        } else {
            Err(KelpieError::not_found())
        }
    }

    /// Drops the objects matching `key`'s row/column pattern. Rows that become empty
    /// are deleted under the table write lock once the column pass finishes. `Ok(())` if
    /// anything was removed, `NotFound` otherwise.
    pub fn drop_matching(&self, bucket: Bucket, key: &Key) -> Result<()> {
        let prefix = Self::full_row_name(bucket, key.row_prefix());
        let mut touched_rows: Vec<Arc<LocalKvRow>> = Vec::new();
        let mut total_removed = 0usize;

        if key.is_row_wildcard() {
            let candidates: Vec<Arc<LocalKvRow>> = {
                let rows = self.rows.read();
                rows.range(prefix.clone()..)
                    .take_while(|(name, _)| name.starts_with(&prefix))
                    .map(|(_, row)| Arc::clone(row))
                    .collect()
            };
            for row in candidates {
                let removed = row.remove_matching(key.is_col_wildcard(), key.col_prefix());
                total_removed += removed;
                if removed > 0 {
                    touched_rows.push(row);
                }
            }
        } else {
            let full_name = Self::full_row_name(bucket, key.k1());
            let row = { self.rows.read().get(&full_name).cloned() };
            if let Some(row) = row {
                let removed = row.remove_matching(key.is_col_wildcard(), key.col_prefix());
                total_removed += removed;
                if removed > 0 {
                    touched_rows.push(row);
                }
            }
        }

        if !touched_rows.is_empty() {
            let mut rows = self.rows.write();
            for row in &touched_rows {
                if row.is_empty() {
                    rows.remove(row.rowname());
                }
            }
        }

        if total_removed > 0 {
            Ok(())
        } else {
            Err(KelpieError::not_found())
        }
    }

    /// Lists objects matching `key`'s pattern, merging in backend results from `iom`
    /// when the column pattern is a wildcard, or when it's exact and the in-memory side
    /// produced exactly one hit. In-memory results come first; merge never duplicates a
    /// key already present.
    pub fn list(&self, bucket: Bucket, key: &Key, iom: Option<&dyn IomBackend>) -> Result<ObjectCapacities> {
        let mut keys = Vec::new();
        let mut capacities = Vec::new();

        let visit_row = |row: &LocalKvRow, keys: &mut Vec<Key>, capacities: &mut Vec<u64>| {
            row.for_each_matching(key.is_col_wildcard(), key.col_prefix(), |k2, cell| {
                if let Some(ldo) = cell.ldo() {
                    keys.push(Key::new(row.rowname_k1(bucket), k2));
                    capacities.push(ldo.user_size());
                }
            });
        };

        if key.is_row_wildcard() {
            let prefix = Self::full_row_name(bucket, key.row_prefix());
            let rows: Vec<Arc<LocalKvRow>> = {
                let table = self.rows.read();
                table
                    .range(prefix.clone()..)
                    .take_while(|(name, _)| name.starts_with(&prefix))
                    .map(|(_, row)| Arc::clone(row))
                    .collect()
            };
            for row in &rows {
                visit_row(row, &mut keys, &mut capacities);
            }
        } else if let Some(row) = self.do_row_op(bucket, key.k1(), OpFlags::empty()) {
            visit_row(&row, &mut keys, &mut capacities);
        }

        let should_merge_iom = key.is_col_wildcard() || keys.len() == 1;
        if should_merge_iom {
            if let Some(iom) = iom {
                match iom.list(bucket, key) {
                    Ok(backend) => {
                        for (k, size) in backend.keys.into_iter().zip(backend.capacities) {
                            if !keys.contains(&k) {
                                keys.push(k);
                                capacities.push(size);
                            }
                        }
                    }
                    Err(e) if e.kind() == Kind::NotFound => {}
                    Err(e) => warn!(error = %e, "iom list failed during merge"),
                }
            }
        }

        if keys.is_empty() {
            Err(KelpieError::not_found())
        } else {
            Ok(ObjectCapacities { keys, capacities })
        }
    }

    /// Resolves an object's availability/size without fetching it, honoring the same
    /// `InDisk` fallback as `get_for_op` when `iom` is supplied.
    pub fn info(&self, bucket: Bucket, key: &Key, iom: Option<&dyn IomBackend>) -> Result<ObjectInfo> {
        if let Some(row) = self.do_row_op(bucket, key.k1(), OpFlags::empty()) {
            if let Some(((availability, user_bytes, dependencies), stats)) = row.with_col_and_stats(key.k2(), |cell| {
                (cell.availability(), cell.user_bytes(), cell.dependency_count())
            }) {
                if availability != Availability::Unavailable {
                    return Ok(Self::object_info(stats, availability, user_bytes, dependencies));
                }
            }
        }
        if let Some(iom) = iom {
            return iom.get_info(bucket, key);
        }
        Ok(ObjectInfo::unavailable())
    }

    /// Read-only snapshot sufficient to feed the HTTP status views (out of scope here).
    pub fn snapshot(&self) -> Vec<RowSnapshot> {
        let rows = self.rows.read();
        rows.values()
            .map(|row| {
                let mut cols = Vec::new();
                row.for_each_matching(true, "", |k2, cell| {
                    cols.push(ColumnSnapshot {
                        name: k2.to_string(),
                        bytes: cell.user_bytes(),
                        availability: cell.availability(),
                        dependency_count: cell.dependency_count(),
                    });
                });
                RowSnapshot {
                    rowname: row.rowname().to_string(),
                    num_cols: row.num_columns(),
                    first_col: cols.first().map(|c| c.name.clone()),
                    user_bytes: row.user_bytes(),
                    per_col: cols,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSnapshot {
    pub name: String,
    pub bytes: u64,
    pub availability: Availability,
    pub dependency_count: usize,
}

#[derive(Debug, Clone)]
pub struct RowSnapshot {
    pub rowname: String,
    pub num_cols: usize,
    pub first_col: Option<String>,
    pub user_bytes: u64,
    pub per_col: Vec<ColumnSnapshot>,
}

impl LocalKvRow {
    /// Recovers the bucket-relative K1 from a fully-qualified row name (`bucket.hex() ||
    /// k1`), used when re-materializing `Key`s out of a table scan.
    fn rowname_k1(&self, bucket: Bucket) -> String {
        self.rowname()
            .strip_prefix(&bucket.hex())
            .unwrap_or(self.rowname())
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cell::MailboxId;

    /// A trivial `IomBackend` over a `Mutex<HashMap<..>>`, for exercising the
    /// table/IOM interaction without touching the filesystem.
    #[derive(Default)]
    struct InMemoryIom {
        objects: Mutex<HashMap<(Bucket, Key), DataObject>>,
    }

    impl IomBackend for InMemoryIom {
        fn name(&self) -> &str {
            "in-memory"
        }

        fn write_object(&self, bucket: Bucket, key: &Key, object: &DataObject) -> Result<()> {
            self.objects.lock().insert((bucket, key.clone()), object.clone());
            Ok(())
        }

        fn read_object(&self, bucket: Bucket, key: &Key) -> Result<DataObject> {
            self.objects
                .lock()
                .get(&(bucket, key.clone()))
                .cloned()
                .ok_or_else(KelpieError::not_found)
        }

        fn get_info(&self, bucket: Bucket, key: &Key) -> Result<ObjectInfo> {
            let object = self.read_object(bucket, key)?;
            Ok(ObjectInfo {
                availability: Availability::InDisk,
                user_bytes: object.user_size(),
                dependencies: 0,
                row_num_columns: 0,
                row_user_bytes: 0,
            })
        }

        fn drop_object(&self, bucket: Bucket, key: &Key) -> Result<()> {
            self.objects
                .lock()
                .remove(&(bucket, key.clone()))
                .map(|_| ())
                .ok_or_else(KelpieError::not_found)
        }

        fn list(&self, bucket: Bucket, key: &Key) -> Result<ObjectCapacities> {
            let objects = self.objects.lock();
            let mut out = ObjectCapacities::default();
            for ((b, k), object) in objects.iter() {
                if *b == bucket && key.matches(k.k1(), k.k2()) {
                    out.keys.push(k.clone());
                    out.capacities.push(object.user_size());
                }
            }
            if out.keys.is_empty() {
                Err(KelpieError::not_found())
            } else {
                Ok(out)
            }
        }
    }

    fn bucket() -> Bucket {
        Bucket::from_name("test-bucket")
    }

    #[test]
    fn put_then_get_round_trips_payload() {
        let table = LocalKv::new();
        let key = Key::new("row", "col");
        let object = DataObject::new(0, vec![1], vec![2, 3]);

        let info = table.put(bucket(), &key, object.clone(), Overwrite::Disallow, None, false).unwrap();
        assert_eq!(info.value.availability, Availability::InLocalMemory);
        assert!(info.triggered_dependencies);

        let fetched = table.get(bucket(), &key).unwrap();
        assert_eq!(fetched, object);
    }

    #[test]
    fn put_without_overwrite_rejects_second_write() {
        let table = LocalKv::new();
        let key = Key::new("row", "col");
        table.put(bucket(), &key, DataObject::new(0, vec![], vec![1]), Overwrite::Disallow, None, false).unwrap();

        let err = table
            .put(bucket(), &key, DataObject::new(0, vec![], vec![2]), Overwrite::Disallow, None, false)
            .unwrap_err();
        assert_eq!(err.kind(), Kind::Exists);

        // the original payload survives untouched
        assert_eq!(table.get(bucket(), &key).unwrap().data(), &[1]);
    }

    #[test]
    fn put_with_overwrite_allowed_replaces_payload() {
        let table = LocalKv::new();
        let key = Key::new("row", "col");
        table.put(bucket(), &key, DataObject::new(0, vec![], vec![1]), Overwrite::Disallow, None, false).unwrap();
        table.put(bucket(), &key, DataObject::new(0, vec![], vec![2]), Overwrite::Allow, None, false).unwrap();
        assert_eq!(table.get(bucket(), &key).unwrap().data(), &[2]);
    }

    #[test]
    fn get_on_absent_key_is_not_found() {
        let table = LocalKv::new();
        let err = table.get(bucket(), &Key::new("row", "col")).unwrap_err();
        assert_eq!(err.kind(), Kind::NotFound);
    }

    #[test]
    fn get_available_collects_wildcard_column_matches_only() {
        let table = LocalKv::new();
        for col in ["a", "b", "c"] {
            table.put(bucket(), &Key::new("row", col), DataObject::new(0, vec![], vec![1]), Overwrite::Disallow, None, false).unwrap();
        }
        table.put(bucket(), &Key::new("other", "a"), DataObject::new(0, vec![], vec![9]), Overwrite::Disallow, None, false).unwrap();

        let found = table.get_available(bucket(), &Key::new("row", "*")).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.contains_key(&Key::new("row", "a")));
        assert!(!found.contains_key(&Key::new("other", "a")));
    }

    #[test]
    fn get_for_op_falls_back_to_iom_then_to_parking_a_mailbox() {
        let table = LocalKv::new();
        let iom = InMemoryIom::default();
        let key = Key::new("row", "col");

        // nothing anywhere yet: parks a waiter and returns NotFound
        let err = table.get_for_op(bucket(), &key, MailboxId(1), Some(&iom), true).unwrap_err();
        assert_eq!(err.kind(), Kind::NotFound);

        // now populate the IOM behind the table's back
        iom.write_object(bucket(), &key, &DataObject::new(0, vec![], vec![7])).unwrap();
        let fetched = table.get_for_op(bucket(), &key, MailboxId(2), Some(&iom), true).unwrap();
        assert_eq!(fetched.data(), &[7]);

        // cache_from_iom was true, so it's now served straight from memory
        assert_eq!(table.get(bucket(), &key).unwrap().data(), &[7]);
    }

    #[test]
    fn get_for_op_without_caching_leaves_cell_marked_in_disk() {
        let table = LocalKv::new();
        let iom = InMemoryIom::default();
        let key = Key::new("row", "col");
        iom.write_object(bucket(), &key, &DataObject::new(0, vec![], vec![7])).unwrap();

        table.get_for_op(bucket(), &key, MailboxId(1), Some(&iom), false).unwrap();
        assert!(table.get(bucket(), &key).is_err());
        assert_eq!(table.info(bucket(), &key, Some(&iom)).unwrap().availability, Availability::InDisk);
    }

    #[test]
    fn want_local_fires_synchronously_when_already_available() {
        let table = LocalKv::new();
        let key = Key::new("row", "col");
        table.put(bucket(), &key, DataObject::new(0, vec![], vec![4]), Overwrite::Disallow, None, false).unwrap();

        let fired = std::sync::Arc::new(AtomicBool::new(false));
        let fired_clone = std::sync::Arc::clone(&fired);
        table
            .want_local(
                bucket(),
                &key,
                false,
                Box::new(move |found, _key, object, _info| {
                    assert!(found);
                    assert_eq!(object.data(), &[4]);
                    fired_clone.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn want_local_registers_then_notifies_on_publish() {
        let table = LocalKv::new();
        let key = Key::new("row", "col");

        let err = table.want_local(bucket(), &key, true, Box::new(|_, _, _, _| {})).unwrap_err();
        assert_eq!(err.kind(), Kind::NotFound);

        let err = table.want_local(bucket(), &key, true, Box::new(|_, _, _, _| {})).unwrap_err();
        assert_eq!(err.kind(), Kind::Waiting);

        let seen = Mutex::new(Vec::new());
        let seen = std::sync::Arc::new(seen);
        let seen_clone = std::sync::Arc::clone(&seen);
        table
            .want_local(
                bucket(),
                &key,
                false,
                Box::new(move |found, _key, object, _info| seen_clone.lock().push((found, object.data().to_vec()))),
            )
            .unwrap_err();

        table.put(bucket(), &key, DataObject::new(0, vec![], vec![5]), Overwrite::Disallow, None, false).unwrap();
        assert_eq!(*seen.lock(), vec![(true, vec![5])]);
    }

    #[test]
    fn drop_matching_exact_key_removes_only_that_key() {
        let table = LocalKv::new();
        table.put(bucket(), &Key::new("row", "a"), DataObject::new(0, vec![], vec![1]), Overwrite::Disallow, None, false).unwrap();
        table.put(bucket(), &Key::new("row", "b"), DataObject::new(0, vec![], vec![2]), Overwrite::Disallow, None, false).unwrap();

        table.drop_matching(bucket(), &Key::new("row", "a")).unwrap();
        assert!(table.get(bucket(), &Key::new("row", "a")).is_err());
        assert_eq!(table.get(bucket(), &Key::new("row", "b")).unwrap().data(), &[2]);
    }

    #[test]
    fn drop_matching_row_wildcard_removes_only_matching_rows() {
        let table = LocalKv::new();
        table.put(bucket(), &Key::new("alpha_1", "x"), DataObject::new(0, vec![], vec![1]), Overwrite::Disallow, None, false).unwrap();
        table.put(bucket(), &Key::new("alpha_2", "x"), DataObject::new(0, vec![], vec![1]), Overwrite::Disallow, None, false).unwrap();
        table.put(bucket(), &Key::new("beta", "x"), DataObject::new(0, vec![], vec![1]), Overwrite::Disallow, None, false).unwrap();

        table.drop_matching(bucket(), &Key::new("alpha_*", "*")).unwrap();
        assert!(table.get(bucket(), &Key::new("alpha_1", "x")).is_err());
        assert!(table.get(bucket(), &Key::new("alpha_2", "x")).is_err());
        assert!(table.get(bucket(), &Key::new("beta", "x")).is_ok());
    }

    #[test]
    fn drop_on_nothing_present_is_not_found() {
        let table = LocalKv::new();
        let err = table.drop_matching(bucket(), &Key::new("row", "*")).unwrap_err();
        assert_eq!(err.kind(), Kind::NotFound);
    }

    #[test]
    fn list_merges_iom_results_without_duplicating_in_memory_hits() {
        let table = LocalKv::new();
        let iom = InMemoryIom::default();
        table.put(bucket(), &Key::new("row", "a"), DataObject::new(0, vec![], vec![1]), Overwrite::Disallow, None, false).unwrap();
        iom.write_object(bucket(), &Key::new("row", "a"), &DataObject::new(0, vec![], vec![1])).unwrap();
        iom.write_object(bucket(), &Key::new("row", "b"), &DataObject::new(0, vec![], vec![2])).unwrap();

        let listed = table.list(bucket(), &Key::new("row", "*"), Some(&iom)).unwrap();
        assert_eq!(listed.keys.len(), 2);
        assert!(listed.keys.contains(&Key::new("row", "a")));
        assert!(listed.keys.contains(&Key::new("row", "b")));
    }

    #[test]
    fn info_falls_back_to_iom_when_locally_unavailable() {
        let table = LocalKv::new();
        let iom = InMemoryIom::default();
        let key = Key::new("row", "col");
        iom.write_object(bucket(), &key, &DataObject::new(0, vec![], vec![3])).unwrap();

        let info = table.info(bucket(), &key, Some(&iom)).unwrap();
        assert_eq!(info.availability, Availability::InDisk);
        assert_eq!(info.user_bytes, 1);
        assert_eq!(table.info(bucket(), &Key::new("row", "col"), None).unwrap().availability, Availability::Unavailable);
    }
}
