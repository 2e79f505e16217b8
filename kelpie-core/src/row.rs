//! Ordered column set for a single row, with the empty-column fast path.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::cell::LocalKvCell;
use crate::key::matches_prefix_string;

/// The empty string is the K2 used by [`RowInner::col_single`]'s fast path; per the
/// source, `col_single` matches the empty K2 exactly and never participates in prefix
/// matching against a non-empty pattern.
const SINGLE_COLUMN_NAME: &str = "";

struct RowInner {
    col_single: Option<LocalKvCell>,
    cols: BTreeMap<String, LocalKvCell>,
}

/// Aggregate row stats observed atomically alongside a column mutation.
#[derive(Debug, Clone, Copy)]
pub struct RowStats {
    pub num_columns: usize,
    pub user_bytes: u64,
}

impl RowInner {
    fn is_empty(&self) -> bool {
        self.col_single.is_none() && self.cols.is_empty()
    }

    fn num_columns(&self) -> usize {
        usize::from(self.col_single.is_some()) + self.cols.len()
    }

    fn user_bytes(&self) -> u64 {
        self.col_single.iter().map(LocalKvCell::user_bytes).sum::<u64>()
            + self.cols.values().map(LocalKvCell::user_bytes).sum::<u64>()
    }
}

/// A single row: `rowname` plus its columns, guarded by one reader/writer lock so that
/// `col_single` and `cols` are always observed together.
pub struct LocalKvRow {
    rowname: String,
    inner: RwLock<RowInner>,
}

impl LocalKvRow {
    pub fn new(rowname: impl Into<String>) -> Self {
        Self {
            rowname: rowname.into(),
            inner: RwLock::new(RowInner {
                col_single: None,
                cols: BTreeMap::new(),
            }),
        }
    }

    pub fn rowname(&self) -> &str {
        &self.rowname
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn num_columns(&self) -> usize {
        self.inner.read().num_columns()
    }

    pub fn user_bytes(&self) -> u64 {
        self.inner.read().user_bytes()
    }

    /// Runs `f` with mutable access to the column named `k2`, creating it first if
    /// `create_if_missing` is set and it doesn't exist. Returns `None` only when the
    /// column is absent and creation wasn't requested. On success, also returns the
    /// row's aggregate column count and user-byte total as observed under the same
    /// write lock, immediately after `f` ran (so callers needn't re-lock the row to
    /// build an `ObjectInfo`).
    pub fn with_col_mut<R>(
        &self,
        k2: &str,
        create_if_missing: bool,
        f: impl FnOnce(&mut LocalKvCell) -> R,
    ) -> Option<(R, RowStats)> {
        let mut inner = self.inner.write();
        let result = if k2 == SINGLE_COLUMN_NAME {
            if inner.col_single.is_none() {
                if !create_if_missing {
                    return None;
                }
                inner.col_single = Some(LocalKvCell::new());
            }
            f(inner.col_single.as_mut().unwrap())
        } else {
            if !inner.cols.contains_key(k2) {
                if !create_if_missing {
                    return None;
                }
                inner.cols.insert(k2.to_string(), LocalKvCell::new());
            }
            f(inner.cols.get_mut(k2).unwrap())
        };
        let stats = RowStats {
            num_columns: inner.num_columns(),
            user_bytes: inner.user_bytes(),
        };
        Some((result, stats))
    }

    /// Runs `f` with read-only access to the column named `k2`. `None` if absent.
    pub fn with_col<R>(&self, k2: &str, f: impl FnOnce(&LocalKvCell) -> R) -> Option<R> {
        let inner = self.inner.read();
        if k2 == SINGLE_COLUMN_NAME {
            inner.col_single.as_ref().map(f)
        } else {
            inner.cols.get(k2).map(f)
        }
    }

    /// Like [`LocalKvRow::with_col`], but also returns the row's aggregate column count
    /// and user-byte total observed under the same read lock — callers that need an
    /// `ObjectInfo` must use this instead of calling `num_columns`/`user_bytes` from
    /// inside the closure, which would try to re-acquire a read lock already held.
    pub fn with_col_and_stats<R>(&self, k2: &str, f: impl FnOnce(&LocalKvCell) -> R) -> Option<(R, RowStats)> {
        let inner = self.inner.read();
        let cell = if k2 == SINGLE_COLUMN_NAME {
            inner.col_single.as_ref()
        } else {
            inner.cols.get(k2)
        }?;
        let result = f(cell);
        let stats = RowStats {
            num_columns: inner.num_columns(),
            user_bytes: inner.user_bytes(),
        };
        Some((result, stats))
    }

    /// Iterates columns whose K2 matches `(wildcard, pattern)`, in K2 order (`col_single`
    /// first, matching the empty K2 exactly).
    pub fn for_each_matching(
        &self,
        wildcard: bool,
        pattern: &str,
        mut f: impl FnMut(&str, &LocalKvCell),
    ) {
        let inner = self.inner.read();
        if matches_prefix_string(wildcard, pattern, SINGLE_COLUMN_NAME) {
            if let Some(cell) = inner.col_single.as_ref() {
                f(SINGLE_COLUMN_NAME, cell);
            }
        }
        for (k2, cell) in &inner.cols {
            if matches_prefix_string(wildcard, pattern, k2) {
                f(k2, cell);
            }
        }
    }

    /// Removes every column whose K2 matches `(wildcard, pattern)`. Returns the number
    /// removed.
    pub fn remove_matching(&self, wildcard: bool, pattern: &str) -> usize {
        let mut inner = self.inner.write();
        let mut removed = 0;

        if matches_prefix_string(wildcard, pattern, SINGLE_COLUMN_NAME) && inner.col_single.is_some()
        {
            inner.col_single = None;
            removed += 1;
        }

        let to_remove: Vec<String> = inner
            .cols
            .keys()
            .filter(|k2| matches_prefix_string(wildcard, pattern, k2))
            .cloned()
            .collect();
        for k2 in to_remove {
            inner.cols.remove(&k2);
            removed += 1;
        }

        removed
    }
}
