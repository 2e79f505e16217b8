//! Read-only status snapshot, shaped for an HTTP status endpoint an embedder might add.
//!
//! Building the actual HTTP server is out of scope; this module only produces the
//! serializable snapshot from a [`crate::table::LocalKv`].

use serde::Serialize;

use crate::cell::Availability;
use crate::table::LocalKv;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnStatus {
    pub name: String,
    pub bytes: u64,
    pub availability: &'static str,
    pub dependency_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowStatus {
    pub rowname: String,
    pub num_cols: usize,
    pub first_col: Option<String>,
    pub user_bytes: u64,
    pub per_col: Vec<ColumnStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub rows: Vec<RowStatus>,
}

fn availability_name(a: Availability) -> &'static str {
    match a {
        Availability::Unavailable => "unavailable",
        Availability::Requested => "requested",
        Availability::InLocalMemory => "in_local_memory",
        Availability::InRemoteMemory => "in_remote_memory",
        Availability::InDisk => "in_disk",
    }
}

/// Builds a serializable snapshot of every row/column currently tracked by `local`.
pub fn snapshot(local: &LocalKv) -> PoolStatus {
    let rows = local
        .snapshot()
        .into_iter()
        .map(|row| RowStatus {
            rowname: row.rowname,
            num_cols: row.num_cols,
            first_col: row.first_col,
            user_bytes: row.user_bytes,
            per_col: row
                .per_col
                .into_iter()
                .map(|c| ColumnStatus {
                    name: c.name,
                    bytes: c.bytes,
                    availability: availability_name(c.availability),
                    dependency_count: c.dependency_count,
                })
                .collect(),
        })
        .collect();
    PoolStatus { rows }
}
