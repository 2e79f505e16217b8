//! Named pure functions a `Pool::compute` call can run over a `get_available` result.

use std::collections::BTreeMap;

use crate::data_object::DataObject;
use crate::error::{KelpieError, Result};
use crate::key::Key;

/// A computation that reduces a batch of in-memory objects, gathered by
/// [`crate::table::LocalKv::get_available`], into one result object.
pub trait Compute: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, objects: &BTreeMap<Key, DataObject>) -> Result<DataObject>;
}

/// Concatenates every matched object's `data()`, in key order, into one buffer.
pub struct ConcatData;

impl Compute for ConcatData {
    fn name(&self) -> &str {
        "concat"
    }

    fn run(&self, objects: &BTreeMap<Key, DataObject>) -> Result<DataObject> {
        if objects.is_empty() {
            return Err(KelpieError::not_found());
        }
        let mut out = Vec::new();
        for object in objects.values() {
            out.extend_from_slice(object.data());
        }
        Ok(DataObject::new(0, vec![], out))
    }
}

/// Sums `user_size()` across every matched object and returns it as an 8-byte
/// little-endian payload.
pub struct SumSizes;

impl Compute for SumSizes {
    fn name(&self) -> &str {
        "sum_sizes"
    }

    fn run(&self, objects: &BTreeMap<Key, DataObject>) -> Result<DataObject> {
        let total: u64 = objects.values().map(DataObject::user_size).sum();
        Ok(DataObject::new(0, vec![], total.to_le_bytes().to_vec()))
    }
}

/// A registry of named computations, looked up by `Pool::compute`.
#[derive(Default)]
pub struct ComputeRegistry {
    by_name: std::collections::HashMap<String, Box<dyn Compute>>,
}

impl ComputeRegistry {
    pub fn new() -> Self {
        Self {
            by_name: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, compute: Box<dyn Compute>) {
        self.by_name.insert(compute.name().to_string(), compute);
    }

    pub fn run(&self, name: &str, objects: &BTreeMap<Key, DataObject>) -> Result<DataObject> {
        self.by_name
            .get(name)
            .ok_or_else(|| KelpieError::invalid_arg(format!("no such compute: {name}")))?
            .run(objects)
    }
}
