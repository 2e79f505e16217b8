//! Name-keyed lookup table for configured backends.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bucket::stable_hash;
use crate::iom::IomBackend;

/// Registers backends under a name and hands back a stable 32-bit hash of that name
/// (`iom_hash`) for embedding in configuration or wire messages instead of the string
/// itself.
#[derive(Default)]
pub struct IomRegistry {
    by_name: HashMap<String, Arc<dyn IomBackend>>,
    by_hash: HashMap<u32, Arc<dyn IomBackend>>,
}

impl IomRegistry {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_hash: HashMap::new(),
        }
    }

    /// Registers `backend` under `name`, returning its `iom_hash`. Re-registering the
    /// same name replaces the prior backend under both maps.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn IomBackend>) -> u32 {
        let name = name.into();
        let hash = stable_hash(&name);
        self.by_hash.insert(hash, Arc::clone(&backend));
        self.by_name.insert(name, backend);
        hash
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn IomBackend>> {
        self.by_name.get(name).cloned()
    }

    pub fn get_by_hash(&self, hash: u32) -> Option<Arc<dyn IomBackend>> {
        self.by_hash.get(&hash).cloned()
    }

    pub fn iom_hash(name: &str) -> u32 {
        stable_hash(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Bucket;
    use crate::cell::ObjectInfo;
    use crate::data_object::DataObject;
    use crate::error::{KelpieError, Result};
    use crate::iom::ObjectCapacities;
    use crate::key::Key;

    struct Stub(&'static str);

    impl IomBackend for Stub {
        fn name(&self) -> &str {
            self.0
        }
        fn write_object(&self, _: Bucket, _: &Key, _: &DataObject) -> Result<()> {
            Ok(())
        }
        fn read_object(&self, _: Bucket, _: &Key) -> Result<DataObject> {
            Err(KelpieError::not_found())
        }
        fn get_info(&self, _: Bucket, _: &Key) -> Result<ObjectInfo> {
            Ok(ObjectInfo::unavailable())
        }
        fn drop_object(&self, _: Bucket, _: &Key) -> Result<()> {
            Ok(())
        }
        fn list(&self, _: Bucket, _: &Key) -> Result<ObjectCapacities> {
            Ok(ObjectCapacities::default())
        }
    }

    #[test]
    fn register_then_lookup_by_both_keys() {
        let mut registry = IomRegistry::new();
        let hash = registry.register("primary", Arc::new(Stub("primary")));

        assert_eq!(hash, IomRegistry::iom_hash("primary"));
        assert_eq!(registry.get_by_name("primary").unwrap().name(), "primary");
        assert_eq!(registry.get_by_hash(hash).unwrap().name(), "primary");
        assert!(registry.get_by_name("missing").is_none());
    }
}
