//! Per-file persistence: one file per object, named after its packed key.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::bucket::Bucket;
use crate::cell::{Availability, ObjectInfo};
use crate::data_object::DataObject;
use crate::error::{KelpieError, Result};
use crate::iom::{IomBackend, ObjectCapacities};
use crate::key::{expand_punycode, make_punycode, Key};

const DIR_CREATE_RETRIES: u32 = 3;
const DIR_CREATE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Stores each object as `<root>/<bucket hex>/<punycode(key.pup())>`.
pub struct FileBackend {
    name: String,
    root: PathBuf,
}

impl FileBackend {
    /// Creates `root` (retrying a handful of times, since the directory may be on a
    /// network mount that's still settling right after startup) and returns a backend
    /// rooted there.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut last_err = None;
        for attempt in 1..=DIR_CREATE_RETRIES {
            match fs::create_dir_all(&root) {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    warn!(attempt, path = %root.display(), error = %e, "failed to create IOM root, retrying");
                    last_err = Some(e);
                    if attempt < DIR_CREATE_RETRIES {
                        thread::sleep(DIR_CREATE_RETRY_DELAY);
                    }
                }
            }
        }
        if let Some(e) = last_err {
            return Err(KelpieError::io(format!(
                "could not create IOM root {}: {e}",
                root.display()
            )));
        }
        Ok(Self {
            name: name.into(),
            root,
        })
    }

    fn bucket_dir(&self, bucket: Bucket) -> PathBuf {
        self.root.join(bucket.hex())
    }

    fn object_path(&self, bucket: Bucket, key: &Key) -> PathBuf {
        self.bucket_dir(bucket).join(make_punycode(&key.pup()))
    }

    fn key_from_filename(name: &str) -> Option<Key> {
        Key::from_pup(&expand_punycode(name))
    }
}

impl IomBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_object(&self, bucket: Bucket, key: &Key, object: &DataObject) -> Result<()> {
        let dir = self.bucket_dir(bucket);
        fs::create_dir_all(&dir)?;
        object.write_to_file(self.object_path(bucket, key))
    }

    fn read_object(&self, bucket: Bucket, key: &Key) -> Result<DataObject> {
        let path = self.object_path(bucket, key);
        if !path.exists() {
            return Err(KelpieError::not_found());
        }
        DataObject::read_from_file(path)
    }

    fn get_info(&self, bucket: Bucket, key: &Key) -> Result<ObjectInfo> {
        let path = self.object_path(bucket, key);
        match fs::metadata(&path) {
            Ok(meta) => Ok(ObjectInfo {
                availability: Availability::InDisk,
                user_bytes: meta.len().saturating_sub(16),
                dependencies: 0,
                row_num_columns: 0,
                row_user_bytes: 0,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(KelpieError::not_found()),
            Err(e) => Err(e.into()),
        }
    }

    fn drop_object(&self, bucket: Bucket, key: &Key) -> Result<()> {
        let path = self.object_path(bucket, key);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "removed object file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(KelpieError::not_found()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, bucket: Bucket, key: &Key) -> Result<ObjectCapacities> {
        let dir = self.bucket_dir(bucket);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(KelpieError::not_found()),
            Err(e) => return Err(e.into()),
        };

        let mut out = ObjectCapacities::default();
        for entry in entries {
            let entry = entry?;
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(candidate) = Self::key_from_filename(&filename) else {
                continue;
            };
            if !key.matches(candidate.k1(), candidate.k2()) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len().saturating_sub(16)).unwrap_or(0);
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
