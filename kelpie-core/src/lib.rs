//! Local 2-D key/value object store core.
//!
//! A [`table::LocalKv`] holds a bucket-qualified map of rows, each an ordered set of
//! columns ([`row::LocalKvRow`] / [`cell::LocalKvCell`]). [`pool::Pool`] is the policy
//! front-end that routes puts/gets/lists across a table and a pluggable persistence
//! backend ([`iom`]). Operations that can't be satisfied from memory register a waiter
//! on the target cell and fire it, at most once, the moment the cell transitions into
//! `InLocalMemory`.

pub mod bucket;
pub mod cell;
pub mod compute;
pub mod config;
pub mod data_object;
pub mod directory;
pub mod error;
pub mod iom;
pub mod key;
pub mod pool;
pub mod row;
pub mod status;
pub mod table;
pub mod transport;

pub use bucket::Bucket;
pub use cell::{Availability, MailboxId, ObjectInfo};
pub use data_object::DataObject;
pub use error::{KelpieError, Kind, Outcome, Result};
pub use key::Key;
pub use pool::{Pool, PoolBehavior};
pub use table::LocalKv;
