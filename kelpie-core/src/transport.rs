//! Out-of-process collaborator stubs.
//!
//! The actual network transport and node directory live outside this crate's scope; it
//! only needs a seam to call through when a cell transitions and mailbox waiters need
//! waking on a remote node.

use crate::cell::MailboxId;

/// Wakes a suspended remote operation parked on `mailbox`. The core treats the mailbox
/// id as opaque and never blocks on the notification's delivery.
pub trait Transport: Send + Sync {
    fn notify(&self, mailbox: MailboxId);
}

/// A `Transport` that drops every notification, useful for single-node deployments and
/// tests that only exercise the callback-waiter path.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn notify(&self, _mailbox: MailboxId) {}
}
