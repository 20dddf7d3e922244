// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The single commit-completion callback a host application can register:
//! one trait method, fired exactly once per commit attempt regardless of
//! outcome.

use crate::Error;

/// Outcome of one commit attempt, passed to [`NotifyHandler::notify`].
#[derive(Debug)]
pub enum CommitStatus<'a> {
    /// The commit completed and its file groups are now visible to readers.
    Committed,
    /// The commit was skipped because the frozen memtable had nothing to do.
    NothingToCommit,
    /// The commit failed; no partial state was left visible.
    Failed(&'a Error),
}

/// Receives exactly one notification per commit attempt.
///
/// Implementations must not block for long: the commit thread calls this
/// synchronously before releasing the commit semaphore for the next attempt.
pub trait NotifyHandler: Send + Sync {
    fn notify(&self, status: CommitStatus<'_>);
}

/// A [`NotifyHandler`] that does nothing, for callers that don't care.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifyHandler;

impl NotifyHandler for NoopNotifyHandler {
    fn notify(&self, _status: CommitStatus<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_log::test;

    struct CountingHandler(AtomicUsize);

    impl NotifyHandler for CountingHandler {
        fn notify(&self, _status: CommitStatus<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_handler_does_not_panic() {
        NoopNotifyHandler.notify(CommitStatus::Committed);
        NoopNotifyHandler.notify(CommitStatus::NothingToCommit);
    }

    #[test]
    fn handler_is_invoked_once_per_call() {
        let handler = CountingHandler(AtomicUsize::new(0));
        handler.notify(CommitStatus::Committed);
        handler.notify(CommitStatus::NothingToCommit);
        assert_eq!(2, handler.0.load(Ordering::SeqCst));
    }
}
