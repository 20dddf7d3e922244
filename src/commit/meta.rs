// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Metadata commit: replays queued `UpdateMeta`/`DropMeta` actions against a
//! key-value metadata store inside a `start_commit`/`end_commit` envelope,
//! matching a write-ahead-log commit marker discipline: a batch is either
//! fully visible or not visible at all.

use crate::memtable::MetaAction;

/// A metadata key-value store the commit path can write through.
///
/// Implementations must make `start_commit`/`end_commit` atomic with respect
/// to crash recovery: if the process dies between them, the store must come
/// back up as if `start_commit` had never been called.
pub trait MetaStore: Send + Sync {
    fn start_commit(&self) -> crate::Result<()>;
    fn end_commit(&self) -> crate::Result<()>;
    fn put(&self, uid: u64, payload: Vec<u8>) -> crate::Result<()>;
    fn delete(&self, uid: u64) -> crate::Result<()>;
}

/// Replays `actions` against `store` inside one commit envelope.
///
/// Aborts the whole operation on the first failing action: a partially
/// applied metadata commit is worse than none, since the commit as a whole
/// is reported as failed and the caller is expected to retry from the same
/// frozen memtable.
pub fn commit_meta(store: &dyn MetaStore, actions: &[MetaAction]) -> crate::Result<()> {
    if actions.is_empty() {
        return Ok(());
    }

    store.start_commit()?;

    for action in actions {
        match action {
            MetaAction::UpdateMeta { uid, payload } => store.put(*uid, payload.clone())?,
            MetaAction::DropMeta { uid } => store.delete(*uid)?,
        }
    }

    store.end_commit()
}

/// An in-memory [`MetaStore`], for tests and single-process embeddings that
/// don't need their own durable metadata catalog.
#[derive(Default)]
pub struct InMemoryMetaStore {
    entries: std::sync::Mutex<std::collections::BTreeMap<u64, Vec<u8>>>,
}

impl InMemoryMetaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, uid: u64) -> Option<Vec<u8>> {
        self.entries.lock().expect("meta store poisoned").get(&uid).cloned()
    }
}

impl MetaStore for InMemoryMetaStore {
    fn start_commit(&self) -> crate::Result<()> {
        Ok(())
    }

    fn end_commit(&self) -> crate::Result<()> {
        Ok(())
    }

    fn put(&self, uid: u64, payload: Vec<u8>) -> crate::Result<()> {
        self.entries.lock().expect("meta store poisoned").insert(uid, payload);
        Ok(())
    }

    fn delete(&self, uid: u64) -> crate::Result<()> {
        self.entries.lock().expect("meta store poisoned").remove(&uid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn applies_update_then_drop() -> crate::Result<()> {
        let store = InMemoryMetaStore::new();
        let actions = vec![
            MetaAction::UpdateMeta { uid: 1, payload: vec![1, 2, 3] },
            MetaAction::UpdateMeta { uid: 2, payload: vec![9] },
            MetaAction::DropMeta { uid: 1 },
        ];

        commit_meta(&store, &actions)?;

        assert_eq!(None, store.get(1));
        assert_eq!(Some(vec![9]), store.get(2));

        Ok(())
    }

    #[test]
    fn empty_action_list_is_a_noop() -> crate::Result<()> {
        let store = InMemoryMetaStore::new();
        commit_meta(&store, &[])?;
        Ok(())
    }

    struct FailingStore;
    impl MetaStore for FailingStore {
        fn start_commit(&self) -> crate::Result<()> {
            Ok(())
        }
        fn end_commit(&self) -> crate::Result<()> {
            Ok(())
        }
        fn put(&self, _uid: u64, _payload: Vec<u8>) -> crate::Result<()> {
            Err(crate::Error::MetaStore("disk full".to_string()))
        }
        fn delete(&self, _uid: u64) -> crate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn aborts_on_first_failure() {
        let store = FailingStore;
        let actions = vec![MetaAction::UpdateMeta { uid: 1, payload: vec![] }];
        assert!(commit_meta(&store, &actions).is_err());
    }
}
