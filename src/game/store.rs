//! Storage collaborator boundary
//!
//! The simulation never keeps match records itself. It reaches them through a
//! [`MatchStore`], which must give per-match serializability: every
//! `transact` call on one match runs to completion before the next starts,
//! while different matches may be transacted in parallel.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::game::error::{CoreError, CoreResult};
use crate::game::state::{Match, MatchId, MatchStatus, MatchSummary};

pub trait MatchStore: Send + Sync {
    /// Insert a match record, returning its id
    fn insert(&self, record: Match) -> MatchId;

    /// Delete a match record
    fn remove(&self, match_id: MatchId) -> Option<Match>;

    /// Atomic read-modify-write of one match
    fn transact<R>(&self, match_id: MatchId, f: impl FnOnce(&mut Match) -> CoreResult<R>) -> CoreResult<R>;

    /// Read-only access to one match
    fn read<R>(&self, match_id: MatchId, f: impl FnOnce(&Match) -> R) -> CoreResult<R>;

    /// Scan of match summaries, optionally filtered by status
    fn summaries(&self, status: Option<MatchStatus>) -> Vec<MatchSummary>;
}

/// Process-local store: an index of individually locked match records
#[derive(Default)]
pub struct InMemoryStore {
    matches: RwLock<HashMap<MatchId, Arc<Mutex<Match>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.read().is_empty()
    }

    fn record(&self, match_id: MatchId) -> CoreResult<Arc<Mutex<Match>>> {
        self.matches
            .read()
            .get(&match_id)
            .cloned()
            .ok_or(CoreError::MatchNotFound(match_id))
    }
}

impl MatchStore for InMemoryStore {
    fn insert(&self, record: Match) -> MatchId {
        let id = record.id;
        self.matches.write().insert(id, Arc::new(Mutex::new(record)));
        id
    }

    fn remove(&self, match_id: MatchId) -> Option<Match> {
        let record = self.matches.write().remove(&match_id)?;
        // Wait for any in-flight transaction before handing the record out
        let guard = record.lock();
        Some(guard.clone())
    }

    fn transact<R>(&self, match_id: MatchId, f: impl FnOnce(&mut Match) -> CoreResult<R>) -> CoreResult<R> {
        // The index lock is released before the record lock is taken
        let record = self.record(match_id)?;
        let mut guard = record.lock();
        f(&mut guard)
    }

    fn read<R>(&self, match_id: MatchId, f: impl FnOnce(&Match) -> R) -> CoreResult<R> {
        let record = self.record(match_id)?;
        let guard = record.lock();
        Ok(f(&guard))
    }

    fn summaries(&self, status: Option<MatchStatus>) -> Vec<MatchSummary> {
        let records: Vec<Arc<Mutex<Match>>> = self.matches.read().values().cloned().collect();
        records
            .iter()
            .map(|record| record.lock().summary())
            .filter(|summary| status.map_or(true, |s| summary.status == s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::MatchConfig;
    use rayon::prelude::*;
    use uuid::Uuid;

    #[test]
    fn test_insert_and_read() {
        let store = InMemoryStore::new();
        let id = store.insert(Match::new(MatchConfig::default(), 0));

        let status = store.read(id, |m| m.status).unwrap();
        assert_eq!(status, MatchStatus::Waiting);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_match() {
        let store = InMemoryStore::new();
        let missing = Uuid::new_v4();
        assert_eq!(store.read(missing, |_| ()), Err(CoreError::MatchNotFound(missing)));
        assert!(store.transact(missing, |_| Ok(())).is_err());
    }

    #[test]
    fn test_transact_propagates_errors() {
        let store = InMemoryStore::new();
        let id = store.insert(Match::new(MatchConfig::default(), 0));

        let result: CoreResult<()> = store.transact(id, |m| m.ensure_active());
        assert_eq!(result, Err(CoreError::MatchNotActive(id)));
    }

    #[test]
    fn test_summaries_filter_by_status() {
        let store = InMemoryStore::new();
        store.insert(Match::new(MatchConfig::default(), 0));
        let active = store.insert(Match::new(MatchConfig::default(), 0));
        store.transact(active, |m| m.start(10)).unwrap();

        assert_eq!(store.summaries(None).len(), 2);
        let active_only = store.summaries(Some(MatchStatus::Active));
        assert_eq!(active_only.len(), 1);
        assert_eq!(active_only[0].match_id, active);
    }

    #[test]
    fn test_concurrent_transactions_do_not_lose_updates() {
        let store = InMemoryStore::new();
        let id = store.insert(Match::new(MatchConfig::default(), 0));

        (0..1000u64).into_par_iter().for_each(|_| {
            store
                .transact(id, |m| {
                    m.last_activity_ms += 1;
                    Ok(())
                })
                .unwrap();
        });

        assert_eq!(store.read(id, |m| m.last_activity_ms).unwrap(), 1000);
    }

    #[test]
    fn test_remove() {
        let store = InMemoryStore::new();
        let id = store.insert(Match::new(MatchConfig::default(), 0));
        assert!(store.remove(id).is_some());
        assert!(store.remove(id).is_none());
        assert!(store.is_empty());
    }
}
