//! Score ledger adapter boundary.
//!
//! The ledger maps player id to cumulative score in a store separate from
//! the session records. Updates are not transactional with each other or
//! with session writes; the session manager applies them exactly once per
//! winning outcome, guarded by the record's `settled` flag.

use crate::model::PlayerId;
use crate::store::StoreError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// Keyed cumulative-score store.
#[async_trait::async_trait]
pub trait ScoreLedger: Send + Sync {
    /// Reads a player's cumulative score; absent players score 0.
    async fn score(&self, player_id: &str) -> Result<i64, StoreError>;

    /// Unconditionally overwrites a player's cumulative score.
    async fn set_score(&self, player_id: &str, score: i64) -> Result<(), StoreError>;
}

/// In-process [`ScoreLedger`] for tests and single-process use.
///
/// Clones share one underlying map.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    scores: Arc<Mutex<HashMap<PlayerId, i64>>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// All scores, highest first. Ties order by player id for stability.
    #[instrument(skip(self))]
    pub fn standings(&self) -> Vec<(PlayerId, i64)> {
        let scores = self.scores.lock().unwrap();
        let mut standings: Vec<_> = scores.iter().map(|(id, &s)| (id.clone(), s)).collect();
        standings.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        standings
    }
}

#[async_trait::async_trait]
impl ScoreLedger for MemoryLedger {
    #[instrument(skip(self))]
    async fn score(&self, player_id: &str) -> Result<i64, StoreError> {
        let scores = self.scores.lock().unwrap();
        Ok(scores.get(player_id).copied().unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn set_score(&self, player_id: &str, score: i64) -> Result<(), StoreError> {
        let mut scores = self.scores.lock().unwrap();
        scores.insert(player_id.to_string(), score);
        debug!(player_id, score, "Score updated");
        Ok(())
    }
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger").finish_non_exhaustive()
    }
}
