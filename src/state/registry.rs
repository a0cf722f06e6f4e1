//! Process-wide store of live matches keyed by join code.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use rand::Rng;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::state::game::Match;

/// Characters a join code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ123456789";
/// Length of a join code.
pub const CODE_LENGTH: usize = 8;

/// A join code is already bound to a live match.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("match code `{0}` is already in use")]
pub struct CodeConflict(pub String);

/// Exclusive access point to one live match. Every command on the match runs
/// while holding the inner guard.
#[derive(Debug)]
pub struct MatchHandle {
    code: String,
    game: Mutex<Match>,
}

impl MatchHandle {
    fn new(code: String, game: Match) -> Self {
        Self {
            code,
            game: Mutex::new(game),
        }
    }

    /// Join code the handle is registered under.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Wait for exclusive access to the match.
    pub async fn lock(&self) -> MutexGuard<'_, Match> {
        self.game.lock().await
    }
}

/// Concurrent map of join code to live match.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    matches: DashMap<String, Arc<MatchHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `game` under `code` unless the code is taken.
    pub fn put(&self, code: &str, game: Match) -> Result<Arc<MatchHandle>, CodeConflict> {
        match self.matches.entry(code.to_owned()) {
            Entry::Occupied(entry) => Err(CodeConflict(entry.key().clone())),
            Entry::Vacant(entry) => {
                let handle = Arc::new(MatchHandle::new(code.to_owned(), game));
                entry.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Look a live match up by code.
    pub fn get(&self, code: &str) -> Option<Arc<MatchHandle>> {
        self.matches.get(code).map(|entry| entry.value().clone())
    }

    /// Drop a match from the registry.
    pub fn remove(&self, code: &str) -> Option<Arc<MatchHandle>> {
        self.matches.remove(code).map(|(_, handle)| handle)
    }

    /// Number of live matches.
    pub fn count(&self) -> usize {
        self.matches.len()
    }

    /// Handles of every live match.
    pub fn all(&self) -> Vec<Arc<MatchHandle>> {
        self.matches
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Draw a random join code.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
