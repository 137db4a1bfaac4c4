//! App registry: the process-wide map from app id to live session.
//!
//! # Responsibilities
//! - Allocate short human-readable app ids
//! - Insert-if-absent registration; duplicate ids are rejected
//! - Read-mostly lookup on every proxied request
//!
//! # Design Decisions
//! - Reader/writer lock: the proxy plane only ever takes the read side
//! - Id allocation probes the map and retries; the insert stays
//!   insert-if-absent so a lost race cannot clobber a live session

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rand::Rng;
use thiserror::Error;

use crate::server::session::AppSession;

/// Attempts at a fresh id before registration gives up.
const ALLOCATE_ATTEMPTS: usize = 3;

const TOKEN_LEN: usize = 5;
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

const ADJECTIVES: &[&str] = &[
    "bold", "calm", "cold", "dawn", "deep", "dry", "dusty", "faint", "late", "lone", "misty",
    "pale", "quiet", "slow", "soft", "still", "warm", "wild",
];

const NOUNS: &[&str] = &[
    "ash", "bird", "brook", "cloud", "fern", "fog", "leaf", "moon", "moss", "pine", "rain",
    "reed", "sea", "sky", "snow", "star", "stone", "wave",
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("app with id {0} already exists")]
    AlreadyExists(String),
    #[error("could not allocate a free app id after {0} attempts")]
    Exhausted(usize),
}

/// Thread-safe map of registered apps.
#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: RwLock<HashMap<String, Arc<AppSession>>>,
}

impl AppRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a session under its app id. Fails when the id is taken.
    pub fn insert(&self, session: Arc<AppSession>) -> Result<(), RegistryError> {
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());

        let app_id = session.app_id().to_string();
        if apps.contains_key(&app_id) {
            return Err(RegistryError::AlreadyExists(app_id));
        }

        apps.insert(app_id, session);
        Ok(())
    }

    pub fn get(&self, app_id: &str) -> Option<Arc<AppSession>> {
        let apps = self.apps.read().unwrap_or_else(|e| e.into_inner());
        apps.get(app_id).cloned()
    }

    /// Remove a registration. No-op when the id is absent.
    pub fn delete(&self, app_id: &str) {
        let mut apps = self.apps.write().unwrap_or_else(|e| e.into_inner());
        apps.remove(app_id);
    }

    pub fn contains(&self, app_id: &str) -> bool {
        let apps = self.apps.read().unwrap_or_else(|e| e.into_inner());
        apps.contains_key(app_id)
    }

    pub fn len(&self) -> usize {
        self.apps.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick an app id not currently registered. Collisions are vanishingly
    /// rare given the token space, so a few attempts suffice.
    pub fn allocate_app_id(&self) -> Result<String, RegistryError> {
        for _ in 0..ALLOCATE_ATTEMPTS {
            let candidate = random_app_id();
            if !self.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(RegistryError::Exhausted(ALLOCATE_ATTEMPTS))
    }
}

/// `<adjective>-<noun>-<token>`, e.g. `bold-sky-a1b2c`.
pub fn random_app_id() -> String {
    let mut rng = rand::thread_rng();

    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];

    let token: String = (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();

    format!("{adjective}-{noun}-{token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_id_shape() {
        let id = random_app_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(NOUNS.contains(&parts[1]));
        assert_eq!(parts[2].len(), TOKEN_LEN);
        assert!(parts[2]
            .bytes()
            .all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_allocate_avoids_live_ids() {
        let registry = AppRegistry::new();
        let id = registry.allocate_app_id().unwrap();
        assert!(!registry.contains(&id));
    }
}
