// profile.rs — Per-port record of the last successfully flashed map
//
// The store is an ordinary owned object: the upload orchestrator writes it,
// the host client reads it, and tests can create as many as they like.
// Entries are replaced whole and never merged.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::comm_map::CommMap;

/// What was flashed on a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub port: String,
    /// Board target identifier (e.g. an FQBN such as `arduino:avr:uno`).
    pub board: String,
    pub map: CommMap,
    /// Hex SHA-256 of the map's canonical JSON.
    pub map_fingerprint: String,
}

/// Process-wide port → profile table.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<String, Arc<Profile>>>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the profile for `profile.port`. Returns the previous one.
    pub fn insert(&self, profile: Profile) -> Option<Arc<Profile>> {
        let port = profile.port.clone();
        info!(
            port = %port,
            board = %profile.board,
            variables = profile.map.len(),
            "profile stored"
        );
        self.profiles.write().insert(port, Arc::new(profile))
    }

    pub fn get(&self, port: &str) -> Option<Arc<Profile>> {
        self.profiles.read().get(port).cloned()
    }

    /// Ports with a profile, sorted.
    pub fn ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.profiles.read().keys().cloned().collect();
        ports.sort();
        ports
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}
