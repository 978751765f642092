//! Tracking mode state machine.
//!
//! One process-wide value: either face mode (the default) or object mode
//! with the raw target name the caller supplied. A single mutex guards the
//! whole value, so readers always observe a consistent mode/name pair; the
//! critical sections are plain copies, never inference.

use std::sync::Mutex;

use anyhow::{anyhow, Result};

/// Current tracking target. Object mode always carries a non-empty name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackingTarget {
    Face,
    Object(String),
}

impl TrackingTarget {
    /// The stored raw target name, if in object mode.
    pub fn target_name(&self) -> Option<&str> {
        match self {
            TrackingTarget::Face => None,
            TrackingTarget::Object(name) => Some(name),
        }
    }

}

/// Process-wide tracking state, mutated only by explicit set/clear calls.
pub struct TrackingState {
    target: Mutex<TrackingTarget>,
}

impl TrackingState {
    /// Starts in face mode.
    pub fn new() -> Self {
        Self {
            target: Mutex::new(TrackingTarget::Face),
        }
    }

    /// Switch to object mode, replacing any prior target unconditionally.
    /// Empty or whitespace-only names are rejected.
    pub fn set_target(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("target name must not be empty"));
        }
        let mut guard = self
            .target
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = TrackingTarget::Object(name.to_string());
        Ok(name.to_string())
    }

    /// Back to face mode. Idempotent; forgets any stored name.
    pub fn clear(&self) {
        let mut guard = self
            .target
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = TrackingTarget::Face;
    }

    /// Atomic snapshot of the current mode and name.
    pub fn snapshot(&self) -> TrackingTarget {
        self.target
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::new()
    }
}
