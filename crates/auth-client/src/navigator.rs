//! Login navigation signal
//!
//! The coordinator never performs navigation itself; it tells a `Navigator`
//! where the user should go once a session cannot be recovered.

use std::sync::{Mutex, PoisonError};

use tracing::info;

/// Receives the "send the user to the login page" side effect.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator that remembers every requested navigation.
///
/// Front ends poll it after a failed call to decide whether to show the login
/// screen.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All navigations requested so far, oldest first.
    pub fn visits(&self) -> Vec<String> {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent navigation target, if any.
    pub fn last(&self) -> Option<String> {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        info!(path, "navigating to login");
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}
