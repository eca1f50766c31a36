//! Status enums for connectivity and the offline worker lifecycle.

use serde::{Deserialize, Serialize};

/// Network connectivity as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityStatus {
    Online,
    Offline,
}

impl ConnectivityStatus {
    /// Map a boolean "online" flag to a status.
    #[must_use]
    pub const fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }

    /// Whether the status is `Online`.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl std::fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Lifecycle of the offline worker.
///
/// ```text
/// Parsed -> Installing -> Installed -> Activating -> Activated
///               \-> Redundant (install failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    /// Whether the worker may handle fetch, sync and push events.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Activated)
    }

    /// Whether moving to `next` is a legal lifecycle step.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Parsed, Self::Installing)
                | (Self::Installing, Self::Installed | Self::Redundant)
                | (Self::Installed, Self::Activating | Self::Redundant)
                | (Self::Activating, Self::Activated | Self::Redundant)
                | (Self::Activated, Self::Redundant)
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_from_online() {
        assert_eq!(ConnectivityStatus::from_online(true), ConnectivityStatus::Online);
        assert!(!ConnectivityStatus::from_online(false).is_online());
    }

    #[test]
    fn test_worker_lifecycle_happy_path() {
        let path = [
            WorkerState::Parsed,
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
        ];
        for pair in path.windows(2) {
            if let [from, to] = pair {
                assert!(from.can_transition_to(*to), "{from} -> {to}");
            }
        }
        assert!(WorkerState::Activated.is_active());
    }

    #[test]
    fn test_worker_lifecycle_rejects_backwards() {
        assert!(!WorkerState::Activated.can_transition_to(WorkerState::Installing));
        assert!(!WorkerState::Redundant.can_transition_to(WorkerState::Activated));
        assert!(!WorkerState::Parsed.can_transition_to(WorkerState::Activated));
    }
}
