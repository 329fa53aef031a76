//! Process identity within a multi-process training job.

use serde::{Deserialize, Serialize};

/// Whether this process is the coordinator (rank 0) or a worker.
///
/// Decided once at startup and injected into each callback; only the
/// coordinator evaluates, logs reports, and writes backbone files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    Coordinator,
    Worker,
}

impl ProcessRole {
    /// Rank 0 coordinates; every other rank is a worker.
    pub fn from_rank(rank: usize) -> Self {
        if rank == 0 {
            Self::Coordinator
        } else {
            Self::Worker
        }
    }

    pub fn is_coordinator(self) -> bool {
        self == Self::Coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rank() {
        assert_eq!(ProcessRole::from_rank(0), ProcessRole::Coordinator);
        assert_eq!(ProcessRole::from_rank(3), ProcessRole::Worker);
        assert!(ProcessRole::from_rank(0).is_coordinator());
        assert!(!ProcessRole::from_rank(1).is_coordinator());
    }
}
