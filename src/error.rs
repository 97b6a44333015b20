//! Error types for session control and leaderboard I/O.
//!
//! Demand overage is deliberately absent here: it is a game-state transition
//! (penalty cooldown), never an error.

use std::path::PathBuf;

/// Rejections from [`GameSession::start`](crate::engine::GameSession::start).
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The player name was empty or whitespace only.
    #[error("player name must not be empty")]
    EmptyPlayerName,

    /// A session is already running or waiting on the game-over screen.
    #[error("session can only start from idle")]
    NotIdle,
}

/// Player commands that were refused and left the session untouched.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("no session is running")]
    NotRunning,

    #[error("charging is disabled during penalty cooldown")]
    PenaltyActive,

    #[error("normal charging is unavailable while rapid charging")]
    RapidActive,

    #[error("rapid charge budget is used up for this session")]
    RapidExhausted,
}

/// Failures of the external leaderboard store.
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("leaderboard i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("leaderboard serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid leaderboard entry: {0}")]
    InvalidEntry(String),

    #[error("unsupported leaderboard version {version} at {path}")]
    UnsupportedVersion { version: u8, path: PathBuf },

    #[error("leaderboard store is unavailable: {0}")]
    Unavailable(String),
}
