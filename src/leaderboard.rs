use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{DEFAULT_LEADERBOARD_LIMIT, MAX_HIGH_SCORES};
use crate::error::LeaderboardError;
use crate::types::{GameSummary, LeaderboardResponse, ScoreEntry, SessionResult};

/// External score sink. Writes are append-only; reads come back ranked by
/// score, highest first.
pub trait LeaderboardStore: Send + Sync {
    fn persist(&self, entry: &ScoreEntry) -> Result<(), LeaderboardError>;
    fn fetch(&self, limit: usize) -> Result<Vec<ScoreEntry>, LeaderboardError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredScore {
    name: String,
    score: f64,
    #[serde(rename = "recordedAtIso", alias = "recorded_at_iso", default)]
    recorded_at_iso: String,
}

#[derive(Clone, Debug, Serialize)]
struct LeaderboardFile<'a> {
    version: u8,
    entries: &'a [StoredScore],
}

#[derive(Clone, Debug, Deserialize)]
struct LeaderboardFileRaw {
    version: u8,
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// JSON file leaderboard (`{"version": 1, "entries": [...]}`), rewritten in
/// full on every append.
pub struct JsonFileLeaderboard {
    file_path: PathBuf,
    entries: Mutex<Vec<StoredScore>>,
}

impl JsonFileLeaderboard {
    /// Loads what it can. A missing, unreadable or foreign file starts an
    /// empty board instead of failing.
    pub fn open(file_path: PathBuf) -> Self {
        let entries = match load_entries(&file_path) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(path = %file_path.display(), %error, "leaderboard load failed, starting empty");
                Vec::new()
            }
        };
        info!(path = %file_path.display(), entries = entries.len(), "leaderboard opened");
        Self {
            file_path,
            entries: Mutex::new(entries),
        }
    }

    fn save(&self, entries: &[StoredScore]) -> Result<(), LeaderboardError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|source| LeaderboardError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(&LeaderboardFile {
            version: 1,
            entries,
        })?;
        fs::write(&self.file_path, text).map_err(|source| LeaderboardError::Io {
            path: self.file_path.clone(),
            source,
        })
    }
}

impl LeaderboardStore for JsonFileLeaderboard {
    fn persist(&self, entry: &ScoreEntry) -> Result<(), LeaderboardError> {
        let stored = sanitize_entry(entry)?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| LeaderboardError::Unavailable("leaderboard lock poisoned".to_string()))?;
        entries.push(stored);
        if let Err(error) = self.save(&entries) {
            entries.pop();
            return Err(error);
        }
        Ok(())
    }

    fn fetch(&self, limit: usize) -> Result<Vec<ScoreEntry>, LeaderboardError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| LeaderboardError::Unavailable("leaderboard lock poisoned".to_string()))?;
        Ok(top_entries(&entries, limit))
    }
}

/// Process-local board, used by headless runs.
#[derive(Default)]
pub struct InMemoryLeaderboard {
    entries: Mutex<Vec<StoredScore>>,
}

impl LeaderboardStore for InMemoryLeaderboard {
    fn persist(&self, entry: &ScoreEntry) -> Result<(), LeaderboardError> {
        let stored = sanitize_entry(entry)?;
        self.entries
            .lock()
            .map_err(|_| LeaderboardError::Unavailable("leaderboard lock poisoned".to_string()))?
            .push(stored);
        Ok(())
    }

    fn fetch(&self, limit: usize) -> Result<Vec<ScoreEntry>, LeaderboardError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| LeaderboardError::Unavailable("leaderboard lock poisoned".to_string()))?;
        Ok(top_entries(&entries, limit))
    }
}

pub fn normalize_limit(requested_limit: Option<usize>) -> usize {
    requested_limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_HIGH_SCORES)
}

pub fn build_response(
    store: &dyn LeaderboardStore,
    requested_limit: Option<usize>,
) -> Result<LeaderboardResponse, LeaderboardError> {
    Ok(LeaderboardResponse {
        generated_at_iso: now_iso(),
        entries: store.fetch(normalize_limit(requested_limit))?,
    })
}

/// Writes the finished session and reads the board back for the result
/// screen. Never fails: store errors turn into a degraded result.
pub fn record_session(
    store: &dyn LeaderboardStore,
    summary: &GameSummary,
    requested_limit: Option<usize>,
) -> SessionResult {
    let entry = ScoreEntry {
        name: summary.player_name.clone(),
        score: summary.final_score,
    };
    let persisted = store.persist(&entry);
    let board = store.fetch(MAX_HIGH_SCORES);
    build_session_result(summary, persisted, board, requested_limit)
}

pub fn build_session_result(
    summary: &GameSummary,
    persisted: Result<(), LeaderboardError>,
    board: Result<Vec<ScoreEntry>, LeaderboardError>,
    requested_limit: Option<usize>,
) -> SessionResult {
    let limit = normalize_limit(requested_limit);
    let failure = match (&persisted, &board) {
        (Err(error), _) | (Ok(()), Err(error)) => Some(error.to_string()),
        _ => None,
    };

    if let Some(error) = failure {
        warn!(player = %summary.player_name, %error, "leaderboard degraded");
        let mut entries = board.unwrap_or_default();
        entries.truncate(limit);
        return SessionResult {
            player_name: summary.player_name.clone(),
            final_score: summary.final_score,
            rank: None,
            entries,
            degraded: true,
            message: format!(
                "Leaderboard unavailable. Final Score: {:.1} kWh",
                summary.final_score
            ),
        };
    }

    let mut entries = board.unwrap_or_default();
    let rank = entries
        .iter()
        .position(|entry| {
            entry.name == summary.player_name && entry.score == summary.final_score
        })
        .map(|index| index + 1);
    entries.truncate(limit);

    let message = match rank {
        Some(rank) => format!(
            "{} placed #{} with {:.1} kWh",
            summary.player_name, rank, summary.final_score
        ),
        None => format!(
            "{} scored {:.1} kWh, outside the top {}",
            summary.player_name, summary.final_score, MAX_HIGH_SCORES
        ),
    };
    SessionResult {
        player_name: summary.player_name.clone(),
        final_score: summary.final_score,
        rank,
        entries,
        degraded: false,
        message,
    }
}

/// Highest score first; equal scores keep their recording order.
fn top_entries(entries: &[StoredScore], limit: usize) -> Vec<ScoreEntry> {
    let mut ranked: Vec<&StoredScore> = entries.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
        .into_iter()
        .take(limit.clamp(1, MAX_HIGH_SCORES))
        .map(|entry| ScoreEntry {
            name: entry.name.clone(),
            score: entry.score,
        })
        .collect()
}

fn sanitize_entry(entry: &ScoreEntry) -> Result<StoredScore, LeaderboardError> {
    let name = entry.name.trim();
    if name.is_empty() {
        return Err(LeaderboardError::InvalidEntry("empty name".to_string()));
    }
    if !entry.score.is_finite() || entry.score < 0.0 {
        return Err(LeaderboardError::InvalidEntry(format!(
            "score {} for {name}",
            entry.score
        )));
    }
    Ok(StoredScore {
        name: name.to_string(),
        score: entry.score,
        recorded_at_iso: now_iso(),
    })
}

fn load_entries(path: &Path) -> Result<Vec<StoredScore>, LeaderboardError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(LeaderboardError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let parsed: LeaderboardFileRaw = serde_json::from_str(&text)?;
    if parsed.version != 1 {
        return Err(LeaderboardError::UnsupportedVersion {
            version: parsed.version,
            path: path.to_path_buf(),
        });
    }

    let mut entries = Vec::with_capacity(parsed.entries.len());
    for (index, raw_value) in parsed.entries.into_iter().enumerate() {
        let stored: StoredScore = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(path = %path.display(), index, %error, "skipping unreadable leaderboard entry");
                continue;
            }
        };
        let name = stored.name.trim();
        if name.is_empty() || !stored.score.is_finite() || stored.score < 0.0 {
            warn!(path = %path.display(), index, "skipping invalid leaderboard entry");
            continue;
        }
        entries.push(StoredScore {
            name: name.to_string(),
            score: stored.score,
            recorded_at_iso: stored.recorded_at_iso,
        });
    }
    Ok(entries)
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl LeaderboardStore for BrokenStore {
        fn persist(&self, _entry: &ScoreEntry) -> Result<(), LeaderboardError> {
            Err(LeaderboardError::Unavailable("offline".to_string()))
        }

        fn fetch(&self, _limit: usize) -> Result<Vec<ScoreEntry>, LeaderboardError> {
            Err(LeaderboardError::Unavailable("offline".to_string()))
        }
    }

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            rand::random::<u32>()
        );
        std::env::temp_dir().join(unique).join("leaderboard.json")
    }

    fn entry(name: &str, score: f64) -> ScoreEntry {
        ScoreEntry {
            name: name.to_string(),
            score,
        }
    }

    fn summary(name: &str, score: f64) -> GameSummary {
        GameSummary {
            player_name: name.to_string(),
            final_score: score,
            duration_ms: 60_000,
            evs_completed: 2,
            penalties: 0,
            bonus_windows: 0,
            rapid_seconds_used: 0,
        }
    }

    #[test]
    fn persisted_scores_survive_reopen_in_rank_order() {
        let path = temp_file("leaderboard-reopen");
        let store = JsonFileLeaderboard::open(path.clone());
        store.persist(&entry("Alice", 12.5)).expect("persist alice");
        store.persist(&entry("Bob", 40.0)).expect("persist bob");
        store.persist(&entry("Carol", 12.5)).expect("persist carol");

        let reopened = JsonFileLeaderboard::open(path.clone());
        let top = reopened.fetch(10).expect("fetch");
        let names: Vec<&str> = top.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Alice", "Carol"]);

        let _ = fs::remove_dir_all(path.parent().expect("parent exists"));
    }

    #[test]
    fn fetch_limit_is_clamped() {
        let store = InMemoryLeaderboard::default();
        for idx in 0..3 {
            store
                .persist(&entry(&format!("P{idx}"), idx as f64))
                .expect("persist");
        }
        assert_eq!(store.fetch(0).expect("fetch").len(), 1);
        assert_eq!(store.fetch(2).expect("fetch").len(), 2);
        assert_eq!(store.fetch(999).expect("fetch").len(), 3);
        assert_eq!(normalize_limit(None), DEFAULT_LEADERBOARD_LIMIT);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(5_000)), MAX_HIGH_SCORES);
    }

    #[test]
    fn board_never_returns_more_than_the_cap() {
        let store = InMemoryLeaderboard::default();
        for idx in 0..(MAX_HIGH_SCORES + 20) {
            store
                .persist(&entry(&format!("P{idx}"), idx as f64))
                .expect("persist");
        }
        let top = store.fetch(MAX_HIGH_SCORES).expect("fetch");
        assert_eq!(top.len(), MAX_HIGH_SCORES);
        assert_eq!(top[0].score, (MAX_HIGH_SCORES + 19) as f64);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let store = InMemoryLeaderboard::default();
        assert!(matches!(
            store.persist(&entry("  ", 3.0)),
            Err(LeaderboardError::InvalidEntry(_))
        ));
        assert!(matches!(
            store.persist(&entry("Nan", f64::NAN)),
            Err(LeaderboardError::InvalidEntry(_))
        ));
        assert!(store.fetch(10).expect("fetch").is_empty());
    }

    #[test]
    fn load_skips_invalid_entries_and_keeps_valid_ones() {
        let path = temp_file("leaderboard-partial-load");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        let raw = r#"{
  "version": 1,
  "entries": [
    { "name": "Alice", "score": 30.5, "recordedAtIso": "2025-01-01T00:00:00.000Z" },
    { "name": "Broken" },
    { "name": "   ", "score": 99.0 },
    { "name": "Negative", "score": -4.0 },
    { "name": " Bob ", "score": 10.0 }
  ]
}"#;
        fs::write(&path, raw).expect("write file");

        let store = JsonFileLeaderboard::open(path.clone());
        let top = store.fetch(10).expect("fetch");
        assert_eq!(top, vec![entry("Alice", 30.5), entry("Bob", 10.0)]);

        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn unsupported_version_is_reported() {
        let path = temp_file("leaderboard-version");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        fs::write(&path, r#"{"version": 2, "entries": []}"#).expect("write file");

        assert!(matches!(
            load_entries(&path),
            Err(LeaderboardError::UnsupportedVersion { version: 2, .. })
        ));
        assert!(JsonFileLeaderboard::open(path.clone())
            .fetch(10)
            .expect("fetch")
            .is_empty());

        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn session_result_reports_rank() {
        let store = InMemoryLeaderboard::default();
        store.persist(&entry("Alice", 50.0)).expect("persist");
        store.persist(&entry("Bob", 5.0)).expect("persist");

        let result = record_session(&store, &summary("Carol", 20.0), Some(10));
        assert!(!result.degraded);
        assert_eq!(result.rank, Some(2));
        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.message, "Carol placed #2 with 20.0 kWh");
    }

    #[test]
    fn store_failure_degrades_without_losing_the_score() {
        let result = record_session(&BrokenStore, &summary("Dana", 33.3), None);
        assert!(result.degraded);
        assert_eq!(result.rank, None);
        assert!(result.entries.is_empty());
        assert_eq!(result.final_score, 33.3);
        assert_eq!(result.message, "Leaderboard unavailable. Final Score: 33.3 kWh");
    }

    #[test]
    fn response_uses_default_limit() {
        let store = InMemoryLeaderboard::default();
        for idx in 0..15 {
            store
                .persist(&entry(&format!("P{idx}"), idx as f64))
                .expect("persist");
        }
        let response = build_response(&store, None).expect("response");
        assert_eq!(response.entries.len(), DEFAULT_LEADERBOARD_LIMIT);
        assert!(response.generated_at_iso.ends_with('Z'));
        assert!(build_response(&BrokenStore, Some(3)).is_err());
    }
}
