//! Persisted session record document.
//!
//! This is the contract with everything downstream of the recorder: the
//! on-disk JSON files, the collector payload, and any future reader. Wire
//! names are camelCase and fixed; absent optional fields deserialize to
//! defaults so an older record never breaks a newer reader.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::signal::PlayerId;
use crate::signal::Team;

/// Version stamp written into every record. Bump on breaking shape changes.
pub const SCHEMA_VERSION: u32 = 1;

/// One finished session, frozen at session end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub schema_version: u32,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub players: Vec<PlayerRecord>,
    #[serde(default)]
    pub events: Vec<SessionEvent>,
    #[serde(default)]
    pub winner: WinnerInfo,
    #[serde(default)]
    pub statistics: SessionStats,
}

impl SessionRecord {
    pub fn new(session_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session_id,
            started_at,
            metadata: SessionMetadata::default(),
            players: Vec::new(),
            events: Vec::new(),
            winner: WinnerInfo::default(),
            statistics: SessionStats::default(),
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.player_id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerRecord> {
        self.players.iter_mut().find(|p| p.player_id == id)
    }
}

/// Static facts about the session plus running counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionMetadata {
    pub map_name: String,
    pub game_mode: String,
    pub player_count: u32,
    pub duration_seconds: u64,
    pub meeting_count: u32,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub recorder_version: String,
}

/// Cause classification for a non-alive player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Unknown,
    Killed,
    Ejected,
    Suicide,
    Disconnected,
}

/// Current known truth about one player.
///
/// Unlike the event log this projection is mutable for the session's
/// lifetime: later, higher-confidence evidence may patch the attribution
/// fields in place. `is_alive` only ever flips true to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub player_name: String,
    #[serde(default)]
    pub color_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub team: Team,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
    #[serde(default = "default_true")]
    pub is_alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_cause: Option<DeathCause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub killed_by: Option<String>,
    /// Seconds since session start, same clock as event timestamps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_time: Option<f64>,
    #[serde(default)]
    pub kill_count: u32,
    #[serde(default)]
    pub tasks_completed: u32,
    #[serde(default)]
    pub total_tasks: u32,
    #[serde(default)]
    pub was_ejected: bool,
}

impl PlayerRecord {
    pub fn new(player_id: PlayerId, player_name: String) -> Self {
        Self {
            player_id,
            player_name,
            color_name: String::new(),
            role: "Crewmate".to_string(),
            team: Team::Crewmate,
            modifiers: Vec::new(),
            is_alive: true,
            death_cause: None,
            kill_type: None,
            killed_by: None,
            death_time: None,
            kill_count: 0,
            tasks_completed: 0,
            total_tasks: 0,
            was_ejected: false,
        }
    }
}

/// Kind tag of an appended session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    PlayerKilled,
    PlayerEjected,
    EmergencyMeeting,
    BodyReported,
}

/// One canonical fact in the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub kind: EventKind,
    /// Seconds since session start; non-decreasing by insertion order.
    pub timestamp: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub involved_players: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Winning side of a finished session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WinnerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_team: Option<Team>,
    pub win_condition: String,
    pub winners: Vec<String>,
}

/// Aggregates computed once at session end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStats {
    pub total_kills: u32,
    pub total_deaths: u32,
    pub total_ejections: u32,
    /// completed / total tasks, 0.0 when no tasks exist. Always in [0, 1].
    pub task_completion_rate: f64,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn minimal_record_deserializes_with_defaults() {
        let raw = r#"{
            "sessionId": "0a0b0c0d-0000-0000-0000-000000000001",
            "startedAt": "2025-04-02T19:01:00Z"
        }"#;
        let record: SessionRecord = serde_json::from_str(raw).expect("parse minimal record");

        assert_eq!(record.schema_version, 0);
        assert!(record.players.is_empty());
        assert!(record.events.is_empty());
        assert_eq!(record.winner.winning_team, None);
        assert_eq!(record.statistics.total_kills, 0);
        assert_eq!(record.metadata.map_name, "");
    }

    #[test]
    fn player_defaults_to_alive_when_field_is_absent() {
        let raw = r#"{"playerId": 4, "playerName": "Coral"}"#;
        let player: PlayerRecord = serde_json::from_str(raw).expect("parse minimal player");

        assert!(player.is_alive);
        assert_eq!(player.killed_by, None);
        assert_eq!(player.kill_count, 0);
    }

    #[test]
    fn wire_names_are_camel_case_and_none_fields_are_skipped() {
        let mut record = SessionRecord::new(Uuid::nil(), DateTime::<Utc>::UNIX_EPOCH);
        record.players.push(PlayerRecord::new(
            crate::signal::PlayerId(1),
            "Alice".to_string(),
        ));

        let value = serde_json::to_value(&record).expect("encode record");
        assert!(value.get("sessionId").is_some());
        assert!(value.get("startedAt").is_some());
        assert_eq!(value["schemaVersion"], SCHEMA_VERSION);

        let player = &value["players"][0];
        assert!(player.get("playerName").is_some());
        assert!(player.get("isAlive").is_some());
        assert!(player.get("killedBy").is_none());
        assert!(player.get("deathCause").is_none());
    }
}
