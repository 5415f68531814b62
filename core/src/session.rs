//! In-progress session aggregate.
//!
//! Exactly one `ActiveSession` exists while the recorder is active, and the
//! recorder is its only writer; ingest runs on the host's serialized
//! callback context, so the aggregate needs no internal locking. The
//! append-only event log and the mutable player projection both live here,
//! together with the dedup registries scoped to this session.
//!
//! The event log is immutable after insertion. "Current truth about a
//! player" is the separate [`PlayerRecord`] projection, which later evidence
//! may patch; aggregates derived from it (kill counts, statistics) are
//! always recomputed from projection state, never kept as running counters.

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use crewlog_protocol::DeathCause;
use crewlog_protocol::EndReason;
use crewlog_protocol::EventKind;
use crewlog_protocol::MatchInfo;
use crewlog_protocol::PlayerId;
use crewlog_protocol::PlayerRecord;
use crewlog_protocol::RosterEntry;
use crewlog_protocol::SessionEvent;
use crewlog_protocol::SessionRecord;
use crewlog_protocol::SessionStats;
use crewlog_protocol::Team;
use crewlog_protocol::WinnerInfo;
use uuid::Uuid;

pub(crate) struct ActiveSession {
    record: SessionRecord,
    /// Monotonic epoch for session-relative timestamps; wall clock is only
    /// sampled once, for `started_at`.
    epoch: Instant,
    counted_tasks: HashSet<(PlayerId, u32)>,
    recorded_deaths: HashSet<PlayerId>,
}

impl ActiveSession {
    pub(crate) fn new(info: MatchInfo, recorder_version: &str) -> Self {
        let mut record = SessionRecord::new(Uuid::new_v4(), Utc::now());
        record.metadata.map_name = info.map;
        record.metadata.game_mode = info.mode;
        record.metadata.recorder_version = recorder_version.to_string();
        Self {
            record,
            epoch: Instant::now(),
            counted_tasks: HashSet::new(),
            recorded_deaths: HashSet::new(),
        }
    }

    pub(crate) fn session_id(&self) -> Uuid {
        self.record.session_id
    }

    pub(crate) fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub(crate) fn players(&self) -> &[PlayerRecord] {
        &self.record.players
    }

    pub(crate) fn elapsed_seconds(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub(crate) fn capture_roster(&mut self, players: &[RosterEntry]) {
        for entry in players {
            self.upsert_player(entry);
        }
        self.record.metadata.player_count = players.len() as u32;
    }

    /// Id-keyed upsert: a repeated roster signal updates fields in place
    /// instead of duplicating records. Names are not assumed unique.
    pub(crate) fn upsert_player(&mut self, entry: &RosterEntry) {
        match self.record.player_mut(entry.player_id) {
            Some(player) => {
                if !entry.name.is_empty() {
                    player.player_name = entry.name.clone();
                }
                if !entry.color.is_empty() {
                    player.color_name = entry.color.clone();
                }
                if entry.total_tasks > 0 {
                    player.total_tasks = entry.total_tasks;
                }
            }
            None => {
                let mut player = PlayerRecord::new(entry.player_id, entry.name.clone());
                player.color_name = entry.color.clone();
                player.total_tasks = entry.total_tasks;
                self.record.players.push(player);
            }
        }
    }

    /// Fetches the record for `id`, creating a placeholder if a signal about
    /// this player arrives before the roster does.
    fn ensure_player(&mut self, id: PlayerId) -> &mut PlayerRecord {
        let idx = match self.record.players.iter().position(|p| p.player_id == id) {
            Some(idx) => idx,
            None => {
                self.record.players.push(PlayerRecord::new(id, format!("Player {id}")));
                self.record.players.len() - 1
            }
        };
        &mut self.record.players[idx]
    }

    pub(crate) fn assign_role(
        &mut self,
        id: PlayerId,
        role: String,
        team: Team,
        modifiers: Vec<String>,
    ) {
        let player = self.ensure_player(id);
        player.role = role;
        player.team = team;
        if !modifiers.is_empty() {
            player.modifiers = modifiers;
        }
    }

    pub(crate) fn is_death_recorded(&self, id: PlayerId) -> bool {
        self.recorded_deaths.contains(&id)
    }

    /// Marks a player dead. Returns false when this victim's death was
    /// already recorded; the alive flag never flips back to true.
    pub(crate) fn record_death(
        &mut self,
        id: PlayerId,
        cause: DeathCause,
        kill_type: Option<String>,
        killed_by: Option<String>,
    ) -> bool {
        if !self.recorded_deaths.insert(id) {
            return false;
        }
        let death_time = self.elapsed_seconds();
        let ejected = cause == DeathCause::Ejected;
        let player = self.ensure_player(id);
        player.is_alive = false;
        player.death_cause = Some(cause);
        player.kill_type = kill_type;
        player.killed_by = killed_by;
        player.death_time = Some(death_time);
        if ejected {
            player.was_ejected = true;
        }
        true
    }

    /// Retroactively patches the attribution fields of an already-recorded
    /// death. Mutates the projection only; no event is appended.
    pub(crate) fn patch_attribution(&mut self, id: PlayerId, kill_type: String, killed_by: String) {
        let player = self.ensure_player(id);
        player.kill_type = Some(kill_type);
        player.killed_by = Some(killed_by);
        if player.death_cause == Some(DeathCause::Unknown) {
            player.death_cause = Some(DeathCause::Killed);
        }
    }

    /// Re-derives every player's kill count from the current set of
    /// (victim → killed-by) mappings. Idempotent and order-independent, so
    /// retroactive patches can never double-count.
    pub(crate) fn recompute_kill_counts(&mut self) {
        let counts: Vec<u32> = self
            .record
            .players
            .iter()
            .map(|killer| {
                self.record
                    .players
                    .iter()
                    .filter(|victim| victim.killed_by.as_deref() == Some(killer.player_name.as_str()))
                    .count() as u32
            })
            .collect();
        for (player, count) in self.record.players.iter_mut().zip(counts) {
            player.kill_count = count;
        }
    }

    /// Counts a fully-completed task once per (player, task) pair. Signals
    /// from impostor-aligned or already-dead players never count.
    pub(crate) fn count_task(&mut self, id: PlayerId, task_id: u32) -> bool {
        let Some(player) = self.record.player(id) else {
            return false;
        };
        if !player.is_alive || player.team == Team::Impostor {
            return false;
        }
        if !self.counted_tasks.insert((id, task_id)) {
            return false;
        }
        if let Some(player) = self.record.player_mut(id) {
            player.tasks_completed += 1;
        }
        true
    }

    pub(crate) fn record_meeting(&mut self) {
        self.record.metadata.meeting_count += 1;
    }

    pub(crate) fn push_event(
        &mut self,
        kind: EventKind,
        description: String,
        involved_players: Vec<String>,
        details: Option<serde_json::Value>,
    ) {
        let timestamp = self.elapsed_seconds();
        self.record.events.push(SessionEvent {
            kind,
            timestamp,
            description,
            involved_players,
            details,
        });
    }

    pub(crate) fn player_name(&self, id: PlayerId) -> String {
        self.record
            .player(id)
            .map(|p| p.player_name.clone())
            .unwrap_or_else(|| format!("Player {id}"))
    }

    pub(crate) fn role_of(&self, name: &str) -> Option<&str> {
        self.record
            .players
            .iter()
            .find(|p| p.player_name == name)
            .map(|p| p.role.as_str())
    }

    /// Freezes the aggregate at session end: resolves outstanding metadata,
    /// computes the winner and statistics, and yields the immutable record.
    pub(crate) fn freeze(mut self, reason: &EndReason) -> SessionRecord {
        self.recompute_kill_counts();
        self.record.metadata.duration_seconds = self.epoch.elapsed().as_secs();
        if self.record.metadata.player_count == 0 {
            self.record.metadata.player_count = self.record.players.len() as u32;
        }
        self.record.metadata.total_tasks =
            self.record.players.iter().map(|p| p.total_tasks).sum();
        self.record.metadata.completed_tasks =
            self.record.players.iter().map(|p| p.tasks_completed).sum();
        self.record.winner = compute_winner(&self.record.players, reason);
        self.record.statistics = compute_stats(
            &self.record.players,
            self.record.metadata.completed_tasks,
            self.record.metadata.total_tasks,
        );
        self.record
    }
}

/// Terminal-reason precedence: a third-party win names the players holding
/// the winning role; otherwise the roster is the whole winning team.
fn compute_winner(players: &[PlayerRecord], reason: &EndReason) -> WinnerInfo {
    let winning_team = reason.winning_team();
    let winners = match reason {
        EndReason::ThirdPartyWin { role } => {
            let needle = role.to_lowercase();
            players
                .iter()
                .filter(|p| p.role.to_lowercase().contains(&needle))
                .map(|p| p.player_name.clone())
                .collect()
        }
        _ => players
            .iter()
            .filter(|p| p.team == winning_team)
            .map(|p| p.player_name.clone())
            .collect(),
    };
    WinnerInfo {
        winning_team: Some(winning_team),
        win_condition: reason.condition(),
        winners,
    }
}

fn compute_stats(players: &[PlayerRecord], completed_tasks: u32, total_tasks: u32) -> SessionStats {
    let rate = if total_tasks == 0 {
        0.0
    } else {
        f64::from(completed_tasks) / f64::from(total_tasks)
    };
    SessionStats {
        total_kills: players.iter().map(|p| p.kill_count).sum(),
        total_deaths: players.iter().filter(|p| !p.is_alive).count() as u32,
        total_ejections: players.iter().filter(|p| p.was_ejected).count() as u32,
        task_completion_rate: rate.clamp(0.0, 1.0),
    }
}
