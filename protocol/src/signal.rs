//! Inbound signal vocabulary produced by the instrumentation layer.
//!
//! Signals are raw notifications of something that happened in the host
//! process. They can be redundant (several sources describe the same death),
//! out of order (a kill confirmation can precede the death itself), or
//! absent entirely. The recorder deduplicates and resolves them into
//! canonical session facts; nothing here is trusted to arrive exactly once.
//!
//! The serde form doubles as the line format of a captured signal log, which
//! `crewlog replay` feeds back through a recorder.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Stable per-session player identifier assigned by the host.
///
/// Player *names* are not guaranteed unique, so every signal that refers to
/// a specific player carries this id instead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PlayerId(pub u8);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Team classification of a player.
///
/// `Neutral` covers every role outside the two default teams, including
/// neutral-killer roles that are kill-eligible for attribution purposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    #[default]
    Crewmate,
    Impostor,
    Neutral,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Team::Crewmate => "Crewmate",
            Team::Impostor => "Impostor",
            Team::Neutral => "Neutral",
        };
        f.write_str(name)
    }
}

/// Reason carried by the generic death signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathReason {
    /// An ordinary kill; the killer is unknown to this signal.
    Kill,
    /// Self-inflicted (some roles can die to their own ability).
    Suicide,
    /// The player left mid-session.
    Disconnect,
    /// The host gave no usable reason.
    Unknown,
}

/// Relative trust placed in an evidence shape when resolving a death.
///
/// Ordering matters: a higher-confidence source supersedes what a lower one
/// recorded, never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// One piece of evidence about a player's death.
///
/// Several independent host sources can describe the same death; each maps
/// to one variant here so the resolver ranks them in a single place instead
/// of scattering priority logic across handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeathEvidence {
    /// Direct kill notification: killer and victim are certain, the cause
    /// label sometimes missing.
    ExplicitKill {
        killer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
    /// Kill notification from an extended role system, carrying that
    /// system's own cause vocabulary. Arrives before *or* after the death.
    CustomKill { killer: String, cause: String },
    /// The death itself. Always fires, but alone names no killer.
    GenericDeath { reason: DeathReason },
}

impl DeathEvidence {
    pub fn confidence(&self) -> Confidence {
        match self {
            DeathEvidence::ExplicitKill { .. } | DeathEvidence::CustomKill { .. } => {
                Confidence::High
            }
            DeathEvidence::GenericDeath { .. } => Confidence::Medium,
        }
    }
}

/// Terminal reason reported when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EndReason {
    CrewmatesByVote,
    CrewmatesByTask,
    ImpostorsByVote,
    ImpostorsByKill,
    ImpostorsBySabotage,
    CrewmateDisconnect,
    ImpostorDisconnect,
    /// A role outside the two default teams met its own win condition.
    /// Takes precedence over the binary team classification.
    ThirdPartyWin { role: String },
}

impl EndReason {
    /// Team awarded the win for this terminal reason.
    pub fn winning_team(&self) -> Team {
        match self {
            EndReason::CrewmatesByVote
            | EndReason::CrewmatesByTask
            | EndReason::ImpostorDisconnect => Team::Crewmate,
            EndReason::ImpostorsByVote
            | EndReason::ImpostorsByKill
            | EndReason::ImpostorsBySabotage
            | EndReason::CrewmateDisconnect => Team::Impostor,
            EndReason::ThirdPartyWin { .. } => Team::Neutral,
        }
    }

    /// Human-readable win condition recorded in the winner block.
    pub fn condition(&self) -> String {
        match self {
            EndReason::CrewmatesByVote => "Voted out the impostors".to_string(),
            EndReason::CrewmatesByTask => "Completed all tasks".to_string(),
            EndReason::ImpostorsByVote => "Outvoted the crew".to_string(),
            EndReason::ImpostorsByKill => "Killed the crew".to_string(),
            EndReason::ImpostorsBySabotage => "Critical sabotage went unanswered".to_string(),
            EndReason::CrewmateDisconnect => "Crew disconnected".to_string(),
            EndReason::ImpostorDisconnect => "Impostors disconnected".to_string(),
            EndReason::ThirdPartyWin { role } => format!("{role} won"),
        }
    }
}

/// Static facts about the match known at start time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchInfo {
    #[serde(default)]
    pub map: String,
    #[serde(default)]
    pub mode: String,
}

/// One player as first observed when the roster settles shortly after start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub total_tasks: u32,
}

/// One raw notification from the instrumentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    SessionStarted {
        #[serde(default)]
        info: MatchInfo,
    },
    SessionEnded {
        reason: EndReason,
    },
    RosterAvailable {
        players: Vec<RosterEntry>,
    },
    RoleAssigned {
        player_id: PlayerId,
        role: String,
        team: Team,
        #[serde(default)]
        modifiers: Vec<String>,
    },
    Death {
        victim_id: PlayerId,
        evidence: DeathEvidence,
    },
    Ejection {
        player_id: PlayerId,
        was_tie: bool,
    },
    MeetingCalled {
        is_emergency: bool,
        caller_name: String,
    },
    TaskStep {
        player_id: PlayerId,
        task_id: u32,
        is_final_step: bool,
    },
}
