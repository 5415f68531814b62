//! The session recorder.
//!
//! One controller owns the whole lifecycle: it applies host signals to the
//! active session, routes death evidence through the attribution resolver,
//! and on session end freezes the record, persists it, and hands it to the
//! upload pipeline.
//!
//! Signal ingest is deliberately infallible from the host's point of view:
//! [`SessionRecorder::handle_signal`] logs failures instead of returning
//! them, so a recording problem can never take the game down with it.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use crewlog_protocol::DeathCause;
use crewlog_protocol::DeathEvidence;
use crewlog_protocol::DeathReason;
use crewlog_protocol::EndReason;
use crewlog_protocol::EventKind;
use crewlog_protocol::MatchInfo;
use crewlog_protocol::PlayerId;
use crewlog_protocol::RosterEntry;
use crewlog_protocol::SessionRecord;
use crewlog_protocol::Signal;
use crewlog_protocol::Team;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::attribution::AttributionResolver;
use crate::attribution::ProximitySource;
use crate::attribution::ResolvedKill;
use crate::config::RecorderConfig;
use crate::labels;
use crate::session::ActiveSession;
use crate::store::SessionStore;
use crate::store::StoreError;
use crate::upload::UploadHandle;

/// Version stamped into every session record.
const RECORDER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No session in flight; start signals are accepted.
    Idle,
    /// A session is recording; gameplay signals are accepted.
    Active,
    /// The finished session is being frozen and persisted.
    Finalizing,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecorderState::Idle => "idle",
            RecorderState::Active => "active",
            RecorderState::Finalizing => "finalizing",
        };
        f.write_str(label)
    }
}

/// Outcome of applying one signal. Ignored signals name the reason; they are
/// normal operation, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalApplied {
    Applied,
    Ignored(&'static str),
}

pub struct SessionRecorder {
    state: RecorderState,
    session: Option<ActiveSession>,
    resolver: AttributionResolver,
    store: SessionStore,
    upload: Option<UploadHandle>,
    last_persisted: Option<PathBuf>,
}

impl SessionRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        let store = SessionStore::new(config.storage.resolve());
        Self {
            state: RecorderState::Idle,
            session: None,
            resolver: AttributionResolver::new(config.attribution, None),
            store,
            upload: None,
            last_persisted: None,
        }
    }

    /// Attaches a live position feed for last-resort kill attribution.
    /// Without one the recorder still works; unattributed kills stay
    /// generic.
    pub fn with_proximity_source(mut self, source: Arc<dyn ProximitySource>) -> Self {
        self.resolver.set_proximity_source(source);
        self
    }

    pub fn with_upload_handle(mut self, handle: UploadHandle) -> Self {
        self.upload = Some(handle);
        self
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(ActiveSession::session_id)
    }

    /// A point-in-time copy of the in-flight record, if any.
    pub fn snapshot(&self) -> Option<SessionRecord> {
        self.session.as_ref().map(|s| s.record().clone())
    }

    pub fn last_persisted(&self) -> Option<&Path> {
        self.last_persisted.as_deref()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Applies one signal, swallowing errors. This is the host-facing entry
    /// point; a failure is logged and the recorder keeps going.
    pub fn handle_signal(&mut self, signal: Signal) {
        if let Err(err) = self.apply_signal(signal) {
            warn!(state = %self.state, "failed to apply signal: {err}");
        }
    }

    /// Fallible variant of [`Self::handle_signal`] reporting whether the
    /// signal changed anything.
    pub fn apply_signal(&mut self, signal: Signal) -> Result<SignalApplied, RecorderError> {
        match signal {
            Signal::SessionStarted { info } => Ok(self.start_session(info)),
            Signal::SessionEnded { reason } => self.end_session(&reason),
            Signal::RosterAvailable { players } => Ok(self.capture_roster(&players)),
            Signal::RoleAssigned {
                player_id,
                role,
                team,
                modifiers,
            } => Ok(self.assign_role(player_id, role, team, modifiers)),
            Signal::Death {
                victim_id,
                evidence,
            } => Ok(self.record_death_evidence(victim_id, evidence)),
            Signal::Ejection { player_id, was_tie } => Ok(self.record_ejection(player_id, was_tie)),
            Signal::MeetingCalled {
                is_emergency,
                caller_name,
            } => Ok(self.record_meeting(is_emergency, caller_name)),
            Signal::TaskStep {
                player_id,
                task_id,
                is_final_step,
            } => Ok(self.record_task_step(player_id, task_id, is_final_step)),
        }
    }

    fn start_session(&mut self, info: MatchInfo) -> SignalApplied {
        if self.state != RecorderState::Idle {
            warn!(state = %self.state, "session start while a session is in flight, ignoring");
            return SignalApplied::Ignored("session already active");
        }
        self.resolver.reset();
        let mut session = ActiveSession::new(info, RECORDER_VERSION);
        session.push_event(
            EventKind::SessionStart,
            "Session started".to_string(),
            Vec::new(),
            None,
        );
        info!(session_id = %session.session_id(), "session started");
        self.session = Some(session);
        self.state = RecorderState::Active;
        SignalApplied::Applied
    }

    fn end_session(&mut self, reason: &EndReason) -> Result<SignalApplied, RecorderError> {
        let Some(mut session) = self.session.take() else {
            debug!(state = %self.state, "session end without an active session, ignoring");
            return Ok(SignalApplied::Ignored("no active session"));
        };
        self.state = RecorderState::Finalizing;
        session.push_event(
            EventKind::SessionEnd,
            format!("Session ended: {}", reason.condition()),
            Vec::new(),
            None,
        );
        let session_id = session.session_id();
        let record = session.freeze(reason);

        // Whatever happens to the write, the recorder must come back to
        // idle ready for the next session.
        let written = self.store.write(&record);
        self.state = RecorderState::Idle;
        self.resolver.reset();

        let path = written?;
        info!(
            session_id = %session_id,
            record = %path.display(),
            "session record persisted"
        );
        if let Some(upload) = &self.upload {
            upload.submit(path.clone());
        }
        self.last_persisted = Some(path);
        Ok(SignalApplied::Applied)
    }

    fn capture_roster(&mut self, players: &[RosterEntry]) -> SignalApplied {
        let Some(session) = self.session.as_mut() else {
            debug!("roster signal outside a session, ignoring");
            return SignalApplied::Ignored("no active session");
        };
        session.capture_roster(players);
        debug!(count = players.len(), "roster captured");
        SignalApplied::Applied
    }

    fn assign_role(
        &mut self,
        player_id: PlayerId,
        role: String,
        team: Team,
        modifiers: Vec<String>,
    ) -> SignalApplied {
        let Some(session) = self.session.as_mut() else {
            debug!(player = %player_id, "role signal outside a session, ignoring");
            return SignalApplied::Ignored("no active session");
        };
        debug!(player = %player_id, role = %role, team = %team, "role assigned");
        session.assign_role(player_id, role, team, modifiers);
        SignalApplied::Applied
    }

    fn record_death_evidence(
        &mut self,
        victim_id: PlayerId,
        evidence: DeathEvidence,
    ) -> SignalApplied {
        let Some(session) = self.session.as_mut() else {
            debug!(victim = %victim_id, "death signal outside a session, ignoring");
            return SignalApplied::Ignored("no active session");
        };
        match evidence {
            DeathEvidence::ExplicitKill { killer, cause } => {
                // Custom kill evidence noted ahead of this signal carries
                // the richer label and wins over the engine attribution.
                let resolved = match self.resolver.take_pending(victim_id) {
                    Some(pending) => {
                        debug!(
                            victim = %victim_id,
                            age_ms = pending.noted_at.elapsed().as_millis() as u64,
                            "pending attribution consumed"
                        );
                        ResolvedKill {
                            killer: pending.killer,
                            kill_type: pending.kill_type,
                        }
                    }
                    None => {
                        let label = match cause.as_deref() {
                            Some(cause) => labels::kill_label(cause),
                            None => session
                                .role_of(&killer)
                                .map(labels::kill_label)
                                .unwrap_or(labels::GENERIC_KILL_LABEL),
                        };
                        ResolvedKill {
                            killer,
                            kill_type: label.to_string(),
                        }
                    }
                };

                if session.is_death_recorded(victim_id) {
                    session.patch_attribution(
                        victim_id,
                        resolved.kill_type.clone(),
                        resolved.killer.clone(),
                    );
                    session.recompute_kill_counts();
                    info!(victim = %victim_id, killer = %resolved.killer, "death attribution patched");
                    return SignalApplied::Applied;
                }

                let victim_name = session.player_name(victim_id);
                session.record_death(
                    victim_id,
                    DeathCause::Killed,
                    Some(resolved.kill_type.clone()),
                    Some(resolved.killer.clone()),
                );
                session.recompute_kill_counts();
                session.push_event(
                    EventKind::PlayerKilled,
                    format!("{victim_name} was killed by {}", resolved.killer),
                    vec![victim_name.clone(), resolved.killer.clone()],
                    None,
                );
                info!(victim = %victim_name, killer = %resolved.killer, "kill recorded");
                SignalApplied::Applied
            }
            DeathEvidence::CustomKill { killer, cause } => {
                let kill_type = labels::kill_label(&cause).to_string();
                if session.is_death_recorded(victim_id) {
                    session.patch_attribution(victim_id, kill_type, killer.clone());
                    session.recompute_kill_counts();
                    info!(victim = %victim_id, killer = %killer, "death attribution patched");
                } else {
                    // The death itself is confirmed by the engine later;
                    // until then this is evidence, not a death.
                    debug!(
                        victim = %victim_id,
                        killer = %killer,
                        kill_type = %kill_type,
                        "kill evidence noted ahead of death"
                    );
                    self.resolver.note_kill(victim_id, killer, kill_type);
                }
                SignalApplied::Applied
            }
            DeathEvidence::GenericDeath { reason } => {
                if session.is_death_recorded(victim_id) {
                    debug!(victim = %victim_id, "death already recorded, ignoring generic evidence");
                    return SignalApplied::Ignored("death already recorded");
                }

                let resolution = match self.resolver.take_pending(victim_id) {
                    Some(pending) => Some(ResolvedKill {
                        killer: pending.killer,
                        kill_type: pending.kill_type,
                    }),
                    None if reason == DeathReason::Kill => {
                        self.resolver.infer_by_proximity(victim_id, session.players())
                    }
                    None => None,
                };

                let victim_name = session.player_name(victim_id);
                let (cause, kill_type, killed_by, description) = match (&resolution, reason) {
                    (Some(resolved), _) => (
                        DeathCause::Killed,
                        Some(resolved.kill_type.clone()),
                        Some(resolved.killer.clone()),
                        format!("{victim_name} was killed by {}", resolved.killer),
                    ),
                    (None, DeathReason::Kill) => (
                        DeathCause::Killed,
                        Some(labels::GENERIC_KILL_LABEL.to_string()),
                        None,
                        format!("{victim_name} was killed"),
                    ),
                    (None, DeathReason::Suicide) => (
                        DeathCause::Suicide,
                        None,
                        None,
                        format!("{victim_name} died"),
                    ),
                    (None, DeathReason::Disconnect) => (
                        DeathCause::Disconnected,
                        None,
                        None,
                        format!("{victim_name} disconnected"),
                    ),
                    (None, DeathReason::Unknown) => (
                        DeathCause::Unknown,
                        None,
                        None,
                        format!("{victim_name} died"),
                    ),
                };

                let mut involved = vec![victim_name.clone()];
                if let Some(killer) = &killed_by {
                    involved.push(killer.clone());
                }
                session.record_death(victim_id, cause, kill_type, killed_by);
                session.recompute_kill_counts();
                session.push_event(EventKind::PlayerKilled, description, involved, None);
                info!(victim = %victim_name, ?cause, "death recorded");
                SignalApplied::Applied
            }
        }
    }

    fn record_ejection(&mut self, player_id: PlayerId, was_tie: bool) -> SignalApplied {
        let Some(session) = self.session.as_mut() else {
            debug!(player = %player_id, "ejection signal outside a session, ignoring");
            return SignalApplied::Ignored("no active session");
        };
        if !session.record_death(
            player_id,
            DeathCause::Ejected,
            Some(labels::EJECTED_LABEL.to_string()),
            None,
        ) {
            debug!(player = %player_id, "ejection for an already-dead player, ignoring");
            return SignalApplied::Ignored("death already recorded");
        }
        let name = session.player_name(player_id);
        session.push_event(
            EventKind::PlayerEjected,
            format!("{name} was ejected"),
            vec![name.clone()],
            Some(serde_json::json!({ "wasTie": was_tie })),
        );
        info!(player = %name, was_tie, "ejection recorded");
        SignalApplied::Applied
    }

    fn record_meeting(&mut self, is_emergency: bool, caller_name: String) -> SignalApplied {
        let Some(session) = self.session.as_mut() else {
            debug!("meeting signal outside a session, ignoring");
            return SignalApplied::Ignored("no active session");
        };
        session.record_meeting();
        let (kind, description) = if is_emergency {
            (
                EventKind::EmergencyMeeting,
                format!("{caller_name} called an emergency meeting"),
            )
        } else {
            (
                EventKind::BodyReported,
                format!("{caller_name} reported a body"),
            )
        };
        session.push_event(kind, description, vec![caller_name], None);
        SignalApplied::Applied
    }

    fn record_task_step(
        &mut self,
        player_id: PlayerId,
        task_id: u32,
        is_final_step: bool,
    ) -> SignalApplied {
        let Some(session) = self.session.as_mut() else {
            return SignalApplied::Ignored("no active session");
        };
        if !is_final_step {
            return SignalApplied::Ignored("intermediate task step");
        }
        if session.count_task(player_id, task_id) {
            debug!(player = %player_id, task = task_id, "task completion counted");
            SignalApplied::Applied
        } else {
            SignalApplied::Ignored("task not countable")
        }
    }
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error(transparent)]
    Persist(#[from] StoreError),
}
