//! Death attribution.
//!
//! Evidence about the same death arrives from several sources of different
//! quality and in no guaranteed order: a kill confirmation can precede the
//! death signal, follow it, or never arrive. The resolver keeps the best
//! unconfirmed evidence per victim, consumes it when the death is finally
//! confirmed, and falls back first to a proximity heuristic and finally to
//! unknown attribution when no better evidence exists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crewlog_protocol::PlayerId;
use crewlog_protocol::PlayerRecord;
use crewlog_protocol::Team;

use crate::config::AttributionConfig;
use crate::labels;

/// Live player positions, supplied by the host integration when it can
/// expose them. The proximity heuristic is the only part of attribution
/// that needs live host state; a host without this capability simply skips
/// the heuristic and low-evidence deaths stay unattributed.
pub trait ProximitySource: Send + Sync {
    fn positions(&self) -> Vec<PlayerPosition>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
}

/// Best unconfirmed kill evidence for one victim.
#[derive(Debug, Clone)]
pub(crate) struct PendingKill {
    pub killer: String,
    pub kill_type: String,
    /// When the evidence arrived; kept for debug logging only.
    pub noted_at: Instant,
}

/// Attribution chosen for a confirmed death.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedKill {
    pub killer: String,
    pub kill_type: String,
}

pub(crate) struct AttributionResolver {
    config: AttributionConfig,
    proximity: Option<Arc<dyn ProximitySource>>,
    pending: HashMap<PlayerId, PendingKill>,
}

impl AttributionResolver {
    pub(crate) fn new(
        config: AttributionConfig,
        proximity: Option<Arc<dyn ProximitySource>>,
    ) -> Self {
        Self {
            config,
            proximity,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn set_proximity_source(&mut self, source: Arc<dyn ProximitySource>) {
        self.proximity = Some(source);
    }

    /// Clears evidence left over from a previous session.
    pub(crate) fn reset(&mut self) {
        self.pending.clear();
    }

    /// Records high-confidence kill evidence ahead of the death signal.
    /// Later evidence for the same victim supersedes earlier evidence.
    pub(crate) fn note_kill(&mut self, victim: PlayerId, killer: String, kill_type: String) {
        self.pending.insert(
            victim,
            PendingKill {
                killer,
                kill_type,
                noted_at: Instant::now(),
            },
        );
    }

    pub(crate) fn take_pending(&mut self, victim: PlayerId) -> Option<PendingKill> {
        self.pending.remove(&victim)
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_kill_eligible(&self, player: &PlayerRecord) -> bool {
        player.team == Team::Impostor || self.config.is_neutral_killer(&player.role)
    }

    /// Last-resort heuristic: the nearest living kill-eligible player within
    /// the configured threshold of the victim at time of death.
    pub(crate) fn infer_by_proximity(
        &self,
        victim: PlayerId,
        roster: &[PlayerRecord],
    ) -> Option<ResolvedKill> {
        let source = self.proximity.as_ref()?;
        let positions = source.positions();
        let victim_pos = positions.iter().find(|p| p.player_id == victim)?;

        let threshold_sq = self.config.proximity_threshold * self.config.proximity_threshold;
        let mut nearest: Option<(f32, &PlayerRecord)> = None;
        for pos in &positions {
            if pos.player_id == victim {
                continue;
            }
            let Some(player) = roster.iter().find(|p| p.player_id == pos.player_id) else {
                continue;
            };
            if !player.is_alive || !self.is_kill_eligible(player) {
                continue;
            }
            let dx = pos.x - victim_pos.x;
            let dy = pos.y - victim_pos.y;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq > threshold_sq {
                continue;
            }
            if nearest.is_none_or(|(best, _)| dist_sq < best) {
                nearest = Some((dist_sq, player));
            }
        }

        nearest.map(|(_, killer)| ResolvedKill {
            killer: killer.player_name.clone(),
            kill_type: labels::kill_label(&killer.role).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct FixedPositions(Vec<PlayerPosition>);

    impl ProximitySource for FixedPositions {
        fn positions(&self) -> Vec<PlayerPosition> {
            self.0.clone()
        }
    }

    fn player(id: u8, name: &str, role: &str, team: Team, alive: bool) -> PlayerRecord {
        let mut record = PlayerRecord::new(PlayerId(id), name.to_string());
        record.role = role.to_string();
        record.team = team;
        record.is_alive = alive;
        record
    }

    fn at(id: u8, x: f32, y: f32) -> PlayerPosition {
        PlayerPosition {
            player_id: PlayerId(id),
            x,
            y,
        }
    }

    #[test]
    fn later_evidence_supersedes_earlier_for_same_victim() {
        let mut resolver = AttributionResolver::new(AttributionConfig::default(), None);
        resolver.note_kill(PlayerId(1), "Alice".to_string(), "Shot".to_string());
        resolver.note_kill(PlayerId(1), "Bob".to_string(), "Ignited".to_string());

        let pending = resolver.take_pending(PlayerId(1)).expect("pending kill");
        assert_eq!(pending.killer, "Bob");
        assert_eq!(pending.kill_type, "Ignited");
        assert!(resolver.take_pending(PlayerId(1)).is_none());
    }

    #[test]
    fn reset_discards_stale_evidence() {
        let mut resolver = AttributionResolver::new(AttributionConfig::default(), None);
        resolver.note_kill(PlayerId(1), "Alice".to_string(), "Shot".to_string());
        resolver.reset();
        assert_eq!(resolver.pending_len(), 0);
    }

    #[test]
    fn proximity_picks_nearest_eligible_within_threshold() {
        let roster = vec![
            player(1, "Victim", "Crewmate", Team::Crewmate, true),
            player(2, "FarImpostor", "Impostor", Team::Impostor, true),
            player(3, "NearJuggernaut", "Juggernaut", Team::Neutral, true),
            player(4, "Bystander", "Crewmate", Team::Crewmate, true),
        ];
        let source = Arc::new(FixedPositions(vec![
            at(1, 0.0, 0.0),
            at(2, 4.0, 0.0),
            at(3, 1.0, 1.0),
            at(4, 0.5, 0.0),
        ]));
        let resolver = AttributionResolver::new(AttributionConfig::default(), Some(source));

        let resolved = resolver
            .infer_by_proximity(PlayerId(1), &roster)
            .expect("inferred kill");
        assert_eq!(resolved.killer, "NearJuggernaut");
        assert_eq!(resolved.kill_type, "Slashed");
    }

    #[test]
    fn proximity_ignores_dead_and_ineligible_players() {
        let roster = vec![
            player(1, "Victim", "Crewmate", Team::Crewmate, true),
            player(2, "DeadImpostor", "Impostor", Team::Impostor, false),
            player(3, "Jester", "Jester", Team::Neutral, true),
        ];
        let source = Arc::new(FixedPositions(vec![
            at(1, 0.0, 0.0),
            at(2, 0.1, 0.0),
            at(3, 0.2, 0.0),
        ]));
        let resolver = AttributionResolver::new(AttributionConfig::default(), Some(source));

        assert!(resolver.infer_by_proximity(PlayerId(1), &roster).is_none());
    }

    #[test]
    fn proximity_respects_threshold_distance() {
        let roster = vec![
            player(1, "Victim", "Crewmate", Team::Crewmate, true),
            player(2, "Impostor", "Impostor", Team::Impostor, true),
        ];
        let source = Arc::new(FixedPositions(vec![at(1, 0.0, 0.0), at(2, 5.1, 0.0)]));
        let resolver = AttributionResolver::new(AttributionConfig::default(), Some(source));

        assert!(resolver.infer_by_proximity(PlayerId(1), &roster).is_none());
    }

    #[test]
    fn missing_capability_skips_the_heuristic() {
        let roster = vec![player(1, "Victim", "Crewmate", Team::Crewmate, true)];
        let resolver = AttributionResolver::new(AttributionConfig::default(), None);
        assert!(resolver.infer_by_proximity(PlayerId(1), &roster).is_none());
    }
}
