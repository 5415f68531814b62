//! Boundary types for the crewlog session recorder.
//!
//! Two vocabularies live here: the raw [`Signal`] stream produced by the
//! instrumentation layer, and the persisted [`SessionRecord`] document read
//! by record viewers and the remote collector. The recorder in
//! `crewlog-core` is the only component that turns one into the other; this
//! crate stays free of I/O and async so every consumer can depend on it.

pub mod record;
pub mod signal;

pub use record::DeathCause;
pub use record::EventKind;
pub use record::PlayerRecord;
pub use record::SCHEMA_VERSION;
pub use record::SessionEvent;
pub use record::SessionMetadata;
pub use record::SessionRecord;
pub use record::SessionStats;
pub use record::WinnerInfo;
pub use signal::Confidence;
pub use signal::DeathEvidence;
pub use signal::DeathReason;
pub use signal::EndReason;
pub use signal::MatchInfo;
pub use signal::PlayerId;
pub use signal::RosterEntry;
pub use signal::Signal;
pub use signal::Team;
