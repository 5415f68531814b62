//! Session recording engine.
//!
//! This crate owns everything between a host game signal and a delivered
//! session record: the [`SessionRecorder`] state machine, kill attribution,
//! durable JSON storage, and the background upload pipeline. The host embeds
//! [`SessionRecorder`] and feeds it [`crewlog_protocol::Signal`] values; the
//! crate never calls back into the host except through the optional
//! [`ProximitySource`] capability.

pub mod attribution;
pub mod config;
pub mod install_id;
pub mod labels;
pub mod recorder;
mod session;
pub mod store;
pub mod upload;

pub use attribution::PlayerPosition;
pub use attribution::ProximitySource;
pub use config::ConfigError;
pub use config::RecorderConfig;
pub use recorder::RecorderError;
pub use recorder::RecorderState;
pub use recorder::SessionRecorder;
pub use recorder::SignalApplied;
pub use store::SessionStore;
pub use store::StoreError;
pub use upload::UploadError;
pub use upload::UploadHandle;
pub use upload::Uploader;
