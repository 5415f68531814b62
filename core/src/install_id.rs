//! Anonymous per-installation identity.
//!
//! A UUID stored next to the session records. It tags uploads so the
//! collector can group sessions from one installation without knowing
//! anything about the player.

use std::fs;
use std::path::Path;

use tracing::warn;
use uuid::Uuid;

/// Identity file name inside the storage directory.
pub const INSTALL_ID_FILE: &str = "user_id.txt";

/// Reads the installation id, creating and persisting one on first run.
///
/// A corrupt file is replaced with a fresh id. If the directory cannot be
/// written at all the id is still returned so uploads keep working; it is
/// then scoped to this process and a new one appears on the next run.
pub fn load_or_create(dir: &Path) -> Uuid {
    let path = dir.join(INSTALL_ID_FILE);
    match fs::read_to_string(&path) {
        Ok(raw) => match Uuid::parse_str(raw.trim()) {
            Ok(id) => return id,
            Err(err) => {
                warn!(path = %path.display(), "corrupt installation id, regenerating: {err}");
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(path = %path.display(), "failed to read installation id: {err}");
            return Uuid::new_v4();
        }
    }

    let id = Uuid::new_v4();
    if let Err(err) = fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), "failed to create storage dir for installation id: {err}");
        return id;
    }
    if let Err(err) = fs::write(&path, id.to_string()) {
        warn!(path = %path.display(), "failed to persist installation id: {err}");
    }
    id
}
