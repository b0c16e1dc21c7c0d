use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::UserProfile;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// The authenticated-state triple held client-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl Session {
    pub fn new(access_token: String, refresh_token: String, user: Option<UserProfile>) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            user,
        }
    }

    /// A present access token is what makes the user authenticated for UI purposes.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}

/// Durable storage for the session triple.
///
/// `save` must replace the whole record; callers never write single fields.
pub trait SessionBackend: Send + Sync {
    fn load(&self) -> Result<Option<Session>>;
    fn save(&self, session: &Session) -> Result<()>;
    /// Remove the persisted record. Succeeds when nothing is stored.
    fn clear(&self) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Stores the session as `session.json` in the cache directory.
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.tmp", SESSION_FILE))
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        match serde_json::from_str::<Session>(&contents) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // A corrupt file is treated as signed out rather than fatal
                warn!(error = %e, path = %path.display(), "Ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir).context("Failed to create session directory")?;
        let contents = serde_json::to_string_pretty(session)?;

        // Write then rename so a crash never leaves a half-written triple
        let temp = self.temp_path();
        write_private(&temp, contents.as_bytes()).context("Failed to write session file")?;
        // A temp file left behind by a crash keeps its old mode
        restrict_permissions(&temp)?;
        std::fs::rename(&temp, self.session_path()).context("Failed to replace session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Create (or truncate) `path` readable by the owner only, then write it.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict session file permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Keeps the session for the life of the process only.
#[derive(Default)]
pub struct MemoryBackend {
    stored: Mutex<Option<Session>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a session already "persisted", as if from a previous run.
    pub fn with_session(session: Session) -> Self {
        Self {
            stored: Mutex::new(Some(session)),
        }
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Session>> {
        let stored = self
            .stored
            .lock()
            .map_err(|_| anyhow::anyhow!("memory session lock poisoned"))?;
        Ok(stored.clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| anyhow::anyhow!("memory session lock poisoned"))?;
        *stored = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| anyhow::anyhow!("memory session lock poisoned"))?;
        *stored = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
