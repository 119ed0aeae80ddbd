use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub token_type: String,

    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Unresolved,
    SignedOut,
    SignedIn(Session),
}

#[derive(Debug, Clone)]
pub enum Gate {
    Wait,
    RedirectToLogin,
    Ready(Session),
}

impl SessionState {
    pub fn gate(self) -> Gate {
        match self {
            Self::Unresolved => Gate::Wait,
            Self::SignedOut => Gate::RedirectToLogin,
            Self::SignedIn(session) => Gate::Ready(session),
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    pub data_dir: PathBuf,
    pub session_path: PathBuf,
}

impl SessionStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let session_path = data_dir.join("session.json");
        debug!(session = %session_path.display(), "opened session store");

        Ok(Self {
            data_dir,
            session_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Option<Session>> {
        if !self.session_path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(&self.session_path)
            .with_context(|| format!("failed to read {}", self.session_path.display()))?;
        let session: Session = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", self.session_path.display()))?;

        Ok(Some(session))
    }

    #[tracing::instrument(skip(self, session), fields(email = ?session.email))]
    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(session)?;

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        writeln!(temp, "{serialized}")?;
        temp.flush()?;
        temp.persist(&self.session_path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.session_path.display(), err))?;

        info!(session = %self.session_path.display(), "session saved");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> anyhow::Result<()> {
        if self.session_path.exists() {
            fs::remove_file(&self.session_path)
                .with_context(|| format!("failed to remove {}", self.session_path.display()))?;
            info!("session cleared");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn state(&self) -> SessionState {
        match self.load() {
            Ok(Some(session)) => SessionState::SignedIn(session),
            Ok(None) => SessionState::SignedOut,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "session state unresolved");
                SessionState::Unresolved
            }
        }
    }
}
