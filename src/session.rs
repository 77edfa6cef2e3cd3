//! Dashboard logins.
//!
//! A session binds one browser cookie to one [`ManagementClient`] and at most
//! one running OAuth flow. Sessions survive a dashboard restart through a
//! small JSON file in the data directory.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::api::ManagementClient;
use crate::api::types::FlowStart;
use crate::api::OAuthProvider;
use crate::error::ApiError;
use crate::oauth::{FlowState, OAuthFlow};

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Point-in-time view of a session's OAuth flow
#[derive(Debug, Clone)]
pub struct FlowSnapshot {
    pub provider: OAuthProvider,
    pub start: FlowStart,
    pub state: FlowState,
}

pub struct Session {
    pub token: String,
    pub client: ManagementClient,
    pub expires_at: u64,
    flow: Mutex<Option<OAuthFlow>>,
}

impl Session {
    fn new(token: String, client: ManagementClient, expires_at: u64) -> Self {
        Self {
            token,
            client,
            expires_at,
            flow: Mutex::new(None),
        }
    }

    pub fn is_expired(&self) -> bool {
        now_secs() >= self.expires_at
    }

    /// Usable for management calls
    pub fn is_live(&self) -> bool {
        !self.is_expired() && !self.client.is_revoked()
    }

    /// Install a new flow; the previous one, if any, is aborted
    pub async fn replace_flow(&self, flow: OAuthFlow) {
        let previous = self.flow.lock().await.replace(flow);
        drop(previous);
    }

    pub async fn cancel_flow(&self) {
        if let Some(flow) = self.flow.lock().await.as_mut() {
            flow.cancel();
        }
    }

    /// Forget a finished flow so the page returns to its idle state
    pub async fn dismiss_flow(&self) {
        let mut guard = self.flow.lock().await;
        if guard.as_ref().is_some_and(|f| !f.state().is_active()) {
            guard.take();
        }
    }

    pub async fn flow(&self) -> Option<FlowSnapshot> {
        self.flow.lock().await.as_ref().map(|flow| FlowSnapshot {
            provider: flow.provider(),
            start: flow.start().clone(),
            state: flow.state(),
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("api_base", &self.client.base_url())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

// --- Persistence ---

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedStore {
    #[serde(default)]
    last_api_base: Option<String>,
    #[serde(default)]
    sessions: Vec<PersistedSession>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    token: String,
    api_base: String,
    management_key: String,
    expires_at: u64,
}

#[derive(Default)]
struct StoreState {
    sessions: HashMap<String, Arc<Session>>,
    last_api_base: Option<String>,
}

pub struct SessionStore {
    path: PathBuf,
    http: reqwest::Client,
    ttl_secs: u64,
    state: RwLock<StoreState>,
}

impl SessionStore {
    /// Load persisted sessions; an unreadable file starts an empty store
    pub async fn load(path: PathBuf, http: reqwest::Client, ttl_secs: u64) -> Self {
        let persisted: PersistedStore = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable session file {}: {e}", path.display());
                PersistedStore::default()
            }),
            Err(_) => PersistedStore::default(),
        };

        let now = now_secs();
        let mut sessions = HashMap::new();
        for entry in persisted.sessions {
            if entry.expires_at <= now {
                continue;
            }
            match ManagementClient::new(http.clone(), &entry.api_base, &entry.management_key) {
                Ok(client) => {
                    let session = Session::new(entry.token.clone(), client, entry.expires_at);
                    sessions.insert(entry.token, Arc::new(session));
                }
                Err(e) => warn!("Dropping stored session for {}: {e}", entry.api_base),
            }
        }

        if !sessions.is_empty() {
            info!("Restored {} dashboard session(s)", sessions.len());
        }

        Self {
            path,
            http,
            ttl_secs,
            state: RwLock::new(StoreState {
                sessions,
                last_api_base: persisted.last_api_base,
            }),
        }
    }

    /// Client for a login attempt; not stored until [`SessionStore::create`]
    pub fn connect(&self, api_base: &str, management_key: &str) -> Result<ManagementClient, ApiError> {
        ManagementClient::new(self.http.clone(), api_base, management_key)
    }

    pub async fn create(&self, client: ManagementClient) -> Result<Arc<Session>, std::io::Error> {
        let token = generate_token();
        let session = Arc::new(Session::new(
            token.clone(),
            client,
            now_secs() + self.ttl_secs,
        ));

        {
            let mut state = self.state.write().await;
            state.last_api_base = Some(session.client.base_url().to_string());
            state.sessions.insert(token, session.clone());
        }
        info!("Dashboard login for {}", session.client.base_url());
        self.save().await?;
        Ok(session)
    }

    /// Live session for `token`; expired or revoked sessions are dropped
    pub async fn get(&self, token: &str) -> Option<Arc<Session>> {
        let session = self.state.read().await.sessions.get(token).cloned()?;
        if session.is_live() {
            return Some(session);
        }

        if session.client.is_revoked() {
            info!("Ending session for {}: management key rejected", session.client.base_url());
        }
        if let Err(e) = self.remove(token).await {
            warn!("Failed to persist session removal: {e}");
        }
        None
    }

    pub async fn remove(&self, token: &str) -> Result<(), std::io::Error> {
        let removed = self.state.write().await.sessions.remove(token);
        if let Some(session) = removed {
            session.cancel_flow().await;
            self.save().await?;
        }
        Ok(())
    }

    /// Drop expired and revoked sessions, returning how many were removed
    pub async fn purge_expired(&self) -> Result<usize, std::io::Error> {
        let removed: Vec<Arc<Session>> = {
            let mut state = self.state.write().await;
            let dead: Vec<String> = state
                .sessions
                .iter()
                .filter(|(_, s)| !s.is_live())
                .map(|(token, _)| token.clone())
                .collect();
            dead.iter()
                .filter_map(|token| state.sessions.remove(token))
                .collect()
        };

        for session in &removed {
            session.cancel_flow().await;
        }
        if !removed.is_empty() {
            self.save().await?;
        }
        Ok(removed.len())
    }

    /// End the session and clear the remembered API base
    pub async fn forget_login(&self, token: &str) -> Result<(), std::io::Error> {
        self.state.write().await.last_api_base = None;
        self.remove(token).await?;
        self.save().await
    }

    pub async fn last_api_base(&self) -> Option<String> {
        self.state.read().await.last_api_base.clone()
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    async fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = {
            let state = self.state.read().await;
            let persisted = PersistedStore {
                last_api_base: state.last_api_base.clone(),
                sessions: state
                    .sessions
                    .values()
                    .map(|s| PersistedSession {
                        token: s.token.clone(),
                        api_base: s.client.base_url().to_string(),
                        management_key: s.client.token().to_string(),
                        expires_at: s.expires_at,
                    })
                    .collect(),
            };
            serde_json::to_string_pretty(&persisted)?
        };

        // Write to a temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
