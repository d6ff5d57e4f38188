use drivemove_core::OAuthToken;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SERVICE_NAME: &str = "drivemove";
const STATE_KEY: &str = "oauth_state";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("keyring error: {0}")]
    KeyringError(#[from] keyring::Error),
    #[error("stored oauth state is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("oauth state not found")]
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl OAuthState {
    pub fn from_oauth_token(token: &OAuthToken) -> Self {
        Self::from_oauth_token_at(token, now_unix())
    }

    pub fn from_oauth_token_at(token: &OAuthToken, now: i64) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| now.saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))),
            scope: token.scope.clone(),
            token_type: Some(token.token_type.clone()),
        }
    }
}

/// OAuth state persisted in the OS keyring.
pub struct TokenStorage {
    entry: Entry,
}

impl TokenStorage {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            entry: Entry::new(SERVICE_NAME, STATE_KEY)?,
        })
    }

    pub fn get_oauth_state(&self) -> Result<OAuthState, StorageError> {
        match self.entry.get_password() {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(keyring::Error::NoEntry) => Err(StorageError::NotFound),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }

    pub fn save_oauth_state(&self, state: &OAuthState) -> Result<(), StorageError> {
        self.entry.set_password(&serde_json::to_string(state)?)?;
        Ok(())
    }

    pub fn delete_oauth_state(&self) -> Result<(), StorageError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }
}

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
