//! Keeps the Drive access token fresh from a stored refresh token.

use drivemove_core::OAuthClient;
use thiserror::Error;

use crate::storage::{OAuthState, now_unix};

const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum TokenProviderError {
    #[error("DRIVEMOVE_CLIENT_ID and DRIVEMOVE_CLIENT_SECRET are needed to refresh the token")]
    MissingOAuthClient,
    #[error("access token expired and no refresh token is stored")]
    MissingRefreshToken,
    #[error("token refresh rejected: {0}")]
    OAuth(#[from] drivemove_core::OAuthError),
}

pub struct TokenProvider {
    state: OAuthState,
    oauth_client: Option<OAuthClient>,
}

impl TokenProvider {
    pub fn new(state: OAuthState, oauth_client: Option<OAuthClient>) -> Self {
        Self {
            state,
            oauth_client,
        }
    }

    /// Token valid for at least another minute, refreshed first if needed.
    pub async fn access_token(&mut self) -> Result<String, TokenProviderError> {
        if needs_refresh(&self.state, now_unix()) {
            let refresh_token = self
                .state
                .refresh_token
                .as_deref()
                .ok_or(TokenProviderError::MissingRefreshToken)?;
            let client = self
                .oauth_client
                .as_ref()
                .ok_or(TokenProviderError::MissingOAuthClient)?;
            tracing::debug!("refreshing drive access token");
            let token = client.refresh_token(refresh_token).await?;
            self.state = merge_refreshed(&self.state, OAuthState::from_oauth_token(&token));
        }
        Ok(self.state.access_token.clone())
    }

    pub fn into_state(self) -> OAuthState {
        self.state
    }
}

fn needs_refresh(state: &OAuthState, now: i64) -> bool {
    state.access_token.is_empty()
        || state
            .expires_at
            .is_some_and(|expires_at| expires_at <= now.saturating_add(EXPIRY_MARGIN_SECS))
}

/// Google leaves out the refresh token, and sometimes the scope, when
/// refreshing.
fn merge_refreshed(previous: &OAuthState, mut refreshed: OAuthState) -> OAuthState {
    refreshed.refresh_token = refreshed
        .refresh_token
        .or_else(|| previous.refresh_token.clone());
    refreshed.scope = refreshed.scope.or_else(|| previous.scope.clone());
    refreshed
}
