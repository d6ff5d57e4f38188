//! Resolves the access token injected into the Drive client.

use anyhow::Context;
use drivemove_core::OAuthClient;

use crate::config::MoverConfig;
use crate::storage::{OAuthState, TokenStorage};
use crate::token_provider::TokenProvider;

pub async fn resolve_access_token(config: &MoverConfig) -> anyhow::Result<String> {
    if let Some(token) = std::env::var("DRIVEMOVE_ACCESS_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())
    {
        tracing::debug!("using access token from environment");
        return Ok(token);
    }

    let oauth_client = oauth_client_from_env(&config.oauth_base_url)?;
    if let Some(state) = state_from_env() {
        let mut provider = TokenProvider::new(state, oauth_client);
        return provider
            .access_token()
            .await
            .context("failed to refresh access token");
    }

    let storage = TokenStorage::new().context("failed to open keyring")?;
    let state = storage.get_oauth_state().context(
        "no credentials: set DRIVEMOVE_ACCESS_TOKEN or run `drivemove login`",
    )?;
    let mut provider = TokenProvider::new(state, oauth_client);
    let token = provider
        .access_token()
        .await
        .context("failed to refresh stored credentials")?;
    storage
        .save_oauth_state(&provider.into_state())
        .context("failed to persist oauth state")?;
    Ok(token)
}

/// Exchanges the refresh token from the environment once and stores the
/// resulting state in the keyring.
pub async fn login(config: &MoverConfig) -> anyhow::Result<()> {
    let state = state_from_env().context("DRIVEMOVE_REFRESH_TOKEN is not set")?;
    let oauth_client = oauth_client_from_env(&config.oauth_base_url)?
        .context("DRIVEMOVE_CLIENT_ID and DRIVEMOVE_CLIENT_SECRET are required")?;
    let mut provider = TokenProvider::new(state, Some(oauth_client));
    provider
        .access_token()
        .await
        .context("failed to refresh access token")?;
    TokenStorage::new()
        .context("failed to open keyring")?
        .save_oauth_state(&provider.into_state())
        .context("failed to save credentials")?;
    Ok(())
}

pub fn logout() -> anyhow::Result<()> {
    TokenStorage::new()
        .context("failed to open keyring")?
        .delete_oauth_state()
        .context("failed to remove credentials")?;
    Ok(())
}

fn state_from_env() -> Option<OAuthState> {
    state_from_refresh_token(std::env::var("DRIVEMOVE_REFRESH_TOKEN").ok())
}

fn state_from_refresh_token(refresh_token: Option<String>) -> Option<OAuthState> {
    let refresh_token = refresh_token.filter(|token| !token.trim().is_empty())?;
    Some(OAuthState {
        access_token: String::new(),
        refresh_token: Some(refresh_token),
        expires_at: None,
        scope: None,
        token_type: None,
    })
}

fn oauth_client_from_env(base_url: &str) -> anyhow::Result<Option<OAuthClient>> {
    match (
        std::env::var("DRIVEMOVE_CLIENT_ID"),
        std::env::var("DRIVEMOVE_CLIENT_SECRET"),
    ) {
        (Ok(client_id), Ok(client_secret)) => Ok(Some(
            OAuthClient::with_base_url(base_url, client_id, client_secret)
                .context("failed to build oauth client")?,
        )),
        _ => Ok(None),
    }
}
