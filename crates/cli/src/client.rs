// Connection setup shared by every command: config, credential and the
// runtime the async client calls run on.
//
// The credential comes from `STRATA_TOKEN`; `STRATA_BASE_URL` overrides the
// configured REST endpoint.

use std::future::Future;

use anyhow::{anyhow, Context, Result};
use clap::Args;

use strata_client::{ClientConfig, HttpTreeApi, Replica, Session, SessionHandle};
use strata_common::types::RootKey;

pub const TOKEN_ENV: &str = "STRATA_TOKEN";
pub const BASE_URL_ENV: &str = "STRATA_BASE_URL";

/// Which root a command works on.
#[derive(Debug, Clone, Args)]
pub struct RootArgs {
    /// Workspace id.
    #[arg(long, conflicts_with = "context", required_unless_present = "context")]
    pub workspace: Option<String>,

    /// Context id.
    #[arg(long)]
    pub context: Option<String>,
}

impl RootArgs {
    pub fn root(&self) -> Result<RootKey> {
        match (&self.workspace, &self.context) {
            (Some(id), None) => Ok(RootKey::Workspace(id.clone())),
            (None, Some(id)) => Ok(RootKey::Context(id.clone())),
            _ => Err(anyhow!("pass exactly one of --workspace or --context")),
        }
    }
}

/// Config file values with the environment override applied.
pub fn load_config() -> ClientConfig {
    with_env_override(ClientConfig::load(), std::env::var(BASE_URL_ENV).ok())
}

fn with_env_override(mut config: ClientConfig, base_url: Option<String>) -> ClientConfig {
    if let Some(base_url) = base_url.filter(|value| !value.trim().is_empty()) {
        config.base_url = base_url.trim().to_string();
        // A derived push endpoint must follow the new base.
        config.live_url = None;
    }
    config
}

pub fn token() -> Result<String> {
    match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(anyhow!("unauthorized: {TOKEN_ENV} is not set")),
    }
}

pub fn session(config: &ClientConfig) -> Result<SessionHandle> {
    let session = Session::new(&config.base_url, token()?).map_err(|error| anyhow!(error))?;
    Ok(SessionHandle::new(session))
}

pub fn http_api(config: &ClientConfig) -> Result<HttpTreeApi> {
    HttpTreeApi::new(session(config)?, config.request_timeout())
        .context("failed to build the HTTP client")
}

/// A replica over HTTP for `root`. Nothing is fetched yet.
pub fn replica(config: &ClientConfig, root: RootKey) -> Result<Replica<HttpTreeApi>> {
    Ok(Replica::new(http_api(config)?, root, config))
}

/// Run an async command body on a fresh current-thread runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    Ok(runtime.block_on(future))
}
