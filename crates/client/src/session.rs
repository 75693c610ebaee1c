// Session boundary: the base endpoint and bearer credential supplied by the
// surrounding application. Swappable at runtime on credential change.

use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use url::Url;

/// Path of the push endpoint relative to the REST base.
pub const LIVE_PATH: &str = "v1/live";

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub base_url: Url,
    pub token: String,
}

impl Session {
    /// Build a session, validating the endpoint the same way config does.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, String> {
        Ok(Self { base_url: validate_base_url(base_url)?, token: token.into() })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Shared, swappable session. Clones observe the same session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<Session>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self { inner: Arc::new(RwLock::new(session)) }
    }

    /// Snapshot of the current session. Requests read it once up front and
    /// never hold the lock across an await.
    pub fn current(&self) -> Session {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn replace(&self, session: Session) {
        *self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }
}

// ── Endpoint validation ────────────────────────────────────────────

/// REST endpoints must use https; http is allowed only on loopback.
pub fn validate_base_url(value: &str) -> Result<Url, String> {
    let parsed = Url::parse(value).map_err(|error| format!("invalid base_url `{value}`: {error}"))?;
    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if is_loopback_host(parsed.host_str()) => Ok(parsed),
        _ => Err("base_url must use https (http is allowed only for localhost testing)".into()),
    }
}

/// Push endpoints must use wss; ws is allowed only on loopback.
pub fn validate_live_url(value: &str) -> Result<Url, String> {
    let parsed = Url::parse(value).map_err(|error| format!("invalid live_url `{value}`: {error}"))?;
    match parsed.scheme() {
        "wss" => Ok(parsed),
        "ws" if is_loopback_host(parsed.host_str()) => Ok(parsed),
        _ => Err("live_url must use wss (ws is allowed only for localhost testing)".into()),
    }
}

/// `https://host/base` -> `wss://host/base/v1/live`.
pub fn derive_live_url(base: &Url) -> Result<Url, String> {
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(format!("cannot derive a push endpoint from `{other}` scheme")),
    };
    let mut live = base.clone();
    live.set_scheme(scheme).map_err(|()| format!("cannot switch `{base}` to {scheme}"))?;
    live.path_segments_mut()
        .map_err(|()| format!("base_url `{base}` cannot carry a path"))?
        .pop_if_empty()
        .extend(LIVE_PATH.split('/'));
    validate_live_url(live.as_str())
}

fn is_loopback_host(host: Option<&str>) -> bool {
    let Some(host) = host else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>().is_ok_and(|addr| addr.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_and_loopback_http() {
        assert!(validate_base_url("https://api.strata.dev").is_ok());
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("http://127.0.0.1:9000").is_ok());
        assert!(validate_base_url("http://[::1]:9000").is_ok());
    }

    #[test]
    fn rejects_plain_http_to_remote_host() {
        let error = validate_base_url("http://api.strata.dev").unwrap_err();
        assert!(error.contains("must use https"));
    }

    #[test]
    fn rejects_ws_to_remote_host() {
        let error = validate_live_url("ws://push.strata.dev/live").unwrap_err();
        assert!(error.contains("must use wss"));
    }

    #[test]
    fn derives_push_endpoint_below_base_path() {
        let base = Url::parse("http://127.0.0.1:8080/api/").unwrap();
        assert_eq!(derive_live_url(&base).unwrap().as_str(), "ws://127.0.0.1:8080/api/v1/live");
    }

    #[test]
    fn debug_output_redacts_token() {
        let session = Session::new("https://api.strata.dev", "secret-token").unwrap();
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn handle_clones_share_replacement() {
        let handle = SessionHandle::new(Session::new("https://a.example", "t1").unwrap());
        let other = handle.clone();
        handle.replace(Session::new("https://b.example", "t2").unwrap());
        assert_eq!(other.current().token, "t2");
        assert_eq!(other.current().base_url.host_str(), Some("b.example"));
    }
}
