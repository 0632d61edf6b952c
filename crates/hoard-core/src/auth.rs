//! Credentials for authenticated requests.
//!
//! Obtaining a token (OAuth handshake, browser PIN flow, ...) happens outside
//! this crate. The transport only asks a [`Credentials`] value for the
//! headers to attach to each GET; failure to produce them is fatal for the run.

use std::collections::BTreeMap;

use crate::config::AuthConfig;

/// Environment variable that overrides the configured bearer token.
pub const TOKEN_ENV: &str = "HOARD_TOKEN";

/// Credentials could not be produced (missing, expired, unreadable).
#[derive(Debug, Clone, thiserror::Error)]
#[error("credentials unavailable: {0}")]
pub struct CredentialsError(pub String);

/// Source of request headers for authenticated GETs.
pub trait Credentials: Send + Sync {
    /// Headers as `(name, value)` pairs.
    fn headers(&self) -> Result<Vec<(String, String)>, CredentialsError>;
}

/// No authentication (public URLs, pre-signed links).
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Credentials for Anonymous {
    fn headers(&self) -> Result<Vec<(String, String)>, CredentialsError> {
        Ok(Vec::new())
    }
}

/// Fixed bearer token plus extra headers, resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    bearer_token: Option<String>,
    headers: BTreeMap<String, String>,
}

impl StaticCredentials {
    pub fn new(bearer_token: Option<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            bearer_token,
            headers,
        }
    }

    /// From the `[auth]` config section; `HOARD_TOKEN` wins over the file.
    pub fn from_config(cfg: Option<&AuthConfig>) -> Self {
        let env_token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());
        let (file_token, headers) = match cfg {
            Some(a) => (a.bearer_token.clone(), a.headers.clone()),
            None => (None, BTreeMap::new()),
        };
        Self::new(env_token.or(file_token), headers)
    }
}

impl Credentials for StaticCredentials {
    fn headers(&self) -> Result<Vec<(String, String)>, CredentialsError> {
        let mut out: Vec<(String, String)> = Vec::with_capacity(self.headers.len() + 1);
        if let Some(token) = &self.bearer_token {
            let token = token.trim();
            if token.is_empty() || token.contains(['\r', '\n']) {
                return Err(CredentialsError("bearer token is malformed".into()));
            }
            out.push(("Authorization".into(), format!("Bearer {}", token)));
        }
        for (k, v) in &self.headers {
            if k.contains(['\r', '\n', ':']) || v.contains(['\r', '\n']) {
                return Err(CredentialsError(format!("header {:?} is malformed", k)));
            }
            out.push((k.trim().to_string(), v.trim().to_string()));
        }
        Ok(out)
    }
}
