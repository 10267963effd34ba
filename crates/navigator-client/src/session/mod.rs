// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Session and identity handling.
//!
//! The [`Session`] is constructed once at startup from the persisted bearer
//! token and passed by `Arc` to every consumer. Identity is derived by
//! decoding the token's payload segment; no signature verification happens
//! client-side, the trust boundary is the issuing service. Invalidation
//! (logout or any observed 401) is announced on a broadcast channel rather
//! than through a side-effecting interceptor, so the UI can react exactly
//! once.

use std::sync::RwLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The bearer token was cleared, either by logout or an observed 401.
    Invalidated,
}

/// Identity claims carried in the bearer token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl UserInfo {
    /// Best display name available from the claims.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.nickname.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.sub)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not a three-segment JWT")]
    Malformed,
    #[error("payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not a valid claims object: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_token(token: &str) -> Result<UserInfo, TokenError> {
    let payload = token.split('.').nth(1).ok_or(TokenError::Malformed)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// External identity provider endpoints.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider hostname, e.g. `dev-xyz.us.auth0.com`.
    pub domain: String,
    pub client_id: String,
    /// Where the provider sends the browser after authorization.
    pub redirect_uri: String,
    /// Where the provider sends the browser after logout.
    pub return_to: String,
}

/// Bearer-token session shared across the application.
#[derive(Debug)]
pub struct Session {
    token: RwLock<Option<String>>,
    provider: ProviderConfig,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    #[must_use]
    pub fn new(provider: ProviderConfig, token: Option<String>) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            token: RwLock::new(token.filter(|t| !t.is_empty())),
            provider,
            events,
        }
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        self.token
            .read()
            .expect("Session token lock poisoned - unrecoverable state")
            .clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.bearer_token().is_some()
    }

    /// Store a freshly obtained token.
    pub fn set_token(&self, token: String) {
        *self
            .token
            .write()
            .expect("Session token lock poisoned - unrecoverable state") = Some(token);
    }

    /// Decode the current token into identity claims.
    ///
    /// Derived on every call; `None` when unauthenticated or undecodable.
    #[must_use]
    pub fn identity(&self) -> Option<UserInfo> {
        let token = self.bearer_token()?;
        decode_token(&token).ok()
    }

    /// Clear the token and announce [`SessionEvent::Invalidated`].
    ///
    /// Idempotent: a second call with no token present announces nothing.
    pub fn invalidate(&self) {
        let had_token = self
            .token
            .write()
            .expect("Session token lock poisoned - unrecoverable state")
            .take()
            .is_some();
        if had_token {
            // No receivers is fine, e.g. in headless use
            let _ = self.events.send(SessionEvent::Invalidated);
        }
    }

    /// Hostname to build provider URLs against. `None` when unconfigured;
    /// `Url::parse` alone would accept an empty authority here.
    fn provider_host(&self) -> Option<&str> {
        let domain = self.provider.domain.trim();
        if domain.is_empty() {
            None
        } else {
            Some(domain)
        }
    }

    /// Authorization-code URL to open in the system browser. `None` when the
    /// provider domain is missing or malformed.
    #[must_use]
    pub fn login_url(&self) -> Option<String> {
        let mut url =
            reqwest::Url::parse(&format!("https://{}/authorize", self.provider_host()?)).ok()?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", &self.provider.redirect_uri)
            .append_pair("scope", "openid profile email");
        Some(url.to_string())
    }

    /// Deauthorization URL to open in the system browser. `None` when the
    /// provider domain is missing or malformed.
    #[must_use]
    pub fn logout_url(&self) -> Option<String> {
        let mut url =
            reqwest::Url::parse(&format!("https://{}/v2/logout", self.provider_host()?)).ok()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("returnTo", &self.provider.return_to);
        Some(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        ProviderConfig {
            domain: "login.example.com".to_string(),
            client_id: "abc123".to_string(),
            redirect_uri: "http://localhost:5173/redirect".to_string(),
            return_to: "http://localhost:5173".to_string(),
        }
    }

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode("sig")
        )
    }

    #[test]
    fn test_decode_token_extracts_claims() {
        let token = token_with_payload(
            r#"{"sub":"auth0|42","name":"Amelia","email":"amelia@example.com","exp":1900000000}"#,
        );
        let info = decode_token(&token).unwrap();
        assert_eq!(info.sub, "auth0|42");
        assert_eq!(info.display_name(), "Amelia");
        assert_eq!(info.exp, Some(1_900_000_000));
    }

    #[test]
    fn test_decode_token_rejects_garbage() {
        assert!(matches!(decode_token("not-a-jwt"), Err(TokenError::Malformed)));
        assert!(decode_token("a.!!!.c").is_err());
        let token = token_with_payload("[1,2,3]");
        assert!(matches!(decode_token(&token), Err(TokenError::Claims(_))));
    }

    #[test]
    fn test_identity_derives_from_current_token() {
        let session = Session::new(provider(), None);
        assert!(session.identity().is_none());

        session.set_token(token_with_payload(r#"{"sub":"auth0|7","nickname":"amy"}"#));
        let info = session.identity().unwrap();
        assert_eq!(info.display_name(), "amy");
    }

    #[test]
    fn test_invalidate_clears_and_announces_once() {
        let session = Session::new(provider(), Some("x.y.z".to_string()));
        let mut events = session.subscribe();

        session.invalidate();
        session.invalidate();

        assert!(!session.is_authenticated());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Invalidated);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_login_url_encodes_redirect() {
        let session = Session::new(provider(), None);
        let url = session.login_url().unwrap();
        assert!(url.starts_with("https://login.example.com/authorize?"));
        assert!(url.contains("client_id=abc123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5173%2Fredirect"));
        assert!(url.contains("scope=openid+profile+email"));
    }

    #[test]
    fn test_login_url_requires_a_domain() {
        let session = Session::new(
            ProviderConfig {
                domain: String::new(),
                ..provider()
            },
            None,
        );
        assert!(session.login_url().is_none());
        assert!(session.logout_url().is_none());

        let blank = Session::new(
            ProviderConfig {
                domain: "   ".to_string(),
                ..provider()
            },
            None,
        );
        assert!(blank.login_url().is_none());
    }

    #[test]
    fn test_empty_persisted_token_is_unauthenticated() {
        let session = Session::new(provider(), Some(String::new()));
        assert!(!session.is_authenticated());
    }
}
