//! Authentication handshake.
//!
//! A connection starts unauthenticated. Each `authentication` envelope runs
//! one attempt:
//! 1. The peer address is checked against its recent failures
//! 2. The token is checked with the identity service (no lock held)
//! 3. On success the session is bound into the connection registry
//!
//! Rejected and errored attempts leave the session's registry state as it
//! was, so a client may retry as often as the rate limit allows.

use crate::identity::{IdentityVerifier, Verdict};
use crate::rate_limit::AuthRateLimiter;
use crate::registry::{ConnectionHandle, Registration};
use shuttler_core::{AuthenticationRequest, Response, ShuttlerResult};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Result of an attempt that reached a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The session is registered under `conn_id`.
    Authenticated { conn_id: u64 },
    /// The identity service refused the token.
    Rejected,
    /// Too many recent attempts from this peer; the token was not checked.
    RateLimited,
}

impl AuthOutcome {
    pub fn response(self) -> Response {
        match self {
            AuthOutcome::Authenticated { .. } => Response::authentication(true, false),
            AuthOutcome::Rejected => Response::authentication(false, false),
            AuthOutcome::RateLimited => Response::authentication(false, true),
        }
    }
}

/// Runs authentication attempts for all sessions.
pub struct Authenticator {
    verifier: Arc<dyn IdentityVerifier>,
    rate_limits: Arc<Mutex<AuthRateLimiter>>,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, rate_limits: Arc<Mutex<AuthRateLimiter>>) -> Self {
        Self {
            verifier,
            rate_limits,
        }
    }

    /// Run one attempt for the session owning `registration` and `handle`.
    ///
    /// `Err` means the identity service could not be consulted; the session
    /// should report an internal error and carry on.
    pub async fn authenticate(
        &self,
        request: AuthenticationRequest,
        remote_ip: Option<IpAddr>,
        registration: &mut Registration,
        handle: &ConnectionHandle,
    ) -> ShuttlerResult<AuthOutcome> {
        if let Some(ip) = remote_ip {
            if self.rate_limits.lock().await.is_limited(ip) {
                warn!(remote = %ip, "authentication rate limited");
                return Ok(AuthOutcome::RateLimited);
            }
        }

        let verdict = self.verifier.verify(&request.token).await;
        match verdict {
            Ok(Verdict::Authorized) => {
                let previous = registration.id();
                let conn_id = registration.bind(handle.clone(), request.token);
                info!(conn_id, previous, "authentication OK");
                Ok(AuthOutcome::Authenticated { conn_id })
            }
            Ok(Verdict::Denied { status }) => {
                warn!(status, conn_id = registration.id(), "authentication rejected");
                self.record_failure(remote_ip).await;
                Ok(AuthOutcome::Rejected)
            }
            Err(e) => {
                self.record_failure(remote_ip).await;
                Err(e)
            }
        }
    }

    async fn record_failure(&self, remote_ip: Option<IpAddr>) {
        if let Some(ip) = remote_ip {
            self.rate_limits.lock().await.record_failure(ip);
        }
    }
}

/// Verifiers for tests that do not need an HTTP service.
#[cfg(test)]
pub(crate) mod fake {
    use crate::identity::{IdentityVerifier, Verdict};
    use shuttler_core::{ShuttlerError, ShuttlerResult};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts a fixed set of tokens; `"unreachable"` simulates an outage.
    #[derive(Debug, Default)]
    pub struct FakeVerifier {
        valid: Vec<String>,
        calls: AtomicUsize,
    }

    impl FakeVerifier {
        pub fn accepting(tokens: &[&str]) -> Self {
            Self {
                valid: tokens.iter().map(|t| t.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IdentityVerifier for FakeVerifier {
        fn verify<'a>(
            &'a self,
            token: &'a str,
        ) -> Pin<Box<dyn Future<Output = ShuttlerResult<Verdict>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if token == "unreachable" {
                    return Err(ShuttlerError::Identity("connection refused".into()));
                }
                if self.valid.iter().any(|t| t == token) {
                    Ok(Verdict::Authorized)
                } else {
                    Ok(Verdict::Denied { status: 401 })
                }
            })
        }
    }
}
