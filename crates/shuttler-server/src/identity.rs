//! Client for the external identity service.
//!
//! A token is valid when `POST /v1/control/hello` with
//! `Authorization: Token <token>` answers 200.

use shuttler_core::{ShuttlerError, ShuttlerResult};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Path of the token check endpoint on the identity service.
pub const HELLO_PATH: &str = "/v1/control/hello";

/// Outcome of a completed token check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Authorized,
    /// The service answered, but not with 200.
    Denied { status: u16 },
}

/// Validates bearer tokens.
///
/// An `Err` means the check itself could not be completed (network failure,
/// timeout); a rejected token is `Ok(Verdict::Denied { .. })`.
pub trait IdentityVerifier: Send + Sync {
    fn verify<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = ShuttlerResult<Verdict>> + Send + 'a>>;
}

/// [`IdentityVerifier`] backed by the identity service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpIdentityVerifier {
    hello_url: String,
    http_client: reqwest::Client,
}

impl HttpIdentityVerifier {
    /// `base_url` is the service root, e.g. `http://annotatron-service`.
    pub fn new(base_url: &str, timeout: Duration) -> ShuttlerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ShuttlerError::Config(format!("identity client: {e}")))?;
        Ok(Self {
            hello_url: format!("{}{HELLO_PATH}", base_url.trim_end_matches('/')),
            http_client,
        })
    }

    pub fn hello_url(&self) -> &str {
        &self.hello_url
    }
}

impl IdentityVerifier for HttpIdentityVerifier {
    fn verify<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = ShuttlerResult<Verdict>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .http_client
                .post(&self.hello_url)
                .header(reqwest::header::AUTHORIZATION, format!("Token {token}"))
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ShuttlerError::Timeout
                    } else {
                        ShuttlerError::Identity(format!("hello request failed: {e}"))
                    }
                })?;

            let status = response.status();
            debug!(url = %self.hello_url, status = %status, "identity check answered");
            if status == reqwest::StatusCode::OK {
                Ok(Verdict::Authorized)
            } else {
                Ok(Verdict::Denied {
                    status: status.as_u16(),
                })
            }
        })
    }
}
