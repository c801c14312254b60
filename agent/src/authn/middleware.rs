//! Signature check applied per route

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Local;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::authn::signature::verify_signature;
use crate::errors::AgentError;
use crate::server::response::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Secret and suffix guarding one operation
#[derive(Clone)]
pub struct AuthGate {
    secret: Option<Arc<SecretString>>,
    suffix: Arc<str>,
}

impl AuthGate {
    pub fn new(secret: Option<&SecretString>, suffix: &str) -> Self {
        Self {
            secret: secret.map(|s| Arc::new(SecretString::from(s.expose_secret().to_string()))),
            suffix: Arc::from(suffix),
        }
    }

    /// Check the signature headers against today's date
    pub fn check(&self, headers: &HeaderMap) -> Result<(), AgentError> {
        let api_key = header_value(headers, API_KEY_HEADER);
        let signature = header_value(headers, SIGNATURE_HEADER);

        let (Some(api_key), Some(signature)) = (api_key, signature) else {
            warn!("Request without signature or API key");
            return Err(AgentError::AuthMissing);
        };

        let Some(secret) = &self.secret else {
            warn!("No secret configured for this operation, rejecting");
            return Err(AgentError::AuthInvalid);
        };

        let today = Local::now().date_naive();
        if verify_signature(
            secret.expose_secret().as_bytes(),
            api_key,
            today,
            &self.suffix,
            signature,
        ) {
            Ok(())
        } else {
            warn!("Invalid signature for API key {}", api_key);
            Err(AgentError::AuthInvalid)
        }
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("configured", &self.secret.is_some())
            .field("suffix", &self.suffix)
            .finish()
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// axum middleware: reject the request unless it carries a valid signature
pub async fn require_signature(State(gate): State<AuthGate>, request: Request, next: Next) -> Response {
    match gate.check(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}
