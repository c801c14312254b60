//! HMAC request signatures
//!
//! A caller signs `{api_key}_{yyyyMMdd}_{suffix}` with the operation's shared
//! secret using HMAC-SHA256 and sends the base64 digest in `X-Signature`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Local, NaiveDate};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::AgentError;

type HmacSha256 = Hmac<Sha256>;

/// The string that gets signed
pub fn signing_message(api_key: &str, date: NaiveDate, suffix: &str) -> String {
    format!("{}_{}_{}", api_key, date.format("%Y%m%d"), suffix)
}

fn mac_for(
    secret: &[u8],
    api_key: &str,
    date: NaiveDate,
    suffix: &str,
) -> Result<HmacSha256, AgentError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AgentError::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(signing_message(api_key, date, suffix).as_bytes());
    Ok(mac)
}

/// Base64 signature for `api_key` on `date`
pub fn compute_signature(
    secret: &[u8],
    api_key: &str,
    date: NaiveDate,
    suffix: &str,
) -> Result<String, AgentError> {
    let mac = mac_for(secret, api_key, date, suffix)?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Signature for `api_key` using today's local date
pub fn compute_signature_today(secret: &[u8], api_key: &str, suffix: &str) -> Result<String, AgentError> {
    compute_signature(secret, api_key, Local::now().date_naive(), suffix)
}

/// Constant-time check of a presented base64 signature. Undecodable input
/// never matches.
pub fn verify_signature(
    secret: &[u8],
    api_key: &str,
    date: NaiveDate,
    suffix: &str,
    presented: &str,
) -> bool {
    let Ok(provided) = STANDARD.decode(presented.trim()) else {
        return false;
    };
    mac_for(secret, api_key, date, suffix)
        .is_ok_and(|mac| mac.verify_slice(&provided).is_ok())
}
