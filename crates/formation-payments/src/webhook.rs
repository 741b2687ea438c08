//! Inbound webhook authentication.
//!
//! The provider signs `"<t>.<raw body>"` with HMAC-SHA256 and sends the result
//! as `Signature: t=<unix seconds>,v1=<hex>`. Several `v1` entries may be
//! present while a secret is being rotated; any one matching is enough.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Lower-cased name of the header carrying the signature.
pub const SIGNATURE_HEADER: &str = "signature";

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// A request body whose signature has been checked.
///
/// Only [`WebhookVerifier`] can produce one, so anything that accepts a
/// `VerifiedPayload` cannot run on unauthenticated input.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedPayload<'a> {
  body:      &'a [u8],
  timestamp: i64,
}

impl<'a> VerifiedPayload<'a> {
  pub fn body(&self) -> &'a [u8] { self.body }

  pub fn timestamp(&self) -> i64 { self.timestamp }
}

#[derive(Clone)]
pub struct WebhookVerifier {
  secret:    Vec<u8>,
  tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WebhookVerifier")
      .field("tolerance", &self.tolerance)
      .finish_non_exhaustive()
  }
}

struct ParsedHeader {
  timestamp:  i64,
  signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<ParsedHeader, SignatureError> {
  let mut timestamp = None;
  let mut signatures = Vec::new();

  for part in header.split(',') {
    let Some((key, value)) = part.trim().split_once('=') else {
      return Err(SignatureError::Malformed);
    };
    match key {
      "t" => {
        let t = value.parse::<i64>().map_err(|_| SignatureError::Malformed)?;
        timestamp.get_or_insert(t);
      }
      // Undecodable entries can never match; keep looking at the rest.
      "v1" => {
        if let Ok(sig) = hex::decode(value) {
          signatures.push(sig);
        }
      }
      _ => {}
    }
  }

  match timestamp {
    Some(timestamp) if !signatures.is_empty() => Ok(ParsedHeader { timestamp, signatures }),
    _ => Err(SignatureError::Malformed),
  }
}

impl WebhookVerifier {
  pub fn new(secret: impl Into<Vec<u8>>, tolerance: Duration) -> Self {
    Self { secret: secret.into(), tolerance }
  }

  fn mac(&self, timestamp: i64, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
      HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
  }

  pub fn verify<'a>(
    &self,
    body: &'a [u8],
    header: Option<&str>,
  ) -> Result<VerifiedPayload<'a>, SignatureError> {
    self.verify_at(body, header, Utc::now())
  }

  /// [`verify`](Self::verify) against an explicit clock.
  pub fn verify_at<'a>(
    &self,
    body: &'a [u8],
    header: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<VerifiedPayload<'a>, SignatureError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(SignatureError::Missing)?;
    let parsed = parse_header(header)?;

    let mac = self.mac(parsed.timestamp, body)?;
    let matched = parsed.signatures.iter().any(|sig| mac.clone().verify_slice(sig).is_ok());
    if !matched {
      return Err(SignatureError::Mismatch);
    }

    let age = now.timestamp() - parsed.timestamp;
    if age.abs() > self.tolerance.num_seconds() {
      return Err(SignatureError::Expired);
    }

    Ok(VerifiedPayload { body, timestamp: parsed.timestamp })
  }

  /// The header value the provider would send for `body` at `timestamp`.
  pub fn sign(&self, body: &[u8], timestamp: i64) -> Result<String, SignatureError> {
    let tag = self.mac(timestamp, body)?.finalize().into_bytes();
    Ok(format!("t={timestamp},v1={}", hex::encode(tag)))
  }
}
