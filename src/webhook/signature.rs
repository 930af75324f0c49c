//! Svix-style webhook signatures.
//!
//! The signed content is `"{svix-id}.{svix-timestamp}.{body}"`, the MAC is
//! HMAC-SHA256 keyed with the base64 part of a `whsec_...` secret, and the
//! `svix-signature` header lists space-separated `v1,<base64>` entries.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{DeskError, DeskResult};

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Debug, Clone, Copy)]
pub struct WebhookHeaders<'a> {
  pub id: &'a str,
  pub timestamp: &'a str,
  pub signature: &'a str,
}

pub struct WebhookVerifier {
  key: Vec<u8>,
  tolerance_secs: u64,
}

impl WebhookVerifier {
  pub fn new(secret: &str, tolerance_secs: u64) -> DeskResult<Self> {
    let encoded = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
    let key = STANDARD
      .decode(encoded.trim())
      .map_err(|e| DeskError::Validation(format!("webhook secret is not base64: {}", e)))?;
    if key.is_empty() {
      return Err(DeskError::Validation("webhook secret is empty".to_string()));
    }
    Ok(Self {
      key,
      tolerance_secs,
    })
  }

  fn mac(&self, id: &str, timestamp: &str, body: &[u8]) -> DeskResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(&self.key)
      .map_err(|e| DeskError::Webhook(format!("hmac init: {}", e)))?;
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
  }

  /// `v1,<base64>` signature for a payload.
  pub fn sign(&self, id: &str, timestamp: i64, body: &[u8]) -> DeskResult<String> {
    let mac = self.mac(id, &timestamp.to_string(), body)?;
    Ok(format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes())))
  }

  pub fn verify(
    &self,
    headers: &WebhookHeaders<'_>,
    body: &[u8],
    now: DateTime<Utc>,
  ) -> DeskResult<()> {
    let sent: i64 = headers
      .timestamp
      .trim()
      .parse()
      .map_err(|_| DeskError::Webhook("invalid timestamp header".to_string()))?;
    let skew = now.timestamp().checked_sub(sent).map(i64::unsigned_abs);
    if !skew.is_some_and(|skew| skew <= self.tolerance_secs) {
      return Err(DeskError::Webhook("timestamp outside tolerance".to_string()));
    }

    let mac = self.mac(headers.id, headers.timestamp.trim(), body)?;
    let matched = headers
      .signature
      .split_whitespace()
      .filter_map(|entry| entry.split_once(','))
      .filter(|(version, _)| *version == "v1")
      .filter_map(|(_, sig)| STANDARD.decode(sig).ok())
      .any(|sig| mac.clone().verify_slice(&sig).is_ok());

    if matched {
      Ok(())
    } else {
      Err(DeskError::Webhook("no matching signature".to_string()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
  const BODY: &[u8] = br#"{"type":"user.created","data":{"id":"user_1"}}"#;

  fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
  }

  fn signed(verifier: &WebhookVerifier, ts: i64) -> (String, String) {
    (ts.to_string(), verifier.sign("msg_1", ts, BODY).unwrap())
  }

  #[test]
  fn test_valid_signature() {
    let verifier = WebhookVerifier::new(SECRET, 300).unwrap();
    let (ts, sig) = signed(&verifier, now().timestamp());
    let headers = WebhookHeaders {
      id: "msg_1",
      timestamp: &ts,
      signature: &sig,
    };
    verifier.verify(&headers, BODY, now()).unwrap();
  }

  #[test]
  fn test_any_listed_signature_may_match() {
    let verifier = WebhookVerifier::new(SECRET, 300).unwrap();
    let (ts, sig) = signed(&verifier, now().timestamp());
    let list = format!("v1,AAAA v2,whatever {}", sig);
    let headers = WebhookHeaders {
      id: "msg_1",
      timestamp: &ts,
      signature: &list,
    };
    assert!(verifier.verify(&headers, BODY, now()).is_ok());
  }

  #[test]
  fn test_tampered_body_is_rejected() {
    let verifier = WebhookVerifier::new(SECRET, 300).unwrap();
    let (ts, sig) = signed(&verifier, now().timestamp());
    let headers = WebhookHeaders {
      id: "msg_1",
      timestamp: &ts,
      signature: &sig,
    };
    let err = verifier
      .verify(&headers, br#"{"type":"user.deleted"}"#, now())
      .unwrap_err();
    assert!(matches!(err, DeskError::Webhook(_)));
  }

  #[test]
  fn test_other_secret_is_rejected() {
    let signer = WebhookVerifier::new("whsec_c2VjcmV0LW9uZQ==", 300).unwrap();
    let verifier = WebhookVerifier::new(SECRET, 300).unwrap();
    let (ts, sig) = signed(&signer, now().timestamp());
    let headers = WebhookHeaders {
      id: "msg_1",
      timestamp: &ts,
      signature: &sig,
    };
    assert!(verifier.verify(&headers, BODY, now()).is_err());
  }

  #[test]
  fn test_expired_and_future_timestamps() {
    let verifier = WebhookVerifier::new(SECRET, 300).unwrap();
    for offset in [-301, 301] {
      let (ts, sig) = signed(&verifier, now().timestamp() + offset);
      let headers = WebhookHeaders {
        id: "msg_1",
        timestamp: &ts,
        signature: &sig,
      };
      let err = verifier.verify(&headers, BODY, now()).unwrap_err();
      assert_eq!(
        err,
        DeskError::Webhook("timestamp outside tolerance".to_string())
      );
    }
  }

  #[test]
  fn test_extreme_timestamps_are_rejected() {
    let outside = DeskError::Webhook("timestamp outside tolerance".to_string());
    for tolerance in [300, u64::MAX] {
      let verifier = WebhookVerifier::new(SECRET, tolerance).unwrap();
      let (ts, sig) = signed(&verifier, i64::MIN);
      let headers = WebhookHeaders {
        id: "msg_1",
        timestamp: &ts,
        signature: &sig,
      };
      assert_eq!(verifier.verify(&headers, BODY, now()).unwrap_err(), outside);
    }

    let verifier = WebhookVerifier::new(SECRET, 300).unwrap();
    let (ts, sig) = signed(&verifier, i64::MAX);
    let headers = WebhookHeaders {
      id: "msg_1",
      timestamp: &ts,
      signature: &sig,
    };
    assert_eq!(verifier.verify(&headers, BODY, now()).unwrap_err(), outside);
  }

  #[test]
  fn test_bad_secret() {
    assert!(WebhookVerifier::new("whsec_***", 300).is_err());
    assert!(WebhookVerifier::new("whsec_", 300).is_err());
  }
}
