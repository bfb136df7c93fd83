//! Signed bearer tokens.
//!
//! Tokens are HMAC-signed JWTs carrying `sub`, an advisory `role`, `iat` and `exp`. Nothing
//! is kept server-side: a token dies by expiring or by failing its signature check. The
//! signing algorithm is fixed at construction and the header's `alg` must name exactly
//! that algorithm; anything else (including `none`) is a bad signature.

use std::collections::HashSet;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::PortalConfig;

/// Lifetime used when the issuer is built without one.
pub const FALLBACK_TTL: Duration = Duration::from_secs(15 * 60);

pub const TOKEN_TYPE: &str = "bearer";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Role at issuance. Informational only; gates re-read the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature or algorithm mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token has no subject")]
    MissingSubject,
}

/// What a valid token tells us: who, and (advisory) which role they had at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedToken {
    pub subject: String,
    pub role: Option<String>,
    pub expires_at: DateTime<Utc>,
}

fn alg_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        _ => "unsupported",
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::BadSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => TokenError::MissingSubject,
        _ => TokenError::Malformed,
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], algorithm: Algorithm, ttl: Option<Duration>) -> Self {
        let mut validation = Validation::new(algorithm);
        // Expiry is checked by `validate_at` against an explicit clock, with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: ttl.unwrap_or(FALLBACK_TTL),
        }
    }

    pub fn from_config(cfg: &PortalConfig) -> Self {
        Self::new(cfg.secret_key.as_bytes(), cfg.algorithm, Some(cfg.token_ttl))
    }

    pub fn algorithm(&self) -> Algorithm { self.algorithm }

    pub fn ttl(&self) -> Duration { self.ttl }

    pub fn issue(&self, subject: &str, role: &str) -> anyhow::Result<String> {
        self.issue_at(subject, role, Utc::now())
    }

    pub fn issue_at(&self, subject: &str, role: &str, now: DateTime<Utc>) -> anyhow::Result<String> {
        let ttl = chrono::Duration::from_std(self.ttl)?;
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow::anyhow!("token lifetime {:?} overflows the clock", self.ttl))?;
        let claims = Claims {
            sub: Some(subject.to_string()),
            role: Some(role.to_string()),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding)?)
    }

    pub fn validate(&self, token: &str) -> Result<ValidatedToken, TokenError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<ValidatedToken, TokenError> {
        self.check_pinned_algorithm(token)?;
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(classify)?
            .claims;
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        let subject = claims.sub.filter(|s| !s.is_empty()).ok_or(TokenError::MissingSubject)?;
        let expires_at = Utc.timestamp_opt(claims.exp, 0).single().ok_or(TokenError::Malformed)?;
        Ok(ValidatedToken { subject, role: claims.role, expires_at })
    }

    /// Reject any header whose `alg` differs from ours before the library sees it, so that
    /// algorithm names the library cannot even parse (`none`) are reported the same way as
    /// a swapped HMAC variant.
    fn check_pinned_algorithm(&self, token: &str) -> Result<(), TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(_), Some(_), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
            return Err(TokenError::Malformed);
        };
        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(header.trim_end_matches('='))
            .map_err(|_| TokenError::Malformed)?;
        let value: serde_json::Value = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;
        match value.get("alg").and_then(|a| a.as_str()) {
            Some(alg) if alg == alg_name(self.algorithm) => Ok(()),
            Some(_) => Err(TokenError::BadSignature),
            None => Err(TokenError::Malformed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"unit-test-secret-0123456789abcdef";

    fn issuer(ttl_minutes: u64) -> TokenIssuer {
        TokenIssuer::new(SECRET, Algorithm::HS256, Some(Duration::from_secs(ttl_minutes * 60)))
    }

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    #[test]
    fn roundtrip_carries_subject_and_role() {
        let t = issuer(30);
        let token = t.issue("alice", "admin").unwrap();
        let v = t.validate(&token).unwrap();
        assert_eq!(v.subject, "alice");
        assert_eq!(v.role.as_deref(), Some("admin"));
        assert!(v.expires_at > Utc::now());
    }

    #[test]
    fn expiry_boundary() {
        let t = issuer(30);
        let issued = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
        let token = t.issue_at("bob", "solicitante", issued).unwrap();
        let life = chrono::Duration::minutes(30);
        let eps = chrono::Duration::seconds(1);
        assert!(t.validate_at(&token, issued + life - eps).is_ok());
        assert_eq!(t.validate_at(&token, issued + life).unwrap_err(), TokenError::Expired);
        assert_eq!(t.validate_at(&token, issued + life + eps).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn constructor_without_lifetime_uses_fallback() {
        let t = TokenIssuer::new(SECRET, Algorithm::HS256, None);
        assert_eq!(t.ttl(), FALLBACK_TTL);
        let issued = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let token = t.issue_at("carol", "supervisor", issued).unwrap();
        assert!(t.validate_at(&token, issued + chrono::Duration::minutes(14)).is_ok());
        assert_eq!(t.validate_at(&token, issued + chrono::Duration::minutes(16)).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn oversized_lifetime_is_an_error_not_a_panic() {
        let t = TokenIssuer::new(SECRET, Algorithm::HS256, Some(Duration::from_secs(1_000_000_000_000 * 60)));
        assert!(t.issue("alice", "admin").is_err());
        let t = TokenIssuer::new(SECRET, Algorithm::HS256, Some(Duration::from_secs(u64::MAX)));
        assert!(t.issue("alice", "admin").is_err());
    }

    #[test]
    fn foreign_secret_is_bad_signature() {
        let other = TokenIssuer::new(b"another-secret-entirely-000000000", Algorithm::HS256, None);
        let token = other.issue("alice", "admin").unwrap();
        assert_eq!(issuer(30).validate(&token).unwrap_err(), TokenError::BadSignature);
    }

    #[test]
    fn swapped_algorithm_is_bad_signature() {
        // Same secret, different HMAC variant.
        let hs512 = TokenIssuer::new(SECRET, Algorithm::HS512, None);
        let token = hs512.issue("alice", "admin").unwrap();
        assert_eq!(issuer(30).validate(&token).unwrap_err(), TokenError::BadSignature);

        // Unsigned token claiming alg=none.
        let good = issuer(30).issue("alice", "admin").unwrap();
        let payload = good.split('.').nth(1).unwrap();
        let forged = format!("{}.{}.", b64(br#"{"alg":"none","typ":"JWT"}"#), payload);
        assert_eq!(issuer(30).validate(&forged).unwrap_err(), TokenError::BadSignature);

        // Header rewritten to another algorithm but original signature kept.
        let sig = good.split('.').nth(2).unwrap();
        let rewritten = format!("{}.{}.{}", b64(br#"{"alg":"HS384","typ":"JWT"}"#), payload, sig);
        assert_eq!(issuer(30).validate(&rewritten).unwrap_err(), TokenError::BadSignature);
    }

    #[test]
    fn tampered_payload_is_bad_signature() {
        let t = issuer(30);
        let mine = t.issue("mallory", "solicitante").unwrap();
        let exp = Utc::now().timestamp() + 3600;
        let promoted = b64(format!(r#"{{"sub":"mallory","role":"admin","iat":0,"exp":{exp}}}"#).as_bytes());
        let mut parts: Vec<&str> = mine.split('.').collect();
        parts[1] = promoted.as_str();
        assert_eq!(t.validate(&parts.join(".")).unwrap_err(), TokenError::BadSignature);
    }

    #[test]
    fn garbage_is_malformed() {
        let t = issuer(30);
        for bad in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            assert_eq!(t.validate(bad).unwrap_err(), TokenError::Malformed, "{bad}");
        }
    }

    #[test]
    fn missing_or_empty_subject() {
        let t = issuer(30);
        let exp = Utc::now().timestamp() + 600;
        for sub in [None, Some(String::new())] {
            let claims = Claims { sub, role: Some("admin".into()), iat: 0, exp };
            let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(SECRET)).unwrap();
            assert_eq!(t.validate(&token).unwrap_err(), TokenError::MissingSubject);
        }
    }

    #[test]
    fn missing_expiry_is_malformed() {
        let t = issuer(30);
        let token = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({"sub": "alice"}),
            &EncodingKey::from_secret(SECRET),
        ).unwrap();
        assert_eq!(t.validate(&token).unwrap_err(), TokenError::Malformed);
    }
}
