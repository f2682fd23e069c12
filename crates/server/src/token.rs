//! Bearer token issuance and verification (HS256 JWT).
//!
//! Claims are signed, not encrypted: anyone holding a token can read the user
//! id and email, so nothing secret goes into them.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64, // user_id
    pub email: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    expiry_hours: u64,
}

impl TokenKeys {
    pub fn new(auth: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        if auth.token_expiry_hours == 0 {
            validation.validate_exp = false;
            validation.required_spec_claims.clear();
        }

        Self {
            encoding: EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
            validation,
            expiry_hours: auth.token_expiry_hours,
        }
    }

    pub fn issue(&self, user_id: i64, email: &str) -> Result<String, TokenError> {
        let now = chrono::Utc::now();
        let exp = (self.expiry_hours > 0)
            .then(|| (now + chrono::Duration::hours(self.expiry_hours as i64)).timestamp());

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp(),
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Sign)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secret: &str, expiry_hours: u64) -> TokenKeys {
        TokenKeys::new(&AuthConfig {
            jwt_secret: secret.to_string(),
            token_expiry_hours: expiry_hours,
        })
    }

    #[test]
    fn test_issue_then_verify() {
        let keys = keys("secret", 24);
        let token = keys.issue(7, "a@x.com").unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "a@x.com");
        assert!(claims.exp.unwrap() > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = keys("secret", 24).issue(7, "a@x.com").unwrap();
        assert!(keys("other", 24).verify(&token).is_err());
    }

    #[test]
    fn test_corrupted_token_rejected() {
        let keys = keys("secret", 24);
        let token = keys.issue(7, "a@x.com").unwrap();

        // Flip one character in each segment
        for segment in 0..3 {
            let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
            let part = &mut parts[segment];
            let last = part.pop().unwrap();
            part.push(if last == 'A' { 'B' } else { 'A' });
            let tampered = parts.join(".");
            assert!(keys.verify(&tampered).is_err(), "segment {} accepted", segment);
        }

        assert!(keys.verify("").is_err());
        assert!(keys.verify("not-a-jwt").is_err());
        assert!(keys.verify(&format!("{}x", token)).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = keys("secret", 1);
        let claims = Claims {
            sub: 1,
            email: "a@x.com".to_string(),
            iat: 0,
            exp: Some(chrono::Utc::now().timestamp() - 60),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn test_no_expiry_when_disabled() {
        let keys = keys("secret", 0);
        let token = keys.issue(3, "c@x.com").unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.exp, None);
    }
}
