use crate::core::errors::TripsplitError;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // User ID
    pub exp: usize,  // Expiration timestamp
}

/// Validates HS256 bearer tokens issued by the identity provider.
pub struct JwtService {
    secret: String,
}

impl JwtService {
    pub fn new(secret: String) -> Self {
        JwtService { secret }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, TripsplitError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| TripsplitError::Unauthenticated(format!("Invalid token: {}", e)))?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(TripsplitError::Unauthenticated("Token has no subject".to_string()));
        }
        Ok(token_data.claims)
    }
}

/// Mint an HS256 token for `user_id`, the way the identity provider does.
#[cfg(test)]
pub(crate) fn issue_token(secret: &str, user_id: &str, ttl: std::time::Duration) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    let claims = Claims {
        sub: user_id.to_string(),
        exp: (SystemTime::now().duration_since(UNIX_EPOCH).unwrap() + ttl).as_secs() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn issued_tokens_validate() {
        let jwt = JwtService::new("secret".to_string());
        let token = issue_token("secret", "alice", Duration::from_secs(60));
        assert_eq!(jwt.validate_token(&token).unwrap().sub, "alice");
    }

    #[test]
    fn foreign_tokens_are_unauthenticated() {
        let token = issue_token("other", "alice", Duration::from_secs(60));
        let jwt = JwtService::new("secret".to_string());
        assert!(matches!(jwt.validate_token(&token), Err(TripsplitError::Unauthenticated(_))));
        assert!(matches!(jwt.validate_token("garbage"), Err(TripsplitError::Unauthenticated(_))));
    }

    #[test]
    fn tokens_without_subject_are_rejected() {
        let jwt = JwtService::new("secret".to_string());
        let token = issue_token("secret", "  ", Duration::from_secs(60));
        assert!(matches!(jwt.validate_token(&token), Err(TripsplitError::Unauthenticated(_))));
    }
}
