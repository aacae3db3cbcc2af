use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Claims of an access token issued by the identity service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,       // user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,        // expiration timestamp
    pub iat: i64,        // issued at timestamp
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    fn token(sub: Uuid, exp_offset: Duration, secret: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub,
            email: None,
            exp: (now + exp_offset).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_valid_token() {
        let user = Uuid::new_v4();
        let claims = verify_token(&token(user, Duration::hours(1), "s3cret"), "s3cret").unwrap();
        assert_eq!(claims.sub, user);
    }

    #[test]
    fn test_wrong_secret() {
        let err = verify_token(&token(Uuid::new_v4(), Duration::hours(1), "a"), "b").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token() {
        let err = verify_token(&token(Uuid::new_v4(), Duration::hours(-2), "s3cret"), "s3cret")
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
