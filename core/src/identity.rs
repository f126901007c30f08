use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::IdentityError;
use crate::invocation::Invocation;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

// With a session secret the user id comes from a signed HS256 token and the
// body's user_id must agree with it. Without one, the body is taken at its word.
#[derive(Clone)]
pub enum IdentityPolicy {
    /// Body `user_id` is forwarded without verification.
    TrustCaller,
    Verify(DecodingKey),
}

impl std::fmt::Debug for IdentityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrustCaller => write!(f, "TrustCaller"),
            Self::Verify(_) => write!(f, "Verify(hs256)"),
        }
    }
}

impl IdentityPolicy {
    pub fn from_secret(secret: Option<&SecretString>) -> Self {
        match secret {
            Some(secret) => {
                Self::Verify(DecodingKey::from_secret(secret.expose_secret().as_bytes()))
            }
            None => Self::TrustCaller,
        }
    }

    /// Checks the bearer token (if required) and returns the invocation with
    /// its `user_id` set to the verified subject.
    pub fn bind(
        &self,
        invocation: Invocation,
        bearer: Option<&str>,
    ) -> Result<Invocation, IdentityError> {
        let key = match self {
            Self::TrustCaller => return Ok(invocation),
            Self::Verify(key) => key,
        };

        let token = bearer.ok_or(IdentityError::MissingToken)?;
        let data = decode::<Claims>(token, key, &Validation::new(Algorithm::HS256))
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        if data.claims.sub != invocation.user_id {
            return Err(IdentityError::SubjectMismatch {
                claimed: invocation.user_id,
            });
        }

        Ok(Invocation {
            user_id: data.claims.sub,
            ..invocation
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
