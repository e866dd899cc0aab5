use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;

use super::claims::{Claims, TokenKind};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
    #[error("not an access token")]
    NotAccess,
}

/// Reads the payload of an access token without checking its signature.
///
/// The client never holds the backend's signing secret; the backend verifies
/// every bearer request itself. Expiry is compared by the caller against its
/// own clock, so `exp` is not validated here either.
pub fn decode_access(token: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    if data.claims.kind == Some(TokenKind::Refresh) {
        return Err(TokenError::NotAccess);
    }
    debug!(exp = data.claims.exp, "access token decoded");
    Ok(data.claims)
}

/// Signs claims with an HMAC secret. Used by fixtures and local stub backends.
pub fn mint(claims: &Claims, secret: &[u8]) -> anyhow::Result<String> {
    let token = encode(&Header::default(), claims, &EncodingKey::from_secret(secret))?;
    Ok(token)
}
