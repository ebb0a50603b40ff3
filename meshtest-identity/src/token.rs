//! Signed bearer tokens.
//!
//! Tokens use the compact JWS layout `header.claims.signature`, each part
//! base64url without padding. The subject is the issuer's DID, so a verifier
//! needs nothing but the token to recover the signing key.

use crate::did::public_key_from_did;
use crate::error::{IdentityError, IdentityResult};
use crate::identity::Identity;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// DID of the identity the token speaks for.
    pub sub: String,
    /// The node the token was issued for.
    pub aud: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

pub(crate) fn issue(identity: &Identity, audience: &str, ttl: Duration) -> IdentityResult<String> {
    let header = Header {
        alg: identity.key_type().jws_alg().to_string(),
        typ: "JWT".to_string(),
    };
    let now = Utc::now();
    let claims = TokenClaims {
        sub: identity.did().to_string(),
        aud: audience.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    );
    let signature = identity.sign(signing_input.as_bytes());
    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Verifies a bearer token issued for `audience` and returns its claims.
pub fn verify_token(token: &str, audience: &str) -> IdentityResult<TokenClaims> {
    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(IdentityError::InvalidToken("expected three segments".into()));
    };

    let decode = |segment: &str| {
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))
    };
    let parsed_header: Header = serde_json::from_slice(&decode(header)?)?;
    let parsed_claims: TokenClaims = serde_json::from_slice(&decode(claims)?)?;

    let public_key = public_key_from_did(&parsed_claims.sub)?;
    if parsed_header.alg != public_key.key_type().jws_alg() {
        return Err(IdentityError::InvalidToken(format!(
            "algorithm {} does not match {}",
            parsed_header.alg,
            public_key.key_type()
        )));
    }
    public_key.verify(format!("{header}.{claims}").as_bytes(), &decode(signature)?)?;

    if parsed_claims.aud != audience {
        return Err(IdentityError::AudienceMismatch {
            expected: audience.to_string(),
            actual: parsed_claims.aud,
        });
    }
    if parsed_claims.exp <= Utc::now().timestamp() {
        return Err(IdentityError::TokenExpired);
    }
    Ok(parsed_claims)
}
