use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::future::{ready, Ready};

use crate::models::Id;
use crate::repo::{RepoResult, UserRepo};

/// A stored account: the credential store record that login identifiers
/// resolve against. `password_digest` is `salt$hex(sha256(salt + password))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Credential {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password_digest: String,
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{}${:x}", salt, hasher.finalize())
}

pub fn verify_password(digest: &str, password: &str) -> bool {
    match digest.split_once('$') {
        Some((salt, _)) => hash_password(salt, password) == *digest,
        None => false,
    }
}

/// Resolve a login identifier that may be either a username or an email.
/// Two explicit steps, both case-folded: exact username match first, email
/// match only when no username matched.
pub async fn resolve_identifier(
    users: &dyn UserRepo,
    identifier: &str,
) -> RepoResult<Option<Credential>> {
    if let Some(found) = users.user_by_username(identifier).await? {
        return Ok(Some(found));
    }
    users.user_by_email(identifier).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub exp: usize,
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`. Anonymous-friendly handlers take
/// `Option<Auth>` and fall back to supplied author fields.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        // Delegate to BearerAuth to parse the header.
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            match decode_jwt(bearer.token()) {
                Ok(claims) => return ready(Ok(Auth(claims))),
                Err(_) => return ready(Err(actix_web::error::ErrorUnauthorized("Invalid JWT"))),
            }
        }
        ready(Err(actix_web::error::ErrorUnauthorized(
            "Authorization required",
        )))
    }
}

/// Create a session JWT for a resolved credential.
pub fn create_jwt(cred: &Credential) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: cred.id.to_string(),
        username: cred.username.clone(),
        email: cred.email.clone(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
