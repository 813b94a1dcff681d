use actix_web::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Name of the cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "token";

/// Session tokens expire one hour after issuance.
pub const TOKEN_LIFETIME_SECS: i64 = 60 * 60;

/// Decoded session token: whatever the client asked to be signed plus the timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn email(&self) -> Option<&str> {
        self.payload.get("email").and_then(Value::as_str)
    }
}

/// Issues and verifies HS256 session tokens. There is no revocation list:
/// a token is valid until `exp` no matter what happened to the cookie.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    secure_cookies: bool,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        TokenService {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            secure_cookies: true,
        }
    }

    /// Plain-HTTP development setups need this off; browsers drop `Secure` cookies there.
    pub fn secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Cookie carrying `token`. Cross-site (`SameSite=None`) only when it can be `Secure`.
    pub fn cookie(&self, token: String) -> Cookie<'static> {
        let same_site = if self.secure_cookies { SameSite::None } else { SameSite::Lax };
        Cookie::build(TOKEN_COOKIE, token)
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(same_site)
            .finish()
    }

    /// Tells the browser to drop the session cookie. The token itself stays valid.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.cookie(String::new());
        cookie.make_removal();
        cookie
    }

    pub fn issue(&self, payload: Value) -> Result<String, AppError> {
        self.issue_at(payload, Utc::now())
    }

    /// Signs `payload` as if issued at `now`. The payload is taken on trust;
    /// nothing checks that the email in it belongs to the caller.
    pub fn issue_at(&self, payload: Value, now: DateTime<Utc>) -> Result<String, AppError> {
        let mut payload = match payload {
            Value::Object(map) => map,
            _ => return Err(AppError::BadRequest("token payload must be a JSON object".to_string())),
        };
        if payload.contains_key("exp") {
            return Err(AppError::BadRequest("token payload already has an exp property".to_string()));
        }
        payload.remove("iat");

        let claims = SessionClaims {
            payload,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("Rejected session token: {}", e);
                AppError::Unauthorized
            })
    }
}
