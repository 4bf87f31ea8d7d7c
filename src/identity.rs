use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::AuthError, models::ProviderUser};

/// Claims
///
/// The payload of a provider-issued access token (HS256).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the provider identity of the user.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<UserMetadata>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl From<Claims> for ProviderUser {
    fn from(claims: Claims) -> Self {
        let display_name = claims
            .user_metadata
            .and_then(|m| m.display_name.or(m.full_name));
        ProviderUser {
            identity: claims.sub,
            email: claims.email,
            display_name,
        }
    }
}

/// decode_access_token
///
/// Verifies signature and expiry of a provider access token and returns what
/// it asserts about the user.
pub fn decode_access_token(token: &str, secret: &str) -> Result<ProviderUser, AuthError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;
    // Provider tokens carry aud="authenticated" for every user; it adds nothing here.
    validation.validate_aud = false;

    match decode::<Claims>(token, &key, &validation) {
        Ok(data) => Ok(data.claims.into()),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("expired access token"),
                other => tracing::debug!(kind = ?other, "rejected access token"),
            }
            Err(AuthError::InvalidToken)
        }
    }
}

/// Credentials
///
/// Email/password pair forwarded to the provider.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// ProviderSession
///
/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub access_token: String,
    pub user: ProviderUser,
}

/// IdentityProvider Trait
///
/// The external authentication capability. `verify` turns a bearer token back
/// into the user it was issued for.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<ProviderSession, AuthError>;
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
    fn verify(&self, access_token: &str) -> Result<ProviderUser, AuthError>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

/// SupabaseIdentityProvider
///
/// GoTrue-compatible provider: password grant for sign-in, `/logout` for
/// sign-out, local HS256 verification of access tokens.
pub struct SupabaseIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    jwt_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl SupabaseIdentityProvider {
    pub fn new(base_url: &str, api_key: &str, jwt_secret: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            jwt_secret: jwt_secret.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<ProviderSession, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::Provider(format!("sign-in returned {status}")));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        let user = self.verify(&token.access_token)?;
        Ok(ProviderSession {
            access_token: token.access_token,
            user,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let url = format!("{}/auth/v1/logout", self.base_url);
        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if response.status().is_success() || response.status().is_client_error() {
            // A 4xx means the session is already gone provider-side.
            Ok(())
        } else {
            Err(AuthError::Provider(format!("sign-out returned {}", response.status())))
        }
    }

    fn verify(&self, access_token: &str) -> Result<ProviderUser, AuthError> {
        decode_access_token(access_token, &self.jwt_secret)
    }
}
