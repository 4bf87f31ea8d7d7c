use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity & Authorization ---

/// Role
///
/// The two authorization tiers of the platform. Anything the directory stores
/// that is not exactly `"admin"` is treated as `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    /// from_directory
    ///
    /// Maps the raw directory value to a Role. Missing, empty or unknown values
    /// collapse to `User` so a malformed record can never elevate trust.
    pub fn from_directory(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("admin") => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// Principal
///
/// The resolved identity + role used for every authorization decision.
/// Recomputed on each authentication event; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Principal {
    pub identity: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
}

impl Principal {
    /// Least-privilege principal built purely from what the provider asserted.
    pub fn least_privilege(user: &ProviderUser) -> Self {
        Self {
            identity: user.identity,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: Role::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name stamped onto posts this principal authors.
    pub fn author_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| "Anonymous".to_string())
    }
}

/// ProviderUser
///
/// What the identity provider asserts about a signed-in user, before any
/// directory lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub identity: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// UserRecord
///
/// A row of the `users` directory table. `role` is nullable on purpose: a
/// record without a role still resolves to `Role::User`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
}

// --- Content ---

/// Post
///
/// A blog post from the `posts` table. The core only reasons about
/// `published` and the timestamps; the rest is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
    pub author_name: String,
    pub published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PostFilter
///
/// Query contract for the content store. Ordering is always `created_at DESC`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub published_only: bool,
}

impl PostFilter {
    pub fn published() -> Self {
        Self { published_only: true }
    }

    pub fn all() -> Self {
        Self { published_only: false }
    }
}

// --- Request Payloads ---

/// CreatePostRequest
///
/// Input payload for POST /admin/posts. Author fields come from the session,
/// never from the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub published: bool,
}

impl CreatePostRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_text("title", Some(&self.title))?;
        require_text("content", Some(&self.content))
    }
}

/// UpdatePostRequest
///
/// Partial update for PUT /admin/posts/{id}. Only provided fields change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

impl UpdatePostRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_some() {
            require_text("title", self.title.as_deref())?;
        }
        if self.content.is_some() {
            require_text("content", self.content.as_deref())?;
        }
        Ok(())
    }
}

fn require_text(field: &str, value: Option<&str>) -> Result<(), String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(format!("{field} must not be empty")),
    }
}

/// PublishRequest
///
/// Body of PUT /admin/posts/{id}/status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PublishRequest {
    pub published: bool,
}

/// SignInRequest
///
/// Credentials forwarded to the identity provider. The password is never
/// stored or logged by this service.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

// --- Response Schemas ---

/// SignInResponse
///
/// Provider access token plus the principal resolved for it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInResponse {
    pub access_token: String,
    pub principal: Principal,
}

/// SessionResponse
///
/// Wire form of the session slot. Over HTTP resolution has always completed,
/// so `loading` is false.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub principal: Option<Principal>,
    pub loading: bool,
}

/// AdminDashboardStats
///
/// Output of GET /admin/stats. Computed from one snapshot so
/// `published_posts + draft_posts == total_posts` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_posts: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
}
