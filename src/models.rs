use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{auth::password::PasswordHash, error::AppError};

// --- Shared Domain Types ---

/// Role
///
/// The RBAC field carried by every user and every session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    #[default]
    User,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "guest" => Ok(Role::Guest),
            other => Err(AppError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// Lifecycle
///
/// Soft-delete state of a persisted entity. Rows store a nullable `deleted_at`;
/// the domain only ever sees this enum, so "is this queryable" is `is_active()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Active,
    Deleted { at: DateTime<Utc> },
}

impl Lifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { at } => Some(*at),
        }
    }
}

impl From<Option<DateTime<Utc>>> for Lifecycle {
    fn from(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Lifecycle::Deleted { at },
            None => Lifecycle::Active,
        }
    }
}

// --- Users ---

/// Link
///
/// A social or personal link shown on a user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Link {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub active: bool,
}

/// Profile
///
/// Presentation data embedded in the user record (stored as JSONB).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub avatar_url: String,
    pub links: Vec<Link>,
}

/// User
///
/// A user account. The password hash is carried for the credential check at login
/// but never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    // Informational only; inactive users are still returned by lookups.
    pub active: bool,
    pub profile: Profile,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    #[ts(skip)]
    pub password_hash: Option<PasswordHash>,
    #[serde(skip)]
    #[ts(skip)]
    pub lifecycle: Lifecycle,
}

/// NewUser
///
/// Everything needed to insert a user except the password, which is passed
/// separately so that only the credential service ever sees it.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub profile: Profile,
}

// --- Notes ---

/// Tag
///
/// A globally unique, lowercase label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

/// Note
///
/// A note with its current tag set (sorted by name, no duplicates).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Note {
    pub id: Uuid,
    // FK to users.id (Owner).
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub is_public: bool,
    pub tags: Vec<Tag>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    #[ts(skip)]
    pub lifecycle: Lifecycle,
}

impl Note {
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }
}

/// NewNote
///
/// Input of `NoteRepository::create`. Tag names are raw user input and get
/// normalized by the repository.
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub is_public: bool,
    pub tags: Vec<String>,
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Input payload for `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// SignupRequest
///
/// Input payload for `POST /api/auth/signup`. New accounts always get the `user` role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// CreateUserRequest
///
/// Admin payload for `POST /api/users`; unlike signup it may choose the role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub profile: Profile,
}

/// UpdateUserRequest
///
/// Partial update for `PATCH /api/users/{id}`. Omitted fields keep their value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// CreateNoteRequest
///
/// Input payload for `POST /api/notes`. The owner is always the caller.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateNoteRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// UpdateNoteRequest
///
/// Partial update for `PATCH /api/notes/{id}`. When `tags` is present it replaces
/// the whole tag set.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateNoteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

// --- Responses ---

/// AuthResponse
///
/// Returned by login and signup.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub token: String,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
    pub user_id: Uuid,
}

fn default_true() -> bool {
    true
}
