use async_trait::async_trait;
use std::{collections::BTreeSet, sync::Arc};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{NewNote, NewUser, Note, User},
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryNoteRepository, MemoryUserRepository};
pub use postgres::{PgNoteRepository, PgUserRepository};

/// NoteRepository
///
/// Persistence contract for notes and their tag associations. Every read excludes
/// soft-deleted notes and returns each note with its full current tag set.
///
/// **Send + Sync + async_trait** make `Arc<dyn NoteRepository>` shareable across
/// Axum's task boundaries.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Inserts the note, get-or-creates each normalized tag and links it, all in
    /// one atomic unit. Fails with `InvalidReference` if the owner does not exist.
    async fn create(&self, note: NewNote) -> AppResult<Note>;

    /// Updates title, content and visibility of a live note and replaces its tag
    /// set (clear, then reinsert) in one atomic unit. `NotFound` if absent or deleted.
    async fn update(&self, note: Note) -> AppResult<Note>;

    /// Soft delete. `NotFound` if absent or already deleted.
    async fn delete(&self, id: Uuid) -> AppResult<()>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Note>;

    /// Newest first.
    async fn get_all(&self) -> AppResult<Vec<Note>>;

    /// Newest first.
    async fn get_by_user_id(&self, user_id: Uuid) -> AppResult<Vec<Note>>;

    /// Notes carrying at least one of `tags` (case-insensitive), newest first.
    async fn get_by_tags(&self, tags: &[String]) -> AppResult<Vec<Note>>;
}

/// UserRepository
///
/// Persistence contract for user accounts. Soft-deleted users are invisible to
/// every lookup; the `active` flag is not a filter.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Hashes `password` and inserts the user. `Conflict` if the email or username
    /// is already taken by a live user.
    async fn create(&self, user: NewUser, password: &str) -> AppResult<User>;

    /// Newest first.
    async fn get_all(&self) -> AppResult<Vec<User>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<User>;

    /// The returned user carries its password hash for the login check.
    async fn get_by_email(&self, email: &str) -> AppResult<User>;

    /// Full update of username, email, role, active flag and profile.
    async fn update(&self, user: User) -> AppResult<User>;

    /// Soft delete. `NotFound` if absent or already deleted.
    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

/// NoteRepositoryState
///
/// The concrete type used to share note persistence across the application state.
pub type NoteRepositoryState = Arc<dyn NoteRepository>;

/// UserRepositoryState
///
/// The concrete type used to share user persistence across the application state.
pub type UserRepositoryState = Arc<dyn UserRepository>;

/// Canonical form of a single tag name: trimmed and lowercased.
pub fn normalize_tag(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalizes a raw tag list into a sorted set of unique, non-empty names.
///
/// `["Go", "go", "GO "]` becomes `["go"]`.
pub fn normalize_tags<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names
        .iter()
        .map(|name| normalize_tag(name.as_ref()))
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
