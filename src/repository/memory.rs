use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NoteRepository, UserRepository, normalize_tags};
use crate::{
    auth::password::hash_password_blocking,
    error::{AppError, AppResult},
    models::{Lifecycle, NewNote, NewUser, Note, Tag, User},
};

// --- Notes ---

/// The note columns, without tags (those live in the link table).
#[derive(Debug, Clone)]
struct NoteRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    content: String,
    is_public: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    lifecycle: Lifecycle,
}

/// Mirrors the relational layout: notes, tags and the `note_tags` link set.
#[derive(Debug, Default)]
struct NoteTables {
    notes: HashMap<Uuid, NoteRecord>,
    tags: HashMap<Uuid, Tag>,
    tag_ids_by_name: HashMap<String, Uuid>,
    note_tags: BTreeSet<(Uuid, Uuid)>,
}

impl NoteTables {
    /// get-or-create by normalized name, then link (idempotent).
    fn link_tags(&mut self, note_id: Uuid, raw_names: &[String]) {
        for name in normalize_tags(raw_names) {
            let tag_id = match self.tag_ids_by_name.get(&name).copied() {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4();
                    self.tag_ids_by_name.insert(name.clone(), id);
                    self.tags.insert(id, Tag { id, name });
                    id
                }
            };
            self.note_tags.insert((note_id, tag_id));
        }
    }

    fn clear_tags(&mut self, note_id: Uuid) {
        self.note_tags.retain(|(linked_note, _)| *linked_note != note_id);
    }

    fn linked_tag_ids(&self, note_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.note_tags
            .range((note_id, Uuid::nil())..=(note_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, tag_id)| *tag_id)
    }

    fn tags_of(&self, note_id: Uuid) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .linked_tag_ids(note_id)
            .filter_map(|tag_id| self.tags.get(&tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    fn assemble(&self, record: &NoteRecord) -> Note {
        Note {
            id: record.id,
            user_id: record.user_id,
            title: record.title.clone(),
            content: record.content.clone(),
            is_public: record.is_public,
            tags: self.tags_of(record.id),
            created_at: record.created_at,
            updated_at: record.updated_at,
            lifecycle: record.lifecycle,
        }
    }

    fn live(&self, id: Uuid) -> Option<&NoteRecord> {
        self.notes.get(&id).filter(|n| n.lifecycle.is_active())
    }

    /// Live notes whose record matches `keep`, newest first. Tags are only
    /// assembled for the notes that are returned.
    fn list(&self, keep: impl Fn(&NoteRecord) -> bool) -> Vec<Note> {
        let mut records: Vec<&NoteRecord> = self
            .notes
            .values()
            .filter(|n| n.lifecycle.is_active() && keep(n))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.into_iter().map(|n| self.assemble(n)).collect()
    }
}

/// MemoryNoteRepository
///
/// `NoteRepository` kept in process memory. Each write holds the single write lock
/// for its whole duration, which gives the same all-or-nothing visibility as the
/// Postgres transaction. The owner id is not checked against any user store.
#[derive(Debug, Default)]
pub struct MemoryNoteRepository {
    tables: RwLock<NoteTables>,
}

impl MemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tags, orphans included.
    pub async fn tag_count(&self) -> usize {
        self.tables.read().await.tags.len()
    }

    /// Number of `note_tags` links held for a note, whatever its lifecycle.
    pub async fn link_count(&self, note_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .note_tags
            .iter()
            .filter(|(linked_note, _)| *linked_note == note_id)
            .count()
    }
}

#[async_trait]
impl NoteRepository for MemoryNoteRepository {
    async fn create(&self, note: NewNote) -> AppResult<Note> {
        let mut tables = self.tables.write().await;

        let now = Utc::now();
        let record = NoteRecord {
            id: Uuid::new_v4(),
            user_id: note.user_id,
            title: note.title,
            content: note.content,
            is_public: note.is_public,
            created_at: now,
            updated_at: now,
            lifecycle: Lifecycle::Active,
        };
        let id = record.id;
        tables.notes.insert(id, record);
        tables.link_tags(id, &note.tags);

        let created = tables.assemble(&tables.notes[&id]);
        tracing::info!(note_id = %id, owner = %created.user_id, tags = created.tags.len(), "note created");
        Ok(created)
    }

    async fn update(&self, note: Note) -> AppResult<Note> {
        let mut tables = self.tables.write().await;

        let record = tables
            .notes
            .get_mut(&note.id)
            .filter(|n| n.lifecycle.is_active())
            .ok_or_else(|| AppError::NotFound(format!("note {}", note.id)))?;
        record.title = note.title.clone();
        record.content = note.content.clone();
        record.is_public = note.is_public;
        record.updated_at = Utc::now();

        tables.clear_tags(note.id);
        tables.link_tags(note.id, &note.tag_names());

        Ok(tables.assemble(&tables.notes[&note.id]))
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.write().await;

        let record = tables
            .notes
            .get_mut(&id)
            .filter(|n| n.lifecycle.is_active())
            .ok_or_else(|| AppError::NotFound(format!("note {id}")))?;
        let now = Utc::now();
        record.lifecycle = Lifecycle::Deleted { at: now };
        record.updated_at = now;

        tracing::info!(note_id = %id, "note soft deleted");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Note> {
        let tables = self.tables.read().await;
        tables
            .live(id)
            .map(|record| tables.assemble(record))
            .ok_or_else(|| AppError::NotFound(format!("note {id}")))
    }

    async fn get_all(&self) -> AppResult<Vec<Note>> {
        Ok(self.tables.read().await.list(|_| true))
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> AppResult<Vec<Note>> {
        Ok(self.tables.read().await.list(|n| n.user_id == user_id))
    }

    async fn get_by_tags(&self, tags: &[String]) -> AppResult<Vec<Note>> {
        let tables = self.tables.read().await;
        let wanted: HashSet<Uuid> = normalize_tags(tags)
            .iter()
            .filter_map(|name| tables.tag_ids_by_name.get(name).copied())
            .collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        Ok(tables.list(|n| tables.linked_tag_ids(n.id).any(|id| wanted.contains(&id))))
    }
}

// --- Users ---

/// MemoryUserRepository
///
/// `UserRepository` kept in process memory. The uniqueness check and the insert
/// happen under one write lock, so of two concurrent signups with the same email
/// exactly one wins. Password hashing happens before the lock is taken.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `Conflict` if another live user already holds `email` or `username`.
fn ensure_unique(
    users: &HashMap<Uuid, User>,
    except: Option<Uuid>,
    username: &str,
    email: &str,
) -> AppResult<()> {
    let email = fold_email(email);
    let clash = users.values().find(|u| {
        u.lifecycle.is_active()
            && Some(u.id) != except
            && (u.username == username || fold_email(&u.email) == email)
    });
    match clash {
        Some(_) => Err(AppError::Conflict("email or username already taken".to_string())),
        None => Ok(()),
    }
}

/// Case folding as done by Postgres `lower()`, which backs the email index.
fn fold_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn newest_first(mut users: Vec<User>) -> Vec<User> {
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    users
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: NewUser, password: &str) -> AppResult<User> {
        let hash = hash_password_blocking(password.to_owned()).await?;

        let mut users = self.users.write().await;
        ensure_unique(&users, None, &user.username, &user.email)?;

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            role: user.role,
            active: user.active,
            profile: user.profile,
            created_at: now,
            updated_at: now,
            password_hash: Some(hash),
            lifecycle: Lifecycle::Active,
        };
        users.insert(created.id, created.clone());

        tracing::info!(user_id = %created.id, role = %created.role, "user created");
        Ok(created)
    }

    async fn get_all(&self) -> AppResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(newest_first(
            users
                .values()
                .filter(|u| u.lifecycle.is_active())
                .cloned()
                .collect(),
        ))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .filter(|u| u.lifecycle.is_active())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("user {id}")))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        let email = fold_email(email);
        self.users
            .read()
            .await
            .values()
            .find(|u| u.lifecycle.is_active() && fold_email(&u.email) == email)
            .cloned()
            .ok_or_else(|| AppError::NotFound("user with that email".to_string()))
    }

    async fn update(&self, user: User) -> AppResult<User> {
        let mut users = self.users.write().await;

        if !users.get(&user.id).is_some_and(|u| u.lifecycle.is_active()) {
            return Err(AppError::NotFound(format!("user {}", user.id)));
        }
        ensure_unique(&users, Some(user.id), &user.username, &user.email)?;

        let Some(stored) = users.get_mut(&user.id) else {
            return Err(AppError::NotFound(format!("user {}", user.id)));
        };
        stored.username = user.username;
        stored.email = user.email;
        stored.role = user.role;
        stored.active = user.active;
        stored.profile = user.profile;
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut users = self.users.write().await;

        let stored = users
            .get_mut(&id)
            .filter(|u| u.lifecycle.is_active())
            .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;
        let now = Utc::now();
        stored.lifecycle = Lifecycle::Deleted { at: now };
        stored.updated_at = now;

        tracing::info!(user_id = %id, "user soft deleted");
        Ok(())
    }
}
