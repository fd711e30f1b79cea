use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction, types::Json};
use uuid::Uuid;

use super::{NoteRepository, UserRepository, normalize_tags};
use crate::{
    auth::password::{PasswordHash, hash_password_blocking},
    error::{AppError, AppResult},
    models::{Lifecycle, NewNote, NewUser, Note, Profile, Role, Tag, User},
};

// --- Row Mapping ---

/// A `notes` row joined with its aggregated tag set.
#[derive(FromRow)]
struct NoteRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    content: String,
    is_public: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    tags: Json<Vec<Tag>>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Note {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            is_public: row.is_public,
            tags: row.tags.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            lifecycle: Lifecycle::from(row.deleted_at),
        }
    }
}

/// A bare `notes` row as returned by INSERT/UPDATE ... RETURNING.
#[derive(FromRow)]
struct NoteWriteRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    content: String,
    is_public: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NoteWriteRow {
    fn with_tags(self, tags: Vec<Tag>) -> Note {
        Note {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            content: self.content,
            is_public: self.is_public,
            tags,
            created_at: self.created_at,
            updated_at: self.updated_at,
            lifecycle: Lifecycle::Active,
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    active: bool,
    profile: Json<Profile>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|_| AppError::Internal(format!("user {} has unknown role '{}'", row.id, row.role)))?;
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            role,
            active: row.active,
            profile: row.profile.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            password_hash: Some(PasswordHash::from_stored(row.password_hash)),
            lifecycle: Lifecycle::from(row.deleted_at),
        })
    }
}

// --- Queries ---

/// Live notes with their tags aggregated into a JSON array, sorted by tag name.
/// Callers append extra `AND` conditions, then `NOTE_GROUP_BY`.
const SELECT_NOTES_WITH_TAGS: &str = r#"
    SELECT
        n.id, n.user_id, n.title, n.content, n.is_public,
        n.created_at, n.updated_at, n.deleted_at,
        COALESCE(
            jsonb_agg(jsonb_build_object('id', t.id, 'name', t.name) ORDER BY t.name)
                FILTER (WHERE t.id IS NOT NULL),
            '[]'::jsonb
        ) AS tags
    FROM notes n
    LEFT JOIN note_tags nt ON nt.note_id = n.id
    LEFT JOIN tags t ON t.id = nt.tag_id
    WHERE n.deleted_at IS NULL
"#;

const NOTE_GROUP_BY: &str = " GROUP BY n.id";
const NEWEST_FIRST: &str = " ORDER BY n.created_at DESC";

const NOTE_COLUMNS: &str = "id, user_id, title, content, is_public, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, email, password_hash, role, active, profile, created_at, updated_at, deleted_at";

/// get-or-create each tag by its normalized name, then link it to the note.
///
/// Runs inside the caller's transaction so that a failure anywhere leaves neither
/// tags nor links behind. Linking is idempotent.
async fn link_tags(
    tx: &mut Transaction<'_, Postgres>,
    note_id: Uuid,
    raw_names: &[String],
) -> AppResult<Vec<Tag>> {
    let mut tags = Vec::new();
    for name in normalize_tags(raw_names) {
        let (id, name): (Uuid, String) = sqlx::query_as(
            r#"
            INSERT INTO tags (id, name) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&name)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::from_sqlx("upserting tag", e))?;

        sqlx::query("INSERT INTO note_tags (note_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(note_id)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::from_sqlx("linking tag to note", e))?;

        tags.push(Tag { id, name });
    }
    Ok(tags)
}

// --- Note Repository ---

/// PgNoteRepository
///
/// `NoteRepository` backed by PostgreSQL.
pub struct PgNoteRepository {
    pool: PgPool,
}

impl PgNoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_notes(&self, builder: &mut QueryBuilder<'_, Postgres>) -> AppResult<Vec<Note>> {
        let rows = builder
            .build_query_as::<NoteRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("listing notes", e))?;
        Ok(rows.into_iter().map(Note::from).collect())
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    /// create
    ///
    /// Note row, tag upserts and links share one transaction. If the handler's
    /// future is dropped (timeout, client gone) the transaction is dropped
    /// uncommitted and rolls back.
    async fn create(&self, note: NewNote) -> AppResult<Note> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::from_sqlx("beginning note transaction", e))?;

        let row: NoteWriteRow = sqlx::query_as(&format!(
            "INSERT INTO notes (id, user_id, title, content, is_public, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) RETURNING {NOTE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(note.user_id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.is_public)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_sqlx("inserting note", e))?;

        let tags = link_tags(&mut tx, row.id, &note.tags).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::from_sqlx("committing note", e))?;

        tracing::info!(note_id = %row.id, owner = %row.user_id, tags = tags.len(), "note created");
        Ok(row.with_tags(tags))
    }

    /// update
    ///
    /// Field update, link removal and relinking share one transaction. The row
    /// lock taken by the UPDATE serializes concurrent updates of the same note;
    /// the last commit wins.
    async fn update(&self, note: Note) -> AppResult<Note> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::from_sqlx("beginning note transaction", e))?;

        let row: NoteWriteRow = sqlx::query_as(&format!(
            "UPDATE notes SET title = $2, content = $3, is_public = $4, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {NOTE_COLUMNS}"
        ))
        .bind(note.id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.is_public)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::from_sqlx("updating note", e))?
        .ok_or_else(|| AppError::NotFound(format!("note {}", note.id)))?;

        sqlx::query("DELETE FROM note_tags WHERE note_id = $1")
            .bind(note.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_sqlx("clearing note tags", e))?;

        let tags = link_tags(&mut tx, note.id, &note.tag_names()).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::from_sqlx("committing note update", e))?;

        Ok(row.with_tags(tags))
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE notes SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("soft deleting note", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("note {id}")));
        }
        tracing::info!(note_id = %id, "note soft deleted");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Note> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_NOTES_WITH_TAGS);
        builder.push(" AND n.id = ").push_bind(id).push(NOTE_GROUP_BY);
        self.fetch_notes(&mut builder)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("note {id}")))
    }

    async fn get_all(&self) -> AppResult<Vec<Note>> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_NOTES_WITH_TAGS);
        builder.push(NOTE_GROUP_BY).push(NEWEST_FIRST);
        self.fetch_notes(&mut builder).await
    }

    async fn get_by_user_id(&self, user_id: Uuid) -> AppResult<Vec<Note>> {
        let mut builder = QueryBuilder::<Postgres>::new(SELECT_NOTES_WITH_TAGS);
        builder
            .push(" AND n.user_id = ")
            .push_bind(user_id)
            .push(NOTE_GROUP_BY)
            .push(NEWEST_FIRST);
        self.fetch_notes(&mut builder).await
    }

    /// get_by_tags
    ///
    /// OR semantics: a note matches if any of its tags is in the (normalized) list.
    /// The EXISTS sub-select keeps the aggregated tag set complete for matches.
    async fn get_by_tags(&self, tags: &[String]) -> AppResult<Vec<Note>> {
        let names = normalize_tags(tags);
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(SELECT_NOTES_WITH_TAGS);
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM note_tags nt_sub \
                 JOIN tags t_sub ON t_sub.id = nt_sub.tag_id \
                 WHERE nt_sub.note_id = n.id AND t_sub.name = ANY(",
            )
            .push_bind(names)
            .push("))")
            .push(NOTE_GROUP_BY)
            .push(NEWEST_FIRST);
        self.fetch_notes(&mut builder).await
    }
}

// --- User Repository ---

/// PgUserRepository
///
/// `UserRepository` backed by PostgreSQL. Uniqueness of email and username among
/// live users is enforced by partial unique indexes, so concurrent signups race in
/// the database and the loser gets `Conflict`.
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser, password: &str) -> AppResult<User> {
        let hash = hash_password_blocking(password.to_owned()).await?;

        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (id, username, email, password_hash, role, active, profile, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(hash.as_str())
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(Json(&user.profile))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("inserting user", e))?;

        tracing::info!(user_id = %row.id, role = %row.role, "user created");
        User::try_from(row)
    }

    async fn get_all(&self) -> AppResult<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("listing users", e))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("fetching user by id", e))?;

        row.ok_or_else(|| AppError::NotFound(format!("user {id}")))
            .and_then(User::try_from)
    }

    async fn get_by_email(&self, email: &str) -> AppResult<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("fetching user by email", e))?;

        row.ok_or_else(|| AppError::NotFound("user with that email".to_string()))
            .and_then(User::try_from)
    }

    async fn update(&self, user: User) -> AppResult<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET username = $2, email = $3, role = $4, active = $5, profile = $6, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(Json(&user.profile))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("updating user", e))?;

        row.ok_or_else(|| AppError::NotFound(format!("user {}", user.id)))
            .and_then(User::try_from)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("soft deleting user", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("user {id}")));
        }
        tracing::info!(user_id = %id, "user soft deleted");
        Ok(())
    }
}
