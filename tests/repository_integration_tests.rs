use grimoire::{
    AppError,
    models::{NewNote, NewUser, Role, Tag, User},
    repository::{NoteRepository, PgNoteRepository, PgUserRepository, UserRepository},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

/// Holds the pool for one test. Postgres tests are skipped when `DATABASE_URL`
/// is not set, so the suite still runs on machines without a database.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Option<Self> {
        dotenv::dotenv().ok();

        let Ok(db_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping Postgres integration test");
            return None;
        };

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        Some(DbTestContext { pool })
    }

    fn notes(&self) -> PgNoteRepository {
        PgNoteRepository::new(self.pool.clone())
    }

    fn users(&self) -> PgUserRepository {
        PgUserRepository::new(self.pool.clone())
    }

    async fn link_count(&self, note_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM note_tags WHERE note_id = $1")
            .bind(note_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn tag_rows_named(&self, name: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

// --- Test Data Helpers ---

/// Every test works on its own users and tag names so runs never collide.
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

async fn create_test_user(ctx: &DbTestContext) -> User {
    let name = unique("user");
    ctx.users()
        .create(
            NewUser {
                username: name.clone(),
                email: format!("{name}@test.com"),
                role: Role::User,
                active: true,
                ..NewUser::default()
            },
            "password",
        )
        .await
        .expect("create user")
}

fn new_note(user_id: Uuid, tags: Vec<String>) -> NewNote {
    NewNote {
        user_id,
        title: "Integration".to_string(),
        content: "body".to_string(),
        is_public: true,
        tags,
    }
}

fn names(tags: &[Tag]) -> Vec<String> {
    tags.iter().map(|t| t.name.clone()).collect()
}

// --- Note Repository ---

#[tokio::test]
async fn test_create_note_upserts_tags_once() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let user = create_test_user(&ctx).await;
    let tag = unique("go");

    let note = ctx
        .notes()
        .create(new_note(
            user.id,
            vec![tag.to_uppercase(), tag.clone(), format!("{tag} ")],
        ))
        .await
        .unwrap();

    assert_eq!(names(&note.tags), vec![tag.clone()]);
    assert_eq!(ctx.link_count(note.id).await, 1);
    assert_eq!(ctx.tag_rows_named(&tag).await, 1);
}

#[tokio::test]
async fn test_create_note_for_unknown_owner_is_invalid_reference() {
    let Some(ctx) = DbTestContext::setup().await else { return };

    let result = ctx
        .notes()
        .create(new_note(Uuid::new_v4(), vec![unique("orphan")]))
        .await;

    assert!(matches!(result, Err(AppError::InvalidReference(_))));
}

#[tokio::test]
async fn test_update_note_replaces_tags_atomically() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let user = create_test_user(&ctx).await;
    let (a, b, c) = (unique("a"), unique("b"), unique("c"));

    let mut note = ctx
        .notes()
        .create(new_note(user.id, vec![a.clone(), b.clone()]))
        .await
        .unwrap();

    note.tags = vec![
        Tag { id: Uuid::nil(), name: b.clone() },
        Tag { id: Uuid::nil(), name: c.clone() },
    ];
    note.is_public = false;
    let updated = ctx.notes().update(note).await.unwrap();

    let mut expected = vec![b, c];
    expected.sort();
    assert_eq!(names(&updated.tags), expected);
    assert!(!updated.is_public);
    assert_eq!(ctx.link_count(updated.id).await, 2);

    let reloaded = ctx.notes().get_by_id(updated.id).await.unwrap();
    assert_eq!(names(&reloaded.tags), expected);
}

#[tokio::test]
async fn test_soft_delete_note() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let user = create_test_user(&ctx).await;
    let tag = unique("gone");
    let note = ctx
        .notes()
        .create(new_note(user.id, vec![tag.clone()]))
        .await
        .unwrap();

    ctx.notes().delete(note.id).await.unwrap();

    assert!(matches!(
        ctx.notes().get_by_id(note.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(ctx.notes().get_by_user_id(user.id).await.unwrap().is_empty());
    assert!(ctx.notes().get_by_tags(&[tag]).await.unwrap().is_empty());
    assert!(matches!(
        ctx.notes().delete(note.id).await,
        Err(AppError::NotFound(_))
    ));

    // The row is still there, only marked.
    let deleted_at: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar("SELECT deleted_at FROM notes WHERE id = $1")
            .bind(note.id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert!(deleted_at.is_some());
}

#[tokio::test]
async fn test_get_by_tags_is_case_insensitive_or_match() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let user = create_test_user(&ctx).await;
    let (x, y) = (unique("x"), unique("y"));

    let first = ctx.notes().create(new_note(user.id, vec![x.clone()])).await.unwrap();
    let second = ctx.notes().create(new_note(user.id, vec![y.clone()])).await.unwrap();

    let found = ctx
        .notes()
        .get_by_tags(&[x.to_uppercase(), y])
        .await
        .unwrap();

    let ids: Vec<Uuid> = found.iter().map(|n| n.id).collect();
    // Newest first.
    assert_eq!(ids, vec![second.id, first.id]);
    // Each note still carries its full tag set.
    assert_eq!(found[1].tags.len(), 1);
}

// --- User Repository ---

#[tokio::test]
async fn test_user_round_trip_and_email_lookup() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let user = create_test_user(&ctx).await;

    let by_email = ctx
        .users()
        .get_by_email(&user.email.to_uppercase())
        .await
        .unwrap();

    assert_eq!(by_email.id, user.id);
    assert_eq!(by_email.role, Role::User);
    assert!(by_email.password_hash.is_some());
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let user = create_test_user(&ctx).await;

    let result = ctx
        .users()
        .create(
            NewUser {
                username: unique("other"),
                email: user.email.clone(),
                ..NewUser::default()
            },
            "password",
        )
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_update_and_soft_delete_user() {
    let Some(ctx) = DbTestContext::setup().await else { return };
    let mut user = create_test_user(&ctx).await;

    user.role = Role::Admin;
    user.profile.bio = "Keeper of notes".to_string();
    let updated = ctx.users().update(user.clone()).await.unwrap();
    assert_eq!(updated.role, Role::Admin);
    assert_eq!(updated.profile.bio, "Keeper of notes");

    ctx.users().delete(user.id).await.unwrap();
    assert!(matches!(
        ctx.users().get_by_id(user.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        ctx.users().update(user).await,
        Err(AppError::NotFound(_))
    ));
}
