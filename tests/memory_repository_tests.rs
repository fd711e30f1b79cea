use grimoire::{
    AppError,
    models::{NewNote, NewUser, Role, Tag},
    repository::{MemoryNoteRepository, MemoryUserRepository, NoteRepository, UserRepository},
};
use std::time::Duration;
use uuid::Uuid;

// --- Test Data Helpers ---

fn new_note(user_id: Uuid, title: &str, tags: &[&str]) -> NewNote {
    NewNote {
        user_id,
        title: title.to_string(),
        content: format!("{title} body"),
        is_public: false,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn new_user(username: &str, email: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: email.to_string(),
        role: Role::User,
        active: true,
        ..NewUser::default()
    }
}

fn names(tags: &[Tag]) -> Vec<&str> {
    tags.iter().map(|t| t.name.as_str()).collect()
}

// --- Notes ---

#[tokio::test]
async fn test_create_collapses_tag_variants_into_one_link() {
    let repo = MemoryNoteRepository::new();

    let note = repo
        .create(new_note(Uuid::new_v4(), "Gophers", &["Go", "go", "GO "]))
        .await
        .unwrap();

    assert_eq!(names(&note.tags), vec!["go"]);
    assert_eq!(repo.tag_count().await, 1);
    assert_eq!(repo.link_count(note.id).await, 1);
}

#[tokio::test]
async fn test_tags_are_shared_between_notes() {
    let repo = MemoryNoteRepository::new();
    let owner = Uuid::new_v4();

    let first = repo.create(new_note(owner, "one", &["rust"])).await.unwrap();
    let second = repo.create(new_note(owner, "two", &["Rust", "axum"])).await.unwrap();

    assert_eq!(repo.tag_count().await, 2);
    let rust_in_first = first.tags.iter().find(|t| t.name == "rust").unwrap();
    let rust_in_second = second.tags.iter().find(|t| t.name == "rust").unwrap();
    assert_eq!(rust_in_first.id, rust_in_second.id);
}

#[tokio::test]
async fn test_update_replaces_the_tag_set() {
    let repo = MemoryNoteRepository::new();
    let mut note = repo
        .create(new_note(Uuid::new_v4(), "retag", &["a", "b"]))
        .await
        .unwrap();

    note.tags = vec![
        Tag { id: Uuid::nil(), name: "B".to_string() },
        Tag { id: Uuid::nil(), name: "c".to_string() },
    ];
    note.title = "retagged".to_string();
    let updated = repo.update(note).await.unwrap();

    assert_eq!(updated.title, "retagged");
    assert_eq!(names(&updated.tags), vec!["b", "c"]);
    assert_eq!(repo.link_count(updated.id).await, 2);
    // The orphaned tag "a" stays in the tag table.
    assert_eq!(repo.tag_count().await, 3);

    let reloaded = repo.get_by_id(updated.id).await.unwrap();
    assert_eq!(names(&reloaded.tags), vec!["b", "c"]);
    assert!(reloaded.updated_at >= reloaded.created_at);
}

#[tokio::test]
async fn test_update_with_empty_tags_clears_links() {
    let repo = MemoryNoteRepository::new();
    let mut note = repo
        .create(new_note(Uuid::new_v4(), "bare", &["x"]))
        .await
        .unwrap();

    note.tags.clear();
    let updated = repo.update(note).await.unwrap();

    assert!(updated.tags.is_empty());
    assert_eq!(repo.link_count(updated.id).await, 0);
}

#[tokio::test]
async fn test_update_of_missing_note_is_not_found() {
    let repo = MemoryNoteRepository::new();
    let mut note = repo
        .create(new_note(Uuid::new_v4(), "ghost", &[]))
        .await
        .unwrap();
    note.id = Uuid::new_v4();

    assert!(matches!(repo.update(note).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_soft_delete_hides_note_and_second_delete_is_not_found() {
    let repo = MemoryNoteRepository::new();
    let owner = Uuid::new_v4();
    let note = repo.create(new_note(owner, "doomed", &["t"])).await.unwrap();

    repo.delete(note.id).await.unwrap();

    assert!(matches!(repo.get_by_id(note.id).await, Err(AppError::NotFound(_))));
    assert!(repo.get_all().await.unwrap().is_empty());
    assert!(repo.get_by_user_id(owner).await.unwrap().is_empty());
    assert!(repo.get_by_tags(&["t".to_string()]).await.unwrap().is_empty());
    assert!(matches!(repo.delete(note.id).await, Err(AppError::NotFound(_))));

    // Deleted notes cannot be edited either.
    assert!(matches!(repo.update(note).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_get_by_tags_matches_any_tag_case_insensitively() {
    let repo = MemoryNoteRepository::new();
    let owner = Uuid::new_v4();
    let rust = repo.create(new_note(owner, "rust", &["rust"])).await.unwrap();
    let go = repo.create(new_note(owner, "go", &["go"])).await.unwrap();
    repo.create(new_note(owner, "misc", &["misc"])).await.unwrap();

    let found = repo
        .get_by_tags(&[" RUST".to_string(), "Go".to_string()])
        .await
        .unwrap();
    let mut ids: Vec<Uuid> = found.iter().map(|n| n.id).collect();
    ids.sort();
    let mut expected = vec![rust.id, go.id];
    expected.sort();

    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_get_by_tags_with_only_blank_names_is_empty() {
    let repo = MemoryNoteRepository::new();
    repo.create(new_note(Uuid::new_v4(), "n", &["a"])).await.unwrap();

    assert!(repo.get_by_tags(&["  ".to_string()]).await.unwrap().is_empty());
    assert!(repo.get_by_tags(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_by_tags_returns_every_tag_of_a_matched_note() {
    let repo = MemoryNoteRepository::new();
    let owner = Uuid::new_v4();
    let both = repo.create(new_note(owner, "both", &["a", "b"])).await.unwrap();
    repo.create(new_note(owner, "other", &["c"])).await.unwrap();

    let found = repo.get_by_tags(&["a".to_string()]).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, both.id);
    assert_eq!(names(&found[0].tags), vec!["a", "b"]);
}

#[tokio::test]
async fn test_get_by_tags_with_unknown_tag_is_empty() {
    let repo = MemoryNoteRepository::new();
    repo.create(new_note(Uuid::new_v4(), "n", &["a"])).await.unwrap();

    assert!(repo.get_by_tags(&["nope".to_string()]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleted_note_is_not_matched_by_tag() {
    let repo = MemoryNoteRepository::new();
    let note = repo.create(new_note(Uuid::new_v4(), "gone", &["a"])).await.unwrap();
    repo.delete(note.id).await.unwrap();

    assert!(repo.get_by_tags(&["a".to_string()]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_owner_listing_carries_tags() {
    let repo = MemoryNoteRepository::new();
    let alice = Uuid::new_v4();
    repo.create(new_note(alice, "mine", &["z", "y"])).await.unwrap();
    repo.create(new_note(Uuid::new_v4(), "theirs", &["y"])).await.unwrap();

    let notes = repo.get_by_user_id(alice).await.unwrap();

    assert_eq!(notes.len(), 1);
    assert_eq!(names(&notes[0].tags), vec!["y", "z"]);
}

#[tokio::test]
async fn test_listings_are_newest_first_and_owner_scoped() {
    let repo = MemoryNoteRepository::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let older = repo.create(new_note(alice, "older", &[])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = repo.create(new_note(alice, "newer", &[])).await.unwrap();
    repo.create(new_note(bob, "bob's", &[])).await.unwrap();

    let alice_notes = repo.get_by_user_id(alice).await.unwrap();
    let titles: Vec<&str> = alice_notes.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["newer", "older"]);
    assert_eq!(alice_notes[0].id, newer.id);
    assert_eq!(alice_notes[1].id, older.id);

    assert_eq!(repo.get_all().await.unwrap().len(), 3);
}

// --- Users ---

#[tokio::test]
async fn test_create_user_hashes_password() {
    let repo = MemoryUserRepository::new();

    let user = repo
        .create(new_user("ada", "ada@example.com"), "correct horse")
        .await
        .unwrap();

    let hash = user.password_hash.expect("hash stored");
    assert_ne!(hash.as_str(), "correct horse");
    assert!(hash.as_str().starts_with("$argon2"));
}

#[tokio::test]
async fn test_duplicate_email_is_conflict_case_insensitively() {
    let repo = MemoryUserRepository::new();
    repo.create(new_user("ada", "ada@example.com"), "pw").await.unwrap();

    let result = repo.create(new_user("ada2", "ADA@example.com"), "pw").await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_email_uniqueness_folds_non_ascii_case() {
    let repo = MemoryUserRepository::new();
    let user = repo
        .create(new_user("lukasz", "Łukasz@example.com"), "pw")
        .await
        .unwrap();

    let clash = repo.create(new_user("lukasz2", "łukasz@example.com"), "pw").await;
    assert!(matches!(clash, Err(AppError::Conflict(_))));

    let found = repo.get_by_email("ŁUKASZ@EXAMPLE.COM").await.unwrap();
    assert_eq!(found.id, user.id);
}

#[tokio::test]
async fn test_duplicate_username_is_conflict() {
    let repo = MemoryUserRepository::new();
    repo.create(new_user("ada", "one@example.com"), "pw").await.unwrap();

    let result = repo.create(new_user("ada", "two@example.com"), "pw").await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_concurrent_signups_with_same_email_yield_one_conflict() {
    let repo = MemoryUserRepository::new();

    let (first, second) = tokio::join!(
        repo.create(new_user("racer1", "race@example.com"), "pw"),
        repo.create(new_user("racer2", "race@example.com"), "pw"),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(AppError::Conflict(_))))
            .count(),
        1
    );
    assert_eq!(repo.get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_by_email_ignores_case_and_deleted_users() {
    let repo = MemoryUserRepository::new();
    let user = repo
        .create(new_user("ada", "ada@example.com"), "pw")
        .await
        .unwrap();

    let found = repo.get_by_email("  Ada@Example.com").await.unwrap();
    assert_eq!(found.id, user.id);
    assert!(found.password_hash.is_some());

    repo.delete(user.id).await.unwrap();

    assert!(matches!(
        repo.get_by_email("ada@example.com").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(repo.get_by_id(user.id).await, Err(AppError::NotFound(_))));
    assert!(matches!(repo.delete(user.id).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_deleted_user_frees_email() {
    let repo = MemoryUserRepository::new();
    let user = repo.create(new_user("ada", "ada@example.com"), "pw").await.unwrap();
    repo.delete(user.id).await.unwrap();

    let again = repo.create(new_user("ada", "ada@example.com"), "pw").await;

    assert!(again.is_ok());
}

#[tokio::test]
async fn test_update_user_checks_uniqueness_against_others() {
    let repo = MemoryUserRepository::new();
    repo.create(new_user("ada", "ada@example.com"), "pw").await.unwrap();
    let mut bob = repo.create(new_user("bob", "bob@example.com"), "pw").await.unwrap();

    // Saving unchanged fields is not a clash with oneself.
    bob.role = Role::Guest;
    let saved = repo.update(bob.clone()).await.unwrap();
    assert_eq!(saved.role, Role::Guest);

    bob.email = "ada@example.com".to_string();
    assert!(matches!(repo.update(bob).await, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_inactive_users_are_still_listed() {
    let repo = MemoryUserRepository::new();
    let mut user = repo.create(new_user("ada", "ada@example.com"), "pw").await.unwrap();

    user.active = false;
    repo.update(user.clone()).await.unwrap();

    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert!(!fetched.active);
    assert_eq!(repo.get_all().await.unwrap().len(), 1);
}
