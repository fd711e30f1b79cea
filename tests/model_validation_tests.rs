use chrono::Utc;
use grimoire::{
    auth::password::PasswordHash,
    models::{CreateUserRequest, Lifecycle, Note, Role, Tag, UpdateNoteRequest, User},
};
use std::str::FromStr;
use uuid::Uuid;

#[test]
fn test_user_serialization_never_leaks_password_hash() {
    let user = User {
        id: Uuid::new_v4(),
        username: "ada".to_string(),
        email: "ada@example.com".to_string(),
        password_hash: Some(PasswordHash::from_stored("$argon2id$v=19$secret".to_string())),
        lifecycle: Lifecycle::Deleted { at: Utc::now() },
        ..User::default()
    };

    let json_output = serde_json::to_string(&user).unwrap();

    assert!(!json_output.contains("password_hash"));
    assert!(!json_output.contains("argon2"));
    assert!(!json_output.contains("lifecycle"));
    assert!(json_output.contains(r#""role":"user""#));
}

#[test]
fn test_password_hash_debug_is_redacted() {
    let hash = PasswordHash::from_stored("$argon2id$v=19$secret".to_string());
    assert!(!format!("{hash:?}").contains("secret"));
}

#[test]
fn test_role_wire_format_is_lowercase() {
    assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);
    assert_eq!(serde_json::from_str::<Role>(r#""guest""#).unwrap(), Role::Guest);
    assert!(serde_json::from_str::<Role>(r#""Admin""#).is_err());
}

#[test]
fn test_role_parses_from_stored_text() {
    for role in [Role::Admin, Role::User, Role::Guest] {
        assert_eq!(Role::from_str(role.as_str()).unwrap(), role);
    }
    assert!(Role::from_str("superuser").is_err());
}

#[test]
fn test_note_carries_tags_but_not_lifecycle() {
    let note = Note {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        title: "t".to_string(),
        tags: vec![Tag {
            id: Uuid::new_v4(),
            name: "rust".to_string(),
        }],
        ..Note::default()
    };

    let value = serde_json::to_value(&note).unwrap();

    assert_eq!(value["tags"][0]["name"], "rust");
    assert!(value.get("lifecycle").is_none());
    assert!(value.get("deleted_at").is_none());
    assert_eq!(note.tag_names(), vec!["rust".to_string()]);
}

#[test]
fn test_lifecycle_from_nullable_column() {
    let now = Utc::now();
    assert_eq!(Lifecycle::from(None), Lifecycle::Active);
    assert!(Lifecycle::from(None).is_active());

    let deleted = Lifecycle::from(Some(now));
    assert!(!deleted.is_active());
    assert_eq!(deleted.deleted_at(), Some(now));
}

#[test]
fn test_create_user_request_defaults() {
    let request: CreateUserRequest = serde_json::from_str(
        r#"{"username":"ada","email":"ada@example.com","password":"pw"}"#,
    )
    .unwrap();

    assert_eq!(request.role, Role::User);
    assert!(request.active);
    assert!(request.profile.links.is_empty());
}

#[test]
fn test_update_note_request_distinguishes_missing_and_empty_tags() {
    let missing: UpdateNoteRequest = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
    let empty: UpdateNoteRequest = serde_json::from_str(r#"{"tags":[]}"#).unwrap();

    assert!(missing.tags.is_none());
    assert_eq!(empty.tags, Some(vec![]));

    let json_output = serde_json::to_string(&missing).unwrap();
    assert!(!json_output.contains("tags"));
}
