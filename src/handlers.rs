use crate::{
    AppState,
    auth::{self, AuthUser, Claims, password},
    error::{AppError, AppResult},
    extract::AppJson,
    models::{
        AuthResponse, CreateNoteRequest, CreateUserRequest, LoginRequest, NewNote, NewUser, Note,
        Profile, Role, SignupRequest, Tag, UpdateNoteRequest, UpdateUserRequest, User,
    },
    policy,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// NoteFilter
///
/// Accepted query parameters for the note listing endpoints.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NoteFilter {
    /// Comma separated tag names; a note matches if it carries any of them.
    pub tags: Option<String>,
}

impl NoteFilter {
    fn tag_list(&self) -> Option<Vec<String>> {
        let raw = self.tags.as_deref()?;
        let tags: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        (!tags.is_empty()).then_some(tags)
    }
}

/// Parses a path id, mapping a malformed value to 400.
fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidInput(format!("'{raw}' is not a valid id")))
}

fn require_non_empty(field: &'static str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn notes_matching(state: &AppState, filter: &NoteFilter) -> AppResult<Vec<Note>> {
    match filter.tag_list() {
        Some(tags) => state.notes.get_by_tags(&tags).await,
        None => state.notes.get_all().await,
    }
}

// --- Service Handlers ---

/// hello
///
/// [Public Route] Welcome banner.
#[utoipa::path(get, path = "/hello", responses((status = 200, description = "Welcome text")))]
pub async fn hello() -> &'static str {
    "Welcome to Grimoire API"
}

// --- Auth Handlers ---

/// login
///
/// [Public Route] Exchanges email + password for a 30 day session token.
///
/// *Security*: unknown email and wrong password produce the same 401, and neither
/// the password nor the stored hash is ever logged.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let invalid = || AppError::Unauthenticated("invalid credentials".to_string());

    let user = match state.users.get_by_email(&payload.email).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            password::verify_dummy(&payload.password);
            tracing::info!("login attempt for unknown email");
            return Err(invalid());
        }
        Err(e) => return Err(e),
    };

    let verified = match user.password_hash.as_ref() {
        Some(hash) => password::verify_password(&payload.password, hash),
        None => password::verify_dummy(&payload.password),
    };
    if !verified {
        tracing::info!(user_id = %user.id, "login attempt with wrong password");
        return Err(invalid());
    }

    let issued = state.tokens.issue_token(user.id, user.role)?;
    Ok(Json(AuthResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user_id: user.id,
    }))
}

/// signup
///
/// [Public Route] Creates a `user`-role account and logs it in immediately.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Email or username taken")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    require_non_empty("username", &payload.username)?;
    require_non_empty("email", &payload.email)?;
    require_non_empty("password", &payload.password)?;

    let new_user = NewUser {
        username: payload.username.trim().to_string(),
        email: normalize_email(&payload.email),
        role: Role::User,
        active: true,
        profile: Profile {
            first_name: payload.first_name,
            last_name: payload.last_name,
            ..Profile::default()
        },
    };

    let user = state.users.create(new_user, &payload.password).await?;
    let issued = state.tokens.issue_token(user.id, user.role)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            user_id: user.id,
        }),
    ))
}

/// validate_token
///
/// [Authenticated Route] Echoes the claims of the presented token.
#[utoipa::path(
    get,
    path = "/api/token",
    responses(
        (status = 200, description = "Token is valid", body = Claims),
        (status = 401, description = "Missing, invalid or expired token")
    )
)]
pub async fn validate_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Claims>> {
    let token = auth::bearer_token(&headers)?;
    Ok(Json(state.tokens.validate_token(token)?))
}

// --- Note Handlers ---

/// get_public_notes
///
/// [Public Route] Lists public notes, optionally filtered by tags.
#[utoipa::path(
    get,
    path = "/api/notes/public",
    params(NoteFilter),
    responses((status = 200, description = "Public notes", body = [Note]))
)]
pub async fn get_public_notes(
    State(state): State<AppState>,
    Query(filter): Query<NoteFilter>,
) -> AppResult<Json<Vec<Note>>> {
    let notes = notes_matching(&state, &filter).await?;
    Ok(Json(notes.into_iter().filter(|n| n.is_public).collect()))
}

/// get_my_notes
///
/// [Authenticated Route] Lists the caller's own notes, public and private.
#[utoipa::path(
    get,
    path = "/api/notes",
    params(NoteFilter),
    responses((status = 200, description = "My notes", body = [Note]))
)]
pub async fn get_my_notes(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<NoteFilter>,
) -> AppResult<Json<Vec<Note>>> {
    let notes: Vec<Note> = match filter.tag_list() {
        Some(tags) => state
            .notes
            .get_by_tags(&tags)
            .await?
            .into_iter()
            .filter(|n| n.user_id == id)
            .collect(),
        None => state.notes.get_by_user_id(id).await?,
    };
    Ok(Json(notes))
}

/// get_my_note
///
/// [Authenticated Route] Owner-scoped read. Another user's note is 403, whether it
/// is public or not.
#[utoipa::path(
    get,
    path = "/api/notes/{id}",
    params(("id" = Uuid, Path, description = "Note ID")),
    responses(
        (status = 200, description = "Found", body = Note),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_my_note(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Note>> {
    let note = state.notes.get_by_id(parse_id(&id)?).await?;
    policy::ensure_owner(&auth_user, note.user_id)?;
    Ok(Json(note))
}

/// create_note
///
/// [Authenticated Route] Creates a note owned by the caller.
#[utoipa::path(
    post,
    path = "/api/notes",
    request_body = CreateNoteRequest,
    responses((status = 201, description = "Created", body = Note))
)]
pub async fn create_note(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateNoteRequest>,
) -> AppResult<(StatusCode, Json<Note>)> {
    require_non_empty("title", &payload.title)?;

    let note = state
        .notes
        .create(NewNote {
            user_id: id,
            title: payload.title,
            content: payload.content,
            is_public: payload.is_public,
            tags: payload.tags,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// update_note
///
/// [Authenticated Route] Partial update of the caller's note. A `tags` field
/// replaces the whole tag set; without it the current tags are kept.
#[utoipa::path(
    patch,
    path = "/api/notes/{id}",
    params(("id" = Uuid, Path, description = "Note ID")),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "Updated", body = Note),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_note(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateNoteRequest>,
) -> AppResult<Json<Note>> {
    let mut note = state.notes.get_by_id(parse_id(&id)?).await?;
    policy::ensure_owner(&auth_user, note.user_id)?;

    if let Some(title) = payload.title {
        require_non_empty("title", &title)?;
        note.title = title;
    }
    if let Some(content) = payload.content {
        note.content = content;
    }
    if let Some(is_public) = payload.is_public {
        note.is_public = is_public;
    }
    if let Some(tags) = payload.tags {
        // Ids are assigned by the repository's get-or-create.
        note.tags = tags
            .into_iter()
            .map(|name| Tag { id: Uuid::nil(), name })
            .collect();
    }

    Ok(Json(state.notes.update(note).await?))
}

/// delete_note
///
/// [Authenticated Route] Soft deletes the caller's note.
#[utoipa::path(
    delete,
    path = "/api/notes/{id}",
    params(("id" = Uuid, Path, description = "Note ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not Owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_note(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_id(&id)?;
    let note = state.notes.get_by_id(id).await?;
    policy::ensure_owner(&auth_user, note.user_id)?;
    state.notes.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Admin Handlers ---

/// get_all_notes
///
/// [Admin Route] Every live note, optionally filtered by tags.
#[utoipa::path(
    get,
    path = "/api/admin/notes",
    params(NoteFilter),
    responses((status = 200, description = "All notes", body = [Note]))
)]
pub async fn get_all_notes(
    State(state): State<AppState>,
    Query(filter): Query<NoteFilter>,
) -> AppResult<Json<Vec<Note>>> {
    Ok(Json(notes_matching(&state, &filter).await?))
}

/// get_any_note
///
/// [Admin Route] Reads any live note regardless of owner.
#[utoipa::path(
    get,
    path = "/api/admin/notes/{id}",
    params(("id" = Uuid, Path, description = "Note ID")),
    responses((status = 200, description = "Found", body = Note), (status = 404, description = "Not Found"))
)]
pub async fn get_any_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Note>> {
    Ok(Json(state.notes.get_by_id(parse_id(&id)?).await?))
}

/// delete_any_note
///
/// [Admin Route] Soft deletes any note without an ownership check.
#[utoipa::path(
    delete,
    path = "/api/admin/notes/{id}",
    params(("id" = Uuid, Path, description = "Note ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_any_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.notes.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_users
///
/// [Admin Route] Lists live users.
#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "Users", body = [User]))
)]
pub async fn get_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.users.get_all().await?))
}

/// get_user
///
/// [Admin Route] Reads one live user.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Found", body = User), (status = 404, description = "Not Found"))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users.get_by_id(parse_id(&id)?).await?))
}

/// create_user
///
/// [Admin Route] Creates an account with an explicit role.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 409, description = "Email or username taken")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    require_non_empty("username", &payload.username)?;
    require_non_empty("email", &payload.email)?;
    require_non_empty("password", &payload.password)?;

    let user = state
        .users
        .create(
            NewUser {
                username: payload.username.trim().to_string(),
                email: normalize_email(&payload.email),
                role: payload.role,
                active: payload.active,
                profile: payload.profile,
            },
            &payload.password,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// update_user
///
/// [Admin Route] Partial update; omitted fields keep their current value.
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Email or username taken")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    let mut user = state.users.get_by_id(parse_id(&id)?).await?;

    if let Some(username) = payload.username {
        require_non_empty("username", &username)?;
        user.username = username.trim().to_string();
    }
    if let Some(email) = payload.email {
        require_non_empty("email", &email)?;
        user.email = normalize_email(&email);
    }
    if let Some(role) = payload.role {
        user.role = role;
    }
    if let Some(active) = payload.active {
        user.active = active;
    }
    if let Some(profile) = payload.profile {
        user.profile = profile;
    }

    Ok(Json(state.users.update(user).await?))
}

/// delete_user
///
/// [Admin Route] Soft deletes a user. Their outstanding tokens stay valid until
/// expiry; there is no revocation list.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.users.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
