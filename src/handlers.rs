use crate::{
    AppState,
    auth::{AdminPrincipal, bearer_token},
    error::AppError,
    identity::Credentials,
    models::{
        AdminDashboardStats, CreatePostRequest, Post, PostFilter, Principal, PublishRequest,
        SessionResponse, SignInRequest, SignInResponse, UpdatePostRequest,
    },
    mutation::{MutationKey, MutationKind},
    session::resolve_principal,
    visibility::{admin_feed, partition, public_feed, public_post},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use uuid::Uuid;

// --- Public Handlers ---

/// list_posts
///
/// [Public Route] The reader-facing feed: published posts, newest first.
/// The store query already filters, and the visibility rules filter again.
#[utoipa::path(
    get,
    path = "/posts",
    responses(
        (status = 200, description = "Published posts", body = [Post]),
        (status = 503, description = "Content store unavailable")
    )
)]
pub async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<Post>>, AppError> {
    let posts = state.repo.query_posts(PostFilter::published()).await?;
    Ok(Json(public_feed(posts).to_vec()))
}

/// get_post
///
/// [Public Route] A single post by id. Unpublished posts answer exactly like
/// missing ones so their existence never leaks.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, AppError> {
    let post = state.repo.get_post(id).await?;
    Ok(Json(public_post(post)?))
}

/// sign_in
///
/// [Public Route] Authenticates with the identity provider and returns the
/// access token with the principal resolved for it.
#[utoipa::path(
    post,
    path = "/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<SignInResponse>, AppError> {
    let credentials = Credentials {
        email: payload.email,
        password: payload.password,
    };
    let session = state.identity.authenticate(&credentials).await?;
    let principal = resolve_principal(&state.directory, &session.user).await;
    tracing::info!(identity = %principal.identity, role = principal.role.as_str(), "signed in");
    Ok(Json(SignInResponse {
        access_token: session.access_token,
        principal,
    }))
}

/// get_session
///
/// [Public Route] The caller's session as seen by the server. Anonymous and
/// invalid credentials both yield `principal: null`.
#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "Session", body = SessionResponse))
)]
pub async fn get_session(principal: Option<Principal>) -> Json<SessionResponse> {
    Json(SessionResponse {
        principal,
        loading: false,
    })
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] The resolved principal of the caller.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Principal", body = Principal),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn get_me(principal: Principal) -> Json<Principal> {
    Json(principal)
}

/// sign_out
///
/// [Authenticated Route] Ends the provider session behind the bearer token.
#[utoipa::path(
    post,
    path = "/auth/sign-out",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn sign_out(
    principal: Principal,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    if let Some(token) = bearer_token(&headers) {
        state.identity.sign_out(token).await?;
    }
    tracing::info!(identity = %principal.identity, "signed out");
    Ok(StatusCode::NO_CONTENT)
}

// --- Admin Handlers ---

/// admin_list_posts
///
/// [Admin Route] Every post, drafts included, newest first.
#[utoipa::path(
    get,
    path = "/admin/posts",
    responses(
        (status = 200, description = "All posts", body = [Post]),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn admin_list_posts(
    AdminPrincipal(_admin): AdminPrincipal,
    State(state): State<AppState>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = state.repo.query_posts(PostFilter::all()).await?;
    Ok(Json(admin_feed(posts).to_vec()))
}

/// admin_get_post
///
/// [Admin Route] Any post by id, for the editor.
#[utoipa::path(
    get,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not Found")
    )
)]
pub async fn admin_get_post(
    AdminPrincipal(_admin): AdminPrincipal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, AppError> {
    state
        .repo
        .get_post(id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}

/// Re-reads a post after a write settled. The stored row is the answer, not
/// whatever the write returned.
async fn confirm(state: &AppState, id: Uuid) -> Result<Post, AppError> {
    state.repo.get_post(id).await?.ok_or(AppError::NotFound)
}

/// create_post
///
/// [Admin Route] Creates a post authored by the caller.
#[utoipa::path(
    post,
    path = "/admin/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Already creating")
    )
)]
pub async fn create_post(
    AdminPrincipal(admin): AdminPrincipal,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    // 1. Validation
    payload.validate().map_err(AppError::Validation)?;

    // 2. Write. No post id exists yet, so overlap is keyed by author.
    let key = MutationKey::new(MutationKind::Create, admin.identity);
    let repo = state.repo.clone();
    let author = admin.clone();
    let created = state
        .mutations
        .submit(key, async move { repo.create_post(&author, payload).await })
        .await?;

    // 3. Confirm against the store
    tracing::info!(post = %created.id, author = %admin.identity, "post created");
    Ok((StatusCode::CREATED, Json(confirm(&state, created.id).await?)))
}

/// update_post
///
/// [Admin Route] Partial edit of title, content or publish flag.
#[utoipa::path(
    put,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Edit already in progress")
    )
)]
pub async fn update_post(
    AdminPrincipal(_admin): AdminPrincipal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    // 1. Validation: only the provided fields are checked.
    payload.validate().map_err(AppError::Validation)?;

    // 2. Write
    let repo = state.repo.clone();
    state
        .mutations
        .submit(MutationKey::new(MutationKind::Edit, id), async move {
            repo.update_post(id, payload).await
        })
        .await?
        .ok_or(AppError::NotFound)?;

    // 3. Confirm against the store
    Ok(Json(confirm(&state, id).await?))
}

/// set_post_status
///
/// [Admin Route] Publishes or unpublishes a post.
#[utoipa::path(
    put,
    path = "/admin/posts/{id}/status",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Toggle already in progress")
    )
)]
pub async fn set_post_status(
    AdminPrincipal(_admin): AdminPrincipal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PublishRequest>,
) -> Result<Json<Post>, AppError> {
    // 1. Write. A second toggle of the same post is rejected until this settles.
    let repo = state.repo.clone();
    state
        .mutations
        .submit(MutationKey::new(MutationKind::Publish, id), async move {
            repo.set_published(id, payload.published).await
        })
        .await?
        .ok_or(AppError::NotFound)?;

    // 2. Confirm against the store
    tracing::info!(post = %id, published = payload.published, "post visibility changed");
    Ok(Json(confirm(&state, id).await?))
}

/// delete_post
///
/// [Admin Route] Deletes a post.
#[utoipa::path(
    delete,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_post(
    AdminPrincipal(_admin): AdminPrincipal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let repo = state.repo.clone();
    let deleted = state
        .mutations
        .submit(MutationKey::new(MutationKind::Delete, id), async move {
            repo.delete_post(id).await
        })
        .await?;

    if deleted {
        tracing::info!(post = %id, "post deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

/// get_admin_stats
///
/// [Admin Route] Published/draft counts from a single snapshot.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = AdminDashboardStats))
)]
pub async fn get_admin_stats(
    AdminPrincipal(_admin): AdminPrincipal,
    State(state): State<AppState>,
) -> Result<Json<AdminDashboardStats>, AppError> {
    let posts = state.repo.query_posts(PostFilter::all()).await?;
    let (published, drafts) = partition(posts);
    Ok(Json(AdminDashboardStats {
        total_posts: (published.len() + drafts.len()) as i64,
        published_posts: published.len() as i64,
        draft_posts: drafts.len() as i64,
    }))
}
