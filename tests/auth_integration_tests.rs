use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
    response::IntoResponse,
};
use blog_portal::{
    AppState, MemoryDirectory, MemoryRepository, MutationRunner, create_router,
    auth::AdminPrincipal,
    config::{AppConfig, Env},
    directory::{DirectoryState, UserDirectory},
    error::{AppError, AuthError, DirectoryError},
    identity::{
        Claims, Credentials, IdentityProvider, ProviderSession, UserMetadata,
        decode_access_token,
    },
    models::{Principal, ProviderUser, Role, SignInResponse, UserRecord},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::SystemTime,
};
use tokio::net::TcpListener;
use uuid::Uuid;

// --- Mock Identity Provider ---

/// Verifies tokens locally with the test secret. Sign-in accepts a single
/// hard-coded password; `editor@blog.dev` signs in as the admin identity,
/// every other email as the plain user.
struct MockIdentity {
    secret: String,
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn authenticate(&self, credentials: &Credentials) -> Result<ProviderSession, AuthError> {
        if credentials.password != "correct-password" {
            return Err(AuthError::InvalidCredentials);
        }
        let identity = match credentials.email.as_str() {
            "editor@blog.dev" => TEST_ADMIN_ID,
            _ => TEST_USER_ID,
        };
        let access_token = create_token(identity, 3600);
        let user = self.verify(&access_token)?;
        Ok(ProviderSession { access_token, user })
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        Ok(())
    }

    fn verify(&self, access_token: &str) -> Result<ProviderUser, AuthError> {
        decode_access_token(access_token, &self.secret)
    }
}

struct FailingDirectory;

/// Wraps a directory and counts lookups.
struct CountingDirectory {
    inner: DirectoryState,
    lookups: AtomicUsize,
}

#[async_trait]
impl UserDirectory for CountingDirectory {
    async fn lookup_user_record(&self, identity: Uuid) -> Result<Option<UserRecord>, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup_user_record(identity).await
    }
}

#[async_trait]
impl UserDirectory for FailingDirectory {
    async fn lookup_user_record(&self, _identity: Uuid) -> Result<Option<UserRecord>, DirectoryError> {
        Err(DirectoryError::Unavailable("timeout".to_string()))
    }
}

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);
const TEST_ADMIN_ID: Uuid = Uuid::from_u128(2);

fn create_token(user_id: Uuid, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
        email: Some(format!("{user_id}@blog.dev")),
        user_metadata: Some(UserMetadata {
            display_name: None,
            full_name: Some("Token Name".to_string()),
        }),
    };

    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn directory() -> DirectoryState {
    Arc::new(MemoryDirectory::with_records([
        UserRecord {
            id: TEST_USER_ID,
            email: Some("reader@blog.dev".to_string()),
            display_name: Some("Reader".to_string()),
            role: Some("user".to_string()),
        },
        UserRecord {
            id: TEST_ADMIN_ID,
            email: Some("editor@blog.dev".to_string()),
            display_name: Some("Editor".to_string()),
            role: Some("admin".to_string()),
        },
    ]))
}

fn create_app_state(env: Env, directory: DirectoryState) -> AppState {
    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };

    AppState {
        repo: Arc::new(MemoryRepository::new()),
        directory,
        identity: Arc::new(MockIdentity {
            secret: TEST_JWT_SECRET.to_string(),
        }),
        mutations: MutationRunner::new(),
        config,
    }
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

fn with_dev_user(parts: &mut Parts, id: Uuid) {
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&id.to_string()).unwrap(),
    );
}

/// Serves the router for `state` on a random port and returns its base URL.
async fn spawn_app(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    let router = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}

/// `Principal` has both the required and the optional extractor impl.
async fn principal_for(parts: &mut Parts, state: &AppState) -> Result<Principal, AppError> {
    <Principal as FromRequestParts<AppState>>::from_request_parts(parts, state).await
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let app_state = create_app_state(Env::Production, directory());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, 3600));

    let principal = principal_for(&mut parts, &app_state).await;

    assert!(principal.is_ok());
    let principal = principal.unwrap();
    assert_eq!(principal.identity, TEST_USER_ID);
    assert_eq!(principal.role, Role::User);
    // Directory profile wins over the token's metadata.
    assert_eq!(principal.display_name.as_deref(), Some("Reader"));
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, directory());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let principal = principal_for(&mut parts, &app_state).await;

    let err = principal.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));
    assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let app_state = create_app_state(Env::Production, directory());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Well past the default leeway.
    with_bearer(&mut parts, &create_token(TEST_USER_ID, -600));

    let principal = principal_for(&mut parts, &app_state).await;

    assert!(matches!(
        principal.unwrap_err(),
        AppError::Auth(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_auth_failure_with_foreign_signature() {
    let app_state = create_app_state(Env::Production, directory());
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;
    let claims = Claims {
        sub: TEST_ADMIN_ID,
        iat: now,
        exp: now + 3600,
        email: None,
        user_metadata: None,
    };
    let forged = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &forged);

    let admin = AdminPrincipal::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(admin.unwrap_err().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let app_state = create_app_state(Env::Local, directory());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_dev_user(&mut parts, TEST_ADMIN_ID);

    let principal = principal_for(&mut parts, &app_state).await;

    assert!(principal.is_ok());
    let principal = principal.unwrap();
    assert_eq!(principal.identity, TEST_ADMIN_ID);
    assert_eq!(principal.role, Role::Admin);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let app_state = create_app_state(Env::Production, directory());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Provide ONLY the local bypass header
    with_dev_user(&mut parts, TEST_ADMIN_ID);

    let principal = principal_for(&mut parts, &app_state).await;

    assert!(matches!(principal.unwrap_err(), AppError::Unauthorized));
}

#[tokio::test]
async fn test_directory_failure_falls_back_to_user_role() {
    let app_state = create_app_state(Env::Production, Arc::new(FailingDirectory));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_ADMIN_ID, 3600));

    let principal = principal_for(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(principal.identity, TEST_ADMIN_ID);
    assert_eq!(principal.role, Role::User);
    // Profile comes from the token when the directory is unreachable.
    assert_eq!(principal.display_name.as_deref(), Some("Token Name"));
}

#[tokio::test]
async fn test_admin_extractor_admits_admin() {
    let app_state = create_app_state(Env::Production, directory());

    let mut parts = get_request_parts(Method::GET, "/admin/posts".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_ADMIN_ID, 3600));

    let AdminPrincipal(admin) = AdminPrincipal::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert!(admin.is_admin());
}

#[tokio::test]
async fn test_admin_extractor_forbids_user_role() {
    let app_state = create_app_state(Env::Production, directory());

    let mut parts = get_request_parts(Method::GET, "/admin/posts".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_USER_ID, 3600));

    let err = AdminPrincipal::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_extractor_forbids_when_directory_is_down() {
    let app_state = create_app_state(Env::Production, Arc::new(FailingDirectory));

    let mut parts = get_request_parts(Method::GET, "/admin/posts".parse().unwrap());
    with_bearer(&mut parts, &create_token(TEST_ADMIN_ID, 3600));

    let err = AdminPrincipal::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

#[tokio::test]
async fn test_optional_principal_treats_bad_token_as_anonymous() {
    let app_state = create_app_state(Env::Production, directory());

    let mut parts = get_request_parts(Method::GET, "/session".parse().unwrap());
    with_bearer(&mut parts, "not-a-jwt");

    let principal =
        <Principal as OptionalFromRequestParts<AppState>>::from_request_parts(&mut parts, &app_state)
            .await
            .unwrap();
    assert!(principal.is_none());
}

// --- Sign-in over HTTP ---

#[tokio::test]
async fn test_sign_in_returns_token_and_directory_role() {
    let address = spawn_app(create_app_state(Env::Production, directory())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{address}/auth/sign-in"))
        .json(&json!({ "email": "editor@blog.dev", "password": "correct-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: SignInResponse = response.json().await.unwrap();
    assert_eq!(body.principal.identity, TEST_ADMIN_ID);
    assert_eq!(body.principal.role, Role::Admin);
    assert_eq!(body.principal.display_name.as_deref(), Some("Editor"));

    // The returned token is accepted on the admin surface.
    let stats = client
        .get(format!("{address}/admin/stats"))
        .bearer_auth(&body.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(stats.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn test_sign_in_as_user_gets_user_role() {
    let address = spawn_app(create_app_state(Env::Production, directory())).await;

    let body: SignInResponse = reqwest::Client::new()
        .post(format!("{address}/auth/sign-in"))
        .json(&json!({ "email": "reader@blog.dev", "password": "correct-password" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.principal.identity, TEST_USER_ID);
    assert_eq!(body.principal.role, Role::User);
}

#[tokio::test]
async fn test_sign_in_with_wrong_password_is_not_retryable() {
    let address = spawn_app(create_app_state(Env::Production, directory())).await;

    let response = reqwest::Client::new()
        .post(format!("{address}/auth/sign-in"))
        .json(&json!({ "email": "editor@blog.dev", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "auth_error");
    assert_eq!(body["retryable"], false);
}

// --- One resolution per request ---

#[tokio::test]
async fn test_guarded_routes_resolve_the_principal_once() {
    let counting = Arc::new(CountingDirectory {
        inner: directory(),
        lookups: AtomicUsize::new(0),
    });
    let state = create_app_state(Env::Production, counting.clone());
    let address = spawn_app(state).await;
    let client = reqwest::Client::new();

    let admin_token = create_token(TEST_ADMIN_ID, 3600);
    let stats = client
        .get(format!("{address}/admin/stats"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(stats.status(), reqwest::StatusCode::OK);
    assert_eq!(counting.lookups.load(Ordering::SeqCst), 1);

    let me: Principal = client
        .get(format!("{address}/me"))
        .bearer_auth(create_token(TEST_USER_ID, 3600))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me.identity, TEST_USER_ID);
    assert_eq!(counting.lookups.load(Ordering::SeqCst), 2);
}
