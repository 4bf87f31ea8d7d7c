use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use std::convert::Infallible;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    directory::DirectoryState,
    error::AppError,
    guard::{GuardState, Redirect, RequiredRole, evaluate},
    identity::IdentityState,
    models::{Principal, ProviderUser},
    session::{SessionState, resolve_principal},
};

/// Header accepted in `Env::Local` in place of a bearer token.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// bearer_token
///
/// The raw token from `Authorization: Bearer ...`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// resolve_request_session
///
/// Builds the session for one request. Resolution always completes before
/// this returns, so the resulting state is never `loading`.
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header names the identity.
/// 2. Bearer token: verified by the identity provider.
/// 3. Directory lookup with least-privilege fallback.
///
/// A request with no credentials resolves to an anonymous session; a request
/// with a bad token is an `AuthError`.
pub async fn resolve_request_session<S>(parts: &Parts, state: &S) -> Result<SessionState, AppError>
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    DirectoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    // 1. Dependency Resolution
    let config = AppConfig::from_ref(state);
    let directory = DirectoryState::from_ref(state);

    // 2. Local Development Bypass Check
    // Only honoured in Env::Local; in production the header is ignored and the
    // request falls through to the bearer path.
    if config.env == Env::Local {
        let dev_identity = parts
            .headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok());
        if let Some(identity) = dev_identity {
            let user = ProviderUser {
                identity,
                email: None,
                display_name: None,
            };
            let principal = resolve_principal(&directory, &user).await;
            return Ok(SessionState::resolved(Some(principal)));
        }
    }

    // 3. Token Validation
    let Some(token) = bearer_token(&parts.headers) else {
        return Ok(SessionState::resolved(None));
    };

    let identity = IdentityState::from_ref(state);
    let user = identity.verify(token)?;

    // 4. Directory Lookup (least-privilege fallback)
    let principal = resolve_principal(&directory, &user).await;
    Ok(SessionState::resolved(Some(principal)))
}

/// The principal a guard layer already resolved for this request, if any.
/// Reusing it keeps one token check and one directory lookup per request.
fn resolved_by_layer(parts: &Parts) -> Option<Principal> {
    parts.extensions.get::<Principal>().cloned()
}

/// Runs the access guard over a resolved request session.
fn admit(session: SessionState, required: RequiredRole) -> Result<Principal, AppError> {
    let decision = evaluate(&session, required);
    match (decision.state, decision.redirect) {
        (GuardState::Admitted, _) => session.principal.ok_or(AppError::Unauthorized),
        (GuardState::Denied, Some(Redirect::SignInUnauthorized)) => Err(AppError::Forbidden),
        // A request session is never loading; Pending is treated as not signed in.
        _ => Err(AppError::Unauthorized),
    }
}

/// Principal Extractor
///
/// Admits any signed-in principal. Rejects with 401 and a sign-in redirect
/// otherwise.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    DirectoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = resolved_by_layer(parts) {
            return Ok(principal);
        }
        let session = resolve_request_session(parts, state).await?;
        admit(session, RequiredRole::None)
    }
}

/// Optional principal for public routes: anonymous and invalid credentials
/// both read as `None`.
impl<S> OptionalFromRequestParts<S> for Principal
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    DirectoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if let Some(principal) = resolved_by_layer(parts) {
            return Ok(Some(principal));
        }
        match resolve_request_session(parts, state).await {
            Ok(session) => Ok(session.principal),
            Err(e) => {
                tracing::debug!(error = %e, "treating request as anonymous");
                Ok(None)
            }
        }
    }
}

/// AdminPrincipal Extractor
///
/// Admits only `Role::Admin`. No principal answers 401 (redirect to sign-in);
/// an under-privileged principal answers 403 (redirect with the unauthorized
/// marker). The handler never runs in either case.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AdminPrincipal
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    DirectoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = match resolved_by_layer(parts) {
            Some(principal) => SessionState::resolved(Some(principal)),
            None => resolve_request_session(parts, state).await?,
        };
        let identity = session.principal.as_ref().map(|p| p.identity);
        admit(session, RequiredRole::Admin)
            .map(AdminPrincipal)
            .inspect_err(|e| {
                if matches!(e, AppError::Forbidden) {
                    tracing::warn!(identity = ?identity, "non-admin principal denied admin route");
                }
            })
    }
}
