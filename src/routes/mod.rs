/// Router Module Index
///
/// Routes are split by the guard they sit behind, so access control is
/// applied per module with Axum layers rather than remembered per handler.

/// Routes open to anonymous readers. Handlers apply the visibility rules.
pub mod public;

/// Routes behind the `Principal` extractor: any signed-in user.
pub mod authenticated;

/// Routes behind the admin guard.
pub mod admin;
