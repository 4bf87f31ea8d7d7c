//! Access Guard
//!
//! Decides admit/deny for a protected view from the current session state and
//! the role the view requires. The decision is a plain value; whoever holds it
//! performs the navigation.

use serde::Serialize;
use tokio::sync::watch;

use crate::{models::Role, session::SessionState};

/// RequiredRole
///
/// What a protected view demands of the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequiredRole {
    /// Any signed-in principal.
    #[default]
    None,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardState {
    Pending,
    Admitted,
    Denied,
}

/// Redirect
///
/// Where a denied caller should be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    SignIn,
    /// Signed in but under-privileged.
    SignInUnauthorized,
}

impl Redirect {
    pub fn target(&self) -> &'static str {
        match self {
            Redirect::SignIn => "/login",
            Redirect::SignInUnauthorized => "/login?unauthorized=true",
        }
    }
}

/// GuardDecision
///
/// `redirect` is set exactly when `state == Denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardDecision {
    pub state: GuardState,
    pub redirect: Option<Redirect>,
}

impl GuardDecision {
    const PENDING: Self = Self {
        state: GuardState::Pending,
        redirect: None,
    };
    const ADMITTED: Self = Self {
        state: GuardState::Admitted,
        redirect: None,
    };

    fn denied(redirect: Redirect) -> Self {
        Self {
            state: GuardState::Denied,
            redirect: Some(redirect),
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.state == GuardState::Admitted
    }
}

/// evaluate
///
/// The pure decision procedure. A loading session is never judged.
pub fn evaluate(session: &SessionState, required: RequiredRole) -> GuardDecision {
    if session.loading {
        return GuardDecision::PENDING;
    }
    match (&session.principal, required) {
        (None, _) => GuardDecision::denied(Redirect::SignIn),
        (Some(p), RequiredRole::Admin) if p.role != Role::Admin => {
            GuardDecision::denied(Redirect::SignInUnauthorized)
        }
        _ => GuardDecision::ADMITTED,
    }
}

/// Guard
///
/// Continuous enforcement over a session slot subscription. Every session or
/// required-role change re-evaluates, so a role revoked while a view is open
/// turns `Admitted` into `Denied`, and a re-resolving session goes back to
/// `Pending`.
pub struct Guard {
    session: watch::Receiver<SessionState>,
    required: RequiredRole,
}

impl Guard {
    pub fn new(session: watch::Receiver<SessionState>, required: RequiredRole) -> Self {
        Self { session, required }
    }

    /// Decision for the state currently in the slot.
    pub fn decision(&self) -> GuardDecision {
        evaluate(&self.session.borrow(), self.required)
    }

    pub fn set_required_role(&mut self, required: RequiredRole) -> GuardDecision {
        self.required = required;
        self.decision()
    }

    /// changed
    ///
    /// Waits for the next session change and returns the re-evaluated
    /// decision. `None` once the session slot has been dropped.
    pub async fn changed(&mut self) -> Option<GuardDecision> {
        self.session.changed().await.ok()?;
        let decision = evaluate(&self.session.borrow_and_update(), self.required);
        tracing::debug!(state = ?decision.state, "guard re-evaluated");
        Some(decision)
    }
}
