//! Session Resolver
//!
//! Turns identity-provider events into an application `Principal` and
//! publishes it through a single observable session slot.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::{
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
};

use crate::{
    directory::DirectoryState,
    models::{Principal, ProviderUser, Role},
};

/// SessionState
///
/// The value held in the session slot. While `loading` is true no access
/// decision may be made from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub principal: Option<Principal>,
    pub loading: bool,
}

impl SessionState {
    /// State of a freshly started process: nothing resolved yet.
    pub fn initial() -> Self {
        Self {
            principal: None,
            loading: true,
        }
    }

    pub fn resolved(principal: Option<Principal>) -> Self {
        Self {
            principal,
            loading: false,
        }
    }
}

/// SessionEvent
///
/// A raw authentication event from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedOut,
    SignedIn(ProviderUser),
}

/// resolve_principal
///
/// Looks the identity up in the directory and builds a principal. This never
/// fails: a missing record or an unreachable directory both produce a
/// `Role::User` principal, so the caller is at worst under-privileged.
pub async fn resolve_principal(directory: &DirectoryState, user: &ProviderUser) -> Principal {
    match directory.lookup_user_record(user.identity).await {
        Ok(Some(record)) => Principal {
            identity: user.identity,
            email: user.email.clone(),
            display_name: record.display_name.or_else(|| user.display_name.clone()),
            role: Role::from_directory(record.role.as_deref()),
        },
        Ok(None) => {
            tracing::warn!(
                identity = %user.identity,
                "no directory record for identity, defaulting to user role"
            );
            Principal::least_privilege(user)
        }
        Err(e) => {
            tracing::error!(
                identity = %user.identity,
                error = %e,
                "directory lookup failed, defaulting to user role"
            );
            Principal::least_privilege(user)
        }
    }
}

/// SessionResolver
///
/// Process-wide session slot. Construction is the init step (slot starts in
/// the loading state); `sign_out` is the teardown. Consumers subscribe to the
/// slot instead of polling.
///
/// Every event takes a ticket. Only the holder of the newest ticket may
/// publish, so a slow directory lookup for an old event can never overwrite
/// the result of a newer one.
pub struct SessionResolver {
    directory: DirectoryState,
    slot: watch::Sender<SessionState>,
    issued: AtomicU64,
}

impl SessionResolver {
    pub fn new(directory: DirectoryState) -> Self {
        let (slot, _) = watch::channel(SessionState::initial());
        Self {
            directory,
            slot,
            issued: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.slot.subscribe()
    }

    pub fn current(&self) -> SessionState {
        self.slot.borrow().clone()
    }

    /// handle_event
    ///
    /// Resolves one provider event. Returns `true` if its result was
    /// published, `false` if a newer event superseded it in the meantime.
    pub async fn handle_event(&self, event: SessionEvent) -> bool {
        let ticket = self.issue();
        self.resolve(ticket, event).await
    }

    /// issue
    ///
    /// Takes the next ticket. Tickets must be issued in event arrival order;
    /// callers that hand events to other tasks issue before handing off.
    pub fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// resolve
    ///
    /// Resolves an event under a previously issued ticket. Publishes only if
    /// no later ticket has been issued by the time resolution completes.
    pub async fn resolve(&self, ticket: u64, event: SessionEvent) -> bool {
        let principal = match event {
            SessionEvent::SignedOut => None,
            SessionEvent::SignedIn(user) => {
                self.slot.send_if_modified(|state| {
                    if !self.is_newest(ticket) || state.loading {
                        return false;
                    }
                    state.loading = true;
                    true
                });
                Some(resolve_principal(&self.directory, &user).await)
            }
        };

        self.publish(ticket, principal)
    }

    /// Teardown: drops the current principal.
    pub async fn sign_out(&self) {
        self.handle_event(SessionEvent::SignedOut).await;
    }

    fn is_newest(&self, ticket: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket
    }

    fn publish(&self, ticket: u64, principal: Option<Principal>) -> bool {
        // The ticket check runs under the slot's lock, so no newer ticket can
        // publish between the comparison and the write.
        let published = self.slot.send_if_modified(|state| {
            if !self.is_newest(ticket) {
                return false;
            }
            *state = SessionState::resolved(principal);
            true
        });
        if !published {
            tracing::debug!(ticket, "discarding stale session resolution");
        }
        published
    }

    /// listen
    ///
    /// Consumes the provider's session-change feed. Each event resolves on
    /// its own task so a newer event does not wait behind a slow lookup. The
    /// returned handle completes once the feed is closed and every pending
    /// resolution has settled.
    pub fn listen(self: Arc<Self>, mut events: mpsc::Receiver<SessionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut pending = JoinSet::new();
            while let Some(event) = events.recv().await {
                // Ticket order follows the feed, not task scheduling.
                let ticket = self.issue();
                let resolver = Arc::clone(&self);
                pending.spawn(async move { resolver.resolve(ticket, event).await });
                while pending.try_join_next().is_some() {}
            }
            tracing::debug!("session event feed closed");
            while pending.join_next().await.is_some() {}
        })
    }
}
