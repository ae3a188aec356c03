//! Process-wide authentication state.
//!
//! ```text
//! Uninitialized --initialize--> Anonymous | Authenticated
//! Anonymous     --login-------> Authenticated
//! Authenticated --login-------> Authenticated   (token replaced)
//! Authenticated --logout/401--> Anonymous
//! ```
//!
//! Logging out flips the state before anything is awaited, so when many calls
//! race (e.g. several requests bouncing with 401 at once) exactly one of them
//! performs the purge, the notification and the token removal.
use slotmap::SlotMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::token_store::{StorageError, TokenStore};

#[derive(Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Anonymous,
    Authenticated(String),
}

// keep tokens out of logs
impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "Uninitialized"),
            SessionState::Anonymous => write!(f, "Anonymous"),
            SessionState::Authenticated(_) => write!(f, "Authenticated(..)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignOutReason {
    UserRequested,
    Unauthorized,
}

/// Navigation signals for the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Startup finished reading the token store.
    Resolved(SessionState),
    /// Go to the main area.
    SignedIn,
    /// Go to the unauthenticated entry point.
    SignedOut { reason: SignOutReason },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot log in before the session has been initialized")]
    Uninitialized,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

slotmap::new_key_type! {
    pub struct ListenerKey;
}

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

pub struct SessionManager {
    state: Mutex<SessionState>,
    store: Arc<dyn TokenStore>,
    // held across every token store write so a late remove cannot clobber a newer login
    store_writes: tokio::sync::Mutex<()>,
    purge: Box<dyn Fn() + Send + Sync>,
    listeners: Mutex<SlotMap<ListenerKey, Listener>>,
}

impl SessionManager {
    /// `purge` is called once per sign-out to drop every cached entity.
    pub fn new(store: Arc<dyn TokenStore>, purge: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(SessionState::Uninitialized),
            store,
            store_writes: tokio::sync::Mutex::new(()),
            purge: Box::new(purge),
            listeners: Mutex::new(SlotMap::with_key()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn token(&self) -> Option<String> {
        match &*self.lock_state() {
            SessionState::Authenticated(token) => Some(token.clone()),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.lock_state(), SessionState::Authenticated(_))
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> ListenerKey {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Arc::new(listener))
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn notify(&self, event: &SessionEvent) {
        // copy the listeners out so a callback can subscribe/unsubscribe without deadlocking
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Reads the token store once. Later calls return the current state untouched.
    pub async fn initialize(&self) -> SessionState {
        let current = self.state();
        if current != SessionState::Uninitialized {
            return current;
        }

        let token = match self.store.get().await {
            Ok(token) => token.filter(|token| !token.is_empty()),
            Err(e) => {
                log::error!("Failed to read session token: {e}");
                None
            }
        };
        let resolved = match token {
            Some(token) => SessionState::Authenticated(token),
            None => SessionState::Anonymous,
        };

        {
            let mut state = self.lock_state();
            if *state != SessionState::Uninitialized {
                // a concurrent initialize or login got there first
                return state.clone();
            }
            *state = resolved.clone();
        }

        log::info!("Session resolved as {resolved:?}");
        self.notify(&SessionEvent::Resolved(resolved.clone()));
        resolved
    }

    /// Persists `token` and switches to `Authenticated`.
    /// Logging in as someone else while authenticated drops the cache as well.
    pub async fn login(&self, token: impl Into<String>) -> Result<(), SessionError> {
        let token = token.into();
        if self.state() == SessionState::Uninitialized {
            return Err(SessionError::Uninitialized);
        }

        let _writing = self.store_writes.lock().await;
        self.store.set(&token).await.inspect_err(|e| {
            log::error!("Failed to save session token: {e}");
        })?;

        let previous = std::mem::replace(
            &mut *self.lock_state(),
            SessionState::Authenticated(token.clone()),
        );

        if matches!(&previous, SessionState::Authenticated(old) if *old != token) {
            log::info!("Session token replaced, dropping cached data");
            (self.purge)();
        }

        log::info!("Logged in");
        self.notify(&SessionEvent::SignedIn);
        Ok(())
    }

    /// Ends the session. Only the first of several concurrent calls does anything;
    /// the rest see `Anonymous` and return `Ok(false)`.
    pub async fn logout(&self) -> Result<bool, SessionError> {
        self.sign_out(None, SignOutReason::UserRequested).await
    }

    /// Called by the gateway when a request carrying `token_used` came back 401.
    /// Ignored unless that token is still the current one.
    pub async fn expire(&self, token_used: &str) -> Result<bool, SessionError> {
        self.sign_out(Some(token_used), SignOutReason::Unauthorized)
            .await
    }

    async fn sign_out(
        &self,
        expected_token: Option<&str>,
        reason: SignOutReason,
    ) -> Result<bool, SessionError> {
        let ended = {
            let mut state = self.lock_state();
            let ends = match &*state {
                SessionState::Authenticated(current) => {
                    expected_token.is_none_or(|expected| expected == current.as_str())
                }
                _ => false,
            };
            if ends {
                *state = SessionState::Anonymous;
            }
            ends
        };
        if !ended {
            return Ok(false);
        }

        match reason {
            SignOutReason::UserRequested => log::info!("Logging out"),
            SignOutReason::Unauthorized => {
                log::warn!("Server rejected the session token, logging out")
            }
        }

        (self.purge)();
        self.notify(&SessionEvent::SignedOut { reason });

        let _writing = self.store_writes.lock().await;
        if self.state() != SessionState::Anonymous {
            log::info!("Signed back in before the old token was cleared, keeping the new one");
            return Ok(true);
        }
        self.store.remove().await.inspect_err(|e| {
            log::error!("Failed to remove session token: {e}");
        })?;
        Ok(true)
    }
}
