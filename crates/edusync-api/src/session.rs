// Ambient session state shared by the HTTP client and the realtime channel.
//
// The authentication collaborator writes this slot after login/logout; the
// transport layer only ever reads it. Reads are lock-free via `arc-swap`.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Role of the signed-in user. A closed set — authorization is server-owned,
/// the client only routes on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    SuperAdmin,
    SchoolAdmin,
    Teacher,
    Student,
    Parent,
}

/// The signed-in user as reported by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: UserRole,
}

/// One authenticated session: bearer token plus user identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SecretString,
    pub user: CurrentUser,
}

/// Process-shared slot holding the current [`Session`], if any.
///
/// Absence of a session means requests go out unauthenticated — the server
/// decides rejection, the client does not pre-filter.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: ArcSwapOption<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session after successful authentication.
    pub fn sign_in(&self, token: SecretString, user: CurrentUser) {
        self.current.store(Some(Arc::new(Session { token, user })));
    }

    /// Clear the session (logout, or a 401 telling us the token is dead).
    pub fn sign_out(&self) {
        self.current.store(None);
    }

    /// The full current session, if authenticated.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    /// The current bearer token, if authenticated.
    pub fn token(&self) -> Option<SecretString> {
        self.current.load().as_ref().map(|s| s.token.clone())
    }

    /// The current user, if authenticated.
    pub fn user(&self) -> Option<CurrentUser> {
        self.current.load().as_ref().map(|s| s.user.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.load().is_some()
    }
}
