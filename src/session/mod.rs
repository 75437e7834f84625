//! Session manager: owns the token pair and the signed-in user, and renews
//! an expired access token transparently.
//!
//! Every backend call that needs credentials goes through
//! [`SessionManager::authorized_request`]. On a 401 the request is retried
//! at most once, after a refresh. Refreshing is single-flight: the backend
//! rotates refresh tokens on use, so concurrent callers that hit the same
//! expired access token wait for one refresh and share its outcome.

pub mod store;
pub mod token;
pub mod user;

pub use store::{FileTokenStore, StoredTokens, TokenStore};
pub use user::User;

use crate::error::SessionError;
use crate::transport::{Request, Response, Transport};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use user::UserRecord;

pub const LOGIN_PATH: &str = "/api/usuario/loginUsuario";
pub const REGISTER_PATH: &str = "/api/usuario/registroUsuario";
pub const CREATE_ADMIN_PATH: &str = "/api/admin/createAdmin";
pub const REFRESH_PATH: &str = "/api/usuario/refreshToken";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Refreshing,
    /// The last refresh failed and the session was cleared
    Failed,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticated => "authenticated",
            AuthState::Refreshing => "refreshing",
            AuthState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<User>,
}

struct Inner {
    session: Session,
    state: AuthState,
    // Outcome of the last failed refresh, handed to callers that waited on it
    last_refresh_error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    usuario: Option<UserRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    inner: Mutex<Inner>,
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    /// Create an empty (unauthenticated) session. Call
    /// [`restore_on_load`](Self::restore_on_load) before first use.
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            transport,
            store,
            inner: Mutex::new(Inner {
                session: Session::default(),
                state: AuthState::Unauthenticated,
                last_refresh_error: None,
            }),
            refresh_gate: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().session.access_token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.lock()
            .session
            .user
            .as_ref()
            .is_some_and(User::is_admin)
    }

    pub fn user(&self) -> Option<User> {
        self.lock().session.user.clone()
    }

    pub fn state(&self) -> AuthState {
        self.lock().state
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().session.access_token.clone()
    }

    /// Expiry claimed by the current access token, when it carries one
    pub fn access_token_expiry(&self) -> Option<DateTime<Utc>> {
        let token = self.access_token()?;
        let exp = token::decode_claims(&token).ok()?.exp?;
        DateTime::from_timestamp(exp, 0)
    }

    /// Install a complete session and persist both tokens. The store is
    /// written under the state lock so disk never lags memory.
    fn install(&self, access_token: String, refresh_token: String, user: Option<User>) {
        let stored = StoredTokens {
            access_token: Some(access_token.clone()),
            refresh_token: Some(refresh_token.clone()),
        };
        let mut inner = self.lock();
        inner.session = Session {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            user,
        };
        inner.state = AuthState::Authenticated;
        inner.last_refresh_error = None;
        if let Err(e) = self.store.save(&stored) {
            warn!(error = %e, "failed to persist session tokens");
        }
    }

    /// Drop the whole session, in memory and on disk
    fn clear(&self, state: AuthState, refresh_error: Option<String>) {
        let mut inner = self.lock();
        inner.session = Session::default();
        inner.state = state;
        inner.last_refresh_error = refresh_error;
        if let Err(e) = self.store.save(&StoredTokens::default()) {
            warn!(error = %e, "failed to clear persisted session tokens");
        }
    }

    fn set_state(&self, state: AuthState) {
        self.lock().state = state;
    }

    pub fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let request = Request::post(LOGIN_PATH, json!({ "email": email, "password": password }));
        let response = self.transport.send(&request)?;

        if (400..500).contains(&response.status) {
            warn!(status = response.status, "login rejected");
            return Err(SessionError::InvalidCredentials);
        }
        if !response.is_success() {
            return Err(transient("login", &response));
        }

        let body: LoginResponse = response.json().map_err(|e| {
            SessionError::TransientFailure(format!("malformed login response: {}", e))
        })?;

        let claims = token::decode_claims(&body.access_token).ok();
        let record = body.usuario.unwrap_or_default();
        let role = record
            .id_rol
            .or_else(|| claims.as_ref().and_then(|c| c.id_rol))
            .unwrap_or_default();
        let mut user = User {
            id: record.user_id().map(str::to_string),
            email: record.email,
            display_name: record.nombre,
            role,
        };
        if let Some(claims) = claims {
            user = user.merged_with(&User::from(claims));
        }

        info!(role = user.role.as_str(), "logged in");
        // Not while a refresh is installing its own pair
        let _gate = self.refresh_gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.install(body.access_token, body.refresh_token, Some(user.clone()));
        Ok(user)
    }

    /// Create a member account. Does not sign in.
    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<Value, SessionError> {
        let request = Request::post(REGISTER_PATH, account_body(name, email, password));
        let response = self.transport.send(&request)?;
        registration_outcome("registration", response)
    }

    /// Create an administrator account. Sent with the current admin
    /// credentials; the backend decides whether the caller may do this.
    pub fn register_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Value, SessionError> {
        let request = Request::post(CREATE_ADMIN_PATH, account_body(name, email, password));
        let response = self.authorized_request(&request)?;
        registration_outcome("admin registration", response)
    }

    pub fn logout(&self) {
        let _gate = self.refresh_gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.clear(AuthState::Unauthenticated, None);
        info!("logged out");
    }

    /// Re-establish a persisted session at startup with one refresh cycle.
    ///
    /// Returns `Ok(None)` without any network traffic when nothing was
    /// persisted. On failure the session is left cleared.
    pub fn restore_on_load(&self) -> Result<Option<User>, SessionError> {
        let stored = self.store.load().unwrap_or_else(|e| {
            warn!(error = %e, "cannot read persisted session");
            StoredTokens::default()
        });

        let Some(refresh_token) = stored.refresh_token else {
            if stored.access_token.is_some() {
                // Half a session is no session
                self.clear(AuthState::Unauthenticated, None);
            }
            return Ok(None);
        };

        let _gate = self.refresh_gate.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut inner = self.lock();
            inner.session.access_token = stored.access_token;
            inner.session.refresh_token = Some(refresh_token.clone());
            inner.state = AuthState::Refreshing;
        }
        debug!("restoring persisted session");
        self.run_refresh(&refresh_token)?;
        Ok(self.user())
    }

    /// Send `request` with the current access token, refreshing and
    /// replaying once if the backend answers 401.
    ///
    /// Any other status, or a 401 on the replay, comes back unmodified.
    pub fn authorized_request(&self, request: &Request) -> Result<Response, SessionError> {
        let used = self.access_token();
        let response = self.transport.send(&request.with_bearer(used.as_deref()))?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        debug!(path = %request.path, "access token rejected");
        match self.refresh_after_rejection(used.as_deref())? {
            Some(fresh) => Ok(self.transport.send(&request.with_bearer(Some(&fresh)))?),
            None => Ok(response),
        }
    }

    /// Obtain a replacement for the rejected access token. `Ok(None)` means
    /// there is nothing to retry with and the original 401 should surface.
    fn refresh_after_rejection(&self, rejected: Option<&str>) -> Result<Option<String>, SessionError> {
        let _gate = self.refresh_gate.lock().unwrap_or_else(PoisonError::into_inner);

        let (current, refresh_token, last_error) = {
            let inner = self.lock();
            (
                inner.session.access_token.clone(),
                inner.session.refresh_token.clone(),
                inner.last_refresh_error.clone(),
            )
        };

        // Someone else already settled the session for this token
        if current.as_deref() != rejected {
            return match (current, last_error) {
                (Some(token), _) => Ok(Some(token)),
                (None, Some(message)) => Err(SessionError::RefreshFailure(message)),
                (None, None) => Ok(None),
            };
        }

        let Some(refresh_token) = refresh_token else {
            info!("no refresh token held; signing out");
            self.clear(AuthState::Failed, None);
            return Ok(None);
        };

        self.set_state(AuthState::Refreshing);
        self.run_refresh(&refresh_token).map(Some)
    }

    /// Exchange the refresh token for a new pair. Caller holds the gate.
    fn run_refresh(&self, refresh_token: &str) -> Result<String, SessionError> {
        let request = Request::post(REFRESH_PATH, json!({ "refreshToken": refresh_token }));
        let outcome = match self.transport.send(&request) {
            Ok(resp) if resp.is_success() => resp
                .json::<TokenPair>()
                .map_err(|e| format!("malformed refresh response: {}", e)),
            Ok(resp) => Err(match resp.message() {
                Some(msg) => format!("refresh rejected ({}): {}", resp.status, msg),
                None => format!("refresh rejected ({})", resp.status),
            }),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(pair) => {
                let previous = self.user();
                let user = match token::decode_user(&pair.access_token) {
                    Ok(decoded) => Some(match &previous {
                        Some(prev) => decoded.merged_with(prev),
                        None => decoded,
                    }),
                    Err(e) => {
                        debug!(error = %e, "refreshed token has no readable payload");
                        previous
                    }
                };
                info!("session refreshed");
                let access = pair.access_token.clone();
                self.install(pair.access_token, pair.refresh_token, user);
                Ok(access)
            }
            Err(message) => {
                warn!(error = %message, "session refresh failed; signing out");
                self.clear(AuthState::Failed, Some(message.clone()));
                Err(SessionError::RefreshFailure(message))
            }
        }
    }
}

fn account_body(name: &str, email: &str, password: &str) -> Value {
    json!({ "email": email, "nombre": name, "password": password })
}

fn registration_outcome(what: &str, response: Response) -> Result<Value, SessionError> {
    if response.status == 409 {
        return Err(SessionError::DuplicateAccount);
    }
    if !response.is_success() {
        return Err(transient(what, &response));
    }
    Ok(response.body)
}

fn transient(what: &str, response: &Response) -> SessionError {
    let detail = response
        .message()
        .map(|m| format!(": {}", m))
        .unwrap_or_default();
    SessionError::TransientFailure(format!("{} returned {}{}", what, response.status, detail))
}
