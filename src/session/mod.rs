//! Who is signed in. Supabase GoTrue with the Google provider (implicit flow).

use crate::api::{ApiErrorKind, SupabaseClient};
use crate::config::EnvConfig;
use crate::models::Session;
use crate::storage::{clear_session, load_session, save_session};
use crate::util::{now_secs, window_origin};
use leptos::prelude::*;
use std::collections::HashMap;

pub(crate) const CALLBACK_PATH: &str = "/auth/callback";

/// Renew the access token this many seconds before it expires.
const REFRESH_MARGIN_SECS: i64 = 60;
/// A token refused this soon after a refresh issued it is not refreshed again.
const REFRESH_COOLDOWN_SECS: i64 = 30;

/// Tokens handed back on the callback URL fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CallbackTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

/// Provider redirect for "Sign in with Google".
pub(crate) fn authorize_url(config: &EnvConfig, origin: &str) -> String {
    let redirect_to = format!("{}{}", origin.trim_end_matches('/'), CALLBACK_PATH);
    format!(
        "{}/authorize?provider=google&redirect_to={}",
        config.auth_url(),
        urlencoding::encode(&redirect_to)
    )
}

/// Parses `#access_token=..&refresh_token=..&expires_in=..` (or an error
/// fragment) into tokens. `expires_in` is resolved against `now_secs`.
pub(crate) fn parse_callback_fragment(
    fragment: &str,
    now_secs: i64,
) -> Result<CallbackTokens, String> {
    let params: HashMap<String, String> = fragment
        .trim_start_matches(['#', '?'])
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let v = v.replace('+', " ");
            let v = urlencoding::decode(&v)
                .map(|s| s.into_owned())
                .unwrap_or(v);
            (k.to_string(), v)
        })
        .collect();

    if let Some(err) = params
        .get("error_description")
        .or_else(|| params.get("error"))
    {
        return Err(err.clone());
    }

    let access_token = params
        .get("access_token")
        .filter(|t| !t.is_empty())
        .cloned()
        .ok_or_else(|| "Sign-in response did not include an access token".to_string())?;

    let expires_at = params
        .get("expires_at")
        .and_then(|v| v.parse::<i64>().ok())
        .or_else(|| {
            params
                .get("expires_in")
                .and_then(|v| v.parse::<i64>().ok())
                .map(|secs| now_secs + secs)
        });

    Ok(CallbackTokens {
        access_token,
        refresh_token: params.get("refresh_token").cloned(),
        expires_at,
    })
}

/// Seconds until `session`'s access token should be renewed, or `None` when
/// it has no expiry or cannot be renewed.
pub(crate) fn refresh_delay_secs(session: &Session, now_secs: i64) -> Option<i64> {
    if !session.can_refresh() {
        return None;
    }
    let expires_at = session.expires_at?;
    Some((expires_at - REFRESH_MARGIN_SECS - now_secs).max(0))
}

/// Response to the store refusing an access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AuthRecovery {
    /// The refused token has already been replaced (or nobody is signed in).
    Ignore,
    Refresh,
    SignOut,
}

pub(crate) fn recovery_for(
    session: Option<&Session>,
    rejected_token: &str,
    refreshed_at: Option<i64>,
    now_secs: i64,
) -> AuthRecovery {
    let Some(session) = session else {
        return AuthRecovery::Ignore;
    };
    if session.access_token != rejected_token {
        return AuthRecovery::Ignore;
    }
    if !session.can_refresh() {
        return AuthRecovery::SignOut;
    }
    if refreshed_at.is_some_and(|t| now_secs - t < REFRESH_COOLDOWN_SECS) {
        return AuthRecovery::SignOut;
    }
    AuthRecovery::Refresh
}

/// Identity shared through context. `user_id` changing is the signal the
/// bookmarks page resets on.
#[derive(Clone, Copy)]
pub(crate) struct SessionContext {
    pub session: RwSignal<Option<Session>>,
    pub user_id: Memo<Option<String>>,
    refreshing: StoredValue<bool>,
    /// Unix seconds of the last successful refresh.
    refreshed_at: StoredValue<Option<i64>>,
}

impl SessionContext {
    /// Restores a stored, unexpired session and hands its token to `client`.
    pub fn new(client: &SupabaseClient) -> Self {
        let stored = load_session(now_secs());
        client.set_access_token(stored.as_ref().map(|s| s.access_token.clone()));

        let session = RwSignal::new(stored);
        let user_id = Memo::new(move |_| session.with(|s| s.as_ref().map(|s| s.user.id.clone())));
        Self {
            session,
            user_id,
            refreshing: StoredValue::new(false),
            refreshed_at: StoredValue::new(None),
        }
    }

    fn store(&self, client: &SupabaseClient, session: Session) {
        save_session(&session);
        client.set_access_token(Some(session.access_token.clone()));
        self.session.set(Some(session));
    }

    fn end_locally(&self, client: &SupabaseClient) {
        clear_session();
        client.set_access_token(None);
        self.session.set(None);
    }

    /// Whether the session still carries `access_token`.
    fn holds(&self, access_token: &str) -> bool {
        self.session
            .with_untracked(|s| s.as_ref().is_some_and(|s| s.access_token == access_token))
    }

    pub fn email(&self) -> Option<String> {
        self.session
            .with(|s| s.as_ref().and_then(|s| s.user.email.clone()))
    }

    pub fn sign_in_with_google(&self, config: &EnvConfig) {
        let url = authorize_url(config, &window_origin());
        tracing::info!("redirecting to identity provider");
        if let Some(window) = web_sys::window() {
            if let Err(e) = window.location().set_href(&url) {
                tracing::error!("sign-in redirect failed: {e:?}");
            }
        }
    }

    /// Finishes the provider round trip from the callback URL fragment.
    pub async fn complete_sign_in(
        &self,
        client: &SupabaseClient,
        fragment: &str,
    ) -> Result<(), String> {
        let tokens = parse_callback_fragment(fragment, now_secs())?;
        let user = client
            .fetch_user(&tokens.access_token)
            .await
            .map_err(|e| e.to_string())?;

        let session = Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            user,
        };
        tracing::info!(user_id = %session.user.id, "signed in");
        self.store(client, session);
        Ok(())
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// A refused refresh ends the session. An unreachable auth server leaves
    /// it in place so a later attempt can succeed.
    pub async fn refresh(&self, client: &SupabaseClient) -> Result<(), String> {
        if self.refreshing.get_value() {
            return Err("Session refresh already in progress".to_string());
        }
        let Some(current) = self.session.get_untracked() else {
            return Err("Not signed in".to_string());
        };
        let Some(refresh_token) = current.refresh_token.clone().filter(|t| !t.is_empty()) else {
            tracing::info!("session cannot be renewed, signing out");
            self.end_locally(client);
            return Err("Your session has expired. Please sign in again.".to_string());
        };

        self.refreshing.set_value(true);
        let result = client.refresh_session(&refresh_token).await;
        self.refreshing.set_value(false);

        // Signed out, or another tab's tokens were adopted, while waiting.
        if !self.holds(&current.access_token) {
            return Err("Session changed during refresh".to_string());
        }

        match result {
            Ok(tokens) => {
                let session = tokens.into_session(Some(refresh_token), now_secs());
                tracing::info!(user_id = %session.user.id, expires_at = ?session.expires_at, "session refreshed");
                self.refreshed_at.set_value(Some(now_secs()));
                self.store(client, session);
                Ok(())
            }
            Err(e) if e.kind == ApiErrorKind::Network => {
                tracing::warn!(error = %e, "session refresh unreachable");
                Err(e.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "session refresh refused, signing out");
                self.end_locally(client);
                Err(e.to_string())
            }
        }
    }

    /// Reacts to the store refusing `rejected_token`. Returns `true` when a
    /// fresh token is now in place.
    pub async fn recover(&self, client: &SupabaseClient, rejected_token: &str) -> bool {
        let action = self.session.with_untracked(|s| {
            recovery_for(
                s.as_ref(),
                rejected_token,
                self.refreshed_at.get_value(),
                now_secs(),
            )
        });
        match action {
            AuthRecovery::Ignore => false,
            AuthRecovery::Refresh => self.refresh(client).await.is_ok(),
            AuthRecovery::SignOut => {
                tracing::info!("access token refused, signing out");
                self.end_locally(client);
                false
            }
        }
    }

    /// Picks up the session another tab wrote (sign in, refresh or sign out).
    /// Returns `true` when the same user now holds a different token.
    pub fn adopt_stored(&self, client: &SupabaseClient) -> bool {
        let stored = load_session(now_secs());
        let (same_user, same_token) = self.session.with_untracked(|current| {
            let user = |s: &Option<Session>| s.as_ref().map(|s| s.user.id.clone());
            let token = |s: &Option<Session>| s.as_ref().map(|s| s.access_token.clone());
            (user(current) == user(&stored), token(current) == token(&stored))
        });
        if same_token {
            return false;
        }

        tracing::debug!("adopting session from another tab");
        client.set_access_token(stored.as_ref().map(|s| s.access_token.clone()));
        let signed_in = stored.is_some();
        self.session.set(stored);
        same_user && signed_in
    }

    pub async fn sign_out(&self, client: &SupabaseClient) {
        if let Err(e) = client.logout().await {
            tracing::warn!(error = %e, "server-side sign out failed");
        }
        self.end_locally(client);
        tracing::info!("signed out");
    }
}
