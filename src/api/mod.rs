pub(crate) mod realtime;

use crate::config::EnvConfig;
use crate::models::{AuthUser, Bookmark, BookmarkPage, NewBookmark, TokenResponse};
use crate::setup::{SetupGate, SetupOutcome};
use leptos::prelude::*;
use serde::Deserialize;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    /// Missing/expired credentials (HTTP 401).
    Unauthorized,
    /// Row-level policy rejected the request. Implies misconfiguration.
    Policy,
    /// The bookmarks relation does not exist yet.
    MissingRelation,
    /// A scoped mutation matched no row.
    NotFound,
    Network,
    Http,
    Parse,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub(crate) struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub(crate) fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn network(e: reqwest::Error) -> Self {
        Self::new(ApiErrorKind::Network, e.to_string())
    }

    pub(crate) fn parse(e: impl std::fmt::Display) -> Self {
        Self::new(ApiErrorKind::Parse, e.to_string())
    }

    pub(crate) fn not_found(what: &str) -> Self {
        Self::new(ApiErrorKind::NotFound, format!("{what} not found"))
    }

    /// Classifies a non-success response from PostgREST or GoTrue.
    pub(crate) fn from_response(status: u16, body: &str, ctx: &str) -> Self {
        let detail = serde_json::from_str::<StoreErrorBody>(body).unwrap_or_default();
        let code = detail.code.as_deref().unwrap_or_default();
        let text = detail
            .message
            .or(detail.msg)
            .or(detail.error_description)
            .unwrap_or_else(|| body.trim().to_string());

        let kind = if code == "42501" || status == 403 {
            ApiErrorKind::Policy
        } else if code == "42P01" || code == "PGRST205" {
            ApiErrorKind::MissingRelation
        } else if status == 401 {
            ApiErrorKind::Unauthorized
        } else {
            ApiErrorKind::Http
        };

        let message = if text.is_empty() {
            format!("{ctx} ({status})")
        } else {
            format!("{ctx} ({status}): {text}")
        };
        Self::new(kind, message)
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// PostgREST (`code`/`message`) and GoTrue (`msg`/`error_description`) error shapes.
#[derive(Deserialize, Default, Debug)]
struct StoreErrorBody {
    code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
}

/// Collection store operations. Every call is scoped by the owning user id;
/// the store's own row policies remain the real authorization boundary.
pub(crate) trait RemoteStore {
    /// Awaited before the first query of an operation.
    async fn ensure_ready(&self) {}

    async fn list_page(&self, user_id: &str, offset: usize, limit: usize)
        -> ApiResult<BookmarkPage>;

    async fn insert(&self, bookmark: &NewBookmark) -> ApiResult<Bookmark>;

    async fn delete(&self, id: &str, user_id: &str) -> ApiResult<()>;
}

/// Supabase (PostgREST + GoTrue) client.
///
/// Cheap to clone; clones share the access token, the setup gate and the
/// rejected-token signal.
#[derive(Clone)]
pub(crate) struct SupabaseClient {
    config: EnvConfig,
    access_token: Arc<Mutex<Option<String>>>,
    setup: Arc<SetupGate>,
    /// Last access token a store request was refused with (HTTP 401).
    rejected_token: ArcRwSignal<Option<String>>,
}

impl SupabaseClient {
    pub fn new(config: EnvConfig) -> Self {
        Self {
            config,
            access_token: Arc::new(Mutex::new(None)),
            setup: Arc::new(SetupGate::new()),
            rejected_token: ArcRwSignal::new(None),
        }
    }

    pub fn rejected_token(&self) -> ArcRwSignal<Option<String>> {
        self.rejected_token.clone()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut t) = self.access_token.lock() {
            *t = token;
        }
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.access_token.lock().ok().and_then(|t| t.clone())
    }

    fn bearer_for(&self, token: Option<&str>) -> String {
        let token = token.unwrap_or(self.config.supabase_anon_key.as_str());
        format!("Bearer {}", token)
    }

    fn bearer(&self) -> String {
        self.bearer_for(self.access_token().as_deref())
    }

    fn with_auth_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", self.config.supabase_anon_key.as_str())
            .header("Authorization", self.bearer())
    }

    /// Sends a store request with the current token. A 401 is recorded
    /// against the token that was actually sent.
    async fn send_store(
        &self,
        req: reqwest::RequestBuilder,
        ctx: &str,
    ) -> ApiResult<reqwest::Response> {
        let token = self.access_token();
        let res = req
            .header("apikey", self.config.supabase_anon_key.as_str())
            .header("Authorization", self.bearer_for(token.as_deref()))
            .send()
            .await
            .map_err(ApiError::network)?;

        if res.status().is_success() {
            return Ok(res);
        }
        let e = Self::error_from(res, ctx).await;
        if e.kind == ApiErrorKind::Unauthorized {
            if let Some(token) = token {
                tracing::info!("access token rejected");
                self.rejected_token.set(Some(token));
            }
        }
        Err(e)
    }

    fn bookmarks_url(&self, query: &str) -> String {
        format!("{}/bookmarks?{}", self.config.rest_url(), query)
    }

    async fn error_from(res: reqwest::Response, ctx: &str) -> ApiError {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        ApiError::from_response(status, &body, ctx)
    }

    /// POSTs the setup endpoint. A rejected setup is final; an unreachable
    /// one is an error so the gate tries again on the next query.
    async fn provision(&self) -> ApiResult<SetupOutcome> {
        let Some(url) = self.config.init_db_url.clone() else {
            return Ok(SetupOutcome::Ready);
        };

        let res = reqwest::Client::new().post(&url).send().await;
        match res {
            Ok(r) if r.status().is_success() => {
                tracing::info!(%url, "database ready");
                Ok(SetupOutcome::Ready)
            }
            Ok(r) => {
                tracing::warn!(%url, status = r.status().as_u16(), "database setup rejected");
                Ok(SetupOutcome::Skipped)
            }
            Err(e) => Err(ApiError::network(e)),
        }
    }

    /// `GET /auth/v1/user` for the given access token.
    pub async fn fetch_user(&self, access_token: &str) -> ApiResult<AuthUser> {
        let res = reqwest::Client::new()
            .get(format!("{}/user", self.config.auth_url()))
            .header("apikey", self.config.supabase_anon_key.as_str())
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(ApiError::network)?;

        if !res.status().is_success() {
            return Err(Self::error_from(res, "Failed to load user").await);
        }
        res.json().await.map_err(ApiError::parse)
    }

    /// Exchanges a refresh token for a new access token (and a rotated
    /// refresh token).
    pub async fn refresh_session(&self, refresh_token: &str) -> ApiResult<TokenResponse> {
        let res = reqwest::Client::new()
            .post(format!("{}/token?grant_type=refresh_token", self.config.auth_url()))
            .header("apikey", self.config.supabase_anon_key.as_str())
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(ApiError::network)?;

        if !res.status().is_success() {
            return Err(Self::error_from(res, "Session refresh failed").await);
        }
        res.json().await.map_err(ApiError::parse)
    }

    /// Revokes the current refresh token server side.
    pub async fn logout(&self) -> ApiResult<()> {
        let res = self
            .with_auth_headers(
                reqwest::Client::new().post(format!("{}/logout", self.config.auth_url())),
            )
            .send()
            .await
            .map_err(ApiError::network)?;

        if res.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(res, "Sign out failed").await)
        }
    }
}

impl RemoteStore for SupabaseClient {
    async fn ensure_ready(&self) {
        if self.setup.outcome().is_some() {
            return;
        }
        let outcome = self.setup.ensure(|| self.provision()).await;
        tracing::debug!(?outcome, "store setup settled");
    }

    async fn list_page(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> ApiResult<BookmarkPage> {
        let url = self.bookmarks_url(&list_query(user_id, offset, limit));
        let req = reqwest::Client::new()
            .get(url)
            .header("Prefer", "count=exact");
        let res = self.send_store(req, "Failed to load bookmarks").await?;

        let total = res
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
        let rows: Vec<Bookmark> = res.json().await.map_err(ApiError::parse)?;
        Ok(BookmarkPage { rows, total })
    }

    async fn insert(&self, bookmark: &NewBookmark) -> ApiResult<Bookmark> {
        let req = reqwest::Client::new()
            .post(self.bookmarks_url("select=*"))
            .header("Prefer", "return=representation")
            .json(&[bookmark]);
        let res = self.send_store(req, "Insert rejected").await?;

        let rows: Vec<Bookmark> = res.json().await.map_err(ApiError::parse)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::parse("insert returned no row"))
    }

    async fn delete(&self, id: &str, user_id: &str) -> ApiResult<()> {
        let query = format!(
            "id=eq.{}&user_id=eq.{}",
            urlencoding::encode(id),
            urlencoding::encode(user_id)
        );
        let req = reqwest::Client::new()
            .delete(self.bookmarks_url(&query))
            .header("Prefer", "return=representation");
        let res = self.send_store(req, "Delete rejected").await?;

        // Rows owned by someone else are filtered out by the store, not rejected.
        let rows: Vec<serde_json::Value> = res.json().await.map_err(ApiError::parse)?;
        if rows.is_empty() {
            return Err(ApiError::not_found("Bookmark"));
        }
        Ok(())
    }
}

pub(crate) fn list_query(user_id: &str, offset: usize, limit: usize) -> String {
    format!(
        "select=*&user_id=eq.{}&order=created_at.desc&offset={}&limit={}",
        urlencoding::encode(user_id),
        offset,
        limit
    )
}

/// Total from a `Content-Range` header (`0-9/25`, `*/0`). `*` totals are unknown.
pub(crate) fn parse_content_range_total(value: &str) -> Option<usize> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}
