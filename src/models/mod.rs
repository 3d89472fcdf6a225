use serde::{Deserialize, Serialize};

/// A saved link, as stored in the `bookmarks` table.
///
/// Timestamps are kept as the ISO strings the store returns; ordering is
/// always delegated to the store (`created_at desc`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Bookmark {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Insert payload. The store assigns `id` and both timestamps.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

/// Identity of a removed row.
///
/// Delete notifications only guarantee the primary key; `user_id` is present
/// when the table has full replica identity or when the relay sent it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct DeletedBookmark {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One page of the remote ordering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BookmarkPage {
    pub rows: Vec<Bookmark>,
    /// Total matching rows, when the store reported it.
    pub total: Option<usize>,
}

#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub(crate) enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change, regardless of whether it came from the change feed or
/// from another tab.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ChangeEvent {
    Insert(Bookmark),
    Update(Bookmark),
    Delete(DeletedBookmark),
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Insert(_) => ChangeKind::Insert,
            ChangeEvent::Update(_) => ChangeKind::Update,
            ChangeEvent::Delete(_) => ChangeKind::Delete,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Insert(b) | ChangeEvent::Update(b) => &b.id,
            ChangeEvent::Delete(d) => &d.id,
        }
    }

    /// Owning user, if the payload carries one.
    pub fn owner(&self) -> Option<&str> {
        match self {
            ChangeEvent::Insert(b) | ChangeEvent::Update(b) => Some(&b.user_id),
            ChangeEvent::Delete(d) => d.user_id.as_deref(),
        }
    }

    /// Builds an event from a wire kind plus a JSON row.
    pub fn from_row(kind: ChangeKind, row: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            ChangeKind::Insert => ChangeEvent::Insert(serde_json::from_value(row)?),
            ChangeKind::Update => ChangeEvent::Update(serde_json::from_value(row)?),
            ChangeKind::Delete => ChangeEvent::Delete(serde_json::from_value(row)?),
        })
    }

    pub fn row(&self) -> serde_json::Value {
        let v = match self {
            ChangeEvent::Insert(b) | ChangeEvent::Update(b) => serde_json::to_value(b),
            ChangeEvent::Delete(d) => serde_json::to_value(d),
        };
        v.unwrap_or(serde_json::Value::Null)
    }
}

/// Authenticated identity as returned by `GET /auth/v1/user`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expires_at.is_some_and(|t| t <= now_secs)
    }

    /// Whether an expired access token can still be exchanged for a new one.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// `POST /auth/v1/token?grant_type=refresh_token` response.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl TokenResponse {
    /// The session these tokens describe. A missing refresh token keeps
    /// `previous_refresh` so the next rotation can still happen.
    pub fn into_session(self, previous_refresh: Option<String>, now_secs: i64) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now_secs + secs));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at,
            user: self.user,
        }
    }
}
