use crate::api::{ApiError, ApiErrorKind};

pub(crate) const NETWORK_MESSAGE: &str = "Network error - check your connection";

/// Failures surfaced by the bookmark controller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum BookmarkError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("Please enter a valid URL")]
    InvalidUrl,
    #[error("You must be logged in to manage bookmarks")]
    AuthenticationRequired,
    #[error("{0}")]
    Remote(ApiError),
}

impl BookmarkError {
    /// Validation and auth failures never reach the store.
    pub fn is_local(&self) -> bool {
        !matches!(self, BookmarkError::Remote(_))
    }

    pub(crate) fn insert_failed(e: ApiError) -> Self {
        let message = match e.kind {
            ApiErrorKind::MissingRelation => {
                "Database not ready. Please refresh and try again.".to_string()
            }
            ApiErrorKind::Network => NETWORK_MESSAGE.to_string(),
            _ => format!("Failed to add bookmark: {}", e.message),
        };
        BookmarkError::Remote(ApiError::new(e.kind, message))
    }

    pub(crate) fn delete_failed(e: ApiError) -> Self {
        let message = match e.kind {
            ApiErrorKind::NotFound => "Bookmark not found or not owned by you".to_string(),
            ApiErrorKind::Network => NETWORK_MESSAGE.to_string(),
            _ => e.message.clone(),
        };
        BookmarkError::Remote(ApiError::new(e.kind, message))
    }
}

/// Message shown in the list when a page fetch fails.
pub(crate) fn fetch_error_message(e: &ApiError) -> String {
    match e.kind {
        // A read blocked by policy is a setup problem, not a transient fault.
        ApiErrorKind::Policy => format!(
            "Access to bookmarks was denied by a row-level security policy. \
             Add a SELECT policy on bookmarks using (auth.uid() = user_id). ({})",
            e.message
        ),
        ApiErrorKind::MissingRelation => {
            "Database not ready. Please refresh and try again.".to_string()
        }
        ApiErrorKind::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
        ApiErrorKind::Network => NETWORK_MESSAGE.to_string(),
        _ => format!("Failed to load bookmarks: {}", e.message),
    }
}
