//! In-memory bookmark collection and its pagination cursor.
//!
//! This is the synchronous half of the bookmark controller: every input
//! (page responses, change-feed events, relay events, local mutations) is
//! applied here. Nothing in this module performs I/O; operations that need a
//! round trip hand back a [`PageRequest`] for the caller to execute.

use crate::api::ApiError;
use crate::models::{Bookmark, BookmarkPage, ChangeEvent};
use crate::state::errors::fetch_error_message;

/// A page fetch the caller must perform and feed back via
/// [`BookmarkList::apply_page`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PageRequest {
    pub user_id: String,
    pub page: usize,
    pub offset: usize,
    pub limit: usize,
    /// Replace the collection instead of appending.
    pub replace: bool,
    /// Cursor generation the request was issued under. Appends from an
    /// earlier generation are dropped.
    pub generation: u64,
}

/// Effect of reconciling one change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reconciled {
    /// Duplicate, unknown id, foreign owner, or no session.
    Ignored,
    Inserted,
    Updated,
    /// `refetch` asks the caller to reload from page 1 so later offsets
    /// line up with the store again.
    Removed { refetch: bool },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BookmarkList {
    items: Vec<Bookmark>,
    user_id: Option<String>,
    page: usize,
    page_size: usize,
    has_more: bool,
    /// In-flight fetches and mutations.
    pending: u32,
    error: Option<String>,
    /// Bumped by every replace request; appends only land on the
    /// generation they were issued for.
    generation: u64,
}

impl BookmarkList {
    pub fn new(page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            user_id: None,
            page: 1,
            page_size: page_size.max(1),
            has_more: true,
            pending: 0,
            error: None,
            generation: 0,
        }
    }

    pub fn items(&self) -> &[Bookmark] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn loading(&self) -> bool {
        self.pending > 0
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Upper bound on loaded rows kept while live inserts arrive.
    fn live_window(&self) -> usize {
        self.page_size * 2
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|b| b.id == id)
    }

    /// Switches to `user_id` (or to no user): clears the collection and
    /// cursor, and returns the page-1 fetch when a user is present.
    pub fn reset(&mut self, user_id: Option<String>) -> Option<PageRequest> {
        self.items.clear();
        self.user_id = user_id;
        self.page = 1;
        self.has_more = true;
        self.error = None;
        self.request_page(1, true)
    }

    /// Reload from page 1, replacing the collection when the response lands.
    /// Loaded rows stay visible until then.
    pub fn refetch(&mut self) -> Option<PageRequest> {
        self.user_id.as_ref()?;
        self.page = 1;
        self.has_more = true;
        self.request_page(1, true)
    }

    /// Advances the cursor and returns the next page fetch, unless a request
    /// is already pending, nothing more exists, or nobody is signed in.
    pub fn load_more(&mut self) -> Option<PageRequest> {
        if self.loading() || !self.has_more || self.user_id.is_none() {
            return None;
        }
        self.page += 1;
        self.request_page(self.page, false)
    }

    /// Marks a fetch for `page` as in flight.
    pub fn request_page(&mut self, page: usize, replace: bool) -> Option<PageRequest> {
        let user_id = self.user_id.clone()?;
        let page = page.max(1);
        if replace {
            self.generation += 1;
        }
        self.pending += 1;
        Some(PageRequest {
            user_id,
            page,
            offset: (page - 1) * self.page_size,
            limit: self.page_size,
            replace,
            generation: self.generation,
        })
    }

    /// Applies the outcome of `req`.
    ///
    /// `has_more` is derived from the response's own offset and count, so a
    /// superseded response cannot leave the cursor pointing at stale state.
    /// Responses issued for a different user than the current one are dropped,
    /// as are appends issued before the collection was last replaced.
    pub fn apply_page(&mut self, req: &PageRequest, result: Result<BookmarkPage, ApiError>) {
        self.finish();

        if self.user_id.as_deref() != Some(req.user_id.as_str()) {
            tracing::debug!(user_id = %req.user_id, page = req.page, "dropping page for previous user");
            return;
        }
        if !req.replace && req.generation != self.generation {
            tracing::debug!(page = req.page, "dropping page superseded by a reload");
            return;
        }

        match result {
            Ok(page) => {
                let returned = page.rows.len();
                let owner = req.user_id.as_str();
                let rows = page.rows.into_iter().filter(|b| b.user_id == owner);

                if req.replace {
                    self.items.clear();
                    self.page = req.page;
                }
                for row in rows {
                    if !self.contains(&row.id) {
                        self.items.push(row);
                    }
                }

                self.has_more = match page.total {
                    Some(total) => req.offset + returned < total,
                    None => returned == req.limit,
                };
                self.error = None;
                tracing::debug!(
                    page = req.page,
                    offset = req.offset,
                    returned,
                    total = ?page.total,
                    loaded = self.items.len(),
                    has_more = self.has_more,
                    "page applied"
                );
            }
            Err(e) => {
                tracing::warn!(page = req.page, error = %e, "page fetch failed");
                // Let a retry ask for the same page again.
                if !req.replace && self.page == req.page && self.page > 1 {
                    self.page -= 1;
                }
                self.error = Some(fetch_error_message(&e));
            }
        }
    }

    /// Marks a mutation (insert/delete) as in flight.
    pub fn begin_mutation(&mut self) {
        self.pending += 1;
    }

    pub fn end_mutation(&mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    /// Applies one change event. Idempotent: applying the same event twice
    /// leaves the same collection as applying it once.
    pub fn reconcile(&mut self, event: &ChangeEvent) -> Reconciled {
        let Some(current) = self.user_id.as_deref() else {
            return Reconciled::Ignored;
        };
        if let Some(owner) = event.owner() {
            if owner != current {
                tracing::debug!(kind = %event.kind(), "ignoring event for another user");
                return Reconciled::Ignored;
            }
        }

        match event {
            ChangeEvent::Insert(row) => {
                if self.contains(&row.id) {
                    return Reconciled::Ignored;
                }
                self.items.insert(0, row.clone());
                if self.items.len() > self.live_window() {
                    let window = self.live_window();
                    self.items.truncate(window);
                    // Keep the next offset at the end of what is loaded.
                    self.page = window / self.page_size;
                    self.has_more = true;
                }
                Reconciled::Inserted
            }
            ChangeEvent::Update(row) => match self.position(&row.id) {
                Some(i) => {
                    self.items[i] = row.clone();
                    Reconciled::Updated
                }
                None => Reconciled::Ignored,
            },
            ChangeEvent::Delete(deleted) => match self.position(&deleted.id) {
                Some(i) => {
                    self.items.remove(i);
                    Reconciled::Removed {
                        refetch: self.items.len() <= self.live_window(),
                    }
                }
                None => Reconciled::Ignored,
            },
        }
    }
}
