use crate::api::RemoteStore;
use crate::models::{Bookmark, ChangeEvent, DeletedBookmark, NewBookmark};
use crate::state::bookmark_list::{BookmarkList, PageRequest, Reconciled};
use crate::state::errors::BookmarkError;
use crate::state::events::ChangePublisher;
use leptos::prelude::*;

/// Bookmark list controller.
///
/// Owns the reactive [`BookmarkList`] and drives it from three inputs:
/// page fetches against the store, change-feed events, and cross-tab relay
/// events. Every event source funnels through [`Self::apply_event`].
///
/// Responsibilities:
/// - pagination (reset, refetch, load more)
/// - add/delete scoped to the signed-in user
/// - fanning local deletes and inserts out through the publisher
///
/// Non-responsibilities:
/// - opening or closing subscriptions (the page owns their lifetime)
#[derive(Clone)]
pub(crate) struct BookmarkSyncController<S, P> {
    list: ArcRwSignal<BookmarkList>,
    store: S,
    publisher: P,
}

impl<S: RemoteStore, P: ChangePublisher> BookmarkSyncController<S, P> {
    pub fn new(store: S, publisher: P, page_size: usize) -> Self {
        Self {
            list: ArcRwSignal::new(BookmarkList::new(page_size)),
            store,
            publisher,
        }
    }

    pub fn list(&self) -> ArcRwSignal<BookmarkList> {
        self.list.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.list
            .with_untracked(|l| l.user_id().map(str::to_string))
    }

    fn update<T>(&self, f: impl FnOnce(&mut BookmarkList) -> T) -> Option<T> {
        self.list.try_update(f)
    }

    /// Switches to a new identity and loads its first page.
    pub async fn reset(&self, user_id: Option<String>) {
        tracing::info!(user_id = ?user_id, "bookmark list reset");
        if let Some(req) = self.update(|l| l.reset(user_id)).flatten() {
            self.run(req).await;
        }
    }

    pub async fn refetch(&self) {
        if let Some(req) = self.update(|l| l.refetch()).flatten() {
            self.run(req).await;
        }
    }

    pub async fn load_more(&self) {
        if let Some(req) = self.update(|l| l.load_more()).flatten() {
            self.run(req).await;
        }
    }

    pub async fn fetch_page(&self, page: usize, replace: bool) {
        if let Some(req) = self.update(|l| l.request_page(page, replace)).flatten() {
            self.run(req).await;
        }
    }

    async fn run(&self, req: PageRequest) {
        self.store.ensure_ready().await;
        let result = self
            .store
            .list_page(&req.user_id, req.offset, req.limit)
            .await;
        self.list.update(|l| l.apply_page(&req, result));
    }

    /// Inserts a bookmark for the signed-in user.
    ///
    /// The new row is not added locally; it arrives through the change feed
    /// or the relay like any other insert.
    pub async fn add_bookmark(&self, title: &str, url: &str) -> Result<Bookmark, BookmarkError> {
        let Some(user_id) = self.user_id() else {
            return Err(BookmarkError::AuthenticationRequired);
        };
        let new = validate_new_bookmark(title, url, &user_id)?;

        self.list.update(|l| l.begin_mutation());
        self.store.ensure_ready().await;
        let result = self.store.insert(&new).await;
        self.list.update(|l| l.end_mutation());

        match result {
            Ok(row) => {
                tracing::info!(id = %row.id, "bookmark added");
                self.publisher.publish(&ChangeEvent::Insert(row.clone()));
                Ok(row)
            }
            Err(e) => {
                tracing::warn!(error = %e, "bookmark insert failed");
                Err(BookmarkError::insert_failed(e))
            }
        }
    }

    /// Deletes `id` if it belongs to the signed-in user, then removes it
    /// locally without waiting for the feed.
    pub async fn delete_bookmark(&self, id: &str) -> Result<(), BookmarkError> {
        let Some(user_id) = self.user_id() else {
            return Err(BookmarkError::AuthenticationRequired);
        };

        self.list.update(|l| l.begin_mutation());
        self.store.ensure_ready().await;
        let result = self.store.delete(id, &user_id).await;
        self.list.update(|l| l.end_mutation());

        if let Err(e) = result {
            tracing::warn!(%id, error = %e, "bookmark delete failed");
            return Err(BookmarkError::delete_failed(e));
        }

        tracing::info!(%id, "bookmark deleted");
        let event = ChangeEvent::Delete(DeletedBookmark {
            id: id.to_string(),
            user_id: Some(user_id),
        });
        self.publisher.publish(&event);
        self.apply_event(event).await;
        Ok(())
    }

    /// Applies one event without performing any follow-up fetch.
    pub fn reconcile(&self, event: &ChangeEvent) -> Reconciled {
        let outcome = self
            .update(|l| l.reconcile(event))
            .unwrap_or(Reconciled::Ignored);
        tracing::debug!(kind = %event.kind(), id = %event.id(), ?outcome, "reconciled");
        outcome
    }

    /// Applies one event from any source, refetching when a removal left the
    /// cursor out of step with the store.
    pub async fn apply_event(&self, event: ChangeEvent) {
        if let Reconciled::Removed { refetch: true } = self.reconcile(&event) {
            self.refetch().await;
        }
    }
}

/// Trims and checks form input before anything touches the store.
pub(crate) fn validate_new_bookmark(
    title: &str,
    url: &str,
    user_id: &str,
) -> Result<NewBookmark, BookmarkError> {
    let title = title.trim();
    let url = url.trim();
    if title.is_empty() || url.is_empty() {
        return Err(BookmarkError::MissingFields);
    }
    reqwest::Url::parse(url).map_err(|_| BookmarkError::InvalidUrl)?;

    Ok(NewBookmark {
        title: title.to_string(),
        url: url.to_string(),
        user_id: user_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiErrorKind, ApiResult};
    use crate::models::BookmarkPage;
    use crate::state::events::{EventSink, EventSource};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// In-memory pub/sub standing in for both the change feed and the relay.
    #[derive(Default)]
    struct Hub {
        sinks: RefCell<Vec<(String, EventSink)>>,
    }

    #[derive(Clone, Default)]
    struct HubHandle(Rc<Hub>);

    impl EventSource for HubHandle {
        type Subscription = ();

        fn subscribe(&self, user_id: &str, sink: EventSink) -> ApiResult<()> {
            self.0
                .sinks
                .borrow_mut()
                .push((user_id.to_string(), sink));
            Ok(())
        }
    }

    impl ChangePublisher for HubHandle {
        fn publish(&self, event: &ChangeEvent) {
            let sinks = self.0.sinks.borrow().clone();
            for (user_id, sink) in sinks {
                if event.owner().map_or(true, |o| o == user_id) {
                    sink(event.clone());
                }
            }
        }
    }

    #[derive(Default)]
    struct Calls {
        list: Cell<u32>,
        insert: Cell<u32>,
        delete: Cell<u32>,
        ready: Cell<u32>,
    }

    /// Shared table of rows, newest first.
    #[derive(Clone, Default)]
    struct MemoryStore {
        rows: Rc<RefCell<Vec<Bookmark>>>,
        calls: Rc<Calls>,
        next_id: Rc<Cell<u32>>,
        fail_list: Rc<RefCell<Option<ApiError>>>,
        fail_insert: Rc<RefCell<Option<ApiError>>>,
        /// Blocks `list_page` until notified.
        gate: Option<Rc<tokio::sync::Notify>>,
        feed: Option<HubHandle>,
    }

    impl MemoryStore {
        fn seeded(user_id: &str, n: usize) -> Self {
            let store = Self::default();
            {
                let mut rows = store.rows.borrow_mut();
                // b{n-1} is the newest.
                for i in (0..n).rev() {
                    rows.push(bookmark(&format!("b{i}"), user_id));
                }
            }
            store
        }

        fn with_feed(mut self, feed: HubHandle) -> Self {
            self.feed = Some(feed);
            self
        }

        fn push_foreign(&self, id: &str, user_id: &str) {
            self.rows.borrow_mut().insert(0, bookmark(id, user_id));
        }
    }

    impl RemoteStore for MemoryStore {
        async fn ensure_ready(&self) {
            self.calls.ready.set(self.calls.ready.get() + 1);
        }

        async fn list_page(
            &self,
            user_id: &str,
            offset: usize,
            limit: usize,
        ) -> ApiResult<BookmarkPage> {
            self.calls.list.set(self.calls.list.get() + 1);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(e) = self.fail_list.borrow_mut().take() {
                return Err(e);
            }
            let rows = self.rows.borrow();
            let owned: Vec<&Bookmark> = rows.iter().filter(|b| b.user_id == user_id).collect();
            Ok(BookmarkPage {
                rows: owned
                    .iter()
                    .skip(offset)
                    .take(limit)
                    .map(|b| (*b).clone())
                    .collect(),
                total: Some(owned.len()),
            })
        }

        async fn insert(&self, new: &NewBookmark) -> ApiResult<Bookmark> {
            self.calls.insert.set(self.calls.insert.get() + 1);
            if let Some(e) = self.fail_insert.borrow_mut().take() {
                return Err(e);
            }
            let n = self.next_id.get();
            self.next_id.set(n + 1);
            let row = Bookmark {
                id: format!("new-{n}"),
                user_id: new.user_id.clone(),
                title: new.title.clone(),
                url: new.url.clone(),
                created_at: String::new(),
                updated_at: String::new(),
            };
            self.rows.borrow_mut().insert(0, row.clone());
            if let Some(feed) = &self.feed {
                feed.publish(&ChangeEvent::Insert(row.clone()));
            }
            Ok(row)
        }

        async fn delete(&self, id: &str, user_id: &str) -> ApiResult<()> {
            self.calls.delete.set(self.calls.delete.get() + 1);
            let pos = self
                .rows
                .borrow()
                .iter()
                .position(|b| b.id == id && b.user_id == user_id);
            let Some(pos) = pos else {
                return Err(ApiError::not_found("Bookmark"));
            };
            self.rows.borrow_mut().remove(pos);
            if let Some(feed) = &self.feed {
                // Default replica identity: deletes carry only the key.
                feed.publish(&ChangeEvent::Delete(DeletedBookmark {
                    id: id.to_string(),
                    user_id: None,
                }));
            }
            Ok(())
        }
    }

    fn bookmark(id: &str, user_id: &str) -> Bookmark {
        Bookmark {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: format!("title {id}"),
            url: format!("https://example.com/{id}"),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    type Controller = BookmarkSyncController<MemoryStore, HubHandle>;

    /// One browser tab: a controller plus the events its subscriptions saw.
    struct Tab {
        ctrl: Controller,
        inbox: Rc<RefCell<Vec<ChangeEvent>>>,
    }

    impl Tab {
        async fn open(store: MemoryStore, feed: &HubHandle, relay: &HubHandle, user: &str) -> Self {
            let ctrl = BookmarkSyncController::new(store, relay.clone(), 10);
            let inbox: Rc<RefCell<Vec<ChangeEvent>>> = Rc::default();
            for source in [feed, relay] {
                let inbox = inbox.clone();
                source
                    .subscribe(user, Rc::new(move |ev: ChangeEvent| inbox.borrow_mut().push(ev)))
                    .expect("subscribe");
            }
            ctrl.reset(Some(user.to_string())).await;
            Self { ctrl, inbox }
        }

        /// Delivers queued events in arrival order.
        async fn settle(&self) {
            loop {
                let next = {
                    let mut inbox = self.inbox.borrow_mut();
                    if inbox.is_empty() {
                        None
                    } else {
                        Some(inbox.remove(0))
                    }
                };
                match next {
                    Some(ev) => self.ctrl.apply_event(ev).await,
                    None => break,
                }
            }
        }

        fn ids(&self) -> Vec<String> {
            self.ctrl
                .list()
                .with_untracked(|l| l.items().iter().map(|b| b.id.clone()).collect())
        }
    }

    fn controller(store: MemoryStore) -> BookmarkSyncController<MemoryStore, ()> {
        BookmarkSyncController::new(store, (), 10)
    }

    #[test]
    fn test_validate_new_bookmark() {
        assert_eq!(
            validate_new_bookmark("  ", "https://x.com", "u1"),
            Err(BookmarkError::MissingFields)
        );
        assert_eq!(
            validate_new_bookmark("Title", "not-a-url", "u1"),
            Err(BookmarkError::InvalidUrl)
        );
        let ok = validate_new_bookmark(" GitHub ", " https://github.com ", "u1")
            .expect("should validate");
        assert_eq!(ok.title, "GitHub");
        assert_eq!(ok.url, "https://github.com");
        assert_eq!(ok.user_id, "u1");
    }

    #[tokio::test]
    async fn test_reset_loads_first_page_after_setup() {
        let store = MemoryStore::seeded("u1", 25);
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;

        let list = ctrl.list().get_untracked();
        assert_eq!(list.len(), 10);
        assert!(list.has_more());
        assert!(!list.loading());
        assert_eq!(list.items()[0].id, "b24");
        assert_eq!(store.calls.ready.get(), 1);
        assert_eq!(store.calls.list.get(), 1);
    }

    #[tokio::test]
    async fn test_load_more_until_exhausted() {
        let ctrl = controller(MemoryStore::seeded("u1", 25));
        ctrl.reset(Some("u1".to_string())).await;
        ctrl.load_more().await;
        ctrl.load_more().await;

        let list = ctrl.list().get_untracked();
        assert_eq!(list.len(), 25);
        assert_eq!(list.page(), 3);
        assert!(!list.has_more());

        ctrl.load_more().await;
        assert_eq!(ctrl.list().get_untracked().page(), 3);
    }

    #[tokio::test]
    async fn test_reset_to_signed_out_clears_without_fetch() {
        let store = MemoryStore::seeded("u1", 3);
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;
        ctrl.reset(None).await;

        let list = ctrl.list().get_untracked();
        assert!(list.is_empty());
        assert!(list.user_id().is_none());
        assert_eq!(store.calls.list.get(), 1);
    }

    #[tokio::test]
    async fn test_add_validation_makes_no_remote_call() {
        let store = MemoryStore::seeded("u1", 0);
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;

        let err = ctrl
            .add_bookmark("", "https://x.com")
            .await
            .expect_err("empty title");
        assert_eq!(err, BookmarkError::MissingFields);

        let err = ctrl
            .add_bookmark("Title", "not-a-url")
            .await
            .expect_err("bad url");
        assert_eq!(err, BookmarkError::InvalidUrl);
        assert_eq!(err.to_string(), "Please enter a valid URL");

        assert_eq!(store.calls.insert.get(), 0);
        assert!(ctrl.list().get_untracked().error().is_none());
    }

    #[tokio::test]
    async fn test_add_requires_session() {
        let store = MemoryStore::default();
        let ctrl = controller(store.clone());
        let err = ctrl
            .add_bookmark("Title", "https://x.com")
            .await
            .expect_err("no user");
        assert_eq!(err, BookmarkError::AuthenticationRequired);
        assert_eq!(store.calls.insert.get(), 0);
    }

    #[tokio::test]
    async fn test_add_does_not_insert_locally() {
        let store = MemoryStore::seeded("u1", 2);
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;

        let row = ctrl
            .add_bookmark("GitHub", "https://github.com")
            .await
            .expect("insert should succeed");
        assert_eq!(row.user_id, "u1");
        assert_eq!(ctrl.list().get_untracked().len(), 2);
        assert!(!ctrl.list().get_untracked().loading());

        ctrl.refetch().await;
        assert_eq!(ctrl.list().get_untracked().items()[0].id, row.id);
    }

    #[tokio::test]
    async fn test_add_failure_leaves_collection() {
        let store = MemoryStore::seeded("u1", 2);
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;
        *store.fail_insert.borrow_mut() = Some(ApiError::new(
            ApiErrorKind::MissingRelation,
            "relation does not exist",
        ));

        let err = ctrl
            .add_bookmark("GitHub", "https://github.com")
            .await
            .expect_err("insert should fail");
        assert!(!err.is_local());
        assert_eq!(err.to_string(), "Database not ready. Please refresh and try again.");
        assert_eq!(ctrl.list().get_untracked().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_locally_and_refetches_small_lists() {
        let store = MemoryStore::seeded("u1", 5);
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;

        ctrl.delete_bookmark("b2").await.expect("delete should succeed");
        let list = ctrl.list().get_untracked();
        assert_eq!(list.len(), 4);
        assert!(!list.contains("b2"));
        // Initial load plus the threshold refetch.
        assert_eq!(store.calls.list.get(), 2);
    }

    #[tokio::test]
    async fn test_delete_in_large_list_skips_refetch() {
        let store = MemoryStore::seeded("u1", 30);
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;
        ctrl.load_more().await;
        ctrl.load_more().await;
        assert_eq!(ctrl.list().get_untracked().len(), 30);

        ctrl.delete_bookmark("b12").await.expect("delete should succeed");
        assert_eq!(ctrl.list().get_untracked().len(), 29);
        assert_eq!(store.calls.list.get(), 3);
    }

    #[tokio::test]
    async fn test_delete_of_foreign_id_leaves_collection() {
        let store = MemoryStore::seeded("u1", 3);
        store.push_foreign("theirs", "u2");
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;
        let before = ctrl.list().get_untracked();

        let err = ctrl
            .delete_bookmark("theirs")
            .await
            .expect_err("should be rejected");
        assert_eq!(err.to_string(), "Bookmark not found or not owned by you");
        assert_eq!(ctrl.list().get_untracked(), before);
        assert_eq!(store.rows.borrow().len(), 4);
    }

    #[tokio::test]
    async fn test_delete_publishes_to_other_tabs() {
        let feed = HubHandle::default();
        let relay = HubHandle::default();
        let store = MemoryStore::seeded("u1", 3);
        let a = Tab::open(store.clone(), &feed, &relay, "u1").await;
        let b = Tab::open(store.clone(), &feed, &relay, "u1").await;

        a.ctrl.delete_bookmark("b1").await.expect("delete should succeed");
        a.settle().await;
        b.settle().await;

        assert_eq!(a.ids(), vec!["b2", "b0"]);
        assert_eq!(b.ids(), vec!["b2", "b0"]);
    }

    #[tokio::test]
    async fn test_two_tabs_each_hold_one_copy_of_new_row() {
        let feed = HubHandle::default();
        let relay = HubHandle::default();
        let store = MemoryStore::seeded("u1", 3).with_feed(feed.clone());
        let a = Tab::open(store.clone(), &feed, &relay, "u1").await;
        let b = Tab::open(store.clone(), &feed, &relay, "u1").await;

        let row = a
            .ctrl
            .add_bookmark("GitHub", "https://github.com")
            .await
            .expect("insert should succeed");
        // Each tab heard the insert from the feed and from the relay.
        assert_eq!(a.inbox.borrow().len(), 2);
        assert_eq!(b.inbox.borrow().len(), 2);

        a.settle().await;
        b.settle().await;
        for tab in [&a, &b] {
            let ids = tab.ids();
            assert_eq!(ids.iter().filter(|id| **id == row.id).count(), 1);
            assert_eq!(ids[0], row.id);
            assert_eq!(ids.len(), 4);
        }
    }

    #[tokio::test]
    async fn test_other_users_events_never_land() {
        let feed = HubHandle::default();
        let relay = HubHandle::default();
        let store = MemoryStore::seeded("u1", 2).with_feed(feed.clone());
        let mine = Tab::open(store.clone(), &feed, &relay, "u1").await;
        let theirs = Tab::open(store.clone(), &feed, &relay, "u2").await;

        theirs
            .ctrl
            .add_bookmark("Secret", "https://secret.example")
            .await
            .expect("insert should succeed");
        mine.settle().await;
        theirs.settle().await;

        assert_eq!(mine.ids(), vec!["b1", "b0"]);
        assert_eq!(theirs.ids().len(), 1);

        // A stale event routed to the wrong tab is still discarded.
        mine.ctrl
            .apply_event(ChangeEvent::Insert(bookmark("x", "u2")))
            .await;
        assert_eq!(mine.ids().len(), 2);
    }

    #[tokio::test]
    async fn test_event_during_pending_fetch_is_not_duplicated() {
        let gate = Rc::new(tokio::sync::Notify::new());
        let store = MemoryStore {
            gate: Some(gate.clone()),
            ..MemoryStore::seeded("u1", 3)
        };
        let ctrl = controller(store.clone());

        // The feed reports the newest row while page 1 is still in flight.
        let newest = store.rows.borrow()[0].clone();
        let event = ChangeEvent::Insert(newest.clone());
        let deliver = async {
            // Nothing is loaded yet, so the row is prepended.
            assert_eq!(ctrl.reconcile(&event), Reconciled::Inserted);
            assert!(ctrl.list().get_untracked().loading());
            ctrl.load_more().await;
            gate.notify_one();
        };
        tokio::join!(ctrl.reset(Some("u1".to_string())), deliver);

        let list = ctrl.list().get_untracked();
        assert_eq!(list.len(), 3);
        assert_eq!(list.items().iter().filter(|b| b.id == newest.id).count(), 1);
        assert!(!list.loading());
        assert_eq!(store.calls.list.get(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces_and_recovers() {
        let store = MemoryStore::seeded("u1", 15);
        let ctrl = controller(store.clone());
        ctrl.reset(Some("u1".to_string())).await;

        *store.fail_list.borrow_mut() = Some(ApiError::new(
            ApiErrorKind::Policy,
            "permission denied for table bookmarks",
        ));
        ctrl.load_more().await;
        let list = ctrl.list().get_untracked();
        assert_eq!(list.len(), 10);
        assert_eq!(list.page(), 1);
        assert!(list.error().is_some_and(|e| e.contains("row-level security")));

        ctrl.load_more().await;
        let list = ctrl.list().get_untracked();
        assert_eq!(list.len(), 15);
        assert!(list.error().is_none());
    }

    #[tokio::test]
    async fn test_fetch_page_replaces_from_requested_page() {
        let ctrl = controller(MemoryStore::seeded("u1", 25));
        ctrl.reset(Some("u1".to_string())).await;
        ctrl.fetch_page(2, true).await;

        let list = ctrl.list().get_untracked();
        assert_eq!(list.page(), 2);
        assert_eq!(list.len(), 10);
        assert_eq!(list.items()[0].id, "b14");
    }
}
