pub(crate) mod bookmark_list;
pub(crate) mod bookmark_sync;
pub(crate) mod errors;
pub(crate) mod events;

use crate::api::SupabaseClient;
use crate::config::EnvConfig;
use crate::relay::BroadcastRelay;
use crate::session::SessionContext;
use bookmark_sync::BookmarkSyncController;

pub(crate) type BookmarkController = BookmarkSyncController<SupabaseClient, BroadcastRelay>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: EnvConfig,
    pub client: SupabaseClient,
    pub session: SessionContext,

    /// The one list controller for this tab.
    pub bookmarks: BookmarkController,
}

impl AppState {
    pub fn new(config: EnvConfig) -> Self {
        let client = SupabaseClient::new(config.clone());
        let session = SessionContext::new(&client);
        let bookmarks =
            BookmarkSyncController::new(client.clone(), BroadcastRelay::new(), config.page_size);

        Self {
            config,
            client,
            session,
            bookmarks,
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);
