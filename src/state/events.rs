use crate::api::ApiResult;
use crate::models::ChangeEvent;
use std::rc::Rc;

/// Receives change events from a source. Sources call it on the UI thread.
pub(crate) type EventSink = Rc<dyn Fn(ChangeEvent)>;

/// A push source of row changes for one user (change feed, cross-tab relay).
///
/// The subscription stays live until the returned handle is dropped.
pub(crate) trait EventSource {
    type Subscription;

    fn subscribe(&self, user_id: &str, sink: EventSink) -> ApiResult<Self::Subscription>;
}

/// Fans a locally applied change out to other contexts.
pub(crate) trait ChangePublisher {
    fn publish(&self, event: &ChangeEvent);
}

impl ChangePublisher for () {
    fn publish(&self, _event: &ChangeEvent) {}
}
