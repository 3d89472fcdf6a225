//! Same-origin cross-tab relay over `BroadcastChannel`.

use crate::api::{ApiError, ApiErrorKind, ApiResult};
use crate::models::{ChangeEvent, ChangeKind};
use crate::state::events::{ChangePublisher, EventSink, EventSource};
use serde::{Deserialize, Serialize};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

pub(crate) const CHANNEL_NAME: &str = "bookmarks";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct RelayMessage {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub bookmark: serde_json::Value,
}

impl RelayMessage {
    pub fn from_event(event: &ChangeEvent) -> Self {
        Self {
            kind: event.kind(),
            bookmark: event.row(),
        }
    }

    pub fn into_event(self) -> ApiResult<ChangeEvent> {
        ChangeEvent::from_row(self.kind, self.bookmark).map_err(ApiError::parse)
    }
}

/// Decodes a relay payload and keeps it only if it belongs to `user_id`.
///
/// `Ok(None)` means the message is well formed but addressed to someone else.
pub(crate) fn decode_for_user(json: &str, user_id: &str) -> ApiResult<Option<ChangeEvent>> {
    let msg: RelayMessage = serde_json::from_str(json).map_err(ApiError::parse)?;
    let event = msg.into_event()?;
    match event.owner() {
        Some(owner) if owner != user_id => Ok(None),
        _ => Ok(Some(event)),
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BroadcastRelay {
    channel: String,
}

impl BroadcastRelay {
    pub fn new() -> Self {
        Self {
            channel: CHANNEL_NAME.to_string(),
        }
    }
}

impl Default for BroadcastRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangePublisher for BroadcastRelay {
    fn publish(&self, event: &ChangeEvent) {
        let json = match serde_json::to_string(&RelayMessage::from_event(event)) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode relay message");
                return;
            }
        };

        // Browsers without BroadcastChannel just lose the fast path.
        match web_sys::BroadcastChannel::new(&self.channel) {
            Ok(bc) => {
                if let Err(e) = bc.post_message(&json.into()) {
                    tracing::warn!(kind = %event.kind(), "relay post failed: {e:?}");
                }
                bc.close();
            }
            Err(e) => tracing::warn!("relay unavailable: {e:?}"),
        }
    }
}

pub(crate) struct RelaySubscription {
    channel: web_sys::BroadcastChannel,
    _on_message: Closure<dyn FnMut(web_sys::MessageEvent)>,
}

impl EventSource for BroadcastRelay {
    type Subscription = RelaySubscription;

    fn subscribe(&self, user_id: &str, sink: EventSink) -> ApiResult<RelaySubscription> {
        let channel = web_sys::BroadcastChannel::new(&self.channel).map_err(|e| {
            ApiError::new(ApiErrorKind::Network, format!("Relay unavailable: {e:?}"))
        })?;

        let user_id = user_id.to_string();
        let on_message = Closure::wrap(Box::new(move |ev: web_sys::MessageEvent| {
            let Some(json) = ev.data().as_string() else {
                tracing::warn!("dropping non-text relay message");
                return;
            };
            match decode_for_user(&json, &user_id) {
                Ok(Some(event)) => sink(event),
                Ok(None) => {
                    tracing::debug!("dropping relay message for another user");
                }
                Err(e) => tracing::warn!(error = %e, "dropping malformed relay message"),
            }
        }) as Box<dyn FnMut(web_sys::MessageEvent)>);

        channel.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        Ok(RelaySubscription {
            channel,
            _on_message: on_message,
        })
    }
}

impl Drop for RelaySubscription {
    fn drop(&mut self) {
        self.channel.set_onmessage(None);
        self.channel.close();
    }
}
