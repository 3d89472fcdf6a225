//! Supabase Realtime change feed (Phoenix v1 JSON frames over a WebSocket).

use crate::api::{ApiError, ApiErrorKind, ApiResult};
use crate::config::EnvConfig;
use crate::models::{ChangeEvent, ChangeKind};
use crate::state::events::{EventSink, EventSource};
use leptos_dom::helpers::{set_interval_with_handle, IntervalHandle};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;

pub(crate) const BOOKMARKS_TABLE: &str = "bookmarks";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub(crate) struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// What a single inbound frame means for the subscriber.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FeedFrame {
    Change(ChangeEvent),
    /// The server refused the channel join (bad token, policy, ...).
    Rejected(String),
    /// Replies, presence, heartbeats and other control traffic.
    Ignored,
}

#[derive(Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    record: Option<serde_json::Value>,
    #[serde(default)]
    old_record: Option<serde_json::Value>,
}

pub(crate) fn topic_for(user_id: &str) -> String {
    format!("realtime:{BOOKMARKS_TABLE}:{user_id}")
}

pub(crate) fn join_frame(user_id: &str, access_token: &str, msg_ref: u64) -> PhoenixFrame {
    let r = msg_ref.to_string();
    PhoenixFrame {
        topic: topic_for(user_id),
        event: "phx_join".to_string(),
        payload: serde_json::json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": BOOKMARKS_TABLE,
                    "filter": format!("user_id=eq.{user_id}"),
                }],
            },
            "access_token": access_token,
        }),
        msg_ref: Some(r.clone()),
        join_ref: Some(r),
    }
}

pub(crate) fn heartbeat_frame(msg_ref: u64) -> PhoenixFrame {
    PhoenixFrame {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: serde_json::json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

pub(crate) fn decode_frame(text: &str) -> ApiResult<FeedFrame> {
    let frame: PhoenixFrame = serde_json::from_str(text).map_err(ApiError::parse)?;

    match frame.event.as_str() {
        "postgres_changes" => {
            let payload: ChangePayload =
                serde_json::from_value(frame.payload).map_err(ApiError::parse)?;
            let data = payload.data;

            if data.table.as_deref().is_some_and(|t| t != BOOKMARKS_TABLE) {
                return Ok(FeedFrame::Ignored);
            }

            let kind = ChangeKind::from_str(&data.kind)
                .map_err(|_| ApiError::parse(format!("unknown change type {}", data.kind)))?;
            let row = match kind {
                ChangeKind::Delete => data.old_record,
                ChangeKind::Insert | ChangeKind::Update => data.record,
            }
            .ok_or_else(|| ApiError::parse(format!("{kind} frame without a row")))?;

            let event = ChangeEvent::from_row(kind, row).map_err(ApiError::parse)?;
            Ok(FeedFrame::Change(event))
        }
        "phx_reply" => {
            let status = frame.payload.get("status").and_then(|s| s.as_str());
            if status == Some("error") {
                let reason = frame
                    .payload
                    .pointer("/response/reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("join refused");
                Ok(FeedFrame::Rejected(reason.to_string()))
            } else {
                Ok(FeedFrame::Ignored)
            }
        }
        "phx_error" => Ok(FeedFrame::Rejected("channel error".to_string())),
        _ => Ok(FeedFrame::Ignored),
    }
}

/// Opens one Realtime subscription per user id.
pub(crate) struct RealtimeFeed {
    config: EnvConfig,
    access_token: String,
    on_closed: Option<Rc<dyn Fn()>>,
}

impl RealtimeFeed {
    pub fn new(config: EnvConfig, access_token: String) -> Self {
        Self {
            config,
            access_token,
            on_closed: None,
        }
    }

    /// Called when the socket closes without the subscription being dropped.
    pub fn on_closed(mut self, f: impl Fn() + 'static) -> Self {
        self.on_closed = Some(Rc::new(f));
        self
    }
}

/// Live socket plus its callbacks. Dropping it closes the socket.
pub(crate) struct FeedSubscription {
    socket: web_sys::WebSocket,
    heartbeat: Option<IntervalHandle>,
    disposed: Rc<Cell<bool>>,
    _on_open: Closure<dyn FnMut()>,
    _on_message: Closure<dyn FnMut(web_sys::MessageEvent)>,
    _on_close: Closure<dyn FnMut(web_sys::CloseEvent)>,
}

impl EventSource for RealtimeFeed {
    type Subscription = FeedSubscription;

    fn subscribe(&self, user_id: &str, sink: EventSink) -> ApiResult<FeedSubscription> {
        let url = self.config.realtime_url();
        let socket = web_sys::WebSocket::new(&url).map_err(|e| {
            ApiError::new(
                ApiErrorKind::Network,
                format!("Failed to open change feed: {e:?}"),
            )
        })?;

        let next_ref = Rc::new(Cell::new(1u64));
        let disposed = Rc::new(Cell::new(false));

        let on_open = {
            let socket = socket.clone();
            let user_id = user_id.to_string();
            let token = self.access_token.clone();
            let next_ref = next_ref.clone();
            Closure::wrap(Box::new(move || {
                let r = next_ref.get();
                next_ref.set(r + 1);
                send_frame(&socket, &join_frame(&user_id, &token, r));
                tracing::debug!(user_id = %user_id, "change feed joined");
            }) as Box<dyn FnMut()>)
        };

        let on_message = {
            let user_id = user_id.to_string();
            Closure::wrap(Box::new(move |ev: web_sys::MessageEvent| {
                let Some(text) = ev.data().as_string() else {
                    return;
                };
                match decode_frame(&text) {
                    Ok(FeedFrame::Change(event)) => sink(event),
                    Ok(FeedFrame::Rejected(reason)) => {
                        tracing::warn!(user_id = %user_id, %reason, "change feed rejected");
                    }
                    Ok(FeedFrame::Ignored) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed change feed frame");
                    }
                }
            }) as Box<dyn FnMut(web_sys::MessageEvent)>)
        };

        let on_close = {
            let disposed = disposed.clone();
            let on_closed = self.on_closed.clone();
            Closure::wrap(Box::new(move |ev: web_sys::CloseEvent| {
                if disposed.get() {
                    return;
                }
                tracing::warn!(code = ev.code(), "change feed closed unexpectedly");
                if let Some(f) = &on_closed {
                    f();
                }
            }) as Box<dyn FnMut(web_sys::CloseEvent)>)
        };

        socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        let heartbeat = {
            let socket = socket.clone();
            let next_ref = next_ref.clone();
            set_interval_with_handle(
                move || {
                    if socket.ready_state() != web_sys::WebSocket::OPEN {
                        return;
                    }
                    let r = next_ref.get();
                    next_ref.set(r + 1);
                    send_frame(&socket, &heartbeat_frame(r));
                },
                HEARTBEAT_INTERVAL,
            )
            .ok()
        };

        Ok(FeedSubscription {
            socket,
            heartbeat,
            disposed,
            _on_open: on_open,
            _on_message: on_message,
            _on_close: on_close,
        })
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.disposed.set(true);
        if let Some(h) = self.heartbeat.take() {
            h.clear();
        }
        self.socket.set_onopen(None);
        self.socket.set_onmessage(None);
        self.socket.set_onclose(None);
        let _ = self.socket.close();
    }
}

fn send_frame(socket: &web_sys::WebSocket, frame: &PhoenixFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if let Err(e) = socket.send_with_str(&json) {
                tracing::warn!(event = %frame.event, "change feed send failed: {e:?}");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to encode change feed frame"),
    }
}
