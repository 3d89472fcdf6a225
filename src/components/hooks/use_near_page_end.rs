use leptos::ev;
use leptos::prelude::*;
use leptos_dom::helpers::window_event_listener;
use wasm_bindgen::JsCast;

/// True once the bottom of the viewport is within `threshold` px of the end
/// of the document.
pub fn is_near_end(scroll_y: f64, viewport_height: f64, document_height: f64, threshold: f64) -> bool {
    scroll_y + viewport_height >= document_height - threshold
}

/// Calls `on_near_end` when window scrolling approaches the end of the page.
///
/// Scroll events are debounced by `debounce_ms`; only the last event of a
/// burst is checked. The listener is removed with the owning component.
pub fn use_near_page_end(threshold: f64, debounce_ms: i32, on_near_end: Callback<()>) {
    let timer_id: StoredValue<Option<i32>> = StoredValue::new(None);

    let check = move || {
        let Some(win) = web_sys::window() else {
            return;
        };
        let scroll_y = win.scroll_y().unwrap_or(0.0);
        let viewport = win.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        let doc_height = win
            .document()
            .and_then(|d| d.body())
            .map(|b| f64::from(b.offset_height()))
            .unwrap_or(0.0);

        if is_near_end(scroll_y, viewport, doc_height, threshold) {
            on_near_end.run(());
        }
    };

    let handle = window_event_listener(ev::scroll, move |_ev: web_sys::Event| {
        let Some(win) = web_sys::window() else {
            return;
        };
        if let Some(tid) = timer_id.get_value() {
            win.clear_timeout_with_handle(tid);
        }

        let cb = wasm_bindgen::closure::Closure::once_into_js(move || {
            timer_id.set_value(None);
            check();
        });
        let tid = win
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                debounce_ms,
            )
            .ok();
        timer_id.set_value(tid);
    });

    on_cleanup(move || {
        handle.remove();
        if let (Some(win), Some(tid)) = (web_sys::window(), timer_id.try_get_value().flatten()) {
            win.clear_timeout_with_handle(tid);
        }
    });
}
