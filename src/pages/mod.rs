use crate::api::realtime::{FeedSubscription, RealtimeFeed};
use crate::components::ui::{
    AlertDescription, AlertError, Button, ButtonSize, ButtonVariant, Card, CardContent,
    CardDescription, CardHeader, CardTitle, Spinner,
};
use crate::components::{BookmarkForm, BookmarkListView};
use crate::models::ChangeEvent;
use crate::relay::{BroadcastRelay, RelaySubscription};
use crate::session::refresh_delay_secs;
use crate::state::events::{EventSink, EventSource};
use crate::state::{AppContext, AppState, BookmarkController};
use crate::storage::SESSION_KEY;
use crate::util::now_secs;
use icons::LogOut;
use leptos::ev;
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_dom::helpers::{set_timeout, set_timeout_with_handle, window_event_listener, TimeoutHandle};
use leptos_router::hooks::use_navigate;
use leptos_router::NavigateOptions;
use std::rc::Rc;
use std::time::Duration;

/// Delay before reopening a change feed that closed on its own.
const FEED_REOPEN_DELAY: Duration = Duration::from_secs(5);

/// Live event sources for the signed-in user. Dropping closes both.
struct LiveSubscriptions {
    _feed: Option<FeedSubscription>,
    _relay: Option<RelaySubscription>,
}

fn event_sink(bookmarks: BookmarkController) -> EventSink {
    Rc::new(move |event: ChangeEvent| {
        let bookmarks = bookmarks.clone();
        spawn_local(async move {
            bookmarks.apply_event(event).await;
        });
    })
}

fn open_subscriptions(
    app: &AppState,
    user_id: &str,
    on_feed_closed: impl Fn() + 'static,
) -> LiveSubscriptions {
    let sink = event_sink(app.bookmarks.clone());
    let token = app.client.access_token().unwrap_or_default();

    let feed = RealtimeFeed::new(app.config.clone(), token)
        .on_closed(on_feed_closed)
        .subscribe(user_id, sink.clone())
        .map_err(|e| tracing::warn!(error = %e, "change feed unavailable"))
        .ok();
    let relay = BroadcastRelay::new()
        .subscribe(user_id, sink)
        .map_err(|e| tracing::warn!(error = %e, "cross-tab relay unavailable"))
        .ok();

    LiveSubscriptions {
        _feed: feed,
        _relay: relay,
    }
}

#[component]
pub fn LoginPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let session = app_state.0.session;
    let config = app_state.0.config.clone();
    let redirecting: RwSignal<bool> = RwSignal::new(false);

    let on_sign_in = move |_: web_sys::MouseEvent| {
        redirecting.set(true);
        session.sign_in_with_google(&config);
    };

    view! {
        <div class="min-h-screen bg-background">
            <div class="mx-auto flex min-h-screen w-full max-w-sm flex-col justify-center px-4 py-10">
                <Card>
                    <CardHeader>
                        <CardTitle>"Bookmarks"</CardTitle>
                        <CardDescription>"Save links and see them on every device, in real time."</CardDescription>
                    </CardHeader>

                    <CardContent>
                        <Button
                            class="w-full"
                            size=ButtonSize::Lg
                            attr:disabled=move || redirecting.get()
                            on:click=on_sign_in
                        >
                            <Show when=move || redirecting.get()>
                                <Spinner />
                            </Show>
                            "Sign in with Google"
                        </Button>
                    </CardContent>
                </Card>
            </div>
        </div>
    }
}

#[component]
pub fn HomePage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let session = app_state.0.session;
    let signing_out: RwSignal<bool> = RwSignal::new(false);

    let client = app_state.0.client.clone();
    let on_sign_out = move |_: web_sys::MouseEvent| {
        let client = client.clone();
        signing_out.set(true);
        spawn_local(async move {
            session.sign_out(&client).await;
            let _ = signing_out.try_set(false);
        });
    };

    let bookmarks = app_state.0.bookmarks.clone();
    let on_added = Callback::new(move |_: ()| {
        let bookmarks = bookmarks.clone();
        spawn_local(async move {
            bookmarks.refetch().await;
        });
    });

    view! {
        <div class="min-h-screen bg-background">
            <header class="border-b bg-background/80 backdrop-blur-sm">
                <div class="mx-auto flex w-full max-w-3xl items-center justify-between px-4 py-3">
                    <span class="font-semibold">"Bookmarks"</span>
                    <div class="flex items-center gap-3">
                        <span class="hidden text-sm text-muted-foreground sm:inline">
                            {move || session.email().unwrap_or_default()}
                        </span>
                        <Button
                            variant=ButtonVariant::Outline
                            size=ButtonSize::Sm
                            attr:disabled=move || signing_out.get()
                            on:click=on_sign_out
                        >
                            <LogOut />
                            "Sign out"
                        </Button>
                    </div>
                </div>
            </header>

            <main class="mx-auto flex w-full max-w-3xl flex-col items-center gap-8 px-4 py-8">
                <BookmarkForm on_added=on_added />
                <BookmarkListView />
            </main>
        </div>
    }
}

#[component]
pub fn AuthCallbackPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let session = app_state.0.session;
    let client = app_state.0.client.clone();
    let error: RwSignal<Option<String>> = RwSignal::new(None);
    let navigate = use_navigate();

    // Tokens arrive in the fragment; provider errors may come as a query string.
    let location = window().location();
    let params = location
        .hash()
        .ok()
        .filter(|h| h.len() > 1)
        .or_else(|| location.search().ok())
        .unwrap_or_default();

    spawn_local(async move {
        match session.complete_sign_in(&client, &params).await {
            Ok(()) => navigate(
                "/",
                NavigateOptions {
                    replace: true,
                    ..Default::default()
                },
            ),
            Err(e) => {
                tracing::warn!(error = %e, "sign-in callback failed");
                let _ = error.try_set(Some(e));
            }
        }
    });

    view! {
        <div class="min-h-screen bg-background">
            <div class="mx-auto flex min-h-screen w-full max-w-sm flex-col justify-center px-4 py-10">
                {move || match error.get() {
                    Some(e) => view! {
                        <Card>
                            <CardHeader>
                                <CardTitle>"Sign-in failed"</CardTitle>
                            </CardHeader>
                            <CardContent>
                                <AlertError class="mb-4">
                                    <AlertDescription>{e}</AlertDescription>
                                </AlertError>
                                <a class="text-sm text-primary underline underline-offset-4" href="/">
                                    "Back to sign in"
                                </a>
                            </CardContent>
                        </Card>
                    }
                    .into_any(),
                    None => view! {
                        <div class="flex items-center justify-center gap-2 text-sm text-muted-foreground">
                            <Spinner />
                            "Signing you in..."
                        </div>
                    }
                    .into_any(),
                }}
            </div>
        </div>
    }
}

/// `/`: owns the sync wiring for whoever is signed in, and shows the
/// bookmarks page or the login page.
#[component]
pub fn RootPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let session = app_state.0.session;
    let feed_epoch: RwSignal<u32> = RwSignal::new(0);
    let subscriptions: StoredValue<Option<LiveSubscriptions>, LocalStorage> =
        StoredValue::new_local(None);

    // Identity change resets the list (and clears it on sign-out).
    let bookmarks = app_state.0.bookmarks.clone();
    Effect::new(move |_| {
        let user_id = session.user_id.get();
        let bookmarks = bookmarks.clone();
        spawn_local(async move {
            bookmarks.reset(user_id).await;
        });
    });

    // One feed + relay subscription per user; reopened after the feed drops.
    let app = app_state.0.clone();
    Effect::new(move |prev: Option<(Option<String>, u32)>| {
        let user_id = session.user_id.get();
        let epoch = feed_epoch.get();

        subscriptions.set_value(None);
        if let Some(uid) = user_id.as_deref() {
            let on_feed_closed = move || {
                set_timeout(
                    move || {
                        let _ = feed_epoch.try_update(|e| *e += 1);
                    },
                    FEED_REOPEN_DELAY,
                );
            };
            subscriptions.set_value(Some(open_subscriptions(&app, uid, on_feed_closed)));
            tracing::debug!(user_id = %uid, epoch, "event sources open");

            // Events may have been missed while the feed was down.
            let reopened = prev
                .as_ref()
                .is_some_and(|(prev_user, prev_epoch)| *prev_user == user_id && *prev_epoch != epoch);
            if reopened {
                let bookmarks = app.bookmarks.clone();
                spawn_local(async move {
                    bookmarks.refetch().await;
                });
            }
        }

        (user_id, epoch)
    });

    // Renew the access token shortly before it expires. A new token means
    // the feed has to rejoin with it.
    let refresh_timer: StoredValue<Option<TimeoutHandle>> = StoredValue::new(None);
    let client = app_state.0.client.clone();
    Effect::new(move |_| {
        let delay = session
            .session
            .with(|s| s.as_ref().and_then(|s| refresh_delay_secs(s, now_secs())));

        if let Some(handle) = refresh_timer.get_value() {
            handle.clear();
        }
        refresh_timer.set_value(None);
        let Some(delay) = delay else {
            return;
        };

        let client = client.clone();
        let timer = set_timeout_with_handle(
            move || {
                spawn_local(async move {
                    if session.refresh(&client).await.is_ok() {
                        let _ = feed_epoch.try_update(|e| *e += 1);
                    }
                });
            },
            Duration::from_secs(delay.unsigned_abs()),
        );
        match timer {
            Ok(handle) => refresh_timer.set_value(Some(handle)),
            Err(e) => tracing::warn!("token refresh timer unavailable: {e:?}"),
        }
    });

    // A store request refused with the current token.
    let rejected = app_state.0.client.rejected_token();
    let client = app_state.0.client.clone();
    Effect::new(move |_| {
        let Some(token) = rejected.get() else {
            return;
        };
        let client = client.clone();
        spawn_local(async move {
            if session.recover(&client, &token).await {
                let _ = feed_epoch.try_update(|e| *e += 1);
            }
        });
    });

    // Sign in, refresh and sign out in other tabs.
    let client = app_state.0.client.clone();
    let storage_listener = window_event_listener(ev::storage, move |e: web_sys::StorageEvent| {
        let key = e.key();
        if key.is_none() || key.as_deref() == Some(SESSION_KEY) {
            if session.adopt_stored(&client) {
                feed_epoch.update(|n| *n += 1);
            }
        }
    });
    on_cleanup(move || {
        storage_listener.remove();
        if let Some(handle) = refresh_timer.try_get_value().flatten() {
            handle.clear();
        }
    });

    view! {
        <Show when=move || session.user_id.with(|u| u.is_some()) fallback=|| view! { <LoginPage /> }>
            <HomePage />
        </Show>
    }
}
