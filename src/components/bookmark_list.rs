use crate::components::hooks::use_near_page_end;
use crate::components::ui::{
    AlertDescription, AlertError, Button, ButtonSize, ButtonVariant, CardItem, CardList, Spinner,
};
use crate::models::Bookmark;
use crate::state::bookmark_list::BookmarkList;
use crate::state::AppContext;
use icons::Trash2;
use leptos::prelude::*;
use leptos::task::spawn_local;

/// Distance from the bottom of the page, in px, that triggers the next page.
const LOAD_MORE_THRESHOLD_PX: f64 = 200.0;
const SCROLL_DEBOUNCE_MS: i32 = 100;

#[component]
pub fn BookmarkListView() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let bookmarks = app_state.0.bookmarks.clone();
    let list: RwSignal<BookmarkList> = RwSignal::from(bookmarks.list());

    let load_next = Callback::new(move |_: ()| {
        let bookmarks = bookmarks.clone();
        spawn_local(async move {
            bookmarks.load_more().await;
        });
    });

    // Scrolling never retries a failed page; the button does.
    let on_near_end = Callback::new(move |_: ()| {
        let ready = list.with_untracked(|l| l.has_more() && !l.loading() && l.error().is_none());
        if ready {
            load_next.run(());
        }
    });
    use_near_page_end(LOAD_MORE_THRESHOLD_PX, SCROLL_DEBOUNCE_MS, on_near_end);

    let initial_loading = move || list.with(|l| l.loading() && l.is_empty());

    view! {
        <div class="w-full">
            <div class="mb-4 flex items-baseline justify-between">
                <h2 class="text-lg font-semibold sm:text-xl">"Your Bookmarks"</h2>
                <span class="text-sm text-muted-foreground">
                    {move || format!("{} saved", list.with(|l| l.len()))}
                </span>
            </div>

            {move || {
                list.with(|l| l.error().map(str::to_string)).map(|e| {
                    view! {
                        <AlertError class="mb-4">
                            <AlertDescription>{e}</AlertDescription>
                        </AlertError>
                    }
                })
            }}

            <Show
                when=move || !initial_loading()
                fallback=|| view! {
                    <div class="flex items-center justify-center gap-2 py-12 text-sm text-muted-foreground">
                        <Spinner />
                        "Loading bookmarks..."
                    </div>
                }
            >
                <Show
                    when=move || list.with(|l| !l.is_empty())
                    fallback=|| view! {
                        <div class="rounded-2xl border border-dashed py-12 text-center text-sm text-muted-foreground">
                            "No bookmarks yet. Add your first one above."
                        </div>
                    }
                >
                    <CardList>
                        <For
                            each=move || list.with(|l| l.items().to_vec())
                            key=|b: &Bookmark| (b.id.clone(), b.updated_at.clone(), b.title.clone())
                            children=move |b: Bookmark| view! { <BookmarkRow bookmark=b /> }
                        />
                    </CardList>
                </Show>

                <div class="flex flex-col items-center gap-2 py-6 text-sm text-muted-foreground">
                    <Show
                        when=move || list.with(|l| l.has_more())
                        fallback=move || {
                            view! {
                                <Show when=move || list.with(|l| !l.is_empty())>
                                    <span>"All bookmarks loaded"</span>
                                </Show>
                            }
                        }
                    >
                        <Button
                            variant=ButtonVariant::Outline
                            size=ButtonSize::Sm
                            attr:disabled=move || list.with(|l| l.loading())
                            on:click=move |_: web_sys::MouseEvent| load_next.run(())
                        >
                            <Show when=move || list.with(|l| l.loading())>
                                <Spinner />
                            </Show>
                            "Load more"
                        </Button>
                    </Show>
                </div>
            </Show>
        </div>
    }
}

#[component]
fn BookmarkRow(bookmark: Bookmark) -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let deleting: RwSignal<bool> = RwSignal::new(false);
    let error: RwSignal<Option<String>> = RwSignal::new(None);

    let id = bookmark.id.clone();
    let on_delete = move |_: web_sys::MouseEvent| {
        if deleting.get_untracked() {
            return;
        }
        let bookmarks = app_state.0.bookmarks.clone();
        let id = id.clone();
        deleting.set(true);
        error.set(None);
        spawn_local(async move {
            if let Err(e) = bookmarks.delete_bookmark(&id).await {
                let _ = error.try_set(Some(e.to_string()));
            }
            // The row may already be gone; ignore a disposed signal.
            let _ = deleting.try_set(false);
        });
    };

    view! {
        <CardItem>
            <div class="min-w-0 flex-1">
                <h3 class="truncate font-medium">{bookmark.title.clone()}</h3>
                <a
                    class="block truncate text-sm text-primary underline-offset-4 hover:underline"
                    href=bookmark.url.clone()
                    target="_blank"
                    rel="noopener noreferrer"
                >
                    {bookmark.url.clone()}
                </a>
                {move || {
                    error.get().map(|e| view! { <p class="mt-1 text-xs text-destructive">{e}</p> })
                }}
            </div>
            <Button
                variant=ButtonVariant::Ghost
                size=ButtonSize::Icon
                class="text-muted-foreground hover:text-destructive"
                attr:title="Delete bookmark"
                attr:aria-label="Delete bookmark"
                attr:disabled=move || deleting.get()
                on:click=on_delete
            >
                <Show when=move || deleting.get() fallback=|| view! { <Trash2 /> }>
                    <Spinner />
                </Show>
            </Button>
        </CardItem>
    }
}
