use crate::components::ui::{
    AlertDescription, AlertError, Button, ButtonSize, Card, CardContent, CardHeader, CardTitle,
    Input, Label, Spinner,
};
use crate::state::AppContext;
use icons::Plus;
use leptos::prelude::*;
use leptos::task::spawn_local;

/// Title + URL form. Clears itself and calls `on_added` after a successful insert.
#[component]
pub fn BookmarkForm(#[prop(into)] on_added: Callback<()>) -> impl IntoView {
    let title: RwSignal<String> = RwSignal::new(String::new());
    let url: RwSignal<String> = RwSignal::new(String::new());
    let error: RwSignal<Option<String>> = RwSignal::new(None);
    let submitting: RwSignal<bool> = RwSignal::new(false);

    let app_state = expect_context::<AppContext>();

    let on_submit = move |ev: web_sys::SubmitEvent| {
        ev.prevent_default();
        if submitting.get_untracked() {
            return;
        }

        let title_val = title.get_untracked();
        let url_val = url.get_untracked();
        let bookmarks = app_state.0.bookmarks.clone();

        submitting.set(true);
        error.set(None);

        spawn_local(async move {
            match bookmarks.add_bookmark(&title_val, &url_val).await {
                Ok(_) => {
                    title.set(String::new());
                    url.set(String::new());
                    on_added.run(());
                }
                Err(e) => error.set(Some(e.to_string())),
            }
            submitting.set(false);
        });
    };

    view! {
        <Card class="w-full">
            <CardHeader>
                <CardTitle>"Add New Bookmark"</CardTitle>
            </CardHeader>

            <CardContent>
                <form class="flex flex-col gap-4" on:submit=on_submit>
                    {move || {
                        error.get().map(|e| {
                            view! {
                                <AlertError>
                                    <AlertDescription>{e}</AlertDescription>
                                </AlertError>
                            }
                        })
                    }}

                    <div>
                        <Label html_for="title">"Title"</Label>
                        <Input
                            id="title"
                            placeholder="e.g., GitHub"
                            bind_value=title
                            disabled=Signal::derive(move || submitting.get())
                        />
                    </div>

                    <div>
                        <Label html_for="url">"URL"</Label>
                        <Input
                            id="url"
                            r#type="url"
                            placeholder="https://github.com"
                            bind_value=url
                            disabled=Signal::derive(move || submitting.get())
                        />
                    </div>

                    <Button
                        class="w-full"
                        size=ButtonSize::Lg
                        attr:disabled=move || {
                            submitting.get()
                                || title.with(|t| t.trim().is_empty())
                                || url.with(|u| u.trim().is_empty())
                        }
                    >
                        <Show when=move || submitting.get() fallback=|| view! { <Plus /> }>
                            <Spinner />
                        </Show>
                        {move || if submitting.get() { "Adding..." } else { "Add Bookmark" }}
                    </Button>
                </form>
            </CardContent>
        </Card>
    }
}
