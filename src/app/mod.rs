use crate::config::EnvConfig;
use crate::pages::{AuthCallbackPage, RootPage};
use crate::state::{AppContext, AppState};
use leptos::prelude::*;
use leptos_router::components::{Route, Router, Routes};
use leptos_router::path;

#[component]
pub fn App(config: EnvConfig) -> impl IntoView {
    provide_context(AppContext(AppState::new(config)));

    // Leptos CSR requires the `csr` feature on `leptos`; router hooks require a <Router> context.
    view! {
        <Router>
            <Routes fallback=|| view! { <div class="px-4 py-8 text-xs text-muted-foreground">"Not found"</div> }>
                <Route path=path!("auth/callback") view=AuthCallbackPage />
                <Route path=path!("") view=RootPage />
            </Routes>
        </Router>
    }
}
