use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {Alert, div, "relative w-full rounded-xl border px-4 py-3 text-sm backdrop-blur-sm"}
    clx! {AlertError, div, "w-full rounded-xl border border-destructive/30 bg-destructive/10 px-4 py-3 text-sm text-destructive"}
    clx! {AlertDescription, p, "text-sm [&_p]:leading-relaxed"}
}

pub use components::*;
