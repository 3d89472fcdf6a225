pub mod bookmark_form;
pub mod bookmark_list;
pub mod hooks;
pub mod ui;

pub use bookmark_form::BookmarkForm;
pub use bookmark_list::BookmarkListView;
