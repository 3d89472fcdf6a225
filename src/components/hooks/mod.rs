pub mod use_near_page_end;

pub use use_near_page_end::*;
