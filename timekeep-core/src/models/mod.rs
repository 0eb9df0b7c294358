pub mod activity;
pub mod category;
pub mod fact;
pub mod tag;

pub use activity::{Activity, UNCATEGORIZED, UNSORTED_CATEGORY};
pub use category::Category;
pub use fact::{Fact, FactDraft};
pub use tag::Tag;
