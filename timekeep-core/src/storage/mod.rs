//! The storage collaborator consumed by the service facade.
//!
//! Category ids are `Option<i64>` throughout: `None` means "uncategorized",
//! except for [`Storage::get_activity_by_name`] where it means "any category".

pub mod sqlite;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::models::{Activity, Category, Fact, FactDraft, Tag};

pub use sqlite::SqliteStorage;

/// One default category with its starter activities.
#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub category: &'static str,
    pub activities: &'static [&'static str],
}

/// Result of a name lookup that may have revived a removed activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityLookup {
    pub activity: Activity,
    pub resurrected: bool,
}

/// Tags resolved by name; `created` is set when any had to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct TagLookup {
    pub tags: Vec<Tag>,
    pub created: bool,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns `None` when the fact is rejected (no activity, end before start).
    async fn add_fact(
        &self,
        draft: &FactDraft,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
        temporary: bool,
    ) -> Result<Option<i64>>;

    async fn get_fact(&self, id: i64) -> Result<Fact>;

    async fn update_fact(
        &self,
        id: i64,
        draft: &FactDraft,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
        temporary: bool,
    ) -> Result<i64>;

    /// Closes the running fact. Returns its id, or `None` if nothing was running.
    async fn stop_tracking(&self, end_time: Option<NaiveDateTime>) -> Result<Option<i64>>;

    async fn remove_fact(&self, id: i64) -> Result<i64>;

    /// Facts whose service day falls in `start_date..=end_date`, plus facts
    /// still running from before the range once it has begun. An absent end
    /// date leaves the range open.
    async fn get_facts(
        &self,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        search: &str,
        reverse: bool,
    ) -> Result<Vec<Fact>>;

    /// The current service day.
    fn today(&self) -> NaiveDate;

    async fn get_todays_facts(&self) -> Result<Vec<Fact>>;

    async fn add_category(&self, name: &str) -> Result<i64>;
    async fn get_category_id(&self, name: &str) -> Result<Option<i64>>;
    async fn update_category(&self, id: i64, name: &str) -> Result<()>;
    async fn remove_category(&self, id: i64) -> Result<()>;
    async fn get_categories(&self) -> Result<Vec<Category>>;

    async fn add_activity(&self, name: &str, category_id: Option<i64>, resurrect: bool)
        -> Result<i64>;
    async fn update_activity(&self, id: i64, name: &str, category_id: Option<i64>) -> Result<()>;
    async fn remove_activity(&self, id: i64) -> Result<i64>;
    async fn get_category_activities(&self, category_id: Option<i64>) -> Result<Vec<Activity>>;
    async fn get_activities(&self, search: &str) -> Result<Vec<Activity>>;
    /// `false` when the activity already lives in the target category.
    async fn change_category(&self, id: i64, category_id: Option<i64>) -> Result<bool>;
    async fn get_activity_by_name(
        &self,
        name: &str,
        category_id: Option<i64>,
        resurrect: bool,
    ) -> Result<Option<ActivityLookup>>;

    async fn get_tags(&self, only_autocomplete: bool) -> Result<Vec<Tag>>;
    async fn get_tag_ids(&self, names: &[String]) -> Result<TagLookup>;
    /// `tags` is a comma-separated list of the names to offer for autocompletion.
    async fn update_autocomplete_tags(&self, tags: &str) -> Result<()>;

    /// Insert default categories and activities.
    async fn seed(&self, fixtures: &[Fixture]) -> Result<()>;
}
