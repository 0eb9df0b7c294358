//! StorageFacade: the RPC method surface over the storage collaborator.
//!
//! Normalizes wire inputs (epochs, sentinel category ids), delegates to
//! [`Storage`], shapes the results, and fires one change signal per
//! successful mutation. Nothing is cached between calls.

use serde_json::{json, Map, Value};
use timekeep_core::ipc::Signal;
use timekeep_core::parse::parse_fact;
use timekeep_core::storage::{Fixture, Storage};
use timekeep_core::{time, FactRecord, TimekeepError};

use crate::notify::NotificationHub;

type Result<T> = std::result::Result<T, TimekeepError>;

/// Seeded on first run, when there are no categories at all.
pub const DEFAULT_FIXTURES: &[Fixture] = &[
    Fixture {
        category: "Work",
        activities: &[
            "Reading news",
            "Checking stocks",
            "Super secret project X",
            "World domination",
        ],
    },
    Fixture {
        category: "Day-to-day",
        activities: &["Lunch", "Watering flowers", "Doing handstands"],
    },
];

/// Wire category ids: anything `<= 0` (`0` unset, `-1` sentinel) means no
/// category.
fn category_arg(category_id: i64) -> Option<i64> {
    (category_id > 0).then_some(category_id)
}

pub struct StorageFacade<S: Storage> {
    store: S,
    hub: NotificationHub,
}

impl<S: Storage> StorageFacade<S> {
    pub fn new(store: S, hub: NotificationHub) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// First-run seeding. Returns true if the defaults were inserted.
    pub async fn ensure_defaults(&self) -> Result<bool> {
        if !self.store.get_categories().await?.is_empty() {
            return Ok(false);
        }
        self.store.seed(DEFAULT_FIXTURES).await?;
        tracing::info!("Seeded {} default categories", DEFAULT_FIXTURES.len());
        self.hub.dispatch_overwrite();
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Facts
    // ------------------------------------------------------------------

    /// Returns the new fact id, or `0` when the fact was rejected.
    pub async fn add_fact(
        &self,
        fact: &str,
        start_time: i64,
        end_time: i64,
        temporary: bool,
    ) -> Result<i64> {
        let start_time = time::to_optional_instant(Some(start_time))?;
        let end_time = time::to_optional_instant(Some(end_time))?;
        let draft = parse_fact(fact);

        let id = self
            .store
            .add_fact(&draft, start_time, end_time, temporary)
            .await?;
        match id {
            Some(id) => {
                self.hub.emit(Signal::FactsChanged);
                Ok(id)
            }
            None => Ok(0),
        }
    }

    /// A single fact, dated by its start with a zero delta.
    pub async fn get_fact(&self, fact_id: i64) -> Result<FactRecord> {
        let mut fact = self.store.get_fact(fact_id).await?;
        fact.date = fact.start_time.date();
        fact.delta = chrono::Duration::zero();
        Ok(FactRecord::from(fact))
    }

    pub async fn update_fact(
        &self,
        fact_id: i64,
        fact: &str,
        start_time: i64,
        end_time: i64,
        temporary: bool,
    ) -> Result<i64> {
        let start_time = time::to_optional_instant(Some(start_time))?;
        let end_time = time::to_optional_instant(Some(end_time))?;
        let draft = parse_fact(fact);

        let id = self
            .store
            .update_fact(fact_id, &draft, start_time, end_time, temporary)
            .await?;
        self.hub.emit(Signal::FactsChanged);
        Ok(id)
    }

    /// Returns the id of the stopped fact, or `0` if nothing was running.
    pub async fn stop_tracking(&self, end_time: i64) -> Result<i64> {
        let end_time = time::to_optional_instant(Some(end_time))?;
        match self.store.stop_tracking(end_time).await? {
            Some(id) => {
                self.hub.emit(Signal::FactsChanged);
                Ok(id)
            }
            None => Ok(0),
        }
    }

    pub async fn remove_fact(&self, fact_id: i64) -> Result<i64> {
        let id = self.store.remove_fact(fact_id).await?;
        self.hub.emit(Signal::FactsChanged);
        Ok(id)
    }

    /// Facts between two dates, inclusive. A zero start date means the
    /// current service day; a zero end date leaves the range open.
    pub async fn get_facts(
        &self,
        start_date: u32,
        end_date: u32,
        search_terms: &str,
        reverse_search_terms: bool,
    ) -> Result<Vec<FactRecord>> {
        let start_date = time::epoch_to_date(start_date)?.unwrap_or_else(|| self.store.today());
        let end_date = time::epoch_to_date(end_date)?;

        let facts = self
            .store
            .get_facts(start_date, end_date, search_terms, reverse_search_terms)
            .await?;
        Ok(facts.iter().map(FactRecord::from).collect())
    }

    pub async fn get_todays_facts(&self) -> Result<Vec<FactRecord>> {
        let facts = self.store.get_todays_facts().await?;
        Ok(facts.iter().map(FactRecord::from).collect())
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    pub async fn add_category(&self, name: &str) -> Result<i64> {
        let id = self.store.add_category(name).await?;
        self.hub.emit(Signal::ActivitiesChanged);
        Ok(id)
    }

    /// `0` for unknown names.
    pub async fn get_category_id(&self, category: &str) -> Result<i64> {
        Ok(self.store.get_category_id(category).await?.unwrap_or(0))
    }

    pub async fn update_category(&self, id: i64, name: &str) -> Result<()> {
        self.store.update_category(id, name).await?;
        self.hub.emit(Signal::ActivitiesChanged);
        Ok(())
    }

    pub async fn remove_category(&self, id: i64) -> Result<()> {
        self.store.remove_category(id).await?;
        self.hub.emit(Signal::ActivitiesChanged);
        Ok(())
    }

    pub async fn get_categories(&self) -> Result<Vec<(i64, String)>> {
        let categories = self.store.get_categories().await?;
        Ok(categories.into_iter().map(|c| (c.id, c.name)).collect())
    }

    // ------------------------------------------------------------------
    // Activities
    // ------------------------------------------------------------------

    /// Revives a removed activity of the same name instead of duplicating it.
    pub async fn add_activity(&self, name: &str, category_id: i64) -> Result<i64> {
        let id = self
            .store
            .add_activity(name, category_arg(category_id), true)
            .await?;
        self.hub.emit(Signal::ActivitiesChanged);
        Ok(id)
    }

    pub async fn update_activity(&self, id: i64, name: &str, category_id: i64) -> Result<()> {
        self.store
            .update_activity(id, name, category_arg(category_id))
            .await?;
        self.hub.emit(Signal::ActivitiesChanged);
        Ok(())
    }

    pub async fn remove_activity(&self, id: i64) -> Result<i64> {
        let id = self.store.remove_activity(id).await?;
        self.hub.emit(Signal::ActivitiesChanged);
        Ok(id)
    }

    /// `(id, name, category_id, category_name)`; `-1` lists uncategorized.
    pub async fn get_category_activities(
        &self,
        category_id: i64,
    ) -> Result<Vec<(i64, String, i64, String)>> {
        let activities = self
            .store
            .get_category_activities(category_arg(category_id))
            .await?;
        Ok(activities
            .into_iter()
            .map(|a| (a.id, a.name, a.category_id, a.category_name))
            .collect())
    }

    /// `(name, category_name)` pairs.
    pub async fn get_activities(&self, search: &str) -> Result<Vec<(String, String)>> {
        let activities = self.store.get_activities(search).await?;
        Ok(activities
            .into_iter()
            .map(|a| (a.name, a.category_name))
            .collect())
    }

    pub async fn change_category(&self, id: i64, category_id: i64) -> Result<bool> {
        let changed = self
            .store
            .change_category(id, category_arg(category_id))
            .await?;
        if changed {
            self.hub.emit(Signal::ActivitiesChanged);
        }
        Ok(changed)
    }

    /// Empty map for an empty or unknown name.
    pub async fn get_activity_by_name(
        &self,
        activity: &str,
        category_id: i64,
        resurrect: bool,
    ) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        if activity.trim().is_empty() {
            return Ok(map);
        }
        let Some(lookup) = self
            .store
            .get_activity_by_name(activity, category_arg(category_id), resurrect)
            .await?
        else {
            return Ok(map);
        };
        if lookup.resurrected {
            self.hub.emit(Signal::ActivitiesChanged);
        }

        let activity = lookup.activity;
        map.insert("id".to_string(), json!(activity.id));
        map.insert("name".to_string(), json!(activity.name));
        map.insert("category_id".to_string(), json!(activity.category_id));
        map.insert("category".to_string(), json!(activity.category_name));
        map.insert("deleted".to_string(), json!(activity.deleted));
        Ok(map)
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    pub async fn get_tags(&self, only_autocomplete: bool) -> Result<Vec<(i64, String, bool)>> {
        let tags = self.store.get_tags(only_autocomplete).await?;
        Ok(tags
            .into_iter()
            .map(|t| (t.id, t.name, t.autocomplete))
            .collect())
    }

    /// Missing tags are created on the way.
    pub async fn get_tag_ids(&self, tags: &[String]) -> Result<Vec<(i64, String, bool)>> {
        let lookup = self.store.get_tag_ids(tags).await?;
        if lookup.created {
            self.hub.emit(Signal::TagsChanged);
        }
        Ok(lookup
            .tags
            .into_iter()
            .map(|t| (t.id, t.name, t.autocomplete))
            .collect())
    }

    pub async fn set_tags_autocomplete(&self, tags: &str) -> Result<()> {
        self.store.update_autocomplete_tags(tags).await?;
        self.hub.emit(Signal::TagsChanged);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    pub fn toggle(&self) {
        self.hub.emit(Signal::ToggleCalled);
    }
}
