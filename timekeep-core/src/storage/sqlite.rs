//! SQLite-backed storage.
//!
//! Times are stored as `NaiveDateTime` text at one-second resolution, so
//! lexical comparison in SQL matches chronological order.
//!
//! Overlap resolution (skipped for temporary facts):
//! - a new running fact closes running facts that started before it and
//!   replaces any that started at or after it
//! - a new completed fact `[s, e]` removes completed facts inside it, trims
//!   the ones crossing `s` or `e`, closes a running fact started before `s`,
//!   and pushes a running fact started inside the range to `e`

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use super::{ActivityLookup, Fixture, Storage, TagLookup};
use crate::config::TrackingConfig;
use crate::error::{Result, TimekeepError};
use crate::models::{Activity, Category, Fact, FactDraft, Tag, UNCATEGORIZED, UNSORTED_CATEGORY};
use crate::time;

const ACTIVITY_SEARCH_LIMIT: i64 = 50;
const TAG_QUERY_CHUNK: usize = 500;

const FACT_SELECT: &str = r#"
SELECT f.id, f.activity_id, a.name AS activity_name, c.name AS category_name,
       f.description, f.start_time, f.end_time
FROM facts f
JOIN activities a ON a.id = f.activity_id
LEFT JOIN categories c ON c.id = a.category_id
"#;

const ACTIVITY_SELECT: &str = r#"
SELECT a.id, a.name, a.category_id, COALESCE(c.name, ?) AS category_name, a.deleted
FROM activities a
LEFT JOIN categories c ON c.id = a.category_id
"#;

#[derive(Debug, sqlx::FromRow)]
struct FactRow {
    id: i64,
    activity_id: i64,
    activity_name: String,
    category_name: Option<String>,
    description: Option<String>,
    start_time: NaiveDateTime,
    end_time: Option<NaiveDateTime>,
}

/// Which activities a name lookup may match.
#[derive(Debug, Clone, Copy)]
enum Scope {
    Any,
    In(i64),
}

pub struct SqliteStorage {
    pool: SqlitePool,
    day_start: NaiveTime,
    min_fact_duration: Duration,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool, tracking: &TrackingConfig) -> Result<Self> {
        Ok(Self::with_rules(
            pool,
            tracking.day_start()?,
            tracking.min_fact_seconds,
        ))
    }

    pub fn with_rules(pool: SqlitePool, day_start: NaiveTime, min_fact_seconds: i64) -> Self {
        Self {
            pool,
            day_start,
            min_fact_duration: Duration::seconds(min_fact_seconds.max(0)),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn to_fact(&self, row: FactRow, tags: Vec<String>, now: NaiveDateTime) -> Fact {
        let delta = (row.end_time.unwrap_or(now) - row.start_time).max(Duration::zero());
        Fact {
            id: row.id,
            activity_id: row.activity_id,
            activity_name: row.activity_name,
            category_name: row.category_name,
            description: row.description,
            date: time::service_date(&row.start_time, self.day_start),
            start_time: row.start_time,
            end_time: row.end_time,
            tags,
            delta,
        }
    }

    async fn facts_with_tags(&self, rows: Vec<FactRow>) -> Result<Vec<Fact>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut tags = fetch_tags(&self.pool, &ids).await?;
        let now = time::now();
        Ok(rows
            .into_iter()
            .map(|row| {
                let fact_tags = tags.remove(&row.id).unwrap_or_default();
                self.to_fact(row, fact_tags, now)
            })
            .collect())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn add_fact(
        &self,
        draft: &FactDraft,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
        temporary: bool,
    ) -> Result<Option<i64>> {
        if draft.activity.is_empty() {
            tracing::debug!("Rejecting fact without an activity");
            return Ok(None);
        }
        let start_time = start_time.unwrap_or_else(time::now);
        if end_time.is_some_and(|end| end < start_time) {
            tracing::debug!("Rejecting fact ending before it starts");
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;
        if !temporary {
            resolve_overlaps(&mut tx, start_time, end_time, None).await?;
        }
        let activity_id = resolve_activity(&mut tx, draft).await?;
        let id = sqlx::query(
            "INSERT INTO facts (activity_id, start_time, end_time, description) VALUES (?, ?, ?, ?)",
        )
        .bind(activity_id)
        .bind(start_time)
        .bind(end_time)
        .bind(&draft.description)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        let tags = ensure_tags(&mut tx, &draft.tags).await?;
        write_fact_tags(&mut tx, id, &tags.tags).await?;
        tx.commit().await?;

        tracing::info!("Added fact {} ({})", id, draft.activity);
        Ok(Some(id))
    }

    async fn get_fact(&self, id: i64) -> Result<Fact> {
        let row: FactRow = sqlx::query_as(&format!("{} WHERE f.id = ?", FACT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| TimekeepError::not_found("fact", id))?;
        let mut facts = self.facts_with_tags(vec![row]).await?;
        facts
            .pop()
            .ok_or_else(|| TimekeepError::not_found("fact", id))
    }

    async fn update_fact(
        &self,
        id: i64,
        draft: &FactDraft,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
        temporary: bool,
    ) -> Result<i64> {
        if draft.activity.is_empty() {
            return Err(TimekeepError::Invalid("fact has no activity".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let current: Option<NaiveDateTime> =
            sqlx::query_scalar("SELECT start_time FROM facts WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or_else(|| TimekeepError::not_found("fact", id))?;

        let start_time = start_time.unwrap_or(current);
        if end_time.is_some_and(|end| end < start_time) {
            return Err(TimekeepError::Invalid(format!(
                "fact {} would end before it starts",
                id
            )));
        }

        if !temporary {
            resolve_overlaps(&mut tx, start_time, end_time, Some(id)).await?;
        }
        let activity_id = resolve_activity(&mut tx, draft).await?;
        sqlx::query(
            "UPDATE facts SET activity_id = ?, start_time = ?, end_time = ?, description = ? WHERE id = ?",
        )
        .bind(activity_id)
        .bind(start_time)
        .bind(end_time)
        .bind(&draft.description)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let tags = ensure_tags(&mut tx, &draft.tags).await?;
        write_fact_tags(&mut tx, id, &tags.tags).await?;
        tx.commit().await?;

        tracing::info!("Updated fact {}", id);
        Ok(id)
    }

    async fn stop_tracking(&self, end_time: Option<NaiveDateTime>) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;
        let running: Option<(i64, NaiveDateTime)> = sqlx::query_as(
            "SELECT id, start_time FROM facts WHERE end_time IS NULL ORDER BY start_time DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        let Some((id, start_time)) = running else {
            return Ok(None);
        };

        let end_time = end_time.unwrap_or_else(time::now);
        if end_time < start_time {
            return Err(TimekeepError::Invalid(format!(
                "cannot stop fact {} before it started",
                id
            )));
        }

        if end_time - start_time < self.min_fact_duration {
            tracing::info!("Discarding fact {}: shorter than the minimum duration", id);
            delete_fact(&mut tx, id).await?;
        } else {
            sqlx::query("UPDATE facts SET end_time = ? WHERE id = ?")
                .bind(end_time)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(Some(id))
    }

    async fn remove_fact(&self, id: i64) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        if !delete_fact(&mut tx, id).await? {
            return Err(TimekeepError::not_found("fact", id));
        }
        tx.commit().await?;
        Ok(id)
    }

    async fn get_facts(
        &self,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        search: &str,
        reverse: bool,
    ) -> Result<Vec<Fact>> {
        let lower = start_date.and_time(self.day_start);
        let upper = end_date
            .and_then(|d| d.succ_opt())
            .map(|d| d.and_time(self.day_start));
        // A fact still running from before the range overlaps it as long as
        // the range has already begun.
        let include_running = lower <= time::now();

        let rows: Vec<FactRow> = match upper {
            Some(upper) => {
                sqlx::query_as(&format!(
                    "{} WHERE (f.start_time >= ? AND f.start_time < ?) \
                     OR (f.end_time IS NULL AND f.start_time < ? AND ?) \
                     ORDER BY f.start_time, f.id",
                    FACT_SELECT
                ))
                .bind(lower)
                .bind(upper)
                .bind(lower)
                .bind(include_running)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "{} WHERE f.start_time >= ? \
                     OR (f.end_time IS NULL AND f.start_time < ? AND ?) \
                     ORDER BY f.start_time, f.id",
                    FACT_SELECT
                ))
                .bind(lower)
                .bind(lower)
                .bind(include_running)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let facts = self.facts_with_tags(rows).await?;
        let terms = search_terms(search);
        if terms.is_empty() {
            return Ok(facts);
        }
        Ok(facts
            .into_iter()
            .filter(|fact| matches_terms(fact, &terms) != reverse)
            .collect())
    }

    fn today(&self) -> NaiveDate {
        time::service_date(&time::now(), self.day_start)
    }

    async fn get_todays_facts(&self) -> Result<Vec<Fact>> {
        let today = self.today();
        self.get_facts(today, Some(today), "", false).await
    }

    async fn add_category(&self, name: &str) -> Result<i64> {
        let name = required_name(name, "category")?;
        let mut tx = self.pool.begin().await?;
        let id = ensure_category(&mut tx, name).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn get_category_id(&self, name: &str) -> Result<Option<i64>> {
        let mut conn = self.pool.acquire().await?;
        category_id_by_name(&mut conn, name.trim()).await
    }

    async fn update_category(&self, id: i64, name: &str) -> Result<()> {
        let name = required_name(name, "category")?;
        let result = sqlx::query("UPDATE categories SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TimekeepError::not_found("category", id));
        }
        Ok(())
    }

    async fn remove_category(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TimekeepError::not_found("category", id));
        }
        sqlx::query("UPDATE activities SET category_id = ? WHERE category_id = ?")
            .bind(UNCATEGORIZED)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_categories(&self) -> Result<Vec<Category>> {
        let categories = sqlx::query_as("SELECT id, name FROM categories ORDER BY lower(name), id")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    async fn add_activity(
        &self,
        name: &str,
        category_id: Option<i64>,
        resurrect: bool,
    ) -> Result<i64> {
        let name = required_name(name, "activity")?;
        let mut tx = self.pool.begin().await?;
        let id =
            ensure_activity(&mut tx, name, category_id.unwrap_or(UNCATEGORIZED), resurrect).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn update_activity(&self, id: i64, name: &str, category_id: Option<i64>) -> Result<()> {
        let name = required_name(name, "activity")?;
        let result = sqlx::query("UPDATE activities SET name = ?, category_id = ? WHERE id = ?")
            .bind(name)
            .bind(category_id.unwrap_or(UNCATEGORIZED))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TimekeepError::not_found("activity", id));
        }
        Ok(())
    }

    async fn remove_activity(&self, id: i64) -> Result<i64> {
        // Soft delete: facts keep their activity, and the name can be resurrected.
        let result = sqlx::query("UPDATE activities SET deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TimekeepError::not_found("activity", id));
        }
        Ok(id)
    }

    async fn get_category_activities(&self, category_id: Option<i64>) -> Result<Vec<Activity>> {
        let activities = sqlx::query_as(&format!(
            "{} WHERE a.category_id = ? AND a.deleted = 0 ORDER BY lower(a.name), a.id",
            ACTIVITY_SELECT
        ))
        .bind(UNSORTED_CATEGORY)
        .bind(category_id.unwrap_or(UNCATEGORIZED))
        .fetch_all(&self.pool)
        .await?;
        Ok(activities)
    }

    async fn get_activities(&self, search: &str) -> Result<Vec<Activity>> {
        let activities = sqlx::query_as(&format!(
            r#"{}
            LEFT JOIN (
                SELECT activity_id, MAX(start_time) AS last_used FROM facts GROUP BY activity_id
            ) u ON u.activity_id = a.id
            WHERE a.deleted = 0 AND lower(a.name) LIKE ? ESCAPE '\'
            ORDER BY u.last_used IS NULL, u.last_used DESC, lower(a.name)
            LIMIT ?"#,
            ACTIVITY_SELECT
        ))
        .bind(UNSORTED_CATEGORY)
        .bind(like_pattern(search))
        .bind(ACTIVITY_SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(activities)
    }

    async fn change_category(&self, id: i64, category_id: Option<i64>) -> Result<bool> {
        let target = category_id.unwrap_or(UNCATEGORIZED);
        let mut tx = self.pool.begin().await?;
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM activities WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let name = name.ok_or_else(|| TimekeepError::not_found("activity", id))?;

        let existing = find_activity(&mut tx, &name, Scope::In(target))
            .await?
            .filter(|a| !a.deleted);
        match existing {
            Some(existing) if existing.id == id => return Ok(false),
            Some(existing) => {
                // Same name already lives in the target: merge into it.
                sqlx::query("UPDATE facts SET activity_id = ? WHERE activity_id = ?")
                    .bind(existing.id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM activities WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tracing::info!("Merged activity {} into {}", id, existing.id);
            }
            None => {
                sqlx::query("UPDATE activities SET category_id = ? WHERE id = ?")
                    .bind(target)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn get_activity_by_name(
        &self,
        name: &str,
        category_id: Option<i64>,
        resurrect: bool,
    ) -> Result<Option<ActivityLookup>> {
        let scope = match category_id {
            Some(id) => Scope::In(id),
            None => Scope::Any,
        };
        let mut tx = self.pool.begin().await?;
        let Some(mut activity) = find_activity(&mut tx, name.trim(), scope).await? else {
            return Ok(None);
        };

        let resurrected = activity.deleted && resurrect;
        if resurrected {
            undelete_activity(&mut tx, activity.id).await?;
            activity.deleted = false;
        }
        tx.commit().await?;
        Ok(Some(ActivityLookup {
            activity,
            resurrected,
        }))
    }

    async fn get_tags(&self, only_autocomplete: bool) -> Result<Vec<Tag>> {
        let sql = if only_autocomplete {
            "SELECT id, name, autocomplete FROM tags WHERE autocomplete = 1 ORDER BY lower(name)"
        } else {
            "SELECT id, name, autocomplete FROM tags ORDER BY lower(name)"
        };
        let tags = sqlx::query_as(sql).fetch_all(&self.pool).await?;
        Ok(tags)
    }

    async fn get_tag_ids(&self, names: &[String]) -> Result<TagLookup> {
        let mut tx = self.pool.begin().await?;
        let lookup = ensure_tags(&mut tx, names).await?;
        tx.commit().await?;
        Ok(lookup)
    }

    async fn update_autocomplete_tags(&self, tags: &str) -> Result<()> {
        let names: Vec<String> = tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let mut tx = self.pool.begin().await?;
        let listed = ensure_tags(&mut tx, &names).await?;
        sqlx::query("UPDATE tags SET autocomplete = 0")
            .execute(&mut *tx)
            .await?;
        for tag in &listed.tags {
            sqlx::query("UPDATE tags SET autocomplete = 1 WHERE id = ?")
                .bind(tag.id)
                .execute(&mut *tx)
                .await?;
        }
        let dropped = sqlx::query(
            "DELETE FROM tags WHERE autocomplete = 0 AND id NOT IN (SELECT tag_id FROM fact_tags)",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        tracing::debug!(
            "Autocomplete tags set to {:?}, {} unused tags dropped",
            names,
            dropped
        );
        Ok(())
    }

    async fn seed(&self, fixtures: &[Fixture]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for fixture in fixtures {
            let category_id = ensure_category(&mut tx, fixture.category).await?;
            for activity in fixture.activities {
                ensure_activity(&mut tx, activity, category_id, true).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn required_name<'a>(name: &'a str, entity: &str) -> Result<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TimekeepError::Invalid(format!("{} name is empty", entity)));
    }
    Ok(name)
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .trim()
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn search_terms(search: &str) -> Vec<String> {
    search
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

/// Every term must appear in the activity, category, description or tags.
fn matches_terms(fact: &Fact, terms: &[String]) -> bool {
    let haystack = [
        fact.activity_name.as_str(),
        fact.category_name.as_deref().unwrap_or(""),
        fact.description.as_deref().unwrap_or(""),
        &fact.tags.join(" "),
    ]
    .join(" ")
    .to_lowercase();
    terms.iter().all(|term| haystack.contains(term.as_str()))
}

async fn fetch_tags(pool: &SqlitePool, fact_ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
    let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
    for chunk in fact_ids.chunks(TAG_QUERY_CHUNK) {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ft.fact_id, t.name FROM fact_tags ft JOIN tags t ON t.id = ft.tag_id WHERE ft.fact_id IN (",
        );
        let mut ids = query.separated(", ");
        for id in chunk {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY ft.fact_id, ft.id");

        let rows: Vec<(i64, String)> = query.build_query_as().fetch_all(pool).await?;
        for (fact_id, name) in rows {
            tags.entry(fact_id).or_default().push(name);
        }
    }
    Ok(tags)
}

async fn category_id_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar(
        "SELECT id FROM categories WHERE lower(name) = lower(?) ORDER BY id LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

async fn ensure_category(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    if let Some(id) = category_id_by_name(conn, name).await? {
        return Ok(id);
    }
    let id = sqlx::query("INSERT INTO categories (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    Ok(id)
}

/// Best match for `name`: live activities first, then the newest removed one.
async fn find_activity(
    conn: &mut SqliteConnection,
    name: &str,
    scope: Scope,
) -> Result<Option<Activity>> {
    let activity = match scope {
        Scope::Any => {
            sqlx::query_as(&format!(
                "{} WHERE lower(a.name) = lower(?) ORDER BY a.deleted, a.id DESC LIMIT 1",
                ACTIVITY_SELECT
            ))
            .bind(UNSORTED_CATEGORY)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?
        }
        Scope::In(category_id) => {
            sqlx::query_as(&format!(
                "{} WHERE lower(a.name) = lower(?) AND a.category_id = ? ORDER BY a.deleted, a.id DESC LIMIT 1",
                ACTIVITY_SELECT
            ))
            .bind(UNSORTED_CATEGORY)
            .bind(name)
            .bind(category_id)
            .fetch_optional(&mut *conn)
            .await?
        }
    };
    Ok(activity)
}

async fn undelete_activity(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE activities SET deleted = 0 WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    tracing::info!("Resurrected activity {}", id);
    Ok(())
}

async fn insert_activity(conn: &mut SqliteConnection, name: &str, category_id: i64) -> Result<i64> {
    let id = sqlx::query("INSERT INTO activities (name, category_id) VALUES (?, ?)")
        .bind(name)
        .bind(category_id)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    Ok(id)
}

async fn ensure_activity(
    conn: &mut SqliteConnection,
    name: &str,
    category_id: i64,
    resurrect: bool,
) -> Result<i64> {
    match find_activity(conn, name, Scope::In(category_id)).await? {
        Some(activity) if !activity.deleted => Ok(activity.id),
        Some(activity) if resurrect => {
            undelete_activity(conn, activity.id).await?;
            Ok(activity.id)
        }
        _ => insert_activity(conn, name, category_id).await,
    }
}

/// Activity for a new or edited fact. Without a category, any existing
/// activity of that name is reused.
async fn resolve_activity(conn: &mut SqliteConnection, draft: &FactDraft) -> Result<i64> {
    let category_id = match &draft.category {
        Some(category) => Some(ensure_category(conn, category).await?),
        None => None,
    };
    let scope = category_id.map(Scope::In).unwrap_or(Scope::Any);
    match find_activity(conn, &draft.activity, scope).await? {
        Some(activity) => {
            if activity.deleted {
                undelete_activity(conn, activity.id).await?;
            }
            Ok(activity.id)
        }
        None => {
            insert_activity(conn, &draft.activity, category_id.unwrap_or(UNCATEGORIZED)).await
        }
    }
}

async fn ensure_tags(conn: &mut SqliteConnection, names: &[String]) -> Result<TagLookup> {
    let mut tags: Vec<Tag> = Vec::new();
    let mut created = false;
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        if tags.iter().any(|t| t.name == name) {
            continue;
        }
        let existing: Option<Tag> =
            sqlx::query_as("SELECT id, name, autocomplete FROM tags WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *conn)
                .await?;
        let tag = match existing {
            Some(tag) => tag,
            None => {
                let id = sqlx::query("INSERT INTO tags (name, autocomplete) VALUES (?, 1)")
                    .bind(name)
                    .execute(&mut *conn)
                    .await?
                    .last_insert_rowid();
                created = true;
                Tag {
                    id,
                    name: name.to_string(),
                    autocomplete: true,
                }
            }
        };
        tags.push(tag);
    }
    Ok(TagLookup { tags, created })
}

async fn write_fact_tags(conn: &mut SqliteConnection, fact_id: i64, tags: &[Tag]) -> Result<()> {
    sqlx::query("DELETE FROM fact_tags WHERE fact_id = ?")
        .bind(fact_id)
        .execute(&mut *conn)
        .await?;
    for tag in tags {
        sqlx::query("INSERT INTO fact_tags (fact_id, tag_id) VALUES (?, ?)")
            .bind(fact_id)
            .bind(tag.id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Returns false if there was no such fact.
async fn delete_fact(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    sqlx::query("DELETE FROM fact_tags WHERE fact_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    let result = sqlx::query("DELETE FROM facts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn resolve_overlaps(
    conn: &mut SqliteConnection,
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
    exclude: Option<i64>,
) -> Result<()> {
    let exclude = exclude.unwrap_or(0);

    sqlx::query(
        "UPDATE facts SET end_time = ? WHERE end_time IS NULL AND start_time < ? AND id != ?",
    )
    .bind(start)
    .bind(start)
    .bind(exclude)
    .execute(&mut *conn)
    .await?;

    let Some(end) = end else {
        sqlx::query(
            "DELETE FROM facts WHERE end_time IS NULL AND start_time >= ? AND id != ?",
        )
        .bind(start)
        .bind(exclude)
        .execute(&mut *conn)
        .await?;
        return drop_orphan_tags(conn).await;
    };

    sqlx::query(
        "UPDATE facts SET start_time = ? WHERE end_time IS NULL AND start_time >= ? AND start_time < ? AND id != ?",
    )
    .bind(end)
    .bind(start)
    .bind(end)
    .bind(exclude)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "DELETE FROM facts WHERE end_time IS NOT NULL AND start_time >= ? AND end_time <= ? AND id != ?",
    )
    .bind(start)
    .bind(end)
    .bind(exclude)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE facts SET end_time = ? WHERE end_time IS NOT NULL AND start_time < ? AND end_time > ? AND id != ?",
    )
    .bind(start)
    .bind(start)
    .bind(start)
    .bind(exclude)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE facts SET start_time = ? WHERE end_time IS NOT NULL AND start_time >= ? AND start_time < ? AND end_time > ? AND id != ?",
    )
    .bind(end)
    .bind(start)
    .bind(end)
    .bind(end)
    .bind(exclude)
    .execute(&mut *conn)
    .await?;

    drop_orphan_tags(conn).await
}

async fn drop_orphan_tags(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DELETE FROM fact_tags WHERE fact_id NOT IN (SELECT id FROM facts)")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" Read "), "%read%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
    }

    #[test]
    fn test_search_terms_must_all_match() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let fact = Fact {
            id: 1,
            activity_id: 1,
            activity_name: "Coding".to_string(),
            category_name: Some("Work".to_string()),
            description: Some("ipc layer".to_string()),
            start_time: date.and_hms_opt(9, 0, 0).unwrap(),
            end_time: None,
            tags: vec!["rust".to_string()],
            date,
            delta: Duration::zero(),
        };

        assert!(matches_terms(&fact, &search_terms("coding RUST")));
        assert!(matches_terms(&fact, &search_terms("work ipc")));
        assert!(!matches_terms(&fact, &search_terms("coding python")));
    }
}
