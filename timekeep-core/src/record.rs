use serde::{Deserialize, Serialize};

use crate::models::Fact;
use crate::time;

/// Wire shape of a fact, `(iiissisasii)`:
/// `(id, start, end_or_0, description, activity, activity_id, category,
/// tags, date, delta_seconds)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRecord(
    pub i64,
    pub i64,
    pub i64,
    pub String,
    pub String,
    pub i64,
    pub String,
    pub Vec<String>,
    pub i64,
    pub i64,
);

impl FactRecord {
    pub fn id(&self) -> i64 {
        self.0
    }

    pub fn start_time(&self) -> i64 {
        self.1
    }

    pub fn end_time(&self) -> i64 {
        self.2
    }

    pub fn description(&self) -> &str {
        &self.3
    }

    pub fn activity(&self) -> &str {
        &self.4
    }

    pub fn activity_id(&self) -> i64 {
        self.5
    }

    pub fn category(&self) -> &str {
        &self.6
    }

    pub fn tags(&self) -> &[String] {
        &self.7
    }

    pub fn date(&self) -> i64 {
        self.8
    }

    pub fn delta(&self) -> i64 {
        self.9
    }
}

impl From<&Fact> for FactRecord {
    fn from(fact: &Fact) -> Self {
        FactRecord(
            fact.id,
            time::to_epoch(&fact.start_time),
            time::optional_to_epoch(fact.end_time.as_ref()),
            fact.description.clone().unwrap_or_default(),
            fact.activity_name.clone(),
            fact.activity_id,
            fact.category_name.clone().unwrap_or_default(),
            fact.tags.clone(),
            time::date_to_epoch(&fact.date),
            time::delta_seconds(&fact.delta),
        )
    }
}

impl From<Fact> for FactRecord {
    fn from(fact: Fact) -> Self {
        FactRecord::from(&fact)
    }
}
