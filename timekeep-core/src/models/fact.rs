use chrono::{Duration, NaiveDate, NaiveDateTime};

/// A tracked fact as read back from storage, with `date` and `delta` derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub id: i64,
    pub activity_id: i64,
    pub activity_name: String,
    pub category_name: Option<String>,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub tags: Vec<String>,
    pub date: NaiveDate,
    pub delta: Duration,
}

impl Fact {
    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }
}

/// The parsed form of a free-text fact such as `coding@work, review #rust`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactDraft {
    pub activity: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}
