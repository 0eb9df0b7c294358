//! Free-text fact parsing: `activity[@category][, description]` with `#tag`
//! tokens anywhere after the activity name.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::FactDraft;

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"(?:^|\s)#([^\s#,]+)").expect("valid tag pattern"))
}

/// Parse a fact description. Never fails; an empty activity is reported as
/// such and left for storage to reject.
pub fn parse_fact(input: &str) -> FactDraft {
    let mut tags: Vec<String> = Vec::new();
    for cap in tag_pattern().captures_iter(input) {
        let tag = cap[1].to_string();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    let stripped = tag_pattern().replace_all(input, "");

    let (head, description) = match stripped.split_once(',') {
        Some((head, rest)) => (head, Some(rest)),
        None => (stripped.as_ref(), None),
    };

    let (activity, category) = match head.split_once('@') {
        Some((activity, category)) => (activity, Some(category)),
        None => (head, None),
    };

    FactDraft {
        activity: activity.trim().to_string(),
        category: non_empty(category),
        description: non_empty(description),
        tags,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_parts_present() {
        let draft = parse_fact("coding@work, reviewing the ipc layer #rust #review");
        assert_eq!(draft.activity, "coding");
        assert_eq!(draft.category.as_deref(), Some("work"));
        assert_eq!(draft.description.as_deref(), Some("reviewing the ipc layer"));
        assert_eq!(draft.tags, vec!["rust", "review"]);
    }

    #[test]
    fn test_activity_only() {
        let draft = parse_fact("  Lunch ");
        assert_eq!(draft.activity, "Lunch");
        assert_eq!(draft.category, None);
        assert_eq!(draft.description, None);
        assert!(draft.tags.is_empty());
    }

    #[test]
    fn test_tags_keep_first_appearance_order() {
        let draft = parse_fact("reading #b #a #b, chapter two #c");
        assert_eq!(draft.activity, "reading");
        assert_eq!(draft.description.as_deref(), Some("chapter two"));
        assert_eq!(draft.tags, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty_category_and_description_are_absent() {
        let draft = parse_fact("walk@, ");
        assert_eq!(draft.activity, "walk");
        assert_eq!(draft.category, None);
        assert_eq!(draft.description, None);
    }

    #[test]
    fn test_hash_inside_word_is_not_a_tag() {
        let draft = parse_fact("learn c#, basics");
        assert_eq!(draft.activity, "learn c#");
        assert!(draft.tags.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_fact("").activity, "");
    }
}
