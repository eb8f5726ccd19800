//! Single filter-vs-topic comparison, used where building a trie would
//! be overkill: `lookupRetained` checks one subscriber filter against
//! every retained topic.

#[must_use]
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let filter_parts: Vec<&str> = filter.split('/').collect();
    let topic_parts: Vec<&str> = topic.split('/').collect();
    matches_parts(&filter_parts, &topic_parts)
}

fn matches_parts(filter: &[&str], topic: &[&str]) -> bool {
    match (filter.first(), topic.first()) {
        (Some(&"#"), _) => true,
        (Some(&"+"), Some(_)) => matches_parts(&filter[1..], &topic[1..]),
        (Some(&"+"), None) => false,
        (Some(f), Some(t)) => *f == *t && matches_parts(&filter[1..], &topic[1..]),
        (Some(_), None) => false,
        (None, None) => true,
        (None, Some(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::filter_matches;

    #[test]
    fn exact() {
        assert!(filter_matches("a/b", "a/b"));
        assert!(!filter_matches("a/b", "a/c"));
    }

    #[test]
    fn plus() {
        assert!(filter_matches("a/+/c", "a/b/c"));
        assert!(!filter_matches("a/+/c", "a/b/x/c"));
    }

    #[test]
    fn hash() {
        assert!(filter_matches("home/#", "home/temp"));
        assert!(filter_matches("home/#", "home"));
        assert!(!filter_matches("home/#", "office/temp"));
    }
}
