//! Wildcard topic-filter trie (component A, spec §4.1).
//!
//! Indexed by filter tokens split on `/`. `+` matches exactly one level;
//! `#` matches the remaining levels (including zero) and is only legal
//! as the final token.

mod single;
pub use single::filter_matches;

use std::collections::{HashMap, HashSet};

const SINGLE_LEVEL: &str = "+";
const MULTI_LEVEL: &str = "#";

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    plus_child: Option<Box<Node>>,
    hash_tokens: HashSet<String>,
    tokens: HashSet<String>,
}

impl Node {
    fn new() -> Self {
        Self::default()
    }
}

/// The matcher owns both the trie and a reverse index so `remove` can be
/// O(1) given only the token, per spec §9 ("Matcher token identity").
#[derive(Debug, Default)]
pub struct Matcher {
    root: Node,
    token_filters: HashMap<String, String>,
}

fn split_filter(filter: &str) -> Vec<&str> {
    filter.split('/').collect()
}

impl Matcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` under `filter`. A duplicate `(filter, token)`
    /// pair is a no-op, matching spec §4.1.
    pub fn add(&mut self, filter: &str, token: &str) {
        if let Some(existing) = self.token_filters.get(token) {
            if existing == filter {
                return;
            }
            self.remove(token);
        }

        let parts = split_filter(filter);
        let mut node = &mut self.root;
        for (i, part) in parts.iter().enumerate() {
            let is_last = i == parts.len() - 1;
            if *part == MULTI_LEVEL && is_last {
                node.hash_tokens.insert(token.to_string());
                self.token_filters.insert(token.to_string(), filter.to_string());
                return;
            }
            if *part == SINGLE_LEVEL {
                node = node.plus_child.get_or_insert_with(|| Box::new(Node::new()));
            } else {
                node = node
                    .children
                    .entry((*part).to_string())
                    .or_insert_with(Node::new);
            }
        }
        node.tokens.insert(token.to_string());
        self.token_filters.insert(token.to_string(), filter.to_string());
    }

    /// Removes a previously added token, identified by value equality.
    pub fn remove(&mut self, token: &str) {
        let Some(filter) = self.token_filters.remove(token) else {
            return;
        };
        let parts = split_filter(&filter);
        remove_recursive(&mut self.root, &parts, token);
    }

    /// Returns every distinct token whose filter matches `topic`.
    #[must_use]
    pub fn match_topic(&self, topic: &str) -> HashSet<String> {
        let parts: Vec<&str> = topic.split('/').collect();
        let mut out = HashSet::new();
        match_recursive(&self.root, &parts, &mut out);
        out
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token_filters.is_empty()
    }
}

fn remove_recursive(node: &mut Node, parts: &[&str], token: &str) {
    if parts.is_empty() {
        return;
    }
    let (part, rest) = (parts[0], &parts[1..]);
    let is_last = rest.is_empty();

    if part == MULTI_LEVEL && is_last {
        node.hash_tokens.remove(token);
        return;
    }
    if part == SINGLE_LEVEL {
        if let Some(child) = node.plus_child.as_mut() {
            if is_last {
                child.tokens.remove(token);
            } else {
                remove_recursive(child, rest, token);
            }
        }
        return;
    }
    if let Some(child) = node.children.get_mut(part) {
        if is_last {
            child.tokens.remove(token);
        } else {
            remove_recursive(child, rest, token);
        }
    }
}

fn match_recursive(node: &Node, parts: &[&str], out: &mut HashSet<String>) {
    // `#` at this level swallows everything from here down, zero levels
    // included.
    out.extend(node.hash_tokens.iter().cloned());

    let Some((head, rest)) = parts.split_first() else {
        // Topic exhausted at this node: exact-match tokens apply.
        out.extend(node.tokens.iter().cloned());
        return;
    };

    if let Some(child) = node.children.get(*head) {
        match_recursive(child, rest, out);
    }
    // `+` matches exactly one non-empty level; an empty level (e.g. the
    // middle segment of topic "a//c") matches no `+` token.
    if !head.is_empty() {
        if let Some(plus) = node.plus_child.as_ref() {
            match_recursive(plus, rest, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Matcher;

    #[test]
    fn exact_match() {
        let mut m = Matcher::new();
        m.add("a/b/c", "t1");
        assert_eq!(m.match_topic("a/b/c"), ["t1".to_string()].into());
        assert!(m.match_topic("a/b/d").is_empty());
    }

    #[test]
    fn plus_matches_one_level() {
        let mut m = Matcher::new();
        m.add("a/+/c", "t1");
        assert_eq!(m.match_topic("a/b/c"), ["t1".to_string()].into());
        assert!(m.match_topic("a/b/x/c").is_empty());
        assert!(m.match_topic("a/c").is_empty());
    }

    #[test]
    fn hash_matches_zero_or_more_trailing_levels() {
        let mut m = Matcher::new();
        m.add("a/#", "t1");
        assert_eq!(m.match_topic("a"), ["t1".to_string()].into());
        assert_eq!(m.match_topic("a/b"), ["t1".to_string()].into());
        assert_eq!(m.match_topic("a/b/c"), ["t1".to_string()].into());
        assert!(m.match_topic("x/b").is_empty());
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut m = Matcher::new();
        m.add("a/b", "t1");
        m.add("a/b", "t1");
        assert_eq!(m.match_topic("a/b").len(), 1);
    }

    #[test]
    fn remove_is_idempotent_and_scoped_to_token() {
        let mut m = Matcher::new();
        m.add("a/b", "t1");
        m.add("a/b", "t2");
        m.remove("t1");
        m.remove("t1");
        assert_eq!(m.match_topic("a/b"), ["t2".to_string()].into());
    }

    #[test]
    fn each_token_at_most_once_even_via_multiple_paths() {
        let mut m = Matcher::new();
        m.add("a/+", "t1");
        m.add("a/b", "t1");
        assert_eq!(m.match_topic("a/b"), ["t1".to_string()].into());
    }

    #[test]
    fn plus_does_not_match_empty_level() {
        let mut m = Matcher::new();
        m.add("a/+/c", "t1");
        assert!(m.match_topic("a//c").is_empty());
    }

    #[test]
    fn reregistering_token_under_new_filter_moves_it() {
        let mut m = Matcher::new();
        m.add("a/b", "t1");
        m.add("a/c", "t1");
        assert!(m.match_topic("a/b").is_empty());
        assert_eq!(m.match_topic("a/c"), ["t1".to_string()].into());
    }
}
