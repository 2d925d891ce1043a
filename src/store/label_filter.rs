//! Label / Filter Utility (spec §4.5): pure functions over candidate id
//! lists. The collector only ever emits labels; only the (out-of-core-scope)
//! API plane filters by them, but the utility lives in `store` because it
//! operates on the same id lists the store's `list_metas` query produces.

use serde::{Deserialize, Serialize};

/// How a label filter combines with the running candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Condition {
    And,
    Or,
}

impl Condition {
    /// Unrecognized condition strings default to OR, per spec §4.5.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "AND" => Condition::And,
            _ => Condition::Or,
        }
    }
}

/// One `(key, value, condition)` label filter term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelFilter {
    pub key: String,
    pub value: String,
    pub condition: Condition,
}

impl LabelFilter {
    /// Combines two candidate id lists per this filter's condition.
    pub fn apply(&self, a: &[String], b: &[String]) -> Vec<String> {
        match self.condition {
            Condition::And => intersect(a, b),
            Condition::Or => union(a, b),
        }
    }
}

/// Order-preserving union: every id in `a`, then every id in `b` not already
/// present in `a`.
pub fn union(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = a.to_vec();
    let mut seen: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for v in a {
        *seen.entry(v.as_str()).or_insert(0) += 1;
    }
    for v in b {
        if !seen.contains_key(v.as_str()) {
            out.push(v.clone());
        }
    }
    out
}

/// Multiset-aware intersection: an id from `b` survives only if it appears
/// in `a` *exactly once* — mirrors the original's `Intersect`, which treats a
/// duplicate in the first list as disqualifying rather than multiplying the
/// match.
pub fn intersect(a: &[String], b: &[String]) -> Vec<String> {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for v in a {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    b.iter()
        .filter(|v| counts.get(v.as_str()) == Some(&1))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn union_preserves_first_list_order_then_appends_new() {
        let a = vs(&["a", "b"]);
        let b = vs(&["b", "c"]);
        assert_eq!(union(&a, &b), vs(&["a", "b", "c"]));
    }

    #[test]
    fn intersect_is_multiset_aware() {
        let a = vs(&["a", "b", "c", "a"]);
        let b = vs(&["a", "c", "d"]);
        assert_eq!(intersect(&a, &b), vs(&["a", "c"]));
    }

    #[test]
    fn unrecognized_condition_defaults_to_or() {
        assert_eq!(Condition::parse("bogus"), Condition::Or);
        assert_eq!(Condition::parse("and"), Condition::And);
    }

    #[test]
    fn filter_apply_dispatches_on_condition() {
        let filter = LabelFilter {
            key: "env".to_string(),
            value: "prod".to_string(),
            condition: Condition::And,
        };
        let a = vs(&["1", "2"]);
        let b = vs(&["2", "3"]);
        assert_eq!(filter.apply(&a, &b), vs(&["2"]));
    }
}
