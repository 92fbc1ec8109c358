/// Tag and path filtering for the thumbnail grid
///
/// `accepts` is the whole engine: a pure function of an item's tags and the
/// active filter set. `PathPattern` is the free-text box next to it.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use crate::state::{Scalar, TagSet};

/// One accepted value of a predicate
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FilterValue {
    /// The key exists, whatever its value
    Present,
    /// The key does not exist
    Missing,
    Is(Scalar),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FilterPredicate {
    key: String,
    accepted: BTreeSet<FilterValue>,
}

impl FilterPredicate {
    pub fn new(key: impl Into<String>, accepted: impl IntoIterator<Item = FilterValue>) -> Self {
        Self {
            key: key.into(),
            accepted: accepted.into_iter().collect(),
        }
    }

    /// Satisfied when the key holds any of `values`
    pub fn values<V: Into<Scalar>>(key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(key, values.into_iter().map(|v| FilterValue::Is(v.into())))
    }

    /// Satisfied whenever the key exists
    pub fn presence(key: impl Into<String>) -> Self {
        Self::new(key, [FilterValue::Present])
    }

    /// Satisfied when the key does not exist
    pub fn missing(key: impl Into<String>) -> Self {
        Self::new(key, [FilterValue::Missing])
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn accepted(&self) -> &BTreeSet<FilterValue> {
        &self.accepted
    }

    pub fn is_presence_only(&self) -> bool {
        self.accepted.len() == 1 && self.accepted.contains(&FilterValue::Present)
    }

    /// An absent key counts as the single value `Missing`
    pub fn matches(&self, tags: &TagSet) -> bool {
        if !tags.contains_key(&self.key) {
            return self.accepted.contains(&FilterValue::Missing);
        }
        if self.accepted.contains(&FilterValue::Present) {
            return true;
        }
        let values = tags.values(&self.key);
        self.accepted
            .iter()
            .any(|accepted| matches!(accepted, FilterValue::Is(value) if values.contains(value)))
    }
}

/// Parse the command-line form: `key` (presence), `!key` (missing),
/// `key=a,b` (any of the values). Integers and booleans are typed.
impl FromStr for FilterPredicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(key) = s.strip_prefix('!') {
            if key.is_empty() {
                return Err("empty filter key".to_string());
            }
            return Ok(Self::missing(key));
        }

        let Some((key, values)) = s.split_once('=') else {
            if s.is_empty() {
                return Err("empty filter key".to_string());
            }
            return Ok(Self::presence(s));
        };

        if key.is_empty() {
            return Err(format!("missing key in filter '{}'", s));
        }
        let values: Vec<Scalar> = values.split(',').map(parse_scalar).collect();
        Ok(Self::values(key, values))
    }
}

fn parse_scalar(raw: &str) -> Scalar {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Scalar::Int(value);
    }
    // Words like `inf` and `nan` stay text
    if raw.contains(|c: char| c.is_ascii_digit()) {
        if let Ok(value) = raw.parse::<f64>() {
            return Scalar::from(value);
        }
    }
    match raw {
        "true" => Scalar::Bool(true),
        "false" => Scalar::Bool(false),
        _ => Scalar::Text(raw.to_string()),
    }
}

/// How predicates combine
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

/// Ordered set of predicates, at most one per key
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveFilterSet {
    predicates: Vec<FilterPredicate>,
    mode: MatchMode,
}

impl ActiveFilterSet {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            predicates: Vec::new(),
            mode,
        }
    }

    /// Add a predicate. One for the same key is replaced in place.
    pub fn insert(&mut self, predicate: FilterPredicate) {
        match self.predicates.iter_mut().find(|p| p.key == predicate.key) {
            Some(existing) => *existing = predicate,
            None => self.predicates.push(predicate),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FilterPredicate> {
        let index = self.predicates.iter().position(|p| p.key == key)?;
        Some(self.predicates.remove(index))
    }

    pub fn clear(&mut self) {
        self.predicates.clear();
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MatchMode) {
        self.mode = mode;
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterPredicate> {
        self.predicates.iter()
    }
}

impl FromIterator<FilterPredicate> for ActiveFilterSet {
    fn from_iter<I: IntoIterator<Item = FilterPredicate>>(iter: I) -> Self {
        let mut set = ActiveFilterSet::default();
        for predicate in iter {
            set.insert(predicate);
        }
        set
    }
}

/// Whether an item with `tags` passes `filters`. No filters, no restriction.
pub fn accepts(tags: &TagSet, filters: &ActiveFilterSet) -> bool {
    if filters.is_empty() {
        return true;
    }
    match filters.mode {
        MatchMode::All => filters.predicates.iter().all(|p| p.matches(tags)),
        MatchMode::Any => filters.predicates.iter().any(|p| p.matches(tags)),
    }
}

/// Case-insensitive regular expression over item paths
#[derive(Debug, Clone, Default)]
pub struct PathPattern {
    regex: Option<Regex>,
}

impl PathPattern {
    /// An empty pattern matches everything
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        if pattern.is_empty() {
            return Ok(Self::default());
        }
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { regex: Some(regex) })
    }

    /// Replace the pattern. An invalid one leaves the current pattern in place.
    pub fn set(&mut self, pattern: &str) -> Result<(), regex::Error> {
        *self = Self::new(pattern)?;
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_ref().map(Regex::as_str).unwrap_or("")
    }

    pub fn matches(&self, path: &Path) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(&path.to_string_lossy()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> TagSet {
        TagSet::new()
            .with("task", "comp")
            .with("labels", vec![Scalar::from("hero"), Scalar::from("night")])
            .with("rating", 4i64)
    }

    fn set(mode: MatchMode, predicates: Vec<FilterPredicate>) -> ActiveFilterSet {
        let mut set = ActiveFilterSet::new(mode);
        for p in predicates {
            set.insert(p);
        }
        set
    }

    #[test]
    fn test_empty_filter_set_accepts_everything() {
        assert!(accepts(&TagSet::new(), &ActiveFilterSet::default()));
        assert!(accepts(&tags(), &ActiveFilterSet::new(MatchMode::Any)));
    }

    #[test]
    fn test_missing_key_fails_value_and_presence_predicates() {
        let empty = TagSet::new();
        assert!(!accepts(&empty, &set(MatchMode::All, vec![FilterPredicate::values("k", ["v"])])));
        assert!(!accepts(&empty, &set(MatchMode::All, vec![FilterPredicate::presence("k")])));
        assert!(accepts(&empty, &set(MatchMode::All, vec![FilterPredicate::missing("k")])));
    }

    #[test]
    fn test_multi_valued_intersection() {
        let filters = set(MatchMode::All, vec![FilterPredicate::values("labels", ["night", "day"])]);
        assert!(accepts(&tags(), &filters));

        let filters = set(MatchMode::All, vec![FilterPredicate::values("labels", ["day"])]);
        assert!(!accepts(&tags(), &filters));
    }

    #[test]
    fn test_presence_ignores_value() {
        let filters = set(MatchMode::All, vec![FilterPredicate::presence("rating")]);
        assert!(accepts(&tags(), &filters));
        assert!(filters.iter().next().unwrap().is_presence_only());
    }

    #[test]
    fn test_all_versus_any() {
        let predicates = vec![
            FilterPredicate::values("task", ["comp"]),
            FilterPredicate::values("rating", [5i64]),
        ];
        assert!(!accepts(&tags(), &set(MatchMode::All, predicates.clone())));
        assert!(accepts(&tags(), &set(MatchMode::Any, predicates)));

        let neither = vec![
            FilterPredicate::values("task", ["paint"]),
            FilterPredicate::values("rating", [5i64]),
        ];
        assert!(!accepts(&tags(), &set(MatchMode::Any, neither)));
    }

    #[test]
    fn test_order_does_not_matter() {
        let a = FilterPredicate::values("task", ["comp"]);
        let b = FilterPredicate::presence("missing_key");
        for mode in [MatchMode::All, MatchMode::Any] {
            let forward = set(mode, vec![a.clone(), b.clone()]);
            let backward = set(mode, vec![b.clone(), a.clone()]);
            assert_eq!(accepts(&tags(), &forward), accepts(&tags(), &backward));
        }
    }

    #[test]
    fn test_insert_replaces_same_key() {
        let mut filters = ActiveFilterSet::new(MatchMode::All);
        filters.insert(FilterPredicate::values("task", ["paint"]));
        filters.insert(FilterPredicate::presence("rating"));
        filters.insert(FilterPredicate::values("task", ["comp"]));

        assert_eq!(filters.len(), 2);
        assert_eq!(filters.iter().next().unwrap().key(), "task");
        assert!(accepts(&tags(), &filters));
    }

    #[test]
    fn test_parse_command_line_form() {
        let p: FilterPredicate = "rating=4,5".parse().unwrap();
        assert_eq!(p, FilterPredicate::values("rating", [4i64, 5]));

        let p: FilterPredicate = "task".parse().unwrap();
        assert!(p.is_presence_only());

        let p: FilterPredicate = "!approved".parse().unwrap();
        assert_eq!(p, FilterPredicate::missing("approved"));

        assert!("=x".parse::<FilterPredicate>().is_err());
    }

    #[test]
    fn test_fractional_values_match_float_tags() {
        let p: FilterPredicate = "rating=4.5,nan".parse().unwrap();
        assert_eq!(
            p,
            FilterPredicate::values("rating", [Scalar::from(4.5), Scalar::from("nan")])
        );

        let graded = TagSet::new().with("rating", 4.5);
        let filters = set(MatchMode::All, vec![p]);
        assert!(accepts(&graded, &filters));
        assert!(!accepts(&tags(), &filters));
    }

    #[test]
    fn test_path_pattern() {
        let pattern = PathPattern::new("sh0[12]0").unwrap();
        assert!(pattern.matches(Path::new("/show/SH010/plate.exr")));
        assert!(!pattern.matches(Path::new("/show/sh030/plate.exr")));
        assert!(PathPattern::default().matches(Path::new("/anything")));

        let mut pattern = PathPattern::new("hero").unwrap();
        assert!(pattern.set("(unclosed").is_err());
        assert_eq!(pattern.as_str(), "hero");
    }
}
