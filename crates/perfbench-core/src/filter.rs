//! Tag and name based test selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::case::TestCase;
use crate::error::{ConfigError, ConfigResult};

/// Token selecting every test case.
pub const WILDCARD: &str = "%";

/// Include or exclude specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum FilterSpec {
    /// Matches every test case.
    All,
    /// Matches when the name or any tag equals any entry.
    AnyOf(Vec<String>),
    /// Matches when every group has at least one entry equal to the name or a tag.
    AllOf(Vec<Vec<String>>),
}

impl FilterSpec {
    /// Interprets a JSON filter: `"%"`, a string, a list of strings, or a
    /// list of lists of strings.
    ///
    /// # Errors
    ///
    /// Deeper nesting, mixed levels and non-string entries are configuration
    /// errors.
    pub fn parse(value: &Value) -> ConfigResult<Self> {
        match value {
            Value::String(entry) if entry == WILDCARD => Ok(Self::All),
            Value::String(entry) => Ok(Self::AnyOf(vec![entry.clone()])),
            Value::Array(items) if items.iter().all(Value::is_string) => {
                Ok(Self::AnyOf(strings(items)?))
            }
            Value::Array(items) if items.iter().all(Value::is_array) => items
                .iter()
                .map(|group| strings(group.as_array().map(Vec::as_slice).unwrap_or_default()))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Self::AllOf),
            Value::Array(_) => Err(ConfigError::invalid_filter(
                "filter lists must contain only strings or only lists of strings",
            )),
            other => Err(ConfigError::invalid_filter(format!(
                "expected a string or a list, got `{other}`"
            ))),
        }
    }

    /// Whether `case` satisfies this specification.
    #[must_use]
    pub fn matches(&self, case: &TestCase) -> bool {
        match self {
            Self::All => true,
            Self::AnyOf(entries) => matches_any(case, entries),
            Self::AllOf(groups) => {
                !groups.is_empty() && groups.iter().all(|group| matches_any(case, group))
            }
        }
    }
}

fn strings(items: &[Value]) -> ConfigResult<Vec<String>> {
    items
        .iter()
        .map(|item| match item {
            Value::String(entry) => Ok(entry.clone()),
            Value::Array(_) => Err(ConfigError::invalid_filter(
                "filters support at most one level of nested lists",
            )),
            other => Err(ConfigError::invalid_filter(format!(
                "filter entries must be strings, got `{other}`"
            ))),
        })
        .collect()
}

fn matches_any(case: &TestCase, entries: &[String]) -> bool {
    entries
        .iter()
        .any(|entry| case.name == *entry || case.tags.contains(entry))
}

/// Decides whether `case` runs: it must match `include` and must not match `exclude`.
///
/// A list-of-lists exclusion drops the case only when every group matches.
#[must_use]
pub fn should_run(case: &TestCase, include: &FilterSpec, exclude: Option<&FilterSpec>) -> bool {
    include.matches(case) && !exclude.is_some_and(|spec| spec.matches(case))
}

impl TryFrom<Value> for FilterSpec {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FilterSpec> for Value {
    fn from(spec: FilterSpec) -> Self {
        match spec {
            FilterSpec::All => Value::String(WILDCARD.to_string()),
            FilterSpec::AnyOf(entries) => Value::from(entries),
            FilterSpec::AllOf(groups) => Value::Array(groups.into_iter().map(Value::from).collect()),
        }
    }
}

impl FromStr for FilterSpec {
    type Err = ConfigError;

    /// Accepts JSON (`["insert","remove"]`), the single-quoted list form
    /// (`['insert','remove']`), or a bare name/tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Self::parse(&value);
        }
        if trimmed.starts_with('[') {
            let value: Value = serde_json::from_str(&trimmed.replace('\'', "\""))
                .map_err(|err| ConfigError::invalid_filter(format!("`{trimmed}`: {err}")))?;
            return Self::parse(&value);
        }
        let bare = trimmed.trim_matches('\'');
        if bare.is_empty() {
            return Err(ConfigError::invalid_filter("empty filter"));
        }
        Self::parse(&Value::String(bare.to_string()))
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::from(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(name: &str, tags: &[&str]) -> TestCase {
        TestCase::new(name).with_tags(tags.iter().copied())
    }

    fn spec(value: Value) -> FilterSpec {
        FilterSpec::parse(&value).unwrap()
    }

    #[test]
    fn wildcard_selects_untagged_cases() {
        assert!(should_run(&case("Commands.nop", &[]), &FilterSpec::All, None));
    }

    #[test]
    fn flat_list_matches_name_or_tag() {
        let include = spec(json!(["insert", "Queries.Empty"]));
        assert!(should_run(&case("Insert.Empty", &["insert"]), &include, None));
        assert!(should_run(&case("Queries.Empty", &[]), &include, None));
        assert!(!should_run(&case("Update.Inc", &["update"]), &include, None));
    }

    #[test]
    fn untagged_case_needs_exact_name() {
        let include = spec(json!("regression"));
        assert!(!should_run(&case("Commands.nop", &[]), &include, None));
    }

    #[test]
    fn nested_groups_and_across_or_within() {
        let include = spec(json!([["a", "b"], ["c"]]));
        assert!(should_run(&case("t", &["b", "c"]), &include, None));
        assert!(!should_run(&case("t", &["b"]), &include, None));
        assert!(!should_run(&case("t", &["c"]), &include, None));
    }

    #[test]
    fn nested_exclusion_requires_every_group() {
        let exclude = spec(json!([["x"], ["y"]]));
        assert!(should_run(&case("t", &["x"]), &FilterSpec::All, Some(&exclude)));
        assert!(!should_run(&case("t", &["x", "y"]), &FilterSpec::All, Some(&exclude)));
    }

    #[test]
    fn flat_exclusion_drops_on_any_match() {
        let exclude = spec(json!(["slow", "Insert.Big"]));
        assert!(!should_run(&case("Insert.Big", &[]), &FilterSpec::All, Some(&exclude)));
        assert!(!should_run(&case("t", &["slow", "insert"]), &FilterSpec::All, Some(&exclude)));
        assert!(should_run(&case("t", &["insert"]), &FilterSpec::All, Some(&exclude)));
    }

    #[test]
    fn deeper_nesting_is_rejected() {
        assert!(FilterSpec::parse(&json!([[["a"]]])).is_err());
        assert!(FilterSpec::parse(&json!(["a", ["b"]])).is_err());
        assert!(FilterSpec::parse(&json!([1])).is_err());
        assert!(FilterSpec::parse(&json!({"tags": "a"})).is_err());
    }

    #[test]
    fn empty_group_list_matches_nothing() {
        let include = FilterSpec::AllOf(vec![]);
        assert!(!should_run(&case("t", &["a"]), &include, None));
    }

    #[test]
    fn parses_command_line_forms() {
        assert_eq!("%".parse::<FilterSpec>().unwrap(), FilterSpec::All);
        assert_eq!(
            "insert".parse::<FilterSpec>().unwrap(),
            FilterSpec::AnyOf(vec!["insert".into()])
        );
        assert_eq!(
            "'sanity'".parse::<FilterSpec>().unwrap(),
            FilterSpec::AnyOf(vec!["sanity".into()])
        );
        assert_eq!(
            "['insert','remove']".parse::<FilterSpec>().unwrap(),
            FilterSpec::AnyOf(vec!["insert".into(), "remove".into()])
        );
        assert_eq!(
            r#"[["core"],["insert","update"]]"#.parse::<FilterSpec>().unwrap(),
            FilterSpec::AllOf(vec![vec!["core".into()], vec!["insert".into(), "update".into()]])
        );
    }

    #[test]
    fn serde_round_trip_uses_plain_json() {
        let spec = FilterSpec::AllOf(vec![vec!["a".into()], vec!["b".into()]]);
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value, json!([["a"], ["b"]]));
        let back: FilterSpec = serde_json::from_value(value).unwrap();
        assert_eq!(back, spec);
    }
}
