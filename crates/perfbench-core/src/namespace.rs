//! Namespace placeholder expansion for operation templates.
//!
//! Declarations refer to their target collection through textual tokens
//! (`#B_COLL`, `#B_NS`, `#B_DB`). This module is the only place that inspects
//! those strings; everything else works with prepared operations.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::collection::CollectionHandle;
use crate::error::{ConfigError, ConfigResult};

/// Prefix shared by every namespace placeholder.
pub const PLACEHOLDER_PREFIX: &str = "#B_";

/// Field holding an operation's target namespace.
pub const NAMESPACE_FIELD: &str = "ns";

/// Field whose presence marks a command-shaped operation.
pub const COMMAND_FIELD: &str = "command";

/// Namespace placeholder recognised inside operation templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Short name of the target collection.
    Collection,
    /// Fully qualified `db.collection` namespace.
    Namespace,
    /// Name of the target database.
    Database,
}

impl Placeholder {
    const ALL: [Self; 3] = [Self::Collection, Self::Namespace, Self::Database];

    /// Literal token as written in declarations.
    #[must_use]
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Collection => "#B_COLL",
            Self::Namespace => "#B_NS",
            Self::Database => "#B_DB",
        }
    }

    /// Splits `value` into a placeholder and its literal suffix.
    ///
    /// Returns `Ok(None)` for strings that do not start with the reserved prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPlaceholder`] when the prefix is present but
    /// no token matches.
    pub fn split(value: &str) -> ConfigResult<Option<(Self, &str)>> {
        if !value.starts_with(PLACEHOLDER_PREFIX) {
            return Ok(None);
        }
        Self::ALL
            .iter()
            .find_map(|placeholder| {
                value
                    .strip_prefix(placeholder.token())
                    .map(|suffix| (*placeholder, suffix))
            })
            .map(Some)
            .ok_or_else(|| ConfigError::UnknownPlaceholder {
                token: value.to_string(),
            })
    }

    /// Concrete value this placeholder stands for in `collection`.
    #[must_use]
    pub fn expand(&self, collection: &CollectionHandle) -> String {
        match self {
            Self::Collection => collection.name().to_string(),
            Self::Namespace => collection.full_namespace(),
            Self::Database => collection.database_name().to_string(),
        }
    }
}

/// Resolves a single template string against `collection`.
///
/// The token is replaced and any trailing text is kept, so `"#B_COLL_meta"`
/// becomes `"foo0_meta"`.
///
/// # Errors
///
/// Fails on strings with the reserved prefix that match no token.
pub fn resolve<'a>(template: &'a str, collection: &CollectionHandle) -> ConfigResult<Cow<'a, str>> {
    match Placeholder::split(template)? {
        Some((placeholder, suffix)) => {
            let mut resolved = placeholder.expand(collection);
            resolved.push_str(suffix);
            Ok(Cow::Owned(resolved))
        }
        None => Ok(Cow::Borrowed(template)),
    }
}

/// Substitutes every placeholder inside `value` in place.
///
/// Mappings are visited recursively. Inside sequences only nested mappings and
/// sequences are visited; scalar elements are left untouched.
///
/// # Errors
///
/// Fails on the first unresolvable placeholder.
pub fn substitute(value: &mut Value, collection: &CollectionHandle) -> ConfigResult<()> {
    match value {
        Value::Object(map) => substitute_map(map, collection),
        Value::Array(items) => substitute_items(items, collection),
        _ => Ok(()),
    }
}

fn substitute_map(map: &mut Map<String, Value>, collection: &CollectionHandle) -> ConfigResult<()> {
    for field in map.values_mut() {
        match field {
            Value::String(text) => {
                if let Some((placeholder, suffix)) = Placeholder::split(text)? {
                    let resolved = format!("{}{suffix}", placeholder.expand(collection));
                    *text = resolved;
                }
            }
            Value::Object(nested) => substitute_map(nested, collection)?,
            Value::Array(items) => substitute_items(items, collection)?,
            _ => {}
        }
    }
    Ok(())
}

fn substitute_items(items: &mut [Value], collection: &CollectionHandle) -> ConfigResult<()> {
    for item in items {
        match item {
            Value::Object(nested) => substitute_map(nested, collection)?,
            Value::Array(inner) => substitute_items(inner, collection)?,
            _ => {}
        }
    }
    Ok(())
}

/// Checks that every placeholder reachable by [`substitute`] is resolvable.
///
/// Used at declaration-load time so that bad templates fail before any trial.
///
/// # Errors
///
/// Fails on the first unknown placeholder.
pub fn validate(value: &Value) -> ConfigResult<()> {
    match value {
        Value::Object(map) => {
            for field in map.values() {
                match field {
                    Value::String(text) => {
                        Placeholder::split(text)?;
                    }
                    nested @ (Value::Object(_) | Value::Array(_)) => validate(nested)?,
                    _ => {}
                }
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter()
            .filter(|item| item.is_object() || item.is_array())
            .try_for_each(validate),
        _ => Ok(()),
    }
}

/// Produces a private, fully resolved copy of `operation` for `collection`.
///
/// When the operation carries no namespace, one is assigned: the database
/// name for command-shaped operations, the full namespace otherwise.
///
/// # Errors
///
/// Fails when the operation is not a mapping or holds an unknown placeholder.
pub fn prepare(operation: &Value, collection: &CollectionHandle) -> ConfigResult<Value> {
    let Value::Object(template) = operation else {
        return Err(ConfigError::InvalidOperation(format!(
            "expected a mapping, got `{operation}`"
        )));
    };

    let mut prepared = template.clone();
    substitute_map(&mut prepared, collection)?;

    let has_namespace = match prepared.get(NAMESPACE_FIELD) {
        None | Some(Value::Null) => false,
        Some(Value::String(ns)) => !ns.is_empty(),
        Some(_) => true,
    };
    if !has_namespace {
        let target = if is_command(&prepared) {
            collection.database_name().to_string()
        } else {
            collection.full_namespace()
        };
        prepared.insert(NAMESPACE_FIELD.to_string(), Value::String(target));
    }

    Ok(Value::Object(prepared))
}

fn is_command(operation: &Map<String, Value>) -> bool {
    !matches!(
        operation.get(COMMAND_FIELD),
        None | Some(Value::Null) | Some(Value::Bool(false))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn foo() -> CollectionHandle {
        CollectionHandle::new("test0", "foo0")
    }

    #[test]
    fn resolves_each_token() {
        let coll = foo();
        assert_eq!(resolve("#B_COLL", &coll).unwrap(), "foo0");
        assert_eq!(resolve("#B_NS", &coll).unwrap(), "test0.foo0");
        assert_eq!(resolve("#B_DB", &coll).unwrap(), "test0");
        assert_eq!(resolve("plain", &coll).unwrap(), "plain");
    }

    #[test]
    fn keeps_suffix_after_token() {
        let coll = foo();
        assert_eq!(resolve("#B_COLL_lookup", &coll).unwrap(), "foo0_lookup");
    }

    #[test]
    fn unknown_token_is_fatal() {
        let err = resolve("#B_TABLE", &foo()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPlaceholder { token } if token == "#B_TABLE"));
    }

    #[test]
    fn prepare_recurses_into_nested_mappings() {
        let op = json!({
            "op": "command",
            "ns": "#B_DB",
            "command": {
                "aggregate": "#B_COLL",
                "pipeline": [{"$lookup": {"from": "#B_COLL_other"}}],
            },
        });
        let prepared = prepare(&op, &foo()).unwrap();
        assert_eq!(prepared["ns"], "test0");
        assert_eq!(prepared["command"]["aggregate"], "foo0");
        assert_eq!(prepared["command"]["pipeline"][0]["$lookup"]["from"], "foo0_other");
    }

    #[test]
    fn scalar_sequence_elements_are_not_expanded() {
        let op = json!({"op": "insert", "doc": {"names": ["#B_COLL"]}});
        let prepared = prepare(&op, &foo()).unwrap();
        assert_eq!(prepared["doc"]["names"][0], "#B_COLL");
    }

    #[test]
    fn missing_namespace_defaults_by_shape() {
        let coll = foo();
        let insert = prepare(&json!({"op": "insert", "doc": {}}), &coll).unwrap();
        assert_eq!(insert["ns"], "test0.foo0");

        let command = prepare(&json!({"op": "command", "command": {"ping": 1}}), &coll).unwrap();
        assert_eq!(command["ns"], "test0");

        let empty = prepare(&json!({"op": "query", "ns": ""}), &coll).unwrap();
        assert_eq!(empty["ns"], "test0.foo0");
    }

    #[test]
    fn template_is_left_untouched() {
        let template = json!({"op": "query", "query": {"coll": "#B_COLL"}});
        let _ = prepare(&template, &foo()).unwrap();
        assert_eq!(template["query"]["coll"], "#B_COLL");
        assert!(template.get("ns").is_none());
    }

    #[test]
    fn non_mapping_operation_is_rejected() {
        assert!(matches!(
            prepare(&json!("insert"), &foo()),
            Err(ConfigError::InvalidOperation(_))
        ));
    }

    #[test]
    fn validate_reports_unknown_tokens() {
        assert!(validate(&json!({"a": [{"b": "#B_NS"}]})).is_ok());
        assert!(validate(&json!({"a": [{"b": "#B_WHAT"}]})).is_err());
        assert!(validate(&json!({"a": ["#B_WHAT"]})).is_ok());
    }
}
