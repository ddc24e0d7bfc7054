use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured record handed to mapping-driven updates.
pub type FieldData = serde_json::Map<String, Value>;

/// Ordered `(data key, wikitext parameter)` pairs. Order is the order writes
/// are applied in, which is also the order new parameters get inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    entries: Vec<(String, String)>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, P>(pairs: impl IntoIterator<Item = (K, P)>) -> Self
    where
        K: Into<String>,
        P: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(key, param)| (key.into(), param.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, param: impl Into<String>) {
        self.entries.push((key.into(), param.into()));
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter writes for `data`, in mapping order. Keys missing from the
    /// record or holding `null` produce nothing.
    pub fn resolve(&self, data: &FieldData) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter_map(|(key, param)| {
                let value = field_value(data.get(key)?)?;
                Some((param.clone(), value))
            })
            .collect()
    }
}

/// Wikitext rendering of a JSON field. Arrays join their scalar items with
/// `", "`; nested objects have no rendering.
pub fn field_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Object(_) => None,
        Value::Array(items) => Some(
            items
                .iter()
                .filter(|item| !item.is_array())
                .filter_map(field_value)
                .filter(|item| !item.trim().is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        scalar => scalar_text(scalar),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(text.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FieldData, FieldMapping, field_value};

    fn record(value: serde_json::Value) -> FieldData {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn field_value_renders_scalars_and_lists() {
        assert_eq!(field_value(&json!(null)), None);
        assert_eq!(field_value(&json!(true)).as_deref(), Some("true"));
        assert_eq!(field_value(&json!(false)).as_deref(), Some("false"));
        assert_eq!(field_value(&json!(60)).as_deref(), Some("60"));
        assert_eq!(field_value(&json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(field_value(&json!("hackable")).as_deref(), Some("hackable"));
        assert_eq!(
            field_value(&json!(["Windows", "", 10, null, "Linux"])).as_deref(),
            Some("Windows, 10, Linux")
        );
        assert_eq!(field_value(&json!([])).as_deref(), Some(""));
        assert_eq!(field_value(&json!({"a": 1})), None);
    }

    #[test]
    fn resolve_follows_mapping_order_and_skips_absent_keys() {
        let mapping = FieldMapping::from_pairs([
            ("fieldOfView", "fov"),
            ("fieldOfViewNotes", "fov notes"),
            ("hdr", "hdr"),
        ]);
        let data = record(json!({
            "hdr": false,
            "fieldOfView": "hackable",
            "fieldOfViewNotes": null,
            "unmapped": "x"
        }));
        assert_eq!(
            mapping.resolve(&data),
            vec![
                ("fov".to_string(), "hackable".to_string()),
                ("hdr".to_string(), "false".to_string()),
            ]
        );
        assert_eq!(mapping.len(), 3);
    }

    #[test]
    fn push_appends_to_the_end() {
        let mut mapping = FieldMapping::new();
        assert!(mapping.is_empty());
        mapping.push("a", "param a");
        mapping.push("b", "param b");
        assert_eq!(mapping.entries()[1], ("b".to_string(), "param b".to_string()));
    }
}
