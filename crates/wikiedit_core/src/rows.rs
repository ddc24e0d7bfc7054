use serde::{Deserialize, Serialize};

use crate::scanner::WikitextScanner;

/// One entry of a list-valued infobox parameter, rendered as
/// `{{Parent/row/<kind>|name|extra|key=value}}`. An empty `kind` renders the
/// bare `{{Parent/row|...}}` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowItem {
    #[serde(default)]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub extra: Option<String>,
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

impl RowItem {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// One row template per line. Items without a name are dropped, as are empty
/// `extra` values and empty named parameters.
pub fn format_nested_rows(parent: &str, items: &[RowItem]) -> String {
    items
        .iter()
        .filter(|item| !item.name.trim().is_empty())
        .map(|item| format_row(parent, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads `{{Parent/row...}}` entries back out of a parameter value.
///
/// The row name is parameter `1` and the extra is parameter `2`, resolved the
/// same way as any lookup: an explicit `1=` beats a bare positional value.
/// Rows that resolve to no name are skipped; there is no substring fallback.
pub fn parse_rows(text: &str, parent: &str) -> Vec<RowItem> {
    let scanner = WikitextScanner::new(text);
    let prefix = normalize_name(&format!("{}/row", parent.trim()));

    scanner
        .templates()
        .iter()
        .filter_map(|span| {
            let name = normalize_name(&scanner.template_name(span));
            let kind = row_kind(&name, &prefix)?;
            let row_name = scanner.find_parameter_in(span, "1")?.value;
            if row_name.is_empty() {
                return None;
            }
            let extra = scanner
                .find_parameter_in(span, "2")
                .map(|parameter| parameter.value)
                .filter(|value| !value.is_empty());
            let params = scanner
                .template_parameters(span)
                .into_iter()
                .filter(|parameter| {
                    !parameter.name.is_positional()
                        && !parameter.name.matches("1")
                        && !parameter.name.matches("2")
                })
                .map(|parameter| (parameter.name.as_key(), parameter.value))
                .collect();
            Some(RowItem {
                kind,
                name: row_name,
                extra,
                params,
            })
        })
        .collect()
}

fn format_row(parent: &str, item: &RowItem) -> String {
    let kind = item.kind.trim();
    let mut out = if kind.is_empty() {
        format!("{{{{{}/row", parent.trim())
    } else {
        format!("{{{{{}/row/{kind}", parent.trim())
    };
    // A bare value containing `=` would read back as a named parameter. Once
    // `1=` is explicit, the extra must be explicit too or it becomes positional 1.
    let name = item.name.trim();
    let explicit = name.contains('=');
    out.push('|');
    if explicit {
        out.push_str("1=");
    }
    out.push_str(name);
    if let Some(extra) = item.extra.as_deref().map(str::trim)
        && !extra.is_empty()
    {
        out.push('|');
        if explicit || extra.contains('=') {
            out.push_str("2=");
        }
        out.push_str(extra);
    }
    for (key, value) in &item.params {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        out.push_str(&format!("|{}={value}", key.trim()));
    }
    out.push_str("}}");
    out
}

fn row_kind(name: &str, prefix: &str) -> Option<String> {
    let head = name.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &name[prefix.len()..];
    if rest.is_empty() {
        return Some(String::new());
    }
    rest.strip_prefix('/').map(|kind| kind.trim().to_string())
}

fn normalize_name(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{RowItem, format_nested_rows, parse_rows};

    #[test]
    fn format_nested_rows_skips_empty_fields() {
        let items = vec![
            RowItem::new("developer", "Valve"),
            RowItem::new("developer", "Hidden Path")
                .with_extra("Windows")
                .with_param("ref", ""),
            RowItem::new("developer", "  "),
            RowItem::new("porter", "Aspyr")
                .with_extra(" ")
                .with_param("ref", "<ref>x</ref>"),
        ];
        assert_eq!(
            format_nested_rows("Infobox game", &items),
            "{{Infobox game/row/developer|Valve}}\n{{Infobox game/row/developer|Hidden Path|Windows}}\n{{Infobox game/row/porter|Aspyr|ref=<ref>x</ref>}}"
        );
        assert_eq!(format_nested_rows("Infobox game", &[]), "");
    }

    #[test]
    fn bare_row_form_when_kind_is_empty() {
        let items = vec![RowItem::new("", "Steam").with_extra("123")];
        assert_eq!(
            format_nested_rows("Availability", &items),
            "{{Availability/row|Steam|123}}"
        );
    }

    #[test]
    fn parse_rows_reads_back_formatted_rows() {
        let items = vec![
            RowItem::new("developer", "Valve"),
            RowItem::new("porter", "Aspyr")
                .with_extra("macOS")
                .with_param("ref", "x"),
        ];
        let rendered = format_nested_rows("Infobox game", &items);
        assert_eq!(parse_rows(&rendered, "Infobox game"), items);
    }

    #[test]
    fn values_containing_equals_use_explicit_indices() {
        let items = vec![
            RowItem::new("", "a=b").with_extra("x"),
            RowItem::new("", "Plain").with_extra("k=v"),
        ];
        let rendered = format_nested_rows("Availability", &items);
        assert_eq!(
            rendered,
            "{{Availability/row|1=a=b|2=x}}\n{{Availability/row|Plain|2=k=v}}"
        );
        assert_eq!(parse_rows(&rendered, "Availability"), items);
    }

    #[test]
    fn parse_rows_prefers_explicit_indices_and_filters_parents() {
        let text = "\n{{Availability/row|1=Steam|2=123|drm=Steam}}\n{{Availability_row|ignored}}\n{{availability/row|GOG|456}}\n{{Other/row|x}}\n{{Availability/row|Skip|1=Epic}}\n";
        let rows = parse_rows(text, "Availability");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "Steam");
        assert_eq!(rows[0].extra.as_deref(), Some("123"));
        assert_eq!(rows[0].params, vec![("drm".to_string(), "Steam".to_string())]);
        assert_eq!(rows[1].name, "GOG");
        assert_eq!(rows[1].kind, "");
        assert_eq!(rows[2].name, "Epic");
        assert_eq!(rows[2].extra, None);
    }
}
