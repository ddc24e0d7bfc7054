use serde::Serialize;

/// One `{{...}}` construct, half-open byte range `[start, end)` into the buffer.
///
/// Spans are only valid for the buffer they were located in. Any mutation of
/// the scanner invalidates every span returned before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSpan {
    pub start: usize,
    pub end: usize,
    pub content: String,
}

impl TemplateSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamName {
    Named(String),
    Positional(usize),
}

impl ParamName {
    /// Named keys compare trimmed and case-insensitively; positional parameters
    /// match the decimal form of their 1-based index.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        match self {
            Self::Named(key) => key.trim().to_lowercase() == query.to_lowercase(),
            Self::Positional(index) => query.parse::<usize>().ok() == Some(*index),
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            Self::Named(key) => key.clone(),
            Self::Positional(index) => index.to_string(),
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, Self::Positional(_))
    }
}

/// A `|name=value` segment. `start` sits on the leading pipe and `end` stops
/// before the following pipe or the closing `}}`. The raw value region is
/// `[value_start, value_end)`; `value` holds its trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSpan {
    pub start: usize,
    pub end: usize,
    pub value_start: usize,
    pub value_end: usize,
    pub name: ParamName,
    pub value: String,
}

/// Body of a `==Header==` region. `start` is just after the header line,
/// `end` just before the line break preceding the next header of the same or
/// shallower level (or end of text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionSpan {
    pub start: usize,
    pub end: usize,
    pub content: String,
    pub title: String,
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionHeader {
    /// Header text matched case-insensitively.
    Literal(String),
    /// Regex fragment embedded into the header-line pattern.
    Pattern(String),
}

impl SectionHeader {
    pub fn literal(title: impl Into<String>) -> Self {
        Self::Literal(title.into())
    }

    pub fn pattern(fragment: impl Into<String>) -> Self {
        Self::Pattern(fragment.into())
    }

    pub fn literal_title(&self) -> Option<&str> {
        match self {
            Self::Literal(title) => Some(title.as_str()),
            Self::Pattern(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ParamName, SectionHeader};

    #[test]
    fn named_keys_match_trimmed_and_case_insensitive() {
        let name = ParamName::Named(" Direct3D Notes ".to_string());
        assert!(name.matches("direct3d notes"));
        assert!(name.matches("  DIRECT3D NOTES"));
        assert!(!name.matches("direct3d"));
    }

    #[test]
    fn positional_matches_decimal_index_only() {
        let name = ParamName::Positional(2);
        assert!(name.matches("2"));
        assert!(name.matches(" 2 "));
        assert!(!name.matches("1"));
        assert!(!name.matches("two"));
        assert_eq!(name.as_key(), "2");
        assert!(name.is_positional());
    }

    #[test]
    fn section_header_exposes_literal_title() {
        assert_eq!(
            SectionHeader::literal("Video").literal_title(),
            Some("Video")
        );
        assert_eq!(SectionHeader::pattern("Vid.*").literal_title(), None);
    }
}
