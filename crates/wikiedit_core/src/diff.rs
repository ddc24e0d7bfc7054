use serde::Serialize;
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};

const CONTEXT_RADIUS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditSummary {
    pub changed: bool,
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub hash_before: String,
    pub hash_after: String,
    pub lines_added: usize,
    pub lines_removed: usize,
}

pub fn summarize_edit(before: &str, after: &str) -> EditSummary {
    let mut lines_added = 0usize;
    let mut lines_removed = 0usize;
    if before != after {
        let diff = TextDiff::from_lines(before, after);
        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => lines_added += 1,
                ChangeTag::Delete => lines_removed += 1,
                ChangeTag::Equal => {}
            }
        }
    }
    EditSummary {
        changed: before != after,
        bytes_before: before.len(),
        bytes_after: after.len(),
        hash_before: compute_hash(before),
        hash_after: compute_hash(after),
        lines_added,
        lines_removed,
    }
}

/// Unified diff with `a/<label>` and `b/<label>` headers. Empty when the texts
/// are identical.
pub fn unified_diff(before: &str, after: &str, label: &str) -> String {
    if before == after {
        return String::new();
    }
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}

pub fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{compute_hash, summarize_edit, unified_diff};

    #[test]
    fn unchanged_text_has_an_empty_summary() {
        let summary = summarize_edit("{{Video}}\n", "{{Video}}\n");
        assert!(!summary.changed);
        assert_eq!(summary.hash_before, summary.hash_after);
        assert_eq!(summary.lines_added, 0);
        assert_eq!(summary.lines_removed, 0);
        assert_eq!(unified_diff("same\n", "same\n", "page.wiki"), "");
    }

    #[test]
    fn summary_counts_changed_lines() {
        let before = "{{Video\n|fov = false\n|hdr = true\n}}\n";
        let after = "{{Video\n|fov = true\n|hdr = true\n|ray tracing = false\n}}\n";
        let summary = summarize_edit(before, after);
        assert!(summary.changed);
        assert_eq!(summary.lines_added, 2);
        assert_eq!(summary.lines_removed, 1);
        assert_eq!(summary.bytes_before, before.len());
        assert_ne!(summary.hash_before, summary.hash_after);
    }

    #[test]
    fn unified_diff_labels_both_sides() {
        let rendered = unified_diff("a\nb\n", "a\nc\n", "Page.wiki");
        assert!(rendered.starts_with("--- a/Page.wiki\n+++ b/Page.wiki\n"));
        assert!(rendered.contains("-b\n"));
        assert!(rendered.contains("+c\n"));
    }

    #[test]
    fn hash_is_sixteen_hex_chars() {
        let hash = compute_hash("wikitext");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
