//! Best-effort recognizers for markup the depth-aware scanner does not model:
//! bold-wrapped custom headers, file links and `<gallery>` blocks.
//!
//! Nothing here is relied on for brace balance. Callers get a plain string or
//! a list of targets back and feed it through the scanner like any other edit.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::scanner::depth_zero_pipes;

const FILE_NAMESPACES: [&str; 2] = ["File", "Image"];

static GALLERY_RE: OnceLock<Regex> = OnceLock::new();

fn gallery_regex() -> &'static Regex {
    GALLERY_RE.get_or_init(|| {
        Regex::new(r"(?is)(?P<open><gallery\b[^>]*>)(?P<body>.*?)</gallery\s*>")
            .expect("gallery pattern must compile")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLink {
    pub start: usize,
    pub end: usize,
    pub target: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryBlock {
    pub start: usize,
    pub end: usize,
    pub open_tag: String,
    pub body: String,
}

/// Section-header fragment for user-named sections. Accepts `'''Title'''`
/// wrapping and treats spaces and underscores alike.
pub fn custom_header_fragment(title: &str) -> String {
    let words = title
        .split([' ', '_'])
        .filter(|word| !word.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>();
    format!(
        r"(?i:(?:''')?[ \t]*{}[ \t]*(?:''')?)",
        words.join("[ _]+")
    )
}

/// `[[File:...]]` and `[[Image:...]]` links in document order. Captions may
/// contain their own links and templates.
pub fn file_links(text: &str) -> Vec<FileLink> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while let Some(offset) = text[cursor..].find("[[") {
        let start = cursor + offset;
        let Some(end) = matching_bracket_close(text.as_bytes(), start) else {
            cursor = start + 2;
            continue;
        };
        let inner = &text[start + 2..end - 2];
        match parse_file_link(inner) {
            Some((target, options)) => {
                out.push(FileLink {
                    start,
                    end,
                    target,
                    options,
                });
                cursor = end;
            }
            None => cursor = start + 2,
        }
    }
    out
}

pub fn find_gallery(text: &str) -> Option<GalleryBlock> {
    let captures = gallery_regex().captures(text)?;
    let whole = captures.get(0)?;
    Some(GalleryBlock {
        start: whole.start(),
        end: whole.end(),
        open_tag: captures.name("open")?.as_str().to_string(),
        body: captures.name("body")?.as_str().to_string(),
    })
}

/// File entries of the first gallery, without namespace prefix or caption.
pub fn gallery_files(text: &str) -> Vec<String> {
    let Some(block) = find_gallery(text) else {
        return Vec::new();
    };
    block
        .body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("<!--"))
        .filter_map(|line| {
            let name = line.split('|').next().unwrap_or("").trim();
            let name = strip_file_namespace(name).unwrap_or(name).trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

pub fn render_gallery(files: &[String]) -> String {
    render_gallery_with(files, "<gallery>")
}

/// Rewrites the first gallery's entries, keeping its opening tag. An empty
/// list removes the block; a missing block is appended.
pub fn replace_gallery(text: &str, files: &[String]) -> String {
    match find_gallery(text) {
        Some(block) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..block.start]);
            if files.is_empty() {
                let rest = &text[block.end..];
                out.push_str(rest.strip_prefix('\n').unwrap_or(rest));
            } else {
                out.push_str(&render_gallery_with(files, &block.open_tag));
                out.push_str(&text[block.end..]);
            }
            out
        }
        None if files.is_empty() => text.to_string(),
        None => {
            let mut out = text.trim_end_matches('\n').to_string();
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&render_gallery(files));
            out
        }
    }
}

fn render_gallery_with(files: &[String], open_tag: &str) -> String {
    let mut out = String::from(open_tag);
    out.push('\n');
    for file in files {
        let entry = file.trim();
        if entry.is_empty() {
            continue;
        }
        if strip_file_namespace(entry).is_none() {
            out.push_str("File:");
        }
        out.push_str(entry);
        out.push('\n');
    }
    out.push_str("</gallery>");
    out
}

fn parse_file_link(inner: &str) -> Option<(String, Vec<String>)> {
    let pipes = depth_zero_pipes(inner, 0, inner.len());
    let target_end = pipes.first().copied().unwrap_or(inner.len());
    let target = strip_file_namespace(inner[..target_end].trim())?
        .trim()
        .to_string();
    if target.is_empty() {
        return None;
    }
    let options = pipes
        .iter()
        .enumerate()
        .map(|(index, pipe)| {
            let end = pipes.get(index + 1).copied().unwrap_or(inner.len());
            inner[pipe + 1..end].trim().to_string()
        })
        .collect();
    Some((target, options))
}

fn strip_file_namespace(value: &str) -> Option<&str> {
    let (prefix, rest) = value.split_once(':')?;
    FILE_NAMESPACES
        .iter()
        .any(|namespace| prefix.trim().eq_ignore_ascii_case(namespace))
        .then_some(rest)
}

fn matching_bracket_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut index = start;
    while index + 1 < bytes.len() {
        match (bytes[index], bytes[index + 1]) {
            (b'[', b'[') => {
                depth += 1;
                index += 2;
            }
            (b']', b']') if depth > 0 => {
                depth -= 1;
                index += 2;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => index += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::{custom_header_fragment, file_links, find_gallery, gallery_files, replace_gallery};

    #[test]
    fn custom_header_fragment_accepts_bold_and_underscores() {
        let regex = Regex::new(&format!("^{}$", custom_header_fragment("Essential improvements")))
            .expect("fragment compiles");
        assert!(regex.is_match("Essential improvements"));
        assert!(regex.is_match("'''essential_improvements'''"));
        assert!(!regex.is_match("Essential"));

        let escaped = Regex::new(&format!("^{}$", custom_header_fragment("C++ (notes)")))
            .expect("escaped fragment compiles");
        assert!(escaped.is_match("C++ (notes)"));
    }

    #[test]
    fn file_links_handle_nested_caption_links() {
        let text = "Intro [[File:Shot 1.png|thumb|A [[Link|caption]] here]] and [[Other page]] [[image:b.jpg]]";
        let links = file_links(text);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "Shot 1.png");
        assert_eq!(links[0].options, vec!["thumb", "A [[Link|caption]] here"]);
        assert_eq!(&text[links[0].start..links[0].end], "[[File:Shot 1.png|thumb|A [[Link|caption]] here]]");
        assert_eq!(links[1].target, "b.jpg");
        assert!(links[1].options.is_empty());
    }

    #[test]
    fn gallery_files_strip_namespace_and_caption() {
        let text = "Before\n<Gallery mode=\"packed\">\nFile:a.png|First\nb.png\n\nImage:c.png\n</gallery>\nAfter";
        let block = find_gallery(text).expect("gallery");
        assert_eq!(block.open_tag, "<Gallery mode=\"packed\">");
        assert_eq!(gallery_files(text), vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn replace_gallery_rewrites_removes_and_appends() {
        let text = "Before\n<gallery mode=\"packed\">\nFile:a.png\n</gallery>\nAfter";
        let rewritten = replace_gallery(text, &["b.png".to_string(), "File:c.png|Cap".to_string()]);
        assert_eq!(
            rewritten,
            "Before\n<gallery mode=\"packed\">\nFile:b.png\nFile:c.png|Cap\n</gallery>\nAfter"
        );

        assert_eq!(replace_gallery(text, &[]), "Before\nAfter");
        assert_eq!(replace_gallery("Plain\n", &[]), "Plain\n");
        assert_eq!(
            replace_gallery("Plain\n", &["x.png".to_string()]),
            "Plain\n<gallery>\nFile:x.png\n</gallery>"
        );
    }
}
