use regex::{Regex, RegexBuilder};
use tracing::{debug, trace};

use crate::markup::custom_header_fragment;
use crate::span::{ParamName, ParameterSpan, SectionHeader, SectionSpan, TemplateSpan};

/// Depth-aware locator and mutator over a single owned wikitext buffer.
///
/// There is no persistent tree: every lookup re-derives positions from the
/// current text, and every mutation swaps in a freshly spliced `String`.
/// Spans handed out by one call must not be reused after a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WikitextScanner {
    text: String,
}

impl WikitextScanner {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// First (leftmost, outermost) template whose name matches `name`
    /// case-insensitively, treating spaces and underscores as equivalent.
    /// Unterminated occurrences are skipped rather than given a guessed end.
    pub fn find_template(&self, name: &str) -> Option<TemplateSpan> {
        let opening = template_opening_regex(name)?;
        self.find_template_from(&opening, 0)
    }

    /// Every top-level occurrence of `name`. Occurrences nested inside an
    /// earlier match are not reported separately.
    pub fn find_templates(&self, name: &str) -> Vec<TemplateSpan> {
        let Some(opening) = template_opening_regex(name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = 0usize;
        while let Some(span) = self.find_template_from(&opening, cursor) {
            cursor = span.end;
            out.push(span);
        }
        out
    }

    /// Every top-level `{{...}}` construct, left to right, regardless of name.
    pub fn templates(&self) -> Vec<TemplateSpan> {
        let bytes = self.text.as_bytes();
        let mut out = Vec::new();
        let mut cursor = 0usize;
        while let Some(offset) = self.text[cursor..].find("{{") {
            let start = cursor + offset;
            match matching_close(bytes, start) {
                Some(end) => {
                    out.push(self.template_span(start, end));
                    cursor = end;
                }
                None => cursor = start + 2,
            }
        }
        out
    }

    /// Name text of a located template: everything between `{{` and the first
    /// depth-zero pipe (or the closing braces), trimmed.
    pub fn template_name(&self, template: &TemplateSpan) -> String {
        let content = template.content.as_str();
        let inner_end = content.len().saturating_sub(2);
        let name_end = depth_zero_pipes(content, 2, inner_end)
            .first()
            .copied()
            .unwrap_or(inner_end);
        content.get(2..name_end).unwrap_or("").trim().to_string()
    }

    /// All parameters of one template instance in document order.
    pub fn template_parameters(&self, template: &TemplateSpan) -> Vec<ParameterSpan> {
        let content = template.content.as_str();
        let inner_end = content.len().saturating_sub(2);
        let pipes = depth_zero_pipes(content, 2, inner_end);

        let mut out = Vec::with_capacity(pipes.len());
        let mut positional = 0usize;
        for (index, pipe) in pipes.iter().copied().enumerate() {
            let segment_end = pipes.get(index + 1).copied().unwrap_or(inner_end);
            let segment = &content[pipe + 1..segment_end];
            let (name, value_offset) = match named_key(segment) {
                Some((key, equals)) => (ParamName::Named(key), equals + 1),
                None => {
                    positional += 1;
                    (ParamName::Positional(positional), 0)
                }
            };
            let value_start = pipe + 1 + value_offset;
            out.push(ParameterSpan {
                start: template.start + pipe,
                end: template.start + segment_end,
                value_start: template.start + value_start,
                value_end: template.start + segment_end,
                name,
                value: content[value_start..segment_end].trim().to_string(),
            });
        }
        out
    }

    pub fn find_parameter(&self, template: &str, param: &str) -> Option<ParameterSpan> {
        let span = self.find_template(template)?;
        self.find_parameter_in(&span, param)
    }

    /// Instance-scoped lookup. An explicitly named key (including `1=`) wins
    /// over an implicit positional parameter with the same index.
    pub fn find_parameter_in(&self, template: &TemplateSpan, param: &str) -> Option<ParameterSpan> {
        let mut positional_match = None;
        for parameter in self.template_parameters(template) {
            if !parameter.name.matches(param) {
                continue;
            }
            if !parameter.name.is_positional() {
                return Some(parameter);
            }
            if positional_match.is_none() {
                positional_match = Some(parameter);
            }
        }
        positional_match
    }

    pub fn parameter_value(&self, template: &str, param: &str) -> Option<String> {
        self.find_parameter(template, param)
            .map(|parameter| parameter.value)
    }

    /// First instance of `name` whose `selector_param` holds `selector_value`
    /// (trimmed, case-insensitive). Used for templates repeated per context,
    /// such as one requirements block per operating system.
    pub fn find_template_instance(
        &self,
        name: &str,
        selector_param: &str,
        selector_value: &str,
    ) -> Option<TemplateSpan> {
        let wanted = selector_value.trim().to_lowercase();
        self.find_templates(name).into_iter().find(|span| {
            self.find_parameter_in(span, selector_param)
                .is_some_and(|parameter| parameter.value.to_lowercase() == wanted)
        })
    }

    pub fn find_section(&self, header: &SectionHeader) -> Option<SectionSpan> {
        let regex = section_header_regex(header)?;
        let captures = regex.captures(&self.text)?;
        let whole = captures.get(0)?;
        let level = captures.name("open").map_or(2, |open| open.as_str().len());
        let title = captures
            .name("heading")
            .map(|heading| heading.as_str().trim().to_string())
            .unwrap_or_default();

        let start = line_break_end(&self.text, whole.end());
        let end = section_end(&self.text, start, level);
        Some(SectionSpan {
            start,
            end,
            content: self.text[start..end].to_string(),
            title,
            level,
        })
    }

    /// Sets a parameter, preserving the structural whitespace of its old value.
    /// `None` is a no-op. A missing parameter is inserted; a missing template
    /// leaves the text untouched. Returns whether the buffer changed.
    pub fn set_parameter<'a>(
        &mut self,
        template: &str,
        param: &str,
        value: impl Into<Option<&'a str>>,
    ) -> bool {
        let Some(value) = value.into() else {
            return false;
        };
        let Some(span) = self.find_template(template) else {
            debug!(template, param, "set_parameter skipped: template not found");
            return false;
        };
        self.set_parameter_in(&span, param, value)
    }

    pub fn set_parameter_in(&mut self, template: &TemplateSpan, param: &str, value: &str) -> bool {
        let Some(existing) = self.find_parameter_in(template, param) else {
            return self.insert_parameter_in(template, param, value);
        };
        let raw = &self.text[existing.value_start..existing.value_end];
        let replacement = restyle_value(raw, value);
        if replacement == raw {
            return false;
        }
        trace!(param, "replacing parameter value");
        self.splice(existing.value_start, existing.value_end, &replacement);
        true
    }

    /// Appends `|name = value` just before the closing braces, on its own line.
    pub fn insert_parameter<'a>(
        &mut self,
        template: &str,
        param: &str,
        value: impl Into<Option<&'a str>>,
    ) -> bool {
        let Some(value) = value.into() else {
            return false;
        };
        let Some(span) = self.find_template(template) else {
            debug!(template, param, "insert_parameter skipped: template not found");
            return false;
        };
        self.insert_parameter_in(&span, param, value)
    }

    pub fn insert_parameter_in(&mut self, template: &TemplateSpan, param: &str, value: &str) -> bool {
        let closing = template.end - 2;
        let line = parameter_line(param, value);

        // A closing `}}` on its own (possibly indented) line stays there.
        let line_start = self.text[..closing].rfind('\n').map_or(0, |index| index + 1);
        let at_line_start = line_start > template.start
            && self.text[line_start..closing]
                .chars()
                .all(|ch| ch == ' ' || ch == '\t');

        let mut insertion = String::with_capacity(line.len() + 2);
        let insert_at = if at_line_start {
            insertion.push_str(&line);
            if !line.ends_with('\n') {
                insertion.push_str(line_ending_before(&self.text, line_start));
            }
            line_start
        } else {
            insertion.push('\n');
            insertion.push_str(&line);
            closing
        };
        trace!(param, "inserting parameter");
        self.splice(insert_at, insert_at, &insertion);
        true
    }

    pub fn remove_parameter(&mut self, template: &str, param: &str) -> bool {
        let Some(span) = self.find_template(template) else {
            return false;
        };
        self.remove_parameter_in(&span, param)
    }

    pub fn remove_parameter_in(&mut self, template: &TemplateSpan, param: &str) -> bool {
        let Some(parameter) = self.find_parameter_in(template, param) else {
            return false;
        };
        self.splice(parameter.start, parameter.end, "");
        true
    }

    /// Deletes the first matching template plus one trailing line break, then
    /// collapses any resulting run of 3+ newlines.
    pub fn remove_template(&mut self, name: &str) -> bool {
        let Some(span) = self.find_template(name) else {
            return false;
        };
        let end = line_break_end(&self.text, span.end);
        self.splice(span.start, end, "");
        self.text = clean_newlines(&self.text);
        true
    }

    /// Replaces a list-style value wholesale, wrapping non-blank content in
    /// leading/trailing line breaks so rows sit on their own lines.
    pub fn replace_parameter_content(&mut self, template: &str, param: &str, content: &str) -> bool {
        let Some(span) = self.find_template(template) else {
            debug!(template, param, "replace_parameter_content skipped: template not found");
            return false;
        };
        let Some(existing) = self.find_parameter_in(&span, param) else {
            if content.trim().is_empty() {
                return false;
            }
            return self.insert_parameter_in(&span, param, &wrap_block(content));
        };

        let raw = &self.text[existing.value_start..existing.value_end];
        let replacement = if content.trim().is_empty() {
            restyle_value(raw, "")
        } else {
            wrap_block(content)
        };
        if replacement == raw {
            return false;
        }
        self.splice(existing.value_start, existing.value_end, &replacement);
        true
    }

    /// Splices `content` into an existing section body, or appends a new
    /// `== Title ==` block. The title comes from `default_title`, falling back
    /// to a literal header; a pattern header without a default cannot append.
    pub fn replace_section(
        &mut self,
        header: &SectionHeader,
        content: &str,
        default_title: Option<&str>,
    ) -> bool {
        if let Some(section) = self.find_section(header) {
            let mut body = trim_line_breaks(content).to_string();
            if section.content.ends_with('\n') && !body.is_empty() {
                body.push('\n');
            }
            return self.replace_section_body(&section, &body);
        }

        let Some(title) = default_title.or_else(|| header.literal_title()) else {
            debug!(?header, "replace_section skipped: no title to append");
            return false;
        };
        self.text = append_section(&self.text, title, content);
        true
    }

    /// Writes `body` verbatim between the bounds of a located section. The
    /// body is moved off the header line when the header ends the text, and
    /// gets a closing line break when another header follows.
    pub fn replace_section_body(&mut self, section: &SectionSpan, body: &str) -> bool {
        let mut replacement = String::with_capacity(body.len() + 2);
        if !body.is_empty() && !self.text[..section.start].ends_with('\n') {
            replacement.push('\n');
        }
        replacement.push_str(body);
        // An empty body ends where the next header line begins.
        let runs_into_header = section.end < self.text.len()
            && !self.text[section.end..].starts_with(['\r', '\n']);
        if runs_into_header && !replacement.is_empty() && !replacement.ends_with('\n') {
            replacement.push('\n');
        }
        if replacement == section.content {
            return false;
        }
        self.splice(section.start, section.end, &replacement);
        true
    }

    /// Like `replace_section`, but tolerant of bold-wrapped and
    /// underscore-spelled custom headers.
    pub fn replace_custom_section(&mut self, title: &str, content: &str) -> bool {
        let header = SectionHeader::pattern(custom_header_fragment(title));
        self.replace_section(&header, content, Some(title))
    }

    fn find_template_from(&self, opening: &Regex, from: usize) -> Option<TemplateSpan> {
        let bytes = self.text.as_bytes();
        let mut cursor = from;
        loop {
            let found = opening.find_at(&self.text, cursor)?;
            if ends_template_name(&self.text[found.end()..]) {
                match matching_close(bytes, found.start()) {
                    Some(end) => return Some(self.template_span(found.start(), end)),
                    None => debug!(start = found.start(), "unterminated template skipped"),
                }
            }
            cursor = found.start() + 2;
        }
    }

    fn template_span(&self, start: usize, end: usize) -> TemplateSpan {
        TemplateSpan {
            start,
            end,
            content: self.text[start..end].to_string(),
        }
    }

    fn splice(&mut self, start: usize, end: usize, replacement: &str) {
        let mut next = String::with_capacity(self.text.len() - (end - start) + replacement.len());
        next.push_str(&self.text[..start]);
        next.push_str(replacement);
        next.push_str(&self.text[end..]);
        self.text = next;
    }
}

/// Collapses every run of three or more line breaks into exactly two. `\r\n`
/// counts as a single break.
pub fn clean_newlines(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut run = 0usize;
    let mut rest = text;
    while let Some(ch) = rest.chars().next() {
        let unit = if rest.starts_with("\r\n") {
            "\r\n"
        } else {
            &rest[..ch.len_utf8()]
        };
        rest = &rest[unit.len()..];
        if unit.ends_with('\n') {
            run += 1;
            if run > 2 {
                continue;
            }
        } else {
            run = 0;
        }
        output.push_str(unit);
    }
    output
}

/// Byte offsets in `[from, to)` of pipes that sit outside any nested
/// `{{ }}` or `[[ ]]` construct.
pub(crate) fn depth_zero_pipes(text: &str, from: usize, to: usize) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut braces = 0usize;
    let mut brackets = 0usize;
    let mut index = from;
    while index < to {
        let pair = if index + 1 < to {
            Some((bytes[index], bytes[index + 1]))
        } else {
            None
        };
        match pair {
            Some((b'{', b'{')) => {
                braces += 1;
                index += 2;
                continue;
            }
            Some((b'}', b'}')) if braces > 0 => {
                braces -= 1;
                index += 2;
                continue;
            }
            Some((b'[', b'[')) => {
                brackets += 1;
                index += 2;
                continue;
            }
            Some((b']', b']')) if brackets > 0 => {
                brackets -= 1;
                index += 2;
                continue;
            }
            _ => {}
        }
        if bytes[index] == b'|' && braces == 0 && brackets == 0 {
            out.push(index);
        }
        index += 1;
    }
    out
}

/// End offset (exclusive) of the `{{` construct opening at `start`, or `None`
/// when the braces never balance.
fn matching_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut index = start;
    while index + 1 < bytes.len() {
        match (bytes[index], bytes[index + 1]) {
            (b'{', b'{') => {
                depth += 1;
                index += 2;
            }
            (b'}', b'}') if depth > 0 => {
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

fn template_opening_regex(name: &str) -> Option<Regex> {
    let words = name
        .split([' ', '_'])
        .filter(|word| !word.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>();
    if words.is_empty() {
        return None;
    }
    let pattern = format!(r"\{{\{{\s*{}", words.join("[ _]+"));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(error) => {
            debug!(name, %error, "template name did not compile");
            None
        }
    }
}

/// The matched name must be the whole name: `Infobox game` does not match
/// `{{Infobox game/row/developer}}`.
fn ends_template_name(rest: &str) -> bool {
    rest.trim_start().starts_with(['|', '}'])
}

fn section_header_regex(header: &SectionHeader) -> Option<Regex> {
    let (fragment, case_insensitive) = match header {
        SectionHeader::Literal(title) => (regex::escape(title.trim()), true),
        SectionHeader::Pattern(pattern) => (pattern.clone(), false),
    };
    let pattern =
        format!(r"(?m)^(?P<open>={{2,}})[ \t]*(?P<heading>(?:{fragment}))[ \t]*={{2,}}[ \t\r]*$");
    match RegexBuilder::new(&pattern)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(error) => {
            debug!(?header, %error, "section header pattern rejected");
            None
        }
    }
}

fn named_key(segment: &str) -> Option<(String, usize)> {
    let equals = segment.find('=')?;
    let key = &segment[..equals];
    if key.is_empty()
        || !key
            .chars()
            .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-' || ch.is_whitespace())
    {
        return None;
    }
    Some((key.trim().to_string(), equals))
}

/// Leading horizontal whitespace and the trailing line-break run of a raw value.
fn structural_whitespace(raw: &str) -> (&str, &str) {
    let leading_len = raw.len() - raw.trim_start_matches([' ', '\t']).len();
    let content_end = raw.trim_end().len().max(leading_len);
    let tail = &raw[content_end..];
    let trailing = tail.find(['\r', '\n']).map_or("", |index| &tail[index..]);
    (&raw[..leading_len], trailing)
}

fn restyle_value(raw: &str, value: &str) -> String {
    let (leading, trailing) = structural_whitespace(raw);
    if value.trim().is_empty() {
        if raw.trim().is_empty() {
            return raw.to_string();
        }
        return format!("{leading}{trailing}");
    }
    if starts_with_line_break(value) {
        format!("{}{trailing}", value.trim_end())
    } else {
        format!("{leading}{}{trailing}", value.trim())
    }
}

fn parameter_line(param: &str, value: &str) -> String {
    let name = param.trim();
    if starts_with_line_break(value) {
        format!("|{name}={}", value.trim_end_matches([' ', '\t']))
    } else {
        format!("|{name} = {}", value.trim())
    }
}

fn wrap_block(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 2);
    if !starts_with_line_break(content) {
        out.push('\n');
    }
    out.push_str(content);
    if !content.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn starts_with_line_break(value: &str) -> bool {
    value.starts_with('\n') || value.starts_with("\r\n")
}

fn trim_line_breaks(value: &str) -> &str {
    value.trim_matches(['\r', '\n'])
}

/// `\r\n` when the line ending just before `line_start` is CRLF.
fn line_ending_before(text: &str, line_start: usize) -> &'static str {
    if text[..line_start].ends_with("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Offset just past a single line break at `at`, or `at` itself.
fn line_break_end(text: &str, at: usize) -> usize {
    let rest = &text[at..];
    if rest.starts_with("\r\n") {
        at + 2
    } else if rest.starts_with('\n') {
        at + 1
    } else {
        at
    }
}

fn header_level(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    if !trimmed.starts_with('=') || !trimmed.ends_with('=') {
        return None;
    }
    let leading = trimmed.bytes().take_while(|byte| *byte == b'=').count();
    if leading == trimmed.len() {
        return None;
    }
    Some(leading)
}

fn section_end(text: &str, start: usize, level: usize) -> usize {
    let mut line_start = start;
    while line_start < text.len() {
        let line_end = text[line_start..]
            .find('\n')
            .map_or(text.len(), |offset| line_start + offset);
        if header_level(&text[line_start..line_end]).is_some_and(|found| found <= level) {
            return if line_start == start {
                start
            } else {
                line_start - 1
            };
        }
        line_start = line_end + 1;
    }
    text.len()
}

fn append_section(text: &str, title: &str, content: &str) -> String {
    let mut out = text.trim_end_matches(['\r', '\n']).to_string();
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(&format!("== {} ==\n", title.trim()));
    let body = trim_line_breaks(content);
    if !body.is_empty() {
        out.push_str(body);
        out.push('\n');
    }
    out
}
