use tracing::{debug, trace};

use crate::fields::{FieldData, FieldMapping};
use crate::markup::{custom_header_fragment, render_gallery, replace_gallery};
use crate::rows::{self, RowItem};
use crate::scanner::WikitextScanner;
use crate::span::{SectionHeader, SectionSpan};

/// Schema-aware edits composed from scanner primitives.
///
/// The editor owns exactly one scanner. Edits the scanner cannot express as a
/// single splice are computed as a new string and the scanner is rebuilt from
/// it, so no second copy of the page can drift out of sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageEditor {
    scanner: WikitextScanner,
}

impl PageEditor {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            scanner: WikitextScanner::new(text),
        }
    }

    pub fn scanner(&self) -> &WikitextScanner {
        &self.scanner
    }

    pub fn text(&self) -> &str {
        self.scanner.text()
    }

    pub fn into_text(self) -> String {
        self.scanner.into_text()
    }

    /// Appends an empty `{{Name}}` when the template is absent.
    pub fn ensure_template(&mut self, name: &str) -> bool {
        if name.trim().is_empty() || self.scanner.find_template(name).is_some() {
            return false;
        }
        let mut text = self.scanner.text().to_string();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!("{{{{{}}}}}", name.trim()));
        debug!(template = name, "created missing template");
        self.rebuild(text);
        true
    }

    /// Toggles a parameterless marker template. Active flags are prepended to
    /// the page; an existing flag only has its description updated.
    /// Deactivating removes every instance.
    pub fn set_flag(&mut self, name: &str, active: bool, description: Option<&str>) -> bool {
        if name.trim().is_empty() {
            return false;
        }
        if !active {
            let mut removed = false;
            while self.scanner.remove_template(name) {
                removed = true;
            }
            return removed;
        }

        let description = description.map(str::trim).filter(|text| !text.is_empty());
        if let Some(span) = self.scanner.find_template(name) {
            let Some(description) = description else {
                return false;
            };
            if self.scanner.find_parameter_in(&span, "1").is_some() {
                return self.scanner.set_parameter_in(&span, "1", description);
            }
            let closing = span.end - 2;
            let text = self.scanner.text();
            let next = format!("{}|{description}{}", &text[..closing], &text[closing..]);
            self.rebuild(next);
            return true;
        }

        let flag = match description {
            Some(description) => format!("{{{{{}|{description}}}}}", name.trim()),
            None => format!("{{{{{}}}}}", name.trim()),
        };
        let current = self.scanner.text();
        let next = if current.is_empty() {
            flag
        } else {
            format!("{flag}\n{current}")
        };
        debug!(template = name, "prepended flag");
        self.rebuild(next);
        true
    }

    pub fn format_nested_rows(&self, parent: &str, items: &[RowItem]) -> String {
        rows::format_nested_rows(parent, items)
    }

    /// Applies a field mapping to the first instance of `template`. The
    /// template is created only when at least one mapped value is non-blank,
    /// and blank values never add parameters that are not already there.
    /// Returns the number of parameters that changed.
    pub fn update_section(&mut self, template: &str, data: &FieldData, mapping: &FieldMapping) -> usize {
        let writes = mapping.resolve(data);
        if self.scanner.find_template(template).is_none() {
            if !has_content(&writes) {
                debug!(template, "nothing to write; template left absent");
                return 0;
            }
            self.ensure_template(template);
        }

        let mut changed = 0usize;
        for (param, value) in &writes {
            let Some(span) = self.scanner.find_template(template) else {
                break;
            };
            if value.trim().is_empty() && self.scanner.find_parameter_in(&span, param).is_none() {
                continue;
            }
            if self.scanner.set_parameter_in(&span, param, value) {
                changed += 1;
            }
        }
        trace!(template, changed, "update_section applied");
        changed
    }

    /// Like `update_section`, scoped to the instance whose `selector_param`
    /// equals `selector_value`. A missing instance is created after the last
    /// existing one (or at the end) when there is data to write.
    pub fn update_template_instance(
        &mut self,
        template: &str,
        selector_param: &str,
        selector_value: &str,
        data: &FieldData,
        mapping: &FieldMapping,
    ) -> usize {
        let selector = selector_param.trim().to_lowercase();
        let writes = mapping
            .resolve(data)
            .into_iter()
            .filter(|(param, _)| param.trim().to_lowercase() != selector)
            .collect::<Vec<_>>();

        if self
            .scanner
            .find_template_instance(template, selector_param, selector_value)
            .is_none()
        {
            if !has_content(&writes) {
                return 0;
            }
            self.append_instance(template, selector_param, selector_value);
        }

        let mut changed = 0usize;
        for (param, value) in &writes {
            let Some(span) =
                self.scanner
                    .find_template_instance(template, selector_param, selector_value)
            else {
                break;
            };
            if value.trim().is_empty() && self.scanner.find_parameter_in(&span, param).is_none() {
                continue;
            }
            if self.scanner.set_parameter_in(&span, param, value) {
                changed += 1;
            }
        }
        changed
    }

    /// Replaces a list-valued parameter with one row template per item.
    pub fn set_rows(&mut self, template: &str, param: &str, parent: &str, items: &[RowItem]) -> bool {
        let content = rows::format_nested_rows(parent, items);
        if self.scanner.find_template(template).is_none() {
            if content.is_empty() {
                return false;
            }
            self.ensure_template(template);
        }
        self.scanner
            .replace_parameter_content(template, param, &content)
    }

    pub fn rows(&self, template: &str, param: &str, parent: &str) -> Vec<RowItem> {
        self.scanner
            .find_parameter(template, param)
            .map(|parameter| rows::parse_rows(&parameter.value, parent))
            .unwrap_or_default()
    }

    pub fn section(&self, header: &SectionHeader) -> Option<SectionSpan> {
        self.scanner.find_section(header)
    }

    pub fn replace_section(
        &mut self,
        header: &SectionHeader,
        content: &str,
        default_title: Option<&str>,
    ) -> bool {
        self.scanner.replace_section(header, content, default_title)
    }

    pub fn replace_custom_section(&mut self, title: &str, content: &str) -> bool {
        self.scanner.replace_custom_section(title, content)
    }

    /// Rewrites the gallery inside the section titled `section_title`,
    /// creating the section when it is missing and there are files to show.
    pub fn set_gallery(&mut self, section_title: &str, files: &[String]) -> bool {
        let header = SectionHeader::pattern(custom_header_fragment(section_title));
        match self.scanner.find_section(&header) {
            Some(section) => {
                let body = replace_gallery(&section.content, files);
                if body == section.content {
                    return false;
                }
                self.scanner.replace_section_body(&section, &body)
            }
            None if files.is_empty() => false,
            None => self
                .scanner
                .replace_section(&header, &render_gallery(files), Some(section_title)),
        }
    }

    pub fn set_parameter<'a>(
        &mut self,
        template: &str,
        param: &str,
        value: impl Into<Option<&'a str>>,
    ) -> bool {
        self.scanner.set_parameter(template, param, value)
    }

    pub fn remove_parameter(&mut self, template: &str, param: &str) -> bool {
        self.scanner.remove_parameter(template, param)
    }

    pub fn remove_template(&mut self, name: &str) -> bool {
        self.scanner.remove_template(name)
    }

    pub fn parameter_value(&self, template: &str, param: &str) -> Option<String> {
        self.scanner.parameter_value(template, param)
    }

    fn append_instance(&mut self, template: &str, selector_param: &str, selector_value: &str) {
        let block = format!(
            "{{{{{}\n|{} = {}\n}}}}",
            template.trim(),
            selector_param.trim(),
            selector_value.trim()
        );
        let text = self.scanner.text();
        let next = match self.scanner.find_templates(template).last() {
            Some(last) => format!("{}\n{block}{}", &text[..last.end], &text[last.end..]),
            None if text.is_empty() => block,
            None if text.ends_with('\n') => format!("{text}{block}"),
            None => format!("{text}\n{block}"),
        };
        debug!(template, selector_value, "created template instance");
        self.rebuild(next);
    }

    fn rebuild(&mut self, text: String) {
        self.scanner = WikitextScanner::new(text);
    }
}

fn has_content(writes: &[(String, String)]) -> bool {
    writes.iter().any(|(_, value)| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::PageEditor;
    use crate::fields::{FieldData, FieldMapping};
    use crate::rows::RowItem;
    use crate::span::SectionHeader;

    fn record(value: serde_json::Value) -> FieldData {
        value.as_object().cloned().expect("object literal")
    }

    fn video_mapping() -> FieldMapping {
        FieldMapping::from_pairs([("fieldOfView", "fov"), ("fieldOfViewNotes", "fov notes")])
    }

    #[test]
    fn empty_input_without_data_stays_empty() {
        let mut editor = PageEditor::new("");
        assert_eq!(editor.update_section("Video", &FieldData::new(), &video_mapping()), 0);
        assert_eq!(
            editor.update_section("Video", &record(json!({"fieldOfView": "", "fieldOfViewNotes": null})), &video_mapping()),
            0
        );
        assert!(!editor.set_rows("Infobox game", "developers", "Infobox game", &[]));
        assert_eq!(
            editor.update_template_instance(
                "System requirements",
                "OSfamily",
                "Windows",
                &FieldData::new(),
                &video_mapping()
            ),
            0
        );
        assert_eq!(editor.text(), "");
    }

    #[test]
    fn update_section_creates_template_only_when_needed() {
        let mut editor = PageEditor::new("");
        let data = record(json!({"fieldOfView": "hackable", "fieldOfViewNotes": ""}));
        assert_eq!(editor.update_section("Video", &data, &video_mapping()), 1);
        assert_eq!(editor.text(), "{{Video\n|fov = hackable}}");
        assert_eq!(editor.update_section("Video", &data, &video_mapping()), 0);
    }

    #[test]
    fn update_section_edits_existing_parameters_in_place() {
        let mut editor =
            PageEditor::new("{{Video\n|fov = false\n|fov notes = Old note\n|hdr = true\n}}");
        let data = record(json!({"fieldOfView": "true", "fieldOfViewNotes": ""}));
        assert_eq!(editor.update_section("Video", &data, &video_mapping()), 2);
        assert_eq!(
            editor.text(),
            "{{Video\n|fov = true\n|fov notes = \n|hdr = true\n}}"
        );
    }

    #[test]
    fn ensure_template_is_idempotent() {
        let mut editor = PageEditor::new("Intro text");
        assert!(editor.ensure_template("Video"));
        assert!(!editor.ensure_template("video"));
        assert_eq!(editor.text(), "Intro text\n{{Video}}");
    }

    #[test]
    fn set_flag_prepends_updates_and_removes() {
        let mut editor = PageEditor::new("{{Infobox game}}\n");
        assert!(editor.set_flag("Stub", true, None));
        assert_eq!(editor.text(), "{{Stub}}\n{{Infobox game}}\n");
        assert!(!editor.set_flag("Stub", true, None));

        assert!(editor.set_flag("Stub", true, Some("Needs video section")));
        assert_eq!(editor.text(), "{{Stub|Needs video section}}\n{{Infobox game}}\n");
        assert!(editor.set_flag("Stub", true, Some("Needs audio")));
        assert_eq!(editor.text(), "{{Stub|Needs audio}}\n{{Infobox game}}\n");

        assert!(editor.set_flag("Stub", false, None));
        assert_eq!(editor.text(), "{{Infobox game}}\n");
        assert!(!editor.set_flag("Stub", false, None));
    }

    #[test]
    fn update_template_instance_targets_one_block() {
        let text = "{{System requirements\n|OSfamily = Windows\n|minCPU = Old\n}}\n{{System requirements\n|OSfamily = Linux\n|minCPU = Linux CPU\n}}\n";
        let mut editor = PageEditor::new(text);
        let mapping = FieldMapping::from_pairs([("os", "OSfamily"), ("cpu", "minCPU")]);

        let windows = record(json!({"os": "Ignored", "cpu": "New CPU"}));
        assert_eq!(
            editor.update_template_instance("System requirements", "OSfamily", "windows", &windows, &mapping),
            1
        );
        assert!(editor.text().contains("|OSfamily = Windows\n|minCPU = New CPU\n"));
        assert!(editor.text().contains("|minCPU = Linux CPU\n"));

        let mac = record(json!({"cpu": "M1"}));
        assert_eq!(
            editor.update_template_instance("System requirements", "OSfamily", "OS X", &mac, &mapping),
            1
        );
        assert!(editor.text().ends_with(
            "|minCPU = Linux CPU\n}}\n{{System requirements\n|OSfamily = OS X\n|minCPU = M1\n}}\n"
        ));
        assert_eq!(
            editor
                .scanner()
                .find_templates("System requirements")
                .len(),
            3
        );
    }

    #[test]
    fn rows_round_trip_through_a_list_parameter() {
        let mut editor = PageEditor::new("{{Infobox game\n|developers = \n|engines = \n}}");
        let items = vec![
            RowItem::new("developer", "Valve"),
            RowItem::new("developer", "Hidden Path"),
        ];
        assert!(editor.set_rows("Infobox game", "developers", "Infobox game", &items));
        assert_eq!(
            editor.text(),
            "{{Infobox game\n|developers =\n{{Infobox game/row/developer|Valve}}\n{{Infobox game/row/developer|Hidden Path}}\n|engines = \n}}"
        );
        assert_eq!(editor.rows("Infobox game", "developers", "Infobox game"), items);
        assert!(!editor.set_rows("Infobox game", "developers", "Infobox game", &items));
        assert!(editor.rows("Infobox game", "engines", "Infobox game").is_empty());
    }

    #[test]
    fn sections_read_and_replace() {
        let mut editor = PageEditor::new("==Video==\nold\n\n=='''Essential improvements'''==\nfix\n");
        let video = editor
            .section(&SectionHeader::literal("Video"))
            .expect("video");
        assert_eq!(video.content, "old\n");
        assert!(editor.replace_section(&SectionHeader::literal("Video"), "new", None));
        assert!(editor.replace_custom_section("Essential improvements", "patched"));
        assert_eq!(
            editor.text(),
            "==Video==\nnew\n\n=='''Essential improvements'''==\npatched\n"
        );
    }

    #[test]
    fn set_gallery_rewrites_or_creates_the_section() {
        let mut editor =
            PageEditor::new("==Screenshots==\n\n<gallery>\nFile:a.png\n</gallery>\n\n==Video==\nx\n");
        assert!(editor.set_gallery("Screenshots", &["b.png".to_string()]));
        assert_eq!(
            editor.text(),
            "==Screenshots==\n\n<gallery>\nFile:b.png\n</gallery>\n\n==Video==\nx\n"
        );
        assert!(!editor.set_gallery("Screenshots", &["b.png".to_string()]));

        let mut empty = PageEditor::new("Intro\n");
        assert!(!empty.set_gallery("Screenshots", &[]));
        assert!(empty.set_gallery("Screenshots", &["c.png".to_string()]));
        assert_eq!(
            empty.text(),
            "Intro\n\n== Screenshots ==\n<gallery>\nFile:c.png\n</gallery>\n"
        );
    }

    #[test]
    fn set_gallery_into_empty_sections_keeps_headers_intact() {
        let mut editor = PageEditor::new("==Screenshots==\n==Video==\nx\n");
        assert!(editor.set_gallery("Screenshots", &["a.png".to_string()]));
        assert_eq!(
            editor.text(),
            "==Screenshots==\n<gallery>\nFile:a.png\n</gallery>\n==Video==\nx\n"
        );
        let video = editor
            .section(&SectionHeader::literal("Video"))
            .expect("video still a header");
        assert_eq!(video.content, "x\n");

        let mut trailing = PageEditor::new("intro\n==Screenshots==");
        assert!(trailing.set_gallery("Screenshots", &["a.png".to_string()]));
        assert_eq!(
            trailing.text(),
            "intro\n==Screenshots==\n<gallery>\nFile:a.png\n</gallery>"
        );
        let screenshots = trailing
            .section(&SectionHeader::literal("Screenshots"))
            .expect("screenshots still a header");
        assert_eq!(screenshots.content, "<gallery>\nFile:a.png\n</gallery>");
    }

    #[test]
    fn empty_sections_accept_replacements_through_the_editor() {
        let mut editor = PageEditor::new("=='''Mods'''==\n==Video==\nx\n==Notes==");
        assert!(editor.replace_custom_section("Mods", "list"));
        assert!(editor.replace_section(&SectionHeader::literal("Notes"), "end", None));
        assert_eq!(
            editor.text(),
            "=='''Mods'''==\nlist\n==Video==\nx\n==Notes==\nend"
        );
        assert!(editor.section(&SectionHeader::literal("Video")).is_some());
        assert!(editor.section(&SectionHeader::literal("Notes")).is_some());
    }

    #[test]
    fn pass_throughs_reach_the_scanner() {
        let mut editor = PageEditor::new("{{Audio\n|music = true\n|eax = false\n}}\n{{Stub}}");
        assert!(editor.set_parameter("Audio", "music", "false"));
        assert!(!editor.set_parameter("Audio", "music", None));
        assert!(editor.remove_parameter("Audio", "eax"));
        assert!(editor.remove_template("Stub"));
        assert_eq!(editor.parameter_value("audio", "MUSIC").as_deref(), Some("false"));
        assert_eq!(editor.into_text(), "{{Audio\n|music = false\n}}\n");
    }
}
