//! Table-of-contents builder.
//!
//! Walks the level-2 and level-3 headings of a [`Document`] in document
//! order, assigns each one a `heading-<index>` anchor, and appends a nested
//! `<ul>` mirroring the heading hierarchy to a container element.
//!
//! Nesting is tracked with a stack of open lists local to a single
//! [`build_toc`] call: a deeper heading opens a list under the most recent
//! entry, a shallower heading pops back to the matching ancestor list.

use serde::Serialize;

use crate::dom::{Document, NodeId};

/// Heading level that maps to the outermost TOC list.
pub const BASE_LEVEL: u8 = 2;

/// Heading tags that contribute TOC entries.
pub const HEADING_TAGS: &[&str] = &["h2", "h3"];

/// Id of the element the TOC is rendered into.
pub const TOC_CONTAINER_ID: &str = "toc";

/// Headings with exactly this (trimmed) text are left out of the TOC.
pub const TOC_TITLE: &str = "Table of Contents";

/// One TOC link plus the entries nested beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub anchor_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocEntry>,
}

/// What a single [`build_toc`] run produced.
#[derive(Debug, Clone)]
pub struct TocOutcome {
    /// The outermost `<ul>` appended to the container.
    pub root_list: NodeId,
    /// Entry tree mirroring the rendered lists.
    pub entries: Vec<TocEntry>,
    /// Headings that received an anchor id.
    pub assigned: usize,
    /// Headings skipped because they are the TOC title.
    pub skipped: usize,
    /// Level decreases that would have popped the root list.
    pub clamped: usize,
}

/// Extract the numeric level from an `hN` tag.
fn heading_level(tag: &str) -> Option<u8> {
    tag.strip_prefix('h')?.parse().ok()
}

/// Build the TOC for every h2/h3 in `doc` and append it to `container`.
///
/// The container is never cleared: calling this twice on the same page
/// appends a second list and re-assigns the same anchor ids.
pub fn build_toc(doc: &mut Document, container: NodeId) -> TocOutcome {
    let root_list = doc.create_element("ul");
    doc.append_child(container, root_list);

    let mut stack: Vec<NodeId> = vec![root_list];
    let mut current_level = BASE_LEVEL;
    let mut assigned = 0usize;
    let mut skipped = 0usize;
    let mut clamped = 0usize;

    let headings = doc.elements_by_tag_names(HEADING_TAGS);
    for (index, heading) in headings.into_iter().enumerate() {
        let text = doc.text_content(heading);
        if text.trim() == TOC_TITLE {
            skipped += 1;
            continue;
        }
        let Some(level) = doc.tag(heading).and_then(heading_level) else {
            continue;
        };

        let anchor_id = format!("heading-{index}");
        doc.set_attr(heading, "id", &anchor_id);
        assigned += 1;

        let item = doc.create_element("li");
        let link = doc.create_element("a");
        doc.set_attr(link, "href", &format!("#{anchor_id}"));
        let label = doc.create_text(&text);
        doc.append_child(link, label);
        doc.append_child(item, link);

        let top = *stack.last().unwrap_or(&root_list);
        if level > current_level {
            // Nest under the latest entry; with no entry yet, stay flat.
            if let Some(last_entry) = doc.last_element_child(top) {
                let nested = doc.create_element("ul");
                doc.append_child(last_entry, nested);
                stack.push(nested);
            }
        } else if level < current_level {
            for _ in 0..(current_level - level) {
                if stack.len() > 1 {
                    stack.pop();
                } else {
                    clamped += 1;
                }
            }
        }

        let current_list = *stack.last().unwrap_or(&root_list);
        doc.append_child(current_list, item);
        current_level = level;
    }

    let entries = collect_entries(doc, root_list);
    if clamped > 0 {
        eprintln!("[toc] clamped={clamped} reason=level-underflow");
    }

    TocOutcome {
        root_list,
        entries,
        assigned,
        skipped,
        clamped,
    }
}

/// Build the TOC into the `#toc` element.
///
/// Returns `None` without touching the document when the container is
/// missing.
pub fn generate_toc(doc: &mut Document) -> Option<TocOutcome> {
    let container = doc.element_by_id(TOC_CONTAINER_ID)?;
    Some(build_toc(doc, container))
}

/// Read the entry tree back out of a rendered `<ul>`.
fn collect_entries(doc: &Document, list: NodeId) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    for &item in doc.children(list) {
        if doc.tag(item) != Some("li") {
            continue;
        }
        let mut entry = TocEntry {
            anchor_id: String::new(),
            text: String::new(),
            children: Vec::new(),
        };
        for &child in doc.children(item) {
            match doc.tag(child) {
                Some("a") => {
                    entry.anchor_id = doc
                        .attr(child, "href")
                        .map(|h| h.trim_start_matches('#').to_owned())
                        .unwrap_or_default();
                    entry.text = doc.text_content(child);
                }
                Some("ul") => entry.children.extend(collect_entries(doc, child)),
                _ => {}
            }
        }
        entries.push(entry);
    }
    entries
}

/// Render the entry tree as an indented plain-text outline.
pub fn outline(entries: &[TocEntry]) -> String {
    fn walk(entries: &[TocEntry], depth: usize, out: &mut String) {
        for entry in entries {
            out.push_str(&"  ".repeat(depth));
            out.push_str("- ");
            out.push_str(&entry.text);
            out.push_str(" (#");
            out.push_str(&entry.anchor_id);
            out.push_str(")\n");
            walk(&entry.children, depth + 1, out);
        }
    }
    let mut out = String::new();
    walk(entries, 0, &mut out);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Page with a `#toc` container followed by the given headings.
    fn page(headings: &[(&str, &str)]) -> (Document, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let body = doc.create_element("body");
        doc.append_child(root, body);
        let toc = doc.create_element("div");
        doc.set_attr(toc, "id", TOC_CONTAINER_ID);
        doc.append_child(body, toc);
        for (tag, text) in headings {
            let h = doc.create_element(tag);
            let t = doc.create_text(text);
            doc.append_child(h, t);
            doc.append_child(body, h);
        }
        (doc, toc)
    }

    fn toc_html(doc: &Document, container: NodeId) -> String {
        doc.inner_html(container)
    }

    #[test]
    fn intro_background_setup_example() {
        let (mut doc, toc) = page(&[("h2", "Intro"), ("h3", "Background"), ("h2", "Setup")]);
        build_toc(&mut doc, toc);
        assert_eq!(
            toc_html(&doc, toc),
            "<ul><li><a href=\"#heading-0\">Intro</a><ul><li><a href=\"#heading-1\">Background</a></li></ul></li><li><a href=\"#heading-2\">Setup</a></li></ul>"
        );
    }

    #[test]
    fn flat_headings_give_flat_list() {
        let (mut doc, toc) = page(&[("h2", "A"), ("h2", "B"), ("h2", "C"), ("h2", "D")]);
        let outcome = build_toc(&mut doc, toc);
        assert_eq!(outcome.entries.len(), 4);
        assert!(outcome.entries.iter().all(|e| e.children.is_empty()));
        assert_eq!(doc.children(outcome.root_list).len(), 4);
    }

    #[test]
    fn h2_h3_h3_h2_nests_two_entries() {
        let (mut doc, toc) = page(&[("h2", "A"), ("h3", "A.1"), ("h3", "A.2"), ("h2", "B")]);
        let outcome = build_toc(&mut doc, toc);
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].text, "A");
        let nested: Vec<&str> = outcome.entries[0]
            .children
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(nested, vec!["A.1", "A.2"]);
        assert!(outcome.entries[1].children.is_empty());
    }

    #[test]
    fn toc_title_heading_is_skipped_without_id() {
        let (mut doc, toc) = page(&[
            ("h2", "  Table of Contents "),
            ("h2", "Intro"),
            ("h2", "Outro"),
        ]);
        let outcome = build_toc(&mut doc, toc);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.assigned, 2);
        assert_eq!(outcome.entries.len(), 2);

        let headings = doc.elements_by_tag_names(HEADING_TAGS);
        assert_eq!(doc.attr(headings[0], "id"), None);
        // Indices count every matched heading, so the skipped title consumes 0.
        assert_eq!(doc.attr(headings[1], "id"), Some("heading-1"));
        assert_eq!(doc.attr(headings[2], "id"), Some("heading-2"));
    }

    #[test]
    fn links_target_unique_heading_ids() {
        let (mut doc, toc) = page(&[
            ("h2", "Same"),
            ("h3", "Same"),
            ("h3", "Same"),
            ("h2", "Same"),
        ]);
        let outcome = build_toc(&mut doc, toc);

        let mut ids: Vec<String> = doc
            .elements_by_tag_names(HEADING_TAGS)
            .into_iter()
            .filter_map(|h| doc.attr(h, "id").map(str::to_owned))
            .collect();
        let hrefs: Vec<String> = doc
            .descendants(outcome.root_list)
            .filter(|&n| doc.tag(n) == Some("a"))
            .filter_map(|a| doc.attr(a, "href").map(|h| h.trim_start_matches('#').to_owned()))
            .collect();
        assert_eq!(ids, hrefs);

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4, "anchor ids must be unique");
    }

    #[test]
    fn leading_h3_stays_in_root_list() {
        let (mut doc, toc) = page(&[("h3", "Orphan"), ("h2", "Intro"), ("h3", "Child")]);
        let outcome = build_toc(&mut doc, toc);
        // The h3 -> h2 decrease would pop the root; it is clamped instead.
        assert_eq!(outcome.clamped, 1);
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].text, "Orphan");
        assert_eq!(outcome.entries[1].text, "Intro");
        assert_eq!(outcome.entries[1].children.len(), 1);
    }

    #[test]
    fn empty_page_gets_empty_root_list() {
        let (mut doc, toc) = page(&[]);
        let outcome = build_toc(&mut doc, toc);
        assert!(outcome.entries.is_empty());
        assert_eq!(toc_html(&doc, toc), "<ul></ul>");
    }

    #[test]
    fn rerun_appends_duplicate_lists() {
        let (mut doc, toc) = page(&[("h2", "Intro")]);
        build_toc(&mut doc, toc);
        build_toc(&mut doc, toc);
        assert_eq!(doc.children(toc).len(), 2);

        doc.clear_children(toc);
        build_toc(&mut doc, toc);
        assert_eq!(doc.children(toc).len(), 1);
    }

    #[test]
    fn generate_toc_requires_container() {
        let mut doc = Document::new();
        let root = doc.root();
        let h2 = doc.create_element("h2");
        doc.append_child(root, h2);
        assert!(generate_toc(&mut doc).is_none());
        assert_eq!(doc.attr(h2, "id"), None);
    }

    #[test]
    fn generate_toc_finds_container_by_id() {
        let (mut doc, toc) = page(&[("h2", "Intro")]);
        let outcome = generate_toc(&mut doc).expect("container present");
        assert_eq!(doc.parent(outcome.root_list), Some(toc));
    }

    #[test]
    fn heading_markup_is_flattened_into_label() {
        let (mut doc, toc) = page(&[]);
        let body = doc.parent(toc).expect("toc has parent");
        let h2 = doc.create_element("h2");
        let plain = doc.create_text("Use ");
        let code = doc.create_element("code");
        let code_text = doc.create_text("<ul>");
        doc.append_child(code, code_text);
        doc.append_child(h2, plain);
        doc.append_child(h2, code);
        doc.append_child(body, h2);

        build_toc(&mut doc, toc);
        assert_eq!(
            toc_html(&doc, toc),
            "<ul><li><a href=\"#heading-0\">Use &lt;ul&gt;</a></li></ul>"
        );
    }

    #[test]
    fn outline_indents_nested_entries() {
        let (mut doc, toc) = page(&[("h2", "Intro"), ("h3", "Background"), ("h2", "Setup")]);
        let outcome = build_toc(&mut doc, toc);
        assert_eq!(
            outline(&outcome.entries),
            "- Intro (#heading-0)\n  - Background (#heading-1)\n- Setup (#heading-2)\n"
        );
    }

    #[test]
    fn entries_serialize_without_empty_children() {
        let entry = TocEntry {
            anchor_id: "heading-0".into(),
            text: "Intro".into(),
            children: Vec::new(),
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert_eq!(json, r#"{"anchor_id":"heading-0","text":"Intro"}"#);
    }
}
