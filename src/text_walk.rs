//! Text-node walk over the page body.
//!
//! Every text node outside the ignored containers is offered to a
//! [`TextRewriter`].  A rewriter that returns markup causes the text node to
//! be swapped for a `<span>` carrying that markup.  The default
//! [`NoopRewriter`] leaves the page untouched.

use crate::config::Substitution;
use crate::dom::{escape_text, Document, NodeId, NodeKind};

/// Container ids whose text is never rewritten.
pub const DEFAULT_IGNORED_CONTAINERS: &[&str] = &["toc", "toc_static"];

/// Hook for text substitutions.
pub trait TextRewriter {
    /// Return replacement markup for `text`, or `None` to keep it as is.
    fn rewrite(&self, text: &str) -> Option<String>;
}

/// Rewriter that never changes anything.
pub struct NoopRewriter;

impl TextRewriter for NoopRewriter {
    fn rewrite(&self, _text: &str) -> Option<String> {
        None
    }
}

/// Applies literal `find -> replace` substitutions in order.
///
/// `replace` is markup and is inserted as-is; the surrounding text is
/// escaped.
pub struct SubstitutionRewriter {
    rules: Vec<Substitution>,
}

impl SubstitutionRewriter {
    pub fn new(rules: &[Substitution]) -> Self {
        Self {
            rules: rules
                .iter()
                .filter(|r| !r.find.is_empty())
                .cloned()
                .collect(),
        }
    }
}

impl TextRewriter for SubstitutionRewriter {
    fn rewrite(&self, text: &str) -> Option<String> {
        if !self.rules.iter().any(|r| text.contains(&r.find)) {
            return None;
        }
        // Segments are (text, is_markup); only unreplaced text is split further.
        let mut segments: Vec<(String, bool)> = vec![(text.to_owned(), false)];
        for rule in &self.rules {
            let mut next = Vec::with_capacity(segments.len());
            for (segment, is_markup) in segments {
                if is_markup || !segment.contains(&rule.find) {
                    next.push((segment, is_markup));
                    continue;
                }
                let mut parts = segment.split(rule.find.as_str()).peekable();
                while let Some(part) = parts.next() {
                    if !part.is_empty() {
                        next.push((part.to_owned(), false));
                    }
                    if parts.peek().is_some() {
                        next.push((rule.replace.clone(), true));
                    }
                }
            }
            segments = next;
        }
        let mut html = String::new();
        for (segment, is_markup) in segments {
            if is_markup {
                html.push_str(&segment);
            } else {
                html.push_str(&escape_text(&segment));
            }
        }
        Some(html)
    }
}

/// The rewriter for a set of configured substitutions: [`NoopRewriter`] when
/// there is nothing to substitute.
pub fn rewriter_for(rules: &[Substitution]) -> Box<dyn TextRewriter> {
    if rules.iter().all(|r| r.find.is_empty()) {
        Box::new(NoopRewriter)
    } else {
        Box::new(SubstitutionRewriter::new(rules))
    }
}

/// Counters from one [`walk_text`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkReport {
    pub visited: usize,
    pub ignored: usize,
    pub replaced: usize,
}

/// True when `node` or one of its ancestors is an element whose id is listed
/// in `ignored`.
fn inside_ignored_container<S: AsRef<str>>(doc: &Document, node: NodeId, ignored: &[S]) -> bool {
    std::iter::once(node)
        .chain(doc.ancestors(node))
        .filter_map(|n| doc.attr(n, "id"))
        .any(|id| ignored.iter().any(|i| i.as_ref() == id))
}

/// Walk every text node under `<body>` (or the whole document when there is
/// no body) and apply `rewriter` to those outside `ignored` containers.
pub fn walk_text<S: AsRef<str>>(
    doc: &mut Document,
    rewriter: &dyn TextRewriter,
    ignored: &[S],
) -> WalkReport {
    let scope = doc.first_by_tag("body").unwrap_or_else(|| doc.root());
    let text_nodes: Vec<NodeId> = doc
        .descendants(scope)
        .filter(|&n| matches!(doc.kind(n), NodeKind::Text(_)))
        .collect();

    let mut report = WalkReport::default();
    for node in text_nodes {
        if inside_ignored_container(doc, node, ignored) {
            report.ignored += 1;
            continue;
        }
        report.visited += 1;

        let replacement = match doc.kind(node) {
            NodeKind::Text(text) => rewriter.rewrite(text),
            _ => None,
        };
        let (Some(html), Some(parent)) = (replacement, doc.parent(node)) else {
            continue;
        };
        let span = doc.create_element("span");
        let raw = doc.create_raw(&html);
        doc.append_child(span, raw);
        if doc.replace_child(parent, span, node) {
            report.replaced += 1;
        }
    }

    eprintln!(
        "[walk] visited={} ignored={} replaced={}",
        report.visited, report.ignored, report.replaced
    );
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Records every text it is offered.
    struct Recorder {
        seen: RefCell<Vec<String>>,
    }

    impl TextRewriter for Recorder {
        fn rewrite(&self, text: &str) -> Option<String> {
            self.seen.borrow_mut().push(text.to_owned());
            None
        }
    }

    fn sample_page() -> Document {
        let mut doc = Document::new();
        let root = doc.root();
        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let title = doc.create_element("title");
        let title_text = doc.create_text("Head title");
        let body = doc.create_element("body");
        doc.append_child(root, html);
        doc.append_child(html, head);
        doc.append_child(head, title);
        doc.append_child(title, title_text);
        doc.append_child(html, body);

        for (id, text) in [("toc_static", "Static"), ("toc", "Generated"), ("main", "Body text")] {
            let div = doc.create_element("div");
            doc.set_attr(div, "id", id);
            let inner = doc.create_element("p");
            let t = doc.create_text(text);
            doc.append_child(inner, t);
            doc.append_child(div, inner);
            doc.append_child(body, div);
        }
        doc
    }

    #[test]
    fn ignored_containers_are_never_offered() {
        let mut doc = sample_page();
        let recorder = Recorder {
            seen: RefCell::new(Vec::new()),
        };
        let report = walk_text(&mut doc, &recorder, DEFAULT_IGNORED_CONTAINERS);
        assert_eq!(*recorder.seen.borrow(), vec!["Body text".to_owned()]);
        assert_eq!(report.visited, 1);
        assert_eq!(report.ignored, 2);
        assert_eq!(report.replaced, 0);
    }

    #[test]
    fn noop_rewriter_leaves_markup_unchanged() {
        let mut doc = sample_page();
        let before = doc.to_html(doc.root());
        walk_text(&mut doc, &NoopRewriter, DEFAULT_IGNORED_CONTAINERS);
        assert_eq!(doc.to_html(doc.root()), before);
    }

    #[test]
    fn head_text_is_outside_walk_scope() {
        let mut doc = sample_page();
        let rules = vec![Substitution {
            find: "t".into(),
            replace: "T".into(),
        }];
        let report = walk_text(&mut doc, &SubstitutionRewriter::new(&rules), DEFAULT_IGNORED_CONTAINERS);
        assert_eq!(report.replaced, 1);
        let title = doc.first_by_tag("title").expect("title present");
        assert_eq!(doc.inner_html(title), "Head title");
    }

    #[test]
    fn substitution_wraps_text_in_span() {
        let mut doc = sample_page();
        let rules = vec![Substitution {
            find: "Body".into(),
            replace: "<strong>Body</strong>".into(),
        }];
        let report = walk_text(&mut doc, &SubstitutionRewriter::new(&rules), DEFAULT_IGNORED_CONTAINERS);
        assert_eq!(report.replaced, 1);
        let main = doc.element_by_id("main").expect("main present");
        assert_eq!(
            doc.inner_html(main),
            "<p><span><strong>Body</strong> text</span></p>"
        );
    }

    #[test]
    fn substitution_escapes_surrounding_text() {
        let rules = vec![Substitution {
            find: "(c)".into(),
            replace: "&copy;".into(),
        }];
        let rewriter = SubstitutionRewriter::new(&rules);
        assert_eq!(
            rewriter.rewrite("a < b (c) 2026").as_deref(),
            Some("a &lt; b &copy; 2026")
        );
        assert_eq!(rewriter.rewrite("nothing here"), None);
    }

    #[test]
    fn later_rules_do_not_touch_earlier_replacements() {
        let rules = vec![
            Substitution {
                find: "foo".into(),
                replace: "<b>bar</b>".into(),
            },
            Substitution {
                find: "bar".into(),
                replace: "baz".into(),
            },
        ];
        let rewriter = SubstitutionRewriter::new(&rules);
        assert_eq!(
            rewriter.rewrite("foo bar").as_deref(),
            Some("<b>bar</b> baz")
        );
    }

    #[test]
    fn rewriter_for_empty_rules_is_noop() {
        let mut doc = sample_page();
        let before = doc.to_html(doc.root());
        let report = walk_text(&mut doc, rewriter_for(&[]).as_ref(), DEFAULT_IGNORED_CONTAINERS);
        assert_eq!(report.replaced, 0);
        assert_eq!(doc.to_html(doc.root()), before);

        let rules = vec![Substitution {
            find: "Body".into(),
            replace: "<b>Body</b>".into(),
        }];
        assert_eq!(
            rewriter_for(&rules).rewrite("Body text").as_deref(),
            Some("<b>Body</b> text")
        );
    }

    #[test]
    fn empty_find_rules_are_dropped() {
        let rules = vec![Substitution {
            find: String::new(),
            replace: "x".into(),
        }];
        assert_eq!(SubstitutionRewriter::new(&rules).rewrite("abc"), None);
    }
}
