//! Markdown to page rendering.
//!
//! Markdown is parsed with comrak (GFM extensions) and mapped onto a
//! [`Document`] so that headings, links and text are real tree nodes the page
//! augmentation can inspect and mutate.  Constructs the augmentation never
//! looks inside (tables, images, task items, footnotes) are rendered by
//! comrak and carried as raw nodes.
//!
//! The page shell and [`augment_page`] reproduce the page-load sequence:
//! text walk, TOC generation, active navigation link.

use std::path::{Path, PathBuf};

use comrak::{
    format_html,
    html::dangerous_url,
    nodes::{AstNode, ListType, NodeValue},
    parse_document, Arena, Options,
};
use serde::Deserialize;

use crate::config::NavItem;
use crate::dom::{Document, NodeId};
use crate::nav;
use crate::text_walk::{walk_text, TextRewriter, WalkReport};
use crate::toc::{self, TocEntry, TOC_CONTAINER_ID, TOC_TITLE};
use crate::web_assets;

/// Id of the container holding the static TOC title.
pub const TOC_STATIC_ID: &str = "toc_static";

/// Placeholder comrak emits for raw HTML when `unsafe_` is off.
const RAW_HTML_OMITTED: &str = "<!-- raw HTML omitted -->";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A markdown file mapped onto a document fragment.
pub struct RenderedMarkdown {
    pub doc: Document,
    /// Detached `<article>` holding the converted content.
    pub article: NodeId,
    /// `title` from YAML front matter, if any.
    pub front_matter_title: Option<String>,
}

/// Per-page inputs for [`build_page`].
pub struct PageContext<'a> {
    /// Site name from configuration.
    pub site_title: Option<&'a str>,
    /// Navigation bar entries.
    pub nav: &'a [NavItem],
}

/// Outcome of [`augment_page`].
#[derive(Debug, Clone)]
pub struct PageReport {
    pub walk: WalkReport,
    /// `None` when the page has no `#toc` container.
    pub toc: Option<Vec<TocEntry>>,
    /// Whether a nav link matched the active href.
    pub active_link: bool,
}

#[derive(Deserialize, Default)]
struct FrontMatter {
    title: Option<String>,
}

// ---------------------------------------------------------------------------
// Markdown conversion
// ---------------------------------------------------------------------------

/// comrak options: GFM extensions, front matter, raw HTML suppressed.
fn make_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.front_matter_delimiter = Some("---".to_owned());
    options.render.unsafe_ = false;
    options
}

/// Extract `title` from a front matter block including its `---` fences.
fn front_matter_title(raw: &str) -> Option<String> {
    let body: String = raw
        .lines()
        .filter(|l| l.trim() != "---")
        .collect::<Vec<_>>()
        .join("\n");
    match serde_yml::from_str::<FrontMatter>(&body) {
        Ok(fm) => fm.title.filter(|t| !t.trim().is_empty()),
        Err(e) => {
            eprintln!("[render] front-matter ignored error={e}");
            None
        }
    }
}

/// Render a comrak subtree to markup for a raw node.
fn render_raw<'a>(node: &'a AstNode<'a>, options: &Options) -> String {
    let mut bytes = Vec::new();
    match format_html(node, options, &mut bytes) {
        Ok(()) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            eprintln!("[render] raw-fallback failed error={e}");
            String::new()
        }
    }
}

/// Paragraphs directly inside items of a tight list render without `<p>`.
fn in_tight_list<'a>(node: &'a AstNode<'a>) -> bool {
    let Some(list) = node.parent().and_then(|item| item.parent()) else {
        return false;
    };
    let tight = matches!(&list.data.borrow().value, NodeValue::List(l) if l.tight);
    tight
}

struct Converter<'o> {
    options: &'o Options<'static>,
    front_matter_title: Option<String>,
}

impl Converter<'_> {
    fn children<'a>(&mut self, doc: &mut Document, node: &'a AstNode<'a>, parent: NodeId) {
        for child in node.children() {
            self.node(doc, child, parent);
        }
    }

    /// Append `tag` under `parent`, then convert `node`'s children into it.
    fn wrap<'a>(&mut self, doc: &mut Document, node: &'a AstNode<'a>, parent: NodeId, tag: &str) -> NodeId {
        let el = doc.create_element(tag);
        doc.append_child(parent, el);
        self.children(doc, node, el);
        el
    }

    fn text(doc: &mut Document, parent: NodeId, text: &str) {
        let t = doc.create_text(text);
        doc.append_child(parent, t);
    }

    fn node<'a>(&mut self, doc: &mut Document, node: &'a AstNode<'a>, parent: NodeId) {
        let value = node.data.borrow().value.clone();
        match value {
            NodeValue::Document => self.children(doc, node, parent),
            NodeValue::FrontMatter(raw) => {
                self.front_matter_title = front_matter_title(&raw);
            }
            NodeValue::Paragraph if in_tight_list(node) => self.children(doc, node, parent),
            NodeValue::Paragraph => {
                self.wrap(doc, node, parent, "p");
            }
            NodeValue::Heading(h) => {
                self.wrap(doc, node, parent, &format!("h{}", h.level));
            }
            NodeValue::BlockQuote => {
                self.wrap(doc, node, parent, "blockquote");
            }
            NodeValue::List(list) => {
                let tag = match list.list_type {
                    ListType::Bullet => "ul",
                    ListType::Ordered => "ol",
                };
                let el = self.wrap(doc, node, parent, tag);
                if list.list_type == ListType::Ordered && list.start != 1 {
                    doc.set_attr(el, "start", &list.start.to_string());
                }
            }
            NodeValue::Item(_) => {
                self.wrap(doc, node, parent, "li");
            }
            NodeValue::ThematicBreak => {
                let hr = doc.create_element("hr");
                doc.append_child(parent, hr);
            }
            NodeValue::CodeBlock(block) => {
                let pre = doc.create_element("pre");
                let code = doc.create_element("code");
                if let Some(lang) = block.info.split_whitespace().next() {
                    doc.set_attr(code, "class", &format!("language-{lang}"));
                }
                doc.append_child(parent, pre);
                doc.append_child(pre, code);
                Self::text(doc, code, &block.literal);
            }
            NodeValue::HtmlBlock(_) | NodeValue::HtmlInline(_) => {
                let raw = doc.create_raw(RAW_HTML_OMITTED);
                doc.append_child(parent, raw);
            }
            NodeValue::Text(text) => Self::text(doc, parent, &text),
            NodeValue::SoftBreak => Self::text(doc, parent, "\n"),
            NodeValue::LineBreak => {
                let br = doc.create_element("br");
                doc.append_child(parent, br);
            }
            NodeValue::Code(code) => {
                let el = doc.create_element("code");
                doc.append_child(parent, el);
                Self::text(doc, el, &code.literal);
            }
            NodeValue::Emph => {
                self.wrap(doc, node, parent, "em");
            }
            NodeValue::Strong => {
                self.wrap(doc, node, parent, "strong");
            }
            NodeValue::Strikethrough => {
                self.wrap(doc, node, parent, "del");
            }
            NodeValue::Link(link) => {
                let a = self.wrap(doc, node, parent, "a");
                // Same filter comrak applies when `unsafe_` is off.
                let href = if dangerous_url(&link.url) { "" } else { link.url.as_str() };
                doc.set_attr(a, "href", href);
                if !link.title.is_empty() {
                    doc.set_attr(a, "title", &link.title);
                }
            }
            _ => {
                let html = render_raw(node, self.options);
                let raw = doc.create_raw(&html);
                doc.append_child(parent, raw);
            }
        }
    }
}

/// Parse `input` and map it onto a fresh document.
///
/// Local relative links are rewritten to root-relative hrefs resolved from
/// `file_path`'s directory; links escaping `serve_root` are left alone.
pub fn render_markdown(input: &str, file_path: &Path, serve_root: &Path) -> RenderedMarkdown {
    let arena = Arena::new();
    let options = make_options();
    let root = parse_document(&arena, input, &options);

    let (rewritten, skipped) = rewrite_local_links(root, file_path, serve_root);
    eprintln!(
        "[rewrite] file={} rewritten={} skipped={}",
        file_path.display(),
        rewritten,
        skipped
    );

    let mut doc = Document::new();
    let article = doc.create_element("article");
    let mut converter = Converter {
        options: &options,
        front_matter_title: None,
    };
    converter.node(&mut doc, root, article);

    RenderedMarkdown {
        doc,
        article,
        front_matter_title: converter.front_matter_title,
    }
}

// ---------------------------------------------------------------------------
// Local link rewriting
// ---------------------------------------------------------------------------

/// Split off the `?query` / `#fragment` suffix of a URL.
fn split_url_suffix(url: &str) -> (&str, &str) {
    match url.find(['?', '#']) {
        Some(pos) => url.split_at(pos),
        None => (url, ""),
    }
}

/// Resolve `rel` against `dir`; `..` is clamped at the filesystem root.
fn resolve_relative_path(dir: &Path, rel: &str) -> PathBuf {
    rel.split('/').fold(dir.to_path_buf(), |mut acc, part| {
        match part {
            "" | "." => {}
            ".." => {
                acc.pop();
            }
            name => acc.push(name),
        }
        acc
    })
}

/// Root-relative form of a local link, or `None` to leave it unchanged.
///
/// URLs with a scheme (`tel:`, `javascript:`, ...) are never treated as paths.
fn rewrite_url(url: &str, file_dir: &Path, serve_root: &Path) -> Option<String> {
    const SKIP_PREFIXES: &[&str] = &["//", "#", "/"];
    if SKIP_PREFIXES.iter().any(|p| url.starts_with(p)) {
        return None;
    }
    let (base, suffix) = split_url_suffix(url);
    if base.is_empty() || base.split('/').next().is_some_and(|seg| seg.contains(':')) {
        return None;
    }
    let resolved = resolve_relative_path(file_dir, base);
    let rel = resolved.strip_prefix(serve_root).ok()?;
    Some(format!("/{}{}", rel.to_string_lossy(), suffix))
}

/// Rewrite local `Link` and `Image` URLs in the comrak AST, including those
/// inside constructs later rendered as raw markup.  Returns
/// `(rewritten, skipped)`.
fn rewrite_local_links<'a>(root: &'a AstNode<'a>, file_path: &Path, serve_root: &Path) -> (usize, usize) {
    let file_dir = file_path.parent().unwrap_or(Path::new(""));
    let mut rewritten = 0usize;
    let mut skipped = 0usize;

    for node in root.descendants() {
        let mut data = node.data.borrow_mut();
        let url = match &mut data.value {
            NodeValue::Link(link) => &mut link.url,
            NodeValue::Image(image) => &mut image.url,
            _ => continue,
        };
        match rewrite_url(url, file_dir, serve_root) {
            Some(new_url) => {
                *url = new_url;
                rewritten += 1;
            }
            None => skipped += 1,
        }
    }
    (rewritten, skipped)
}

// ---------------------------------------------------------------------------
// Page shell
// ---------------------------------------------------------------------------

fn append_text_element(doc: &mut Document, parent: NodeId, tag: &str, text: &str) -> NodeId {
    let el = doc.create_element(tag);
    let t = doc.create_text(text);
    doc.append_child(el, t);
    doc.append_child(parent, el);
    el
}

fn append_meta(doc: &mut Document, head: NodeId, attrs: &[(&str, &str)]) {
    let meta = doc.create_element("meta");
    for (k, v) in attrs {
        doc.set_attr(meta, k, v);
    }
    doc.append_child(head, meta);
}

/// Wrap rendered content in the full page shell.
///
/// Layout: header with site title and `<nav>`; an aside holding
/// `#toc_static` (the TOC title) and the empty `#toc` container; and
/// `<main class="content">` with the article.
///
/// Title precedence: front matter, first `<h1>`, file stem, "Document".
pub fn build_page(rendered: RenderedMarkdown, file_path: &Path, ctx: &PageContext) -> Document {
    let RenderedMarkdown {
        mut doc,
        article,
        front_matter_title,
    } = rendered;

    let first_h1 = doc
        .descendants(article)
        .find(|&n| doc.tag(n) == Some("h1"))
        .map(|h| doc.text_content(h));
    let page_title = front_matter_title
        .or(first_h1)
        .or_else(|| {
            file_path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "Document".to_owned());
    let full_title = match ctx.site_title {
        Some(site) => format!("{page_title} · {site}"),
        None => page_title,
    };

    let root = doc.root();
    let html = doc.create_element("html");
    doc.set_attr(html, "lang", "en");
    doc.append_child(root, html);

    let head = doc.create_element("head");
    doc.append_child(html, head);
    append_meta(&mut doc, head, &[("charset", "utf-8")]);
    append_meta(
        &mut doc,
        head,
        &[("name", "viewport"), ("content", "width=device-width, initial-scale=1")],
    );
    append_text_element(&mut doc, head, "title", &full_title);
    let stylesheet = doc.create_element("link");
    doc.set_attr(stylesheet, "rel", "stylesheet");
    doc.set_attr(stylesheet, "href", web_assets::CSS_PATH);
    doc.append_child(head, stylesheet);

    let body = doc.create_element("body");
    doc.append_child(html, body);

    let header = doc.create_element("header");
    doc.set_attr(header, "class", "site-header");
    doc.append_child(body, header);
    if let Some(site) = ctx.site_title {
        let brand = append_text_element(&mut doc, header, "span", site);
        doc.set_attr(brand, "class", "site-title");
    }
    let nav_el = doc.create_element("nav");
    doc.append_child(header, nav_el);
    let nav_list = doc.create_element("ul");
    doc.append_child(nav_el, nav_list);
    for item in ctx.nav {
        let li = doc.create_element("li");
        doc.append_child(nav_list, li);
        let a = append_text_element(&mut doc, li, "a", &item.label);
        doc.set_attr(a, "href", &item.href);
    }

    let layout = doc.create_element("div");
    doc.set_attr(layout, "class", "layout");
    doc.append_child(body, layout);

    let aside = doc.create_element("aside");
    doc.set_attr(aside, "class", "toc-sidebar");
    doc.append_child(layout, aside);
    let toc_static = doc.create_element("div");
    doc.set_attr(toc_static, "id", TOC_STATIC_ID);
    doc.append_child(aside, toc_static);
    append_text_element(&mut doc, toc_static, "h2", TOC_TITLE);
    let toc_container = doc.create_element("div");
    doc.set_attr(toc_container, "id", TOC_CONTAINER_ID);
    doc.append_child(aside, toc_container);

    let main = doc.create_element("main");
    doc.set_attr(main, "class", "content");
    doc.append_child(layout, main);
    doc.append_child(main, article);

    doc
}

// ---------------------------------------------------------------------------
// Page augmentation
// ---------------------------------------------------------------------------

/// Run the page-load sequence on `doc`: text walk, TOC generation, and (when
/// `active_href` is given) activation of the matching nav link.
pub fn augment_page<S: AsRef<str>>(
    doc: &mut Document,
    rewriter: &dyn TextRewriter,
    ignored: &[S],
    active_href: Option<&str>,
) -> PageReport {
    let walk = walk_text(doc, rewriter, ignored);
    // Start from an empty container so augmenting twice yields one TOC.
    if let Some(container) = doc.element_by_id(TOC_CONTAINER_ID) {
        doc.clear_children(container);
    }
    let toc = toc::generate_toc(doc).map(|outcome| {
        eprintln!(
            "[toc] assigned={} skipped={} clamped={}",
            outcome.assigned, outcome.skipped, outcome.clamped
        );
        outcome.entries
    });
    let active_link = active_href
        .and_then(|href| nav::activate_href(doc, href))
        .is_some();
    PageReport {
        walk,
        toc,
        active_link,
    }
}

/// Serialize a full page, prefixed with the HTML5 doctype.
pub fn to_document_html(doc: &Document) -> String {
    let mut out = String::from("<!DOCTYPE html>\n");
    out.push_str(&doc.to_html(doc.root()));
    out.push('\n');
    out
}

/// Render, wrap, and augment a markdown file in one step.
///
/// Returns the finished document and the augmentation report.  Logs
/// `[render] path=<file> headings=<n> toc_entries=<m>`.
pub fn render_page<S: AsRef<str>>(
    input: &str,
    file_path: &Path,
    serve_root: &Path,
    ctx: &PageContext,
    rewriter: &dyn TextRewriter,
    ignored: &[S],
    active_href: Option<&str>,
) -> (Document, PageReport) {
    let rendered = render_markdown(input, file_path, serve_root);
    let mut doc = build_page(rendered, file_path, ctx);
    let report = augment_page(&mut doc, rewriter, ignored, active_href);
    eprintln!(
        "[render] path={} headings={} toc_entries={}",
        file_path.display(),
        doc.elements_by_tag_names(toc::HEADING_TAGS).len(),
        report.toc.as_ref().map(Vec::len).unwrap_or(0)
    );
    (doc, report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
