//! Navigation links and their `active` state.

use crate::dom::{Document, NodeId};

/// Class marking the navigation link of the current page.
pub const ACTIVE_CLASS: &str = "active";

/// All `<a>` elements inside a `<nav>`, in document order.
pub fn nav_links(doc: &Document) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .filter(|&n| doc.tag(n) == Some("a"))
        .filter(|&n| doc.ancestors(n).any(|a| doc.tag(a) == Some("nav")))
        .collect()
}

/// Mark `clicked` active and clear the class from every other link.
pub fn activate(doc: &mut Document, links: &[NodeId], clicked: NodeId) {
    for &link in links {
        doc.remove_class(link, ACTIVE_CLASS);
    }
    doc.add_class(clicked, ACTIVE_CLASS);
}

/// Activate the nav link whose `href` equals `href`.
///
/// Returns the activated link, or `None` (leaving every link untouched) when
/// nothing matches.
pub fn activate_href(doc: &mut Document, href: &str) -> Option<NodeId> {
    let links = nav_links(doc);
    let target = links
        .iter()
        .copied()
        .find(|&l| doc.attr(l, "href") == Some(href))?;
    activate(doc, &links, target);
    Some(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `<nav>` with one link per href, plus a stray link outside the nav.
    fn page(hrefs: &[&str]) -> (Document, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let body = doc.create_element("body");
        let nav = doc.create_element("nav");
        let ul = doc.create_element("ul");
        doc.append_child(root, body);
        doc.append_child(body, nav);
        doc.append_child(nav, ul);
        for href in hrefs {
            let li = doc.create_element("li");
            let a = doc.create_element("a");
            doc.set_attr(a, "href", href);
            doc.append_child(li, a);
            doc.append_child(ul, li);
        }
        let stray = doc.create_element("a");
        doc.set_attr(stray, "href", "/elsewhere");
        doc.append_child(body, stray);
        (doc, stray)
    }

    fn active_links(doc: &Document) -> Vec<NodeId> {
        nav_links(doc)
            .into_iter()
            .filter(|&l| doc.has_class(l, ACTIVE_CLASS))
            .collect()
    }

    #[test]
    fn nav_links_excludes_links_outside_nav() {
        let (doc, stray) = page(&["/a.md", "/b.md"]);
        let links = nav_links(&doc);
        assert_eq!(links.len(), 2);
        assert!(!links.contains(&stray));
    }

    #[test]
    fn click_leaves_exactly_one_active_link() {
        let (mut doc, _) = page(&["/a.md", "/b.md", "/c.md"]);
        let links = nav_links(&doc);

        activate(&mut doc, &links, links[0]);
        activate(&mut doc, &links, links[2]);
        assert_eq!(active_links(&doc), vec![links[2]]);

        activate(&mut doc, &links, links[2]);
        assert_eq!(active_links(&doc), vec![links[2]]);
    }

    #[test]
    fn activation_preserves_other_classes() {
        let (mut doc, _) = page(&["/a.md", "/b.md"]);
        let links = nav_links(&doc);
        doc.add_class(links[0], "nav-link");
        activate(&mut doc, &links, links[0]);
        activate(&mut doc, &links, links[1]);
        assert_eq!(doc.attr(links[0], "class"), Some("nav-link"));
    }

    #[test]
    fn activate_href_matches_exact_href() {
        let (mut doc, _) = page(&["/a.md", "/b.md"]);
        let hit = activate_href(&mut doc, "/b.md").expect("link exists");
        assert_eq!(active_links(&doc), vec![hit]);
    }

    #[test]
    fn activate_href_without_match_changes_nothing() {
        let (mut doc, _) = page(&["/a.md", "/b.md"]);
        let links = nav_links(&doc);
        activate(&mut doc, &links, links[0]);
        assert!(activate_href(&mut doc, "/missing.md").is_none());
        assert_eq!(active_links(&doc), vec![links[0]]);
    }
}
