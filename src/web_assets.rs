//! Embedded static web assets.
//!
//! Compiled into the binary via `include_str!` so `serve` needs no asset
//! files on disk.

/// URL path the stylesheet is served from.
pub const CSS_PATH: &str = "/assets/pagetoc.css";

/// Stylesheet for rendered pages: header nav with the active link
/// underlined, sticky TOC sidebar, content column.
pub const CSS: &str = include_str!("assets/pagetoc.css");
