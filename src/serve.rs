use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::Response,
    Router,
};
use tokio::signal;
use tower_http::compression::CompressionLayer;

use crate::config::{self, NavItem, SiteConfig};
use crate::html::{self, PageContext};
use crate::text_walk;
use crate::toc::TocEntry;
use crate::web_assets;

/// Maximum number of consecutive ports to try before giving up.
const MAX_PORT_ATTEMPTS: u16 = 100;

/// Maximum file size that will be read and served (16 MiB).
pub const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Shared, read-only state handed to every request via `Arc<AppState>`.
pub struct AppState {
    /// Canonicalized directory pages and assets are served from.
    pub canonical_root: PathBuf,
    /// Page served for `/`.
    pub entry_file: PathBuf,
    pub config: SiteConfig,
    /// Navigation bar, resolved once at startup.
    pub nav: Vec<NavItem>,
}

/// Bind `bind_addr`, starting at `start_port` and moving to the next port on
/// `EADDRINUSE`, at most `MAX_PORT_ATTEMPTS` times.  Other errors fail
/// immediately.
pub fn bind_with_retry(bind_addr: &str, start_port: u16) -> Result<(TcpListener, u16), String> {
    let mut port = start_port;
    eprintln!("[bind] trying port={port}");
    for _ in 0..MAX_PORT_ATTEMPTS {
        match TcpListener::bind((bind_addr, port)) {
            Ok(listener) => {
                eprintln!("[bind] success port={port}");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                port = port.wrapping_add(1);
                eprintln!("[bind] EADDRINUSE, trying {port}");
            }
            Err(e) => return Err(format!("bind {bind_addr}:{port} failed: {e}")),
        }
    }
    Err(format!(
        "exhausted {MAX_PORT_ATTEMPTS} port candidates starting at {start_port}; all ports in use"
    ))
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Why a request path was refused.  Everything except `TooLarge` is a 404.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    InvalidEncoding,
    NullByte,
    Traversal,
    NotFound,
    OutsideRoot,
    TooLarge(u64),
}

impl Denial {
    fn reason(self) -> &'static str {
        match self {
            Denial::InvalidEncoding => "invalid-percent-encoding",
            Denial::NullByte => "null-byte",
            Denial::Traversal => "path-traversal",
            Denial::NotFound => "not-found",
            Denial::OutsideRoot => "outside-root",
            Denial::TooLarge(_) => "too-large",
        }
    }
}

/// A request path mapped to a file inside the serve root.
#[derive(Debug)]
pub struct Resolved {
    /// Canonical path of the file.
    pub path: PathBuf,
    /// Root-relative URL of the file, e.g. `/docs/guide.md`.
    pub url_path: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Which lookup rule matched.
    pub branch: &'static str,
}

/// Percent-decode a URL path.  Malformed escapes and non-UTF-8 results are
/// errors.
pub fn percent_decode(encoded: &str) -> Result<String, ()> {
    fn hex(b: u8) -> Result<u8, ()> {
        match b {
            b'0'..=b'9' => Ok(b - b'0'),
            b'a'..=b'f' => Ok(b - b'a' + 10),
            b'A'..=b'F' => Ok(b - b'A' + 10),
            _ => Err(()),
        }
    }

    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let (Some(&hi), Some(&lo)) = (bytes.get(i + 1), bytes.get(i + 2)) else {
                return Err(());
            };
            out.push((hex(hi)? << 4) | hex(lo)?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ())
}

/// Drop `.` and empty components and apply `..`.  `None` when `..` would
/// climb above the root.
pub fn normalize_path(decoded: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for component in decoded.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name),
        }
    }
    Some(parts.iter().collect())
}

/// `Content-Type` for a file extension, case-insensitive.  Unknown types
/// are `application/octet-stream` so browsers never sniff.
pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "md" | "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Find the file a candidate path refers to.
///
/// Order: the exact file; for a directory its `README.md` then `index.md`;
/// for an extensionless path `<path>.md`.
async fn resolve_candidate(candidate: &Path) -> Option<(PathBuf, &'static str)> {
    match tokio::fs::metadata(candidate).await {
        Ok(meta) if meta.is_file() => return Some((candidate.to_path_buf(), "exact")),
        Ok(meta) if meta.is_dir() => {
            for (name, branch) in [("README.md", "readme"), ("index.md", "index")] {
                let path = candidate.join(name);
                if is_file(&path).await {
                    return Some((path, branch));
                }
            }
            return None;
        }
        _ => {}
    }

    if candidate.extension().is_none() {
        let with_md = candidate.with_extension("md");
        if is_file(&with_md).await {
            return Some((with_md, "extensionless"));
        }
    }
    None
}

/// Root-relative URL for a canonical path inside `root`.
fn url_path_for(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", parts.join("/"))
}

/// Map a raw request path onto a file inside the serve root.
///
/// Decoding happens before normalization so encoded `..` segments are caught.
/// The resolved file is canonicalized and re-checked against the root so
/// symlinks cannot escape it.
pub async fn resolve_request_path(state: &AppState, raw_path: &str) -> Result<Resolved, Denial> {
    let decoded = percent_decode(raw_path).map_err(|_| Denial::InvalidEncoding)?;
    if decoded.contains('\0') {
        return Err(Denial::NullByte);
    }
    let normalized = normalize_path(&decoded).ok_or(Denial::Traversal)?;

    let (found, branch) = if normalized.as_os_str().is_empty() {
        (state.entry_file.clone(), "entry")
    } else {
        resolve_candidate(&state.canonical_root.join(&normalized))
            .await
            .ok_or(Denial::NotFound)?
    };

    let canonical = tokio::fs::canonicalize(&found)
        .await
        .map_err(|_| Denial::NotFound)?;
    if !canonical.starts_with(&state.canonical_root) {
        return Err(Denial::OutsideRoot);
    }

    let meta = tokio::fs::metadata(&canonical)
        .await
        .map_err(|_| Denial::NotFound)?;
    if meta.len() > MAX_FILE_SIZE {
        return Err(Denial::TooLarge(meta.len()));
    }

    Ok(Resolved {
        url_path: url_path_for(&state.canonical_root, &canonical),
        path: canonical,
        size: meta.len(),
        modified: meta.modified().ok(),
        branch,
    })
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// True when `query` has the exact parameter `key=value`.
fn has_query_param(query: &str, key: &str, value: &str) -> bool {
    query
        .split('&')
        .filter_map(|p| p.split_once('='))
        .any(|(k, v)| k == key && v == value)
}

/// Build a response with the mandatory `nosniff` header.
fn respond(
    status: StatusCode,
    content_type: &str,
    modified: Option<SystemTime>,
    body: impl Into<Body>,
) -> Response {
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header("X-Content-Type-Options", "nosniff");
    if let Some(time) = modified {
        builder = builder.header(header::LAST_MODIFIED, httpdate::fmt_http_date(time));
    }
    builder
        .body(body.into())
        .expect("response builder is infallible")
}

/// `If-Modified-Since` check at whole-second resolution, as HTTP dates
/// carry no sub-second part.
fn not_modified_since(modified: SystemTime, since: SystemTime) -> bool {
    let secs = |t: SystemTime| t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    secs(modified) <= secs(since)
}

/// Bodyless 304 carrying `Last-Modified` and no `Content-Type`.
fn not_modified(modified: SystemTime) -> Response {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header("X-Content-Type-Options", "nosniff")
        .header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified))
        .body(Body::empty())
        .expect("response builder is infallible")
}

fn denial_response(denial: Denial, raw_path: &str) -> Response {
    match denial {
        Denial::TooLarge(size) => respond(
            StatusCode::PAYLOAD_TOO_LARGE,
            "text/plain; charset=utf-8",
            None,
            format!(
                "Content Too Large: {raw_path} ({size} bytes exceeds {MAX_FILE_SIZE} byte limit)"
            ),
        ),
        _ => respond(
            StatusCode::NOT_FOUND,
            "text/plain; charset=utf-8",
            None,
            "Not Found",
        ),
    }
}

/// Render a markdown file as an augmented page, with its own nav link active.
fn render_page_html(state: &AppState, resolved: &Resolved, source: &str) -> String {
    let ctx = PageContext {
        site_title: state.config.title.as_deref(),
        nav: &state.nav,
    };
    let rewriter = text_walk::rewriter_for(&state.config.substitutions);
    let (doc, _report) = html::render_page(
        source,
        &resolved.path,
        &state.canonical_root,
        &ctx,
        rewriter.as_ref(),
        &state.config.ignored_containers,
        Some(&resolved.url_path),
    );
    html::to_document_html(&doc)
}

/// TOC entry tree of a markdown file.
fn toc_entries(state: &AppState, resolved: &Resolved, source: &str) -> Vec<TocEntry> {
    let ctx = PageContext {
        site_title: state.config.title.as_deref(),
        nav: &state.nav,
    };
    let rewriter = text_walk::rewriter_for(&state.config.substitutions);
    let (_doc, report) = html::render_page(
        source,
        &resolved.path,
        &state.canonical_root,
        &ctx,
        rewriter.as_ref(),
        &state.config.ignored_containers,
        None,
    );
    report.toc.unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Axum request handler
// ---------------------------------------------------------------------------

/// Serve embedded assets, markdown pages (rendered, `?raw=1`, or
/// `?toc=json`), and static files from the serve root.
async fn serve_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let raw_path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or("").to_owned();
    let if_modified_since = req
        .headers()
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok());

    if raw_path == web_assets::CSS_PATH {
        eprintln!("[request] path={raw_path} mode=asset");
        return respond(
            StatusCode::OK,
            "text/css; charset=utf-8",
            None,
            web_assets::CSS,
        );
    }

    let resolved = match resolve_request_path(&state, &raw_path).await {
        Ok(r) => r,
        Err(denial) => {
            eprintln!(
                "[resolve] path={raw_path} branch=denied reason={}",
                denial.reason()
            );
            return denial_response(denial, &raw_path);
        }
    };
    eprintln!(
        "[resolve] path={} branch={} size={}",
        resolved.url_path, resolved.branch, resolved.size
    );

    if let (Some(modified), Some(since)) = (resolved.modified, if_modified_since) {
        if not_modified_since(modified, since) {
            eprintln!("[request] path={} mode=not-modified", resolved.url_path);
            return not_modified(modified);
        }
    }

    let ext = resolved
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_owned();

    if !ext.eq_ignore_ascii_case("md") {
        return match tokio::fs::read(&resolved.path).await {
            Ok(bytes) => respond(StatusCode::OK, mime_for_ext(&ext), resolved.modified, bytes),
            Err(_) => denial_response(Denial::NotFound, &raw_path),
        };
    }

    let source = match tokio::fs::read_to_string(&resolved.path).await {
        Ok(s) => s,
        Err(_) => return denial_response(Denial::NotFound, &raw_path),
    };

    if has_query_param(&query, "raw", "1") {
        eprintln!("[request] path={} mode=raw", resolved.url_path);
        return respond(
            StatusCode::OK,
            "text/plain; charset=utf-8",
            resolved.modified,
            source,
        );
    }

    if has_query_param(&query, "toc", "json") {
        eprintln!("[request] path={} mode=toc-json", resolved.url_path);
        let entries = toc_entries(&state, &resolved, &source);
        return match serde_json::to_string(&entries) {
            Ok(json) => respond(StatusCode::OK, "application/json", resolved.modified, json),
            Err(e) => respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                None,
                format!("toc serialization failed: {e}"),
            ),
        };
    }

    let page = render_page_html(&state, &resolved, &source);
    eprintln!("[request] path={} mode=rendered", resolved.url_path);
    respond(
        StatusCode::OK,
        "text/html; charset=utf-8",
        resolved.modified,
        page,
    )
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Build the shared state for serving `file` and its directory.
pub fn build_state(file: &Path, config_path: Option<&Path>) -> io::Result<AppState> {
    let entry_file = std::fs::canonicalize(file)?;
    let canonical_root = entry_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    let config = config::discover(config_path, &canonical_root)
        .map_err(|msg| io::Error::new(io::ErrorKind::InvalidData, msg))?;
    let nav = config.nav_items(&canonical_root);
    Ok(AppState {
        canonical_root,
        entry_file,
        config,
        nav,
    })
}

/// Serve `file` and its directory over HTTP until SIGINT.
pub async fn run_serve(
    file: PathBuf,
    bind_addr: String,
    start_port: u16,
    config_path: Option<PathBuf>,
) -> io::Result<()> {
    let state = Arc::new(build_state(&file, config_path.as_deref())?);

    let (std_listener, bound_port) = bind_with_retry(&bind_addr, start_port)
        .map_err(|msg| io::Error::new(io::ErrorKind::AddrInUse, msg))?;
    std_listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;

    let app = Router::new()
        .fallback(serve_handler)
        .with_state(Arc::clone(&state))
        .layer(CompressionLayer::new());

    println!("pagetoc serve");
    println!("root:  {}", state.canonical_root.display());
    println!("entry: {}", state.entry_file.display());
    println!("url:   http://{bind_addr}:{bound_port}/");
    eprintln!("[serve] listening on {bind_addr}:{bound_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                eprintln!("[shutdown] signal handler failed: {e}");
            }
            eprintln!("[shutdown] complete");
        })
        .await
        .map_err(io::Error::other)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
