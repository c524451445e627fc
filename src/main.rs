mod config;
mod dom;
mod html;
mod nav;
mod serve;
mod text_walk;
mod toc;
mod web_assets;

use std::{
    fs, io,
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};

use html::PageContext;

#[derive(Subcommand)]
enum Commands {
    /// Render a markdown file to a standalone HTML page with a generated TOC
    Render {
        /// Path to the markdown file
        file: PathBuf,
        /// Site configuration file (defaults to pagetoc.yml next to the file)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the page here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the table of contents of a markdown file
    Toc {
        /// Path to the markdown file
        file: PathBuf,
        /// Emit the entry tree as JSON
        #[arg(long)]
        json: bool,
        /// Site configuration file (defaults to pagetoc.yml next to the file)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Serve a markdown file and its directory over HTTP
    Serve {
        /// Path to the markdown file served at `/`
        file: PathBuf,
        /// Interface address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Starting port number for the HTTP server
        #[arg(long, default_value = "3333")]
        port: u16,
        /// Site configuration file (defaults to pagetoc.yml next to the file)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Parser)]
#[command(
    name = "pagetoc",
    version,
    about = "Render markdown pages with a generated table of contents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Print `Error: <msg>` and exit with status 1.
fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    process::exit(1);
}

/// Validate the extension, read the file, and canonicalize its path.
fn read_markdown(file: &Path) -> (String, PathBuf) {
    let shown = file.display();
    match file.extension().and_then(|e| e.to_str()) {
        Some(ext) if ["md", "markdown"].iter().any(|m| ext.eq_ignore_ascii_case(m)) => {}
        Some(ext) => fail(format!(
            "'{ext}' is not a recognized markdown extension (expected .md or .markdown)"
        )),
        None => fail(format!("'{shown}' has no file extension")),
    }

    let source = fs::read_to_string(file).unwrap_or_else(|e| match e.kind() {
        io::ErrorKind::NotFound => fail(format!("file not found: {shown}")),
        io::ErrorKind::PermissionDenied => fail(format!("permission denied: {shown}")),
        _ => fail(format!("reading '{shown}': {e}")),
    });
    let canonical = fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
    (source, canonical)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn run_render(file: &Path, config_path: Option<&Path>, out: Option<&Path>) -> io::Result<()> {
    let (source, canonical) = read_markdown(file);
    let root = parent_dir(&canonical);
    let config = config::discover(config_path, &root).unwrap_or_else(|msg| fail(msg));
    let nav = config.nav_items(&root);
    let ctx = PageContext {
        site_title: config.title.as_deref(),
        nav: &nav,
    };

    let active = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| format!("/{n}"));
    let rewriter = text_walk::rewriter_for(&config.substitutions);
    let (doc, _report) = html::render_page(
        &source,
        &canonical,
        &root,
        &ctx,
        rewriter.as_ref(),
        &config.ignored_containers,
        active.as_deref(),
    );
    let page = html::to_document_html(&doc);

    match out {
        Some(path) => {
            fs::write(path, page)?;
            eprintln!("[render] wrote={}", path.display());
        }
        None => print!("{page}"),
    }
    Ok(())
}

fn run_toc(file: &Path, json: bool, config_path: Option<&Path>) -> io::Result<()> {
    let (source, canonical) = read_markdown(file);
    let root = parent_dir(&canonical);
    let config = config::discover(config_path, &root).unwrap_or_else(|msg| fail(msg));
    let ctx = PageContext {
        site_title: config.title.as_deref(),
        nav: &[],
    };
    let rewriter = text_walk::rewriter_for(&config.substitutions);
    let (_doc, report) = html::render_page(
        &source,
        &canonical,
        &root,
        &ctx,
        rewriter.as_ref(),
        &config.ignored_containers,
        None,
    );
    let entries = report.toc.unwrap_or_default();

    if json {
        let rendered = serde_json::to_string_pretty(&entries).map_err(io::Error::other)?;
        println!("{rendered}");
    } else {
        print!("{}", toc::outline(&entries));
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Render { file, config, out } => {
            run_render(&file, config.as_deref(), out.as_deref())
        }
        Commands::Toc { file, json, config } => run_toc(&file, json, config.as_deref()),
        Commands::Serve {
            file,
            bind,
            port,
            config,
        } => {
            if !file.is_file() {
                fail(format!("file not found: {}", file.display()));
            }
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(serve::run_serve(file, bind, port, config))
        }
    }
}
