//! vellum - Document ingestion and pagination

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;

use vellum::{Document, ExtractMode, LayoutConfig, LoadOptions, MonospaceMeasurer, ReaderSession};

#[derive(Parser)]
#[command(name = "vellum")]
#[command(version, about = "Load and paginate documents", long_about = None)]
#[command(after_help = "EXAMPLES:
    vellum -i book.epub              Show document metadata
    vellum -c book.epub              List chapters with their first pages
    vellum -p 12 notes.txt           Print page 12
    vellum --config layout.json -p 1 book.epub")]
struct Cli {
    /// Input file (EPUB, TXT, or RTF)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Show document metadata
    #[arg(short, long)]
    info: bool,

    /// List chapters and the page each starts on
    #[arg(short, long)]
    chapters: bool,

    /// Print the given page (1-based)
    #[arg(short, long, value_name = "N")]
    page: Option<usize>,

    /// Layout configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Font size in points
    #[arg(long)]
    font_size: Option<f64>,

    /// Line height as a multiple of the font size
    #[arg(long)]
    line_spacing: Option<f64>,

    /// Horizontal margin
    #[arg(long)]
    margin: Option<f64>,

    /// Viewport width
    #[arg(long)]
    width: Option<f64>,

    /// Viewport height
    #[arg(long)]
    height: Option<f64>,

    /// Extract packages in memory instead of to a scratch directory
    #[arg(long)]
    in_memory: bool,

    /// Suppress output messages
    #[arg(short, long)]
    quiet: bool,

    /// Log debug output to stderr
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else if cli.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let options = LoadOptions {
        extract_mode: if cli.in_memory {
            ExtractMode::InMemory
        } else {
            ExtractMode::Scratch
        },
        ..LoadOptions::default()
    };
    let doc = Document::open_with(&cli.input, &options, None).map_err(|e| e.to_string())?;

    if cli.info {
        show_info(cli, &doc);
        if !cli.chapters && cli.page.is_none() {
            return Ok(());
        }
    }

    let config = layout_config(cli)?;
    let mut session =
        ReaderSession::new(doc, Arc::new(MonospaceMeasurer::default())).map_err(|e| e.to_string())?;
    session.relayout(config).map_err(|e| e.to_string())?;
    session.wait();

    if cli.chapters {
        list_chapters(&mut session);
    }

    if let Some(page) = cli.page {
        let shown = session.go_to_page(page.saturating_sub(1));
        if !cli.quiet {
            println!("-- page {} of {} --", shown + 1, session.page_count());
        }
        println!("{}", session.current_page_text().unwrap_or(""));
    } else if !cli.chapters && !cli.quiet {
        println!("{} pages", session.page_count());
    }

    Ok(())
}

fn layout_config(cli: &Cli) -> Result<LayoutConfig, String> {
    let mut config = match &cli.config {
        Some(path) => LayoutConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => LayoutConfig::default(),
    };
    if let Some(v) = cli.font_size {
        config.font_size = v;
    }
    if let Some(v) = cli.line_spacing {
        config.line_spacing = v;
    }
    if let Some(v) = cli.margin {
        config.margin = v;
    }
    if let Some(v) = cli.width {
        config.viewport_width = v;
    }
    if let Some(v) = cli.height {
        config.viewport_height = v;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn show_info(cli: &Cli, doc: &Document) {
    let meta = doc.metadata();
    println!("File: {}", cli.input.display());
    println!("Title: {}", meta.title);
    if !meta.authors.is_empty() {
        println!("Authors: {}", meta.authors.join(", "));
    }
    if !meta.language.is_empty() {
        println!("Language: {}", meta.language);
    }
    println!("Source: {:?}", doc.kind());
    println!("Chapters: {}", doc.chapters().len());
    println!("TOC entries: {}", doc.toc().len());
    println!("Characters: {}", doc.text().chars().count());
}

fn list_chapters(session: &mut ReaderSession) {
    let titles: Vec<String> = session
        .document()
        .chapters()
        .iter()
        .map(|c| c.title.clone())
        .collect();
    if titles.is_empty() {
        println!("(no chapters)");
        return;
    }
    for (i, title) in titles.iter().enumerate() {
        let page = session.go_to_chapter(i).unwrap_or(0);
        println!("{:>5}  {}", page + 1, title);
    }
    session.go_to_page(0);
}
