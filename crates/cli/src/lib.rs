use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::{Document, PageIndex, ScrollAxis, SitemapEntry, ThumbnailSize, ViewerConfig};
use log::{debug, info};
use pageview_scheduler::{SlotId, SlotState, ThumbnailPipeline, WorkerPoolConfig};
use pdf_engine::PdfDocument;
use serde::Serialize;
use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use viewer_core::{
    DocumentThumbnails, NavigationCoordinator, NavigationEvent, NavigationOptions,
    ProgrammaticTransition, ScrollOffset, StripLayout, ViewportSize,
};

mod events;
mod session;

pub use events::{parse_viewport, Event};
pub use session::SessionStore;

const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "pageview-cli")]
#[command(about = "Headless host for the pageview navigation core")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log output file path (logs go to stderr otherwise)
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Open a viewing session, replay events and print notifications as JSON lines.
    Navigate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Zero-based page to open; falls back to the saved session, then 0.
        #[arg(long, allow_negative_numbers = true)]
        start_page: Option<i64>,
        /// JSON array of {"title", "page"} entries.
        #[arg(long)]
        sitemap: Option<PathBuf>,
        /// Viewer title (defaults to the file name).
        #[arg(long)]
        title: Option<String>,
        /// Session state file remembering the last viewed page.
        #[arg(long)]
        state: Option<PathBuf>,
        /// Event to replay, in order (repeatable).
        #[arg(long = "event", value_name = "EVENT")]
        events: Vec<Event>,
        /// Wait for visible strip thumbnails and report them.
        #[arg(long)]
        thumbnails: bool,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Render a thumbnail PNG for a page.
    RenderThumb {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 120)]
        width: u32,
        #[arg(long, default_value_t = 160)]
        height: u32,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, clap::Args)]
struct ViewArgs {
    /// Viewer config (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Paging axis; overrides the config file.
    #[arg(long)]
    axis: Option<ScrollAxis>,
    /// Viewport size as <W>x<H>.
    #[arg(long, value_parser = parse_viewport, default_value = "1024x768")]
    viewport: ViewportSize,
    /// Hide the thumbnail strip.
    #[arg(long)]
    no_thumbnails: bool,
}

impl ViewArgs {
    fn config(&self) -> Result<ViewerConfig> {
        let mut config = match &self.config {
            Some(path) => ViewerConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ViewerConfig::default(),
        };
        if let Some(axis) = self.axis {
            config.axis = axis;
        }
        if self.no_thumbnails {
            config.thumbnails_enabled = false;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    title: String,
    page_count: u32,
    strip_width: f64,
}

/// One JSON line of `navigate` output.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Output {
    Opened {
        title: String,
        index: PageIndex,
        page_count: u32,
        counter: String,
        strip_width: f64,
        sitemap_row: Option<usize>,
    },
    PageChanged {
        index: PageIndex,
        page_count: u32,
        counter: String,
    },
    SitemapSelectionChanged {
        row: Option<usize>,
    },
    ScrollToPage {
        index: PageIndex,
    },
    RenderPage {
        index: PageIndex,
    },
    ThumbnailReady {
        slot: usize,
        page_index: PageIndex,
        width: u32,
        height: u32,
    },
    Closed {
        index: PageIndex,
        counter: String,
    },
}

impl From<&NavigationEvent> for Output {
    fn from(event: &NavigationEvent) -> Self {
        match event {
            NavigationEvent::PageChanged { index, page_count, counter } => {
                Self::PageChanged {
                    index: *index,
                    page_count: *page_count,
                    counter: counter.to_string(),
                }
            }
            NavigationEvent::SitemapSelectionChanged { row } => {
                Self::SitemapSelectionChanged { row: *row }
            }
            NavigationEvent::ScrollToPage { index } => Self::ScrollToPage { index: *index },
            NavigationEvent::RenderPage { index } => Self::RenderPage { index: *index },
            NavigationEvent::ThumbnailReady { slot, page_index, image } => Self::ThumbnailReady {
                slot: slot.0,
                page_index: *page_index,
                width: image.width(),
                height: image.height(),
            },
        }
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.log.as_deref())?;

    match cli.command {
        Commands::Info { file, view } => run_info(&file, &view),
        Commands::Navigate {
            file,
            start_page,
            sitemap,
            title,
            state,
            events,
            thumbnails,
            view,
        } => {
            let session = NavigateSession {
                start_page,
                sitemap,
                title,
                state,
                events,
                thumbnails,
            };
            run_navigate(&file, &view, session)
        }
        Commands::RenderThumb { file, page, width, height, output } => {
            run_render_thumb(&file, page, width, height, output.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(log: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(path) = log {
        let file = fs::File::create(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    // Already initialised when run more than once in-process.
    let _ = builder.try_init();
    Ok(())
}

fn run_info(file: &Path, view: &ViewArgs) -> Result<()> {
    let document = open_document(file)?;
    let config = view.config()?;

    let strip_width = if config.thumbnails_enabled {
        StripLayout::from_config(&config).strip_width(document.page_count(), view.viewport.width)
    } else {
        0.0
    };

    let payload = InfoOutput {
        path: file.display().to_string(),
        title: document.file_name().to_string(),
        page_count: document.page_count(),
        strip_width,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

struct NavigateSession {
    start_page: Option<i64>,
    sitemap: Option<PathBuf>,
    title: Option<String>,
    state: Option<PathBuf>,
    events: Vec<Event>,
    thumbnails: bool,
}

fn run_navigate(file: &Path, view: &ViewArgs, session: NavigateSession) -> Result<()> {
    let document = Arc::new(open_document(file)?);
    let config = view.config()?;
    let axis = config.axis;

    let sitemap = session.sitemap.as_deref().map(load_sitemap).transpose()?;
    let store = session.state.as_ref().map(SessionStore::new);

    let start_page_index = match (session.start_page, &store) {
        (Some(index), _) => index,
        (None, Some(store)) => store.last_page(file)?.map_or(0, i64::from),
        (None, None) => 0,
    };

    let options = NavigationOptions {
        title: session.title,
        start_page_index,
        sitemap,
        config,
        viewport: view.viewport,
    };
    let mut coordinator =
        NavigationCoordinator::new(document, options).context("failed to start viewer")?;

    let pending = Rc::new(RefCell::new(Vec::new()));
    let sink = pending.clone();
    coordinator
        .subscribe(move |event: &NavigationEvent| sink.borrow_mut().push(Output::from(event)));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    emit(
        &mut out,
        &Output::Opened {
            title: coordinator.title().to_string(),
            index: coordinator.current_index(),
            page_count: coordinator.page_count(),
            counter: coordinator.page_counter().to_string(),
            strip_width: coordinator.strip_width(),
            sitemap_row: coordinator.active_sitemap_row(),
        },
    )?;

    for event in session.events {
        debug!("replaying {}", event);
        match event {
            Event::Scroll(offset) => {
                coordinator.on_scroll(ScrollOffset::along(axis, offset));
            }
            Event::Thumb(index) => {
                coordinator.tap_thumbnail(index);
            }
            Event::Sitemap(row) => {
                coordinator.tap_sitemap_row(row);
            }
            Event::Goto(index) => {
                coordinator.go_to_page(index);
            }
            Event::Resize(viewport) => coordinator.resize(viewport),
            Event::TapStrip(x) => {
                coordinator.tap_strip(x);
            }
            Event::ScrollStrip(offset) => coordinator.scroll_strip(offset),
            Event::BeginTransition => coordinator.begin_programmatic_transition(),
            Event::EndTransition => coordinator.end_programmatic_transition(),
            Event::Layout => coordinator.layout_pass(),
        }
        flush(&mut out, &pending)?;
    }

    if session.thumbnails {
        let delivered = coordinator.wait_for_thumbnails(THUMBNAIL_TIMEOUT);
        info!("{} thumbnail(s) delivered", delivered);
        flush(&mut out, &pending)?;
    }

    let index = coordinator.current_index();
    emit(&mut out, &Output::Closed { index, counter: coordinator.page_counter().to_string() })?;

    if let Some(store) = &store {
        store.remember(file, index)?;
    }
    coordinator.close();

    Ok(())
}

fn run_render_thumb(
    file: &Path,
    page: u32,
    width: u32,
    height: u32,
    output: Option<&Path>,
) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let document = Arc::new(open_document(file)?);
    let page_index = page - 1;
    if page_index >= document.page_count() {
        anyhow::bail!("page {page} out of range (page_count={})", document.page_count());
    }

    let size = ThumbnailSize { width_px: width.max(1), height_px: height.max(1) };
    let source = DocumentThumbnails::new(document, size);
    let config = WorkerPoolConfig::from(&ViewerConfig::default());
    let mut pipeline = ThumbnailPipeline::new(Arc::new(source), &config)
        .context("failed to start thumbnail workers")?;

    let slot = SlotId(0);
    pipeline.request(slot, page_index)?;
    pipeline.wait_idle(THUMBNAIL_TIMEOUT);

    let image = match pipeline.state(slot) {
        Some(SlotState::Ready { image, .. }) => image.clone(),
        Some(SlotState::Failed { .. }) => {
            anyhow::bail!("failed to render thumbnail for page {page}")
        }
        _ => anyhow::bail!("timed out rendering thumbnail for page {page}"),
    };
    pipeline.shutdown();

    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_thumbnail_output(file, page));

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn open_document(path: &Path) -> Result<PdfDocument> {
    ensure_pdf_exists(path)?;
    PdfDocument::open(path).context("failed to open PDF")
}

fn load_sitemap(path: &Path) -> Result<Vec<SitemapEntry>> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read sitemap {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse sitemap {}", path.display()))
}

fn emit(out: &mut impl Write, output: &Output) -> Result<()> {
    serde_json::to_writer(&mut *out, output)?;
    writeln!(out)?;
    Ok(())
}

fn flush(out: &mut impl Write, pending: &RefCell<Vec<Output>>) -> Result<()> {
    for output in pending.borrow_mut().drain(..) {
        emit(out, &output)?;
    }
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_thumbnail_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("thumbnail");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
