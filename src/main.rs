use clap::Parser;
use media_catalogue::directory::{DirectoryLoader, VersionHistory};
use media_catalogue::media::Size;
use media_catalogue::{
    ActiveFilterSet, Catalog, CatalogConfig, CatalogueContext, Category, CategoryRegistry, FilterPredicate, LoadState,
    MatchMode,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

/// Build a thumbnail catalog from a directory tree and list what the grid would show
#[derive(Parser, Debug)]
#[command(name = "media-catalogue", version)]
struct Args {
    /// Root directory; its sub-directories become child collections
    dir: PathBuf,

    /// Thumbnail box, e.g. 285x150 (overrides the configured size)
    #[arg(long)]
    size: Option<Size>,

    /// Tag filter: `key` (present), `!key` (absent) or `key=a,b`
    #[arg(long = "filter")]
    filters: Vec<FilterPredicate>,

    /// Keep items matching any filter instead of all of them
    #[arg(long)]
    any: bool,

    /// Case-insensitive regular expression over file paths
    #[arg(long)]
    pattern: Option<String>,

    /// Config file (default: the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Log filter when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "info";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_LOG_FILTER)).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => CatalogConfig::load_from(path)?,
        None => CatalogConfig::load()?,
    };
    if let Some(size) = args.size {
        config.thumbnail_size = size;
        config.size_scale_percent = 100;
    }

    if !args.dir.is_dir() {
        return Err(format!("{} is not a directory", args.dir.display()).into());
    }

    // One category per run, rooted at the given directory
    let loader = DirectoryLoader::new();
    let mut categories = CategoryRegistry::new();
    categories.register(
        Category::new("Folders", "Disk")
            .with_roots(vec![loader.descriptor(&args.dir)])
            .with_history(Arc::new(VersionHistory::new())),
    );
    let category = categories.get("Folders").ok_or("category not registered")?;

    let catalog = Catalog::new(&config)?;
    println!(
        "🎨 Media catalogue: {} decode slot(s), thumbnails up to {}",
        catalog.coordinator().concurrency(),
        config.scaled_thumbnail_size()
    );

    let mut context = CatalogueContext::new(category, catalog);
    let root = *context.tree().roots().first().ok_or("no root collection")?;

    println!("🔍 Scanning folder: {}", args.dir.display());
    context.expand(root)?;
    let children = context.tree().children(root)?.len();

    let started = Instant::now();
    let queued = context.check(root)?.len();
    println!("⏳ Decoding {} file(s), {} sub-collection(s) not loaded", queued, children);
    context.catalog_mut().drain();

    for item in context.catalog().iter() {
        match (item.state(), item.image()) {
            (LoadState::Loaded, Some(image)) => println!("  ✅ {} ({})", item.label(), image.size()),
            _ => println!(
                "  ⚠️  {}: {}",
                item.label(),
                item.error().unwrap_or("not loaded")
            ),
        }
    }

    let loaded = context.catalog().count_in_state(LoadState::Loaded);
    let failed = context.catalog().count_in_state(LoadState::Failed);
    println!(
        "📊 {} loaded, {} failed in {:.2?}",
        loaded,
        failed,
        started.elapsed()
    );

    let mut filters = ActiveFilterSet::new(if args.any { MatchMode::Any } else { MatchMode::All });
    for predicate in args.filters {
        filters.insert(predicate);
    }
    context.set_filters(filters);
    if let Some(pattern) = &args.pattern {
        context.set_pattern(pattern)?;
    }

    let visible = context.visible();
    println!("👁  {} of {} visible", visible.len(), context.catalog().len());
    for id in visible {
        if let Some(item) = context.catalog().get(id) {
            println!("  {}", item.path().display());
        }
    }

    Ok(())
}
