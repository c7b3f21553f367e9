use anyhow::{Context, Result};
use clap::Parser;
use postfeed::app::{App, AppEvent, FeedSettings};
use postfeed::config::Config;
use postfeed::feed::{spawn_category_load, FeedLoader, FilterCriteria, SortKey};
use postfeed::source::{Catalog, CatalogError, CategoryDirectory, DataSource, GraphqlSource};
use postfeed::theme::{self, ThemeVariant};
use postfeed::ui;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Get the config directory path (~/.config/postfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("postfeed"))
}

fn parse_sort(s: &str) -> Result<SortKey, String> {
    SortKey::from_str_name(s).ok_or_else(|| format!("unknown sort key '{}' (newest, oldest, title)", s))
}

#[derive(Parser, Debug)]
#[command(name = "postfeed", about = "Terminal browser for filtered post feeds")]
struct Args {
    /// GraphQL endpoint (overrides config and POSTFEED_GRAPHQL_URL)
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Browse a local SQLite catalog instead of the GraphQL endpoint
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Import a JSON document into the catalog before starting
    #[arg(long, value_name = "FILE", requires = "catalog")]
    import: Option<PathBuf>,

    /// Category the feed is scoped to
    #[arg(long, value_name = "ID")]
    category: Option<String>,

    /// Initial search text
    #[arg(long)]
    search: Option<String>,

    /// Initial sort order: newest, oldest or title
    #[arg(long, value_parser = parse_sort)]
    sort: Option<SortKey>,

    /// Posts per page
    #[arg(long)]
    page_size: Option<usize>,

    /// Config file (default: ~/.config/postfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Log to a file in the config directory when RUST_LOG is set. The terminal
/// belongs to the UI, so nothing is written to stderr.
fn init_logging(config_dir: &Path) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }
    let log_path = config_dir.join("postfeed.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_config(args: &Args, config_dir: &Path) -> Result<Config> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    config.apply_env(|key| std::env::var(key).ok());
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn open_catalog(path: &Path, import: Option<&Path>) -> Result<Arc<Catalog>> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in catalog path"))?;
    let catalog = match Catalog::open(path_str).await {
        Ok(catalog) => catalog,
        Err(CatalogError::Locked) => {
            eprintln!("Error: The catalog is locked by another process. Close it and try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open catalog: {}", e)),
    };

    if let Some(import) = import {
        let summary = catalog
            .import_json(import)
            .await
            .with_context(|| format!("Failed to import {}", import.display()))?;
        println!(
            "Imported {} categories and {} posts from {}",
            summary.categories,
            summary.posts,
            import.display()
        );
    }
    Ok(Arc::new(catalog))
}

fn graphql_source(config: &Config) -> Result<Arc<GraphqlSource>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let source = GraphqlSource::new(client, config.endpoint.clone(), timeout)
        .with_token(config.api_token());
    Ok(Arc::new(source))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            eprintln!("Warning: could not restrict {}: {}", config_dir.display(), e);
        }
    }

    init_logging(&config_dir)?;
    let config = load_config(&args, &config_dir)?;
    tracing::debug!(?config, "Configuration loaded");

    let variant = ThemeVariant::from_str_name(&config.theme).unwrap_or_else(|| {
        tracing::warn!(theme = %config.theme, "Unknown theme, using default");
        ThemeVariant::default()
    });
    theme::install(variant);

    let (source, directory): (Arc<dyn DataSource>, Arc<dyn CategoryDirectory>) =
        match &args.catalog {
            Some(path) => {
                let catalog = open_catalog(path, args.import.as_deref()).await?;
                (catalog.clone() as Arc<dyn DataSource>, catalog as Arc<dyn CategoryDirectory>)
            }
            None => {
                let graphql = graphql_source(&config)?;
                (graphql.clone() as Arc<dyn DataSource>, graphql as Arc<dyn CategoryDirectory>)
            }
        };
    tracing::info!(source = source.name(), "Data source ready");

    let initial = FilterCriteria::new(args.category.clone(), args.search.clone(), args.sort);
    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(32);
    spawn_category_load(directory, &event_tx);

    let mut app = App::new(
        FeedSettings::from_config(&config),
        initial,
        FeedLoader::new(source),
    );

    ui::run(&mut app, event_tx, event_rx).await?;
    Ok(())
}
