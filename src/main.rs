//! board-search CLI - search image boards and manga sources from the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use board_search::adapters::builtin_kinds;
use board_search::{
    AdapterContext, AdapterRegistry, AppConfig, Favorite, FavoritesStore, JsonFavoritesStore,
    LoadOutcome, PaginationController, ResultItem, ScrapeExecutor, SearchService, SessionLauncher,
    SessionPool,
};

/// board-search - Image board and manga search CLI
#[derive(Parser)]
#[command(name = "board-search")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.board-search/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory with adapter manifests
    #[arg(long, global = true)]
    plugins_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available sources
    Sources,

    /// Search a source
    Search(SearchArgs),

    /// List the chapters of an item
    Chapters {
        source: String,
        id: String,
    },

    /// List the page images of a chapter
    Pages {
        source: String,
        chapter_id: String,
    },

    /// Manage favorites
    #[command(subcommand)]
    Favorites(FavoritesCommand),
}

#[derive(Parser)]
struct SearchArgs {
    /// Source name (see `sources`)
    source: String,

    /// Search terms
    query: String,

    /// Number of pages to load
    #[arg(short, long, default_value = "1")]
    pages: u32,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum FavoritesCommand {
    /// List saved favorites
    List,

    /// Save an item
    Add {
        id: String,
        image_url: String,
        #[arg(long)]
        thumbnail: Option<String>,
        /// Tags (comma-separated); the first becomes the title
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Remove a saved item
    Remove { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Compact single-line output
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.plugins_dir {
        config.plugins_dir = dir;
    }

    match cli.command {
        Commands::Favorites(command) => run_favorites(&config, command).await,
        command => {
            let (service, pool) = build_service(&config)?;
            let outcome = run_source_command(&service, command).await;
            pool.shutdown().await;
            outcome
        }
    }
}

fn build_service(config: &AppConfig) -> Result<(Arc<SearchService>, Arc<SessionPool>)> {
    let mut http = reqwest::Client::builder().user_agent(user_agent(config));
    if let Some(ref proxy) = config.proxy_url {
        http = http.proxy(reqwest::Proxy::all(proxy)?);
    }
    let http = http.build()?;

    let pool = Arc::new(SessionPool::new(launcher(config)));
    let mut executor = ScrapeExecutor::new(Arc::clone(&pool));
    if let Some(budget) = config.browser.call_timeout() {
        executor = executor.with_call_timeout(budget);
    }

    let ctx = AdapterContext::new(http, Arc::new(executor));
    let registry = AdapterRegistry::from_plugin_dir(&config.plugins_dir, ctx, builtin_kinds())?;
    debug!("{} source(s) registered", registry.len());

    let mut service = SearchService::new(Arc::new(registry));
    service.set_timeout(config.search_timeout());
    Ok((Arc::new(service), pool))
}

#[cfg(feature = "headless")]
fn user_agent(config: &AppConfig) -> String {
    config
        .user_agent
        .clone()
        .unwrap_or_else(|| board_search::browser::DEFAULT_USER_AGENT.to_string())
}

#[cfg(not(feature = "headless"))]
fn user_agent(config: &AppConfig) -> String {
    config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("board-search/{}", env!("CARGO_PKG_VERSION")))
}

#[cfg(feature = "headless")]
fn launcher(config: &AppConfig) -> Arc<dyn SessionLauncher> {
    use board_search::browser::{BrowserLaunchConfig, ChromiumLauncher};

    Arc::new(ChromiumLauncher::new(BrowserLaunchConfig {
        headless: config.browser.headless,
        chrome_path: config.browser.chrome_path.clone(),
        proxy_url: config.proxy_url.clone(),
        user_agent: user_agent(config),
        launch_args: config.browser.launch_args.clone(),
    }))
}

#[cfg(not(feature = "headless"))]
fn launcher(_config: &AppConfig) -> Arc<dyn SessionLauncher> {
    Arc::new(board_search::session::UnavailableLauncher)
}

async fn run_source_command(service: &Arc<SearchService>, command: Commands) -> Result<()> {
    match command {
        Commands::Sources => list_sources(service).await,
        Commands::Search(args) => run_search(service, args).await,
        Commands::Chapters { source, id } => {
            let response = service.get_chapters(&source, &id).await;
            if let Some(cover) = response.extra.as_ref().and_then(|e| e.get("cover")) {
                println!("Cover: {}", cover.as_str().unwrap_or_default());
            }
            for chapter in response.into_result().map_err(anyhow::Error::msg)? {
                let title = chapter.title.as_deref().unwrap_or("");
                let number = chapter.chapter.as_deref().unwrap_or("-");
                println!("{}\t{}\t{}", number, chapter.id, title);
            }
            Ok(())
        }
        Commands::Pages { source, chapter_id } => {
            let pages = service
                .get_pages(&source, &chapter_id)
                .await
                .into_result()
                .map_err(anyhow::Error::msg)?;
            for page in pages {
                println!("{}\t{}", page.index, page.url);
            }
            Ok(())
        }
        Commands::Favorites(_) => Ok(()),
    }
}

async fn list_sources(service: &SearchService) -> Result<()> {
    let sources = service.get_sources().await;
    if sources.is_empty() {
        println!("No sources installed.");
        return Ok(());
    }
    println!("Available sources:\n");
    for source in sources {
        match source.content_type {
            Some(kind) => println!("  {:<20} {} ({})", source.name, source.url, kind),
            None => println!("  {:<20} {}", source.name, source.url),
        }
    }
    Ok(())
}

async fn run_search(service: &Arc<SearchService>, args: SearchArgs) -> Result<()> {
    let controller = PaginationController::new(Arc::clone(service));

    let mut outcome = controller.perform_search(&args.source, &args.query).await;
    let mut loaded = 1;
    while loaded < args.pages && matches!(outcome, LoadOutcome::Loaded { .. }) {
        outcome = controller.load_next().await;
        loaded += 1;
    }

    let state = controller.snapshot().await;
    match args.format {
        OutputFormat::Text => {
            println!(
                "\nResults for \"{}\" on {} ({} items):\n",
                state.query.as_deref().unwrap_or_default(),
                args.source,
                state.items.len()
            );
            for (i, item) in state.items.iter().enumerate() {
                print_item(i + 1, item);
            }
            if let Some(reason) = state.end_reason {
                println!("End of results: {:?}", reason);
            } else if state.has_next_page {
                println!("More results available from page {}", state.page);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        OutputFormat::Compact => {
            for item in &state.items {
                println!("{}\t{}", item.id, item.display_url);
            }
        }
    }

    Ok(())
}

fn print_item(n: usize, item: &ResultItem) {
    println!("{}. {}", n, item.id);
    println!("   URL: {}", item.display_url);
    if item.thumbnail_ref != item.display_url {
        println!("   Thumbnail: {}", item.thumbnail_ref);
    }
    if !item.tags.is_empty() {
        let tags = if item.tags.len() > 12 {
            format!("{} ...", item.tags[..12].join(" "))
        } else {
            item.tags.join(" ")
        };
        println!("   Tags: {}", tags);
    }
    println!();
}

async fn run_favorites(config: &AppConfig, command: FavoritesCommand) -> Result<()> {
    let store = match config.favorites_path {
        Some(ref path) => JsonFavoritesStore::open(path).await?,
        None => JsonFavoritesStore::in_memory(),
    };

    match command {
        FavoritesCommand::List => {
            let favorites = store.get_all().await;
            if favorites.is_empty() {
                println!("You haven't saved any favorites yet.");
            }
            for favorite in favorites {
                println!("{}\t{}\t{}", favorite.id, favorite.title, favorite.image_url);
            }
        }
        FavoritesCommand::Add {
            id,
            image_url,
            thumbnail,
            tags,
        } => {
            let mut item = ResultItem::new(id, image_url).with_tags(tags);
            if let Some(thumbnail) = thumbnail {
                item = item.with_thumbnail(thumbnail);
            }
            let result = store.add(Favorite::from_item(&item)).await;
            match result.error {
                Some(error) => anyhow::bail!(error),
                None => println!("Added to favorites!"),
            }
        }
        FavoritesCommand::Remove { id } => {
            let result = store.remove(&id).await;
            if let Some(error) = result.error {
                anyhow::bail!(error);
            }
            if result.success {
                println!("Removed from favorites.");
            } else {
                println!("No favorite with id {}", id);
            }
        }
    }

    Ok(())
}
