use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use listing_feed::cache::{BlobStore, NoopBlobStore, SqliteBlobStore};
use listing_feed::listing::{SearchFilters, SortField, SortOrder};
use listing_feed::{logging, CacheResult, Config, HttpTransport, ListingsClient};

#[derive(Parser, Debug)]
#[command(name = "listing-feed")]
#[command(about = "Query student housing listings across failover providers")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/listing-feed/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch one page of listings
  List {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    limit: u32,
  },
  /// Fetch a single listing with landlord details
  Get { id: String },
  /// Search listings
  Search {
    query: String,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long)]
    location: Option<String>,
    /// Required amenity (repeatable)
    #[arg(long = "amenity")]
    amenities: Vec<String>,
    /// price, name, created_at, relevance or distance
    #[arg(long)]
    sort_by: Option<SortField>,
    /// asc or desc
    #[arg(long)]
    sort_order: Option<SortOrder>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    limit: u32,
  },
  /// Inspect or clear the local cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
  /// Show provider health
  Providers,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  Stats,
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let backing: Arc<dyn BlobStore> = if config.cache.persist {
    let store = match &config.cache.path {
      Some(path) => SqliteBlobStore::open_at(path)?,
      None => SqliteBlobStore::open()?,
    };
    Arc::new(store)
  } else {
    Arc::new(NoopBlobStore)
  };

  let client = ListingsClient::from_config(&config, Arc::new(HttpTransport::new()?), backing)?;

  match args.command {
    Command::List { page, limit } => {
      let result = client.list_page(page, limit).await.map_err(|e| eyre!(e))?;
      print_result(result)?;
    }
    Command::Get { id } => {
      let result = client.get_by_id(id.as_str()).await.map_err(|e| eyre!(e))?;
      print_result(result)?;
    }
    Command::Search {
      query,
      min_price,
      max_price,
      location,
      amenities,
      sort_by,
      sort_order,
      page,
      limit,
    } => {
      let filters = SearchFilters {
        min_price,
        max_price,
        location,
        amenities,
        sort_by,
        sort_order,
      };
      let result = client
        .search(&query, &filters, page, limit)
        .await
        .map_err(|e| eyre!(e))?;
      print_result(result)?;
    }
    Command::Cache { action } => match action {
      CacheAction::Stats => print_json(&client.cache_stats())?,
      CacheAction::Clear => client.clear_cache(),
    },
    Command::Providers => print_json(&client.provider_status())?,
  }

  // snapshot writes run in the background; let them land before exiting
  client.flush().await;

  Ok(())
}

fn print_result<T: Serialize>(result: CacheResult<T>) -> Result<()> {
  info!(source = ?result.source, "Query complete");
  print_json(&result.data)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  let json = serde_json::to_string_pretty(value)
    .map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", json);
  Ok(())
}
