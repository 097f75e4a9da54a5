mod cache;
mod catalog;
mod config;
mod db;
mod http;
mod logging;
mod net;
mod store;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use cache::{should_cache, CacheSource, CacheStorage, CachedResponse, SqliteStorage};
use catalog::{Catalog, Category, Listing, SearchFilters};
use db::Database;
use http::{Method, Request, RequestMode};
use net::HttpNetwork;
use store::cart::{CartItem, CartStore, Variant};
use store::search::SearchHistoryStore;
use store::settings::SettingsStore;
use store::{LocalStorage, SqliteKeyValueStore};
use worker::{
  FetchOutcome, LogNotifier, OfflineController, Registration, UpdateOutcome, WorkerSettings,
};

#[derive(Parser, Debug)]
#[command(name = "swumarket-offline")]
#[command(about = "Offline cache controller for the Swumarket web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swumarket/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin to control, overriding the config file
  #[arg(short, long)]
  origin: Option<Url>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install and activate the configured cache version
  Install,
  /// Show the controller, cache buckets and pending sync queues
  Status,
  /// Route a request through the controller
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// Send in no-cors mode
    #[arg(long, conflicts_with = "navigate")]
    no_cors: bool,
    /// Print the response body
    #[arg(long)]
    body: bool,
  },
  /// Look a URL up in the cache without touching the network
  Cached {
    url: String,
    /// Only look in this bucket
    #[arg(long)]
    bucket: Option<String>,
  },
  /// Replay queued actions (every known tag when none is given)
  Sync { tag: Option<String> },
  /// Deliver a push message
  Push {
    /// Raw push data; JSON with title/body or plain text
    data: Option<String>,
  },
  /// Simulate a notification click
  Click { action: Option<String> },
  #[command(subcommand)]
  Cart(CartCommand),
  #[command(subcommand)]
  Listing(ListingCommand),
  /// Search the catalog and record the query
  Search {
    query: String,
    #[arg(long)]
    category: Option<Category>,
    #[arg(long, default_value = "relevance")]
    sort: catalog::SortOrder,
    #[arg(long)]
    min_price: Option<u64>,
    #[arg(long)]
    max_price: Option<u64>,
  },
  /// Show recent searches and the search history
  History {
    /// Forget the recent searches list
    #[arg(long)]
    clear: bool,
  },
  /// Show or change user settings
  Settings {
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    high_contrast: Option<bool>,
    #[arg(long)]
    large_text: Option<bool>,
    #[arg(long)]
    reduce_motion: Option<bool>,
    #[arg(long)]
    notifications: Option<bool>,
  },
}

#[derive(Subcommand, Debug)]
enum CartCommand {
  /// Add a catalog listing to the cart
  Add {
    product_id: u64,
    #[arg(short, long, default_value_t = 1)]
    quantity: u32,
    /// Variant option as name=value, repeatable
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, String)>,
  },
  /// Change a line's quantity; zero removes it
  Set {
    product_id: u64,
    quantity: u32,
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, String)>,
  },
  List,
  Remove { product_id: u64 },
  Clear,
  /// Snapshot the cart into the cart-sync queue
  Queue,
}

#[derive(Subcommand, Debug)]
enum ListingCommand {
  Show { id: u64 },
  Add {
    title: String,
    #[arg(long)]
    category: Category,
    #[arg(long)]
    price: u64,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "Swumarket")]
    vendor: String,
  },
  /// Change a listing's price
  Price { id: u64, price: u64 },
  Delete { id: u64 },
}

fn parse_option(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
    .filter(|(k, _)| !k.is_empty())
    .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

struct Context {
  config: config::Config,
  storage: Arc<SqliteStorage>,
  network: Arc<HttpNetwork>,
  local: LocalStorage,
}

impl Context {
  fn open(config: config::Config) -> Result<Self> {
    let db = Database::open(&config.database_path()?)?;
    let storage = SqliteStorage::new(db.clone()).with_quota(config.cache.quota_bytes);
    let network = HttpNetwork::new(
      config.origin.clone(),
      Duration::from_secs(config.cache.timeout_secs),
    )?;
    let local = LocalStorage::new(Arc::new(SqliteKeyValueStore::new(db)));

    Ok(Self {
      config,
      storage: Arc::new(storage),
      network: Arc::new(network),
      local,
    })
  }

  fn controller(&self) -> Result<OfflineController> {
    let settings = WorkerSettings::from_config(&self.config)?;
    Ok(OfflineController::new(
      settings,
      self.storage.clone(),
      self.network.clone(),
      self.local.clone(),
      Arc::new(LogNotifier::new(SettingsStore::new(self.local.clone()))),
    ))
  }

  fn registration(&self) -> Registration {
    Registration::new(self.config.origin.clone(), self.config.sync.max_retries)
  }

  /// Resume the installed controller, installing it first if needed.
  async fn attach(&self) -> Result<Registration> {
    let mut registration = self.registration();
    if !registration.resume(self.controller()?)? {
      registration.update(self.controller()?).await?;
    }
    Ok(registration)
  }

  fn resolve(&self, url: &str) -> Result<Url> {
    match Url::parse(url) {
      Ok(url) => Ok(url),
      Err(url::ParseError::RelativeUrlWithoutBase) => self.config.resolve(url),
      Err(e) => Err(eyre!("Invalid URL '{}': {}", url, e)),
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config { origin, ..config }
  } else {
    config
  };

  let _guard = logging::init(&config.log)?;
  let ctx = Context::open(config)?;

  match args.command {
    Command::Install => {
      let mut registration = ctx.registration();
      match registration.update(ctx.controller()?).await? {
        UpdateOutcome::Activated { evicted } => {
          println!("activated {}", ctx.config.cache.version);
          for bucket in evicted {
            println!("  evicted {}", bucket);
          }
        }
        UpdateOutcome::Unchanged => println!("already active"),
      }
    }
    Command::Status => status(&ctx)?,
    Command::Fetch {
      url,
      method,
      navigate,
      no_cors,
      body,
    } => {
      let registration = ctx.attach().await?;
      let url = ctx.resolve(&url)?;
      let request = if navigate {
        Request::navigate(url)
      } else if no_cors {
        Request::new(method, url).with_mode(RequestMode::NoCors)
      } else {
        Request::new(method, url)
      };

      match registration.fetch(&request).await? {
        FetchOutcome::PassThrough => println!("pass-through"),
        FetchOutcome::Responded(result) => {
          let response = &result.data;
          println!(
            "{} {} via {} ({} bytes, {})",
            response.status,
            response.response_type,
            result.source,
            response.body.len(),
            response.header("content-type").unwrap_or("no content-type")
          );
          if matches!(
            result.source,
            CacheSource::OfflinePage | CacheSource::CacheFallback
          ) {
            println!("served offline");
          }
          if body {
            println!("{}", response.text());
          }
        }
      }
      if let Some(active) = registration.active() {
        active.settle().await;
      }
    }
    Command::Cached { url, bucket } => {
      let request = Request::get(ctx.resolve(&url)?);
      let hit = match bucket {
        Some(bucket) => ctx.storage.match_in(&bucket, &request.key())?,
        None => ctx.controller()?.cache().lookup(&request.key()),
      };
      match hit {
        Some(hit) => print_cached(&hit),
        None => println!(
          "not cached ({})",
          if should_cache(request.url.as_str()) {
            "cacheable"
          } else {
            "not cacheable"
          }
        ),
      }
    }
    Command::Sync { tag } => {
      let mut registration = ctx.attach().await?;
      match tag {
        Some(tag) => {
          registration.register_sync(&tag)?;
        }
        None => {
          registration.register_sync(worker::CART_SYNC)?;
          registration.register_sync(worker::SEARCH_SYNC)?;
        }
      }
      for attempt in registration.flush_sync().await {
        match attempt.result {
          Ok(report) => println!(
            "{}: sent {} status {} cleared {}",
            attempt.tag,
            report.sent,
            report
              .status
              .map_or_else(|| "-".to_string(), |s| s.to_string()),
            report.cleared
          ),
          Err(e) => println!("{}: {}", attempt.tag, e),
        }
      }
      for tag in registration.pending_sync() {
        println!("{}: will retry", tag);
      }
    }
    Command::Push { data } => {
      let registration = ctx.attach().await?;
      if let Some(payload) = registration.push(data.as_deref().map(str::as_bytes)).await {
        println!("{}", serde_json::to_string_pretty(&payload)?);
      }
    }
    Command::Click { action } => {
      let mut registration = ctx.attach().await?;
      if registration.notification_click(action.as_deref()).is_none() {
        println!("closed");
      }
      for client in registration.clients() {
        println!(
          "{} {} (controller {})",
          if client.focused { "*" } else { " " },
          client.url,
          client.controller.as_deref().unwrap_or("none")
        );
      }
    }
    Command::Cart(command) => cart(&ctx, command)?,
    Command::Listing(command) => listing(&ctx, command)?,
    Command::Search {
      query,
      category,
      sort,
      min_price,
      max_price,
    } => {
      let catalog = Catalog::stored(ctx.local.clone())?;
      let filters = SearchFilters {
        query,
        category,
        min_price,
        max_price,
        sort,
      };
      let results = catalog.search(&filters)?;
      SearchHistoryStore::new(ctx.local.clone())
        .record(&filters.query, category.as_ref().map(|c| c.as_str()))?;

      for listing in &results {
        println!(
          "{:>3}  {:<28} {:>10}  {}",
          listing.id, listing.title, listing.price, listing.category
        );
      }
      println!("{} result(s)", results.len());
    }
    Command::History { clear } => {
      let searches = SearchHistoryStore::new(ctx.local.clone());
      if clear {
        searches.clear_recent()?;
      }
      println!("recent: {}", searches.recent()?.join(", "));
      for entry in searches.history()? {
        println!(
          "  {}  {}{}",
          entry.searched_at.format("%Y-%m-%d %H:%M"),
          entry.query,
          entry
            .category
            .map(|c| format!(" [{}]", c))
            .unwrap_or_default()
        );
      }
    }
    Command::Settings {
      language,
      high_contrast,
      large_text,
      reduce_motion,
      notifications,
    } => {
      let store = SettingsStore::new(ctx.local.clone());
      if let Some(code) = language {
        if !store.set_language(&code)? {
          return Err(eyre!("Unsupported language '{}'", code));
        }
      }
      let settings = store.update(|s| {
        if let Some(v) = high_contrast {
          s.high_contrast = v;
        }
        if let Some(v) = large_text {
          s.large_text = v;
        }
        if let Some(v) = reduce_motion {
          s.reduce_motion = v;
        }
        if let Some(v) = notifications {
          s.notifications = v;
        }
      })?;
      println!("language: {}", store.language()?);
      println!("{}", serde_json::to_string_pretty(&settings)?);
    }
  }

  Ok(())
}

fn status(ctx: &Context) -> Result<()> {
  let controller = ctx.controller()?;
  controller.restore()?;
  println!("origin:  {}", ctx.config.origin);
  println!("version: {} ({})", controller.version(), controller.state());

  for bucket in ctx.storage.bucket_names()? {
    let marker = if controller.cache().buckets().is_current(&bucket) {
      ""
    } else {
      " (stale)"
    };
    println!("  {:<32} {} entries{}", bucket, ctx.storage.keys(&bucket)?.len(), marker);
  }

  let cart = CartStore::new(ctx.local.clone());
  let searches = SearchHistoryStore::new(ctx.local.clone());
  println!("pending {}: {}", worker::CART_SYNC, cart.pending_sync()?.len());
  println!("pending {}: {}", worker::SEARCH_SYNC, searches.pending_sync()?.len());

  println!("local storage:");
  for key in ctx.local.keys()? {
    let version = ctx.local.version(&key)?.unwrap_or_default();
    println!("  {:<32} v{}", key, version);
  }
  Ok(())
}

fn print_cached(hit: &CachedResponse) {
  println!(
    "{} {} in {} since {} ({} bytes)",
    hit.response.status,
    hit.response.response_type,
    hit.bucket,
    hit.cached_at.format("%Y-%m-%d %H:%M:%S"),
    hit.response.body.len()
  );
}

fn cart(ctx: &Context, command: CartCommand) -> Result<()> {
  let cart = CartStore::new(ctx.local.clone());

  match command {
    CartCommand::Add {
      product_id,
      quantity,
      options,
    } => {
      let catalog = Catalog::stored(ctx.local.clone())?;
      let listing = catalog
        .get(product_id)?
        .ok_or_else(|| eyre!("No listing with id {}", product_id))?;
      let items = cart.add(CartItem {
        product_id,
        name: listing.title,
        unit_price: listing.price,
        quantity,
        variant: options.into_iter().collect::<Variant>(),
      })?;
      println!("{} line(s) in cart", items.len());
    }
    CartCommand::Set {
      product_id,
      quantity,
      options,
    } => {
      let variant = options.into_iter().collect::<Variant>();
      if !cart.set_quantity(product_id, &variant, quantity)? {
        return Err(eyre!("No cart line for product {}", product_id));
      }
      println!("{} unit(s) in cart", cart.count()?);
    }
    CartCommand::List => {
      for item in cart.items()? {
        let variant = if item.variant.is_empty() {
          String::new()
        } else {
          format!(" [{}]", item.variant)
        };
        println!(
          "{:>3}  {}{} x{}  {}",
          item.product_id,
          item.name,
          variant,
          item.quantity,
          item.subtotal()
        );
      }
      println!("total: {} ({} units)", cart.total()?, cart.count()?);
    }
    CartCommand::Remove { product_id } => {
      let removed = cart.remove_product(product_id)?;
      println!("removed {} line(s)", removed);
    }
    CartCommand::Clear => {
      cart.clear()?;
      println!("cart cleared");
    }
    CartCommand::Queue => {
      let queued = cart.queue_for_sync()?;
      println!("queued {} line(s) for {}", queued, worker::CART_SYNC);
    }
  }

  Ok(())
}

fn listing(ctx: &Context, command: ListingCommand) -> Result<()> {
  let catalog = Catalog::stored(ctx.local.clone())?;
  let repo = catalog.repository();

  match command {
    ListingCommand::Show { id } => {
      let listing = repo
        .get(id)?
        .ok_or_else(|| eyre!("No listing with id {}", id))?;
      println!("{}", serde_json::to_string_pretty(&listing)?);
    }
    ListingCommand::Add {
      title,
      category,
      price,
      description,
      vendor,
    } => {
      let added = repo.add(Listing {
        id: 0,
        title,
        description,
        category,
        price,
        vendor,
        age_days: 0,
      })?;
      println!("added listing {}", added.id);
    }
    ListingCommand::Price { id, price } => {
      let mut listing = repo
        .get(id)?
        .ok_or_else(|| eyre!("No listing with id {}", id))?;
      listing.price = price;
      repo.update(listing)?;
      println!("listing {} now {}", id, price);
    }
    ListingCommand::Delete { id } => {
      if !repo.delete(id)? {
        return Err(eyre!("No listing with id {}", id));
      }
      println!("deleted listing {}", id);
    }
  }

  Ok(())
}
