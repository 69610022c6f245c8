//! Folio - portfolio site backend.
//!
//! Serves the composition catalog from Notion through a cache-aside layer
//! and creates Stripe checkout sessions for score purchases.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `cache` - Cache-aside store over optional Redis
//! - `content` - Notion catalog source
//! - `checkout` - Stripe checkout sessions
//! - `server` - HTTP routes and handlers

mod cache;
mod checkout;
mod config;
mod content;
mod server;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cache::CacheStore;
use checkout::{CheckoutProvider, StripeClient};
use config::Config;
use content::NotionClient;
use server::AppState;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("folio=info,tower_http=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting folio...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");

    // Cache is optional: without REDIS_URL every lookup goes to Notion
    let cache = CacheStore::connect(config.redis.as_ref()).await;
    info!("Cache state: {:?}", cache.state());

    let content = Arc::new(NotionClient::new(&config.notion)?);
    info!("Notion client initialized");

    let checkout = match &config.stripe {
        Some(stripe) => {
            info!("Stripe checkout enabled");
            Some(Arc::new(StripeClient::new(stripe, &config.site_url)?) as Arc<dyn CheckoutProvider>)
        }
        None => {
            info!("STRIPE_SECRET_KEY not set, checkout disabled");
            None
        }
    };

    if config.revalidate_secret.is_none() {
        info!("REVALIDATE_SECRET not set, cache invalidation endpoint disabled");
    }

    let state = AppState {
        cache,
        content,
        checkout,
        revalidate_secret: config.revalidate_secret.as_deref().map(Arc::from),
    };

    server::serve(config.listen_addr(), state).await
}
