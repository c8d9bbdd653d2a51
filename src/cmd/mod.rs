pub mod cache;
pub mod resolve;
pub mod session;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::{
    client::{
        cache::{EntitlementCache, FileKv, KvStore, RedisKv},
        clock::SystemClock,
    },
    cmd::{cache::CacheCommands, resolve::ResolveArgs, session::SessionCommands},
    utils::{config::ClientConfig, error::EntitlementError},
};

#[derive(Parser)]
#[command(name = "entitled")]
#[command(about = "Inspect and exercise entitlement resolution", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a principal directly against the database
    Resolve(ResolveArgs),

    /// Talk to the verification endpoint as a signed-in client
    #[command(subcommand)]
    Session(SessionCommands),

    /// Inspect or clear the client-side decision cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

/// Client cache backed by Redis when configured, a local file otherwise.
pub async fn open_cache(cfg: &ClientConfig) -> Result<EntitlementCache, EntitlementError> {
    let store: Arc<dyn KvStore> = match cfg.redis_url.as_deref() {
        Some(url) if !url.is_empty() => Arc::new(RedisKv::connect(url).await?),
        _ => Arc::new(FileKv::new(&cfg.cache_dir)),
    };

    Ok(EntitlementCache::new(
        store,
        Arc::new(SystemClock),
        cfg.cache_ttl_ms,
    ))
}
