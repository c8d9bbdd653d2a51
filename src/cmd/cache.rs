use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use tracing::info;

use crate::{cmd::open_cache, utils::config::ClientConfig};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Print the cached decision and whether it is still fresh
    Show {},

    /// Drop the cached decision
    Clear {},
}

impl CacheCommands {
    pub async fn execute(&self) -> Result<()> {
        let cfg = ClientConfig::load()?;
        let cache = open_cache(&cfg).await?;

        match self {
            CacheCommands::Show {} => {
                match cache.entry().await {
                    Some(entry) => {
                        let now = Utc::now().timestamp_millis();
                        println!("{}", serde_json::to_string_pretty(&entry)?);
                        println!(
                            "age: {}ms, fresh: {}",
                            now - entry.fetched_at,
                            entry.is_fresh_at(now)
                        );
                    }
                    None => println!("cache is empty"),
                }
                Ok(())
            }

            CacheCommands::Clear {} => {
                cache.invalidate().await?;
                info!("Entitlement cache cleared");
                Ok(())
            }
        }
    }
}
