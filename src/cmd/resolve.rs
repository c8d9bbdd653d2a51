use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use clap::Args;
use tracing::info;

use crate::{
    access::{policy::SpecialAccessPolicy, resolver::Resolver},
    db::{create_pool, repository::Repository},
    types::{EntitlementDecision, Principal},
    utils::config::load_access_config,
};

#[derive(Args)]
pub struct ResolveArgs {
    /// Principal identifier
    #[arg(short, long)]
    pub principal_id: String,

    /// Principal email, used for allow-list matching
    #[arg(short, long, default_value = "")]
    pub email: String,

    /// Evaluate as of this RFC 3339 instant instead of now
    #[arg(long)]
    pub at: Option<String>,

    /// Also print every stored record for the principal
    #[arg(long)]
    pub records: bool,

    /// Postgres connection string
    #[arg(long)]
    pub database_url: String,
}

impl ResolveArgs {
    pub async fn execute(&self) -> Result<()> {
        let now = match &self.at {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| anyhow!("invalid --at {}: {}", raw, e))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        let pool = Arc::new(create_pool(&self.database_url).await?);
        let repo = Arc::new(Repository::new(pool));
        let policy = Arc::new(SpecialAccessPolicy::from_config(&load_access_config()?));
        let principal = Principal::new(self.principal_id.clone(), self.email.clone());

        if self.records {
            for record in repo.list_for_principal(&principal.id).await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }

        let resolver = Resolver::new(repo, policy);
        let decision = resolver.resolve_at(&principal, now).await?;

        info!(principal = %principal.id, at = %now, "Resolved");
        println!("{}", render(&decision)?);

        Ok(())
    }
}

fn render(decision: &EntitlementDecision) -> Result<String> {
    Ok(serde_json::to_string_pretty(&decision.to_response())?)
}
