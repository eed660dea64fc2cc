use anyhow::{Context, Result};
use kioku_core::SchedulerPolicy;
use kioku_json::paths::data_root;
use std::path::PathBuf;

use crate::cli::opts::{Cli, StoreKind};

/// Settings resolved from flags and `KIOKU_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreKind,
    pub store_path: PathBuf,
    pub policy: SchedulerPolicy,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let policy = SchedulerPolicy::new(
            cli.good_multiplier,
            cli.easy_multiplier,
            !cli.non_sticky_learned,
        )
        .context("invalid scheduler policy")?;

        let store_path = cli.db_path.clone().unwrap_or_else(|| match cli.store {
            StoreKind::Sqlite => data_root().join("kioku.sqlite3"),
            StoreKind::Json | StoreKind::Memory => data_root().join("kioku.json"),
        });

        Ok(Self {
            store: cli.store,
            store_path,
            policy,
            log_level: cli.log_level.clone(),
        })
    }
}
