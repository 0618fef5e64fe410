//! Rule loading from JSON files with optional hot reload.
//!
//! Every repository file holds a JSON array of rules. All files are read
//! and decoded before the repository is touched, so a broken file never
//! replaces a working rule set.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::AccessRulesConfig;
use crate::rule::model::Rule;
use crate::rule::repository::RuleRepository;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read rules from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode rules from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to watch rule files: {0}")]
    Watch(#[from] notify::Error),
}

/// Feeds rule files into a repository.
#[derive(Debug)]
pub struct RuleFetcher {
    paths: Vec<PathBuf>,
    repository: Arc<RuleRepository>,
}

impl RuleFetcher {
    pub fn new(paths: Vec<PathBuf>, repository: Arc<RuleRepository>) -> Self {
        Self { paths, repository }
    }

    pub fn from_config(config: &AccessRulesConfig, repository: Arc<RuleRepository>) -> Self {
        Self::new(config.repositories.clone(), repository)
    }

    /// Reads every file and replaces the repository's rule set.
    ///
    /// Returns the number of rules handed to the repository.
    pub fn load_once(&self) -> Result<usize, FetchError> {
        let mut rules = Vec::new();
        for path in &self.paths {
            rules.extend(read_rules(path)?);
        }
        let count = rules.len();
        self.repository.set(rules);
        tracing::info!(files = self.paths.len(), rules = count, "Access rules loaded");
        Ok(count)
    }

    /// Reloads whenever a rule file changes.
    ///
    /// The returned watcher must be kept alive. A failed reload keeps the
    /// current rule set.
    pub fn watch(self: Arc<Self>) -> Result<RecommendedWatcher, FetchError> {
        let fetcher = Arc::clone(&self);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(paths = ?event.paths, "Rule file change detected, reloading");
                    if let Err(e) = fetcher.load_once() {
                        tracing::error!(error = %e, "Failed to reload access rules, keeping current rules");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Rule watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for path in &self.paths {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
        }
        tracing::info!(paths = ?self.paths, "Rule watcher started");
        Ok(watcher)
    }
}

fn read_rules(path: &Path) -> Result<Vec<Rule>, FetchError> {
    let content = std::fs::read_to_string(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| FetchError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
