//! Pipeline configuration.

use std::time::Duration;

use chatvault_core::defaults::{DIALOGS_PAGE_LIMIT, MESSAGES_PAGE_LIMIT, RESCAN_INTERVAL_SECS};
use chatvault_core::env::env_parse;
use chatvault_core::{Error, Result};

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Conversations requested per listing page.
    pub dialogs_page_limit: i32,
    /// Messages requested per history page.
    pub messages_page_limit: i32,
    /// Pause between rescans.
    pub rescan_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dialogs_page_limit: DIALOGS_PAGE_LIMIT,
            messages_page_limit: MESSAGES_PAGE_LIMIT,
            rescan_interval: Duration::from_secs(RESCAN_INTERVAL_SECS),
        }
    }
}

impl IngestConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DIALOGS_PAGE_LIMIT` | `100` | Conversations per listing page |
    /// | `MESSAGES_PAGE_LIMIT` | `50` | Messages per history page |
    /// | `RESCAN_INTERVAL_SECS` | `300` | Pause between rescans |
    pub fn from_env() -> Result<Self> {
        let config = Self {
            dialogs_page_limit: env_parse("DIALOGS_PAGE_LIMIT", DIALOGS_PAGE_LIMIT)?,
            messages_page_limit: env_parse("MESSAGES_PAGE_LIMIT", MESSAGES_PAGE_LIMIT)?,
            rescan_interval: Duration::from_secs(env_parse(
                "RESCAN_INTERVAL_SECS",
                RESCAN_INTERVAL_SECS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_dialogs_page_limit(mut self, limit: i32) -> Self {
        self.dialogs_page_limit = limit;
        self
    }

    pub fn with_messages_page_limit(mut self, limit: i32) -> Self {
        self.messages_page_limit = limit;
        self
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dialogs_page_limit <= 0 {
            return Err(Error::Config("DIALOGS_PAGE_LIMIT must be positive".into()));
        }
        if self.messages_page_limit <= 0 {
            return Err(Error::Config("MESSAGES_PAGE_LIMIT must be positive".into()));
        }
        if self.rescan_interval.is_zero() {
            return Err(Error::Config("RESCAN_INTERVAL_SECS must be positive".into()));
        }
        Ok(())
    }
}
