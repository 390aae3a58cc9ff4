//! Configuration for table overrides.
//!
//! Read from the `table_override` section of the application's Figment:
//!
//! ```yaml
//! table_override:
//!   lock_timeout: 250ms
//!   dialect: postgres
//! ```

use std::time::Duration;

use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Figment key holding [`TableOverrideConfig`].
pub const CONFIG_SECTION: &str = "table_override";

/// SQL dialect used when rendering model queries to text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Postgres,
    MySql,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableOverrideConfig {
    /// Longest wait for a single model lock in `LockingOverride`.
    /// Unset waits indefinitely.
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Option<Duration>,

    pub dialect: SqlDialect,
}

impl TableOverrideConfig {
    /// Extracts the `table_override` section; a missing section yields defaults.
    ///
    /// # Errors
    /// Returns `OverrideError::Config` if the section is malformed.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config = figment.focus(CONFIG_SECTION).extract::<Self>()?;
        tracing::debug!(?config, "table override configuration loaded");
        Ok(config)
    }
}
