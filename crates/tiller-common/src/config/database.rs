//! Database connection configuration.
//!
//! In distributed deployments the host-related fields hold comma-separated
//! lists, one element per server. Masters occupy the first `master_num`
//! positions; the remaining positions are read replicas. A list shorter than
//! the host list falls back to its first element, so a single shared
//! username or database name needs to be written only once.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BREAK_MATCH_STR, DEFAULT_CHARSET, DEFAULT_DIALECT, DEFAULT_HOSTNAME, DEFAULT_HOSTPORT,
};
use crate::error::{TillerError, TillerResult};

/// Server topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deploy {
    /// One server handles reads and writes.
    #[default]
    Single,
    /// Master/replica deployment described by comma-separated host lists.
    Distributed,
}

/// Connection configuration.
///
/// # Example
///
/// ```rust
/// use tiller_common::config::{DatabaseConfig, Deploy};
///
/// let config = DatabaseConfig::builder()
///     .deploy(Deploy::Distributed)
///     .hostname("10.0.0.1,10.0.0.2,10.0.0.3")
///     .database("shop")
///     .rw_separate(true)
///     .build();
///
/// assert_eq!(config.host_count(), 3);
/// assert_eq!(config.host(2).hostname, "10.0.0.3");
/// assert_eq!(config.host(2).database, "shop");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Dialect name (`mysql`, `generic`).
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Server address, comma-separated in distributed mode.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Server port, comma-separated in distributed mode.
    #[serde(default = "default_hostport")]
    pub hostport: String,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// User name.
    #[serde(default)]
    pub username: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Explicit DSN; built from the host fields when empty.
    #[serde(default)]
    pub dsn: String,

    /// Character set.
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Table name prefix applied to `__NAME__` references and `name()`.
    #[serde(default)]
    pub prefix: String,

    /// Records SQL run times and refreshes cached schemas.
    #[serde(default)]
    pub debug: bool,

    /// Server topology.
    #[serde(default)]
    pub deploy: Deploy,

    /// Routes reads to replicas in distributed mode.
    #[serde(default)]
    pub rw_separate: bool,

    /// Number of masters at the head of the host list.
    #[serde(default = "default_master_num")]
    pub master_num: usize,

    /// Pins the master index.
    #[serde(default)]
    pub master_no: Option<usize>,

    /// Pins the replica index.
    #[serde(default)]
    pub slave_no: Option<usize>,

    /// Reads tables written through a connection from the master afterwards.
    #[serde(default)]
    pub read_master: bool,

    /// Rejects write data naming unknown columns.
    #[serde(default = "default_true")]
    pub fields_strict: bool,

    /// Caches table schemas on disk.
    #[serde(default)]
    pub fields_cache: bool,

    /// Directory holding on-disk schema cache files.
    #[serde(default)]
    pub schema_cache_path: Option<PathBuf>,

    /// Reconnects once when a connection-lost error is detected.
    #[serde(default)]
    pub break_reconnect: bool,

    /// Error message fragments treated as connection loss.
    #[serde(default = "default_break_match_str")]
    pub break_match_str: Vec<String>,

    /// Extra driver parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_dialect() -> String {
    DEFAULT_DIALECT.to_string()
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}

fn default_hostport() -> String {
    DEFAULT_HOSTPORT.to_string()
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

fn default_master_num() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_break_match_str() -> Vec<String> {
    DEFAULT_BREAK_MATCH_STR
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            hostname: default_hostname(),
            hostport: default_hostport(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
            dsn: String::new(),
            charset: default_charset(),
            prefix: String::new(),
            debug: false,
            deploy: Deploy::Single,
            rw_separate: false,
            master_num: default_master_num(),
            master_no: None,
            slave_no: None,
            read_master: false,
            fields_strict: true,
            fields_cache: false,
            schema_cache_path: None,
            break_reconnect: false,
            break_match_str: default_break_match_str(),
            params: BTreeMap::new(),
        }
    }
}

impl DatabaseConfig {
    /// Creates a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for configuration.
    #[must_use]
    pub fn builder() -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> TillerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> TillerResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| TillerError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, path: &Path) -> TillerResult<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Converts configuration to a TOML string.
    pub fn to_toml(&self) -> TillerResult<String> {
        toml::to_string_pretty(self).map_err(|e| TillerError::Serialization {
            message: e.to_string(),
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> TillerResult<()> {
        if self.dialect.trim().is_empty() {
            return Err(TillerError::InvalidConfig {
                message: "dialect must not be empty".to_string(),
            });
        }

        if self.deploy == Deploy::Distributed {
            let hosts = self.host_count();
            if self.master_num == 0 {
                return Err(TillerError::InvalidConfig {
                    message: "master_num must be at least 1".to_string(),
                });
            }
            if self.master_num > hosts {
                return Err(TillerError::InvalidConfig {
                    message: format!("master_num {} exceeds {hosts} hosts", self.master_num),
                });
            }
            if let Some(no) = self.master_no {
                if no >= self.master_num {
                    return Err(TillerError::InvalidConfig {
                        message: format!("master_no {no} is not a master index"),
                    });
                }
            }
            if let Some(no) = self.slave_no {
                if no >= hosts {
                    return Err(TillerError::InvalidConfig {
                        message: format!("slave_no {no} is out of range"),
                    });
                }
            }
        }

        Ok(())
    }

    /// Returns true for distributed deployments.
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        self.deploy == Deploy::Distributed
    }

    /// Returns the number of configured servers.
    #[must_use]
    pub fn host_count(&self) -> usize {
        split_list(&self.hostname).len().max(1)
    }

    /// Resolves the settings of the server at `index`.
    ///
    /// Single deployments always resolve to the full field values.
    #[must_use]
    pub fn host(&self, index: usize) -> HostConfig {
        if self.deploy == Deploy::Single {
            return HostConfig {
                hostname: self.hostname.clone(),
                hostport: self.hostport.clone(),
                database: self.database.clone(),
                username: self.username.clone(),
                password: self.password.clone(),
                dsn: self.dsn.clone(),
                charset: self.charset.clone(),
            };
        }

        HostConfig {
            hostname: pick(&self.hostname, index),
            hostport: pick(&self.hostport, index),
            database: pick(&self.database, index),
            username: pick(&self.username, index),
            password: pick(&self.password, index),
            dsn: pick(&self.dsn, index),
            charset: pick(&self.charset, index),
        }
    }

    /// Returns a stable fingerprint used to key pooled connections.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.to_toml().unwrap_or_default().hash(&mut hasher);
        hasher.finish()
    }

    /// Returns true if the message signals a lost server connection.
    #[must_use]
    pub fn is_break_message(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.break_match_str
            .iter()
            .any(|needle| !needle.is_empty() && lower.contains(&needle.to_lowercase()))
    }
}

fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn pick(value: &str, index: usize) -> String {
    let items: Vec<&str> = value.split(',').map(str::trim).collect();
    items
        .get(index)
        .filter(|s| !s.is_empty())
        .or_else(|| items.first())
        .map(|s| (*s).to_string())
        .unwrap_or_default()
}

/// Settings of one resolved server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Server address.
    pub hostname: String,
    /// Server port.
    pub hostport: String,
    /// Database name.
    pub database: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Explicit DSN, possibly empty.
    pub dsn: String,
    /// Character set.
    pub charset: String,
}

/// Builder for [`DatabaseConfig`].
#[derive(Debug, Default)]
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dialect name.
    #[must_use]
    pub fn dialect(mut self, dialect: impl Into<String>) -> Self {
        self.config.dialect = dialect.into();
        self
    }

    /// Sets the host list.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    /// Sets the port list.
    #[must_use]
    pub fn hostport(mut self, hostport: impl Into<String>) -> Self {
        self.config.hostport = hostport.into();
        self
    }

    /// Sets the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Sets the user name.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Sets an explicit DSN.
    #[must_use]
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.config.dsn = dsn.into();
        self
    }

    /// Adds a driver parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.insert(key.into(), value.into());
        self
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Enables debug mode.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Sets the deployment topology.
    #[must_use]
    pub fn deploy(mut self, deploy: Deploy) -> Self {
        self.config.deploy = deploy;
        self
    }

    /// Enables read/write separation.
    #[must_use]
    pub fn rw_separate(mut self, enabled: bool) -> Self {
        self.config.rw_separate = enabled;
        self
    }

    /// Sets the number of masters.
    #[must_use]
    pub fn master_num(mut self, num: usize) -> Self {
        self.config.master_num = num;
        self
    }

    /// Pins the master index.
    #[must_use]
    pub fn master_no(mut self, no: usize) -> Self {
        self.config.master_no = Some(no);
        self
    }

    /// Pins the replica index.
    #[must_use]
    pub fn slave_no(mut self, no: usize) -> Self {
        self.config.slave_no = Some(no);
        self
    }

    /// Enables read-after-write routing to the master.
    #[must_use]
    pub fn read_master(mut self, enabled: bool) -> Self {
        self.config.read_master = enabled;
        self
    }

    /// Sets strict field checking.
    #[must_use]
    pub fn fields_strict(mut self, enabled: bool) -> Self {
        self.config.fields_strict = enabled;
        self
    }

    /// Enables the on-disk schema cache under `path`.
    #[must_use]
    pub fn schema_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.fields_cache = true;
        self.config.schema_cache_path = Some(path.into());
        self
    }

    /// Enables reconnect on connection loss.
    #[must_use]
    pub fn break_reconnect(mut self, enabled: bool) -> Self {
        self.config.break_reconnect = enabled;
        self
    }

    /// Replaces the connection-lost message fragments.
    #[must_use]
    pub fn break_match_str(mut self, fragments: Vec<String>) -> Self {
        self.config.break_match_str = fragments;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> DatabaseConfig {
        self.config
    }
}
