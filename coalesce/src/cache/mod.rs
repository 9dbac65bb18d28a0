//! Configuration Registry - Store and reuse step configurations
//!
//! Saves configurations to disk and matches them to CSV files based on the
//! columns their candidates refer to.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CoalesceConfig;
use crate::error::{RegistryError, RegistryResult};

/// Directory where configurations are stored (relative to current dir)
pub const DEFAULT_REGISTRY_DIR: &str = ".coalesce/configs";

/// Environment variable overriding [`DEFAULT_REGISTRY_DIR`].
pub const REGISTRY_DIR_ENV: &str = "COALESCE_REGISTRY_DIR";

/// A stored configuration with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConfig {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// The step configuration
    pub config: CoalesceConfig,
    /// Input columns the configuration reads
    pub input_columns: Vec<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last time this configuration was used
    pub last_used: Option<String>,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Number of times used
    pub use_count: u32,
}

/// Registry for managing step configurations
pub struct ConfigRegistry {
    registry_dir: PathBuf,
    configs: HashMap<String, StoredConfig>,
}

impl ConfigRegistry {
    /// Open the registry in [`REGISTRY_DIR_ENV`], or the default directory.
    pub fn new() -> Self {
        let dir = std::env::var(REGISTRY_DIR_ENV).unwrap_or_else(|_| DEFAULT_REGISTRY_DIR.to_string());
        Self::with_dir(dir)
    }

    /// Create a registry with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: PathBuf::from(dir.as_ref()),
            configs: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    pub fn dir(&self) -> &Path {
        &self.registry_dir
    }

    /// Load all configurations from the registry directory.
    /// Unreadable files are skipped.
    fn load_all(&mut self) {
        let Ok(entries) = fs::read_dir(&self.registry_dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(stored) = serde_json::from_str::<StoredConfig>(&content) {
                        self.configs.insert(stored.id.clone(), stored);
                    }
                }
            }
        }
    }

    /// Get all stored configurations, most used first
    pub fn list(&self) -> Vec<&StoredConfig> {
        let mut all: Vec<_> = self.configs.values().collect();
        all.sort_by(|a, b| b.use_count.cmp(&a.use_count).then_with(|| a.name.cmp(&b.name)));
        all
    }

    /// Get a configuration by ID
    pub fn get(&self, id: &str) -> RegistryResult<&StoredConfig> {
        self.configs
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Find configurations whose candidate columns all appear in `csv_columns`.
    /// Sorted by success rate, then use count, best first.
    pub fn find_compatible(&self, csv_columns: &[String]) -> Vec<&StoredConfig> {
        let mut compatible: Vec<_> = self
            .configs
            .values()
            .filter(|c| covers(csv_columns, &c.input_columns))
            .collect();

        compatible.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.use_count.cmp(&a.use_count))
        });

        compatible
    }

    /// Save a new configuration to the registry
    pub fn save(&mut self, config: CoalesceConfig, name: &str) -> RegistryResult<String> {
        config.validate()?;
        fs::create_dir_all(&self.registry_dir)?;

        let id = generate_id(name);
        let stored = StoredConfig {
            id: id.clone(),
            name: name.to_string(),
            input_columns: config.candidate_names(),
            config,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            success_rate: 1.0,
            use_count: 0,
        };

        self.write(&stored)?;
        self.configs.insert(id.clone(), stored);
        Ok(id)
    }

    /// Import a configuration file (JSON or XML)
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let config = CoalesceConfig::load(path)?;
        let config_name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });
        self.save(config, config_name)
    }

    /// Update statistics after using a configuration
    pub fn update_stats(&mut self, id: &str, success: bool) -> RegistryResult<()> {
        let stored = self
            .configs
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        // Exponential moving average
        stored.success_rate = if success {
            stored.success_rate * 0.9 + 0.1
        } else {
            stored.success_rate * 0.9
        };
        stored.last_used = Some(chrono::Utc::now().to_rfc3339());
        stored.use_count += 1;

        let stored = stored.clone();
        self.write(&stored)
    }

    /// Delete a configuration from the registry
    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if self.configs.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_for(id))?;
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    fn write(&self, stored: &StoredConfig) -> RegistryResult<()> {
        let content = serde_json::to_string_pretty(stored)?;
        fs::write(self.path_for(&stored.id), content)?;
        Ok(())
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of `stored` columns present in `csv`, case-insensitive.
/// Whether every stored column is a CSV column (case-insensitive).
fn covers(csv: &[String], stored: &[String]) -> bool {
    !stored.is_empty()
        && stored
            .iter()
            .all(|col| csv.iter().any(|c| c.eq_ignore_ascii_case(col)))
}

/// Generate a unique ID from a name
fn generate_id(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("{}-{}", slug, timestamp)
}
