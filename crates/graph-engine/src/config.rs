use crate::error::{BuildError, Result};
use crate::ingest::edges::{elliptic_relations, RelationSpec};
use crate::ingest::nodes::EntitySpec;
use crate::split::TemporalSplitter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_TOP_K_ADDRESSES: usize = 100_000;
pub const DATA_ROOT_ENV: &str = "FRAUDGRAPH_DATA_ROOT";
pub const OUTPUT_DIR_ENV: &str = "FRAUDGRAPH_OUTPUT_DIR";

/// Options of one graph build. Every field has a default, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub data_root: PathBuf,
    pub output_dir: PathBuf,
    /// Cap on the address population; `None` means no cap.
    pub top_k_addresses: Option<usize>,
    /// Disables the address cap whatever `top_k_addresses` says.
    pub use_all_addresses: bool,
    pub train_frac: f64,
    pub val_frac: f64,
    pub transactions: EntitySpec,
    pub addresses: EntitySpec,
    pub relations: Vec<RelationSpec>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data/Elliptic++ Dataset"),
            output_dir: PathBuf::from("data"),
            top_k_addresses: Some(DEFAULT_TOP_K_ADDRESSES),
            use_all_addresses: false,
            train_frac: 0.6,
            val_frac: 0.2,
            transactions: EntitySpec::elliptic_transactions(),
            addresses: EntitySpec::elliptic_addresses(),
            relations: elliptic_relations(),
        }
    }
}

impl BuildConfig {
    /// Base config for a run: the optional config file over the built-in
    /// defaults, with `env` consulted for `data_root` and `output_dir` only
    /// when the file leaves them unset. Command-line flags go on top.
    pub fn resolve<F>(config_file: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = config_file.map(read_json).transpose()?;
        let mut config = match &raw {
            Some(raw) => Self::deserialize(raw)?,
            None => Self::default(),
        };

        let in_file = |key: &str| raw.as_ref().is_some_and(|v| v.get(key).is_some());
        let from_env = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        if !in_file("data_root") {
            if let Some(path) = from_env(DATA_ROOT_ENV) {
                config.data_root = path;
            }
        }
        if !in_file("output_dir") {
            if let Some(path) = from_env(OUTPUT_DIR_ENV) {
                config.output_dir = path;
            }
        }
        Ok(config)
    }

    /// The cap actually applied to addresses.
    pub fn address_cap(&self) -> Option<usize> {
        if self.use_all_addresses {
            None
        } else {
            self.top_k_addresses
        }
    }

    pub fn validate(&self) -> Result<()> {
        TemporalSplitter::new(self.train_frac, self.val_frac)?;

        if self.transactions.entity == self.addresses.entity {
            return Err(BuildError::InvalidConfig(
                "transaction and address specs name the same entity type".to_string(),
            ));
        }
        if self.address_cap().is_some() && self.addresses.activity_column.is_none() {
            return Err(BuildError::InvalidConfig(
                "address cap set but no activity column configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for relation in &self.relations {
            if !seen.insert(relation.key()) {
                return Err(BuildError::InvalidConfig(format!(
                    "relation {} declared twice",
                    relation.key().name()
                )));
            }
        }
        Ok(())
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content =
        std::fs::read_to_string(path).map_err(|_| BuildError::missing("config", path))?;
    Ok(serde_json::from_str(&content)?)
}
