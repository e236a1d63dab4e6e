use crate::error::{BuildError, Result};
use crate::graph::HeteroGraph;
use crate::topology::IdMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const GRAPH_FILE: &str = "hetero_graph.bin";
pub const SUMMARY_FILE: &str = "hetero_graph_summary.json";
pub const MAPPINGS_FILE: &str = "node_mappings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub transaction: usize,
    pub address: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalRanges {
    pub transaction: Option<(u32, u32)>,
    pub address: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub train_time_end: u32,
    pub val_time_end: u32,
}

/// Human-readable digest of a built graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub num_nodes: EntityCounts,
    /// Keyed `<src>_to_<dst>`.
    pub num_edges: BTreeMap<String, usize>,
    /// Edges read but dropped for an unresolvable endpoint.
    pub dropped_edges: BTreeMap<String, usize>,
    pub num_labeled: EntityCounts,
    pub temporal_range: TemporalRanges,
    pub feature_dims: EntityCounts,
    pub splits: SplitSizes,
    /// Optional relations recorded with zero edges, and why.
    pub degraded_relations: BTreeMap<String, String>,
}

impl GraphSummary {
    pub fn from_graph(graph: &HeteroGraph) -> Self {
        let meta = &graph.metadata;
        let mut num_edges = BTreeMap::new();
        let mut dropped_edges = BTreeMap::new();
        let mut degraded_relations = BTreeMap::new();
        for relation in &meta.relations {
            let key = relation.relation.summary_key();
            num_edges.insert(key.clone(), relation.num_edges);
            dropped_edges.insert(
                key.clone(),
                relation.total_read.saturating_sub(relation.num_edges),
            );
            if let Some(reason) = &relation.absent_reason {
                degraded_relations.insert(key, reason.clone());
            }
        }

        Self {
            num_nodes: EntityCounts {
                transaction: meta.transaction.num_nodes,
                address: meta.address.num_nodes,
            },
            num_edges,
            dropped_edges,
            num_labeled: EntityCounts {
                transaction: meta.transaction.num_labeled,
                address: meta.address.num_labeled,
            },
            temporal_range: TemporalRanges {
                transaction: meta.transaction.temporal_range,
                address: meta.address.temporal_range,
            },
            feature_dims: EntityCounts {
                transaction: meta.transaction.feature_dim,
                address: meta.address.feature_dim,
            },
            splits: SplitSizes {
                train: meta.splits.train,
                val: meta.splits.val,
                test: meta.splits.test,
                train_time_end: meta.splits.train_time_end,
                val_time_end: meta.splits.val_time_end,
            },
            degraded_relations,
        }
    }
}

/// Raw id -> dense index tables of both entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMappings {
    pub tx_id_to_idx: BTreeMap<String, u32>,
    pub addr_id_to_idx: BTreeMap<String, u32>,
}

impl NodeMappings {
    pub fn from_graph(graph: &HeteroGraph) -> Self {
        Self {
            tx_id_to_idx: table_of(&graph.transactions.id_map),
            addr_id_to_idx: table_of(&graph.addresses.id_map),
        }
    }
}

fn table_of(map: &IdMap) -> BTreeMap<String, u32> {
    map.iter().map(|(id, idx)| (id.to_string(), idx)).collect()
}

/// Paths written by [`ArtifactWriter::persist`].
#[derive(Debug, Clone)]
pub struct PersistedPaths {
    pub graph: PathBuf,
    pub summary: PathBuf,
    pub mappings: PathBuf,
}

pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn persist(&self, graph: &HeteroGraph) -> Result<PersistedPaths> {
        fs::create_dir_all(&self.output_dir)?;
        let paths = PersistedPaths {
            graph: self.output_dir.join(GRAPH_FILE),
            summary: self.output_dir.join(SUMMARY_FILE),
            mappings: self.output_dir.join(MAPPINGS_FILE),
        };

        let data = bincode::serialize(graph)?;
        fs::write(&paths.graph, data)?;
        info!(path = %paths.graph.display(), "graph saved");

        let summary = serde_json::to_string_pretty(&GraphSummary::from_graph(graph))?;
        fs::write(&paths.summary, summary)?;
        info!(path = %paths.summary.display(), "summary saved");

        let mappings = serde_json::to_string_pretty(&NodeMappings::from_graph(graph))?;
        fs::write(&paths.mappings, mappings)?;
        info!(path = %paths.mappings.display(), "mappings saved");

        Ok(paths)
    }
}

pub fn load_artifact(path: &Path) -> Result<HeteroGraph> {
    let data = fs::read(path).map_err(|_| BuildError::missing(GRAPH_FILE, path))?;
    let graph: HeteroGraph = bincode::deserialize(&data)?;
    info!(path = %path.display(), "graph loaded");
    Ok(graph)
}

pub fn load_summary(path: &Path) -> Result<GraphSummary> {
    let content = fs::read_to_string(path).map_err(|_| BuildError::missing(SUMMARY_FILE, path))?;
    Ok(serde_json::from_str(&content)?)
}

pub fn load_mappings(path: &Path) -> Result<NodeMappings> {
    let content =
        fs::read_to_string(path).map_err(|_| BuildError::missing(MAPPINGS_FILE, path))?;
    Ok(serde_json::from_str(&content)?)
}
