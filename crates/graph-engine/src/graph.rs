use crate::config::BuildConfig;
use crate::error::{BuildError, Result};
use crate::ingest::edges::{EdgeLoader, EntityMaps, RelationOutcome, RelationSpec};
use crate::ingest::features::FEATURE_POLICY_VERSION;
use crate::ingest::nodes::{EntityTable, NodeLoader};
use crate::ingest::table::CsvTableReader;
use crate::split::{TemporalSplit, TemporalSplitter};
use crate::topology::{EntityType, RelationKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Normalization statistics are fitted over every node of an entity,
/// validation and test rows included.
pub const NORMALIZATION_SCOPE: &str = "population";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub num_nodes: usize,
    pub num_labeled: usize,
    pub num_positive: usize,
    pub num_negative: usize,
    pub feature_dim: usize,
    pub temporal_range: Option<(u32, u32)>,
}

impl EntitySummary {
    fn of(table: &EntityTable) -> Self {
        Self {
            num_nodes: table.num_nodes(),
            num_labeled: table.stats.labeled,
            num_positive: table.stats.positive,
            num_negative: table.stats.negative,
            feature_dim: table.feature_dim(),
            temporal_range: table.temporal_range(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSummary {
    pub relation: RelationKey,
    pub required: bool,
    pub num_edges: usize,
    pub total_read: usize,
    /// Why the relation has no edges, when it could not be loaded.
    pub absent_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub train_time_end: u32,
    pub val_time_end: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub node_types: Vec<EntityType>,
    pub relations: Vec<RelationSummary>,
    pub transaction: EntitySummary,
    pub address: EntitySummary,
    pub splits: SplitSummary,
    pub feature_policy_version: u32,
    pub normalization_scope: String,
    pub built_at: DateTime<Utc>,
}

/// The assembled heterogeneous graph. The split belongs to the
/// transaction entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeteroGraph {
    pub transactions: EntityTable,
    pub addresses: EntityTable,
    pub relations: Vec<RelationOutcome>,
    pub split: TemporalSplit,
    pub metadata: GraphMetadata,
}

impl HeteroGraph {
    pub fn entity(&self, entity: EntityType) -> &EntityTable {
        match entity {
            EntityType::Transaction => &self.transactions,
            EntityType::Address => &self.addresses,
        }
    }

    pub fn relation(&self, key: RelationKey) -> Option<&RelationOutcome> {
        self.relations.iter().find(|r| r.relation() == key)
    }

    pub fn num_edges(&self, key: RelationKey) -> usize {
        self.relation(key).map(RelationOutcome::num_edges).unwrap_or(0)
    }
}

pub struct GraphAssembler;

impl GraphAssembler {
    /// Combine loaded parts into one graph. `relations` pairs each outcome
    /// with its declaration so the metadata can tell required from optional.
    pub fn assemble(
        transactions: EntityTable,
        addresses: EntityTable,
        relations: Vec<(RelationSpec, RelationOutcome)>,
        split: TemporalSplit,
    ) -> Result<HeteroGraph> {
        if split.train_mask.len() != transactions.num_nodes() {
            return Err(BuildError::Integrity(format!(
                "split covers {} nodes but there are {} transactions",
                split.train_mask.len(),
                transactions.num_nodes()
            )));
        }

        let node_count = |entity: EntityType| match entity {
            EntityType::Transaction => transactions.num_nodes(),
            EntityType::Address => addresses.num_nodes(),
        };

        let mut summaries = Vec::with_capacity(relations.len());
        let mut outcomes = Vec::with_capacity(relations.len());
        for (spec, outcome) in relations {
            if spec.required && outcome.is_absent() {
                return Err(BuildError::Integrity(format!(
                    "required relation {} is absent",
                    spec.key().name()
                )));
            }
            if let Some(edges) = outcome.edges() {
                let key = edges.relation;
                if let Some((src, dst)) =
                    edges.first_out_of_range(node_count(key.src), node_count(key.dst))
                {
                    return Err(BuildError::Integrity(format!(
                        "edge ({src}, {dst}) of {} is out of range",
                        key.name()
                    )));
                }
            }

            summaries.push(RelationSummary {
                relation: outcome.relation(),
                required: spec.required,
                num_edges: outcome.num_edges(),
                total_read: outcome.edges().map(|e| e.total_read).unwrap_or(0),
                absent_reason: match &outcome {
                    RelationOutcome::Absent { reason, .. } => Some(reason.clone()),
                    RelationOutcome::Loaded(_) => None,
                },
            });
            outcomes.push(outcome);
        }

        let metadata = GraphMetadata {
            node_types: EntityType::ALL.to_vec(),
            relations: summaries,
            transaction: EntitySummary::of(&transactions),
            address: EntitySummary::of(&addresses),
            splits: SplitSummary {
                train: split.train_count(),
                val: split.val_count(),
                test: split.test_count(),
                train_time_end: split.train_time_end,
                val_time_end: split.val_time_end,
            },
            feature_policy_version: FEATURE_POLICY_VERSION,
            normalization_scope: NORMALIZATION_SCOPE.to_string(),
            built_at: Utc::now(),
        };

        Ok(HeteroGraph {
            transactions,
            addresses,
            relations: outcomes,
            split,
            metadata,
        })
    }
}

/// Runs the whole pipeline for one [`BuildConfig`].
pub struct GraphBuilder<'a> {
    config: &'a BuildConfig,
    reader: CsvTableReader,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self {
            config,
            reader: CsvTableReader::new(),
        }
    }

    pub fn build(&self) -> Result<HeteroGraph> {
        let config = self.config;
        config.validate()?;
        let splitter = TemporalSplitter::new(config.train_frac, config.val_frac)?;

        info!(
            data_root = %config.data_root.display(),
            address_cap = ?config.address_cap(),
            "building heterogeneous graph"
        );

        let nodes = NodeLoader::new(&self.reader, &config.data_root);
        let transactions = nodes.load(&config.transactions, None)?;
        let addresses = nodes.load(&config.addresses, config.address_cap())?;

        let split = splitter.split(&transactions.timestamps, &transactions.labels)?;
        info!(
            train = split.train_count(),
            val = split.val_count(),
            test = split.test_count(),
            train_time_end = split.train_time_end,
            val_time_end = split.val_time_end,
            "temporal split"
        );

        let maps = EntityMaps {
            transaction: &transactions.id_map,
            address: &addresses.id_map,
        };
        let edges = EdgeLoader::new(&self.reader, &config.data_root);
        let mut relations = Vec::with_capacity(config.relations.len());
        for spec in &config.relations {
            let outcome = edges.load_declared(spec, maps)?;
            relations.push((spec.clone(), outcome));
        }

        let graph = GraphAssembler::assemble(transactions, addresses, relations, split)?;
        info!(
            transactions = graph.transactions.num_nodes(),
            addresses = graph.addresses.num_nodes(),
            relations = graph.relations.len(),
            "graph assembled"
        );
        Ok(graph)
    }
}
