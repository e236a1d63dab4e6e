use crate::error::{BuildError, Result};
use crate::ingest::features::{self, ColumnPredicate, FeaturePolicy};
use crate::ingest::table::{CsvTableReader, Table};
use crate::properties::{LabelCodes, LabelMapping, LABEL_FRAUD, LABEL_LEGIT};
use crate::topology::{EntityType, IdMap};
use ndarray::Array2;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Physical layout of an entity's source files under the data root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLayout {
    /// One table carrying id, features, time step and class.
    Combined(String),
    /// A features table left-joined with a classes table on the id column.
    Joined { features: String, classes: String },
}

impl SourceLayout {
    fn files(&self) -> Vec<&str> {
        match self {
            SourceLayout::Combined(file) => vec![file.as_str()],
            SourceLayout::Joined { features, classes } => {
                vec![features.as_str(), classes.as_str()]
            }
        }
    }
}

/// Everything the loader needs to know about one entity type's sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub entity: EntityType,
    pub id_column: String,
    pub time_column: String,
    pub class_column: String,
    /// Tried in order; the first layout whose files all exist wins.
    pub layouts: Vec<SourceLayout>,
    pub feature_policy: FeaturePolicy,
    pub label_codes: LabelCodes,
    /// Column ranking rows for the cardinality cap.
    pub activity_column: Option<String>,
}

impl EntitySpec {
    pub fn elliptic_transactions() -> Self {
        Self {
            entity: EntityType::Transaction,
            id_column: "txId".to_string(),
            time_column: "Time step".to_string(),
            class_column: "class".to_string(),
            layouts: vec![SourceLayout::Joined {
                features: "txs_features.csv".to_string(),
                classes: "txs_classes.csv".to_string(),
            }],
            feature_policy: FeaturePolicy::Matching {
                predicates: vec![ColumnPredicate::Contains("Local".to_string())],
                fallback_first_k: 93,
            },
            label_codes: LabelCodes::default(),
            activity_column: None,
        }
    }

    pub fn elliptic_addresses() -> Self {
        Self {
            entity: EntityType::Address,
            id_column: "address".to_string(),
            time_column: "Time step".to_string(),
            class_column: "class".to_string(),
            layouts: vec![
                SourceLayout::Combined("wallets_features_classes_combined.csv".to_string()),
                SourceLayout::Joined {
                    features: "wallets_features.csv".to_string(),
                    classes: "wallets_classes.csv".to_string(),
                },
            ],
            feature_policy: FeaturePolicy::AllColumns,
            label_codes: LabelCodes::default(),
            activity_column: Some("total_txs".to_string()),
        }
    }

    fn is_reserved(&self, column: &str) -> bool {
        column == self.id_column || column == self.time_column || column == self.class_column
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub total: usize,
    pub labeled: usize,
    pub positive: usize,
    pub negative: usize,
    /// Rows dropped because their identifier was already mapped.
    pub duplicates_dropped: usize,
    /// Rows dropped by the cardinality cap.
    pub truncated: usize,
    pub imputed_cells: usize,
    pub unmapped_labels: usize,
    pub feature_fallback: bool,
}

/// One loaded node population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTable {
    pub entity: EntityType,
    pub id_map: IdMap,
    pub feature_names: Vec<String>,
    pub features: Array2<f32>,
    pub labels: Vec<i8>,
    pub timestamps: Vec<u32>,
    pub stats: NodeStats,
}

impl EntityTable {
    pub fn num_nodes(&self) -> usize {
        self.id_map.len()
    }

    pub fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn temporal_range(&self) -> Option<(u32, u32)> {
        let min = self.timestamps.iter().min()?;
        let max = self.timestamps.iter().max()?;
        Some((*min, *max))
    }
}

pub struct NodeLoader<'a> {
    reader: &'a CsvTableReader,
    data_root: &'a Path,
}

impl<'a> NodeLoader<'a> {
    pub fn new(reader: &'a CsvTableReader, data_root: &'a Path) -> Self {
        Self { reader, data_root }
    }

    /// Load one entity type. `top_k` keeps only the K most active rows
    /// (by `spec.activity_column`); `None` keeps the full population.
    pub fn load(&self, spec: &EntitySpec, top_k: Option<usize>) -> Result<EntityTable> {
        info!(entity = %spec.entity, "loading nodes");
        let table = self.read_source(spec)?;

        let id_col = table.column(&spec.id_column)?;
        let time_col = table.column(&spec.time_column)?;
        let class_col = table.column(&spec.class_column)?;

        let candidates: Vec<usize> = (0..table.headers.len())
            .filter(|&i| !spec.is_reserved(&table.headers[i]))
            .collect();
        let candidate_names: Vec<&str> = candidates
            .iter()
            .map(|&i| table.headers[i].as_str())
            .collect();
        let selection = spec.feature_policy.select(&candidate_names);
        if selection.columns.is_empty() {
            return Err(BuildError::schema(&table.source_name, "<feature columns>"));
        }
        if selection.used_fallback {
            warn!(
                entity = %spec.entity,
                columns = selection.columns.len(),
                "no column matched the feature policy, using the first columns"
            );
        }
        let feature_cols: Vec<usize> = selection.columns.iter().map(|&c| candidates[c]).collect();

        let mut stats = NodeStats {
            feature_fallback: selection.used_fallback,
            ..NodeStats::default()
        };

        let mut order = unique_rows(&table, id_col, &mut stats)?;
        if let Some(k) = top_k {
            let activity = spec
                .activity_column
                .as_deref()
                .ok_or_else(|| {
                    BuildError::InvalidConfig(format!(
                        "a cap was requested for {} but no activity column is configured",
                        spec.entity
                    ))
                })?;
            let activity_col = table.column(activity)?;
            rank_by_activity(&table, activity_col, &mut order);
            stats.truncated = order.len().saturating_sub(k);
            order.truncate(k);
            info!(entity = %spec.entity, k, "kept most active rows");
        }

        let id_map: IdMap = order
            .iter()
            .map(|&row| field(&table, row, id_col).trim().to_string())
            .collect();

        let mut x = Array2::<f32>::zeros((order.len(), feature_cols.len()));
        let mut timestamps = Vec::with_capacity(order.len());
        let mut labels = Vec::with_capacity(order.len());

        for (node, &row) in order.iter().enumerate() {
            for (j, &col) in feature_cols.iter().enumerate() {
                let (value, imputed) = features::parse_cell(field(&table, row, col));
                x[[node, j]] = value;
                stats.imputed_cells += imputed as usize;
            }

            let raw_time = field(&table, row, time_col).trim();
            let time = parse_time_step(raw_time).ok_or_else(|| BuildError::MalformedRecord {
                source_name: table.source_name.clone(),
                line: table.line_of(row),
                detail: format!("`{}` is not a time step: {:?}", spec.time_column, raw_time),
            })?;
            timestamps.push(time);

            let mapping = spec.label_codes.map(field(&table, row, class_col));
            if mapping == LabelMapping::Unmapped {
                stats.unmapped_labels += 1;
            }
            labels.push(mapping.label());
        }

        features::normalize_columns(&mut x);

        stats.total = id_map.len();
        stats.positive = labels.iter().filter(|&&l| l == LABEL_FRAUD).count();
        stats.negative = labels.iter().filter(|&&l| l == LABEL_LEGIT).count();
        stats.labeled = stats.positive + stats.negative;

        if stats.unmapped_labels > 0 {
            warn!(
                entity = %spec.entity,
                count = stats.unmapped_labels,
                "unexpected class codes treated as unknown"
            );
        }
        info!(
            entity = %spec.entity,
            nodes = stats.total,
            features = feature_cols.len(),
            labeled = stats.labeled,
            fraud = stats.positive,
            legit = stats.negative,
            "nodes loaded"
        );

        Ok(EntityTable {
            entity: spec.entity,
            id_map,
            feature_names: feature_cols.iter().map(|&c| table.headers[c].clone()).collect(),
            features: x,
            labels,
            timestamps,
            stats,
        })
    }

    fn read_source(&self, spec: &EntitySpec) -> Result<Table> {
        let layout = spec
            .layouts
            .iter()
            .find(|layout| layout.files().iter().all(|f| self.data_root.join(f).is_file()));

        match layout {
            Some(SourceLayout::Combined(file)) => {
                info!(entity = %spec.entity, file = %file, "using combined source");
                self.reader.read_table(&self.data_root.join(file), file)
            }
            Some(SourceLayout::Joined { features, classes }) => {
                let left = self.reader.read_table(&self.data_root.join(features), features)?;
                let right = self.reader.read_table(&self.data_root.join(classes), classes)?;
                left.left_join(&right, &spec.id_column)
            }
            None => {
                let missing = spec
                    .layouts
                    .last()
                    .and_then(|layout| {
                        layout
                            .files()
                            .into_iter()
                            .find(|f| !self.data_root.join(f).is_file())
                    })
                    .unwrap_or("<no source layout configured>");
                Err(BuildError::missing(missing, self.data_root.join(missing)))
            }
        }
    }
}

fn field(table: &Table, row: usize, col: usize) -> &str {
    table.rows[row].get(col).unwrap_or("")
}

fn parse_time_step(raw: &str) -> Option<u32> {
    if let Ok(v) = raw.parse::<u32>() {
        return Some(v);
    }
    // "3.0" style exports
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => {
            Some(v as u32)
        }
        _ => None,
    }
}

/// Row indices in source order, keeping only the first row of each
/// identifier.
fn unique_rows(table: &Table, id_col: usize, stats: &mut NodeStats) -> Result<Vec<usize>> {
    let mut seen = HashSet::with_capacity(table.len());
    let mut order = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let id = field(table, row, id_col).trim();
        if id.is_empty() {
            return Err(BuildError::MalformedRecord {
                source_name: table.source_name.clone(),
                line: table.line_of(row),
                detail: "empty identifier".to_string(),
            });
        }
        if seen.insert(id) {
            order.push(row);
        } else {
            stats.duplicates_dropped += 1;
        }
    }
    if stats.duplicates_dropped > 0 {
        warn!(
            source = %table.source_name,
            count = stats.duplicates_dropped,
            "duplicate identifiers dropped, first row kept"
        );
    }
    Ok(order)
}

/// Stable sort, most active first; unparseable activity ranks last.
fn rank_by_activity(table: &Table, activity_col: usize, order: &mut [usize]) {
    order.sort_by_key(|&row| {
        let activity = field(table, row, activity_col)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| !v.is_nan())
            .unwrap_or(f64::NEG_INFINITY);
        Reverse(OrderedFloat(activity))
    });
}
