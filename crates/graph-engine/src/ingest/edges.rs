use crate::error::{BuildError, Result};
use crate::ingest::table::CsvTableReader;
use crate::topology::{EdgeSet, EntityType, IdMap, RelationKey};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// A declared relation and where its edge list lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSpec {
    pub src: EntityType,
    pub dst: EntityType,
    pub file: String,
    /// A required relation that cannot be loaded aborts the build; an
    /// optional one is recorded as absent.
    pub required: bool,
}

impl RelationSpec {
    pub fn new(src: EntityType, dst: EntityType, file: &str, required: bool) -> Self {
        Self {
            src,
            dst,
            file: file.to_string(),
            required,
        }
    }

    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.src, self.dst)
    }
}

/// The four Elliptic++ relations. Address-to-address edges are large and
/// not always shipped, so they are optional.
pub fn elliptic_relations() -> Vec<RelationSpec> {
    use EntityType::{Address, Transaction};
    vec![
        RelationSpec::new(Transaction, Transaction, "txs_edgelist.csv", true),
        RelationSpec::new(Address, Transaction, "AddrTx_edgelist.csv", true),
        RelationSpec::new(Transaction, Address, "TxAddr_edgelist.csv", true),
        RelationSpec::new(Address, Address, "AddrAddr_edgelist.csv", false),
    ]
}

/// Result of loading one declared relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelationOutcome {
    Loaded(EdgeSet),
    /// An optional relation whose source could not be used.
    Absent { relation: RelationKey, reason: String },
}

impl RelationOutcome {
    pub fn relation(&self) -> RelationKey {
        match self {
            RelationOutcome::Loaded(edges) => edges.relation,
            RelationOutcome::Absent { relation, .. } => *relation,
        }
    }

    pub fn num_edges(&self) -> usize {
        match self {
            RelationOutcome::Loaded(edges) => edges.num_edges(),
            RelationOutcome::Absent { .. } => 0,
        }
    }

    pub fn edges(&self) -> Option<&EdgeSet> {
        match self {
            RelationOutcome::Loaded(edges) => Some(edges),
            RelationOutcome::Absent { .. } => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RelationOutcome::Absent { .. })
    }
}

/// Borrowed id maps of both entity spaces.
#[derive(Clone, Copy)]
pub struct EntityMaps<'a> {
    pub transaction: &'a IdMap,
    pub address: &'a IdMap,
}

impl<'a> EntityMaps<'a> {
    pub fn get(&self, entity: EntityType) -> &'a IdMap {
        match entity {
            EntityType::Transaction => self.transaction,
            EntityType::Address => self.address,
        }
    }
}

pub struct EdgeLoader<'a> {
    reader: &'a CsvTableReader,
    data_root: &'a Path,
}

impl<'a> EdgeLoader<'a> {
    pub fn new(reader: &'a CsvTableReader, data_root: &'a Path) -> Self {
        Self { reader, data_root }
    }

    /// Resolve the edge list at `path` into dense indices. The first two
    /// columns are source and destination whatever their header says; edges
    /// with an endpoint missing from its id map are dropped.
    pub fn load(
        &self,
        relation: RelationKey,
        path: &Path,
        source_name: &str,
        src_map: &IdMap,
        dst_map: &IdMap,
    ) -> Result<EdgeSet> {
        let mut edges = EdgeSet::empty(relation);

        let headers = self.reader.stream(path, source_name, |record| {
            if record.len() < 2 {
                return Err(BuildError::MalformedRecord {
                    source_name: source_name.to_string(),
                    line: record.position().map(|p| p.line()).unwrap_or(0),
                    detail: format!("expected 2 fields, found {}", record.len()),
                });
            }
            edges.total_read += 1;
            let src = src_map.get(record[0].trim());
            let dst = dst_map.get(record[1].trim());
            if let (Some(src), Some(dst)) = (src, dst) {
                edges.pairs.push((src, dst));
            }
            Ok(())
        })?;
        if headers.len() < 2 {
            return Err(BuildError::schema(source_name, "<destination column>"));
        }

        debug!(
            relation = %relation.name(),
            dropped = edges.dropped(),
            "unresolvable edges dropped"
        );
        info!(
            relation = %relation.name(),
            total = edges.total_read,
            valid = edges.num_edges(),
            "edges loaded"
        );
        Ok(edges)
    }

    /// Load a declared relation, turning failures of an optional relation
    /// into [`RelationOutcome::Absent`].
    pub fn load_declared(&self, spec: &RelationSpec, maps: EntityMaps<'_>) -> Result<RelationOutcome> {
        let relation = spec.key();
        let path = self.data_root.join(&spec.file);

        if !spec.required && !path.is_file() {
            warn!(relation = %relation.name(), file = %spec.file, "optional relation not found, recording zero edges");
            return Ok(RelationOutcome::Absent {
                relation,
                reason: format!("source `{}` not found", spec.file),
            });
        }

        info!(relation = %relation.name(), file = %spec.file, "loading edges");
        match self.load(
            relation,
            &path,
            &spec.file,
            maps.get(spec.src),
            maps.get(spec.dst),
        ) {
            Ok(edges) => Ok(RelationOutcome::Loaded(edges)),
            Err(err) if !spec.required => {
                warn!(relation = %relation.name(), error = %err, "optional relation unavailable, recording zero edges");
                Ok(RelationOutcome::Absent {
                    relation,
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}
