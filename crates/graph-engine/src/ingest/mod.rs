//! Loading raw tabular sources into node tables and edge sets.
//!
//! Node loaders run first and return their [`IdMap`](crate::topology::IdMap)s;
//! edge loading only ever borrows those finished maps.

pub mod edges;
pub mod features;
pub mod nodes;
pub mod table;

pub use edges::{EdgeLoader, EntityMaps, RelationOutcome, RelationSpec};
pub use features::{ColumnPredicate, FeaturePolicy};
pub use nodes::{EntitySpec, EntityTable, NodeLoader, NodeStats, SourceLayout};
pub use table::{CsvTableReader, Table};
