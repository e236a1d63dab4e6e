pub mod topology {
    use ndarray::Array2;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::fmt;

    /// The two disjoint node populations of the graph.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum EntityType {
        Transaction,
        Address,
    }

    impl EntityType {
        pub const ALL: [EntityType; 2] = [EntityType::Transaction, EntityType::Address];

        pub fn as_str(&self) -> &'static str {
            match self {
                EntityType::Transaction => "transaction",
                EntityType::Address => "address",
            }
        }

        /// Short form used in relation names (`tx-addr`).
        pub fn short(&self) -> &'static str {
            match self {
                EntityType::Transaction => "tx",
                EntityType::Address => "addr",
            }
        }
    }

    impl fmt::Display for EntityType {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// A directed edge type between two entity types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct RelationKey {
        pub src: EntityType,
        pub dst: EntityType,
    }

    impl RelationKey {
        pub fn new(src: EntityType, dst: EntityType) -> Self {
            Self { src, dst }
        }

        /// `tx-tx`, `addr-tx`, ...
        pub fn name(&self) -> String {
            format!("{}-{}", self.src.short(), self.dst.short())
        }

        /// `transaction_to_address`, the key used in summaries.
        pub fn summary_key(&self) -> String {
            format!("{}_to_{}", self.src.as_str(), self.dst.as_str())
        }
    }

    impl fmt::Display for RelationKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "({}, to, {})", self.src, self.dst)
        }
    }

    /// Bijection between raw identifiers and dense indices `[0, N)`.
    ///
    /// Indices are handed out in insertion order; an identifier that was
    /// already present is ignored, so the mapping never has gaps.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(from = "Vec<String>", into = "Vec<String>")]
    pub struct IdMap {
        ids: Vec<String>,
        index: HashMap<String, u32>,
    }

    impl IdMap {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.ids.len()
        }

        pub fn is_empty(&self) -> bool {
            self.ids.is_empty()
        }

        pub fn get(&self, raw_id: &str) -> Option<u32> {
            self.index.get(raw_id).copied()
        }

        pub fn contains(&self, raw_id: &str) -> bool {
            self.index.contains_key(raw_id)
        }

        pub fn raw_id(&self, idx: u32) -> Option<&str> {
            self.ids.get(idx as usize).map(String::as_str)
        }

        /// `(raw_id, index)` pairs in index order.
        pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
            self.ids
                .iter()
                .enumerate()
                .map(|(idx, id)| (id.as_str(), idx as u32))
        }

        fn insert(&mut self, raw_id: String) -> Option<u32> {
            if self.index.contains_key(&raw_id) {
                return None;
            }
            let idx = self.ids.len() as u32;
            self.index.insert(raw_id.clone(), idx);
            self.ids.push(raw_id);
            Some(idx)
        }
    }

    impl FromIterator<String> for IdMap {
        fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
            let mut map = IdMap::new();
            for raw_id in iter {
                map.insert(raw_id);
            }
            map
        }
    }

    impl From<Vec<String>> for IdMap {
        fn from(ids: Vec<String>) -> Self {
            ids.into_iter().collect()
        }
    }

    impl From<IdMap> for Vec<String> {
        fn from(map: IdMap) -> Self {
            map.ids
        }
    }

    /// Resolved edges of one relation.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EdgeSet {
        pub relation: RelationKey,
        /// `(src_index, dst_index)` in the source/destination index spaces.
        pub pairs: Vec<(u32, u32)>,
        /// Rows read from the raw edge list, including dropped ones.
        pub total_read: usize,
    }

    impl EdgeSet {
        pub fn empty(relation: RelationKey) -> Self {
            Self {
                relation,
                pairs: Vec::new(),
                total_read: 0,
            }
        }

        pub fn num_edges(&self) -> usize {
            self.pairs.len()
        }

        pub fn dropped(&self) -> usize {
            self.total_read.saturating_sub(self.pairs.len())
        }

        /// `2 x E` matrix, row 0 holding sources and row 1 destinations.
        pub fn edge_index(&self) -> Array2<i64> {
            let mut out = Array2::zeros((2, self.pairs.len()));
            for (col, &(src, dst)) in self.pairs.iter().enumerate() {
                out[[0, col]] = src as i64;
                out[[1, col]] = dst as i64;
            }
            out
        }

        /// First edge with an endpoint outside `[0, n_src) x [0, n_dst)`.
        pub fn first_out_of_range(&self, n_src: usize, n_dst: usize) -> Option<(u32, u32)> {
            self.pairs
                .iter()
                .copied()
                .find(|&(src, dst)| src as usize >= n_src || dst as usize >= n_dst)
        }
    }
}

pub mod properties {
    use serde::{Deserialize, Serialize};

    pub const LABEL_FRAUD: i8 = 1;
    pub const LABEL_LEGIT: i8 = 0;
    pub const LABEL_UNKNOWN: i8 = -1;

    pub fn is_labeled(label: i8) -> bool {
        label != LABEL_UNKNOWN
    }

    /// Raw class codes of one entity source.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LabelCodes {
        pub positive: String,
        pub negative: String,
        /// Explicit "no ground truth" code. Empty cells are missing as well.
        pub missing: String,
    }

    impl Default for LabelCodes {
        fn default() -> Self {
            Self {
                positive: "1".to_string(),
                negative: "2".to_string(),
                missing: "3".to_string(),
            }
        }
    }

    /// How a raw class cell was interpreted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LabelMapping {
        Known(i8),
        Missing,
        Unmapped,
    }

    impl LabelMapping {
        pub fn label(&self) -> i8 {
            match self {
                LabelMapping::Known(label) => *label,
                LabelMapping::Missing | LabelMapping::Unmapped => LABEL_UNKNOWN,
            }
        }
    }

    impl LabelCodes {
        pub fn map(&self, raw: &str) -> LabelMapping {
            let code = canonical_code(raw);
            if code.is_empty() || code == canonical_code(&self.missing) {
                LabelMapping::Missing
            } else if code == canonical_code(&self.positive) {
                LabelMapping::Known(LABEL_FRAUD)
            } else if code == canonical_code(&self.negative) {
                LabelMapping::Known(LABEL_LEGIT)
            } else {
                LabelMapping::Unmapped
            }
        }
    }

    // "2.0" and "2" are the same class code.
    fn canonical_code(raw: &str) -> String {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() && v.fract() == 0.0 => format!("{}", v as i64),
            _ => trimmed.to_ascii_lowercase(),
        }
    }
}

pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod persistence;
pub mod split;

pub use error::{BuildError, Result};
