use fraudgraph_core::config::BuildConfig;
use fraudgraph_core::graph::{GraphBuilder, HeteroGraph};
use fraudgraph_core::ingest::FeaturePolicy;
use fraudgraph_core::persistence::{load_artifact, load_mappings, load_summary, ArtifactWriter};
use fraudgraph_core::topology::{EdgeSet, EntityType, RelationKey};
use fraudgraph_core::BuildError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use EntityType::{Address, Transaction};

const TX_FEATURES: &str = "\
txId,Time step,Local_feature_1,Local_feature_2,Aggregate_feature_1
101,1,0.5,7,1
102,1,1.5,7,2
103,2,,7,3
104,2,2.0,7,4
105,3,3.0,7,5
106,3,NaN,7,6
107,4,4.0,7,7
108,4,5.0,7,8
109,5,6.0,7,9
110,5,7.0,7,10
";

const TX_CLASSES: &str = "\
txId,class
101,1
102,2
103,2
104,1
105,2
106,2
107,1
108,2
109,2
110,1
";

const WALLETS_COMBINED: &str = "\
address,Time step,total_txs,balance,class
a1,1,10,0.5,1
a2,2,5,1.5,2
a3,3,1,2.5,3
a4,4,8,3.5,2
";

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn write_dataset(dir: &Path, with_addr_addr: bool) {
    write(dir, "txs_features.csv", TX_FEATURES);
    write(dir, "txs_classes.csv", TX_CLASSES);
    write(dir, "wallets_features_classes_combined.csv", WALLETS_COMBINED);
    write(dir, "txs_edgelist.csv", "txId1,txId2\n101,102\n103,104\n105,999\n");
    write(
        dir,
        "AddrTx_edgelist.csv",
        "input_address,txId\na1,101\na2,103\na3,105\na4,107\n",
    );
    write(dir, "TxAddr_edgelist.csv", "txId,output_address\n102,a1\n104,a4\n");
    if with_addr_addr {
        write(dir, "AddrAddr_edgelist.csv", "input_address,output_address\na1,a2\na2,a4\n");
    }
}

fn config_for(dir: &TempDir, top_k: Option<usize>) -> BuildConfig {
    BuildConfig {
        data_root: dir.path().to_path_buf(),
        output_dir: dir.path().join("out"),
        top_k_addresses: top_k,
        ..BuildConfig::default()
    }
}

fn build(dir: &TempDir, top_k: Option<usize>) -> HeteroGraph {
    GraphBuilder::new(&config_for(dir, top_k)).build().unwrap()
}

fn assert_edges_in_range(graph: &HeteroGraph) {
    for outcome in &graph.relations {
        if let Some(edges) = outcome.edges() {
            let n_src = graph.entity(edges.relation.src).num_nodes();
            let n_dst = graph.entity(edges.relation.dst).num_nodes();
            for &(src, dst) in &edges.pairs {
                assert!((src as usize) < n_src, "{} src {src}", edges.relation);
                assert!((dst as usize) < n_dst, "{} dst {dst}", edges.relation);
            }
        }
    }
}

#[test]
fn test_temporal_split_over_distinct_steps() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    let graph = build(&dir, Some(3));

    let split = &graph.split;
    assert_eq!(split.train_time_end, 3);
    assert_eq!(split.val_time_end, 4);
    assert_eq!(split.train_count(), 6);
    assert_eq!(split.val_count(), 2);
    assert_eq!(split.test_count(), 2);

    let ts = &graph.transactions.timestamps;
    for i in 0..ts.len() {
        assert_eq!(split.train_mask[i], ts[i] <= 3);
        assert_eq!(split.val_mask[i], ts[i] == 4);
        assert_eq!(split.test_mask[i], ts[i] == 5);
    }
}

#[test]
fn test_capped_addresses_drop_dangling_edges() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    let graph = build(&dir, Some(3));

    let addr = &graph.addresses;
    assert_eq!(addr.num_nodes(), 3);
    assert_eq!(addr.stats.truncated, 1);
    assert!(!addr.id_map.contains("a3"));
    // most active first
    assert_eq!(addr.id_map.get("a1"), Some(0));
    assert_eq!(addr.id_map.get("a4"), Some(1));
    assert_eq!(addr.id_map.get("a2"), Some(2));

    let addr_tx = graph
        .relation(RelationKey::new(Address, Transaction))
        .and_then(|r| r.edges())
        .unwrap();
    assert_eq!(addr_tx.total_read, 4);
    assert_eq!(addr_tx.num_edges(), addr_tx.total_read - 1);

    let tx_tx = graph
        .relation(RelationKey::new(Transaction, Transaction))
        .and_then(|r| r.edges())
        .unwrap();
    assert_eq!(tx_tx.pairs, vec![(0u32, 1u32), (2, 3)]);

    assert_edges_in_range(&graph);
}

#[test]
fn test_all_addresses_disables_cap() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    let mut config = config_for(&dir, Some(1));
    config.use_all_addresses = true;
    let graph = GraphBuilder::new(&config).build().unwrap();

    assert_eq!(graph.addresses.num_nodes(), 4);
    assert_eq!(graph.num_edges(RelationKey::new(Address, Transaction)), 4);
    // source order when uncapped
    assert_eq!(graph.addresses.id_map.get("a3"), Some(2));
}

#[test]
fn test_features_are_normalized_and_finite() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    let graph = build(&dir, None);

    let tx = &graph.transactions;
    assert_eq!(tx.feature_names, vec!["Local_feature_1", "Local_feature_2"]);
    assert_eq!(tx.features.dim(), (10, 2));
    assert_eq!(tx.stats.imputed_cells, 2);
    assert!(!tx.stats.feature_fallback);
    assert!(tx.features.iter().all(|v| v.is_finite()));

    // constant column
    assert!(tx.features.column(1).iter().all(|&v| v == 0.0));

    let mean: f32 = tx.features.column(0).iter().sum::<f32>() / 10.0;
    assert!(mean.abs() < 1e-5);

    assert_eq!(graph.addresses.feature_names, vec!["total_txs", "balance"]);
}

#[test]
fn test_labels_and_counts() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    write(
        dir.path(),
        "txs_classes.csv",
        "txId,class\n101,1\n102,2\n103,3\n104,unknown\n105,1.0\n",
    );
    let graph = build(&dir, None);

    let tx = &graph.transactions;
    assert_eq!(&tx.labels[..6], &[1i8, 0, -1, -1, 1, -1]);
    assert_eq!(tx.stats.labeled, 3);
    assert_eq!(tx.stats.positive, 2);
    assert_eq!(tx.stats.negative, 1);
    assert_eq!(tx.stats.unmapped_labels, 1);

    let split = &graph.split;
    for i in 0..tx.num_nodes() {
        let in_masks =
            split.train_mask[i] as u8 + split.val_mask[i] as u8 + split.test_mask[i] as u8;
        assert_eq!(in_masks, (tx.labels[i] != -1) as u8);
    }

    assert_eq!(graph.addresses.labels, vec![1i8, 0, -1, 0]);
}

#[test]
fn test_optional_relation_absent() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), false);
    let graph = build(&dir, Some(3));

    let addr_addr = graph.relation(RelationKey::new(Address, Address)).unwrap();
    assert!(addr_addr.is_absent());
    assert_eq!(addr_addr.num_edges(), 0);

    let writer = ArtifactWriter::new(dir.path().join("out"));
    let paths = writer.persist(&graph).unwrap();
    let summary = load_summary(&paths.summary).unwrap();

    assert_eq!(summary.num_edges["address_to_address"], 0);
    assert!(summary.degraded_relations.contains_key("address_to_address"));
    assert_eq!(summary.num_edges["transaction_to_transaction"], 2);
    assert_eq!(summary.num_edges["address_to_transaction"], 3);
    assert_eq!(summary.num_edges["transaction_to_address"], 2);
}

#[test]
fn test_malformed_optional_relation_degrades() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), false);
    write(dir.path(), "AddrAddr_edgelist.csv", "input_address,output_address\na1\n");
    let graph = build(&dir, None);

    assert!(graph
        .relation(RelationKey::new(Address, Address))
        .unwrap()
        .is_absent());
}

#[test]
fn test_missing_required_relation_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    fs::remove_file(dir.path().join("TxAddr_edgelist.csv")).unwrap();

    let err = GraphBuilder::new(&config_for(&dir, None)).build().unwrap_err();
    match err {
        BuildError::MissingRequiredSource { source_name, .. } => {
            assert_eq!(source_name, "TxAddr_edgelist.csv")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_class_column_is_schema_mismatch() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    write(
        dir.path(),
        "wallets_features_classes_combined.csv",
        "address,Time step,total_txs\na1,1,3\n",
    );

    let err = GraphBuilder::new(&config_for(&dir, None)).build().unwrap_err();
    match err {
        BuildError::SchemaMismatch { column, .. } => assert_eq!(column, "class"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_joined_address_layout_and_duplicates() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    fs::remove_file(dir.path().join("wallets_features_classes_combined.csv")).unwrap();
    write(
        dir.path(),
        "wallets_features.csv",
        "address,Time step,total_txs,balance\na1,1,10,0.5\na2,2,5,1.5\na1,3,10,0.9\n",
    );
    write(dir.path(), "wallets_classes.csv", "address,class\na1,1\na2,2\n");

    let graph = build(&dir, None);
    let addr = &graph.addresses;
    assert_eq!(addr.num_nodes(), 2);
    assert_eq!(addr.stats.duplicates_dropped, 1);
    assert_eq!(addr.timestamps, vec![1u32, 2]);
    assert_eq!(addr.labels, vec![1i8, 0]);
    assert_edges_in_range(&graph);
}

#[test]
fn test_feature_fallback_is_recorded() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    let mut config = config_for(&dir, None);
    config.transactions.feature_policy = FeaturePolicy::Matching {
        predicates: vec![fraudgraph_core::ingest::ColumnPredicate::Prefix("Local_".into())],
        fallback_first_k: 93,
    };
    write(
        dir.path(),
        "txs_features.csv",
        "txId,Time step,f1,f2,f3\n101,1,1,2,3\n102,2,4,5,6\n",
    );
    let graph = GraphBuilder::new(&config).build().unwrap();

    assert!(graph.transactions.stats.feature_fallback);
    assert_eq!(graph.transactions.feature_dim(), 3);
}

#[test]
fn test_persisted_outputs_reload() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    let graph = build(&dir, Some(3));
    let paths = ArtifactWriter::new(dir.path().join("out")).persist(&graph).unwrap();

    let mappings = load_mappings(&paths.mappings).unwrap();
    assert_eq!(mappings.tx_id_to_idx.len(), 10);
    assert_eq!(mappings.tx_id_to_idx["101"], 0);
    assert_eq!(mappings.addr_id_to_idx.len(), 3);
    let mut indices: Vec<u32> = mappings.addr_id_to_idx.values().copied().collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0u32, 1, 2]);

    let summary = load_summary(&paths.summary).unwrap();
    assert_eq!(summary.num_nodes.transaction, 10);
    assert_eq!(summary.num_nodes.address, 3);
    assert_eq!(summary.feature_dims.transaction, 2);
    assert_eq!(summary.temporal_range.transaction, Some((1, 5)));
    assert_eq!(summary.splits.train, 6);
    assert_eq!(summary.dropped_edges["transaction_to_transaction"], 1);

    let reloaded = load_artifact(&paths.graph).unwrap();
    assert_eq!(reloaded.metadata, graph.metadata);
    assert_eq!(reloaded.transactions.id_map, graph.transactions.id_map);
    assert_eq!(reloaded.transactions.features, graph.transactions.features);
    assert_eq!(reloaded.split, graph.split);
}

#[test]
fn test_missing_address_sources_name_last_layout() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), true);
    fs::remove_file(dir.path().join("wallets_features_classes_combined.csv")).unwrap();

    let err = GraphBuilder::new(&config_for(&dir, None)).build().unwrap_err();
    match err {
        BuildError::MissingRequiredSource { source_name, path } => {
            assert_eq!(source_name, "wallets_features.csv");
            assert_eq!(path, dir.path().join("wallets_features.csv"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bad_time_step_is_malformed_record() {
    for bad in ["x", "-1"] {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), true);
        let features = TX_FEATURES.replace("103,2,,7,3", &format!("103,{bad},,7,3"));
        write(dir.path(), "txs_features.csv", &features);

        let err = GraphBuilder::new(&config_for(&dir, None)).build().unwrap_err();
        match err {
            BuildError::MalformedRecord {
                source_name,
                line,
                detail,
            } => {
                assert!(source_name.starts_with("txs_features.csv"), "{source_name}");
                assert_eq!(line, 4);
                assert!(detail.contains("Time step"), "{detail}");
            }
            other => panic!("unexpected error for {bad:?}: {other}"),
        }
    }
}

#[test]
fn test_edge_index_layout() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), false);
    let graph = build(&dir, Some(3));

    let tx_tx = graph
        .relation(RelationKey::new(Transaction, Transaction))
        .and_then(|r| r.edges())
        .unwrap();
    let index = tx_tx.edge_index();
    assert_eq!(index.dim(), (2, 2));
    assert_eq!(index.row(0).to_vec(), vec![0i64, 2]);
    assert_eq!(index.row(1).to_vec(), vec![1i64, 3]);

    let tx_addr = graph
        .relation(RelationKey::new(Transaction, Address))
        .and_then(|r| r.edges())
        .unwrap();
    let index = tx_addr.edge_index();
    for (col, &(src, dst)) in tx_addr.pairs.iter().enumerate() {
        assert_eq!(index[[0, col]], src as i64);
        assert_eq!(index[[1, col]], dst as i64);
    }

    let empty = EdgeSet::empty(RelationKey::new(Address, Address));
    assert_eq!(empty.edge_index().dim(), (2, 0));
}
