//! Merge behavior of the local storage back-end.

use std::collections::BTreeMap;

use pico_nano::{Cell, Column, EVENT_TREE, Hist1D, NanoFile, Tree, count_events};
use pico_storage::{StorageSystem, storage_for};

fn write_tuple(path: &std::path::Path, masses: &[f64]) {
    let mut tree = Tree::new(EVENT_TREE);
    tree.declare("m_vis", Column::F64(Vec::new())).unwrap();
    for &m in masses {
        let mut row = BTreeMap::new();
        row.insert("m_vis".to_string(), Cell::F64(m));
        tree.fill(&row).unwrap();
    }
    let mut file = NanoFile::new();
    file.put_tree(tree);
    let mut cutflow = Hist1D::new("cutflow", 12, 0.0, 12.0);
    cutflow.add_bin_content(0, masses.len() as f64);
    cutflow.add_bin_content(3, masses.len() as f64);
    file.put_hist(cutflow);
    file.save(path).unwrap();
}

#[test]
fn hadd_direct_and_via_tmp() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_string_lossy().into_owned();
    let store = storage_for(&base).unwrap();

    write_tuple(&dir.path().join("chunk_0.json"), &[60.0, 90.0]);
    write_tuple(&dir.path().join("chunk_1.json"), &[120.0]);
    let sources =
        vec![format!("{base}/chunk_0.json"), format!("{base}/chunk_1.json")];

    store.hadd(&sources, "merged.json", false).unwrap();
    assert_eq!(count_events(dir.path().join("merged.json")).unwrap(), 3);

    store.hadd(&sources, "merged_tmp.json", true).unwrap();
    let merged = NanoFile::open(dir.path().join("merged_tmp.json")).unwrap();
    assert_eq!(merged.tree(EVENT_TREE).unwrap().nevents(), 3);
    assert_eq!(merged.hist("cutflow").unwrap().bin_content(0), 3.0);
    assert_eq!(merged.hist("cutflow").unwrap().bin_content(3), 3.0);
}

#[test]
fn exists_never_errors_on_garbage() {
    let store = storage_for("/tmp").unwrap();
    assert!(!store.exists("definitely/not/a/real/path/anywhere"));
}
