//! Driver smoke tests against the built binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use pico_nano::{Cell, Column, EVENT_TREE, NanoFile, Tree};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pico"))
}

fn run_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(bin_path())
        .arg("--basedir")
        .arg(dir)
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn write_input(path: &Path, n: u64) {
    let mut tree = Tree::new(EVENT_TREE);
    tree.declare("nMuon", Column::I64(Vec::new())).unwrap();
    tree.declare("Muon_pt", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("Muon_eta", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("Muon_phi", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("Muon_mass", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("Muon_charge", Column::JaggedI64(Vec::new())).unwrap();
    tree.declare("Muon_iso", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("nTau", Column::I64(Vec::new())).unwrap();
    tree.declare("Tau_pt", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("Tau_eta", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("Tau_phi", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("Tau_mass", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("Tau_charge", Column::JaggedI64(Vec::new())).unwrap();
    tree.declare("Tau_idDeepTauVSjet", Column::JaggedF64(Vec::new())).unwrap();
    tree.declare("genweight", Column::F64(Vec::new())).unwrap();
    for _ in 0..n {
        let mut row = BTreeMap::new();
        row.insert("nMuon".to_string(), Cell::I64(1));
        row.insert("Muon_pt".to_string(), Cell::VecF64(vec![35.0]));
        row.insert("Muon_eta".to_string(), Cell::VecF64(vec![0.3]));
        row.insert("Muon_phi".to_string(), Cell::VecF64(vec![0.2]));
        row.insert("Muon_mass".to_string(), Cell::VecF64(vec![0.105]));
        row.insert("Muon_charge".to_string(), Cell::VecI64(vec![-1]));
        row.insert("Muon_iso".to_string(), Cell::VecF64(vec![0.01]));
        row.insert("nTau".to_string(), Cell::I64(1));
        row.insert("Tau_pt".to_string(), Cell::VecF64(vec![45.0]));
        row.insert("Tau_eta".to_string(), Cell::VecF64(vec![1.1]));
        row.insert("Tau_phi".to_string(), Cell::VecF64(vec![-2.4]));
        row.insert("Tau_mass".to_string(), Cell::VecF64(vec![0.8]));
        row.insert("Tau_charge".to_string(), Cell::VecI64(vec![1]));
        row.insert("Tau_idDeepTauVSjet".to_string(), Cell::VecF64(vec![32.0]));
        row.insert("genweight".to_string(), Cell::F64(1.0));
        tree.fill(&row).unwrap();
    }
    let mut file = NanoFile::new();
    file.put_tree(tree);
    file.save(path).unwrap();
}

#[test]
fn run_chunk_locally() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("nano_1.json");
    write_input(&input, 7);

    let out = run_in(
        dir.path(),
        &[
            "run",
            "-y",
            "UL2018",
            "-c",
            "mutau",
            "-M",
            "MuTau",
            "-d",
            "mc",
            "-t",
            "_0",
            "-o",
            "out",
            "-i",
            &input.to_string_lossy(),
        ],
    );
    assert!(
        out.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    let outfile = dir.path().join("out/pico_mutau_0.json");
    assert!(outfile.is_file());
    let pico = NanoFile::open(&outfile).unwrap();
    assert_eq!(pico.tree(EVENT_TREE).unwrap().nevents(), 7);
    assert_eq!(pico.hist("cutflow").unwrap().bin_content(0), 7.0);
}

#[test]
fn run_with_event_window() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("nano_1.json");
    write_input(&input, 10);

    let spec = format!("{}:2:5", input.to_string_lossy());
    let out = run_in(
        dir.path(),
        &["run", "-y", "UL2018", "-c", "mutau", "-M", "MuTau", "-d", "mc", "-o", "out", "-i", &spec],
    );
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let pico = NanoFile::open(dir.path().join("out/pico_mutau.json")).unwrap();
    assert_eq!(pico.tree(EVENT_TREE).unwrap().nevents(), 5);
}

#[test]
fn unknown_module_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_in(
        dir.path(),
        &["run", "-y", "UL2018", "-c", "mutau", "-M", "NoSuchModule", "-i", "x.json"],
    );
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn status_on_unknown_era_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_in(dir.path(), &["status", "-y", "UL2018", "-c", "mutau"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn era_and_channel_links_update_config() {
    let dir = tempfile::tempdir().unwrap();
    let samples = dir.path().join("samples_UL2018.json");
    std::fs::write(
        &samples,
        r#"[{"group": "DY", "name": "DYJetsToLL_M-50", "xsec": 6077.22,
            "paths": ["/DYJetsToLL_M-50_madgraphMLM-pythia8/RunIISummer20UL2018/NANOAODSIM"]}]"#,
    )
    .unwrap();

    let out = run_in(dir.path(), &["era", "UL2018", &samples.to_string_lossy()]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let out = run_in(dir.path(), &["channel", "mutau", "MuTau"]);
    assert!(out.status.success());
    // linking to an unknown module fails up front
    let out = run_in(dir.path(), &["channel", "etau", "NoSuchModule"]);
    assert_eq!(out.status.code(), Some(2));

    let out = run_in(dir.path(), &["list", "-y", "UL2018"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("DYJetsToLL_M-50"));
}
