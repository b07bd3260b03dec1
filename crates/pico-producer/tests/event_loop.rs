//! End-to-end runs of the chunk event loop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pico_core::{DataKind, InputFile};
use pico_nano::{Cell, Column, EVENT_TREE, NanoFile, Tree, count_events};
use pico_producer::bookkeeper::bins;
use pico_producer::{ModuleOptions, ModuleRegistry, ProcessorConfig, run};

/// Build an input file with `n` events; event `i` has one muon and one tau
/// back-to-back, with the tau failing identification on every third event.
fn write_input(path: &Path, n: u64, data: bool) -> PathBuf {
    let mut tree = Tree::new(EVENT_TREE);
    tree.declare("run", Column::I64(Vec::new())).unwrap();
    tree.declare("luminosityBlock", Column::I64(Vec::new())).unwrap();
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
    tree.declare("Tau_genmatch", Column::JaggedI64(Vec::new())).unwrap();
    if !data {
        tree.declare("genweight", Column::F64(Vec::new())).unwrap();
    }
    for i in 0..n {
        let tau_id = if i % 3 == 2 { 8.0 } else { 32.0 }; // every third tau fails Medium
        let mut row = BTreeMap::new();
        row.insert("run".to_string(), Cell::I64(315257));
        row.insert("luminosityBlock".to_string(), Cell::I64(1 + (i as i64 % 100)));
        row.insert("nMuon".to_string(), Cell::I64(1));
        row.insert("Muon_pt".to_string(), Cell::VecF64(vec![30.0 + i as f64 % 10.0]));
        row.insert("Muon_eta".to_string(), Cell::VecF64(vec![0.4]));
        row.insert("Muon_phi".to_string(), Cell::VecF64(vec![0.0]));
        row.insert("Muon_mass".to_string(), Cell::VecF64(vec![0.105]));
        row.insert("Muon_charge".to_string(), Cell::VecI64(vec![1]));
        row.insert("Muon_iso".to_string(), Cell::VecF64(vec![0.05]));
        row.insert("nTau".to_string(), Cell::I64(1));
        row.insert("Tau_pt".to_string(), Cell::VecF64(vec![35.0]));
        row.insert("Tau_eta".to_string(), Cell::VecF64(vec![-0.7]));
        row.insert("Tau_phi".to_string(), Cell::VecF64(vec![3.0]));
        row.insert("Tau_mass".to_string(), Cell::VecF64(vec![1.2]));
        row.insert("Tau_charge".to_string(), Cell::VecI64(vec![-1]));
        row.insert("Tau_idDeepTauVSjet".to_string(), Cell::VecF64(vec![tau_id]));
        row.insert("Tau_genmatch".to_string(), Cell::VecI64(vec![5]));
        if !data {
            row.insert("genweight".to_string(), Cell::F64(0.9));
        }
        tree.fill(&row).unwrap();
    }
    let mut file = NanoFile::new();
    file.put_tree(tree);
    file.save(path).unwrap();
    path.to_path_buf()
}

fn config(outdir: &Path, infiles: Vec<InputFile>, kind: DataKind) -> ProcessorConfig {
    ProcessorConfig {
        module: "MuTau".to_string(),
        options: ModuleOptions::new(),
        channel: "mutau".to_string(),
        era: "UL2018".to_string(),
        kind,
        infiles,
        outdir: outdir.to_path_buf(),
        copydir: None,
        tag: "_mutau_0".to_string(),
        maxevts: None,
        preselect: None,
        json: None,
        prefetch: false,
        retries: 1,
    }
}

#[test]
fn mc_chunk_with_two_files() {
    let dir = tempfile::tempdir().unwrap();
    let in1 = write_input(&dir.path().join("nano_1.json"), 9, false);
    let in2 = write_input(&dir.path().join("nano_2.json"), 6, false);
    let outdir = dir.path().join("out");

    let cfg = config(
        &outdir,
        vec![InputFile::whole(in1.to_string_lossy()), InputFile::whole(in2.to_string_lossy())],
        DataKind::Mc,
    );
    let report = run(&cfg, &ModuleRegistry::builtin()).unwrap();

    // 15 events, every third fails the tau ID.
    assert_eq!(report.written, 10);
    assert_eq!(count_events(&report.outfile).unwrap(), 10);

    let cutflow = report.cutflow;
    assert_eq!(cutflow.bin_content(bins::FULL), 15.0);
    assert_eq!(cutflow.bin_content(bins::READ), 15.0);
    assert_eq!(cutflow.bin_content(bins::SKIM), 15.0);
    assert_eq!(cutflow.bin_content(bins::PASS), 10.0);
    assert!((cutflow.bin_content(bins::FULL_WGT) - 13.5).abs() < 1e-9);
    assert!((cutflow.bin_content(bins::PASS_WGT) - 9.0).abs() < 1e-9);
    pico_producer::check_cutflow(&cutflow).unwrap();

    // The output tree carries the flat pair tuple.
    let out = NanoFile::open(&report.outfile).unwrap();
    let tree = out.tree(EVENT_TREE).unwrap();
    let m_vis = tree.scalar_f64("m_vis").unwrap();
    assert_eq!(m_vis.len(), 10);
    assert!(m_vis.iter().all(|&m| m > 0.0));
    let q1 = tree.scalar_f64("q_1").unwrap();
    let q2 = tree.scalar_f64("q_2").unwrap();
    assert!(q1.iter().zip(&q2).all(|(a, b)| a * b < 0.0));
}

#[test]
fn event_window_restricts_read() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir.path().join("nano.json"), 12, false);
    let outdir = dir.path().join("out");

    let cfg = config(
        &outdir,
        vec![InputFile::ranged(input.to_string_lossy(), 3, 6)],
        DataKind::Mc,
    );
    let report = run(&cfg, &ModuleRegistry::builtin()).unwrap();
    let cutflow = report.cutflow;
    // A windowed chunk owns only its window, so full == read == 6.
    assert_eq!(cutflow.bin_content(bins::FULL), 6.0);
    assert_eq!(cutflow.bin_content(bins::READ), 6.0);
    // events 3..9: indices 5 and 8 fail the tau ID
    assert_eq!(cutflow.bin_content(bins::PASS), 4.0);
}

#[test]
fn certified_run_filter_skims_data() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir.path().join("data.json"), 10, true);
    let json = dir.path().join("cert.json");
    // events carry lumi blocks 1..=10; certify 1-5 only
    std::fs::write(&json, r#"{"315257": [[1, 5]]}"#).unwrap();
    let outdir = dir.path().join("out");

    let mut cfg = config(&outdir, vec![InputFile::whole(input.to_string_lossy())], DataKind::Data);
    cfg.json = Some(json);
    let report = run(&cfg, &ModuleRegistry::builtin()).unwrap();

    let cutflow = report.cutflow;
    assert_eq!(cutflow.bin_content(bins::FULL), 10.0);
    assert_eq!(cutflow.bin_content(bins::SKIM), 5.0);
    // weighted bins equal unweighted ones for data
    assert_eq!(cutflow.bin_content(bins::FULL_WGT), 10.0);
    assert_eq!(cutflow.bin_content(bins::SKIM_WGT), 5.0);
}

#[test]
fn preselection_counts_as_skim() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir.path().join("nano.json"), 10, false);
    let outdir = dir.path().join("out");

    let mut cfg = config(&outdir, vec![InputFile::whole(input.to_string_lossy())], DataKind::Mc);
    cfg.preselect = Some("luminosityBlock <= 4".to_string());
    let report = run(&cfg, &ModuleRegistry::builtin()).unwrap();
    let cutflow = report.cutflow;
    assert_eq!(cutflow.bin_content(bins::READ), 10.0);
    assert_eq!(cutflow.bin_content(bins::SKIM), 4.0);
    assert!(cutflow.bin_content(bins::PASS) <= 4.0);
}

#[test]
fn zero_event_chunk_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir.path().join("nano.json"), 5, false);
    let outdir = dir.path().join("out");

    let mut cfg = config(&outdir, vec![InputFile::whole(input.to_string_lossy())], DataKind::Mc);
    cfg.preselect = Some("luminosityBlock > 999".to_string());
    let report = run(&cfg, &ModuleRegistry::builtin()).unwrap();
    assert_eq!(report.written, 0);
    let out = NanoFile::open(&report.outfile).unwrap();
    assert_eq!(out.tree(EVENT_TREE).unwrap().nevents(), 0);
    assert_eq!(out.hist("cutflow").unwrap().bin_content(bins::FULL), 5.0);
}

#[test]
fn module_chain_runs_in_declaration_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir.path().join("nano.json"), 9, false);
    let outdir = dir.path().join("out");

    let mut cfg = config(&outdir, vec![InputFile::whole(input.to_string_lossy())], DataKind::Mc);
    cfg.module = "MuTau,Skim".to_string();
    let report = run(&cfg, &ModuleRegistry::builtin()).unwrap();
    // MuTau filters first (every third event fails), Skim then copies the
    // surviving raw branches alongside the pair tuple.
    assert_eq!(report.written, 6);
    let out = NanoFile::open(&report.outfile).unwrap();
    let tree = out.tree(EVENT_TREE).unwrap();
    assert!(tree.has_branch("m_vis"));
    assert!(tree.has_branch("Muon_pt"));
}

#[test]
fn unknown_module_fails_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let outdir = dir.path().join("out");
    let mut cfg = config(
        &outdir,
        vec![InputFile::whole("/definitely/missing.json")],
        DataKind::Mc,
    );
    cfg.module = "NoSuchModule".to_string();
    let err = run(&cfg, &ModuleRegistry::builtin()).unwrap_err();
    assert!(matches!(err, pico_core::Error::Config(_)));
}

#[test]
fn skim_module_copies_branches() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(&dir.path().join("nano.json"), 6, false);
    let outdir = dir.path().join("out");

    let mut cfg = config(&outdir, vec![InputFile::whole(input.to_string_lossy())], DataKind::Mc);
    cfg.module = "Skim".to_string();
    cfg.channel = "skim".to_string();
    cfg.preselect = Some("luminosityBlock <= 3".to_string());
    let report = run(&cfg, &ModuleRegistry::builtin()).unwrap();
    assert_eq!(report.written, 3);
    let out = NanoFile::open(&report.outfile).unwrap();
    let tree = out.tree(EVENT_TREE).unwrap();
    assert!(tree.has_branch("Muon_pt"));
    assert!(tree.has_branch("genweight"));
    assert_eq!(tree.nevents(), 3);
}
