//! Stack drawing, normalization, split consistency and the QCD estimate.

use std::collections::BTreeMap;
use std::path::Path;

use pico_draw::{
    QcdOptions, Sample, SampleSet, Selection, StackOptions, Variable, Variable2D, qcd_osss,
};
use pico_nano::{Cell, Column, EVENT_TREE, Hist1D, NanoFile, Tree};

/// Write a flat pico tuple. Each entry: (m_vis, q1*q2 sign, genmatch_2, weight).
fn write_pico(path: &Path, events: &[(f64, i64, i64, f64)], sumw: f64) {
    let mut tree = Tree::new(EVENT_TREE);
    tree.declare("m_vis", Column::F64(Vec::new())).unwrap();
    tree.declare("pt_1", Column::F64(Vec::new())).unwrap();
    tree.declare("q_1", Column::I64(Vec::new())).unwrap();
    tree.declare("q_2", Column::I64(Vec::new())).unwrap();
    tree.declare("genmatch_2", Column::I64(Vec::new())).unwrap();
    tree.declare("genweight", Column::F64(Vec::new())).unwrap();
    for &(m_vis, sign, genmatch, weight) in events {
        let mut row = BTreeMap::new();
        row.insert("m_vis".to_string(), Cell::F64(m_vis));
        row.insert("pt_1".to_string(), Cell::F64(30.0 + m_vis / 10.0));
        row.insert("q_1".to_string(), Cell::I64(1));
        row.insert("q_2".to_string(), Cell::I64(if sign < 0 { -1 } else { 1 }));
        row.insert("genmatch_2".to_string(), Cell::I64(genmatch));
        row.insert("genweight".to_string(), Cell::F64(weight));
        tree.fill(&row).unwrap();
    }
    let mut file = NanoFile::new();
    file.put_tree(tree);
    let mut cutflow = Hist1D::new("cutflow", 12, 0.0, 12.0);
    cutflow.add_bin_content(0, events.len() as f64);
    cutflow.add_bin_content(4, sumw);
    file.put_hist(cutflow);
    file.save(path).unwrap();
}

fn mvis_var() -> Variable {
    Variable::new("m_vis", 1, 0.0, 200.0)
}

#[test]
fn mc_normalization_from_lumi_xsec_sumw() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dy.json");
    write_pico(&path, &[(91.0, -1, 5, 1.0)], 1.2e9);

    let mut dy = Sample::mc("DY", "Drell-Yan", vec![path.to_string_lossy().into_owned()], 5343.0);
    dy.weight = "genweight".to_string();
    dy.load_sumweights().unwrap();
    assert_eq!(dy.sumweights, 1.2e9);
    dy.normalize(59.8).unwrap();

    let hists = dy
        .get_hists(&[mvis_var()], &Selection::new("inclusive", ""), &Default::default())
        .unwrap();
    let expected = 5343.0 * 59.8 * 1000.0 / 1.2e9;
    assert!((hists[0].bin_content(0) - expected).abs() < 1e-9);
    assert!((expected - 0.266).abs() < 5e-4);
}

#[test]
fn split_sum_matches_unsplit_draw() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dy.json");
    let events: Vec<(f64, i64, i64, f64)> = (0..50)
        .map(|i| (40.0 + 2.0 * i as f64, -1, if i % 3 == 0 { 5 } else { 1 }, 1.0 + 0.01 * i as f64))
        .collect();
    write_pico(&path, &events, 100.0);

    let mut dy = Sample::mc("DY", "Drell-Yan", vec![path.to_string_lossy().into_owned()], 10.0);
    dy.weight = "genweight".to_string();
    dy.sumweights = 100.0;
    dy.normalize(10.0).unwrap();
    dy.split(&[
        ("ZTT".to_string(), "real tau".to_string(), "genmatch_2==5".to_string()),
        ("ZL".to_string(), "lepton fake".to_string(), "genmatch_2!=5".to_string()),
    ]);

    let var = Variable::new("m_vis", 10, 0.0, 200.0);
    let sel = Selection::new("os", "q_1*q_2<0");
    let set = SampleSet::new("mutau", None, vec![dy.clone()], vec![]).unwrap();

    let split = set
        .get_hists(&[var.clone()], &sel, &StackOptions { split: true, ..Default::default() })
        .unwrap();
    let unsplit = set
        .get_hists(&[var.clone()], &sel, &StackOptions { split: false, ..Default::default() })
        .unwrap();

    let split_set = &split["m_vis"];
    assert_eq!(split_set.exp.len(), 2);
    let total = split_set.exp_total().unwrap();
    let whole = &unsplit["m_vis"].exp[0];
    for i in 0..var.nbins() {
        assert!((total.bin_content(i) - whole.bin_content(i)).abs() < 1e-9);
    }
}

#[test]
fn qcd_osss_subtracts_and_scales() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("data.json");
    let mc_path = dir.path().join("wj.json");

    // 100 same-sign data events and a few opposite-sign ones.
    let mut data_events: Vec<(f64, i64, i64, f64)> = vec![(90.0, 1, 0, 1.0); 100];
    data_events.extend(vec![(90.0, -1, 0, 1.0); 7]);
    write_pico(&data_path, &data_events, 0.0);
    // 60 same-sign expected events with unit normalization.
    write_pico(&mc_path, &vec![(90.0, 1, 0, 1.0); 60], 60.0);

    let data = Sample::data("Data", vec![data_path.to_string_lossy().into_owned()]);
    let mut wj = Sample::mc("WJ", "W + jets", vec![mc_path.to_string_lossy().into_owned()], 1.0);
    wj.norm = 1.0;

    let set = SampleSet::new("mutau", Some(data), vec![wj], vec![]).unwrap();
    let sel = Selection::new("os", "q_1*q_2<0");
    let qcd = qcd_osss(
        &set,
        &[mvis_var()],
        &sel,
        &QcdOptions { scale: Some(1.1), ..Default::default() },
    )
    .unwrap();

    let hist = &qcd["m_vis"];
    assert!((hist.bin_content(0) - 44.0).abs() < 1e-9);
    assert_eq!(hist.title, "QCD multijet");
    assert!(hist.name.starts_with("m_vis_QCD"));
}

#[test]
fn qcd_clamps_negative_bins() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("data.json");
    let mc_path = dir.path().join("mc.json");
    write_pico(&data_path, &vec![(90.0, 1, 0, 1.0); 10], 0.0);
    write_pico(&mc_path, &vec![(90.0, 1, 0, 1.0); 25], 25.0);

    let data = Sample::data("Data", vec![data_path.to_string_lossy().into_owned()]);
    let mut mc = Sample::mc("TT", "ttbar", vec![mc_path.to_string_lossy().into_owned()], 1.0);
    mc.norm = 1.0;
    let set = SampleSet::new("etau", Some(data), vec![mc], vec![]).unwrap();

    let qcd = qcd_osss(
        &set,
        &[mvis_var()],
        &Selection::new("os", "q_1*q_2<0"),
        &QcdOptions::default(),
    )
    .unwrap();
    let hist = &qcd["m_vis"];
    // data - mc = -15, clamped to 0 with unit error before scaling.
    assert_eq!(hist.bin_content(0), 0.0);
    assert!(hist.sumw2[0] > 0.0);
}

#[test]
fn already_ss_selection_uses_unit_scale() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("data.json");
    let mc_path = dir.path().join("mc.json");
    write_pico(&data_path, &vec![(90.0, 1, 0, 1.0); 50], 0.0);
    write_pico(&mc_path, &vec![(90.0, 1, 0, 1.0); 20], 20.0);

    let data = Sample::data("Data", vec![data_path.to_string_lossy().into_owned()]);
    let mut mc = Sample::mc("TT", "ttbar", vec![mc_path.to_string_lossy().into_owned()], 1.0);
    mc.norm = 1.0;
    let set = SampleSet::new("emu", Some(data), vec![mc], vec![]).unwrap();

    let qcd = qcd_osss(
        &set,
        &[mvis_var()],
        &Selection::new("ss", "q_1*q_2>0"),
        &QcdOptions::default(),
    )
    .unwrap();
    // scale 1.0 even in the emu channel
    assert!((qcd["m_vis"].bin_content(0) - 30.0).abs() < 1e-9);
}

#[test]
fn merged_sample_sums_children() {
    let dir = tempfile::tempdir().unwrap();
    let p1 = dir.path().join("a.json");
    let p2 = dir.path().join("b.json");
    write_pico(&p1, &vec![(90.0, -1, 0, 1.0); 5], 5.0);
    write_pico(&p2, &vec![(90.0, -1, 0, 1.0); 3], 3.0);

    let a = Sample::data("Data_A", vec![p1.to_string_lossy().into_owned()]);
    let b = Sample::data("Data_B", vec![p2.to_string_lossy().into_owned()]);
    let merged = Sample::merged("Data", "Observed", vec![a, b]).unwrap();
    let hists = merged
        .get_hists(&[mvis_var()], &Selection::new("", ""), &Default::default())
        .unwrap();
    assert_eq!(hists[0].bin_content(0), 8.0);
    assert_eq!(hists[0].name, "m_vis_Data");
}

#[test]
fn two_dimensional_draw() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dy.json");
    write_pico(&path, &[(50.0, -1, 5, 1.0), (150.0, -1, 5, 1.0)], 2.0);
    let mut dy = Sample::mc("DY", "Drell-Yan", vec![path.to_string_lossy().into_owned()], 1.0);
    dy.norm = 1.0;

    let var2d = Variable2D::new(
        Variable::new("m_vis", 2, 0.0, 200.0),
        Variable::new("pt_1", 2, 0.0, 100.0),
    );
    let hists = dy
        .get_hists2d(&[var2d], &Selection::new("", ""), &Default::default())
        .unwrap();
    assert_eq!(hists[0].integral(), 2.0);
}

#[test]
fn undefined_branch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dy.json");
    write_pico(&path, &[(90.0, -1, 5, 1.0)], 1.0);
    let mut dy = Sample::mc("DY", "Drell-Yan", vec![path.to_string_lossy().into_owned()], 1.0);
    dy.norm = 1.0;
    let err = dy
        .get_hists(&[Variable::new("no_such_branch", 1, 0.0, 1.0)], &Selection::new("", ""), &Default::default())
        .unwrap_err();
    assert!(err.to_string().contains("no_such_branch"));
}

#[test]
fn duplicate_sample_names_rejected() {
    let a = Sample::data("Data", vec!["a.json".to_string()]);
    let b = Sample::mc("Data", "whoops", vec!["b.json".to_string()], 1.0);
    assert!(SampleSet::new("mutau", Some(a), vec![b], vec![]).is_err());
}
