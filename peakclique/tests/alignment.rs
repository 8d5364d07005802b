use std::collections::{HashMap, HashSet};

use peakclique::config::{SimilarityStorage, WorkerStrategy};
use peakclique::data::peak_set::PeakSet;
use peakclique::similarity::oracle::{FnOracle, SimilarityOracle};
use peakclique::similarity::pairwise::PairwiseSimilarityStage;
use peakclique::{AlignError, AlignmentConfig, PeakAligner, PeakKey, PeakRecord};

type Key = (String, usize);

/// Oracle backed by a table of directed scores; unknown pairs score NaN and
/// are therefore never cached.
fn table_oracle(symmetric: &[((&str, usize), (&str, usize), f64)]) -> impl SimilarityOracle {
    let mut table: HashMap<(Key, Key), f64> = HashMap::new();
    for &((ra, sa), (rb, sb), score) in symmetric {
        let a = (ra.to_string(), sa);
        let b = (rb.to_string(), sb);
        table.insert((a.clone(), b.clone()), score);
        table.insert((b, a), score);
    }
    FnOracle(move |a: &PeakRecord, b: &PeakRecord| {
        let key = ((a.run_id.clone(), a.scan_index), (b.run_id.clone(), b.scan_index));
        table.get(&key).copied().unwrap_or(f64::NAN)
    })
}

fn rec(run: &str, scan: usize, rt: f64) -> PeakRecord {
    PeakRecord::new(run, scan, rt, vec![1.0])
}

fn key(run: &str, scan: usize) -> PeakKey {
    PeakKey { run_id: run.to_string(), scan_index: scan }
}

fn member_keys(result: &peakclique::AlignmentResult) -> Vec<Vec<PeakKey>> {
    result
        .cliques()
        .iter()
        .map(|c| {
            let mut keys: Vec<PeakKey> = c.peaks().map(|p| result.peaks().key(p)).collect();
            keys.sort();
            keys
        })
        .collect()
}

/// Two feature families over `runs` runs with run-dependent rt drift.
fn synthetic_records(runs: usize) -> Vec<PeakRecord> {
    let mut out = Vec::new();
    for r in 0..runs {
        let run = format!("run_{:02}", r);
        let drift = 0.3 * r as f64;
        out.push(PeakRecord::new(run.clone(), 0, 50.0 + drift, vec![1.0, 0.1, 0.0, 0.05 * r as f64]));
        out.push(PeakRecord::new(run.clone(), 1, 80.0 - drift, vec![0.0, 1.0, 0.2, 0.0]));
        if r % 2 == 0 {
            out.push(PeakRecord::new(run.clone(), 2, 120.0 + drift, vec![0.1, 0.0, 1.0, 0.3]));
        }
    }
    out
}

#[test]
fn three_runs_one_peak_each_form_one_clique() {
    let records = vec![rec("A", 0, 10.0), rec("B", 0, 10.0), rec("C", 0, 10.0)];
    let oracle = FnOracle(|_: &PeakRecord, _: &PeakRecord| 0.9);
    let result = PeakAligner::with_oracle(AlignmentConfig::default(), oracle)
        .align(records)
        .unwrap();

    assert_eq!(result.cliques().len(), 1);
    let clique = &result.cliques()[0];
    assert_eq!(clique.len(), 3);
    assert!((clique.mean_rt() - 10.0).abs() < 1e-12);
    assert!(clique.variance_rt().abs() < 1e-12);
    assert!(result.unassigned().is_empty());
    assert!(result.incompatible().is_empty());
}

#[test]
fn only_the_mutual_best_hit_is_linked() {
    let records = vec![rec("A", 1, 10.0), rec("A", 2, 12.0), rec("B", 1, 10.0)];
    // p1 -> q 0.9, p2 -> q 0.95, q -> p1 0.9, q -> p2 0.5
    let oracle = FnOracle(|a: &PeakRecord, b: &PeakRecord| match (a.run_id.as_str(), a.scan_index, b.scan_index) {
        ("A", 1, _) => 0.9,
        ("A", 2, _) => 0.95,
        ("B", _, 1) => 0.9,
        _ => 0.5,
    });
    let result = PeakAligner::with_oracle(AlignmentConfig::default(), oracle)
        .align(records)
        .unwrap();

    assert_eq!(member_keys(&result), vec![vec![key("A", 1), key("B", 1)]]);
    let unassigned: Vec<PeakKey> = result.unassigned().iter().map(|&p| result.peaks().key(p)).collect();
    assert_eq!(unassigned, vec![key("A", 2)]);
}

#[test]
fn displaced_peak_is_incompatible_unless_it_lands_elsewhere() {
    // {a0, b0} and {a1, c0} meet through b0-c0; the merge refuses a1 and c0,
    // then c0 pairs up with d0.
    let records = vec![
        rec("a", 0, 10.0),
        rec("a", 1, 10.5),
        rec("b", 0, 10.0),
        rec("c", 0, 10.2),
        rec("d", 0, 10.2),
    ];
    let oracle = table_oracle(&[
        (("a", 0), ("b", 0), 0.9),
        (("a", 1), ("c", 0), 0.9),
        (("b", 0), ("c", 0), 0.9),
        (("c", 0), ("d", 0), 0.9),
    ]);
    let config = AlignmentConfig { min_clique_size: Some(2), ..Default::default() };
    let result = PeakAligner::with_oracle(config, oracle).align(records).unwrap();

    assert_eq!(
        member_keys(&result),
        vec![vec![key("a", 0), key("b", 0)], vec![key("c", 0), key("d", 0)]]
    );
    let incompatible: Vec<PeakKey> = result.incompatible().iter().map(|&p| result.peaks().key(p)).collect();
    assert_eq!(incompatible, vec![key("a", 1)]);
    assert!(result.unassigned().is_empty());
    assert!(result.ambiguous().is_empty());
}

fn tied_records(extra_run: bool) -> (Vec<PeakRecord>, Vec<((&'static str, usize), (&'static str, usize), f64)>) {
    let mut records = vec![rec("b", 0, 10.5), rec("c", 0, 10.5), rec("z", 0, 9.0), rec("z", 1, 11.0)];
    let mut pairs = vec![
        (("b", 0), ("c", 0), 0.9),
        (("b", 0), ("z", 0), 0.9),
        (("c", 0), ("z", 1), 0.9),
        (("c", 0), ("z", 0), 0.5),
        (("b", 0), ("z", 1), 0.5),
    ];
    if extra_run {
        records.push(rec("zz", 0, 11.0));
        pairs.push((("z", 1), ("zz", 0), 0.9));
    }
    (records, pairs)
}

#[test]
fn unbreakable_tie_is_reported_as_incompatible() {
    // z0 and z1 both carry one BBH and sit 1.0 from the mean of {b0, c0, z0}
    let (records, pairs) = tied_records(false);
    let config = AlignmentConfig { max_bbh_errors: 1, ..Default::default() };
    let result = PeakAligner::with_oracle(config, table_oracle(&pairs)).align(records).unwrap();

    assert_eq!(member_keys(&result), vec![vec![key("b", 0), key("c", 0), key("z", 0)]]);
    let keys = |ids: &[peakclique::PeakId]| ids.iter().map(|&p| result.peaks().key(p)).collect::<Vec<_>>();
    assert_eq!(keys(result.incompatible()), vec![key("z", 1)]);
    assert_eq!(keys(result.ambiguous()), vec![key("z", 1)]);
    assert!(result.unassigned().is_empty());

    let summary = result.summary();
    assert_eq!(summary.ambiguous, vec![key("z", 1)]);
    assert_eq!(summary.incompatible, vec![key("z", 1)]);
}

#[test]
fn tied_peak_that_finds_another_clique_is_not_reported() {
    let (records, pairs) = tied_records(true);
    let config = AlignmentConfig {
        min_clique_size: Some(2),
        max_bbh_errors: 1,
        ..Default::default()
    };
    let result = PeakAligner::with_oracle(config, table_oracle(&pairs)).align(records).unwrap();

    assert_eq!(
        member_keys(&result),
        vec![vec![key("b", 0), key("c", 0), key("z", 0)], vec![key("z", 1), key("zz", 0)]]
    );
    assert!(result.ambiguous().is_empty());
    assert!(result.incompatible().is_empty());
    assert!(result.summary().ambiguous.is_empty());
}

#[test]
fn bbh_error_budget_lets_partial_cliques_grow() {
    // c0 is a mutual best hit of b0 only; a0 prefers c1
    let records = vec![rec("a", 0, 10.0), rec("b", 0, 10.0), rec("c", 0, 10.0), rec("c", 1, 30.0)];
    let pairs = [
        (("a", 0), ("b", 0), 0.9),
        (("b", 0), ("c", 0), 0.9),
        (("a", 0), ("c", 1), 0.95),
        (("a", 0), ("c", 0), 0.5),
    ];

    let strict = PeakAligner::with_oracle(AlignmentConfig::default(), table_oracle(&pairs))
        .align(records.clone())
        .unwrap();
    // neither c peak can join {a0, b0} without an error, so nothing spans all runs
    assert!(strict.cliques().is_empty());
    assert_eq!(strict.unassigned().len(), 4);

    let config = AlignmentConfig { max_bbh_errors: 1, ..Default::default() };
    let lenient = PeakAligner::with_oracle(config, table_oracle(&pairs)).align(records).unwrap();
    assert_eq!(member_keys(&lenient), vec![vec![key("a", 0), key("b", 0), key("c", 0)]]);
    assert_eq!(lenient.cliques()[0].bbh_errors(), 1);
    // c1 joined first and was evicted by the closer c0
    let incompatible: Vec<PeakKey> = lenient.incompatible().iter().map(|&p| lenient.peaks().key(p)).collect();
    assert_eq!(incompatible, vec![key("c", 1)]);
}

#[test]
fn cliques_never_hold_two_peaks_of_one_run() {
    let config = AlignmentConfig {
        min_clique_size: Some(1),
        max_bbh_errors: 2,
        ..Default::default()
    };
    let result = PeakAligner::new(config).align(synthetic_records(6)).unwrap();
    assert!(!result.cliques().is_empty());
    for clique in result.cliques() {
        let runs: Vec<usize> = clique.peaks().map(|p| p.run).collect();
        let distinct: HashSet<usize> = runs.iter().copied().collect();
        assert_eq!(runs.len(), distinct.len());
    }
}

#[test]
fn every_peak_is_accounted_for() {
    let config = AlignmentConfig { min_clique_size: Some(4), ..Default::default() };
    let result = PeakAligner::new(config).align(synthetic_records(5)).unwrap();

    let mut seen: Vec<PeakKey> = member_keys(&result).into_iter().flatten().collect();
    seen.extend(result.incompatible().iter().map(|&p| result.peaks().key(p)));
    seen.extend(result.unassigned().iter().map(|&p| result.peaks().key(p)));
    let distinct: HashSet<PeakKey> = seen.iter().cloned().collect();
    assert_eq!(seen.len(), distinct.len());
    assert_eq!(distinct.len(), result.peaks().len());
}

#[test]
fn alignment_is_deterministic() {
    for storage in [SimilarityStorage::BestOnly, SimilarityStorage::Full] {
        for strategy in [WorkerStrategy::PerRun, WorkerStrategy::PerPeak] {
            let config = AlignmentConfig {
                min_clique_size: Some(2),
                max_bbh_errors: 1,
                storage,
                strategy,
                num_threads: 4,
                ..Default::default()
            };
            let first = PeakAligner::new(config.clone()).align(synthetic_records(7)).unwrap();
            let second = PeakAligner::new(config).align(synthetic_records(7)).unwrap();
            assert_eq!(member_keys(&first), member_keys(&second));
            assert_eq!(first.alignment_table(), second.alignment_table());
            assert_eq!(first.reference_run(), second.reference_run());
        }
    }
}

#[test]
fn output_respects_minimum_size_and_ordering() {
    for min in [1usize, 2, 4, 6, 50] {
        let config = AlignmentConfig { min_clique_size: Some(min), ..Default::default() };
        let result = PeakAligner::new(config).align(synthetic_records(6)).unwrap();
        let effective = min.min(6);
        assert_eq!(result.min_clique_size(), effective);
        assert!(result.cliques().iter().all(|c| c.len() >= effective));
        let means: Vec<f64> = result.cliques().iter().map(|c| c.mean_rt()).collect();
        assert!(means.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn full_cohort_default_requires_every_run() {
    let result = PeakAligner::new(AlignmentConfig::default()).align(synthetic_records(4)).unwrap();
    assert_eq!(result.min_clique_size(), 4);
    // the third family only exists in even runs
    assert_eq!(result.cliques().len(), 2);
    assert!(result.cliques().iter().all(|c| c.len() == 4));
    assert_eq!(result.unassigned().len(), 2);
}

#[test]
fn bbh_detection_is_symmetric() {
    // deliberately asymmetric scores
    let oracle = FnOracle(|a: &PeakRecord, b: &PeakRecord| {
        let d = (a.rt - b.rt).abs();
        1.0 / (1.0 + d) + 0.01 * a.scan_index as f64 - 0.02 * b.scan_index as f64
    });
    let mut set = PeakSet::from_records(synthetic_records(4), SimilarityStorage::Full).unwrap();
    PairwiseSimilarityStage::new(&oracle, WorkerStrategy::PerPeak, 2)
        .run(&mut set)
        .unwrap();
    let ids: Vec<_> = set.ids().collect();
    for &p in &ids {
        for &q in &ids {
            assert_eq!(set.is_bidirectional_best_hit(p, q), set.is_bidirectional_best_hit(q, p));
        }
    }
}

#[test]
fn oracle_failure_aborts_alignment() {
    let records = vec![
        PeakRecord::new("a", 0, 1.0, vec![1.0, 2.0]),
        PeakRecord::new("b", 0, 1.0, vec![1.0]),
    ];
    let err = PeakAligner::new(AlignmentConfig::default()).align(records).unwrap_err();
    assert!(matches!(err, AlignError::Worker { .. }));
}

#[test]
fn reference_run_is_reported() {
    let result = PeakAligner::new(AlignmentConfig { min_clique_size: Some(2), ..Default::default() })
        .align(synthetic_records(5))
        .unwrap();
    let reference = result.reference_run().unwrap();
    assert!(result.run_ids().iter().any(|r| r == reference));
    assert_eq!(result.compatibility_scores().len(), 5);
}
