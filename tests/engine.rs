use ndarray::arr2;

use parprop::{
    ApBuilder, MatrixSource, MessageView, NegEuclidean, Preference, SparseMatrixSource,
};

fn two_pair_source() -> MatrixSource<f64> {
    // 1-D points at 0, 1, 10, 11 with negative squared distance and median
    // preference.
    let x = arr2(&[[0.0], [1.0], [10.0], [11.0]]);
    MatrixSource::from_points(&x, &NegEuclidean::default(), Preference::Median).unwrap()
}

#[test]
fn two_well_separated_pairs_form_two_clusters() {
    let source = two_pair_source();
    let mut ap = ApBuilder::new()
        .threads(2)
        .damping(0.5)
        .build(&source)
        .unwrap();
    ap.run(100).unwrap();
    let assignment = ap.assignment();

    assert_eq!(assignment.exemplar_set().len(), 2);
    assert_eq!(assignment.exemplar_of(0), assignment.exemplar_of(1));
    assert_eq!(assignment.exemplar_of(2), assignment.exemplar_of(3));
    assert_ne!(assignment.exemplar_of(0), assignment.exemplar_of(2));

    let clusters = assignment.clusters();
    let mut members: Vec<Vec<usize>> = clusters.values().cloned().collect();
    members.sort();
    assert_eq!(members, vec![vec![0, 1], vec![2, 3]]);
}

#[test]
fn single_point_is_always_its_own_exemplar() {
    let x = arr2(&[[5.0]]);
    for iterations in [0, 1, 25] {
        let source =
            MatrixSource::from_points(&x, &NegEuclidean::default(), Preference::Median).unwrap();
        let mut ap = ApBuilder::new()
            .threads(1)
            .damping(0.5)
            .build(&source)
            .unwrap();
        ap.run(iterations).unwrap();
        assert_eq!(ap.assignment().exemplar_of(0), Some(0));
        assert!(ap.assignment().is_exemplar(0));
    }
}

#[test]
fn group_count_does_not_change_the_result() {
    let x = arr2(&[
        [0.0],
        [1.0],
        [2.0],
        [10.0],
        [11.0],
        [12.0],
        [30.0],
        [31.0],
        [32.0],
        [50.0],
        [51.0],
        [52.0],
    ]);
    let mut runs = Vec::new();
    for threads in [1, 4] {
        let source =
            MatrixSource::from_points(&x, &NegEuclidean::default(), Preference::Median).unwrap();
        let mut ap = ApBuilder::<f64>::new()
            .threads(threads)
            .damping(0.7)
            .build(&source)
            .unwrap();
        ap.run(80).unwrap();

        let mut messages = Vec::new();
        for i in 0..12 {
            let mut row = Vec::new();
            ap.for_each_message(i, &mut |m| {
                row.push((m.col, m.responsibility, m.availability))
            });
            messages.push(row);
        }
        let targets: Vec<Option<usize>> = ap.assignment().iter().collect();
        runs.push((messages, targets));
    }

    let (single, serial_targets) = &runs[0];
    let (multi, parallel_targets) = &runs[1];
    assert_eq!(serial_targets, parallel_targets);
    for (row_s, row_m) in single.iter().zip(multi.iter()) {
        assert_eq!(row_s.len(), row_m.len());
        for ((col_s, r_s, a_s), (col_m, r_m, a_m)) in row_s.iter().zip(row_m.iter()) {
            assert_eq!(col_s, col_m);
            assert!(
                (r_s - r_m).abs() < 1e-8 * (1.0 + r_s.abs()),
                "responsibility diverged: {} vs {}",
                r_s,
                r_m
            );
            assert!(
                (a_s - a_m).abs() < 1e-8 * (1.0 + a_s.abs()),
                "availability diverged: {} vs {}",
                a_s,
                a_m
            );
        }
    }
}

#[test]
fn assignment_matches_brute_force_argmax() {
    let source = two_pair_source();
    let mut ap = ApBuilder::new()
        .threads(2)
        .damping(0.5)
        .build(&source)
        .unwrap();
    ap.run(100).unwrap();

    let mut expected = Vec::new();
    for i in 0..4 {
        let mut best: Option<(usize, f64)> = None;
        ap.for_each_message(i, &mut |m| {
            let criterion = m.responsibility + m.availability;
            match best {
                None => best = Some((m.col, criterion)),
                Some((_, current)) => {
                    if criterion > current {
                        best = Some((m.col, criterion));
                    }
                }
            }
        });
        expected.push(best.map(|(col, _)| col));
    }
    let assignment = ap.assignment();
    for i in 0..4 {
        assert_eq!(assignment.exemplar_of(i), expected[i]);
        assert_eq!(assignment.is_exemplar(i), expected[i] == Some(i));
    }
}

#[test]
fn sparse_support_clusters_each_clique() {
    // Two disconnected pairs; merge pressure within a pair (preference
    // below the pair similarity) and symmetric messages, so the documented
    // lowest-index tie-break decides the exemplar.
    let entries = vec![
        (0, 1, -1.0),
        (1, 0, -1.0),
        (2, 3, -1.0),
        (3, 2, -1.0),
    ];
    let source = SparseMatrixSource::new(4, &[-2.0; 4], entries).unwrap();
    let mut ap = ApBuilder::new()
        .threads(2)
        .damping(0.5)
        .build(&source)
        .unwrap();
    ap.run(60).unwrap();
    let assignment = ap.assignment();
    assert_eq!(assignment.exemplar_of(0), Some(0));
    assert_eq!(assignment.exemplar_of(1), Some(0));
    assert_eq!(assignment.exemplar_of(2), Some(2));
    assert_eq!(assignment.exemplar_of(3), Some(2));
    assert_eq!(assignment.exemplar_set(), vec![0, 2]);
}
