use std::collections::HashSet;

use ndarray::{Array2, Axis};

use parprop::{ApBuilder, HiApBuilder, MatrixSource, NegEuclidean, Preference};

/// `blobs` groups of `per_blob` tightly packed 1-D points, far apart.
fn blob_points(blobs: usize, per_blob: usize, spread: f64) -> Array2<f64> {
    let mut points = Array2::<f64>::zeros((blobs * per_blob, 1));
    for (i, mut row) in points.axis_iter_mut(Axis(0)).enumerate() {
        let blob = i / per_blob;
        let offset = (i % per_blob) as f64 * 0.2;
        row[0] = blob as f64 * spread + offset;
    }
    points
}

/// Clusters as a comparable set of member lists, ignoring exemplar identity.
fn partition_of(assignments: impl Iterator<Item = usize>) -> HashSet<Vec<usize>> {
    let mut clusters: std::collections::HashMap<usize, Vec<usize>> =
        std::collections::HashMap::new();
    for (point, exemplar) in assignments.enumerate() {
        clusters.entry(exemplar).or_default().push(point);
    }
    clusters
        .into_values()
        .map(|mut members| {
            members.sort_unstable();
            members
        })
        .collect()
}

#[test]
fn merging_never_increases_exemplar_count() {
    // 100 points in four well-separated blobs, split over four subsets.
    let points = blob_points(4, 25, 100.0);
    let hiap = HiApBuilder::new()
        .splits(4)
        .workers(2)
        .threads_per_worker(2)
        .level1_iters(150)
        .level2_iters(150)
        .damping(0.5)
        .seed(7)
        .build()
        .unwrap();
    let clustering = hiap.run(&points, &NegEuclidean::default()).unwrap();

    assert_eq!(clustering.len(), 100);
    let first = clustering.first_level_exemplar_set();
    let finals = clustering.exemplar_set();
    assert!(!finals.is_empty());
    assert!(
        finals.len() <= first.len(),
        "merge produced {} exemplars from {} first-level ones",
        finals.len(),
        first.len()
    );

    // The blobs are far enough apart that no cluster may span two of them.
    for point in 0..clustering.len() {
        assert_eq!(
            point / 25,
            clustering.exemplar_of(point) / 25,
            "point {} landed on a far-away exemplar",
            point
        );
    }
}

#[test]
fn single_split_reduces_to_the_flat_engine() {
    let points = blob_points(2, 10, 50.0);

    let source =
        MatrixSource::from_points(&points, &NegEuclidean::default(), Preference::Median).unwrap();
    let mut flat = ApBuilder::new()
        .threads(2)
        .damping(0.5)
        .build(&source)
        .unwrap();
    flat.run(100).unwrap();
    let flat_partition = partition_of(flat.assignment().iter().map(|t| t.unwrap()));

    let hiap = HiApBuilder::new()
        .splits(1)
        .workers(1)
        .threads_per_worker(2)
        .level1_iters(100)
        .level2_iters(100)
        .damping(0.5)
        .seed(3)
        .build()
        .unwrap();
    let clustering = hiap.run(&points, &NegEuclidean::default()).unwrap();
    let hiap_partition = partition_of((0..clustering.len()).map(|i| clustering.exemplar_of(i)));

    assert_eq!(flat_partition, hiap_partition);
}

#[test]
fn more_splits_than_points_leaves_empty_subsets_harmless() {
    let points = blob_points(1, 5, 1.0);
    let hiap = HiApBuilder::new()
        .splits(8)
        .workers(3)
        .threads_per_worker(1)
        .level1_iters(50)
        .level2_iters(50)
        .damping(0.5)
        .seed(11)
        .build()
        .unwrap();
    let clustering = hiap.run(&points, &NegEuclidean::default()).unwrap();
    assert_eq!(clustering.len(), 5);
    // Each point sits alone in its subset, so every point is a first-level
    // exemplar and the merge round does all the clustering.
    assert_eq!(clustering.first_level_exemplar_set().len(), 5);
    assert!(clustering.exemplar_set().len() <= 5);
}

#[test]
fn empty_input_yields_empty_clustering() {
    let points = Array2::<f64>::zeros((0, 1));
    let hiap = HiApBuilder::new()
        .splits(2)
        .workers(2)
        .threads_per_worker(1)
        .seed(1)
        .build()
        .unwrap();
    let clustering = hiap.run(&points, &NegEuclidean::default()).unwrap();
    assert!(clustering.is_empty());
}
