//! Parallel and hierarchical affinity propagation clustering.
//!
//! Affinity propagation discovers both the number of clusters and their
//! representatives (exemplars) by passing responsibility and availability
//! messages over pairwise similarities. The engine here partitions the rows
//! into contiguous groups, runs one dedicated worker per group, and
//! synchronizes the two message phases of every iteration through a barrier
//! that serially merges per-group column sums — keeping each availability
//! update O(1) amortized instead of an O(n) column scan.
//!
//! For datasets too large for a single pass, [`HierarchicalAp`] shuffles and
//! splits the points, solves every subset independently, and merges the
//! resulting exemplars with a weighted second-level run.
//!
//!     use ndarray::arr2;
//!     use parprop::{ApBuilder, MatrixSource, NegEuclidean, Preference};
//!
//!     let x = arr2(&[[0.0], [1.0], [10.0], [11.0]]);
//!     let source =
//!         MatrixSource::from_points(&x, &NegEuclidean::default(), Preference::Median).unwrap();
//!     let mut ap = ApBuilder::new()
//!         .threads(2)
//!         .damping(0.5)
//!         .build(&source)
//!         .unwrap();
//!     ap.run(100).unwrap();
//!     assert_eq!(ap.assignment().exemplar_set().len(), 2);

pub use engine::{AffinityPropagation, ApBuilder};
pub use error::{Error, Result};
pub use exemplar::{assign_exemplars, Assignment, Message, MessageView};
pub use hierarchy::{ExemplarStat, Exemplars, HiApBuilder, HierarchicalAp, HierarchicalClustering};
pub use partition::Partition;
pub use preference::Preference;
pub use similarity::{NegCosine, NegEuclidean, Similarity};
pub use source::{MatrixSource, SimilaritySource, SparseMatrixSource};
pub use topology::{FlatTopology, Topology};

mod engine;
mod error;
mod exemplar;
mod group;
mod hierarchy;
mod partition;
mod preference;
mod similarity;
mod source;
mod topology;
