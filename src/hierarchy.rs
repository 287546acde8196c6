use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use ndarray::{Array2, Axis};
use num_traits::{Float, ToPrimitive};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, SeedableRng};

use crate::engine::ApBuilder;
use crate::error::{Error, Result};
use crate::preference::median_of;
use crate::source::MatrixSource;
use crate::topology::{FlatTopology, Topology};
use crate::{Preference, Similarity};

/// Running statistics of the similarity between an exemplar and its
/// assigned members (Welford mean/variance).
#[derive(Debug, Clone)]
pub struct ExemplarStat<F> {
    count: usize,
    mean: F,
    m2: F,
}

impl<F> Default for ExemplarStat<F>
where
    F: Float,
{
    fn default() -> Self {
        Self {
            count: 0,
            mean: F::zero(),
            m2: F::zero(),
        }
    }
}

impl<F> ExemplarStat<F>
where
    F: Float,
{
    fn push(&mut self, value: F) {
        self.count += 1;
        let count = F::from(self.count).unwrap();
        let delta = value - self.mean;
        self.mean = self.mean + delta / count;
        let delta2 = value - self.mean;
        self.m2 = self.m2 + delta * delta2;
    }

    /// Number of assigned members (the exemplar itself included).
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> F {
        self.mean
    }

    /// Sample variance; zero below two members.
    pub fn variance(&self) -> F {
        if self.count < 2 {
            F::zero()
        } else {
            self.m2 / F::from(self.count - 1).unwrap()
        }
    }

    pub fn std(&self) -> F {
        self.variance().sqrt()
    }
}

/// First-level exemplar aggregation: point -> exemplar map plus per-exemplar
/// member statistics keyed by exemplar identity.
///
/// `insert` is the sole mutation entrypoint; subset workers call it under a
/// mutex and all reads are deferred until the workers have joined.
#[derive(Debug, Clone, Default)]
pub struct Exemplars<F>
where
    F: Float,
{
    assignment: HashMap<usize, usize>,
    stats: BTreeMap<usize, ExemplarStat<F>>,
}

impl<F> Exemplars<F>
where
    F: Float + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            assignment: HashMap::new(),
            stats: BTreeMap::new(),
        }
    }

    /// Number of distinct exemplars.
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Record that `point` chose `exemplar`, with their similarity feeding
    /// the exemplar's running statistics.
    pub fn insert(&mut self, point: usize, exemplar: usize, similarity: F) {
        self.stats.entry(exemplar).or_default().push(similarity);
        self.assignment.insert(point, exemplar);
    }

    pub fn exemplar_of(&self, point: usize) -> Option<usize> {
        self.assignment.get(&point).copied()
    }

    pub fn stat(&self, exemplar: usize) -> Option<&ExemplarStat<F>> {
        self.stats.get(&exemplar)
    }

    /// Distinct exemplar ids, ascending.
    pub fn exemplar_ids(&self) -> Vec<usize> {
        self.stats.keys().copied().collect()
    }

    /// Similarity matrix for the weighted merge round, together with the
    /// row-order exemplar ids.
    ///
    /// Off-diagonal `(p, q)` is the member count of `p` times the raw
    /// similarity, biasing larger clusters toward remaining distinct; the
    /// diagonal preference is the median raw similarity minus
    /// `(count - 1) * mean member similarity` of the exemplar.
    pub fn wap_matrix<S>(&self, points: &Array2<F>, measure: &S) -> (Array2<F>, Vec<usize>)
    where
        S: Similarity<F>,
    {
        let ids = self.exemplar_ids();
        let m = ids.len();
        let mut s = Array2::<F>::zeros((m, m));
        let mut sims = Vec::with_capacity(m.saturating_mul(m.saturating_sub(1)));
        for (i, p) in ids.iter().enumerate() {
            let count = F::from(self.stats[p].count()).unwrap();
            let row_p = points.row(*p);
            for (j, q) in ids.iter().enumerate() {
                if i != j {
                    let sim = measure.similarity(&row_p, &points.row(*q));
                    s[[i, j]] = count * sim;
                    sims.push(sim);
                }
            }
        }
        let median = median_of(&mut sims);
        for (i, p) in ids.iter().enumerate() {
            let stat = &self.stats[p];
            s[[i, i]] = median - F::from(stat.count() - 1).unwrap() * stat.mean();
        }
        (s, ids)
    }
}

/// Builder for two-level hierarchical affinity propagation.
///
/// Defaults: two subsets, one unpinned worker, engine threads per worker
/// from the topology, 100 iterations per level, damping 0.5.
pub struct HiApBuilder<F>
where
    F: Float + Send + Sync,
{
    splits: usize,
    workers: usize,
    worker_nodes: Option<Vec<Option<usize>>>,
    numa_workers: bool,
    threads_per_worker: Option<usize>,
    level1_iters: usize,
    level2_iters: usize,
    damping: F,
    seed: Option<u64>,
    topology: Arc<dyn Topology>,
}

impl<F> Default for HiApBuilder<F>
where
    F: Float + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F> HiApBuilder<F>
where
    F: Float + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            splits: 2,
            workers: 1,
            worker_nodes: None,
            numa_workers: false,
            threads_per_worker: None,
            level1_iters: 100,
            level2_iters: 100,
            damping: F::from(0.5).unwrap(),
            seed: None,
            topology: Arc::new(FlatTopology),
        }
    }

    /// Number of subsets to split the data into. Affinity propagation runs
    /// separately on each subset before the weighted merge round.
    pub fn splits(mut self, splits: usize) -> Self {
        self.splits = splits;
        self
    }

    /// Number of subset workers pulling from the shared queue.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Explicit node per worker; `None` entries run unpinned. The list
    /// length is the worker count.
    pub fn worker_nodes(mut self, nodes: Vec<Option<usize>>) -> Self {
        self.worker_nodes = Some(nodes);
        self
    }

    /// One worker per topology node, each pinned, with engine threads set to
    /// the cores per node. Downgrades to unpinned workers on a single-node
    /// topology.
    pub fn numa_auto(mut self) -> Self {
        self.numa_workers = true;
        self
    }

    /// Engine group count used inside each worker.
    pub fn threads_per_worker(mut self, threads: usize) -> Self {
        self.threads_per_worker = Some(threads);
        self
    }

    /// Iteration budget for the per-subset (first level) runs.
    pub fn level1_iters(mut self, iters: usize) -> Self {
        self.level1_iters = iters;
        self
    }

    /// Iteration budget for the merge (second level) run.
    pub fn level2_iters(mut self, iters: usize) -> Self {
        self.level2_iters = iters;
        self
    }

    pub fn damping(mut self, damping: F) -> Self {
        self.damping = damping;
        self
    }

    /// Seed for the pre-split shuffle; unseeded runs shuffle randomly.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = topology;
        self
    }

    pub fn build(self) -> Result<HierarchicalAp<F>> {
        if self.splits == 0 {
            return Err(Error::InvalidHierarchy("at least one subset is required"));
        }
        if !(self.damping >= F::zero() && self.damping < F::one()) {
            return Err(Error::InvalidDamping(
                self.damping.to_f64().unwrap_or(f64::NAN),
            ));
        }
        if self.threads_per_worker == Some(0) {
            return Err(Error::InvalidHierarchy(
                "threads per worker must be positive",
            ));
        }

        let (worker_nodes, threads_per_worker) = if self.numa_workers {
            let nodes = self.topology.num_nodes();
            if nodes > 1 {
                (
                    (0..nodes).map(Some).collect(),
                    self.threads_per_worker
                        .unwrap_or_else(|| self.topology.cores_per_node()),
                )
            } else {
                log::warn!("topology reports a single node; running workers unpinned");
                (
                    vec![None; self.workers],
                    self.threads_per_worker
                        .unwrap_or_else(|| self.topology.cores_per_node()),
                )
            }
        } else {
            let nodes = self
                .worker_nodes
                .unwrap_or_else(|| vec![None; self.workers]);
            (
                nodes,
                self.threads_per_worker
                    .unwrap_or_else(|| self.topology.cores_per_node()),
            )
        };
        if worker_nodes.is_empty() {
            return Err(Error::InvalidHierarchy("at least one worker is required"));
        }

        Ok(HierarchicalAp {
            splits: self.splits,
            worker_nodes,
            threads_per_worker,
            level1_iters: self.level1_iters,
            level2_iters: self.level2_iters,
            damping: self.damping,
            seed: self.seed,
            topology: self.topology,
        })
    }
}

/// Two-level affinity propagation: shuffle and split the points, solve each
/// subset independently with a full engine, then merge the first-level
/// exemplars with a weighted second run.
pub struct HierarchicalAp<F>
where
    F: Float + Send + Sync,
{
    splits: usize,
    worker_nodes: Vec<Option<usize>>,
    threads_per_worker: usize,
    level1_iters: usize,
    level2_iters: usize,
    damping: F,
    seed: Option<u64>,
    topology: Arc<dyn Topology>,
}

impl<F> HierarchicalAp<F>
where
    F: Float + Send + Sync,
{
    pub fn builder() -> HiApBuilder<F> {
        HiApBuilder::new()
    }

    /// Run both levels over a point set (rows = samples, cols = features).
    pub fn run<S>(&self, points: &Array2<F>, measure: &S) -> Result<HierarchicalClustering>
    where
        S: Similarity<F> + Sync,
    {
        let n = points.nrows();
        if n == 0 {
            return Ok(HierarchicalClustering {
                first: Vec::new(),
                finals: Vec::new(),
            });
        }
        let started = Instant::now();

        let mut indices: Vec<usize> = (0..n).collect();
        match self.seed {
            Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => indices.shuffle(&mut thread_rng()),
        }
        let mut subsets: Vec<Vec<usize>> = vec![Vec::new(); self.splits];
        for (at, index) in indices.into_iter().enumerate() {
            subsets[at % self.splits].push(index);
        }
        log::info!(
            "split {} points into {} subsets for {} workers",
            n,
            self.splits,
            self.worker_nodes.len()
        );

        let queue = Mutex::new(VecDeque::from(subsets));
        let aggregator = Mutex::new(Exemplars::new());

        thread::scope(|scope| -> Result<()> {
            let queue = &queue;
            let aggregator = &aggregator;
            let mut handles = Vec::with_capacity(self.worker_nodes.len());
            for node in self.worker_nodes.iter() {
                let node = *node;
                handles
                    .push(scope.spawn(move || {
                        self.subset_worker(node, points, measure, queue, aggregator)
                    }));
            }
            for handle in handles {
                match handle.join() {
                    Ok(result) => result?,
                    Err(_) => return Err(Error::WorkerLost),
                }
            }
            Ok(())
        })?;

        let first_level = aggregator.into_inner().map_err(|_| Error::WorkerLost)?;
        let lap = started.elapsed();

        // Merge round: weighted AP over the distinct first-level exemplars.
        let (wap, ids) = first_level.wap_matrix(points, measure);
        let source = MatrixSource::new(wap)?;
        let mut engine = ApBuilder::new()
            .threads(self.threads_per_worker)
            .damping(self.damping)
            .build(&source)?;
        engine.run(self.level2_iters)?;
        let merged = engine.assignment();

        let mut second: HashMap<usize, usize> = HashMap::with_capacity(ids.len());
        for (row, id) in ids.iter().enumerate() {
            let target = merged.exemplar_of(row).unwrap_or(row);
            second.insert(*id, ids[target]);
        }

        let mut first = Vec::with_capacity(n);
        let mut finals = Vec::with_capacity(n);
        for point in 0..n {
            let level1 = first_level.exemplar_of(point).unwrap_or(point);
            let level2 = second.get(&level1).copied().unwrap_or(level1);
            first.push(level1);
            finals.push(level2);
        }

        let clustering = HierarchicalClustering { first, finals };
        log::info!(
            "reduced {} points to {} intermediate exemplars to {} final exemplars (lap {:?}, total {:?})",
            n,
            first_level.len(),
            clustering.exemplar_set().len(),
            lap,
            started.elapsed()
        );
        Ok(clustering)
    }

    fn subset_worker<S>(
        &self,
        node: Option<usize>,
        points: &Array2<F>,
        measure: &S,
        queue: &Mutex<VecDeque<Vec<usize>>>,
        aggregator: &Mutex<Exemplars<F>>,
    ) -> Result<()>
    where
        S: Similarity<F> + Sync,
    {
        if let Some(node) = node {
            self.topology.bind_thread(node);
        }
        loop {
            let subset = match queue.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => return Err(Error::WorkerLost),
            };
            let subset = match subset {
                Some(subset) => subset,
                None => return Ok(()),
            };

            let sub_points = points.select(Axis(0), &subset);
            let source = MatrixSource::from_points(&sub_points, measure, Preference::Median)?;
            // NUMA stays off here: this worker is already pinned to its node.
            let mut engine = ApBuilder::new()
                .threads(self.threads_per_worker)
                .damping(self.damping)
                .build(&source)?;
            engine.run(self.level1_iters)?;
            let assignment = engine.assignment();

            let mut aggregator = match aggregator.lock() {
                Ok(aggregator) => aggregator,
                Err(_) => return Err(Error::WorkerLost),
            };
            for (local, target) in assignment.iter().enumerate() {
                let point = subset[local];
                let exemplar = subset[target.unwrap_or(local)];
                let similarity = measure.similarity(&points.row(point), &points.row(exemplar));
                aggregator.insert(point, exemplar, similarity);
            }
        }
    }
}

/// Composed result of a hierarchical run: per point, the first-level and
/// final (post-merge) exemplar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchicalClustering {
    first: Vec<usize>,
    finals: Vec<usize>,
}

impl HierarchicalClustering {
    pub fn len(&self) -> usize {
        self.finals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finals.is_empty()
    }

    /// Final exemplar of `point` after the merge round.
    pub fn exemplar_of(&self, point: usize) -> usize {
        self.finals[point]
    }

    /// First-level exemplar of `point` (before the merge round).
    pub fn first_level_exemplar_of(&self, point: usize) -> usize {
        self.first[point]
    }

    /// Distinct final exemplars, ascending.
    pub fn exemplar_set(&self) -> Vec<usize> {
        let mut set = self.finals.clone();
        set.sort_unstable();
        set.dedup();
        set
    }

    /// Distinct first-level exemplars, ascending.
    pub fn first_level_exemplar_set(&self) -> Vec<usize> {
        let mut set = self.first.clone();
        set.sort_unstable();
        set.dedup();
        set
    }

    /// Final exemplar -> members map.
    pub fn clusters(&self) -> HashMap<usize, Vec<usize>> {
        let mut map: HashMap<usize, Vec<usize>> = HashMap::new();
        for (point, exemplar) in self.finals.iter().enumerate() {
            map.entry(*exemplar).or_default().push(point);
        }
        map
    }
}
