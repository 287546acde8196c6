use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use num_traits::{Float, ToPrimitive};

use crate::error::{Error, Result};
use crate::exemplar::{assign_exemplars, Assignment, Message, MessageView};
use crate::group::Group;
use crate::partition::Partition;
use crate::source::SimilaritySource;
use crate::topology::{FlatTopology, Topology};

/// NUMA placement request carried by the builder.
#[derive(Debug, Clone, Default)]
enum NumaMode {
    #[default]
    Off,
    Auto,
    Manual {
        num_nodes: Option<usize>,
        cores_per_node: Option<usize>,
        start_node: Option<usize>,
    },
}

/// Resolved placement: groups are striped over nodes, `cores_per_node`
/// consecutive groups per node, starting from `start_node`.
#[derive(Debug, Clone, Copy)]
struct Placement {
    num_nodes: usize,
    cores_per_node: usize,
    start_node: usize,
}

impl Placement {
    fn node_for(&self, gid: usize) -> usize {
        (gid / self.cores_per_node + self.start_node) % self.num_nodes
    }
}

/// Builder for the parallel affinity propagation engine.
///
/// By default NUMA is off and the group (thread) count is the available
/// parallelism. All configuration errors are rejected here, before any
/// worker starts.
pub struct ApBuilder<F>
where
    F: Float + Send + Sync,
{
    threads: Option<usize>,
    damping: F,
    numa: NumaMode,
    topology: Arc<dyn Topology>,
    verbose: bool,
}

impl<F> Default for ApBuilder<F>
where
    F: Float + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F> ApBuilder<F>
where
    F: Float + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            threads: None,
            damping: F::from(0.5).unwrap(),
            numa: NumaMode::Off,
            topology: Arc::new(FlatTopology),
            verbose: false,
        }
    }

    /// Number of groups (one dedicated worker thread each). Default is the
    /// available parallelism; the count is clamped to the item count at
    /// build time.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Damping factor in `[0, 1)`.
    pub fn damping(mut self, damping: F) -> Self {
        self.damping = damping;
        self
    }

    /// Manually set NUMA parameters; `None` fields are taken from the
    /// injected topology.
    pub fn numa(
        mut self,
        num_nodes: Option<usize>,
        cores_per_node: Option<usize>,
        start_node: Option<usize>,
    ) -> Self {
        self.numa = NumaMode::Manual {
            num_nodes,
            cores_per_node,
            start_node,
        };
        self
    }

    /// Derive all NUMA parameters from the injected topology.
    pub fn numa_auto(mut self) -> Self {
        self.numa = NumaMode::Auto;
        self
    }

    /// Switch off NUMA placement.
    pub fn numa_off(mut self) -> Self {
        self.numa = NumaMode::Off;
        self
    }

    /// Inject the platform topology capability. Defaults to
    /// [`FlatTopology`], which makes any NUMA request a no-op.
    pub fn topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = topology;
        self
    }

    /// Log per-10% iteration progress at debug level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn resolve_placement(&self) -> Option<Placement> {
        let (num_nodes, cores_per_node, start_node) = match &self.numa {
            NumaMode::Off => return None,
            NumaMode::Auto => (None, None, None),
            NumaMode::Manual {
                num_nodes,
                cores_per_node,
                start_node,
            } => (*num_nodes, *cores_per_node, *start_node),
        };
        let num_nodes = num_nodes.unwrap_or_else(|| self.topology.num_nodes());
        let cores_per_node = cores_per_node.unwrap_or_else(|| self.topology.cores_per_node());
        let start_node = start_node.unwrap_or_else(|| self.topology.current_node());
        if num_nodes <= 1 {
            log::warn!("topology reports a single node; running without affinity");
            return None;
        }
        Some(Placement {
            num_nodes,
            cores_per_node: cores_per_node.max(1),
            start_node,
        })
    }

    /// Build the engine over a similarity source. Groups are constructed
    /// under their target node's allocation hint so first-touch places each
    /// group's arrays locally.
    pub fn build<S>(&self, source: &S) -> Result<AffinityPropagation<F>>
    where
        S: SimilaritySource<F> + ?Sized,
    {
        if !(self.damping >= F::zero() && self.damping < F::one()) {
            return Err(Error::InvalidDamping(
                self.damping.to_f64().unwrap_or(f64::NAN),
            ));
        }
        let threads = match self.threads {
            Some(0) => return Err(Error::InvalidGroupCount),
            Some(threads) => threads,
            None => self.topology.cores_per_node() * self.topology.num_nodes(),
        };

        let n = source.size();
        if threads > n && n > 0 {
            log::warn!("group count {} exceeds item count {}; clamping", threads, n);
        }
        let partition = Partition::new(n, threads);
        let placement = self.resolve_placement();

        let started = Instant::now();
        let mut groups = Vec::with_capacity(partition.len());
        for gid in 0..partition.len() {
            if let Some(placement) = &placement {
                self.topology.prefer_alloc(placement.node_for(gid));
            }
            let (start, end) = partition.bounds(gid);
            groups.push(Group::build(gid, start, end, source));
        }
        if placement.is_some() {
            self.topology.local_alloc();
        }
        if !groups.is_empty() {
            let min = groups.iter().map(Group::len).min().unwrap_or(0);
            let max = groups.iter().map(Group::len).max().unwrap_or(0);
            log::info!(
                "{} groups created ({}-{} rows each) in {:?}",
                groups.len(),
                min,
                max,
                started.elapsed()
            );
        }

        Ok(AffinityPropagation {
            n,
            damping: self.damping,
            partition,
            groups,
            sumr: vec![F::zero(); n],
            rdiag: vec![F::zero(); n],
            topology: Arc::clone(&self.topology),
            placement,
            verbose: self.verbose,
            assignment: None,
        })
    }
}

/// Immutable snapshot handed to workers for the availability phase.
struct PhaseSums<F> {
    sumr: Vec<F>,
    rdiag: Vec<F>,
}

enum Command<F> {
    /// Run the responsibility kernel; the buffers are returned filled with
    /// the group's cumulative column sums and its responsibility diagonal.
    Responsibilities { sums: Vec<F>, diag: Vec<F> },
    /// Run the availability kernel against the merged sums.
    Availabilities { shared: Arc<PhaseSums<F>> },
}

enum Report<F> {
    Responsibilities {
        gid: usize,
        sums: Vec<F>,
        diag: Vec<F>,
    },
    Availabilities,
    Failed {
        gid: usize,
    },
}

fn worker_loop<F>(
    group: &mut Group<F>,
    damp: F,
    node: Option<usize>,
    topology: &dyn Topology,
    commands: mpsc::Receiver<Command<F>>,
    reports: mpsc::Sender<Report<F>>,
) where
    F: Float + Send + Sync,
{
    if let Some(node) = node {
        topology.bind_thread(node);
    }
    let gid = group.id();
    while let Ok(command) = commands.recv() {
        // A panicking kernel must still report through the barrier so the
        // orchestrator fails fast instead of waiting forever.
        let report = catch_unwind(AssertUnwindSafe(|| match command {
            Command::Responsibilities { mut sums, mut diag } => {
                group.compute_responsibilities(damp);
                group.export_sums(&mut sums, &mut diag);
                Report::Responsibilities { gid, sums, diag }
            }
            Command::Availabilities { shared } => {
                group.compute_availabilities(damp, &shared.sumr, &shared.rdiag);
                Report::Availabilities
            }
        }))
        .unwrap_or(Report::Failed { gid });
        let failed = matches!(report, Report::Failed { .. });
        if reports.send(report).is_err() || failed {
            break;
        }
    }
}

/// Parallel affinity propagation over partitioned row ranges.
///
/// Each group's rows are owned by one dedicated worker for the whole run;
/// every iteration runs the responsibility phase, a barrier that serially
/// folds the groups' private column-sum buffers, the availability phase, and
/// a second barrier. The availability phase therefore only ever observes the
/// fully merged responsibility result of its own iteration.
pub struct AffinityPropagation<F>
where
    F: Float + Send + Sync,
{
    n: usize,
    damping: F,
    partition: Partition,
    groups: Vec<Group<F>>,
    sumr: Vec<F>,
    rdiag: Vec<F>,
    topology: Arc<dyn Topology>,
    placement: Option<Placement>,
    verbose: bool,
    assignment: Option<Assignment>,
}

impl<F> AffinityPropagation<F>
where
    F: Float + Send + Sync,
{
    pub fn builder() -> ApBuilder<F> {
        ApBuilder::new()
    }

    /// Number of items.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn damping(&self) -> F {
        self.damping
    }

    /// Run the message-passing loop for a fixed iteration budget. No
    /// convergence detection is performed; callers choose a budget large
    /// enough for the damped updates to settle.
    pub fn run(&mut self, iterations: usize) -> Result<()> {
        self.assignment = None;
        if self.groups.is_empty() || iterations == 0 {
            return Ok(());
        }
        let n = self.n;
        let damp = self.damping;
        let group_count = self.groups.len();
        let zero = F::zero();
        let started = Instant::now();

        let ranges: Vec<(usize, usize)> = (0..group_count)
            .map(|gid| self.partition.bounds(gid))
            .collect();
        let nodes: Vec<Option<usize>> = (0..group_count)
            .map(|gid| self.placement.map(|p| p.node_for(gid)))
            .collect();
        let mut scratch: Vec<Option<(Vec<F>, Vec<F>)>> = ranges
            .iter()
            .map(|(start, end)| Some((vec![zero; n], vec![zero; end - start])))
            .collect();

        let topology = Arc::clone(&self.topology);
        let groups = &mut self.groups;
        let sumr = &mut self.sumr;
        let rdiag = &mut self.rdiag;
        let verbose = self.verbose;

        thread::scope(|scope| -> Result<()> {
            let (report_tx, report_rx) = mpsc::channel::<Report<F>>();
            let mut commands = Vec::with_capacity(group_count);
            for group in groups.iter_mut() {
                let (tx, rx) = mpsc::channel::<Command<F>>();
                let reports = report_tx.clone();
                let worker_topology = Arc::clone(&topology);
                let node = nodes[group.id()];
                scope.spawn(move || {
                    worker_loop(group, damp, node, worker_topology.as_ref(), rx, reports)
                });
                commands.push(tx);
            }
            drop(report_tx);

            for iteration in 0..iterations {
                // Responsibility phase.
                for (gid, tx) in commands.iter().enumerate() {
                    let (sums, diag) = scratch[gid].take().ok_or(Error::WorkerLost)?;
                    tx.send(Command::Responsibilities { sums, diag })
                        .map_err(|_| Error::WorkerFailed(gid))?;
                }
                // Barrier: gather every group's buffers, then fold serially
                // in ascending group order. This is the only place global
                // state is mutated, and it runs single-threaded.
                for _ in 0..group_count {
                    match report_rx.recv().map_err(|_| Error::WorkerLost)? {
                        Report::Responsibilities { gid, sums, diag } => {
                            scratch[gid] = Some((sums, diag));
                        }
                        Report::Failed { gid } => return Err(Error::WorkerFailed(gid)),
                        Report::Availabilities => {
                            unreachable!("availability report during responsibility phase")
                        }
                    }
                }
                for value in sumr.iter_mut() {
                    *value = zero;
                }
                for (gid, range) in ranges.iter().enumerate() {
                    let (sums, diag) = scratch[gid].as_ref().ok_or(Error::WorkerLost)?;
                    for (total, partial) in sumr.iter_mut().zip(sums.iter()) {
                        *total = *total + *partial;
                    }
                    rdiag[range.0..range.1].copy_from_slice(diag);
                }

                // Availability phase against an immutable snapshot.
                let shared = Arc::new(PhaseSums {
                    sumr: sumr.clone(),
                    rdiag: rdiag.clone(),
                });
                for (gid, tx) in commands.iter().enumerate() {
                    tx.send(Command::Availabilities {
                        shared: Arc::clone(&shared),
                    })
                    .map_err(|_| Error::WorkerFailed(gid))?;
                }
                for _ in 0..group_count {
                    match report_rx.recv().map_err(|_| Error::WorkerLost)? {
                        Report::Availabilities => {}
                        Report::Failed { gid } => return Err(Error::WorkerFailed(gid)),
                        Report::Responsibilities { .. } => {
                            unreachable!("responsibility report during availability phase")
                        }
                    }
                }

                if verbose && iterations >= 10 && (iteration + 1) % (iterations / 10) == 0 {
                    log::debug!("iteration {}/{}", iteration + 1, iterations);
                }
            }
            Ok(())
        })?;

        log::info!(
            "{} iterations over {} groups in {:?}",
            iterations,
            group_count,
            started.elapsed()
        );
        Ok(())
    }

    /// Point-to-exemplar assignment from the converged messages. Computed
    /// lazily and cached; `run` invalidates the cache.
    pub fn assignment(&mut self) -> &Assignment {
        if self.assignment.is_none() {
            self.assignment = Some(assign_exemplars(&*self));
        }
        match &self.assignment {
            Some(assignment) => assignment,
            None => unreachable!(),
        }
    }

    /// Merged column sums of the last iteration (test hook for the
    /// incremental accumulator).
    #[cfg(test)]
    pub(crate) fn column_sums(&self) -> &[F] {
        &self.sumr
    }
}

impl<F> MessageView<F> for AffinityPropagation<F>
where
    F: Float + Send + Sync,
{
    fn size(&self) -> usize {
        self.n
    }

    fn for_each_message(&self, row: usize, visit: &mut dyn FnMut(Message<F>)) {
        let group = &self.groups[self.partition.owner(row)];
        group.for_each_message(row - group.start(), visit);
    }
}
