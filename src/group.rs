use num_traits::Float;

use crate::exemplar::Message;
use crate::source::SimilaritySource;

/// One contiguous row range `[start, end)` of the message matrices.
///
/// A group owns its rows exclusively for the duration of a run: the sparse
/// adjacency (`cols`/`s`/`a` share one CSR layout), the dense responsibility
/// rows, and a private cumulative column-sum buffer. Nothing here is shared;
/// the engine folds the buffers between phases.
pub(crate) struct Group<F> {
    gid: usize,
    start: usize,
    end: usize,
    n: usize,
    offsets: Vec<usize>,
    cols: Vec<usize>,
    s: Vec<F>,
    a: Vec<F>,
    /// Dense responsibility rows, `(end - start) * n`.
    r: Vec<F>,
    /// Running `sum over own rows of max(0, r(i, k))` per column k.
    sums: Vec<F>,
}

impl<F> Group<F>
where
    F: Float + Send + Sync,
{
    /// Two-pass build over the row range: count entries per row to size the
    /// arrays exactly, then fill. No growth happens after this point.
    pub(crate) fn build<S>(gid: usize, start: usize, end: usize, source: &S) -> Self
    where
        S: SimilaritySource<F> + ?Sized,
    {
        let n = source.size();
        let size = end - start;

        let mut offsets = vec![0usize; size + 1];
        for li in 0..size {
            let mut count = 0usize;
            source.for_each_neighbor(start + li, &mut |_, _| count += 1);
            offsets[li + 1] = offsets[li] + count;
        }

        let total = offsets[size];
        let mut cols = vec![0usize; total];
        let mut s = vec![F::zero(); total];
        for li in 0..size {
            let mut at = offsets[li];
            source.for_each_neighbor(start + li, &mut |k, v| {
                cols[at] = k;
                s[at] = v;
                at += 1;
            });
            debug_assert_eq!(at, offsets[li + 1]);
        }

        Self {
            gid,
            start,
            end,
            n,
            a: vec![F::zero(); total],
            r: vec![F::zero(); size * n],
            sums: vec![F::zero(); n],
            offsets,
            cols,
            s,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.gid
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }

    /// Largest and second-largest `a + s` over the row support, and the
    /// column holding the largest. Lets the responsibility update reuse one
    /// scan for every cell of the row.
    fn row_max(&self, li: usize) -> (F, F, usize) {
        let mut max1 = F::neg_infinity();
        let mut max2 = F::neg_infinity();
        let mut for_k = usize::MAX;
        for j in self.offsets[li]..self.offsets[li + 1] {
            let t = self.a[j] + self.s[j];
            if t > max1 {
                max2 = max1;
                max1 = t;
                for_k = self.cols[j];
            } else if t >= max2 {
                max2 = t;
            }
        }
        (max1, max2, for_k)
    }

    /// Responsibility phase over the owned rows:
    /// `r(i,k) = (1 - damp) * (s(i,k) - max_{k' != k}(a + s)) + damp * r(i,k)`.
    /// The `max(0, r)` delta of every update lands in the private `sums`
    /// buffer; no shared state is touched.
    pub(crate) fn compute_responsibilities(&mut self, damp: F) {
        let zero = F::zero();
        let inv_damp = F::one() - damp;
        for li in 0..self.len() {
            let (max1, max2, for_k) = self.row_max(li);
            let base = li * self.n;
            for j in self.offsets[li]..self.offsets[li + 1] {
                let k = self.cols[j];
                let max_k = if k == for_k { max2 } else { max1 };
                let temp = self.s[j] - max_k;
                let old = self.r[base + k];
                let updated = inv_damp * temp + damp * old;
                self.r[base + k] = updated;
                self.sums[k] = self.sums[k] + updated.max(zero) - old.max(zero);
            }
        }
    }

    /// Availability phase over the owned support. `sumr` and `rdiag` are the
    /// barrier-merged column sums and responsibility diagonal of this
    /// iteration, which keeps every cell update O(1) instead of an O(n)
    /// column scan.
    pub(crate) fn compute_availabilities(&mut self, damp: F, sumr: &[F], rdiag: &[F]) {
        let zero = F::zero();
        let inv_damp = F::one() - damp;
        for li in 0..self.len() {
            let i = self.start + li;
            let base = li * self.n;
            for j in self.offsets[li]..self.offsets[li + 1] {
                let k = self.cols[j];
                let temp = if i != k {
                    let others = sumr[k] - self.r[base + k].max(zero) - rdiag[k].max(zero);
                    (rdiag[k] + others).min(zero)
                } else {
                    sumr[k] - rdiag[k].max(zero)
                };
                self.a[j] = inv_damp * temp + damp * self.a[j];
            }
        }
    }

    /// Copy the cumulative column sums and the owned responsibility diagonal
    /// into the engine's gather buffers.
    pub(crate) fn export_sums(&self, sums_out: &mut [F], diag_out: &mut [F]) {
        sums_out.copy_from_slice(&self.sums);
        for li in 0..self.len() {
            diag_out[li] = self.r[li * self.n + self.start + li];
        }
    }

    /// Visit the final messages of local row `li` in ascending column order.
    pub(crate) fn for_each_message(&self, li: usize, visit: &mut dyn FnMut(Message<F>)) {
        let base = li * self.n;
        for j in self.offsets[li]..self.offsets[li + 1] {
            let k = self.cols[j];
            visit(Message {
                col: k,
                similarity: self.s[j],
                responsibility: self.r[base + k],
                availability: self.a[j],
            });
        }
    }
}
