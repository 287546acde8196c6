use ndarray::{Array2, ArrayView1, Axis, Zip};
use num_traits::Float;

/// Pairwise similarity between two data points.
///
/// The engine accepts asymmetric similarities; the measures shipped here are
/// symmetric.
pub trait Similarity<F>
where
    F: Float + Send + Sync,
{
    /// Similarity between two feature rows. Larger means more similar.
    fn similarity(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> F;

    /// Generate the N x N matrix in which each (i,j) index holds the
    /// similarity between row i and row j of `x`. Rows are computed in
    /// parallel; the diagonal is left at zero for the caller to fill with
    /// preferences.
    fn matrix(&self, x: &Array2<F>) -> Array2<F>
    where
        Self: Sync,
    {
        let n = x.nrows();
        let mut out = Array2::<F>::zeros((n, n));
        Zip::indexed(out.axis_iter_mut(Axis(0))).par_for_each(|i, mut row| {
            let a = x.row(i);
            for (j, cell) in row.iter_mut().enumerate() {
                if i != j {
                    *cell = self.similarity(&a, &x.row(j));
                }
            }
        });
        out
    }
}

/// Perform similarity calculation as `-1 * sum((row_i - row_j)**2)`
///
///     use ndarray::arr1;
///     use parprop::{NegEuclidean, Similarity};
///
///     let a = arr1(&[1., 1., 1.]);
///     let b = arr1(&[2., 2., 2.]);
///     let s: f64 = NegEuclidean::default().similarity(&a.view(), &b.view());
///     assert!((s - -3.0).abs() < 1e-8);
#[derive(Debug, Default, Clone)]
pub struct NegEuclidean;

impl<F> Similarity<F> for NegEuclidean
where
    F: Float + Send + Sync,
{
    fn similarity(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> F {
        let mut sum = F::zero();
        for (x, y) in a.iter().zip(b.iter()) {
            let d = *x - *y;
            sum = sum + d * d;
        }
        -sum
    }
}

/// Perform similarity calculation as `-1 * (row_i . row_j)/(|row_i|*|row_j|)`
///
///     use ndarray::arr1;
///     use parprop::{NegCosine, Similarity};
///
///     let a = arr1(&[3., 2., 0., 5.]);
///     let b = arr1(&[1., 0., 0., 0.]);
///     let s: f64 = NegCosine::default().similarity(&a.view(), &b.view());
///     assert!((s - -0.4866).abs() < 1e-4);
#[derive(Debug, Default, Clone)]
pub struct NegCosine;

impl<F> Similarity<F> for NegCosine
where
    F: Float + Send + Sync,
{
    fn similarity(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> F {
        let mut dot = F::zero();
        let mut a_sq = F::zero();
        let mut b_sq = F::zero();
        for (x, y) in a.iter().zip(b.iter()) {
            dot = dot + *x * *y;
            a_sq = a_sq + *x * *x;
            b_sq = b_sq + *y * *y;
        }
        -dot / a_sq.sqrt() / b_sq.sqrt()
    }
}
