use ndarray::Array2;
use num_traits::Float;

use crate::error::{Error, Result};
use crate::preference::apply_preference;
use crate::{Preference, Similarity};

/// Supplier of pairwise similarities over a sparse or dense support.
///
/// The support of row `i` is the set of columns for which a similarity is
/// defined. Zero off-diagonal cells are treated as undefined; the diagonal
/// (preference) cell is always part of the support, so a zero preference does
/// not disconnect an item from itself.
pub trait SimilaritySource<F>
where
    F: Float,
{
    /// Number of items (the matrix is `size x size`).
    fn size(&self) -> usize;

    /// Similarity of `(i, k)`, or `None` when the cell is outside the support.
    fn get(&self, i: usize, k: usize) -> Option<F>;

    /// Visit every defined `(column, similarity)` of row `i` in ascending
    /// column order.
    fn for_each_neighbor(&self, i: usize, visit: &mut dyn FnMut(usize, F));
}

/// Dense similarity matrix with preferences on the main diagonal.
#[derive(Debug, Clone)]
pub struct MatrixSource<F> {
    s: Array2<F>,
}

impl<F> MatrixSource<F>
where
    F: Float + Send + Sync,
{
    /// Wrap a precomputed square similarity matrix. The diagonal is expected
    /// to already hold preferences.
    pub fn new(s: Array2<F>) -> Result<Self> {
        if s.nrows() != s.ncols() {
            return Err(Error::NonSquareMatrix {
                rows: s.nrows(),
                cols: s.ncols(),
            });
        }
        Ok(Self { s })
    }

    /// Wrap a precomputed square similarity matrix and overwrite its
    /// diagonal with the resolved preference.
    pub fn with_preference(s: Array2<F>, preference: Preference<F>) -> Result<Self> {
        let mut source = Self::new(s)?;
        apply_preference(&mut source.s, &preference)?;
        Ok(source)
    }

    /// Build the full pairwise similarity matrix of a point set (rows =
    /// samples, cols = features) and place the resolved preference on the
    /// diagonal.
    pub fn from_points<S>(x: &Array2<F>, measure: &S, preference: Preference<F>) -> Result<Self>
    where
        S: Similarity<F> + Sync,
    {
        let mut s = measure.matrix(x);
        apply_preference(&mut s, &preference)?;
        Ok(Self { s })
    }

    /// The backing matrix.
    pub fn matrix(&self) -> &Array2<F> {
        &self.s
    }
}

impl<F> SimilaritySource<F> for MatrixSource<F>
where
    F: Float + Send + Sync,
{
    fn size(&self) -> usize {
        self.s.nrows()
    }

    fn get(&self, i: usize, k: usize) -> Option<F> {
        let v = *self.s.get((i, k))?;
        if i == k || v != F::zero() {
            Some(v)
        } else {
            None
        }
    }

    fn for_each_neighbor(&self, i: usize, visit: &mut dyn FnMut(usize, F)) {
        let row = self.s.row(i);
        for (k, v) in row.iter().enumerate() {
            if k == i || *v != F::zero() {
                visit(k, *v);
            }
        }
    }
}

/// Sparse similarity support built from `(row, col, value)` entries plus a
/// per-item preference vector. Later duplicate entries overwrite earlier
/// ones; an explicit diagonal entry overwrites the preference.
#[derive(Debug, Clone)]
pub struct SparseMatrixSource<F> {
    n: usize,
    rows: Vec<Vec<(usize, F)>>,
}

impl<F> SparseMatrixSource<F>
where
    F: Float,
{
    pub fn new<I>(n: usize, preferences: &[F], entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, F)>,
    {
        if preferences.len() != n {
            return Err(Error::PreferenceLength {
                expected: n,
                found: preferences.len(),
            });
        }
        let mut rows: Vec<Vec<(usize, F)>> = vec![Vec::new(); n];
        for (i, pref) in preferences.iter().enumerate() {
            rows[i].push((i, *pref));
        }
        for (i, k, v) in entries {
            if i >= n || k >= n {
                return Err(Error::EntryOutOfBounds {
                    row: i,
                    col: k,
                    size: n,
                });
            }
            if v != F::zero() || i == k {
                rows[i].push((k, v));
            }
        }
        for row in rows.iter_mut() {
            // Stable sort keeps insertion order within a column so the
            // dedup below can let the last write win.
            row.sort_by_key(|(k, _)| *k);
            row.dedup_by(|later, earlier| {
                if later.0 == earlier.0 {
                    earlier.1 = later.1;
                    true
                } else {
                    false
                }
            });
        }
        Ok(Self { n, rows })
    }
}

impl<F> SimilaritySource<F> for SparseMatrixSource<F>
where
    F: Float,
{
    fn size(&self) -> usize {
        self.n
    }

    fn get(&self, i: usize, k: usize) -> Option<F> {
        let row = self.rows.get(i)?;
        row.binary_search_by_key(&k, |(col, _)| *col)
            .ok()
            .map(|pos| row[pos].1)
    }

    fn for_each_neighbor(&self, i: usize, visit: &mut dyn FnMut(usize, F)) {
        for (k, v) in self.rows[i].iter() {
            visit(*k, *v);
        }
    }
}

#[cfg(test)]
mod test {
    use ndarray::arr2;

    use super::{MatrixSource, SimilaritySource, SparseMatrixSource};

    #[test]
    fn dense_rejects_non_square() {
        let s = arr2(&[[0.0, -1.0, -2.0], [-1.0, 0.0, -3.0]]);
        assert!(MatrixSource::new(s).is_err());
    }

    #[test]
    fn dense_support_keeps_diagonal_drops_zeros() {
        let s = arr2(&[[0.0, -1.0, 0.0], [-1.0, -5.0, -3.0], [0.0, -3.0, 0.0]]);
        let source = MatrixSource::new(s).unwrap();
        let mut seen = Vec::new();
        source.for_each_neighbor(0, &mut |k, v| seen.push((k, v)));
        assert_eq!(seen, vec![(0, 0.0), (1, -1.0)]);
        assert_eq!(source.get(0, 0), Some(0.0));
        assert_eq!(source.get(0, 2), None);
        assert_eq!(source.get(1, 1), Some(-5.0));
    }

    #[test]
    fn sparse_rejects_out_of_bounds() {
        let result = SparseMatrixSource::new(2, &[-1.0, -1.0], vec![(0, 5, -2.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn sparse_rejects_bad_preference_length() {
        let result = SparseMatrixSource::<f64>::new(3, &[-1.0], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn sparse_enumerates_sorted_with_last_write_wins() {
        let entries = vec![(0, 2, -4.0), (0, 1, -1.0), (0, 2, -9.0), (1, 0, -1.0)];
        let source = SparseMatrixSource::new(3, &[-5.0, -5.0, -5.0], entries).unwrap();
        let mut seen = Vec::new();
        source.for_each_neighbor(0, &mut |k, v| seen.push((k, v)));
        assert_eq!(seen, vec![(0, -5.0), (1, -1.0), (2, -9.0)]);
        assert_eq!(source.get(1, 0), Some(-1.0));
        assert_eq!(source.get(2, 0), None);
        assert_eq!(source.get(2, 2), Some(-5.0));
    }
}
