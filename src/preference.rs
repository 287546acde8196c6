use ndarray::{Array1, Array2};
use num_traits::Float;

use crate::error::{Error, Result};

/// Preference is the value representing the degree to which a data point will
/// act as its own exemplar, with lower (more negative) values yielding fewer
/// clusters.
///
/// - Median: Use median off-diagonal similarity value as preference
/// - List: Use provided preference list
/// - Value: Assign all members the same preference value
#[derive(Debug, Clone)]
pub enum Preference<'a, F>
where
    F: Float + Send + Sync,
{
    Median,
    List(&'a Array1<F>),
    Value(F),
}

/// Write the resolved preference onto the diagonal of `s`.
pub(crate) fn apply_preference<F>(s: &mut Array2<F>, preference: &Preference<F>) -> Result<()>
where
    F: Float + Send + Sync,
{
    let n = s.nrows();
    match preference {
        Preference::Median => {
            let mut values = Vec::with_capacity(n.saturating_mul(n.saturating_sub(1)));
            for ((i, k), v) in s.indexed_iter() {
                if i != k {
                    values.push(*v);
                }
            }
            let median = median_of(&mut values);
            s.diag_mut().map_inplace(|v| *v = median);
        }
        Preference::Value(value) => {
            s.diag_mut().map_inplace(|v| *v = *value);
        }
        Preference::List(values) => {
            if values.len() != n {
                return Err(Error::PreferenceLength {
                    expected: n,
                    found: values.len(),
                });
            }
            for (cell, value) in s.diag_mut().iter_mut().zip(values.iter()) {
                *cell = *value;
            }
        }
    }
    Ok(())
}

/// Median of a value set; the two middle elements are averaged for even
/// lengths. Empty input yields zero.
pub(crate) fn median_of<F>(values: &mut [F]) -> F
where
    F: Float,
{
    if values.is_empty() {
        return F::zero();
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[middle] + values[middle - 1]) / F::from(2.).unwrap()
    } else {
        values[middle]
    }
}

#[cfg(test)]
mod test {
    use ndarray::{arr1, arr2};

    use super::{apply_preference, median_of};
    use crate::Preference;

    #[test]
    fn median_odd_even_empty() {
        assert_eq!(median_of(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_of(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median_of::<f64>(&mut []), 0.0);
    }

    #[test]
    fn median_preference_ignores_diagonal() {
        let mut s = arr2(&[[99., -1., -3.], [-1., 99., -5.], [-3., -5., 99.]]);
        apply_preference(&mut s, &Preference::Median).unwrap();
        assert_eq!(s[[0, 0]], -3.0);
        assert_eq!(s[[1, 1]], -3.0);
        assert_eq!(s[[2, 2]], -3.0);
    }

    #[test]
    fn list_preference_checks_length() {
        let mut s = arr2(&[[0., -1.], [-1., 0.]]);
        let short = arr1(&[-1.0]);
        assert!(apply_preference(&mut s, &Preference::List(&short)).is_err());
        let full = arr1(&[-7.0, -8.0]);
        apply_preference(&mut s, &Preference::List(&full)).unwrap();
        assert_eq!(s[[0, 0]], -7.0);
        assert_eq!(s[[1, 1]], -8.0);
    }
}
