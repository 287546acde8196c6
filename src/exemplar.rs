use std::collections::HashMap;

use num_traits::Float;

/// One defined cell of the message matrices.
#[derive(Debug, Clone, Copy)]
pub struct Message<F> {
    /// Column (candidate exemplar) index.
    pub col: usize,
    /// Similarity `s(i, col)`.
    pub similarity: F,
    /// Responsibility `r(i, col)`.
    pub responsibility: F,
    /// Availability `a(i, col)`.
    pub availability: F,
}

/// Read access to converged message matrices over their defined support.
///
/// Engine variants expose their state through this interface so exemplar
/// extraction never has to be re-derived per engine.
pub trait MessageView<F>
where
    F: Float,
{
    /// Number of rows.
    fn size(&self) -> usize;

    /// Visit every defined message of `row` in ascending column order.
    fn for_each_message(&self, row: usize, visit: &mut dyn FnMut(Message<F>));
}

/// Point-to-exemplar assignment derived from converged messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    targets: Vec<Option<usize>>,
}

impl Assignment {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Chosen exemplar of `i`; `None` for a row with no defined neighbors.
    pub fn exemplar_of(&self, i: usize) -> Option<usize> {
        self.targets[i]
    }

    /// Whether `i` chose itself.
    pub fn is_exemplar(&self, i: usize) -> bool {
        self.targets[i] == Some(i)
    }

    /// Distinct chosen exemplars, ascending.
    pub fn exemplar_set(&self) -> Vec<usize> {
        let mut set: Vec<usize> = self.targets.iter().filter_map(|t| *t).collect();
        set.sort_unstable();
        set.dedup();
        set
    }

    /// Exemplar -> members map. Rows without an exemplar are omitted.
    pub fn clusters(&self) -> HashMap<usize, Vec<usize>> {
        let mut map: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, target) in self.targets.iter().enumerate() {
            if let Some(exemplar) = target {
                map.entry(*exemplar).or_default().push(i);
            }
        }
        map
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<usize>> + '_ {
        self.targets.iter().copied()
    }
}

/// Derive the assignment from converged messages: per row, the defined
/// neighbor with maximum `r + a`.
///
/// The first neighbor visited initializes the argmax and only a strictly
/// greater criterion replaces it; since rows are visited in ascending column
/// order, ties keep the lowest column index.
pub fn assign_exemplars<F, V>(view: &V) -> Assignment
where
    F: Float,
    V: MessageView<F> + ?Sized,
{
    let mut targets = Vec::with_capacity(view.size());
    for i in 0..view.size() {
        let mut best: Option<(usize, F)> = None;
        view.for_each_message(i, &mut |message| {
            let criterion = message.responsibility + message.availability;
            match best {
                None => best = Some((message.col, criterion)),
                Some((_, current)) => {
                    if criterion > current {
                        best = Some((message.col, criterion));
                    }
                }
            }
        });
        targets.push(best.map(|(col, _)| col));
    }
    Assignment { targets }
}

#[cfg(test)]
mod test {
    use super::{assign_exemplars, Message, MessageView};

    /// Rows of (col, r, a) triples.
    struct FixedView {
        rows: Vec<Vec<(usize, f64, f64)>>,
    }

    impl MessageView<f64> for FixedView {
        fn size(&self) -> usize {
            self.rows.len()
        }

        fn for_each_message(&self, row: usize, visit: &mut dyn FnMut(Message<f64>)) {
            for (col, r, a) in self.rows[row].iter() {
                visit(Message {
                    col: *col,
                    similarity: 0.0,
                    responsibility: *r,
                    availability: *a,
                });
            }
        }
    }

    #[test]
    fn picks_strict_maximum() {
        let view = FixedView {
            rows: vec![
                vec![(0, 1.0, 0.0), (1, 5.0, -1.0), (2, 2.0, 0.5)],
                vec![(1, -1.0, 2.0), (2, 0.0, 0.0)],
            ],
        };
        let assignment = assign_exemplars(&view);
        assert_eq!(assignment.exemplar_of(0), Some(1));
        assert_eq!(assignment.exemplar_of(1), Some(1));
        assert_eq!(assignment.exemplar_set(), vec![1]);
    }

    #[test]
    fn ties_keep_lowest_column() {
        let view = FixedView {
            rows: vec![vec![(2, 1.0, 0.0), (5, 0.5, 0.5), (7, 1.0, 0.0)]],
        };
        let assignment = assign_exemplars(&view);
        assert_eq!(assignment.exemplar_of(0), Some(2));
    }

    #[test]
    fn empty_row_is_unassigned() {
        let view = FixedView {
            rows: vec![vec![], vec![(1, 0.0, 0.0)]],
        };
        let assignment = assign_exemplars(&view);
        assert_eq!(assignment.exemplar_of(0), None);
        assert_eq!(assignment.exemplar_of(1), Some(1));
        assert!(assignment.is_exemplar(1));
        assert_eq!(assignment.clusters().len(), 1);
    }

    #[test]
    fn degenerate_messages_still_assign_first_neighbor() {
        // A lone self-edge keeps its row assigned even if the criterion is
        // not comparable (single-neighbor rows can saturate to infinity).
        let view = FixedView {
            rows: vec![vec![(0, f64::INFINITY, f64::NAN)]],
        };
        let assignment = assign_exemplars(&view);
        assert_eq!(assignment.exemplar_of(0), Some(0));
    }
}
