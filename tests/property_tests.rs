use parprop::Partition;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_partition_covers_exactly(n in 0usize..2000, groups in 1usize..64) {
        let partition = Partition::new(n, groups);
        prop_assert!(partition.len() <= groups);
        prop_assert!(partition.len() <= n);

        let mut covered = 0;
        let mut smallest = usize::MAX;
        let mut largest = 0;
        for gid in 0..partition.len() {
            let (start, end) = partition.bounds(gid);
            prop_assert_eq!(start, covered);
            prop_assert!(end > start);
            smallest = smallest.min(end - start);
            largest = largest.max(end - start);
            covered = end;
        }
        prop_assert_eq!(covered, n);
        if partition.len() > 0 {
            prop_assert!(largest - smallest <= 1);
        }
    }

    #[test]
    fn prop_owner_agrees_with_bounds(n in 1usize..2000, groups in 1usize..64) {
        let partition = Partition::new(n, groups);
        for gid in 0..partition.len() {
            let (start, end) = partition.bounds(gid);
            for i in [start, end - 1] {
                prop_assert_eq!(partition.owner(i), gid);
            }
        }
        prop_assert_eq!(partition.owner(0), 0);
        prop_assert_eq!(partition.owner(n - 1), partition.len() - 1);
    }
}
