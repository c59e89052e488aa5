//! Stable parallel merge sort.
//!
//! Halves are sorted on the rayon pool until they drop below a threshold,
//! then merged left-first. The result is identical to a sequential stable
//! sort with the same comparator.

use std::cmp::Ordering;

/// Tuning for [`merge_sort_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    /// Split work across the rayon pool at all.
    pub parallel: bool,
    /// Slices at most this long are sorted sequentially.
    pub threshold: usize,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            threshold: 2048,
        }
    }
}

/// Stable sort of `items` by `cmp`.
pub fn merge_sort_by<T, F>(items: &mut [T], options: SortOptions, cmp: &F)
where
    T: Copy + Send,
    F: Fn(&T, &T) -> Ordering + Sync,
{
    if !options.parallel || items.len() <= options.threshold.max(1) {
        items.sort_by(cmp);
        return;
    }

    let mid = items.len() / 2;
    let (left, right) = items.split_at_mut(mid);
    rayon::join(
        || merge_sort_by(left, options, cmp),
        || merge_sort_by(right, options, cmp),
    );

    let mut merged = Vec::with_capacity(items.len());
    merge_into(&items[..mid], &items[mid..], cmp, &mut merged);
    items.copy_from_slice(&merged);
}

/// Merge two sorted runs, taking from `left` on ties.
fn merge_into<T: Copy, F>(left: &[T], right: &[T], cmp: &F, out: &mut Vec<T>)
where
    F: Fn(&T, &T) -> Ordering,
{
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if cmp(&right[j], &left[i]) == Ordering::Less {
            out.push(right[j]);
            j += 1;
        } else {
            out.push(left[i]);
            i += 1;
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(threshold: usize) -> SortOptions {
        SortOptions {
            parallel: true,
            threshold,
        }
    }

    #[test]
    fn test_matches_sequential_stable_sort() {
        // (key, original position): ties must keep their relative order.
        let items: Vec<(u32, u32)> = (0..10_000u32).map(|i| ((i * 7919) % 97, i)).collect();

        let mut expected = items.clone();
        expected.sort_by(|a, b| a.0.cmp(&b.0));

        for threshold in [1, 3, 64, 5000, 20_000] {
            let mut actual = items.clone();
            merge_sort_by(&mut actual, options(threshold), &|a: &(u32, u32), b: &(u32, u32)| {
                a.0.cmp(&b.0)
            });
            assert_eq!(actual, expected, "threshold {threshold}");
        }
    }

    #[test]
    fn test_descending_comparator() {
        let mut items: Vec<i64> = (0..3000).map(|i| (i * 31) % 1000 - 500).collect();
        let mut expected = items.clone();
        expected.sort_by(|a, b| b.cmp(a));

        merge_sort_by(&mut items, options(100), &|a: &i64, b: &i64| b.cmp(a));
        assert_eq!(items, expected);
    }

    #[test]
    fn test_sequential_fallback() {
        let mut items = vec![3, 1, 2];
        let sequential = SortOptions {
            parallel: false,
            threshold: 0,
        };
        merge_sort_by(&mut items, sequential, &|a: &i32, b: &i32| a.cmp(b));
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_and_single() {
        let mut empty: Vec<u8> = Vec::new();
        merge_sort_by(&mut empty, options(1), &|a: &u8, b: &u8| a.cmp(b));
        assert!(empty.is_empty());

        let mut one = vec![9u8];
        merge_sort_by(&mut one, options(1), &|a: &u8, b: &u8| a.cmp(b));
        assert_eq!(one, vec![9]);
    }
}
