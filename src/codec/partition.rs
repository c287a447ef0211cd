//! Even partitioning for the split operation

/// Sizes of `parts` near-equal parts of `total` items.
///
/// Every part gets `total / parts`; the first `total % parts` parts get one
/// more. Zero parts yields no sizes.
pub fn part_sizes(total: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = total / parts;
    let extra = total % parts;
    (0..parts).map(|i| base + usize::from(i < extra)).collect()
}

/// Split a slice into `parts` contiguous near-equal chunks in order.
pub fn split_even<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    let mut rest = items;
    part_sizes(items.len(), parts)
        .into_iter()
        .map(|size| {
            let (head, tail) = rest.split_at(size);
            rest = tail;
            head
        })
        .collect()
}
