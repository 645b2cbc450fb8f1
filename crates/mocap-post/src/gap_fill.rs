/// Linearly interpolate runs of missing samples no longer than `max_gap`.
///
/// Only runs bounded by valid samples on both sides are filled; leading and
/// trailing runs are never extrapolated. A run longer than `max_gap` is left
/// entirely missing.
///
/// # Returns
///
/// The number of samples that were filled.
///
/// Example:
///
/// ```
/// use mocap_post::gap_fill::fill_gaps;
///
/// let mut samples = vec![Some([0.0]), None, None, Some([3.0])];
/// assert_eq!(fill_gaps(&mut samples, 2), 2);
/// assert_eq!(samples[1], Some([1.0]));
/// ```
pub fn fill_gaps<const N: usize>(samples: &mut [Option<[f64; N]>], max_gap: usize) -> usize {
    let mut filled = 0;
    let mut last_valid: Option<(usize, [f64; N])> = None;

    for i in 0..samples.len() {
        let Some(end) = samples[i] else {
            continue;
        };

        if let Some((j, start)) = last_valid {
            let gap = i - j - 1;
            if gap > 0 && gap <= max_gap {
                let span = (i - j) as f64;
                for (k, sample) in samples.iter_mut().enumerate().take(i).skip(j + 1) {
                    let t = (k - j) as f64 / span;
                    *sample = Some(std::array::from_fn(|d| start[d] + t * (end[d] - start[d])));
                }
                filled += gap;
            }
        }
        last_valid = Some((i, end));
    }

    filled
}
