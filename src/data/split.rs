use rand::seq::SliceRandom;
use rand::Rng;

/// Randomly partition `0..n` into `(train, valid)`.
///
/// The validation set holds `floor(valid_fraction * n)` indices; the two sets
/// never overlap and together cover every index.
pub fn split_indices<R: Rng + ?Sized>(n: usize, valid_fraction: f64, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let split = validation_size(n, valid_fraction);
    let train = indices.split_off(split);
    (train, indices)
}

pub fn validation_size(n: usize, valid_fraction: f64) -> usize {
    ((valid_fraction * n as f64).floor() as usize).min(n)
}
