use std::sync::Arc;

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPool;

use super::folder::Sample;
use super::transform::ImageTransform;
use crate::error::DataError;

/// A decoded batch: images as one flat NCHW buffer plus class labels.
#[derive(Debug, Clone)]
pub struct ImageBatch {
    pub images: Vec<f32>,
    pub labels: Vec<usize>,
    pub image_size: usize,
}

impl ImageBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Move the batch onto `device` as `([n, 3, s, s], [n])` tensors.
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 4>, Tensor<B, 1, Int>) {
        let n = self.len();
        let s = self.image_size;
        let images = Tensor::<B, 1>::from_data(TensorData::from(self.images.as_slice()), device)
            .reshape([n, 3, s, s]);
        let labels: Vec<i64> = self.labels.iter().map(|&l| l as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);
        (images, targets)
    }
}

/// A subset of a split, iterated in batches whose images are decoded in
/// parallel on a shared worker pool.
///
/// Workers only read the sample index; every image gets its own RNG derived
/// from the epoch seed, so batches do not depend on worker scheduling.
pub struct BatchSource {
    name: &'static str,
    samples: Arc<[Sample]>,
    indices: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    transform: ImageTransform,
    pool: Arc<ThreadPool>,
}

impl BatchSource {
    pub fn new(
        name: &'static str,
        samples: Arc<[Sample]>,
        indices: Vec<usize>,
        batch_size: usize,
        shuffle: bool,
        transform: ImageTransform,
        pool: Arc<ThreadPool>,
    ) -> Self {
        BatchSource {
            name,
            samples,
            indices,
            batch_size: batch_size.max(1),
            shuffle,
            transform,
            pool,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of samples this source yields per pass.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn transform(&self) -> ImageTransform {
        self.transform
    }

    pub fn image_size(&self) -> usize {
        self.transform.crop as usize
    }

    /// Start one pass over the source. Shuffling sources reorder their
    /// indices with `rng`.
    pub fn epoch(&self, rng: &mut StdRng) -> Batches<'_> {
        let mut order = self.indices.clone();
        if self.shuffle {
            order.shuffle(rng);
        }
        Batches {
            source: self,
            order,
            pos: 0,
            seed: rng.random(),
        }
    }

    fn load(&self, chunk: &[usize], seed: u64) -> Result<ImageBatch, DataError> {
        let transform = self.transform;
        let samples = &self.samples;
        let decoded: Vec<(Vec<f32>, usize)> = self.pool.install(|| {
            chunk
                .par_iter()
                .map(|&i| {
                    let sample = &samples[i];
                    let image = image::open(&sample.path).map_err(|source| DataError::Decode {
                        path: sample.path.clone(),
                        source,
                    })?;
                    let mut rng = StdRng::seed_from_u64(seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                    Ok((transform.apply(&image, &mut rng), sample.label))
                })
                .collect::<Result<Vec<_>, DataError>>()
        })?;

        let mut images = Vec::with_capacity(decoded.len() * transform.image_len());
        let mut labels = Vec::with_capacity(decoded.len());
        for (pixels, label) in decoded {
            images.extend_from_slice(&pixels);
            labels.push(label);
        }
        Ok(ImageBatch {
            images,
            labels,
            image_size: self.image_size(),
        })
    }
}

/// Iterator over the batches of one pass.
pub struct Batches<'a> {
    source: &'a BatchSource,
    order: Vec<usize>,
    pos: usize,
    seed: u64,
}

impl Iterator for Batches<'_> {
    type Item = Result<ImageBatch, DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.source.batch_size).min(self.order.len());
        let chunk = &self.order[self.pos..end];
        self.pos = end;
        Some(self.source.load(chunk, self.seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rayon::ThreadPoolBuilder;

    fn write_samples(dir: &std::path::Path, n: usize) -> Arc<[Sample]> {
        (0..n)
            .map(|i| {
                let path = dir.join(format!("{i}.png"));
                RgbImage::from_pixel(6, 6, Rgb([i as u8, 0, 0])).save(&path).unwrap();
                Sample { path, label: i % 3 }
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn source(samples: Arc<[Sample]>, indices: Vec<usize>, shuffle: bool) -> BatchSource {
        let pool = Arc::new(ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        BatchSource::new("test", samples, indices, 2, shuffle, ImageTransform::eval(6, 4), pool)
    }

    #[test]
    fn test_batches_cover_indices_once() {
        let dir = tempfile::tempdir().unwrap();
        let samples = write_samples(dir.path(), 5);
        let src = source(samples, vec![0, 2, 3, 4], true);
        assert_eq!(src.num_batches(), 2);

        let mut rng = StdRng::seed_from_u64(9);
        let batches: Vec<ImageBatch> = src.epoch(&mut rng).map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 2);
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 4);
        assert_eq!(batches[0].images.len(), 2 * 3 * 4 * 4);
    }

    #[test]
    fn test_unshuffled_order_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let samples = write_samples(dir.path(), 4);
        let src = source(samples, vec![0, 1, 2, 3], false);

        let mut rng = StdRng::seed_from_u64(1);
        let labels: Vec<usize> = src
            .epoch(&mut rng)
            .flat_map(|b| b.unwrap().labels)
            .collect();
        assert_eq!(labels, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let samples: Arc<[Sample]> = vec![Sample { path, label: 0 }].into();
        let src = source(samples, vec![0], false);

        let mut rng = StdRng::seed_from_u64(1);
        let first = src.epoch(&mut rng).next().unwrap();
        assert!(matches!(first, Err(DataError::Decode { .. })));
    }

    #[test]
    fn test_batch_to_tensors() {
        use burn::backend::NdArray;

        let batch = ImageBatch {
            images: vec![0.5; 2 * 3 * 4 * 4],
            labels: vec![1, 2],
            image_size: 4,
        };
        let device = Default::default();
        let (images, targets) = batch.to_tensors::<NdArray<f32>>(&device);
        assert_eq!(images.dims(), [2, 3, 4, 4]);
        assert_eq!(targets.dims(), [2]);
    }
}
