/// Per-class top-1 / top-k hit counters, sized to the class roster.
#[derive(Debug, Clone, PartialEq)]
pub struct TopKAccuracy {
    k: usize,
    correct_top1: Vec<u64>,
    correct_topk: Vec<u64>,
    total: Vec<u64>,
}

/// Accuracy of one class, in percent. `None` when the class had no examples.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassAccuracy {
    pub class: usize,
    pub top1: Option<f64>,
    pub topk: Option<f64>,
    pub total: u64,
}

impl TopKAccuracy {
    /// `k` is clamped to the number of classes.
    pub fn new(num_classes: usize, k: usize) -> Self {
        TopKAccuracy {
            k: k.clamp(1, num_classes.max(1)),
            correct_top1: vec![0; num_classes],
            correct_topk: vec![0; num_classes],
            total: vec![0; num_classes],
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn num_classes(&self) -> usize {
        self.total.len()
    }

    /// Record one example from its class scores.
    pub fn record(&mut self, scores: &[f32], label: usize) {
        let target = scores[label];
        // Ties go to the lower index, as an argmax would pick it.
        let rank = scores
            .iter()
            .enumerate()
            .filter(|&(j, &s)| s > target || (s == target && j < label))
            .count();

        self.total[label] += 1;
        if rank == 0 {
            self.correct_top1[label] += 1;
        }
        if rank < self.k {
            self.correct_topk[label] += 1;
        }
    }

    /// Record a batch of row-major `[batch, num_classes]` scores.
    pub fn record_batch(&mut self, scores: &[f32], labels: &[usize]) {
        let width = self.num_classes();
        for (row, &label) in scores.chunks_exact(width).zip(labels) {
            self.record(row, label);
        }
    }

    pub fn per_class(&self) -> Vec<ClassAccuracy> {
        (0..self.num_classes())
            .map(|c| ClassAccuracy {
                class: c,
                top1: percent(self.correct_top1[c], self.total[c]),
                topk: percent(self.correct_topk[c], self.total[c]),
                total: self.total[c],
            })
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.total.iter().sum()
    }

    pub fn correct_top1(&self) -> u64 {
        self.correct_top1.iter().sum()
    }

    pub fn correct_topk(&self) -> u64 {
        self.correct_topk.iter().sum()
    }

    pub fn overall_top1(&self) -> Option<f64> {
        percent(self.correct_top1(), self.total())
    }

    pub fn overall_topk(&self) -> Option<f64> {
        percent(self.correct_topk(), self.total())
    }
}

fn percent(correct: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| 100.0 * correct as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_top1_and_top5() {
        let mut acc = TopKAccuracy::new(6, 5);
        // label 0 ranked first
        acc.record(&[0.9, 0.1, 0.0, 0.0, 0.0, 0.0], 0);
        // label 1 ranked fifth
        acc.record(&[0.5, 0.1, 0.4, 0.3, 0.2, 0.0], 1);
        // label 5 ranked last
        acc.record(&[0.5, 0.1, 0.4, 0.3, 0.2, 0.0], 5);

        assert_eq!(acc.total(), 3);
        assert_eq!(acc.correct_top1(), 1);
        assert_eq!(acc.correct_topk(), 2);

        let per_class = acc.per_class();
        assert_eq!(per_class[0].top1, Some(100.0));
        assert_eq!(per_class[1].top1, Some(0.0));
        assert_eq!(per_class[1].topk, Some(100.0));
        assert_eq!(per_class[5].topk, Some(0.0));
        assert_eq!(per_class[3].top1, None);
    }

    #[test]
    fn test_k_clamped_to_class_count() {
        let mut acc = TopKAccuracy::new(3, 5);
        assert_eq!(acc.k(), 3);
        acc.record(&[0.9, 0.05, 0.05], 2);
        assert_eq!(acc.overall_topk(), Some(100.0));
        assert_eq!(acc.overall_top1(), Some(0.0));
    }

    #[test]
    fn test_ties_resolved_like_argmax() {
        let mut acc = TopKAccuracy::new(2, 1);
        acc.record(&[0.5, 0.5], 0);
        acc.record(&[0.5, 0.5], 1);
        assert_eq!(acc.correct_top1(), 1);
    }

    #[test]
    fn test_record_batch_rows() {
        let mut acc = TopKAccuracy::new(2, 5);
        acc.record_batch(&[1.0, 0.0, 0.0, 1.0, 1.0, 0.0], &[0, 1, 1]);
        assert_eq!(acc.total(), 3);
        assert_eq!(acc.correct_top1(), 2);
        assert_eq!(acc.overall_topk(), Some(100.0));
    }

    proptest! {
        #[test]
        fn prop_class_counts_sum_to_overall(
            rows in prop::collection::vec((prop::collection::vec(0.0f32..1.0, 7), 0usize..7), 1..60)
        ) {
            let mut acc = TopKAccuracy::new(7, 5);
            for (scores, label) in &rows {
                acc.record(scores, *label);
            }
            let per_class = acc.per_class();
            let total: u64 = per_class.iter().map(|c| c.total).sum();
            prop_assert_eq!(total, rows.len() as u64);
            prop_assert_eq!(acc.total(), rows.len() as u64);
            prop_assert!(acc.correct_top1() <= acc.correct_topk());
            prop_assert!(acc.correct_topk() <= acc.total());
        }
    }
}
