//! Seeded stratified splitting
//!
//! Both class proportions are preserved in every partition. Indices within a
//! partition are returned in ascending order so downstream fitting does not
//! depend on shuffle order.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use reviewlens_core::{Error, Recommendation, Result};

/// One train/test partition of sample indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffled sample indices of each class, `[not recommended, recommended]`
fn shuffled_classes(labels: &[Recommendation], rng: &mut ChaCha8Rng) -> [Vec<usize>; 2] {
    let mut classes: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, label) in labels.iter().enumerate() {
        classes[usize::from(label.as_u8())].push(i);
    }
    for class in classes.iter_mut() {
        class.shuffle(rng);
    }
    classes
}

/// Hold out `test_fraction` of each class
///
/// Every class needs at least two samples so it appears on both sides.
pub fn stratified_split(labels: &[Recommendation], test_fraction: f64, seed: u64) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(Error::config(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let classes = shuffled_classes(labels, &mut rng);

    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for (class, indices) in classes.iter().enumerate() {
        if indices.len() < 2 {
            return Err(Error::corpus(format!(
                "class {} has {} samples, a stratified split needs at least 2",
                class,
                indices.len()
            )));
        }
        let n_test = ((indices.len() as f64 * test_fraction).round() as usize)
            .clamp(1, indices.len() - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(Split { train, test })
}

/// Stratified k-fold partitions; each sample is tested exactly once
pub fn stratified_k_fold(labels: &[Recommendation], k: usize, seed: u64) -> Result<Vec<Split>> {
    if k < 2 {
        return Err(Error::config(format!(
            "cross-validation needs at least 2 folds, got {k}"
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let classes = shuffled_classes(labels, &mut rng);

    for (class, indices) in classes.iter().enumerate() {
        if indices.len() < k {
            return Err(Error::corpus(format!(
                "class {} has {} samples, fewer than {} folds",
                class,
                indices.len(),
                k
            )));
        }
    }

    let mut fold_of = vec![0usize; labels.len()];
    for indices in &classes {
        for (position, &index) in indices.iter().enumerate() {
            fold_of[index] = position % k;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            Split { train, test }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use Recommendation::{NotRecommended as N, Recommended as R};

    fn labels(negatives: usize, positives: usize) -> Vec<Recommendation> {
        let mut labels = vec![N; negatives];
        labels.extend(vec![R; positives]);
        labels
    }

    #[test]
    fn test_split_preserves_class_ratio() {
        let labels = labels(20, 80);
        let split = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        let test_negatives = split.test.iter().filter(|&&i| labels[i] == N).count();
        assert_eq!(test_negatives, 4);
    }

    #[test]
    fn test_split_is_seeded() {
        let labels = labels(30, 70);
        assert_eq!(
            stratified_split(&labels, 0.25, 7).unwrap(),
            stratified_split(&labels, 0.25, 7).unwrap()
        );
        assert_ne!(
            stratified_split(&labels, 0.25, 7).unwrap(),
            stratified_split(&labels, 0.25, 8).unwrap()
        );
    }

    #[test]
    fn test_tiny_class_lands_on_both_sides() {
        let labels = labels(2, 50);
        let split = stratified_split(&labels, 0.1, 1).unwrap();
        assert_eq!(split.test.iter().filter(|&&i| labels[i] == N).count(), 1);
        assert_eq!(split.train.iter().filter(|&&i| labels[i] == N).count(), 1);
    }

    #[test]
    fn test_single_class_is_rejected() {
        assert!(matches!(
            stratified_split(&labels(0, 10), 0.2, 42),
            Err(Error::Corpus(_))
        ));
        assert!(matches!(
            stratified_split(&labels(1, 10), 0.2, 42),
            Err(Error::Corpus(_))
        ));
    }

    #[test]
    fn test_invalid_fraction_is_rejected() {
        for fraction in [0.0, 1.0, -0.5, f64::NAN] {
            assert!(matches!(
                stratified_split(&labels(10, 10), fraction, 42),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_k_fold_tests_each_sample_once() {
        let labels = labels(10, 23);
        let folds = stratified_k_fold(&labels, 5, 42).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen = vec![0; labels.len()];
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), labels.len());
            assert_eq!(fold.test.iter().filter(|&&i| labels[i] == N).count(), 2);
            for &i in &fold.test {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_k_fold_requires_enough_samples_per_class() {
        assert!(stratified_k_fold(&labels(3, 20), 5, 42).is_err());
        assert!(stratified_k_fold(&labels(10, 10), 1, 42).is_err());
    }

    proptest! {
        #[test]
        fn prop_split_is_a_partition(
            negatives in 2usize..60,
            positives in 2usize..60,
            fraction in 0.05f64..0.95,
            seed in any::<u64>(),
        ) {
            let labels = labels(negatives, positives);
            let split = stratified_split(&labels, fraction, seed).unwrap();

            let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
            all.sort_unstable();
            prop_assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());

            for class in [N, R] {
                prop_assert!(split.train.iter().any(|&i| labels[i] == class));
                prop_assert!(split.test.iter().any(|&i| labels[i] == class));
            }
        }
    }
}
