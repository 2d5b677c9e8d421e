//! Inference latency benchmarks
//!
//! Measures feature extraction plus the three-model ensemble on a synthetic
//! bundle, for single reviews of varying length and for parallel batches.
//!
//! Run with: cargo bench -p reviewlens-classifiers

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use reviewlens_classifiers::features::{stack_rows, SparseVector};
use reviewlens_classifiers::fusion::{fuse, ModelOutput};
use reviewlens_classifiers::{
    ArtifactBundle, EvaluationSummary, Extractors, FeatureSet, Featurizer, ForestConfig,
    InferenceService, KernelSvm, LogisticConfig, LogisticRegression, RandomForest, SvmConfig,
    VectorizerConfig, WordEmbeddings,
};
use reviewlens_core::{ModelKind, ModelVote, Recommendation};

const POSITIVE: &[&str] = &["love", "great", "perfect", "soft", "flattering", "comfortable"];
const NEGATIVE: &[&str] = &["terrible", "awful", "cheap", "returned", "poor", "itchy"];
const NEUTRAL: &[&str] = &["dress", "fabric", "color", "size", "top", "sleeves", "length"];
const DIM: usize = 50;

fn synthetic_service() -> InferenceService {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let mut pairs = Vec::new();
    for (words, sign) in [(POSITIVE, 1.0f32), (NEGATIVE, -1.0), (NEUTRAL, 0.0)] {
        for word in words {
            let mut vector: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-0.2..0.2)).collect();
            vector[0] += sign;
            pairs.push((word.to_string(), vector));
        }
    }
    let embeddings = Arc::new(WordEmbeddings::from_pairs(pairs, "synthetic").unwrap());

    let mut docs = Vec::new();
    let mut labels = Vec::new();
    for i in 0..200 {
        let positive = i % 3 != 0;
        let sentiment = if positive { POSITIVE } else { NEGATIVE };
        let words: Vec<&str> = (0..12)
            .map(|k| {
                if k % 2 == 0 {
                    sentiment[rng.gen_range(0..sentiment.len())]
                } else {
                    NEUTRAL[rng.gen_range(0..NEUTRAL.len())]
                }
            })
            .collect();
        docs.push(words.join(" "));
        labels.push(Recommendation::from_bool(positive));
    }

    let extractors = Extractors::fit(&docs, embeddings, &VectorizerConfig::default()).unwrap();
    let raw = extractors.extract_all(&docs);
    let featurizer = Featurizer::fit(extractors, &raw).unwrap();
    let features: Vec<FeatureSet> = raw.into_iter().map(|r| featurizer.scale(r).unwrap()).collect();

    let counts: Vec<SparseVector> = features.iter().map(|f| f.counts.clone()).collect();
    let embedded = stack_rows(features.iter().map(|f| &f.embedding), DIM).unwrap();
    let weighted = stack_rows(features.iter().map(|f| &f.weighted), DIM).unwrap();

    let bundle = ArtifactBundle::new(
        "bench",
        featurizer,
        LogisticRegression::fit(&counts, &labels, &LogisticConfig::default()).unwrap(),
        RandomForest::fit(&embedded, &labels, &ForestConfig::default(), 42).unwrap(),
        KernelSvm::fit(&weighted, &labels, &SvmConfig::default()).unwrap(),
        EvaluationSummary::default(),
        serde_json::Value::Null,
    )
    .unwrap();

    InferenceService::from_bundle(bundle)
}

fn benchmark_predict_single(c: &mut Criterion) {
    let service = synthetic_service();

    let test_cases = vec![
        ("short", "Love it!"),
        ("medium", "The fabric is soft and the color is great, but the sleeves run long."),
        (
            "long",
            "I ordered my usual size and the dress fit perfectly. The fabric is soft, the \
             length is flattering, and the color is exactly as pictured. The only complaint \
             is that the sleeves are slightly itchy, which is a shame for such a comfortable \
             top layer. Overall a great purchase that I would not have returned.",
        ),
    ];

    let mut group = c.benchmark_group("predict_single");
    group.sample_size(100);

    for (name, text) in test_cases {
        group.bench_with_input(BenchmarkId::new("ensemble", name), &text, |b, text| {
            b.iter(|| service.predict_single(black_box(text), "", None).unwrap());
        });
    }

    group.finish();
}

fn benchmark_predict_batch(c: &mut Criterion) {
    let service = synthetic_service();
    let mut group = c.benchmark_group("predict_batch");

    for size in [16usize, 128] {
        let texts: Vec<String> = (0..size)
            .map(|i| format!("review {i}: great dress but cheap fabric, returned the size"))
            .collect();
        group.bench_with_input(BenchmarkId::new("parallel", size), &texts, |b, texts| {
            b.iter(|| service.predict_batch(black_box(texts.as_slice())));
        });
    }

    group.finish();
}

fn benchmark_fusion(c: &mut Criterion) {
    let outputs = [
        ModelOutput::new(
            ModelKind::LogisticRegression,
            ModelVote::new(Recommendation::Recommended, 0.81),
        ),
        ModelOutput::new(
            ModelKind::RandomForest,
            ModelVote::new(Recommendation::NotRecommended, 0.42),
        ),
        ModelOutput::new(ModelKind::Svm, ModelVote::new(Recommendation::Recommended, 0.67)),
    ];

    c.bench_function("fusion", |b| b.iter(|| fuse(black_box(&outputs))));
}

criterion_group!(
    benches,
    benchmark_predict_single,
    benchmark_predict_batch,
    benchmark_fusion
);
criterion_main!(benches);
