//! Performance benchmarks for the analysis pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resona::analysis::compare::{ScoringConfig, SimilarityEngine};
use resona::analysis::SoundAnalysis;
use resona::perception::FlatResponse;
use resona::{analyze, AnalysisConfig, BufferedSource, Spectrogram};

fn bench_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.bin_count = 16;
    config.frame_rate = 20.0;
    config
}

fn synthetic_source(frames: usize, config: &AnalysisConfig) -> BufferedSource {
    let bins = config.bin_count;
    let data: Vec<f32> = (0..frames * bins)
        .map(|i| {
            let frame = i / bins;
            let base = 40.0 + (i % bins) as f32;
            if frame % 10 == 0 {
                base * 6.0
            } else {
                base
            }
        })
        .collect();
    let spectrogram = Spectrogram::new(data, bins).unwrap();
    let frequencies: Vec<f64> = (0..bins).map(|bin| 60.0 * (bin + 1) as f64).collect();
    BufferedSource::new(spectrogram, None, frequencies, config.frame_rate).unwrap()
}

fn bench_analyze(c: &mut Criterion) {
    // 30 seconds of material at 20 fps, 16 bins.
    let config = bench_config();
    let source = synthetic_source(600, &config);

    c.bench_function("analyze_30s_16bins", |b| {
        b.iter(|| {
            let _ = analyze(black_box(&source), &FlatResponse, black_box(&config));
        });
    });
}

fn bench_compare(c: &mut Criterion) {
    let config = bench_config();
    let features = analyze(&synthetic_source(600, &config), &FlatResponse, &config).unwrap();
    let a = SoundAnalysis::Full {
        name: "a".to_string(),
        features: features.clone(),
    };
    let b = SoundAnalysis::Full {
        name: "b".to_string(),
        features,
    };
    let engine = SimilarityEngine::new(ScoringConfig::default());

    c.bench_function("compare_pair_16bins", |bench| {
        bench.iter(|| {
            let _ = engine.compare(black_box(&a), black_box(&b));
        });
    });
}

criterion_group!(benches, bench_analyze, bench_compare);
criterion_main!(benches);
