use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use powerhour::audio::{SampleBuffer, compose};

const SAMPLE_RATE: u32 = 8_000;
const CLIP_SECONDS: usize = 10;
const CLIP_COUNT: usize = 60;

fn make_clips() -> Vec<SampleBuffer> {
    (0..CLIP_COUNT)
        .map(|idx| {
            let value = (idx as f32 / CLIP_COUNT as f32) - 0.5;
            SampleBuffer::from_planar(
                vec![vec![value; CLIP_SECONDS * SAMPLE_RATE as usize]; 2],
                SAMPLE_RATE,
            )
        })
        .collect()
}

fn bench_compose(c: &mut Criterion) {
    let clips = make_clips();
    let interstitial = SampleBuffer::from_planar(
        vec![vec![0.25; 5 * SAMPLE_RATE as usize]; 2],
        SAMPLE_RATE,
    );
    c.bench_with_input(
        BenchmarkId::new("compose_sixty_clips", CLIP_COUNT),
        &clips,
        |b, clips| {
            b.iter(|| {
                let mixed = compose(black_box(clips), Some(black_box(&interstitial)))
                    .expect("compose");
                black_box(mixed.frames())
            })
        },
    );
}

criterion_group!(benches, bench_compose);
criterion_main!(benches);
