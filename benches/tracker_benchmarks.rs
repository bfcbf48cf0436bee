//! Tracker benchmarks using Criterion.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use motrack::{MultipleObjectTracker, TrackManagerConfig, TrackedObject};
use nalgebra::DVector;

const FRAME: f64 = 0.033; // ~30 FPS

/// Deterministic walking-people scenario generator.
struct PeopleScenario {
    rng: StdRng,
}

impl PeopleScenario {
    fn new() -> Self {
        Self {
            rng: StdRng::seed_from_u64(42),
        }
    }

    /// A person-shaped detection with a random pose and walking velocity.
    fn person(&mut self) -> TrackedObject {
        let speed = self.rng.gen_range(0.5..2.0);
        let direction = self.rng.gen_range(0.0..std::f64::consts::TAU);

        TrackedObject {
            x: self.rng.gen_range(-25.0..25.0),
            y: self.rng.gen_range(-25.0..25.0),
            length: self.rng.gen_range(0.3..0.5),
            width: self.rng.gen_range(0.4..0.7),
            height: self.rng.gen_range(1.6..1.9),
            vx: speed * direction.cos(),
            vy: speed * direction.sin(),
            yaw: direction,
            classification: DVector::from_vec(vec![
                self.rng.gen_range(0.8..0.95),
                0.02,
                0.02,
                0.02,
                0.02,
            ]),
            ..Default::default()
        }
    }

    /// The same people walking their straight lines, observed at `t`.
    fn frame(&self, people: &[TrackedObject], t: f64) -> Vec<TrackedObject> {
        people
            .iter()
            .map(|person| {
                let mut moved = person.clone();
                moved.x += person.vx * t;
                moved.y += person.vy * t;
                moved
            })
            .collect()
    }

    fn people(&mut self, count: usize) -> Vec<TrackedObject> {
        (0..count).map(|_| self.person()).collect()
    }
}

fn bench_tracking(c: &mut Criterion, name: &str, num_people: usize) {
    c.bench_function(name, |b| {
        let mut scenario = PeopleScenario::new();
        let people = scenario.people(num_people);

        let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();
        let mut frame_count = 0u32;

        b.iter(|| {
            let t = frame_count as f64 * FRAME;
            let detections = scenario.frame(&people, t);
            tracker.track(black_box(detections), t, 0.7).unwrap();
            frame_count += 1;

            // Reset before the crowd wanders out of the scene.
            if frame_count >= 100 {
                frame_count = 0;
                tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();
            }
        })
    });
}

fn benchmark_tracking_10_people(c: &mut Criterion) {
    bench_tracking(c, "tracking_10_moving_people", 10);
}

fn benchmark_tracking_50_people(c: &mut Criterion) {
    bench_tracking(c, "tracking_50_moving_people", 50);
}

fn benchmark_empty_frames(c: &mut Criterion) {
    c.bench_function("tracking_empty_frames", |b| {
        let mut scenario = PeopleScenario::new();
        let people = scenario.people(20);

        let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();
        for frame in 0..5 {
            let t = frame as f64 * FRAME;
            tracker.track(scenario.frame(&people, t), t, 0.7).unwrap();
        }

        let mut t = 5.0 * FRAME;
        b.iter(|| {
            tracker.track(black_box(Vec::new()), t, 0.7).unwrap();
            t += FRAME;
        })
    });
}

criterion_group!(
    benches,
    benchmark_tracking_10_people,
    benchmark_tracking_50_people,
    benchmark_empty_frames
);
criterion_main!(benches);
