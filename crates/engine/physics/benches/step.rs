//! Benchmark for the dice simulation step
//!
//! Measures per-tick cost with a tray full of rolling dice, buffer writes
//! included.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dicebox_physics::{
    BodyId, ColliderMesh, ColliderRegistry, DiceSimulation, DieType, MeshBundle,
    SimulationConfig, UpdateBuffer,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Benchmark configuration
struct BenchConfig {
    dice: u32,
    width: f32,
    height: f32,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            dice: 20,
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// Registry holding a single cube collider under `bench`
fn create_registry() -> Arc<ColliderRegistry> {
    let mesh = ColliderMesh {
        name: "d6_collider".to_string(),
        positions: vec![
            -0.5, -0.5, -0.5, 0.5, -0.5, -0.5, 0.5, 0.5, -0.5, -0.5, 0.5, -0.5, -0.5, -0.5, 0.5,
            0.5, -0.5, 0.5, 0.5, 0.5, 0.5, -0.5, 0.5, 0.5,
        ],
        indices: vec![3, 2, 6, 3, 6, 7],
        ..Default::default()
    };
    let face_map = HashMap::from([(
        "d6".to_string(),
        HashMap::from([("0".to_string(), 1), ("1".to_string(), 1)]),
    )]);
    let bundle = MeshBundle {
        meshes: vec![mesh],
        collider_face_map: Some(face_map),
    };

    let registry = ColliderRegistry::new();
    registry
        .load_models("bench", &bundle)
        .expect("Failed to load bench colliders");
    Arc::new(registry)
}

fn spawn_dice(config: &BenchConfig, registry: Arc<ColliderRegistry>) -> DiceSimulation {
    let sim_config = SimulationConfig {
        // keep every die live for the whole measurement
        settle_timeout: f32::MAX,
        linear_sleep_epsilon: 0.0,
        angular_sleep_epsilon: 0.0,
        ..Default::default()
    };
    let mut sim = DiceSimulation::new(sim_config, registry, config.width, config.height)
        .expect("Failed to create simulation");
    sim.set_random_seed(7);
    for id in 0..config.dice {
        sim.add_body(DieType::D6, "bench", BodyId(id))
            .expect("Failed to add die");
    }
    sim
}

fn bench_add_body(c: &mut Criterion) {
    let config = BenchConfig::default();
    let registry = create_registry();

    c.bench_function("dice_add_body", |b| {
        b.iter(|| black_box(spawn_dice(&config, registry.clone())));
    });
}

fn bench_step(c: &mut Criterion) {
    let config = BenchConfig::default();
    let mut sim = spawn_dice(&config, create_registry());
    let mut buffer = Some(UpdateBuffer::default());

    c.bench_function("dice_step", |b| {
        b.iter(|| {
            let out = sim.step(1000.0 / 60.0, buffer.take().unwrap_or_default());
            black_box(out.len());
            buffer = Some(out);
        });
    });
}

criterion_group!(benches, bench_add_body, bench_step);

criterion_main!(benches);
