//! Shared fixtures: one cube mesh standing in for every die shape.

#![allow(dead_code)]

use dicebox::dicebox_physics::fixtures::{cube_bundle as cube_colliders, CUBE_MESH_SET};
use dicebox::dicebox_physics::{DieType, MeshBundle};
use dicebox::{
    DiceBox, DiceBoxConfig, HeadlessRenderer, StaticThemeSource, ThemeData,
};
use std::sync::Arc;

pub const MESH_SET: &str = CUBE_MESH_SET;

/// Cube colliders for d6 and d10; the registry derives the d100 from the d10
pub fn cube_bundle() -> MeshBundle {
    cube_colliders(&[DieType::D6, DieType::D10])
}

pub fn cube_theme(theme: &str, dice: &[&str]) -> ThemeData {
    ThemeData {
        mesh_name: MESH_SET.to_string(),
        mesh_file: format!("models/{MESH_SET}.json"),
        dice_available: dice.iter().map(|d| d.to_string()).collect(),
        ..ThemeData::standard(theme)
    }
}

pub fn cube_source() -> StaticThemeSource {
    StaticThemeSource::new()
        .with_theme(cube_theme("default", &["d6", "d10", "d100"]), cube_bundle())
        .with_theme(cube_theme("sixes", &["d6"]), cube_bundle())
}

/// Log to the test harness; `RUST_LOG=dicebox=debug` shows the bridge traffic
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn dice_box(config: DiceBoxConfig) -> (DiceBox, HeadlessRenderer) {
    init_tracing();
    let renderer = HeadlessRenderer::new();
    let dice = DiceBox::new(
        config,
        Arc::new(cube_source()),
        renderer.clone(),
        800.0,
        600.0,
    )
    .await
    .expect("dice box starts");
    (dice, renderer)
}
