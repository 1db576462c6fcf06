mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{cube_theme, dice_box};
use dicebox::dicebox_physics::fixtures::cube_mesh;
use dicebox::dicebox_physics::MeshBundle;
use dicebox::{
    ConfigPatch, DiceBox, DiceBoxConfig, DiceError, DiceEvent, DieSpec, GroupId,
    HeadlessRenderer, RemoveOptions, RerollOptions, RollId, RollOptions, Sides,
    StaticThemeSource, ThemeData,
};

fn roll_ids(groups: &[dicebox::GroupResult]) -> Vec<String> {
    let mut ids: Vec<String> = groups
        .iter()
        .flat_map(|g| g.rolls.iter().map(|r| r.roll_id.to_string()))
        .collect();
    ids.sort();
    ids
}

#[tokio::test(start_paused = true)]
async fn test_roll_2d6_resolves_one_group() {
    let (dice, renderer) = dice_box(DiceBoxConfig::default()).await;

    let groups = dice.roll("2d6", RollOptions::default()).unwrap().await.unwrap();

    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.notation, "2d6");
    assert_eq!(group.qty, 2);
    assert_eq!(group.rolls.len(), 2);
    let values: Vec<i32> = group.rolls.iter().map(|r| r.value.unwrap()).collect();
    assert!(values.iter().all(|v| (1..=6).contains(v)), "{values:?}");
    assert_eq!(group.value, values.iter().sum::<i32>());
    assert_eq!(dice.get_roll_results(), groups);
    assert_eq!(renderer.die_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_modifier_is_added_to_group_value() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;

    let groups = dice.roll("1d6+3", RollOptions::default()).unwrap().await.unwrap();

    let die = groups[0].rolls[0].value.unwrap();
    assert_eq!(groups[0].modifier, 3);
    assert_eq!(groups[0].value, die + 3);
}

#[tokio::test(start_paused = true)]
async fn test_d100_rolls_two_bodies() {
    let (dice, renderer) = dice_box(DiceBoxConfig::default()).await;

    let groups = dice.roll("1d100", RollOptions::default()).unwrap().await.unwrap();

    let value = groups[0].rolls[0].value.unwrap();
    // tens cube reads 10..60, ones cube 1..6
    assert!((11..=66).contains(&value), "{value}");
    assert_eq!(groups[0].rolls.len(), 1);
    assert_eq!(renderer.die_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_add_to_existing_group() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;
    dice.roll("2d6", RollOptions::default()).unwrap().await.unwrap();

    let spec = DieSpec::new(Sides::Numeric(6), 3).with_group(GroupId(0));
    let groups = dice.add(spec, RollOptions::default()).unwrap().await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].qty, 5);
    assert_eq!(groups[0].rolls.len(), 5);
    let sum: i32 = groups[0].rolls.iter().map(|r| r.value.unwrap()).sum();
    assert_eq!(groups[0].value, sum);
}

#[tokio::test(start_paused = true)]
async fn test_add_to_unknown_group_fails() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;

    let spec = DieSpec::new(Sides::Numeric(6), 1).with_group(GroupId(9));
    let err = dice.add(spec, RollOptions::default()).unwrap_err();

    assert!(matches!(err, DiceError::UnknownGroup(9)));
    assert!(dice.get_roll_results().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_remove_recomputes_group() {
    let (dice, renderer) = dice_box(DiceBoxConfig::default()).await;
    let groups = dice.roll("2d6", RollOptions::default()).unwrap().await.unwrap();
    let kept = groups[0].rolls[1].value.unwrap();

    let removed = dice
        .remove(&[RollId::new(0)], RemoveOptions::default())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].roll_id, RollId::new(0));
    let groups = dice.get_roll_results();
    assert_eq!(groups[0].qty, 1);
    assert_eq!(groups[0].value, kept);
    assert_eq!(renderer.die_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_unknown_die_fails() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;
    dice.roll("1d6", RollOptions::default()).unwrap().await.unwrap();

    let err = dice
        .remove(&[RollId::new(0), RollId::new(4)], RemoveOptions::default())
        .unwrap_err();

    assert!(matches!(err, DiceError::UnknownDie(_)));
    assert_eq!(dice.get_roll_results()[0].qty, 1);
}

#[tokio::test(start_paused = true)]
async fn test_colliding_roll_ids_are_bumped() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;
    let spec = DieSpec::new(Sides::Numeric(6), 1).with_roll_id(RollId::new(5));

    let groups = dice
        .add(vec![spec.clone(), spec], RollOptions::default())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(roll_ids(&groups), vec!["5", "5.1"]);
}

#[tokio::test(start_paused = true)]
async fn test_reroll_replaces_die_in_group() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;
    dice.roll("1d6", RollOptions::default()).unwrap().await.unwrap();

    let groups = dice
        .reroll(&[RollId::new(0)], RerollOptions::default())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, GroupId(0));
    assert_eq!(groups[0].qty, 1);
    assert_eq!(roll_ids(&groups), vec!["0.1"]);
}

#[tokio::test(start_paused = true)]
async fn test_suspended_simulation_draws_values() {
    let config = DiceBoxConfig {
        suspend_simulation: true,
        ..DiceBoxConfig::default()
    };
    let (dice, renderer) = dice_box(config).await;

    let groups = dice.roll("3d6", RollOptions::default()).unwrap().await.unwrap();

    assert_eq!(groups[0].rolls.len(), 3);
    assert!(groups[0]
        .rolls
        .iter()
        .all(|r| (1..=6).contains(&r.value.unwrap())));
    assert_eq!(renderer.die_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_die_missing_from_theme_falls_back() {
    let (dice, renderer) = dice_box(DiceBoxConfig::default()).await;

    let options = RollOptions {
        theme: Some("sixes".into()),
        ..RollOptions::default()
    };
    let groups = dice.roll("2d8", options).unwrap().await.unwrap();

    assert_eq!(groups[0].theme, "sixes");
    assert!(groups[0]
        .rolls
        .iter()
        .all(|r| (1..=8).contains(&r.value.unwrap())));
    assert_eq!(renderer.die_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fate_dice_fall_back() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;

    let groups = dice.roll("4dF", RollOptions::default()).unwrap().await.unwrap();

    assert_eq!(groups[0].sides, Sides::Fate);
    assert!(groups[0]
        .rolls
        .iter()
        .all(|r| (-1..=1).contains(&r.value.unwrap())));
}

#[tokio::test(start_paused = true)]
async fn test_clear_rejects_pending_roll() {
    let (dice, renderer) = dice_box(DiceBoxConfig::default()).await;

    let pending = dice.roll("2d6", RollOptions::default()).unwrap();
    dice.clear().unwrap();

    assert!(matches!(pending.await, Err(DiceError::ClearedWhileRolling)));
    assert!(dice.get_roll_results().is_empty());

    // the board is usable again
    let groups = dice.roll("1d6", RollOptions::default()).unwrap().await.unwrap();
    assert_eq!(groups[0].id, GroupId(0));
    assert_eq!(renderer.die_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_notation_keeps_board() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;
    dice.roll("1d6", RollOptions::default()).unwrap().await.unwrap();

    let err = dice.roll("2x6", RollOptions::default()).unwrap_err();

    assert!(matches!(err, DiceError::Parse { .. }));
    assert_eq!(dice.get_roll_results().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_events_follow_roll() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;
    let mut events = dice.subscribe();

    let groups = dice.roll("1d6", RollOptions::default()).unwrap().await.unwrap();

    let mut die_complete = None;
    loop {
        match events.recv().await.unwrap() {
            DiceEvent::DieComplete(result) => die_complete = Some(result),
            DiceEvent::RollComplete(snapshot) => {
                assert_eq!(snapshot, groups);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(die_complete.unwrap(), groups[0].rolls[0]);
}

#[tokio::test(start_paused = true)]
async fn test_update_config_rejects_invalid_values() {
    let (dice, _) = dice_box(DiceBoxConfig::default()).await;

    let err = dice
        .update_config(ConfigPatch {
            scale: Some(40.0),
            ..ConfigPatch::default()
        })
        .unwrap_err();
    assert!(matches!(err, DiceError::InvalidConfig(_)));
    assert_eq!(dice.config().scale, 5.0);

    dice.update_config(ConfigPatch {
        gravity: Some(2.0),
        enable_shadows: Some(false),
        ..ConfigPatch::default()
    })
    .unwrap();
    assert_eq!(dice.config().gravity, 2.0);
    assert!(!dice.config().enable_shadows);
}

#[tokio::test(start_paused = true)]
async fn test_hide_and_show() {
    let (dice, renderer) = dice_box(DiceBoxConfig::default()).await;

    dice.hide().unwrap();
    dice.resize(320.0, 240.0).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!renderer.is_visible());
    assert_eq!(renderer.size(), (320.0, 240.0));

    dice.show().unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(renderer.is_visible());
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_counts_are_rejected() {
    let (dice, renderer) = dice_box(DiceBoxConfig::default()).await;
    dice.roll("1d6", RollOptions::default()).unwrap().await.unwrap();

    for text in ["1d3000000000", "3d2000000000", "4000000000d6", "5000d6", "0d6"] {
        let err = dice.roll(text, RollOptions::default()).unwrap_err();
        assert!(matches!(err, DiceError::Parse { .. }), "{text}: {err:?}");
    }
    for spec in [
        DieSpec::new(Sides::Numeric(0), 1),
        DieSpec::new(Sides::Numeric(6), 0),
        DieSpec::new(Sides::Numeric(u32::MAX), 1),
        DieSpec::new(Sides::Numeric(6), u32::MAX),
    ] {
        let err = dice.add(spec, RollOptions::default()).unwrap_err();
        assert!(matches!(err, DiceError::InvalidValue { .. }), "{err:?}");
    }

    // nothing was spawned or cleared by the rejected calls
    assert_eq!(dice.get_roll_results().len(), 1);
    assert_eq!(renderer.die_count(), 1);
    let groups = dice.roll("1d6", RollOptions::default()).unwrap().await.unwrap();
    assert!((1..=6).contains(&groups[0].value));
}

#[tokio::test(start_paused = true)]
async fn test_d100_double_zero_reads_hundred() {
    common::init_tracing();
    // every d10 face reads 10: the tens body shows 00 and the ones body 0
    let faces: HashMap<String, i32> = (0..12).map(|tri: u32| (tri.to_string(), 10)).collect();
    let bundle = MeshBundle {
        meshes: vec![cube_mesh("d10_collider")],
        collider_face_map: Some(HashMap::from([("d10".to_string(), faces)])),
    };
    let theme = ThemeData {
        mesh_name: "zeros".to_string(),
        mesh_file: "models/zeros.json".to_string(),
        ..cube_theme("zeros", &["d10", "d100"])
    };
    let renderer = HeadlessRenderer::new();
    let dice = DiceBox::new(
        DiceBoxConfig {
            theme: "zeros".into(),
            ..Default::default()
        },
        Arc::new(StaticThemeSource::new().with_theme(theme, bundle)),
        renderer.clone(),
        800.0,
        600.0,
    )
    .await
    .unwrap();

    let groups = dice.roll("1d100", RollOptions::default()).unwrap().await.unwrap();

    assert_eq!(groups[0].rolls[0].value, Some(100));
    assert_eq!(groups[0].value, 100);
    assert_eq!(renderer.die_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_theme_color_reaches_renderer() {
    let (dice, renderer) = dice_box(DiceBoxConfig::default()).await;

    dice.update_config(ConfigPatch {
        theme_color: Some("#ff0000".into()),
        ..ConfigPatch::default()
    })
    .unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(renderer.theme_color(), Some("#ff0000".to_string()));
    assert_eq!(dice.config().theme_color, "#ff0000");
}
