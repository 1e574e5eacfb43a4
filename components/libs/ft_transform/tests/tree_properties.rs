use approx::assert_relative_eq;
use ft_transform::{
    Clock, FrameTree, FtDuration, QueryEngine, RigidTransform, SharedTreeIndex, TimeInterpolator,
    Timestamp, TransformError, TransformRecord, TransformStore, TreeConfig, UpdateIngester,
};
use glam::{DQuat, DVec3};
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

const SECOND: i64 = 1_000_000_000;

fn record(parent: &str, child: &str, stamp: i64, transform: RigidTransform) -> TransformRecord {
    let (translation, rotation) = transform.to_arrays();
    TransformRecord {
        parent_frame_id: parent.to_string(),
        child_frame_id: child.to_string(),
        timestamp_nanos: stamp,
        translation,
        rotation,
    }
}

fn translation(x: f64, y: f64, z: f64) -> RigidTransform {
    RigidTransform::from_translation(DVec3::new(x, y, z))
}

fn mock_tree(config: TreeConfig) -> FrameTree {
    let (clock, _mock) = Clock::mock();
    FrameTree::new(config, clock)
}

#[test]
fn chain_composes_through_intermediate_frame() {
    let tree = mock_tree(TreeConfig::default());
    let a_b = RigidTransform::new(
        DVec3::new(1.0, 2.0, 0.0),
        DQuat::from_rotation_z(0.3),
    );
    let b_c = RigidTransform::new(
        DVec3::new(0.0, -1.0, 0.5),
        DQuat::from_rotation_x(-0.7),
    );
    for stamp in [0, SECOND] {
        tree.ingest(&record("a", "b", stamp, a_b), "test").unwrap();
        tree.ingest(&record("b", "c", stamp, b_c), "test").unwrap();
    }

    let t = Timestamp::from_nanos(SECOND / 3);
    let direct = tree.transform("a", "c", t).unwrap();
    let composed = tree.transform("a", "b", t).unwrap() * tree.transform("b", "c", t).unwrap();
    assert!(direct.abs_diff_eq(&composed, 1e-9));

    // and the other way around is the inverse
    let back = tree.transform("c", "a", t).unwrap();
    assert!((back * direct).abs_diff_eq(&RigidTransform::IDENTITY, 1e-9));
}

#[test]
fn same_frame_is_identity() {
    let tree = mock_tree(TreeConfig::default());
    tree.ingest(&record("map", "odom", 0, translation(3.0, 0.0, 0.0)), "test")
        .unwrap();
    for frame in ["map", "odom"] {
        for time in [Timestamp::ZERO, Timestamp::from_nanos(42 * SECOND)] {
            let tf = tree.transform(frame, frame, time).unwrap();
            assert!(tf.abs_diff_eq(&RigidTransform::IDENTITY, 1e-12));
        }
    }
}

#[test]
fn exact_stamp_returns_the_sample() {
    let tree = mock_tree(TreeConfig::default());
    let first = RigidTransform::new(DVec3::new(0.1, 0.2, 0.3), DQuat::from_rotation_y(0.4));
    let second = RigidTransform::new(DVec3::new(5.0, 6.0, 7.0), DQuat::from_rotation_y(1.4));
    tree.ingest(&record("map", "base", 100, first), "test").unwrap();
    tree.ingest(&record("map", "base", 200, second), "test").unwrap();

    let at_first = tree.transform("map", "base", Timestamp::from_nanos(100)).unwrap();
    let at_second = tree.transform("map", "base", Timestamp::from_nanos(200)).unwrap();
    assert!(at_first.abs_diff_eq(&first, 1e-12));
    assert!(at_second.abs_diff_eq(&second, 1e-12));
}

#[test]
fn between_samples_matches_manual_interpolation() {
    let tree = mock_tree(TreeConfig::default());
    let before = RigidTransform::new(DVec3::new(0.0, 0.0, 0.0), DQuat::IDENTITY);
    let after = RigidTransform::new(DVec3::new(4.0, -2.0, 1.0), DQuat::from_rotation_z(FRAC_PI_2));
    tree.ingest(&record("map", "base", 0, before), "test").unwrap();
    tree.ingest(&record("map", "base", 4 * SECOND, after), "test").unwrap();

    let tf = tree.transform("map", "base", Timestamp::from_nanos(SECOND)).unwrap();
    let expected = RigidTransform::new(
        before.translation.lerp(after.translation, 0.25),
        before.rotation.slerp(after.rotation, 0.25),
    );
    assert!(tf.abs_diff_eq(&expected, 1e-9));
    assert_relative_eq!(tf.translation.x, 1.0, epsilon = 1e-12);
    assert_relative_eq!(
        tf.rotation.to_euler(glam::EulerRot::ZYX).0,
        FRAC_PI_2 / 4.0,
        epsilon = 1e-9
    );
}

#[test]
fn cycle_is_rejected_and_tree_unchanged() {
    let tree = mock_tree(TreeConfig::default());
    for (parent, child) in [("a", "b"), ("b", "c"), ("c", "d"), ("a", "e")] {
        tree.ingest(&record(parent, child, 0, translation(1.0, 0.0, 0.0)), "test")
            .unwrap();
    }
    let paths = |tree: &FrameTree| -> Vec<Vec<String>> {
        ["a", "b", "c", "d", "e"]
            .iter()
            .map(|f| {
                tree.path_to_root(f)
                    .unwrap()
                    .iter()
                    .map(|id| id.to_string())
                    .collect()
            })
            .collect()
    };
    let before = paths(&tree);

    for (parent, child) in [("d", "a"), ("c", "b"), ("b", "b")] {
        let result = tree.ingest(&record(parent, child, 0, RigidTransform::IDENTITY), "test");
        assert!(
            matches!(result, Err(TransformError::CycleDetected { .. })),
            "{parent} -> {child} gave {result:?}"
        );
    }

    assert_eq!(paths(&tree), before);
    assert_eq!(before[3], vec!["d", "c", "b", "a"]);
    // the rejected samples did not overwrite the stored ones
    let tf = tree.transform("a", "d", Timestamp::ZERO).unwrap();
    assert_relative_eq!(tf.translation.x, 3.0, epsilon = 1e-12);
}

#[test]
fn unknown_frames_are_reported() {
    let tree = mock_tree(TreeConfig::default());
    tree.ingest(&record("map", "base", 0, RigidTransform::IDENTITY), "test")
        .unwrap();

    match tree.transform("map", "ghost", Timestamp::ZERO) {
        Err(TransformError::UnknownFrame(frame)) => assert_eq!(frame, "ghost"),
        other => panic!("expected UnknownFrame, got {other:?}"),
    }
    assert!(matches!(
        tree.transform("ghost", "map", Timestamp::ZERO),
        Err(TransformError::UnknownFrame(_))
    ));
    let too_long = "x".repeat(200);
    assert!(matches!(
        tree.transform(&too_long, "map", Timestamp::ZERO),
        Err(TransformError::UnknownFrame(_))
    ));
}

#[test]
fn disconnected_trees() {
    let tree = mock_tree(TreeConfig::default());
    tree.ingest(&record("map", "base", 0, RigidTransform::IDENTITY), "test")
        .unwrap();
    tree.ingest(&record("world", "marker", 0, RigidTransform::IDENTITY), "test")
        .unwrap();
    assert!(matches!(
        tree.transform("base", "marker", Timestamp::ZERO),
        Err(TransformError::DisconnectedFrames { .. })
    ));
}

#[test]
fn sensor_scenario_with_hold_tolerance() {
    // map -> base_link is only published once, it has to be held up to t = 0.5 s
    let config = TreeConfig {
        extrapolation_tolerance: FtDuration::from_secs(1),
        ..TreeConfig::default()
    };
    let tree = mock_tree(config);
    tree.ingest(&record("map", "base_link", 0, RigidTransform::IDENTITY), "test")
        .unwrap();
    tree.ingest(&record("base_link", "sensor", 0, translation(1.0, 0.0, 0.0)), "test")
        .unwrap();

    let tf = tree.transform("map", "sensor", Timestamp::ZERO).unwrap();
    assert!(tf.abs_diff_eq(&translation(1.0, 0.0, 0.0), 1e-12));

    tree.ingest(&record("base_link", "sensor", SECOND, translation(2.0, 0.0, 0.0)), "test")
        .unwrap();
    let tf = tree
        .transform("map", "sensor", Timestamp::from_secs_f64(0.5))
        .unwrap();
    assert!(tf.abs_diff_eq(&translation(1.5, 0.0, 0.0), 1e-12));
}

#[test]
fn sensor_scenario_with_static_base() {
    let tree = mock_tree(TreeConfig::default());
    tree.ingest_static(&record("map", "base_link", 0, RigidTransform::IDENTITY), "test")
        .unwrap();
    tree.ingest(&record("base_link", "sensor", 0, translation(1.0, 0.0, 0.0)), "test")
        .unwrap();
    tree.ingest(&record("base_link", "sensor", SECOND, translation(2.0, 0.0, 0.0)), "test")
        .unwrap();

    let tf = tree
        .transform("map", "sensor", Timestamp::from_secs_f64(0.5))
        .unwrap();
    assert!(tf.abs_diff_eq(&translation(1.5, 0.0, 0.0), 1e-12));

    let (time, latest) = tree.transform_latest("map", "sensor").unwrap();
    assert_eq!(time, Timestamp::from_nanos(SECOND));
    assert!(latest.abs_diff_eq(&translation(2.0, 0.0, 0.0), 1e-12));
}

#[test]
fn without_hold_tolerance_the_gap_is_an_error() {
    let tree = mock_tree(TreeConfig::default());
    tree.ingest(&record("map", "base_link", 0, RigidTransform::IDENTITY), "test")
        .unwrap();
    tree.ingest(&record("base_link", "sensor", SECOND, translation(2.0, 0.0, 0.0)), "test")
        .unwrap();
    assert!(matches!(
        tree.transform("map", "sensor", Timestamp::from_secs_f64(0.5)),
        Err(TransformError::NoDataAtTime { .. })
    ));
}

#[test]
fn reparenting_drops_old_samples() {
    let tree = mock_tree(TreeConfig::default());
    tree.ingest(&record("map", "odom", 0, translation(10.0, 0.0, 0.0)), "test")
        .unwrap();
    tree.ingest(&record("map", "camera", 0, translation(1.0, 0.0, 0.0)), "test")
        .unwrap();
    tree.ingest(&record("odom", "camera", 10, translation(0.0, 1.0, 0.0)), "test")
        .unwrap();

    assert_eq!(tree.parent_of("camera").unwrap().unwrap().as_str(), "odom");
    assert_eq!(tree.time_range("camera").unwrap(), Some((Timestamp::from_nanos(10), Timestamp::from_nanos(10))));
    let tf = tree.transform("map", "camera", Timestamp::from_nanos(10)).unwrap();
    assert!(tf.abs_diff_eq(&translation(10.0, 1.0, 0.0), 1e-12));
}

#[test]
fn components_wire_up_from_the_crate_root() {
    let config = TreeConfig::default();
    let (clock, _mock) = Clock::mock();
    let index = Arc::new(SharedTreeIndex::new());
    let store = Arc::new(TransformStore::new(&config));
    let ingester = UpdateIngester::new(index.clone(), store.clone(), &config);
    let engine = QueryEngine::new(index, store, TimeInterpolator::from_config(&config), clock);

    ingester
        .ingest(&record("map", "base", 0, translation(1.0, 0.0, 0.0)), &Arc::from("test"))
        .unwrap();
    let tf = engine.transform("map", "base", Timestamp::ZERO).unwrap();
    assert!(tf.abs_diff_eq(&translation(1.0, 0.0, 0.0), 1e-12));
}
