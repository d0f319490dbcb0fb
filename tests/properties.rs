use load_it_now::geometry::{contains, overlaps};
use load_it_now::job::{CalculationJob, CalculationStatus, ScoreWeights};
use load_it_now::lifecycle::{LifecycleError, Plan, PlanError, PlanStatus};
use load_it_now::model::{Container, Item, Orientation, PlanLine, expand_lines};
use load_it_now::optimizer::{ItemOrder, PackingConfig, PackingResult, UnplacedReason, pack};
use load_it_now::placement_id::{
    PlacementId, ScanVerdict, decode_placement_id, encode_placement_id,
};
use load_it_now::types::{Dimensional, EPSILON_GENERAL, Vec3};

const PLAN: &str = "a3f2e8b1-c4d9-4f2a-b1c8-3d9e8f7a6b5c";
const ITEM: &str = "c4d9f2a3-8b1c-4e5f-9a2b-6d7e8f9a0b1c";

fn cube_container() -> Container {
    Container::new((1000.0, 1000.0, 1000.0), 1000.0).unwrap()
}

/// Deterministic pseudo-random mix of cartons, some rotation-locked, some stack-limited.
fn mixed_lines() -> Vec<PlanLine> {
    let mut seed: u64 = 0x5eed_1234;
    let mut next = |range: u64| {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (seed >> 33) % range
    };

    (0..14)
        .map(|i| {
            let dims = (
                (150 + next(350)) as f64,
                (100 + next(300)) as f64,
                (80 + next(320)) as f64,
            );
            let weight = (5 + next(60)) as f64;
            let mut line = PlanLine::new(format!("line-{i:03}"), dims, weight)
                .quantity(1 + next(4) as u32)
                .allow_rotation(i % 3 != 0);
            if i % 4 == 0 {
                line = line.stacking_limit(2);
            }
            line
        })
        .collect()
}

fn pack_mixed(container: &Container, config: &PackingConfig) -> (Vec<Item>, PackingResult) {
    let items = expand_lines(&mixed_lines()).unwrap();
    let result = pack(container, &items, config).unwrap();
    (items, result)
}

fn sorted(v: Vec3) -> [f64; 3] {
    let mut dims = [v.x, v.y, v.z];
    dims.sort_by(|a, b| a.total_cmp(b));
    dims
}

fn configs() -> Vec<PackingConfig> {
    vec![
        PackingConfig::default(),
        PackingConfig::builder()
            .item_order(ItemOrder::WeightDescending)
            .build(),
        PackingConfig::builder()
            .item_order(ItemOrder::InputOrder)
            .max_free_spaces(16)
            .build(),
        PackingConfig::builder().support_ratio(0.6).build(),
    ]
}

#[test]
fn placements_never_overlap() {
    let container = Container::new((1200.0, 1000.0, 1000.0), 2000.0).unwrap();
    for config in configs() {
        let (_, result) = pack_mixed(&container, &config);
        assert!(!result.placements.is_empty());
        for (i, a) in result.placements.iter().enumerate() {
            for b in &result.placements[i + 1..] {
                assert!(
                    !overlaps(&a.bounding_box(), &b.bounding_box()),
                    "{:?} overlaps {:?} with {:?}",
                    a.item.reference,
                    b.item.reference,
                    config
                );
            }
        }
    }
}

#[test]
fn placements_stay_inside_the_container() {
    let container = Container::new((1200.0, 1000.0, 1000.0), 2000.0).unwrap();
    let bounds = container.bounds();
    for config in configs() {
        let (_, result) = pack_mixed(&container, &config);
        for placement in &result.placements {
            assert!(contains(&bounds, &placement.bounding_box()));
            assert!(placement.position.x >= -EPSILON_GENERAL);
            assert!(placement.position.y >= -EPSILON_GENERAL);
            assert!(placement.position.z >= -EPSILON_GENERAL);
        }
    }
}

#[test]
fn weight_capacity_is_respected() {
    let container = Container::new((1200.0, 1000.0, 1000.0), 300.0).unwrap();
    for config in configs() {
        let (_, result) = pack_mixed(&container, &config);
        assert!(result.placed_weight() <= container.max_weight + EPSILON_GENERAL);
        assert!(
            result
                .unplaced
                .iter()
                .any(|u| u.reason == UnplacedReason::ExceedsWeightCapacity)
        );
    }
}

#[test]
fn every_unit_is_accounted_for_once() {
    let container = Container::new((800.0, 800.0, 800.0), 2000.0).unwrap();
    let (items, result) = pack_mixed(&container, &PackingConfig::default());
    assert_eq!(result.placed_count() + result.unplaced_count(), items.len());

    let mut seen: Vec<_> = result
        .placements
        .iter()
        .map(|p| p.item.reference.clone())
        .chain(result.unplaced.iter().map(|u| u.item.reference.clone()))
        .collect();
    seen.sort_by(|a, b| (&a.line_id, a.ordinal).cmp(&(&b.line_id, b.ordinal)));
    seen.dedup();
    assert_eq!(seen.len(), items.len());

    let steps: Vec<u32> = result.placements.iter().map(|p| p.step_number).collect();
    let expected: Vec<u32> = (1..=result.placements.len() as u32).collect();
    assert_eq!(steps, expected);
}

#[test]
fn packing_is_deterministic() {
    let container = Container::new((1200.0, 1000.0, 1000.0), 2000.0).unwrap();
    for config in configs() {
        let (_, first) = pack_mixed(&container, &config);
        let (_, second) = pack_mixed(&container, &config);
        assert_eq!(first, second);
    }
}

#[test]
fn rotation_policy_is_respected() {
    let container = Container::new((1200.0, 1000.0, 1000.0), 2000.0).unwrap();
    let (_, result) = pack_mixed(&container, &PackingConfig::default());
    for placement in &result.placements {
        let item = &placement.item;
        if item.allow_rotation {
            assert_eq!(sorted(placement.extents), sorted(item.dimensions()));
            assert_eq!(placement.orientation.apply(item.dimensions()), placement.extents);
        } else {
            assert_eq!(placement.orientation, Orientation::Lwh);
            assert_eq!(placement.extents, item.dimensions());
        }
    }
}

#[test]
fn two_cubes_fill_an_eighth_of_the_container() {
    let mut plan = Plan::new(PLAN, cube_container()).unwrap();
    plan.add_line(
        PlanLine::new(ITEM, (400.0, 400.0, 400.0), 50.0)
            .quantity(2)
            .allow_rotation(false),
    )
    .unwrap();

    let status = plan
        .calculate(PackingConfig::default(), ScoreWeights::default())
        .unwrap();
    assert_eq!(status, PlanStatus::Completed);

    let result = plan.calculation().unwrap();
    assert_eq!(result.status, CalculationStatus::Completed);
    assert_eq!(result.placed_count(), 2);
    assert!((result.volume_utilization - 0.128).abs() < 1e-9);
    assert!((result.weight_utilization - 0.1).abs() < 1e-9);
    assert!(!overlaps(
        &result.placements[0].bounding_box(),
        &result.placements[1].bounding_box()
    ));

    let labels = plan.placement_labels().unwrap();
    let steps: Vec<u32> = labels.iter().map(|l| l.step).collect();
    assert_eq!(steps, vec![1, 2]);
    assert_eq!(labels[0].code, "PLAN-a3f2e8b1-STEP-001-c4d9f2a3");
    assert_eq!(labels[1].code, "PLAN-a3f2e8b1-STEP-002-c4d9f2a3");
    assert_eq!(
        plan.verify_scan(&labels[1].code, Some(2)).unwrap(),
        ScanVerdict::Matched { step: 2 }
    );
    assert_eq!(
        plan.verify_scan(&labels[1].code, Some(1)).unwrap(),
        ScanVerdict::OutOfSequence {
            expected: 1,
            scanned: 2
        }
    );
}

#[test]
fn oversized_item_fails_the_plan() {
    let mut plan = Plan::new(PLAN, cube_container()).unwrap();
    plan.add_line(PlanLine::new(ITEM, (1000.0, 1000.0, 1001.0), 10.0).allow_rotation(false))
        .unwrap();

    let status = plan
        .calculate(PackingConfig::default(), ScoreWeights::default())
        .unwrap();
    assert_eq!(status, PlanStatus::Failed);

    let result = plan.calculation().unwrap();
    assert_eq!(result.placed_count(), 0);
    assert_eq!(result.unplaced_count(), 1);
    assert_eq!(
        result.unplaced[0].reason,
        UnplacedReason::DimensionsExceedContainer
    );
}

#[test]
fn decodes_scanned_identifiers() {
    assert_eq!(
        decode_placement_id("PLAN-a3f2e8b1-STEP-001-c4d9f2a3"),
        Some(PlacementId {
            plan8: "a3f2e8b1".to_string(),
            step: 1,
            item8: "c4d9f2a3".to_string(),
        })
    );
    assert_eq!(decode_placement_id("ITEM-a3f2e8b1-STEP-001-c4d9f2a3"), None);
}

#[test]
fn codec_round_trips_every_step() {
    for step in 1..=999 {
        let code = encode_placement_id(PLAN, step, ITEM).unwrap();
        let decoded = decode_placement_id(&code).unwrap();
        assert_eq!(decoded.step, step);
        assert_eq!(decoded.plan8, "a3f2e8b1");
        assert_eq!(decoded.item8, "c4d9f2a3");
        assert_eq!(decoded.to_string(), code);
    }
    assert!(encode_placement_id(PLAN, 1000, ITEM).is_err());
    assert!(encode_placement_id(PLAN, 0, ITEM).is_err());
}

#[test]
fn edits_are_rejected_while_a_calculation_is_in_flight() {
    let mut plan = Plan::new(PLAN, cube_container()).unwrap();
    plan.add_line(PlanLine::new(ITEM, (400.0, 400.0, 400.0), 50.0))
        .unwrap();

    let job = plan
        .begin_calculation(PackingConfig::default(), ScoreWeights::default())
        .unwrap();
    assert_eq!(plan.status(), PlanStatus::InProgress);

    let err = plan
        .add_line(PlanLine::new("d5e0a3b4-late", (100.0, 100.0, 100.0), 1.0))
        .unwrap_err();
    assert!(matches!(
        err,
        PlanError::Lifecycle(LifecycleError::Conflict(_))
    ));

    let foreign = CalculationJob::new(cube_container(), expand_lines(plan.lines()).unwrap()).run();
    assert!(matches!(
        plan.complete_calculation(foreign),
        Err(PlanError::Lifecycle(LifecycleError::StaleResult(_)))
    ));
    assert_eq!(plan.status(), PlanStatus::InProgress);

    assert_eq!(
        plan.complete_calculation(job.run()).unwrap(),
        PlanStatus::Completed
    );

    plan.set_container(Container::new((500.0, 500.0, 500.0), 100.0).unwrap())
        .unwrap();
    assert_eq!(plan.status(), PlanStatus::Completed);
    assert!(!plan.is_result_current());
}
