//! Integration tests verifying that exact solutions actually satisfy the
//! constraints they were solved for. Positions are written back to the scene
//! and every constraint is re-evaluated by the lint pass.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use scene_layout::layout::lint::{self, evaluate, LintCategory};
use scene_layout::layout::{
    Alignment, Axis, ConstraintSolver, ExactConfig, LayoutConstraint, Point, Priority, Scene,
    SceneObject, Size, SolveStatus,
};

fn circuit() -> Scene {
    let mut scene = Scene::new(600.0, 400.0);
    for (id, x, y, w, h) in [
        ("battery", 20.0, 20.0, 60.0, 40.0),
        ("switch", 30.0, 30.0, 40.0, 20.0),
        ("resistor", 40.0, 25.0, 80.0, 30.0),
        ("bulb", 50.0, 40.0, 40.0, 40.0),
    ] {
        scene
            .add_object(SceneObject::new(id, Point::new(x, y), Size::new(w, h)))
            .expect("unique ids");
    }
    scene
}

fn solve_and_apply(scene: &mut Scene, config: ExactConfig) -> bool {
    let solution = ConstraintSolver::new(config).solve(scene);
    if solution.satisfiable {
        assert_eq!(solution.apply(scene), scene.objects().len());
    }
    solution.satisfiable
}

#[test]
fn test_round_trip_holds_every_constraint() {
    let mut scene = circuit();
    scene.add_constraint(LayoutConstraint::alignment(
        ["battery", "resistor"],
        Alignment::Horizontal,
    ));
    scene.add_constraint(LayoutConstraint::alignment(["switch", "bulb"], Alignment::Vertical));
    scene.add_constraint(LayoutConstraint::distance("battery", "resistor", 180.0));
    scene.add_constraint(LayoutConstraint::symmetry(["battery", "resistor"], Axis::Vertical));
    scene.add_constraint(
        LayoutConstraint::no_overlap(["switch", "bulb"]).with_parameter("margin", 15.0),
    );
    scene.add_constraint(LayoutConstraint::bounds(["bulb"], 0.0, 600.0, 200.0, 400.0));

    assert!(solve_and_apply(&mut scene, ExactConfig::default()));

    let warnings = lint::check(&scene);
    assert!(warnings.is_empty(), "{:?}", warnings);
    for constraint in scene.constraints.all() {
        let eval = evaluate(constraint, &scene).expect("all ids exist");
        assert!(eval.satisfied, "{} off by {}", constraint, eval.error);
    }
}

#[test]
fn test_distance_chain() {
    let mut scene = circuit();
    scene.add_constraint(LayoutConstraint::new(
        scene_layout::ConstraintKind::Distance,
        ["battery", "switch", "bulb"],
    )
    .with_parameter("distance", 120.0));

    assert!(solve_and_apply(&mut scene, ExactConfig::default()));
    let battery = scene.object("battery").unwrap().center();
    let switch = scene.object("switch").unwrap().center();
    let bulb = scene.object("bulb").unwrap().center();
    assert!((battery.distance_to(switch) - 120.0).abs() < 1e-3);
    assert!((switch.distance_to(bulb) - 120.0).abs() < 1e-3);
}

#[test]
fn test_pruned_constraint_is_only_violation() {
    let mut scene = circuit();
    scene.add_constraint(LayoutConstraint::centered("bulb").with_priority(Priority::Required));
    scene.add_constraint(
        LayoutConstraint::bounds(["bulb"], 0.0, 100.0, 0.0, 100.0).with_priority(Priority::Low),
    );

    let config = ExactConfig {
        constraint_budget: 1,
        ..ExactConfig::default()
    };
    assert!(solve_and_apply(&mut scene, config));

    let warnings = lint::check_constraints(&scene);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].category, LintCategory::Constraint);
    assert!(warnings[0].message.starts_with("bounds(bulb)"));
}

#[test]
fn test_separation_margin_respected() {
    let mut scene = Scene::new(300.0, 300.0);
    for id in ["left", "right"] {
        scene
            .add_object(SceneObject::new(id, Point::new(100.0, 100.0), Size::new(50.0, 50.0)))
            .unwrap();
    }
    scene.add_constraint(LayoutConstraint::no_overlap(["left", "right"]).with_parameter("margin", 30.0));
    scene.add_constraint(LayoutConstraint::alignment(["left", "right"], Alignment::Horizontal));

    assert!(solve_and_apply(&mut scene, ExactConfig::default()));
    let l = scene.object("left").unwrap().position;
    let r = scene.object("right").unwrap().position;
    assert!((l.y - r.y).abs() < 1e-6);
    assert!((l.x - r.x).abs() >= 80.0 - 1e-6, "left={:?} right={:?}", l, r);
}

#[test]
fn test_impossible_symmetry_fails_closed() {
    let mut scene = circuit();
    // Two objects mirrored about the vertical axis and also vertically
    // aligned must share the axis, where they collide
    scene.add_constraint(LayoutConstraint::symmetry(["switch", "bulb"], Axis::Vertical));
    scene.add_constraint(LayoutConstraint::alignment(["switch", "bulb"], Alignment::Vertical));
    scene.add_constraint(LayoutConstraint::alignment(["switch", "bulb"], Alignment::Horizontal));

    let before: Vec<Point> = scene.objects().iter().map(|o| o.position).collect();
    assert!(!solve_and_apply(&mut scene, ExactConfig::default()));
    let after: Vec<Point> = scene.objects().iter().map(|o| o.position).collect();
    assert_eq!(before, after);
}

// ===================
// Tight packings
// ===================

/// `n` equal squares piled on one spot of a `width` x `height` canvas
fn pile(n: usize, side: f64, width: f64, height: f64) -> Scene {
    let mut scene = Scene::new(width, height);
    for i in 0..n {
        let square = SceneObject::new(format!("o{}", i), Point::new(0.0, 0.0), Size::new(side, side));
        scene.add_object(square).unwrap();
    }
    scene
}

#[test]
fn test_exact_two_by_two_grid_is_found() {
    let mut scene = pile(4, 50.0, 100.0, 100.0);
    let solution = ConstraintSolver::new(ExactConfig::default()).solve(&scene);
    assert_eq!(solution.status, SolveStatus::Satisfiable);
    solution.apply(&mut scene);
    assert!(lint::check(&scene).is_empty(), "{:?}", lint::check(&scene));
}

#[test]
fn test_packable_piles_are_never_refuted() {
    for (n, side, width, height) in [
        (6, 50.0, 150.0, 100.0),
        (6, 50.0, 160.0, 110.0),
        (6, 40.0, 104.0, 146.0),
    ] {
        let mut scene = pile(n, side, width, height);
        let solution = ConstraintSolver::new(ExactConfig::default()).solve(&scene);
        assert_ne!(
            solution.status,
            SolveStatus::Unsatisfiable,
            "{} squares of {} in {}x{}",
            n,
            side,
            width,
            height
        );
        if solution.satisfiable {
            solution.apply(&mut scene);
            assert!(lint::check(&scene).is_empty(), "{:?}", lint::check(&scene));
        }
    }
}

#[test]
fn test_overfull_canvas_is_refuted() {
    // Two 60px squares fit neither side by side nor stacked in 100x100
    let solution =
        ConstraintSolver::new(ExactConfig::default()).solve(&pile(2, 60.0, 100.0, 100.0));
    assert_eq!(solution.status, SolveStatus::Unsatisfiable);
}

// ===================
// Round-trip property
// ===================

#[derive(Debug, Clone)]
struct Case {
    width: f64,
    height: f64,
    objects: Vec<(f64, f64, f64, f64)>,
    align: bool,
    distance: Option<f64>,
    floor: Option<f64>,
}

fn case_strategy() -> impl Strategy<Value = Case> {
    (
        60.0f64..260.0,
        60.0f64..260.0,
        prop::collection::vec((0.0f64..100.0, 0.0f64..100.0, 20.0f64..60.0, 20.0f64..60.0), 2..5),
        any::<bool>(),
        prop::option::of(40.0f64..150.0),
        prop::option::of(0.0f64..120.0),
    )
        .prop_map(|(width, height, objects, align, distance, floor)| Case {
            width,
            height,
            objects,
            align,
            distance,
            floor,
        })
}

fn build(case: &Case) -> Scene {
    let mut scene = Scene::new(case.width, case.height);
    for (i, &(x, y, w, h)) in case.objects.iter().enumerate() {
        scene
            .add_object(SceneObject::new(format!("o{}", i), Point::new(x, y), Size::new(w, h)))
            .unwrap();
    }
    if case.align {
        scene.add_constraint(LayoutConstraint::alignment(["o0", "o1"], Alignment::Horizontal));
    }
    if let Some(d) = case.distance {
        scene.add_constraint(LayoutConstraint::distance("o0", "o1", d));
    }
    if let Some(min_y) = case.floor {
        let last = format!("o{}", case.objects.len() - 1);
        scene.add_constraint(LayoutConstraint::bounds([last], 0.0, case.width, min_y, case.height));
    }
    scene
}

/// Whatever the solver calls satisfiable must pass every lint check
fn check_round_trip(case: Case) -> Result<(), TestCaseError> {
    let mut scene = build(&case);
    let config = ExactConfig {
        timeout_ms: 1_000,
        ..ExactConfig::default()
    };
    let solution = ConstraintSolver::new(config).solve(&scene);
    if solution.status == SolveStatus::Satisfiable {
        solution.apply(&mut scene);
        let warnings = lint::check(&scene);
        prop_assert!(warnings.is_empty(), "{:?} for {:?}", warnings, case);
    }
    Ok(())
}

/// Without user constraints, room for a grid of the largest object means a
/// placement exists
fn check_packable_not_refuted(case: Case) -> Result<(), TestCaseError> {
    let case = Case {
        align: false,
        distance: None,
        floor: None,
        ..case
    };
    let w = case.objects.iter().map(|o| o.2).fold(0.0, f64::max);
    let h = case.objects.iter().map(|o| o.3).fold(0.0, f64::max);
    let slots = (case.width / w).floor() * (case.height / h).floor();
    prop_assume!(slots >= case.objects.len() as f64);

    let config = ExactConfig {
        timeout_ms: 1_000,
        ..ExactConfig::default()
    };
    let solution = ConstraintSolver::new(config).solve(&build(&case));
    prop_assert_ne!(solution.status, SolveStatus::Unsatisfiable, "{:?}", case);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn satisfiable_solutions_pass_lint(case in case_strategy()) {
        check_round_trip(case)?;
    }

    #[test]
    fn packable_scenes_are_not_refuted(case in case_strategy()) {
        check_packable_not_refuted(case)?;
    }
}
