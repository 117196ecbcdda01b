//! Exact constraint-based layout
//!
//! Every object gets two real variables, its top-left `x` and `y`. Linear
//! constraints (canvas bounds, alignment, symmetry, explicit bounds,
//! centering) go straight to the linear backend. Two kinds of constraint are
//! not linear and are decided by case splitting:
//!
//! - no-overlap is a four-way disjunction; each alternative is tried in turn,
//!   starting with the one closest to the current placement
//! - a distance band `|c_a - c_b| ≈ target` is split into angular wedges;
//!   a wedge whose linear relaxation is infeasible is pruned, otherwise the
//!   exact offset along its bisector is tried, then a point of the band
//!   reached by re-aiming a tangent line, and finally the wedge is halved up
//!   to a depth limit
//!
//! The search is depth-first, checks a deadline at every node and never
//! touches the scene.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use serde::Serialize;

use super::config::ExactConfig;
use super::constraints::{Axis, ConstraintKind, LayoutConstraint, Priority};
use super::solver::{
    ConstraintOrigin, LayoutVariable, LinearConstraint, LinearExpr, LinearSolver, Relation,
    Solution, SolverError,
};
use super::types::{Point, Scene, SceneObject};
use super::{find_similar, SUGGESTION_DISTANCE};

/// Number of wedges a distance band is first split into
const INITIAL_WEDGES: usize = 8;

/// Tangent re-aims tried per wedge before giving up on it
const PROJECTION_STEPS: usize = 8;

/// Why a solve ended without an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// The deadline passed
    Timeout,
    /// A distance band could neither be satisfied nor refuted at the
    /// refinement depth
    Incomplete,
    /// The linear backend failed
    Internal(String),
}

/// Result of an exact solve
///
/// [`SolveStatus::reason`] gives `"unsatisfiable"` or, for `Unknown`, one of
/// `"timeout"`, `"incomplete"` (a distance band was neither satisfied nor
/// refuted at the refinement depth) and `"internal error"`. Only
/// `"unsatisfiable"` means the constraints cannot hold; treat every other
/// reason like a timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Satisfiable,
    /// The encoded constraints contradict each other
    Unsatisfiable,
    /// Neither; not evidence that the layout is impossible
    Unknown(UnknownReason),
}

impl SolveStatus {
    /// Short machine-friendly reason for a failed solve
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            SolveStatus::Satisfiable => None,
            SolveStatus::Unsatisfiable => Some("unsatisfiable"),
            SolveStatus::Unknown(UnknownReason::Timeout) => Some("timeout"),
            SolveStatus::Unknown(UnknownReason::Incomplete) => Some("incomplete"),
            SolveStatus::Unknown(UnknownReason::Internal(_)) => Some("internal error"),
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            None => write!(f, "satisfiable"),
            Some(reason) => write!(f, "{}", reason),
        }
    }
}

/// Bookkeeping about one solve
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SolveMetadata {
    pub objects: usize,
    /// Scene constraints that made it into the encoding
    pub encoded_constraints: usize,
    /// Low priority constraints dropped because of the constraint budget
    pub pruned_low_priority: usize,
    /// Constraints skipped for naming unknown objects or missing parameters
    pub skipped_constraints: usize,
    pub disjunctions: usize,
    pub distance_terms: usize,
    /// Search nodes visited
    pub nodes: usize,
    /// Times the linear backend was replayed from scratch after a
    /// backtrack
    pub rebuilds: usize,
}

/// Output of the exact pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutSolution {
    /// Top-left positions by object id; empty unless satisfiable
    pub positions: BTreeMap<String, Point>,
    pub satisfiable: bool,
    pub status: SolveStatus,
    pub solve_time: Duration,
    pub metadata: SolveMetadata,
}

impl LayoutSolution {
    pub fn reason(&self) -> Option<&'static str> {
        self.status.reason()
    }

    /// Write positions back onto the scene; returns how many objects moved.
    /// Does nothing for an unsatisfied solution.
    pub fn apply(&self, scene: &mut Scene) -> usize {
        if !self.satisfiable {
            return 0;
        }
        let mut applied = 0;
        for (id, position) in &self.positions {
            if let Some(object) = scene.object_mut(id) {
                object.position = *position;
                applied += 1;
            }
        }
        applied
    }
}

/// `dx = c_b.x - c_a.x`, `dy = c_b.y - c_a.y` must lie in the ring
/// `inner <= |(dx, dy)| <= outer`
#[derive(Debug, Clone)]
struct DistanceTerm {
    a: usize,
    b: usize,
    target: f64,
    inner: f64,
    outer: f64,
    /// Center offsets: `dx = x_b - x_a + offset_x`
    offset_x: f64,
    offset_y: f64,
    tolerance: f64,
    description: String,
}

impl DistanceTerm {
    /// `alpha * dx + beta * dy` as a linear expression
    fn directional(&self, alpha: f64, beta: f64) -> LinearExpr {
        LinearExpr::new()
            .term(LayoutVariable::x(self.b), alpha)
            .term(LayoutVariable::x(self.a), -alpha)
            .term(LayoutVariable::y(self.b), beta)
            .term(LayoutVariable::y(self.a), -beta)
            .plus(alpha * self.offset_x + beta * self.offset_y)
    }

    fn constraint(&self, alpha: f64, beta: f64, relation: Relation, rhs: f64) -> LinearConstraint {
        LinearConstraint::new(
            self.directional(alpha, beta),
            relation,
            rhs,
            ConstraintOrigin::Distance,
            self.description.clone(),
        )
    }

    /// Linear relaxation of the ring restricted to angles `[a0, a1]`
    fn wedge(&self, a0: f64, a1: f64) -> [LinearConstraint; 4] {
        let mid = (a0 + a1) / 2.0;
        let half = (a1 - a0) / 2.0;
        [
            // Counter-clockwise of the first ray
            self.constraint(-a0.sin(), a0.cos(), Relation::GreaterOrEqual, 0.0),
            // Clockwise of the second ray
            self.constraint(a1.sin(), -a1.cos(), Relation::GreaterOrEqual, 0.0),
            // Beyond the chord of the inner circle
            self.constraint(
                mid.cos(),
                mid.sin(),
                Relation::GreaterOrEqual,
                self.inner * half.cos(),
            ),
            // Inside the tangent of the outer circle
            self.constraint(mid.cos(), mid.sin(), Relation::LessOrEqual, self.outer),
        ]
    }

    /// Pin the offset between the two centers
    fn pin(&self, dx: f64, dy: f64) -> [LinearConstraint; 2] {
        [
            self.constraint(1.0, 0.0, Relation::Equal, dx),
            self.constraint(0.0, 1.0, Relation::Equal, dy),
        ]
    }

    /// Current center offset
    fn offset(&self, solution: &Solution) -> (f64, f64) {
        let dx = solution.get(LayoutVariable::x(self.b)) - solution.get(LayoutVariable::x(self.a))
            + self.offset_x;
        let dy = solution.get(LayoutVariable::y(self.b)) - solution.get(LayoutVariable::y(self.a))
            + self.offset_y;
        (dx, dy)
    }
}

/// A choice between linear alternatives, at least one of which must hold
#[derive(Debug, Clone)]
struct Disjunction {
    alternatives: Vec<LinearConstraint>,
}

#[derive(Debug, Default)]
struct Encoding {
    hard: Vec<LinearConstraint>,
    disjunctions: Vec<Disjunction>,
    distances: Vec<DistanceTerm>,
    metadata: SolveMetadata,
}

/// Exact layout solver
#[derive(Debug, Clone, Default)]
pub struct ConstraintSolver {
    config: ExactConfig,
}

impl ConstraintSolver {
    pub fn new(config: ExactConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExactConfig {
        &self.config
    }

    /// Solve the scene's constraints. The scene is not modified; see
    /// [`LayoutSolution::apply`].
    pub fn solve(&self, scene: &Scene) -> LayoutSolution {
        let started = Instant::now();
        let deadline = started + self.config.timeout();
        let encoding = self.encode(scene);
        let mut metadata = encoding.metadata.clone();

        let mut search = Search {
            solver: LinearSolver::new(),
            encoding: &encoding,
            deadline,
            depth_limit: self.config.distance_refinement_depth,
            nodes: 0,
            incomplete: false,
        };
        let step = search.run(scene.objects());
        metadata.nodes = search.nodes;
        metadata.rebuilds = search.solver.rebuilds();

        let (status, positions) = match step {
            Step::Found(positions) => (SolveStatus::Satisfiable, decode(scene.objects(), &positions)),
            Step::Exhausted if search.incomplete => {
                (SolveStatus::Unknown(UnknownReason::Incomplete), BTreeMap::new())
            }
            Step::Exhausted => (SolveStatus::Unsatisfiable, BTreeMap::new()),
            Step::TimedOut => (SolveStatus::Unknown(UnknownReason::Timeout), BTreeMap::new()),
            Step::Failed(msg) => (
                SolveStatus::Unknown(UnknownReason::Internal(msg)),
                BTreeMap::new(),
            ),
        };

        let solve_time = started.elapsed();
        info!(
            status = status.to_string().as_str(),
            nodes = metadata.nodes,
            millis = solve_time.as_millis() as u64;
            "Exact layout finished"
        );
        LayoutSolution {
            positions,
            satisfiable: status == SolveStatus::Satisfiable,
            status,
            solve_time,
            metadata,
        }
    }

    /// Scene constraints that will be encoded, after pruning and skipping
    fn select<'s>(&self, scene: &'s Scene, metadata: &mut SolveMetadata) -> Vec<&'s LayoutConstraint> {
        let total = scene.constraints.len();
        let prune = total > self.config.constraint_budget;
        let mut selected = Vec::new();
        for constraint in scene.constraints.all() {
            if prune && constraint.priority == Priority::Low {
                metadata.pruned_low_priority += 1;
                continue;
            }
            if constraint.objects.is_empty() {
                metadata.skipped_constraints += 1;
                continue;
            }
            if let Some(missing) = constraint.objects.iter().find(|id| !scene.contains(id)) {
                let suggestions = find_similar(
                    scene.objects().iter().map(SceneObject::id),
                    missing,
                    SUGGESTION_DISTANCE,
                );
                warn!(
                    constraint = constraint.to_string().as_str(),
                    unknown = missing.as_str(),
                    suggestions = suggestions.join(", ").as_str();
                    "Skipping constraint on unknown object"
                );
                metadata.skipped_constraints += 1;
                continue;
            }
            selected.push(constraint);
        }
        if prune {
            info!(
                total = total,
                budget = self.config.constraint_budget,
                pruned = metadata.pruned_low_priority;
                "Constraint budget exceeded, low priority constraints dropped"
            );
        }
        selected
    }

    fn encode(&self, scene: &Scene) -> Encoding {
        let objects = scene.objects();
        let mut enc = Encoding::default();
        enc.metadata.objects = objects.len();

        let area = scene.content_area();
        for (i, object) in objects.iter().enumerate() {
            let (w, h) = (object.size.width, object.size.height);
            let id = object.id();
            let x = LayoutVariable::x(i);
            let y = LayoutVariable::y(i);
            enc.hard.push(canvas(
                x,
                Relation::GreaterOrEqual,
                area.x,
                format!("{}.left >= {}", id, area.x),
            ));
            enc.hard.push(canvas(
                x,
                Relation::LessOrEqual,
                scene.width - scene.margins.right - w,
                format!("{}.right <= {}", id, scene.width - scene.margins.right),
            ));
            enc.hard.push(canvas(
                y,
                Relation::GreaterOrEqual,
                area.y,
                format!("{}.top >= {}", id, area.y),
            ));
            enc.hard.push(canvas(
                y,
                Relation::LessOrEqual,
                scene.height - scene.margins.bottom - h,
                format!("{}.bottom <= {}", id, scene.height - scene.margins.bottom),
            ));
        }

        // Separation gap per unordered pair; explicit constraints may widen it
        let mut separations: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        if self.config.global_no_overlap {
            for i in 0..objects.len() {
                for j in (i + 1)..objects.len() {
                    separations.insert((i, j), 0.0);
                }
            }
        }

        let selected = self.select(scene, &mut enc.metadata);
        for constraint in selected {
            let idx: Vec<usize> = constraint
                .objects
                .iter()
                .filter_map(|id| scene.index_of(id))
                .collect();
            let encoded = match constraint.kind {
                ConstraintKind::NoOverlap => {
                    let gap = constraint.margin();
                    for (n, &i) in idx.iter().enumerate() {
                        for &j in &idx[n + 1..] {
                            if i == j {
                                continue;
                            }
                            let key = (i.min(j), i.max(j));
                            let entry = separations.entry(key).or_insert(gap);
                            *entry = entry.max(gap);
                        }
                    }
                    true
                }
                ConstraintKind::Distance => encode_distance(constraint, &idx, objects, &mut enc),
                ConstraintKind::AlignmentHorizontal | ConstraintKind::AlignmentVertical => {
                    let horizontal = constraint.kind == ConstraintKind::AlignmentHorizontal;
                    for &k in &idx[1..] {
                        let (vk, v0) = if horizontal {
                            (LayoutVariable::y(k), LayoutVariable::y(idx[0]))
                        } else {
                            (LayoutVariable::x(k), LayoutVariable::x(idx[0]))
                        };
                        enc.hard.push(user(
                            LinearExpr::new().term(vk, 1.0).term(v0, -1.0),
                            Relation::Equal,
                            0.0,
                            constraint,
                        ));
                    }
                    true
                }
                ConstraintKind::Symmetry => {
                    let n = idx.len();
                    for p in 0..(n + 1) / 2 {
                        let (i, j) = (idx[p], idx[n - 1 - p]);
                        let (vi, vj, si, sj, full) = match constraint.axis() {
                            Axis::Vertical => (
                                LayoutVariable::x(i),
                                LayoutVariable::x(j),
                                objects[i].size.width,
                                objects[j].size.width,
                                scene.width,
                            ),
                            Axis::Horizontal => (
                                LayoutVariable::y(i),
                                LayoutVariable::y(j),
                                objects[i].size.height,
                                objects[j].size.height,
                                scene.height,
                            ),
                        };
                        // center_i + center_j = 2 * (full / 2)
                        enc.hard.push(user(
                            LinearExpr::new().term(vi, 1.0).term(vj, 1.0),
                            Relation::Equal,
                            full - (si + sj) / 2.0,
                            constraint,
                        ));
                    }
                    true
                }
                ConstraintKind::Bounds => {
                    let limits = constraint.limits();
                    for &i in &idx {
                        let (w, h) = (objects[i].size.width, objects[i].size.height);
                        let sides = [
                            (LayoutVariable::x(i), Relation::GreaterOrEqual, limits.min_x),
                            (LayoutVariable::x(i), Relation::LessOrEqual, limits.max_x - w),
                            (LayoutVariable::y(i), Relation::GreaterOrEqual, limits.min_y),
                            (LayoutVariable::y(i), Relation::LessOrEqual, limits.max_y - h),
                        ];
                        for (var, relation, rhs) in sides {
                            if rhs.is_finite() {
                                enc.hard.push(user(
                                    LinearExpr::new().term(var, 1.0),
                                    relation,
                                    rhs,
                                    constraint,
                                ));
                            }
                        }
                    }
                    true
                }
                ConstraintKind::Centered => {
                    for &i in &idx {
                        let (w, h) = (objects[i].size.width, objects[i].size.height);
                        enc.hard.push(user(
                            LinearExpr::new().term(LayoutVariable::x(i), 1.0),
                            Relation::Equal,
                            (scene.width - w) / 2.0,
                            constraint,
                        ));
                        enc.hard.push(user(
                            LinearExpr::new().term(LayoutVariable::y(i), 1.0),
                            Relation::Equal,
                            (scene.height - h) / 2.0,
                            constraint,
                        ));
                    }
                    true
                }
            };
            if encoded {
                enc.metadata.encoded_constraints += 1;
            } else {
                enc.metadata.skipped_constraints += 1;
            }
        }

        for ((i, j), gap) in separations {
            enc.disjunctions.push(separation(objects, i, j, gap));
        }
        enc.metadata.disjunctions = enc.disjunctions.len();
        enc.metadata.distance_terms = enc.distances.len();
        debug!(
            hard = enc.hard.len(),
            disjunctions = enc.metadata.disjunctions,
            distances = enc.metadata.distance_terms;
            "Constraints encoded"
        );
        enc
    }
}

fn canvas(var: LayoutVariable, relation: Relation, rhs: f64, description: String) -> LinearConstraint {
    LinearConstraint::new(
        LinearExpr::new().term(var, 1.0),
        relation,
        rhs,
        ConstraintOrigin::Canvas,
        description,
    )
}

fn user(expr: LinearExpr, relation: Relation, rhs: f64, source: &LayoutConstraint) -> LinearConstraint {
    LinearConstraint::new(
        expr,
        relation,
        rhs,
        ConstraintOrigin::UserDefined,
        source.to_string(),
    )
}

/// Distance between consecutive listed objects. Returns false when the
/// constraint has no usable target.
fn encode_distance(
    constraint: &LayoutConstraint,
    idx: &[usize],
    objects: &[SceneObject],
    enc: &mut Encoding,
) -> bool {
    let Some(target) = constraint.target_distance().filter(|d| d.is_finite() && *d >= 0.0) else {
        warn!(
            constraint = constraint.to_string().as_str();
            "Skipping distance constraint without a valid 'distance' parameter"
        );
        return false;
    };
    if idx.len() < 2 {
        return false;
    }
    let tol = constraint.tolerance.max(0.0);
    // |d - target| <= tol  <=>  target² - eps <= d² <= target² + eps (first order)
    let eps = 2.0 * target * tol + tol * tol;
    for pair in idx.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        enc.distances.push(DistanceTerm {
            a,
            b,
            target,
            inner: (target * target - eps).max(0.0).sqrt(),
            outer: (target * target + eps).sqrt(),
            offset_x: (objects[b].size.width - objects[a].size.width) / 2.0,
            offset_y: (objects[b].size.height - objects[a].size.height) / 2.0,
            tolerance: tol,
            description: constraint.to_string(),
        });
    }
    true
}

/// The four ways two boxes can be apart, ordered by how close the current
/// placement already is to each
fn separation(objects: &[SceneObject], i: usize, j: usize, gap: f64) -> Disjunction {
    let (a, b) = (&objects[i], &objects[j]);
    let (ba, bb) = (a.bounds(), b.bounds());
    let (xa, xb) = (LayoutVariable::x(i), LayoutVariable::x(j));
    let (ya, yb) = (LayoutVariable::y(i), LayoutVariable::y(j));
    let name = format!("{}|{}", a.id(), b.id());

    // (expr <= rhs, current violation)
    let options = [
        // a left of b: xa + wa + gap <= xb
        (
            LinearExpr::new().term(xa, 1.0).term(xb, -1.0),
            -ba.width - gap,
            ba.right() + gap - bb.x,
            "left of",
        ),
        // b left of a
        (
            LinearExpr::new().term(xb, 1.0).term(xa, -1.0),
            -bb.width - gap,
            bb.right() + gap - ba.x,
            "right of",
        ),
        // a above b
        (
            LinearExpr::new().term(ya, 1.0).term(yb, -1.0),
            -ba.height - gap,
            ba.bottom() + gap - bb.y,
            "above",
        ),
        // b above a
        (
            LinearExpr::new().term(yb, 1.0).term(ya, -1.0),
            -bb.height - gap,
            bb.bottom() + gap - ba.y,
            "below",
        ),
    ];
    let mut ranked: Vec<(f64, LinearConstraint)> = options
        .into_iter()
        .map(|(expr, rhs, violation, how)| {
            (
                violation,
                LinearConstraint::new(
                    expr,
                    Relation::LessOrEqual,
                    rhs,
                    ConstraintOrigin::Separation,
                    format!("{} {} {}", a.id(), how, b.id()),
                ),
            )
        })
        .collect();
    ranked.sort_by(|l, r| l.0.total_cmp(&r.0));
    trace!(pair = name.as_str(); "Separation alternatives ranked");
    Disjunction {
        alternatives: ranked.into_iter().map(|(_, c)| c).collect(),
    }
}

fn decode(objects: &[SceneObject], values: &HashMap<LayoutVariable, f64>) -> BTreeMap<String, Point> {
    objects
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let x = values.get(&LayoutVariable::x(i)).copied().unwrap_or(o.position.x);
            let y = values.get(&LayoutVariable::y(i)).copied().unwrap_or(o.position.y);
            (o.id().to_string(), Point::new(x, y))
        })
        .collect()
}

enum Step {
    Found(HashMap<LayoutVariable, f64>),
    /// Every branch below failed
    Exhausted,
    TimedOut,
    Failed(String),
}

struct Search<'e> {
    solver: LinearSolver,
    encoding: &'e Encoding,
    deadline: Instant,
    depth_limit: usize,
    nodes: usize,
    /// Set when some branch was abandoned without a refutation
    incomplete: bool,
}

impl Search<'_> {
    fn run(&mut self, objects: &[SceneObject]) -> Step {
        for (i, object) in objects.iter().enumerate() {
            let prefs = [
                self.solver.prefer(LayoutVariable::x(i), object.position.x),
                self.solver.prefer(LayoutVariable::y(i), object.position.y),
            ];
            for pref in prefs {
                if let Err(e) = pref {
                    return Step::Failed(e.to_string());
                }
            }
        }
        let encoding = self.encoding;
        for constraint in &encoding.hard {
            match self.solver.push(constraint) {
                Ok(()) => {}
                Err(SolverError::Unsatisfiable { reason }) => {
                    debug!(reason = reason.as_str(); "Linear constraints are infeasible");
                    return Step::Exhausted;
                }
                Err(SolverError::Internal(msg)) => return Step::Failed(msg),
            }
        }
        self.descend(0)
    }

    fn choices(&self) -> usize {
        self.encoding.distances.len() + self.encoding.disjunctions.len()
    }

    fn descend(&mut self, choice: usize) -> Step {
        self.nodes += 1;
        if Instant::now() >= self.deadline {
            return Step::TimedOut;
        }
        if choice == self.choices() {
            return match self.solver.solution() {
                Ok(solution) => Step::Found(solution.values),
                Err(e) => Step::Failed(e.to_string()),
            };
        }
        let encoding = self.encoding;
        let distances = encoding.distances.len();
        if choice < distances {
            let term = &encoding.distances[choice];
            let width = 2.0 * PI / INITIAL_WEDGES as f64;
            for k in 0..INITIAL_WEDGES {
                let a0 = k as f64 * width;
                match self.wedge(term, a0, a0 + width, 0, choice) {
                    Step::Exhausted => continue,
                    other => return other,
                }
            }
            Step::Exhausted
        } else {
            let disjunction = &encoding.disjunctions[choice - distances];
            // Cases the current point already satisfies go first; ties keep
            // the order ranked from the input placement
            let current = match self.solver.solution() {
                Ok(solution) => solution,
                Err(e) => return Step::Failed(e.to_string()),
            };
            let mut order: Vec<(f64, &LinearConstraint)> = disjunction
                .alternatives
                .iter()
                .map(|c| ((c.expr.eval(|v| current.get(v)) - c.rhs).max(0.0), c))
                .collect();
            order.sort_by(|l, r| l.0.total_cmp(&r.0));
            for (_, alternative) in order {
                let mark = self.solver.mark();
                match self.solver.push(alternative) {
                    Ok(()) => {}
                    Err(SolverError::Unsatisfiable { .. }) => continue,
                    Err(SolverError::Internal(msg)) => return Step::Failed(msg),
                }
                trace!(choice = choice, case = alternative.description.as_str(); "Trying separation");
                let step = self.descend(choice + 1);
                self.solver.pop_to(mark);
                match step {
                    Step::Exhausted => continue,
                    other => return other,
                }
            }
            Step::Exhausted
        }
    }

    /// Explore angles `[a0, a1]` of a distance band
    fn wedge(&mut self, term: &DistanceTerm, a0: f64, a1: f64, depth: usize, choice: usize) -> Step {
        if Instant::now() >= self.deadline {
            return Step::TimedOut;
        }
        let mark = self.solver.mark();
        for constraint in term.wedge(a0, a1) {
            match self.solver.push(&constraint) {
                Ok(()) => {}
                Err(SolverError::Unsatisfiable { .. }) => {
                    // Relaxation infeasible: no direction in this wedge works
                    self.solver.pop_to(mark);
                    return Step::Exhausted;
                }
                Err(SolverError::Internal(msg)) => return Step::Failed(msg),
            }
        }

        let angle = (a0 + a1) / 2.0;
        let step = match self.try_offset(term, term.target * angle.cos(), term.target * angle.sin(), choice) {
            Step::Exhausted => self.project(term, a0, a1, choice),
            other => other,
        };
        let step = match step {
            Step::Exhausted if depth < self.depth_limit => {
                let mid = (a0 + a1) / 2.0;
                match self.wedge(term, a0, mid, depth + 1, choice) {
                    Step::Exhausted => self.wedge(term, mid, a1, depth + 1, choice),
                    other => other,
                }
            }
            Step::Exhausted => {
                trace!(
                    constraint = term.description.as_str(),
                    depth = depth;
                    "Distance wedge left undecided"
                );
                self.incomplete = true;
                Step::Exhausted
            }
            other => other,
        };
        self.solver.pop_to(mark);
        step
    }

    /// Fix the center offset of a distance term and continue below it
    fn try_offset(&mut self, term: &DistanceTerm, dx: f64, dy: f64, choice: usize) -> Step {
        let mark = self.solver.mark();
        for constraint in term.pin(dx, dy) {
            match self.solver.push(&constraint) {
                Ok(()) => {}
                Err(SolverError::Unsatisfiable { .. }) => {
                    self.solver.pop_to(mark);
                    return Step::Exhausted;
                }
                Err(SolverError::Internal(msg)) => return Step::Failed(msg),
            }
        }
        let step = self.descend(choice + 1);
        self.solver.pop_to(mark);
        step
    }

    /// Find a point of the band inside `[a0, a1]` when other constraints
    /// already fix part of the offset (an alignment fixing `dy`, say).
    ///
    /// Puts the offset on the tangent line at `angle`, reads where the
    /// solver lands and re-aims the tangent at that direction until the
    /// radius is within half the tolerance.
    fn project(&mut self, term: &DistanceTerm, a0: f64, a1: f64, choice: usize) -> Step {
        let slack = (term.tolerance / 2.0).max(f64::EPSILON);
        let mut angle = (a0 + a1) / 2.0;
        for _ in 0..PROJECTION_STEPS {
            if Instant::now() >= self.deadline {
                return Step::TimedOut;
            }
            let mark = self.solver.mark();
            let tangent = term.constraint(angle.cos(), angle.sin(), Relation::Equal, term.target);
            let landed = match self.solver.push(&tangent) {
                Ok(()) => match self.solver.solution() {
                    Ok(solution) => Some(term.offset(&solution)),
                    Err(e) => return Step::Failed(e.to_string()),
                },
                Err(SolverError::Unsatisfiable { .. }) => None,
                Err(SolverError::Internal(msg)) => return Step::Failed(msg),
            };
            self.solver.pop_to(mark);
            let Some((dx, dy)) = landed else {
                return Step::Exhausted;
            };
            if (dx.hypot(dy) - term.target).abs() <= slack {
                return self.try_offset(term, dx, dy, choice);
            }
            let mut next = dy.atan2(dx);
            if next < a0 {
                next += 2.0 * PI;
            }
            let next = next.clamp(a0, a1);
            if (next - angle).abs() < 1e-12 {
                break;
            }
            angle = next;
        }
        Step::Exhausted
    }
}
