//! Linear constraint backend for exact layout
//!
//! This module wraps the kasuari Cassowary solver. Constraints are added as
//! REQUIRED, so kasuari decides feasibility of the linear part: an add that
//! would make the system infeasible is rejected and never enters the stack.
//! Added constraints form a stack so a search can push a case and pop back
//! to an earlier mark.

use std::collections::HashMap;
use std::fmt;

use kasuari::{
    Constraint as KasuariConstraint, Expression, Solver as KasuariSolver, Strength,
    Variable as KasuariVariable, WeightedRelation::*,
};
use thiserror::Error;

/// Properties that can be constrained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutProperty {
    X,
    Y,
}

/// A variable in the constraint system: one coordinate of one object,
/// identified by its index in the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutVariable {
    pub object: usize,
    pub property: LayoutProperty,
}

impl LayoutVariable {
    /// Create variable for an object's X position
    pub fn x(object: usize) -> Self {
        Self {
            object,
            property: LayoutProperty::X,
        }
    }

    /// Create variable for an object's Y position
    pub fn y(object: usize) -> Self {
        Self {
            object,
            property: LayoutProperty::Y,
        }
    }
}

/// `sum(coefficient * variable) + constant`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearExpr {
    pub terms: Vec<(LayoutVariable, f64)>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, variable: LayoutVariable, coefficient: f64) -> Self {
        if coefficient != 0.0 {
            self.terms.push((variable, coefficient));
        }
        self
    }

    pub fn plus(mut self, constant: f64) -> Self {
        self.constant += constant;
        self
    }

    /// Evaluate against concrete variable values
    pub fn eval(&self, value: impl Fn(LayoutVariable) -> f64) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * value(*v))
            .sum::<f64>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessOrEqual,
    GreaterOrEqual,
    Equal,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::LessOrEqual => write!(f, "<="),
            Relation::GreaterOrEqual => write!(f, ">="),
            Relation::Equal => write!(f, "="),
        }
    }
}

/// Origin of a constraint (for error messages and tracing)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOrigin {
    /// Objects must stay inside the canvas margins
    Canvas,
    /// Generated from a scene constraint
    UserDefined,
    /// One alternative of a no-overlap disjunction
    Separation,
    /// Relaxation or sample of a distance band
    Distance,
}

/// `expr <relation> rhs`
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
    pub origin: ConstraintOrigin,
    pub description: String,
}

impl LinearConstraint {
    pub fn new(
        expr: LinearExpr,
        relation: Relation,
        rhs: f64,
        origin: ConstraintOrigin,
        description: impl Into<String>,
    ) -> Self {
        Self {
            expr,
            relation,
            rhs,
            origin,
            description: description.into(),
        }
    }

    /// Whether the constraint holds for the given values, within `tolerance`
    pub fn holds(&self, value: impl Fn(LayoutVariable) -> f64, tolerance: f64) -> bool {
        let lhs = self.expr.eval(value);
        match self.relation {
            Relation::LessOrEqual => lhs <= self.rhs + tolerance,
            Relation::GreaterOrEqual => lhs >= self.rhs - tolerance,
            Relation::Equal => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// Errors from the constraint solver
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Unsatisfiable constraints: {reason}")]
    Unsatisfiable { reason: String },

    #[error("Internal solver error: {0}")]
    Internal(String),
}

/// Largest violation of a stacked constraint a reported solution may carry
const HOLD_TOLERANCE: f64 = 1e-6;

/// Stack-shaped wrapper around the kasuari solver
///
/// The stack is the source of truth for what has been added. kasuari keeps
/// stray pivots after rejecting a constraint, and removals leave a tableau
/// that is no longer a plain sequence of adds. So:
/// - a rejection marks the tableau stale, and it is replayed from the stack
///   into a fresh solver before the next use;
/// - a rejection only stands once it happened on a tableau built purely by
///   adds, otherwise the add is retried after a replay;
/// - a solution is checked against every stacked constraint before it is
///   returned.
pub struct LinearSolver {
    solver: KasuariSolver,
    /// Maps our variables to kasuari variables
    variables: HashMap<LayoutVariable, KasuariVariable>,
    /// WEAK position preferences, replayed first on every rebuild
    preferences: Vec<KasuariConstraint>,
    /// Constraints added through `push`, in order
    stack: Vec<(LinearConstraint, KasuariConstraint)>,
    /// The tableau holds exactly `preferences` and `stack`
    synced: bool,
    /// Nothing was removed from the tableau since it was built
    fresh: bool,
    rebuilds: usize,
}

impl LinearSolver {
    pub fn new() -> Self {
        Self {
            solver: KasuariSolver::new(),
            variables: HashMap::new(),
            preferences: Vec::new(),
            stack: Vec::new(),
            synced: true,
            fresh: true,
            rebuilds: 0,
        }
    }

    /// Get or create the kasuari variable for a layout variable
    fn get_or_create_var(&mut self, var: LayoutVariable) -> KasuariVariable {
        *self
            .variables
            .entry(var)
            .or_insert_with(KasuariVariable::new)
    }

    /// Build a kasuari expression; `None` when the expression has no terms
    fn expression(&mut self, expr: &LinearExpr) -> Option<Expression> {
        let mut acc: Option<Expression> = None;
        for &(var, coefficient) in &expr.terms {
            let term: Expression = self.get_or_create_var(var).into();
            let term = coefficient * term;
            acc = Some(match acc {
                Some(sum) => sum + term,
                None => term,
            });
        }
        acc.map(|sum| sum + expr.constant)
    }

    /// Replay preferences and the stack into a fresh tableau if needed
    fn sync(&mut self) -> Result<(), SolverError> {
        if self.synced {
            return Ok(());
        }
        self.solver = KasuariSolver::new();
        self.fresh = true;
        self.rebuilds += 1;
        for preference in &self.preferences {
            self.solver
                .add_constraint(preference.clone())
                .map_err(|e| SolverError::Internal(format!("Failed to replay preference: {:?}", e)))?;
        }
        for (constraint, kconstraint) in &self.stack {
            self.solver.add_constraint(kconstraint.clone()).map_err(|e| {
                SolverError::Internal(format!(
                    "Failed to replay {}: {:?}",
                    constraint.description, e
                ))
            })?;
        }
        self.synced = true;
        Ok(())
    }

    /// Ask the solver to keep `var` near `value` when nothing else decides it
    pub fn prefer(&mut self, var: LayoutVariable, value: f64) -> Result<(), SolverError> {
        self.sync()?;
        let kvar = self.get_or_create_var(var);
        let expr: Expression = kvar.into();
        let preference = expr | EQ(Strength::WEAK) | value;
        self.solver
            .add_constraint(preference.clone())
            .map_err(|e| SolverError::Internal(format!("Failed to add preference: {:?}", e)))?;
        self.preferences.push(preference);
        Ok(())
    }

    /// Add a required constraint on top of the stack
    pub fn push(&mut self, constraint: &LinearConstraint) -> Result<(), SolverError> {
        let Some(expr) = self.expression(&constraint.expr) else {
            // Constant-only: decide on the spot, nothing to add
            return if constraint.holds(|_| 0.0, 1e-9) {
                Ok(())
            } else {
                Err(SolverError::Unsatisfiable {
                    reason: format!("{} is false", constraint.description),
                })
            };
        };
        self.sync()?;
        let rhs = constraint.rhs;
        let kconstraint = match constraint.relation {
            Relation::LessOrEqual => expr | LE(Strength::REQUIRED) | rhs,
            Relation::GreaterOrEqual => expr | GE(Strength::REQUIRED) | rhs,
            Relation::Equal => expr | EQ(Strength::REQUIRED) | rhs,
        };
        let mut result = self.solver.add_constraint(kconstraint.clone());
        let rejected = matches!(
            result,
            Err(kasuari::AddConstraintError::UnsatisfiableConstraint)
        );
        if rejected && !self.fresh {
            self.synced = false;
            self.sync()?;
            result = self.solver.add_constraint(kconstraint.clone());
        }
        match result {
            Ok(()) => {
                self.stack.push((constraint.clone(), kconstraint));
                Ok(())
            }
            Err(e) => {
                self.synced = false;
                Err(self.convert_kasuari_error(e, constraint))
            }
        }
    }

    /// Convert a kasuari error to a SolverError with context
    fn convert_kasuari_error(
        &self,
        e: kasuari::AddConstraintError,
        constraint: &LinearConstraint,
    ) -> SolverError {
        match e {
            kasuari::AddConstraintError::UnsatisfiableConstraint => SolverError::Unsatisfiable {
                reason: format!(
                    "Cannot satisfy {}: conflicts with existing constraints",
                    constraint.description
                ),
            },
            kasuari::AddConstraintError::DuplicateConstraint => SolverError::Internal(format!(
                "Duplicate constraint: {}",
                constraint.description
            )),
            kasuari::AddConstraintError::InternalSolverError(msg) => SolverError::Internal(
                format!("Internal solver error for {}: {}", constraint.description, msg),
            ),
        }
    }

    /// Current stack height, to be passed to `pop_to`
    pub fn mark(&self) -> usize {
        self.stack.len()
    }

    /// Drop every constraint pushed after `mark`
    pub fn pop_to(&mut self, mark: usize) {
        while self.stack.len() > mark {
            let Some((_, kconstraint)) = self.stack.pop() else {
                break;
            };
            if self.synced {
                self.fresh = false;
                if self.solver.remove_constraint(&kconstraint).is_err() {
                    self.synced = false;
                }
            }
        }
    }

    /// Stacked constraints, bottom first
    pub fn constraints(&self) -> impl Iterator<Item = &LinearConstraint> {
        self.stack.iter().map(|(c, _)| c)
    }

    /// Times the tableau was replayed from the stack
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Read the current assignment and check it against every stacked
    /// constraint
    pub fn solution(&mut self) -> Result<Solution, SolverError> {
        self.sync()?;
        let solution = self.read();
        if self.violation(&solution).is_none() {
            return Ok(solution);
        }
        if !self.fresh {
            self.synced = false;
            self.sync()?;
        }
        let solution = self.read();
        match self.violation(&solution) {
            None => Ok(solution),
            Some(broken) => Err(SolverError::Internal(format!(
                "Solution violates {} ({} {} {})",
                broken.description,
                broken.expr.eval(|v| solution.get(v)),
                broken.relation,
                broken.rhs
            ))),
        }
    }

    fn read(&self) -> Solution {
        let values = self
            .variables
            .iter()
            .map(|(var, kvar)| (*var, self.solver.get_value(*kvar)))
            .collect();
        Solution { values }
    }

    /// First stacked constraint the solution breaks
    fn violation(&self, solution: &Solution) -> Option<&LinearConstraint> {
        self.constraints()
            .find(|c| !c.holds(|v| solution.get(v), HOLD_TOLERANCE))
    }
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Solution from the constraint solver
#[derive(Debug, Clone)]
pub struct Solution {
    pub values: HashMap<LayoutVariable, f64>,
}

impl Solution {
    /// Get value for a variable; variables never mentioned are 0
    pub fn get(&self, var: LayoutVariable) -> f64 {
        self.values.get(&var).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ge(var: LayoutVariable, value: f64) -> LinearConstraint {
        LinearConstraint::new(
            LinearExpr::new().term(var, 1.0),
            Relation::GreaterOrEqual,
            value,
            ConstraintOrigin::UserDefined,
            format!("{:?} >= {}", var, value),
        )
    }

    fn le(var: LayoutVariable, value: f64) -> LinearConstraint {
        LinearConstraint::new(
            LinearExpr::new().term(var, 1.0),
            Relation::LessOrEqual,
            value,
            ConstraintOrigin::UserDefined,
            format!("{:?} <= {}", var, value),
        )
    }

    #[test]
    fn test_equal_constraint() {
        let mut solver = LinearSolver::new();
        let a = LayoutVariable::x(0);
        let b = LayoutVariable::x(1);

        // a.x = b.x + 20
        solver
            .push(&LinearConstraint::new(
                LinearExpr::new().term(a, 1.0).term(b, -1.0),
                Relation::Equal,
                20.0,
                ConstraintOrigin::UserDefined,
                "a = b + 20",
            ))
            .unwrap();
        solver.prefer(b, 50.0).unwrap();

        let solution = solver.solution().unwrap();
        assert!((solution.get(a) - 70.0).abs() < 0.001);
        assert!((solution.get(b) - 50.0).abs() < 0.001);
    }

    #[test]
    fn test_inequality_beats_preference() {
        let mut solver = LinearSolver::new();
        let x = LayoutVariable::x(0);
        solver.push(&ge(x, 50.0)).unwrap();
        solver.prefer(x, 30.0).unwrap();
        let solution = solver.solution().unwrap();
        assert!(solution.get(x) >= 50.0 - 0.001);
    }

    #[test]
    fn test_conflicting_inequality_rejected() {
        let mut solver = LinearSolver::new();
        let x = LayoutVariable::x(0);
        solver.push(&ge(x, 200.0)).unwrap();

        let result = solver.push(&le(x, 100.0));
        match result.unwrap_err() {
            SolverError::Unsatisfiable { reason } => assert!(reason.contains("conflicts")),
            other => panic!("Expected Unsatisfiable error, got: {:?}", other),
        }
        // The rejected constraint never entered the stack
        assert_eq!(solver.mark(), 1);
    }

    #[test]
    fn test_pop_restores_feasibility() {
        let mut solver = LinearSolver::new();
        let x = LayoutVariable::x(0);
        solver.push(&ge(x, 10.0)).unwrap();
        let mark = solver.mark();
        solver.push(&le(x, 20.0)).unwrap();
        assert!(solver.push(&ge(x, 30.0)).is_err());

        solver.pop_to(mark);
        assert_eq!(solver.mark(), 1);
        solver.push(&ge(x, 30.0)).unwrap();
        solver.prefer(x, 0.0).unwrap();
        assert!(solver.solution().unwrap().get(x) >= 30.0 - 0.001);
    }

    fn before(a: LayoutVariable, b: LayoutVariable, gap: f64) -> LinearConstraint {
        // a + gap <= b
        LinearConstraint::new(
            LinearExpr::new().term(a, 1.0).term(b, -1.0),
            Relation::LessOrEqual,
            -gap,
            ConstraintOrigin::Separation,
            format!("{:?} + {} <= {:?}", a, gap, b),
        )
    }

    #[test]
    fn test_rejections_and_pops_do_not_leak_into_later_cases() {
        let mut solver = LinearSolver::new();
        let x: Vec<LayoutVariable> = (0..3).map(LayoutVariable::x).collect();
        for &v in &x {
            solver.prefer(v, 0.0).unwrap();
            solver.push(&ge(v, 0.0)).unwrap();
            solver.push(&le(v, 100.0)).unwrap();
        }
        let base = solver.mark();

        // 0 < 1 < 2 packs the row exactly; anything more is infeasible
        solver.push(&before(x[0], x[1], 50.0)).unwrap();
        solver.push(&before(x[1], x[2], 50.0)).unwrap();
        assert!(solver.push(&before(x[2], x[0], 50.0)).is_err());
        assert!(solver.push(&le(x[1], 40.0)).is_err());
        let s = solver.solution().unwrap();
        assert!((s.get(x[0]) - 0.0).abs() < 1e-6);
        assert!((s.get(x[1]) - 50.0).abs() < 1e-6);
        assert!((s.get(x[2]) - 100.0).abs() < 1e-6);

        // Reverse order after backtracking is just as tight and feasible
        solver.pop_to(base);
        solver.push(&before(x[2], x[1], 50.0)).unwrap();
        solver.push(&before(x[1], x[0], 50.0)).unwrap();
        assert!(solver.push(&before(x[0], x[2], 50.0)).is_err());
        let s = solver.solution().unwrap();
        assert!((s.get(x[0]) - 100.0).abs() < 1e-6);
        assert!((s.get(x[2]) - 0.0).abs() < 1e-6);

        // A cycle is never accepted, whatever was rejected before
        solver.pop_to(base);
        solver.push(&before(x[0], x[1], 50.0)).unwrap();
        solver.push(&before(x[2], x[1], 50.0)).unwrap();
        assert!(solver.push(&before(x[1], x[0], 50.0)).is_err());
        assert!(solver.push(&before(x[1], x[2], 50.0)).is_err());
        let s = solver.solution().unwrap();
        assert!(solver.constraints().all(|c| c.holds(|v| s.get(v), 1e-6)));
        assert!(solver.rebuilds() > 0);
    }

    #[test]
    fn test_feasible_push_after_rejection_is_accepted() {
        let mut solver = LinearSolver::new();
        let y: Vec<LayoutVariable> = (0..3).map(LayoutVariable::y).collect();
        for &v in &y {
            solver.push(&ge(v, 0.0)).unwrap();
            solver.push(&le(v, 50.0)).unwrap();
        }
        let base = solver.mark();
        solver.push(&before(y[2], y[0], 50.0)).unwrap();
        assert!(solver.push(&before(y[0], y[1], 50.0)).is_err());
        // Same room as y2 below y0, so still feasible after the rejection
        solver.push(&before(y[1], y[0], 50.0)).unwrap();
        let s = solver.solution().unwrap();
        assert!((s.get(y[1]) - 0.0).abs() < 1e-6);
        solver.pop_to(base);

        solver.push(&before(y[1], y[2], 50.0)).unwrap();
        assert!(solver.push(&before(y[2], y[0], 50.0)).is_err());
        solver.push(&before(y[1], y[0], 50.0)).unwrap();
        let s = solver.solution().unwrap();
        assert!((s.get(y[2]) - 50.0).abs() < 1e-6);
        assert!((s.get(y[0]) - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_only_constraint() {
        let mut solver = LinearSolver::new();
        let ok = LinearConstraint::new(
            LinearExpr::new().plus(5.0),
            Relation::LessOrEqual,
            10.0,
            ConstraintOrigin::Canvas,
            "5 <= 10",
        );
        let bad = LinearConstraint::new(
            LinearExpr::new().plus(15.0),
            Relation::LessOrEqual,
            10.0,
            ConstraintOrigin::Canvas,
            "15 <= 10",
        );
        assert!(solver.push(&ok).is_ok());
        assert!(matches!(
            solver.push(&bad),
            Err(SolverError::Unsatisfiable { .. })
        ));
    }
}
