//! This module contains [`BoundedSolver`], a reference solver that searches for
//! a model by enumerating small values.
//!
//! It is complete only within its domain: a constraint set whose solutions all
//! lie outside the domain is reported unsatisfiable. That makes it suitable
//! for tests and for programs whose branches turn on small constants.

use std::collections::HashMap;

use crate::{
    constant::{DEFAULT_SOLVER_DOMAIN_MAX, DEFAULT_SOLVER_DOMAIN_MIN, DEFAULT_SOLVER_EVALUATION_BUDGET},
    error::solver::{Error, Result},
    solver::{SolverManager, SolverStatistics},
    vm::value::{Assignment, Constraint, Kind, Primitive, Variable},
};

/// A solver that enumerates the values of an integer interval (plus a few
/// special floating-point values) for every variable, with backtracking.
#[derive(Clone, Debug)]
pub struct BoundedSolver {
    constraints: Vec<Constraint>,
    model:       Option<Assignment>,
    min:         i64,
    max:         i64,
    budget:      usize,
    statistics:  SolverStatistics,
}

impl BoundedSolver {
    /// Creates a solver with the default domain and evaluation budget.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constraints: vec![],
            model:       None,
            min:         DEFAULT_SOLVER_DOMAIN_MIN,
            max:         DEFAULT_SOLVER_DOMAIN_MAX,
            budget:      DEFAULT_SOLVER_EVALUATION_BUDGET,
            statistics:  SolverStatistics::default(),
        }
    }

    /// Sets the interval of integers the solver enumerates.
    #[must_use]
    pub fn with_domain(mut self, min: i64, max: i64) -> Self {
        self.min = min.min(max);
        self.max = max.max(min);
        self
    }

    /// Sets the number of constraint evaluations after which a query times
    /// out.
    #[must_use]
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Gets the candidate values for a variable of `kind`: the integers of the
    /// domain ordered by distance from zero, positive first.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn candidates(&self, kind: Kind) -> Vec<Primitive> {
        let mut integers = vec![];
        if (self.min..=self.max).contains(&0) {
            integers.push(0);
        }
        for magnitude in 1..=self.max.max(-self.min) {
            if magnitude <= self.max {
                integers.push(magnitude);
            }
            if -magnitude >= self.min {
                integers.push(-magnitude);
            }
        }

        let mut values: Vec<Primitive> = integers
            .into_iter()
            .filter_map(|i| match kind {
                Kind::Int => i32::try_from(i).ok().map(Primitive::Int),
                Kind::Long => Some(Primitive::Long(i)),
                Kind::Float => Some(Primitive::Float(i as f32)),
                Kind::Double => Some(Primitive::Double(i as f64)),
            })
            .collect();
        match kind {
            Kind::Float => values.extend(
                [0.5, -0.5, f32::INFINITY, f32::NEG_INFINITY, f32::NAN].map(Primitive::Float),
            ),
            Kind::Double => values.extend(
                [0.5, -0.5, f64::INFINITY, f64::NEG_INFINITY, f64::NAN].map(Primitive::Double),
            ),
            Kind::Int | Kind::Long => (),
        }
        values
    }

    /// Searches for a model of the asserted constraints.
    fn search(&mut self) -> Result<Option<Assignment>> {
        let mut variables: Vec<Variable> = vec![];
        let mut positions: HashMap<Variable, usize> = HashMap::new();
        for constraint in &self.constraints {
            for variable in constraint.variables() {
                if !positions.contains_key(&variable) {
                    positions.insert(variable.clone(), variables.len());
                    variables.push(variable);
                }
            }
        }

        // Each constraint is checked as soon as its last variable is assigned.
        let mut checks: Vec<Vec<&Constraint>> = vec![vec![]; variables.len()];
        let mut evaluations = 0;
        for constraint in &self.constraints {
            let last = constraint.variables().iter().filter_map(|v| positions.get(v)).max().copied();
            match last {
                Some(last) => checks[last].push(constraint),
                None => {
                    evaluations += 1;
                    if !constraint.evaluate(&Assignment::new()).unwrap_or(false) {
                        self.statistics.evaluations += evaluations;
                        return Ok(None);
                    }
                }
            }
        }

        let domains: Vec<Vec<Primitive>> = variables.iter().map(|v| self.candidates(v.kind())).collect();
        let mut cursor = vec![0_usize; variables.len()];
        let mut assignment = Assignment::new();
        let mut depth = 0;
        let found = loop {
            if depth == variables.len() {
                break true;
            }
            if cursor[depth] == domains[depth].len() {
                // Exhausted this variable: step back to the previous one.
                cursor[depth] = 0;
                assignment.unbind(&variables[depth]);
                if depth == 0 {
                    break false;
                }
                depth -= 1;
                cursor[depth] += 1;
                continue;
            }

            assignment.bind(variables[depth].clone(), domains[depth][cursor[depth]]);
            let mut consistent = true;
            for constraint in &checks[depth] {
                evaluations += 1;
                if evaluations > self.budget {
                    self.statistics.evaluations += evaluations;
                    return Err(Error::Timeout { evaluations });
                }
                if !constraint.evaluate(&assignment).unwrap_or(false) {
                    consistent = false;
                    break;
                }
            }
            if consistent {
                depth += 1;
            } else {
                cursor[depth] += 1;
            }
        };

        self.statistics.evaluations += evaluations;
        Ok(found.then_some(assignment))
    }

    /// Checks if the cached model still satisfies every constraint.
    fn model_holds(&self) -> bool {
        self.model.as_ref().is_some_and(|model| {
            self.constraints.iter().all(|c| {
                c.variables().iter().all(|v| model.get(v).is_some())
                    && c.evaluate(model).unwrap_or(false)
            })
        })
    }
}

impl Default for BoundedSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverManager for BoundedSolver {
    fn add_constraint(&mut self, constraint: Constraint) -> Result<()> {
        self.constraints.push(constraint);
        Ok(())
    }

    fn level(&self) -> usize {
        self.constraints.len()
    }

    fn reset_to(&mut self, level: usize) -> Result<()> {
        if level > self.constraints.len() {
            return Err(Error::InvalidLevel {
                requested: level,
                current:   self.constraints.len(),
            });
        }
        self.constraints.truncate(level);
        Ok(())
    }

    fn is_satisfiable(&mut self) -> Result<bool> {
        self.statistics.queries += 1;
        if self.model_holds() {
            self.statistics.satisfiable += 1;
            return Ok(true);
        }

        match self.search() {
            Ok(model) => {
                let satisfiable = model.is_some();
                if satisfiable {
                    self.statistics.satisfiable += 1;
                } else {
                    self.statistics.unsatisfiable += 1;
                }
                self.model = model;
                Ok(satisfiable)
            }
            Err(error) => {
                self.statistics.errors += 1;
                Err(error)
            }
        }
    }

    fn solution(&mut self, variables: &[Variable]) -> Result<Assignment> {
        if !self.model_holds() && !self.is_satisfiable()? {
            return Err(Error::Unavailable("the constraints are unsatisfiable".to_string()));
        }

        let mut witness = Assignment::new();
        for variable in variables {
            let value = self
                .model
                .as_ref()
                .and_then(|model| model.get(variable))
                .unwrap_or_else(|| variable.kind().zero());
            witness.bind(variable.clone(), value);
        }
        Ok(witness)
    }

    fn reset_counters(&mut self) {
        self.statistics = SolverStatistics::default();
    }

    fn statistics(&self) -> SolverStatistics {
        self.statistics
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::solver::Error,
        solver::{BoundedSolver, SolverManager},
        vm::value::{BinaryOp, Comparison, Constraint, Kind, Primitive, Term, Variable},
    };

    fn compare(comparison: Comparison, left: Term, right: i32) -> Constraint {
        Constraint::compare(comparison, left, Term::from(Primitive::Int(right)))
    }

    #[test]
    fn finds_models_within_the_domain() -> anyhow::Result<()> {
        let x = Variable::fresh("x", Kind::Int);
        let mut solver = BoundedSolver::new();
        solver.add_constraint(compare(Comparison::Gt, Term::variable(x.clone()), 3))?;
        solver.add_constraint(compare(Comparison::Lt, Term::variable(x.clone()), 6))?;
        assert!(solver.is_satisfiable()?);

        let witness = solver.solution(&[x.clone()])?;
        assert_eq!(witness.get(&x), Some(Primitive::Int(4)));

        Ok(())
    }

    #[test]
    fn resetting_drops_later_constraints() -> anyhow::Result<()> {
        let x = Variable::fresh("x", Kind::Int);
        let mut solver = BoundedSolver::new();
        let level = solver.level();
        solver.add_constraint(compare(Comparison::Eq, Term::variable(x.clone()), 1))?;
        solver.add_constraint(compare(Comparison::Eq, Term::variable(x.clone()), 2))?;
        assert!(!solver.is_satisfiable()?);

        solver.reset_to(level + 1)?;
        assert!(solver.is_satisfiable()?);
        assert_eq!(
            solver.reset_to(5).expect_err("Reset above the current level"),
            Error::InvalidLevel {
                requested: 5,
                current:   1,
            }
        );

        Ok(())
    }

    #[test]
    fn free_variables_default_to_zero() -> anyhow::Result<()> {
        let y = Variable::fresh("y", Kind::Double);
        let mut solver = BoundedSolver::new();
        let witness = solver.solution(&[y.clone()])?;
        assert_eq!(witness.get(&y), Some(Primitive::Double(0.0)));

        Ok(())
    }

    #[test]
    fn relates_several_variables() -> anyhow::Result<()> {
        let a = Variable::fresh("a", Kind::Int);
        let b = Variable::fresh("b", Kind::Int);
        let sum = Term::binary(BinaryOp::Add, Term::variable(a.clone()), Term::variable(b.clone()))?;
        let mut solver = BoundedSolver::new();
        solver.add_constraint(compare(Comparison::Eq, sum, 7))?;
        solver.add_constraint(compare(Comparison::Lt, Term::variable(a.clone()), 0))?;

        let witness = solver.solution(&[a.clone(), b.clone()])?;
        let (a, b) = (witness.get(&a), witness.get(&b));
        assert!(matches!((a, b), (Some(Primitive::Int(a)), Some(Primitive::Int(b))) if a + b == 7 && a < 0));

        Ok(())
    }

    #[test]
    fn runs_out_of_budget() -> anyhow::Result<()> {
        let variables: Vec<Variable> = (0..4).map(|i| Variable::fresh(format!("v{i}"), Kind::Int)).collect();
        let mut solver = BoundedSolver::new().with_budget(10);
        let mut sum = Term::variable(variables[0].clone());
        for variable in &variables[1..] {
            sum = Term::binary(BinaryOp::Add, sum, Term::variable(variable.clone()))?;
        }
        solver.add_constraint(compare(Comparison::Eq, sum, 1000))?;

        let error = solver.is_satisfiable().expect_err("Did not time out");
        assert!(matches!(error, Error::Timeout { .. }));
        assert_eq!(solver.statistics().errors, 1);

        Ok(())
    }
}
