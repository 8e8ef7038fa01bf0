//! Solver interface: opaque request/response surface to an SMT back-end.
//!
//! The crate ships no back-end. Implementations are selected at driver
//! startup and plugged in through the `Solver` trait; the interface encodes
//! path conditions and form restrictions into a canonical query text
//! (`encode`) and parses solutions into injection maps.

pub mod encode;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::expr::ExprRef;
use crate::forms::{FormRestrictions, InjectionMap};
use crate::reordering::ReorderingInfo;
use crate::tree::path::PathCondition;

/// The back-ends a deployment can select. Carried for the configuration
/// boundary; the trait below is identical across all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SolverBackend {
    #[default]
    Z3Str,
    Cvc4,
    Kaluza,
}

/// Outcome of one solver call. Non-SAT outcomes are normal control flow, not
/// errors: each advances the frontier entry's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Solution {
    Sat { assignment: InjectionMap },
    Unsat,
    Unknown,
    SolverFailure,
}

/// One query: the (already negated) path condition plus everything the
/// solver needs to keep its answer admissible.
#[derive(Debug, Clone, Default)]
pub struct SolverQuery {
    pub path_condition: PathCondition,
    pub restrictions: FormRestrictions,
    /// Serialized DOM snapshot, for back-ends that resolve DOM-dependent
    /// constraints. Opaque to the core.
    pub dom_snapshot: Option<String>,
    /// Extra guards known to hold on every path that can reach the target.
    pub reachable_constraints: Vec<(ExprRef, bool)>,
    /// Present in reordering mode; lets the back-end answer per action
    /// position.
    pub reordering: Option<ReorderingInfo>,
}

impl SolverQuery {
    pub fn new(path_condition: PathCondition, restrictions: FormRestrictions) -> Self {
        SolverQuery {
            path_condition,
            restrictions,
            ..SolverQuery::default()
        }
    }

    /// Canonical textual form of the query, used both as the wire format for
    /// text-based back-ends and as the cache key. Fails on constructs no
    /// back-end supports.
    pub fn canonical_key(&self) -> Result<String, encode::EncodeError> {
        encode::encode_query(self)
    }
}

pub trait Solver {
    fn name(&self) -> &'static str;

    /// Solve one query. Implementations are deterministic with respect to
    /// their input and must map a wall-clock timeout to `Solution::Unknown`,
    /// never to an error.
    fn solve(&mut self, query: &SolverQuery) -> Result<Solution, EngineError>;
}

/// Memoizing wrapper around any back-end, keyed by the canonical query text.
/// Queries the encoder rejects are answered `Unknown` without reaching the
/// back-end.
pub struct CachingSolver<S: Solver> {
    inner: S,
    cache: HashMap<String, Solution>,
}

impl<S: Solver> CachingSolver<S> {
    pub fn new(inner: S) -> Self {
        CachingSolver {
            inner,
            cache: HashMap::new(),
        }
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }
}

impl<S: Solver> Solver for CachingSolver<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn solve(&mut self, query: &SolverQuery) -> Result<Solution, EngineError> {
        let key = match query.canonical_key() {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!(error = %e, "query not encodable, answering unknown");
                return Ok(Solution::Unknown);
            }
        };
        if let Some(solution) = self.cache.get(&key) {
            tracing::debug!(solver = self.name(), "solver cache hit");
            return Ok(solution.clone());
        }
        let solution = self.inner.solve(query)?;
        self.cache.insert(key, solution.clone());
        Ok(solution)
    }
}
