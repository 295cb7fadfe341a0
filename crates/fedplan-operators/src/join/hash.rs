//! Hash join over two solution streams.
//!
//! The build side is drained into a hash table on the first pull; the probe
//! side streams. Solutions from either side may leave a shared variable
//! unbound (e.g. below a UNION), so rows without a full key are kept in a
//! separate list and every candidate pair is checked with
//! `Solution::compatible` before merging.

use std::collections::{HashMap, VecDeque};

use fedplan_core::term::{Solution, Term};

use crate::traits::{OpError, Operator, SolutionStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildSide {
    Left,
    #[default]
    Right,
}

#[derive(Default)]
struct BuildTable {
    rows: Vec<Solution>,
    keyed: HashMap<Vec<Term>, Vec<usize>>,
    /// Rows missing at least one key variable.
    loose: Vec<usize>,
}

impl BuildTable {
    fn insert(&mut self, key_vars: &[String], sol: Solution) {
        let idx = self.rows.len();
        match sol.key(key_vars) {
            Some(key) => self.keyed.entry(key).or_default().push(idx),
            None => self.loose.push(idx),
        }
        self.rows.push(sol);
    }

    /// Candidate build rows for `probe`, in build insertion order.
    fn candidates(&self, key_vars: &[String], probe: &Solution) -> Vec<usize> {
        match probe.key(key_vars) {
            Some(key) => {
                let mut out: Vec<usize> = self
                    .keyed
                    .get(&key)
                    .map(|v| v.to_vec())
                    .unwrap_or_default();
                if !self.loose.is_empty() {
                    out.extend(&self.loose);
                    out.sort_unstable();
                }
                out
            }
            None => (0..self.rows.len()).collect(),
        }
    }
}

pub struct HashJoin {
    probe: SolutionStream,
    build: Option<SolutionStream>,
    side: BuildSide,
    key_vars: Vec<String>,
    table: BuildTable,
    pending: VecDeque<Solution>,
    finished: bool,
}

impl HashJoin {
    /// Join `left` and `right` on `key_vars` (the variables both sides may bind).
    pub fn new(
        left: SolutionStream,
        right: SolutionStream,
        key_vars: Vec<String>,
        side: BuildSide,
    ) -> Self {
        let (probe, build) = match side {
            BuildSide::Right => (left, right),
            BuildSide::Left => (right, left),
        };
        Self {
            probe,
            build: Some(build),
            side,
            key_vars,
            table: BuildTable::default(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn fill(&mut self) -> Result<(), OpError> {
        if let Some(build) = self.build.take() {
            for sol in build {
                self.table.insert(&self.key_vars, sol?);
            }
        }
        Ok(())
    }

    fn fail(&mut self, err: OpError) -> Option<Result<Solution, OpError>> {
        self.finished = true;
        self.pending.clear();
        Some(Err(err))
    }
}

impl Iterator for HashJoin {
    type Item = Result<Solution, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Err(e) = self.fill() {
            return self.fail(e);
        }
        loop {
            if let Some(sol) = self.pending.pop_front() {
                return Some(Ok(sol));
            }
            let probe = match self.probe.next() {
                Some(Ok(sol)) => sol,
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.finished = true;
                    return None;
                }
            };
            for idx in self.table.candidates(&self.key_vars, &probe) {
                let built = &self.table.rows[idx];
                if probe.compatible(built) {
                    self.pending.push_back(probe.merge(built));
                }
            }
        }
    }
}

impl Operator for HashJoin {
    fn name(&self) -> &'static str {
        "join_hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedplan_source::SourceError;

    fn stream(rows: Vec<Solution>) -> SolutionStream {
        Box::new(rows.into_iter().map(Ok))
    }

    fn sol(pairs: &[(&str, &str)]) -> Solution {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Term::iri(*v)))
            .collect()
    }

    #[test]
    fn joins_on_shared_key() {
        let left = stream(vec![sol(&[("x", "a"), ("y", "1")]), sol(&[("x", "b"), ("y", "2")])]);
        let right = stream(vec![sol(&[("y", "2"), ("z", "q")]), sol(&[("y", "3"), ("z", "r")])]);
        let out: Vec<_> = HashJoin::new(left, right, vec!["y".into()], BuildSide::Right)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out, vec![sol(&[("x", "b"), ("y", "2"), ("z", "q")])]);
    }

    #[test]
    fn unbound_key_rows_still_match() {
        let left = stream(vec![sol(&[("x", "a")])]);
        let right = stream(vec![sol(&[("x", "a"), ("y", "1")]), sol(&[("y", "2")])]);
        let out: Vec<_> = HashJoin::new(left, right, vec!["x".into()], BuildSide::Left)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn build_error_is_emitted_once() {
        let left = stream(vec![sol(&[("x", "a")])]);
        let right: SolutionStream = Box::new(
            vec![Err(OpError::Source(SourceError::transport("r", "boom")))].into_iter(),
        );
        let mut join = HashJoin::new(left, right, vec!["x".into()], BuildSide::Right);
        assert!(matches!(join.next(), Some(Err(OpError::Source(_)))));
        assert!(join.next().is_none());
    }
}
