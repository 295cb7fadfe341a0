//! CARTESIAN: every combination of child solutions.
//!
//! The first child streams; the others are materialized on the first pull and
//! combined once. Combinations whose bindings conflict are dropped, so the
//! result stays correct even when children happen to share a variable.

use fedplan_core::term::Solution;

use crate::traits::{OpError, Operator, SolutionStream};

pub struct CrossProduct {
    head: SolutionStream,
    rest: Option<Vec<SolutionStream>>,
    combos: Vec<Solution>,
    current: Option<Solution>,
    cursor: usize,
    finished: bool,
}

impl CrossProduct {
    pub fn new(mut children: Vec<SolutionStream>) -> Self {
        let head: SolutionStream = if children.is_empty() {
            Box::new(std::iter::empty())
        } else {
            children.remove(0)
        };
        Self {
            head,
            rest: Some(children),
            combos: Vec::new(),
            current: None,
            cursor: 0,
            finished: false,
        }
    }

    fn prepare(&mut self) -> Result<(), OpError> {
        let Some(rest) = self.rest.take() else {
            return Ok(());
        };
        let mut combos = vec![Solution::new()];
        for child in rest {
            let rows: Vec<Solution> = child.collect::<Result<_, _>>()?;
            combos = combos
                .iter()
                .flat_map(|acc| {
                    rows.iter()
                        .filter(|row| acc.compatible(row))
                        .map(|row| acc.merge(row))
                        .collect::<Vec<_>>()
                })
                .collect();
            if combos.is_empty() {
                break;
            }
        }
        self.combos = combos;
        Ok(())
    }
}

impl Iterator for CrossProduct {
    type Item = Result<Solution, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Err(e) = self.prepare() {
            self.finished = true;
            return Some(Err(e));
        }
        if self.combos.is_empty() {
            self.finished = true;
            return None;
        }
        loop {
            if let Some(head) = &self.current {
                while self.cursor < self.combos.len() {
                    let combo = &self.combos[self.cursor];
                    self.cursor += 1;
                    if head.compatible(combo) {
                        return Some(Ok(head.merge(combo)));
                    }
                }
            }
            match self.head.next() {
                Some(Ok(sol)) => {
                    self.current = Some(sol);
                    self.cursor = 0;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

impl Operator for CrossProduct {
    fn name(&self) -> &'static str {
        "cartesian_product"
    }
}
