//! UNION: children in order, no deduplication.

use std::collections::VecDeque;

use fedplan_core::term::Solution;

use crate::traits::{OpError, Operator, SolutionStream};

pub struct Concat {
    children: VecDeque<SolutionStream>,
    failed: bool,
}

impl Concat {
    pub fn new(children: Vec<SolutionStream>) -> Self {
        Self {
            children: children.into(),
            failed: false,
        }
    }
}

impl Iterator for Concat {
    type Item = Result<Solution, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some(current) = self.children.front_mut() {
            match current.next() {
                Some(Ok(sol)) => return Some(Ok(sol)),
                Some(Err(e)) => {
                    self.failed = true;
                    self.children.clear();
                    return Some(Err(e));
                }
                None => {
                    self.children.pop_front();
                }
            }
        }
        None
    }
}

impl Operator for Concat {
    fn name(&self) -> &'static str {
        "union_concat"
    }
}
