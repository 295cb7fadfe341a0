//! Pagination state machines.
//!
//! A `PagingStrategy` is configured once per source; it mints a fresh `Pager`
//! for every leaf execution. Pagers start `Active` and reach `Done` exactly
//! once; `Done` is terminal.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use fedplan_core::term::{Solution, Term};
use serde::{Deserialize, Serialize};

use crate::error::{SourceError, SourceResult};
use crate::source::RawResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerState {
    /// More pages may follow.
    Active,
    Done,
}

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    First,
    Offset { offset: usize, limit: usize },
    Token(String),
    /// Absolute URL reported by the previous response.
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number within this leaf execution.
    pub page: usize,
    pub cursor: PageCursor,
    /// Request parameters consumed by the paging scheme.
    pub params: BTreeMap<String, String>,
}

impl PageRequest {
    pub fn first() -> Self {
        Self {
            page: 1,
            cursor: PageCursor::First,
            params: BTreeMap::new(),
        }
    }
}

pub trait Pager: Send {
    fn state(&self) -> PagerState;

    /// Request for the next page, `None` once `Done`.
    fn next_request(&self) -> Option<PageRequest>;

    /// Augment a raw solution with pagination-derived bindings.
    fn apply(&self, solution: Solution) -> Solution {
        solution
    }

    /// Inspect the latest response and advance or finish.
    fn notify_response(&mut self, response: &RawResponse);

    /// A source reported the next endpoint to query; `None` forces `Done`.
    fn notify_response_endpoint(&mut self, endpoint: Option<&str>) -> SourceResult<()> {
        if endpoint.is_none() {
            self.fail();
        }
        Ok(())
    }

    /// Force `Done` (error or cap reached).
    fn fail(&mut self);
}

pub trait PagingStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Request parameter (or variable) names this scheme consumes.
    fn param_names(&self) -> Vec<String>;

    fn create_pager(&self, base_url: &str) -> Box<dyn Pager>;
}

/// Single-page sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPaging;

struct SinglePager {
    state: PagerState,
}

impl Pager for SinglePager {
    fn state(&self) -> PagerState {
        self.state
    }

    fn next_request(&self) -> Option<PageRequest> {
        (self.state == PagerState::Active).then(PageRequest::first)
    }

    fn notify_response(&mut self, _response: &RawResponse) {
        self.state = PagerState::Done;
    }

    fn fail(&mut self) {
        self.state = PagerState::Done;
    }
}

impl PagingStrategy for NoPaging {
    fn name(&self) -> &'static str {
        "none"
    }

    fn param_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn create_pager(&self, _base_url: &str) -> Box<dyn Pager> {
        Box::new(SinglePager {
            state: PagerState::Active,
        })
    }
}

/// Offset/limit pagination. A page shorter than `limit` is the last one.
#[derive(Debug, Clone)]
pub struct OffsetPaging {
    pub limit: usize,
    pub offset_param: String,
    pub limit_param: String,
}

impl OffsetPaging {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            offset_param: "offset".into(),
            limit_param: "limit".into(),
        }
    }
}

struct OffsetPager {
    strategy: OffsetPaging,
    offset: usize,
    page: usize,
    state: PagerState,
}

impl Pager for OffsetPager {
    fn state(&self) -> PagerState {
        self.state
    }

    fn next_request(&self) -> Option<PageRequest> {
        if self.state == PagerState::Done {
            return None;
        }
        let params = BTreeMap::from([
            (self.strategy.offset_param.clone(), self.offset.to_string()),
            (self.strategy.limit_param.clone(), self.strategy.limit.to_string()),
        ]);
        Some(PageRequest {
            page: self.page,
            cursor: PageCursor::Offset {
                offset: self.offset,
                limit: self.strategy.limit,
            },
            params,
        })
    }

    fn notify_response(&mut self, response: &RawResponse) {
        if response.solutions.len() < self.strategy.limit {
            self.state = PagerState::Done;
        } else {
            self.offset += self.strategy.limit;
            self.page += 1;
        }
    }

    fn fail(&mut self) {
        self.state = PagerState::Done;
    }
}

impl PagingStrategy for OffsetPaging {
    fn name(&self) -> &'static str {
        "offset"
    }

    fn param_names(&self) -> Vec<String> {
        vec![self.offset_param.clone(), self.limit_param.clone()]
    }

    fn create_pager(&self, _base_url: &str) -> Box<dyn Pager> {
        Box::new(OffsetPager {
            strategy: self.clone(),
            offset: 0,
            page: 1,
            state: PagerState::Active,
        })
    }
}

/// Continuation-token pagination: follows `next_token` until it is absent.
#[derive(Debug, Clone)]
pub struct TokenPaging {
    pub param: String,
}

struct TokenPager {
    param: String,
    token: Option<String>,
    page: usize,
    state: PagerState,
}

impl Pager for TokenPager {
    fn state(&self) -> PagerState {
        self.state
    }

    fn next_request(&self) -> Option<PageRequest> {
        if self.state == PagerState::Done {
            return None;
        }
        Some(match &self.token {
            None => PageRequest::first(),
            Some(token) => PageRequest {
                page: self.page,
                cursor: PageCursor::Token(token.clone()),
                params: BTreeMap::from([(self.param.clone(), token.clone())]),
            },
        })
    }

    fn notify_response(&mut self, response: &RawResponse) {
        match &response.next_token {
            // A repeated token would loop forever.
            Some(next) if self.token.as_ref() != Some(next) => {
                self.token = Some(next.clone());
                self.page += 1;
            }
            _ => self.state = PagerState::Done,
        }
    }

    fn fail(&mut self) {
        self.state = PagerState::Done;
    }
}

impl PagingStrategy for TokenPaging {
    fn name(&self) -> &'static str {
        "token"
    }

    fn param_names(&self) -> Vec<String> {
        vec![self.param.clone()]
    }

    fn create_pager(&self, _base_url: &str) -> Box<dyn Pager> {
        Box::new(TokenPager {
            param: self.param.clone(),
            token: None,
            page: 1,
            state: PagerState::Active,
        })
    }
}

/// Follows "next" links reported by the source. When `bind_var` is set, every
/// solution gets the URL of the page it came from bound to that variable.
#[derive(Debug, Clone, Default)]
pub struct NextLinkPaging {
    pub bind_var: Option<String>,
}

struct NextLinkPager {
    bind_var: Option<String>,
    current: String,
    visited: BTreeSet<String>,
    page: usize,
    state: PagerState,
}

impl Pager for NextLinkPager {
    fn state(&self) -> PagerState {
        self.state
    }

    fn next_request(&self) -> Option<PageRequest> {
        if self.state == PagerState::Done {
            return None;
        }
        if self.page == 1 {
            return Some(PageRequest::first());
        }
        Some(PageRequest {
            page: self.page,
            cursor: PageCursor::Url(self.current.clone()),
            params: BTreeMap::new(),
        })
    }

    fn apply(&self, mut solution: Solution) -> Solution {
        if let Some(var) = &self.bind_var {
            solution.insert(var.clone(), Term::iri(self.current.clone()));
        }
        solution
    }

    fn notify_response(&mut self, response: &RawResponse) {
        if response.link.is_none() {
            self.state = PagerState::Done;
        }
    }

    fn notify_response_endpoint(&mut self, endpoint: Option<&str>) -> SourceResult<()> {
        let Some(next) = endpoint else {
            self.state = PagerState::Done;
            return Ok(());
        };
        let parsed = url::Url::parse(next)
            .map_err(|e| SourceError::Paging(format!("invalid next link '{next}': {e}")))?;
        let next = parsed.to_string();
        // A link back to a page already fetched would loop forever.
        if !self.visited.insert(next.clone()) {
            self.state = PagerState::Done;
            return Ok(());
        }
        self.current = next;
        self.page += 1;
        Ok(())
    }

    fn fail(&mut self) {
        self.state = PagerState::Done;
    }
}

impl PagingStrategy for NextLinkPaging {
    fn name(&self) -> &'static str {
        "next_link"
    }

    fn param_names(&self) -> Vec<String> {
        self.bind_var.iter().cloned().collect()
    }

    fn create_pager(&self, base_url: &str) -> Box<dyn Pager> {
        let mut visited = BTreeSet::from([base_url.to_string()]);
        if let Ok(parsed) = url::Url::parse(base_url) {
            visited.insert(parsed.to_string());
        }
        Box::new(NextLinkPager {
            bind_var: self.bind_var.clone(),
            current: base_url.to_string(),
            visited,
            page: 1,
            state: PagerState::Active,
        })
    }
}

/// Serialized form of a paging strategy (federation documents).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PagingConfig {
    #[default]
    None,
    Offset {
        limit: usize,
        #[serde(default = "default_offset_param")]
        offset_param: String,
        #[serde(default = "default_limit_param")]
        limit_param: String,
    },
    Token {
        #[serde(default = "default_token_param")]
        param: String,
    },
    NextLink {
        #[serde(default)]
        bind_var: Option<String>,
    },
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_limit_param() -> String {
    "limit".to_string()
}

fn default_token_param() -> String {
    "token".to_string()
}

impl PagingConfig {
    pub fn build(&self) -> SourceResult<Arc<dyn PagingStrategy>> {
        let built: Arc<dyn PagingStrategy> = match self {
            PagingConfig::None => Arc::new(NoPaging),
            PagingConfig::Offset {
                limit,
                offset_param,
                limit_param,
            } => {
                if *limit == 0 {
                    return Err(SourceError::Config("offset paging needs limit > 0".into()));
                }
                Arc::new(OffsetPaging {
                    limit: *limit,
                    offset_param: offset_param.clone(),
                    limit_param: limit_param.clone(),
                })
            }
            PagingConfig::Token { param } => Arc::new(TokenPaging {
                param: param.clone(),
            }),
            PagingConfig::NextLink { bind_var } => Arc::new(NextLinkPaging {
                bind_var: bind_var.clone(),
            }),
        };
        Ok(built)
    }
}
