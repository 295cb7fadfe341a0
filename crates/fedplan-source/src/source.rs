//! The contract every remote source client implements.

use fedplan_core::endpoint::EndpointDescriptor;
use fedplan_core::query::CQuery;
use fedplan_core::term::Solution;

use crate::error::SourceResult;
use crate::pager::{PageRequest, PagingStrategy};
use crate::rate_limit::RateLimit;

/// Link information reported alongside a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLink {
    Next(String),
    /// The source explicitly reported there is no next page.
    Last,
}

impl PageLink {
    pub fn next(&self) -> Option<&str> {
        match self {
            PageLink::Next(url) => Some(url),
            PageLink::Last => None,
        }
    }
}

/// One page of results as the source returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub solutions: Vec<Solution>,
    pub next_token: Option<String>,
    pub link: Option<PageLink>,
}

impl RawResponse {
    pub fn new(solutions: Vec<Solution>) -> Self {
        Self {
            solutions,
            next_token: None,
            link: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }

    pub fn with_link(mut self, link: PageLink) -> Self {
        self.link = Some(link);
        self
    }
}

/// A queryable remote source. Implementations own exactly one gate; callers
/// must route every `fetch` through `rate_limit().request(..)`.
pub trait Source: Send + Sync {
    fn descriptor(&self) -> &EndpointDescriptor;

    fn paging(&self) -> &dyn PagingStrategy;

    fn rate_limit(&self) -> &dyn RateLimit;

    /// Fetch one page of solutions for `fragment`.
    fn fetch(&self, fragment: &CQuery, request: &PageRequest) -> SourceResult<RawResponse>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}
