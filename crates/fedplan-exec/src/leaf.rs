//! QUERY leaf execution: drive one pager against one source.
//!
//! Every fetch goes through the source's rate limit gate. Solutions of a page
//! are passed through `Pager::apply` before the pager sees the response, so
//! pagination-derived bindings refer to the page they came from.
//!
//! Failure policy:
//! - a failed fetch of page 1 is emitted as an error and ends the stream,
//! - a later failure (fetch or pager) ends the leaf with its partial results,
//!   unless strict paging is on, in which case the error follows the partial
//!   results.

use std::collections::VecDeque;
use std::sync::Arc;

use fedplan_core::query::CQuery;
use fedplan_core::term::Solution;
use fedplan_operators::OpError;
use fedplan_source::{Pager, PagerState, Source, SourceError};

use crate::metrics::ExecMetrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafOptions {
    pub strict_paging: bool,
    pub max_pages: Option<usize>,
}

pub struct LeafStream {
    source: Arc<dyn Source>,
    fragment: CQuery,
    pager: Option<Box<dyn Pager>>,
    buffer: VecDeque<Solution>,
    pending_error: Option<OpError>,
    pages: usize,
    options: LeafOptions,
    metrics: Arc<ExecMetrics>,
}

impl LeafStream {
    pub fn new(
        source: Arc<dyn Source>,
        fragment: CQuery,
        options: LeafOptions,
        metrics: Arc<ExecMetrics>,
    ) -> Self {
        let pager = source.paging().create_pager(&source.descriptor().url);
        Self {
            source,
            fragment,
            pager: Some(pager),
            buffer: VecDeque::new(),
            pending_error: None,
            pages: 0,
            options,
            metrics,
        }
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn release(&mut self) {
        self.pager = None;
    }

    fn fetch_next(&mut self) {
        let Some(pager) = self.pager.as_mut() else {
            return;
        };
        if pager.state() == PagerState::Done {
            self.release();
            return;
        }
        if let Some(max) = self.options.max_pages {
            if self.pages >= max {
                tracing::warn!(
                    source = %self.source.name(),
                    pages = self.pages,
                    "page cap reached, leaf truncated"
                );
                pager.fail();
                self.metrics.leaf_truncated();
                self.release();
                return;
            }
        }
        let Some(request) = pager.next_request() else {
            self.release();
            return;
        };

        let source = Arc::clone(&self.source);
        let fragment = &self.fragment;
        let result = source
            .rate_limit()
            .request(&mut || source.fetch(fragment, &request));
        self.pages += 1;
        self.metrics.page_fetched();

        let response = match result {
            Ok(response) => response,
            Err(e) if request.page == 1 => {
                tracing::warn!(source = %source.name(), error = %e, "first page failed");
                self.metrics.leaf_failed();
                self.pending_error = Some(OpError::Source(e));
                self.release();
                return;
            }
            Err(e) => return self.page_failure(request.page, e),
        };

        self.buffer
            .extend(response.solutions.iter().cloned().map(|s| pager.apply(s)));
        pager.notify_response(&response);
        if let Some(link) = &response.link {
            if let Err(e) = pager.notify_response_endpoint(link.next()) {
                self.page_failure(request.page, e);
            }
        }
    }

    fn page_failure(&mut self, page: usize, error: SourceError) {
        if let Some(pager) = self.pager.as_mut() {
            pager.fail();
        }
        self.release();
        if self.options.strict_paging {
            tracing::warn!(source = %self.source.name(), page, error = %error, "paging failed");
            self.metrics.leaf_failed();
            self.pending_error = Some(OpError::Source(error));
        } else {
            tracing::warn!(
                source = %self.source.name(),
                page,
                error = %error,
                "paging failed, returning partial results"
            );
            self.metrics.leaf_truncated();
        }
    }
}

impl Iterator for LeafStream {
    type Item = Result<Solution, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(sol) = self.buffer.pop_front() {
                return Some(Ok(sol));
            }
            if let Some(e) = self.pending_error.take() {
                return Some(Err(e));
            }
            if self.pager.is_none() {
                return None;
            }
            self.fetch_next();
        }
    }
}

impl fedplan_operators::Operator for LeafStream {
    fn name(&self) -> &'static str {
        "leaf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedplan_core::endpoint::EndpointDescriptor;
    use fedplan_core::id::EndpointId;
    use fedplan_core::query::{PatternTerm, TriplePattern};
    use fedplan_core::term::Term;
    use fedplan_source::{MemorySource, OffsetPaging};

    fn source(rows: usize) -> MemorySource {
        let mut src = MemorySource::new(EndpointDescriptor::new(
            EndpointId::new(1),
            "people",
            "http://people.example/sparql",
        ))
        .with_paging(Arc::new(OffsetPaging::new(2)));
        for i in 0..rows {
            src = src.with_triple(
                Term::iri(format!("http://ex/p{i}")),
                Term::iri("http://ex/name"),
                Term::literal(format!("n{i}")),
            );
        }
        src
    }

    fn fragment() -> CQuery {
        CQuery::new(vec![TriplePattern::new(
            PatternTerm::var("x"),
            PatternTerm::Const(Term::iri("http://ex/name")),
            PatternTerm::var("n"),
        )])
    }

    fn collect(stream: LeafStream) -> (Vec<Solution>, Option<OpError>) {
        let mut out = Vec::new();
        for item in stream {
            match item {
                Ok(s) => out.push(s),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[test]
    fn pages_until_short_page() {
        let metrics = Arc::new(ExecMetrics::default());
        let stream = LeafStream::new(
            Arc::new(source(5)),
            fragment(),
            LeafOptions::default(),
            Arc::clone(&metrics),
        );
        let (rows, err) = collect(stream);
        assert!(err.is_none());
        assert_eq!(rows.len(), 5);
        assert_eq!(metrics.snapshot().pages_fetched, 3);
    }

    #[test]
    fn page_cap_truncates() {
        let metrics = Arc::new(ExecMetrics::default());
        let stream = LeafStream::new(
            Arc::new(source(5)),
            fragment(),
            LeafOptions {
                strict_paging: false,
                max_pages: Some(1),
            },
            Arc::clone(&metrics),
        );
        let (rows, err) = collect(stream);
        assert!(err.is_none());
        assert_eq!(rows.len(), 2);
        assert_eq!(metrics.snapshot().truncated_leaves, 1);
    }

    #[test]
    fn first_page_failure_is_an_error() {
        let src = source(5).fail_on_fetch(1, SourceError::transport("people", "refused"));
        let stream = LeafStream::new(
            Arc::new(src),
            fragment(),
            LeafOptions::default(),
            Arc::new(ExecMetrics::default()),
        );
        let (rows, err) = collect(stream);
        assert!(rows.is_empty());
        assert!(matches!(err, Some(OpError::Source(_))));
    }

    #[test]
    fn later_failure_keeps_partial_results_unless_strict() {
        let lenient = LeafStream::new(
            Arc::new(source(5).fail_on_fetch(2, SourceError::transport("people", "reset"))),
            fragment(),
            LeafOptions::default(),
            Arc::new(ExecMetrics::default()),
        );
        let (rows, err) = collect(lenient);
        assert_eq!(rows.len(), 2);
        assert!(err.is_none());

        let strict = LeafStream::new(
            Arc::new(source(5).fail_on_fetch(2, SourceError::transport("people", "reset"))),
            fragment(),
            LeafOptions {
                strict_paging: true,
                max_pages: None,
            },
            Arc::new(ExecMetrics::default()),
        );
        let (rows, err) = collect(strict);
        assert_eq!(rows.len(), 2);
        assert!(err.is_some());
    }
}
