//! In-memory source for tests and local runs.
//!
//! Holds a flat list of triples and evaluates fragments by backtracking
//! pattern matching. Serves every page cursor kind so each paging strategy can
//! be exercised without a network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fedplan_core::endpoint::EndpointDescriptor;
use fedplan_core::query::{CQuery, PatternTerm, TriplePattern};
use fedplan_core::term::{Solution, Term};

use crate::error::{SourceError, SourceResult};
use crate::pager::{NoPaging, PageCursor, PageRequest, PagingStrategy};
use crate::rate_limit::{NoRateLimit, RateLimit};
use crate::source::{PageLink, RawResponse, Source};

const START_PARAM: &str = "start";

#[derive(Debug)]
pub struct MemorySource {
    descriptor: EndpointDescriptor,
    triples: Vec<[Term; 3]>,
    paging: Arc<dyn PagingStrategy>,
    gate: Arc<dyn RateLimit>,
    /// Page size for token and next-link cursors; `None` serves everything.
    page_size: Option<usize>,
    fetches: AtomicUsize,
    /// 1-based fetch number → injected failure.
    failures: Mutex<BTreeMap<usize, SourceError>>,
}

impl MemorySource {
    pub fn new(descriptor: EndpointDescriptor) -> Self {
        Self {
            descriptor,
            triples: Vec::new(),
            paging: Arc::new(NoPaging),
            gate: Arc::new(NoRateLimit),
            page_size: None,
            fetches: AtomicUsize::new(0),
            failures: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_triple(mut self, s: Term, p: Term, o: Term) -> Self {
        self.triples.push([s, p, o]);
        self
    }

    pub fn with_triples(mut self, triples: impl IntoIterator<Item = [Term; 3]>) -> Self {
        self.triples.extend(triples);
        self
    }

    pub fn with_paging(mut self, paging: Arc<dyn PagingStrategy>) -> Self {
        self.paging = paging;
        self
    }

    pub fn with_rate_limit(mut self, gate: Arc<dyn RateLimit>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Make the `n`th fetch (1-based) fail with `error`.
    pub fn fail_on_fetch(self, n: usize, error: SourceError) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(n, error);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn triple_count(&self) -> usize {
        self.triples.len()
    }

    /// All solutions of `fragment`, in triple insertion order.
    pub fn evaluate(&self, fragment: &CQuery) -> Vec<Solution> {
        let mut out = Vec::new();
        self.extend(fragment.patterns(), Solution::new(), &mut out);
        out.retain(|sol| {
            fragment.declared().iter().all(|(var, ty)| {
                sol.get(var)
                    .map_or(true, |term| ty.compatible(term.term_type()))
            })
        });
        out
    }

    fn extend(&self, patterns: &[TriplePattern], partial: Solution, out: &mut Vec<Solution>) {
        let Some((first, rest)) = patterns.split_first() else {
            out.push(partial);
            return;
        };
        for triple in &self.triples {
            if let Some(next) = bind(first, triple, &partial) {
                self.extend(rest, next, out);
            }
        }
    }

    fn window(&self, all: &[Solution], start: usize) -> (Vec<Solution>, Option<usize>) {
        let start = start.min(all.len());
        let end = match self.page_size {
            Some(size) => (start + size).min(all.len()),
            None => all.len(),
        };
        let next = (end < all.len()).then_some(end);
        (all[start..end].to_vec(), next)
    }

    fn page_url(&self, start: usize) -> SourceResult<String> {
        let mut url = url::Url::parse(&self.descriptor.url).map_err(|e| {
            SourceError::transport(&self.descriptor.name, format!("bad endpoint url: {e}"))
        })?;
        url.query_pairs_mut()
            .clear()
            .append_pair(START_PARAM, &start.to_string());
        Ok(url.to_string())
    }

    fn linked_page(&self, all: &[Solution], start: usize) -> SourceResult<RawResponse> {
        let (page, next) = self.window(all, start);
        let link = match next {
            Some(n) => PageLink::Next(self.page_url(n)?),
            None => PageLink::Last,
        };
        Ok(RawResponse::new(page).with_link(link))
    }
}

fn bind(pattern: &TriplePattern, triple: &[Term; 3], partial: &Solution) -> Option<Solution> {
    let mut sol = partial.clone();
    for (pt, term) in pattern.terms().into_iter().zip(triple.iter()) {
        match pt {
            PatternTerm::Const(c) => {
                if c != term {
                    return None;
                }
            }
            PatternTerm::Var(v) => match sol.get(v) {
                Some(bound) if bound != term => return None,
                Some(_) => {}
                None => {
                    sol.insert(v.clone(), term.clone());
                }
            },
        }
    }
    Some(sol)
}

fn parse_start(endpoint: &str, raw: &str) -> SourceResult<usize> {
    raw.parse()
        .map_err(|_| SourceError::transport(endpoint, format!("bad page cursor '{raw}'")))
}

impl Source for MemorySource {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    fn paging(&self) -> &dyn PagingStrategy {
        self.paging.as_ref()
    }

    fn rate_limit(&self) -> &dyn RateLimit {
        self.gate.as_ref()
    }

    fn fetch(&self, fragment: &CQuery, request: &PageRequest) -> SourceResult<RawResponse> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&n);
        if let Some(err) = injected {
            return Err(err);
        }

        let name = &self.descriptor.name;
        let all = self.evaluate(fragment);
        match &request.cursor {
            PageCursor::Offset { offset, limit } => {
                let start = (*offset).min(all.len());
                let end = (start + limit).min(all.len());
                Ok(RawResponse::new(all[start..end].to_vec()))
            }
            PageCursor::Token(token) => {
                let (page, next) = self.window(&all, parse_start(name, token)?);
                Ok(with_token(page, next))
            }
            PageCursor::Url(link) => {
                let url = url::Url::parse(link)
                    .map_err(|e| SourceError::transport(name, format!("bad link: {e}")))?;
                let start = url
                    .query_pairs()
                    .find(|(k, _)| k == START_PARAM)
                    .map(|(_, v)| parse_start(name, &v))
                    .transpose()?
                    .unwrap_or(0);
                self.linked_page(&all, start)
            }
            PageCursor::First => match self.paging.name() {
                "token" => {
                    let (page, next) = self.window(&all, 0);
                    Ok(with_token(page, next))
                }
                "next_link" => self.linked_page(&all, 0),
                _ => Ok(RawResponse::new(all)),
            },
        }
    }
}

fn with_token(page: Vec<Solution>, next: Option<usize>) -> RawResponse {
    let response = RawResponse::new(page);
    match next {
        Some(n) => response.with_token(n.to_string()),
        None => response,
    }
}
