//! Remote source access: the `Source` contract, pagination state machines, and
//! rate limit gates.
//!
//! Everything here is synchronous. A gate is the only shared mutable resource;
//! pagers are created per leaf execution and never shared.

#![forbid(unsafe_code)]

pub mod error;
pub mod memory;
pub mod pager;
pub mod rate_limit;
pub mod source;

pub use error::{SourceError, SourceResult};
pub use memory::MemorySource;
pub use pager::{
    NextLinkPaging, NoPaging, OffsetPaging, PageCursor, PageRequest, Pager, PagerState,
    PagingConfig, PagingStrategy, TokenPaging,
};
pub use rate_limit::{
    IntervalRateLimit, NoRateLimit, RateLimit, RateLimitConfig, RetryConfig,
    TokenBucketRateLimit, MIN_REQUESTS_PER_SECOND,
};
pub use source::{PageLink, RawResponse, Source};
