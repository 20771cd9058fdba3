//! Request/response DTOs and the scrape error taxonomy

mod errors;
mod request;
mod response;

pub use errors::{ErrorDetail, ScrapeError};
pub use request::{
    Action, ActionKind, CookieParam, ExtractMode, FetchMode, OutputFormat, ScrapeRequest,
    ScrollDirection,
};
pub use response::{CacheStatus, PoolStats, ScrapeResponse, Timing};
