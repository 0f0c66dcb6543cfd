//! Homepage cache persistence, homepage probing and HTTP fetch utilities.

pub mod cache;
pub mod http;
pub mod probe;

pub use cache::{CacheError, Keyed, KeyedCache};
pub use http::{
    BackoffPolicy, FetchError, FetchedResponse, HttpClientConfig, HttpFetcher, RetryDisposition,
};
pub use probe::{
    html_to_text, normalize_text, HomepageProbe, HttpProbe, ProbeConfig, ProbeOutcome,
    DEFAULT_CHECK_TIMEOUT, DEFAULT_READ_TIMEOUT,
};

pub const CRATE_NAME: &str = "ceurws-storage";

/// Homepage cache keyed by volume number.
pub type HomepageCache = KeyedCache<ceurws_core::Homepage>;
