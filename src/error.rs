use thiserror::Error;

/// Typed failures raised while loading and reading listing pages.
///
/// The Display strings matter: the retry wrapper classifies errors by the
/// words they contain (see `scraper::retry::is_recoverable`).
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Navigation timeout of {timeout_ms}ms exceeded: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("network error loading {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("element not found: {selector} on {url}")]
    ElementNotFound { url: String, selector: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("bad selector {0:?}")]
    Selector(String),

    #[error("challenge page served for {0}")]
    Blocked(String),
}
