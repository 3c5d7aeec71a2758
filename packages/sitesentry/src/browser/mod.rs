//! Page fetching: the headless-browser pool and the HTTP fallback.

mod http;
mod pool;
mod session;
mod stealth;

pub use http::HttpFetcher;
pub use pool::BrowserPool;
pub use session::BrowserSession;
pub use stealth::STEALTH_PRELUDE;
