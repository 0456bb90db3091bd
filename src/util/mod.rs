//! Shared infrastructure
//!
//! - `constants`: Centralized timeouts, paths and limits

pub mod constants;

pub use constants::{
    CONNECT_TIMEOUT, DEFAULT_API_URL, DEFAULT_CACHE_DIR, DEFAULT_WORKFLOWS_DIR, FETCH_TIMEOUT,
    REDIRECT_LIMIT,
};
