pub mod limiter;
pub mod store;

pub use limiter::RateLimiter;
pub use store::{paginate, CacheStore};
