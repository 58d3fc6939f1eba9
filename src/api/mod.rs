pub mod fetcher;

pub use fetcher::{HttpReadingFetcher, ReadingSource};
