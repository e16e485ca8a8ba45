//! Network access for remote locators.

mod fetcher;

pub use fetcher::{ByteFetcher, HttpFetcher};
