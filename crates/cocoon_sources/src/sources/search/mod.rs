//! Adapters that scrape search engine result pages.

pub mod baidu;
pub mod bing;
pub mod yahoo;
