// Library interface for moe-scraper
// Resilient scraping client (proxy rotation, retries) plus metadata sources

pub mod config;
pub mod error;
pub mod http_client;
pub mod models;
pub mod proxy;
pub mod proxy_pool;
pub mod response;
pub mod sources;
