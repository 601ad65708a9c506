pub mod config;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod history;
pub mod load;
pub mod record;
pub mod scrape;
pub mod source;
pub mod tabular;
