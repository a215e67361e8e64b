pub mod builder;
pub mod collector;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ics;
pub mod model;
pub mod pipeline;
pub mod schedule;
pub mod scrape;
pub mod time_parse;
