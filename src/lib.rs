//! jobfeed library
//!
//! The fetch–cache–aggregate pipeline: a resilient upstream client, a TTL and
//! stale-while-revalidate cache wrapper, and the aggregator that merges,
//! degrades, filters and sorts listing records.

pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod schedule;
pub mod upstream;

pub use aggregate::{AggregateError, AggregateOptions, AggregateReport, Aggregation, Aggregator};
pub use cache::{CacheManager, CacheStore, FileStore, MemoryStore};
pub use data::{EnrichedRecord, ListingDetail, ListingSummary};
pub use upstream::{ListingSource, UpstreamClient, UpstreamError};
