pub mod ingest;
pub mod retrieve;
pub mod store;
pub mod sync;
