//! MongoDB-backed [`MessageStore`](crate::MessageStore).
//!
//! Write batches run inside multi-document transactions, so the target
//! deployment must be a replica set (a single-node replica set is enough).

mod client;
mod models;
mod repositories;

pub use client::MongoMessageStore;
