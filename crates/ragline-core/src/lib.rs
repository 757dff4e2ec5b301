//! # Ragline Core
//!
//! I/O-free engine logic for Ragline: data models, chunking, sparse term
//! vectors, reciprocal rank fusion, context budgeting, prompt rendering,
//! store traits, and the hybrid retrieval algorithm.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Everything
//! that talks to a network service is reached through the traits in
//! [`embedding`], [`store`], and [`transcript`], which the `ragline` app
//! crate implements.

pub mod budget;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod models;
pub mod prompt;
pub mod search;
pub mod sparse;
pub mod store;
pub mod transcript;
