//! # pdf-rag core
//!
//! I/O-free building blocks of the pdf-rag pipeline: data models, the
//! overlapping text chunker, vector math helpers, and the in-memory
//! [`VectorIndex`](index::VectorIndex) together with its snapshot format.
//!
//! This crate contains no tokio, HTTP, or filesystem code. Persistence,
//! embedding providers and language-model clients live in the `pdf-rag`
//! application crate.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
