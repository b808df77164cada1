//! Core types and trait definitions for the Worlds graph service.
//!
//! This crate is deliberately free of HTTP, SPARQL and database dependencies.
//! Every other crate depends on it: codecs and the SPARQL engine speak its
//! [`Quad`](term::Quad) model, storage backends implement its traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod graph;
pub mod limits;
pub mod result;
pub mod search;
pub mod store;
pub mod term;
pub mod usage;

pub use error::{Error, Result};
pub use graph::{Graph, Patch};
pub use term::{GraphName, Literal, Quad, Term};
