//! SPARQL execution for Worlds.
//!
//! Evaluates queries and updates against an in-memory snapshot of a world's
//! graph using the embedded oxigraph evaluator. The engine never persists
//! anything: an update that changes the graph comes back as a
//! [`PendingWrite`], and the caller decides when (and whether) to store it.

mod engine;
mod evaluate;
mod form;

pub use engine::{Execution, PendingWrite, SparqlEngine};
pub use form::{QueryForm, detect_form};
