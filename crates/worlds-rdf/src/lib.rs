//! RDF serialization codec for Worlds.
//!
//! Converts between byte blobs in a supported RDF syntax and
//! [`worlds_core::Graph`]. Pure synchronous; no HTTP or database
//! dependencies. N-Quads is the canonical form; Turtle, TriG, N-Triples, N3
//! and RDF/XML are accepted for import and offered for export.
//!
//! # Quick start
//!
//! ```no_run
//! use worlds_rdf::{Format, decode, encode};
//!
//! let blob = b"<http://a> <http://b> \"c\" .\n";
//! let graph = decode(blob, Format::NTriples).unwrap();
//! let turtle = encode(&graph, Format::Turtle).unwrap();
//! println!("{}", String::from_utf8_lossy(&turtle));
//! ```

pub mod convert;
mod format;
mod parse;
mod serialize;

pub use format::{Format, negotiate};
use worlds_core::{Graph, Result};

/// Parse `input` as `format`. All-or-nothing: any syntax error discards
/// everything parsed so far.
pub fn decode(input: &[u8], format: Format) -> Result<Graph> {
  parse::parse_all(input, format)
}

/// Serialize every quad of `graph` as `format`.
///
/// Triple-only formats refuse graphs that use named graphs rather than
/// silently flattening them.
pub fn encode(graph: &Graph, format: Format) -> Result<Vec<u8>> {
  serialize::serialize_all(graph, format)
}
