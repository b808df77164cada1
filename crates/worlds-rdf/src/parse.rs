//! Blob → graph.

use oxigraph::io::RdfParser;
use worlds_core::{Error, Graph, Result};

use crate::{Format, convert::quad_from_oxigraph};

pub(crate) fn parse_all(input: &[u8], format: Format) -> Result<Graph> {
  let parser = RdfParser::from_format(format.rdf_format()).for_reader(input);
  let mut graph = Graph::new();
  for quad in parser {
    let quad = quad.map_err(|e| Error::MalformedRdf(e.to_string()))?;
    graph.insert(quad_from_oxigraph(quad)?);
  }
  Ok(graph)
}
