//! Graph → blob.

use oxigraph::io::RdfSerializer;
use worlds_core::{Error, Graph, Result};

use crate::{Format, convert::quad_to_oxigraph};

pub(crate) fn serialize_all(graph: &Graph, format: Format) -> Result<Vec<u8>> {
  if !format.supports_graphs() && graph.iter().any(|q| !q.graph.is_default()) {
    return Err(Error::UnsupportedGraph(format.name()));
  }

  let mut writer = RdfSerializer::from_format(format.rdf_format()).for_writer(Vec::new());
  for quad in graph {
    let quad = quad_to_oxigraph(quad)?;
    writer
      .serialize_quad(&quad)
      .map_err(|e| Error::MalformedRdf(format!("cannot serialize {quad}: {e}")))?;
  }
  writer
    .finish()
    .map_err(|e| Error::MalformedRdf(format!("cannot finish {} output: {e}", format.name())))
}
