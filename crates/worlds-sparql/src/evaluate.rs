//! Blocking evaluation against a throwaway oxigraph store.
//!
//! Each call builds a fresh in-memory store from the snapshot, so a failed
//! or abandoned evaluation can never leak a half-applied mutation.

use std::sync::atomic::{AtomicBool, Ordering};

use oxigraph::{
  sparql::{QueryResults, SparqlEvaluator},
  store::Store,
};
use worlds_core::{
  Error, Graph, Result,
  result::{Solution, SparqlResult},
};
use worlds_rdf::convert::{
  quad_from_oxigraph, quad_to_oxigraph, term_from_oxigraph, triple_from_oxigraph,
};

fn storage(e: impl std::fmt::Display) -> Error { Error::StorageUnavailable(e.to_string()) }

fn evaluation(e: impl std::fmt::Display) -> Error { Error::Evaluation(e.to_string()) }

pub(crate) fn load_store(graph: &Graph) -> Result<Store> {
  let store = Store::new().map_err(storage)?;
  for quad in graph {
    store.insert(&quad_to_oxigraph(quad)?).map_err(storage)?;
  }
  Ok(store)
}

fn check(cancelled: &AtomicBool) -> Result<()> {
  if cancelled.load(Ordering::Relaxed) { Err(Error::Cancelled) } else { Ok(()) }
}

/// Evaluate a read-only query. `cancelled` is polled between result rows.
pub(crate) fn run_query(
  graph: &Graph,
  text: &str,
  cancelled: &AtomicBool,
) -> Result<SparqlResult> {
  let prepared = SparqlEvaluator::new()
    .parse_query(text)
    .map_err(|e| Error::SparqlSyntax(e.to_string()))?;
  let store = load_store(graph)?;
  check(cancelled)?;

  let results = prepared.on_store(&store).execute().map_err(evaluation)?;

  #[allow(unreachable_patterns)]
  match results {
    QueryResults::Solutions(solutions) => {
      let vars: Vec<String> =
        solutions.variables().iter().map(|v| v.as_str().to_owned()).collect();
      let mut rows = Vec::new();
      for solution in solutions {
        check(cancelled)?;
        let solution = solution.map_err(evaluation)?;
        let mut row = Solution::new();
        for (var, term) in solution.iter() {
          row.insert(var.as_str().to_owned(), term_from_oxigraph(term.clone())?);
        }
        rows.push(row);
      }
      Ok(SparqlResult::Bindings { vars, rows })
    }
    QueryResults::Boolean(value) => Ok(SparqlResult::Boolean(value)),
    QueryResults::Graph(triples) => {
      let mut quads = Vec::new();
      for triple in triples {
        check(cancelled)?;
        quads.push(triple_from_oxigraph(triple.map_err(evaluation)?)?);
      }
      Ok(SparqlResult::Quads(quads))
    }
    _ => Err(Error::UnsupportedQueryForm(
      "evaluator returned an unrecognised result shape".to_owned(),
    )),
  }
}

/// Apply an update to a copy of `graph` and return the resulting graph.
pub(crate) fn run_update(graph: &Graph, text: &str) -> Result<Graph> {
  let prepared = SparqlEvaluator::new()
    .parse_update(text)
    .map_err(|e| Error::SparqlSyntax(e.to_string()))?;
  let store = load_store(graph)?;

  prepared.on_store(&store).execute().map_err(evaluation)?;

  store
    .iter()
    .map(|quad| quad_from_oxigraph(quad.map_err(storage)?))
    .collect()
}
