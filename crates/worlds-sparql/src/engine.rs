//! [`SparqlEngine`]: query dispatch, the dirty transition and index sync.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use worlds_core::{
  Error, Graph, Patch, Result,
  result::SparqlResult,
  search::{NoopIndex, SearchIndex},
};

use crate::{
  evaluate::{run_query, run_update},
  form::{QueryForm, detect_form},
};

// ─── Outcome types ───────────────────────────────────────────────────────────

/// An evaluated graph that differs from the stored one. Persisting it is
/// the caller's job; dropping it discards the update.
#[derive(Debug, Clone)]
pub struct PendingWrite {
  pub graph: Graph,
  pub patch: Patch,
}

#[derive(Debug, Clone)]
pub struct Execution {
  pub result:  SparqlResult,
  /// `Some` only when an update actually changed the graph.
  pub pending: Option<PendingWrite>,
}

impl Execution {
  fn read(result: SparqlResult) -> Self { Self { result, pending: None } }

  /// Whether the caller must persist [`Execution::pending`].
  pub fn is_dirty(&self) -> bool { self.pending.is_some() }
}

/// Flips the flag when the evaluating future is dropped (timeout, client
/// disconnect), which stops the blocking evaluation at its next row.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
  fn drop(&mut self) { self.0.store(true, Ordering::Relaxed); }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Evaluates SPARQL against graph snapshots and forwards update patches to
/// a search index.
///
/// Cloning is cheap when the index is.
#[derive(Clone)]
pub struct SparqlEngine<I> {
  index: I,
}

impl SparqlEngine<NoopIndex> {
  /// An engine for deployments without search.
  pub fn without_index() -> Self { Self { index: NoopIndex } }
}

impl<I: SearchIndex> SparqlEngine<I> {
  pub fn new(index: I) -> Self { Self { index } }

  pub fn index(&self) -> &I { &self.index }

  /// Evaluate `text`, detecting whether it is a query or an update.
  pub async fn execute(&self, world_id: &str, graph: Graph, text: &str) -> Result<Execution> {
    match detect_form(text)? {
      QueryForm::Query => self.query(graph, text).await.map(Execution::read),
      QueryForm::Update => self.update(world_id, graph, text).await,
    }
  }

  /// Evaluate a SELECT, ASK, CONSTRUCT or DESCRIBE query.
  pub async fn query(&self, graph: Graph, text: &str) -> Result<SparqlResult> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(Arc::clone(&cancelled));
    let text = text.to_owned();

    tracing::debug!(quads = graph.len(), "evaluating SPARQL query");
    tokio::task::spawn_blocking(move || run_query(&graph, &text, &cancelled))
      .await
      .map_err(|e| Error::Evaluation(format!("query task failed: {e}")))?
  }

  /// Evaluate an update against `graph`.
  ///
  /// When the update changes anything, the patch is handed to the search
  /// index (failures are logged, never returned) and the new graph comes
  /// back as [`Execution::pending`]. The result is always
  /// [`SparqlResult::Void`].
  pub async fn update(&self, world_id: &str, graph: Graph, text: &str) -> Result<Execution> {
    let text = text.to_owned();
    tracing::debug!(world = %world_id, quads = graph.len(), "evaluating SPARQL update");

    let (before, after) = tokio::task::spawn_blocking(move || {
      let after = run_update(&graph, &text)?;
      Ok::<_, Error>((graph, after))
    })
    .await
    .map_err(|e| Error::Evaluation(format!("update task failed: {e}")))??;

    let patch = Patch::between(&before, &after);
    if patch.is_empty() {
      return Ok(Execution::read(SparqlResult::Void));
    }

    if let Err(e) = self.index.on_patch(world_id, &patch).await {
      tracing::warn!(world = %world_id, error = %e, "search index sync failed; index is stale");
    }

    Ok(Execution {
      result:  SparqlResult::Void,
      pending: Some(PendingWrite { graph: after, patch }),
    })
  }
}
