//! Query vs. update detection.

use oxigraph::sparql::SparqlEvaluator;
use worlds_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryForm {
  /// SELECT, ASK, CONSTRUCT or DESCRIBE.
  Query,
  /// INSERT, DELETE, LOAD, CLEAR, CREATE, DROP, COPY, MOVE or ADD.
  Update,
}

const UPDATE_KEYWORDS: [&str; 10] = [
  "INSERT", "DELETE", "LOAD", "CLEAR", "CREATE", "DROP", "COPY", "MOVE", "ADD", "WITH",
];

/// Decide whether `text` is a query or an update.
///
/// The text is parsed as a query first, then as an update. When neither
/// parses, the reported syntax error is the one for the form suggested by
/// the first keyword after the prologue, so a typo in an update does not
/// surface as a confusing query error.
pub fn detect_form(text: &str) -> Result<QueryForm> {
  let evaluator = SparqlEvaluator::new();
  let query_err = match evaluator.clone().parse_query(text) {
    Ok(_) => return Ok(QueryForm::Query),
    Err(e) => e.to_string(),
  };
  let update_err = match evaluator.parse_update(text) {
    Ok(_) => return Ok(QueryForm::Update),
    Err(e) => e.to_string(),
  };
  if looks_like_update(text) {
    Err(Error::SparqlSyntax(update_err))
  } else {
    Err(Error::SparqlSyntax(query_err))
  }
}

fn looks_like_update(text: &str) -> bool {
  let mut tokens = text
    .lines()
    .map(str::trim_start)
    .filter(|l| !l.starts_with('#'))
    .flat_map(str::split_whitespace);

  while let Some(token) = tokens.next() {
    let upper = token.to_ascii_uppercase();
    match upper.as_str() {
      "PREFIX" => {
        tokens.next();
        tokens.next();
      }
      "BASE" => {
        tokens.next();
      }
      _ if token.starts_with('<') => {}
      _ => return UPDATE_KEYWORDS.contains(&upper.as_str()),
    }
  }
  false
}
