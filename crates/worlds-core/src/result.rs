//! SPARQL results and their JSON wire format.
//!
//! [`SparqlResult`] has exactly four shapes. [`WireResults`] is the
//! `application/sparql-results+json` document, extended with a `quads`
//! member for CONSTRUCT/DESCRIBE. Conversion runs from [`Term`] to
//! [`WireTerm`] only.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::term::{GraphName, Quad, Term};

pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

// ─── Result model ────────────────────────────────────────────────────────────

/// One solution: variable name → bound term. Unbound variables are absent.
pub type Solution = BTreeMap<String, Term>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SparqlResult {
  /// SELECT. `vars` follows the projection order of the query.
  Bindings { vars: Vec<String>, rows: Vec<Solution> },
  /// ASK.
  Boolean(bool),
  /// CONSTRUCT / DESCRIBE.
  Quads(Vec<Quad>),
  /// UPDATE acknowledgement; there is no payload.
  Void,
}

impl SparqlResult {
  /// The JSON document for this result; `None` for [`SparqlResult::Void`].
  pub fn to_wire(&self) -> Option<WireResults> {
    match self {
      Self::Bindings { vars, rows } => Some(WireResults {
        head:    WireHead { vars: Some(vars.clone()), link: None },
        results: Some(WireBody::Bindings {
          bindings: rows
            .iter()
            .map(|row| {
              row.iter().map(|(k, v)| (k.clone(), WireTerm::from(v))).collect()
            })
            .collect(),
        }),
        boolean: None,
      }),
      Self::Boolean(value) => Some(WireResults {
        head:    WireHead { vars: None, link: None },
        results: None,
        boolean: Some(*value),
      }),
      Self::Quads(quads) => Some(WireResults {
        head:    WireHead { vars: None, link: None },
        results: Some(WireBody::Quads {
          quads: quads.iter().map(WireQuad::from).collect(),
        }),
        boolean: None,
      }),
      Self::Void => None,
    }
  }

}

// ─── Wire document ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireResults {
  pub head:    WireHead,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub results: Option<WireBody>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub boolean: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireHead {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub vars: Option<Vec<String>>,
  /// Always serialised, `null` when absent.
  pub link: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireBody {
  Bindings { bindings: Vec<BTreeMap<String, WireTerm>> },
  Quads { quads: Vec<WireQuad> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireTerm {
  Uri {
    value: String,
  },
  Bnode {
    value: String,
  },
  Literal {
    value:    String,
    #[serde(rename = "xml:lang", skip_serializing_if = "Option::is_none")]
    language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datatype: Option<String>,
  },
}

impl From<&Term> for WireTerm {
  fn from(term: &Term) -> Self {
    match term {
      Term::Iri(v) => Self::Uri { value: v.clone() },
      Term::BlankNode(v) => Self::Bnode { value: v.clone() },
      Term::Literal(l) => Self::Literal {
        value:    l.value().to_owned(),
        language: l.language().map(str::to_owned),
        datatype: l.explicit_datatype().map(str::to_owned),
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireGraph {
  #[serde(rename = "type")]
  pub kind:  WireGraphKind,
  pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireGraphKind {
  Default,
  Uri,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireQuad {
  pub subject:   WireTerm,
  pub predicate: WireTerm,
  pub object:    WireTerm,
  pub graph:     WireGraph,
}

impl From<&Quad> for WireQuad {
  fn from(q: &Quad) -> Self {
    Self {
      subject:   WireTerm::from(&q.subject),
      predicate: WireTerm::from(&q.predicate),
      object:    WireTerm::from(&q.object),
      graph:     match &q.graph {
        GraphName::Default => {
          WireGraph { kind: WireGraphKind::Default, value: String::new() }
        }
        GraphName::Iri(iri) => {
          WireGraph { kind: WireGraphKind::Uri, value: iri.clone() }
        }
      },
    }
  }
}
