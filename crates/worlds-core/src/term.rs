//! The RDF term model: a closed set of term kinds and the quad built from
//! them.
//!
//! Every conversion in the workspace (SQLite row, SPARQL JSON, oxigraph)
//! goes through these types, so the literal invariants live in one place:
//! a literal carries at most one of a language tag or an explicit datatype,
//! and a literal with neither is an `xsd:string`.

use std::fmt;

use crate::{Error, Result};

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const RDF_LANG_STRING: &str =
  "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

// ─── Literal ─────────────────────────────────────────────────────────────────

/// A literal value. Fields are private so the language/datatype invariant
/// cannot be broken after construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
  value:    String,
  language: Option<String>,
  datatype: Option<String>,
}

impl Literal {
  /// A plain string literal (implicit `xsd:string`).
  pub fn simple(value: impl Into<String>) -> Self {
    Self { value: value.into(), language: None, datatype: None }
  }

  /// A language-tagged string. Tags are normalised to lowercase.
  pub fn lang_tagged(
    value: impl Into<String>,
    language: impl AsRef<str>,
  ) -> Result<Self> {
    let language = language.as_ref();
    if !is_valid_language_tag(language) {
      return Err(Error::InvalidTerm(format!(
        "invalid language tag {language:?}"
      )));
    }
    Ok(Self {
      value:    value.into(),
      language: Some(language.to_ascii_lowercase()),
      datatype: None,
    })
  }

  /// A typed literal. `xsd:string` collapses to [`Literal::simple`];
  /// `rdf:langString` is rejected because it requires a language tag.
  pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Result<Self> {
    let datatype = datatype.into();
    if datatype == XSD_STRING {
      return Ok(Self::simple(value));
    }
    if datatype == RDF_LANG_STRING {
      return Err(Error::InvalidTerm(
        "rdf:langString literal without a language tag".to_owned(),
      ));
    }
    if datatype.is_empty() {
      return Err(Error::InvalidTerm("empty datatype IRI".to_owned()));
    }
    Ok(Self { value: value.into(), language: None, datatype: Some(datatype) })
  }

  pub fn value(&self) -> &str { &self.value }

  pub fn language(&self) -> Option<&str> { self.language.as_deref() }

  /// The datatype as written, `None` for simple and language-tagged literals.
  pub fn explicit_datatype(&self) -> Option<&str> { self.datatype.as_deref() }

  /// The effective datatype IRI, never empty.
  pub fn datatype(&self) -> &str {
    match (&self.language, &self.datatype) {
      (Some(_), _) => RDF_LANG_STRING,
      (None, Some(dt)) => dt,
      (None, None) => XSD_STRING,
    }
  }
}

fn is_valid_language_tag(tag: &str) -> bool {
  let mut parts = tag.split('-');
  let Some(primary) = parts.next() else { return false };
  if primary.is_empty()
    || primary.len() > 8
    || !primary.chars().all(|c| c.is_ascii_alphabetic())
  {
    return false;
  }
  parts.all(|p| {
    !p.is_empty() && p.len() <= 8 && p.chars().all(|c| c.is_ascii_alphanumeric())
  })
}

// ─── Term ────────────────────────────────────────────────────────────────────

/// The closed set of RDF term kinds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
  Iri(String),
  /// Blank node identifier without the `_:` prefix.
  BlankNode(String),
  Literal(Literal),
}

impl Term {
  pub fn iri(iri: impl Into<String>) -> Self { Self::Iri(iri.into()) }

  pub fn blank(id: impl Into<String>) -> Self { Self::BlankNode(id.into()) }

  pub fn literal(value: impl Into<String>) -> Self {
    Self::Literal(Literal::simple(value))
  }

  pub fn as_literal(&self) -> Option<&Literal> {
    match self {
      Self::Literal(l) => Some(l),
      _ => None,
    }
  }

  pub fn is_literal(&self) -> bool { matches!(self, Self::Literal(_)) }

  /// The lexical value: IRI, blank node id, or literal value.
  pub fn value(&self) -> &str {
    match self {
      Self::Iri(v) | Self::BlankNode(v) => v,
      Self::Literal(l) => l.value(),
    }
  }
}

impl From<Literal> for Term {
  fn from(l: Literal) -> Self { Self::Literal(l) }
}

impl fmt::Display for Term {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Iri(iri) => write!(f, "<{iri}>"),
      Self::BlankNode(id) => write!(f, "_:{id}"),
      Self::Literal(l) => {
        write!(f, "\"{}\"", escape_literal(l.value()))?;
        if let Some(lang) = l.language() {
          write!(f, "@{lang}")
        } else if let Some(dt) = l.explicit_datatype() {
          write!(f, "^^<{dt}>")
        } else {
          Ok(())
        }
      }
    }
  }
}

fn escape_literal(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  for c in value.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      _ => out.push(c),
    }
  }
  out
}

// ─── Graph name ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphName {
  #[default]
  Default,
  Iri(String),
}

impl GraphName {
  pub fn is_default(&self) -> bool { matches!(self, Self::Default) }
}

// ─── Quad ────────────────────────────────────────────────────────────────────

/// A subject–predicate–object statement scoped to a graph.
///
/// Construct through [`Quad::new`] so the positional constraints hold:
/// subjects are IRIs or blank nodes, predicates are IRIs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quad {
  pub subject:   Term,
  pub predicate: Term,
  pub object:    Term,
  pub graph:     GraphName,
}

impl Quad {
  pub fn new(
    subject: Term,
    predicate: Term,
    object: Term,
    graph: GraphName,
  ) -> Result<Self> {
    if subject.is_literal() {
      return Err(Error::InvalidTerm(format!(
        "literal {subject} in subject position"
      )));
    }
    if !matches!(predicate, Term::Iri(_)) {
      return Err(Error::InvalidTerm(format!(
        "{predicate} in predicate position"
      )));
    }
    Ok(Self { subject, predicate, object, graph })
  }

  /// Convenience for a default-graph quad from three IRIs / a literal.
  pub fn triple(subject: Term, predicate: Term, object: Term) -> Result<Self> {
    Self::new(subject, predicate, object, GraphName::Default)
  }
}

impl fmt::Display for Quad {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
    if let GraphName::Iri(g) = &self.graph {
      write!(f, " <{g}>")?;
    }
    f.write_str(" .")
  }
}
