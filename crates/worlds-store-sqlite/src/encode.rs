//! Conversion between domain types and the plain columns stored in SQLite.
//!
//! Node terms share one text encoding: IRIs are stored verbatim and blank
//! nodes as `_:` followed by their id. IRIs are absolute, so they can never
//! start with `_:`. Timestamps are fixed-width RFC 3339 UTC strings so that
//! lexical order matches chronological order.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use worlds_core::{
  GraphName, Literal, Quad, Term,
  search::TextChunk,
  store::WorldRecord,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// The current time, truncated to what a text timestamp column keeps.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_millis(dt: DateTime<Utc>) -> i64 { dt.timestamp_millis() }

pub fn decode_millis(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms)
    .ok_or_else(|| Error::DateParse(format!("timestamp out of range: {ms}")))
}

// ─── Terms ───────────────────────────────────────────────────────────────────

const BLANK_PREFIX: &str = "_:";

/// Encode an IRI or blank node. Literals are not nodes.
pub fn encode_node(term: &Term) -> Result<String> {
  match term {
    Term::Iri(iri) => Ok(iri.clone()),
    Term::BlankNode(id) => Ok(format!("{BLANK_PREFIX}{id}")),
    Term::Literal(_) => Err(Error::Core(worlds_core::Error::InvalidTerm(format!(
      "literal {term} cannot be stored as a node"
    )))),
  }
}

pub fn decode_node(s: &str) -> Term {
  match s.strip_prefix(BLANK_PREFIX) {
    Some(id) => Term::blank(id),
    None => Term::iri(s),
  }
}

pub fn encode_graph(graph: &GraphName) -> String {
  match graph {
    GraphName::Default => String::new(),
    GraphName::Iri(iri) => iri.clone(),
  }
}

pub fn decode_graph(s: String) -> GraphName {
  if s.is_empty() { GraphName::Default } else { GraphName::Iri(s) }
}

// ─── Quad rows ───────────────────────────────────────────────────────────────

/// One row of the `quads` table.
#[derive(Debug, Clone)]
pub struct QuadRow {
  pub subject:         String,
  pub predicate:       String,
  pub object:          String,
  pub graph:           String,
  pub term_type:       &'static str,
  pub object_language: String,
  pub object_datatype: String,
}

/// A `quads` row as read back, before validation.
#[derive(Debug)]
pub struct RawQuad {
  pub subject:         String,
  pub predicate:       String,
  pub object:          String,
  pub graph:           String,
  pub term_type:       String,
  pub object_language: String,
  pub object_datatype: String,
}

impl QuadRow {
  pub fn from_quad(quad: &Quad) -> Result<Self> {
    let Term::Iri(predicate) = &quad.predicate else {
      return Err(Error::Core(worlds_core::Error::InvalidTerm(format!(
        "{} in predicate position",
        quad.predicate
      ))));
    };

    let (object, term_type, object_language, object_datatype) = match &quad.object {
      Term::Iri(iri) => (iri.clone(), "uri", String::new(), String::new()),
      Term::BlankNode(id) => (format!("{BLANK_PREFIX}{id}"), "bnode", String::new(), String::new()),
      Term::Literal(lit) => (
        lit.value().to_owned(),
        "literal",
        lit.language().unwrap_or_default().to_owned(),
        lit.explicit_datatype().unwrap_or_default().to_owned(),
      ),
    };

    Ok(Self {
      subject: encode_node(&quad.subject)?,
      predicate: predicate.clone(),
      object,
      graph: encode_graph(&quad.graph),
      term_type,
      object_language,
      object_datatype,
    })
  }
}

impl RawQuad {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject:         row.get(0)?,
      predicate:       row.get(1)?,
      object:          row.get(2)?,
      graph:           row.get(3)?,
      term_type:       row.get(4)?,
      object_language: row.get(5)?,
      object_datatype: row.get(6)?,
    })
  }

  pub fn into_quad(self) -> Result<Quad> {
    let object = match self.term_type.as_str() {
      "uri" => Term::iri(self.object),
      "bnode" => match self.object.strip_prefix(BLANK_PREFIX) {
        Some(id) => Term::blank(id),
        None => return Err(Error::CorruptRow(format!("blank node {:?}", self.object))),
      },
      "literal" => Term::Literal(if !self.object_language.is_empty() {
        Literal::lang_tagged(self.object, self.object_language)?
      } else if !self.object_datatype.is_empty() {
        Literal::typed(self.object, self.object_datatype)?
      } else {
        Literal::simple(self.object)
      }),
      other => return Err(Error::CorruptRow(format!("unknown term type {other:?}"))),
    };

    Ok(Quad::new(
      decode_node(&self.subject),
      Term::iri(self.predicate),
      object,
      decode_graph(self.graph),
    )?)
  }
}

/// Column list shared by every `quads` SELECT, in [`RawQuad::from_row`] order.
pub const QUAD_COLUMNS: &str =
  "subject, predicate, object, graph, term_type, object_language, object_datatype";

pub const INSERT_QUAD: &str = "INSERT OR IGNORE INTO quads (
    subject, predicate, object, graph, term_type, object_language, object_datatype
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

pub fn insert_quad(stmt: &mut rusqlite::Statement<'_>, row: &QuadRow) -> rusqlite::Result<usize> {
  stmt.execute(rusqlite::params![
    row.subject,
    row.predicate,
    row.object,
    row.graph,
    row.term_type,
    row.object_language,
    row.object_datatype,
  ])
}

// ─── Worlds ──────────────────────────────────────────────────────────────────

pub const WORLD_COLUMNS: &str = "world_id, description, created_by, created_at, updated_at";

#[derive(Debug)]
pub struct RawWorld {
  pub world_id:    String,
  pub description: Option<String>,
  pub created_by:  String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawWorld {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      world_id:    row.get(0)?,
      description: row.get(1)?,
      created_by:  row.get(2)?,
      created_at:  row.get(3)?,
      updated_at:  row.get(4)?,
    })
  }

  pub fn into_record(self) -> Result<WorldRecord> {
    Ok(WorldRecord {
      world_id:    self.world_id,
      description: self.description,
      created_by:  self.created_by,
      created_at:  decode_dt(&self.created_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Chunks ──────────────────────────────────────────────────────────────────

/// A `chunks` row ready to insert.
#[derive(Debug, Clone)]
pub struct ChunkRow {
  pub chunk_id:  String,
  pub quad_id:   String,
  pub subject:   String,
  pub predicate: String,
  pub text:      String,
  pub embedding: Option<Vec<u8>>,
}

impl ChunkRow {
  pub fn from_chunk(chunk: TextChunk) -> Result<Self> {
    Ok(Self {
      subject:   encode_node(&chunk.subject)?,
      embedding: chunk.embedding.as_deref().map(encode_embedding),
      chunk_id:  chunk.chunk_id,
      quad_id:   chunk.quad_id,
      predicate: chunk.predicate,
      text:      chunk.text,
    })
  }
}

/// A `chunks` row as read back for scoring.
#[derive(Debug)]
pub struct RawChunk {
  pub subject:   String,
  pub predicate: String,
  pub text:      String,
  pub embedding: Option<Vec<u8>>,
}

pub fn encode_embedding(v: &[f32]) -> Vec<u8> {
  v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
  if bytes.len() % 4 != 0 {
    return Err(Error::CorruptRow(format!("embedding of {} bytes", bytes.len())));
  }
  Ok(
    bytes
      .chunks_exact(4)
      .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rows_round_trip_every_term_kind() {
    let quads = [
      Quad::triple(Term::iri("http://s"), Term::iri("http://p"), Term::iri("http://o")).unwrap(),
      Quad::triple(Term::blank("b0"), Term::iri("http://p"), Term::blank("b1")).unwrap(),
      Quad::new(
        Term::iri("http://s"),
        Term::iri("http://p"),
        Literal::lang_tagged("chat", "fr").unwrap().into(),
        GraphName::Iri("http://g".into()),
      )
      .unwrap(),
      Quad::triple(
        Term::iri("http://s"),
        Term::iri("http://p"),
        Literal::typed("42", "http://www.w3.org/2001/XMLSchema#integer").unwrap().into(),
      )
      .unwrap(),
    ];

    for quad in quads {
      let row = QuadRow::from_quad(&quad).unwrap();
      let raw = RawQuad {
        subject:         row.subject,
        predicate:       row.predicate,
        object:          row.object,
        graph:           row.graph,
        term_type:       row.term_type.to_owned(),
        object_language: row.object_language,
        object_datatype: row.object_datatype,
      };
      assert_eq!(raw.into_quad().unwrap(), quad);
    }
  }

  #[test]
  fn simple_literals_leave_language_and_datatype_empty() {
    let quad =
      Quad::triple(Term::iri("http://a"), Term::iri("http://b"), Term::literal("c")).unwrap();
    let row = QuadRow::from_quad(&quad).unwrap();
    assert_eq!(row.term_type, "literal");
    assert_eq!(row.object_language, "");
    assert_eq!(row.object_datatype, "");
    assert_eq!(row.graph, "");
  }

  #[test]
  fn timestamps_sort_lexically() {
    let a = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let b = DateTime::from_timestamp(1_700_000_000, 500_000_000).unwrap();
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn embeddings_survive_blob_encoding() {
    let v = vec![0.5_f32, -1.25, 3.0];
    assert_eq!(decode_embedding(&encode_embedding(&v)).unwrap(), v);
    assert!(decode_embedding(&[0, 1, 2]).is_err());
  }
}
