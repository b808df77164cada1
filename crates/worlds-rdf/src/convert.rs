//! The one conversion pair between the core term model and oxigraph's.
//!
//! Used by the codec here and by the SPARQL engine, so literal and graph
//! name handling cannot drift between import, export and query results.

use oxigraph::model::{
  BlankNode, GraphName as OxGraphName, Literal as OxLiteral, NamedNode,
  NamedOrBlankNode, Quad as OxQuad, Term as OxTerm, Triple as OxTriple,
};
use worlds_core::{Error, GraphName, Literal, Quad, Result, Term};

// ─── core → oxigraph ─────────────────────────────────────────────────────────

fn named_node(iri: &str) -> Result<NamedNode> {
  NamedNode::new(iri).map_err(|e| Error::InvalidTerm(format!("<{iri}>: {e}")))
}

fn blank_node(id: &str) -> Result<BlankNode> {
  BlankNode::new(id).map_err(|e| Error::InvalidTerm(format!("_:{id}: {e}")))
}

pub fn term_to_oxigraph(term: &Term) -> Result<OxTerm> {
  Ok(match term {
    Term::Iri(iri) => named_node(iri)?.into(),
    Term::BlankNode(id) => blank_node(id)?.into(),
    Term::Literal(l) => literal_to_oxigraph(l)?.into(),
  })
}

fn literal_to_oxigraph(l: &Literal) -> Result<OxLiteral> {
  if let Some(lang) = l.language() {
    return OxLiteral::new_language_tagged_literal(l.value(), lang)
      .map_err(|e| Error::InvalidTerm(format!("@{lang}: {e}")));
  }
  Ok(match l.explicit_datatype() {
    Some(dt) => OxLiteral::new_typed_literal(l.value(), named_node(dt)?),
    None => OxLiteral::new_simple_literal(l.value()),
  })
}

fn subject_to_oxigraph(term: &Term) -> Result<NamedOrBlankNode> {
  match term {
    Term::Iri(iri) => Ok(named_node(iri)?.into()),
    Term::BlankNode(id) => Ok(blank_node(id)?.into()),
    Term::Literal(_) => Err(Error::InvalidTerm(format!("literal {term} as subject"))),
  }
}

pub fn quad_to_oxigraph(quad: &Quad) -> Result<OxQuad> {
  let Term::Iri(predicate) = &quad.predicate else {
    return Err(Error::InvalidTerm(format!("{} as predicate", quad.predicate)));
  };
  let graph = match &quad.graph {
    GraphName::Default => OxGraphName::DefaultGraph,
    GraphName::Iri(iri) => named_node(iri)?.into(),
  };
  Ok(OxQuad::new(
    subject_to_oxigraph(&quad.subject)?,
    named_node(predicate)?,
    term_to_oxigraph(&quad.object)?,
    graph,
  ))
}

// ─── oxigraph → core ─────────────────────────────────────────────────────────

pub fn term_from_oxigraph(term: OxTerm) -> Result<Term> {
  #[allow(unreachable_patterns)]
  match term {
    OxTerm::NamedNode(n) => Ok(Term::Iri(n.into_string())),
    OxTerm::BlankNode(b) => Ok(Term::BlankNode(b.into_string())),
    OxTerm::Literal(l) => literal_from_oxigraph(&l).map(Term::Literal),
    other => Err(Error::InvalidTerm(format!("unsupported term {other}"))),
  }
}

fn literal_from_oxigraph(l: &OxLiteral) -> Result<Literal> {
  match l.language() {
    Some(lang) => Literal::lang_tagged(l.value(), lang),
    None => Literal::typed(l.value(), l.datatype().as_str()),
  }
}

fn subject_from_oxigraph(subject: NamedOrBlankNode) -> Result<Term> {
  #[allow(unreachable_patterns)]
  match subject {
    NamedOrBlankNode::NamedNode(n) => Ok(Term::Iri(n.into_string())),
    NamedOrBlankNode::BlankNode(b) => Ok(Term::BlankNode(b.into_string())),
    other => Err(Error::InvalidTerm(format!("unsupported subject {other}"))),
  }
}

pub fn quad_from_oxigraph(quad: OxQuad) -> Result<Quad> {
  let graph = match quad.graph_name {
    OxGraphName::DefaultGraph => GraphName::Default,
    OxGraphName::NamedNode(n) => GraphName::Iri(n.into_string()),
    OxGraphName::BlankNode(b) => {
      return Err(Error::MalformedRdf(format!(
        "blank node graph name _:{} is not supported",
        b.as_str()
      )));
    }
  };
  Quad::new(
    subject_from_oxigraph(quad.subject)?,
    Term::Iri(quad.predicate.into_string()),
    term_from_oxigraph(quad.object)?,
    graph,
  )
}

/// CONSTRUCT/DESCRIBE output lands in the default graph.
pub fn triple_from_oxigraph(triple: OxTriple) -> Result<Quad> {
  Quad::new(
    subject_from_oxigraph(triple.subject)?,
    Term::Iri(triple.predicate.into_string()),
    term_from_oxigraph(triple.object)?,
    GraphName::Default,
  )
}
