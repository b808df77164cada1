//! Supported serializations and `Accept` header negotiation.

use oxigraph::io::RdfFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
  NQuads,
  NTriples,
  Turtle,
  TriG,
  N3,
  RdfXml,
}

impl Format {
  /// Preference order when a client accepts anything.
  pub const ALL: [Self; 6] = [
    Self::NQuads,
    Self::TriG,
    Self::Turtle,
    Self::NTriples,
    Self::N3,
    Self::RdfXml,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Self::NQuads => "nquads",
      Self::NTriples => "ntriples",
      Self::Turtle => "turtle",
      Self::TriG => "trig",
      Self::N3 => "n3",
      Self::RdfXml => "rdfxml",
    }
  }

  pub fn media_type(self) -> &'static str {
    match self {
      Self::NQuads => "application/n-quads",
      Self::NTriples => "application/n-triples",
      Self::Turtle => "text/turtle",
      Self::TriG => "application/trig",
      Self::N3 => "text/n3",
      Self::RdfXml => "application/rdf+xml",
    }
  }

  pub fn extension(self) -> &'static str {
    match self {
      Self::NQuads => "nq",
      Self::NTriples => "nt",
      Self::Turtle => "ttl",
      Self::TriG => "trig",
      Self::N3 => "n3",
      Self::RdfXml => "rdf",
    }
  }

  /// Whether the syntax can carry named graphs.
  pub fn supports_graphs(self) -> bool { matches!(self, Self::NQuads | Self::TriG) }

  /// Look up a format by media type; parameters such as `charset` are
  /// ignored.
  pub fn from_media_type(media_type: &str) -> Option<Self> {
    let essence = media_type.split(';').next()?.trim().to_ascii_lowercase();
    match essence.as_str() {
      "application/n-quads" | "text/x-nquads" | "text/nquads" => Some(Self::NQuads),
      "application/n-triples" | "text/plain" => Some(Self::NTriples),
      "text/turtle" | "application/x-turtle" => Some(Self::Turtle),
      "application/trig" | "application/x-trig" => Some(Self::TriG),
      "text/n3" | "text/rdf+n3" => Some(Self::N3),
      "application/rdf+xml" | "application/xml" | "text/xml" => Some(Self::RdfXml),
      _ => None,
    }
  }

  /// Look up a format by short name (`turtle`) or file extension (`ttl`).
  pub fn from_name(name: &str) -> Option<Self> {
    let name = name.trim().to_ascii_lowercase();
    Self::ALL.into_iter().find(|f| f.name() == name || f.extension() == name)
  }

  pub(crate) fn rdf_format(self) -> RdfFormat {
    match self {
      Self::NQuads => RdfFormat::NQuads,
      Self::NTriples => RdfFormat::NTriples,
      Self::Turtle => RdfFormat::Turtle,
      Self::TriG => RdfFormat::TriG,
      Self::N3 => RdfFormat::N3,
      Self::RdfXml => RdfFormat::RdfXml,
    }
  }
}

/// Choose a response format from an `Accept` header.
///
/// A missing or empty header yields N-Quads. Returns `None` when nothing the
/// client accepts can be produced.
pub fn negotiate(accept: Option<&str>) -> Option<Format> {
  let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
    return Some(Format::NQuads);
  };

  let mut ranges: Vec<(f32, usize, &str)> = accept
    .split(',')
    .enumerate()
    .filter_map(|(i, item)| {
      let mut parts = item.split(';');
      let range = parts.next()?.trim();
      let q = parts
        .filter_map(|p| p.trim().strip_prefix("q="))
        .find_map(|q| q.trim().parse::<f32>().ok())
        .unwrap_or(1.0);
      (q > 0.0 && !range.is_empty()).then_some((q, i, range))
    })
    .collect();
  ranges.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

  ranges.into_iter().find_map(|(_, _, range)| match_range(range))
}

fn match_range(range: &str) -> Option<Format> {
  let range = range.to_ascii_lowercase();
  if range == "*/*" {
    return Some(Format::NQuads);
  }
  if let Some(top) = range.strip_suffix("/*") {
    return Format::ALL
      .into_iter()
      .find(|f| f.media_type().split('/').next() == Some(top));
  }
  Format::ALL.into_iter().find(|f| f.media_type() == range)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn media_type_lookup_ignores_parameters() {
    assert_eq!(Format::from_media_type("text/turtle; charset=utf-8"), Some(Format::Turtle));
    assert_eq!(Format::from_media_type("APPLICATION/N-QUADS"), Some(Format::NQuads));
    assert_eq!(Format::from_media_type("application/json"), None);
  }

  #[test]
  fn names_and_extensions_resolve() {
    assert_eq!(Format::from_name("ttl"), Some(Format::Turtle));
    assert_eq!(Format::from_name("TriG"), Some(Format::TriG));
    assert_eq!(Format::from_name("csv"), None);
  }

  #[test]
  fn negotiation_honours_quality_values() {
    assert_eq!(negotiate(None), Some(Format::NQuads));
    assert_eq!(negotiate(Some("")), Some(Format::NQuads));
    assert_eq!(
      negotiate(Some("application/n-quads;q=0.5, text/turtle")),
      Some(Format::Turtle)
    );
    assert_eq!(negotiate(Some("text/html, */*;q=0.1")), Some(Format::NQuads));
    assert_eq!(negotiate(Some("text/*")), Some(Format::Turtle));
    assert_eq!(negotiate(Some("text/turtle;q=0")), None);
    assert_eq!(negotiate(Some("application/json")), None);
  }
}
