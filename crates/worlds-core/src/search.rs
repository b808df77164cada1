//! Text chunks, embeddings and the search-index seam.
//!
//! The search index is derived data: it is kept in step with the quad set
//! by applying [`Patch`]es, and it never participates in SPARQL answers.
//! [`NoopIndex`] is a valid index for deployments without search.

use std::{future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  Result,
  graph::{Graph, Patch},
  result::WireTerm,
  term::{Quad, Term},
};

/// Default upper bound on chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Default embedding width.
pub const DEFAULT_DIMENSIONS: usize = 256;

// ─── Chunks ──────────────────────────────────────────────────────────────────

/// A fragment of a literal object, linked to its quad by `quad_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
  pub chunk_id:  String,
  pub quad_id:   String,
  pub subject:   Term,
  pub predicate: String,
  pub text:      String,
  pub embedding: Option<Vec<f32>>,
}

/// Stable identifier for a quad: hex SHA-256 of its N-Quads form.
pub fn quad_id(quad: &Quad) -> String {
  hex::encode(Sha256::digest(quad.to_string().as_bytes()))
}

/// Split `text` on word boundaries into pieces of at most `max_chars`
/// characters. Whitespace runs collapse to one space; a single word longer
/// than `max_chars` is hard-split.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
  let max_chars = max_chars.max(1);
  let mut chunks = Vec::new();
  let mut current = String::new();
  let mut current_len = 0;

  for word in text.split_whitespace() {
    let mut word: Vec<char> = word.chars().collect();
    while word.len() > max_chars {
      if current_len > 0 {
        chunks.push(std::mem::take(&mut current));
        current_len = 0;
      }
      let rest = word.split_off(max_chars);
      chunks.push(word.into_iter().collect());
      word = rest;
    }
    let extra = if current_len == 0 { word.len() } else { word.len() + 1 };
    if current_len + extra > max_chars {
      chunks.push(std::mem::take(&mut current));
      current_len = 0;
    }
    if current_len > 0 {
      current.push(' ');
      current_len += 1;
    }
    current.extend(word.iter());
    current_len += word.len();
  }
  if current_len > 0 {
    chunks.push(current);
  }
  chunks
}

/// Derive the chunks for one quad. Non-literal objects yield nothing.
pub fn derive_chunks(
  quad: &Quad,
  max_chars: usize,
  embedder: Option<&dyn Embedder>,
) -> Vec<TextChunk> {
  let Some(literal) = quad.object.as_literal() else { return Vec::new() };
  let Term::Iri(predicate) = &quad.predicate else { return Vec::new() };
  let id = quad_id(quad);

  split_text(literal.value(), max_chars)
    .into_iter()
    .enumerate()
    .map(|(i, text)| TextChunk {
      chunk_id:  format!("{id}:{i}"),
      quad_id:   id.clone(),
      subject:   quad.subject.clone(),
      predicate: predicate.clone(),
      embedding: embedder.map(|e| e.embed(&text)),
      text,
    })
    .collect()
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

/// Maps text to a fixed-width vector.
pub trait Embedder: Send + Sync {
  fn dimensions(&self) -> usize;
  fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Vectors are L2-normalised, so cosine similarity reduces to a dot product.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
  dimensions: usize,
}

impl HashingEmbedder {
  pub fn new(dimensions: usize) -> Self { Self { dimensions: dimensions.max(1) } }
}

impl Default for HashingEmbedder {
  fn default() -> Self { Self::new(DEFAULT_DIMENSIONS) }
}

impl Embedder for HashingEmbedder {
  fn dimensions(&self) -> usize { self.dimensions }

  fn embed(&self, text: &str) -> Vec<f32> {
    let mut v = vec![0.0_f32; self.dimensions];
    for token in tokenize(text) {
      let digest = Sha256::digest(token.as_bytes());
      let bucket =
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
          % self.dimensions;
      let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
      v[bucket] += sign;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
      v.iter_mut().for_each(|x| *x /= norm);
    }
    v
  }
}

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|t| !t.is_empty())
    .map(str::to_lowercase)
}

/// Cosine similarity; zero when either vector is zero or widths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    return 0.0;
  }
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
  if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

// ─── Index seam ──────────────────────────────────────────────────────────────

/// Parameters for [`SearchIndex::search`].
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
  pub text:  String,
  #[serde(default = "default_limit")]
  pub limit: usize,
}

fn default_limit() -> usize { 10 }

fn serialize_term<S: serde::Serializer>(term: &Term, s: S) -> Result<S::Ok, S::Error> {
  WireTerm::from(term).serialize(s)
}

/// A ranked match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
  #[serde(serialize_with = "serialize_term")]
  pub subject:   Term,
  pub predicate: String,
  pub text:      String,
  pub score:     f32,
}

/// A search index kept in step with a world's quads.
pub trait SearchIndex: Send + Sync {
  /// Apply the net effect of a mutation: chunk every added literal-bearing
  /// quad and drop the chunks of every removed quad.
  fn on_patch<'a>(
    &'a self,
    world_id: &'a str,
    patch: &'a Patch,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  /// Discard everything indexed for the world and index `graph` from scratch.
  fn rebuild<'a>(
    &'a self,
    world_id: &'a str,
    graph: &'a Graph,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  fn search<'a>(
    &'a self,
    world_id: &'a str,
    query: &'a SearchQuery,
  ) -> impl Future<Output = Result<Vec<SearchHit>>> + Send + 'a;
}

/// Discards every patch and finds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndex;

impl SearchIndex for NoopIndex {
  async fn on_patch(&self, _: &str, _: &Patch) -> Result<()> { Ok(()) }

  async fn rebuild(&self, _: &str, _: &Graph) -> Result<()> { Ok(()) }

  async fn search(&self, _: &str, _: &SearchQuery) -> Result<Vec<SearchHit>> {
    Ok(Vec::new())
  }
}

impl<T: SearchIndex> SearchIndex for Arc<T> {
  async fn on_patch(&self, world_id: &str, patch: &Patch) -> Result<()> {
    (**self).on_patch(world_id, patch).await
  }

  async fn rebuild(&self, world_id: &str, graph: &Graph) -> Result<()> {
    (**self).rebuild(world_id, graph).await
  }

  async fn search(&self, world_id: &str, query: &SearchQuery) -> Result<Vec<SearchHit>> {
    (**self).search(world_id, query).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::term::Literal;

  #[test]
  fn split_text_respects_word_boundaries() {
    let chunks = split_text("the quick  brown\nfox jumps", 10);
    assert_eq!(chunks, vec!["the quick", "brown fox", "jumps"]);
    assert!(chunks.iter().all(|c| c.chars().count() <= 10));
  }

  #[test]
  fn quad_id_is_lowercase_hex_sha256_of_nquads() {
    let q = Quad::triple(Term::iri("http://a"), Term::iri("http://b"), Term::literal("c")).unwrap();
    assert_eq!(
      quad_id(&q),
      "d3fd36f4b38d9a342196b04f982df0230c15da2f695102ee8fe07b3295bc723f"
    );
  }

  #[test]
  fn split_text_hard_splits_long_words() {
    assert_eq!(split_text("abcdefgh ij", 3), vec!["abc", "def", "gh", "ij"]);
    assert!(split_text("   ", 8).is_empty());
  }

  #[test]
  fn only_literal_objects_are_chunked() {
    let iri = Quad::triple(
      Term::iri("http://a"),
      Term::iri("http://p"),
      Term::iri("http://b"),
    )
    .unwrap();
    assert!(derive_chunks(&iri, 16, None).is_empty());

    let lit = Quad::triple(
      Term::iri("http://a"),
      Term::iri("http://p"),
      Term::Literal(Literal::lang_tagged("hello there world", "en").unwrap()),
    )
    .unwrap();
    let embedder = HashingEmbedder::new(32);
    let chunks = derive_chunks(&lit, 11, Some(&embedder));
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.quad_id == quad_id(&lit)));
    assert_eq!(chunks[0].embedding.as_ref().map(Vec::len), Some(32));
    assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
  }

  #[test]
  fn hashing_embedder_is_deterministic_and_normalised() {
    let e = HashingEmbedder::new(64);
    let a = e.embed("Graph databases store quads");
    assert_eq!(a, e.embed("graph DATABASES store quads!"));
    let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
    assert!(cosine_similarity(&a, &e.embed("graph databases")) > 0.0);
    assert!(e.embed("").iter().all(|x| *x == 0.0));
  }

  #[tokio::test]
  async fn noop_index_accepts_everything() {
    let patch = Patch::default();
    NoopIndex.on_patch("w", &patch).await.unwrap();
    let hits = NoopIndex
      .search("w", &SearchQuery { text: "x".into(), limit: 5 })
      .await
      .unwrap();
    assert!(hits.is_empty());
  }
}
