//! In-memory graphs and the patches between them.
//!
//! A [`Graph`] is the unit that moves between storage, codec and SPARQL
//! engine. A [`Patch`] is the net difference between two graphs; it drives
//! search-index synchronisation after an update.

use std::collections::BTreeSet;

use crate::term::Quad;

// ─── Graph ───────────────────────────────────────────────────────────────────

/// A set of quads. Duplicate inserts are no-ops; iteration order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
  quads: BTreeSet<Quad>,
}

impl Graph {
  pub fn new() -> Self { Self::default() }

  pub fn len(&self) -> usize { self.quads.len() }

  pub fn is_empty(&self) -> bool { self.quads.is_empty() }

  /// Returns `false` if the quad was already present.
  pub fn insert(&mut self, quad: Quad) -> bool { self.quads.insert(quad) }

  pub fn remove(&mut self, quad: &Quad) -> bool { self.quads.remove(quad) }

  pub fn contains(&self, quad: &Quad) -> bool { self.quads.contains(quad) }

  pub fn iter(&self) -> impl Iterator<Item = &Quad> { self.quads.iter() }
}

impl FromIterator<Quad> for Graph {
  fn from_iter<T: IntoIterator<Item = Quad>>(iter: T) -> Self {
    Self { quads: iter.into_iter().collect() }
  }
}

impl Extend<Quad> for Graph {
  fn extend<T: IntoIterator<Item = Quad>>(&mut self, iter: T) {
    self.quads.extend(iter);
  }
}

impl IntoIterator for Graph {
  type Item = Quad;
  type IntoIter = std::collections::btree_set::IntoIter<Quad>;

  fn into_iter(self) -> Self::IntoIter { self.quads.into_iter() }
}

impl<'a> IntoIterator for &'a Graph {
  type Item = &'a Quad;
  type IntoIter = std::collections::btree_set::Iter<'a, Quad>;

  fn into_iter(self) -> Self::IntoIter { self.quads.iter() }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// The net effect of a mutation: quads that appeared and quads that vanished.
/// A quad never appears in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
  pub added:   Vec<Quad>,
  pub removed: Vec<Quad>,
}

impl Patch {
  /// Compute the patch that turns `before` into `after`.
  pub fn between(before: &Graph, after: &Graph) -> Self {
    Self {
      added:   after.quads.difference(&before.quads).cloned().collect(),
      removed: before.quads.difference(&after.quads).cloned().collect(),
    }
  }

  /// A patch that only adds; quads already in `base` are dropped.
  pub fn additions(base: &Graph, quads: impl IntoIterator<Item = Quad>) -> Self {
    let added: BTreeSet<Quad> =
      quads.into_iter().filter(|q| !base.contains(q)).collect();
    Self { added: added.into_iter().collect(), removed: Vec::new() }
  }

  pub fn is_empty(&self) -> bool { self.added.is_empty() && self.removed.is_empty() }

  /// The patch that undoes this one.
  pub fn inverse(&self) -> Self {
    Self { added: self.removed.clone(), removed: self.added.clone() }
  }

  pub fn apply(&self, graph: &mut Graph) {
    for q in &self.removed {
      graph.remove(q);
    }
    graph.extend(self.added.iter().cloned());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::term::Term;

  fn q(s: &str, o: &str) -> Quad {
    Quad::triple(Term::iri(s), Term::iri("http://p"), Term::literal(o)).unwrap()
  }

  #[test]
  fn duplicate_insert_is_noop() {
    let mut g = Graph::new();
    assert!(g.insert(q("http://a", "x")));
    assert!(!g.insert(q("http://a", "x")));
    assert_eq!(g.len(), 1);
  }

  #[test]
  fn patch_between_is_net_difference() {
    let before: Graph = [q("http://a", "1"), q("http://b", "2")].into_iter().collect();
    let after: Graph = [q("http://b", "2"), q("http://c", "3")].into_iter().collect();

    let patch = Patch::between(&before, &after);
    assert_eq!(patch.added, vec![q("http://c", "3")]);
    assert_eq!(patch.removed, vec![q("http://a", "1")]);

    let mut replay = before.clone();
    patch.apply(&mut replay);
    assert_eq!(replay, after);

    patch.inverse().apply(&mut replay);
    assert_eq!(replay, before);
  }

  #[test]
  fn additions_skip_existing_quads() {
    let base: Graph = [q("http://a", "1")].into_iter().collect();
    let patch = Patch::additions(&base, [q("http://a", "1"), q("http://b", "2")]);
    assert_eq!(patch.added, vec![q("http://b", "2")]);
    assert!(patch.removed.is_empty());
  }

  #[test]
  fn identical_graphs_give_empty_patch() {
    let g: Graph = [q("http://a", "1")].into_iter().collect();
    assert!(Patch::between(&g, &g.clone()).is_empty());
  }
}
