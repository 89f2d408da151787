//! Per-step subdivision weights, indexed in both directions.

use crate::error::{LevelSide, MeshError, Result};

/// One weighted link between a vertex of the coarser level and a vertex of
/// the finer level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    /// Vertex index on the coarser level.
    pub prev_level_vertex: usize,
    /// Vertex index on the finer level.
    pub next_level_vertex: usize,
    /// Weight of the coarse vertex in the fine vertex's position.
    pub amount: f64,
}

/// All contributions recorded by one subdivision step.
///
/// Contributions live in one flat arena; the two lookup tables hold indices
/// into it. For every finer-level vertex the amounts of its contributions sum
/// to one.
#[derive(Debug, Clone, Default)]
pub struct ContributionMap {
    contributions: Vec<Contribution>,
    by_prev: Vec<Vec<usize>>,
    by_next: Vec<Vec<usize>>,
}

impl ContributionMap {
    /// Create an empty map sized for the two levels' vertex counts.
    pub fn new(num_prev_vertices: usize, num_next_vertices: usize) -> Self {
        Self {
            contributions: Vec::new(),
            by_prev: vec![Vec::new(); num_prev_vertices],
            by_next: vec![Vec::new(); num_next_vertices],
        }
    }

    /// Record that `prev_level_vertex` feeds `next_level_vertex` with weight `amount`.
    ///
    /// The lookup tables grow if either index is beyond the sizes given to
    /// [`ContributionMap::new`].
    pub fn add(&mut self, prev_level_vertex: usize, next_level_vertex: usize, amount: f64) {
        let idx = self.contributions.len();
        self.contributions.push(Contribution {
            prev_level_vertex,
            next_level_vertex,
            amount,
        });
        if prev_level_vertex >= self.by_prev.len() {
            self.by_prev.resize(prev_level_vertex + 1, Vec::new());
        }
        if next_level_vertex >= self.by_next.len() {
            self.by_next.resize(next_level_vertex + 1, Vec::new());
        }
        self.by_prev[prev_level_vertex].push(idx);
        self.by_next[next_level_vertex].push(idx);
    }

    /// All recorded contributions in insertion order.
    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    /// Number of recorded contributions.
    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    /// Number of coarser-level vertices the map is indexed for.
    pub fn num_prev_vertices(&self) -> usize {
        self.by_prev.len()
    }

    /// Number of finer-level vertices the map is indexed for.
    pub fn num_next_vertices(&self) -> usize {
        self.by_next.len()
    }

    /// The coarse vertices (and weights) that produced a finer-level vertex.
    ///
    /// # Errors
    /// [`MeshError::MissingContribution`] if the vertex has no sources.
    pub fn prev_level_contributions(&self, next_level_vertex: usize) -> Result<Vec<Contribution>> {
        self.lookup(&self.by_next, next_level_vertex, LevelSide::Next)
    }

    /// The finer-level vertices a coarse vertex feeds into.
    ///
    /// # Errors
    /// [`MeshError::MissingContribution`] if the vertex feeds nothing.
    pub fn next_level_contributions(&self, prev_level_vertex: usize) -> Result<Vec<Contribution>> {
        self.lookup(&self.by_prev, prev_level_vertex, LevelSide::Previous)
    }

    fn lookup(&self, table: &[Vec<usize>], vertex: usize, side: LevelSide) -> Result<Vec<Contribution>> {
        match table.get(vertex) {
            Some(indices) if !indices.is_empty() => {
                Ok(indices.iter().map(|&i| self.contributions[i]).collect())
            }
            _ => Err(MeshError::MissingContribution { vertex, side }),
        }
    }

    /// Sum of the weights that produced a finer-level vertex.
    pub fn weight_sum(&self, next_level_vertex: usize) -> f64 {
        self.by_next
            .get(next_level_vertex)
            .map(|indices| indices.iter().map(|&i| self.contributions[i].amount).sum())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> ContributionMap {
        // next 0 = prev 0; next 1 = 0.5 * (prev 0 + prev 1)
        let mut map = ContributionMap::new(2, 2);
        map.add(0, 0, 1.0);
        map.add(0, 1, 0.5);
        map.add(1, 1, 0.5);
        map
    }

    #[test]
    fn test_both_directions() {
        let map = sample_map();
        assert_eq!(map.len(), 3);

        let sources = map.prev_level_contributions(1).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().all(|c| c.next_level_vertex == 1));

        let targets = map.next_level_contributions(0).unwrap();
        let mut next: Vec<usize> = targets.iter().map(|c| c.next_level_vertex).collect();
        next.sort_unstable();
        assert_eq!(next, vec![0, 1]);
    }

    #[test]
    fn test_weight_sum() {
        let map = sample_map();
        assert!((map.weight_sum(0) - 1.0).abs() < 1e-12);
        assert!((map.weight_sum(1) - 1.0).abs() < 1e-12);
        assert_eq!(map.weight_sum(7), 0.0);
    }

    #[test]
    fn test_missing_vertex() {
        let map = sample_map();
        assert!(matches!(
            map.prev_level_contributions(5),
            Err(MeshError::MissingContribution { vertex: 5, side: LevelSide::Next })
        ));

        let sparse = ContributionMap::new(3, 1);
        assert!(matches!(
            sparse.next_level_contributions(2),
            Err(MeshError::MissingContribution { vertex: 2, side: LevelSide::Previous })
        ));
    }

    #[test]
    fn test_grows_tables() {
        let mut map = ContributionMap::new(0, 0);
        map.add(4, 9, 1.0);
        assert_eq!(map.num_prev_vertices(), 5);
        assert_eq!(map.num_next_vertices(), 10);
        assert!(map.prev_level_contributions(9).is_ok());
    }
}
