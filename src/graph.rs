//! The 2-hash multigraph built for one bucket.
//!
//! Vertices are the g-table slots, one edge per key. The adjacency is a flat
//! CSR layout (offsets plus an edge-index array); peeling degree-<=-1
//! vertices leaves the 2-core, whose members are the critical vertices.

use crate::bits::BitSet;

pub(crate) struct BucketGraph {
    nvertices: usize,
    endpoints: Vec<(u16, u16)>,
    off: Vec<u32>,
    adj: Vec<u16>,
}

impl BucketGraph {
    /// Build the CSR adjacency for `nvertices` slots and the given edges.
    /// Self-loops are not representable here; callers resolve them before
    /// construction.
    pub fn new(nvertices: usize, endpoints: Vec<(u16, u16)>) -> Self {
        debug_assert!(endpoints
            .iter()
            .all(|&(a, b)| a != b && (a as usize) < nvertices && (b as usize) < nvertices));

        let mut deg = vec![0u32; nvertices];
        for &(a, b) in &endpoints {
            deg[a as usize] += 1;
            deg[b as usize] += 1;
        }

        let mut off = vec![0u32; nvertices + 1];
        for v in 0..nvertices {
            off[v + 1] = off[v] + deg[v];
        }

        let mut cursor = off.clone();
        let mut adj = vec![0u16; off[nvertices] as usize];
        for (e, &(a, b)) in endpoints.iter().enumerate() {
            adj[cursor[a as usize] as usize] = e as u16;
            cursor[a as usize] += 1;
            adj[cursor[b as usize] as usize] = e as u16;
            cursor[b as usize] += 1;
        }

        Self {
            nvertices,
            endpoints,
            off,
            adj,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.nvertices
    }

    pub fn edge_count(&self) -> usize {
        self.endpoints.len()
    }

    #[inline]
    pub fn edge(&self, e: usize) -> (usize, usize) {
        let (a, b) = self.endpoints[e];
        (a as usize, b as usize)
    }

    /// Incident edges of `v` as `(edge index, other endpoint)`. Parallel
    /// edges appear once each.
    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let start = self.off[v] as usize;
        let end = self.off[v + 1] as usize;
        self.adj[start..end].iter().map(move |&e| {
            let (a, b) = self.edge(e as usize);
            let other = if a == v { b } else { a };
            (e as usize, other)
        })
    }

    /// Peel vertices of degree <= 1 until none remain; the residue is the
    /// 2-core. Returns the membership set of the core (the critical
    /// vertices).
    pub fn critical_vertices(&self) -> BitSet {
        let mut deg: Vec<u32> = vec![0; self.nvertices];
        for &(a, b) in &self.endpoints {
            deg[a as usize] += 1;
            deg[b as usize] += 1;
        }

        let mut dead_edge = BitSet::new(self.endpoints.len().max(1));
        let mut peeled = BitSet::new(self.nvertices);
        let mut stack: Vec<usize> = (0..self.nvertices).filter(|&v| deg[v] <= 1).collect();

        while let Some(v) = stack.pop() {
            if peeled.test(v) {
                continue;
            }
            peeled.set(v);
            for (e, w) in self.neighbors(v) {
                if dead_edge.test(e) {
                    continue;
                }
                dead_edge.set(e);
                deg[w] -= 1;
                if deg[w] <= 1 && !peeled.test(w) {
                    stack.push(w);
                }
            }
        }

        let mut critical = BitSet::new(self.nvertices);
        for v in 0..self.nvertices {
            if !peeled.test(v) {
                critical.set(v);
            }
        }
        critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_round_trip() {
        let g = BucketGraph::new(4, vec![(0, 1), (1, 2), (2, 3)]);
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.edge_count(), 3);

        let of1: Vec<_> = g.neighbors(1).collect();
        assert_eq!(of1.len(), 2);
        assert!(of1.contains(&(0, 0)));
        assert!(of1.contains(&(1, 2)));
    }

    #[test]
    fn path_peels_completely() {
        // A path has no 2-core.
        let g = BucketGraph::new(4, vec![(0, 1), (1, 2), (2, 3)]);
        assert_eq!(g.critical_vertices().count(), 0);
    }

    #[test]
    fn cycle_is_its_own_core() {
        let g = BucketGraph::new(3, vec![(0, 1), (1, 2), (2, 0)]);
        let crit = g.critical_vertices();
        assert_eq!(crit.count(), 3);
    }

    #[test]
    fn pendant_tree_peels_off_core() {
        // Triangle 0-1-2 with a tail 2-3-4 and an isolated vertex 5.
        let g = BucketGraph::new(6, vec![(0, 1), (1, 2), (2, 0), (2, 3), (3, 4)]);
        let crit = g.critical_vertices();
        assert!(crit.test(0));
        assert!(crit.test(1));
        assert!(crit.test(2));
        assert!(!crit.test(3));
        assert!(!crit.test(4));
        assert!(!crit.test(5));
    }

    #[test]
    fn parallel_edges_form_a_core() {
        let g = BucketGraph::new(3, vec![(0, 1), (0, 1), (1, 2)]);
        let crit = g.critical_vertices();
        assert!(crit.test(0));
        assert!(crit.test(1));
        assert!(!crit.test(2));
    }
}
