//! Per-bucket minimal perfect hash over at most 255 keys.
//!
//! One key becomes one edge of a random 2-hash graph on `n` byte-indexed
//! vertices. A successful build finds `g` such that the wrapping byte sum
//! `g[h1(k) % n] + g[h2(k) % n]` is a distinct value in `[0, size)` for every
//! key. Vertices outside the graph's 2-core are free: their edges can take
//! any remaining id. The 2-core (critical) vertices are labelled first with
//! an increasing-value search that recycles skipped labels, then the trees
//! hanging off the core are solved by plain traversal.

use std::collections::{HashSet, VecDeque};

use log::trace;
use rand::rngs::StdRng;
use rand::Rng;

use crate::bits::BitSet;
use crate::error::BrzError;
use crate::graph::BucketGraph;
use crate::hash::{HashKind, HashState};

/// Assignment restarts before the bucket is declared unbuildable and the
/// caller repartitions.
pub(crate) const INNER_ATTEMPTS: u32 = 20;

/// Reseeds per restart while hunting for a simple graph. At load factor 1.0
/// a duplicate edge shows up in roughly every second draw, so this bound is
/// generous on purpose.
const GRAPH_ATTEMPTS: u32 = 100;

/// Vertex count for a bucket of `size` keys at load factor `c`.
///
/// `ceil(c * size)`, with a floor for very small buckets: below a handful of
/// keys the graph has too few distinct edges (two keys over two vertices can
/// only ever produce the same edge), so tiny buckets get two spare vertices.
/// Builder and evaluator must agree on this value, so both call here.
#[inline]
pub(crate) fn vertex_count(c: f32, size: u32) -> u32 {
    if size == 0 {
        return 0;
    }
    let n = (c * size as f32).ceil() as u32;
    if (2..=8).contains(&size) {
        n.max(size + 2)
    } else {
        n.max(1)
    }
}

/// The two g-table slots for a key, with the `h1 == h2` tie broken by
/// stepping h2 one slot forward (wrapping). Used verbatim by the evaluator.
#[inline]
pub(crate) fn edge_endpoints(h1: u32, h2: u32, n: u32) -> (u32, u32) {
    let a = h1 % n;
    let mut b = h2 % n;
    if a == b {
        b += 1;
        if b >= n {
            b = 0;
        }
    }
    (a, b)
}

/// A built per-bucket function: the byte table plus its two hash states.
pub(crate) struct Bmz8 {
    pub g: Vec<u8>,
    pub h1: HashState,
    pub h2: HashState,
    pub size: usize,
}

impl Bmz8 {
    /// Bucket-local id of `key` in `[0, size)` (for member keys).
    pub fn index(&self, key: &[u8]) -> usize {
        let n = self.g.len() as u32;
        let (a, b) = edge_endpoints(self.h1.hash(key), self.h2.hash(key), n);
        let sum = self.g[a as usize].wrapping_add(self.g[b as usize]);
        sum as usize % self.size
    }

    /// Build the function for `keys` (1..=255 distinct byte strings),
    /// resampling h1/h2 seeds until the graph is simple and assignable.
    pub fn build(
        keys: &[Vec<u8>],
        c: f32,
        kinds: (HashKind, HashKind),
        rng: &mut StdRng,
    ) -> Result<Self, BrzError> {
        let size = keys.len();
        debug_assert!((1..=255).contains(&size));
        let n = vertex_count(c, size as u32) as usize;

        if n == 1 {
            // One key over one slot: the sum 2*g[0] must be 0, so g = [0].
            return Ok(Self {
                g: vec![0],
                h1: HashState::new(kinds.0, rng.random()),
                h2: HashState::new(kinds.1, rng.random()),
                size,
            });
        }

        for attempt in 1..=INNER_ATTEMPTS {
            let Some((h1, h2, graph)) = sample_simple_graph(keys, kinds, n, rng) else {
                trace!("bucket attempt {attempt}: no simple graph found");
                continue;
            };

            let Some(g) = assign(&graph) else {
                trace!("bucket attempt {attempt}: assignment failed, reseeding");
                continue;
            };

            let built = Self { g, h1, h2, size };
            if built.is_bijective(keys) {
                return Ok(built);
            }
            trace!("bucket attempt {attempt}: assignment not bijective, reseeding");
        }
        Err(BrzError::BucketAssignFailed(INNER_ATTEMPTS))
    }

    /// Every key maps to a distinct id in `[0, size)`. Cheap relative to the
    /// build itself; a failed check downgrades to one more seed attempt.
    fn is_bijective(&self, keys: &[Vec<u8>]) -> bool {
        let mut seen = BitSet::new(self.size);
        for key in keys {
            let n = self.g.len() as u32;
            let (a, b) = edge_endpoints(self.h1.hash(key), self.h2.hash(key), n);
            let id = self.g[a as usize].wrapping_add(self.g[b as usize]) as usize;
            if id >= self.size || seen.test(id) {
                return false;
            }
            seen.set(id);
        }
        true
    }
}

/// Draw h1/h2 seeds until the induced graph is simple.
fn sample_simple_graph(
    keys: &[Vec<u8>],
    kinds: (HashKind, HashKind),
    n: usize,
    rng: &mut StdRng,
) -> Option<(HashState, HashState, BucketGraph)> {
    for _ in 0..GRAPH_ATTEMPTS {
        let h1 = HashState::new(kinds.0, rng.random());
        let h2 = HashState::new(kinds.1, rng.random());
        if let Some(endpoints) = gen_edges(keys, &h1, &h2, n) {
            return Some((h1, h2, BucketGraph::new(n, endpoints)));
        }
    }
    None
}

/// Hash every key into an edge. `None` if a self-loop survives the tie-break
/// or two keys produce the same undirected edge (parallel edges cannot take
/// distinct ids, since both sums are equal).
fn gen_edges(keys: &[Vec<u8>], h1: &HashState, h2: &HashState, n: usize) -> Option<Vec<(u16, u16)>> {
    let mut seen = HashSet::with_capacity(keys.len());
    let mut endpoints = Vec::with_capacity(keys.len());
    for key in keys {
        let (a, b) = edge_endpoints(h1.hash(key), h2.hash(key), n as u32);
        if a == b {
            return None;
        }
        if !seen.insert((a.min(b), a.max(b))) {
            return None;
        }
        endpoints.push((a as u16, b as u16));
    }
    Some(endpoints)
}

/// Label every vertex so each edge's wrapping byte sum is a distinct id in
/// `[0, edge_count)`. `None` means this graph admits no labelling under the
/// search below and the caller should reseed.
fn assign(graph: &BucketGraph) -> Option<Vec<u8>> {
    let n = graph.vertex_count();
    let critical = graph.critical_vertices();
    trace!(
        "assigning {} edges over {n} vertices ({} critical)",
        graph.edge_count(),
        critical.count()
    );

    let mut g = vec![0u8; n];
    let mut visited = BitSet::new(n);
    let mut used = BitSet::new(graph.edge_count().max(1));
    // Labels skipped while resolving collisions; reusable for later vertices.
    let mut spare: Vec<u32> = Vec::new();
    let mut biggest_g: u32 = 0;

    for v in 0..n {
        if critical.test(v) && !visited.test(v) {
            assign_critical_component(
                graph,
                v,
                &critical,
                &mut g,
                &mut visited,
                &mut used,
                &mut spare,
                &mut biggest_g,
            )?;
        }
    }

    assign_trees(graph, &mut g, &mut visited, &mut used);
    Some(g)
}

enum Candidate {
    Fits,
    Collides,
    Overflows,
}

/// How the label `cand` for vertex `u` interacts with the ids of u's edges
/// into already-labelled critical vertices.
fn probe(
    graph: &BucketGraph,
    u: usize,
    cand: u32,
    critical: &BitSet,
    visited: &BitSet,
    g: &[u8],
    used: &BitSet,
) -> Candidate {
    let m = graph.edge_count() as u32;
    for (_, w) in graph.neighbors(u) {
        if !(critical.test(w) && visited.test(w)) {
            continue;
        }
        let id = cand + g[w] as u32;
        if id >= m {
            return Candidate::Overflows;
        }
        if used.test(id as usize) {
            return Candidate::Collides;
        }
    }
    Candidate::Fits
}

/// BFS one 2-core component, labelling each vertex with the first workable
/// value: recycled spare labels first, then fresh ones above `biggest_g`.
/// Labels are never repeated across critical vertices, so the ids a new
/// vertex claims are distinct among themselves by construction.
#[allow(clippy::too_many_arguments)]
fn assign_critical_component(
    graph: &BucketGraph,
    start: usize,
    critical: &BitSet,
    g: &mut [u8],
    visited: &mut BitSet,
    used: &mut BitSet,
    spare: &mut Vec<u32>,
    biggest_g: &mut u32,
) -> Option<()> {
    let mut queue = VecDeque::new();
    g[start] = 0;
    visited.set(start);
    queue.push_back(start);

    while let Some(v) = queue.pop_front() {
        for (_, u) in graph.neighbors(v) {
            if !critical.test(u) || visited.test(u) {
                continue;
            }

            let mut spare_idx = 0;
            let mut from_spare = true;
            let next_g = loop {
                if from_spare && spare_idx >= spare.len() {
                    from_spare = false;
                }
                let cand = if from_spare {
                    spare[spare_idx]
                } else {
                    *biggest_g + 1
                };
                match probe(graph, u, cand, critical, visited, g, used) {
                    Candidate::Fits => break cand,
                    // Spares are ascending and fresh labels only grow, so
                    // every remaining candidate overflows as well.
                    Candidate::Overflows => return None,
                    Candidate::Collides => {
                        if from_spare {
                            spare_idx += 1;
                        } else {
                            spare.push(cand);
                            *biggest_g += 1;
                        }
                    }
                }
            };

            if from_spare {
                // Keep the spare list ascending.
                spare.remove(spare_idx);
            } else {
                *biggest_g = next_g;
            }
            for (_, w) in graph.neighbors(u) {
                if critical.test(w) && visited.test(w) {
                    used.set((next_g + g[w] as u32) as usize);
                }
            }
            // next_g + g[w] < edge_count <= 255 for at least one neighbor,
            // so the label itself fits a byte.
            g[u] = next_g as u8;
            visited.set(u);
            queue.push_back(u);
        }
    }
    Some(())
}

/// Give every edge outside the 2-core the next unused id by walking the
/// pendant trees outward from labelled vertices, then any core-free
/// components from an arbitrary zero-labelled root. Wrapping subtraction
/// always yields a valid byte, so this phase cannot fail.
fn assign_trees(graph: &BucketGraph, g: &mut [u8], visited: &mut BitSet, used: &mut BitSet) {
    let m = graph.edge_count();
    let mut next_id = 0usize;

    for e in 0..m {
        let (a, b) = graph.edge(e);
        match (visited.test(a), visited.test(b)) {
            (true, false) => traverse(graph, a, g, visited, used, &mut next_id),
            (false, true) => traverse(graph, b, g, visited, used, &mut next_id),
            _ => {}
        }
    }

    for e in 0..m {
        let (a, b) = graph.edge(e);
        if visited.test(a) || visited.test(b) {
            continue;
        }
        g[a] = 0;
        visited.set(a);
        traverse(graph, a, g, visited, used, &mut next_id);
    }
}

fn traverse(
    graph: &BucketGraph,
    root: usize,
    g: &mut [u8],
    visited: &mut BitSet,
    used: &mut BitSet,
    next_id: &mut usize,
) {
    let mut stack = vec![root];
    while let Some(v) = stack.pop() {
        for (_, w) in graph.neighbors(v) {
            if visited.test(w) {
                continue;
            }
            debug_assert!(*next_id < graph.edge_count());
            while used.test(*next_id) {
                *next_id += 1;
            }
            used.set(*next_id);
            g[w] = (*next_id as u8).wrapping_sub(g[v]);
            visited.set(w);
            *next_id += 1;
            stack.push(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashSet;

    const KINDS: (HashKind, HashKind) = (HashKind::Jenkins, HashKind::Jenkins);

    fn keys(count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| format!("bucket-key-{i:05}").into_bytes())
            .collect()
    }

    fn assert_bijective(bmz: &Bmz8, keys: &[Vec<u8>]) {
        let ids: HashSet<usize> = keys.iter().map(|k| bmz.index(k)).collect();
        assert_eq!(ids.len(), keys.len());
        assert!(ids.iter().all(|&id| id < keys.len()));
    }

    #[test]
    fn single_key_maps_to_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let keys = keys(1);
        let bmz = Bmz8::build(&keys, 1.0, KINDS, &mut rng).unwrap();
        assert_eq!(bmz.index(&keys[0]), 0);
    }

    #[test]
    fn tiny_buckets_are_bijective() {
        let mut rng = StdRng::seed_from_u64(2);
        for count in 2..=12 {
            let keys = keys(count);
            let bmz = Bmz8::build(&keys, 1.0, KINDS, &mut rng).unwrap();
            assert_bijective(&bmz, &keys);
        }
    }

    #[test]
    fn full_bucket_is_bijective() {
        let mut rng = StdRng::seed_from_u64(3);
        let keys = keys(255);
        let bmz = Bmz8::build(&keys, 1.0, KINDS, &mut rng).unwrap();
        assert_eq!(bmz.g.len(), 255);
        assert_bijective(&bmz, &keys);
    }

    #[test]
    fn typical_bucket_sizes_build_at_default_load() {
        let mut rng = StdRng::seed_from_u64(4);
        for count in [64, 128, 170, 200] {
            let keys = keys(count);
            let bmz = Bmz8::build(&keys, 1.0, KINDS, &mut rng).unwrap();
            assert_bijective(&bmz, &keys);
        }
    }

    #[test]
    fn sparse_and_dense_load_factors() {
        let mut rng = StdRng::seed_from_u64(5);
        let keys = keys(100);
        for c in [0.93f32, 1.15, 2.0] {
            let bmz = Bmz8::build(&keys, c, KINDS, &mut rng).unwrap();
            assert_eq!(bmz.g.len(), vertex_count(c, 100) as usize);
            assert_bijective(&bmz, &keys);
        }
    }

    #[test]
    fn murmur_kind_builds_too() {
        let mut rng = StdRng::seed_from_u64(6);
        let keys = keys(50);
        let bmz = Bmz8::build(&keys, 1.0, (HashKind::Murmur2, HashKind::Murmur2), &mut rng).unwrap();
        assert_bijective(&bmz, &keys);
    }

    #[test]
    fn vertex_count_formula() {
        assert_eq!(vertex_count(1.0, 0), 0);
        assert_eq!(vertex_count(1.0, 1), 1);
        assert_eq!(vertex_count(1.0, 2), 4); // small-bucket floor
        assert_eq!(vertex_count(1.0, 9), 9);
        assert_eq!(vertex_count(1.0, 170), 170);
        assert_eq!(vertex_count(0.93, 200), 186);
        assert_eq!(vertex_count(2.0, 100), 200);
    }

    #[test]
    fn tie_break_steps_forward() {
        assert_eq!(edge_endpoints(5, 5, 10), (5, 6));
        assert_eq!(edge_endpoints(9, 19, 10), (9, 0));
        assert_eq!(edge_endpoints(9, 9, 10), (9, 0));
        assert_eq!(edge_endpoints(3, 7, 10), (3, 7));
    }
}
