use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use parking_lot::RwLock;
use rand::Rng;

use crate::cosine::cosine_distance;
use crate::error::VecError;
use crate::vecstore::{Match, VecIndex, check_dim};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// HNSWConfig configures a new HNSW index.
#[derive(Debug, Clone)]
pub struct HNSWConfig {
    /// Vector dimension. Required; must be positive.
    pub dim: usize,
    /// Max links per node per layer (layer 0 allows 2*M).
    /// Default: 16.
    pub m: usize,
    /// Size of the dynamic candidate list during index building.
    /// Default: 200.
    pub ef_construction: usize,
}

impl HNSWConfig {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            m: 16,
            ef_construction: 200,
        }
    }

    fn with_defaults(mut self) -> Self {
        if self.m < 2 {
            self.m = 16;
        }
        if self.ef_construction == 0 {
            self.ef_construction = 200;
        }
        self
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A node slot together with its distance to the current query.
/// Orders by distance, then slot.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist: f32,
    slot: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

struct Node {
    id: u64,
    vector: Vec<f32>,
    /// links[layer] holds neighbor slots; the node lives on layers 0..links.len().
    links: Vec<Vec<u32>>,
}

struct Graph {
    cfg: HNSWConfig,
    nodes: Vec<Option<Node>>,
    slots: HashMap<u64, u32>,
    free: Vec<u32>,
    entry: Option<u32>,
    top_layer: usize,
    level_mul: f64,
}

impl Graph {
    fn node(&self, slot: u32) -> Option<&Node> {
        self.nodes.get(slot as usize).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, slot: u32) -> Option<&mut Node> {
        self.nodes.get_mut(slot as usize).and_then(Option::as_mut)
    }

    fn neighbors(&self, slot: u32, layer: usize) -> &[u32] {
        match self.node(slot).and_then(|nd| nd.links.get(layer)) {
            Some(links) => links,
            None => &[],
        }
    }

    fn distance(&self, query: &[f32], slot: u32) -> f32 {
        self.node(slot)
            .map_or(f32::MAX, |nd| cosine_distance(query, &nd.vector))
    }

    fn random_level(&self) -> usize {
        let r: f64 = rand::thread_rng().r#gen::<f64>().max(f64::MIN_POSITIVE);
        ((-r.ln() * self.level_mul) as usize).min(31)
    }

    /// Greedy walk from `start` through layers `from` down to `stop + 1`,
    /// moving to any closer neighbor until none improves.
    fn descend(&self, query: &[f32], start: u32, from: usize, stop: usize) -> u32 {
        let mut cur = start;
        let mut cur_dist = self.distance(query, cur);
        for layer in (stop + 1..=from).rev() {
            loop {
                let mut improved = false;
                for &next in self.neighbors(cur, layer) {
                    let d = self.distance(query, next);
                    if d < cur_dist {
                        cur = next;
                        cur_dist = d;
                        improved = true;
                    }
                }
                if !improved {
                    break;
                }
            }
        }
        cur
    }

    /// Beam search on one layer keeping the `ef` closest nodes seen.
    /// Returns them closest first.
    fn beam(&self, query: &[f32], entries: &[u32], ef: usize, layer: usize) -> Vec<Candidate> {
        let mut visited: HashSet<u32> = HashSet::with_capacity(ef * 2);
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

        for &slot in entries {
            if self.node(slot).is_none() || !visited.insert(slot) {
                continue;
            }
            let c = Candidate {
                dist: self.distance(query, slot),
                slot,
            };
            frontier.push(Reverse(c));
            best.push(c);
        }
        while best.len() > ef {
            best.pop();
        }

        while let Some(Reverse(near)) = frontier.pop() {
            if best.len() >= ef && best.peek().is_some_and(|far| near.dist > far.dist) {
                break;
            }
            for &next in self.neighbors(near.slot, layer) {
                if !visited.insert(next) {
                    continue;
                }
                let Some(nd) = self.node(next) else {
                    continue;
                };
                let dist = cosine_distance(query, &nd.vector);
                if best.len() < ef || best.peek().is_some_and(|far| dist < far.dist) {
                    let c = Candidate { dist, slot: next };
                    frontier.push(Reverse(c));
                    best.push(c);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }

    /// The `cap` slots from `pool` closest to `origin`, skipping empty slots.
    fn closest(&self, origin: &[f32], pool: impl IntoIterator<Item = u32>, cap: usize) -> Vec<u32> {
        let mut scored: Vec<Candidate> = pool
            .into_iter()
            .filter_map(|s| {
                self.node(s).map(|other| Candidate {
                    dist: cosine_distance(origin, &other.vector),
                    slot: s,
                })
            })
            .collect();
        scored.sort();
        scored.dedup_by_key(|c| c.slot);
        scored.truncate(cap);
        scored.into_iter().map(|c| c.slot).collect()
    }

    /// Add a directed link and prune `from` back to `cap` closest links.
    fn link(&mut self, from: u32, to: u32, layer: usize, cap: usize) {
        let links = {
            let Some(nd) = self.node(from) else {
                return;
            };
            let Some(current) = nd.links.get(layer) else {
                return;
            };
            if current.len() < cap {
                let mut links = current.clone();
                links.push(to);
                links
            } else {
                let pool = current.iter().copied().chain([to]);
                self.closest(&nd.vector, pool, cap)
            }
        };
        if let Some(nd) = self.node_mut(from) {
            nd.links[layer] = links;
        }
    }

    fn insert(&mut self, id: u64, vector: &[f32]) {
        if let Some(old) = self.slots.get(&id).copied() {
            self.remove(old);
        }

        let level = self.random_level();
        let node = Node {
            id,
            vector: vector.to_vec(),
            links: vec![Vec::new(); level + 1],
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                (self.nodes.len() - 1) as u32
            }
        };
        self.slots.insert(id, slot);

        let Some(entry) = self.entry else {
            self.entry = Some(slot);
            self.top_layer = level;
            return;
        };

        let start = self.descend(vector, entry, self.top_layer, level);
        let mut entries = vec![start];
        for layer in (0..=level.min(self.top_layer)).rev() {
            let found = self.beam(vector, &entries, self.cfg.ef_construction, layer);
            let cap = self.cfg.max_links(layer);
            let chosen: Vec<u32> = found.iter().take(cap).map(|c| c.slot).collect();
            if let Some(nd) = self.node_mut(slot) {
                nd.links[layer] = chosen.clone();
            }
            for &n in &chosen {
                self.link(n, slot, layer, cap);
            }
            entries = found.into_iter().map(|c| c.slot).collect();
        }

        if level > self.top_layer {
            self.entry = Some(slot);
            self.top_layer = level;
        }
    }

    fn remove(&mut self, slot: u32) {
        let Some(gone) = self.nodes.get_mut(slot as usize).and_then(Option::take) else {
            return;
        };
        self.slots.remove(&gone.id);
        self.free.push(slot);

        // Links are pruned one-way, so any node may still point here. Each
        // one that does is relinked over its remaining links plus the
        // removed node's links on that layer.
        let mut stale: Vec<(u32, usize)> = Vec::new();
        for (i, nd) in self.nodes.iter().enumerate() {
            let Some(nd) = nd else {
                continue;
            };
            for (layer, links) in nd.links.iter().enumerate() {
                if links.contains(&slot) {
                    stale.push((i as u32, layer));
                }
            }
        }

        for (from, layer) in stale {
            let links = {
                let Some(nd) = self.node(from) else {
                    continue;
                };
                let inherited = gone.links.get(layer).map_or(&[][..], Vec::as_slice);
                let pool = nd.links[layer]
                    .iter()
                    .chain(inherited)
                    .copied()
                    .filter(|&s| s != slot && s != from);
                self.closest(&nd.vector, pool, self.cfg.max_links(layer))
            };
            if let Some(nd) = self.node_mut(from) {
                nd.links[layer] = links;
            }
        }

        if self.entry == Some(slot) {
            self.reselect_entry();
        }
    }

    fn reselect_entry(&mut self) {
        let top = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, nd)| nd.as_ref().map(|nd| (i as u32, nd.links.len() - 1)))
            .max_by_key(|&(_, level)| level);
        match top {
            Some((slot, level)) => {
                self.entry = Some(slot);
                self.top_layer = level;
            }
            None => {
                self.entry = None;
                self.top_layer = 0;
            }
        }
    }

    fn search(&self, query: &[f32], top_k: usize, ef: usize) -> Vec<Match> {
        let Some(entry) = self.entry else {
            return vec![];
        };
        let start = self.descend(query, entry, self.top_layer, 0);
        self.beam(query, &[start], ef, 0)
            .into_iter()
            .take(top_k)
            .filter_map(|c| {
                self.node(c.slot).map(|nd| Match {
                    id: nd.id,
                    distance: c.dist,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// HNSW
// ---------------------------------------------------------------------------

/// HNSW is a Hierarchical Navigable Small World index implementing [VecIndex].
///
/// The search-time beam width is the `num_candidates` argument of
/// [`VecIndex::search`], so callers tune recall per query.
/// All methods are safe for concurrent use.
pub struct HNSW {
    dim: usize,
    graph: RwLock<Graph>,
}

impl HNSW {
    /// Create an empty HNSW index. Fails if `cfg.dim` is zero.
    pub fn new(cfg: HNSWConfig) -> Result<Self, VecError> {
        if cfg.dim == 0 {
            return Err(VecError::ZeroDimension);
        }
        let cfg = cfg.with_defaults();
        let level_mul = 1.0 / (cfg.m as f64).ln();
        Ok(Self {
            dim: cfg.dim,
            graph: RwLock::new(Graph {
                cfg,
                nodes: Vec::new(),
                slots: HashMap::new(),
                free: Vec::new(),
                entry: None,
                top_layer: 0,
                level_mul,
            }),
        })
    }
}

impl VecIndex for HNSW {
    fn dim(&self) -> usize {
        self.dim
    }

    fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VecError> {
        check_dim(vector, self.dim)?;
        self.graph.write().insert(id, vector);
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        num_candidates: usize,
    ) -> Result<Vec<Match>, VecError> {
        check_dim(query, self.dim)?;
        if top_k == 0 {
            return Ok(vec![]);
        }
        Ok(self
            .graph
            .read()
            .search(query, top_k, num_candidates.max(top_k)))
    }

    fn delete(&self, id: u64) {
        let mut graph = self.graph.write();
        if let Some(slot) = graph.slots.get(&id).copied() {
            graph.remove(slot);
        }
    }

    fn len(&self) -> usize {
        self.graph.read().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_test_hnsw(dim: usize) -> HNSW {
        HNSW::new(HNSWConfig {
            dim,
            m: 8,
            ef_construction: 64,
        })
        .unwrap()
    }

    #[test]
    fn test_insert_and_search() {
        let h = new_test_hnsw(4);
        h.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        h.insert(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        h.insert(3, &[0.9, 0.1, 0.0, 0.0]).unwrap();

        let matches = h.search(&[1.0, 0.0, 0.0, 0.0], 2, 32).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, 1);
        assert_eq!(matches[1].id, 3);
    }

    #[test]
    fn test_dimension_mismatch() {
        let h = new_test_hnsw(4);
        assert!(h.insert(1, &[1.0, 0.0, 0.0]).is_err());
        h.insert(2, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(
            h.search(&[1.0, 0.0], 1, 32),
            Err(VecError::DimensionMismatch { got: 2, want: 4 })
        );
        assert_eq!(h.search(&[], 1, 32), Err(VecError::EmptyVector));
    }

    #[test]
    fn test_delete() {
        let h = new_test_hnsw(3);
        h.insert(1, &[1.0, 0.0, 0.0]).unwrap();
        h.insert(2, &[0.0, 1.0, 0.0]).unwrap();
        h.insert(3, &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(h.len(), 3);

        h.delete(2);
        assert_eq!(h.len(), 2);

        let matches = h.search(&[0.0, 1.0, 0.0], 3, 32).unwrap();
        assert!(matches.iter().all(|m| m.id != 2));

        h.delete(99);
    }

    #[test]
    fn test_delete_entry_point() {
        let h = new_test_hnsw(3);
        h.insert(1, &[1.0, 0.0, 0.0]).unwrap();
        h.insert(2, &[0.0, 1.0, 0.0]).unwrap();

        h.delete(1);
        h.delete(2);
        assert!(h.is_empty());

        h.insert(3, &[0.0, 0.0, 1.0]).unwrap();
        let matches = h.search(&[0.0, 0.0, 1.0], 1, 32).unwrap();
        assert_eq!(matches[0].id, 3);
    }

    #[test]
    fn test_update_existing() {
        let h = new_test_hnsw(3);
        h.insert(1, &[1.0, 0.0, 0.0]).unwrap();
        h.insert(2, &[0.0, 1.0, 0.0]).unwrap();
        h.insert(1, &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(h.len(), 2);

        let matches = h.search(&[0.0, 0.0, 1.0], 1, 32).unwrap();
        assert_eq!(matches[0].id, 1);
    }

    #[test]
    fn test_identical_vectors_keep_distinct_ids() {
        let h = new_test_hnsw(3);
        h.insert(1, &[0.2, 0.4, 0.6]).unwrap();
        h.insert(2, &[0.2, 0.4, 0.6]).unwrap();

        let matches = h.search(&[0.2, 0.4, 0.6], 5, 32).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.score() > 0.9999));
    }

    #[test]
    fn test_search_empty_and_top_k_zero() {
        let h = new_test_hnsw(3);
        assert!(h.search(&[1.0, 0.0, 0.0], 5, 32).unwrap().is_empty());
        h.insert(1, &[1.0, 0.0, 0.0]).unwrap();
        assert!(h.search(&[1.0, 0.0, 0.0], 0, 32).unwrap().is_empty());
    }

    #[test]
    fn test_zero_dim_rejected() {
        assert!(matches!(
            HNSW::new(HNSWConfig::new(0)),
            Err(VecError::ZeroDimension)
        ));
    }

    #[test]
    fn test_recall() {
        let dim = 32;
        let n = 2000;
        let queries = 50;
        let top_k = 10;

        let mut rng = rand::thread_rng();
        let h = HNSW::new(HNSWConfig {
            dim,
            m: 16,
            ef_construction: 128,
        })
        .unwrap();

        let mut vecs = Vec::with_capacity(n);
        for i in 0..n {
            let v = rand_unit_vec(&mut rng, dim);
            h.insert(i as u64, &v).unwrap();
            vecs.push(v);
        }

        let mut total_recall = 0.0;
        for _ in 0..queries {
            let query = rand_unit_vec(&mut rng, dim);

            let mut truth: Vec<(u64, f32)> = vecs
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u64, cosine_distance(&query, v)))
                .collect();
            truth.sort_by(|a, b| a.1.total_cmp(&b.1));
            let truth_set: HashSet<u64> = truth.iter().take(top_k).map(|(i, _)| *i).collect();

            let matches = h.search(&query, top_k, 64).unwrap();
            let hits = matches.iter().filter(|m| truth_set.contains(&m.id)).count();
            total_recall += hits as f64 / top_k as f64;
        }

        let avg_recall = total_recall / queries as f64;
        assert!(
            avg_recall >= 0.80,
            "recall {avg_recall:.3} is below 0.80 threshold"
        );
    }

    #[test]
    fn test_self_recall_after_heavy_deletes() {
        let dim = 16;
        let n = 2000;

        let mut rng = rand::thread_rng();
        let h = new_test_hnsw(dim);
        let vecs: Vec<Vec<f32>> = (0..n).map(|_| rand_unit_vec(&mut rng, dim)).collect();
        for (i, v) in vecs.iter().enumerate() {
            h.insert(i as u64, v).unwrap();
        }
        for i in 0..n {
            if i % 10 != 0 {
                h.delete(i as u64);
            }
        }
        assert_eq!(h.len(), n / 10);

        let mut misses = 0;
        for i in (0..n).step_by(10) {
            let matches = h.search(&vecs[i], 1, 64).unwrap();
            if matches.first().map(|m| m.id) != Some(i as u64) {
                misses += 1;
            }
        }
        assert!(misses <= 2, "{misses}/{} survivors not found", n / 10);
    }

    fn rand_unit_vec(rng: &mut impl Rng, dim: usize) -> Vec<f32> {
        let v: Vec<f32> = (0..dim).map(|_| rng.r#gen::<f32>() - 0.5).collect();
        let norm = v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
        if norm > 0.0 {
            v.into_iter().map(|x| x / norm as f32).collect()
        } else {
            v
        }
    }
}
