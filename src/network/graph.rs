//! Undirected contact graphs over the local node indices of one subcluster.
use rand::Rng;

use crate::HashSet;

/// Adjacency lists indexed by local node. Node `i` corresponds to member `i`
/// of the owning subcluster. There are no self-loops or parallel edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactGraph {
    adjacency: Vec<Vec<usize>>,
}

impl ContactGraph {
    #[must_use]
    pub fn empty(node_count: usize) -> ContactGraph {
        ContactGraph {
            adjacency: vec![Vec::new(); node_count],
        }
    }

    /// Every pair of nodes is connected.
    #[must_use]
    pub fn complete(node_count: usize) -> ContactGraph {
        let adjacency = (0..node_count)
            .map(|node| (0..node_count).filter(|other| *other != node).collect())
            .collect();
        ContactGraph { adjacency }
    }

    /// Barabási–Albert preferential attachment. Each new node attaches to
    /// `edges_per_node` distinct existing nodes chosen with probability
    /// proportional to their degree, which grows a few high-degree hubs.
    /// `edges_per_node` is clamped to `node_count - 1`; fewer than two nodes
    /// gives an edgeless graph.
    pub fn preferential_attachment<R: Rng + ?Sized>(
        node_count: usize,
        edges_per_node: usize,
        rng: &mut R,
    ) -> ContactGraph {
        let mut graph = ContactGraph::empty(node_count);
        if node_count < 2 {
            return graph;
        }
        let m = edges_per_node.clamp(1, node_count - 1);

        // Every endpoint of every edge, so a uniform pick is degree-weighted.
        let mut repeated_nodes: Vec<usize> = Vec::with_capacity(2 * m * node_count);
        let mut targets: Vec<usize> = (0..m).collect();
        for source in m..node_count {
            for &target in &targets {
                graph.add_edge(source, target);
            }
            repeated_nodes.extend(&targets);
            repeated_nodes.extend(std::iter::repeat_n(source, m));

            let mut chosen: HashSet<usize> = HashSet::default();
            let mut next_targets = Vec::with_capacity(m);
            while next_targets.len() < m {
                let candidate = repeated_nodes[rng.random_range(0..repeated_nodes.len())];
                if chosen.insert(candidate) {
                    next_targets.push(candidate);
                }
            }
            targets = next_targets;
        }
        graph
    }

    fn add_edge(&mut self, a: usize, b: usize) {
        if a != b && !self.adjacency[a].contains(&b) {
            self.adjacency[a].push(b);
            self.adjacency[b].push(a);
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    #[must_use]
    pub fn degree(&self, node: usize) -> usize {
        self.adjacency.get(node).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.adjacency.get(a).is_some_and(|neighbors| neighbors.contains(&b))
    }

    /// Each edge once, as `(low, high)`, in a deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(node, neighbors)| {
            neighbors
                .iter()
                .filter(move |neighbor| **neighbor > node)
                .map(move |neighbor| (node, *neighbor))
        })
    }

    /// Deletes `node` and its edges by swapping the last node into its slot,
    /// mirroring `Vec::swap_remove` on the member list.
    pub fn swap_remove_node(&mut self, node: usize) {
        let last = self.adjacency.len() - 1;
        let neighbors = std::mem::take(&mut self.adjacency[node]);
        for neighbor in neighbors {
            self.adjacency[neighbor].retain(|other| *other != node);
        }
        if node != last {
            let moved = std::mem::take(&mut self.adjacency[last]);
            for &neighbor in &moved {
                for other in &mut self.adjacency[neighbor] {
                    if *other == last {
                        *other = node;
                    }
                }
            }
            self.adjacency[node] = moved;
        }
        self.adjacency.pop();
    }
}
