use crate::network::graph::ContactGraph;
use crate::network::{ClusterType, Contact, TimePeriod};
use crate::population::AgentId;
use crate::HashMap;

/// How a subcluster's contact graph is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Complete,
    PreferentialAttachment { edges_per_node: usize },
}

/// One household, workplace, school or shopping center.
#[derive(Debug, Clone)]
pub struct Subcluster {
    members: Vec<AgentId>,
    graph: ContactGraph,
    positions: HashMap<AgentId, usize>,
}

impl Subcluster {
    /// `graph` must have one node per member, in member order.
    #[must_use]
    pub fn new(members: Vec<AgentId>, graph: ContactGraph) -> Subcluster {
        debug_assert_eq!(members.len(), graph.node_count());
        let positions = members
            .iter()
            .enumerate()
            .map(|(position, agent)| (*agent, position))
            .collect();
        Subcluster {
            members,
            graph,
            positions,
        }
    }

    #[must_use]
    pub fn members(&self) -> &[AgentId] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn contains(&self, agent: AgentId) -> bool {
        self.positions.contains_key(&agent)
    }

    #[must_use]
    pub fn graph(&self) -> &ContactGraph {
        &self.graph
    }

    /// Agent pairs joined by an edge.
    pub fn edges(&self) -> impl Iterator<Item = (AgentId, AgentId)> + '_ {
        self.graph
            .edges()
            .map(|(a, b)| (self.members[a], self.members[b]))
    }

    /// Runs one Bernoulli trial per edge and returns the pairs that met.
    pub fn realize_interactions(
        &self,
        interaction_probability: f64,
        trial: &mut impl FnMut(f64) -> bool,
    ) -> Vec<(AgentId, AgentId)> {
        self.edges()
            .filter(|_| trial(interaction_probability))
            .collect()
    }

    /// Drops `agent` and its edges. Returns false if it was not a member.
    pub fn remove_member(&mut self, agent: AgentId) -> bool {
        let Some(position) = self.positions.remove(&agent) else {
            return false;
        };
        self.graph.swap_remove_node(position);
        self.members.swap_remove(position);
        if let Some(moved) = self.members.get(position) {
            self.positions.insert(*moved, position);
        }
        true
    }

    /// Puts `replacement` in the node `current` occupied, keeping its edges.
    /// Returns false if `current` is not a member or `replacement` already is.
    pub fn replace_member(&mut self, current: AgentId, replacement: AgentId) -> bool {
        if self.contains(replacement) {
            return false;
        }
        let Some(position) = self.positions.remove(&current) else {
            return false;
        };
        self.members[position] = replacement;
        self.positions.insert(replacement, position);
        true
    }
}

/// All subclusters of one type together with the settings that govern when
/// and how strongly they interact.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub cluster_type: ClusterType,
    pub active_periods: Vec<TimePeriod>,
    pub interaction_probability: f64,
    /// Probability before any distancing policy adjusted it.
    pub base_interaction_probability: f64,
    pub locked_down: bool,
    subclusters: Vec<Subcluster>,
    // agent -> indices of the subclusters it belongs to
    memberships: HashMap<AgentId, Vec<usize>>,
}

impl Cluster {
    #[must_use]
    pub fn new(
        cluster_type: ClusterType,
        active_periods: Vec<TimePeriod>,
        interaction_probability: f64,
    ) -> Cluster {
        Cluster {
            cluster_type,
            active_periods,
            interaction_probability,
            base_interaction_probability: interaction_probability,
            locked_down: false,
            subclusters: Vec::new(),
            memberships: HashMap::default(),
        }
    }

    /// Adds a subcluster and returns its index. Empty subclusters are dropped
    /// and return `None`.
    pub fn add_subcluster(&mut self, subcluster: Subcluster) -> Option<usize> {
        if subcluster.is_empty() {
            return None;
        }
        let index = self.subclusters.len();
        for agent in subcluster.members() {
            self.memberships.entry(*agent).or_default().push(index);
        }
        self.subclusters.push(subcluster);
        Some(index)
    }

    #[must_use]
    pub fn subclusters(&self) -> &[Subcluster] {
        &self.subclusters
    }

    #[must_use]
    pub fn subcluster(&self, index: usize) -> Option<&Subcluster> {
        self.subclusters.get(index)
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.subclusters.iter().map(Subcluster::len).sum()
    }

    #[must_use]
    pub fn subclusters_of(&self, agent: AgentId) -> &[usize] {
        self.memberships.get(&agent).map_or(&[], Vec::as_slice)
    }

    /// True if the cluster takes part in `period` and is not locked down.
    #[must_use]
    pub fn is_active(&self, period: TimePeriod) -> bool {
        !self.locked_down && self.active_periods.contains(&period)
    }

    pub fn realize_interactions(&self, trial: &mut impl FnMut(f64) -> bool) -> Vec<Contact> {
        let mut contacts = Vec::new();
        for subcluster in &self.subclusters {
            contacts.extend(
                subcluster
                    .realize_interactions(self.interaction_probability, trial)
                    .into_iter()
                    .map(|(first, second)| Contact {
                        first,
                        second,
                        cluster: self.cluster_type,
                    }),
            );
        }
        contacts
    }

    /// Removes `agent` from every subcluster it belongs to.
    pub fn remove_agent(&mut self, agent: AgentId) {
        if let Some(indices) = self.memberships.remove(&agent) {
            for index in indices {
                self.subclusters[index].remove_member(agent);
            }
        }
    }

    /// Swaps `replacement` into `current`'s place in subcluster `index`.
    pub fn replace_member(&mut self, index: usize, current: AgentId, replacement: AgentId) -> bool {
        let Some(subcluster) = self.subclusters.get_mut(index) else {
            return false;
        };
        if !subcluster.replace_member(current, replacement) {
            return false;
        }
        if let Some(indices) = self.memberships.get_mut(&current) {
            indices.retain(|other| *other != index);
            if indices.is_empty() {
                self.memberships.remove(&current);
            }
        }
        self.memberships.entry(replacement).or_default().push(index);
        true
    }
}
