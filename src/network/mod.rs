//! The contact network: one `Cluster` per social structure, each split into
//! subclusters with a fixed contact graph. The network is built once and is
//! afterwards only changed to drop deceased agents or to hand the shopping
//! role to another household member.
mod cluster;
mod generator;
mod graph;

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

pub use cluster::{Cluster, Subcluster, Topology};
pub use generator::{ClusterSummary, GenerationShortfall, NetworkSummary};
pub use graph::ContactGraph;

use crate::context::Context;
use crate::define_data_plugin;
use crate::define_rng;
use crate::error::EpiError;
use crate::parameters::ContextParametersExt;
use crate::population::{Agent, AgentId, ContextPopulationExt};
use crate::random::ContextRandomExt;
use crate::HashMap;

define_rng!(InteractionRng);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter,
)]
pub enum ClusterType {
    Home,
    Work,
    School,
    Shopping,
}

/// The four interaction phases of a day, in the order they run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter,
)]
pub enum TimePeriod {
    Morning,
    Daytime,
    Evening,
    Night,
}

/// A realized meeting between two agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub first: AgentId,
    pub second: AgentId,
    pub cluster: ClusterType,
}

pub type DailyInteractions = BTreeMap<TimePeriod, Vec<Contact>>;

/// Minimum age of a minor who can take over household shopping.
pub const MIN_SHOPPER_AGE: u8 = 12;

#[derive(Debug, Default)]
pub struct Network {
    clusters: BTreeMap<ClusterType, Cluster>,
    // household subcluster index -> the member who shops for it
    shoppers: HashMap<usize, AgentId>,
    shopper_households: HashMap<AgentId, usize>,
}

impl Network {
    #[must_use]
    pub fn new() -> Network {
        Network::default()
    }

    /// Adds or replaces the cluster of its type. Clusters with no members are
    /// omitted.
    pub fn insert_cluster(&mut self, cluster: Cluster) {
        if cluster.subclusters().is_empty() {
            debug!("omitting empty {} cluster", cluster.cluster_type);
            self.clusters.remove(&cluster.cluster_type);
            return;
        }
        self.clusters.insert(cluster.cluster_type, cluster);
    }

    pub fn set_shopper(&mut self, household: usize, shopper: AgentId) {
        if let Some(previous) = self.shoppers.insert(household, shopper) {
            self.shopper_households.remove(&previous);
        }
        self.shopper_households.insert(shopper, household);
    }

    #[must_use]
    pub fn cluster(&self, cluster_type: ClusterType) -> Option<&Cluster> {
        self.clusters.get(&cluster_type)
    }

    pub fn cluster_mut(&mut self, cluster_type: ClusterType) -> Option<&mut Cluster> {
        self.clusters.get_mut(&cluster_type)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn clusters_mut(&mut self) -> impl Iterator<Item = &mut Cluster> {
        self.clusters.values_mut()
    }

    /// Index of the household subcluster `agent` lives in.
    #[must_use]
    pub fn household_of(&self, agent: AgentId) -> Option<usize> {
        self.cluster(ClusterType::Home)
            .and_then(|home| home.subclusters_of(agent).first().copied())
    }

    #[must_use]
    pub fn shopper_for(&self, household: usize) -> Option<AgentId> {
        self.shoppers.get(&household).copied()
    }

    #[must_use]
    pub fn is_shopper(&self, agent: AgentId) -> bool {
        self.shopper_households.contains_key(&agent)
    }

    /// Removes `agent` from every subcluster and graph it appears in.
    pub fn remove_agent(&mut self, agent: AgentId) {
        for cluster in self.clusters.values_mut() {
            cluster.remove_agent(agent);
        }
        if let Some(household) = self.shopper_households.remove(&agent) {
            self.shoppers.remove(&household);
        }
    }

    /// Realized contacts of every cluster active in `period`.
    pub fn realize_interactions(
        &self,
        period: TimePeriod,
        trial: &mut impl FnMut(f64) -> bool,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();
        for cluster in self.clusters.values() {
            if cluster.is_active(period) {
                contacts.extend(cluster.realize_interactions(trial));
            }
        }
        contacts
    }
}

/// The best replacement shopper among `household`: an available adult first,
/// otherwise the oldest available member aged `MIN_SHOPPER_AGE` or over.
/// Ties keep household order.
pub(crate) fn pick_shopper<'a>(household: impl Iterator<Item = &'a Agent>) -> Option<AgentId> {
    let mut best: Option<&Agent> = None;
    for agent in household {
        if agent.age < MIN_SHOPPER_AGE {
            continue;
        }
        best = match best {
            None => Some(agent),
            Some(current) if current.is_adult() => Some(current),
            Some(_) if agent.is_adult() => Some(agent),
            Some(current) if agent.age > current.age => Some(agent),
            Some(current) => Some(current),
        };
    }
    best.map(|agent| agent.id)
}

define_data_plugin!(NetworkPlugin, Network, Network::new());

static EMPTY_NETWORK: Network = Network {
    clusters: BTreeMap::new(),
    shoppers: HashMap::with_hasher(rustc_hash::FxBuildHasher),
    shopper_households: HashMap::with_hasher(rustc_hash::FxBuildHasher),
};

pub trait ContextNetworkExt {
    /// Builds the contact network from the current population and the
    /// demographic and cluster parameters. Agents given a household by the
    /// generator have their `household_id` updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the population is empty.
    fn build_network(&mut self) -> Result<NetworkSummary, EpiError>;

    fn network(&self) -> &Network;

    fn network_mut(&mut self) -> &mut Network;

    /// Realized contacts for every time period of one day. Pairs that involve
    /// an admitted or removed agent are dropped.
    fn realize_daily_interactions(&self) -> DailyInteractions;

    /// Hands the shopping role of `agent`'s household to the best available
    /// member. If nobody can take over, a deceased shopper's household drops
    /// out of shopping and an admitted shopper keeps the role until
    /// `reassign_admitted_shoppers` finds someone.
    fn replace_shopper(&mut self, agent: AgentId);

    /// Runs `replace_shopper` for every shopper who is currently admitted, so
    /// a household picks up a member discharged since the shopper went in.
    fn reassign_admitted_shoppers(&mut self);

    fn remove_from_network(&mut self, agent: AgentId);
}

impl ContextNetworkExt for Context {
    fn build_network(&mut self) -> Result<NetworkSummary, EpiError> {
        if self.get_population_size() == 0 {
            return Err(EpiError::EpiError(
                "cannot build a network for an empty population".to_string(),
            ));
        }
        let (network, assignments, summary) = generator::generate(
            self,
            &self.get_params().demographics,
            &self.get_params().clusters,
        );
        for (agent, household_id) in assignments {
            if let Some(agent) = self.population_mut().get_mut(agent) {
                agent.household_id = Some(household_id);
            }
        }
        *self.network_mut() = network;
        info!("{summary}");
        Ok(summary)
    }

    fn network(&self) -> &Network {
        self.get_data_container(NetworkPlugin)
            .unwrap_or(&EMPTY_NETWORK)
    }

    fn network_mut(&mut self) -> &mut Network {
        self.get_data_container_mut(NetworkPlugin)
    }

    fn realize_daily_interactions(&self) -> DailyInteractions {
        let population = self.population();
        let available = |id: AgentId| population.get(id).is_some_and(|agent| !agent.is_admitted());
        let mut trial = |p: f64| self.sample_bool(InteractionRng, p);
        TimePeriod::iter()
            .map(|period| {
                let contacts = self
                    .network()
                    .realize_interactions(period, &mut trial)
                    .into_iter()
                    .filter(|contact| available(contact.first) && available(contact.second))
                    .collect();
                (period, contacts)
            })
            .collect()
    }

    fn replace_shopper(&mut self, agent: AgentId) {
        let network = self.network();
        let Some(&household) = network.shopper_households.get(&agent) else {
            return;
        };
        let Some(home) = network.cluster(ClusterType::Home) else {
            return;
        };
        let population = self.population();
        let candidates = home
            .subcluster(household)
            .map(|subcluster| subcluster.members().to_vec())
            .unwrap_or_default();
        let replacement = pick_shopper(
            candidates
                .iter()
                .filter(|id| **id != agent)
                .filter_map(|id| population.get(*id))
                .filter(|member| !member.is_admitted() && !member.infection().is_deceased()),
        );
        let shopper_gone = population
            .get(agent)
            .is_none_or(|shopper| shopper.infection().is_deceased());
        let shopping_slot = network
            .cluster(ClusterType::Shopping)
            .and_then(|shopping| shopping.subclusters_of(agent).first().copied());

        let network = self.network_mut();
        match (replacement, shopping_slot) {
            (Some(replacement), Some(slot)) => {
                let replaced = network
                    .cluster_mut(ClusterType::Shopping)
                    .is_some_and(|shopping| shopping.replace_member(slot, agent, replacement));
                if replaced {
                    network.set_shopper(household, replacement);
                    debug!("agent {replacement} now shops for household {household} in place of {agent}");
                }
            }
            _ if shopper_gone => {
                debug!("household {household} has no one left to shop");
                if let Some(shopping) = network.cluster_mut(ClusterType::Shopping) {
                    shopping.remove_agent(agent);
                }
                network.shopper_households.remove(&agent);
                network.shoppers.remove(&household);
            }
            _ => {}
        }
    }

    fn reassign_admitted_shoppers(&mut self) {
        let population = self.population();
        let mut admitted: Vec<AgentId> = self
            .network()
            .shopper_households
            .keys()
            .copied()
            .filter(|id| population.get(*id).is_some_and(Agent::is_admitted))
            .collect();
        admitted.sort_unstable();
        for shopper in admitted {
            self.replace_shopper(shopper);
        }
    }

    fn remove_from_network(&mut self, agent: AgentId) {
        self.network_mut().remove_agent(agent);
    }
}
