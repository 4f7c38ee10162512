//! Partitions the population into clusters, one municipality at a time.
use std::collections::BTreeMap;
use std::fmt::{self, Display};

use log::{debug, warn};

use crate::context::Context;
use crate::define_rng;
use crate::network::cluster::{Cluster, Subcluster, Topology};
use crate::network::graph::ContactGraph;
use crate::network::{pick_shopper, ClusterType, Network};
use crate::parameters::{
    ClusterParameters, DemographicParameters, MunicipalityDemographics, WeightedSize,
};
use crate::population::{Agent, AgentId, ContextPopulationExt, Occupation};
use crate::random::ContextRandomExt;

define_rng!(NetworkGenerationRng);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSummary {
    pub cluster_type: ClusterType,
    pub subclusters: usize,
    pub members: usize,
    pub edges: usize,
}

/// A partition step that could not place everyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationShortfall {
    pub cluster_type: ClusterType,
    pub municipality: String,
    pub unassigned: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSummary {
    pub clusters: Vec<ClusterSummary>,
    pub shortfalls: Vec<GenerationShortfall>,
}

impl NetworkSummary {
    #[must_use]
    pub fn cluster(&self, cluster_type: ClusterType) -> Option<&ClusterSummary> {
        self.clusters
            .iter()
            .find(|summary| summary.cluster_type == cluster_type)
    }
}

impl Display for NetworkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network built:")?;
        for cluster in &self.clusters {
            write!(
                f,
                " {} {} subclusters/{} members/{} edges;",
                cluster.cluster_type, cluster.subclusters, cluster.members, cluster.edges
            )?;
        }
        write!(f, " {} shortfalls", self.shortfalls.len())
    }
}

fn topology(cluster_type: ClusterType, clusters: &ClusterParameters) -> Topology {
    match cluster_type {
        ClusterType::Home => Topology::Complete,
        _ => Topology::PreferentialAttachment {
            edges_per_node: clusters.settings(cluster_type).attachment_edges,
        },
    }
}

fn subcluster(context: &Context, members: Vec<AgentId>, topology: Topology) -> Subcluster {
    let graph = match topology {
        Topology::Complete => ContactGraph::complete(members.len()),
        Topology::PreferentialAttachment { edges_per_node } => {
            context.sample(NetworkGenerationRng, |rng| {
                ContactGraph::preferential_attachment(members.len(), edges_per_node, rng)
            })
        }
    };
    Subcluster::new(members, graph)
}

fn sample_size(context: &Context, sizes: &[WeightedSize]) -> usize {
    let weights: Vec<f64> = sizes.iter().map(|entry| entry.weight).collect();
    sizes[context.sample_weighted(NetworkGenerationRng, &weights)].size
}

/// Splits `agents` into `groups` consecutive groups whose sizes differ by at
/// most one, so none is larger than `ceil(len / groups)`.
fn split_evenly(agents: Vec<AgentId>, groups: usize) -> Vec<Vec<AgentId>> {
    let groups = groups.min(agents.len());
    if groups == 0 {
        return Vec::new();
    }
    let base = agents.len() / groups;
    let remainder = agents.len() % groups;
    let mut rest = agents.as_slice();
    (0..groups)
        .map(|group| {
            let (head, tail) = rest.split_at(base + usize::from(group < remainder));
            rest = tail;
            head.to_vec()
        })
        .collect()
}

/// Splits `agents` into consecutive groups of sizes drawn from `sizes`. The
/// last group takes whatever is left.
fn split_by_sampled_sizes(
    context: &Context,
    mut agents: Vec<AgentId>,
    sizes: &[WeightedSize],
) -> Vec<Vec<AgentId>> {
    let mut groups = Vec::new();
    while !agents.is_empty() {
        let size = sample_size(context, sizes).min(agents.len());
        let rest = agents.split_off(size);
        groups.push(agents);
        agents = rest;
    }
    groups
}

struct Households {
    groups: Vec<Vec<AgentId>>,
    // agents the generator placed, with the household id they were given
    assigned: Vec<(AgentId, u64)>,
}

fn build_households(
    context: &Context,
    municipality: &str,
    agents: &[&Agent],
    demographics: &MunicipalityDemographics,
    next_household_id: &mut u64,
    shortfalls: &mut Vec<GenerationShortfall>,
) -> Households {
    let mut preassigned: BTreeMap<u64, Vec<AgentId>> = BTreeMap::new();
    let mut pool = Vec::new();
    for agent in agents {
        match agent.household_id {
            Some(household_id) => preassigned.entry(household_id).or_default().push(agent.id),
            None => pool.push(agent.id),
        }
    }
    let mut groups = Vec::new();
    let mut assigned = Vec::new();

    let population = context.population();
    let is_adult = |id: &AgentId| population.get(*id).is_some_and(Agent::is_adult);
    context.shuffle(NetworkGenerationRng, &mut pool);

    // a given household without an adult takes one from the unassigned pool
    for (household_id, mut household) in preassigned {
        if !household.iter().any(is_adult) {
            let Some(position) = pool.iter().position(is_adult) else {
                warn!(
                    "{municipality}: household {household_id} has no adult and none is left to join it"
                );
                shortfalls.push(GenerationShortfall {
                    cluster_type: ClusterType::Home,
                    municipality: municipality.to_string(),
                    unassigned: household.len(),
                    reason: format!("household {household_id} has no adult"),
                });
                continue;
            };
            let adult = pool.remove(position);
            assigned.push((adult, household_id));
            household.push(adult);
        }
        groups.push(household);
    }

    while !pool.is_empty() {
        let size = sample_size(context, &demographics.household_sizes).min(pool.len());
        let rest = pool.split_off(size);
        let mut household = pool;
        pool = rest;

        if !household.iter().any(is_adult) {
            if let Some(position) = pool.iter().position(is_adult) {
                std::mem::swap(&mut household[0], &mut pool[position]);
            } else {
                let unassigned = household.len() + pool.len();
                warn!(
                    "{municipality}: {unassigned} agents left without a household because no adult remains"
                );
                shortfalls.push(GenerationShortfall {
                    cluster_type: ClusterType::Home,
                    municipality: municipality.to_string(),
                    unassigned,
                    reason: "no adult left to head a household".to_string(),
                });
                break;
            }
        }

        let household_id = *next_household_id;
        *next_household_id += 1;
        assigned.extend(household.iter().map(|agent| (*agent, household_id)));
        groups.push(household);
    }

    Households { groups, assigned }
}

fn build_workplaces(
    context: &Context,
    agents: &[&Agent],
    demographics: &MunicipalityDemographics,
    working_ages: (u8, u8),
) -> Vec<Vec<AgentId>> {
    let mut workers: Vec<AgentId> = agents
        .iter()
        .filter(|agent| {
            agent.occupation == Occupation::Worker
                && (working_ages.0..=working_ages.1).contains(&agent.age)
        })
        .map(|agent| agent.id)
        .collect();
    context.shuffle(NetworkGenerationRng, &mut workers);
    match demographics.company_count {
        Some(companies) => split_evenly(workers, companies as usize),
        None => split_by_sampled_sizes(context, workers, &demographics.workplace_sizes),
    }
}

fn build_schools(
    context: &Context,
    agents: &[&Agent],
    demographics: &MunicipalityDemographics,
) -> Vec<Vec<AgentId>> {
    let mut schools = Vec::new();
    let mut enrolled = crate::HashSet::default();
    for spec in &demographics.schools {
        let mut pupils: Vec<AgentId> = agents
            .iter()
            .filter(|agent| {
                agent.occupation != Occupation::Worker
                    && (spec.min_age..=spec.max_age).contains(&agent.age)
                    && !enrolled.contains(&agent.id)
            })
            .map(|agent| agent.id)
            .collect();
        enrolled.extend(pupils.iter().copied());
        context.shuffle(NetworkGenerationRng, &mut pupils);
        let groups = match spec.count {
            Some(count) => split_evenly(pupils, count as usize),
            None => pupils.chunks(spec.size).map(<[AgentId]>::to_vec).collect(),
        };
        debug!("{} schools: {}", spec.school_type, groups.len());
        schools.extend(groups);
    }
    schools
}

/// Builds the full network. Returns it together with the household ids given
/// to previously unassigned agents and a summary.
pub(super) fn generate(
    context: &Context,
    demographics: &DemographicParameters,
    clusters: &ClusterParameters,
) -> (Network, Vec<(AgentId, u64)>, NetworkSummary) {
    let population = context.population();
    let mut by_municipality: BTreeMap<&str, Vec<&Agent>> = BTreeMap::new();
    for agent in population.iter() {
        by_municipality
            .entry(agent.municipality.as_str())
            .or_default()
            .push(agent);
    }
    let mut next_household_id = population
        .iter()
        .filter_map(|agent| agent.household_id)
        .max()
        .map_or(0, |id| id + 1);

    let mut built: BTreeMap<ClusterType, Cluster> = [
        ClusterType::Home,
        ClusterType::Work,
        ClusterType::School,
        ClusterType::Shopping,
    ]
    .into_iter()
    .map(|cluster_type| {
        let settings = clusters.settings(cluster_type);
        (
            cluster_type,
            Cluster::new(
                cluster_type,
                settings.active_periods.clone(),
                settings.interaction_probability,
            ),
        )
    })
    .collect();

    let mut network = Network::new();
    let mut assignments = Vec::new();
    let mut summary = NetworkSummary::default();

    for (municipality, agents) in &by_municipality {
        let local = demographics.for_municipality(municipality);

        let households = build_households(
            context,
            municipality,
            agents,
            local,
            &mut next_household_id,
            &mut summary.shortfalls,
        );
        assignments.extend(households.assigned);

        let mut shoppers = Vec::new();
        for members in households.groups {
            let shopper = pick_shopper(members.iter().filter_map(|id| population.get(*id)));
            let home = built.get_mut(&ClusterType::Home).expect("home cluster exists");
            let shape = topology(ClusterType::Home, clusters);
            let Some(index) = home.add_subcluster(subcluster(context, members, shape)) else {
                continue;
            };
            match shopper {
                Some(shopper) => {
                    network.set_shopper(index, shopper);
                    shoppers.push(shopper);
                }
                None => debug!("{municipality}: household {index} has no one able to shop"),
            }
        }

        let workplaces = build_workplaces(
            context,
            agents,
            local,
            (demographics.working_age_min, demographics.working_age_max),
        );
        let schools = build_schools(context, agents, local);
        context.shuffle(NetworkGenerationRng, &mut shoppers);
        let centers = split_evenly(shoppers, local.shopping_centers as usize);

        for (cluster_type, groups) in [
            (ClusterType::Work, workplaces),
            (ClusterType::School, schools),
            (ClusterType::Shopping, centers),
        ] {
            let shape = topology(cluster_type, clusters);
            let cluster = built.get_mut(&cluster_type).expect("cluster exists");
            for members in groups {
                cluster.add_subcluster(subcluster(context, members, shape));
            }
        }
    }

    for (cluster_type, cluster) in built {
        summary.clusters.push(ClusterSummary {
            cluster_type,
            subclusters: cluster.subclusters().len(),
            members: cluster.member_count(),
            edges: cluster
                .subclusters()
                .iter()
                .map(|subcluster| subcluster.graph().edge_count())
                .sum(),
        });
        network.insert_cluster(cluster);
    }

    (network, assignments, summary)
}
