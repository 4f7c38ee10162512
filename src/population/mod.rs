//! The agent arena. Agents are addressed by `AgentId`, which is the agent's
//! slot in the arena. Removing an agent empties its slot without shifting any
//! other agent, so ids held by the network stay valid.
mod agent;

pub use agent::{
    baseline_mortality_risk, Agent, AgentId, AgentProfile, CareStatus, Gender, Infection,
    InfectionState, Interventions, Occupation, ADULT_AGE,
};

use log::trace;

use crate::context::Context;
use crate::define_data_plugin;
use crate::disease::SeverityLevel;

#[derive(Debug, Default)]
pub struct Population {
    slots: Vec<Option<Agent>>,
    living: usize,
}

impl Population {
    #[must_use]
    pub const fn new() -> Population {
        Population {
            slots: Vec::new(),
            living: 0,
        }
    }

    pub fn add(&mut self, profile: AgentProfile) -> AgentId {
        let id = AgentId(self.slots.len());
        self.slots.push(Some(Agent::from_profile(id, profile)));
        self.living += 1;
        id
    }

    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Takes the agent out of the arena. Returns `None` if it was already gone.
    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let removed = self.slots.get_mut(id.0).and_then(Option::take);
        if removed.is_some() {
            self.living -= 1;
        }
        removed
    }

    /// Number of agents still in the simulation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.living
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.living == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.slots.iter_mut().flatten()
    }

    /// Ids of living agents matching `predicate`, in id order.
    pub fn ids_where(&self, predicate: impl Fn(&Agent) -> bool) -> Vec<AgentId> {
        self.iter()
            .filter(|agent| predicate(agent))
            .map(|agent| agent.id)
            .collect()
    }

    #[must_use]
    pub fn state_counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for agent in self.iter() {
            match agent.infection() {
                InfectionState::Susceptible => counts.susceptible += 1,
                InfectionState::Infected(infection) => {
                    counts.infected += 1;
                    match infection.severity {
                        None => counts.incubating += 1,
                        Some(SeverityLevel::Asymptomatic) => counts.asymptomatic += 1,
                        Some(SeverityLevel::Mild) => counts.mild += 1,
                        Some(SeverityLevel::Moderate) => counts.moderate += 1,
                        Some(SeverityLevel::Severe) => counts.severe += 1,
                        Some(SeverityLevel::Critical) => counts.critical += 1,
                    }
                }
                InfectionState::Recovered { .. } => counts.recovered += 1,
                InfectionState::Deceased => counts.deceased += 1,
            }
        }
        counts
    }
}

/// Head counts by infection state, and by severity among the infected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub susceptible: usize,
    pub infected: usize,
    pub recovered: usize,
    pub deceased: usize,
    pub incubating: usize,
    pub asymptomatic: usize,
    pub mild: usize,
    pub moderate: usize,
    pub severe: usize,
    pub critical: usize,
}

impl StateCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.susceptible + self.infected + self.recovered + self.deceased
    }
}

static EMPTY_POPULATION: Population = Population::new();

define_data_plugin!(PopulationPlugin, Population, Population::new());

pub trait ContextPopulationExt {
    fn add_agent(&mut self, profile: AgentProfile) -> AgentId;

    fn get_agent(&self, id: AgentId) -> Option<&Agent>;

    /// The population, or an empty one if no agent has been added yet.
    fn population(&self) -> &Population;

    fn population_mut(&mut self) -> &mut Population;

    fn get_population_size(&self) -> usize;
}

impl ContextPopulationExt for Context {
    fn add_agent(&mut self, profile: AgentProfile) -> AgentId {
        let id = self.population_mut().add(profile);
        trace!("added agent {id}");
        id
    }

    fn get_agent(&self, id: AgentId) -> Option<&Agent> {
        self.population().get(id)
    }

    fn population(&self) -> &Population {
        self.get_data_container(PopulationPlugin)
            .unwrap_or(&EMPTY_POPULATION)
    }

    fn population_mut(&mut self) -> &mut Population {
        self.get_data_container_mut(PopulationPlugin)
    }

    fn get_population_size(&self) -> usize {
        self.population().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(age: u8, occupation: Occupation) -> AgentProfile {
        AgentProfile {
            age,
            gender: Gender::Male,
            occupation,
            household_id: None,
            municipality: "Centro".to_string(),
            comorbidities: vec![],
        }
    }

    #[test]
    fn empty_population_before_first_agent() {
        let context = Context::new();
        assert_eq!(context.get_population_size(), 0);
        assert!(context.population().is_empty());
    }

    #[test]
    fn add_and_get() {
        let mut context = Context::new();
        let first = context.add_agent(profile(30, Occupation::Worker));
        let second = context.add_agent(profile(8, Occupation::Student));
        assert_eq!(first, AgentId(0));
        assert_eq!(second, AgentId(1));
        assert_eq!(context.get_agent(second).unwrap().age, 8);
        assert_eq!(context.get_population_size(), 2);
    }

    #[test]
    fn removal_keeps_other_ids_stable() {
        let mut context = Context::new();
        let ids: Vec<AgentId> = (0..4)
            .map(|age| context.add_agent(profile(20 + age, Occupation::Worker)))
            .collect();
        let removed = context.population_mut().remove(ids[1]).unwrap();
        assert_eq!(removed.id, ids[1]);
        assert!(context.get_agent(ids[1]).is_none());
        assert_eq!(context.get_agent(ids[2]).unwrap().age, 22);
        assert_eq!(context.get_population_size(), 3);
        assert!(context.population_mut().remove(ids[1]).is_none());
        assert_eq!(context.get_population_size(), 3);
    }

    #[test]
    fn counts_by_state() {
        let mut population = Population::new();
        let a = population.add(profile(30, Occupation::Worker));
        population.add(profile(31, Occupation::Worker));
        population.get_mut(a).unwrap().infection = InfectionState::Deceased;
        let counts = population.state_counts();
        assert_eq!(counts.susceptible, 1);
        assert_eq!(counts.deceased, 1);
        assert_eq!(counts.total(), population.len());
    }
}
