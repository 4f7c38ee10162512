//! Daily admission control over hospital beds and isolation places.
use std::cmp::Reverse;
use std::collections::BTreeSet;

use log::debug;

use crate::disease::SeverityLevel;
use crate::population::{AgentId, CareStatus, Population};

/// Occupants and capacities of the two care settings. Occupants are kept in
/// id order so every pass visits them deterministically.
#[derive(Debug, Clone, Default)]
pub struct Wards {
    pub hospital_capacity: usize,
    pub isolation_capacity: usize,
    hospital: BTreeSet<AgentId>,
    isolation: BTreeSet<AgentId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionOutcome {
    pub released: Vec<AgentId>,
    pub transferred: Vec<AgentId>,
    pub hospitalized: Vec<AgentId>,
    pub isolated: Vec<AgentId>,
}

impl AdmissionOutcome {
    /// Agents who left the community today.
    pub fn newly_admitted(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.hospitalized.iter().chain(&self.isolated).copied()
    }
}

impl Wards {
    #[must_use]
    pub fn new(hospital_capacity: usize, isolation_capacity: usize) -> Wards {
        Wards {
            hospital_capacity,
            isolation_capacity,
            ..Wards::default()
        }
    }

    #[must_use]
    pub fn hospitalized(&self) -> usize {
        self.hospital.len()
    }

    #[must_use]
    pub fn isolated(&self) -> usize {
        self.isolation.len()
    }

    #[must_use]
    pub fn hospital_occupancy(&self) -> f64 {
        if self.hospital_capacity == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let occupancy = self.hospital.len() as f64 / self.hospital_capacity as f64;
            occupancy
        }
    }

    fn hospital_has_room(&self) -> bool {
        self.hospital.len() < self.hospital_capacity
    }

    fn isolation_has_room(&self) -> bool {
        self.isolation.len() < self.isolation_capacity
    }

    /// Releases occupants who are no longer infected, moves isolated agents
    /// who became severe or critical into free hospital beds, then admits
    /// waiting agents of at least `min_severity` from most to least severe.
    /// Hospital beds are filled first and the overflow goes to isolation.
    pub fn admit(&mut self, population: &mut Population, min_severity: SeverityLevel) -> AdmissionOutcome {
        let mut outcome = AdmissionOutcome::default();

        for ward in [&mut self.hospital, &mut self.isolation] {
            ward.retain(|id| {
                let still_infected = population
                    .get(*id)
                    .is_some_and(|agent| agent.infection().is_infected());
                if !still_infected {
                    outcome.released.push(*id);
                }
                still_infected
            });
        }
        for id in &outcome.released {
            if let Some(agent) = population.get_mut(*id) {
                agent.care = CareStatus::Community;
            }
        }

        let transfers: Vec<AgentId> = self
            .isolation
            .iter()
            .copied()
            .filter(|id| {
                population
                    .get(*id)
                    .and_then(|agent| agent.infection().severity())
                    .is_some_and(|severity| severity >= SeverityLevel::Severe)
            })
            .collect();
        for id in transfers {
            if !self.hospital_has_room() {
                break;
            }
            self.isolation.remove(&id);
            self.hospital.insert(id);
            if let Some(agent) = population.get_mut(id) {
                agent.care = CareStatus::Hospitalized;
            }
            outcome.transferred.push(id);
        }

        let mut candidates: Vec<(AgentId, SeverityLevel)> = population
            .iter()
            .filter(|agent| !agent.is_admitted())
            .filter_map(|agent| {
                agent
                    .infection()
                    .severity()
                    .filter(|severity| *severity >= min_severity && severity.is_symptomatic())
                    .map(|severity| (agent.id, severity))
            })
            .collect();
        candidates.sort_by_key(|(_, severity)| Reverse(*severity));

        for (id, _) in candidates {
            let care = if self.hospital_has_room() {
                self.hospital.insert(id);
                outcome.hospitalized.push(id);
                CareStatus::Hospitalized
            } else if self.isolation_has_room() {
                self.isolation.insert(id);
                outcome.isolated.push(id);
                CareStatus::Isolated
            } else {
                break;
            };
            if let Some(agent) = population.get_mut(id) {
                agent.care = care;
            }
        }

        if !outcome.hospitalized.is_empty() || !outcome.isolated.is_empty() {
            debug!(
                "admitted {} to hospital and {} to isolation; released {}",
                outcome.hospitalized.len(),
                outcome.isolated.len(),
                outcome.released.len()
            );
        }
        outcome
    }
}
