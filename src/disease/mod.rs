//! The infection state machine and transmission over realized contacts.
//!
//! An infection starts incubating with `days_infected = 0`. Each call to
//! `progress_infection` adds a day; the agent stays non-contagious while
//! `days_infected <= incubation_period`, and on the following day its severity
//! is resolved and it becomes contagious. From then on each day either
//! escalates the severity or, once the tier's duration has elapsed, draws for
//! death (critical only) and then recovery.
mod severity;

use log::{debug, trace};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

pub use severity::{apply_vaccine_protection, Pathogen, SeverityLevel, SeverityTable, SYMPTOMATIC_TIERS};

use crate::context::Context;
use crate::define_rng;
use crate::error::EpiError;
use crate::network::DailyInteractions;
use crate::parameters::ContextParametersExt;
use crate::population::{Agent, AgentId, ContextPopulationExt, Infection, InfectionState};
use crate::random::ContextRandomExt;

define_rng!(TransmissionRng);
define_rng!(ProgressionRng);
define_rng!(SeverityRng);
define_rng!(InitialInfectionRng);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiseaseParameters {
    pub pathogen: Pathogen,
    /// Per-contact infection probability before vaccine and mask discounts.
    pub transmission_rate: f64,
    pub incubation_period_mean: f64,
    pub incubation_period_sd: f64,
    pub asymptomatic_probability: f64,
    /// Disease-specific mortality, combined with each agent's baseline risk.
    pub base_mortality_rate: f64,
    pub recovery_rates: SeverityTable<f64>,
    /// Days a tier lasts before resolution is attempted.
    pub severity_durations: SeverityTable<u32>,
    /// Daily probability of moving to the next tier, before risk scaling.
    pub progression_rates: SeverityTable<f64>,
    /// Days of immunity after recovery. 0 means the agent is susceptible again
    /// as soon as it recovers.
    pub immunity_duration: u32,
    pub hospital_recovery_bonus: f64,
    pub risk_scaling: f64,
    pub risk_reference: f64,
    pub max_diagnosis_delay: u32,
    /// Fixed weights over the symptomatic tiers. Replaces the pathogen's
    /// risk-based distribution when set.
    pub severity_weights: Option<SeverityTable<f64>>,
}

impl Default for DiseaseParameters {
    fn default() -> Self {
        DiseaseParameters {
            pathogen: Pathogen::Covid19,
            transmission_rate: 0.3,
            incubation_period_mean: 5.0,
            incubation_period_sd: 1.5,
            asymptomatic_probability: 0.3,
            base_mortality_rate: 0.02,
            recovery_rates: SeverityTable {
                asymptomatic: 0.99,
                mild: 0.98,
                moderate: 0.85,
                severe: 0.6,
                critical: 0.3,
            },
            severity_durations: SeverityTable {
                asymptomatic: 7,
                mild: 7,
                moderate: 14,
                severe: 21,
                critical: 28,
            },
            progression_rates: SeverityTable {
                asymptomatic: 0.0,
                mild: 0.15,
                moderate: 0.25,
                severe: 0.40,
                critical: 0.0,
            },
            immunity_duration: 90,
            hospital_recovery_bonus: 1.3,
            risk_scaling: 0.5,
            risk_reference: 0.01,
            max_diagnosis_delay: 3,
            severity_weights: None,
        }
    }
}

fn check_probability(name: &str, value: f64) -> Result<(), EpiError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EpiError::EpiError(format!("{name} must be in [0, 1], got {value}")))
    }
}

fn check_at_least(name: &str, value: f64, minimum: f64) -> Result<(), EpiError> {
    if value >= minimum {
        Ok(())
    } else {
        Err(EpiError::EpiError(format!("{name} must be at least {minimum}, got {value}")))
    }
}

impl DiseaseParameters {
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range value.
    pub fn validate(&self) -> Result<(), EpiError> {
        check_probability("transmission_rate", self.transmission_rate)?;
        check_probability("asymptomatic_probability", self.asymptomatic_probability)?;
        check_probability("base_mortality_rate", self.base_mortality_rate)?;
        for (severity, (recovery, progression)) in SeverityLevel::iter().zip(
            self.recovery_rates
                .values()
                .into_iter()
                .zip(self.progression_rates.values()),
        ) {
            check_probability(&format!("{severity} recovery rate"), recovery)?;
            check_probability(&format!("{severity} progression rate"), progression)?;
        }
        check_at_least("incubation_period_mean", self.incubation_period_mean, 0.0)?;
        check_at_least("incubation_period_sd", self.incubation_period_sd, 0.0)?;
        check_at_least("hospital_recovery_bonus", self.hospital_recovery_bonus, 1.0)?;
        check_at_least("risk_scaling", self.risk_scaling, 0.0)?;
        if self.risk_reference.is_nan() || self.risk_reference <= 0.0 {
            return Err(EpiError::EpiError(
                "risk_reference must be positive".to_string(),
            ));
        }
        if let Some(weights) = self.severity_weights {
            let symptomatic = &weights.values()[1..];
            if symptomatic.iter().any(|w| !w.is_finite() || *w < 0.0)
                || symptomatic.iter().sum::<f64>() <= 0.0
            {
                return Err(EpiError::EpiError(
                    "severity_weights must be non-negative and not all zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// `1 - (1 - agent_risk)(1 - disease_risk)`.
    #[must_use]
    pub fn combined_risk(&self, agent_risk: f64) -> f64 {
        1.0 - (1.0 - agent_risk) * (1.0 - self.base_mortality_rate)
    }

    /// Daily probability of leaving `severity` for the next tier.
    #[must_use]
    pub fn escalation_probability(&self, severity: SeverityLevel, combined_risk: f64) -> f64 {
        let base = self.progression_rates.get(severity);
        let scale = 1.0 + self.risk_scaling * (1.0 + combined_risk / self.risk_reference).ln();
        (base * scale).clamp(0.0, 1.0)
    }
}

/// What a day of progression did to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClinicalEvent {
    /// Incubation ended and the infection became contagious.
    Onset(SeverityLevel),
    Escalated(SeverityLevel),
    Recovered,
    Died,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progression {
    pub event: Option<ClinicalEvent>,
    /// The case was confirmed today: symptomatic and its diagnosis delay has
    /// just elapsed.
    pub confirmed: bool,
}

pub trait ContextDiseaseExt {
    fn disease_parameters(&self) -> &DiseaseParameters;

    /// Forces every listed agent into a fresh incubating infection, whatever
    /// its current state. Removed agents are skipped.
    fn initialize_infections(&mut self, agents: &[AgentId]);

    /// Infects up to `count` susceptible agents chosen at random and returns
    /// their ids.
    fn seed_initial_infections(&mut self, count: usize) -> Vec<AgentId>;

    /// Runs one transmission trial per contact between a contagious and a
    /// susceptible agent, in period order. Returns the newly infected agents.
    fn propagate(&mut self, interactions: &DailyInteractions) -> Vec<AgentId>;

    /// Advances an infected agent by one day.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the agent is not infected.
    fn progress_infection(&mut self, agent: AgentId) -> Progression;

    /// Counts down a recovered agent's immunity. Returns true when the agent
    /// becomes susceptible again.
    fn wane_immunity(&mut self, agent: AgentId) -> bool;

    /// Draws a symptomatic severity tier for `agent`.
    fn determine_severity(&self, agent: &Agent) -> SeverityLevel;
}

trait ContextDiseaseInternalExt {
    fn new_infection(&self) -> Infection;
    fn draw_incubation_period(&self) -> u32;
}

impl ContextDiseaseInternalExt for Context {
    fn new_infection(&self) -> Infection {
        let params = self.disease_parameters();
        Infection {
            disease: params.pathogen,
            days_infected: 0,
            incubation_period: self.draw_incubation_period(),
            is_asymptomatic: self.sample_bool(ProgressionRng, params.asymptomatic_probability),
            diagnosis_delay: 0,
            severity: None,
        }
    }

    fn draw_incubation_period(&self) -> u32 {
        let params = self.disease_parameters();
        let days = if params.incubation_period_sd > 0.0 {
            let normal = Normal::new(params.incubation_period_mean, params.incubation_period_sd)
                .expect("incubation parameters are validated");
            self.sample_distr(ProgressionRng, normal)
        } else {
            params.incubation_period_mean
        };
        // Saturating float-to-int cast, clamped to 0 from below.
        days.round().max(0.0) as u32
    }
}

impl ContextDiseaseExt for Context {
    fn disease_parameters(&self) -> &DiseaseParameters {
        &self.get_params().disease
    }

    fn initialize_infections(&mut self, agents: &[AgentId]) {
        for agent in agents {
            let infection = self.new_infection();
            if let Some(agent) = self.population_mut().get_mut(*agent) {
                agent.infection = InfectionState::Infected(infection);
                trace!("seeded infection in agent {}", agent.id);
            }
        }
    }

    fn seed_initial_infections(&mut self, count: usize) -> Vec<AgentId> {
        let mut candidates = self
            .population()
            .ids_where(|agent| agent.infection().is_susceptible());
        self.shuffle(InitialInfectionRng, &mut candidates);
        candidates.truncate(count);
        candidates.sort_unstable();
        self.initialize_infections(&candidates);
        debug!("seeded {} initial infections", candidates.len());
        candidates
    }

    fn propagate(&mut self, interactions: &DailyInteractions) -> Vec<AgentId> {
        let transmission_rate = self.disease_parameters().transmission_rate;
        let mut infected = Vec::new();
        for contacts in interactions.values() {
            for contact in contacts {
                let population = self.population();
                let (Some(first), Some(second)) =
                    (population.get(contact.first), population.get(contact.second))
                else {
                    continue;
                };
                if first.is_admitted() || second.is_admitted() {
                    continue;
                }
                let (source, target) = match (
                    first.infection().is_contagious(),
                    second.infection().is_contagious(),
                ) {
                    (true, false) => (first, second),
                    (false, true) => (second, first),
                    _ => continue,
                };
                if !target.infection().is_susceptible() {
                    continue;
                }
                let vaccine_discount = target
                    .interventions()
                    .effective_vaccine()
                    .map_or(1.0, |effectiveness| 1.0 - effectiveness);
                let probability = transmission_rate
                    * vaccine_discount
                    * source.interventions().mask_factor()
                    * target.interventions().mask_factor();
                let target = target.id;
                if self.sample_bool(TransmissionRng, probability) {
                    let infection = self.new_infection();
                    if let Some(agent) = self.population_mut().get_mut(target) {
                        agent.infection = InfectionState::Infected(infection);
                    }
                    trace!("agent {target} infected in {}", contact.cluster);
                    infected.push(target);
                }
            }
        }
        infected
    }

    fn progress_infection(&mut self, id: AgentId) -> Progression {
        let Some(agent) = self.get_agent(id) else {
            debug!("ignoring progression of removed agent {id}");
            return Progression::default();
        };
        let InfectionState::Infected(mut infection) = *agent.infection() else {
            debug!("ignoring progression of agent {id}: not infected");
            if cfg!(debug_assertions) {
                panic!("progressed agent {id}, which is not infected");
            }
            return Progression::default();
        };
        let params = *self.disease_parameters();
        let combined = params.combined_risk(agent.mortality_risk);
        let hospitalized = agent.is_hospitalized();

        infection.days_infected += 1;
        let mut progression = Progression::default();
        let mut next_state = InfectionState::Infected(infection);

        if infection.days_infected > infection.incubation_period {
            match infection.severity {
                None => {
                    let severity = if infection.is_asymptomatic {
                        SeverityLevel::Asymptomatic
                    } else {
                        self.determine_severity(agent)
                    };
                    infection.severity = Some(severity);
                    if severity.is_symptomatic() {
                        infection.diagnosis_delay =
                            self.sample_range(SeverityRng, 0..=params.max_diagnosis_delay);
                    }
                    next_state = InfectionState::Infected(infection);
                    progression.event = Some(ClinicalEvent::Onset(severity));
                }
                Some(severity) => {
                    let escalation = severity.escalated().filter(|_| {
                        self.sample_bool(
                            ProgressionRng,
                            params.escalation_probability(severity, combined),
                        )
                    });
                    if let Some(next) = escalation {
                        infection.severity = Some(next);
                        next_state = InfectionState::Infected(infection);
                        progression.event = Some(ClinicalEvent::Escalated(next));
                    } else if infection.days_infected
                        >= infection.incubation_period + params.severity_durations.get(severity)
                    {
                        let bonus = if hospitalized {
                            params.hospital_recovery_bonus
                        } else {
                            1.0
                        };
                        if severity == SeverityLevel::Critical
                            && self.sample_bool(ProgressionRng, combined / bonus)
                        {
                            next_state = InfectionState::Deceased;
                            progression.event = Some(ClinicalEvent::Died);
                        } else if self.sample_bool(
                            ProgressionRng,
                            params.recovery_rates.get(severity) * bonus,
                        ) {
                            // no immunity window: susceptible again at once
                            next_state = match params.immunity_duration {
                                0 => InfectionState::Susceptible,
                                days => InfectionState::Recovered {
                                    immunity_remaining: days,
                                },
                            };
                            progression.event = Some(ClinicalEvent::Recovered);
                        }
                    }
                }
            }
            progression.confirmed = infection.severity.is_some_and(SeverityLevel::is_symptomatic)
                && infection.days_infected
                    == infection.incubation_period + 1 + infection.diagnosis_delay;
        }

        if let Some(event) = progression.event {
            trace!("agent {id}: {event:?} on day {}", infection.days_infected);
        }
        if let Some(agent) = self.population_mut().get_mut(id) {
            agent.infection = next_state;
        }
        progression
    }

    fn wane_immunity(&mut self, id: AgentId) -> bool {
        let Some(agent) = self.population_mut().get_mut(id) else {
            return false;
        };
        let InfectionState::Recovered { immunity_remaining } = agent.infection else {
            return false;
        };
        if immunity_remaining <= 1 {
            agent.infection = InfectionState::Susceptible;
            trace!("agent {id} lost immunity");
            true
        } else {
            agent.infection = InfectionState::Recovered {
                immunity_remaining: immunity_remaining - 1,
            };
            false
        }
    }

    fn determine_severity(&self, agent: &Agent) -> SeverityLevel {
        let params = self.disease_parameters();
        let weights = match params.severity_weights {
            Some(table) => [table.mild, table.moderate, table.severe, table.critical],
            None => params.pathogen.severity_weights(agent),
        };
        let weights = apply_vaccine_protection(weights, agent.interventions().effective_vaccine());
        SYMPTOMATIC_TIERS[self.sample_weighted(SeverityRng, &weights)]
    }
}
