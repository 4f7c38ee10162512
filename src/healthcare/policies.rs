//! Public-health interventions and the hysteretic controller that switches
//! them on and off.
//!
//! A rule enables its policy as soon as any trigger's indicator exceeds the
//! trigger's `enable_above` threshold. Each trigger then counts consecutive
//! evaluations with its indicator below the stricter `disable_below`
//! threshold, and the policy is disabled only once every trigger has
//! reached its `sustain_evaluations`. A rule with no triggers is enabled at
//! the first evaluation and stays on.
use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::context::Context;
use crate::define_rng;
use crate::error::EpiError;
use crate::network::{ClusterType, ContextNetworkExt};
use crate::population::{AgentId, ContextPopulationExt};
use crate::random::ContextRandomExt;

define_rng!(MaskRng);
define_rng!(VaccinationRng);

/// Distancing never pushes a cluster's interaction probability below this.
pub const DISTANCING_FLOOR: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaccinationTarget {
    pub min_age: u8,
    pub max_age: u8,
    /// Only agents whose baseline mortality risk is at least this value.
    pub min_risk: Option<f64>,
}

impl Default for VaccinationTarget {
    fn default() -> Self {
        VaccinationTarget {
            min_age: 0,
            max_age: u8::MAX,
            min_risk: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Policy {
    /// Suppresses every interaction in the restricted cluster types.
    Lockdown { restricted_clusters: Vec<ClusterType> },
    /// Compliant agents multiply transmission by `reduction_factor` on their
    /// side of each contact.
    Mask { reduction_factor: f64, adherence: f64 },
    /// Scales every cluster's interaction probability.
    Distancing { reduction_factor: f64 },
    /// Vaccinates a share of the eligible agents every day while active.
    Vaccination {
        daily_rate: f64,
        efficacy: f64,
        #[serde(default)]
        target: VaccinationTarget,
    },
}

impl Policy {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Policy::Lockdown { .. } => "Lockdown",
            Policy::Mask { .. } => "Mask",
            Policy::Distancing { .. } => "Distancing",
            Policy::Vaccination { .. } => "Vaccination",
        }
    }

    fn validate(&self) -> Result<(), EpiError> {
        let in_unit = |value: f64| (0.0..=1.0).contains(&value);
        let valid = match self {
            Policy::Lockdown { .. } => true,
            Policy::Mask {
                reduction_factor,
                adherence,
            } => in_unit(*reduction_factor) && in_unit(*adherence),
            Policy::Distancing { reduction_factor } => in_unit(*reduction_factor),
            Policy::Vaccination {
                daily_rate,
                efficacy,
                target,
            } => in_unit(*daily_rate) && in_unit(*efficacy) && target.min_age <= target.max_age,
        };
        if valid {
            Ok(())
        } else {
            Err(EpiError::EpiError(format!(
                "{} policy has an out-of-range setting",
                self.name()
            )))
        }
    }

    /// Applies the policy. Enforcing an already enforced policy changes
    /// nothing.
    pub fn enforce(&self, context: &mut Context) {
        match self {
            Policy::Lockdown {
                restricted_clusters,
            } => set_lockdown(context, restricted_clusters, true),
            Policy::Mask {
                reduction_factor,
                adherence,
            } => {
                let undecided = context
                    .population()
                    .ids_where(|agent| agent.interventions().mask_compliant.is_none());
                let draws: Vec<(AgentId, bool)> = undecided
                    .into_iter()
                    .map(|id| (id, context.sample_bool(MaskRng, *adherence)))
                    .collect();
                let population = context.population_mut();
                for (id, compliant) in draws {
                    if let Some(agent) = population.get_mut(id) {
                        agent.interventions.mask_compliant = Some(compliant);
                    }
                }
                for agent in population.iter_mut() {
                    let interventions = &mut agent.interventions;
                    interventions.mask_active = interventions.mask_compliant == Some(true);
                    interventions.mask_reduction_factor = if interventions.mask_active {
                        *reduction_factor
                    } else {
                        1.0
                    };
                }
            }
            Policy::Distancing { reduction_factor } => {
                for cluster in context.network_mut().clusters_mut() {
                    let base = cluster.base_interaction_probability;
                    cluster.interaction_probability =
                        (base * reduction_factor).max(DISTANCING_FLOOR).min(base);
                }
            }
            Policy::Vaccination { .. } => {}
        }
    }

    /// Undoes `enforce`. Vaccinations already given are kept.
    pub fn remove(&self, context: &mut Context) {
        match self {
            Policy::Lockdown {
                restricted_clusters,
            } => set_lockdown(context, restricted_clusters, false),
            Policy::Mask { .. } => {
                for agent in context.population_mut().iter_mut() {
                    agent.interventions.mask_active = false;
                    agent.interventions.mask_reduction_factor = 1.0;
                }
            }
            Policy::Distancing { .. } => {
                for cluster in context.network_mut().clusters_mut() {
                    cluster.interaction_probability = cluster.base_interaction_probability;
                }
            }
            Policy::Vaccination { .. } => {}
        }
    }

    /// Work an active policy does every day. Returns the number of agents
    /// affected.
    pub fn apply_daily(&self, context: &mut Context) -> usize {
        let Policy::Vaccination {
            daily_rate,
            efficacy,
            target,
        } = self
        else {
            return 0;
        };
        let mut eligible = context.population().ids_where(|agent| {
            !agent.interventions().vaccinated
                && agent.infection().is_susceptible()
                && (target.min_age..=target.max_age).contains(&agent.age)
                && target.min_risk.is_none_or(|risk| agent.mortality_risk >= risk)
        });
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let doses = ((eligible.len() as f64) * daily_rate).ceil() as usize;
        context.shuffle(VaccinationRng, &mut eligible);
        eligible.truncate(doses);
        let population = context.population_mut();
        for id in &eligible {
            if let Some(agent) = population.get_mut(*id) {
                agent.interventions.vaccinated = true;
                agent.interventions.vaccine_effectiveness = *efficacy;
            }
        }
        debug!("vaccinated {} agents", eligible.len());
        eligible.len()
    }
}

fn set_lockdown(context: &mut Context, clusters: &[ClusterType], locked_down: bool) {
    let network = context.network_mut();
    for cluster_type in clusters {
        if let Some(cluster) = network.cluster_mut(*cluster_type) {
            cluster.locked_down = locked_down;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Indicator {
    InfectionRate,
    HospitalOccupancy,
    AverageNewCases,
    AverageNewDeaths,
}

/// The values the controller looks at on an evaluation day.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Indicators {
    pub infection_rate: f64,
    pub hospital_occupancy: f64,
    pub average_new_cases: f64,
    pub average_new_deaths: f64,
}

impl Indicators {
    #[must_use]
    pub fn get(&self, indicator: Indicator) -> f64 {
        match indicator {
            Indicator::InfectionRate => self.infection_rate,
            Indicator::HospitalOccupancy => self.hospital_occupancy,
            Indicator::AverageNewCases => self.average_new_cases,
            Indicator::AverageNewDeaths => self.average_new_deaths,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub indicator: Indicator,
    pub enable_above: f64,
    pub disable_below: f64,
    pub sustain_evaluations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub policy: Policy,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl PolicyRule {
    pub(crate) fn validate(&self) -> Result<(), EpiError> {
        self.policy.validate()?;
        for trigger in &self.triggers {
            if trigger.disable_below.is_nan() || trigger.disable_below >= trigger.enable_above {
                return Err(EpiError::EpiError(format!(
                    "{} trigger on {}: disable_below must be lower than enable_above",
                    self.policy.name(),
                    trigger.indicator
                )));
            }
            if trigger.sustain_evaluations == 0 {
                return Err(EpiError::EpiError(format!(
                    "{} trigger on {}: sustain_evaluations must be positive",
                    self.policy.name(),
                    trigger.indicator
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Enable(usize),
    Disable(usize),
}

#[derive(Debug, Clone, Default)]
struct RuleState {
    active: bool,
    // consecutive evaluations below the low threshold, per trigger
    below_low: Vec<u32>,
}

/// Owns the policy rules and their active flags.
#[derive(Debug, Clone, Default)]
pub struct PolicyController {
    rules: Vec<PolicyRule>,
    states: Vec<RuleState>,
}

impl PolicyController {
    #[must_use]
    pub fn new(rules: Vec<PolicyRule>) -> PolicyController {
        let states = rules
            .iter()
            .map(|rule| RuleState {
                active: false,
                below_low: vec![0; rule.triggers.len()],
            })
            .collect();
        PolicyController { rules, states }
    }

    #[must_use]
    pub fn rule(&self, index: usize) -> &PolicyRule {
        &self.rules[index]
    }

    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        self.states.get(index).is_some_and(|state| state.active)
    }

    pub fn active_policies(&self) -> impl Iterator<Item = &Policy> {
        self.rules
            .iter()
            .zip(&self.states)
            .filter(|(_, state)| state.active)
            .map(|(rule, _)| &rule.policy)
    }

    /// Updates every rule with this evaluation's indicators and returns the
    /// rules whose active flag changed, in rule order.
    pub fn evaluate(&mut self, indicators: &Indicators) -> Vec<PolicyDecision> {
        let mut decisions = Vec::new();
        for (index, (rule, state)) in self.rules.iter().zip(&mut self.states).enumerate() {
            if rule.triggers.is_empty() {
                if !state.active {
                    state.active = true;
                    decisions.push(PolicyDecision::Enable(index));
                }
                continue;
            }

            if !state.active {
                let crossed = rule
                    .triggers
                    .iter()
                    .find(|trigger| indicators.get(trigger.indicator) > trigger.enable_above);
                if let Some(trigger) = crossed {
                    info!(
                        "enabling {} policy: {} is {:.4}, above {}",
                        rule.policy.name(),
                        trigger.indicator,
                        indicators.get(trigger.indicator),
                        trigger.enable_above
                    );
                    state.active = true;
                    state.below_low.fill(0);
                    decisions.push(PolicyDecision::Enable(index));
                }
                continue;
            }

            for (trigger, count) in rule.triggers.iter().zip(&mut state.below_low) {
                if indicators.get(trigger.indicator) < trigger.disable_below {
                    *count += 1;
                } else {
                    *count = 0;
                }
            }
            let sustained = rule
                .triggers
                .iter()
                .zip(&state.below_low)
                .all(|(trigger, count)| *count >= trigger.sustain_evaluations);
            if sustained {
                info!("disabling {} policy", rule.policy.name());
                state.active = false;
                state.below_low.fill(0);
                decisions.push(PolicyDecision::Disable(index));
            }
        }
        decisions
    }
}
