//! Hospital and isolation admission, daily statistics and the policy
//! feedback loop.
mod admission;
mod policies;
mod statistics;

use log::debug;
use serde::{Deserialize, Serialize};

pub use admission::{AdmissionOutcome, Wards};
pub use policies::{
    Indicator, Indicators, Policy, PolicyController, PolicyDecision, PolicyRule, Trigger,
    VaccinationTarget, DISTANCING_FLOOR,
};
pub use statistics::{DailyStatistics, DailyStatisticsEvent, DailyTally, StatisticsTracker};

use crate::context::Context;
use crate::define_data_plugin;
use crate::disease::SeverityLevel;
use crate::error::EpiError;
use crate::network::ClusterType;
use crate::parameters::ContextParametersExt;
use crate::population::ContextPopulationExt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthcareParameters {
    pub hospital_capacity: usize,
    pub isolation_capacity: usize,
    /// Policies are evaluated every this many days.
    pub evaluation_interval: u32,
    /// Days averaged by the rolling case and death indicators.
    pub rolling_window: usize,
    pub min_admission_severity: SeverityLevel,
    pub policies: Vec<PolicyRule>,
}

impl Default for HealthcareParameters {
    fn default() -> Self {
        HealthcareParameters {
            hospital_capacity: 50,
            isolation_capacity: 200,
            evaluation_interval: 7,
            rolling_window: 7,
            min_admission_severity: SeverityLevel::Mild,
            policies: default_policies(),
        }
    }
}

fn infection_trigger(enable_above: f64, disable_below: f64, sustain_evaluations: u32) -> Trigger {
    Trigger {
        indicator: Indicator::InfectionRate,
        enable_above,
        disable_below,
        sustain_evaluations,
    }
}

fn default_policies() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            policy: Policy::Lockdown {
                restricted_clusters: vec![ClusterType::Work, ClusterType::School],
            },
            triggers: vec![
                infection_trigger(0.12, 0.04, 10),
                Trigger {
                    indicator: Indicator::HospitalOccupancy,
                    enable_above: 0.9,
                    disable_below: 0.4,
                    sustain_evaluations: 8,
                },
            ],
        },
        PolicyRule {
            policy: Policy::Mask {
                reduction_factor: 0.7,
                adherence: 0.8,
            },
            triggers: vec![infection_trigger(0.05, 0.02, 3)],
        },
        PolicyRule {
            policy: Policy::Distancing {
                reduction_factor: 0.5,
            },
            triggers: vec![infection_trigger(0.08, 0.03, 4)],
        },
    ]
}

impl HealthcareParameters {
    pub(crate) fn validate(&self) -> Result<(), EpiError> {
        if self.evaluation_interval == 0 {
            return Err(EpiError::EpiError(
                "evaluation_interval must be positive".to_string(),
            ));
        }
        if self.rolling_window == 0 {
            return Err(EpiError::EpiError(
                "rolling_window must be positive".to_string(),
            ));
        }
        if !self.min_admission_severity.is_symptomatic() {
            return Err(EpiError::EpiError(
                "min_admission_severity must be a symptomatic tier".to_string(),
            ));
        }
        for rule in &self.policies {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Everything the healthcare subsystem carries from one day to the next.
#[derive(Debug, Clone)]
pub struct HealthcareState {
    pub wards: Wards,
    pub statistics: StatisticsTracker,
    pub controller: PolicyController,
}

impl HealthcareState {
    #[must_use]
    pub fn new(params: &HealthcareParameters) -> HealthcareState {
        HealthcareState {
            wards: Wards::new(params.hospital_capacity, params.isolation_capacity),
            statistics: StatisticsTracker::new(params.rolling_window),
            controller: PolicyController::new(params.policies.clone()),
        }
    }
}

define_data_plugin!(HealthcarePlugin, Option<HealthcareState>, None);

/// The result of one day of healthcare.
#[derive(Debug, Clone)]
pub struct HealthcareDay {
    pub statistics: DailyStatistics,
    pub admissions: AdmissionOutcome,
}

pub trait ContextHealthcareExt {
    /// Sets up wards, statistics and policy rules from the healthcare
    /// parameters.
    fn init_healthcare(&mut self);

    /// # Panics
    ///
    /// Panics if `init_healthcare` has not been called.
    fn healthcare(&self) -> &HealthcareState;

    /// Runs admissions, records the day's statistics, evaluates the policies
    /// on evaluation days and applies the daily work of active policies.
    ///
    /// # Panics
    ///
    /// Panics if `init_healthcare` has not been called.
    fn run_healthcare_day(&mut self, day: u32, tally: &DailyTally) -> HealthcareDay;
}

impl ContextHealthcareExt for Context {
    fn init_healthcare(&mut self) {
        let state = HealthcareState::new(&self.get_params().healthcare);
        *self.get_data_container_mut(HealthcarePlugin) = Some(state);
    }

    fn healthcare(&self) -> &HealthcareState {
        self.get_data_container(HealthcarePlugin)
            .and_then(Option::as_ref)
            .expect("Expected healthcare to be initialized")
    }

    fn run_healthcare_day(&mut self, day: u32, tally: &DailyTally) -> HealthcareDay {
        let params = &self.get_params().healthcare;
        let min_severity = params.min_admission_severity;
        let evaluation_interval = params.evaluation_interval;
        // Policies act on the context, so the state leaves its plugin for the
        // duration of the day.
        let mut state = self
            .get_data_container_mut(HealthcarePlugin)
            .take()
            .expect("Expected healthcare to be initialized");

        let admissions = state.wards.admit(self.population_mut(), min_severity);
        state.statistics.record(tally);

        if (day + 1) % evaluation_interval == 0 {
            let indicators = current_indicators(self, &state);
            debug!("day {day}: evaluating policies with {indicators:?}");
            for decision in state.controller.evaluate(&indicators) {
                match decision {
                    PolicyDecision::Enable(index) => {
                        let policy = state.controller.rule(index).policy.clone();
                        policy.enforce(self);
                    }
                    PolicyDecision::Disable(index) => {
                        let policy = state.controller.rule(index).policy.clone();
                        policy.remove(self);
                    }
                }
            }
        }

        let active: Vec<Policy> = state.controller.active_policies().cloned().collect();
        for policy in &active {
            policy.apply_daily(self);
        }

        let statistics = daily_statistics(self, day, tally, &state, &active);
        state.statistics.push_history(statistics.clone());
        *self.get_data_container_mut(HealthcarePlugin) = Some(state);

        HealthcareDay {
            statistics,
            admissions,
        }
    }
}

fn current_indicators(context: &Context, state: &HealthcareState) -> Indicators {
    let counts = context.population().state_counts();
    let living = counts.total() - counts.deceased;
    #[allow(clippy::cast_precision_loss)]
    let infection_rate = if living == 0 {
        0.0
    } else {
        counts.infected as f64 / living as f64
    };
    Indicators {
        infection_rate,
        hospital_occupancy: state.wards.hospital_occupancy(),
        average_new_cases: state.statistics.average_new_cases(),
        average_new_deaths: state.statistics.average_new_deaths(),
    }
}

fn daily_statistics(
    context: &Context,
    day: u32,
    tally: &DailyTally,
    state: &HealthcareState,
    active: &[Policy],
) -> DailyStatistics {
    let counts = context.population().state_counts();
    let tracker = &state.statistics;
    DailyStatistics {
        day,
        population: counts.total(),
        susceptible: counts.susceptible,
        infected: counts.infected,
        recovered: counts.recovered,
        deceased: counts.deceased,
        new_infections: tally.new_infections,
        new_cases: tally.new_cases,
        cumulative_cases: tracker.cumulative_cases,
        new_deaths: tally.new_deaths,
        cumulative_deaths: tracker.cumulative_deaths,
        new_recoveries: tally.new_recoveries,
        cumulative_recoveries: tracker.cumulative_recoveries,
        incubating: counts.incubating,
        asymptomatic: counts.asymptomatic,
        mild: counts.mild,
        moderate: counts.moderate,
        severe: counts.severe,
        critical: counts.critical,
        hospitalized: state.wards.hospitalized(),
        isolated: state.wards.isolated(),
        average_new_cases: tracker.average_new_cases(),
        average_new_deaths: tracker.average_new_deaths(),
        active_policies: active
            .iter()
            .map(Policy::name)
            .collect::<Vec<_>>()
            .join(";"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::Pathogen;
    use crate::global_properties::ContextGlobalPropertiesExt;
    use crate::network::ContextNetworkExt;
    use crate::parameters::{Parameters, Params};
    use crate::population::{AgentId, AgentProfile, Gender, Infection, InfectionState, Occupation};
    use crate::random::ContextRandomExt;

    fn context_with(healthcare: HealthcareParameters) -> Context {
        let mut context = Context::new();
        context.init_random(42);
        let mut params = Params::with_defaults(42, 30, 0);
        params.healthcare = healthcare;
        context.set_global_property_value(Parameters, params).unwrap();
        context.init_healthcare();
        context
    }

    fn add(context: &mut Context, severity: Option<SeverityLevel>) -> AgentId {
        let id = context.add_agent(AgentProfile {
            age: 40,
            gender: Gender::Female,
            occupation: Occupation::Worker,
            household_id: None,
            municipality: "Centro".to_string(),
            comorbidities: vec![],
        });
        if let Some(severity) = severity {
            context.population_mut().get_mut(id).unwrap().infection =
                InfectionState::Infected(Infection {
                    disease: Pathogen::Covid19,
                    days_infected: 2,
                    incubation_period: 1,
                    is_asymptomatic: false,
                    diagnosis_delay: 0,
                    severity: Some(severity),
                });
        }
        id
    }

    fn lockdown_only(sustain_evaluations: u32) -> HealthcareParameters {
        HealthcareParameters {
            evaluation_interval: 1,
            policies: vec![PolicyRule {
                policy: Policy::Lockdown {
                    restricted_clusters: vec![ClusterType::Work],
                },
                triggers: vec![infection_trigger(0.3, 0.1, sustain_evaluations)],
            }],
            ..HealthcareParameters::default()
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(HealthcareParameters::default().validate().is_ok());
    }

    #[test]
    fn zero_cadence_is_rejected() {
        let params = HealthcareParameters {
            evaluation_interval: 0,
            ..HealthcareParameters::default()
        };
        assert!(params.validate().is_err());
        let params = HealthcareParameters {
            min_admission_severity: SeverityLevel::Asymptomatic,
            ..HealthcareParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    #[should_panic(expected = "Expected healthcare to be initialized")]
    fn healthcare_requires_init() {
        let context = Context::new();
        let _ = context.healthcare();
    }

    #[test]
    fn day_statistics_reflect_admissions_and_tally() {
        let mut context = context_with(HealthcareParameters {
            hospital_capacity: 1,
            isolation_capacity: 1,
            policies: vec![],
            ..HealthcareParameters::default()
        });
        add(&mut context, Some(SeverityLevel::Critical));
        add(&mut context, Some(SeverityLevel::Mild));
        add(&mut context, Some(SeverityLevel::Moderate));
        add(&mut context, None);
        let tally = DailyTally {
            new_infections: 2,
            new_cases: 3,
            new_deaths: 0,
            new_recoveries: 1,
        };
        let day = context.run_healthcare_day(0, &tally);
        assert_eq!(
            day.admissions.newly_admitted().collect::<Vec<_>>(),
            vec![AgentId(0), AgentId(2)]
        );
        let statistics = &day.statistics;
        assert_eq!(statistics.population, 4);
        assert_eq!(statistics.infected, 3);
        assert_eq!(statistics.susceptible, 1);
        assert_eq!(statistics.hospitalized, 1);
        assert_eq!(statistics.isolated, 1);
        assert_eq!(statistics.cumulative_cases, 3);
        assert_eq!(statistics.critical, 1);
        assert!(statistics.active_policies.is_empty());
        assert_eq!(context.healthcare().statistics.history().len(), 1);
    }

    #[test]
    fn policies_switch_with_hysteresis_on_evaluation_days() {
        let mut context = context_with(lockdown_only(2));
        let first = add(&mut context, Some(SeverityLevel::Mild));
        add(&mut context, None);
        context.network_mut().insert_cluster({
            let mut work = crate::network::Cluster::new(
                ClusterType::Work,
                vec![crate::network::TimePeriod::Daytime],
                0.3,
            );
            work.add_subcluster(crate::network::Subcluster::new(
                vec![AgentId(0), AgentId(1)],
                crate::network::ContactGraph::complete(2),
            ));
            work
        });

        // half the living population is infected
        let day = context.run_healthcare_day(0, &DailyTally::default());
        assert_eq!(day.statistics.active_policies, "Lockdown");
        assert!(context.network().cluster(ClusterType::Work).unwrap().locked_down);

        context.population_mut().get_mut(first).unwrap().infection =
            InfectionState::Recovered {
                immunity_remaining: 30,
            };
        let day = context.run_healthcare_day(1, &DailyTally::default());
        assert_eq!(day.statistics.active_policies, "Lockdown");
        let day = context.run_healthcare_day(2, &DailyTally::default());
        assert!(day.statistics.active_policies.is_empty());
        assert!(!context.network().cluster(ClusterType::Work).unwrap().locked_down);
    }

    #[test]
    fn evaluation_only_on_cadence_days() {
        let mut params = lockdown_only(1);
        params.evaluation_interval = 3;
        let mut context = context_with(params);
        add(&mut context, Some(SeverityLevel::Mild));
        let day = context.run_healthcare_day(0, &DailyTally::default());
        assert!(day.statistics.active_policies.is_empty());
        let day = context.run_healthcare_day(1, &DailyTally::default());
        assert!(day.statistics.active_policies.is_empty());
        let day = context.run_healthcare_day(2, &DailyTally::default());
        assert_eq!(day.statistics.active_policies, "Lockdown");
    }
}
