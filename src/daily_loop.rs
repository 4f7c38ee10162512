//! Sequences one simulated day: contacts, transmission, progression,
//! healthcare and the removal of the dead.
use log::{debug, info};

use crate::context::{Context, ExecutionPhase};
use crate::disease::{ClinicalEvent, ContextDiseaseExt};
use crate::error::EpiError;
use crate::healthcare::{ContextHealthcareExt, DailyStatistics, DailyStatisticsEvent, DailyTally};
use crate::network::{ContextNetworkExt, NetworkSummary};
use crate::parameters::ContextParametersExt;
use crate::population::ContextPopulationExt;
use crate::population_loader::ContextPopulationLoaderExt;

/// Runs day `day` and emits its `DailyStatisticsEvent`.
pub fn run_day(context: &mut Context, day: u32) -> DailyStatistics {
    let interactions = context.realize_daily_interactions();
    let newly_infected = context.propagate(&interactions);

    let recovered = context
        .population()
        .ids_where(|agent| agent.infection().is_recovered());
    for id in recovered {
        context.wane_immunity(id);
    }

    let mut tally = DailyTally {
        new_infections: newly_infected.len(),
        ..DailyTally::default()
    };
    let infected = context
        .population()
        .ids_where(|agent| agent.infection().is_infected());
    for id in infected {
        let progression = context.progress_infection(id);
        if progression.confirmed {
            tally.new_cases += 1;
        }
        match progression.event {
            Some(ClinicalEvent::Died) => tally.new_deaths += 1,
            Some(ClinicalEvent::Recovered) => tally.new_recoveries += 1,
            _ => {}
        }
    }

    let healthcare = context.run_healthcare_day(day, &tally);
    context.reassign_admitted_shoppers();

    let deceased = context
        .population()
        .ids_where(|agent| agent.infection().is_deceased());
    for id in deceased {
        context.replace_shopper(id);
        context.remove_from_network(id);
        context.population_mut().remove(id);
    }

    let statistics = healthcare.statistics;
    debug!(
        "day {day}: {} infected, {} new cases, {} deaths",
        statistics.infected, statistics.new_cases, statistics.new_deaths
    );
    context.emit_event(DailyStatisticsEvent {
        statistics: statistics.clone(),
    });
    statistics
}

/// Schedules `run_day` at every whole time step until `max_days` days have
/// run.
pub fn init(context: &mut Context) {
    let max_days = context.get_params().max_days;
    context.add_periodic_plan_with_phase(
        1.0,
        |context| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let day = context.get_current_time() as u32;
            run_day(context, day);
        },
        ExecutionPhase::Normal,
    );
    context.add_plan_with_phase(
        f64::from(max_days),
        |context| {
            info!("reached day {}, stopping", context.get_current_time());
            context.shutdown();
        },
        ExecutionPhase::First,
    );
}

/// Prepares a configured context for `execute`: loads the population file
/// when the population is still empty, builds the network, sets up
/// healthcare, seeds the initial infections and schedules the days.
///
/// # Errors
///
/// Returns an error if the population cannot be loaded or is empty.
pub fn setup(context: &mut Context) -> Result<NetworkSummary, EpiError> {
    if context.get_population_size() == 0 {
        if let Some(path) = context.get_params().population_file.clone() {
            context.load_population(&path)?;
        }
    }
    let summary = context.build_network()?;
    context.init_healthcare();
    let initial_infections = context.get_params().initial_infections;
    let seeded = context.seed_initial_infections(initial_infections);
    if seeded.len() < initial_infections {
        info!(
            "only {} of {initial_infections} initial infections could be seeded",
            seeded.len()
        );
    }
    init(context);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::disease::{DiseaseParameters, SeverityTable};
    use crate::global_properties::ContextGlobalPropertiesExt;
    use crate::healthcare::HealthcareParameters;
    use crate::parameters::{Parameters, Params};
    use crate::population::{AgentId, AgentProfile, Gender, Occupation};
    use crate::random::ContextRandomExt;

    fn adult(household_id: u64) -> AgentProfile {
        AgentProfile {
            age: 35,
            gender: Gender::Female,
            occupation: Occupation::Unemployed,
            household_id: Some(household_id),
            municipality: "Centro".to_string(),
            comorbidities: vec![],
        }
    }

    fn context_with(params: Params, households: &[usize]) -> Context {
        let mut context = Context::new();
        context.init_random(params.seed);
        context.set_global_property_value(Parameters, params).unwrap();
        for (household, size) in households.iter().enumerate() {
            for _ in 0..*size {
                context.add_agent(adult(household as u64));
            }
        }
        context
    }

    fn no_policies(params: &mut Params) {
        params.healthcare = HealthcareParameters {
            policies: vec![],
            ..HealthcareParameters::default()
        };
    }

    #[test]
    fn runs_max_days_and_reports_each_day() {
        let mut params = Params::with_defaults(7, 12, 3);
        no_policies(&mut params);
        let mut context = context_with(params, &[4, 3, 5, 2, 6]);
        let days = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&days);
        context.subscribe_to_event(move |_, event: DailyStatisticsEvent| {
            recorded.borrow_mut().push(event.statistics.day);
        });
        setup(&mut context).unwrap();
        context.execute();
        assert_eq!(*days.borrow(), (0..12).collect::<Vec<u32>>());
    }

    #[test]
    fn population_is_conserved_each_day() {
        let mut params = Params::with_defaults(11, 40, 4);
        no_policies(&mut params);
        params.disease.base_mortality_rate = 0.3;
        let mut context = context_with(params, &[5, 5, 5, 5, 4, 4, 3, 3, 2, 2]);
        setup(&mut context).unwrap();
        let mut living = context.get_population_size();
        for day in 0..40 {
            let statistics = run_day(&mut context, day);
            assert_eq!(
                statistics.susceptible + statistics.infected + statistics.recovered + statistics.deceased,
                living
            );
            assert_eq!(statistics.population, living);
            living -= statistics.deceased;
            assert_eq!(context.get_population_size(), living);
        }
    }

    #[test]
    fn deceased_agents_leave_population_and_network() {
        let mut params = Params::with_defaults(3, 5, 0);
        params.healthcare = HealthcareParameters {
            hospital_capacity: 0,
            isolation_capacity: 0,
            policies: vec![],
            ..HealthcareParameters::default()
        };
        params.disease = DiseaseParameters {
            transmission_rate: 0.0,
            incubation_period_mean: 0.0,
            incubation_period_sd: 0.0,
            asymptomatic_probability: 0.0,
            base_mortality_rate: 1.0,
            severity_weights: Some(SeverityTable {
                asymptomatic: 0.0,
                mild: 0.0,
                moderate: 0.0,
                severe: 0.0,
                critical: 1.0,
            }),
            severity_durations: SeverityTable {
                asymptomatic: 1,
                mild: 1,
                moderate: 1,
                severe: 1,
                critical: 1,
            },
            ..DiseaseParameters::default()
        };
        let mut context = context_with(params, &[2]);
        context.build_network().unwrap();
        context.init_healthcare();
        context.initialize_infections(&[AgentId(0)]);

        // onset as critical, then death at the end of the critical stage
        let first = run_day(&mut context, 0);
        assert_eq!(first.critical, 1);
        let second = run_day(&mut context, 1);
        assert_eq!(second.new_deaths, 1);
        assert_eq!(second.deceased, 1);
        assert!(context.get_agent(AgentId(0)).is_none());
        assert_eq!(context.get_population_size(), 1);
        let home = context
            .network()
            .cluster(crate::network::ClusterType::Home)
            .unwrap();
        assert_eq!(home.member_count(), 1);
        assert_eq!(context.network().shopper_for(0), Some(AgentId(1)));
        assert_eq!(second.hospitalized + second.isolated, 0);
    }

    #[test]
    fn setup_without_population_fails() {
        let mut context = Context::new();
        context.init_random(1);
        context
            .set_global_property_value(Parameters, Params::with_defaults(1, 5, 1))
            .unwrap();
        assert!(setup(&mut context).is_err());
    }

    #[test]
    fn same_seed_same_history() {
        let run = || {
            let mut params = Params::with_defaults(99, 30, 2);
            params.healthcare.evaluation_interval = 3;
            let mut context = context_with(params, &[3, 4, 2, 5, 1, 6, 2, 3]);
            setup(&mut context).unwrap();
            context.execute();
            context.healthcare().statistics.history().to_vec()
        };
        let first = run();
        assert_eq!(first.len(), 30);
        assert_eq!(first, run());
        assert!(first.iter().all(|day| day.hospitalized <= 50));
        assert!(first.iter().all(|day| day.severe + day.critical <= day.infected));
    }
}
