use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use epi_clusters::daily_loop::{run_day, setup};
use epi_clusters::disease::{ContextDiseaseExt, DiseaseParameters, SeverityLevel, SeverityTable};
use epi_clusters::global_properties::ContextGlobalPropertiesExt;
use epi_clusters::healthcare::{
    ContextHealthcareExt, DailyStatistics, DailyStatisticsEvent, DailyTally, HealthcareParameters,
};
use epi_clusters::network::{ClusterType, ContextNetworkExt};
use epi_clusters::parameters::{Parameters, Params};
use epi_clusters::population::{
    AgentId, AgentProfile, ContextPopulationExt, Gender, InfectionState, Occupation,
};
use epi_clusters::random::ContextRandomExt;
use epi_clusters::Context;

fn adult(household_id: u64) -> AgentProfile {
    AgentProfile {
        age: 40,
        gender: Gender::Male,
        occupation: Occupation::Unemployed,
        household_id: Some(household_id),
        municipality: "Centro".to_string(),
        comorbidities: vec![],
    }
}

fn certain_mild(mild_days: u32) -> DiseaseParameters {
    DiseaseParameters {
        transmission_rate: 1.0,
        incubation_period_mean: 0.0,
        incubation_period_sd: 0.0,
        asymptomatic_probability: 0.0,
        base_mortality_rate: 0.0,
        recovery_rates: SeverityTable {
            mild: 1.0,
            ..SeverityTable::default()
        },
        progression_rates: SeverityTable::default(),
        severity_durations: SeverityTable {
            mild: mild_days,
            ..DiseaseParameters::default().severity_durations
        },
        severity_weights: Some(SeverityTable {
            mild: 1.0,
            ..SeverityTable::default()
        }),
        ..DiseaseParameters::default()
    }
}

fn quiet_healthcare() -> HealthcareParameters {
    HealthcareParameters {
        policies: vec![],
        ..HealthcareParameters::default()
    }
}

fn context_with(params: Params, household_sizes: &[usize]) -> Context {
    let mut context = Context::new();
    context.init_random(params.seed);
    context.set_global_property_value(Parameters, params).unwrap();
    for (household, size) in household_sizes.iter().enumerate() {
        for _ in 0..*size {
            context.add_agent(adult(household as u64));
        }
    }
    context
}

fn state(context: &Context, id: AgentId) -> InfectionState {
    *context.get_agent(id).unwrap().infection()
}

#[test]
fn household_transmission_then_recovery() {
    let mut params = Params::with_defaults(42, 30, 0);
    params.disease = certain_mild(7);
    params.clusters.home.interaction_probability = 1.0;
    params.healthcare = quiet_healthcare();
    let mut context = context_with(params, &[2]);
    context.build_network().unwrap();
    let (a, b) = (AgentId(0), AgentId(1));

    context.initialize_infections(&[a]);
    context.progress_infection(a);
    assert!(state(&context, a).is_contagious());
    assert!(state(&context, b).is_susceptible());

    let interactions = context.realize_daily_interactions();
    assert_eq!(context.propagate(&interactions), vec![b]);
    assert!(state(&context, b).is_infected());
    assert!(!state(&context, b).is_contagious());

    context.progress_infection(b);
    assert_eq!(state(&context, b).severity(), Some(SeverityLevel::Mild));
    assert!(state(&context, b).is_contagious());

    for _ in 1..6 {
        context.progress_infection(b);
        assert!(state(&context, b).is_infected());
    }
    context.progress_infection(b);
    assert!(state(&context, b).is_recovered());
}

#[test]
fn incubation_is_not_contagious() {
    let mut params = Params::with_defaults(5, 30, 0);
    params.disease = DiseaseParameters {
        incubation_period_mean: 3.0,
        ..certain_mild(7)
    };
    params.healthcare = quiet_healthcare();
    let mut context = context_with(params, &[1]);
    let agent = AgentId(0);
    context.initialize_infections(&[agent]);
    for _ in 0..3 {
        assert!(!state(&context, agent).is_contagious());
        context.progress_infection(agent);
    }
    assert!(!state(&context, agent).is_contagious());
    context.progress_infection(agent);
    assert!(state(&context, agent).is_contagious());
}

#[test]
fn immunity_wanes_after_its_duration() {
    let mut params = Params::with_defaults(9, 30, 0);
    params.disease = DiseaseParameters {
        immunity_duration: 10,
        ..certain_mild(1)
    };
    params.healthcare = quiet_healthcare();
    let mut context = context_with(params, &[1]);
    let agent = AgentId(0);
    context.build_network().unwrap();
    context.init_healthcare();
    context.initialize_infections(&[agent]);

    run_day(&mut context, 0);
    let recovery_day = run_day(&mut context, 1);
    assert_eq!(recovery_day.new_recoveries, 1);
    for day in 2..=10 {
        run_day(&mut context, day);
        assert!(state(&context, agent).is_recovered(), "day {day}");
    }
    run_day(&mut context, 11);
    assert!(state(&context, agent).is_susceptible());
    assert_eq!(context.seed_initial_infections(1), vec![agent]);
}

#[test]
fn one_bed_two_critical_agents() {
    let mut params = Params::with_defaults(3, 30, 0);
    params.disease = DiseaseParameters {
        severity_weights: Some(SeverityTable {
            critical: 1.0,
            ..SeverityTable::default()
        }),
        ..certain_mild(7)
    };
    params.healthcare = HealthcareParameters {
        hospital_capacity: 1,
        isolation_capacity: 0,
        ..quiet_healthcare()
    };
    let mut context = context_with(params, &[1, 1]);
    context.init_healthcare();
    let agents = [AgentId(0), AgentId(1)];
    context.initialize_infections(&agents);
    for agent in agents {
        context.progress_infection(agent);
        assert_eq!(state(&context, agent).severity(), Some(SeverityLevel::Critical));
    }

    let day = context.run_healthcare_day(0, &DailyTally::default());
    assert_eq!(day.admissions.hospitalized, vec![AgentId(0)]);
    assert!(day.admissions.isolated.is_empty());
    assert!(context.get_agent(AgentId(0)).unwrap().is_hospitalized());
    assert!(!context.get_agent(AgentId(1)).unwrap().is_admitted());
    assert_eq!(day.statistics.hospitalized, 1);
}

fn run_configured(config: &Path) -> (Context, Vec<DailyStatistics>) {
    let mut context = Context::new();
    context
        .load_global_property_from_file(Parameters, config)
        .unwrap();
    context.init_random(1234);
    let days = Rc::new(RefCell::new(Vec::new()));
    let recorded = Rc::clone(&days);
    context.subscribe_to_event(move |_, event: DailyStatisticsEvent| {
        recorded.borrow_mut().push(event.statistics);
    });
    setup(&mut context).unwrap();
    context.execute();
    let days = days.borrow().clone();
    (context, days)
}

#[test]
fn configured_run_respects_invariants() {
    let (context, days) = run_configured(Path::new("tests/data/config.json"));
    assert_eq!(days.len(), 30);

    let mut living = 121;
    for (index, day) in days.iter().enumerate() {
        assert_eq!(day.day as usize, index);
        assert_eq!(day.population, living);
        assert_eq!(
            day.susceptible + day.infected + day.recovered + day.deceased,
            living
        );
        assert_eq!(
            day.incubating + day.asymptomatic + day.mild + day.moderate + day.severe + day.critical,
            day.infected
        );
        assert!(day.hospitalized <= 4);
        assert!(day.isolated <= 10);
        assert!(day.hospitalized + day.isolated <= day.infected);
        living -= day.deceased;
    }
    assert_eq!(context.get_population_size(), living);
    assert!(context
        .population()
        .iter()
        .all(|agent| !(agent.is_hospitalized() && agent.is_isolated())));
    assert!(days.iter().all(|day| day.active_policies.contains("Vaccination") || day.day < 6));

    let last = days.last().unwrap();
    assert_eq!(
        last.cumulative_cases,
        days.iter().map(|day| day.new_cases).sum::<usize>()
    );
    assert!(context.network().cluster(ClusterType::Home).is_some());
}

#[test]
fn configured_run_is_reproducible() {
    let (_, first) = run_configured(Path::new("tests/data/config.json"));
    let (_, second) = run_configured(Path::new("tests/data/config.json"));
    assert_eq!(first, second);
}
