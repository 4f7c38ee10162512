use epi_clusters::daily_loop;
use epi_clusters::global_properties::ContextGlobalPropertiesExt;
use epi_clusters::healthcare::ContextHealthcareExt;
use epi_clusters::parameters::Parameters;
use epi_clusters::reports;
use epi_clusters::runner::run_with_args;
use epi_clusters::EpiError;

fn main() {
    let result = run_with_args(|context, _args| {
        if context.get_global_property_value(Parameters).is_none() {
            return Err(EpiError::EpiError(
                "a configuration file is required (--config)".to_string(),
            ));
        }
        reports::init(context)?;
        daily_loop::setup(context)?;
        Ok(())
    });

    match result {
        Ok(context) => {
            let statistics = &context.healthcare().statistics;
            let days = statistics.history().len();
            println!(
                "simulated {days} days: {} cases, {} deaths, {} recoveries",
                statistics.cumulative_cases,
                statistics.cumulative_deaths,
                statistics.cumulative_recoveries
            );
        }
        Err(e) => {
            eprintln!("epi-clusters: {e}");
            std::process::exit(1);
        }
    }
}
