//! CSV sink for the daily statistics record.
use log::error;

use crate::context::Context;
use crate::define_report;
use crate::error::EpiError;
use crate::healthcare::{DailyStatistics, DailyStatisticsEvent};
use crate::parameters::ContextParametersExt;
use crate::report::ContextReportExt;

define_report!(DailyStatistics);

pub const DEFAULT_DAILY_REPORT_NAME: &str = "daily_statistics";

/// Writes one row per `DailyStatisticsEvent` to `<prefix><name>.csv`, where
/// the name comes from `daily_report_name` in the parameters.
///
/// # Errors
///
/// Returns an error if the report file cannot be created.
pub fn init(context: &mut Context) -> Result<(), EpiError> {
    let name = context
        .get_params()
        .daily_report_name
        .clone()
        .unwrap_or_else(|| DEFAULT_DAILY_REPORT_NAME.to_string());
    context.add_report::<DailyStatistics>(&name)?;
    context.subscribe_to_event(|context, event: DailyStatisticsEvent| {
        let day = event.statistics.day;
        if let Err(e) = context.send_report(event.statistics) {
            error!("failed to write statistics for day {day}: {e}");
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::*;
    use crate::global_properties::ContextGlobalPropertiesExt;
    use crate::parameters::{Parameters, Params};

    fn statistics(day: u32, new_cases: usize) -> DailyStatistics {
        DailyStatistics {
            day,
            population: 10,
            susceptible: 8,
            infected: 2,
            recovered: 0,
            deceased: 0,
            new_infections: 1,
            new_cases,
            cumulative_cases: new_cases,
            new_deaths: 0,
            cumulative_deaths: 0,
            new_recoveries: 0,
            cumulative_recoveries: 0,
            incubating: 1,
            asymptomatic: 0,
            mild: 1,
            moderate: 0,
            severe: 0,
            critical: 0,
            hospitalized: 1,
            isolated: 0,
            average_new_cases: 0.5,
            average_new_deaths: 0.0,
            active_policies: "Mask;Distancing".to_string(),
        }
    }

    fn context_writing_to(directory: PathBuf, name: Option<&str>) -> Context {
        let mut context = Context::new();
        let mut params = Params::with_defaults(1, 10, 0);
        params.daily_report_name = name.map(str::to_string);
        context.set_global_property_value(Parameters, params).unwrap();
        context
            .report_options()
            .directory(directory)
            .file_prefix("run_".to_string());
        context
    }

    #[test]
    fn events_become_rows() {
        let dir = tempdir().unwrap();
        let mut context = context_writing_to(dir.path().to_path_buf(), None);
        init(&mut context).unwrap();
        context.emit_event(DailyStatisticsEvent {
            statistics: statistics(0, 1),
        });
        context.emit_event(DailyStatisticsEvent {
            statistics: statistics(1, 3),
        });
        context.execute();

        let path = dir.path().join("run_daily_statistics.csv");
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "day");
        assert_eq!(headers.iter().last(), Some("active_policies"));
        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[1][0], "1");
        assert_eq!(rows[1].get(7), Some("3"));
        assert_eq!(rows[0].iter().last(), Some("Mask;Distancing"));
    }

    #[test]
    fn report_name_comes_from_parameters() {
        let dir = tempdir().unwrap();
        let mut context = context_writing_to(dir.path().to_path_buf(), Some("daily"));
        init(&mut context).unwrap();
        assert!(dir.path().join("run_daily.csv").exists());
    }

    #[test]
    fn existing_report_is_not_overwritten() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("run_daily_statistics.csv"), "old").unwrap();
        let mut context = context_writing_to(dir.path().to_path_buf(), None);
        assert!(matches!(init(&mut context), Err(EpiError::ReportError(_))));
    }
}
