use std::collections::VecDeque;

use serde::Serialize;

use crate::context::SimulationEvent;

/// What the rest of the day contributed before healthcare runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyTally {
    pub new_infections: usize,
    pub new_cases: usize,
    pub new_deaths: usize,
    pub new_recoveries: usize,
}

/// One row of the daily report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStatistics {
    pub day: u32,
    pub population: usize,
    pub susceptible: usize,
    pub infected: usize,
    pub recovered: usize,
    pub deceased: usize,
    pub new_infections: usize,
    pub new_cases: usize,
    pub cumulative_cases: usize,
    pub new_deaths: usize,
    pub cumulative_deaths: usize,
    pub new_recoveries: usize,
    pub cumulative_recoveries: usize,
    pub incubating: usize,
    pub asymptomatic: usize,
    pub mild: usize,
    pub moderate: usize,
    pub severe: usize,
    pub critical: usize,
    pub hospitalized: usize,
    pub isolated: usize,
    pub average_new_cases: f64,
    pub average_new_deaths: f64,
    /// Names of the active policies joined with `;`.
    pub active_policies: String,
}

/// Emitted once per simulated day after healthcare has run.
#[derive(Debug, Clone)]
pub struct DailyStatisticsEvent {
    pub statistics: DailyStatistics,
}

impl SimulationEvent for DailyStatisticsEvent {}

/// Cumulative totals and a rolling window of daily cases and deaths.
#[derive(Debug, Clone)]
pub struct StatisticsTracker {
    window: usize,
    recent_cases: VecDeque<usize>,
    recent_deaths: VecDeque<usize>,
    pub cumulative_cases: usize,
    pub cumulative_deaths: usize,
    pub cumulative_recoveries: usize,
    history: Vec<DailyStatistics>,
}

impl StatisticsTracker {
    /// # Panics
    ///
    /// Panics if `window` is zero.
    #[must_use]
    pub fn new(window: usize) -> StatisticsTracker {
        assert!(window > 0, "rolling window must be positive");
        StatisticsTracker {
            window,
            recent_cases: VecDeque::with_capacity(window),
            recent_deaths: VecDeque::with_capacity(window),
            cumulative_cases: 0,
            cumulative_deaths: 0,
            cumulative_recoveries: 0,
            history: Vec::new(),
        }
    }

    pub fn record(&mut self, tally: &DailyTally) {
        self.cumulative_cases += tally.new_cases;
        self.cumulative_deaths += tally.new_deaths;
        self.cumulative_recoveries += tally.new_recoveries;
        push_bounded(&mut self.recent_cases, tally.new_cases, self.window);
        push_bounded(&mut self.recent_deaths, tally.new_deaths, self.window);
    }

    /// Mean daily new cases over the days currently in the window.
    #[must_use]
    pub fn average_new_cases(&self) -> f64 {
        mean(&self.recent_cases)
    }

    #[must_use]
    pub fn average_new_deaths(&self) -> f64 {
        mean(&self.recent_deaths)
    }

    pub fn push_history(&mut self, statistics: DailyStatistics) {
        self.history.push(statistics);
    }

    #[must_use]
    pub fn history(&self) -> &[DailyStatistics] {
        &self.history
    }
}

fn push_bounded(values: &mut VecDeque<usize>, value: usize, window: usize) {
    if values.len() == window {
        values.pop_front();
    }
    values.push_back(value);
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &VecDeque<usize>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<usize>() as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    fn tally(new_cases: usize, new_deaths: usize) -> DailyTally {
        DailyTally {
            new_cases,
            new_deaths,
            ..DailyTally::default()
        }
    }

    #[test]
    fn averages_before_any_day() {
        let tracker = StatisticsTracker::new(7);
        assert_approx_eq!(tracker.average_new_cases(), 0.0);
        assert_approx_eq!(tracker.average_new_deaths(), 0.0);
    }

    #[test]
    fn averages_over_partial_window() {
        let mut tracker = StatisticsTracker::new(7);
        tracker.record(&tally(4, 1));
        tracker.record(&tally(2, 0));
        assert_approx_eq!(tracker.average_new_cases(), 3.0);
        assert_approx_eq!(tracker.average_new_deaths(), 0.5);
    }

    #[test]
    fn window_drops_oldest_day() {
        let mut tracker = StatisticsTracker::new(3);
        for cases in [10, 1, 2, 3] {
            tracker.record(&tally(cases, 0));
        }
        assert_approx_eq!(tracker.average_new_cases(), 2.0);
        assert_eq!(tracker.cumulative_cases, 16);
    }

    #[test]
    #[should_panic(expected = "rolling window must be positive")]
    fn zero_window_panics() {
        let _ = StatisticsTracker::new(0);
    }
}
