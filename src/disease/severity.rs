//! Clinical severity tiers and the pathogen-specific severity distributions.
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::population::Agent;

/// Clinical category of an infection once incubation has ended. Ordered by
/// increasing severity, which is also admission priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter,
)]
pub enum SeverityLevel {
    Asymptomatic,
    Mild,
    Moderate,
    Severe,
    Critical,
}

impl SeverityLevel {
    /// The next tier a symptomatic infection can escalate to. Asymptomatic
    /// infections never escalate and critical is the ceiling.
    #[must_use]
    pub fn escalated(self) -> Option<SeverityLevel> {
        match self {
            SeverityLevel::Mild => Some(SeverityLevel::Moderate),
            SeverityLevel::Moderate => Some(SeverityLevel::Severe),
            SeverityLevel::Severe => Some(SeverityLevel::Critical),
            SeverityLevel::Asymptomatic | SeverityLevel::Critical => None,
        }
    }

    #[must_use]
    pub fn is_symptomatic(self) -> bool {
        self != SeverityLevel::Asymptomatic
    }
}

/// One value per severity tier. Tiers missing from a configuration file take
/// `T::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityTable<T> {
    pub asymptomatic: T,
    pub mild: T,
    pub moderate: T,
    pub severe: T,
    pub critical: T,
}

impl<T: Copy> SeverityTable<T> {
    pub fn get(&self, severity: SeverityLevel) -> T {
        match severity {
            SeverityLevel::Asymptomatic => self.asymptomatic,
            SeverityLevel::Mild => self.mild,
            SeverityLevel::Moderate => self.moderate,
            SeverityLevel::Severe => self.severe,
            SeverityLevel::Critical => self.critical,
        }
    }

    pub fn values(&self) -> [T; 5] {
        [
            self.asymptomatic,
            self.mild,
            self.moderate,
            self.severe,
            self.critical,
        ]
    }
}

/// Symptomatic tiers in the order used by severity weight arrays.
pub const SYMPTOMATIC_TIERS: [SeverityLevel; 4] = [
    SeverityLevel::Mild,
    SeverityLevel::Moderate,
    SeverityLevel::Severe,
    SeverityLevel::Critical,
];

// (upper bound on baseline mortality risk, [mild, moderate, severe, critical])
const COVID_RISK_BUCKETS: [(f64, [f64; 4]); 4] = [
    (0.0001, [0.90, 0.08, 0.015, 0.005]),
    (0.001, [0.80, 0.15, 0.04, 0.01]),
    (0.005, [0.65, 0.20, 0.10, 0.05]),
    (0.02, [0.50, 0.25, 0.15, 0.10]),
];
const COVID_HIGHEST_RISK: [f64; 4] = [0.30, 0.30, 0.25, 0.15];

const INFLUENZA_WEIGHTS: [f64; 4] = [0.70, 0.20, 0.08, 0.02];
const INFLUENZA_HIGH_RISK_SHIFT: f64 = 0.02;

/// The pathogen being simulated. Each variant supplies its own severity
/// distribution; everything else about the course of infection is driven by
/// `DiseaseParameters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Pathogen {
    Covid19,
    Influenza,
}

impl Pathogen {
    /// Unnormalized weights over `SYMPTOMATIC_TIERS` for an unvaccinated agent.
    #[must_use]
    pub fn severity_weights(self, agent: &Agent) -> [f64; 4] {
        match self {
            Pathogen::Covid19 => COVID_RISK_BUCKETS
                .iter()
                .find(|(bound, _)| agent.mortality_risk < *bound)
                .map_or(COVID_HIGHEST_RISK, |(_, weights)| *weights),
            Pathogen::Influenza => {
                let mut weights = INFLUENZA_WEIGHTS;
                if agent.age < 5 || agent.age > 65 {
                    weights[2] += INFLUENZA_HIGH_RISK_SHIFT;
                    weights[3] += INFLUENZA_HIGH_RISK_SHIFT;
                }
                weights
            }
        }
    }
}

/// Scale the severe and critical mass by `1 - vaccine_effectiveness` and
/// renormalize. Unvaccinated agents get the weights back normalized.
#[must_use]
pub fn apply_vaccine_protection(mut weights: [f64; 4], vaccine_effectiveness: Option<f64>) -> [f64; 4] {
    if let Some(effectiveness) = vaccine_effectiveness {
        let protection = 1.0 - effectiveness.clamp(0.0, 1.0);
        weights[2] *= protection;
        weights[3] *= protection;
    }
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for weight in &mut weights {
            *weight /= total;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{AgentProfile, Gender, Occupation};
    use assert_approx_eq::assert_approx_eq;

    fn agent(age: u8, comorbidities: &[&str]) -> Agent {
        Agent::from_profile(
            crate::population::AgentId(0),
            AgentProfile {
                age,
                gender: Gender::Female,
                occupation: Occupation::Retired,
                household_id: None,
                municipality: "Centro".to_string(),
                comorbidities: comorbidities.iter().map(ToString::to_string).collect(),
            },
        )
    }

    #[test]
    fn escalation_ladder() {
        assert_eq!(SeverityLevel::Mild.escalated(), Some(SeverityLevel::Moderate));
        assert_eq!(SeverityLevel::Severe.escalated(), Some(SeverityLevel::Critical));
        assert_eq!(SeverityLevel::Critical.escalated(), None);
        assert_eq!(SeverityLevel::Asymptomatic.escalated(), None);
    }

    #[test]
    fn priority_order() {
        assert!(SeverityLevel::Critical > SeverityLevel::Severe);
        assert!(SeverityLevel::Severe > SeverityLevel::Moderate);
        assert!(SeverityLevel::Moderate > SeverityLevel::Mild);
    }

    #[test]
    fn table_defaults_missing_tiers() {
        let table: SeverityTable<f64> = serde_json::from_str(r#"{"mild": 1.0}"#).unwrap();
        assert_approx_eq!(table.get(SeverityLevel::Mild), 1.0);
        assert_approx_eq!(table.get(SeverityLevel::Critical), 0.0);
    }

    #[test]
    fn covid_weights_follow_risk_buckets() {
        let young = agent(20, &[]);
        let old = agent(85, &["diabetes", "hypertension"]);
        let young_weights = Pathogen::Covid19.severity_weights(&young);
        let old_weights = Pathogen::Covid19.severity_weights(&old);
        assert!(young_weights[3] < old_weights[3]);
        assert_approx_eq!(old_weights.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn influenza_shifts_mass_for_the_very_young() {
        let toddler = agent(3, &[]);
        let adult = agent(30, &[]);
        let toddler_weights = Pathogen::Influenza.severity_weights(&toddler);
        let adult_weights = Pathogen::Influenza.severity_weights(&adult);
        assert_approx_eq!(toddler_weights[2] - adult_weights[2], INFLUENZA_HIGH_RISK_SHIFT);
    }

    #[test]
    fn vaccination_reduces_severe_mass() {
        let weights = [0.5, 0.25, 0.15, 0.10];
        let unvaccinated = apply_vaccine_protection(weights, None);
        let vaccinated = apply_vaccine_protection(weights, Some(0.9));
        assert!(vaccinated[3] < unvaccinated[3]);
        assert!(vaccinated[0] > unvaccinated[0]);
        assert_approx_eq!(vaccinated.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn fully_effective_vaccine_removes_severe_outcomes() {
        let vaccinated = apply_vaccine_protection([0.5, 0.25, 0.15, 0.10], Some(1.0));
        assert_approx_eq!(vaccinated[2], 0.0);
        assert_approx_eq!(vaccinated[3], 0.0);
    }
}
