use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::Display as StrumDisplay;

use crate::disease::{Pathogen, SeverityLevel};

/// Index of an agent in the population arena. Ids are never reused, so an id
/// held after the agent has been removed simply no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay)]
#[serde(rename_all = "lowercase")]
pub enum Occupation {
    Worker,
    Student,
    Retired,
    Unemployed,
}

pub const ADULT_AGE: u8 = 18;

// (exclusive upper age, baseline risk)
const AGE_RISK_BANDS: [(u8, f64); 5] = [
    (18, 0.000_05),
    (40, 0.000_2),
    (60, 0.002),
    (70, 0.008),
    (80, 0.03),
];
const OLDEST_AGE_RISK: f64 = 0.08;
const COMORBIDITY_RISK_MULTIPLIER: f64 = 1.5;

/// Baseline probability of dying from a critical infection, before the
/// disease's own mortality is combined in. Non-decreasing in both age and
/// comorbidity count.
#[must_use]
pub fn baseline_mortality_risk(age: u8, comorbidity_count: usize) -> f64 {
    let age_risk = AGE_RISK_BANDS
        .iter()
        .find(|(upper, _)| age < *upper)
        .map_or(OLDEST_AGE_RISK, |(_, risk)| *risk);
    let exponent = i32::try_from(comorbidity_count).unwrap_or(i32::MAX);
    (age_risk * COMORBIDITY_RISK_MULTIPLIER.powi(exponent)).min(1.0)
}

/// Static attributes supplied by whoever builds the population.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub age: u8,
    pub gender: Gender,
    pub occupation: Occupation,
    pub household_id: Option<u64>,
    pub municipality: String,
    pub comorbidities: Vec<String>,
}

/// An active infection episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Infection {
    pub disease: Pathogen,
    pub days_infected: u32,
    pub incubation_period: u32,
    pub is_asymptomatic: bool,
    pub diagnosis_delay: u32,
    /// `None` while incubating.
    pub severity: Option<SeverityLevel>,
}

impl Infection {
    #[must_use]
    pub fn is_contagious(&self) -> bool {
        self.severity.is_some()
    }
}

/// Where an agent is in the disease state machine. Severity and
/// contagiousness only exist inside `Infected`, and the immunity counter only
/// inside `Recovered`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InfectionState {
    Susceptible,
    Infected(Infection),
    Recovered { immunity_remaining: u32 },
    Deceased,
}

impl InfectionState {
    #[must_use]
    pub fn is_susceptible(&self) -> bool {
        matches!(self, InfectionState::Susceptible)
    }

    #[must_use]
    pub fn is_infected(&self) -> bool {
        matches!(self, InfectionState::Infected(_))
    }

    #[must_use]
    pub fn is_recovered(&self) -> bool {
        matches!(self, InfectionState::Recovered { .. })
    }

    #[must_use]
    pub fn is_deceased(&self) -> bool {
        matches!(self, InfectionState::Deceased)
    }

    #[must_use]
    pub fn is_contagious(&self) -> bool {
        matches!(self, InfectionState::Infected(infection) if infection.is_contagious())
    }

    #[must_use]
    pub fn severity(&self) -> Option<SeverityLevel> {
        match self {
            InfectionState::Infected(infection) => infection.severity,
            _ => None,
        }
    }
}

/// Hospital and isolation are exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
pub enum CareStatus {
    Community,
    Hospitalized,
    Isolated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interventions {
    pub vaccinated: bool,
    pub vaccine_effectiveness: f64,
    pub mask_active: bool,
    pub mask_reduction_factor: f64,
    /// Whether the agent follows a mask mandate. Drawn the first time one is
    /// enforced and kept afterwards.
    pub mask_compliant: Option<bool>,
}

impl Default for Interventions {
    fn default() -> Self {
        Interventions {
            vaccinated: false,
            vaccine_effectiveness: 0.0,
            mask_active: false,
            mask_reduction_factor: 1.0,
            mask_compliant: None,
        }
    }
}

impl Interventions {
    /// Multiplier applied to transmission for this agent's side of a contact.
    #[must_use]
    pub fn mask_factor(&self) -> f64 {
        if self.mask_active {
            self.mask_reduction_factor
        } else {
            1.0
        }
    }

    #[must_use]
    pub fn effective_vaccine(&self) -> Option<f64> {
        self.vaccinated.then_some(self.vaccine_effectiveness)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub age: u8,
    pub gender: Gender,
    pub occupation: Occupation,
    pub household_id: Option<u64>,
    pub municipality: String,
    pub comorbidities: Vec<String>,
    pub mortality_risk: f64,
    pub(crate) infection: InfectionState,
    pub(crate) interventions: Interventions,
    pub(crate) care: CareStatus,
}

impl Agent {
    #[must_use]
    pub fn from_profile(id: AgentId, profile: AgentProfile) -> Agent {
        let mortality_risk = baseline_mortality_risk(profile.age, profile.comorbidities.len());
        Agent {
            id,
            age: profile.age,
            gender: profile.gender,
            occupation: profile.occupation,
            household_id: profile.household_id,
            municipality: profile.municipality,
            comorbidities: profile.comorbidities,
            mortality_risk,
            infection: InfectionState::Susceptible,
            interventions: Interventions::default(),
            care: CareStatus::Community,
        }
    }

    #[must_use]
    pub fn is_adult(&self) -> bool {
        self.age >= ADULT_AGE
    }

    #[must_use]
    pub fn infection(&self) -> &InfectionState {
        &self.infection
    }

    #[must_use]
    pub fn interventions(&self) -> &Interventions {
        &self.interventions
    }

    #[must_use]
    pub fn care(&self) -> CareStatus {
        self.care
    }

    #[must_use]
    pub fn is_hospitalized(&self) -> bool {
        self.care == CareStatus::Hospitalized
    }

    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.care == CareStatus::Isolated
    }

    #[must_use]
    pub fn is_admitted(&self) -> bool {
        self.care != CareStatus::Community
    }
}
