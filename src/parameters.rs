//! Run configuration, loaded once from JSON under the `epi_clusters.Parameters`
//! key and validated before the simulation starts.
use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::context::Context;
use crate::define_global_property;
use crate::disease::DiseaseParameters;
use crate::error::EpiError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::healthcare::HealthcareParameters;
use crate::network::{ClusterType, TimePeriod};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Params {
    /// The random seed for the simulation.
    pub seed: u64,
    /// Number of simulated days.
    pub max_days: u32,
    /// Number of agents infected before the first day.
    pub initial_infections: usize,
    /// CSV population loaded by `population_loader`.
    #[serde(default)]
    pub population_file: Option<PathBuf>,
    /// Short name of the daily statistics CSV, `daily_statistics` when absent.
    #[serde(default)]
    pub daily_report_name: Option<String>,
    #[serde(default)]
    pub disease: DiseaseParameters,
    #[serde(default)]
    pub demographics: DemographicParameters,
    #[serde(default)]
    pub clusters: ClusterParameters,
    #[serde(default)]
    pub healthcare: HealthcareParameters,
}

impl Params {
    /// A small configuration with default sections, mostly useful for tests.
    #[must_use]
    pub fn with_defaults(seed: u64, max_days: u32, initial_infections: usize) -> Params {
        Params {
            seed,
            max_days,
            initial_infections,
            population_file: None,
            daily_report_name: None,
            disease: DiseaseParameters::default(),
            demographics: DemographicParameters::default(),
            clusters: ClusterParameters::default(),
            healthcare: HealthcareParameters::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightedSize {
    pub size: usize,
    pub weight: f64,
}

impl WeightedSize {
    #[must_use]
    pub const fn new(size: usize, weight: f64) -> WeightedSize {
        WeightedSize { size, weight }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter)]
pub enum SchoolType {
    Nursery,
    Primary,
    Secondary,
    PreUniversity,
}

/// One school type in a municipality. Pupils are agents in the inclusive age
/// band who do not work. With a known `count` pupils are split evenly across
/// that many schools, otherwise schools are filled up to `size`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SchoolSpec {
    pub school_type: SchoolType,
    pub min_age: u8,
    pub max_age: u8,
    pub size: usize,
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MunicipalityDemographics {
    pub household_sizes: Vec<WeightedSize>,
    pub workplace_sizes: Vec<WeightedSize>,
    /// Known number of companies. Overrides `workplace_sizes` when set.
    pub company_count: Option<u32>,
    pub schools: Vec<SchoolSpec>,
    pub shopping_centers: u32,
}

impl Default for MunicipalityDemographics {
    fn default() -> Self {
        MunicipalityDemographics {
            household_sizes: vec![
                WeightedSize::new(1, 0.30),
                WeightedSize::new(2, 0.25),
                WeightedSize::new(3, 0.20),
                WeightedSize::new(4, 0.15),
                WeightedSize::new(5, 0.05),
                WeightedSize::new(6, 0.03),
                WeightedSize::new(7, 0.015),
                WeightedSize::new(8, 0.005),
            ],
            workplace_sizes: vec![
                WeightedSize::new(10, 0.6),
                WeightedSize::new(50, 0.3),
                WeightedSize::new(100, 0.1),
            ],
            company_count: None,
            schools: vec![
                SchoolSpec {
                    school_type: SchoolType::Nursery,
                    min_age: 3,
                    max_age: 5,
                    size: 20,
                    count: None,
                },
                SchoolSpec {
                    school_type: SchoolType::Primary,
                    min_age: 6,
                    max_age: 11,
                    size: 30,
                    count: None,
                },
                SchoolSpec {
                    school_type: SchoolType::Secondary,
                    min_age: 12,
                    max_age: 15,
                    size: 40,
                    count: None,
                },
                SchoolSpec {
                    school_type: SchoolType::PreUniversity,
                    min_age: 16,
                    max_age: 17,
                    size: 50,
                    count: None,
                },
            ],
            shopping_centers: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemographicParameters {
    /// Used for any municipality without its own entry.
    pub default: MunicipalityDemographics,
    pub municipalities: BTreeMap<String, MunicipalityDemographics>,
    pub working_age_min: u8,
    pub working_age_max: u8,
}

impl Default for DemographicParameters {
    fn default() -> Self {
        DemographicParameters {
            default: MunicipalityDemographics::default(),
            municipalities: BTreeMap::new(),
            working_age_min: 18,
            working_age_max: 64,
        }
    }
}

impl DemographicParameters {
    #[must_use]
    pub fn for_municipality(&self, municipality: &str) -> &MunicipalityDemographics {
        self.municipalities
            .get(municipality)
            .unwrap_or(&self.default)
    }

    fn validate(&self) -> Result<(), EpiError> {
        if self.working_age_min > self.working_age_max {
            return Err(EpiError::EpiError(
                "working_age_min must not exceed working_age_max".to_string(),
            ));
        }
        validate_municipality("default", &self.default)?;
        for (name, municipality) in &self.municipalities {
            validate_municipality(name, municipality)?;
        }
        Ok(())
    }
}

fn validate_size_distribution(
    municipality: &str,
    label: &str,
    sizes: &[WeightedSize],
) -> Result<(), EpiError> {
    if sizes.is_empty() {
        return Err(EpiError::EpiError(format!(
            "{municipality}: {label} distribution must not be empty"
        )));
    }
    if sizes.iter().any(|entry| entry.size == 0) {
        return Err(EpiError::EpiError(format!(
            "{municipality}: {label} sizes must be positive"
        )));
    }
    if sizes
        .iter()
        .any(|entry| !entry.weight.is_finite() || entry.weight < 0.0)
    {
        return Err(EpiError::EpiError(format!(
            "{municipality}: {label} weights must be non-negative"
        )));
    }
    if sizes.iter().map(|entry| entry.weight).sum::<f64>() <= 0.0 {
        return Err(EpiError::EpiError(format!(
            "{municipality}: {label} weights must not all be zero"
        )));
    }
    Ok(())
}

fn validate_municipality(name: &str, municipality: &MunicipalityDemographics) -> Result<(), EpiError> {
    validate_size_distribution(name, "household size", &municipality.household_sizes)?;
    match municipality.company_count {
        Some(0) => {
            return Err(EpiError::EpiError(format!(
                "{name}: company_count must be positive"
            )));
        }
        Some(_) => {}
        None => validate_size_distribution(name, "workplace size", &municipality.workplace_sizes)?,
    }
    for school in &municipality.schools {
        if school.min_age > school.max_age {
            return Err(EpiError::EpiError(format!(
                "{name}: {} min_age must not exceed max_age",
                school.school_type
            )));
        }
        if school.size == 0 || school.count == Some(0) {
            return Err(EpiError::EpiError(format!(
                "{name}: {} size and count must be positive",
                school.school_type
            )));
        }
    }
    if municipality.shopping_centers == 0 {
        return Err(EpiError::EpiError(format!(
            "{name}: shopping_centers must be positive"
        )));
    }
    Ok(())
}

/// When and how strongly the subclusters of one cluster type interact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSettings {
    pub active_periods: Vec<TimePeriod>,
    pub interaction_probability: f64,
    /// Edges each new node adds in a preferential-attachment graph.
    #[serde(default = "default_attachment_edges")]
    pub attachment_edges: usize,
}

fn default_attachment_edges() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterParameters {
    pub home: ClusterSettings,
    pub work: ClusterSettings,
    pub school: ClusterSettings,
    pub shopping: ClusterSettings,
}

impl Default for ClusterParameters {
    fn default() -> Self {
        ClusterParameters {
            home: ClusterSettings {
                active_periods: vec![TimePeriod::Morning, TimePeriod::Evening, TimePeriod::Night],
                interaction_probability: 0.6,
                attachment_edges: default_attachment_edges(),
            },
            work: ClusterSettings {
                active_periods: vec![TimePeriod::Daytime],
                interaction_probability: 0.3,
                attachment_edges: default_attachment_edges(),
            },
            school: ClusterSettings {
                active_periods: vec![TimePeriod::Morning, TimePeriod::Daytime],
                interaction_probability: 0.4,
                attachment_edges: default_attachment_edges(),
            },
            shopping: ClusterSettings {
                active_periods: vec![TimePeriod::Evening],
                interaction_probability: 0.1,
                attachment_edges: default_attachment_edges(),
            },
        }
    }
}

impl ClusterParameters {
    #[must_use]
    pub fn settings(&self, cluster_type: ClusterType) -> &ClusterSettings {
        match cluster_type {
            ClusterType::Home => &self.home,
            ClusterType::Work => &self.work,
            ClusterType::School => &self.school,
            ClusterType::Shopping => &self.shopping,
        }
    }

    fn validate(&self) -> Result<(), EpiError> {
        for (cluster_type, settings) in [
            (ClusterType::Home, &self.home),
            (ClusterType::Work, &self.work),
            (ClusterType::School, &self.school),
            (ClusterType::Shopping, &self.shopping),
        ] {
            if !(0.0..=1.0).contains(&settings.interaction_probability) {
                return Err(EpiError::EpiError(format!(
                    "{cluster_type} interaction_probability must be in [0, 1]"
                )));
            }
            if settings.attachment_edges == 0 {
                return Err(EpiError::EpiError(format!(
                    "{cluster_type} attachment_edges must be positive"
                )));
            }
        }
        Ok(())
    }
}

fn validate_parameters(parameters: &Params) -> Result<(), EpiError> {
    if parameters.max_days == 0 {
        return Err(EpiError::EpiError(
            "max_days must be positive".to_string(),
        ));
    }
    parameters.disease.validate()?;
    parameters.demographics.validate()?;
    parameters.clusters.validate()?;
    parameters.healthcare.validate()?;
    Ok(())
}

define_global_property!(Parameters, Params, validate_parameters);

pub trait ContextParametersExt {
    fn get_params(&self) -> &Params;
}

impl ContextParametersExt for Context {
    fn get_params(&self) -> &Params {
        self.get_global_property_value(Parameters)
            .expect("Expected Parameters to be set")
    }
}
