use std::io;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::context::Context;
use crate::error::EpiError;
use crate::population::{AgentProfile, ContextPopulationExt, Gender, Occupation};

#[derive(Deserialize, Debug)]
struct AgentRecord {
    id: usize,
    age: u8,
    gender: Gender,
    occupation: Occupation,
    household_id: Option<u64>,
    municipality: String,
    #[serde(default)]
    comorbidities: String,
}

impl From<AgentRecord> for AgentProfile {
    fn from(record: AgentRecord) -> Self {
        AgentProfile {
            age: record.age,
            gender: record.gender,
            occupation: record.occupation,
            household_id: record.household_id,
            municipality: record.municipality,
            comorbidities: record
                .comorbidities
                .split(';')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Parses population records from CSV with the columns `id, age, gender,
/// occupation, household_id, municipality, comorbidities`. A blank
/// `household_id` leaves the agent unassigned.
///
/// # Errors
///
/// Returns an error if a row cannot be read or deserialized.
pub fn read_profiles<R: io::Read>(reader: R) -> Result<Vec<(usize, AgentProfile)>, EpiError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut profiles = Vec::new();
    for result in reader.deserialize() {
        let record: AgentRecord = result?;
        profiles.push((record.id, record.into()));
    }
    Ok(profiles)
}

pub trait ContextPopulationLoaderExt {
    /// Adds every agent in the CSV file at `path`, in file order, and returns
    /// how many were added.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed. Nothing is
    /// added in that case.
    fn load_population(&mut self, path: &Path) -> Result<usize, EpiError>;
}

impl ContextPopulationLoaderExt for Context {
    fn load_population(&mut self, path: &Path) -> Result<usize, EpiError> {
        let file = std::fs::File::open(path)?;
        let profiles = read_profiles(file)?;
        let count = profiles.len();
        for (record_id, profile) in profiles {
            let id = self.add_agent(profile);
            if id.0 != record_id {
                warn!("population record {record_id} was loaded as agent {id}");
            }
        }
        info!("loaded {count} agents from {}", path.display());
        Ok(count)
    }
}
