use std::any::TypeId;
use std::cell::RefCell;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use csv::Writer;
use log::trace;

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::EpiError;
use crate::HashMap;

/// A row type that can be written to a CSV report.
pub trait Report: 'static {
    fn type_id(&self) -> TypeId;

    /// # Errors
    ///
    /// Returns an error if the row cannot be serialized.
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), csv::Error>;
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! define_report {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(&self, writer: &mut csv::Writer<std::fs::File>) -> Result<(), csv::Error> {
                writer.serialize(self)
            }
        }
    };
}
pub use define_report;

/// Where report files go and how they are named.
pub struct ConfigReportOptions {
    pub file_prefix: String,
    pub directory: PathBuf,
    pub overwrite: bool,
}

impl ConfigReportOptions {
    #[must_use]
    pub fn new() -> Self {
        ConfigReportOptions {
            file_prefix: String::new(),
            directory: PathBuf::from("."),
            overwrite: false,
        }
    }

    pub fn file_prefix(&mut self, file_prefix: String) -> &mut ConfigReportOptions {
        self.file_prefix = file_prefix;
        self
    }

    pub fn directory(&mut self, directory: PathBuf) -> &mut ConfigReportOptions {
        self.directory = directory;
        self
    }

    pub fn overwrite(&mut self, overwrite: bool) -> &mut ConfigReportOptions {
        self.overwrite = overwrite;
        self
    }
}

impl Default for ConfigReportOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct ReportData {
    file_writers: RefCell<HashMap<TypeId, Writer<File>>>,
    config: ConfigReportOptions,
}

define_data_plugin!(
    ReportPlugin,
    ReportData,
    ReportData {
        file_writers: RefCell::new(HashMap::default()),
        config: ConfigReportOptions::new(),
    }
);

fn create_report_file(path: &Path, overwrite: bool) -> Result<File, EpiError> {
    if path.exists() && !overwrite {
        return Err(EpiError::ReportError(format!(
            "File already exists: {}. Please set `overwrite` to true in the file configuration and rerun.",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(File::create(path)?)
}

pub trait ContextReportExt {
    /// Add a report file for the row type `T`. The file is named
    /// `<prefix><short_name>.csv` inside the configured directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and overwriting is disabled, or if
    /// it cannot be created.
    fn add_report<T: Report>(&mut self, short_name: &str) -> Result<(), EpiError>;

    /// Write a new row to the report file associated with the row's type.
    ///
    /// # Errors
    ///
    /// Returns an error if no report was added for this type or the write fails.
    fn send_report<T: Report>(&self, report: T) -> Result<(), EpiError>;

    fn report_options(&mut self) -> &mut ConfigReportOptions;
}

impl ContextReportExt for Context {
    fn add_report<T: Report>(&mut self, short_name: &str) -> Result<(), EpiError> {
        let data_container = self.get_data_container_mut(ReportPlugin);
        let path = data_container
            .config
            .directory
            .join(format!("{}{short_name}.csv", data_container.config.file_prefix));
        trace!("adding report {}", path.display());
        let file = create_report_file(&path, data_container.config.overwrite)?;
        data_container
            .file_writers
            .borrow_mut()
            .insert(TypeId::of::<T>(), Writer::from_writer(file));
        Ok(())
    }

    fn send_report<T: Report>(&self, report: T) -> Result<(), EpiError> {
        let data_container = self
            .get_data_container(ReportPlugin)
            .ok_or_else(|| EpiError::ReportError("No writer found for the report type".into()))?;
        let mut writers = data_container.file_writers.borrow_mut();
        let writer = writers
            .get_mut(&report.type_id())
            .ok_or_else(|| EpiError::ReportError("No writer found for the report type".into()))?;
        report.serialize(writer)?;
        writer.flush()?;
        Ok(())
    }

    fn report_options(&mut self) -> &mut ConfigReportOptions {
        &mut self.get_data_container_mut(ReportPlugin).config
    }
}
