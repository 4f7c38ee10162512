//! Global properties are typed, write-once, validated configuration values.
//!
//! A property is declared with `define_global_property!(Name, Type, validator)`
//! and can be set programmatically or loaded from a JSON file whose top-level
//! object is keyed by `"<crate>.<Name>"`:
//!
//! ```json
//! { "epi_clusters.Parameters": { "seed": 42, "max_days": 120, ... } }
//! ```
use std::any::{Any, TypeId};
use std::fs;
use std::path::Path;

use log::trace;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::EpiError;
use crate::HashMap;

/// Defines a global property with the following parameters:
/// * `$global_property`: Name for the identifier type of the global property
/// * `$value`: The type of the property's value
/// * `$validate`: A function (or closure) that checks the validity of the property (optional)
#[macro_export]
macro_rules! define_global_property {
    ($global_property:ident, $value:ty, $validate:expr) => {
        #[derive(Copy, Clone)]
        pub struct $global_property;

        impl $crate::global_properties::GlobalProperty for $global_property {
            type Value = $value;

            fn name() -> String {
                let module = module_path!();
                let krate = module.split("::").next().unwrap_or(module);
                format!("{}.{}", krate, stringify!($global_property))
            }

            fn validate(value: &$value) -> Result<(), $crate::error::EpiError> {
                $validate(value)
            }
        }
    };

    ($global_property:ident, $value:ty) => {
        $crate::define_global_property!($global_property, $value, |_| Ok(()));
    };
}
pub use define_global_property;

pub trait GlobalProperty: Any {
    type Value: Any + DeserializeOwned;

    /// The key this property is stored under in a configuration file.
    fn name() -> String;

    /// # Errors
    ///
    /// Returns an error describing why `value` is not acceptable.
    fn validate(value: &Self::Value) -> Result<(), EpiError>;
}

#[derive(Default)]
struct GlobalPropertiesDataContainer {
    global_property_container: HashMap<TypeId, Box<dyn Any>>,
}

define_data_plugin!(
    GlobalPropertiesPlugin,
    GlobalPropertiesDataContainer,
    GlobalPropertiesDataContainer::default()
);

pub trait ContextGlobalPropertiesExt {
    /// Validates and stores a property value.
    ///
    /// # Errors
    ///
    /// Returns `EpiError::IllegalGlobalPropertyValue` if the property is
    /// already set or if validation fails.
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        property: T,
        value: T::Value,
    ) -> Result<(), EpiError>;

    /// Returns the value of a property, or `None` if it has not been set.
    fn get_global_property_value<T: GlobalProperty>(&self, property: T) -> Option<&T::Value>;

    /// Reads `file_name` as a JSON object and sets `property` from the entry
    /// named `T::name()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, if the entry is
    /// missing, or if validation fails.
    fn load_global_property_from_file<T: GlobalProperty>(
        &mut self,
        property: T,
        file_name: &Path,
    ) -> Result<(), EpiError>;
}

impl ContextGlobalPropertiesExt for Context {
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        _property: T,
        value: T::Value,
    ) -> Result<(), EpiError> {
        T::validate(&value)?;
        let container = self.get_data_container_mut(GlobalPropertiesPlugin);
        if container
            .global_property_container
            .contains_key(&TypeId::of::<T>())
        {
            return Err(EpiError::IllegalGlobalPropertyValue(format!(
                "{} is already set",
                T::name()
            )));
        }
        trace!("setting global property {}", T::name());
        container
            .global_property_container
            .insert(TypeId::of::<T>(), Box::new(value));
        Ok(())
    }

    fn get_global_property_value<T: GlobalProperty>(&self, _property: T) -> Option<&T::Value> {
        self.get_data_container(GlobalPropertiesPlugin)?
            .global_property_container
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T::Value>())
    }

    fn load_global_property_from_file<T: GlobalProperty>(
        &mut self,
        property: T,
        file_name: &Path,
    ) -> Result<(), EpiError> {
        trace!("loading global properties from {file_name:?}");
        let config_file = fs::read_to_string(file_name)?;
        let mut values: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&config_file)?;
        let raw = values
            .remove(&T::name())
            .ok_or_else(|| EpiError::NoGlobalProperty(T::name()))?;
        let value: T::Value = serde_json::from_value(raw)?;
        self.set_global_property_value(property, value)
    }
}
