use crate::config::ConfigError;
use crate::resolver::error::ResolveError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One variable name or a list of them, as listed for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableSpec {
    Single(String),
    Multiple(Vec<String>),
}

impl VariableSpec {
    pub fn names(&self) -> Vec<&str> {
        match self {
            VariableSpec::Single(name) => vec![name.as_str()],
            VariableSpec::Multiple(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(&name)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            VariableSpec::Single(name) => name.is_empty(),
            VariableSpec::Multiple(names) => names.is_empty(),
        }
    }
}

impl From<&str> for VariableSpec {
    fn from(value: &str) -> Self {
        VariableSpec::Single(value.to_string())
    }
}

impl From<Vec<&str>> for VariableSpec {
    fn from(value: Vec<&str>) -> Self {
        VariableSpec::Multiple(value.into_iter().map(str::to_string).collect())
    }
}

/// A MERRA-2 data collection and the variables requested from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Catalogue key, e.g. `rad`. Filled from the map key when loading JSON.
    #[serde(default)]
    pub short_name: String,
    /// Earth Science Data Type directory on the OPeNDAP server.
    pub esdt_dir: String,
    /// Collection id, e.g. `tavg1_2d_rad_Nx`.
    pub collection: String,
    #[serde(rename = "merra_name")]
    pub variables: VariableSpec,
    pub standard_name: String,
    #[serde(default)]
    pub least_significant_digit: Option<u32>,
}

impl Collection {
    /// Invariant (`const_*`) collections carry a single time step and never change.
    pub fn is_invariant(&self) -> bool {
        self.collection.starts_with("const")
    }
}

/// The set of collections a client knows how to request, keyed by short name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalogue {
    collections: BTreeMap<String, Collection>,
}

impl Default for Catalogue {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalogue {
    /// The collections used by the clear-sky pipeline.
    pub fn builtin() -> Self {
        let entries = [
            (
                "rad",
                "M2T1NXRAD.5.12.4",
                "tavg1_2d_rad_Nx",
                vec!["ALBEDO", "CLDTOT", "SWGDN", "SWGDNCLR", "TAUTOT"],
                "radiation",
                Some(3),
            ),
            (
                "slv",
                "M2T1NXSLV.5.12.4",
                "tavg1_2d_slv_Nx",
                vec![
                    "TQV", "TO3", "PS", "CLDPRS", "CLDTMP", "H1000", "H250", "H500", "H850", "T2M",
                    "U250", "U500", "V250", "V500",
                ],
                "surface",
                Some(3),
            ),
            (
                "aer",
                "M2T1NXAER.5.12.4",
                "tavg1_2d_aer_Nx",
                vec!["TOTSCATAU", "TOTEXTTAU", "TOTANGSTR"],
                "aerosols",
                Some(3),
            ),
            (
                "asm",
                "M2C0NXASM.5.12.4",
                "const_2d_asm_Nx",
                vec!["PHIS"],
                "constants",
                None,
            ),
        ];

        let collections = entries
            .into_iter()
            .map(|(short, esdt, id, vars, standard, lsd)| {
                let variables = if vars.len() == 1 {
                    VariableSpec::Single(vars[0].to_string())
                } else {
                    VariableSpec::from(vars)
                };
                (
                    short.to_string(),
                    Collection {
                        short_name: short.to_string(),
                        esdt_dir: esdt.to_string(),
                        collection: id.to_string(),
                        variables,
                        standard_name: standard.to_string(),
                        least_significant_digit: lsd,
                    },
                )
            })
            .collect();

        Self { collections }
    }

    /// Builds a catalogue from a `short name -> collection` map.
    pub fn from_map(map: BTreeMap<String, Collection>) -> Self {
        let collections = map
            .into_iter()
            .map(|(key, mut collection)| {
                collection.short_name = key.clone();
                (key, collection)
            })
            .collect();
        Self { collections }
    }

    /// Loads a catalogue from a JSON object of the form
    /// `{"rad": {"esdt_dir": ..., "collection": ..., "merra_name": [...], "standard_name": ...}}`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes =
            std::fs::read(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let map: BTreeMap<String, Collection> = serde_json::from_slice(&bytes)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        Ok(Self::from_map(map))
    }

    pub fn get(&self, short_name: &str) -> Option<&Collection> {
        self.collections.get(short_name)
    }

    pub fn short_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Looks up every requested short name. The result is sorted by short name
    /// and free of duplicates.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Collection>, ResolveError> {
        if names.is_empty() {
            return Err(ResolveError::EmptyCollectionList);
        }
        let mut resolved: BTreeMap<&str, &Collection> = BTreeMap::new();
        for name in names {
            let name = name.as_ref();
            let collection = self
                .get(name)
                .ok_or_else(|| ResolveError::UnknownCollection(name.to_string()))?;
            resolved.insert(collection.short_name.as_str(), collection);
        }
        Ok(resolved.into_values().cloned().collect())
    }
}
