use std::path::Path;

use thiserror::Error;

use crate::recommend::TreatmentMappings;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set to a Postgres connection string")]
    Missing(&'static str),

    #[error("{name} is not a valid value: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("failed to read mapping file {path}")]
    MappingsUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mapping file {path} is not valid JSON")]
    MappingsMalformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Store connection settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let max_connections = match lookup("WELLNESS_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "WELLNESS_MAX_CONNECTIONS",
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// Built-in mappings unless a JSON override file is given.
pub fn load_mappings(path: Option<&Path>) -> Result<TreatmentMappings, ConfigError> {
    let Some(path) = path else {
        return Ok(TreatmentMappings::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::MappingsUnreadable {
        path: path.display().to_string(),
        source,
    })?;
    let mappings =
        TreatmentMappings::from_json(&raw).map_err(|source| ConfigError::MappingsMalformed {
            path: path.display().to_string(),
            source,
        })?;

    tracing::info!(
        path = %path.display(),
        biomarkers = mappings.biomarkers.len(),
        promis = mappings.promis.len(),
        "loaded treatment mappings"
    );
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = Settings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

        let err = Settings::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn pool_size_defaults_and_validates() {
        let settings =
            Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/wellness")]))
                .unwrap();
        assert_eq!(settings.max_connections, DEFAULT_MAX_CONNECTIONS);

        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/wellness"),
            ("WELLNESS_MAX_CONNECTIONS", "12"),
        ]))
        .unwrap();
        assert_eq!(settings.max_connections, 12);

        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/wellness"),
            ("WELLNESS_MAX_CONNECTIONS", "0"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "WELLNESS_MAX_CONNECTIONS is not a valid value: 0");
    }

    #[test]
    fn mappings_fall_back_to_defaults() {
        let mappings = load_mappings(None).unwrap();
        assert_eq!(mappings.for_biomarker("Vitamin D"), ["Vitamin D3".to_string()]);
    }

    #[test]
    fn mapping_file_errors_are_typed() {
        let temp_dir = TempDir::new().unwrap();

        let missing = temp_dir.path().join("missing.json");
        assert!(matches!(
            load_mappings(Some(&missing)),
            Err(ConfigError::MappingsUnreadable { .. })
        ));

        let malformed = temp_dir.path().join("mappings.json");
        std::fs::write(&malformed, "{ not json").unwrap();
        assert!(matches!(
            load_mappings(Some(&malformed)),
            Err(ConfigError::MappingsMalformed { .. })
        ));
    }

    #[test]
    fn mapping_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"biomarkers": {{"Ferritin": ["Iron Bisglycinate"]}}, "promis": {{}}}}"#
        )
        .unwrap();

        let mappings = load_mappings(Some(file.path())).unwrap();
        assert_eq!(mappings.for_biomarker("Ferritin"), ["Iron Bisglycinate".to_string()]);
        assert!(mappings.for_biomarker("Vitamin D").is_empty());
    }
}
