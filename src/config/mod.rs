//! Layered configuration loading

mod settings;

pub use settings::{
    CustomExpression, ExecutionConfig, FoamConfig, LogLevel, LoggingConfig, MpiSettings,
    SolverOutputConfig,
};

use crate::error::{FoamError, Result};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::path::Path;

/// Prefix for configuration taken from the environment
pub const ENV_PREFIX: &str = "FOAMRUN";

/// Layers configuration sources, later ones overriding earlier ones
pub struct ConfigBuilder<T> {
    inner: config::ConfigBuilder<config::builder::DefaultState>,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned + Debug> ConfigBuilder<T> {
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            _marker: PhantomData,
        }
    }

    /// Add a TOML file, skipped with a warning when it does not exist
    pub fn add_file(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            debug!("Reading configuration from {}", path.display());
            self.inner = self
                .inner
                .add_source(config::File::from(path).format(config::FileFormat::Toml));
        } else {
            warn!("Configuration file not found: {}", path.display());
        }
        self
    }

    /// Add `<PREFIX>__SECTION__KEY` environment variables
    pub fn add_env(mut self, prefix: &str) -> Self {
        self.inner = self.inner.add_source(
            config::Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );
        self
    }

    pub fn add_toml(mut self, toml: &str) -> Self {
        self.inner = self
            .inner
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));
        self
    }

    /// Merge the sources and deserialize, missing keys take serde defaults
    pub fn build(self) -> Result<T> {
        let merged = self
            .inner
            .build()
            .map_err(|e| FoamError::Config(format!("Failed to build configuration: {}", e)))?;
        let result: T = merged
            .try_deserialize()
            .map_err(|e| FoamError::Config(format!("Failed to deserialize configuration: {}", e)))?;
        debug!("Configuration loaded: {:?}", result);
        Ok(result)
    }
}

impl<T: DeserializeOwned + Debug> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl FoamConfig {
    /// Load the configuration: defaults, then the optional file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::<FoamConfig>::new();
        if let Some(path) = path {
            builder = builder.add_file(path);
        }
        builder.add_env(ENV_PREFIX).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Accumulation;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = ConfigBuilder::<FoamConfig>::new()
            .add_toml("")
            .build()
            .unwrap();

        assert_eq!(config.solver_output.time_regexp, "^(Time =|Iteration:) (.+)$");
        assert!(!config.solver_output.strip_spaces);
        assert_eq!(config.execution.stop_file_interval_ms, 500);
        assert_eq!(config.execution.state_write_interval_secs, 10);
        assert_eq!(config.mpi.run, "mpirun");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.custom.is_empty());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [execution]
            stop_file_interval_ms = 250
            control_dict_restore_wait_secs = 5

            [mpi]
            run = "mpiexec"
            options_post = ["-x", "PATH"]

            [[custom]]
            name = "Forces"
            expr = "^forces: (%f%) (%f%)$"
            titles = ["fx", "fy"]
            accumulation = "last"
        "#
        )
        .unwrap();

        let config = FoamConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.execution.stop_file_interval_ms, 250);
        assert_eq!(config.execution.control_dict_restore_wait_secs, 5);
        assert_eq!(config.mpi.run, "mpiexec");
        assert_eq!(config.mpi.options_post, vec!["-x", "PATH"]);
        assert_eq!(config.custom.len(), 1);
        assert_eq!(config.custom[0].accumulation, Accumulation::Last);
        assert!(config.custom[0].enabled);
    }

    #[test]
    fn test_multiple_sources() {
        let first = r#"
        [solver_output]
        strip_spaces = true
        time_regexp = "^T = (.+)$"
        "#;

        let second = r#"
        [solver_output]
        time_regexp = "^(Time =) (.+)$"
        "#;

        // Later sources override earlier ones
        let config = ConfigBuilder::<FoamConfig>::new()
            .add_toml(first)
            .add_toml(second)
            .build()
            .unwrap();

        assert_eq!(config.solver_output.time_regexp, "^(Time =) (.+)$");
        assert!(config.solver_output.strip_spaces);
    }
}
