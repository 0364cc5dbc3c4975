use std::sync::Arc;

use super::autotune::AutotuneConfig;

/// Static mutex holding the global configuration, initialized as `None`.
static AUTOSEL_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// The global configuration for the selection engine.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration for autotuning and verification.
    #[serde(default)]
    pub autotune: AutotuneConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current
    /// directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `autosel.toml`
    /// in the current directory or its parents. If no file is found, a default
    /// configuration is used.
    ///
    /// # Notes
    ///
    /// Calling this function is somewhat expensive, because of a global static
    /// lock. Cache the `Arc` or the values you need instead of calling it in a
    /// hot loop.
    pub fn get() -> Arc<Self> {
        let mut state = AUTOSEL_GLOBAL_CONFIG.lock();
        if state.as_ref().is_none() {
            let config = Self::from_current_dir().override_from_env();
            *state = Some(Arc::new(config));
        }

        state.as_ref().cloned().unwrap()
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot
    /// be overridden afterwards.
    pub fn set(config: Self) {
        let mut state = AUTOSEL_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Overrides configuration fields based on environment variables.
    pub fn override_from_env(mut self) -> Self {
        use super::autotune::{AutotuneLevel, AutotuneLogLevel};

        if let Ok(val) = std::env::var("AUTOSEL_DEBUG_LOG") {
            self.autotune.logger.level = AutotuneLogLevel::Full;

            match val.as_str() {
                "stdout" => self.autotune.logger.stdout = true,
                "stderr" => self.autotune.logger.stderr = true,
                "1" | "true" => {
                    self.autotune.logger.file = Some("/tmp/autosel.log".into());
                }
                "0" | "false" => {
                    self.autotune.logger.level = AutotuneLogLevel::Disabled;
                }
                _ => {}
            }
        }

        if let Ok(val) = std::env::var("AUTOSEL_AUTOTUNE_LEVEL") {
            self.autotune.level = match val.as_str() {
                "minimal" => AutotuneLevel::Minimal,
                "balanced" => AutotuneLevel::Balanced,
                "full" => AutotuneLevel::Full,
                _ => self.autotune.level,
            };
        }

        self
    }

    /// Loads the configuration from the current directory or one of its
    /// parents, falling back to defaults when no file exists.
    pub fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            let file = dir.join("autosel.toml");
            if file.exists() {
                return Self::from_file_path(file);
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    fn from_file_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        let Ok(content) = std::fs::read_to_string(path.as_ref()) else {
            return Self::default();
        };

        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!(
                    "Ignoring malformed config file '{}': {err}",
                    path.as_ref().display()
                );
                Self::default()
            }
        }
    }

    /// Save the default configuration to the provided file path.
    pub fn save_default<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<()> {
        use std::io::Write;

        let config = Self::get();
        let content =
            toml::to_string_pretty(config.as_ref()).expect("Default config should be serializable");
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())?;

        Ok(())
    }
}
