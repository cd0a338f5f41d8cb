//! Immutable runtime configuration for the upload store and eval dispatcher.
//!
//! Built once at startup (the bot binary parses it from the environment)
//! and shared by reference afterwards.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::Semaphore;

/// Default extension accepted for uploaded policies.
pub const DEFAULT_EXTENSION: &str = ".kinfer";

/// Default eval executable (headless OSMesa entry point).
pub const DEFAULT_EXECUTABLE: &str = "kinfer-eval-osmesa";

/// Default wall-clock limit for a single eval.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Errors raised while validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown render backend: {0} (expected osmesa, egl or none)")]
    UnknownRenderBackend(String),

    #[error("allowed extension list must not be empty")]
    NoExtensions,

    #[error("invalid extension: {0:?}")]
    InvalidExtension(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("invalid timeout: {0} seconds (expected a finite, non-negative number)")]
    InvalidTimeout(f64),
}

/// Rendering backend selected for the eval subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderBackend {
    /// Pure software OSMesa rendering.
    #[default]
    Osmesa,
    /// EGL, optionally forced onto the Mesa software rasterizer.
    Egl,
    /// Leave the inherited environment untouched.
    None,
}

impl RenderBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderBackend::Osmesa => "osmesa",
            RenderBackend::Egl => "egl",
            RenderBackend::None => "none",
        }
    }
}

impl fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "osmesa" => Ok(RenderBackend::Osmesa),
            "egl" => Ok(RenderBackend::Egl),
            "none" | "" => Ok(RenderBackend::None),
            other => Err(ConfigError::UnknownRenderBackend(other.to_string())),
        }
    }
}

/// Where uploads land and which extensions are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub store_dir: PathBuf,
    /// Lower-case extensions, each with a leading dot.
    pub allowed_extensions: Vec<String>,
}

impl StoreConfig {
    /// Build a store config, normalizing every extension to `.lowercase`.
    pub fn new<I, S>(store_dir: impl Into<PathBuf>, extensions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed_extensions = Vec::new();
        for raw in extensions {
            let ext = normalize_extension(raw.as_ref())?;
            if !allowed_extensions.contains(&ext) {
                allowed_extensions.push(ext);
            }
        }
        if allowed_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        Ok(Self {
            store_dir: store_dir.into(),
            allowed_extensions,
        })
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("policies"),
            allowed_extensions: vec![DEFAULT_EXTENSION.to_string()],
        }
    }
}

fn normalize_extension(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() || trimmed.contains(['.', '/', '\\']) || trimmed.contains(char::is_whitespace)
    {
        return Err(ConfigError::InvalidExtension(raw.to_string()));
    }
    Ok(format!(".{}", trimmed.to_ascii_lowercase()))
}

/// Everything the dispatcher needs to build and bound an eval subprocess.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    pub executable: String,
    pub robot: String,
    /// Motion / eval name; also the first directory level under `out_dir`.
    pub eval_name: String,
    pub out_dir: PathBuf,
    pub local_model_dir: Option<PathBuf>,
    pub render_backend: RenderBackend,
    pub software_gl: bool,
    /// Always at least one.
    pub max_concurrency: usize,
    pub timeout: Duration,
}

impl EvalConfig {
    /// Clamp a raw concurrency setting into `1..=Semaphore::MAX_PERMITS`.
    pub fn clamp_concurrency(raw: i64) -> usize {
        usize::try_from(raw.max(1))
            .unwrap_or(usize::MAX)
            .min(Semaphore::MAX_PERMITS)
    }

    /// Timeout from a seconds value that may be fractional (`900.5`).
    pub fn timeout_from_secs(secs: f64) -> Result<Duration, ConfigError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(ConfigError::InvalidTimeout(secs));
        }
        Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidTimeout(secs))
    }

    /// Reject configurations that could never launch an eval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executable.trim().is_empty() {
            return Err(ConfigError::EmptyField("executable"));
        }
        if self.robot.trim().is_empty() {
            return Err(ConfigError::EmptyField("robot"));
        }
        if self.eval_name.trim().is_empty() {
            return Err(ConfigError::EmptyField("eval_name"));
        }
        Ok(())
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_EXECUTABLE.to_string(),
            robot: "kbot-headless".to_string(),
            eval_name: "walking_and_standing_unittest".to_string(),
            out_dir: PathBuf::from("runs"),
            local_model_dir: None,
            render_backend: RenderBackend::Osmesa,
            software_gl: false,
            max_concurrency: 1,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
