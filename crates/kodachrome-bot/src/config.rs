//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kodachrome_core::config::{DEFAULT_EXECUTABLE, DEFAULT_TIMEOUT_SECS};
use kodachrome_core::{EvalConfig, RenderBackend, StoreConfig};

#[derive(Parser, Debug)]
#[command(name = "kodachrome")]
#[command(author = "K-Scale Labs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discord bot that evaluates uploaded kinfer policies", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "LOG_JSON")]
    pub json: bool,

    /// Discord bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Prefix in front of the `policy` command
    #[arg(long, env = "COMMAND_PREFIX", default_value = "!")]
    pub prefix: String,

    /// Directory uploaded policies are saved to
    #[arg(long, env = "POLICY_DIR", default_value = "policies")]
    pub policy_dir: PathBuf,

    /// Accepted upload extensions, comma separated
    #[arg(
        long,
        env = "ALLOWED_EXTENSIONS",
        value_delimiter = ',',
        default_value = ".kinfer"
    )]
    pub allowed_extensions: Vec<String>,

    /// Eval executable, looked up on PATH unless absolute
    #[arg(long, env = "EVAL_EXECUTABLE", default_value = DEFAULT_EXECUTABLE)]
    pub executable: String,

    /// Robot the policy is evaluated on
    #[arg(long, env = "EVAL_ROBOT", default_value = "kbot-headless")]
    pub robot: String,

    /// Motion / eval to run
    #[arg(long, env = "MOTION_NAME", default_value = "walking_and_standing_unittest")]
    pub motion: String,

    /// Root directory for eval run artifacts
    #[arg(long, env = "EVAL_OUT_DIR", default_value = "runs")]
    pub out_dir: PathBuf,

    /// Local robot model directory passed through to the eval
    #[arg(long, env = "LOCAL_MODEL_DIR")]
    pub local_model_dir: Option<PathBuf>,

    /// Headless rendering backend (osmesa, egl, none)
    #[arg(long, env = "EVAL_RENDER_BACKEND", default_value = "osmesa")]
    pub render_backend: RenderBackend,

    /// Force Mesa software rasterization with the egl backend
    #[arg(long, env = "EVAL_SOFTWARE_GL")]
    pub software_gl: bool,

    /// Maximum evals running at once (values below 1 mean 1)
    #[arg(long, env = "EVAL_MAX_CONCURRENCY", default_value_t = 1, allow_negative_numbers = true)]
    pub max_concurrency: i64,

    /// Seconds before a running eval is killed (fractions allowed)
    #[arg(
        long,
        env = "EVAL_TIMEOUT_S",
        default_value_t = DEFAULT_TIMEOUT_SECS as f64,
        allow_negative_numbers = true
    )]
    pub timeout_secs: f64,
}

/// Validated, immutable bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub prefix: String,
    pub store: StoreConfig,
    pub eval: EvalConfig,
}

impl BotConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let token = cli
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("BOT_TOKEN is not set")?;

        let store = StoreConfig::new(&cli.policy_dir, &cli.allowed_extensions)
            .context("invalid ALLOWED_EXTENSIONS")?;

        let eval = EvalConfig {
            executable: cli.executable.clone(),
            robot: cli.robot.clone(),
            eval_name: cli.motion.clone(),
            out_dir: cli.out_dir.clone(),
            local_model_dir: cli.local_model_dir.clone(),
            render_backend: cli.render_backend,
            software_gl: cli.software_gl,
            max_concurrency: EvalConfig::clamp_concurrency(cli.max_concurrency),
            timeout: EvalConfig::timeout_from_secs(cli.timeout_secs)
                .context("invalid EVAL_TIMEOUT_S")?,
        };
        eval.validate().context("invalid eval configuration")?;

        Ok(Self {
            token,
            prefix: cli.prefix.clone(),
            store,
            eval,
        })
    }
}
