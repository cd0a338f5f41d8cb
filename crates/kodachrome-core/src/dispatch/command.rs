//! Eval command construction.

use std::fmt;
use std::path::Path;

use crate::config::{EvalConfig, RenderBackend};

const MESA_EGL_VENDOR: &str = "/usr/share/glvnd/egl_vendor.d/50_mesa.json";

/// A fully resolved eval invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalCommand {
    /// Executable (looked up on `PATH` when not absolute).
    pub program: String,

    /// Positional and flag arguments.
    pub args: Vec<String>,

    /// Overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl EvalCommand {
    /// Build the invocation for one policy:
    /// `{exe} {policy} {robot} {eval} --out {out_dir} [--local-model-dir {dir}]`.
    pub fn build(config: &EvalConfig, policy_path: &Path) -> Self {
        let mut args = vec![
            policy_path.display().to_string(),
            config.robot.clone(),
            config.eval_name.clone(),
            "--out".to_string(),
            config.out_dir.display().to_string(),
        ];
        if let Some(dir) = &config.local_model_dir {
            args.push("--local-model-dir".to_string());
            args.push(dir.display().to_string());
        }

        Self {
            program: config.executable.clone(),
            args,
            env: render_env(config.render_backend, config.software_gl),
        }
    }
}

/// Environment overrides selecting a headless rendering backend.
pub fn render_env(backend: RenderBackend, software_gl: bool) -> Vec<(String, String)> {
    let pair = |k: &str, v: &str| (k.to_string(), v.to_string());
    match backend {
        RenderBackend::Osmesa => vec![
            pair("MUJOCO_GL", "osmesa"),
            pair("PYOPENGL_PLATFORM", "osmesa"),
        ],
        RenderBackend::Egl => {
            let mut env = vec![pair("MUJOCO_GL", "egl"), pair("PYOPENGL_PLATFORM", "egl")];
            if software_gl {
                env.push(pair("LIBGL_ALWAYS_SOFTWARE", "1"));
                env.push(pair("__EGL_VENDOR_LIBRARY_FILENAMES", MESA_EGL_VENDOR));
            }
            env
        }
        RenderBackend::None => Vec::new(),
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Shell-style rendering, for logs only.
impl fmt::Display for EvalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}
