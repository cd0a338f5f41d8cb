//! Shared helpers for kodachrome-core integration tests.
//!
//! The external eval tool is replaced by `sh` running a script. Scripts are
//! passed where the policy path goes, so inside a script `$0` is the policy,
//! `$1` the robot, `$2` the eval name, `$3` is `--out` and `$4` the output dir.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kodachrome_core::{EvalConfig, RenderBackend, ReplySink};

pub const ROBOT: &str = "kbot";
pub const EVAL_NAME: &str = "walk";

/// Eval config that runs scripts through `sh`.
pub fn sh_eval_config(out_dir: &Path) -> EvalConfig {
    EvalConfig {
        executable: "sh".to_string(),
        robot: ROBOT.to_string(),
        eval_name: EVAL_NAME.to_string(),
        out_dir: out_dir.to_path_buf(),
        local_model_dir: None,
        render_backend: RenderBackend::None,
        software_gl: false,
        max_concurrency: 1,
        timeout: Duration::from_secs(20),
    }
}

/// Write a shell script body to `dir/name` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    path
}

/// Reply sink that keeps every message in order.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn reply(&self, text: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
