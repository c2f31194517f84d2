//! Provisioning engine backed by the terraform CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use super::{ProvisioningEngine, StackOutputs, StackVariables};
use crate::process::{CommandConfig, CommandSpec, run_command};

/// Variables file terraform loads automatically from the working directory
pub const VARS_FILE_NAME: &str = "forge.auto.tfvars.json";

#[derive(Debug, Clone)]
pub struct TerraformEngine {
    binary: PathBuf,
    config: CommandConfig,
}

#[derive(Debug, Deserialize)]
struct OutputEntry {
    value: serde_json::Value,
}

impl TerraformEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            config: CommandConfig::for_mutation(),
        }
    }

    fn command(&self, working_dir: &Path, args: &[&str]) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg(format!("-chdir={}", working_dir.display()))
            .args(args.iter().copied())
    }

    async fn run(&self, working_dir: &Path, args: &[&str]) -> anyhow::Result<String> {
        let what = format!("terraform {}", args.first().copied().unwrap_or_default());
        let output = run_command(&self.command(working_dir, args), &self.config)
            .await?
            .into_success(&what)?;
        Ok(output.stdout)
    }

    fn write_vars(working_dir: &Path, vars: &StackVariables) -> anyhow::Result<()> {
        let path = working_dir.join(VARS_FILE_NAME);
        let content = serde_json::to_string_pretty(vars).context("Failed to serialize stack variables")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Parse `terraform output -json` into name -> value
pub fn parse_outputs(json: &str) -> anyhow::Result<StackOutputs> {
    if json.trim().is_empty() {
        return Ok(StackOutputs::default());
    }
    let entries: BTreeMap<String, OutputEntry> =
        serde_json::from_str(json).context("Failed to parse terraform outputs")?;
    Ok(StackOutputs(
        entries.into_iter().map(|(k, v)| (k, v.value)).collect(),
    ))
}

impl ProvisioningEngine for TerraformEngine {
    async fn init(&self, working_dir: &Path, vars: &StackVariables) -> anyhow::Result<()> {
        Self::write_vars(working_dir, vars)?;
        self.run(working_dir, &["init", "-input=false", "-no-color"]).await?;
        Ok(())
    }

    async fn apply(&self, working_dir: &Path, vars: &StackVariables) -> anyhow::Result<StackOutputs> {
        Self::write_vars(working_dir, vars)?;
        self.run(working_dir, &["apply", "-auto-approve", "-input=false", "-no-color"])
            .await?;
        let outputs = self.run(working_dir, &["output", "-json", "-no-color"]).await?;
        parse_outputs(&outputs)
    }

    async fn destroy(&self, working_dir: &Path, vars: &StackVariables) -> anyhow::Result<()> {
        Self::write_vars(working_dir, vars)?;
        self.run(working_dir, &["destroy", "-auto-approve", "-input=false", "-no-color"])
            .await?;
        Ok(())
    }
}
