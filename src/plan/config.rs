//! Stack plan configuration parser
//!
//! Parses `stacks.toml` into structured stack definitions.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::plan::graph::topological_order;

/// Settings shared by all stacks in the plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Maximum stacks running at once; 0 means unlimited (default: 0)
    #[serde(default)]
    pub max_parallel: usize,
    /// Status table refresh period in milliseconds (default: 250)
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
    /// Stop launching stacks after the first failure (default: false)
    #[serde(default)]
    pub fail_fast: bool,
}

const fn default_refresh_ms() -> u64 {
    250
}

/// Lowest accepted refresh period
pub const MIN_REFRESH_MS: u64 = 10;

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            refresh_ms: default_refresh_ms(),
            fail_fast: false,
        }
    }
}

/// A single stack definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackConfig {
    /// Unique name for this stack
    pub name: String,
    /// Shell command that deploys the stack, run with `sh -c`
    pub command: String,
    /// Stacks that must complete before this one starts
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Top-level plan parsed from stacks.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanConfig {
    /// Global configuration
    #[serde(default)]
    pub global: GlobalConfig,
    /// Stack definitions, in display order
    #[serde(rename = "stack", default)]
    pub stacks: Vec<StackConfig>,
}

impl PlanConfig {
    /// Parse a stacks.toml file from a path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse stacks.toml content from a string
    pub fn parse(content: &str) -> Result<Self> {
        let plan: Self = toml::from_str(content).context("Failed to parse stacks.toml")?;
        plan.validate()?;
        Ok(plan)
    }

    /// Validate the plan
    pub fn validate(&self) -> Result<()> {
        if self.stacks.is_empty() {
            bail!("Plan defines no stacks");
        }

        if self.global.refresh_ms < MIN_REFRESH_MS {
            bail!(
                "refresh_ms must be at least {MIN_REFRESH_MS} (got {})",
                self.global.refresh_ms
            );
        }

        let mut seen = HashSet::new();
        for stack in &self.stacks {
            if stack.name.trim().is_empty() {
                bail!("Stack name cannot be empty");
            }
            // Names are rendered inside single status table rows
            if stack.name.chars().any(char::is_control) {
                bail!("Stack name {:?} contains control characters", stack.name);
            }
            if !seen.insert(stack.name.as_str()) {
                bail!("Duplicate stack name: '{}'", stack.name);
            }
            if stack.command.trim().is_empty() {
                bail!("Stack '{}' has an empty command", stack.name);
            }
        }

        for stack in &self.stacks {
            for dep in &stack.requires {
                if dep == &stack.name {
                    bail!("Stack '{}' cannot require itself", stack.name);
                }
                if !seen.contains(dep.as_str()) {
                    bail!(
                        "Stack '{}' requires unknown stack '{}'",
                        stack.name,
                        dep
                    );
                }
            }
        }

        topological_order(self)?;

        Ok(())
    }
}
