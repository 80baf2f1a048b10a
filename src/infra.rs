//! Infrastructure hooks: opaque provisioning scripts and CloudFormation
//! stack-output retrieval.
//!
//! Stack creation and deletion are delegated to user-supplied scripts; only
//! their exit status is interpreted here.

use anyhow::{bail, Context, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Load the shared AWS configuration, preferring the configured region and
/// falling back to the ambient provider chain.
pub async fn aws_config(region: &str) -> SdkConfig {
    let region_provider = RegionProviderChain::first_try(Region::new(region.to_string()))
        .or_default_provider();
    aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await
}

/// Run one provisioning script to completion. Non-zero exit is an error for
/// the caller to classify (fatal for create, a warning for delete).
pub async fn run_stack_script(script: &Path) -> Result<()> {
    info!("running {}", script.display());
    let status = Command::new(script)
        .status()
        .await
        .with_context(|| format!("Failed to run {}", script.display()))?;
    if !status.success() {
        bail!("{} exited with {status}", script.display());
    }
    Ok(())
}

/// Reader for one CloudFormation stack's outputs.
pub struct StackOutputs {
    client: aws_sdk_cloudformation::Client,
    stack_name: String,
}

impl StackOutputs {
    pub fn new(cfg: &SdkConfig, stack_name: &str) -> Self {
        Self {
            client: aws_sdk_cloudformation::Client::new(cfg),
            stack_name: stack_name.to_string(),
        }
    }

    /// Look up one stack output. Empty values count as missing.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .describe_stacks()
            .stack_name(&self.stack_name)
            .send()
            .await
            .with_context(|| format!("DescribeStacks failed for {}", self.stack_name))?;
        for stack in resp.stacks() {
            for output in stack.outputs() {
                if output.output_key() == Some(key) {
                    return Ok(output
                        .output_value()
                        .filter(|v| !v.is_empty())
                        .map(str::to_string));
                }
            }
        }
        Ok(None)
    }

    /// Setup-fatal variant of [`StackOutputs::get`].
    pub async fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .await?
            .with_context(|| format!("stack {} has no output {key}", self.stack_name))
    }
}
