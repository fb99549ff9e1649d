//! `flocker-deploy`: summarizes a deployment description.
//!
//! The injected [`flocker_script::Io`] only carries the runtime's own output
//! (version, help, usage and `ERROR:` lines). The summary a script prints is
//! its own output and goes to the process stdout; [`write_summary`] takes any
//! writer so it can be checked without one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use flocker_script::model::Deployment;
use flocker_script::{bind, LoopHandle, Options, Script, Service};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Args, Clone)]
pub struct DeployArgs {
    /// Deployment description (JSON)
    #[arg(long)]
    pub deployment: PathBuf,

    /// Keep running until signalled, holding the deployment open
    #[arg(long)]
    pub watch: bool,

    /// Give up on shutdown after this long (e.g. 30s); waits forever by default
    #[arg(long)]
    pub stop_timeout: Option<humantime::Duration>,
}

/// Prints the applications each node of a deployment should run.
pub struct DeployScript;

#[async_trait(?Send)]
impl Script for DeployScript {
    type Options = DeployArgs;

    async fn main(&self, handle: LoopHandle, options: &Options<DeployArgs>) -> Result<()> {
        let deployment = Deployment::load(&options.deployment)?;
        tracing::info!(
            nodes = deployment.nodes.len(),
            path = %options.deployment.display(),
            "loaded deployment"
        );

        let stdout = std::io::stdout();
        write_summary(&mut std::io::LineWriter::new(stdout.lock()), &deployment)?;

        if !options.watch {
            return Ok(());
        }

        let watch = Arc::new(DeploymentWatch {
            nodes: deployment.nodes.len(),
        });
        bind(&handle, watch)?.await
    }

    fn shutdown_grace(&self, options: &Options<DeployArgs>) -> Option<Duration> {
        options.stop_timeout.as_deref().copied()
    }
}

/// Write [`summarize`] to `out`, one line each, and flush.
pub fn write_summary(out: &mut impl Write, deployment: &Deployment) -> Result<()> {
    for line in summarize(deployment) {
        writeln!(out, "{line}").context("failed to write summary")?;
    }
    out.flush().context("failed to write summary")
}

/// One line per node: `hostname: app (image), ...`.
pub fn summarize(deployment: &Deployment) -> Vec<String> {
    deployment
        .nodes
        .iter()
        .map(|node| {
            if node.applications.is_empty() {
                return format!("{}: -", node.hostname);
            }
            let apps: Vec<String> = node
                .applications
                .iter()
                .map(|app| format!("{} ({})", app.name, app.image.full_name()))
                .collect();
            format!("{}: {}", node.hostname, apps.join(", "))
        })
        .collect()
}

/// Holds the process open for `--watch` until the loop shuts down.
struct DeploymentWatch {
    nodes: usize,
}

#[async_trait]
impl Service for DeploymentWatch {
    fn name(&self) -> &str {
        "deployment-watch"
    }

    fn start(&self) -> Result<()> {
        tracing::info!(nodes = self.nodes, "watching deployment; send SIGTERM to stop");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        tracing::info!("deployment watch released");
        Ok(())
    }
}
