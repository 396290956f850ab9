use crate::{body::ScriptBody, config::Config, console::Stderr, identity::ShellIdentity};
use anyhow::{bail, Context, Result};
use clap::Parser;
use ephemeral_controller_core::{ContainerRequest, Policy};
use ephemeral_controller_k8s_api::PodRef;
use ephemeral_controller_provision::{
    stop::{self, Stop},
    Controller, Invocation, KubeCluster, Metrics, Outcome, Params,
};
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    signal::unix::{signal, SignalKind},
    time::Duration,
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[clap(
    name = "ephemeral-container",
    about = "Runs a script in an ephemeral container added to a running pod"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "ephemeral=info,warn",
        env = "EPHEMERAL_CONTAINER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Namespace of the pod that hosts the ephemeral container.
    #[clap(long, env = "POD_NAMESPACE")]
    namespace: String,

    /// Name of the pod that hosts the ephemeral container.
    #[clap(long, env = "POD_NAME")]
    pod: String,

    /// Policy and environment configuration. Without it, ephemeral containers
    /// are enabled with no rules.
    #[clap(long, env = "EPHEMERAL_CONTAINER_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the cloud the pod belongs to, when it is not configured.
    #[clap(long, default_value = "kubernetes")]
    cloud: String,

    #[clap(long)]
    image: String,

    /// Overrides the image entrypoint. May be repeated; an empty value
    /// overrides it with nothing.
    #[clap(long)]
    command: Option<Vec<String>>,

    /// Container environment variables as NAME=VALUE. May be repeated.
    #[clap(long = "env", value_parser = parse_env)]
    env: Vec<(String, String)>,

    /// Container whose namespaces the ephemeral container joins.
    #[clap(long)]
    target_container: Option<String>,

    /// Pulls the image only when it is not present on the node.
    #[clap(long)]
    if_not_present: bool,

    #[clap(long)]
    run_as_user: Option<i64>,

    #[clap(long)]
    run_as_group: Option<i64>,

    /// Shell that runs the script.
    #[clap(long)]
    shell: Option<String>,

    /// Pod container whose mounts and working directory are shared.
    #[clap(long, default_value = "jnlp")]
    primary_container: String,

    #[clap(long, default_value = "10")]
    patch_max_retries: u32,

    #[clap(long, default_value = "2000")]
    patch_retry_max_wait_ms: u64,

    #[clap(long, default_value = "3")]
    start_max_retries: u32,

    #[clap(long, default_value = "2000")]
    start_retry_max_wait_ms: u64,

    #[clap(long, default_value = "100")]
    ready_timeout_secs: u64,

    #[clap(long, default_value = "10")]
    stop_timeout_secs: u64,

    #[clap(long, default_value = "180")]
    identity_timeout_secs: u64,

    #[clap(long, default_value = "1")]
    monitor_poll_secs: u64,

    #[clap(long, default_value = "ephemeral-container")]
    field_manager: String,

    /// Writes metrics in the OpenMetrics text format when the run ends.
    #[clap(long)]
    metrics_path: Option<PathBuf>,

    /// The script to run inside the ephemeral container.
    script: String,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            namespace,
            pod,
            config,
            cloud,
            image,
            command,
            env,
            target_container,
            if_not_present,
            run_as_user,
            run_as_group,
            shell,
            primary_container,
            patch_max_retries,
            patch_retry_max_wait_ms,
            start_max_retries,
            start_retry_max_wait_ms,
            ready_timeout_secs,
            stop_timeout_secs,
            identity_timeout_secs,
            monitor_poll_secs,
            field_manager,
            metrics_path,
            script,
        } = self;

        log_format
            .try_init(log_level)
            .expect("must configure logging");

        let (policy, environment) = match config {
            Some(path) => {
                let config = Config::load(&path).await?;
                (config.policy(&cloud)?, config.environment)
            }
            None => (Policy::enabled(cloud), Default::default()),
        };

        let mut request = ContainerRequest::new(image)
            .with_always_pull(!if_not_present)
            .with_run_as(run_as_user, run_as_group);
        if let Some(command) = command {
            request = request.with_command(entrypoint(command));
        }
        for (name, value) in env {
            request = request.with_env(name, value);
        }
        if let Some(target) = target_container {
            request = request.with_target_container(target);
        }
        if let Some(shell) = shell {
            request = request.with_shell(shell);
        }

        let params = Params {
            patch_max_retries,
            patch_retry_max_wait: Duration::from_millis(patch_retry_max_wait_ms),
            start_max_retries,
            start_retry_max_wait: Duration::from_millis(start_retry_max_wait_ms),
            ready_timeout: Duration::from_secs(ready_timeout_secs),
            stop_timeout: Duration::from_secs(stop_timeout_secs),
            primary_container,
            monitor_poll_interval: Duration::from_secs(monitor_poll_secs),
        };

        let mut prom = <Registry>::default();
        let metrics = Metrics::register(prom.sub_registry_with_prefix("ephemeral_containers"));

        let client = client.try_client().await?;
        let cluster = Arc::new(KubeCluster::new(client, field_manager));
        let controller = Controller::new(
            cluster.clone(),
            PodRef::new(namespace, pod),
            policy,
            params,
            metrics,
        )
        .with_console(Arc::new(Stderr))
        .with_identity(Arc::new(ShellIdentity::new(Duration::from_secs(
            identity_timeout_secs,
        ))))
        .with_env(environment);

        let (stop, stopped) = stop::channel();
        spawn_signal_handler(stop)?;

        let invocation = Invocation::new(request).with_stop(stopped);
        let res = controller
            .run(invocation, ScriptBody::new(cluster, script))
            .await;

        if let Some(path) = metrics_path {
            let mut text = String::new();
            encode(&mut text, &prom)?;
            if let Err(error) = tokio::fs::write(&path, text).await {
                warn!(%error, path = %path.display(), "Failed to write metrics");
            }
        }

        match res {
            Ok(Outcome::Completed) => Ok(()),
            Ok(Outcome::Interrupted) => {
                info!("Interrupted before the ephemeral container started");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Stops the invocation on SIGINT or SIGTERM so an active container is
/// always torn down.
fn spawn_signal_handler(stop: Stop) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT")?;
    tokio::spawn(async move {
        let cause = tokio::select! {
            _ = sigterm.recv() => "terminated",
            _ = sigint.recv() => "interrupted",
        };
        info!(%cause, "Received signal");
        stop.stop(cause);
    });
    Ok(())
}

/// A command made only of empty values overrides the entrypoint with nothing.
fn entrypoint(command: Vec<String>) -> Vec<String> {
    if command.iter().all(String::is_empty) {
        return Vec::new();
    }
    command
}

fn parse_env(s: &str) -> Result<(String, String)> {
    let (name, value) = s
        .split_once('=')
        .with_context(|| format!("expected NAME=VALUE: {s}"))?;
    if name.is_empty() {
        bail!("empty environment variable name: {s}");
    }
    Ok((name.to_string(), value.to_string()))
}
