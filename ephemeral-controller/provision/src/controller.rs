use crate::{
    body::{Body, BodyContext, CONTAINER_ENV},
    cluster::{Cluster, ClusterError, ExecIo, PatchError},
    console::{Console, TracingConsole},
    error::{Error, Hint},
    identity::IdentitySource,
    metrics::Metrics,
    name::container_name,
    retry::Retries,
    stop::Stopped,
};
use ephemeral_controller_core::{ContainerRequest, Policy};
use ephemeral_controller_k8s_api::{
    status::ephemeral_container_working_dir, ContainerPhase, EphemeralContainer, Monitor, PodRef,
    SpecBuilder, Terminated,
};
use futures::prelude::*;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::time::{self, Instant};
use tracing::{debug, debug_span, info, info_span, warn, Instrument};

/// Termination reasons after which a fresh container is tried.
const START_RETRY_REASONS: &[&str] = &["StartError"];

/// Waiting reasons that are expected while a container is created.
const QUIET_WAITING_REASONS: &[&str] = &["ContainerCreating", "PodInitializing"];

/// Tunables for a [`Controller`].
#[derive(Clone, Debug)]
pub struct Params {
    pub patch_max_retries: u32,
    pub patch_retry_max_wait: Duration,
    pub start_max_retries: u32,
    pub start_retry_max_wait: Duration,
    pub ready_timeout: Duration,
    pub stop_timeout: Duration,
    pub primary_container: String,
    pub monitor_poll_interval: Duration,
}

/// Provisions ephemeral containers in a single host pod.
pub struct Controller<C> {
    cluster: C,
    pod: PodRef,
    policy: Policy,
    builder: SpecBuilder,
    params: Params,
    metrics: Metrics,
    console: Arc<dyn Console>,
    identity: Option<Arc<dyn IdentitySource>>,
    env: BTreeMap<String, String>,
}

/// A single request to run a body inside a new ephemeral container.
#[derive(Debug)]
pub struct Invocation {
    request: ContainerRequest,
    env: BTreeMap<String, String>,
    stopped: Stopped,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The body ran to completion.
    Completed,
    /// The invocation was stopped before its container was running.
    Interrupted,
}

/// An ephemeral container added to the host pod.
#[derive(Clone, Debug)]
pub struct ContainerInstance {
    name: String,
    created: Instant,
    phase: Option<ContainerPhase>,
    working_dir: Option<String>,
}

enum Started {
    Running(ContainerInstance),
    Terminated(ContainerInstance, Terminated),
}

// === impl Params ===

impl Default for Params {
    fn default() -> Self {
        Self {
            patch_max_retries: 10,
            patch_retry_max_wait: Duration::from_secs(2),
            start_max_retries: 3,
            start_retry_max_wait: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(100),
            stop_timeout: Duration::from_secs(10),
            primary_container: "jnlp".to_string(),
            monitor_poll_interval: Duration::from_secs(1),
        }
    }
}

// === impl Invocation ===

impl Invocation {
    pub fn new(request: ContainerRequest) -> Self {
        Self {
            request,
            env: BTreeMap::new(),
            stopped: Stopped::never(),
        }
    }

    /// Sets a variable for the body. Run-level variables override host-wide
    /// ones.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_stop(mut self, stopped: Stopped) -> Self {
        self.stopped = stopped;
        self
    }

    pub fn request(&self) -> &ContainerRequest {
        &self.request
    }
}

// === impl ContainerInstance ===

impl ContainerInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// The most recently observed phase.
    pub fn phase(&self) -> Option<&ContainerPhase> {
        self.phase.as_ref()
    }

    /// The working directory the container was started with, if any.
    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }
}

// === impl Controller ===

impl<C: Cluster> Controller<C> {
    pub fn new(cluster: C, pod: PodRef, policy: Policy, params: Params, metrics: Metrics) -> Self {
        let builder = SpecBuilder::new(
            params.primary_container.clone(),
            Monitor::new(params.monitor_poll_interval),
        );
        Self {
            cluster,
            pod,
            policy,
            builder,
            params,
            metrics,
            console: Arc::new(TracingConsole),
            identity: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    /// Containers that do not request an identity run as the identity
    /// reported by `identity`.
    pub fn with_identity(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sets host-wide variables for every body.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn pod(&self) -> &PodRef {
        &self.pod
    }

    /// Runs `body` inside a new ephemeral container.
    ///
    /// The container is stopped after the body completes, fails, or is
    /// stopped. If the invocation is stopped before the container is running,
    /// nothing is torn down and [`Outcome::Interrupted`] is returned.
    pub async fn run<B: Body>(&self, invocation: Invocation, body: B) -> Result<Outcome, Error> {
        let span = info_span!(
            "ephemeral",
            pod = %self.pod,
            image = %invocation.request.image(),
        );
        self.run_invocation(invocation, body).instrument(span).await
    }

    async fn run_invocation<B: Body>(
        &self,
        invocation: Invocation,
        body: B,
    ) -> Result<Outcome, Error> {
        let Invocation {
            request,
            env,
            mut stopped,
        } = invocation;
        self.policy.evaluate(&request)?;

        let started = Instant::now();
        let instance = tokio::select! {
            biased;
            cause = stopped.stopped() => {
                info!(%cause, "Interrupted before the ephemeral container started");
                return Ok(Outcome::Interrupted);
            }
            res = self.start(&request) => res?,
        };
        let elapsed = started.elapsed();
        self.metrics.observe_creation(elapsed);
        self.console.print(&format!(
            "Ephemeral container {} ready after {} seconds",
            instance.name,
            elapsed.as_secs()
        ));

        let ctx = BodyContext {
            pod: self.pod.clone(),
            container: instance.name.clone(),
            env: self.body_env(env, &instance.name),
            shell: request.shell().map(Into::into),
            working_dir: instance.working_dir.clone(),
        };
        let res = tokio::select! {
            biased;
            cause = stopped.stopped() => {
                info!(%cause, container = %instance.name, "Stopped");
                Err(Error::Stopped(cause))
            }
            res = body.run(ctx) => res.map_err(Error::Body),
        };

        // The container is stopped exactly once, whatever the body's result.
        self.teardown(&instance).await;
        res.map(|()| Outcome::Completed)
    }

    async fn start(&self, request: &ContainerRequest) -> Result<ContainerInstance, Error> {
        let request = self.default_identity(request).await;
        let mut retries = Retries::new(
            self.params.start_max_retries,
            self.params.start_retry_max_wait,
        );
        loop {
            let attempt = debug_span!("attempt", n = retries.attempts() + 1);
            let (instance, terminated) = match self.start_once(&request).instrument(attempt).await? {
                Started::Running(instance) => return Ok(instance),
                Started::Terminated(instance, terminated) => (instance, terminated),
            };

            let reason = terminated.reason.as_deref().unwrap_or_default();
            if START_RETRY_REASONS.contains(&reason) {
                if let Some(wait) = retries.next() {
                    self.metrics.creation_retried.inc();
                    self.console.print(&format!(
                        "Ephemeral container terminated while starting with reason {reason}, trying again ({} of {})",
                        retries.attempts(),
                        retries.max(),
                    ));
                    time::sleep(wait).await;
                    continue;
                }
            }

            let hints = Hint::diagnose(&terminated);
            return Err(Error::StartFailed {
                container: instance.name,
                pod: self.pod.clone(),
                terminated,
                retries: retries.attempts(),
                hints,
            });
        }
    }

    async fn start_once(&self, request: &ContainerRequest) -> Result<Started, Error> {
        let name = container_name(request);
        let pod = self
            .cluster
            .get_pod(&self.pod)
            .await
            .map_err(|source| self.cluster_error(&name, source))?;
        let container = self.builder.build(&name, request, &pod);
        self.console.print(&banner(&container));

        self.add(&container).await?;
        let mut instance = ContainerInstance {
            name,
            created: Instant::now(),
            phase: None,
            working_dir: None,
        };

        match self.wait_until_started(&mut instance).await {
            Ok(None) => {
                self.metrics.created.inc();
                self.metrics.observe_wait(instance.created.elapsed());
                Ok(Started::Running(instance))
            }
            Ok(Some(terminated)) => {
                self.metrics.creation_failed.inc();
                Ok(Started::Terminated(instance, terminated))
            }
            Err(error) => {
                self.metrics.creation_failed.inc();
                Err(error)
            }
        }
    }

    async fn default_identity(&self, request: &ContainerRequest) -> ContainerRequest {
        let request = request.clone();
        if request.run_as_user().is_some() || request.run_as_group().is_some() {
            return request;
        }
        let Some(identity) = &self.identity else {
            return request;
        };
        match identity.lookup().await {
            Some(run_as) if !run_as.is_empty() => {
                debug!(%run_as, "Using default identity");
                request.with_run_as(run_as.user, run_as.group)
            }
            _ => {
                debug!("No default identity available");
                request
            }
        }
    }

    /// Adds the container to the pod, retrying when the pod changed since it
    /// was read.
    async fn add(&self, container: &EphemeralContainer) -> Result<(), Error> {
        let mut retries = Retries::new(
            self.params.patch_max_retries,
            self.params.patch_retry_max_wait,
        );
        loop {
            let error = match self
                .cluster
                .add_ephemeral_container(&self.pod, container)
                .await
            {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };

            if let PatchError::Conflict { retry_after, .. } = &error {
                if let Some(jitter) = retries.next() {
                    let wait = retry_after.unwrap_or(jitter);
                    debug!(
                        container = %container.name,
                        attempt = retries.attempts(),
                        ?wait,
                        "Pod changed while adding ephemeral container"
                    );
                    time::sleep(wait).await;
                    continue;
                }
            }

            self.metrics.creation_failed.inc();
            warn!(
                container = %container.name,
                retries = retries.attempts(),
                %error,
                "Failed to add ephemeral container"
            );
            return Err(Error::ProvisioningFailed {
                container: container.name.clone(),
                retries: retries.attempts(),
                exhausted: error.is_conflict() && retries.is_exhausted(),
                source: error,
            });
        }
    }

    /// Waits for the container to run. Returns the termination state if it
    /// exited first.
    async fn wait_until_started(
        &self,
        instance: &mut ContainerInstance,
    ) -> Result<Option<Terminated>, Error> {
        let name = instance.name.clone();
        let phase = &mut instance.phase;
        let working_dir = &mut instance.working_dir;
        let mut watch_error = None;
        let mut pods = self.cluster.watch_pod(&self.pod);

        let wait = async {
            while let Some(update) = pods.next().await {
                let pod = match update {
                    Ok(pod) => pod,
                    Err(error) => {
                        warn!(container = %name, %error, "Pod watch failed");
                        watch_error = Some(error.to_string());
                        continue;
                    }
                };
                let Some(next) = ContainerPhase::lookup(&pod, &name) else {
                    continue;
                };

                match &next {
                    ContainerPhase::Running => {
                        *working_dir = ephemeral_container_working_dir(&pod, &name).map(Into::into);
                        *phase = Some(next);
                        return Ok(None);
                    }
                    ContainerPhase::Terminated(terminated) => {
                        self.console.print(&format!(
                            "Ephemeral container {name} failed to start: {} ({})",
                            terminated.message.as_deref().unwrap_or_default(),
                            terminated.reason.as_deref().unwrap_or_default(),
                        ));
                        let terminated = terminated.clone();
                        *phase = Some(next);
                        return Ok(Some(terminated));
                    }
                    ContainerPhase::Waiting { reason, message } => {
                        let reason = reason.as_deref().unwrap_or_default();
                        if phase.as_ref() != Some(&next) && !QUIET_WAITING_REASONS.contains(&reason)
                        {
                            self.console.print(&format!(
                                "Ephemeral container {name} {} ({reason})",
                                message.as_deref().unwrap_or_default(),
                            ));
                        }
                    }
                }
                *phase = Some(next);
            }
            Err(ClusterError::WatchEnded)
        };

        let res = time::timeout(self.params.ready_timeout, wait).await;
        match res {
            Ok(Ok(terminated)) => Ok(terminated),
            Ok(Err(source)) => Err(self.cluster_error(&name, source)),
            Err(_) => Err(Error::Timeout {
                container: name,
                pod: self.pod.clone(),
                timeout: self.params.ready_timeout,
                last: instance
                    .phase
                    .as_ref()
                    .map(ToString::to_string)
                    .or(watch_error),
            }),
        }
    }

    /// Signals the container's monitor to exit and waits for the container
    /// to terminate. Failures are logged.
    async fn teardown(&self, instance: &ContainerInstance) {
        let name = instance.name.as_str();
        debug!(container = %name, "Stopping ephemeral container");
        let stop = async {
            self.cluster
                .exec(&self.pod, name, Monitor::stop_command(name), ExecIo::Discard)
                .await?;
            self.wait_until_terminated(name).await
        };
        match time::timeout(self.params.stop_timeout, stop).await {
            Ok(Ok(())) => debug!(container = %name, "Ephemeral container stopped"),
            Ok(Err(error)) => {
                warn!(container = %name, %error, "Failed to stop ephemeral container")
            }
            Err(_) => warn!(
                container = %name,
                timeout = ?self.params.stop_timeout,
                "Timed out waiting for ephemeral container to stop"
            ),
        }
    }

    async fn wait_until_terminated(&self, name: &str) -> Result<(), ClusterError> {
        let mut pods = self.cluster.watch_pod(&self.pod);
        while let Some(update) = pods.next().await {
            match update {
                Ok(pod) => {
                    if ContainerPhase::lookup(&pod, name).is_some_and(|p| p.is_terminated()) {
                        return Ok(());
                    }
                }
                Err(error) => warn!(container = %name, %error, "Pod watch failed"),
            }
        }
        Err(ClusterError::WatchEnded)
    }

    fn body_env(&self, run: BTreeMap<String, String>, container: &str) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.extend(run);
        env.insert(CONTAINER_ENV.to_string(), container.to_string());
        env
    }

    fn cluster_error(&self, container: &str, source: ClusterError) -> Error {
        Error::Cluster {
            container: container.to_string(),
            pod: self.pod.clone(),
            source,
        }
    }
}

fn banner(container: &EphemeralContainer) -> String {
    let mut banner = format!(
        "Starting ephemeral container {} with image {}",
        container.name,
        container.image.as_deref().unwrap_or_default()
    );
    if let Some(sc) = &container.security_context {
        let user = sc.run_as_user.map_or_else(String::new, |u| u.to_string());
        let group = sc.run_as_group.map_or_else(String::new, |g| g.to_string());
        banner.push_str(&format!(" (running as {user}:{group})"));
    }
    banner
}
