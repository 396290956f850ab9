use prometheus_client::{
    metrics::{counter::Counter, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub(crate) created: Counter,
    pub(crate) creation_failed: Counter,
    pub(crate) creation_retried: Counter,
    creation_wait_duration: Histogram,
    creation_duration: Histogram,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let created = Counter::default();
        reg.register(
            "created",
            "Count of ephemeral containers that started",
            created.clone(),
        );

        let creation_failed = Counter::default();
        reg.register(
            "creation_failed",
            "Count of ephemeral containers that could not be added or started",
            creation_failed.clone(),
        );

        let creation_retried = Counter::default();
        reg.register(
            "creation_retried",
            "Count of ephemeral container start attempts that were retried",
            creation_retried.clone(),
        );

        let creation_wait_duration = Histogram::new([0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]);
        reg.register_with_unit(
            "creation_wait_duration",
            "Time from adding an ephemeral container to the pod until it is running",
            Unit::Seconds,
            creation_wait_duration.clone(),
        );

        let creation_duration = Histogram::new([0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]);
        reg.register_with_unit(
            "creation_duration",
            "Time from the start of an invocation until its container is running",
            Unit::Seconds,
            creation_duration.clone(),
        );

        Self {
            created,
            creation_failed,
            creation_retried,
            creation_wait_duration,
            creation_duration,
        }
    }

    pub(crate) fn observe_wait(&self, elapsed: Duration) {
        self.creation_wait_duration.observe(elapsed.as_secs_f64());
    }

    pub(crate) fn observe_creation(&self, elapsed: Duration) {
        self.creation_duration.observe(elapsed.as_secs_f64());
    }
}
