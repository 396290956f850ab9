/// Receives progress messages meant for the person watching the workload.
pub trait Console: Send + Sync {
    fn print(&self, message: &str);
}

/// Emits console messages as log events.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingConsole;

impl Console for TracingConsole {
    fn print(&self, message: &str) {
        tracing::info!("{message}");
    }
}
