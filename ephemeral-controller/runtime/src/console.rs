use ephemeral_controller_provision::Console;

/// Writes console messages to stderr.
#[derive(Copy, Clone, Debug, Default)]
pub struct Stderr;

impl Console for Stderr {
    fn print(&self, message: &str) {
        eprintln!("{message}");
    }
}
