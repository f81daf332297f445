use log::{debug, info, warn};

/// Thin wrapper around the `log` facade that tags lines with a component.
#[derive(Debug, Clone, Copy)]
pub struct LogManager {
    component: &'static str,
}

impl LogManager {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    pub fn record(&self, message: &str) {
        info!(target: self.component, "{}", message);
    }

    pub fn detail(&self, message: &str) {
        debug!(target: self.component, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: self.component, "{}", message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new("devicecore")
    }
}
