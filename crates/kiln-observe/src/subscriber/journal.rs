use kiln_core::BuildSubscriber;
use kiln_model::BuildEvent;

use crate::subscriber::view::log_event;

/// Writes every build task transition to the log.
#[derive(Debug, Default)]
pub struct Journal;

impl Journal {
    pub fn new() -> Self {
        Self
    }
}

impl BuildSubscriber for Journal {
    fn on_event(&self, event: &BuildEvent) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "journal"
    }
}
