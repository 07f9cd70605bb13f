use kiln_model::BuildEvent;

/// Receives every committed build task transition.
///
/// Called while the task's transition lock is held, so events of one task arrive in commit
/// order. Implementations must return quickly.
pub trait BuildSubscriber: Send + Sync + 'static {
    fn on_event(&self, event: &BuildEvent);

    fn name(&self) -> &'static str;
}
