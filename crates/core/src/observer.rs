/// Receives engine events and decides whether synthesis should continue.
///
/// Observers let callers watch a synthesis run or halt it without changing
/// the engine API: progress logging, storing intermediate images, and
/// cancellation from another thread are all observers.
///
/// `observe` returns `Option<A>`. `Some(action)` requests an engine-specific
/// action and `None` lets the run continue unchanged.
///
/// Closures implement `Observer` automatically, and `()` is a no-op observer
/// that never returns an action.
pub trait Observer<E, A> {
    /// Observes an engine event and optionally returns a control action.
    fn observe(&mut self, event: &E) -> Option<A>;
}

impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}
