/// One readiness notification, already translated out of the OS event
/// mask.
///
/// A hang-up is folded into both `readable` and `writable` so that the
/// next read observes 0 and the next write observes an error; `error`
/// additionally fans the event out to both directions at dispatch.
#[derive(Clone, Copy)]
pub(crate) struct Event {
    pub(crate) token: usize,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
    pub(crate) error: bool,
}
