/// Execute an aggregate command deterministically (no IO, no async).
///
/// The canonical event-sourced lifecycle in one step:
///
/// 1. **Decide**: `aggregate.handle(command)` produces events without
///    mutating state
/// 2. **Evolve**: each event is applied to the aggregate in order
///
/// This is the form domain tests use to drive a ledger through a
/// scenario without standing up a store or bus. For the full pipeline
/// (persistence, optimistic concurrency, publication) use the command
/// dispatcher in the infra crate; it performs the same two steps with
/// the history loaded from the store.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: tierstock_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
