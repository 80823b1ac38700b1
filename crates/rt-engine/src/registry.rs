//! The handler registry. Every registered handler has a
//! trace name, a typed thunk `(message-bytes, from-node) → ()`, and an
//! optional auxiliary registry pointer. Thunks are stored as boxed
//! closures in a per-kind vector — avoiding virtual dispatch on the hot
//! send/dispatch path rules out a trait-object hierarchy
//! in favor of this flatter table, following the closure-table pattern
//! used for factory-style registries elsewhere in this codebase.

use rt_types::{HandlerFields, HandlerId, RegistryKind, MAX_IDENTIFIERS_PER_KIND, NodeId};
use std::collections::HashMap;

/// The boxed dispatch thunk every registered handler carries.
pub type Thunk = Box<dyn Fn(&[u8], NodeId) + Send + Sync>;

struct Entry {
    trace_name: &'static str,
    thunk: Thunk,
}

/// Maps [`HandlerId`]s to their dispatch thunks, partitioned by
/// [`RegistryKind`].
#[derive(Default)]
pub struct HandlerRegistry {
    by_kind: HashMap<RegistryKind, Vec<Entry>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler and return its packed [`HandlerId`].
    ///
    /// # Panics
    ///
    /// Panics if this kind has already registered
    /// [`MAX_IDENTIFIERS_PER_KIND`] handlers — resource exhaustion is fatal.
    pub fn register(
        &mut self,
        kind: RegistryKind,
        trace_name: &'static str,
        traced: bool,
        functor: bool,
        auto: bool,
        base_msg_derived: bool,
        control: u32,
        thunk: Thunk,
    ) -> HandlerId {
        let slots = self.by_kind.entry(kind).or_default();
        let identifier = slots.len() as u32;
        assert!(
            identifier < MAX_IDENTIFIERS_PER_KIND,
            "registry kind {kind:?} exhausted its {MAX_IDENTIFIERS_PER_KIND} identifier slots"
        );
        slots.push(Entry { trace_name, thunk });

        HandlerId::pack(HandlerFields {
            auto,
            functor,
            traced,
            control,
            base_msg_derived,
            kind,
            identifier,
        })
    }

    /// Look up a handler's trace name without dispatching.
    #[must_use]
    pub fn trace_name(&self, id: HandlerId) -> Option<&'static str> {
        let fields = id.unpack();
        self.by_kind.get(&fields.kind)?.get(fields.identifier as usize).map(|e| e.trace_name)
    }

    /// Invoke the handler named by `id`.
    ///
    /// # Panics
    ///
    /// Dispatch with an unregistered ID is fatal: a programming error.
    /// There is no recoverable path here by design.
    pub fn dispatch(&self, id: HandlerId, bytes: &[u8], from_node: NodeId) {
        let fields = id.unpack();
        let entry = self
            .by_kind
            .get(&fields.kind)
            .and_then(|slots| slots.get(fields.identifier as usize))
            .unwrap_or_else(|| panic!("dispatch of unregistered handler {id}"));
        tracing::trace!(handler = %id, trace_name = entry.trace_name, from = %from_node, "dispatching");
        (entry.thunk)(bytes, from_node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn register_then_dispatch_invokes_thunk() {
        let mut registry = HandlerRegistry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        let id = registry.register(
            RegistryKind::Plain,
            "test::increment",
            false,
            false,
            false,
            false,
            0,
            Box::new(move |_bytes, _from| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        registry.dispatch(id, &[], NodeId::new(0));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "unregistered handler")]
    fn dispatch_unregistered_is_fatal() {
        let registry = HandlerRegistry::new();
        let bogus = HandlerId::pack(HandlerFields {
            auto: false,
            functor: false,
            traced: false,
            control: 0,
            base_msg_derived: false,
            kind: RegistryKind::Plain,
            identifier: 0,
        });
        registry.dispatch(bogus, &[], NodeId::new(0));
    }
}
