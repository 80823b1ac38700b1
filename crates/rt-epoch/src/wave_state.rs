//! Per-epoch state for the four-counter wave termination algorithm,
//! used by collective epochs. Two paired producer/consumer wave slots
//! track successive waves so termination can be declared once they
//! match; `children_received`/`subtree_children_count` track how many
//! of a node's tree children have reported in for the current wave.

/// A node's termination-detection bookkeeping for one collective epoch.
pub(crate) struct WaveState {
    pub(crate) local_producer: u64,
    pub(crate) local_consumer: u64,
    global_producer: [u64; 2],
    global_consumer: [u64; 2],
    pub(crate) wave_number: u64,
    children_received: u32,
    subtree_children_count: u32,
    submitted_wave: i64,
    local_ready: bool,
    active: bool,
    detected: bool,
    recv_producer_sum: u64,
    recv_consumer_sum: u64,
}

impl WaveState {
    pub(crate) fn new(subtree_children_count: u32, local_ready: bool) -> Self {
        Self {
            local_producer: 0,
            local_consumer: 0,
            global_producer: [0, 0],
            global_consumer: [0, 0],
            wave_number: 0,
            children_received: 0,
            subtree_children_count,
            submitted_wave: -1,
            local_ready,
            active: true,
            detected: false,
            recv_producer_sum: 0,
            recv_consumer_sum: 0,
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.detected
    }

    pub(crate) fn set_terminated(&mut self) {
        self.detected = true;
    }

    pub(crate) fn activate_epoch(&mut self) {
        self.active = true;
    }

    pub(crate) fn notify_locally_ready(&mut self) {
        self.local_ready = true;
    }

    /// A child in the spanning tree reported its subtree's totals for the
    /// wave currently being collected.
    ///
    /// # Panics
    ///
    /// Debug-asserts that no more than `subtree_children_count` reports
    /// arrive per wave.
    pub(crate) fn notify_child_receive(&mut self, child_producer: u64, child_consumer: u64) {
        self.children_received += 1;
        self.recv_producer_sum += child_producer;
        self.recv_consumer_sum += child_consumer;
        debug_assert!(
            self.children_received <= self.subtree_children_count,
            "received more child reports ({}) than children ({})",
            self.children_received,
            self.subtree_children_count
        );
    }

    /// Sums local and descendants' counters and submits to the parent.
    /// Returns the subtree totals to ship upward and resets the per-wave
    /// accumulators.
    pub(crate) fn submit_to_parent(&mut self, setup: bool) -> (u64, u64) {
        let subtree_producer = self.local_producer + self.recv_producer_sum;
        let subtree_consumer = self.local_consumer + self.recv_consumer_sum;
        if !setup {
            self.submitted_wave += 1;
        }
        self.children_received = 0;
        self.recv_producer_sum = 0;
        self.recv_consumer_sum = 0;
        (subtree_producer, subtree_consumer)
    }

    /// The parent (or, at the root, the manager itself) is ready to start
    /// the next wave.
    ///
    /// # Panics
    ///
    /// Debug-asserts the wave number only ever advances by one step.
    pub(crate) fn receive_continue_signal(&mut self, wave: u64) {
        debug_assert_eq!(self.wave_number, wave - 1, "wave must monotonically increase");
        self.wave_number = wave;
    }

    /// True once every child has reported for this wave, the node's own
    /// local work is ready, the previous wave was already submitted, and
    /// the epoch hasn't already terminated.
    pub(crate) fn ready_submit_parent(&self, needs_active: bool) -> bool {
        (self.active || !needs_active)
            && self.children_received == self.subtree_children_count
            && self.local_ready
            && self.submitted_wave == self.wave_number as i64 - 1
            && !self.detected
    }

    /// Root-only: record this wave's global totals and report whether the
    /// last two waves both balanced *and* agree with each other —
    /// two independently-balanced waves with differing totals (a producer/
    /// consumer pair still advancing between them) must not be declared
    /// terminated.
    pub(crate) fn record_root_wave(&mut self, producer: u64, consumer: u64) -> bool {
        let slot = (self.wave_number % 2) as usize;
        self.global_producer[slot] = producer;
        self.global_consumer[slot] = consumer;
        self.wave_number >= 1
            && self.global_producer[0] == self.global_consumer[0]
            && self.global_producer[1] == self.global_consumer[1]
            && self.global_producer[0] == self.global_producer[1]
            && self.global_consumer[0] == self.global_consumer[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_is_ready_as_soon_as_locally_ready() {
        let state = WaveState::new(0, true);
        assert!(state.ready_submit_parent(true));
    }

    #[test]
    fn interior_node_waits_for_every_child() {
        let mut state = WaveState::new(2, true);
        assert!(!state.ready_submit_parent(true));
        state.notify_child_receive(1, 1);
        assert!(!state.ready_submit_parent(true));
        state.notify_child_receive(2, 2);
        assert!(state.ready_submit_parent(true));
    }

    #[test]
    fn two_balanced_waves_declare_termination() {
        let mut state = WaveState::new(0, true);
        assert!(!state.record_root_wave(5, 5));
        state.wave_number = 1;
        assert!(state.record_root_wave(5, 5));
    }

    #[test]
    fn unbalanced_wave_does_not_declare() {
        let mut state = WaveState::new(0, true);
        state.record_root_wave(5, 3);
        state.wave_number = 1;
        assert!(!state.record_root_wave(5, 5));
    }
}
