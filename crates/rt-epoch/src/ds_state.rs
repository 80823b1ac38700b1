//! Per-epoch state for Dijkstra–Scholten credit accounting, used by rooted epochs: "Each message in the epoch carries one
//! unit of credit; the sender keeps a deficit, the receiver acknowledges
//! back along the first incoming edge ('engager') once it has itself
//! become quiescent and has acknowledged all its own sends. The home node
//! declares termination when its outstanding deficit returns to zero."

use rt_types::NodeId;

/// A node's credit-accounting bookkeeping for one rooted epoch.
pub(crate) struct DsState {
    is_home: bool,
    engager: Option<NodeId>,
    deficit: u64,
    locally_active: bool,
    acked_upward: bool,
    detected: bool,
}

impl DsState {
    pub(crate) fn new(is_home: bool) -> Self {
        Self {
            is_home,
            engager: None,
            deficit: 0,
            locally_active: true,
            acked_upward: false,
            detected: false,
        }
    }

    /// One unit of credit issued for an outgoing message under this epoch.
    pub(crate) fn on_send(&mut self) {
        self.deficit += 1;
    }

    /// Establish the engager edge: the first node that activated us under
    /// this epoch is the one we'll acknowledge back to.
    pub(crate) fn on_receive_activation(&mut self, from: NodeId) {
        if self.engager.is_none() && !self.is_home {
            self.engager = Some(from);
        }
    }

    /// One of our own sends has been transitively accounted for: the
    /// recipient and its whole subtree went quiescent and acked back.
    pub(crate) fn on_ack_received(&mut self) {
        self.deficit = self.deficit.saturating_sub(1);
        self.acked_upward = false;
    }

    pub(crate) fn set_locally_active(&mut self, active: bool) {
        self.locally_active = active;
    }

    pub(crate) fn is_quiescent(&self) -> bool {
        self.deficit == 0 && !self.locally_active
    }

    /// Whether this node should send its own ack up to its engager now.
    pub(crate) fn should_ack_engager(&self) -> Option<NodeId> {
        if self.is_home || self.acked_upward || !self.is_quiescent() {
            return None;
        }
        self.engager
    }

    pub(crate) fn mark_acked_upward(&mut self) {
        self.acked_upward = true;
    }

    pub(crate) fn is_home(&self) -> bool {
        self.is_home
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.detected
    }

    pub(crate) fn set_terminated(&mut self) {
        self.detected = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_never_acquires_an_engager() {
        let mut home = DsState::new(true);
        home.on_receive_activation(NodeId::new(3));
        assert!(home.should_ack_engager().is_none());
    }

    #[test]
    fn leaf_acks_once_deficit_clears_and_it_goes_idle() {
        let mut leaf = DsState::new(false);
        leaf.on_receive_activation(NodeId::new(0));
        leaf.on_send();
        leaf.set_locally_active(false);
        assert!(leaf.should_ack_engager().is_none(), "deficit still outstanding");
        leaf.on_ack_received();
        assert_eq!(leaf.should_ack_engager(), Some(NodeId::new(0)));
    }

    #[test]
    fn home_declares_once_quiescent() {
        let mut home = DsState::new(true);
        home.on_send();
        home.set_locally_active(false);
        assert!(!home.is_quiescent());
        home.on_ack_received();
        assert!(home.is_quiescent());
    }
}
