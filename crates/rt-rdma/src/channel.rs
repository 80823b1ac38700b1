//! Per-pair RDMA channels: a two-process sub-communicator
//! and a one-sided window over it, with explicit passive-target
//! synchronization — the repeated-traffic counterpart to the one-shot
//! message-based [`crate::manager::RdmaManager::get`]/[`put`]. The
//! non-target always initiates `new_put_channel`/`new_get_channel`
//! against the window-owning `target`; construction blocks the caller's
//! scheduler the same way `EpochManager::run_in_epoch_*` blocks on
//! termination (`rt_engine::Engine::run_until`), since there is no
//! continuation-based API surface for "wait for this channel to exist."

use crate::manager::RdmaManager;
use crate::wire::{ChannelOp, ChannelReady, CreateChannel};
use rt_transport::{LockMode, WindowHandle};
use rt_types::{Copyable, NodeId};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Handle to an open channel, opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub(crate) u64);

pub(crate) struct ChannelState {
    pub(crate) window: WindowHandle,
    pub(crate) target: NodeId,
    pub(crate) locked: bool,
}

pub(crate) struct PendingChannelCreate {
    pub(crate) target: NodeId,
    pub(crate) op: ChannelOp,
    pub(crate) window: Option<WindowHandle>,
}

fn lock_mode_for(op: ChannelOp) -> LockMode {
    // Put is exclusive from the non-target's side; a get only needs to
    // observe a consistent snapshot, so it takes a shared lock.
    match op {
        ChannelOp::Put => LockMode::Exclusive,
        ChannelOp::Get => LockMode::Shared,
    }
}

/// Reinterpret a slice of trivially-copyable values as raw bytes for a
/// one-sided transfer, skipping the `bincode` framing a message-based
/// `get`/`put` would pay for.
fn bytes_of<T: Copyable>(data: &[T]) -> &[u8] {
    let ptr = data.as_ptr().cast::<u8>();
    let len = std::mem::size_of_val(data);
    unsafe { std::slice::from_raw_parts(ptr, len) }
}

fn vec_from_bytes<T: Copyable>(bytes: &[u8]) -> Vec<T> {
    let elem_size = std::mem::size_of::<T>();
    assert_eq!(bytes.len() % elem_size, 0, "byte buffer is not a whole number of elements");
    let count = bytes.len() / elem_size;
    let mut out = Vec::<T>::with_capacity(count);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out.as_mut_ptr().cast::<u8>(), bytes.len());
        out.set_len(count);
    }
    out
}

impl RdmaManager {
    fn new_channel(self: &Arc<Self>, target: NodeId, window_bytes: usize, op: ChannelOp) -> ChannelId {
        let serial = self.next_channel_serial.fetch_add(1, Ordering::SeqCst);
        self.pending_channel_creations.lock().unwrap().insert(serial, PendingChannelCreate { target, op, window: None });
        self.engine.send(
            target,
            self.create_channel_handler,
            &CreateChannel { serial, requester: self.engine.this_node(), op, window_bytes },
        );
        self.engine.run_until(|_| self.pending_channel_creations.lock().unwrap().get(&serial).is_some_and(|p| p.window.is_some()));
        let pending = self.pending_channel_creations.lock().unwrap().remove(&serial).expect("just resolved above");
        self.channels.lock().unwrap().insert(serial, ChannelState { window: pending.window.expect("resolved"), target, locked: false });
        ChannelId(serial)
    }

    /// Open a channel this node will `put` into, backed by a window of
    /// `window_bytes` owned by `target`.
    #[must_use]
    pub fn new_put_channel(self: &Arc<Self>, target: NodeId, window_bytes: usize) -> ChannelId {
        self.new_channel(target, window_bytes, ChannelOp::Put)
    }

    /// Open a channel this node will `get` from, backed by a window of
    /// `window_bytes` owned by `target`.
    #[must_use]
    pub fn new_get_channel(self: &Arc<Self>, target: NodeId, window_bytes: usize) -> ChannelId {
        self.new_channel(target, window_bytes, ChannelOp::Get)
    }

    pub(crate) fn on_create_channel(self: &Arc<Self>, msg: CreateChannel) {
        let window = self.engine.transport().window_register(msg.window_bytes);
        self.channels.lock().unwrap().insert(msg.serial, ChannelState { window, target: self.engine.this_node(), locked: false });
        self.engine.send(msg.requester, self.channel_ready_handler, &ChannelReady { serial: msg.serial, window_id: window.id });
    }

    pub(crate) fn on_channel_ready(self: &Arc<Self>, msg: ChannelReady) {
        if let Some(pending) = self.pending_channel_creations.lock().unwrap().get_mut(&msg.serial) {
            pending.window = Some(WindowHandle { id: msg.window_id, collective: false });
        }
    }

    fn channel_op(&self, channel: ChannelId) -> (WindowHandle, NodeId) {
        let channels = self.channels.lock().unwrap();
        let state = channels.get(&channel.0).unwrap_or_else(|| panic!("{}", crate::errors::RdmaError::UnknownChannel(channel.0)));
        (state.window, state.target)
    }

    /// Acquire this channel's passive-target lock (exclusive for a put
    /// channel, shared for a get channel, per invariant ii).
    pub fn lock(&self, channel: ChannelId, op: ChannelOp) {
        let (window, target) = self.channel_op(channel);
        self.engine.transport().window_lock(window, target, lock_mode_for(op));
        if let Some(state) = self.channels.lock().unwrap().get_mut(&channel.0) {
            state.locked = true;
        }
    }

    /// Release a previously acquired lock.
    pub fn unlock(&self, channel: ChannelId) {
        let (window, target) = self.channel_op(channel);
        self.engine.transport().window_unlock(window, target);
        if let Some(state) = self.channels.lock().unwrap().get_mut(&channel.0) {
            state.locked = false;
        }
    }

    /// Make outstanding puts/gets against this channel visible.
    pub fn flush(&self, channel: ChannelId) {
        let (window, target) = self.channel_op(channel);
        self.engine.transport().window_flush(window, target);
    }

    /// Paired put: lock, write, flush, unlock, then fire `continuation`.
    /// `T` travels as raw bytes rather than through `bincode`, the point
    /// of using a channel over a one-shot [`crate::manager::RdmaManager::put`].
    pub fn put_typed_data<T: Copyable>(&self, channel: ChannelId, data: &[T], offset: usize, continuation: impl FnOnce() + Send + 'static) {
        let (window, target) = self.channel_op(channel);
        self.lock(channel, ChannelOp::Put);
        self.engine
            .transport()
            .window_put(window, target, offset, bytes_of(data))
            .unwrap_or_else(|e| panic!("channel put failed: {e}"));
        self.flush(channel);
        self.unlock(channel);
        continuation();
    }

    /// Unpaired put: lock and write, but leave the lock held — the
    /// caller must follow up with [`Self::sync_local_put_channel`] before
    /// reusing the channel.
    pub fn put_typed_data_unpaired<T: Copyable>(&self, channel: ChannelId, data: &[T], offset: usize) {
        self.lock(channel, ChannelOp::Put);
        let (window, target) = self.channel_op(channel);
        self.engine
            .transport()
            .window_put(window, target, offset, bytes_of(data))
            .unwrap_or_else(|e| panic!("channel put failed: {e}"));
    }

    /// Complete an unpaired put: flush then unlock.
    pub fn sync_local_put_channel(&self, channel: ChannelId) {
        self.flush(channel);
        self.unlock(channel);
    }

    /// Target-side counterpart: a target that wants to observe a
    /// non-target's completed put before reading its own window again
    /// issues the same flush; the local reference transport has no
    /// separate remote-visibility step, so this is a thin alias kept for
    /// API parity with the non-target's sync call.
    pub fn sync_remote_put_channel(&self, channel: ChannelId) {
        self.flush(channel);
    }

    /// Paired get: lock, read `len` elements at `offset`, flush, unlock,
    /// then hand the buffer to `continuation`.
    pub fn get_typed_data_info_buf<T: Copyable>(&self, channel: ChannelId, len: usize, offset: usize, continuation: impl FnOnce(Vec<T>) + Send + 'static) {
        let (window, target) = self.channel_op(channel);
        self.lock(channel, ChannelOp::Get);
        let bytes = self
            .engine
            .transport()
            .window_get(window, target, offset, len * std::mem::size_of::<T>())
            .unwrap_or_else(|e| panic!("channel get failed: {e}"));
        self.unlock(channel);
        continuation(vec_from_bytes(&bytes));
    }

    /// Unpaired get: lock and read immediately, returning the buffer, but
    /// leave the lock held until [`Self::sync_local_get_channel`] is
    /// called.
    #[must_use]
    pub fn get_typed_data_unpaired<T: Copyable>(&self, channel: ChannelId, len: usize, offset: usize) -> Vec<T> {
        let (window, target) = self.channel_op(channel);
        self.lock(channel, ChannelOp::Get);
        let bytes = self
            .engine
            .transport()
            .window_get(window, target, offset, len * std::mem::size_of::<T>())
            .unwrap_or_else(|e| panic!("channel get failed: {e}"));
        vec_from_bytes(&bytes)
    }

    /// Complete an unpaired get: unlock (a get takes no data-visibility
    /// flush since it only reads).
    pub fn sync_local_get_channel(&self, channel: ChannelId) {
        self.unlock(channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::RdmaManager;
    use rt_engine::Engine;
    use rt_transport::local::LocalCluster;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn make_cluster(n: u32) -> (Vec<Arc<Engine>>, Vec<Arc<RdmaManager>>) {
        let cluster = LocalCluster::new(n);
        let mut engines = Vec::new();
        let mut managers = Vec::new();
        for i in 0..n {
            let engine = Engine::new(Arc::new(cluster.transport_for(rt_types::NodeId::new(i))));
            engine.set_accounting(Arc::new(rt_engine::NullAccounting));
            managers.push(RdmaManager::new(Arc::clone(&engine)));
            engines.push(engine);
        }
        (engines, managers)
    }

    fn drain_all(engines: &[Arc<Engine>], rounds: usize) {
        for _ in 0..rounds {
            for e in engines {
                e.run_scheduler();
            }
        }
    }

    #[test]
    fn put_channel_paired_write_lands_in_the_targets_window() {
        let (engines, managers) = make_cluster(2);
        let channel = managers[1].new_put_channel(rt_types::NodeId::new(0), 32);
        drain_all(&engines, 5);

        let done = Arc::new(Mutex::new(false));
        let done_clone = Arc::clone(&done);
        managers[1].put_typed_data(channel, &[1u32, 2, 3, 4], 0, move || {
            *done_clone.lock().unwrap() = true;
        });
        assert!(*done.lock().unwrap());
    }

    #[test]
    fn get_channel_paired_read_returns_the_targets_window_contents() {
        let (engines, managers) = make_cluster(2);
        let put_channel = managers[1].new_put_channel(rt_types::NodeId::new(0), 32);
        drain_all(&engines, 5);
        managers[1].put_typed_data(put_channel, &[7u32, 8, 9], 0, || {});

        let get_channel = managers[1].new_get_channel(rt_types::NodeId::new(0), 32);
        drain_all(&engines, 5);

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        managers[1].get_typed_data_info_buf::<u32>(get_channel, 3, 0, move |buf| {
            *received_clone.lock().unwrap() = buf;
        });
        assert_eq!(*received.lock().unwrap(), vec![7u32, 8, 9]);
    }

    #[test]
    fn unpaired_put_requires_explicit_sync_before_reuse() {
        let (engines, managers) = make_cluster(2);
        let channel = managers[1].new_put_channel(rt_types::NodeId::new(0), 16);
        drain_all(&engines, 5);

        managers[1].put_typed_data_unpaired(channel, &[42u8; 4], 0);
        managers[1].sync_local_put_channel(channel);

        let get_channel = managers[1].new_get_channel(rt_types::NodeId::new(0), 16);
        drain_all(&engines, 5);
        let buf = managers[1].get_typed_data_unpaired::<u8>(get_channel, 4, 0);
        managers[1].sync_local_get_channel(get_channel);
        assert_eq!(buf, vec![42u8; 4]);
    }
}
