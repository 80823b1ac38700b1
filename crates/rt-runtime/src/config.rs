//! Node configuration: per-subsystem
//! settings plus the `vt_debug_*` flag set — one struct per
//! subsystem, a single top-level `Default`, and a `validate_for_production`
//! hard-panic gate for settings that must never ship with their default.

use bitflags::bitflags;
use rt_types::NumNodes;

bitflags! {
    /// The `vt_debug_*` switches. Each bit gates the
    /// `tracing` verbosity of one subsystem; `ALL` is the union, `NONE` is
    /// the identity element rather than a real flag (`vt_debug_none`
    /// means "no bits set").
    #[derive(Default)]
    pub struct DebugFlags: u32 {
        const NONE    = 0;
        const TERMDS  = 1 << 0;
        const PARAM   = 1 << 1;
        const SCATTER = 1 << 2;
        const ACTIVE  = 1 << 3;
        const REDUCE  = 1 << 4;
        const CONTEXT = 1 << 5;
        const ALL = Self::TERMDS.bits
            | Self::PARAM.bits
            | Self::SCATTER.bits
            | Self::ACTIVE.bits
            | Self::REDUCE.bits
            | Self::CONTEXT.bits;
    }
}

impl DebugFlags {
    /// Scope a set of flags on for the lifetime of the guard, restoring
    /// the prior value on drop (Testable Property 7: "scoped enable/
    /// disable helpers must restore on scope exit"). Takes `&mut` rather
    /// than interior mutability since debug flags are a single-node,
    /// single-thread concern read only by the owning node's managers.
    pub fn scoped_enable(flags: &mut DebugFlags, enable: DebugFlags) -> DebugFlagsGuard<'_> {
        let previous = *flags;
        flags.insert(enable);
        DebugFlagsGuard { flags, previous }
    }
}

/// RAII guard returned by [`DebugFlags::scoped_enable`]; restores the
/// pre-scope flag value when dropped.
pub struct DebugFlagsGuard<'a> {
    flags: &'a mut DebugFlags,
    previous: DebugFlags,
}

impl Drop for DebugFlagsGuard<'_> {
    fn drop(&mut self) {
        *self.flags = self.previous;
    }
}

/// Epoch subsystem configuration.
#[derive(Debug, Clone)]
pub struct EpochConfig {
    /// Upper bound on four-counter wave messages drained per scheduler
    /// tick before yielding back to the caller of `run_in_epoch_*`.
    pub wave_drain_batch: usize,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self { wave_drain_batch: 64 }
    }
}

/// Location-manager configuration.
#[derive(Debug, Clone)]
pub struct LocationConfig {
    /// Maximum forwarding hops before a lookup is treated as a
    /// protocol error. `None` defers to
    /// [`NumNodes::default_hop_cap`].
    pub hop_cap: Option<u32>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self { hop_cap: None }
    }
}

impl LocationConfig {
    pub fn resolve_hop_cap(&self, num_nodes: NumNodes) -> u32 {
        self.hop_cap.unwrap_or_else(|| num_nodes.default_hop_cap())
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum work units drained from the transport per
    /// [`rt_engine::Engine::run_scheduler`] call.
    pub drain_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drain_batch: rt_engine::DEFAULT_DRAIN_BATCH,
        }
    }
}

/// Complete node configuration: one struct per subsystem plus the debug
/// flag set.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    pub epoch: EpochConfig,
    pub location: LocationConfig,
    pub debug: DebugFlags,
    pub telemetry: rt_telemetry::TelemetryConfig,
}

impl RuntimeConfig {
    /// Validate settings that must never reach a production run with
    /// their default value.
    ///
    /// # Panics
    ///
    /// Panics if `epoch.wave_drain_batch` or `engine.drain_batch` is zero
    /// — either would make `run_in_epoch_*`/`run_scheduler` spin forever
    /// without ever draining work.
    pub fn validate_for_production(&self) {
        if self.engine.drain_batch == 0 {
            panic!("CONFIGURATION ERROR: engine.drain_batch must be non-zero");
        }
        if self.epoch.wave_drain_batch == 0 {
            panic!("CONFIGURATION ERROR: epoch.wave_drain_batch must be non-zero");
        }
    }
}
