use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    backend_config::{BackendConfig, OrientationSource},
    publisher::{Publisher, SKELETON_CHANNEL},
    systems::{
        Systems,
        assembly::{FrameAssembler, encode_frame},
    },
    tracking::{BodyFrame, TrackingId},
};

/// A frame-available notification from the sensor.
///
/// The source reuses body slots between frames, but only `TrackingId` is
/// stable: filter state is keyed on it, never on a slot index.
pub trait FrameReference {
    type Frame: AcquiredFrame;

    /// Take the frame this notification refers to, if it is still there.
    /// The returned frame is released when dropped.
    fn acquire_frame(&self) -> Option<Self::Frame>;
}

pub trait AcquiredFrame {
    /// The body slots of this frame, or None if it holds no body data.
    fn bodies(&mut self) -> Option<BodyFrame>;
}

impl AcquiredFrame for BodyFrame {
    fn bodies(&mut self) -> Option<BodyFrame> {
        Some(std::mem::take(self))
    }
}

impl FrameReference for BodyFrame {
    type Frame = BodyFrame;

    fn acquire_frame(&self) -> Option<BodyFrame> {
        Some(self.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Disabled,
    Enabled,
}

/// Shared on/off switch for a FrameLoop. Toggling is safe from anywhere; the
/// loop only looks at it when a cycle starts.
///
/// Every Disabled -> Enabled edge bumps the generation, so a loop can tell it
/// was switched off and on again even if no cycle ran in between.
#[derive(Debug, Clone, Default)]
pub struct LoopGate(Arc<GateInner>);

#[derive(Debug, Default)]
struct GateInner {
    enabled: AtomicBool,
    generation: AtomicU64,
}

impl LoopGate {
    pub fn new(state: LoopState) -> Self {
        LoopGate(Arc::new(GateInner {
            enabled: AtomicBool::new(state == LoopState::Enabled),
            generation: AtomicU64::new(0),
        }))
    }

    pub fn set(&self, state: LoopState) {
        let enable = state == LoopState::Enabled;
        let was_enabled = self.0.enabled.swap(enable, Ordering::SeqCst);
        if enable && !was_enabled {
            self.0.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn enable(&self) {
        self.set(LoopState::Enabled);
    }

    pub fn disable(&self) {
        self.set(LoopState::Disabled);
    }

    pub fn state(&self) -> LoopState {
        if self.0.enabled.load(Ordering::SeqCst) {
            LoopState::Enabled
        } else {
            LoopState::Disabled
        }
    }

    /// Number of Disabled -> Enabled transitions so far.
    pub fn generation(&self) -> u64 {
        self.0.generation.load(Ordering::SeqCst)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyListSendMode {
    Never,
    #[default]
    Once,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Disabled,
    NoFrame,
    /// An empty frame that the empty-send mode held back
    SkippedEmpty,
    EncodeFailed,
    Published { bodies: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub published: u64,
    pub no_frame: u64,
    pub skipped_empty: u64,
    pub encode_failures: u64,
}

/// Runs filter -> orientation -> assembly -> publish for each notified frame.
/// Each instance owns its own filter state.
pub struct FrameLoop {
    systems: Systems,
    config: BackendConfig,
    gate: LoopGate,
    /// Gate generation the current filter state belongs to
    generation: u64,
    active: bool,
    empty_frames_sent: u64,
    stats: CycleStats,
}

impl FrameLoop {
    /// Starts Disabled unless `enable_on_start` is set.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let initial = if config.enable_on_start {
            LoopState::Enabled
        } else {
            LoopState::Disabled
        };
        Ok(FrameLoop {
            systems: Systems::new(config)?,
            config: config.clone(),
            gate: LoopGate::new(initial),
            generation: 0,
            active: false,
            empty_frames_sent: 0,
            stats: CycleStats::default(),
        })
    }

    pub fn gate(&self) -> LoopGate {
        self.gate.clone()
    }

    pub fn state(&self) -> LoopState {
        self.gate.state()
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn tracked_ids(&self) -> Vec<TrackingId> {
        self.systems.joint_filter.tracked_ids()
    }

    /// Take on a new config. Filter history is discarded.
    pub fn apply_config(&mut self, config: &BackendConfig) {
        info!("Applying new config to frame loop");
        self.systems.joint_filter.reinit(config.smooth_settings());
        self.config = config.clone();
    }

    pub fn set_smoothing(&mut self, value: f32) {
        let mut config = self.config.clone();
        config.set_uniform_smoothing(value);
        self.apply_config(&config);
    }

    /// Handle one frame-available notification. A cycle that has started
    /// always runs to completion, whatever happens to the gate meanwhile.
    pub fn on_frame_available<F: FrameReference>(
        &mut self,
        frame_ref: &F,
        publisher: &mut dyn Publisher,
    ) -> CycleOutcome {
        if self.gate.state() == LoopState::Disabled {
            if self.active {
                info!("Frame loop disabled");
                self.active = false;
            }
            return CycleOutcome::Disabled;
        }

        let generation = self.gate.generation();
        if generation != self.generation {
            info!("Frame loop re-enabled; starting with fresh filter state");
            self.systems.joint_filter.reset();
            self.empty_frames_sent = 0;
            self.generation = generation;
        }
        if !self.active {
            info!("Frame loop enabled");
            self.active = true;
        }

        let bodies = {
            let Some(mut frame) = frame_ref.acquire_frame() else {
                self.stats.no_frame += 1;
                return CycleOutcome::NoFrame;
            };
            frame.bodies()
        };
        let Some(bodies) = bodies else {
            self.stats.no_frame += 1;
            return CycleOutcome::NoFrame;
        };

        self.process(&bodies, publisher)
    }

    fn process(&mut self, bodies: &BodyFrame, publisher: &mut dyn Publisher) -> CycleOutcome {
        let Systems {
            joint_filter,
            orientation_chain,
        } = &mut self.systems;
        let depth_clamp = self.config.depth_clamp;

        let present: Vec<TrackingId> = bodies
            .iter()
            .filter(|b| b.is_tracked)
            .map(|b| b.tracking_id)
            .collect();
        joint_filter.retain_bodies(&present);

        let mut assembler = FrameAssembler::new(depth_clamp);
        let mut seen: Vec<TrackingId> = Vec::with_capacity(present.len());
        for body in bodies.iter().filter(|b| b.is_tracked) {
            if seen.contains(&body.tracking_id) {
                warn!(
                    "Body {} appears in more than one slot; ignoring the duplicate",
                    body.tracking_id
                );
                continue;
            }
            seen.push(body.tracking_id);

            if body.clipped_edges.any() {
                debug!(
                    "Body {} clipped at frame edges {:?}",
                    body.tracking_id, body.clipped_edges
                );
            }

            let raw = body.clamped_positions(depth_clamp);
            let filtered = joint_filter.update_body(
                body.tracking_id,
                raw.iter().map(|(joint, position)| {
                    (*joint, *position, body.joints[joint].tracking_state)
                }),
            );

            let orientations = match self.config.orientation_source {
                OrientationSource::Raw => orientation_chain.compute(&raw),
                OrientationSource::Filtered => orientation_chain.compute(&filtered),
            };

            assembler.add_body(body, &filtered, &orientations);
        }

        let frame = assembler.finish();
        let body_count = frame.len();

        if !self.should_send(body_count) {
            self.stats.skipped_empty += 1;
            return CycleOutcome::SkippedEmpty;
        }

        match encode_frame(&frame, self.config.payload_encoding) {
            Ok(payload) => {
                publisher.publish(SKELETON_CHANNEL, &payload);
                self.stats.published += 1;
                debug!("Published skeleton frame with {} bodies", body_count);
                CycleOutcome::Published { bodies: body_count }
            }
            Err(e) => {
                warn!("Abandoning frame: {}", e);
                self.stats.encode_failures += 1;
                CycleOutcome::EncodeFailed
            }
        }
    }

    fn should_send(&mut self, body_count: usize) -> bool {
        if body_count > 0 {
            self.empty_frames_sent = 0;
            return true;
        }
        let send = match self.config.empty_frame_send_mode {
            EmptyListSendMode::Always => true,
            EmptyListSendMode::Once => self.empty_frames_sent < 1,
            EmptyListSendMode::Never => false,
        };
        if send {
            self.empty_frames_sent += 1;
        }
        send
    }
}

pub type ListenerId = usize;

/// Independent frame loops, one per registered listener. No state is shared
/// between them.
#[derive(Default)]
pub struct FrameListeners {
    loops: IndexMap<ListenerId, FrameLoop>,
    next_id: ListenerId,
}

impl FrameListeners {
    pub fn new() -> Self {
        FrameListeners::default()
    }

    pub fn register(&mut self, frame_loop: FrameLoop) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.loops.insert(id, frame_loop);
        debug!("Registered frame listener {}", id);
        id
    }

    pub fn unregister(&mut self, id: ListenerId) -> Option<FrameLoop> {
        self.loops.shift_remove(&id)
    }

    pub fn get(&self, id: ListenerId) -> Option<&FrameLoop> {
        self.loops.get(&id)
    }

    pub fn get_mut(&mut self, id: ListenerId) -> Option<&mut FrameLoop> {
        self.loops.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn set_state(&self, state: LoopState) {
        for frame_loop in self.loops.values() {
            frame_loop.gate.set(state);
        }
    }

    pub fn apply_config(&mut self, config: &BackendConfig) {
        for frame_loop in self.loops.values_mut() {
            frame_loop.apply_config(config);
        }
    }

    pub fn notify<F: FrameReference>(
        &mut self,
        frame_ref: &F,
        publisher: &mut dyn Publisher,
    ) -> Vec<(ListenerId, CycleOutcome)> {
        self.loops
            .iter_mut()
            .map(|(id, frame_loop)| (*id, frame_loop.on_frame_available(frame_ref, publisher)))
            .collect()
    }
}
