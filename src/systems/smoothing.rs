use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    geometry_utils::{distance, lerp},
    tracking::{JointKind, Position3D, TrackingId, TrackingState},
};

/// Smallest usable jitter radius; anything below is treated as this.
const MIN_JITTER_RADIUS: f32 = 0.0001;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmoothSettings {
    /// Weight given to the historical trend over the fresh sample, in [0,1].
    /// Zero disables filtering entirely.
    pub smoothing: f32,
    /// How quickly the trend follows changes in the filtered position.
    pub correction: f32,
    /// How many frames of trend to extrapolate forward.
    pub prediction: f32,
    /// Deviations below this radius (m) are treated mostly as noise.
    pub jitter_radius: f32,
    /// Deviations at or beyond this radius (m) reset the joint to the raw sample.
    pub max_deviation_radius: f32,
}

impl SmoothSettings {
    /// The same scalar drives smoothing, correction and prediction.
    pub fn uniform(value: f32) -> Self {
        SmoothSettings {
            smoothing: value,
            correction: value,
            prediction: value,
            ..Default::default()
        }
        .sanitised()
    }

    /// Clamp every parameter into its usable range. Non-finite values fall
    /// back to the defaults.
    pub fn sanitised(self) -> Self {
        let defaults = SmoothSettings::default();
        let finite_or = |value: f32, default: f32| if value.is_finite() { value } else { default };
        SmoothSettings {
            smoothing: finite_or(self.smoothing, defaults.smoothing).clamp(0., 1.),
            correction: finite_or(self.correction, defaults.correction).clamp(0., 1.),
            prediction: finite_or(self.prediction, defaults.prediction).max(0.),
            jitter_radius: finite_or(self.jitter_radius, defaults.jitter_radius)
                .max(MIN_JITTER_RADIUS),
            max_deviation_radius: finite_or(
                self.max_deviation_radius,
                defaults.max_deviation_radius,
            )
            .max(0.),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.smoothing == 0.
    }
}

impl Default for SmoothSettings {
    fn default() -> Self {
        SmoothSettings {
            smoothing: 0.5,
            correction: 0.5,
            prediction: 0.5,
            jitter_radius: 0.03,
            max_deviation_radius: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
struct FilterState {
    filtered: Vector3<f32>,
    trend: Vector3<f32>,
    frame_count: u32,
}

impl FilterState {
    fn fresh(raw: Vector3<f32>) -> Self {
        FilterState {
            filtered: raw,
            trend: Vector3::zeros(),
            frame_count: 1,
        }
    }
}

/// Double-exponential (Holt) smoothing of joint positions, one state per
/// (TrackingId, JointKind).
pub struct JointFilter {
    settings: SmoothSettings,
    bodies: HashMap<TrackingId, HashMap<JointKind, FilterState>>,
}

impl JointFilter {
    pub fn new(settings: SmoothSettings) -> Self {
        JointFilter {
            settings: settings.sanitised(),
            bodies: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &SmoothSettings {
        &self.settings
    }

    /// Replace the parameters. All history is discarded, so every joint
    /// starts again from its next raw sample.
    pub fn reinit(&mut self, settings: SmoothSettings) {
        debug!("Filter re-initialised with {:?}", settings);
        self.settings = settings.sanitised();
        self.reset();
    }

    pub fn reset(&mut self) {
        self.bodies.clear();
    }

    pub fn is_tracking(&self, id: TrackingId) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn tracked_ids(&self) -> Vec<TrackingId> {
        self.bodies.keys().copied().collect()
    }

    /// Drop the state of every TrackingId not listed in `present`. The
    /// bodies of the current frame are the whole membership: an id that
    /// reappears later starts from scratch.
    pub fn retain_bodies(&mut self, present: &[TrackingId]) {
        self.bodies.retain(|id, _| {
            let keep = present.contains(id);
            if !keep {
                debug!("Dropping filter state for body {}", id);
            }
            keep
        });
    }

    /// Filter one joint sample, returning the smoothed position.
    ///
    /// A sample that is not finite is treated like a low-confidence one and
    /// replaced by the prediction. With no history to predict from it is
    /// returned as is and no state is created.
    pub fn update_joint(
        &mut self,
        id: TrackingId,
        joint: JointKind,
        raw: Position3D,
        tracking_state: TrackingState,
    ) -> Position3D {
        let usable = raw.is_finite();
        let raw = raw.to_vector();
        let settings = self.settings;
        let joints = self.bodies.entry(id).or_default();

        let Some(state) = joints.get_mut(&joint).filter(|_| !settings.is_passthrough()) else {
            if usable {
                joints.insert(joint, FilterState::fresh(raw));
            }
            return raw.into();
        };

        let SmoothSettings {
            smoothing,
            correction,
            prediction,
            jitter_radius,
            max_deviation_radius,
        } = settings;

        let predicted = state.filtered + state.trend * prediction;

        // Low-confidence samples must not drag the joint; follow the prediction instead
        let input = match tracking_state {
            TrackingState::Tracked if usable => raw,
            _ => predicted,
        };

        let deviation = distance(&input, &predicted);
        if !deviation.is_finite() || deviation >= max_deviation_radius {
            debug!(
                "Joint {:?} of body {} diverged by {} after {} frames; reset to raw",
                joint, id, deviation, state.frame_count
            );
            if usable {
                *state = FilterState::fresh(raw);
            } else {
                joints.remove(&joint);
            }
            return raw.into();
        }

        let raw_weight = (deviation / jitter_radius).min(1.);
        let jitter_filtered = lerp(&predicted, &input, raw_weight);

        let previous = state.filtered;
        let filtered = jitter_filtered * (1. - smoothing) + (previous + state.trend) * smoothing;
        let trend = (filtered - previous) * correction + state.trend * (1. - correction);

        state.filtered = filtered;
        state.trend = trend;
        state.frame_count += 1;

        filtered.into()
    }

    /// Filter every joint of one body. Joints with no finite estimate are
    /// left out.
    pub fn update_body(
        &mut self,
        id: TrackingId,
        samples: impl IntoIterator<Item = (JointKind, Position3D, TrackingState)>,
    ) -> IndexMap<JointKind, Position3D> {
        samples
            .into_iter()
            .map(|(joint, raw, tracking_state)| {
                (joint, self.update_joint(id, joint, raw, tracking_state))
            })
            .filter(|(_, position)| position.is_finite())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACKED: TrackingState = TrackingState::Tracked;

    fn settings(value: f32, max_deviation_radius: f32) -> SmoothSettings {
        SmoothSettings {
            max_deviation_radius,
            ..SmoothSettings::uniform(value)
        }
    }

    fn dist(a: Position3D, b: Position3D) -> f32 {
        distance(&a.to_vector(), &b.to_vector())
    }

    #[test]
    fn zero_smoothing_passes_raw_through() {
        let mut filter = JointFilter::new(settings(0., 0.05));
        let samples = [
            Position3D::new(0., 0., 1.),
            Position3D::new(0.01, 0.02, 1.1),
            Position3D::new(3., -2., 0.5),
            Position3D::new(3.001, -2., 0.5),
        ];
        for raw in samples {
            assert_eq!(filter.update_joint(1, JointKind::Head, raw, TRACKED), raw);
        }
    }

    #[test]
    fn first_sample_is_emitted_unchanged() {
        let mut filter = JointFilter::new(SmoothSettings::default());
        let raw = Position3D::new(0.4, 0.2, 1.8);
        assert_eq!(filter.update_joint(1, JointKind::Head, raw, TRACKED), raw);
    }

    #[test]
    fn jitter_is_absorbed() {
        let mut filter = JointFilter::new(settings(0.5, 0.5));
        let amplitude = 0.02;
        let mut previous: Option<Position3D> = None;
        for frame in 0..60 {
            let offset = if frame % 2 == 0 { -0.01 } else { 0.01 };
            let raw = Position3D::new(0.5 + offset, 0.2, 1.5);
            let out = filter.update_joint(1, JointKind::WristLeft, raw, TRACKED);
            if let Some(p) = previous {
                if frame > 10 {
                    assert!(dist(out, p) < amplitude / 2.);
                }
            }
            previous = Some(out);
        }
    }

    #[test]
    fn large_jump_resets_to_raw() {
        let mut filter = JointFilter::new(settings(0.5, 0.05));
        for _ in 0..5 {
            filter.update_joint(1, JointKind::HandRight, Position3D::new(0., 0., 1.), TRACKED);
        }
        let jump = Position3D::new(5., 5., 1.);
        assert_eq!(
            filter.update_joint(1, JointKind::HandRight, jump, TRACKED),
            jump
        );
    }

    #[test]
    fn small_jump_lands_between() {
        let mut filter = JointFilter::new(settings(0.5, 10.));
        for _ in 0..3 {
            filter.update_joint(1, JointKind::HandRight, Position3D::new(0., 0., 1.), TRACKED);
        }
        let out = filter.update_joint(1, JointKind::HandRight, Position3D::new(5., 5., 1.), TRACKED);
        assert!(out.x > 0. && out.x < 5.);
        assert!(out.y > 0. && out.y < 5.);
        assert!((out.x - 2.5).abs() < 1e-5);
    }

    #[test]
    fn untracked_samples_follow_prediction() {
        let mut filter = JointFilter::new(settings(0.5, 10.));
        for x in [0., 0.01, 0.02] {
            filter.update_joint(1, JointKind::KneeLeft, Position3D::new(x, 0., 1.), TRACKED);
        }
        let out = filter.update_joint(
            1,
            JointKind::KneeLeft,
            Position3D::new(3., 3., 0.1),
            TrackingState::NotTracked,
        );
        assert!(out.x < 0.05);
        assert!(out.y.abs() < 1e-6);
        assert!((out.z - 1.).abs() < 1e-6);
    }

    #[test]
    fn inferred_samples_follow_prediction() {
        let mut filter = JointFilter::new(settings(0.5, 10.));
        for x in [0., 0.01, 0.02] {
            filter.update_joint(1, JointKind::AnkleRight, Position3D::new(x, 0., 1.), TRACKED);
        }
        let out = filter.update_joint(
            1,
            JointKind::AnkleRight,
            Position3D::new(-4., 2., 3.),
            TrackingState::Inferred,
        );
        assert!(out.x > 0. && out.x < 0.05);
        assert!(out.y.abs() < 1e-6);
        assert!((out.z - 1.).abs() < 1e-6);
    }

    #[test]
    fn hand_returning_after_jump_is_blended() {
        let mut filter = JointFilter::new(settings(0.5, 10.));
        let rest = Position3D::new(0., 0., 1.);
        for _ in 0..3 {
            filter.update_joint(1001, JointKind::HandRight, rest, TRACKED);
        }
        let jumped = filter.update_joint(1001, JointKind::HandRight, Position3D::new(5., 5., 1.), TRACKED);
        let back = filter.update_joint(1001, JointKind::HandRight, rest, TRACKED);

        // Strictly between the jumped estimate and the raw sample
        assert!(back.x > rest.x && back.x < jumped.x);
        assert!(back.y > rest.y && back.y < jumped.y);
        assert!(dist(back, rest) > 0.);
        assert!((back.z - 1.).abs() < 1e-6);
    }

    #[test]
    fn non_finite_sample_does_not_poison_state() {
        let mut filter = JointFilter::new(settings(0.5, 0.05));
        let rest = Position3D::new(0., 0., 1.);
        filter.update_joint(1, JointKind::Head, rest, TRACKED);

        let out = filter.update_joint(1, JointKind::Head, Position3D::new(f32::NAN, 0., 1.), TRACKED);
        assert!(out.is_finite());

        let mut last = out;
        for _ in 0..50 {
            last = filter.update_joint(1, JointKind::Head, rest, TRACKED);
        }
        assert!(last.is_finite());
        assert!(dist(last, rest) < 1e-5);
    }

    #[test]
    fn non_finite_first_sample_creates_no_state() {
        let mut filter = JointFilter::new(SmoothSettings::default());
        let bad = Position3D::new(0., f32::INFINITY, 1.);
        assert!(!filter.update_joint(2, JointKind::Neck, bad, TRACKED).is_finite());

        let good = Position3D::new(0., 0.5, 1.);
        assert_eq!(filter.update_joint(2, JointKind::Neck, good, TRACKED), good);

        let filtered = filter.update_body(
            3,
            [
                (JointKind::Neck, bad, TRACKED),
                (JointKind::Head, good, TRACKED),
            ],
        );
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key(&JointKind::Head));
    }

    #[test]
    fn bodies_do_not_share_state() {
        let mut filter = JointFilter::new(settings(0.5, 10.));
        for _ in 0..5 {
            filter.update_joint(1, JointKind::Head, Position3D::new(1., 1., 1.), TRACKED);
        }
        let first_for_b = Position3D::new(-2., 0., 3.);
        assert_eq!(
            filter.update_joint(2, JointKind::Head, first_for_b, TRACKED),
            first_for_b
        );
        let next_for_a = filter.update_joint(1, JointKind::Head, Position3D::new(1., 1., 1.), TRACKED);
        assert!(dist(next_for_a, Position3D::new(1., 1., 1.)) < 1e-5);
    }

    #[test]
    fn reused_tracking_id_starts_fresh() {
        let mut filter = JointFilter::new(settings(0.5, 10.));
        for x in [0., 0.1, 0.2, 0.3] {
            filter.update_joint(7, JointKind::Head, Position3D::new(x, 0., 1.), TRACKED);
        }
        // Frame without body 7
        filter.retain_bodies(&[8]);
        assert!(!filter.is_tracking(7));

        let newcomer = Position3D::new(2., 0.5, 2.5);
        assert_eq!(
            filter.update_joint(7, JointKind::Head, newcomer, TRACKED),
            newcomer
        );
    }

    #[test]
    fn reinit_discards_history() {
        let mut filter = JointFilter::new(settings(0.5, 10.));
        filter.update_joint(3, JointKind::Head, Position3D::new(0., 0., 1.), TRACKED);
        filter.reinit(SmoothSettings::uniform(0.8));
        assert!(filter.tracked_ids().is_empty());
        assert_eq!(filter.settings().correction, 0.8);
    }

    #[test]
    fn settings_are_sanitised() {
        let s = SmoothSettings {
            smoothing: 1.5,
            correction: -1.,
            prediction: -3.,
            jitter_radius: 0.,
            max_deviation_radius: f32::NAN,
        }
        .sanitised();
        assert_eq!(s.smoothing, 1.);
        assert_eq!(s.correction, 0.);
        assert_eq!(s.prediction, 0.);
        assert!(s.jitter_radius > 0.);
        assert_eq!(s.max_deviation_radius, 0.05);
    }
}
