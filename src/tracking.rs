use indexmap::IndexMap;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Stable identity assigned by the frame source to a tracked body. It persists
/// for as long as the same physical person stays continuously tracked, and is
/// the key for all per-body filter state (never the slot index).
pub type TrackingId = u64;

/// Depth floor applied to any joint reported behind the sensor.
pub const DEFAULT_DEPTH_CLAMP: f32 = 0.1;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JointKind {
    SpineBase,
    SpineMid,
    Neck,
    Head,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    HandLeft,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HandRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    SpineShoulder,
    HandTipLeft,
    ThumbLeft,
    HandTipRight,
    ThumbRight,
}

impl JointKind {
    pub const ALL: [JointKind; 25] = [
        JointKind::SpineBase,
        JointKind::SpineMid,
        JointKind::Neck,
        JointKind::Head,
        JointKind::ShoulderLeft,
        JointKind::ElbowLeft,
        JointKind::WristLeft,
        JointKind::HandLeft,
        JointKind::ShoulderRight,
        JointKind::ElbowRight,
        JointKind::WristRight,
        JointKind::HandRight,
        JointKind::HipLeft,
        JointKind::KneeLeft,
        JointKind::AnkleLeft,
        JointKind::FootLeft,
        JointKind::HipRight,
        JointKind::KneeRight,
        JointKind::AnkleRight,
        JointKind::FootRight,
        JointKind::SpineShoulder,
        JointKind::HandTipLeft,
        JointKind::ThumbLeft,
        JointKind::HandTipRight,
        JointKind::ThumbRight,
    ];

    pub fn is_hand(&self) -> bool {
        matches!(self, JointKind::HandLeft | JointKind::HandRight)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    #[default]
    NotTracked,
    Inferred,
    Tracked,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandPose {
    Open,
    Closed,
    Lasso,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A point in sensor camera space, in metres.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub struct Position3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position3D {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Position3D { x, y, z }
    }

    /// Joints reported with negative depth are pulled up to `floor`, so that
    /// anything projecting them downstream never divides through zero.
    pub fn clamp_depth(mut self, floor: f32) -> Self {
        if self.z < 0. {
            self.z = floor;
        }
        self
    }

    pub fn to_vector(self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Vector3<f32>> for Position3D {
    fn from(v: Vector3<f32>) -> Self {
        Position3D::new(v.x, v.y, v.z)
    }
}

/// Unit quaternion, serialised with its components named as on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
pub struct Orientation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Orientation {
    pub fn identity() -> Self {
        Orientation {
            x: 0.,
            y: 0.,
            z: 0.,
            w: 1.,
        }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }
}

impl From<UnitQuaternion<f32>> for Orientation {
    fn from(q: UnitQuaternion<f32>) -> Self {
        Orientation {
            x: q.i,
            y: q.j,
            z: q.k,
            w: q.w,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JointSample3D {
    pub position: Position3D,
    pub tracking_state: TrackingState,
}

/// Which frame edges a body is clipped by.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClippedEdges {
    #[serde(default)]
    pub top: bool,
    #[serde(default)]
    pub bottom: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub right: bool,
}

impl ClippedEdges {
    pub fn any(&self) -> bool {
        self.top || self.bottom || self.left || self.right
    }
}

/// One body slot as delivered by the frame source.
///
/// Slots are reused by the source while a body stays tracked, but only the
/// `tracking_id` is treated as identity here.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    pub tracking_id: TrackingId,
    pub is_tracked: bool,
    #[serde(default)]
    pub hand_left_state: HandPose,
    #[serde(default)]
    pub hand_right_state: HandPose,
    #[serde(default)]
    pub clipped_edges: ClippedEdges,
    #[serde(default)]
    pub joints: IndexMap<JointKind, JointSample3D>,
}

impl Body {
    pub fn new(tracking_id: TrackingId, is_tracked: bool) -> Self {
        Body {
            tracking_id,
            is_tracked,
            ..Default::default()
        }
    }

    pub fn with_joint(
        mut self,
        joint: JointKind,
        position: Position3D,
        tracking_state: TrackingState,
    ) -> Self {
        self.joints.insert(
            joint,
            JointSample3D {
                position,
                tracking_state,
            },
        );
        self
    }

    pub fn hand_pose(&self, joint: JointKind) -> Option<HandPose> {
        match joint {
            JointKind::HandLeft => Some(self.hand_left_state),
            JointKind::HandRight => Some(self.hand_right_state),
            _ => None,
        }
    }

    /// Raw joint positions with the depth floor applied. Joints without a
    /// finite position are left out, as if not reported.
    pub fn clamped_positions(&self, depth_clamp: f32) -> IndexMap<JointKind, Position3D> {
        self.joints
            .iter()
            .filter(|(_, sample)| sample.position.is_finite())
            .map(|(kind, sample)| (*kind, sample.position.clamp_depth(depth_clamp)))
            .collect()
    }
}

/// All body slots from a single sensor frame.
pub type BodyFrame = Vec<Body>;
