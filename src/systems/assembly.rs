use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::tracking::{Body, HandPose, JointKind, Orientation, Position3D, TrackingId};

/// One joint of an assembled body. Hand joints also carry the hand pose.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
pub enum JointSample {
    // Must come first so that untagged decoding doesn't swallow the pose
    Hand {
        #[serde(rename = "Position")]
        position: Position3D,
        #[serde(rename = "Orientation")]
        orientation: Orientation,
        #[serde(rename = "HandState")]
        hand_pose: HandPose,
    },
    Generic {
        #[serde(rename = "Position")]
        position: Position3D,
        #[serde(rename = "Orientation")]
        orientation: Orientation,
    },
}

impl JointSample {
    pub fn position(&self) -> Position3D {
        match self {
            JointSample::Hand { position, .. } | JointSample::Generic { position, .. } => {
                *position
            }
        }
    }

    pub fn orientation(&self) -> Orientation {
        match self {
            JointSample::Hand { orientation, .. } | JointSample::Generic { orientation, .. } => {
                *orientation
            }
        }
    }

    pub fn hand_pose(&self) -> Option<HandPose> {
        match self {
            JointSample::Hand { hand_pose, .. } => Some(*hand_pose),
            JointSample::Generic { .. } => None,
        }
    }
}

pub type BodySnapshot = IndexMap<JointKind, JointSample>;

/// Everything published for one sensor frame, keyed by TrackingId.
pub type SkeletalFrame = IndexMap<TrackingId, BodySnapshot>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PayloadEncoding {
    #[default]
    Json,
    MessagePack,
}

pub struct FrameAssembler {
    frame: SkeletalFrame,
    depth_clamp: f32,
}

impl FrameAssembler {
    /// Starts an empty frame; nothing from earlier frames is carried over.
    pub fn new(depth_clamp: f32) -> Self {
        FrameAssembler {
            frame: IndexMap::new(),
            depth_clamp,
        }
    }

    /// Add one body. Untracked bodies contribute nothing. Every joint with a
    /// filtered position gets an entry, whatever its own tracking state.
    pub fn add_body(
        &mut self,
        body: &Body,
        filtered: &IndexMap<JointKind, Position3D>,
        orientations: &IndexMap<JointKind, Orientation>,
    ) {
        if !body.is_tracked {
            return;
        }

        let snapshot: BodySnapshot = filtered
            .iter()
            .map(|(joint, position)| {
                let position = position.clamp_depth(self.depth_clamp);
                let orientation = orientations
                    .get(joint)
                    .copied()
                    .unwrap_or_else(Orientation::identity);
                let sample = match body.hand_pose(*joint) {
                    Some(hand_pose) => JointSample::Hand {
                        position,
                        orientation,
                        hand_pose,
                    },
                    None => JointSample::Generic {
                        position,
                        orientation,
                    },
                };
                (*joint, sample)
            })
            .collect();

        self.frame.insert(body.tracking_id, snapshot);
    }

    pub fn finish(self) -> SkeletalFrame {
        self.frame
    }
}

pub fn encode_frame(frame: &SkeletalFrame, encoding: PayloadEncoding) -> Result<Vec<u8>> {
    match encoding {
        PayloadEncoding::Json => {
            serde_json::to_vec(frame).map_err(|e| anyhow!("Failed to encode frame as JSON: {}", e))
        }
        PayloadEncoding::MessagePack => rmp_serde::to_vec_named(frame)
            .map_err(|e| anyhow!("Failed to encode frame as MessagePack: {}", e)),
    }
}

pub fn decode_frame(payload: &[u8], encoding: PayloadEncoding) -> Result<SkeletalFrame> {
    match encoding {
        PayloadEncoding::Json => serde_json::from_slice(payload)
            .map_err(|e| anyhow!("Failed to parse JSON frame: {}", e)),
        PayloadEncoding::MessagePack => rmp_serde::from_slice(payload)
            .map_err(|e| anyhow!("Failed to parse MessagePack frame: {}", e)),
    }
}
