use std::collections::{HashMap, VecDeque};

use anyhow::{Result, anyhow, bail};
use indexmap::IndexMap;
use nalgebra::{UnitQuaternion, Vector3};

use crate::{
    geometry_utils::rotation_between,
    tracking::{JointKind, Orientation, Position3D},
};

/// A directed parent -> child edge of the skeleton.
pub type Bone = (JointKind, JointKind);

/// Kinect-style skeleton, rooted at the middle of the spine.
pub const DEFAULT_BONES: [Bone; 24] = [
    // Torso
    (JointKind::SpineMid, JointKind::SpineShoulder),
    (JointKind::SpineMid, JointKind::SpineBase),
    (JointKind::SpineShoulder, JointKind::Neck),
    (JointKind::Neck, JointKind::Head),
    (JointKind::SpineShoulder, JointKind::ShoulderRight),
    (JointKind::SpineShoulder, JointKind::ShoulderLeft),
    (JointKind::SpineBase, JointKind::HipRight),
    (JointKind::SpineBase, JointKind::HipLeft),
    // Right arm
    (JointKind::ShoulderRight, JointKind::ElbowRight),
    (JointKind::ElbowRight, JointKind::WristRight),
    (JointKind::WristRight, JointKind::HandRight),
    (JointKind::HandRight, JointKind::HandTipRight),
    (JointKind::WristRight, JointKind::ThumbRight),
    // Left arm
    (JointKind::ShoulderLeft, JointKind::ElbowLeft),
    (JointKind::ElbowLeft, JointKind::WristLeft),
    (JointKind::WristLeft, JointKind::HandLeft),
    (JointKind::HandLeft, JointKind::HandTipLeft),
    (JointKind::WristLeft, JointKind::ThumbLeft),
    // Right leg
    (JointKind::HipRight, JointKind::KneeRight),
    (JointKind::KneeRight, JointKind::AnkleRight),
    (JointKind::AnkleRight, JointKind::FootRight),
    // Left leg
    (JointKind::HipLeft, JointKind::KneeLeft),
    (JointKind::KneeLeft, JointKind::AnkleLeft),
    (JointKind::AnkleLeft, JointKind::FootLeft),
];

/// A validated rooted tree of bones, stored in root-to-leaf order.
#[derive(Debug, Clone)]
pub struct SkeletonTopology {
    root: JointKind,
    ordered_bones: Vec<Bone>,
}

impl SkeletonTopology {
    /// Build a topology from a set of bones. Fails unless the bones form a
    /// single tree: one root, exactly one parent for every other joint,
    /// no cycles, everything reachable from the root.
    pub fn new(bones: &[Bone]) -> Result<Self> {
        if bones.is_empty() {
            bail!("skeleton has no bones");
        }

        let mut parents: HashMap<JointKind, JointKind> = HashMap::new();
        let mut children: IndexMap<JointKind, Vec<JointKind>> = IndexMap::new();
        for (parent, child) in bones {
            if parent == child {
                bail!("bone {:?} -> {:?} joins a joint to itself", parent, child);
            }
            if let Some(existing) = parents.insert(*child, *parent) {
                bail!(
                    "joint {:?} has two parents ({:?} and {:?})",
                    child,
                    existing,
                    parent
                );
            }
            children.entry(*parent).or_default().push(*child);
        }

        let roots: Vec<JointKind> = children
            .keys()
            .filter(|j| !parents.contains_key(j))
            .copied()
            .collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => bail!("skeleton has no root (every joint has a parent)"),
            many => bail!("skeleton has several roots: {:?}", many),
        };

        let mut ordered_bones = Vec::with_capacity(bones.len());
        let mut queue = VecDeque::from([root]);
        while let Some(parent) = queue.pop_front() {
            if let Some(kids) = children.get(&parent) {
                for child in kids {
                    ordered_bones.push((parent, *child));
                    queue.push_back(*child);
                }
            }
        }

        if ordered_bones.len() != bones.len() {
            return Err(anyhow!(
                "{} bones are not reachable from root {:?}",
                bones.len() - ordered_bones.len(),
                root
            ));
        }

        Ok(SkeletonTopology {
            root,
            ordered_bones,
        })
    }

    pub fn kinect() -> Result<Self> {
        SkeletonTopology::new(&DEFAULT_BONES)
    }

    pub fn root(&self) -> JointKind {
        self.root
    }

    pub fn bones(&self) -> &[Bone] {
        &self.ordered_bones
    }

    pub fn joints(&self) -> impl Iterator<Item = JointKind> + '_ {
        std::iter::once(self.root).chain(self.ordered_bones.iter().map(|(_, child)| *child))
    }
}

/// Absolute joint orientations, propagated from the root along the bones.
///
/// Every bone's rest direction is +Y in its parent's frame; a joint's
/// orientation is its parent's composed with the rotation taking that
/// rest direction onto the observed parent -> child direction.
pub struct OrientationChain {
    topology: SkeletonTopology,
    rest_direction: Vector3<f32>,
}

impl OrientationChain {
    pub fn new(topology: SkeletonTopology) -> Self {
        OrientationChain {
            topology,
            rest_direction: Vector3::y(),
        }
    }

    pub fn topology(&self) -> &SkeletonTopology {
        &self.topology
    }

    /// One orientation for every joint of the tree. Joints whose position is
    /// missing, or which sit on top of their parent, inherit the parent's
    /// orientation.
    pub fn compute(
        &self,
        positions: &IndexMap<JointKind, Position3D>,
    ) -> IndexMap<JointKind, Orientation> {
        let mut absolute: IndexMap<JointKind, UnitQuaternion<f32>> = IndexMap::new();
        absolute.insert(self.topology.root, UnitQuaternion::identity());

        for (parent, child) in self.topology.bones() {
            let parent_abs = absolute
                .get(parent)
                .copied()
                .unwrap_or_else(UnitQuaternion::identity);

            let local = match (positions.get(parent), positions.get(child)) {
                (Some(p), Some(c)) => {
                    let direction = c.to_vector() - p.to_vector();
                    let in_parent_frame = parent_abs.inverse() * direction;
                    rotation_between(&self.rest_direction, &in_parent_frame)
                }
                _ => None,
            };

            let child_abs = match local {
                Some(local) => parent_abs * local,
                None => parent_abs,
            };
            absolute.insert(*child, child_abs);
        }

        absolute
            .into_iter()
            .map(|(joint, q)| {
                let orientation = if joint == self.topology.root {
                    Orientation::identity()
                } else {
                    Orientation::from(q)
                };
                (joint, orientation)
            })
            .collect()
    }
}
