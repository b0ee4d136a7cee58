//! Skeleton hierarchy and the metadata derived from it
//!
//! The codec only needs a narrow view of a skeleton, expressed by
//! [`SkeletonProvider`]. [`Skeleton`] is a plain serde implementation used by
//! tooling and tests.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::warn;

use crate::math::Transform;

/// Read-only skeleton queries used by compression
pub trait SkeletonProvider {
    fn num_bones(&self) -> usize;

    fn bone_name(&self, bone: usize) -> &str;

    /// Parent bone, `None` for roots. Parents always precede their children.
    fn parent_index(&self, bone: usize) -> Option<usize>;

    fn ref_pose_local_transform(&self, bone: usize) -> Transform;

    /// Bones with sockets attached
    fn socket_bones(&self) -> Vec<usize> {
        Vec::new()
    }

    /// Bones whose drift is measured. Defaults to the leaf bones.
    fn end_effectors(&self) -> Vec<usize> {
        let mut has_child = vec![false; self.num_bones()];
        for bone in 0..self.num_bones() {
            if let Some(parent) = self.parent_index(bone) {
                if let Some(flag) = has_child.get_mut(parent) {
                    *flag = true;
                }
            }
        }
        (0..self.num_bones()).filter(|&b| !has_child[b]).collect()
    }
}

/// One bone of a [`Skeleton`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub ref_pose: Transform,
    #[serde(default)]
    pub has_socket: bool,
}

/// Serializable skeleton
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl SkeletonProvider for Skeleton {
    fn num_bones(&self) -> usize {
        self.bones.len()
    }

    fn bone_name(&self, bone: usize) -> &str {
        self.bones.get(bone).map(|b| b.name.as_str()).unwrap_or("")
    }

    fn parent_index(&self, bone: usize) -> Option<usize> {
        self.bones.get(bone).and_then(|b| b.parent)
    }

    fn ref_pose_local_transform(&self, bone: usize) -> Transform {
        self.bones
            .get(bone)
            .map(|b| b.ref_pose)
            .unwrap_or(Transform::IDENTITY)
    }

    fn socket_bones(&self) -> Vec<usize> {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.has_socket)
            .map(|(i, _)| i)
            .collect()
    }
}

// ============================================================================
// Bone metadata
// ============================================================================

/// Ancestor chain of one bone, nearest first
pub type BoneChain = SmallVec<[usize; 16]>;

/// Per-bone data used by the error metrics and key reduction
#[derive(Debug, Clone, PartialEq)]
pub struct BoneData {
    pub name: String,
    /// Reference pose rotation relative to the parent
    pub orientation: Quat,
    /// Reference pose translation relative to the parent
    pub position: Vec3,
    /// Ancestors, nearest first, ending at the root
    pub bones_to_root: BoneChain,
    pub children: Vec<usize>,
    /// End effectors at or below this bone; an end effector lists itself
    pub end_effectors: Vec<usize>,
    /// Listed by [`SkeletonProvider::end_effectors`]
    pub end_effector: bool,
    pub has_socket: bool,
    /// Name matched one of the configured key end effector patterns
    pub key_end_effector: bool,
}

impl BoneData {
    pub fn is_end_effector(&self) -> bool {
        self.end_effector
    }

    pub fn depth(&self) -> usize {
        self.bones_to_root.len()
    }

    pub fn parent(&self) -> Option<usize> {
        self.bones_to_root.first().copied()
    }

    pub fn ref_pose(&self) -> Transform {
        Transform::new(self.orientation, self.position, Vec3::ONE)
    }

    /// Socket or key end effector: measured with the long dummy bone and socket tolerance
    pub fn is_sensitive_effector(&self) -> bool {
        self.has_socket || self.key_end_effector
    }
}

/// Builds [`BoneData`] for every bone of `skeleton`.
///
/// A bone is a key end effector if its name contains any of `key_end_effector_names`.
pub fn build_skeleton_metadata(
    skeleton: &impl SkeletonProvider,
    key_end_effector_names: &[String],
) -> Vec<BoneData> {
    let num_bones = skeleton.num_bones();
    let sockets = skeleton.socket_bones();

    let mut bones: Vec<BoneData> = (0..num_bones)
        .map(|bone| {
            let ref_pose = skeleton.ref_pose_local_transform(bone);
            let name = skeleton.bone_name(bone).to_string();

            let mut bones_to_root = BoneChain::new();
            let mut current = skeleton.parent_index(bone);
            while let Some(parent) = current {
                if parent >= num_bones || bones_to_root.len() > num_bones {
                    warn!(bone, parent, "broken bone hierarchy");
                    break;
                }
                bones_to_root.push(parent);
                current = skeleton.parent_index(parent);
            }

            let key_end_effector = key_end_effector_names
                .iter()
                .any(|pattern| !pattern.is_empty() && name.contains(pattern.as_str()));

            BoneData {
                name,
                orientation: ref_pose.rotation,
                position: ref_pose.translation,
                bones_to_root,
                children: Vec::new(),
                end_effectors: Vec::new(),
                end_effector: false,
                has_socket: sockets.contains(&bone),
                key_end_effector,
            }
        })
        .collect();

    for bone in 0..num_bones {
        if let Some(parent) = bones[bone].parent() {
            bones[parent].children.push(bone);
        }
    }

    for effector in skeleton.end_effectors() {
        match bones.get_mut(effector) {
            Some(data) => data.end_effector = true,
            None => warn!(effector, num_bones, "end effector outside skeleton"),
        }
    }

    for bone in 0..num_bones {
        if !bones[bone].is_end_effector() {
            continue;
        }
        bones[bone].end_effectors.push(bone);
        let ancestors = bones[bone].bones_to_root.clone();
        for ancestor in ancestors {
            bones[ancestor].end_effectors.push(bone);
        }
    }

    bones
}

/// Fills `world` with component-space transforms, parents first
pub fn compose_pose(bones: &[BoneData], local: &[Transform], world: &mut [Transform]) {
    for bone in 0..bones.len() {
        world[bone] = match bones[bone].parent() {
            Some(parent) if parent < bone => {
                let mut t = local[bone].compose(&world[parent]);
                t.normalize_rotation();
                t
            }
            Some(parent) => {
                warn!(bone, parent, "parent bone after child, skipping");
                local[bone]
            }
            None => local[bone],
        };
    }
}

/// Height of each track's bone: bones between it and the nearest end effector below it
pub fn track_heights(bones: &[BoneData], track_to_bone: &[usize]) -> Vec<u32> {
    track_to_bone
        .iter()
        .map(|&bone| {
            let Some(data) = bones.get(bone) else {
                return 0;
            };
            data.end_effectors
                .iter()
                .filter_map(|&effector| {
                    bones[effector]
                        .bones_to_root
                        .iter()
                        .position(|&b| b == bone)
                        .map(|p| p as u32 + 1)
                        .or((effector == bone).then_some(0))
                })
                .min()
                .unwrap_or(0)
        })
        .collect()
}
