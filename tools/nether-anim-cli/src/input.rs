//! Raw animation input files
//!
//! One JSON document per animation: the raw sequence plus the skeleton it animates.
//! glam types use their serde array form (`[x, y, z]`, quaternions `[x, y, z, w]`).

use anyhow::{Context, Result};
use nether_anim::{AnimSequence, Skeleton};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationInput {
    pub sequence: AnimSequence,
    pub skeleton: Skeleton,
}

impl AnimationInput {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read animation: {}", path.display()))?;
        let mut input: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse animation JSON: {}", path.display()))?;

        if input.sequence.name.is_empty() {
            input.sequence.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        input.validate()?;
        Ok(input)
    }

    fn validate(&self) -> Result<()> {
        let num_bones = self.skeleton.bones.len();
        if let Some(&bone) = self.sequence.track_to_bone.iter().find(|&&b| b >= num_bones) {
            anyhow::bail!(
                "{}: track references bone {} but the skeleton has {} bones",
                self.sequence.name,
                bone,
                num_bones
            );
        }
        for (index, bone) in self.skeleton.bones.iter().enumerate() {
            if bone.parent.is_some_and(|parent| parent >= index) {
                anyhow::bail!(
                    "{}: bone '{}' must come after its parent",
                    self.sequence.name,
                    bone.name
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use nether_anim::{Bone, RawTrack, Transform};
    use tempfile::tempdir;

    /// Two bones, root turning a quarter circle about Z over one second
    pub(crate) fn sample_input() -> AnimationInput {
        let frames = 20u32;
        AnimationInput {
            sequence: AnimSequence {
                name: String::new(),
                sequence_length: 1.0,
                num_frames: frames,
                interpolation: Default::default(),
                raw_tracks: vec![
                    RawTrack {
                        pos_keys: vec![Vec3::ZERO],
                        rot_keys: (0..frames)
                            .map(|f| {
                                let t = f as f32 / (frames - 1) as f32;
                                Quat::from_rotation_z(std::f32::consts::FRAC_PI_2 * t)
                            })
                            .collect(),
                        scale_keys: Vec::new(),
                    },
                    RawTrack {
                        pos_keys: vec![Vec3::X * 10.0],
                        rot_keys: vec![Quat::IDENTITY],
                        scale_keys: Vec::new(),
                    },
                ],
                track_to_bone: vec![0, 1],
            },
            skeleton: Skeleton {
                bones: vec![
                    Bone {
                        name: "root".to_string(),
                        parent: None,
                        ref_pose: Transform::IDENTITY,
                        has_socket: false,
                    },
                    Bone {
                        name: "hand".to_string(),
                        parent: Some(0),
                        ref_pose: Transform::from_translation(Vec3::X * 10.0),
                        has_socket: false,
                    },
                ],
            },
        }
    }

    #[test]
    fn test_load_names_sequence_after_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("turn.json");
        std::fs::write(&path, serde_json::to_string(&sample_input()).unwrap()).unwrap();

        let input = AnimationInput::load(&path).unwrap();
        assert_eq!(input.sequence.name, "turn");
        assert_eq!(input.sequence.raw_tracks[0].rot_keys.len(), 20);
    }

    #[test]
    fn test_load_rejects_unknown_bone() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("bad.json");
        let mut input = sample_input();
        input.sequence.track_to_bone = vec![0, 5];
        std::fs::write(&path, serde_json::to_string(&input).unwrap()).unwrap();

        let err = AnimationInput::load(&path).unwrap_err();
        assert!(err.to_string().contains("bone 5"), "{err}");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let err = AnimationInput::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read animation"));
    }
}
