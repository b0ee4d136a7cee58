//! Sample command - evaluate bone transforms from a .nanim container
//!
//! Prints one JSON object per sampled time:
//! `{"time": 0.5, "tracks": [{"rotation": [x, y, z, w], "translation": [..], "scale": [..]}, ..]}`

use anyhow::Result;
use clap::Args;
use nether_anim::{CompressedAnimation, Transform, sample_bone_transform};
use serde::Serialize;
use std::path::PathBuf;

use crate::info::load_container;

/// Arguments for the sample command
#[derive(Args)]
pub struct SampleArgs {
    /// .nanim container
    pub input: PathBuf,

    /// Time in seconds (repeatable); defaults to every frame
    #[arg(short, long)]
    pub time: Vec<f32>,

    /// Only sample this track
    #[arg(long)]
    pub track: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PoseSample {
    pub time: f32,
    pub tracks: Vec<Transform>,
}

/// Frame times of `anim`, or `times` when given
fn sample_times(anim: &CompressedAnimation, times: &[f32]) -> Vec<f32> {
    if !times.is_empty() {
        return times.to_vec();
    }
    if anim.num_frames <= 1 {
        return vec![0.0];
    }
    let step = anim.sequence_length / (anim.num_frames - 1) as f32;
    (0..anim.num_frames).map(|frame| frame as f32 * step).collect()
}

pub fn sample_poses(
    anim: &CompressedAnimation,
    times: &[f32],
    track: Option<usize>,
) -> Result<Vec<PoseSample>> {
    let tracks: Vec<usize> = match track {
        Some(track) if track >= anim.num_tracks => {
            anyhow::bail!("Track {} out of range (animation has {} tracks)", track, anim.num_tracks)
        }
        Some(track) => vec![track],
        None => (0..anim.num_tracks).collect(),
    };

    Ok(sample_times(anim, times)
        .into_iter()
        .map(|time| PoseSample {
            time,
            tracks: tracks
                .iter()
                .map(|&track| sample_bone_transform(anim, track, time))
                .collect(),
        })
        .collect())
}

/// Execute the sample command
pub fn execute(args: SampleArgs) -> Result<()> {
    let anim = load_container(&args.input)?;
    for sample in sample_poses(&anim, &args.time, args.track)? {
        println!("{}", serde_json::to_string(&sample)?);
    }
    Ok(())
}
