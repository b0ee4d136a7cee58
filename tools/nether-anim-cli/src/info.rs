//! Info command - show the layout of a .nanim container

use anyhow::{Context, Result};
use clap::Args;
use nether_anim::CompressedAnimation;
use nether_anim::decoder::{TrackView, track_view};
use nether_anim::formats::Channel;
use std::path::{Path, PathBuf};

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// .nanim container
    pub input: PathBuf,

    /// List every track's formats and key counts
    #[arg(short, long)]
    pub tracks: bool,
}

/// Loads and validates a container
pub fn load_container(path: &Path) -> Result<CompressedAnimation> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read container: {}", path.display()))?;
    CompressedAnimation::from_bytes(&bytes)
        .with_context(|| format!("Invalid container: {}", path.display()))
}

/// One line per channel, `identity` for channels without data
fn describe(view: Option<TrackView>) -> String {
    match view {
        Some(view) => format!(
            "{} x{}{}",
            view.format,
            view.num_keys,
            if view.has_frame_table { " (frame table)" } else { "" }
        ),
        None => "identity".to_string(),
    }
}

/// Execute the info command
pub fn execute(args: InfoArgs) -> Result<()> {
    let anim = load_container(&args.input)?;

    println!("{}", args.input.display());
    println!("  Key encoding:  {}", anim.key_encoding.name());
    println!(
        "  Formats:       translation {}, rotation {}, scale {}",
        anim.formats.translation, anim.formats.rotation, anim.formats.scale
    );
    println!("  Interpolation: {:?}", anim.interpolation);
    println!("  Byte order:    {:?}", anim.byte_order);
    println!("  Frames:        {} over {:.3}s", anim.num_frames, anim.sequence_length);
    println!("  Tracks:        {}", anim.num_tracks);
    println!("  Size:          {} bytes", anim.approx_compressed_size());

    if args.tracks {
        for track in 0..anim.num_tracks {
            let translation = track_view(&anim, track, Channel::Translation)?;
            let rotation = track_view(&anim, track, Channel::Rotation)?;
            print!(
                "  [{track:3}] T: {:<28} R: {:<28}",
                describe(translation),
                describe(rotation)
            );
            if anim.has_scale() {
                print!(" S: {}", describe(track_view(&anim, track, Channel::Scale)?));
            }
            println!();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::compress_file;
    use crate::input::tests::sample_input;
    use nether_anim::{CompressionSession, CompressionSettings, CompressionStrategy};
    use tempfile::tempdir;

    #[test]
    fn test_info_on_compressed_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let input = dir.path().join("turn.json");
        let output = dir.path().join("turn.nanim");
        std::fs::write(&input, serde_json::to_string(&sample_input()).unwrap()).unwrap();
        compress_file(
            &input,
            &output,
            &CompressionStrategy::LeastDestructive,
            &CompressionSettings::default(),
            &mut CompressionSession::new(),
        )
        .unwrap();

        let anim = load_container(&output).unwrap();
        assert_eq!(anim.num_tracks, 2);
        execute(InfoArgs {
            input: output,
            tracks: true,
        })
        .unwrap();
    }

    #[test]
    fn test_info_rejects_garbage() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("junk.nanim");
        std::fs::write(&path, b"not an animation").unwrap();
        let err = load_container(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid container"));
    }

    #[test]
    fn test_describe_identity() {
        assert_eq!(describe(None), "identity");
    }
}
