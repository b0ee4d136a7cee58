//! Compress command - raw animation JSON to .nanim containers
//!
//! Inputs are compressed in parallel, each with its own session; the sessions
//! are merged afterwards for one winner report.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use nether_anim::strategy::{BitwiseParams, DecimationParams, PerTrackParams, RemoveLinearParams};
use nether_anim::{CompressionSession, CompressionSettings, CompressionStrategy, compress};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::COMPRESSED_EXT;
use crate::config::AnimConfig;
use crate::input::AnimationInput;

/// Strategy override from the command line, with default parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Automatic,
    LeastDestructive,
    Bitwise,
    EverySecondKey,
    Linear,
    PerTrack,
}

impl StrategyArg {
    fn to_strategy(self, settings: &CompressionSettings) -> CompressionStrategy {
        match self {
            StrategyArg::Automatic => CompressionStrategy::Automatic,
            StrategyArg::LeastDestructive => CompressionStrategy::LeastDestructive,
            StrategyArg::Bitwise => {
                CompressionStrategy::BitwiseOnly(BitwiseParams::new(settings.default_codec))
            }
            StrategyArg::EverySecondKey => {
                CompressionStrategy::RemoveEverySecondKey(DecimationParams::default())
            }
            StrategyArg::Linear => {
                CompressionStrategy::RemoveLinearKeys(RemoveLinearParams::default())
            }
            StrategyArg::PerTrack => CompressionStrategy::PerTrack(PerTrackParams::default()),
        }
    }
}

/// Arguments for the compress command
#[derive(Args)]
pub struct CompressArgs {
    /// Raw animation JSON files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory (defaults to next to each input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to anim.toml with [compression] and [strategy] sections
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Strategy to use instead of the config's
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,
}

/// Summary of one compressed input
#[derive(Debug)]
pub struct CompressedFile {
    pub output: PathBuf,
    pub label: String,
    pub size: usize,
    pub max_error: f32,
}

/// Execute the compress command
pub fn execute(args: CompressArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => AnimConfig::load(path)?,
        None => AnimConfig::default(),
    };
    config.validate()?;
    let strategy = match args.strategy {
        Some(arg) => arg.to_strategy(&config.compression),
        None => config.strategy.clone(),
    };

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let results: Result<Vec<_>> = args
        .inputs
        .par_iter()
        .map(|input| {
            let mut session = CompressionSession::new();
            let output = output_path(input, args.output.as_deref());
            let file = compress_file(input, &output, &strategy, &config.compression, &mut session)?;
            Ok((file, session))
        })
        .collect();

    let mut session = CompressionSession::new();
    for (file, file_session) in results? {
        tracing::info!(
            "{} -> {} bytes, max error {:.4} ({})",
            file.output.display(),
            file.size,
            file.max_error,
            file.label
        );
        session.merge(file_session);
    }
    session.report();
    Ok(())
}

/// `<output dir or input dir>/<input stem>.nanim`
fn output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let file = input.with_extension(COMPRESSED_EXT);
    match (output_dir, file.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => file,
    }
}

/// Loads, compresses and writes one animation
pub fn compress_file(
    input: &Path,
    output: &Path,
    strategy: &CompressionStrategy,
    settings: &CompressionSettings,
    session: &mut CompressionSession,
) -> Result<CompressedFile> {
    let animation = AnimationInput::load(input)?;
    tracing::debug!("Compressing {} with {}", input.display(), strategy.name());

    let outcome = compress(&animation.sequence, &animation.skeleton, strategy, settings, session)
        .with_context(|| format!("Failed to compress {}", input.display()))?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    outcome
        .compressed
        .write_to(&mut writer)
        .and_then(|()| writer.flush())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(CompressedFile {
        output: output.to_path_buf(),
        label: outcome.label,
        size: outcome.compressed.serialized_size(),
        max_error: outcome.error.max_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::tests::sample_input;
    use nether_anim::{CompressedAnimation, KeyEncoding};
    use tempfile::tempdir;

    fn write_input(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(&sample_input()).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("anims/walk.json"), None),
            PathBuf::from("anims/walk.nanim")
        );
        assert_eq!(
            output_path(Path::new("anims/walk.json"), Some(Path::new("out"))),
            PathBuf::from("out/walk.nanim")
        );
    }

    #[test]
    fn test_compress_file_writes_loadable_container() {
        let dir = tempdir().expect("Failed to create temp dir");
        let input = write_input(dir.path(), "turn.json");
        let output = dir.path().join("turn.nanim");

        let mut session = CompressionSession::new();
        let file = compress_file(
            &input,
            &output,
            &CompressionStrategy::PerTrack(PerTrackParams::default()),
            &CompressionSettings::default(),
            &mut session,
        )
        .unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(bytes.len(), file.size);
        let anim = CompressedAnimation::from_bytes(&bytes).unwrap();
        assert_eq!(anim.key_encoding, KeyEncoding::PerTrack);
        assert_eq!(anim.num_frames, 20);
        assert_eq!(file.label, "PerTrackCompression");
        assert_eq!(session.sequences(), 1);
    }

    #[test]
    fn test_execute_multiple_inputs() {
        let dir = tempdir().expect("Failed to create temp dir");
        let a = write_input(dir.path(), "a.json");
        let b = write_input(dir.path(), "b.json");
        let out = dir.path().join("out");

        execute(CompressArgs {
            inputs: vec![a, b],
            output: Some(out.clone()),
            config: None,
            strategy: Some(StrategyArg::Linear),
        })
        .unwrap();

        for name in ["a.nanim", "b.nanim"] {
            let bytes = std::fs::read(out.join(name)).unwrap();
            CompressedAnimation::from_bytes(&bytes).unwrap();
        }
    }

    #[test]
    fn test_execute_reports_missing_input() {
        let dir = tempdir().expect("Failed to create temp dir");
        let err = execute(CompressArgs {
            inputs: vec![dir.path().join("missing.json")],
            output: None,
            config: None,
            strategy: None,
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("missing.json"));
    }

    #[test]
    fn test_strategy_arg_uses_default_codec() {
        let settings = CompressionSettings::default();
        let CompressionStrategy::BitwiseOnly(params) = StrategyArg::Bitwise.to_strategy(&settings)
        else {
            panic!("expected bitwise strategy");
        };
        assert_eq!(params.formats, settings.default_codec);
    }
}
