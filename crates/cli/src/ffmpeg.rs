//! ffmpeg invocation assembly

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use framewatch_core::domain::CommandLine;

/// Frame file name pattern (image2 muxer numbering)
const FRAME_PATTERN: &str = "img_%05d";

/// Command extracting one frame every `every_secs` seconds of `input`
/// into `frame_dir`
///
/// Paths should be absolute: the process runs inside `frame_dir`.
pub fn extract_command(
    ffmpeg: &Path,
    input: &Path,
    frame_dir: &Path,
    every_secs: u64,
    extension: &str,
) -> CommandLine {
    let pattern = frame_dir.join(format!(
        "{}.{}",
        FRAME_PATTERN,
        extension.trim_start_matches('.')
    ));

    CommandLine::new(ffmpeg, frame_dir).args([
        "-nostdin".to_string(),
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
        "-threads".to_string(),
        "0".to_string(),
        "-vf".to_string(),
        format!("fps=1/{}", every_secs),
        "-f".to_string(),
        "image2".to_string(),
        pattern.display().to_string(),
    ])
}

/// One output subdirectory per input, named after the file stem
///
/// Colliding stems get a numeric suffix (`clip`, `clip-2`, ...).
pub fn assign_frame_dirs(output_dir: &Path, inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut taken = HashSet::new();

    inputs
        .iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "input".to_string());

            let mut name = stem.clone();
            let mut n = 1;
            while !taken.insert(name.clone()) {
                n += 1;
                name = format!("{}-{}", stem, n);
            }
            output_dir.join(name)
        })
        .collect()
}
