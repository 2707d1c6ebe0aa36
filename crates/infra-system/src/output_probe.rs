// Filesystem output probe
use async_trait::async_trait;
use std::path::Path;
use tracing::trace;

use framewatch_core::port::OutputProbe;

/// Counts frame files directly inside the output directory (not recursive)
pub struct FsOutputProbe;

#[async_trait]
impl OutputProbe for FsOutputProbe {
    async fn count_matching(&self, dir: &Path, extension: &str) -> std::io::Result<usize> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut count = 0;

        while let Some(entry) = entries.next_entry().await? {
            // Entries can vanish between listing and stat
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }
            if has_extension(&entry.path(), extension) {
                count += 1;
            }
        }

        trace!(dir = %dir.display(), extension = %extension, count, "Counted output frames");
        Ok(count)
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
}
