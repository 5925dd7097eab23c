//! Concatenates partial files into the final output.
use crate::error::{DownloadError, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};

/// Whether `actual` is close enough to `expected`: exact, or short by at
/// most 1%.
pub fn size_acceptable(expected: u64, actual: u64) -> bool {
    actual == expected || (actual < expected && expected - actual <= expected / 100)
}

/// Streams `parts` into `destination` in the order given, then verifies the
/// result against `expected_size`.
///
/// `parts` must already be sorted by range index.
///
/// On any failure, a copy error or a size mismatch, the destination is
/// removed and the partial files are left untouched so the download can be
/// resumed. On success the partial files are deleted; failing to delete one
/// is only logged.
pub async fn merge_parts(
    parts: &[PathBuf],
    destination: &Path,
    expected_size: u64,
    buffer_size: usize,
) -> Result<u64> {
    let actual = match concat(parts, destination, buffer_size).await {
        Ok(actual) => actual,
        Err(e) => {
            discard(destination).await;
            return Err(e.into());
        }
    };

    if !size_acceptable(expected_size, actual) {
        discard(destination).await;
        return Err(DownloadError::MergeVerificationFailed {
            expected: expected_size,
            actual,
        });
    }

    for part in parts {
        if let Err(e) = fs::remove_file(part).await {
            warn!(part = %part.display(), error = %e, "could not remove partial file");
        }
    }

    Ok(actual)
}

async fn concat(parts: &[PathBuf], destination: &Path, buffer_size: usize) -> std::io::Result<u64> {
    let file = File::create(destination).await?;
    let mut writer = BufWriter::with_capacity(buffer_size, file);

    for part in parts {
        let mut reader = BufReader::with_capacity(buffer_size, File::open(part).await?);
        let copied = tokio::io::copy_buf(&mut reader, &mut writer).await?;
        debug!(part = %part.display(), copied, "merged part");
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    Ok(fs::metadata(destination).await?.len())
}

/// Removes a malformed output so it is never mistaken for a finished file.
async fn discard(destination: &Path) {
    match fs::remove_file(destination).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %destination.display(), error = %e, "could not remove malformed output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn write_parts(dir: &Path, contents: &[&[u8]]) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for (i, data) in contents.iter().enumerate() {
            let path = dir.join(format!("out.bin.part{}", i));
            fs::write(&path, data).await.unwrap();
            paths.push(path);
        }
        paths
    }

    #[tokio::test]
    async fn merges_in_range_order_and_cleans_up() -> Result<()> {
        let dir = tempdir()?;
        let parts = write_parts(dir.path(), &[b"AAA", b"BBB", b"CCC"]).await;
        let dest = dir.path().join("out.bin");

        let size = merge_parts(&parts, &dest, 9, 4).await?;

        assert_eq!(size, 9);
        assert_eq!(fs::read(&dest).await?, b"AAABBBCCC");
        for part in &parts {
            assert!(!part.exists(), "partial file should be deleted");
        }
        Ok(())
    }

    #[tokio::test]
    async fn out_of_order_parts_produce_wrong_output() -> Result<()> {
        let dir = tempdir()?;
        let mut parts = write_parts(dir.path(), &[b"AAA", b"BBB", b"CCC"]).await;
        parts.reverse();
        let dest = dir.path().join("out.bin");

        merge_parts(&parts, &dest, 9, 1024).await?;

        // The merger trusts its input order; callers must sort by index.
        assert_ne!(fs::read(&dest).await?, b"AAABBBCCC");
        Ok(())
    }

    #[tokio::test]
    async fn size_mismatch_removes_output_but_keeps_parts() -> Result<()> {
        let dir = tempdir()?;
        let parts = write_parts(dir.path(), &[b"AAA", b"BB"]).await;
        let dest = dir.path().join("out.bin");

        let err = merge_parts(&parts, &dest, 6, 1024).await.unwrap_err();

        assert!(matches!(
            err,
            DownloadError::MergeVerificationFailed { expected: 6, actual: 5 }
        ));
        assert!(!dest.exists());
        assert!(parts.iter().all(|p| p.exists()));
        Ok(())
    }

    #[tokio::test]
    async fn missing_part_removes_output_but_keeps_parts() -> Result<()> {
        let dir = tempdir()?;
        let mut parts = write_parts(dir.path(), &[b"AAA"]).await;
        parts.push(dir.path().join("out.bin.part1"));
        let dest = dir.path().join("out.bin");

        let err = merge_parts(&parts, &dest, 6, 1024).await.unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::IoFailure);
        assert!(!dest.exists(), "truncated output must not linger");
        assert!(parts[0].exists());
        Ok(())
    }

    #[test]
    fn one_percent_shortfall_is_tolerated() {
        assert!(size_acceptable(1000, 1000));
        assert!(size_acceptable(1000, 990));
        assert!(!size_acceptable(1000, 989));
        assert!(!size_acceptable(1000, 1001));
    }
}
