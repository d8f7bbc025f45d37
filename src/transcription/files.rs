//! File moves between the managed directories and transcript discovery.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions the transcriber writes, without the leading dot.
pub const TRANSCRIPT_EXTENSIONS: [&str; 3] = ["txt", "srt", "vtt"];

/// Moves `from` to `to`, replacing an existing destination.
///
/// Uses a rename and falls back to copy-then-delete (e.g. across
/// filesystems). Only one live copy remains afterwards.
pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
    match tokio::fs::remove_file(to).await {
        Ok(()) => debug!("Removed conflicting file {:?}", to),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to replace {:?}", to)),
    }

    if let Err(rename_err) = tokio::fs::rename(from, to).await {
        if tokio::fs::metadata(from).await.is_err() {
            return Err(rename_err).with_context(|| format!("Failed to move {:?}", from));
        }
        debug!(
            "Rename {:?} -> {:?} failed ({}), copying instead",
            from, to, rename_err
        );
        tokio::fs::copy(from, to)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", from, to))?;
        if let Err(e) = tokio::fs::remove_file(from).await {
            let _ = tokio::fs::remove_file(to).await;
            return Err(e).with_context(|| format!("Failed to remove {:?} after copy", from));
        }
    }

    Ok(())
}

/// Lowercased extension when it is a transcript format.
pub fn transcript_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    TRANSCRIPT_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// Transcripts the transcriber left next to `input` in `dir`: files named
/// `<input stem>.<txt|srt|vtt>`. Sorted by path so repeated scans agree.
pub async fn find_transcripts(dir: &Path, input: &Path) -> Result<Vec<PathBuf>> {
    let Some(stem) = input.file_stem() else {
        return Ok(Vec::new());
    };

    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {:?}", dir))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path == input || !entry.file_type().await?.is_file() {
            continue;
        }
        if path.file_stem() == Some(stem) && transcript_extension(&path).is_some() {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

/// Deletes the transcripts [`find_transcripts`] would report, so the next
/// transcriber run starts from a clean slate. Returns how many were removed.
pub async fn remove_transcripts(dir: &Path, input: &Path) -> Result<usize> {
    let mut removed = 0;
    for path in find_transcripts(dir, input).await? {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove {:?}", path)),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_file_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.wav");
        let to = dir.path().join("sub").join("a.wav");
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(&from, b"new").unwrap();
        std::fs::write(&to, b"old").unwrap();

        move_file(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_move_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = move_file(&dir.path().join("nope"), &dir.path().join("dest")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_transcript_extension() {
        assert_eq!(transcript_extension(Path::new("a.TXT")).as_deref(), Some("txt"));
        assert_eq!(transcript_extension(Path::new("a.vtt")).as_deref(), Some("vtt"));
        assert!(transcript_extension(Path::new("a.mp3")).is_none());
        assert!(transcript_extension(Path::new("txt")).is_none());
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_find_transcripts_matches_exact_stem_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("abc123.txt");
        for name in [
            "abc123.txt",
            "abc123.srt",
            "abc123.VTT",
            "abc123 (transcribed).vtt",
            "abc123_fast.txt",
            "abc123.json",
            "other.txt",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let found = find_transcripts(dir.path(), &input).await.unwrap();
        assert_eq!(names(&found), vec!["abc123.VTT", "abc123.srt"]);
    }

    #[tokio::test]
    async fn test_remove_transcripts_leaves_input_and_renamed_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("abc123.wav");
        for name in ["abc123.wav", "abc123.txt", "abc123.srt", "abc123_fast.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let removed = remove_transcripts(dir.path(), &input).await.unwrap();

        assert_eq!(removed, 2);
        assert!(input.exists());
        assert!(dir.path().join("abc123_fast.txt").exists());
        assert!(find_transcripts(dir.path(), &input).await.unwrap().is_empty());
    }
}
