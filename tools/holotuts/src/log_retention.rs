use crate::errors::HoloTutsError;
use std::fs;
use std::path::{Path, PathBuf};

/// Deletes the oldest `.jsonl` logs in `dir` until the directory fits in
/// `budget_bytes`. `keep` is never deleted.
pub fn enforce_total_budget(
    dir: &Path,
    budget_bytes: u64,
    keep: &Path,
) -> Result<Vec<PathBuf>, HoloTutsError> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| HoloTutsError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect::<Vec<_>>();

    files.sort_by_key(|path| fs::metadata(path).ok().and_then(|m| m.modified().ok()));

    let mut total = files
        .iter()
        .filter_map(|path| fs::metadata(path).ok().map(|meta| meta.len()))
        .sum::<u64>();

    let mut deleted = Vec::new();
    for path in files {
        if total <= budget_bytes {
            break;
        }
        if path == keep {
            continue;
        }
        let len = fs::metadata(&path)
            .map_err(|e| HoloTutsError::Io(e.to_string()))?
            .len();
        fs::remove_file(&path).map_err(|e| HoloTutsError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::enforce_total_budget;
    use std::fs;

    #[test]
    fn prunes_oldest_logs_but_keeps_active_and_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.jsonl"), vec![0u8; 40]).expect("a");
        std::thread::sleep(std::time::Duration::from_millis(2));
        fs::write(dir.path().join("tutorials.json"), vec![0u8; 40]).expect("doc");
        std::thread::sleep(std::time::Duration::from_millis(2));
        fs::write(dir.path().join("b.jsonl"), vec![0u8; 40]).expect("b");
        std::thread::sleep(std::time::Duration::from_millis(2));
        fs::write(dir.path().join("c.jsonl"), vec![0u8; 40]).expect("c");

        let active = dir.path().join("a.jsonl");
        let deleted = enforce_total_budget(dir.path(), 90, &active).expect("pruned");
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].ends_with("b.jsonl"));
        assert!(active.exists());
        assert!(dir.path().join("tutorials.json").exists());
    }
}
