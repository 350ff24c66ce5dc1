use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::device::Reading;

/// Merge the readings from several result files, ordered by timestamp.
///
/// Files that cannot be loaded are logged and skipped.
pub fn load_many<I, P>(paths: I) -> Vec<Reading>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut all = Vec::new();
    let mut files = 0usize;
    let mut skipped = 0usize;

    for path in paths {
        let path = path.as_ref();
        match super::load(path) {
            Ok(run) => {
                files += 1;
                all.extend(run.readings);
            }
            Err(e) => {
                skipped += 1;
                warn!(path = %path.display(), error = %e, "skipping result file");
            }
        }
    }

    // Stable: equal timestamps keep file order.
    all.sort_by_key(|r| r.timestamp);

    info!(files, skipped, readings = all.len(), "historical data loaded");
    all
}

/// JSON files directly inside `dir`, sorted by name. A directory that does not
/// exist yet holds no results.
pub fn list_results(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "results directory does not exist yet");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::save;
    use crate::storage::tests::sample_run;

    #[test]
    fn test_load_many_merges_in_timestamp_order() {
        let dir = tempfile::tempdir().unwrap();
        let later = dir.path().join("later.json");
        let earlier = dir.path().join("earlier.json");
        save(&sample_run("P-2", 1_700_000_100, &[101.0, 102.0]), &later).unwrap();
        save(&sample_run("P-1", 1_700_000_000, &[100.0, 99.5, 98.0]), &earlier).unwrap();

        let merged = load_many([&later, &earlier]);
        assert_eq!(merged.len(), 5);
        assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(merged[0].device_id, "P-1");
        assert_eq!(merged[4].device_id, "P-2");
    }

    #[test]
    fn test_load_many_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        save(&sample_run("P-1", 1_700_000_000, &[100.0, 100.1]), &good).unwrap();
        std::fs::write(&bad, "[]").unwrap();
        let missing = dir.path().join("missing.json");

        let merged = load_many([bad.as_path(), missing.as_path(), good.as_path()]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_list_results_filters_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = list_results(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_list_results_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = list_results(&dir.path().join("results")).unwrap();
        assert!(files.is_empty());
    }
}
