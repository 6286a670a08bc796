use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

pub const DEFAULT_DAYS_TO_LOOK_BACK: i64 = 7;
const MAX_DAYS_TO_LOOK_BACK: i64 = 1_000_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    #[serde(default)]
    pub directories: Vec<String>,
    /// Values of zero or less mean [`DEFAULT_DAYS_TO_LOOK_BACK`].
    #[serde(default)]
    pub days_to_look_back: i64,
}

impl ScanRequest {
    pub fn effective_days(&self) -> i64 {
        if self.days_to_look_back <= 0 {
            DEFAULT_DAYS_TO_LOOK_BACK
        } else {
            self.days_to_look_back.min(MAX_DAYS_TO_LOOK_BACK)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub path: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Scan relative to the current time.
pub fn scan(request: &ScanRequest) -> Vec<FileInfo> {
    scan_at(request, Utc::now())
}

/// Files under `request.directories` modified at most `effective_days()`
/// before `now`, newest first.  A directory that fails part-way keeps what
/// was found before the failure.
pub fn scan_at(request: &ScanRequest, now: DateTime<Utc>) -> Vec<FileInfo> {
    let window = Duration::days(request.effective_days());
    let mut files = Vec::new();
    for dir in &request.directories {
        let before = files.len();
        scan_directory(dir, now, window, &mut files);
        debug!("Scanned {}: {} recent files", dir, files.len() - before);
    }
    files.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    files
}

fn scan_directory(root: &str, now: DateTime<Utc>, window: Duration, out: &mut Vec<FileInfo>) {
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error scanning directory {}: {}", root, e);
                return;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Error scanning directory {}: {}", root, e);
                return;
            }
        };
        let modified: DateTime<Utc> = match metadata.modified() {
            Ok(time) => time.into(),
            Err(e) => {
                warn!("Error scanning directory {}: {}", root, e);
                return;
            }
        };
        if now.signed_duration_since(modified) <= window {
            out.push(FileInfo {
                path: entry.path().to_string_lossy().into_owned(),
                last_modified: modified,
                size: metadata.len(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::path::Path;

    fn touch(path: &Path, contents: &[u8], modified: DateTime<Utc>) {
        std::fs::write(path, contents).unwrap();
        set_file_mtime(path, FileTime::from_unix_time(modified.timestamp(), 0)).unwrap();
    }

    fn request(dirs: &[&Path], days: i64) -> ScanRequest {
        ScanRequest {
            directories: dirs.iter().map(|d| d.to_string_lossy().into_owned()).collect(),
            days_to_look_back: days,
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_window_and_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("old.txt"), b"old", now() - Duration::days(10));
        touch(&dir.path().join("mid.txt"), b"mid!", now() - Duration::days(3));
        touch(&dir.path().join("nested/new.txt"), b"n", now() - Duration::hours(1));

        let files = scan_at(&request(&[dir.path()], 7), now());
        let names: Vec<&str> = files
            .iter()
            .map(|f| Path::new(&f.path).file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["new.txt", "mid.txt"]);
        assert_eq!(files[1].size, 4);
        assert_eq!(files[0].last_modified, now() - Duration::hours(1));
    }

    #[test]
    fn test_non_positive_days_default_to_a_week() {
        assert_eq!(request(&[], 0).effective_days(), 7);
        assert_eq!(request(&[], -3).effective_days(), 7);
        assert_eq!(request(&[], 30).effective_days(), 30);

        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("six.txt"), b"", now() - Duration::days(6));
        touch(&dir.path().join("eight.txt"), b"", now() - Duration::days(8));
        let files = scan_at(&request(&[dir.path()], 0), now());
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("six.txt"));
    }

    #[test]
    fn test_missing_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), b"a", now());
        let missing = dir.path().join("does-not-exist");

        let files = scan_at(&request(&[missing.as_path(), dir.path()], 7), now());
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_nothing_found_serializes_as_empty_array() {
        let files = scan_at(&request(&[], 7), now());
        assert_eq!(serde_json::to_string(&files).unwrap(), "[]");
    }

    #[test]
    fn test_request_and_result_are_camel_case() {
        let req: ScanRequest =
            serde_json::from_str(r#"{"directories":["/tmp"],"daysToLookBack":3}"#).unwrap();
        assert_eq!(req.days_to_look_back, 3);

        let info = FileInfo {
            path: "/tmp/a".into(),
            last_modified: now(),
            size: 1,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("lastModified").is_some());
    }
}
