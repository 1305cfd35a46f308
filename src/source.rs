use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::time::Instant;
use tracing::{error, info};

use crate::domain::TVError;
use crate::store::Dataset;

/// Expand `~` and environment variables in a user supplied location.
pub fn expand_location(location: &str) -> PathBuf {
    match shellexpand::full(location) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(location),
    }
}

/// Read the raw CSV text behind `location`.
pub fn fetch(location: &str) -> Result<String, TVError> {
    let path = expand_location(location);
    let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => TVError::FileNotFound,
        ErrorKind::PermissionDenied => TVError::PermissionDenied,
        _ => TVError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(TVError::LoadingFailed("Not a file!".into()));
    }

    fs::read_to_string(&path).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => TVError::PermissionDenied,
        ErrorKind::InvalidData => TVError::LoadingFailed("File is not valid UTF-8".into()),
        _ => TVError::IoError(e),
    })
}

/// Fetch and parse in one step.
pub fn load(location: &str) -> Result<Dataset, TVError> {
    let start_time = Instant::now();
    let raw = fetch(location)?;
    let dataset = Dataset::load(&raw)?;
    info!(
        "Loaded {} rows x {} columns from {location} in {}ms",
        dataset.len(),
        dataset.columns().len(),
        start_time.elapsed().as_millis()
    );
    Ok(dataset)
}

/// Run [`load`] on the rayon pool. The receiver yields exactly one result.
pub fn spawn_load(location: String) -> Receiver<Result<Dataset, TVError>> {
    let (tx, rx) = mpsc::channel();
    rayon::spawn(move || {
        let result = load(&location);
        if let Err(e) = &result {
            error!("Loading {location} failed: {e}");
        }
        // The receiver is gone when the session quit before loading finished.
        let _ = tx.send(result);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fetch_missing_file_is_fetch_error() {
        let err = fetch("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, TVError::FileNotFound));
        assert!(err.is_fetch());
    }

    #[test]
    fn fetch_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetch(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, TVError::LoadingFailed(_)));
    }

    #[test]
    fn load_reads_and_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "id,entity_type\n1,person\n2,company\n").unwrap();

        let dataset = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.columns(), &["id".to_string(), "entity_type".to_string()]);
    }

    #[test]
    fn spawn_load_reports_failure_through_channel() {
        let rx = spawn_load("/definitely/not/here.csv".to_string());
        let result = rx.recv().unwrap();
        assert!(result.is_err());
    }
}
