//! Small helpers shared across the harness.

use std::{path::Path, time::Duration};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Helper function to turn a Duration into a nicely formatted string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{total_secs}s")
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{mins}m{secs}s")
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        format!("{hours}h{mins}m")
    }
}

/// Check if a file is an executable.
pub fn is_executable(path: &Path) -> bool {
    // On unix, check the 'execute' permission bit
    #[cfg(unix)]
    {
        fs::metadata(path).is_ok_and(|metadata| {
            metadata.is_file() && (metadata.permissions().mode() & 0o111 != 0)
        })
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Case-insensitive substring test.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "59s");
        assert_eq!(format_duration(Duration::from_secs(61)), "1m1s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1m");
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Domain.hddl", "domain"));
        assert!(contains_ignore_case("p01.HDDL", "hddl"));
        assert!(!contains_ignore_case("p01.hddl", "domain"));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_executable() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("planner.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(!is_executable(&script));

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&script));
        assert!(!is_executable(dir.path()));
    }
}
