use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::core::{
    error::{HarnessErrorKind, Result},
    utils::contains_ignore_case,
};

/// A directory of problems sharing one domain definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub path: PathBuf,
    pub domain_file: Option<PathBuf>,
    pub problems: Vec<Problem>,
}

/// A single problem file. Maps to exactly one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub stem: String,
    pub path: PathBuf,
}

impl Problem {
    /// `output_root/<domain>/<stem>`
    pub fn output_dir(&self, output_root: &Path, domain: &Domain) -> PathBuf {
        output_root.join(&domain.name).join(&self.stem)
    }

    /// `output_root/<domain>/<stem>/<stem>.csv`
    pub fn report_path(&self, output_root: &Path, domain: &Domain) -> PathBuf {
        self.output_dir(output_root, domain)
            .join(format!("{}.csv", self.stem))
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.stem.clone())
    }
}

/// Find every domain directory under `input_dir`, sorted by path. Files whose
/// name contains `marker` (case-insensitive) are domain definitions; every
/// other file with `extension` is a problem.
pub fn find_domains(input_dir: &Path, extension: &str, marker: &str) -> Result<Vec<Domain>> {
    if !input_dir.is_dir() {
        return Err(HarnessErrorKind::InputDirectoryNotFound {
            path: input_dir.to_path_buf(),
        }
        .into());
    }

    let mut domain_dirs: Vec<PathBuf> = fs::read_dir(input_dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && !is_hidden(path))
        .collect();
    domain_dirs.sort();

    let mut domains = Vec::with_capacity(domain_dirs.len());
    for dir in domain_dirs {
        domains.push(scan_domain(&dir, extension, marker)?);
    }

    tracing::info!(
        "Found {} domain(s) with {} problem(s)",
        domains.iter().filter(|d| !d.problems.is_empty()).count(),
        domains.iter().map(|d| d.problems.len()).sum::<usize>()
    );

    Ok(domains)
}

fn scan_domain(dir: &Path, extension: &str, marker: &str) -> Result<Domain> {
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    let search_pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(extension)
    );

    let mut files: Vec<PathBuf> = glob::glob(&search_pattern)?
        .filter_map(std::result::Result::ok)
        .filter(|path| path.is_file() && !is_hidden(path))
        .collect();
    files.sort();

    let mut domain_file = None;
    let mut problems = Vec::new();

    for path in files {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        if contains_ignore_case(&file_name, marker) {
            if domain_file.is_none() {
                domain_file = Some(path);
            } else {
                tracing::debug!("Ignoring extra domain definition {}", path.display());
            }
            continue;
        }

        let stem = path
            .file_stem()
            .ok_or_else(|| HarnessErrorKind::InvalidProblemFileName { path: path.clone() })?
            .to_string_lossy()
            .to_string();

        problems.push(Problem { stem, path });
    }

    tracing::debug!("Domain {name}: {} problem(s)", problems.len());
    for problem in &problems {
        tracing::debug!("  - {}", problem.file_name());
    }

    Ok(Domain {
        name,
        path: dir.to_path_buf(),
        domain_file,
        problems,
    })
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "(define)").unwrap();
    }

    #[test]
    fn test_domains_and_problems_sorted() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("transport/domain.hddl"));
        touch(&root.path().join("transport/p02.hddl"));
        touch(&root.path().join("transport/p01.hddl"));
        touch(&root.path().join("rover/Rover-Domain.hddl"));
        touch(&root.path().join("rover/pfile1.hddl"));
        touch(&root.path().join("rover/notes.txt"));
        touch(&root.path().join("readme.hddl"));

        let domains = find_domains(root.path(), "hddl", "domain").unwrap();
        let names: Vec<&str> = domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["rover", "transport"]);

        let rover = &domains[0];
        assert_eq!(
            rover.domain_file.as_deref(),
            Some(root.path().join("rover/Rover-Domain.hddl").as_path())
        );
        assert_eq!(rover.problems.len(), 1);
        assert_eq!(rover.problems[0].stem, "pfile1");

        let stems: Vec<&str> = domains[1].problems.iter().map(|p| p.stem.as_str()).collect();
        assert_eq!(stems, vec!["p01", "p02"]);
    }

    #[test]
    fn test_domain_only_directory_has_no_problems() {
        let root = TempDir::new().unwrap();
        touch(&root.path().join("blocks/domain.hddl"));

        let domains = find_domains(root.path(), "hddl", "domain").unwrap();
        assert_eq!(domains.len(), 1);
        assert!(domains[0].problems.is_empty());
        assert!(domains[0].domain_file.is_some());
    }

    #[test]
    fn test_missing_input_dir() {
        let root = TempDir::new().unwrap();
        assert!(find_domains(&root.path().join("absent"), "hddl", "domain").is_err());
    }

    #[test]
    fn test_report_path() {
        let domain = Domain {
            name: "rover".to_string(),
            path: PathBuf::from("/in/rover"),
            domain_file: None,
            problems: Vec::new(),
        };
        let problem = Problem {
            stem: "p01".to_string(),
            path: PathBuf::from("/in/rover/p01.hddl"),
        };

        assert_eq!(
            problem.report_path(Path::new("/out"), &domain),
            PathBuf::from("/out/rover/p01/p01.csv")
        );
        assert_eq!(problem.file_name(), "p01.hddl");
    }
}
