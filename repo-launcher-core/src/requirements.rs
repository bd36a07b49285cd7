//! Reading dependency declaration files into an ordered specifier list.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::LauncherError;

/// One declared dependency. Identity is its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackageSpecifier {
    /// A version-constrained package name, passed to the package manager as is.
    Direct(String),
    /// `-r <path>`: a nested requirements file, installed as one unit.
    FileReference(PathBuf),
}

impl PackageSpecifier {
    /// Name part of a direct specifier: text before the first version operator character.
    pub fn package_name(&self) -> String {
        match self {
            PackageSpecifier::Direct(spec) => {
                let cut = spec.find(&['=', '~', '>', '<', '!'][..]).unwrap_or(spec.len());
                spec[..cut].trim().to_string()
            }
            PackageSpecifier::FileReference(path) => path.display().to_string(),
        }
    }

    pub fn is_file_reference(&self) -> bool {
        matches!(self, PackageSpecifier::FileReference(_))
    }
}

impl fmt::Display for PackageSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSpecifier::Direct(spec) => f.write_str(spec),
            PackageSpecifier::FileReference(path) => write!(f, "-r {}", path.display()),
        }
    }
}

/// Parse the contents of one requirements file.
///
/// `source` is the file the text came from; relative `-r` paths are resolved
/// against its directory.
pub fn parse_requirements(source: &Path, text: &str) -> Result<Vec<PackageSpecifier>, LauncherError> {
    let base = source.parent().unwrap_or_else(|| Path::new(""));
    let mut specifiers = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        match file_reference_target(line) {
            Some("") => {
                return Err(LauncherError::RequirementsParseError {
                    path: source.to_path_buf(),
                    reason: format!("line {}: file reference without a path", index + 1),
                });
            }
            Some(target) => {
                let target = Path::new(target);
                let path = if target.is_absolute() {
                    target.to_path_buf()
                } else {
                    base.join(target)
                };
                specifiers.push(PackageSpecifier::FileReference(path));
            }
            None => specifiers.push(PackageSpecifier::Direct(line.to_string())),
        }
    }

    Ok(specifiers)
}

/// `Some(path)` when the line is a `-r`/`--requirement` reference.
fn file_reference_target(line: &str) -> Option<&str> {
    for flag in ["--requirement", "-r"] {
        if let Some(rest) = line.strip_prefix(flag) {
            if rest.is_empty() {
                return Some("");
            }
            if let Some(value) = rest.strip_prefix('=') {
                return Some(value.trim());
            }
            if rest.starts_with(char::is_whitespace) {
                return Some(rest.trim());
            }
            // "-rfoo.txt" is pip shorthand too.
            if flag == "-r" {
                return Some(rest.trim());
            }
        }
    }
    None
}

/// Produces the specifier list for a checked-out repository.
#[derive(Debug, Clone)]
pub struct RequirementsResolver {
    requirements_file: String,
    artifact_requirements_file: String,
}

impl RequirementsResolver {
    pub fn new(requirements_file: impl Into<String>, artifact_requirements_file: impl Into<String>) -> Self {
        Self {
            requirements_file: requirements_file.into(),
            artifact_requirements_file: artifact_requirements_file.into(),
        }
    }

    /// The artifact requirements file comes first as a single file reference,
    /// followed by the lines of the main requirements file. Missing files
    /// contribute nothing.
    pub fn resolve(&self, repo_dir: &Path) -> Result<Vec<PackageSpecifier>, LauncherError> {
        let mut specifiers = Vec::new();

        let artifact_file = repo_dir.join(&self.artifact_requirements_file);
        if artifact_file.is_file() {
            debug!(path = %artifact_file.display(), "Found artifact requirements file");
            specifiers.push(PackageSpecifier::FileReference(artifact_file));
        }

        let requirements = repo_dir.join(&self.requirements_file);
        if let Some(text) = read_optional(&requirements)? {
            specifiers.extend(parse_requirements(&requirements, &text)?);
        }

        info!(
            repo_dir = %repo_dir.display(),
            count = specifiers.len(),
            "Resolved package specifiers"
        );
        Ok(specifiers)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, LauncherError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LauncherError::RequirementsParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn strips_comments_and_blank_lines_preserving_order() {
        let text = "\
# leading comment
requests
numpy==1.26.4   # pinned

   pydub~=0.25
websockets>11
";
        let specs = parse_requirements(Path::new("requirements.txt"), text).unwrap();
        assert_eq!(
            specs,
            vec![
                PackageSpecifier::Direct("requests".into()),
                PackageSpecifier::Direct("numpy==1.26.4".into()),
                PackageSpecifier::Direct("pydub~=0.25".into()),
                PackageSpecifier::Direct("websockets>11".into()),
            ]
        );
    }

    #[test]
    fn file_references_stay_single_entries() {
        let text = "-r extra.txt\n--requirement=/abs/other.txt\nflask\n-rshort.txt\n";
        let specs = parse_requirements(Path::new("/repo/requirements.txt"), text).unwrap();
        assert_eq!(
            specs,
            vec![
                PackageSpecifier::FileReference(PathBuf::from("/repo/extra.txt")),
                PackageSpecifier::FileReference(PathBuf::from("/abs/other.txt")),
                PackageSpecifier::Direct("flask".into()),
                PackageSpecifier::FileReference(PathBuf::from("/repo/short.txt")),
            ]
        );
    }

    #[test]
    fn file_reference_without_path_is_a_parse_error() {
        let err = parse_requirements(Path::new("req.txt"), "flask\n-r   # nothing\n").unwrap_err();
        match err {
            LauncherError::RequirementsParseError { reason, .. } => assert!(reason.contains("line 2")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn package_name_cuts_at_first_operator() {
        assert_eq!(PackageSpecifier::Direct("numpy==1.2".into()).package_name(), "numpy");
        assert_eq!(PackageSpecifier::Direct("googletrans~=4.0.0rc1".into()).package_name(), "googletrans");
        assert_eq!(PackageSpecifier::Direct("requests".into()).package_name(), "requests");
        assert_eq!(PackageSpecifier::Direct("a>=1".into()).package_name(), "a");
        assert_eq!(PackageSpecifier::Direct("b<2".into()).package_name(), "b");
        assert_eq!(PackageSpecifier::Direct("c != 3".into()).package_name(), "c");
    }

    #[test]
    fn display_is_the_textual_form() {
        assert_eq!(PackageSpecifier::Direct("x==1".into()).to_string(), "x==1");
        assert_eq!(
            PackageSpecifier::FileReference(PathBuf::from("req-torch.txt")).to_string(),
            "-r req-torch.txt"
        );
    }

    #[test]
    fn resolver_puts_artifact_file_first() {
        let repo = tempdir().unwrap();
        fs::write(repo.path().join("requirements.txt"), "flask\nrequests # http\n").unwrap();
        fs::write(repo.path().join("requirements-torch.txt"), "torch==2.1.0\n").unwrap();

        let resolver = RequirementsResolver::new("requirements.txt", "requirements-torch.txt");
        let specs = resolver.resolve(repo.path()).unwrap();
        assert_eq!(
            specs,
            vec![
                PackageSpecifier::FileReference(repo.path().join("requirements-torch.txt")),
                PackageSpecifier::Direct("flask".into()),
                PackageSpecifier::Direct("requests".into()),
            ]
        );
    }

    #[test]
    fn resolver_yields_nothing_without_declaration_files() {
        let repo = tempdir().unwrap();
        let resolver = RequirementsResolver::new("requirements.txt", "requirements-torch.txt");
        assert!(resolver.resolve(repo.path()).unwrap().is_empty());
    }

    #[test]
    fn non_utf8_requirements_file_is_a_parse_error() {
        let repo = tempdir().unwrap();
        fs::write(repo.path().join("requirements.txt"), [0xff, 0xfe, 0x00]).unwrap();
        let resolver = RequirementsResolver::new("requirements.txt", "requirements-torch.txt");
        assert!(matches!(
            resolver.resolve(repo.path()),
            Err(LauncherError::RequirementsParseError { .. })
        ));
    }
}
