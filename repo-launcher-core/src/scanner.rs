//! Classifies package-manager output lines while a requirements file that
//! pulls in the large artifact is being installed.
//!
//! ```text
//! Idle --collecting <artifact>--> CollectingArtifact
//! CollectingArtifact --using cached--> Idle            (ScanEvent::CacheHit)
//! CollectingArtifact --downloading <url> (...)-->      (ScanEvent::DownloadDetected)
//! CollectingArtifact --downloading <name>.metadata--> CollectingArtifact
//! CollectingArtifact --downloading <bare file name>--> Idle
//! ```
//!
//! A bare file name (no scheme) cannot be fetched by us, so pip is left to
//! download it itself.
//!
//! Matching is case-insensitive; the URL is taken from the unmodified line so
//! its case survives.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::LauncherError;

const COLLECTING_TOKEN: &str = "collecting";
const CACHED_TOKEN: &str = "using cached";
const DOWNLOADING_TOKEN: &str = "downloading";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    CollectingArtifact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Nothing of interest on this line.
    Nothing,
    /// The package manager started resolving the artifact.
    CollectingStarted,
    /// A locally cached copy will be used; no interception needed.
    CacheHit,
    /// The package manager is about to download the artifact from this URL.
    DownloadDetected(String),
}

#[derive(Debug, Clone)]
pub struct ArtifactScanner {
    collecting_marker: String,
    state: ScanState,
}

impl ArtifactScanner {
    pub fn new(artifact_name: &str) -> Self {
        Self {
            collecting_marker: format!("{COLLECTING_TOKEN} {}", artifact_name.to_lowercase()),
            state: ScanState::Idle,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Feed one output line and advance the state machine.
    pub fn feed(&mut self, line: &str) -> ScanEvent {
        let lowered = line.trim().to_lowercase();

        let mut event = ScanEvent::Nothing;
        if is_collecting(&lowered, &self.collecting_marker) {
            self.state = ScanState::CollectingArtifact;
            event = ScanEvent::CollectingStarted;
        }

        if self.state == ScanState::CollectingArtifact {
            if lowered.contains(CACHED_TOKEN) {
                self.state = ScanState::Idle;
                return ScanEvent::CacheHit;
            }
            if let Some(url) = extract_download_url(line) {
                if url.to_lowercase().ends_with(".metadata") {
                    return event;
                }
                if Url::parse(&url).is_err() {
                    self.state = ScanState::Idle;
                    return event;
                }
                return ScanEvent::DownloadDetected(url);
            }
        }

        event
    }
}

fn is_collecting(lowered: &str, marker: &str) -> bool {
    lowered.contains(marker)
}

/// Text between the `downloading` token and the first following `(`.
pub fn extract_download_url(line: &str) -> Option<String> {
    let lowered = line.to_lowercase();
    let start = lowered.find(DOWNLOADING_TOKEN)? + DOWNLOADING_TOKEN.len();
    // Lowercasing can change byte lengths for non-ASCII text; fall back to the
    // lowered line in that case rather than slicing at a wrong boundary.
    let source = if lowered.len() == line.len() { line } else { lowered.as_str() };
    let rest = &source[start..];
    let end = rest.find('(').unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

/// Percent-decoded final path segment of an artifact URL.
pub fn artifact_file_name(url: &str) -> Result<String, LauncherError> {
    let parsed = Url::parse(url).map_err(|_| LauncherError::InvalidArtifactUrl(url.to_string()))?;
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| LauncherError::InvalidArtifactUrl(url.to_string()))?;
    let decoded = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|_| LauncherError::InvalidArtifactUrl(url.to_string()))?;
    Ok(decoded.into_owned())
}
