//! Retrieval of NCBI BLAST nucleotide database archives.
//!
//! Only the transfer itself lives here: listing the published `nt.*.tar.gz`
//! parts and copying them into a local directory. Every failure is reported
//! as [`PipelineError::Retrieval`]; nothing is retried.

use crate::error::{PipelineError, Result};
use log::{info, warn};
use reqwest::blocking::Client;
use reqwest::header;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory index of the NCBI BLAST databases.
pub const NCBI_BLAST_DB_URL: &str = "https://ftp.ncbi.nlm.nih.gov/blast/db/";

/// Name prefix of the nucleotide (nt) database parts.
pub const NT_ARCHIVE_PREFIX: &str = "nt.";

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// A remote collection of database archives.
pub trait ArchiveSource {
    /// Archive file names, in the order the source publishes them.
    fn list_archives(&self) -> Result<Vec<String>>;

    /// Copies one archive to `destination`, returning the bytes written.
    fn fetch(&self, name: &str, destination: &Path) -> Result<u64>;
}

/// Archives served from an HTTP(S) directory listing.
pub struct HttpArchiveSource {
    /// HTTP client
    client: Client,

    /// Directory URL, always ending in '/'
    base_url: String,

    prefix: String,
}

impl HttpArchiveSource {
    pub fn new(base_url: &str, prefix: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("marker-fingerprint/0.1"),
        );

        // Whole-archive transfers of several GB; only the connect phase is bounded.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(60))
            .timeout(None)
            .build()?;

        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Ok(HttpArchiveSource {
            client,
            base_url,
            prefix: prefix.to_string(),
        })
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn list_archives(&self) -> Result<Vec<String>> {
        info!("Listing archives at {}", self.base_url);
        let response = self.client.get(&self.base_url).send()?;
        if !response.status().is_success() {
            return Err(PipelineError::Retrieval(format!(
                "listing {} failed with status {}",
                self.base_url,
                response.status()
            )));
        }
        let body = response.text()?;
        Ok(parse_archive_listing(&body, &self.prefix, ARCHIVE_SUFFIX))
    }

    fn fetch(&self, name: &str, destination: &Path) -> Result<u64> {
        let url = format!("{}{}", self.base_url, name);
        let mut response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(PipelineError::Retrieval(format!(
                "download of {} failed with status {}",
                url,
                response.status()
            )));
        }
        let mut file = File::create(destination).map_err(|e| {
            PipelineError::Retrieval(format!("cannot create {}: {}", destination.display(), e))
        })?;
        Ok(response.copy_to(&mut file)?)
    }
}

/// Extracts archive names from an HTML directory index.
///
/// Keeps `href` targets whose file name starts with `prefix` and ends with
/// `suffix`, in page order, without duplicates.
pub fn parse_archive_listing(html: &str, prefix: &str, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for fragment in html.split("href=").skip(1) {
        let fragment = fragment.trim_start_matches(|c: char| c == '"' || c == '\'');
        let target = match fragment.find(|c: char| c == '"' || c == '\'' || c == '>' || c == ' ') {
            Some(end) => &fragment[..end],
            None => fragment,
        };
        let name = target.rsplit('/').next().unwrap_or(target);
        if name.starts_with(prefix)
            && name.ends_with(suffix)
            && !names.iter().any(|known| known == name)
        {
            names.push(name.to_string());
        }
    }
    names
}

/// Downloads up to `limit` archives from `source` into `dest_dir`.
///
/// # Arguments
///
/// * `source` - Where the archives are published.
/// * `dest_dir` - Local directory; created if missing.
/// * `limit` - Maximum number of archives, `None` for all of them.
///
/// # Returns
///
/// * `Result<Vec<PathBuf>>` - Local paths of the downloaded archives.
pub fn retrieve_archives<S: ArchiveSource + ?Sized>(
    source: &S,
    dest_dir: &Path,
    limit: Option<usize>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest_dir).map_err(|e| {
        PipelineError::Retrieval(format!("cannot create {}: {}", dest_dir.display(), e))
    })?;

    let available = source.list_archives()?;
    info!("Found {} database archives", available.len());
    let selected: Vec<&String> = match limit {
        Some(limit) => {
            info!("Downloading the first {} archives", limit);
            available.iter().take(limit).collect()
        }
        None => available.iter().collect(),
    };

    let mut downloaded = Vec::with_capacity(selected.len());
    for (i, name) in selected.iter().enumerate() {
        let local_path = dest_dir.join(name.as_str());
        info!("Downloading file {}/{}: {}", i + 1, selected.len(), name);
        match source.fetch(name, &local_path) {
            Ok(bytes) => {
                info!("  {} ({} MB)", name, bytes / (1024 * 1024));
                downloaded.push(local_path);
            }
            Err(e) => {
                // Leave no truncated archive for the merge step to pick up.
                if local_path.exists() {
                    if let Err(rm) = fs::remove_file(&local_path) {
                        warn!("Could not remove partial download {}: {}", local_path.display(), rm);
                    }
                }
                return Err(match e {
                    PipelineError::Retrieval(_) => e,
                    other => PipelineError::Retrieval(other.to_string()),
                });
            }
        }
    }

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    struct FakeSource {
        names: Vec<String>,
        fail_on: Option<String>,
        fetched: RefCell<Vec<String>>,
    }

    impl FakeSource {
        fn new(names: &[&str]) -> Self {
            FakeSource {
                names: names.iter().map(|s| s.to_string()).collect(),
                fail_on: None,
                fetched: RefCell::new(Vec::new()),
            }
        }
    }

    impl ArchiveSource for FakeSource {
        fn list_archives(&self) -> Result<Vec<String>> {
            Ok(self.names.clone())
        }

        fn fetch(&self, name: &str, destination: &Path) -> Result<u64> {
            self.fetched.borrow_mut().push(name.to_string());
            fs::write(destination, b"partial")?;
            if self.fail_on.as_deref() == Some(name) {
                return Err(PipelineError::Retrieval("connection reset".to_string()));
            }
            Ok(7)
        }
    }

    #[test]
    fn test_parse_archive_listing() {
        let html = r#"<html><body>
            <a href="nt.000.tar.gz">nt.000.tar.gz</a>
            <a href="nt.000.tar.gz.md5">nt.000.tar.gz.md5</a>
            <a href='/blast/db/nt.001.tar.gz'>nt.001.tar.gz</a>
            <a href="nr.000.tar.gz">nr.000.tar.gz</a>
            <a href="nt.000.tar.gz">again</a>
        </body></html>"#;

        let names = parse_archive_listing(html, NT_ARCHIVE_PREFIX, ARCHIVE_SUFFIX);
        assert_eq!(names, vec!["nt.000.tar.gz", "nt.001.tar.gz"]);
    }

    #[test]
    fn test_retrieve_respects_limit() {
        let dir = tempdir().unwrap();
        let source = FakeSource::new(&["nt.000.tar.gz", "nt.001.tar.gz", "nt.002.tar.gz"]);

        let paths = retrieve_archives(&source, &dir.path().join("db"), Some(2)).unwrap();

        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.exists()));
        assert_eq!(*source.fetched.borrow(), vec!["nt.000.tar.gz", "nt.001.tar.gz"]);
    }

    #[test]
    fn test_failed_download_is_retrieval_error_without_partial_file() {
        let dir = tempdir().unwrap();
        let mut source = FakeSource::new(&["nt.000.tar.gz", "nt.001.tar.gz"]);
        source.fail_on = Some("nt.001.tar.gz".to_string());

        let result = retrieve_archives(&source, dir.path(), None);

        assert!(matches!(result, Err(PipelineError::Retrieval(_))));
        assert!(dir.path().join("nt.000.tar.gz").exists());
        assert!(!dir.path().join("nt.001.tar.gz").exists());
    }
}
