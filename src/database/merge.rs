//! Turning downloaded BLAST database archives into one FASTA file.
//!
//! The binary database format is only readable by the BLAST+ tools, so the
//! merge itself is delegated to `blastdbcmd`. A non-zero exit status from the
//! tool is a [`PipelineError::MergeTool`], never ignored.

use super::downloader::ARCHIVE_SUFFIX;
use crate::error::{PipelineError, Result};
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tar::Archive;

/// External tool converting BLAST databases to FASTA.
pub const DEFAULT_MERGE_TOOL: &str = "blastdbcmd";

/// One database part: the downloaded archive and the base name its
/// extracted volume files share (e.g. `db/nt.000` for `db/nt.000.nsq`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePart {
    pub archive: PathBuf,
    pub base: PathBuf,
}

/// Unpacks every `*.tar.gz` archive in `dir` into `dir`.
///
/// # Returns
///
/// * `Result<Vec<DatabasePart>>` - Parts sorted by archive name. An `Io`
///   `NotFound` error if the directory holds no archives.
pub fn extract_archives(dir: &Path) -> Result<Vec<DatabasePart>> {
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.ends_with(ARCHIVE_SUFFIX))
        })
        .collect();
    archives.sort();

    if archives.is_empty() {
        return Err(PipelineError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {} archives found in {}", ARCHIVE_SUFFIX, dir.display()),
        )));
    }
    let total = archives.len();
    info!("Found {} archives to extract", total);

    let mut parts = Vec::with_capacity(total);
    for (i, archive_path) in archives.into_iter().enumerate() {
        let name = archive_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        info!("  - Extracting ({}/{}): {}", i + 1, total, name);

        let file = File::open(&archive_path)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive.unpack(dir).map_err(|e| {
            PipelineError::Io(io::Error::new(
                e.kind(),
                format!("cannot extract {}: {}", archive_path.display(), e),
            ))
        })?;

        let base = dir.join(name.trim_end_matches(ARCHIVE_SUFFIX));
        parts.push(DatabasePart {
            archive: archive_path,
            base,
        });
    }

    Ok(parts)
}

/// Runs `tool -db "<parts>" -entry all -out <output> -long_seqids`.
pub fn merge_database(tool: &str, parts: &[DatabasePart], output: &Path) -> Result<()> {
    if parts.is_empty() {
        return Err(PipelineError::InvalidParameter(
            "no database parts to merge".to_string(),
        ));
    }
    let db_list = parts
        .iter()
        .map(|part| part.base.display().to_string())
        .collect::<Vec<_>>()
        .join(" ");

    info!("Running {} to merge {} database parts", tool, parts.len());
    debug!("{} -db \"{}\" -out {}", tool, db_list, output.display());

    let result = Command::new(tool)
        .arg("-db")
        .arg(&db_list)
        .args(["-entry", "all"])
        .arg("-out")
        .arg(output)
        .arg("-long_seqids")
        .output()
        .map_err(|e| PipelineError::MergeTool(format!("cannot run '{}': {}", tool, e)))?;

    if !result.status.success() {
        return Err(PipelineError::MergeTool(format!(
            "'{}' failed ({}): {}",
            tool,
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }

    info!("Merged database written to {}", output.display());
    Ok(())
}

/// Deletes the archives and every extracted volume file (`<base>.*`).
///
/// `keep` is never removed, even if its name matches a part.
pub fn cleanup_parts(parts: &[DatabasePart], keep: &Path) -> Result<usize> {
    let mut removed = 0;
    for part in parts {
        let dir = part.base.parent().unwrap_or_else(|| Path::new("."));
        let stem = match part.base.file_name().and_then(|n| n.to_str()) {
            Some(stem) => format!("{}.", stem),
            None => continue,
        };

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&stem));
            if matches && path.is_file() && path != keep {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Could not remove {}: {}", path.display(), e),
                }
            }
        }
    }
    info!("Removed {} intermediate files", removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    // Helper function to create a .tar.gz holding the given files
    fn create_archive(path: &Path, files: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_extract_archives_returns_sorted_parts() {
        let dir = tempdir().unwrap();
        create_archive(&dir.path().join("nt.001.tar.gz"), &[("nt.001.nsq", b"seq")]);
        create_archive(
            &dir.path().join("nt.000.tar.gz"),
            &[("nt.000.nsq", b"seq"), ("nt.000.nhr", b"hdr")],
        );

        let parts = extract_archives(dir.path()).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].base, dir.path().join("nt.000"));
        assert_eq!(parts[1].base, dir.path().join("nt.001"));
        assert!(dir.path().join("nt.000.nhr").exists());
        assert!(dir.path().join("nt.001.nsq").exists());
    }

    #[test]
    fn test_extract_without_archives_is_not_found() {
        let dir = tempdir().unwrap();
        match extract_archives(dir.path()) {
            Err(PipelineError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_tool_is_merge_error() {
        let dir = tempdir().unwrap();
        let parts = vec![DatabasePart {
            archive: dir.path().join("nt.000.tar.gz"),
            base: dir.path().join("nt.000"),
        }];
        let result = merge_database(
            "definitely-not-an-installed-tool",
            &parts,
            &dir.path().join("out.fasta"),
        );
        assert!(matches!(result, Err(PipelineError::MergeTool(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_merge_error() {
        let dir = tempdir().unwrap();
        let parts = vec![DatabasePart {
            archive: dir.path().join("nt.000.tar.gz"),
            base: dir.path().join("nt.000"),
        }];
        let out = dir.path().join("out.fasta");

        assert!(matches!(
            merge_database("false", &parts, &out),
            Err(PipelineError::MergeTool(_))
        ));
        assert!(merge_database("true", &parts, &out).is_ok());
    }

    #[test]
    fn test_cleanup_keeps_merged_output() {
        let dir = tempdir().unwrap();
        create_archive(&dir.path().join("nt.000.tar.gz"), &[("nt.000.nsq", b"seq")]);
        let parts = extract_archives(dir.path()).unwrap();
        let merged = dir.path().join("combined_nt.fasta");
        fs::write(&merged, ">a\nACGT\n").unwrap();

        let removed = cleanup_parts(&parts, &merged).unwrap();

        assert_eq!(removed, 2);
        assert!(!dir.path().join("nt.000.tar.gz").exists());
        assert!(!dir.path().join("nt.000.nsq").exists());
        assert!(merged.exists());
    }
}
