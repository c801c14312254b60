//! Zip extraction with entry-name encoding auto-detection

use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::{Component, Path, PathBuf};

use encoding_rs::Encoding;
use serde::Serialize;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::archive::encoding::{decode_name, EncodingCandidates};
use crate::errors::AgentError;
use crate::filesys::tree::remove_file_forced;

/// Outcome of an extraction
#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    /// Files written
    pub files: usize,

    /// Directory-only entries created
    pub directories: usize,

    /// Encoding used for entry names
    pub encoding: String,
}

/// Unpacks zip archives into a destination directory
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    candidates: EncodingCandidates,
}

impl Extractor {
    pub fn new(candidates: EncodingCandidates) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &EncodingCandidates {
        &self.candidates
    }

    /// Extract an archive stored on disk
    pub fn extract_file(&self, archive: &Path, dest: &Path) -> Result<ExtractReport, AgentError> {
        let file = fs::File::open(archive).map_err(|e| {
            AgentError::ExtractError(format!("Unable to open {}: {}", archive.display(), e))
        })?;
        self.extract(file, dest)
    }

    /// Extract from a stream that cannot seek; it is buffered fully in memory
    /// because every encoding trial rereads the listing from the start.
    pub fn extract_stream<R: Read>(&self, mut reader: R, dest: &Path) -> Result<ExtractReport, AgentError> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        self.extract(Cursor::new(buffer), dest)
    }

    /// Extract every entry of `reader` into `dest`, creating parent
    /// directories and overwriting existing files.
    pub fn extract<R: Read + Seek>(&self, reader: R, dest: &Path) -> Result<ExtractReport, AgentError> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| AgentError::ExtractError(format!("Unable to open archive: {}", e)))?;

        let raw_names = read_raw_names(&mut archive)?;
        let encoding = self.choose_encoding(&raw_names)?;
        info!(
            entries = raw_names.len(),
            encoding = encoding.name(),
            dest = %dest.display(),
            "Extracting archive"
        );

        fs::create_dir_all(dest)?;

        let mut report = ExtractReport {
            files: 0,
            directories: 0,
            encoding: encoding.name().to_string(),
        };

        for (index, raw) in raw_names.iter().enumerate() {
            let name = decode_name(raw, encoding).ok_or_else(|| {
                AgentError::ExtractError(format!(
                    "Entry {} is not valid {}",
                    index,
                    encoding.name()
                ))
            })?;
            let (relative, is_dir) = entry_relative_path(&name)?;
            if relative.as_os_str().is_empty() {
                continue;
            }

            let path = dest.join(&relative);
            if is_dir {
                fs::create_dir_all(&path)?;
                report.directories += 1;
                continue;
            }

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            if path.is_file() {
                remove_file_forced(&path)?;
            }

            let mut entry = archive.by_index(index)?;
            let mut out = fs::File::create(&path)?;
            std::io::copy(&mut entry, &mut out)?;
            report.files += 1;
            debug!("Extracted: {}", name);
        }

        Ok(report)
    }

    /// First candidate under which every entry name decodes cleanly
    fn choose_encoding(&self, raw_names: &[Vec<u8>]) -> Result<&'static Encoding, AgentError> {
        let mut last_error = String::from("no candidate encodings configured");

        for encoding in self.candidates.iter() {
            let rejected = raw_names
                .iter()
                .find(|raw| decode_name(raw, encoding).is_none());

            match rejected {
                None => return Ok(encoding),
                Some(raw) => {
                    last_error = format!(
                        "entry name {:?} is not valid under {}",
                        String::from_utf8_lossy(raw),
                        encoding.name()
                    );
                    debug!("{}", last_error);
                }
            }
        }

        Err(AgentError::ExtractError(last_error))
    }
}

fn read_raw_names<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<Vec<u8>>, AgentError> {
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        names.push(entry.name_raw().to_vec());
    }
    Ok(names)
}

/// Turn a decoded entry name into a path relative to the destination.
///
/// Backslashes count as separators. Absolute names and `..` components are
/// rejected so no entry lands outside the destination. The flag is true for
/// directory-only entries (empty leaf name).
pub fn entry_relative_path(name: &str) -> Result<(PathBuf, bool), AgentError> {
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(AgentError::ExtractError(format!(
            "Entry has an absolute path: {}",
            name
        )));
    }

    let is_dir = normalized.ends_with('/');
    let mut relative = PathBuf::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(AgentError::ExtractError(format!(
                    "Entry escapes the destination: {}",
                    name
                )))
            }
            part => {
                let plain = Path::new(part)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)));
                if !plain {
                    return Err(AgentError::ExtractError(format!(
                        "Entry has an invalid path component: {}",
                        name
                    )));
                }
                relative.push(part);
            }
        }
    }

    Ok((relative, is_dir))
}
