//! ASC-MHL v2.0 manifest writer (C3).
//!
//! The document shape nests `<lastmodificationdate>` inside `<path>` rather
//! than beside `<xxh64>` — preserved here for compatibility with manifests
//! written by the original tool. The whole tree is re-serialized on every
//! append; this is the behavior to keep, not a shortcut, at the file counts
//! a media transfer produces.

use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::TransferError;
use crate::model::ManifestEntry;

const NAMESPACE: &str = "urn:ASC:MHL:v2.0";
const VERSION: &str = "2.0";
const TOOL_NAME: &str = "TransferBox";

fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".DS_Store".to_string(),
        "ascmhl".to_string(),
        "ascmhl/".to_string(),
    ]
}

/// An ASC-MHL manifest open for incremental extension.
pub struct Manifest {
    pub path: PathBuf,
    target_dir: PathBuf,
    creation_date: DateTime<Local>,
    hostname: String,
    tool_version: String,
    ignore_patterns: Vec<String>,
    entries: Vec<ManifestEntry>,
}

fn iso8601(dt: &DateTime<Local>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

impl Manifest {
    /// Creates `<session_name>.mhl` under `target_dir` with an empty
    /// `<hashes>` section, and fsyncs it.
    pub fn initialize(
        session_name: &str,
        target_dir: &Path,
        tool_version: &str,
    ) -> Result<Manifest, TransferError> {
        if session_name.trim().is_empty() {
            return Err(TransferError::ManifestError {
                message: "session name must not be empty".to_string(),
            });
        }
        let path = target_dir.join(format!("{session_name}.mhl"));
        let hostname = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());

        let manifest = Manifest {
            path,
            target_dir: target_dir.to_path_buf(),
            creation_date: Local::now(),
            hostname,
            tool_version: tool_version.to_string(),
            ignore_patterns: default_ignore_patterns(),
            entries: Vec::new(),
        };
        manifest.write_to_disk()?;
        tracing::debug!(path = %manifest.path.display(), "manifest initialized");
        Ok(manifest)
    }

    /// Appends one entry and rewrites the manifest in full.
    ///
    /// `abs_path` is the destination file just copied; the relative path
    /// recorded is relative to the manifest's own directory, falling back
    /// to the bare filename when that relation cannot be formed.
    pub fn add_entry(
        &mut self,
        abs_path: &Path,
        xxh64_hex: &str,
        size_bytes: u64,
    ) -> Result<(), TransferError> {
        if xxh64_hex.trim().is_empty() {
            return Err(TransferError::ManifestError {
                message: "hash must not be empty".to_string(),
            });
        }
        if size_bytes == 0 {
            return Err(TransferError::ManifestError {
                message: "size must be positive".to_string(),
            });
        }
        if !abs_path.exists() {
            return Err(TransferError::ManifestError {
                message: format!("file does not exist: {}", abs_path.display()),
            });
        }
        let metadata = fs::metadata(abs_path).map_err(|e| TransferError::io(abs_path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| TransferError::io(abs_path, e))?;

        let relative_path = abs_path
            .strip_prefix(&self.target_dir)
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|_| {
                PathBuf::from(
                    abs_path
                        .file_name()
                        .map(|n| n.to_os_string())
                        .unwrap_or_default(),
                )
            });

        self.entries.push(ManifestEntry {
            relative_path,
            size_bytes,
            last_modification_time: modified,
            xxh64_hex: xxh64_hex.to_string(),
            hash_date: Local::now(),
        });

        self.write_to_disk()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn write_to_disk(&self) -> Result<(), TransferError> {
        let xml = self
            .serialize()
            .map_err(|e| TransferError::ManifestError {
                message: e.to_string(),
            })?;
        let mut file = File::create(&self.path).map_err(|e| TransferError::io(&self.path, e))?;
        file.write_all(&xml)
            .map_err(|e| TransferError::io(&self.path, e))?;
        file.sync_all().map_err(|e| TransferError::io(&self.path, e))?;
        Ok(())
    }

    fn serialize(&self) -> Result<Vec<u8>, quick_xml::Error> {
        let mut buf = Vec::new();
        buf.extend_from_slice(br#"<?xml version="1.0" encoding="UTF-8"?>"#);
        buf.push(b'\n');

        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut hashlist = BytesStart::new("hashlist");
        hashlist.push_attribute(("version", VERSION));
        hashlist.push_attribute(("xmlns", NAMESPACE));
        writer.write_event(Event::Start(hashlist))?;

        writer.write_event(Event::Start(BytesStart::new("creatorinfo")))?;
        write_text_element(&mut writer, "creationdate", &iso8601(&self.creation_date))?;
        write_text_element(&mut writer, "hostname", &self.hostname)?;
        let mut tool = BytesStart::new(TOOL_NAME);
        tool.push_attribute(("version", self.tool_version.as_str()));
        writer.write_event(Event::Start(tool))?;
        writer.write_event(Event::Text(BytesText::new(TOOL_NAME)))?;
        writer.write_event(Event::End(BytesEnd::new(TOOL_NAME)))?;
        writer.write_event(Event::End(BytesEnd::new("creatorinfo")))?;

        writer.write_event(Event::Start(BytesStart::new("processinfo")))?;
        write_text_element(&mut writer, "process", "in-place")?;
        writer.write_event(Event::Start(BytesStart::new("roothash")))?;
        writer.write_event(Event::Empty(BytesStart::new("content")))?;
        writer.write_event(Event::Empty(BytesStart::new("structure")))?;
        writer.write_event(Event::End(BytesEnd::new("roothash")))?;
        writer.write_event(Event::Start(BytesStart::new("ignore")))?;
        for pattern in &self.ignore_patterns {
            write_text_element(&mut writer, "pattern", pattern)?;
        }
        writer.write_event(Event::End(BytesEnd::new("ignore")))?;
        writer.write_event(Event::End(BytesEnd::new("processinfo")))?;

        writer.write_event(Event::Start(BytesStart::new("hashes")))?;
        for entry in &self.entries {
            writer.write_event(Event::Start(BytesStart::new("hash")))?;

            let mut path_el = BytesStart::new("path");
            path_el.push_attribute(("size", entry.size_bytes.to_string().as_str()));
            writer.write_event(Event::Start(path_el))?;
            writer.write_event(Event::Text(BytesText::new(
                &entry.relative_path.to_string_lossy(),
            )))?;
            let mtime: DateTime<Local> = entry.last_modification_time.into();
            write_text_element(&mut writer, "lastmodificationdate", &iso8601(&mtime))?;
            writer.write_event(Event::End(BytesEnd::new("path")))?;

            let mut hash_el = BytesStart::new("xxh64");
            hash_el.push_attribute(("action", "original"));
            hash_el.push_attribute(("hashdate", iso8601(&entry.hash_date).as_str()));
            writer.write_event(Event::Start(hash_el))?;
            writer.write_event(Event::Text(BytesText::new(&entry.xxh64_hex)))?;
            writer.write_event(Event::End(BytesEnd::new("xxh64")))?;

            writer.write_event(Event::End(BytesEnd::new("hash")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("hashes")))?;

        writer.write_event(Event::End(BytesEnd::new("hashlist")))?;

        buf.extend_from_slice(&writer.into_inner().into_inner());
        Ok(buf)
    }
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    tag: &str,
    text: &str,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn initialize_writes_well_formed_empty_manifest() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::initialize("session", dir.path(), "0.1.0").unwrap();
        let xml = fs::read_to_string(&manifest.path).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"xmlns="urn:ASC:MHL:v2.0""#));
        assert!(xml.contains("<hashes>"));
        assert!(!xml.contains("<hash>"));
    }

    #[test]
    fn add_entry_nests_lastmodificationdate_inside_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("clip.mov");
        fs::write(&file_path, b"data").unwrap();

        let mut manifest = Manifest::initialize("session", dir.path(), "0.1.0").unwrap();
        manifest
            .add_entry(&file_path, "aabbccdd00112233", 4)
            .unwrap();

        let xml = fs::read_to_string(&manifest.path).unwrap();
        let path_idx = xml.find("<path").unwrap();
        let lmd_idx = xml.find("<lastmodificationdate>").unwrap();
        let path_close = xml.find("</path>").unwrap();
        assert!(path_idx < lmd_idx && lmd_idx < path_close);
        assert!(xml.contains("clip.mov"));
        assert!(xml.contains(r#"size="4""#));
        assert_eq!(manifest.entry_count(), 1);
    }

    #[test]
    fn add_entry_rejects_empty_hash_and_zero_size() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("clip.mov");
        fs::write(&file_path, b"data").unwrap();
        let mut manifest = Manifest::initialize("session", dir.path(), "0.1.0").unwrap();

        assert!(manifest.add_entry(&file_path, "", 4).is_err());
        assert!(manifest.add_entry(&file_path, "aabbccdd00112233", 0).is_err());
    }

    #[test]
    fn add_entry_rejects_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone.mov");
        let mut manifest = Manifest::initialize("session", dir.path(), "0.1.0").unwrap();

        let err = manifest
            .add_entry(&missing, "aabbccdd00112233", 4)
            .unwrap_err();
        assert!(matches!(err, TransferError::ManifestError { .. }));
    }

    #[test]
    fn add_entry_falls_back_to_filename_outside_target_dir() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let file_path = outside.path().join("elsewhere.mov");
        fs::write(&file_path, b"data").unwrap();

        let mut manifest = Manifest::initialize("session", dir.path(), "0.1.0").unwrap();
        manifest
            .add_entry(&file_path, "aabbccdd00112233", 4)
            .unwrap();

        let xml = fs::read_to_string(&manifest.path).unwrap();
        assert!(xml.contains(">elsewhere.mov<"));
    }
}
