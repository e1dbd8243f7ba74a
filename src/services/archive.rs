//! Report archive builder.
//!
//! Collects the artifacts of a report directory into a deflated zip. Entries
//! are selected by glob patterns applied to bare file and directory names
//! found while walking the directory; the archive is flat: matched files are
//! stored under their own name, matched directories under their own name
//! with their whole content. A pattern ending in `/` only matches
//! directories.

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::Path;

use glob::Pattern;
use tracing::{debug, warn};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A compiled attachment glob.
struct NamePattern {
    pattern: Pattern,
    dirs_only: bool,
}

impl NamePattern {
    fn compile(glob: &str) -> Option<Self> {
        let (glob, dirs_only) = match glob.strip_suffix('/') {
            Some(dir) => (dir, true),
            None => (glob, false),
        };
        match Pattern::new(glob) {
            Ok(pattern) => Some(NamePattern { pattern, dirs_only }),
            Err(e) => {
                warn!("Ignoring invalid attachment pattern '{}': {}", glob, e);
                None
            }
        }
    }

    fn matches(&self, name: &str, is_dir: bool) -> bool {
        (is_dir || !self.dirs_only) && self.pattern.matches(name)
    }
}

struct ArchiveBuilder {
    zip: ZipWriter<File>,
    options: SimpleFileOptions,
    patterns: Vec<NamePattern>,
    /// Top level entry names already written
    names: HashSet<String>,
    added: Vec<String>,
}

/// Zip every artifact of `report_dir` matching `globs` into `archive_path`.
///
/// Returns the top level entry names in the order they were added.
pub fn build_report_archive(
    report_dir: &Path,
    globs: &[String],
    archive_path: &Path,
) -> ZipResult<Vec<String>> {
    let file = File::create(archive_path)?;
    let mut builder = ArchiveBuilder {
        zip: ZipWriter::new(file),
        options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        patterns: globs.iter().filter_map(|g| NamePattern::compile(g)).collect(),
        names: HashSet::new(),
        added: Vec::new(),
    };

    builder.walk(report_dir, archive_path)?;
    builder.zip.finish()?;

    debug!(
        "Archived {} entries from {} into {}",
        builder.added.len(),
        report_dir.display(),
        archive_path.display()
    );
    Ok(builder.added)
}

impl ArchiveBuilder {
    /// Walk `dir`, adding matches; matched directories are not descended twice.
    fn walk(&mut self, dir: &Path, archive_path: &Path) -> ZipResult<()> {
        for (path, name) in sorted_entries(dir)? {
            if path == archive_path {
                continue;
            }
            let is_dir = path.is_dir();

            if self.patterns.iter().any(|p| p.matches(&name, is_dir)) {
                if !self.names.insert(name.clone()) {
                    warn!(
                        "Skipping {}: an entry named '{}' is already archived",
                        path.display(),
                        name
                    );
                    continue;
                }
                if is_dir {
                    self.add_directory(&path, &name)?;
                } else {
                    self.add_file(&path, &name)?;
                }
                self.added.push(name);
            } else if is_dir {
                self.walk(&path, archive_path)?;
            }
        }
        Ok(())
    }

    fn add_file(&mut self, path: &Path, entry: &str) -> ZipResult<()> {
        debug!("Adding file {} as {}", path.display(), entry);
        self.zip.start_file(entry, self.options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut self.zip)?;
        Ok(())
    }

    fn add_directory(&mut self, path: &Path, entry: &str) -> ZipResult<()> {
        debug!("Adding folder {} as {}/", path.display(), entry);
        self.zip.add_directory(entry, self.options)?;
        for (child, name) in sorted_entries(path)? {
            let child_entry = format!("{}/{}", entry, name);
            if child.is_dir() {
                self.add_directory(&child, &child_entry)?;
            } else {
                self.add_file(&child, &child_entry)?;
            }
        }
        Ok(())
    }
}

/// Directory entries with UTF-8 names, sorted by name.
fn sorted_entries(dir: &Path) -> io::Result<Vec<(std::path::PathBuf, String)>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((entry.path(), name))
        })
        .collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(entries)
}
