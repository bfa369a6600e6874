//! Identity Store (component D)
//!
//! Three small documents — self-identity, user-profile, preferences —
//! live as plain UTF-8 files in a single workspace directory and get
//! concatenated verbatim into every LLM call (spec §3, §4.D). The store
//! is the sole writer of these files within the process.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{CocoError, Result};

/// The three fixed identity documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityDocument {
    SelfIdentity,
    UserProfile,
    Preferences,
}

impl IdentityDocument {
    pub const ALL: [IdentityDocument; 3] = [
        IdentityDocument::SelfIdentity,
        IdentityDocument::UserProfile,
        IdentityDocument::Preferences,
    ];

    /// The fixed filename this document is stored under, at the
    /// workspace root.
    pub fn filename(self) -> &'static str {
        match self {
            IdentityDocument::SelfIdentity => "self-identity.md",
            IdentityDocument::UserProfile => "user-profile.md",
            IdentityDocument::Preferences => "preferences.md",
        }
    }
}

impl fmt::Display for IdentityDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filename())
    }
}

/// A write that landed somewhere other than the canonical workspace-root
/// path got redirected there; reported back to the caller (spec §4.D).
#[derive(Debug, Clone)]
pub struct Correction {
    pub requested_path: PathBuf,
    pub corrected_path: PathBuf,
}

/// Sole writer of the three identity documents within the process.
pub struct IdentityStore {
    root: PathBuf,
}

impl IdentityStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn canonical_path(&self, doc: IdentityDocument) -> PathBuf {
        self.root.join(doc.filename())
    }

    /// Read all three documents, substituting an empty string for any
    /// that don't exist yet.
    pub fn read_all(&self) -> Result<HashMap<IdentityDocument, String>> {
        std::fs::create_dir_all(&self.root)?;
        let mut out = HashMap::new();
        for doc in IdentityDocument::ALL {
            let path = self.canonical_path(doc);
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(CocoError::Io(e)),
            };
            out.insert(doc, text);
        }
        Ok(out)
    }

    /// Write a document's text. If `requested_path` names a location
    /// other than the canonical workspace-root path, the write is
    /// redirected there and a `Correction` is returned.
    pub fn write(
        &self,
        doc: IdentityDocument,
        text: &str,
        requested_path: Option<&Path>,
    ) -> Result<Option<Correction>> {
        std::fs::create_dir_all(&self.root)?;
        let canonical = self.canonical_path(doc);
        std::fs::write(&canonical, text)?;

        match requested_path {
            Some(requested) if requested != canonical => Ok(Some(Correction {
                requested_path: requested.to_path_buf(),
                corrected_path: canonical,
            })),
            _ => Ok(None),
        }
    }

    /// Fails if a document appears more than once under the workspace
    /// root (e.g. a stray nested copy alongside the canonical one).
    pub fn validate_layout(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        for doc in IdentityDocument::ALL {
            let mut hits = Vec::new();
            find_matches(&self.root, doc.filename(), &mut hits)?;
            if hits.len() > 1 {
                return Err(CocoError::FilesystemCorruption(format!(
                    "duplicate copies of {} found: {:?}",
                    doc.filename(),
                    hits
                )));
            }
        }
        Ok(())
    }
}

fn find_matches(dir: &Path, filename: &str, hits: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            find_matches(&path, filename, hits)?;
        } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
            hits.push(path);
        }
    }
    Ok(())
}
