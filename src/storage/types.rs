//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::fmt::Formatter;
use std::path::PathBuf;

use git2::Oid;
use serde::{Deserialize, Serialize};

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The record collections a content store knows about.
///
/// Each collection is a top-level directory of the repository tree,
/// holding one JSON blob per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    /// Navigation menu items (the tree store).
    Navigation,
    /// Page content blocks (the sequence store).
    ContentBlocks,
}

impl Collection {
    /// every collection, in tree order
    pub const ALL: [Collection; 2] = [Collection::Navigation, Collection::ContentBlocks];

    /// directory name inside the repository tree
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Navigation => "navigation_items",
            Collection::ContentBlocks => "content_blocks",
        }
    }

    /// resolve a directory name back to a collection
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated record identifier.
///
/// Record ids are used as filenames, so they are restricted to
/// ASCII alphanumerics, underscores and hyphens. Generated ids are
/// lowercase ULIDs, which also sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    const MAX_LEN: usize = 128;

    pub fn new(id: impl Into<String>) -> Result<Self, InvalidNameError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    fn validate(id: &str) -> Result<(), InvalidNameError> {
        if id.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if id.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(id.len()));
        }

        for (i, c) in id.chars().enumerate() {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate a new ULID-based record id.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for RecordId {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Full path to a record in the repository.
///
/// Format: `{collection}/{id}.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPath {
    pub collection: Collection,
    pub id: RecordId,
}

impl RecordPath {
    pub fn new(collection: Collection, id: RecordId) -> Self {
        Self { collection, id }
    }

    /// name of the blob inside the collection directory
    pub fn file_name(id: &RecordId) -> String {
        format!("{}.json", id)
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.to_string())
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.json", self.collection, self.id)
    }
}

/// a branch name, with special handling for transaction branches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// the main branch name
    pub const MAIN: &'static str = "main";

    /// prefix for transaction branches
    pub const TX_PREFIX: &'static str = "tx/";

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name.contains("..") || name.ends_with('/') || name.starts_with('/') {
            return Err(InvalidNameError::InvalidPath(name));
        }
        Ok(Self(name))
    }

    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    pub fn for_transaction(tx_id: &str) -> Self {
        Self(format!("{}{}", Self::TX_PREFIX, tx_id))
    }

    pub fn is_transaction_branch(&self) -> bool {
        self.0.starts_with(Self::TX_PREFIX)
    }

    /// extract transaction ID if this is a transaction branch
    pub fn transaction_id(&self) -> Option<&str> {
        self.0.strip_prefix(Self::TX_PREFIX)
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default signature for content store commits
    pub fn cmsdb() -> Self {
        Self::new("cmsdb", "cmsdb@localhost")
    }

    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::cmsdb()
    }
}

/// error type for invalid names (record ids, branches)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidCharacter { char: char, position: usize },
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}

/// represents a change in a diff between commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub status: ChangeStatus,
}

/// the type of change in a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_dir_names() {
        assert_eq!(Collection::Navigation.as_str(), "navigation_items");
        assert_eq!(Collection::from_dir_name("content_blocks"), Some(Collection::ContentBlocks));
        assert_eq!(Collection::from_dir_name("_schema"), None);
    }

    #[test]
    fn test_record_id_valid() {
        assert!(RecordId::new("abc123").is_ok());
        assert!(RecordId::new("01ARZ3NDEKTSV4RRFFQ69G5FAV").is_ok());
        assert!(RecordId::new("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(RecordId::new("home_page").is_ok());
    }

    #[test]
    fn test_record_id_invalid() {
        assert_eq!(RecordId::new(""), Err(InvalidNameError::Empty));
        assert!(matches!(
            RecordId::new("../etc"),
            Err(InvalidNameError::InvalidCharacter { char: '.', position: 0 })
        ));
        assert!(matches!(RecordId::new("a".repeat(129)), Err(InvalidNameError::TooLong(129))));
    }

    #[test]
    fn test_record_id_generate() {
        let first = RecordId::generate();
        let second = RecordId::generate();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 26);
        assert_eq!(first.as_str(), first.as_str().to_lowercase());
    }

    #[test]
    fn test_record_path_display() {
        let path = RecordPath::new(Collection::ContentBlocks, RecordId::new("hero").unwrap());
        assert_eq!(path.to_string(), "content_blocks/hero.json");
        assert_eq!(RecordPath::file_name(&path.id), "hero.json");
    }

    #[test]
    fn test_branch_name_transaction() {
        let branch = BranchName::for_transaction("abc123");
        assert!(branch.is_transaction_branch());
        assert_eq!(branch.transaction_id(), Some("abc123"));
        assert_eq!(branch.as_ref_path(), "refs/heads/tx/abc123");
    }

    #[test]
    fn test_branch_name_main() {
        let branch = BranchName::main();
        assert!(!branch.is_transaction_branch());
        assert_eq!(branch.transaction_id(), None);
        assert_eq!(branch.as_ref_path(), "refs/heads/main");
    }
}
