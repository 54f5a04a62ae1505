//! Tree operations for collection management.
//!
//! A Git tree is a directory. In a content store:
//! - the root tree holds one directory per [`Collection`]
//! - each collection directory holds one JSON blob per record
//!
//! Reads go through [`TreeHandle`], an immutable snapshot. Writes go through
//! [`TreeMutator`], which stages changes and produces a new root tree.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use git2::{FileMode, ObjectType, Repository, Tree, TreeBuilder as Git2TreeBuilder};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, Collection, RecordId, RecordPath, TreeId};

/// A read only handle to a git tree at a specific commit.
#[derive(Debug)]
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    pub(crate) fn inner(&self) -> &Tree<'repo> {
        &self.tree
    }

    /// collections present in this tree; unknown directories are ignored
    pub fn list_collections(&self) -> Vec<Collection> {
        self.tree
            .iter()
            .filter(|entry| entry.kind() == Some(ObjectType::Tree))
            .filter_map(|entry| entry.name().and_then(Collection::from_dir_name))
            .collect()
    }

    pub fn collection_exists(&self, collection: Collection) -> bool {
        self.tree
            .get_name(collection.as_str())
            .map(|entry| entry.kind() == Some(ObjectType::Tree))
            .unwrap_or(false)
    }

    fn collection_tree(&self, repo: &'repo Repository, collection: Collection) -> StorageResult<Tree<'repo>> {
        let entry = self
            .tree
            .get_name(collection.as_str())
            .ok_or(StorageError::CollectionNotFound(collection))?;

        if entry.kind() != Some(ObjectType::Tree) {
            return Err(StorageError::UnexpectedEntryType {
                path: collection.as_str().into(),
                expected: "tree (directory)".to_string(),
                found: format!("{:?}", entry.kind()),
            });
        }

        Ok(repo.find_tree(entry.id())?)
    }

    /// ids of every record in a collection
    pub fn list_records(&self, repo: &'repo Repository, collection: Collection) -> StorageResult<Vec<RecordId>> {
        let tree = self.collection_tree(repo, collection)?;

        let ids = tree
            .iter()
            .filter(|entry| entry.kind() == Some(ObjectType::Blob))
            .filter_map(|entry| {
                let name = entry.name()?;
                let id = name.strip_suffix(".json")?;
                RecordId::new(id).ok()
            })
            .collect();

        Ok(ids)
    }

    pub fn get_record_blob_id(
        &self,
        repo: &'repo Repository,
        collection: Collection,
        id: &RecordId,
    ) -> StorageResult<Option<BlobId>> {
        let tree = self.collection_tree(repo, collection)?;
        let entry = tree.get_name(&RecordPath::file_name(id));

        match entry {
            Some(entry) if entry.kind() == Some(ObjectType::Blob) => Ok(Some(BlobId::new(entry.id()))),
            Some(entry) => Err(StorageError::UnexpectedEntryType {
                path: RecordPath::new(collection, id.clone()).to_path_buf(),
                expected: "blob (file)".to_string(),
                found: format!("{:?}", entry.kind()),
            }),
            None => Ok(None),
        }
    }

    pub fn record_exists(&self, repo: &'repo Repository, collection: Collection, id: &RecordId) -> StorageResult<bool> {
        Ok(self.get_record_blob_id(repo, collection, id)?.is_some())
    }
}

/// A staging area for tree changes.
///
/// Changes accumulate per collection and are written out as a new root tree
/// by [`TreeMutator::write`]. The source tree is never modified.
///
/// ```ignore
/// let mut mutator = TreeMutator::from_tree(repo, &tree)?;
/// mutator.upsert_record(Collection::Navigation, &id, blob_id)?;
/// mutator.delete_record(Collection::Navigation, &other)?;
/// let new_tree_id = mutator.write()?;
/// ```
pub struct TreeMutator<'repo> {
    repo: &'repo Repository,
    root_builder: Git2TreeBuilder<'repo>,
    /// builders for collections touched so far
    modified: HashMap<Collection, Git2TreeBuilder<'repo>>,
    /// subtree ids of collections as found in the source tree
    original: HashMap<Collection, git2::Oid>,
}

impl<'repo> TreeMutator<'repo> {
    pub fn from_tree(repo: &'repo Repository, tree: &TreeHandle<'_>) -> StorageResult<Self> {
        let root_builder = repo.treebuilder(Some(tree.inner()))?;

        let original = tree
            .inner()
            .iter()
            .filter(|entry| entry.kind() == Some(ObjectType::Tree))
            .filter_map(|entry| {
                let collection = entry.name().and_then(Collection::from_dir_name)?;
                Some((collection, entry.id()))
            })
            .collect();

        Ok(Self {
            repo,
            root_builder,
            modified: HashMap::new(),
            original,
        })
    }

    pub fn empty(repo: &'repo Repository) -> StorageResult<Self> {
        Ok(Self {
            repo,
            root_builder: repo.treebuilder(None)?,
            modified: HashMap::new(),
            original: HashMap::new(),
        })
    }

    fn has_collection(&self, collection: Collection) -> bool {
        self.modified.contains_key(&collection) || self.original.contains_key(&collection)
    }

    fn collection_builder(&mut self, collection: Collection) -> StorageResult<&mut Git2TreeBuilder<'repo>> {
        match self.modified.entry(collection) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let builder = match self.original.get(&collection) {
                    Some(oid) => {
                        let tree = self.repo.find_tree(*oid)?;
                        self.repo.treebuilder(Some(&tree))?
                    }
                    None => return Err(StorageError::CollectionNotFound(collection)),
                };
                Ok(entry.insert(builder))
            }
        }
    }

    /// add an empty collection directory
    pub fn create_collection(&mut self, collection: Collection) -> StorageResult<()> {
        if self.has_collection(collection) {
            return Err(StorageError::CollectionAlreadyExists(collection));
        }

        let empty_tree_id = self.repo.treebuilder(None)?.write()?;
        self.root_builder
            .insert(collection.as_str(), empty_tree_id, FileMode::Tree.into())?;
        self.original.insert(collection, empty_tree_id);

        Ok(())
    }

    pub fn upsert_record(&mut self, collection: Collection, id: &RecordId, blob_id: BlobId) -> StorageResult<()> {
        let builder = self.collection_builder(collection)?;
        builder.insert(RecordPath::file_name(id), blob_id.raw(), FileMode::Blob.into())?;
        Ok(())
    }

    pub fn delete_record(&mut self, collection: Collection, id: &RecordId) -> StorageResult<()> {
        let builder = self.collection_builder(collection)?;
        builder
            .remove(RecordPath::file_name(id))
            .map_err(|_| StorageError::RecordNotFound {
                collection,
                id: id.clone(),
            })?;
        Ok(())
    }

    /// write staged collections, then the root, and return the new root id
    pub fn write(mut self) -> StorageResult<TreeId> {
        for (collection, builder) in self.modified {
            let subtree = builder.write()?;
            self.root_builder
                .insert(collection.as_str(), subtree, FileMode::Tree.into())?;
        }

        let root_id = self.root_builder.write()?;
        Ok(TreeId::new(root_id))
    }
}

/// the tree of a freshly initialized store: no collections yet
pub fn create_initial_tree(repo: &Repository) -> StorageResult<TreeId> {
    TreeMutator::empty(repo)?.write()
}
