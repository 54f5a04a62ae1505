//! The navigation tree store.

use tracing::{debug, info, instrument};

use crate::gateway::Gateway;
use crate::model::{load, load_all, require, NavigationItem, NavigationNode, NavigationPatch, NewNavigationItem, Record};
use crate::ordering::{
    apply_batch, display_order, ensure_deletable, in_scope, renumber, resolve_order_index, BatchReparentPolicy, EngineError,
    EngineResult, OrderingOptions, PreconditionError, ReorderEntry, SiblingIndex,
};
use crate::storage::RecordId;

/// Navigation menu items arranged as a tree.
///
/// Each item points at its parent; siblings are ordered by `order_index`.
/// Every mutating call is one gateway transaction.
#[derive(Debug, Clone)]
pub struct NavigationTree<G> {
    gateway: G,
    options: OrderingOptions,
}

impl<G: Gateway> NavigationTree<G> {
    pub fn new(gateway: G) -> Self {
        Self::with_options(gateway, OrderingOptions::default())
    }

    pub fn with_options(gateway: G, options: OrderingOptions) -> Self {
        Self { gateway, options }
    }

    pub fn options(&self) -> &OrderingOptions {
        &self.options
    }

    /// Create an item at the end of its sibling group, or at the explicit
    /// index the input carries.
    #[instrument(level = "debug", skip(self))]
    pub fn create(&self, input: NewNavigationItem) -> EngineResult<NavigationItem> {
        input.validate()?;

        let item = self.gateway.transaction(|tx| {
            if let Some(parent) = &input.parent_id {
                if load::<NavigationItem, _>(tx, parent)?.is_none() {
                    return Err(PreconditionError::ParentNotFound { parent: parent.clone() }.into());
                }
            }

            let order_index =
                resolve_order_index::<NavigationItem, _>(tx, &input.parent_id, input.order_index, None)?;
            let row = input.clone().into_row(RecordId::generate(), order_index)?;
            let item = NavigationItem::from_row(&row)?;
            tx.insert(NavigationItem::COLLECTION, row)?;
            Ok::<_, EngineError>(item)
        })?;

        info!(id = %item.id, order_index = item.order_index, "navigation item created");
        Ok(item)
    }

    pub fn get(&self, id: &RecordId) -> EngineResult<NavigationItem> {
        self.gateway
            .read(|r| require::<NavigationItem, _>(r, id).map(|(item, _)| item))
    }

    /// Every item, grouped by parent, each group in display order.
    pub fn all(&self) -> EngineResult<Vec<NavigationItem>> {
        let mut items = self.gateway.read(|r| load_all::<NavigationItem, _>(r))?;
        items.sort_by(|a, b| a.parent_id.cmp(&b.parent_id).then_with(|| display_order(a, b)));
        Ok(items)
    }

    /// Direct children of `parent` (`None` for the roots), sorted.
    pub fn children(&self, parent: Option<&RecordId>) -> EngineResult<Vec<NavigationItem>> {
        let scope = parent.cloned();
        self.gateway
            .read(|r| Ok::<_, EngineError>(in_scope(load_all::<NavigationItem, _>(r)?, &scope)))
    }

    /// The whole tree, roots first, siblings sorted.
    pub fn tree(&self) -> EngineResult<Vec<NavigationNode>> {
        let items = self.gateway.read(|r| load_all::<NavigationItem, _>(r))?;
        Ok(build_tree(items, |_| true))
    }

    /// The tree as a visitor sees it: inactive items and everything below
    /// them are left out.
    pub fn menu(&self) -> EngineResult<Vec<NavigationNode>> {
        let items = self.gateway.read(|r| load_all::<NavigationItem, _>(r))?;
        Ok(build_tree(items, |item| item.is_active))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn update(&self, id: &RecordId, patch: NavigationPatch) -> EngineResult<NavigationItem> {
        patch.validate()?;

        self.gateway.transaction(|tx| {
            let (mut item, row) = require::<NavigationItem, _>(tx, id)?;
            if !patch.apply(&mut item) {
                return Ok(item);
            }
            let row = item.write_to(row)?;
            tx.update(NavigationItem::COLLECTION, row.clone())?;
            Ok::<_, EngineError>(NavigationItem::from_row(&row)?)
        })
    }

    /// Move `id` under `new_parent` (`None` moves it to the root level).
    ///
    /// The item keeps its order index. A rejected move writes nothing, and
    /// neither does a move to the current parent.
    #[instrument(level = "debug", skip(self))]
    pub fn reparent(&self, id: &RecordId, new_parent: Option<&RecordId>) -> EngineResult<NavigationItem> {
        let guard = self.options.cycle_guard();

        let item = self.gateway.transaction(|tx| {
            let (mut item, row) = require::<NavigationItem, _>(tx, id)?;
            guard.check(tx, id, new_parent)?;

            if item.parent_id.as_ref() == new_parent {
                return Ok::<_, EngineError>(item);
            }

            item.parent_id = new_parent.cloned();
            let row = item.write_to(row)?;
            tx.update(NavigationItem::COLLECTION, row.clone())?;
            Ok(NavigationItem::from_row(&row)?)
        })?;

        debug!(%id, parent = ?item.parent_id, "navigation item reparented");
        Ok(item)
    }

    /// Delete a leaf item. Items with children are refused.
    #[instrument(level = "debug", skip(self))]
    pub fn delete(&self, id: &RecordId) -> EngineResult<()> {
        self.gateway.transaction(|tx| {
            ensure_deletable(tx, id)?;
            tx.delete(NavigationItem::COLLECTION, id)?;
            Ok::<_, EngineError>(())
        })?;

        info!(%id, "navigation item deleted");
        Ok(())
    }

    /// Apply a reorder batch to the children of `parent`.
    ///
    /// Either every entry is applied or none is. Entries may move an item to
    /// another parent; see [`BatchReparentPolicy`].
    #[instrument(level = "debug", skip(self, entries), fields(entries = entries.len()))]
    pub fn reorder(&self, parent: Option<&RecordId>, entries: &[ReorderEntry]) -> EngineResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let scope = parent.cloned();
        let guard = self.options.cycle_guard();
        let policy = self.options.batch_reparent;

        self.gateway.transaction(|tx| {
            apply_batch::<NavigationItem, _, _>(tx, &scope, entries, |store, item, entry| {
                let Some(new_parent) = &entry.parent_id else {
                    return Ok(());
                };
                if &item.parent_id == new_parent {
                    return Ok(());
                }
                if policy == BatchReparentPolicy::Validate {
                    guard.check(store, &item.id, new_parent.as_ref())?;
                }
                item.parent_id = new_parent.clone();
                Ok(())
            })
        })
    }

    /// Renumber the children of `parent` to `1..=n`, keeping their order.
    pub fn normalize(&self, parent: Option<&RecordId>) -> EngineResult<usize> {
        let scope = parent.cloned();
        self.gateway
            .transaction(|tx| renumber::<NavigationItem, _>(tx, &scope))
    }

    /// Items whose parent no longer exists. They are never shown in
    /// [`NavigationTree::tree`].
    pub fn orphans(&self) -> EngineResult<Vec<NavigationItem>> {
        self.gateway.read(|r| {
            let items = load_all::<NavigationItem, _>(r)?;
            let orphans = items
                .iter()
                .filter(|item| match &item.parent_id {
                    Some(parent) => !items.iter().any(|other| &other.id == parent),
                    None => false,
                })
                .cloned()
                .collect();
            Ok::<_, EngineError>(orphans)
        })
    }
}

/// Nest `items` by parent. Items failing `keep` are dropped together with
/// their subtrees.
fn build_tree<F>(items: Vec<NavigationItem>, keep: F) -> Vec<NavigationNode>
where
    F: Fn(&NavigationItem) -> bool,
{
    let index = SiblingIndex::build(&items);
    let by_id: std::collections::HashMap<&RecordId, &NavigationItem> =
        items.iter().map(|item| (&item.id, item)).collect();

    fn nest<F>(
        ids: &[RecordId],
        index: &SiblingIndex<Option<RecordId>>,
        by_id: &std::collections::HashMap<&RecordId, &NavigationItem>,
        keep: &F,
    ) -> Vec<NavigationNode>
    where
        F: Fn(&NavigationItem) -> bool,
    {
        ids.iter()
            .filter_map(|id| by_id.get(id).copied())
            .filter(|item| keep(item))
            .map(|item| NavigationNode {
                item: item.clone(),
                children: nest(index.children(&item.id), index, by_id, keep),
            })
            .collect()
    }

    nest(index.roots(), &index, &by_id, &keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn setup() -> NavigationTree<MemoryGateway> {
        NavigationTree::new(MemoryGateway::new())
    }

    fn add(nav: &NavigationTree<MemoryGateway>, label: &str, parent: Option<&NavigationItem>) -> NavigationItem {
        let mut input = NewNavigationItem::new(label);
        if let Some(parent) = parent {
            input = input.parent(parent.id.clone());
        }
        nav.create(input).unwrap()
    }

    #[test]
    fn test_create_allocates_per_parent() {
        let nav = setup();
        let home = add(&nav, "Home", None);
        let about = add(&nav, "About", None);
        let team = add(&nav, "Team", Some(&about));

        assert_eq!(home.order_index, 1);
        assert_eq!(home.parent_id, None);
        assert_eq!(about.order_index, 2);
        assert_eq!(team.order_index, 1);
        assert_eq!(nav.children(Some(&about.id)).unwrap(), vec![team]);
    }

    #[test]
    fn test_create_validates_input() {
        let nav = setup();
        let blank = nav.create(NewNavigationItem::new(" ")).unwrap_err();
        assert_eq!(blank.reason_code(), "blank-label");

        let ghost = RecordId::new("ghost").unwrap();
        let orphan = nav.create(NewNavigationItem::new("Lost").parent(ghost)).unwrap_err();
        assert_eq!(orphan.reason_code(), "parent-not-found");
        assert!(nav.all().unwrap().is_empty());
    }

    #[test]
    fn test_reparent_keeps_order_index() {
        let nav = setup();
        let home = add(&nav, "Home", None);
        let about = add(&nav, "About", None);

        let moved = nav.reparent(&about.id, Some(&home.id)).unwrap();
        assert_eq!(moved.parent_id, Some(home.id.clone()));
        assert_eq!(moved.order_index, 2);

        let back = nav.reparent(&about.id, None).unwrap();
        assert_eq!(back.parent_id, None);
    }

    #[test]
    fn test_reparent_missing_node() {
        let nav = setup();
        let err = nav.reparent(&RecordId::new("ghost").unwrap(), None).unwrap_err();
        assert_eq!(err.reason_code(), "not-found");
    }

    #[test]
    fn test_update_patch() {
        let nav = setup();
        let home = add(&nav, "Home", None);

        let updated = nav
            .update(
                &home.id,
                NavigationPatch {
                    label: Some("Start".to_string()),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.label, "Start");
        assert!(!updated.is_active);
        assert_eq!(updated.version, 2);

        let too_long = NavigationPatch {
            label: Some("x".repeat(51)),
            ..Default::default()
        };
        assert_eq!(nav.update(&home.id, too_long).unwrap_err().reason_code(), "label-too-long");
    }

    #[test]
    fn test_tree_and_menu() {
        let nav = setup();
        let home = add(&nav, "Home", None);
        let about = add(&nav, "About", None);
        add(&nav, "Team", Some(&about));
        add(&nav, "Contact", Some(&home));

        let tree = nav.tree().unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].item.label, "Home");
        assert_eq!(tree.iter().map(NavigationNode::size).sum::<usize>(), 4);

        nav.update(
            &about.id,
            NavigationPatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        let menu = nav.menu().unwrap();
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].children[0].item.label, "Contact");
    }

    #[test]
    fn test_batch_reparent_is_validated_by_default() {
        let nav = setup();
        let a = add(&nav, "A", None);
        let b = add(&nav, "B", Some(&a));

        let entries = vec![ReorderEntry::new(a.id.clone(), 1).with_parent(Some(b.id.clone()))];
        let err = nav.reorder(None, &entries).unwrap_err();
        assert_eq!(err.reason_code(), "batch-aborted");
        assert_eq!(err.root_cause().reason_code(), "circular-reference");
        assert_eq!(nav.get(&a.id).unwrap().parent_id, None);
    }

    #[test]
    fn test_trusted_batch_skips_cycle_guard() {
        let options = OrderingOptions::default().batch_reparent(BatchReparentPolicy::Trusted);
        let nav = NavigationTree::with_options(MemoryGateway::new(), options);
        let a = add(&nav, "A", None);
        let b = add(&nav, "B", Some(&a));

        let entries = vec![ReorderEntry::new(a.id.clone(), 1).with_parent(Some(b.id.clone()))];
        nav.reorder(None, &entries).unwrap();
        assert_eq!(nav.get(&a.id).unwrap().parent_id, Some(b.id.clone()));
        // both now sit in a loop that no root reaches
        assert!(nav.tree().unwrap().is_empty());
    }

    #[test]
    fn test_normalize_and_orphans() {
        let nav = setup();
        nav.create(NewNavigationItem::new("One").order_index(5)).unwrap();
        nav.create(NewNavigationItem::new("Two").order_index(9)).unwrap();

        assert_eq!(nav.normalize(None).unwrap(), 2);
        let indices: Vec<i64> = nav.children(None).unwrap().iter().map(|i| i.order_index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(nav.orphans().unwrap().is_empty());
    }

    #[test]
    fn test_create_survives_unrelated_concurrent_write() {
        use crate::db::ContentBlocks;
        use crate::gateway::GitGateway;
        use crate::model::NewContentBlock;
        use crate::storage::GitRepository;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let gateway = GitGateway::open(GitRepository::init(dir.path()).unwrap()).unwrap();
        let nav = NavigationTree::new(gateway.clone());
        let blocks = ContentBlocks::new(gateway.clone());
        let page = RecordId::new("pageb").unwrap();
        let mut runs = 0;

        let created: EngineResult<RecordId> = gateway.transaction(|tx| {
            runs += 1;
            let order_index = resolve_order_index::<NavigationItem, _>(tx, &None, None, None)?;
            if runs == 1 {
                blocks.create(NewContentBlock::new(page.clone(), "hero"))?;
            }
            let id = RecordId::generate();
            tx.insert(NavigationItem::COLLECTION, NewNavigationItem::new("Home").into_row(id.clone(), order_index)?)?;
            Ok(id)
        });

        let id = created.unwrap();
        assert_eq!(runs, 2);
        assert_eq!(nav.get(&id).unwrap().order_index, 1);
        assert_eq!(blocks.for_page(&page).unwrap().len(), 1);

        let mut runs = 0;
        let allocated: EngineResult<i64> = gateway.transaction(|tx| {
            runs += 1;
            let order_index = resolve_order_index::<NavigationItem, _>(tx, &None, None, None)?;
            if runs == 1 {
                nav.create(NewNavigationItem::new("About"))?;
            }
            let row = NewNavigationItem::new("Contact").into_row(RecordId::generate(), order_index)?;
            tx.insert(NavigationItem::COLLECTION, row)?;
            Ok(order_index)
        });

        assert_eq!(allocated.unwrap(), 3);
        let indices: Vec<i64> = nav.children(None).unwrap().iter().map(|i| i.order_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }
}
