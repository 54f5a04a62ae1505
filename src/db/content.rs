//! The content block store.

use tracing::{info, instrument};

use crate::gateway::Gateway;
use crate::model::{load_all, require, ContentBlock, ContentBlockPatch, NewContentBlock, Record};
use crate::ordering::{
    apply_batch, in_scope, relocate, renumber, resolve_order_index, EngineError, EngineResult, ReorderEntry,
};
use crate::storage::RecordId;

/// Ordered content blocks, one list per page.
#[derive(Debug, Clone)]
pub struct ContentBlocks<G> {
    gateway: G,
}

impl<G: Gateway> ContentBlocks<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Append a block to its page, or place it at the explicit index.
    #[instrument(level = "debug", skip(self, input), fields(page = %input.page_id, block_type = %input.block_type))]
    pub fn create(&self, input: NewContentBlock) -> EngineResult<ContentBlock> {
        input.validate()?;

        let block = self.gateway.transaction(|tx| {
            let order_index = resolve_order_index::<ContentBlock, _>(tx, &input.page_id, input.order_index, None)?;
            let row = input.clone().into_row(RecordId::generate(), order_index)?;
            let block = ContentBlock::from_row(&row)?;
            tx.insert(ContentBlock::COLLECTION, row)?;
            Ok::<_, EngineError>(block)
        })?;

        info!(id = %block.id, order_index = block.order_index, "content block created");
        Ok(block)
    }

    pub fn get(&self, id: &RecordId) -> EngineResult<ContentBlock> {
        self.gateway
            .read(|r| require::<ContentBlock, _>(r, id).map(|(block, _)| block))
    }

    /// Blocks of `page` in display order.
    pub fn for_page(&self, page: &RecordId) -> EngineResult<Vec<ContentBlock>> {
        self.gateway
            .read(|r| Ok::<_, EngineError>(in_scope(load_all::<ContentBlock, _>(r)?, page)))
    }

    #[instrument(level = "debug", skip(self, patch))]
    pub fn update(&self, id: &RecordId, patch: ContentBlockPatch) -> EngineResult<ContentBlock> {
        patch.validate()?;

        self.gateway.transaction(|tx| {
            let (mut block, row) = require::<ContentBlock, _>(tx, id)?;
            if !patch.apply(&mut block) {
                return Ok(block);
            }
            let row = block.write_to(row)?;
            tx.update(ContentBlock::COLLECTION, row.clone())?;
            Ok::<_, EngineError>(ContentBlock::from_row(&row)?)
        })
    }

    /// Move a block to `page`, at `order_index` or after the page's last
    /// block.
    pub fn relocate(&self, id: &RecordId, page: &RecordId, order_index: Option<i64>) -> EngineResult<ContentBlock> {
        let block = self
            .gateway
            .transaction(|tx| relocate::<ContentBlock, _>(tx, id, page.clone(), order_index))?;

        info!(%id, page = %block.page_id, order_index = block.order_index, "content block relocated");
        Ok(block)
    }

    /// Apply a reorder batch to the blocks of `page`, all or nothing.
    #[instrument(level = "debug", skip(self, entries), fields(entries = entries.len()))]
    pub fn reorder(&self, page: &RecordId, entries: &[ReorderEntry]) -> EngineResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        self.gateway
            .transaction(|tx| apply_batch::<ContentBlock, _, _>(tx, page, entries, |_, _, _| Ok(())))
    }

    /// Delete one block. Neighbours keep their indices.
    #[instrument(level = "debug", skip(self))]
    pub fn delete(&self, id: &RecordId) -> EngineResult<()> {
        self.gateway.transaction(|tx| {
            require::<ContentBlock, _>(tx, id)?;
            tx.delete(ContentBlock::COLLECTION, id)?;
            Ok::<_, EngineError>(())
        })
    }

    /// Renumber the blocks of `page` to `1..=n`, keeping their order.
    pub fn normalize(&self, page: &RecordId) -> EngineResult<usize> {
        self.gateway
            .transaction(|tx| renumber::<ContentBlock, _>(tx, page))
    }

    /// Remove every block of a page that was deleted elsewhere.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_page(&self, page: &RecordId) -> EngineResult<usize> {
        let removed = self.gateway.transaction(|tx| {
            let blocks = in_scope(load_all::<ContentBlock, _>(tx)?, page);
            for block in &blocks {
                tx.delete(ContentBlock::COLLECTION, &block.id)?;
            }
            Ok::<_, EngineError>(blocks.len())
        })?;

        info!(%page, removed, "page blocks removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use serde_json::json;

    fn page(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    fn setup() -> ContentBlocks<MemoryGateway> {
        ContentBlocks::new(MemoryGateway::new())
    }

    fn types(blocks: &[ContentBlock]) -> Vec<&str> {
        blocks.iter().map(|b| b.block_type.as_str()).collect()
    }

    #[test]
    fn test_create_appends_per_page() {
        let content = setup();
        let hero = content.create(NewContentBlock::new(page("p1"), "hero")).unwrap();
        let seo = content.create(NewContentBlock::new(page("p1"), "seo")).unwrap();
        let other = content.create(NewContentBlock::new(page("p2"), "hero")).unwrap();

        assert_eq!((hero.order_index, seo.order_index, other.order_index), (1, 2, 1));
        assert_eq!(types(&content.for_page(&page("p1")).unwrap()), vec!["hero", "seo"]);
    }

    #[test]
    fn test_blank_type_rejected() {
        let content = setup();
        let err = content.create(NewContentBlock::new(page("p1"), "")).unwrap_err();
        assert_eq!(err.reason_code(), "blank-block-type");
    }

    #[test]
    fn test_update_and_delete() {
        let content = setup();
        let hero = content
            .create(NewContentBlock::new(page("p1"), "hero").data(json!({"title": "Hi"})))
            .unwrap();

        let updated = content
            .update(
                &hero.id,
                ContentBlockPatch {
                    data: Some(json!({"title": "Hello"})),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.data["title"], json!("Hello"));

        content.delete(&hero.id).unwrap();
        assert_eq!(content.delete(&hero.id).unwrap_err().reason_code(), "not-found");
    }

    #[test]
    fn test_relocate_resets_index() {
        let content = setup();
        let hero = content.create(NewContentBlock::new(page("p1"), "hero")).unwrap();
        content.create(NewContentBlock::new(page("p2"), "intro")).unwrap();

        let moved = content.relocate(&hero.id, &page("p2"), None).unwrap();
        assert_eq!(moved.page_id, page("p2"));
        assert_eq!(moved.order_index, 2);
        assert!(content.for_page(&page("p1")).unwrap().is_empty());
    }

    #[test]
    fn test_remove_page_only_touches_that_page() {
        let content = setup();
        content.create(NewContentBlock::new(page("p1"), "hero")).unwrap();
        content.create(NewContentBlock::new(page("p1"), "seo")).unwrap();
        content.create(NewContentBlock::new(page("p2"), "hero")).unwrap();

        assert_eq!(content.remove_page(&page("p1")).unwrap(), 2);
        assert!(content.for_page(&page("p1")).unwrap().is_empty());
        assert_eq!(content.for_page(&page("p2")).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_reorder_is_noop() {
        let content = setup();
        assert_eq!(content.reorder(&page("p1"), &[]).unwrap(), 0);
    }
}
