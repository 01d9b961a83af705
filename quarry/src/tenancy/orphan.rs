use std::sync::Arc;

use crate::db::{DatabaseBackend, DOCUMENTS_COLLECTION};
use crate::error::Result;

/// Pages inspected per run, bounding each pass.
const MAX_PAGES_PER_RUN: u32 = 50;

/// The dual-write discipline (vector first, graph second; delete graph
/// first, vector second) means a crash can only strand vector points
/// without a graph anchor. Live reads never see them; this job diffs the
/// two stores in bounded batches and removes them.
#[derive(Clone)]
pub struct OrphanSweeper {
    db: Arc<dyn DatabaseBackend>,
    batch: u32,
}

impl OrphanSweeper {
    pub fn new(db: Arc<dyn DatabaseBackend>, batch: usize) -> Self {
        Self {
            db,
            batch: batch.max(10) as u32,
        }
    }

    pub async fn run_once(&self) -> Result<u64> {
        let mut removed = 0u64;
        let mut offset = 0u32;

        for _ in 0..MAX_PAGES_PER_RUN {
            let ids = self
                .db
                .scroll_ids(DOCUMENTS_COLLECTION, self.batch, offset)
                .await?;
            if ids.is_empty() {
                break;
            }

            let existing = self.db.existing_chunk_ids(&ids).await?;
            let orphans: Vec<_> = ids
                .iter()
                .filter(|id| !existing.contains(id))
                .copied()
                .collect();

            if !orphans.is_empty() {
                tracing::warn!(count = orphans.len(), "Removing orphaned vector points");
                removed += self
                    .db
                    .delete_points(DOCUMENTS_COLLECTION, &orphans)
                    .await?;
            }

            // Deletions shift later rows down; only advance past survivors.
            offset += (ids.len() - orphans.len()) as u32;
            if ids.len() < self.batch as usize {
                break;
            }
        }

        Ok(removed)
    }
}
