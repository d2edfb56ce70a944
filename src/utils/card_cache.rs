use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use sqlx::MySqlPool;
use std::time::Duration;

/// uid => card id. Cards are immutable once registered, so a hit never goes stale.
#[derive(Clone)]
pub struct CardCache {
    cards: Cache<String, u64>,
}

#[inline]
fn normalize(uid: &str) -> String {
    uid.trim().to_uppercase()
}

impl CardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cards: Cache::builder()
                .max_capacity(200_000) // tune based on memory
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, uid: &str) -> Option<u64> {
        self.cards.get(&normalize(uid)).await
    }

    pub async fn insert(&self, uid: &str, card_id: u64) {
        self.cards.insert(normalize(uid), card_id).await;
    }

    /// Batch insert cards
    async fn batch_insert(&self, cards: &[(String, u64)]) {
        let futures: Vec<_> = cards
            .iter()
            .map(|(uid, id)| self.cards.insert(normalize(uid), *id))
            .collect();

        // Await all insertions concurrently
        futures::future::join_all(futures).await;
    }

    /// Load every registered card into the cache (streamed, batched)
    pub async fn warmup(&self, pool: &MySqlPool, batch_size: usize) -> Result<()> {
        let mut stream =
            sqlx::query_as::<_, (String, u64)>("SELECT uid, id FROM cards").fetch(pool);

        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0usize;

        while let Some(row) = stream.next().await {
            batch.push(row?);
            total += 1;

            if batch.len() >= batch_size {
                self.batch_insert(&batch).await;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            self.batch_insert(&batch).await;
        }

        tracing::info!(total, "Card cache warmup complete");
        Ok(())
    }
}
