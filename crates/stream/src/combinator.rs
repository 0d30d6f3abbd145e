use std::sync::Arc;
use tessera_common::{Chunk, ChunkXz};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::service::{reject_pending, ChunkRequest, ChunkServiceHandle};
use crate::ChunkError;

/// Merges an ordered list of chunk services into one logical store.
///
/// Tiers are asked highest priority first; the first `Some` wins. An error
/// from a tier ends the lookup with that error rather than falling through,
/// so a corrupt persisted chunk is never papered over by generation.
#[derive(Debug, Clone)]
pub struct ChunkCombinator {
    tiers: Arc<[ChunkServiceHandle]>,
}

impl ChunkCombinator {
    pub fn new(tiers: Vec<ChunkServiceHandle>) -> Self {
        Self {
            tiers: tiers.into(),
        }
    }

    pub fn tiers(&self) -> &[ChunkServiceHandle] {
        &self.tiers
    }

    /// Look `loc` up tier by tier.
    pub async fn resolve(&self, loc: ChunkXz) -> Result<Option<Chunk>, ChunkError> {
        for tier in self.tiers.iter() {
            if let Some(chunk) = tier.load_chunk(loc).await? {
                debug!(%loc, tier = tier.name(), "chunk resolved");
                return Ok(Some(chunk));
            }
        }
        Ok(None)
    }

    /// Run the combinator as a chunk service of its own.
    ///
    /// Lookups run concurrently; shutting the combinator down waits for the
    /// lookups in flight and then shuts down every tier.
    pub fn spawn(self, capacity: usize) -> (ChunkServiceHandle, JoinHandle<()>) {
        let (handle, rx) = ChunkServiceHandle::channel("combinator", capacity);
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<ChunkRequest>) {
        info!(tiers = self.tiers.len(), "chunk combinator started");
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(ChunkRequest::Load { loc, reply }) => {
                        let combinator = self.clone();
                        in_flight.spawn(async move {
                            let _ = reply.send(combinator.resolve(loc).await);
                        });
                    }
                    Some(ChunkRequest::Shutdown { done }) => {
                        let waiters = reject_pending(&mut rx);
                        while let Some(joined) = in_flight.join_next().await {
                            log_join(joined);
                        }
                        for tier in self.tiers.iter() {
                            tier.shutdown().await;
                        }
                        info!("chunk combinator stopped");
                        let _ = done.send(());
                        for waiter in waiters {
                            let _ = waiter.send(());
                        }
                        return;
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => log_join(joined),
            }
        }
        info!("chunk combinator handles dropped; stopping");
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        warn!(%err, "chunk lookup task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{spawn_service, ChunkSource};
    use crate::TerrainGenerator;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MapSource(HashMap<ChunkXz, Chunk>);

    impl ChunkSource for MapSource {
        fn name(&self) -> &str {
            "persistent"
        }

        fn load_chunk(&mut self, loc: ChunkXz) -> Result<Option<Chunk>, ChunkError> {
            if loc == ChunkXz::new(9, 9) {
                return Err(ChunkError::Decode {
                    loc,
                    reason: "bad payload".into(),
                });
            }
            Ok(self.0.get(&loc).cloned())
        }
    }

    /// Generator that counts how often it is asked.
    struct Counting {
        inner: TerrainGenerator,
        calls: Arc<AtomicUsize>,
    }

    impl ChunkSource for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn load_chunk(&mut self, loc: ChunkXz) -> Result<Option<Chunk>, ChunkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.load_chunk(loc)
        }
    }

    fn stored_chunk(loc: ChunkXz) -> Chunk {
        let mut chunk = Chunk::empty(loc);
        chunk.set_block(0, 0, 0, 42);
        chunk
    }

    fn two_tiers(seed: i64) -> (ChunkCombinator, Arc<AtomicUsize>) {
        let stored = ChunkXz::new(0, 0);
        let (persistent, _) = spawn_service(MapSource(HashMap::from([(stored, stored_chunk(stored))])), 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let (procedural, _) = spawn_service(
            Counting {
                inner: TerrainGenerator::new(seed),
                calls: calls.clone(),
            },
            8,
        );
        (ChunkCombinator::new(vec![persistent, procedural]), calls)
    }

    #[tokio::test]
    async fn persistent_hit_never_reaches_generator() {
        let (combinator, calls) = two_tiers(42);
        let (store, _task) = combinator.spawn(8);
        let chunk = store.load_chunk(ChunkXz::new(0, 0)).await.unwrap().unwrap();
        assert_eq!(chunk, stored_chunk(ChunkXz::new(0, 0)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn miss_falls_through_to_generator() {
        let (combinator, calls) = two_tiers(42);
        let (store, _task) = combinator.spawn(8);
        let loc = ChunkXz::new(5, -3);
        let chunk = store.load_chunk(loc).await.unwrap().unwrap();
        assert_eq!(chunk, TerrainGenerator::new(42).generate(loc));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tier_error_is_returned_not_generated_over() {
        let (combinator, calls) = two_tiers(42);
        let (store, _task) = combinator.spawn(8);
        assert!(matches!(
            store.load_chunk(ChunkXz::new(9, 9)).await,
            Err(ChunkError::Decode { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // Other lookups still work.
        assert!(store.load_chunk(ChunkXz::new(1, 1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn no_tiers_is_a_miss() {
        let combinator = ChunkCombinator::new(Vec::new());
        assert!(combinator.resolve(ChunkXz::new(0, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shutdown_cascades_to_tiers() {
        let (combinator, _calls) = two_tiers(1);
        let tiers = combinator.tiers().to_vec();
        let (store, task) = combinator.spawn(8);
        assert!(store.load_chunk(ChunkXz::new(3, 3)).await.unwrap().is_some());

        store.shutdown().await;
        task.await.unwrap();
        assert!(matches!(
            store.load_chunk(ChunkXz::new(3, 3)).await,
            Err(ChunkError::ServiceStopped)
        ));
        for tier in &tiers {
            assert!(matches!(
                tier.load_chunk(ChunkXz::new(3, 3)).await,
                Err(ChunkError::ServiceStopped)
            ));
        }
    }
}
