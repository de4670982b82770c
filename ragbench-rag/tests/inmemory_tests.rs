//! Property tests for in-memory vector store search and upsert.

use std::collections::HashMap;

use proptest::prelude::*;
use ragbench_rag::document::{Chunk, DocumentId};
use ragbench_rag::inmemory::InMemoryVectorStore;
use ragbench_rag::vectorstore::VectorStore;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a chunk with a normalized embedding.
fn arb_chunk(dim: usize) -> impl Strategy<Value = Chunk> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", 0usize..10, arb_normalized_embedding(dim)).prop_map(
        |(source, text, sequence_index, embedding)| Chunk {
            id: format!("{source}_{sequence_index}"),
            text,
            source: DocumentId::new(source),
            sequence_index,
            embedding,
            metadata: HashMap::new(),
        },
    )
}

fn dedup(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut seen: HashMap<String, Chunk> = HashMap::new();
    for chunk in chunks {
        seen.entry(chunk.id.clone()).or_insert_with(|| chunk.clone());
    }
    seen.into_values().collect()
}

/// **Feature: ragbench-rag, Property 1: In-memory search ordering**
/// *For any* set of chunks stored in an InMemoryVectorStore, searching with a
/// query embedding SHALL return results ordered by descending cosine
/// similarity, and at most `limit` of them.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_limit(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            limit in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.create_collection("test", DIM).await.unwrap();

                let unique_chunks = dedup(&chunks);
                let count = unique_chunks.len();

                store.upsert("test", &unique_chunks).await.unwrap();
                let results = store.search("test", &query, limit).await.unwrap();
                (results, count)
            });

            prop_assert!(results.len() <= limit);
            prop_assert_eq!(results.len(), limit.min(unique_count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].similarity_score >= window[1].similarity_score,
                    "results not in descending order: {} < {}",
                    window[0].similarity_score,
                    window[1].similarity_score,
                );
            }
        }
    }
}

/// **Feature: ragbench-rag, Property 2: Upsert replaces by chunk id**
/// *For any* set of chunks, upserting them twice SHALL leave the collection
/// with exactly one entry per distinct chunk id.
mod prop_inmemory_upsert_idempotent {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn repeated_upsert_keeps_one_entry_per_id(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..15),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let unique = dedup(&chunks).len();
            let stored = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.create_collection("test", DIM).await.unwrap();
                store.upsert("test", &chunks).await.unwrap();
                store.upsert("test", &chunks).await.unwrap();
                store.len("test").await
            });
            prop_assert_eq!(stored, Some(unique));
        }
    }
}

#[tokio::test]
async fn lexical_search_ranks_term_matches() {
    let store = InMemoryVectorStore::new();
    store.create_collection("docs", 2).await.unwrap();
    let chunk = |id: &str, text: &str| Chunk {
        id: id.to_string(),
        text: text.to_string(),
        source: DocumentId::new(id),
        sequence_index: 0,
        embedding: vec![1.0, 0.0],
        metadata: HashMap::new(),
    };
    store
        .upsert(
            "docs",
            &[
                chunk("a", "reranking improves retrieval precision"),
                chunk("b", "sourdough needs a long fermentation"),
                chunk("c", "hybrid retrieval fuses dense and sparse retrieval"),
            ],
        )
        .await
        .unwrap();

    let hits = store.lexical_search("docs", "retrieval", 10).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
    assert_eq!(ids, ["c", "a"]);
}
