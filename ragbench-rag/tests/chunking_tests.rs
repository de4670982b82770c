//! Property tests for the chunkers and rank fusion.

use proptest::prelude::*;
use ragbench_rag::chunking::{
    Chunker, FixedSizeChunker, SentenceChunker, SlidingWindowChunker, sliding_window_spans,
    split_sentences,
};
use ragbench_rag::document::{Chunk, Document, ScoredCandidate};
use ragbench_rag::scoring::reciprocal_rank_fusion;

/// Mixed ASCII and CJK text, so character and byte lengths differ.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            "[a-z]{1,6}".prop_map(|s| s),
            Just(" ".to_string()),
            Just("。".to_string()),
            Just("檢索".to_string()),
            Just(". ".to_string()),
        ],
        0..60,
    )
    .prop_map(|parts| parts.concat())
}

/// **Feature: ragbench-rag, Property 3: Fixed-size chunks tile the text**
/// *For any* text and size, fixed-size chunks SHALL concatenate back to the
/// input, number `ceil(L / size)` and hold at most `size` characters each.
mod prop_fixed_size_tiling {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_concatenate_to_input(text in arb_text(), size in 1usize..40) {
            let chunks = FixedSizeChunker::new(size).unwrap().split(&text);
            let len = text.chars().count();

            prop_assert_eq!(chunks.concat(), text.clone());
            prop_assert_eq!(chunks.len(), len.div_ceil(size));
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= size);
            }
        }
    }
}

/// **Feature: ragbench-rag, Property 4: Sliding windows advance by the step**
/// *For any* text, size and overlap below size, window `i` SHALL start at
/// character `i * (size - overlap)`, hold at most `size` characters, and text
/// no longer than `size` SHALL come back whole.
mod prop_sliding_window_layout {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn windows_start_on_step_boundaries(
            text in arb_text(),
            size in 1usize..30,
            overlap_seed in 0usize..30,
        ) {
            let overlap = overlap_seed % size;
            let chunker = SlidingWindowChunker::new(size, overlap).unwrap();
            let chunks = chunker.split(&text);
            let chars: Vec<char> = text.chars().collect();

            if chars.is_empty() {
                prop_assert!(chunks.is_empty());
            } else if chars.len() <= size {
                prop_assert_eq!(chunks, vec![text.clone()]);
            } else {
                let step = size - overlap;
                for (i, chunk) in chunks.iter().enumerate() {
                    let start = i * step;
                    let expected: String =
                        chars[start..(start + size).min(chars.len())].iter().collect();
                    prop_assert_eq!(chunk, &expected);
                }
                let spans = sliding_window_spans(chars.len(), size, overlap);
                prop_assert_eq!(spans.len(), chunks.len());
            }
        }
    }
}

/// **Feature: ragbench-rag, Property 5: Sentence chunks respect the target size**
/// *For any* text, sentence chunks SHALL be non-empty and trimmed, and no
/// longer than the target unless the chunk is one oversized sentence.
mod prop_sentence_chunks {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_stay_within_target(text in arb_text(), target in 1usize..50) {
            let chunker = SentenceChunker::new(target).unwrap();
            let sentences = split_sentences(&text);
            for chunk in chunker.split(&text) {
                prop_assert!(!chunk.is_empty());
                prop_assert_eq!(chunk.trim(), chunk.as_str());
                prop_assert!(
                    chunk.chars().count() <= target
                        || sentences.iter().any(|s| s.trim() == chunk),
                    "chunk {:?} exceeds {} characters",
                    chunk,
                    target
                );
            }
        }
    }
}

fn candidate(id: &str, score: f32) -> ScoredCandidate {
    let mut chunk = Chunk::from_document(&Document::new(id, id), 0, id.to_string());
    chunk.id = id.to_string();
    ScoredCandidate::new(chunk, score)
}

fn arb_ranking() -> impl Strategy<Value = Vec<ScoredCandidate>> {
    proptest::sample::subsequence(vec!["a", "b", "c", "d", "e", "f", "g"], 0..=7)
        .prop_shuffle()
        .prop_map(|ids| ids.into_iter().map(|id| candidate(id, 0.5)).collect())
}

/// **Feature: ragbench-rag, Property 6: Rank fusion covers every input**
/// *For any* set of rankings, fusion SHALL return each distinct chunk id once,
/// ordered by non-increasing fused score; fusing a single ranking SHALL keep
/// its order.
mod prop_rank_fusion {
    use std::collections::HashSet;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn fused_list_is_the_union_in_score_order(
            lists in proptest::collection::vec(arb_ranking(), 1..4),
        ) {
            let fused = reciprocal_rank_fusion(&lists, 60.0);
            let expected: HashSet<&str> =
                lists.iter().flatten().map(|c| c.chunk.id.as_str()).collect();
            let ids: Vec<&str> = fused.iter().map(|c| c.chunk.id.as_str()).collect();

            prop_assert_eq!(ids.len(), expected.len());
            prop_assert_eq!(ids.iter().copied().collect::<HashSet<_>>(), expected);
            for window in fused.windows(2) {
                prop_assert!(window[0].similarity_score >= window[1].similarity_score);
            }
        }

        #[test]
        fn single_ranking_keeps_its_order(list in arb_ranking()) {
            let fused = reciprocal_rank_fusion(std::slice::from_ref(&list), 60.0);
            let before: Vec<&str> = list.iter().map(|c| c.chunk.id.as_str()).collect();
            let after: Vec<&str> = fused.iter().map(|c| c.chunk.id.as_str()).collect();
            prop_assert_eq!(before, after);
        }
    }
}
