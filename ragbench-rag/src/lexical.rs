//! Lexical relevance signals: tokenization, a BM25 index and hashed sparse
//! vectors.
//!
//! These provide the second ranking signal for hybrid retrieval. Text is
//! tokenized into lowercase alphanumeric words, except that CJK ideographs
//! and kana are emitted one character per token, since those scripts are not
//! whitespace delimited. [`LexicalIndex`] registers the same tokenizer with
//! tantivy so indexed text and queries split identically.

use std::collections::BTreeMap;
use std::fmt;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::tokenizer::{Token, TokenStream, Tokenizer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term, doc};

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// Name the tokenizer is registered under in every index.
const TOKENIZER: &str = "ragbench";
/// Writer arena; tantivy refuses less than 15 MB per indexing thread.
const WRITER_HEAP_BYTES: usize = 20_000_000;

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF       // hiragana, katakana
        | 0x3400..=0x4DBF     // CJK extension A
        | 0x4E00..=0x9FFF     // CJK unified ideographs
        | 0xAC00..=0xD7AF     // hangul syllables
        | 0xF900..=0xFAFF     // compatibility ideographs
        | 0x20000..=0x2FA1F)
}

fn push_token(tokens: &mut Vec<Token>, offset_from: usize, offset_to: usize, text: String) {
    let position = tokens.len();
    tokens.push(Token { offset_from, offset_to, position, text, position_length: 1 });
}

/// Tokens with byte offsets into `text`.
fn tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word: Option<(usize, String)> = None;
    for (offset, c) in text.char_indices() {
        if is_cjk(c) {
            if let Some((from, w)) = word.take() {
                push_token(&mut tokens, from, offset, w);
            }
            push_token(&mut tokens, offset, offset + c.len_utf8(), c.to_string());
        } else if c.is_alphanumeric() {
            word.get_or_insert_with(|| (offset, String::new())).1.extend(c.to_lowercase());
        } else if let Some((from, w)) = word.take() {
            push_token(&mut tokens, from, offset, w);
        }
    }
    if let Some((from, w)) = word {
        push_token(&mut tokens, from, text.len(), w);
    }
    tokens
}

/// Split `text` into lowercase terms.
pub fn tokenize(text: &str) -> Vec<String> {
    tokens(text).into_iter().map(|t| t.text).collect()
}

/// [`tokenize`] as a tantivy tokenizer.
#[derive(Debug, Clone, Default)]
pub struct LexicalTokenizer;

/// Token stream over a pre-split token list.
pub struct LexicalTokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream for LexicalTokenStream {
    fn advance(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.cursor - 1]
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.tokens[self.cursor - 1]
    }
}

impl Tokenizer for LexicalTokenizer {
    type TokenStream<'a> = LexicalTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> LexicalTokenStream {
        LexicalTokenStream { tokens: tokens(text), cursor: 0 }
    }
}

fn index_error(err: tantivy::TantivyError) -> RagError {
    RagError::VectorStoreError { backend: "tantivy".to_string(), message: err.to_string() }
}

/// An in-RAM tantivy BM25 index over chunk text, keyed by chunk id.
///
/// Upserting a chunk id that is already indexed replaces its text. Scores
/// are tantivy's BM25 (k1 1.2, b 0.75).
pub struct LexicalIndex {
    writer: IndexWriter,
    reader: IndexReader,
    chunk_id: Field,
    text: Field,
}

impl LexicalIndex {
    /// Create an empty index.
    pub fn new() -> Result<Self> {
        let mut builder = Schema::builder();
        let chunk_id = builder.add_text_field("chunk_id", STRING | STORED);
        let indexing = TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text =
            builder.add_text_field("text", TextOptions::default().set_indexing_options(indexing));

        let index = Index::create_in_ram(builder.build());
        index.tokenizers().register(TOKENIZER, LexicalTokenizer);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(index_error)?;
        let writer: IndexWriter =
            index.writer_with_num_threads(1, WRITER_HEAP_BYTES).map_err(index_error)?;
        Ok(Self { writer, reader, chunk_id, text })
    }

    /// Number of live documents.
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index `chunks`, replacing any with the same id, and commit.
    pub fn upsert(&mut self, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            self.writer.delete_term(Term::from_field_text(self.chunk_id, &chunk.id));
            self.writer
                .add_document(doc!(
                    self.chunk_id => chunk.id.as_str(),
                    self.text => chunk.text.as_str(),
                ))
                .map_err(index_error)?;
        }
        self.writer.commit().map_err(index_error)?;
        self.reader.reload().map_err(index_error)
    }

    /// Chunk ids matching any query term, best BM25 score first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let clauses: Vec<(Occur, Box<dyn Query>)> = tokenize(query)
            .iter()
            .map(|term| {
                let term = Term::from_field_text(self.text, term);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        if clauses.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&BooleanQuery::new(clauses), &TopDocs::with_limit(limit))
            .map_err(index_error)?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address).map_err(index_error)?;
            if let Some(id) = doc.get_first(self.chunk_id).and_then(|v| v.as_str()) {
                hits.push((id.to_string(), score));
            }
        }
        Ok(hits)
    }
}

impl fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexicalIndex").field("docs", &self.len()).finish_non_exhaustive()
    }
}

/// 32-bit FNV-1a, stable across processes and platforms.
pub(crate) fn fnv1a(term: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in term.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Term-frequency sparse vector with hashed term indices, sorted by index.
///
/// IDF weighting is left to the store (Qdrant applies it server-side).
pub fn sparse_vector(text: &str) -> (Vec<u32>, Vec<f32>) {
    let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
    for token in tokenize(text) {
        *counts.entry(fnv1a(&token)).or_default() += 1.0;
    }
    counts.into_iter().unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                Chunk::from_document(&Document::new(i.to_string(), *text), 0, text.to_string())
            })
            .collect()
    }

    fn indexed(texts: &[&str]) -> (LexicalIndex, Vec<Chunk>) {
        let chunks = chunks(texts);
        let mut index = LexicalIndex::new().unwrap();
        index.upsert(&chunks).unwrap();
        (index, chunks)
    }

    #[test]
    fn tokenizes_words_and_cjk_characters() {
        assert_eq!(tokenize("Hello, World-2024!"), vec!["hello", "world", "2024"]);
        assert_eq!(tokenize("RAG是什麼"), vec!["rag", "是", "什", "麼"]);
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn token_offsets_point_into_the_source() {
        let text = "Vector 檢索";
        let spans: Vec<(usize, usize)> =
            tokens(text).iter().map(|t| (t.offset_from, t.offset_to)).collect();
        assert_eq!(&text[spans[0].0..spans[0].1], "Vector");
        assert_eq!(&text[spans[2].0..spans[2].1], "索");
    }

    #[test]
    fn bm25_prefers_documents_containing_query_terms() {
        let (index, chunks) = indexed(&[
            "the cat sat on the mat",
            "dogs chase cats in the park",
            "quantum retrieval with rerankers",
        ]);
        let hits = index.search("retrieval rerankers", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, chunks[2].id);
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn bm25_rare_terms_weigh_more() {
        let (index, chunks) = indexed(&["apple banana", "apple cherry", "apple durian"]);
        let hits = index.search("apple cherry", 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, chunks[1].id);
        assert!(hits[0].1 > hits[1].1);
        assert!((hits[1].1 - hits[2].1).abs() < 1e-6);
    }

    #[test]
    fn cjk_queries_match_single_characters() {
        let (index, chunks) = indexed(&["向量資料庫", "重新排序模型"]);
        let hits = index.search("什麼是向量", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, chunks[0].id);
    }

    #[test]
    fn upsert_replaces_text_for_the_same_id() {
        let mut index = LexicalIndex::new().unwrap();
        let mut chunk = chunks(&["old words"]).remove(0);
        index.upsert(std::slice::from_ref(&chunk)).unwrap();
        chunk.text = "fresh words".to_string();
        index.upsert(&[chunk]).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.search("old", 10).unwrap().is_empty());
        assert_eq!(index.search("fresh", 10).unwrap().len(), 1);
    }

    #[test]
    fn empty_index_and_empty_query_return_nothing() {
        let index = LexicalIndex::new().unwrap();
        assert!(index.is_empty());
        assert!(index.search("anything", 5).unwrap().is_empty());

        let (index, _) = indexed(&["some text"]);
        assert!(index.search("?!", 5).unwrap().is_empty());
        assert!(index.search("text", 0).unwrap().is_empty());
    }

    #[test]
    fn sparse_vector_counts_repeated_terms() {
        let (indices, values) = sparse_vector("rust rust 語");
        assert_eq!(indices.len(), 2);
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        let rust_pos = indices.iter().position(|&i| i == fnv1a("rust")).unwrap();
        assert_eq!(values[rust_pos], 2.0);
    }
}
