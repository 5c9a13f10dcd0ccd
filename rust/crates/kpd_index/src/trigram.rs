//! Tantivy-backed trigram index over code and names.
//!
//! Names are indexed with a 3-gram tokenizer so any contiguous substring of
//! three or more characters matches ("žitar" finds "Uzgoj žitarica"). Inputs
//! shorter than one trigram fall back to word-prefix matching on a
//! word-tokenized copy of each field.
//!
//! The index holds one document per `full_code`. Updates replace by deleting
//! the code's term and re-adding in the same commit; the reader is reloaded
//! before `apply` returns so the next search sees the change. A write that
//! fails before its commit is rolled back.

use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, NgramTokenizer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use kpd_core::{ClassificationEntry, SearchLanguage, StoreError, TextQuery};

/// Custom tokenizer name for trigram substring search
const NGRAM_TOKENIZER: &str = "ngram3";

/// Characters in one gram.
const GRAM: usize = 3;

/// Writer heap budget.
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index build failed: {0}")]
    BuildFailed(String),
    #[error("Index write failed: {0}")]
    WriteFailed(String),
    #[error("Search failed: {0}")]
    SearchFailed(String),
}

impl From<IndexError> for StoreError {
    fn from(e: IndexError) -> Self {
        StoreError::Index(e.to_string())
    }
}

#[derive(Clone, Copy)]
struct FieldPair {
    /// Trigram-tokenized
    grams: Field,
    /// Word-tokenized, for short inputs
    words: Field,
}

pub struct TrigramIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    /// Raw full code; delete key and hit identity.
    key_field: Field,
    code: FieldPair,
    name_hr: FieldPair,
    name_en: FieldPair,
}

impl TrigramIndex {
    /// Create an empty in-RAM index.
    pub fn new() -> Result<Self, IndexError> {
        let mut schema_builder = Schema::builder();

        let key_field = schema_builder.add_text_field("full_code", STRING | STORED);

        let gram_opts = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(NGRAM_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let word_opts = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("default")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let mut pair = |name: &str| FieldPair {
            grams: schema_builder.add_text_field(name, gram_opts.clone()),
            words: schema_builder.add_text_field(&format!("{name}_words"), word_opts.clone()),
        };
        let code = pair("code");
        let name_hr = pair("name_hr");
        let name_en = pair("name_en");

        let schema = schema_builder.build();
        let index = Index::create_in_ram(schema);

        let ngram = NgramTokenizer::new(GRAM, GRAM, false)
            .map_err(|e| IndexError::BuildFailed(e.to_string()))?;
        let analyzer = TextAnalyzer::builder(ngram).filter(LowerCaser).build();
        index.tokenizers().register(NGRAM_TOKENIZER, analyzer);

        let writer = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| IndexError::BuildFailed(e.to_string()))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::BuildFailed(e.to_string()))?;

        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
            key_field,
            code,
            name_hr,
            name_en,
        })
    }

    /// Number of indexed documents.
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the documents for `upserts` and drop those for `removals`,
    /// in one commit.
    pub fn apply(
        &self,
        upserts: &[ClassificationEntry],
        removals: &[String],
    ) -> Result<(), IndexError> {
        self.write(|writer| {
            for code in removals {
                writer.delete_term(Term::from_field_text(self.key_field, code));
            }
            for entry in upserts {
                writer.delete_term(Term::from_field_text(self.key_field, &entry.full_code));
                writer
                    .add_document(self.document(entry))
                    .map_err(|e| IndexError::WriteFailed(e.to_string()))?;
            }
            Ok(())
        })
    }

    /// Clear the index and add one document per entry, in one commit.
    pub fn rebuild<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a ClassificationEntry>,
    ) -> Result<u64, IndexError> {
        let start = std::time::Instant::now();
        let mut indexed = 0u64;

        self.write(|writer| {
            writer
                .delete_all_documents()
                .map_err(|e| IndexError::BuildFailed(e.to_string()))?;
            for entry in entries {
                writer
                    .add_document(self.document(entry))
                    .map_err(|e| IndexError::BuildFailed(e.to_string()))?;
                indexed += 1;
            }
            Ok(())
        })?;

        tracing::info!(
            indexed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Trigram index rebuilt"
        );
        Ok(indexed)
    }

    /// Full codes of the best matches, best first.
    pub fn search(&self, query: &TextQuery) -> Result<Vec<String>, IndexError> {
        if query.fetch_limit == 0 || query.term.trim().is_empty() {
            return Ok(Vec::new());
        }

        let fields = self.fields_for(query.language);
        let tantivy_query = if query.term.chars().count() < GRAM {
            self.word_prefix_query(&query.term, &fields)
        } else {
            self.phrase_query(&query.phrase, &fields)?
        };

        let searcher = self.reader.searcher();
        // The collector allocates for the full limit up front.
        let docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
        let limit = query.fetch_limit.min(docs).max(1);
        let top_docs = searcher
            .search(&*tantivy_query, &TopDocs::with_limit(limit))
            .map_err(|e| IndexError::SearchFailed(e.to_string()))?;

        let mut codes = Vec::with_capacity(top_docs.len());
        for (_score, doc_addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_addr)
                .map_err(|e| IndexError::SearchFailed(e.to_string()))?;
            if let Some(code) = doc.get_first(self.key_field).and_then(|v| v.as_str()) {
                codes.push(code.to_string());
            }
        }
        Ok(codes)
    }

    /// Queue operations with `stage` and commit them.
    ///
    /// Anything queued is rolled back if staging or the commit fails, so a
    /// failed write never rides along with the next commit. Once the commit
    /// succeeds the write counts as applied even if the reader reload fails;
    /// searches then see it after the next successful reload.
    fn write<F>(&self, stage: F) -> Result<(), IndexError>
    where
        F: FnOnce(&mut IndexWriter) -> Result<(), IndexError>,
    {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IndexError::WriteFailed("writer lock poisoned".into()))?;

        let staged = stage(&mut *writer).and_then(|()| {
            writer
                .commit()
                .map(|_| ())
                .map_err(|e| IndexError::WriteFailed(e.to_string()))
        });
        if let Err(e) = staged {
            if let Err(rollback) = writer.rollback() {
                tracing::error!(error = %rollback, "Index rollback failed");
            }
            return Err(e);
        }

        if let Err(e) = self.reader.reload() {
            tracing::warn!(error = %e, "Index committed but reader reload failed");
        }
        Ok(())
    }

    fn document(&self, entry: &ClassificationEntry) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.key_field, &entry.full_code);
        for (pair, value) in [
            (self.code, &entry.full_code),
            (self.name_hr, &entry.name_hr),
            (self.name_en, &entry.name_en),
        ] {
            doc.add_text(pair.grams, value);
            doc.add_text(pair.words, value);
        }
        doc
    }

    fn fields_for(&self, language: SearchLanguage) -> Vec<FieldPair> {
        let mut fields = Vec::with_capacity(3);
        if language.includes_code() {
            fields.push(self.code);
        }
        if language.includes_hr() {
            fields.push(self.name_hr);
        }
        if language.includes_en() {
            fields.push(self.name_en);
        }
        fields
    }

    /// Parse an already-quoted phrase against the trigram fields.
    fn phrase_query(&self, phrase: &str, fields: &[FieldPair]) -> Result<Box<dyn Query>, IndexError> {
        let parser =
            QueryParser::for_index(&self.index, fields.iter().map(|f| f.grams).collect());

        match parser.parse_query(phrase) {
            Ok(query) => Ok(query),
            Err(e) => {
                // Retry without the characters the grammar may reject.
                tracing::warn!(error = %e, phrase, "Phrase parse failed, retrying sanitised");
                let bare: String = phrase
                    .trim_matches('"')
                    .chars()
                    .filter(|c| !matches!(c, '"' | '\\'))
                    .collect();
                parser
                    .parse_query(&format!("\"{bare}\""))
                    .map_err(|e| IndexError::SearchFailed(e.to_string()))
            }
        }
    }

    fn word_prefix_query(&self, term: &str, fields: &[FieldPair]) -> Box<dyn Query> {
        let term = term.trim().to_lowercase();
        let clauses: Vec<(Occur, Box<dyn Query>)> = fields
            .iter()
            .map(|f| {
                let query: Box<dyn Query> = Box::new(FuzzyTermQuery::new_prefix(
                    Term::from_field_text(f.words, &term),
                    0,
                    true,
                ));
                (Occur::Should, query)
            })
            .collect();
        Box::new(BooleanQuery::new(clauses))
    }
}
