//! Bulk import of a plain-text source into a corpus.
//!
//! Format: one sentence per non-empty line. A TAB separates the sentence from an
//! optional translation. A line without a TAB may hold several sentences, split
//! after `.`, `!` or `?` when whitespace follows.

use crate::annotation::insert_sentence;
use crate::db;
use crate::error::{GlossaError, Result};
use crate::models::Sentence;
use crate::progress::{self, ProgressCallback, ProgressUpdate};
use crate::Glossary;
use log::{debug, info};
use rusqlite::TransactionBehavior;
use std::fs;
use std::path::Path;
use std::time::Instant;

const IMPORT_STAGE: &str = "Importing sentences";

/// A sentence as read from the source, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSentence {
    pub text: String,
    pub translation: Option<String>,
}

fn split_line(line: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next_c)) = chars.peek() {
                if next_c.is_whitespace() {
                    let piece = line[start..i + c.len_utf8()].trim();
                    if !piece.is_empty() {
                        sentences.push(piece.to_string());
                    }
                    start = next_i;
                }
            }
        }
    }
    let rest = line[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Splits source text into sentences (with translations where given).
pub fn split_sentences(text: &str) -> Vec<SourceSentence> {
    let mut out = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((sentence, translation)) => {
                let sentence = sentence.trim();
                if sentence.is_empty() {
                    continue;
                }
                let translation = translation.trim();
                out.push(SourceSentence {
                    text: sentence.to_string(),
                    translation: (!translation.is_empty()).then(|| translation.to_string()),
                });
            }
            None => out.extend(split_line(line).into_iter().map(|text| SourceSentence {
                text,
                translation: None,
            })),
        }
    }
    out
}

impl Glossary {
    /// Stores every sentence of `text` in a corpus inside one transaction.
    ///
    /// Returning `false` from the progress callback cancels the import and rolls
    /// back everything written so far.
    pub fn import_sentences(
        &self,
        corpus_id: i64,
        text: &str,
        mut progress: Option<ProgressCallback>,
    ) -> Result<Vec<Sentence>> {
        let start_time = Instant::now();
        let parsed = split_sentences(text);
        let total = parsed.len() as u64;
        info!("Importing {} sentences into corpus {}...", total, corpus_id);

        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !db::corpus_exists(&tx, corpus_id)? {
            return Err(GlossaError::ConstraintViolation(format!(
                "import references missing corpus {}",
                corpus_id
            )));
        }

        progress::report(
            &mut progress,
            ProgressUpdate::new_stage(IMPORT_STAGE.to_string(), Some(total)),
        );

        let mut stored = Vec::with_capacity(parsed.len());
        for (i, source) in parsed.iter().enumerate() {
            let sentence = insert_sentence(&tx, corpus_id, &source.text, source.translation.as_deref())?;
            let keep_going = progress::report(
                &mut progress,
                ProgressUpdate {
                    stage_description: IMPORT_STAGE.to_string(),
                    current_item: i as u64 + 1,
                    total_items: Some(total),
                    message: Some(format!("Sentence {}", sentence.id)),
                },
            );
            stored.push(sentence);
            if !keep_going {
                info!("Import into corpus {} cancelled after {} sentences.", corpus_id, i + 1);
                return Err(GlossaError::Cancelled(format!(
                    "import into corpus {} stopped at sentence {} of {}",
                    corpus_id,
                    i + 1,
                    total
                )));
            }
        }
        tx.commit()?;

        info!(
            "Imported {} sentences into corpus {}. Took {:.2?}",
            stored.len(),
            corpus_id,
            start_time.elapsed()
        );
        Ok(stored)
    }

    /// Reads a UTF-8 text file and imports it with `import_sentences`.
    pub fn import_file(
        &self,
        corpus_id: i64,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<Sentence>> {
        debug!("Reading corpus source {:?}", path);
        let text = fs::read_to_string(path)?;
        self.import_sentences(corpus_id, &text, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCorpus;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn store_with_corpus() -> (Glossary, i64) {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Glossary::open_in_memory().unwrap();
        let idiom = store.add_idiom("Portuguese", None).unwrap();
        let corpus = store
            .add_corpus(NewCorpus {
                name: "Contos".to_string(),
                idiom_id: idiom.id,
                ..NewCorpus::default()
            })
            .unwrap();
        (store, corpus.id)
    }

    #[test]
    fn test_split_sentences() {
        let text = "Eu corro. Tu corres!\n\n  Ele corre?\tDoes he run?\nv. 2.0 stays whole\n";
        let parsed = split_sentences(text);
        let texts: Vec<_> = parsed.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Eu corro.", "Tu corres!", "Ele corre?", "v.", "2.0 stays whole"]
        );
        assert_eq!(parsed[2].translation.as_deref(), Some("Does he run?"));
        assert_eq!(parsed[0].translation, None);
    }

    #[test]
    fn test_split_empty_translation() {
        let parsed = split_sentences("Sim.\t \n\tonly a translation\n");
        assert_eq!(
            parsed,
            vec![SourceSentence {
                text: "Sim.".to_string(),
                translation: None
            }]
        );
    }

    #[test]
    fn test_import_sentences_reports_progress() {
        let (store, corpus_id) = store_with_corpus();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Box::new(move |update| {
            sink.lock().unwrap().push((update.current_item, update.total_items));
            true
        });

        let stored = store
            .import_sentences(corpus_id, "Um.\tOne.\nDois. Três.", Some(callback))
            .unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].translation.as_deref(), Some("One."));
        assert_eq!(store.sentences_for_corpus(corpus_id).unwrap(), stored);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, Some(3)), (1, Some(3)), (2, Some(3)), (3, Some(3))]
        );
    }

    #[test]
    fn test_cancelled_import_rolls_back() {
        let (store, corpus_id) = store_with_corpus();
        let callback: ProgressCallback = Box::new(|update| update.current_item < 2);

        let err = store
            .import_sentences(corpus_id, "A.\nB.\nC.", Some(callback))
            .unwrap_err();
        assert!(matches!(err, GlossaError::Cancelled(_)));
        assert!(store.sentences_for_corpus(corpus_id).unwrap().is_empty());
    }

    #[test]
    fn test_import_missing_corpus() {
        let (store, _) = store_with_corpus();
        let err = store.import_sentences(77, "A.", None).unwrap_err();
        assert!(matches!(err, GlossaError::ConstraintViolation(_)));
    }

    #[test]
    fn test_import_file() {
        let (store, corpus_id) = store_with_corpus();
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("source.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "O cão ladra.\tThe dog barks.").unwrap();
        drop(file);

        let stored = store.import_file(corpus_id, &path, None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "O cão ladra.");

        let missing = store.import_file(corpus_id, &temp_dir.path().join("nope.txt"), None);
        assert!(matches!(missing.unwrap_err(), GlossaError::Io(_)));
    }
}
