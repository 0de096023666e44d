//! Sentences, words, morphs and glosses: the interlinear annotation store.

use crate::db;
use crate::error::{GlossaError, Result};
use crate::models::{
    Gloss, GlossFilter, Interlinear, InterlinearRow, Morph, MorphFilter, MorphMatch, Sentence, Word,
};
use crate::tokenizer;
use crate::Glossary;
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Drops repeated ids while keeping first-seen order.
fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl Glossary {
    // --- Sentences ---

    /// Adds a sentence to a corpus. Sentences are never deduplicated.
    pub fn add_sentence(
        &self,
        corpus_id: i64,
        text: &str,
        translation: Option<&str>,
    ) -> Result<Sentence> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !db::corpus_exists(&tx, corpus_id)? {
            return Err(GlossaError::ConstraintViolation(format!(
                "sentence references missing corpus {}",
                corpus_id
            )));
        }
        let sentence = insert_sentence(&tx, corpus_id, text, translation)?;
        tx.commit()?;
        debug!("Added sentence {} to corpus {}.", sentence.id, corpus_id);
        Ok(sentence)
    }

    pub fn get_sentence(&self, id: i64) -> Result<Sentence> {
        let conn = self.lock()?;
        db::fetch_sentence(&conn, id)?.ok_or_else(|| GlossaError::not_found("Sentence", id))
    }

    /// Sentences of a corpus in insertion order.
    pub fn sentences_for_corpus(&self, corpus_id: i64) -> Result<Vec<Sentence>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, corpus_id, text, translation FROM sentences WHERE corpus_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![corpus_id], db::row_to_sentence)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(GlossaError::from)
    }

    // --- Words ---

    /// Annotates token `number` of a sentence with `morph_ids`, in order.
    ///
    /// Upsert keyed by (sentence, number): resubmitting a position replaces its
    /// morph set rather than extending it.
    pub fn add_word(&self, sentence_id: i64, number: i64, morph_ids: &[i64]) -> Result<Word> {
        if number < 0 {
            return Err(GlossaError::InvalidArgument(format!(
                "word number must not be negative (got {})",
                number
            )));
        }
        let morph_ids = dedup_ids(morph_ids);

        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sentence = db::fetch_sentence(&tx, sentence_id)?.ok_or_else(|| {
            GlossaError::ConstraintViolation(format!(
                "word references missing sentence {}",
                sentence_id
            ))
        })?;
        let tokens = tokenizer::token_count(&sentence.text);
        if number as usize >= tokens {
            warn!(
                "Word number {} is past the {} tokens of sentence {}.",
                number, tokens, sentence_id
            );
        }
        for morph_id in &morph_ids {
            if !db::morph_exists(&tx, *morph_id)? {
                return Err(GlossaError::ConstraintViolation(format!(
                    "word references missing morph {}",
                    morph_id
                )));
            }
        }

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM words WHERE sentence_id = ?1 AND number = ?2",
                params![sentence_id, number],
                |row| row.get(0),
            )
            .optional()?;

        let word_id = match existing {
            Some(id) => {
                debug!("Replacing morphs of word {} ({}:{}).", id, sentence_id, number);
                tx.execute("DELETE FROM word_morphs WHERE word_id = ?1", params![id])?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO words (sentence_id, number) VALUES (?1, ?2)",
                    params![sentence_id, number],
                )
                .map_err(|e| db::map_constraint(e, "word", &format!("{}:{}", sentence_id, number)))?;
                tx.last_insert_rowid()
            }
        };

        {
            let mut link_stmt = tx.prepare(
                "INSERT INTO word_morphs (word_id, morph_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, morph_id) in morph_ids.iter().enumerate() {
                link_stmt.execute(params![word_id, morph_id, position as i64])?;
            }
        }
        tx.commit()?;

        db::fetch_word_at(&guard, sentence_id, number)?
            .ok_or_else(|| GlossaError::Internal(format!("word {} vanished after upsert", word_id)))
    }

    pub fn get_word(&self, sentence_id: i64, number: i64) -> Result<Word> {
        let conn = self.lock()?;
        db::fetch_word_at(&conn, sentence_id, number)?
            .ok_or_else(|| GlossaError::not_found("Word", format!("{}:{}", sentence_id, number)))
    }

    /// Stored words of a sentence ordered by number, morphs and glosses resolved.
    pub fn words_for_sentence(&self, sentence_id: i64) -> Result<Vec<Word>> {
        let conn = self.lock()?;
        if !db::sentence_exists(&conn, sentence_id)? {
            return Err(GlossaError::not_found("Sentence", sentence_id));
        }
        db::fetch_words_for_sentence(&conn, sentence_id)
    }

    // --- Morphs ---

    /// Adds a morph of an idiom carrying `gloss_ids`.
    ///
    /// With the default `MorphMatch::Covering`, a morph with the same text and
    /// idiom that already carries every requested gloss is reported as existing,
    /// so a superset matches but a disjoint gloss set does not.
    pub fn add_morph(&self, text: &str, idiom_id: i64, gloss_ids: &[i64]) -> Result<Morph> {
        let gloss_ids = dedup_ids(gloss_ids);

        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !db::idiom_exists(&tx, idiom_id)? {
            return Err(GlossaError::ConstraintViolation(format!(
                "morph '{}' references missing idiom {}",
                text, idiom_id
            )));
        }
        for gloss_id in &gloss_ids {
            if !db::gloss_exists(&tx, *gloss_id)? {
                return Err(GlossaError::ConstraintViolation(format!(
                    "morph '{}' references missing gloss {}",
                    text, gloss_id
                )));
            }
        }

        let requested: BTreeSet<i64> = gloss_ids.iter().copied().collect();
        if let Some(existing) = find_matching_morph(&tx, text, idiom_id, &requested, self.morph_match())? {
            debug!("Morph '{}' already stored as {}.", text, existing);
            return Err(GlossaError::duplicate(
                "morph",
                format!("{} (idiom {})", text, idiom_id),
            ));
        }

        tx.execute(
            "INSERT INTO morphs (text, idiom_id) VALUES (?1, ?2)",
            params![text, idiom_id],
        )
        .map_err(|e| db::map_constraint(e, "morph", text))?;
        let morph_id = tx.last_insert_rowid();
        {
            let mut link_stmt = tx.prepare(
                "INSERT INTO morph_glosses (morph_id, gloss_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, gloss_id) in gloss_ids.iter().enumerate() {
                link_stmt.execute(params![morph_id, gloss_id, position as i64])?;
            }
        }
        tx.commit()?;

        info!("Added morph '{}' (id {}, idiom {}).", text, morph_id, idiom_id);
        db::fetch_morph(&guard, morph_id)?
            .ok_or_else(|| GlossaError::Internal(format!("morph {} vanished after insert", morph_id)))
    }

    pub fn get_morph(&self, id: i64) -> Result<Morph> {
        let conn = self.lock()?;
        db::fetch_morph(&conn, id)?.ok_or_else(|| GlossaError::not_found("Morph", id))
    }

    /// Morphs matching every set criterion of `filter`, ordered by id.
    pub fn get_morphs(&self, filter: &MorphFilter) -> Result<Vec<Morph>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(id) = filter.id {
            conditions.push("id = ?".to_string());
            values.push(id.into());
        }
        if let Some(ids) = &filter.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            conditions.push(format!("id IN ({})", db::placeholders(ids.len())));
            values.extend(ids.iter().map(|id| Value::from(*id)));
        }
        if let Some(text) = &filter.text {
            conditions.push("text = ?".to_string());
            values.push(text.clone().into());
        }
        if let Some(idiom_id) = filter.idiom_id {
            conditions.push("idiom_id = ?".to_string());
            values.push(idiom_id.into());
        }

        let conn = self.lock()?;
        let ids = select_ids(&conn, "morphs", &conditions, &values)?;
        let mut morphs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(morph) = db::fetch_morph(&conn, id)? {
                morphs.push(morph);
            }
        }
        Ok(morphs)
    }

    // --- Glosses ---

    /// Adds a gloss tag such as "PL". Tags are unique; the definition is required.
    pub fn add_gloss(&self, tag: &str, definition: &str, note: Option<&str>) -> Result<Gloss> {
        if tag.trim().is_empty() {
            return Err(GlossaError::InvalidArgument("gloss tag is required".to_string()));
        }
        if definition.trim().is_empty() {
            return Err(GlossaError::InvalidArgument(format!(
                "gloss '{}' needs a definition",
                tag
            )));
        }

        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM glosses WHERE tag = ?1", params![tag], |row| row.get(0))
            .optional()?;
        if existing.is_some() {
            return Err(GlossaError::duplicate("gloss", tag));
        }

        tx.execute(
            "INSERT INTO glosses (tag, definition, note) VALUES (?1, ?2, ?3)",
            params![tag, definition, note],
        )
        .map_err(|e| db::map_constraint(e, "gloss", tag))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Added gloss '{}' (id {}).", tag, id);
        Ok(Gloss {
            id,
            tag: tag.to_string(),
            definition: definition.to_string(),
            note: note.map(str::to_string),
        })
    }

    /// Glosses matching every set criterion of `filter`, ordered by id.
    pub fn get_glosses(&self, filter: &GlossFilter) -> Result<Vec<Gloss>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(id) = filter.id {
            conditions.push("id = ?".to_string());
            values.push(id.into());
        }
        if let Some(ids) = &filter.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            conditions.push(format!("id IN ({})", db::placeholders(ids.len())));
            values.extend(ids.iter().map(|id| Value::from(*id)));
        }
        if let Some(tag) = &filter.tag {
            conditions.push("tag = ?".to_string());
            values.push(tag.clone().into());
        }

        let conn = self.lock()?;
        let mut sql = "SELECT id, tag, definition, note FROM glosses".to_string();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), db::row_to_gloss)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(GlossaError::from)
    }

    pub fn get_gloss_by_tag(&self, tag: &str) -> Result<Gloss> {
        self.get_glosses(&GlossFilter {
            tag: Some(tag.to_string()),
            ..GlossFilter::default()
        })?
        .into_iter()
        .next()
        .ok_or_else(|| GlossaError::not_found("Gloss", tag))
    }

    // --- Search ---

    /// Every word annotated with a morph whose text is exactly `text` (case-sensitive).
    ///
    /// Results come ordered by sentence and position with all morphs and glosses
    /// loaded. No match is an empty vector.
    pub fn search_by_morph_text(&self, text: &str) -> Result<Vec<Word>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT w.id, w.sentence_id, w.number
             FROM words w
             JOIN word_morphs wm ON wm.word_id = w.id
             JOIN morphs m ON m.id = wm.morph_id
             WHERE m.text = ?1
             ORDER BY w.sentence_id, w.number",
        )?;
        let rows = stmt
            .query_map(params![text], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut words = Vec::with_capacity(rows.len());
        for (id, sentence_id, number) in rows {
            words.push(Word {
                id,
                sentence_id,
                number,
                morphs: db::fetch_morphs_for_word(&conn, id)?,
            });
        }
        debug!("search_by_morph_text('{}'): {} words", text, words.len());
        Ok(words)
    }

    // --- Interlinear view ---

    /// Aligns each token of a sentence with the word stored at its position.
    pub fn interlinear(&self, sentence_id: i64) -> Result<Interlinear> {
        let conn = self.lock()?;
        let sentence = db::fetch_sentence(&conn, sentence_id)?
            .ok_or_else(|| GlossaError::not_found("Sentence", sentence_id))?;
        let mut by_number: HashMap<i64, Word> = db::fetch_words_for_sentence(&conn, sentence_id)?
            .into_iter()
            .map(|w| (w.number, w))
            .collect();

        let rows: Vec<InterlinearRow> = tokenizer::tokenize(&sentence.text)
            .map(|(index, token)| InterlinearRow {
                index,
                token: token.to_string(),
                word: by_number.remove(&(index as i64)),
            })
            .collect();

        let mut orphans: Vec<Word> = by_number.into_values().collect();
        orphans.sort_by_key(|w| w.number);
        if !orphans.is_empty() {
            warn!(
                "Sentence {} has {} words outside its token range.",
                sentence_id,
                orphans.len()
            );
        }

        Ok(Interlinear {
            sentence,
            rows,
            orphans,
        })
    }
}

// --- Internal helpers ---

pub(crate) fn insert_sentence(
    conn: &Connection,
    corpus_id: i64,
    text: &str,
    translation: Option<&str>,
) -> Result<Sentence> {
    conn.execute(
        "INSERT INTO sentences (corpus_id, text, translation) VALUES (?1, ?2, ?3)",
        params![corpus_id, text, translation],
    )
    .map_err(|e| db::map_constraint(e, "sentence", text))?;
    Ok(Sentence {
        id: conn.last_insert_rowid(),
        corpus_id,
        text: text.to_string(),
        translation: translation.map(str::to_string),
    })
}

fn select_ids(conn: &Connection, table: &str, conditions: &[String], values: &[Value]) -> Result<Vec<i64>> {
    let mut sql = format!("SELECT id FROM {}", table);
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, i64>(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(GlossaError::from)
}

/// Id of a stored morph that counts as a duplicate of (text, idiom, requested).
fn find_matching_morph(
    conn: &Connection,
    text: &str,
    idiom_id: i64,
    requested: &BTreeSet<i64>,
    policy: MorphMatch,
) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM morphs WHERE text = ?1 AND idiom_id = ?2 ORDER BY id")?;
    let candidates = stmt
        .query_map(params![text, idiom_id], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut gloss_stmt = conn.prepare("SELECT gloss_id FROM morph_glosses WHERE morph_id = ?1")?;
    for candidate in candidates {
        let attached = gloss_stmt
            .query_map(params![candidate], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        let matches = match policy {
            MorphMatch::Covering => requested.is_subset(&attached),
            MorphMatch::Exact => *requested == attached,
        };
        if matches {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCorpus;

    struct Fixture {
        store: Glossary,
        idiom: i64,
        sentence: Sentence,
        pl: Gloss,
        sg: Gloss,
    }

    fn fixture_with(policy: MorphMatch) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Glossary::open_in_memory_with(policy).unwrap();
        let idiom = store.add_idiom("English", None).unwrap().id;
        let corpus = store
            .add_corpus(NewCorpus {
                name: "Fieldnotes".to_string(),
                source: "Recorded 2024".to_string(),
                description: "Elicited sentences".to_string(),
                idiom_id: idiom,
            })
            .unwrap();
        let sentence = store
            .add_sentence(corpus.id, "The dogs run fast.", Some("Os cães correm rápido."))
            .unwrap();
        let pl = store.add_gloss("PL", "plural marker", None).unwrap();
        let sg = store.add_gloss("SG", "singular", Some("often unmarked")).unwrap();
        Fixture {
            store,
            idiom,
            sentence,
            pl,
            sg,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MorphMatch::Covering)
    }

    #[test]
    fn test_duplicate_gloss_keeps_one_row() {
        let f = fixture();
        let err = f.store.add_gloss("PL", "something else", None).unwrap_err();
        assert!(err.is_duplicate(), "unexpected error: {err:?}");

        let tagged = f
            .store
            .get_glosses(&GlossFilter {
                tag: Some("PL".to_string()),
                ..GlossFilter::default()
            })
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].definition, "plural marker");
    }

    #[test]
    fn test_concurrent_adds_on_cloned_handles() {
        let f = fixture();
        let morph = f.store.add_morph("dog", f.idiom, &[]).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = f.store.clone();
                let sentence_id = f.sentence.id;
                let morph_id = morph.id;
                std::thread::spawn(move || {
                    let gloss = store.add_gloss("DU", &format!("dual {}", i), None);
                    store.add_word(sentence_id, 1, &[morph_id]).unwrap();
                    gloss
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(|r| r.err()) {
            assert!(err.is_duplicate(), "unexpected error: {err:?}");
        }
        let dual = f
            .store
            .get_glosses(&GlossFilter {
                tag: Some("DU".to_string()),
                ..GlossFilter::default()
            })
            .unwrap();
        assert_eq!(dual.len(), 1);

        let words = f.store.words_for_sentence(f.sentence.id).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].number, 1);
        assert_eq!(words[0].morphs, vec![morph]);
    }

    #[test]
    fn test_gloss_requires_definition() {
        let f = fixture();
        assert!(matches!(
            f.store.add_gloss("DU", "  ", None).unwrap_err(),
            GlossaError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_get_glosses_by_id_set() {
        let f = fixture();
        let both = f
            .store
            .get_glosses(&GlossFilter {
                ids: Some(vec![f.sg.id, f.pl.id, 999]),
                ..GlossFilter::default()
            })
            .unwrap();
        assert_eq!(both, vec![f.pl.clone(), f.sg.clone()]);

        let none = f
            .store
            .get_glosses(&GlossFilter {
                ids: Some(Vec::new()),
                ..GlossFilter::default()
            })
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(f.store.get_gloss_by_tag("SG").unwrap(), f.sg);
        assert!(f.store.get_gloss_by_tag("ERG").unwrap_err().is_not_found());
    }

    #[test]
    fn test_morph_covering_duplicate_check() {
        let f = fixture();
        let first = f.store.add_morph("s", f.idiom, &[f.pl.id]).unwrap();
        assert_eq!(first.glosses, vec![f.pl.clone()]);

        let err = f.store.add_morph("s", f.idiom, &[f.pl.id]).unwrap_err();
        assert!(err.is_duplicate());

        // Disjoint gloss set is not caught: a second morph with the same text and idiom.
        let second = f.store.add_morph("s", f.idiom, &[f.sg.id]).unwrap();
        assert_ne!(first.id, second.id);

        let same_text = f
            .store
            .get_morphs(&MorphFilter {
                text: Some("s".to_string()),
                idiom_id: Some(f.idiom),
                ..MorphFilter::default()
            })
            .unwrap();
        assert_eq!(same_text.len(), 2);
    }

    #[test]
    fn test_morph_superset_reported_as_duplicate() {
        let f = fixture();
        f.store.add_morph("en", f.idiom, &[f.pl.id, f.sg.id]).unwrap();
        // Every requested gloss is already attached to the stored morph.
        assert!(f.store.add_morph("en", f.idiom, &[f.pl.id]).unwrap_err().is_duplicate());
        // An empty request is covered by any morph with the same text.
        assert!(f.store.add_morph("en", f.idiom, &[]).unwrap_err().is_duplicate());
    }

    #[test]
    fn test_morph_exact_duplicate_check() {
        let f = fixture_with(MorphMatch::Exact);
        f.store.add_morph("en", f.idiom, &[f.pl.id, f.sg.id]).unwrap();
        let subset = f.store.add_morph("en", f.idiom, &[f.pl.id]).unwrap();
        assert_eq!(subset.glosses, vec![f.pl.clone()]);
        assert!(f
            .store
            .add_morph("en", f.idiom, &[f.sg.id, f.pl.id])
            .unwrap_err()
            .is_duplicate());
    }

    #[test]
    fn test_morph_same_text_other_idiom() {
        let f = fixture();
        let german = f.store.add_idiom("German", None).unwrap();
        f.store.add_morph("s", f.idiom, &[f.pl.id]).unwrap();
        let other = f.store.add_morph("s", german.id, &[f.pl.id]).unwrap();
        assert_eq!(other.idiom_id, german.id);
    }

    #[test]
    fn test_morph_missing_references() {
        let f = fixture();
        assert!(matches!(
            f.store.add_morph("x", 999, &[]).unwrap_err(),
            GlossaError::ConstraintViolation(_)
        ));
        assert!(matches!(
            f.store.add_morph("x", f.idiom, &[999]).unwrap_err(),
            GlossaError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn test_get_morphs_by_ids() {
        let f = fixture();
        let a = f.store.add_morph("dog", f.idiom, &[]).unwrap();
        let b = f.store.add_morph("s", f.idiom, &[f.pl.id]).unwrap();
        let found = f
            .store
            .get_morphs(&MorphFilter {
                ids: Some(vec![b.id, a.id]),
                ..MorphFilter::default()
            })
            .unwrap();
        assert_eq!(found, vec![a.clone(), b]);
        assert_eq!(f.store.get_morph(a.id).unwrap(), a);
        assert!(f.store.get_morph(404).unwrap_err().is_not_found());
    }

    #[test]
    fn test_word_upsert_replaces_morphs() {
        let f = fixture();
        let m1 = f.store.add_morph("dog", f.idiom, &[]).unwrap();
        let m2 = f.store.add_morph("s", f.idiom, &[f.pl.id]).unwrap();

        let first = f.store.add_word(f.sentence.id, 0, &[m1.id]).unwrap();
        let second = f.store.add_word(f.sentence.id, 0, &[m2.id]).unwrap();
        assert_eq!(first.id, second.id);

        let words = f.store.words_for_sentence(f.sentence.id).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].number, 0);
        assert_eq!(words[0].morphs, vec![m2]);
        assert!(f.store.words_for_sentence(999).unwrap_err().is_not_found());
    }

    #[test]
    fn test_word_keeps_morph_order() {
        let f = fixture();
        let stem = f.store.add_morph("dog", f.idiom, &[]).unwrap();
        let suffix = f.store.add_morph("s", f.idiom, &[f.pl.id]).unwrap();
        let word = f
            .store
            .add_word(f.sentence.id, 1, &[stem.id, suffix.id, stem.id])
            .unwrap();
        let texts: Vec<_> = word.morphs.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["dog", "s"]);
        assert_eq!(word.morphs[1].gloss_label(), "PL");
        assert_eq!(f.store.get_word(f.sentence.id, 1).unwrap(), word);
        assert!(f.store.get_word(f.sentence.id, 2).unwrap_err().is_not_found());
    }

    #[test]
    fn test_word_references_checked() {
        let f = fixture();
        assert!(matches!(
            f.store.add_word(999, 0, &[]).unwrap_err(),
            GlossaError::ConstraintViolation(_)
        ));
        assert!(matches!(
            f.store.add_word(f.sentence.id, 0, &[12345]).unwrap_err(),
            GlossaError::ConstraintViolation(_)
        ));
        assert!(matches!(
            f.store.add_word(f.sentence.id, -1, &[]).unwrap_err(),
            GlossaError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_search_by_morph_text() {
        let f = fixture();
        let run = f.store.add_morph("run", f.idiom, &[]).unwrap();
        let dog = f.store.add_morph("dog", f.idiom, &[]).unwrap();
        let pl = f.store.add_morph("s", f.idiom, &[f.pl.id]).unwrap();
        f.store.add_word(f.sentence.id, 1, &[dog.id, pl.id]).unwrap();
        f.store.add_word(f.sentence.id, 2, &[run.id]).unwrap();

        let hits = f.store.search_by_morph_text("s").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].number, 1);
        // Full annotation comes back with the hit.
        assert_eq!(hits[0].morphs.len(), 2);
        assert_eq!(hits[0].morphs[1].glosses, vec![f.pl.clone()]);

        assert_eq!(f.store.search_by_morph_text("run").unwrap().len(), 1);
        assert!(f.store.search_by_morph_text("Run").unwrap().is_empty());
        assert!(f.store.search_by_morph_text("walk").unwrap().is_empty());
    }

    #[test]
    fn test_search_without_morph_is_empty() {
        let f = fixture();
        assert_eq!(f.store.search_by_morph_text("run").unwrap(), Vec::<Word>::new());
    }

    #[test]
    fn test_sentences_for_corpus() {
        let f = fixture();
        let extra = f
            .store
            .add_sentence(f.sentence.corpus_id, "Cats sleep.", None)
            .unwrap();
        let sentences = f.store.sentences_for_corpus(f.sentence.corpus_id).unwrap();
        assert_eq!(sentences, vec![f.sentence.clone(), extra]);
        assert_eq!(f.store.get_sentence(f.sentence.id).unwrap(), f.sentence);
        assert!(matches!(
            f.store.add_sentence(999, "Nowhere.", None).unwrap_err(),
            GlossaError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn test_interlinear_alignment() {
        let f = fixture();
        let dog = f.store.add_morph("dog", f.idiom, &[]).unwrap();
        let pl = f.store.add_morph("s", f.idiom, &[f.pl.id]).unwrap();
        f.store.add_word(f.sentence.id, 1, &[dog.id, pl.id]).unwrap();
        f.store.add_word(f.sentence.id, 9, &[dog.id]).unwrap();

        let view = f.store.interlinear(f.sentence.id).unwrap();
        let tokens: Vec<_> = view.rows.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["The", "dogs", "run", "fast"]);
        assert!(view.rows[0].word.is_none());
        assert_eq!(view.rows[1].word.as_ref().unwrap().morphs.len(), 2);
        assert_eq!(view.orphans.len(), 1);
        assert_eq!(view.orphans[0].number, 9);

        assert!(f.store.interlinear(999).unwrap_err().is_not_found());
    }
}
