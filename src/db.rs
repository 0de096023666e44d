use crate::error::{GlossaError, Result};
use crate::models::{Corpus, Gloss, Idiom, Morph, Sentence, User, Word};
use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, ffi, params};

// --- Schema Definition ---

const SCHEMA_VERSION: u32 = 1;

const CREATE_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

const CREATE_USERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    login TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0 -- 0 for false, 1 for true
);";

const CREATE_IDIOMS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS idioms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    group_id INTEGER, -- Parent idiom, NULL for top-level groups
    FOREIGN KEY (group_id) REFERENCES idioms(id)
);";

const CREATE_CORPORA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS corpora (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    description TEXT NOT NULL,
    idiom_id INTEGER NOT NULL,
    FOREIGN KEY (idiom_id) REFERENCES idioms(id)
);";

const CREATE_SENTENCES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS sentences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    corpus_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    translation TEXT,
    FOREIGN KEY (corpus_id) REFERENCES corpora(id)
);";

const CREATE_WORDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS words (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sentence_id INTEGER NOT NULL,
    number INTEGER NOT NULL, -- Token index within the sentence
    UNIQUE (sentence_id, number),
    FOREIGN KEY (sentence_id) REFERENCES sentences(id)
);";

const CREATE_MORPHS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS morphs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    idiom_id INTEGER NOT NULL,
    FOREIGN KEY (idiom_id) REFERENCES idioms(id)
);";

const CREATE_GLOSSES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS glosses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag TEXT NOT NULL UNIQUE,
    definition TEXT NOT NULL,
    note TEXT
);";

const CREATE_WORD_MORPHS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS word_morphs (
    word_id INTEGER NOT NULL,
    morph_id INTEGER NOT NULL,
    position INTEGER NOT NULL, -- Order of the morph inside the word
    PRIMARY KEY (word_id, morph_id),
    FOREIGN KEY (word_id) REFERENCES words(id),
    FOREIGN KEY (morph_id) REFERENCES morphs(id)
);";

const CREATE_MORPH_GLOSSES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS morph_glosses (
    morph_id INTEGER NOT NULL,
    gloss_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (morph_id, gloss_id),
    FOREIGN KEY (morph_id) REFERENCES morphs(id),
    FOREIGN KEY (gloss_id) REFERENCES glosses(id)
);";

// --- Indices ---

const CREATE_IDIOM_GROUP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_idiom_group ON idioms (group_id);";
const CREATE_CORPUS_IDIOM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_corpus_idiom ON corpora (idiom_id);";
const CREATE_SENTENCE_CORPUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_sentence_corpus ON sentences (corpus_id);";
const CREATE_MORPH_TEXT_IDIOM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_morph_text_idiom ON morphs (text, idiom_id);";
const CREATE_WORD_MORPH_MORPH_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_word_morph_morph ON word_morphs (morph_id);";
const CREATE_MORPH_GLOSS_GLOSS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_morph_gloss_gloss ON morph_glosses (gloss_id);";

// --- Initialization Function ---

/// Creates all necessary tables and indices in the database if they don't exist.
/// Also checks and sets the schema version.
pub fn initialize_database(conn: &mut Connection) -> Result<()> {
    info!(
        "Initializing database schema (version {})...",
        SCHEMA_VERSION
    );
    let tx = conn.transaction()?;

    tx.execute(CREATE_METADATA_TABLE, [])?;
    tx.execute(CREATE_USERS_TABLE, [])?;
    tx.execute(CREATE_IDIOMS_TABLE, [])?;
    tx.execute(CREATE_CORPORA_TABLE, [])?;
    tx.execute(CREATE_SENTENCES_TABLE, [])?;
    tx.execute(CREATE_WORDS_TABLE, [])?;
    tx.execute(CREATE_MORPHS_TABLE, [])?;
    tx.execute(CREATE_GLOSSES_TABLE, [])?;
    tx.execute(CREATE_WORD_MORPHS_TABLE, [])?;
    tx.execute(CREATE_MORPH_GLOSSES_TABLE, [])?;

    tx.execute(CREATE_IDIOM_GROUP_INDEX, [])?;
    tx.execute(CREATE_CORPUS_IDIOM_INDEX, [])?;
    tx.execute(CREATE_SENTENCE_CORPUS_INDEX, [])?;
    tx.execute(CREATE_MORPH_TEXT_IDIOM_INDEX, [])?;
    tx.execute(CREATE_WORD_MORPH_MORPH_INDEX, [])?;
    tx.execute(CREATE_MORPH_GLOSS_GLOSS_INDEX, [])?;

    let existing_version_str: Option<String> = tx
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing_version_str {
        Some(v_str) => {
            let existing_version: u32 = v_str.parse().map_err(|e| {
                GlossaError::Internal(format!(
                    "Failed to parse existing schema version '{}': {}",
                    v_str, e
                ))
            })?;
            match existing_version.cmp(&SCHEMA_VERSION) {
                std::cmp::Ordering::Less => {
                    warn!(
                        "Database schema version ({}) is older than expected ({}). Updating version marker.",
                        existing_version, SCHEMA_VERSION
                    );
                    tx.execute(
                        "UPDATE metadata SET value = ?1 WHERE key = 'schema_version'",
                        params![SCHEMA_VERSION.to_string()],
                    )?;
                }
                std::cmp::Ordering::Greater => {
                    warn!(
                        "Database schema version ({}) is newer than expected ({}). Using potentially incompatible schema.",
                        existing_version, SCHEMA_VERSION
                    );
                }
                std::cmp::Ordering::Equal => {
                    debug!(
                        "Database schema version ({}) matches expected version.",
                        existing_version
                    );
                }
            }
        }
        None => {
            tx.execute(
                "INSERT INTO metadata (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
            info!("Set initial schema version in metadata table.");
        }
    }

    tx.commit()?;
    info!("Database schema initialization complete.");
    Ok(())
}

/// Deletes every record while keeping the schema and metadata.
pub fn clear_database_data(tx: &Transaction) -> Result<()> {
    info!("Clearing existing data from database tables...");
    // Referencing tables first
    tx.execute("DELETE FROM word_morphs", [])?;
    tx.execute("DELETE FROM morph_glosses", [])?;
    tx.execute("DELETE FROM words", [])?;
    tx.execute("DELETE FROM morphs", [])?;
    tx.execute("DELETE FROM glosses", [])?;
    tx.execute("DELETE FROM sentences", [])?;
    tx.execute("DELETE FROM corpora", [])?;
    tx.execute("UPDATE idioms SET group_id = NULL", [])?;
    tx.execute("DELETE FROM idioms", [])?;
    tx.execute("DELETE FROM users", [])?;
    info!("Finished clearing data.");
    Ok(())
}

// --- Error mapping ---

/// Turns a SQLite constraint failure into the crate's domain errors.
///
/// UNIQUE/PRIMARY KEY failures become `Duplicate`, FOREIGN KEY failures become
/// `ConstraintViolation`; anything else stays a database error.
pub(crate) fn map_constraint(err: rusqlite::Error, entity: &'static str, key: &str) -> GlossaError {
    if let rusqlite::Error::SqliteFailure(ref failure, ref msg) = err {
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return GlossaError::duplicate(entity, key);
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                return GlossaError::ConstraintViolation(format!(
                    "{} '{}' references a missing record{}",
                    entity,
                    key,
                    msg.as_deref().map(|m| format!(" ({})", m)).unwrap_or_default()
                ));
            }
            _ => {}
        }
    }
    GlossaError::Database(err)
}

/// "?, ?, ?" for an IN list of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// --- Existence checks ---

pub(crate) fn idiom_exists(conn: &Connection, id: i64) -> Result<bool> {
    row_exists(conn, "SELECT 1 FROM idioms WHERE id = ?1", id)
}

pub(crate) fn corpus_exists(conn: &Connection, id: i64) -> Result<bool> {
    row_exists(conn, "SELECT 1 FROM corpora WHERE id = ?1", id)
}

pub(crate) fn sentence_exists(conn: &Connection, id: i64) -> Result<bool> {
    row_exists(conn, "SELECT 1 FROM sentences WHERE id = ?1", id)
}

pub(crate) fn morph_exists(conn: &Connection, id: i64) -> Result<bool> {
    row_exists(conn, "SELECT 1 FROM morphs WHERE id = ?1", id)
}

pub(crate) fn gloss_exists(conn: &Connection, id: i64) -> Result<bool> {
    row_exists(conn, "SELECT 1 FROM glosses WHERE id = ?1", id)
}

fn row_exists(conn: &Connection, sql: &str, id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(sql, params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

// --- Mapping Helpers (Row -> Struct) ---

pub(crate) fn row_to_user(row: &Row) -> std::result::Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get("id")?,
        login: row.get("login")?,
        email: row.get("email")?,
        name: row.get("name")?,
        password_hash: row.get("password_hash")?,
        is_admin: row.get::<_, i64>("is_admin")? != 0, // Convert integer back to bool
    })
}

pub(crate) fn row_to_idiom(row: &Row) -> std::result::Result<Idiom, rusqlite::Error> {
    Ok(Idiom {
        id: row.get("id")?,
        name: row.get("name")?,
        group_id: row.get("group_id")?,
    })
}

pub(crate) fn row_to_corpus(row: &Row) -> std::result::Result<Corpus, rusqlite::Error> {
    Ok(Corpus {
        id: row.get("id")?,
        name: row.get("name")?,
        source: row.get("source")?,
        description: row.get("description")?,
        idiom_id: row.get("idiom_id")?,
    })
}

pub(crate) fn row_to_sentence(row: &Row) -> std::result::Result<Sentence, rusqlite::Error> {
    Ok(Sentence {
        id: row.get("id")?,
        corpus_id: row.get("corpus_id")?,
        text: row.get("text")?,
        translation: row.get("translation")?,
    })
}

pub(crate) fn row_to_gloss(row: &Row) -> std::result::Result<Gloss, rusqlite::Error> {
    Ok(Gloss {
        id: row.get("id")?,
        tag: row.get("tag")?,
        definition: row.get("definition")?,
        note: row.get("note")?,
    })
}

// --- Fetch helpers (with associations resolved) ---

pub(crate) fn fetch_idiom(conn: &Connection, id: i64) -> Result<Option<Idiom>> {
    conn.query_row(
        "SELECT id, name, group_id FROM idioms WHERE id = ?1",
        params![id],
        row_to_idiom,
    )
    .optional()
    .map_err(GlossaError::from)
}

pub(crate) fn fetch_sentence(conn: &Connection, id: i64) -> Result<Option<Sentence>> {
    conn.query_row(
        "SELECT id, corpus_id, text, translation FROM sentences WHERE id = ?1",
        params![id],
        row_to_sentence,
    )
    .optional()
    .map_err(GlossaError::from)
}

/// Glosses attached to a morph, in attachment order.
pub(crate) fn fetch_glosses_for_morph(conn: &Connection, morph_id: i64) -> Result<Vec<Gloss>> {
    let mut stmt = conn.prepare_cached(
        "SELECT g.id, g.tag, g.definition, g.note
         FROM morph_glosses mg JOIN glosses g ON g.id = mg.gloss_id
         WHERE mg.morph_id = ?1
         ORDER BY mg.position",
    )?;
    let gloss_iter = stmt.query_map(params![morph_id], row_to_gloss)?;
    gloss_iter
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(GlossaError::from)
}

pub(crate) fn fetch_morph(conn: &Connection, id: i64) -> Result<Option<Morph>> {
    let base = conn
        .query_row(
            "SELECT id, text, idiom_id FROM morphs WHERE id = ?1",
            params![id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
        )
        .optional()?;

    match base {
        Some((id, text, idiom_id)) => Ok(Some(Morph {
            id,
            text,
            idiom_id,
            glosses: fetch_glosses_for_morph(conn, id)?,
        })),
        None => Ok(None),
    }
}

/// Morphs attached to a word, in the order they were submitted.
pub(crate) fn fetch_morphs_for_word(conn: &Connection, word_id: i64) -> Result<Vec<Morph>> {
    let mut stmt = conn.prepare_cached(
        "SELECT m.id, m.text, m.idiom_id
         FROM word_morphs wm JOIN morphs m ON m.id = wm.morph_id
         WHERE wm.word_id = ?1
         ORDER BY wm.position",
    )?;
    let rows = stmt
        .query_map(params![word_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut morphs = Vec::with_capacity(rows.len());
    for (id, text, idiom_id) in rows {
        morphs.push(Morph {
            id,
            text,
            idiom_id,
            glosses: fetch_glosses_for_morph(conn, id)?,
        });
    }
    Ok(morphs)
}

pub(crate) fn fetch_word_at(conn: &Connection, sentence_id: i64, number: i64) -> Result<Option<Word>> {
    let word_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM words WHERE sentence_id = ?1 AND number = ?2",
            params![sentence_id, number],
            |row| row.get(0),
        )
        .optional()?;
    match word_id {
        Some(id) => Ok(Some(Word {
            id,
            sentence_id,
            number,
            morphs: fetch_morphs_for_word(conn, id)?,
        })),
        None => Ok(None),
    }
}

pub(crate) fn fetch_words_for_sentence(conn: &Connection, sentence_id: i64) -> Result<Vec<Word>> {
    let mut stmt =
        conn.prepare("SELECT id, number FROM words WHERE sentence_id = ?1 ORDER BY number")?;
    let rows = stmt
        .query_map(params![sentence_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut words = Vec::with_capacity(rows.len());
    for (id, number) in rows {
        words.push(Word {
            id,
            sentence_id,
            number,
            morphs: fetch_morphs_for_word(conn, id)?,
        });
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        initialize_database(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut conn = open();
        initialize_database(&mut conn).unwrap();
        let version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_unique_violation_maps_to_duplicate() {
        let conn = open();
        conn.execute("INSERT INTO glosses (tag, definition) VALUES ('PL', 'plural')", [])
            .unwrap();
        let err = conn
            .execute("INSERT INTO glosses (tag, definition) VALUES ('PL', 'again')", [])
            .unwrap_err();
        assert!(map_constraint(err, "gloss", "PL").is_duplicate());
    }

    #[test]
    fn test_foreign_key_violation_maps_to_constraint() {
        let conn = open();
        let err = conn
            .execute(
                "INSERT INTO corpora (name, source, description, idiom_id) VALUES ('c', '', '', 42)",
                [],
            )
            .unwrap_err();
        assert!(matches!(
            map_constraint(err, "corpus", "c"),
            GlossaError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn test_clear_keeps_metadata() {
        let mut conn = open();
        conn.execute("INSERT INTO idioms (name) VALUES ('Germanic')", []).unwrap();
        conn.execute("INSERT INTO idioms (name, group_id) VALUES ('English', 1)", [])
            .unwrap();
        let tx = conn.transaction().unwrap();
        clear_database_data(&tx).unwrap();
        tx.commit().unwrap();

        let idioms: i64 = conn
            .query_row("SELECT COUNT(*) FROM idioms", [], |row| row.get(0))
            .unwrap();
        let metadata: i64 = conn
            .query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))
            .unwrap();
        assert_eq!(idioms, 0);
        assert_eq!(metadata, 1);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
