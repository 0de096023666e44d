// Declare modules
pub mod annotation;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod progress;
pub mod tokenizer;
pub mod tree;

// Re-export key types for easier use
pub use error::{GlossaError, Result};
pub use models::{
    Corpus,
    CorpusFilter,
    Gloss,
    GlossFilter,
    Idiom,
    IdiomFilter,
    Interlinear,
    InterlinearRow,
    Morph,
    MorphFilter,
    MorphMatch,
    NewCorpus,
    NewUser,
    Sentence,
    User,
    Word,
};
pub use tokenizer::{tokenize, word_at, Tokens};
pub use tree::{GroupEmission, TreeOptions, TreemapData};

use directories_next::ProjectDirs;
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Subdirectory name within user's data directory
pub const DATA_SUBDIR: &str = "glossa-rs";
const DB_FILENAME: &str = "glossa.db";

/// Options for opening a glossary store.
#[derive(Debug, Default, Clone)]
pub struct StoreOptions {
    /// Optional path to a specific database file to use or create.
    /// If None, the default location based on ProjectDirs will be used.
    pub db_path: Option<PathBuf>,
    /// Delete every record of an existing database before use.
    pub reset: bool,
    /// Duplicate detection used by `add_morph`.
    pub morph_match: MorphMatch,
}

/// Handle to the glossary store: idioms, corpora, sentences and their annotations.
#[derive(Clone)] // Clone is cheap due to Arc<Mutex<...>>
pub struct Glossary {
    // Every operation locks the connection for its whole check-then-write sequence.
    conn: Arc<Mutex<Connection>>,
    db_file_path: Arc<Option<PathBuf>>,
    morph_match: MorphMatch,
}

// Opens/creates the database file and applies the connection pragmas.
fn open_db_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

// SQLite names its WAL and shared-memory files by appending to the full file name.
fn sqlite_companions(db_path: &Path) -> Vec<PathBuf> {
    ["-wal", "-shm"]
        .iter()
        .map(|suffix| {
            let mut name = db_path.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        })
        .collect()
}

impl Glossary {
    /// Opens the store at the default database path.
    pub fn open() -> Result<Self> {
        Self::open_with_options(StoreOptions::default())
    }

    /// Opens (or creates) the store with specific options and initializes the schema.
    pub fn open_with_options(options: StoreOptions) -> Result<Self> {
        let db_path = match options.db_path {
            Some(path) => {
                info!("Using provided database path: {:?}", path);
                path
            }
            None => Self::get_default_db_path()?,
        };

        let db_exists = db_path.exists();
        let mut conn = open_db_connection(&db_path)?;
        db::initialize_database(&mut conn)?;

        if options.reset && db_exists {
            info!("Reset requested. Clearing existing database data...");
            let tx = conn.transaction()?;
            db::clear_database_data(&tx)?;
            tx.commit()?;
        }

        Ok(Glossary {
            conn: Arc::new(Mutex::new(conn)),
            db_file_path: Arc::new(Some(db_path)),
            morph_match: options.morph_match,
        })
    }

    /// Opens a private in-memory store, mostly useful for tests and scratch work.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(MorphMatch::default())
    }

    pub fn open_in_memory_with(morph_match: MorphMatch) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        db::initialize_database(&mut conn)?;
        Ok(Glossary {
            conn: Arc::new(Mutex::new(conn)),
            db_file_path: Arc::new(None),
            morph_match,
        })
    }

    /// Gets the default path for the SQLite database file.
    pub fn get_default_db_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("org", "GlossaRs", DATA_SUBDIR)
            .ok_or(GlossaError::DataDirNotFound)?;
        let data_dir = project_dirs.data_dir();
        fs::create_dir_all(data_dir)?;
        Ok(data_dir.join(DB_FILENAME))
    }

    /// Path of the backing database file; `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_file_path.as_deref()
    }

    pub fn morph_match(&self) -> MorphMatch {
        self.morph_match
    }

    /// Deletes the database file (and its WAL/SHM companions).
    ///
    /// If `db_path_override` is `None`, the default database path is cleared.
    pub fn clear_database(db_path_override: Option<PathBuf>) -> Result<()> {
        let path_to_clear = match db_path_override {
            Some(path) => path,
            None => Self::get_default_db_path()?,
        };
        info!("Attempting to clear database file: {:?}", path_to_clear);

        if !path_to_clear.exists() {
            info!("Database file not found, nothing to clear: {:?}", path_to_clear);
            return Ok(());
        }

        match fs::remove_file(&path_to_clear) {
            Ok(_) => {
                info!("Successfully deleted database file: {:?}", path_to_clear);
                for companion in sqlite_companions(&path_to_clear) {
                    if companion.exists() {
                        if let Err(e) = fs::remove_file(&companion) {
                            warn!("Failed to delete {:?}: {}", companion, e);
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete database file {:?}: {}", path_to_clear, e);
                Err(GlossaError::Io(e))
            }
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GlossaError::Internal("Mutex poisoned".to_string()))
    }

    // --- Users ---

    /// Registers a user. Login and email must both be unused.
    pub fn add_user(&self, user: NewUser) -> Result<User> {
        if user.login.trim().is_empty() || user.email.trim().is_empty() {
            return Err(GlossaError::InvalidArgument(
                "login and email are required".to_string(),
            ));
        }

        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Login and email share one identity namespace: either may be used to sign in.
        if identity_taken(&tx, &user.login)? {
            return Err(GlossaError::duplicate("login", &user.login));
        }
        if identity_taken(&tx, &user.email)? {
            return Err(GlossaError::duplicate("email", &user.email));
        }

        tx.execute(
            "INSERT INTO users (login, email, name, password_hash, is_admin)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.login, user.email, user.name, user.password_hash, user.is_admin],
        )
        .map_err(|e| db::map_constraint(e, "user", &user.login))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Added user '{}' (id {}).", user.login, id);
        Ok(User {
            id,
            login: user.login,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            is_admin: user.is_admin,
        })
    }

    /// Looks a user up by login, falling back to email.
    pub fn load_user(&self, identity: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        match fetch_user_by(&conn, "login", identity)? {
            Some(user) => Ok(Some(user)),
            None => fetch_user_by(&conn, "email", identity),
        }
    }

    /// Resolves `identity` (login or email) and hands the stored hash to `verify`.
    ///
    /// Hashing lives with the caller; this only distinguishes a known user with an
    /// accepted hash from everything else, which is `InvalidCredentials`.
    pub fn authenticate<F>(&self, identity: &str, verify: F) -> Result<User>
    where
        F: FnOnce(&str) -> bool,
    {
        let user = self
            .load_user(identity)?
            .ok_or(GlossaError::InvalidCredentials)?;
        if verify(&user.password_hash) {
            debug!("User '{}' authenticated.", user.login);
            Ok(user)
        } else {
            Err(GlossaError::InvalidCredentials)
        }
    }

    // --- Idiom hierarchy ---

    /// Adds an idiom, optionally under a parent group.
    pub fn add_idiom(&self, name: &str, group_id: Option<i64>) -> Result<Idiom> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if fetch_idiom_by_name(&tx, name)?.is_some() {
            return Err(GlossaError::duplicate("idiom", name));
        }
        if let Some(group) = group_id {
            if !db::idiom_exists(&tx, group)? {
                return Err(GlossaError::ConstraintViolation(format!(
                    "group idiom {} does not exist",
                    group
                )));
            }
        }

        tx.execute(
            "INSERT INTO idioms (name, group_id) VALUES (?1, ?2)",
            params![name, group_id],
        )
        .map_err(|e| db::map_constraint(e, "idiom", name))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Added idiom '{}' (id {}, group {:?}).", name, id, group_id);
        Ok(Idiom {
            id,
            name: name.to_string(),
            group_id,
        })
    }

    /// Lists all idioms, or the one matching a name or id (empty when nothing matches).
    pub fn list_idioms(&self, filter: &IdiomFilter) -> Result<Vec<Idiom>> {
        let conn = self.lock()?;
        match filter {
            IdiomFilter::All => {
                let mut stmt = conn.prepare("SELECT id, name, group_id FROM idioms ORDER BY id")?;
                let rows = stmt.query_map([], db::row_to_idiom)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(GlossaError::from)
            }
            IdiomFilter::Name(name) => Ok(fetch_idiom_by_name(&conn, name)?.into_iter().collect()),
            IdiomFilter::Id(id) => Ok(db::fetch_idiom(&conn, *id)?.into_iter().collect()),
        }
    }

    pub fn get_idiom(&self, id: i64) -> Result<Idiom> {
        let conn = self.lock()?;
        db::fetch_idiom(&conn, id)?.ok_or_else(|| GlossaError::not_found("Idiom", id))
    }

    pub fn get_idiom_by_name(&self, name: &str) -> Result<Idiom> {
        let conn = self.lock()?;
        fetch_idiom_by_name(&conn, name)?.ok_or_else(|| GlossaError::not_found("Idiom", name))
    }

    /// Moves an idiom under another group (or to the top level with `None`).
    ///
    /// The new parent's ancestor chain must not contain the idiom itself.
    pub fn set_idiom_group(&self, id: i64, group_id: Option<i64>) -> Result<Idiom> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let idiom = db::fetch_idiom(&tx, id)?.ok_or_else(|| GlossaError::not_found("Idiom", id))?;

        if let Some(group) = group_id {
            if !db::idiom_exists(&tx, group)? {
                return Err(GlossaError::ConstraintViolation(format!(
                    "group idiom {} does not exist",
                    group
                )));
            }
            for ancestor in ancestor_chain(&tx, group)? {
                if ancestor.id == id {
                    return Err(GlossaError::CycleDetected(format!(
                        "idiom '{}' is an ancestor of group {}",
                        idiom.name, group
                    )));
                }
            }
        }

        tx.execute(
            "UPDATE idioms SET group_id = ?1 WHERE id = ?2",
            params![group_id, id],
        )?;
        tx.commit()?;

        info!("Moved idiom '{}' to group {:?}.", idiom.name, group_id);
        Ok(Idiom { group_id, ..idiom })
    }

    /// Ancestors of an idiom, from its immediate group up to the top level.
    pub fn idiom_ancestors(&self, id: i64) -> Result<Vec<Idiom>> {
        let conn = self.lock()?;
        let idiom = db::fetch_idiom(&conn, id)?.ok_or_else(|| GlossaError::not_found("Idiom", id))?;
        match idiom.group_id {
            Some(group) => {
                let chain = ancestor_chain(&conn, group)?;
                if chain.iter().any(|a| a.id == id) {
                    return Err(GlossaError::CycleDetected(format!(
                        "idiom '{}' is its own ancestor",
                        idiom.name
                    )));
                }
                Ok(chain)
            }
            None => Ok(Vec::new()),
        }
    }

    // --- Corpora ---

    /// Adds a corpus owned by an existing idiom. Names are unique.
    pub fn add_corpus(&self, corpus: NewCorpus) -> Result<Corpus> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM corpora WHERE name = ?1",
                params![corpus.name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(GlossaError::duplicate("corpus", &corpus.name));
        }
        if !db::idiom_exists(&tx, corpus.idiom_id)? {
            return Err(GlossaError::ConstraintViolation(format!(
                "corpus '{}' references missing idiom {}",
                corpus.name, corpus.idiom_id
            )));
        }

        tx.execute(
            "INSERT INTO corpora (name, source, description, idiom_id) VALUES (?1, ?2, ?3, ?4)",
            params![corpus.name, corpus.source, corpus.description, corpus.idiom_id],
        )
        .map_err(|e| db::map_constraint(e, "corpus", &corpus.name))?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Added corpus '{}' (id {}).", corpus.name, id);
        Ok(Corpus {
            id,
            name: corpus.name,
            source: corpus.source,
            description: corpus.description,
            idiom_id: corpus.idiom_id,
        })
    }

    pub fn list_corpora(&self, filter: &CorpusFilter) -> Result<Vec<Corpus>> {
        let conn = self.lock()?;
        let base = "SELECT id, name, source, description, idiom_id FROM corpora";
        let (sql, value): (String, Option<rusqlite::types::Value>) = match filter {
            CorpusFilter::All => (format!("{} ORDER BY id", base), None),
            CorpusFilter::Name(name) => (format!("{} WHERE name = ?1", base), Some(name.clone().into())),
            CorpusFilter::Id(id) => (format!("{} WHERE id = ?1", base), Some((*id).into())),
            CorpusFilter::Idiom(idiom_id) => (
                format!("{} WHERE idiom_id = ?1 ORDER BY id", base),
                Some((*idiom_id).into()),
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(value.iter()), db::row_to_corpus)?;
        let corpora = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(corpora)
    }

    pub fn get_corpus(&self, id: i64) -> Result<Corpus> {
        self.list_corpora(&CorpusFilter::Id(id))?
            .into_iter()
            .next()
            .ok_or_else(|| GlossaError::not_found("Corpus", id))
    }

    // --- Tree rendering ---

    /// Flattens the whole idiom hierarchy and its corpora for a treemap.
    pub fn treemap(&self, options: &TreeOptions) -> Result<TreemapData> {
        let idioms = self.list_idioms(&IdiomFilter::All)?;
        let corpora = self.list_corpora(&CorpusFilter::All)?;
        tree::flatten(&idioms, &corpora, options)
    }
}

// --- Internal helpers ---

fn fetch_user_by(conn: &Connection, column: &str, value: &str) -> Result<Option<User>> {
    // `column` is always one of our literals, never user input.
    let sql = format!(
        "SELECT id, login, email, name, password_hash, is_admin FROM users WHERE {} = ?1",
        column
    );
    conn.query_row(&sql, params![value], db::row_to_user)
        .optional()
        .map_err(GlossaError::from)
}

fn identity_taken(conn: &Connection, identity: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM users WHERE login = ?1 OR email = ?1 LIMIT 1",
            params![identity],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn fetch_idiom_by_name(conn: &Connection, name: &str) -> Result<Option<Idiom>> {
    conn.query_row(
        "SELECT id, name, group_id FROM idioms WHERE name = ?1",
        params![name],
        db::row_to_idiom,
    )
    .optional()
    .map_err(GlossaError::from)
}

/// `start` followed by its ancestors. Fails on a stored cycle instead of looping.
fn ancestor_chain(conn: &Connection, start: i64) -> Result<Vec<Idiom>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(start);

    while let Some(id) = current {
        if !seen.insert(id) {
            return Err(GlossaError::CycleDetected(format!(
                "idiom {} appears twice in its own ancestry",
                id
            )));
        }
        let idiom = db::fetch_idiom(conn, id)?.ok_or_else(|| {
            GlossaError::ConstraintViolation(format!("group idiom {} does not exist", id))
        })?;
        current = idiom.group_id;
        chain.push(idiom);
    }
    Ok(chain)
}
