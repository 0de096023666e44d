//! Command-line interface for the glossa_rs library.
//!
//! This CLI manages the idiom hierarchy and corpora, records glosses and morphs,
//! annotates sentences word by word and renders interlinear views.

use clap::{Parser, Subcommand};
use colored::*;
use glossa_rs::{
    CorpusFilter, Glossary, GlossaError, GroupEmission, IdiomFilter, MorphFilter, MorphMatch,
    NewCorpus, StoreOptions, TreeOptions,
    error::Result,
    progress::{ProgressCallback, ProgressUpdate},
    tokenize,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{LevelFilter, error, info};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Interlinear glossing store CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a custom database file (optional)
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Delete all stored records before running the command
    #[arg(long, global = true, default_value_t = false)]
    reset: bool,

    /// Treat a morph as existing only when its gloss set matches exactly
    #[arg(long, global = true, default_value_t = false)]
    exact_morphs: bool,

    /// Set verbosity level (use -v, -vv, or -vvv for increasing verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add an idiom, optionally inside a group idiom
    AddIdiom {
        name: String,
        /// Name of the parent idiom
        #[arg(long)]
        group: Option<String>,
    },
    /// Move an idiom under another group (omit the group to make it top-level)
    SetGroup { name: String, group: Option<String> },
    /// List idioms with their groups
    Idioms,
    /// Add a corpus to an idiom
    AddCorpus {
        name: String,
        #[arg(long)]
        idiom: String,
        #[arg(long, default_value = "")]
        source: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List corpora, optionally for one idiom
    Corpora {
        #[arg(long)]
        idiom: Option<String>,
    },
    /// Add a sentence to a corpus
    AddSentence {
        corpus: String,
        text: String,
        #[arg(long)]
        translation: Option<String>,
    },
    /// Import a text file (one sentence per line, TAB before a translation)
    Import { corpus: String, file: PathBuf },
    /// Add a gloss tag
    AddGloss {
        tag: String,
        definition: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// List glosses
    Glosses,
    /// Add a morph with gloss tags
    AddMorph {
        text: String,
        #[arg(long)]
        idiom: String,
        /// Gloss tag (repeatable)
        #[arg(long = "gloss")]
        glosses: Vec<String>,
    },
    /// List morphs
    Morphs {
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        idiom: Option<String>,
    },
    /// Annotate a sentence position with morph ids (replaces earlier annotation)
    Annotate {
        sentence: i64,
        number: i64,
        morphs: Vec<i64>,
    },
    /// Show a sentence with its interlinear glosses
    Show { sentence: i64 },
    /// Find words annotated with a morph text
    Search { text: String },
    /// Print the word tokens of a text
    Tokenize { text: String },
    /// Print the flattened idiom tree
    Tree {
        /// Emit JSON for a treemap renderer
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Repeat group rows once per child, as the legacy renderer did
        #[arg(long, default_value_t = false)]
        per_child: bool,
        #[arg(long, default_value = "Languages")]
        root: String,
    },
    /// Clear the glossary database
    ClearDb,
}

/// Sets up logging based on verbosity level.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter(None, log_level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

/// Creates a progress callback that draws one bar per stage.
fn create_progress_callback(progress_bars: Arc<Mutex<HashMap<String, ProgressBar>>>) -> ProgressCallback {
    Box::new(move |update: ProgressUpdate| {
        let Ok(mut bars) = progress_bars.lock() else {
            return true;
        };

        if update.current_item == 0 && !bars.contains_key(&update.stage_description) {
            let pb = ProgressBar::new(update.total_items.unwrap_or(0));
            let style_template = if update.total_items.is_some() {
                "{prefix:>12.cyan.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ({percent}%) {msg}"
            } else {
                "{prefix:>12.cyan.bold} [{elapsed_precise}] {spinner} {msg}"
            };
            if let Ok(style) = ProgressStyle::default_bar().template(style_template) {
                pb.set_style(style.progress_chars("##-"));
            }
            pb.set_prefix(update.stage_description.clone());
            pb.set_message(update.message.clone().unwrap_or_default());
            pb.enable_steady_tick(Duration::from_millis(100));
            bars.insert(update.stage_description.clone(), pb);
        } else if let Some(pb) = bars.get(&update.stage_description) {
            pb.set_position(update.current_item);
            if let Some(msg) = update.message.clone() {
                pb.set_message(msg);
            }
            if update.is_complete() {
                pb.finish_and_clear();
            }
        }
        true
    })
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Commands::ClearDb = cli.command {
        let db_path = cli.db_path.as_ref().map(PathBuf::from);
        match Glossary::clear_database(db_path) {
            Ok(_) => println!("{}", "Database cleared successfully.".green()),
            Err(e) => fail("clearing database", &e),
        }
        return;
    }

    let options = StoreOptions {
        db_path: cli.db_path.as_ref().map(PathBuf::from),
        reset: cli.reset,
        morph_match: if cli.exact_morphs {
            MorphMatch::Exact
        } else {
            MorphMatch::Covering
        },
    };
    let store = match Glossary::open_with_options(options) {
        Ok(store) => store,
        Err(e) => fail("opening database", &e),
    };
    info!("Opened glossary store at {:?}", store.db_path());

    if let Err(e) = run(&store, cli.command) {
        fail("running command", &e);
    }
}

fn fail(context: &str, e: &GlossaError) -> ! {
    error!("Error {}: {}", context, e);
    eprintln!("{}", format!("Error: {}", e).red());
    std::process::exit(1);
}

fn idiom_id(store: &Glossary, name: &str) -> Result<i64> {
    Ok(store.get_idiom_by_name(name)?.id)
}

fn corpus_id(store: &Glossary, name: &str) -> Result<i64> {
    store
        .list_corpora(&CorpusFilter::Name(name.to_string()))?
        .into_iter()
        .next()
        .map(|c| c.id)
        .ok_or_else(|| GlossaError::NotFound {
            entity: "Corpus",
            key: name.to_string(),
        })
}

fn run(store: &Glossary, command: Commands) -> Result<()> {
    match command {
        Commands::AddIdiom { name, group } => {
            let group_id = group.as_deref().map(|g| idiom_id(store, g)).transpose()?;
            let idiom = store.add_idiom(&name, group_id)?;
            println!("Added idiom {} (id {})", idiom.name.bold().cyan(), idiom.id);
        }
        Commands::SetGroup { name, group } => {
            let id = idiom_id(store, &name)?;
            let group_id = group.as_deref().map(|g| idiom_id(store, g)).transpose()?;
            store.set_idiom_group(id, group_id)?;
            println!("Moved {} under {}", name.bold().cyan(), group.as_deref().unwrap_or("(top level)"));
        }
        Commands::Idioms => {
            let idioms = store.list_idioms(&IdiomFilter::All)?;
            if idioms.is_empty() {
                println!("{}", "No idioms yet.".yellow());
            }
            let names: HashMap<i64, String> = idioms.iter().map(|i| (i.id, i.name.clone())).collect();
            for idiom in &idioms {
                let group = idiom
                    .group_id
                    .and_then(|g| names.get(&g).cloned())
                    .unwrap_or_default();
                println!("{:>5}  {}  {}", idiom.id, idiom.name.bold(), group.dimmed());
            }
        }
        Commands::AddCorpus {
            name,
            idiom,
            source,
            description,
        } => {
            let corpus = store.add_corpus(NewCorpus {
                name,
                source,
                description,
                idiom_id: idiom_id(store, &idiom)?,
            })?;
            println!("Added corpus {} (id {})", corpus.name.bold().cyan(), corpus.id);
        }
        Commands::Corpora { idiom } => {
            let filter = match idiom {
                Some(name) => CorpusFilter::Idiom(idiom_id(store, &name)?),
                None => CorpusFilter::All,
            };
            for corpus in store.list_corpora(&filter)? {
                println!(
                    "{:>5}  {}  {}",
                    corpus.id,
                    corpus.name.bold(),
                    corpus.source.dimmed()
                );
                if !corpus.description.is_empty() {
                    println!("       {}", corpus.description.italic());
                }
            }
        }
        Commands::AddSentence {
            corpus,
            text,
            translation,
        } => {
            let sentence = store.add_sentence(corpus_id(store, &corpus)?, &text, translation.as_deref())?;
            println!("Added sentence {}", sentence.id);
        }
        Commands::Import { corpus, file } => {
            let corpus_id = corpus_id(store, &corpus)?;
            let progress_bars = Arc::new(Mutex::new(HashMap::<String, ProgressBar>::new()));
            let callback = create_progress_callback(progress_bars.clone());
            let result = store.import_file(corpus_id, &file, Some(callback));

            if let Ok(bars) = progress_bars.lock() {
                for pb in bars.values() {
                    pb.finish_and_clear();
                }
            }
            let stored = result?;
            println!(
                "{}",
                format!("Imported {} sentences into '{}'.", stored.len(), corpus).green()
            );
        }
        Commands::AddGloss {
            tag,
            definition,
            note,
        } => {
            let gloss = store.add_gloss(&tag, &definition, note.as_deref())?;
            println!("Added gloss {} (id {})", gloss.tag.bold().magenta(), gloss.id);
        }
        Commands::Glosses => {
            for gloss in store.get_glosses(&Default::default())? {
                print!("{:>8}  {}", gloss.tag.bold().magenta(), gloss.definition);
                match gloss.note {
                    Some(note) => println!("  {}", note.dimmed()),
                    None => println!(),
                }
            }
        }
        Commands::AddMorph {
            text,
            idiom,
            glosses,
        } => {
            let idiom_id = idiom_id(store, &idiom)?;
            let gloss_ids = glosses
                .iter()
                .map(|tag| store.get_gloss_by_tag(tag).map(|g| g.id))
                .collect::<Result<Vec<_>>>()?;
            let morph = store.add_morph(&text, idiom_id, &gloss_ids)?;
            println!(
                "Added morph {} [{}] (id {})",
                morph.text.bold().green(),
                morph.gloss_label().magenta(),
                morph.id
            );
        }
        Commands::Morphs { text, idiom } => {
            let filter = MorphFilter {
                text,
                idiom_id: idiom.as_deref().map(|i| idiom_id(store, i)).transpose()?,
                ..MorphFilter::default()
            };
            for morph in store.get_morphs(&filter)? {
                println!(
                    "{:>5}  {}  {}",
                    morph.id,
                    morph.text.bold().green(),
                    morph.gloss_label().magenta()
                );
            }
        }
        Commands::Annotate {
            sentence,
            number,
            morphs,
        } => {
            let word = store.add_word(sentence, number, &morphs)?;
            let token = store
                .get_sentence(sentence)?
                .word_at(number as usize)
                .map(str::to_string)
                .unwrap_or_else(|_| "?".to_string());
            println!(
                "Annotated {} ({}:{}) with {} morphs",
                token.bold().cyan(),
                sentence,
                number,
                word.morphs.len()
            );
        }
        Commands::Show { sentence } => print_interlinear(store, sentence)?,
        Commands::Search { text } => {
            let words = store.search_by_morph_text(&text)?;
            if words.is_empty() {
                println!("No words annotated with '{}'.", text.yellow());
            }
            for word in words {
                let sentence = store.get_sentence(word.sentence_id)?;
                let token = sentence.word_at(word.number as usize).unwrap_or("?");
                let analysis: Vec<String> = word
                    .morphs
                    .iter()
                    .map(|m| format!("{}[{}]", m.text, m.gloss_label()))
                    .collect();
                println!(
                    "{:>5}:{:<3} {}  {}  {}",
                    word.sentence_id,
                    word.number,
                    token.bold().cyan(),
                    analysis.join("-").green(),
                    sentence.text.dimmed()
                );
            }
        }
        Commands::Tokenize { text } => {
            for (index, token) in tokenize(&text) {
                println!("{:>3}  {}", index, token);
            }
        }
        Commands::Tree {
            json,
            per_child,
            root,
        } => {
            let options = TreeOptions {
                root_label: root,
                emission: if per_child {
                    GroupEmission::PerChild
                } else {
                    GroupEmission::Once
                },
                ..TreeOptions::default()
            };
            let data = store.treemap(&options)?;
            if json {
                println!("{}", data.to_json()?);
            } else {
                for (label, parent) in data.labels.iter().zip(&data.parents) {
                    println!("{}  {}", label.bold(), parent.dimmed());
                }
            }
        }
        // Handled in main before the store is opened.
        Commands::ClearDb => {}
    }
    Ok(())
}

/// Prints token, morph and gloss lines in aligned columns.
fn print_interlinear(store: &Glossary, sentence_id: i64) -> Result<()> {
    let view = store.interlinear(sentence_id)?;

    let mut tokens = Vec::with_capacity(view.rows.len());
    let mut morph_line = Vec::with_capacity(view.rows.len());
    let mut gloss_line = Vec::with_capacity(view.rows.len());
    for row in &view.rows {
        let (morphs, glosses) = match &row.word {
            Some(word) => (
                word.morphs.iter().map(|m| m.text.as_str()).collect::<Vec<_>>().join("-"),
                word.morphs.iter().map(|m| m.gloss_label()).collect::<Vec<_>>().join("-"),
            ),
            None => (String::new(), String::new()),
        };
        let width = [row.token.as_str(), morphs.as_str(), glosses.as_str()]
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0);
        tokens.push(format!("{:<width$}", row.token));
        morph_line.push(format!("{:<width$}", morphs));
        gloss_line.push(format!("{:<width$}", glosses));
    }

    println!("{}", tokens.join("  ").bold());
    println!("{}", morph_line.join("  ").green());
    println!("{}", gloss_line.join("  ").magenta());
    if let Some(translation) = &view.sentence.translation {
        println!("'{}'", translation.italic());
    }
    for orphan in &view.orphans {
        println!(
            "{}",
            format!("  word {} has no matching token", orphan.number).yellow()
        );
    }
    Ok(())
}
