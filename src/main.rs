use std::{path::Path, sync::Arc, time::Duration};

use clap::Parser;
use pdfchat::{
    CancellationFlag,
    ConfigDb,
    DataDir,
    DocumentRegistry,
    Error,
    Fingerprint,
    IndexCache,
    Result,
    Session,
    TranscriptStore,
    gemini::{GeminiClient, GeminiConfig},
    loader::PdfLoader,
    model_manager::{LocalEmbedder, ModelManager},
    playback::{CommandSpeaker, PlaybackManager},
    providers::{Embedder, EmbeddingBackend},
    settings::{EmbedderKind, Settings, SettingsUpdate},
    walker,
};
use serde_json::json;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, DocAction, HistoryAction, SettingsAction};

type AppSession = Session<PdfLoader, EmbeddingBackend, GeminiClient>;

/// 128 + SIGINT, as shells report it.
const INTERRUPTED_EXIT_CODE: i32 = 130;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("PDFCHAT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = Arc::new(ConfigDb::open(&data_dir.config_db())?);

    match cli.command {
        Command::Doc { action } => {
            let mut registry = DocumentRegistry::load(Arc::clone(&config_db))?;
            match action {
                DocAction::Add { path } => doc_add(&mut registry, &path)?,
                DocAction::Enable { name } => {
                    registry.set_enabled(&name, true)?;
                    println!("Enabled '{name}'");
                }
                DocAction::Disable { name } => {
                    registry.set_enabled(&name, false)?;
                    println!("Disabled '{name}'");
                }
                DocAction::Remove { name } => {
                    if !registry.remove(&name)? {
                        return Err(Error::NotFound {
                            kind: "document",
                            name,
                        });
                    }
                    println!("Removed '{name}'");
                }
                DocAction::List { json } => doc_list(&registry, json),
            }
        }
        Command::Ask(args) => {
            let settings = Settings::load(&config_db)?;
            let mut session = open_session(&data_dir, &config_db, &settings)?;
            if let Some(name) = &args.resume {
                session.resume_chat(name)?;
            }
            let interrupts = spawn_interrupt_handler(session.cancellation_flag());
            let reply = session.answer(&args.question).await;
            interrupts.abort();
            print_reply(&reply, session.suggestions());

            if args.speak {
                let mut playback = PlaybackManager::new(CommandSpeaker::from_env()?);
                playback.start(reply);
                speak_until_done(&mut playback).await;
            }
        }
        Command::Chat(args) => {
            let mut settings = Settings::load(&config_db)?;
            let mut session = open_session(&data_dir, &config_db, &settings)?;
            if let Some(name) = &args.resume {
                session.resume_chat(name)?;
            }
            chat_loop(&mut session, &mut settings, &config_db).await?;
        }
        Command::History { action } => {
            let mut transcripts = TranscriptStore::new(data_dir.chats_dir()?)?;
            match action {
                HistoryAction::List => {
                    let names = transcripts.list()?;
                    if names.is_empty() {
                        println!("No saved conversations.");
                    }
                    for name in names.iter().rev() {
                        println!("{name}");
                    }
                }
                HistoryAction::Show { name, json } => {
                    let history = transcripts.read(&name)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(history.turns())?);
                    } else {
                        for (question, answer) in history.turns() {
                            println!("> {question}\n{answer}\n");
                        }
                    }
                }
                HistoryAction::Delete { name } => {
                    transcripts.delete(&name)?;
                    println!("Deleted '{name}'");
                }
            }
        }
        Command::Settings { action } => {
            let mut settings = Settings::load(&config_db)?;
            match action {
                SettingsAction::Show => print_settings(&settings),
                SettingsAction::Set(args) => {
                    settings.update(
                        &config_db,
                        SettingsUpdate {
                            api_key: args.api_key,
                            model_name: args.model,
                            embedder: args.embedder,
                        },
                    )?;
                    print_settings(&settings);
                }
                SettingsAction::Reset => print_settings(&Settings::reset(&config_db)?),
            }
        }
        Command::Speak(args) => {
            let mut playback = PlaybackManager::new(CommandSpeaker::from_env()?);
            playback.start(args.text);
            speak_until_done(&mut playback).await;
        }
        Command::Status(args) => cmd_status(&config_db, &data_dir, args.json)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_session(
    data_dir: &DataDir,
    config_db: &Arc<ConfigDb>,
    settings: &Settings,
) -> Result<AppSession> {
    let config = GeminiConfig::new(&settings.api_key, &settings.model_name);
    let llm = GeminiClient::new(config.clone())?;
    let embedder = match settings.embedder {
        EmbedderKind::Gemini => EmbeddingBackend::Gemini(GeminiClient::new(config)?),
        EmbedderKind::Local => EmbeddingBackend::Local(LocalEmbedder::new(ModelManager::new())),
    };

    let registry = DocumentRegistry::load(Arc::clone(config_db))?;
    let cache = IndexCache::new(data_dir.cache_dir(embedder.name())?)?;
    let transcripts = TranscriptStore::new(data_dir.chats_dir()?)?;

    info!(
        model = %settings.model_name,
        embedder = %settings.embedder,
        documents = registry.len(),
        "session ready"
    );
    Ok(Session::new(
        PdfLoader,
        embedder,
        llm,
        registry,
        cache,
        transcripts,
    ))
}

/// Ctrl-C stops the running query. Outside a query, or pressed again
/// before the query has stopped, it ends the process.
fn spawn_interrupt_handler(flag: CancellationFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if flag.interrupt() {
                eprintln!("\nStopping... press Ctrl-C again to quit.");
            } else {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
    })
}

async fn speak_until_done(playback: &mut PlaybackManager<CommandSpeaker>) {
    while playback.is_playing() {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                playback.stop();
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }
    playback.wait();
}

fn print_reply(reply: &str, suggestions: &[String]) {
    println!("{reply}");
    if !suggestions.is_empty() {
        println!("\nYou could also ask:");
        for suggestion in suggestions {
            println!("  - {suggestion}");
        }
    }
}

async fn chat_loop(
    session: &mut AppSession,
    settings: &mut Settings,
    config_db: &ConfigDb,
) -> Result<()> {
    let cancel = session.cancellation_flag();
    let _interrupts = spawn_interrupt_handler(cancel.clone());
    let mut playback =
        PlaybackManager::new(CommandSpeaker::from_env()?).link_cancellation(cancel);

    eprintln!(
        "Ask about your PDFs. Commands: /new, /enable <doc>, /disable <doc>, \
         /model <name>, /speak, /stop, /quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/new" => {
                session.new_chat()?;
                println!("Started a new conversation.");
            }
            "/enable" | "/disable" => {
                let enabled = command == "/enable";
                match session.registry_mut().set_enabled(arg, enabled) {
                    Ok(()) => println!("{} '{arg}'", if enabled { "Enabled" } else { "Disabled" }),
                    Err(e) => println!("{e}"),
                }
            }
            "/model" => {
                let update = SettingsUpdate {
                    model_name: Some(arg.to_string()),
                    ..SettingsUpdate::default()
                };
                match settings.update(config_db, update) {
                    Ok(()) => {
                        let config = GeminiConfig::new(&settings.api_key, &settings.model_name);
                        session.set_chat_model(GeminiClient::new(config)?);
                        println!("Using {}", settings.model_name);
                    }
                    Err(e) => println!("{e}"),
                }
            }
            "/speak" => match session.last_answer() {
                Some(answer) => playback.start(answer),
                None => println!("Nothing to read yet."),
            },
            "/stop" => playback.stop(),
            _ if command.starts_with('/') => println!("Unknown command {command}"),
            _ => {
                let reply = session.answer(line).await;
                print_reply(&reply, session.suggestions());
            }
        }
    }

    if !session.history().is_empty() {
        session.new_chat()?;
    }
    Ok(())
}

fn doc_add(registry: &mut DocumentRegistry, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "path does not exist: {}",
            path.display()
        )));
    }

    let pdfs = walker::discover_pdfs(path)?;
    if pdfs.is_empty() {
        return Err(Error::Config(format!(
            "no PDF files found at {}",
            path.display()
        )));
    }

    for pdf in &pdfs {
        let record = registry.add(pdf)?;
        println!("Added '{}' -> {}", record.identifier, record.path.display());
    }
    Ok(())
}

fn doc_list(registry: &DocumentRegistry, as_json: bool) {
    if as_json {
        let docs: Vec<_> = registry
            .iter()
            .map(|r| {
                json!({
                    "name": r.identifier,
                    "path": r.path.to_string_lossy(),
                    "enabled": r.enabled,
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(docs));
    } else if registry.is_empty() {
        println!("No documents registered.");
    } else {
        for record in registry.iter() {
            let mark = if record.enabled { "x" } else { " " };
            println!("[{mark}] {}\t{}", record.identifier, record.path.display());
        }
    }
}

fn print_settings(settings: &Settings) {
    println!("API key: {}", settings.masked_api_key());
    println!("Model: {}", settings.model_name);
    println!("Embedder: {}", settings.embedder);
}

fn cmd_status(config_db: &Arc<ConfigDb>, data_dir: &DataDir, as_json: bool) -> Result<()> {
    let settings = Settings::load(config_db)?;
    let registry = DocumentRegistry::load(Arc::clone(config_db))?;
    let enabled = registry.enabled_paths();
    let cache = IndexCache::new(data_dir.cache_dir(settings.embedder.as_str())?)?;
    let transcripts = TranscriptStore::new(data_dir.chats_dir()?)?.list()?.len();

    let fingerprint = (!enabled.is_empty()).then(|| Fingerprint::of(&enabled));
    let cached = fingerprint.as_ref().is_some_and(|fp| cache.contains(fp));
    if !settings.has_api_key() {
        warn!("no API key configured");
    }

    if as_json {
        println!(
            "{}",
            json!({
                "data_dir": data_dir.root().to_string_lossy(),
                "model": settings.model_name,
                "embedder": settings.embedder.as_str(),
                "api_key_set": settings.has_api_key(),
                "documents": registry.len(),
                "enabled": enabled.len(),
                "fingerprint": fingerprint.as_ref().map(Fingerprint::as_str),
                "cached": cached,
                "transcripts": transcripts,
            })
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Model: {}", settings.model_name);
        println!("Embedder: {}", settings.embedder);
        println!("API key: {}", settings.masked_api_key());
        println!("Documents: {} ({} enabled)", registry.len(), enabled.len());
        if let Some(fp) = &fingerprint {
            let state = if cached { "cached" } else { "not built yet" };
            println!("Knowledge base: {} ({state})", fp.short());
        }
        println!("Saved conversations: {transcripts}");
    }
    Ok(())
}
