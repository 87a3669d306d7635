//! `planboard`: operator CLI over the cached planning document

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use planboard_doc::DocPath;
use planboard_engine::{
    Credentials, EngineConfig, LoadStatus, PlanningEngine, StaticAuthenticator,
};
use planboard_persist::{seed_from_location, FileCache};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn cli() -> Command {
    Command::new("planboard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and edit the cached planning document")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("cache-dir")
                .long("cache-dir")
                .global(true)
                .default_value(".planboard")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the snapshot cache"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .global(true)
                .default_value("data.json")
                .help("Canonical seed document: a file path or an http(s) URL"),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .global(true)
                .env("PLANBOARD_USER")
                .help("Login name"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .global(true)
                .env("PLANBOARD_PASSWORD")
                .hide_env_values(true)
                .help("Login password"),
        )
        .subcommand(
            Command::new("show")
                .about("Print the document, or the value at a path")
                .arg(Arg::new("path").help("Path such as metas.trimestral[0].valor")),
        )
        .subcommand(
            Command::new("set")
                .about("Write a value at a path and save")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("value")
                        .required(true)
                        .help("JSON value; anything that is not valid JSON is stored as a string"),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Write a pretty-printed snapshot")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Output file (defaults to the generated export name)"),
                ),
        )
        .subcommand(
            Command::new("import")
                .about("Replace the whole document with a snapshot file")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(Command::new("reset").about("Discard local changes and reload the seed"))
        .subcommand(
            Command::new("status").about("Show load and save state").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Output as JSON"),
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = load_config(matches.get_one::<PathBuf>("config")).await?;

    let credentials = match (
        matches.get_one::<String>("user"),
        matches.get_one::<String>("password"),
    ) {
        (Some(user), Some(password)) => Some(Credentials::new(user, password)),
        (Some(_), None) => bail!("--password is required with --user"),
        _ => None,
    };
    let session = StaticAuthenticator::new(config.auth.clone()).login(credentials.as_ref());

    let cache_dir = matches
        .get_one::<PathBuf>("cache-dir")
        .context("missing cache directory")?;
    let cache = FileCache::open(cache_dir)
        .await
        .with_context(|| format!("cannot open cache at {}", cache_dir.display()))?;
    let seed = matches
        .get_one::<String>("seed")
        .context("missing seed location")?;

    let engine = PlanningEngine::mount(session, config, Arc::new(cache), seed_from_location(seed))
        .await
        .context("cannot open planning data")?;

    let result = run(&engine, &matches).await;
    engine.shutdown();
    result
}

async fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    EngineConfig::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

async fn run(engine: &PlanningEngine, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", args)) => {
            let document = ready_document(engine)?;
            let value = match args.get_one::<String>("path") {
                Some(path) => engine
                    .read(&path.parse::<DocPath>()?)
                    .with_context(|| format!("nothing at '{path}'"))?,
                None => Value::clone(&document),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Some(("set", args)) => {
            let path = required(args, "path")?;
            let value = parse_value(required(args, "value")?);
            engine.set(path, value)?;
            engine.save().await?;
            println!("Saved {path}");
        }
        Some(("export", args)) => {
            let artifact = engine.export_snapshot()?;
            let out = args
                .get_one::<PathBuf>("out")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(&artifact.file_name));
            tokio::fs::write(&out, &artifact.contents)
                .await
                .with_context(|| format!("cannot write {}", out.display()))?;
            println!("Exported to {}", out.display());
        }
        Some(("import", args)) => {
            let file = args
                .get_one::<PathBuf>("file")
                .context("missing import file")?;
            import(engine, file).await?;
        }
        Some(("reset", _)) => {
            engine.reset().await?;
            println!("Reset to canonical seed");
        }
        Some(("status", args)) => print_status(engine, args.get_flag("json"))?,
        _ => bail!("no command given"),
    }
    Ok(())
}

async fn import(engine: &PlanningEngine, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let receipt = engine.import_snapshot(&text).await?;
    println!("Imported {} ({} bytes)", file.display(), receipt.bytes);
    Ok(())
}

fn print_status(engine: &PlanningEngine, json: bool) -> Result<()> {
    let loaded = engine.status() == LoadStatus::Ready;
    let last_saved = engine.last_saved_at().map(|t| t.to_rfc3339());
    let user = engine.principal().map(|p| p.display_name.clone());

    if json {
        let report = serde_json::json!({
            "loaded": loaded,
            "dirty": engine.is_dirty(),
            "schema_version": engine.config().gateway.schema_version,
            "last_saved_at": last_saved,
            "user": user,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Status:");
        println!("  Loaded: {loaded}");
        println!("  Dirty: {}", engine.is_dirty());
        println!("  Schema Version: {}", engine.config().gateway.schema_version);
        println!("  Last Saved: {}", last_saved.as_deref().unwrap_or("never"));
        println!("  User: {}", user.as_deref().unwrap_or("-"));
    }
    Ok(())
}

fn ready_document(engine: &PlanningEngine) -> Result<Arc<Value>> {
    match engine.document() {
        Some(document) => Ok(document),
        None => bail!("planning data is not loaded: the seed is unavailable"),
    }
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing <{name}>"))
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
