use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use ibgib_cache::{ContentCache, FileStore};
use ibgib_content::{GibHasher, IbGibId};
use ibgib_sync::telemetry::init_tracing;
use ibgib_sync::{ContentResolver, HttpContentFetcher, SyncConfig};
use std::io::Read;
use std::sync::Arc;

fn cli() -> Command {
    Command::new("ibgib-sync")
        .version(ibgib_sync::VERSION)
        .about("ibGib graph sync client tools")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("TOML")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("fetch")
                .about("Resolve one snapshot (cache first, then HTTP)")
                .arg(Arg::new("id").required(true).help("Content identifier <ib>^<gib>"))
                .arg(
                    Arg::new("base")
                        .long("base")
                        .value_name("URL")
                        .help("Override base_json_path"),
                ),
        )
        .subcommand(
            Command::new("skill")
                .about("Answer a voice-skill request")
                .arg(
                    Arg::new("request")
                        .required(true)
                        .value_name("FILE")
                        .help("Request envelope JSON, or - for stdin"),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<SyncConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if matches.get_flag("json-logs") {
        config.log_json = true;
    }
    Ok(config)
}

async fn fetch(config: SyncConfig, args: &ArgMatches) -> Result<()> {
    let raw = args.get_one::<String>("id").context("missing id")?;
    let id: IbGibId = raw.parse().with_context(|| format!("invalid identifier '{raw}'"))?;
    let base = args
        .get_one::<String>("base")
        .cloned()
        .unwrap_or_else(|| config.base_json_path.clone());

    let content = match &config.persist_dir {
        Some(dir) => {
            let store = FileStore::open(dir.clone())
                .await
                .with_context(|| format!("opening {}", dir.display()))?;
            ContentCache::with_store(config.content_cache_capacity, Arc::new(store))
        }
        None => ContentCache::new(config.content_cache_capacity),
    };
    let hasher = GibHasher::with_salt(config.hash_salt.clone());
    let resolver = ContentResolver::new(content, Arc::new(HttpContentFetcher::new(&base)?), hasher.clone());

    let snapshot = resolver.resolve(&id).await?;
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    println!("id:                {}", snapshot.id());
    println!("temporal junction: {}", snapshot.temporal_junction());
    println!("category:          {:?}", snapshot.category());
    println!("hash verified:     {}", hasher.verify(&snapshot));
    Ok(())
}

fn skill(args: &ArgMatches) -> Result<()> {
    let path = args.get_one::<String>("request").context("missing request")?;
    let request = if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?
    };
    println!("{}", ibgib_skill::handle_json(&request)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    init_tracing(&config.log_level, config.log_json)?;

    match matches.subcommand() {
        Some(("fetch", args)) => fetch(config, args).await,
        Some(("skill", args)) => skill(args),
        Some((other, _)) => anyhow::bail!("unknown subcommand '{other}'"),
        None => anyhow::bail!("no subcommand given"),
    }
}
