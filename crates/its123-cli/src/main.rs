use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use its123_core::{
    ClientConfig, Event, EventData, EventKind, LoadOptions, ProductOrchestrator, ReportMeta,
};
use its123_http::ReqwestClient;
use its123_store::{FileBackend, PersistentStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod terminal;

use terminal::{LogReporter, Terminal};

const DEFAULT_STORE: &str = ".its123-store.json";

fn cli() -> Command {
    Command::new("its123")
        .version(its123_core::VERSION)
        .about("Run 123test assessment products from the terminal")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .global(true)
                .help("API key, overrides configuration and ITS123_API_KEY"),
        )
        .arg(
            Arg::new("domain")
                .long("domain")
                .global(true)
                .help("API domain, overrides configuration and ITS123_DOMAIN"),
        )
        .subcommand(
            Command::new("run")
                .about("Run a product to completion")
                .arg(Arg::new("product").required(true).help("Product id"))
                .arg(
                    Arg::new("user")
                        .long("user")
                        .default_value("")
                        .help("Respondent UUID"),
                )
                .arg(
                    Arg::new("store")
                        .long("store")
                        .default_value(DEFAULT_STORE)
                        .value_parser(value_parser!(PathBuf))
                        .help("File used to resume interrupted runs"),
                )
                .arg(
                    Arg::new("no-storage")
                        .long("no-storage")
                        .action(ArgAction::SetTrue)
                        .help("Neither resume nor persist progress"),
                )
                .arg(
                    Arg::new("no-report")
                        .long("no-report")
                        .action(ArgAction::SetTrue)
                        .help("Skip rendering the report"),
                ),
        )
        .subcommand(
            Command::new("overview")
                .about("Show a product overview as JSON")
                .arg(Arg::new("access-code").required(true).help("Product access code")),
        )
        .subcommand(
            Command::new("report")
                .about("Render a report")
                .arg(Arg::new("access-code").required(true).help("Report access code"))
                .arg(Arg::new("meta").long("meta").help("Base64 meta data"))
                .arg(Arg::new("hmac").long("hmac").help("HMAC of the meta data")),
        )
        .subcommand(
            Command::new("pdf-url")
                .about("Print the PDF URL of a product report")
                .arg(Arg::new("access-code").required(true).help("Product access code"))
                .arg(
                    Arg::new("type")
                        .long("type")
                        .default_value("standard")
                        .help("Report type: standard or premium"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("run", args)) => run(config, args).await,
        Some(("overview", args)) => {
            let orchestrator = orchestrator(config)?;
            let product = orchestrator
                .request_product_info(required(args, "access-code")?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&product)?);
            Ok(())
        }
        Some(("report", args)) => {
            let meta = match (args.get_one::<String>("meta"), args.get_one::<String>("hmac")) {
                (Some(data), Some(hmac)) => Some(ReportMeta::new(data.as_str(), hmac.as_str())),
                _ => None,
            };
            orchestrator(config)?
                .load_report(required(args, "access-code")?, meta)
                .await?;
            Ok(())
        }
        Some(("pdf-url", args)) => {
            let orchestrator = orchestrator(config)?;
            let product = orchestrator
                .request_product_info(required(args, "access-code")?)
                .await?;
            println!("{}", orchestrator.get_pdf_url(&product, required(args, "type")?)?);
            Ok(())
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

fn load_config(matches: &ArgMatches) -> Result<ClientConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ClientConfig::default(),
    }
    .with_env_overrides();

    if let Some(key) = matches.get_one::<String>("api-key") {
        config.api_key.clone_from(key);
    }
    if let Some(domain) = matches.get_one::<String>("domain") {
        config = config.with_domain(domain.as_str());
    }
    Ok(config)
}

fn orchestrator(config: ClientConfig) -> Result<ProductOrchestrator> {
    let terminal = Arc::new(
        Terminal::new(tokio::io::BufReader::new(tokio::io::stdin()))
            .context("building terminal renderer")?,
    );
    let http = ReqwestClient::new().context("building http client")?;

    let orchestrator = ProductOrchestrator::new(config, Arc::new(http), terminal.clone(), terminal)
        .context("invalid client configuration")?
        .with_error_reporter(Arc::new(LogReporter));
    Ok(orchestrator)
}

async fn run(config: ClientConfig, args: &ArgMatches) -> Result<()> {
    let product_id = required(args, "product")?;
    let storage = !args.get_flag("no-storage");

    let mut orchestrator = orchestrator(config)?;
    if storage {
        let path = args
            .get_one::<PathBuf>("store")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE));
        let backend = FileBackend::open(&path)
            .with_context(|| format!("opening store {}", path.display()))?;
        orchestrator = orchestrator.with_store(PersistentStore::new(Arc::new(backend)));
    }

    orchestrator.on(
        [
            EventKind::InstrumentAlreadyCompleted,
            EventKind::InstrumentContinue,
            EventKind::InstrumentCompleted,
            EventKind::InstrumentSubmitFailed,
        ],
        print_progress,
    );

    let options = LoadOptions::new()
        .with_storage(storage)
        .with_render_report(!args.get_flag("no-report"))
        .with_user(required(args, "user")?);
    let product = orchestrator.load_product(product_id, options).await?;

    eprintln!("product {} completed", product.product_access_code);
    if let Ok(url) = orchestrator.get_pdf_url(&product, "standard") {
        eprintln!("pdf: {url}");
    }
    Ok(())
}

fn print_progress(event: &Event) {
    match &event.data {
        EventData::Instrument {
            access_code,
            status,
        } => eprintln!("{}: {access_code} ({status})", event.kind),
        EventData::SubmitFailed {
            attempt,
            max_attempts,
            message,
            ..
        } => eprintln!("submission failed ({attempt}/{max_attempts}): {message}"),
        _ => eprintln!("{}", event.kind),
    }
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing argument {name}"))
}
