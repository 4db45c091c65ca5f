//! `book2pdf` command line

use anyhow::Context;
use book2pdf_core::config::{default_config_path, DEFAULT_ENVIRONMENT};
use book2pdf_core::prelude::*;
use book2pdf_core::ConfigFile;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("book2pdf")
        .version(book2pdf_core::VERSION)
        .about("Assemble the page images of an Islandora book into one PDF")
        .arg(
            Arg::new("pid")
                .required(true)
                .value_name("PID")
                .help("Book object identifier, or a collection with --collection"),
        )
        .arg(
            Arg::new("collection")
                .long("collection")
                .short('c')
                .action(ArgAction::SetTrue)
                .help("Treat PID as a collection and rebuild its books' PDFs"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .short('f')
                .action(ArgAction::SetTrue)
                .requires("collection")
                .help("Rebuild every book, even those with a PDF already"),
        )
        .arg(
            Arg::new("env")
                .long("env")
                .short('e')
                .default_value(DEFAULT_ENVIRONMENT)
                .help("Configuration environment to use"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file [default: ~/.book2pdf.toml]"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Directory receiving the PDFs"),
        )
        .arg(
            Arg::new("page-jobs")
                .long("page-jobs")
                .value_parser(value_parser!(usize))
                .help("Concurrent page downloads per book"),
        )
        .arg(
            Arg::new("book-jobs")
                .long("book-jobs")
                .value_parser(value_parser!(usize))
                .help("Concurrent books in collection mode"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("More logging; repeat for trace output"),
        )
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<RepositoryConfig> {
    let path = match args.get_one::<PathBuf>("config") {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let environment = args
        .get_one::<String>("env")
        .map_or(DEFAULT_ENVIRONMENT, String::as_str);
    let file = ConfigFile::load(&path)?;
    let mut config = file.environment(environment, &path)?;
    if let Some(n) = args.get_one::<usize>("page-jobs") {
        config = config.with_page_concurrency(*n);
    }
    if let Some(n) = args.get_one::<usize>("book-jobs") {
        config = config.with_book_concurrency(*n);
    }
    tracing::debug!(
        "using '{}' from {}: islandora {}, solr {}",
        environment,
        path.display(),
        config.islandora_url,
        config.solr_url
    );
    Ok(config)
}

/// Returns whether every requested book was built
async fn run(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = load_config(args)?;
    let output_dir = args
        .get_one::<PathBuf>("output-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create output directory {}", output_dir.display()))?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let index = Arc::new(
        SolrIndexClient::new(&config)
            .context("cannot build index client")?
            .with_cancel(cancel.clone()),
    );
    let repository = Arc::new(
        IslandoraRepository::new(&config)
            .context("cannot build repository client")?
            .with_cancel(cancel.clone()),
    );
    let converter =
        Arc::new(Img2PdfConverter::from_tuning(&config.tuning).with_cancel(cancel.clone()));
    let assembler = BookAssembler::new(&config, index.clone(), repository, converter)
        .with_output_dir(output_dir)
        .with_cancel(cancel.clone());

    let pid = args
        .get_one::<String>("pid")
        .context("PID argument missing")?;

    if args.get_flag("collection") {
        let driver = CollectionDriver::new(&config, index, assembler).with_cancel(cancel);
        let summary = driver
            .process_collection(&CollectionId::new(pid.as_str()), args.get_flag("force"))
            .await
            .with_context(|| format!("collection {pid} not processed"))?;
        for book in &summary.failed {
            if summary.retryable.contains(book) {
                tracing::error!("{} has no new PDF; a rerun may succeed", book);
            } else {
                tracing::error!("{} has no new PDF", book);
            }
        }
        return Ok(summary.failed.is_empty());
    }

    let artifact = match assembler.assemble(&BookId::new(pid.as_str())).await {
        Ok(artifact) => artifact,
        Err(e) => {
            let hint = if e.is_retryable() { "; a rerun may succeed" } else { "" };
            return Err(anyhow::Error::new(e).context(format!("no PDF built for {pid}{hint}")));
        }
    };
    for failure in &artifact.page_failures {
        tracing::warn!("{}: {:?} ({})", failure.page, failure.kind, failure.reason);
    }
    println!("{}", artifact.path.display());
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli().get_matches();
    init_tracing(args.get_count("verbose"));

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn parses_collection_run() {
        let args = cli()
            .try_get_matches_from([
                "book2pdf",
                "smith:books",
                "--collection",
                "--force",
                "--book-jobs",
                "2",
                "-vv",
            ])
            .unwrap();
        assert!(args.get_flag("collection"));
        assert!(args.get_flag("force"));
        assert_eq!(args.get_one::<usize>("book-jobs"), Some(&2));
        assert_eq!(args.get_count("verbose"), 2);
        assert_eq!(args.get_one::<String>("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn force_requires_collection() {
        assert!(cli()
            .try_get_matches_from(["book2pdf", "smith:1", "--force"])
            .is_err());
    }

    #[test]
    fn pid_is_required() {
        assert!(cli().try_get_matches_from(["book2pdf"]).is_err());
    }
}
