use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use vesta_cli::{Command, Config};
use vesta_client::{CkanClient, CkanConfig, OpenAIClient};
use vesta_core::discovery::DiscoveryConfig;
use vesta_core::{
    AnalystConfig, AnalystReply, AnalystService, AppConfig, AppError, DiscoveryService,
    HttpConfig, TracingReporter, load_config,
};

type Analyst = AnalystService<CkanClient, OpenAIClient, OpenAIClient>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::parse();

    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let mut app_config =
        load_config(config.config.clone()).context("Failed to load configuration")?;
    config.apply_overrides(&mut app_config);

    let http = HttpConfig::default();
    let portal = build_portal(&app_config, &http)?;

    match &config.command {
        Command::Datasets { limit } => {
            let discovery =
                DiscoveryService::with_config(portal, DiscoveryConfig::from(&app_config.portal));
            list_datasets(&discovery, *limit).await?;
        }
        Command::Chat => {
            let analyst = build_analyst(&config, &app_config, &http, portal)?;
            chat(&analyst).await?;
        }
        Command::Ask { query } => {
            let analyst = build_analyst(&config, &app_config, &http, portal)?;
            let reply = ask(&analyst, query).await?;
            print_reply(&reply);
        }
    }

    Ok(())
}

fn build_portal(config: &AppConfig, http: &HttpConfig) -> anyhow::Result<CkanClient> {
    CkanClient::with_config(
        &config.portal.url,
        CkanConfig {
            api_path: config.portal.api_path.clone(),
            page_limit: config.rows.page_limit,
            retry: config.retry.portal_policy(),
            http: http.clone(),
        },
    )
    .context("Failed to create portal client")
}

fn build_analyst(
    cli: &Config,
    config: &AppConfig,
    http: &HttpConfig,
    portal: CkanClient,
) -> anyhow::Result<Analyst> {
    let api_key = cli.require_openai_key()?;
    let openai = OpenAIClient::with_config(api_key, &config.openai, config.retry.llm_policy(), http)
        .context("Failed to create OpenAI client")?;
    info!(
        "Using portal {} with chat model {}",
        config.portal.url, config.openai.chat_model
    );

    Ok(AnalystService::with_config(
        portal,
        openai.clone(),
        openai,
        AnalystConfig::from(config),
    ))
}

async fn ask(analyst: &Analyst, query: &str) -> Result<AnalystReply, AppError> {
    analyst
        .answer_with_progress(query, &TracingReporter)
        .await
        .inspect_err(|e| error!("{}", e.user_message()))
}

/// Reads questions from stdin until `exit`, `quit` or end of input.
///
/// A failed question is reported and the session continues.
async fn chat(analyst: &Analyst) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        println!();
        print!("How may I help you? ");
        io::stdout().flush().context("Failed to write prompt")?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read from stdin")?;
        let query = line.trim();

        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }

        if let Ok(reply) = ask(analyst, query).await {
            print_reply(&reply);
        }
    }

    Ok(())
}

async fn list_datasets(
    discovery: &DiscoveryService<CkanClient>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let datasets = discovery
        .discover_with_progress(&TracingReporter)
        .await
        .inspect_err(|e| error!("{}", e.user_message()))?;

    info!("Found {} CSV datasets", datasets.len());
    let shown = limit.unwrap_or(datasets.len());
    for dataset in datasets.iter().take(shown) {
        println!("{}  {}", dataset.id, dataset.name);
        if !dataset.description.is_empty() {
            println!("    {}", truncate_text(&dataset.description, 100));
        }
    }
    if shown < datasets.len() {
        println!("... and {} more", datasets.len() - shown);
    }

    Ok(())
}

fn print_reply(reply: &AnalystReply) {
    println!();
    println!("{}", reply.answer);

    if reply.datasets_used.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for source in &reply.datasets_used {
        let note = if source.truncated { ", incomplete" } else { "" };
        println!(
            "  - {} ({}, {} rows{})",
            source.name, source.id, source.rows, note
        );
        println!("    {}", source.landing_page);
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
