//! cortex command implementations

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cortex_agent::{default_registry, LoopController, TurnOutcome, TurnReport};
use cortex_config::{self, Config};
use cortex_oracle::OpenAiCompatibleOracle;
use cortex_session::{AnswerHistory, TurnStore};

/// Initialize config and data directory
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing cortex...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = cortex_config::init().await?;

    println!("Config: {}", cortex_config::config_path().display());
    println!("Turns:  {}", cortex_config::turns_dir().display());
    println!("Model:  {}", config.default_model());

    println!("\n◆ cortex initialized");
    println!("\nNext steps:");
    println!("  1. Add your API key to ~/.cortex/config.json");
    println!("     (or export OPENROUTER_API_KEY)");
    println!("  2. Ask something: cortex ask -m \"What is 2+2?\"");

    Ok(())
}

fn build_controller(config: &Config) -> Result<LoopController<OpenAiCompatibleOracle>> {
    let api_key = config
        .api_key()
        .context("No API key configured. Set oracle.api_key in ~/.cortex/config.json")?;

    let oracle = Arc::new(OpenAiCompatibleOracle::new(
        api_key,
        config.api_base(),
        Some(config.default_model()),
    ));
    let registry = Arc::new(default_registry(config));
    let store = Arc::new(TurnStore::new(cortex_config::turns_dir()));

    debug!(
        capabilities = registry.len(),
        max_steps = config.strategy.max_steps,
        max_lifelines = config.strategy.max_lifelines,
        "◆ controller ready"
    );

    Ok(LoopController::from_config(oracle, registry, config).with_store(store))
}

/// Run one turn; Ctrl+C cancels it between steps
async fn run_turn(
    controller: &LoopController<OpenAiCompatibleOracle>,
    input: &str,
) -> TurnReport {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("◆ interrupt received, cancelling turn");
                cancel.cancel();
            }
        })
    };

    let report = controller.run_turn_with_cancel(input, cancel).await;
    watcher.abort();
    report
}

fn print_outcome(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Answer(answer) => println!("\n◆ {}\n", answer),
        other => println!("\n{}\n", other),
    }
}

/// Read a y/n reply from stdin
fn confirm(question: &str) -> Result<bool> {
    print!("{}", question);
    std::io::stdout().flush()?;

    let mut reply = String::new();
    std::io::stdin().read_line(&mut reply)?;
    Ok(reply.trim().eq_ignore_ascii_case("y"))
}

/// Answer `input`, from history when a similar query was already answered.
/// Interactive sessions confirm before a remembered answer is reused.
async fn answer(
    controller: &LoopController<OpenAiCompatibleOracle>,
    history: Option<&mut AnswerHistory>,
    threshold: f64,
    input: &str,
    interactive: bool,
) -> Result<()> {
    if let Some(history) = history {
        if let Some((entry, score)) = history.search_similar(input, threshold) {
            info!("[memory] history hit for {:?} ({:.2})", entry.query, score);
            let reuse = if interactive {
                println!("\n◆ Found similar query in history:");
                println!("  Previous:  {}", entry.query);
                println!("  Timestamp: {}", entry.timestamp.format("%Y-%m-%d %H:%M"));
                confirm("  Use cached answer? (y/n) ")?
            } else {
                true
            };
            if reuse {
                println!("\n◆ {}", entry.answer);
                println!("  (from history: \"{}\", similarity {:.2})\n", entry.query, score);
                return Ok(());
            }
        }

        let report = run_turn(controller, input).await;
        print_outcome(&report.outcome);
        if let TurnOutcome::Answer(text) = &report.outcome {
            if let Err(e) = history.add(input, text.as_str()).await {
                warn!("Failed to save answer history: {}", e);
            }
        }
        return Ok(());
    }

    let report = run_turn(controller, input).await;
    print_outcome(&report.outcome);
    Ok(())
}

/// Ask the agent, once or interactively
pub async fn ask_command(message: Option<String>, no_history: bool) -> Result<()> {
    let config = Config::load().await?;
    let controller = build_controller(&config)?;

    let threshold = config.history.similarity_threshold;
    let mut history = if config.history.enabled && !no_history {
        Some(AnswerHistory::load(cortex_config::history_path()).await)
    } else {
        None
    };

    if let Some(msg) = message {
        return answer(&controller, history.as_mut(), threshold, &msg, false).await;
    }

    println!("◆ Interactive mode (type 'exit' to quit, 'new' to start over)");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    loop {
        print!("◆ ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            // every turn already starts from a fresh session
            "new" => {
                println!("◆ New turn\n");
                continue;
            }
            _ => answer(&controller, history.as_mut(), threshold, input, true).await?,
        }
    }

    Ok(())
}

fn mark(ok: bool, yes: &'static str, no: &'static str) -> &'static str {
    if ok {
        yes
    } else {
        no
    }
}

/// Show status
pub async fn status_command() -> Result<()> {
    let config_path = cortex_config::config_path();
    let turns_dir = cortex_config::turns_dir();

    println!("◆ cortex System Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!(
        "Config:   {} {}",
        config_path.display(),
        mark(config_path.exists(), "[OK]", "[Missing]")
    );
    println!(
        "Turns:    {} {}",
        turns_dir.display(),
        mark(turns_dir.exists(), "[OK]", "[Missing]")
    );

    let config = Config::load().await?;
    println!("Model:    {}", config.default_model());
    println!("Perceive: {}", config.perception_model());
    println!(
        "API Key:  {}",
        mark(config.has_api_key(), "[Set]", "[Missing]")
    );
    println!(
        "Search:   {}",
        mark(config.search_api_key().is_some(), "[Set]", "[Missing]")
    );
    println!(
        "Budget:   {} steps, {} lifelines",
        config.strategy.max_steps, config.strategy.max_lifelines
    );

    let history = AnswerHistory::load(cortex_config::history_path()).await;
    println!(
        "History:  {} ({} entries)",
        mark(config.history.enabled, "[Enabled]", "[Disabled]"),
        history.len()
    );

    println!("\n◆ Ready");

    Ok(())
}

/// List capability groups and their capabilities
pub async fn capabilities_command() -> Result<()> {
    let config = Config::load().await?;
    let registry = default_registry(&config);

    if registry.is_empty() {
        println!("No capabilities enabled");
        return Ok(());
    }

    println!("◆ Capabilities");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for group in registry.groups() {
        println!("{} - {}", group.id, group.description);
        for descriptor in registry.describe_groups(std::slice::from_ref(&group.id)) {
            println!("  {:<28} {}", descriptor.id, descriptor.usage);
        }
    }

    Ok(())
}

/// List archived turns, or print one
pub async fn turns_command(id: Option<String>) -> Result<()> {
    let store = TurnStore::new(cortex_config::turns_dir());

    if let Some(id) = id {
        let record = store
            .load(&id)
            .await
            .with_context(|| format!("No archived turn {}", id))?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let ids = store.list().await;
    if ids.is_empty() {
        println!("No archived turns");
        return Ok(());
    }

    println!("Archived turns:");
    for id in ids {
        match store.load(&id).await {
            Some(record) => println!(
                "  {} - {} ({}, {} steps) {}",
                id,
                record.outcome,
                record.finished_at.format("%Y-%m-%d %H:%M"),
                record.steps,
                cortex_session::preview(&record.original_input, 50)
            ),
            None => println!("  {} - [unreadable]", id),
        }
    }

    Ok(())
}
