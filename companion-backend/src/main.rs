use dotenv::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};

use companion_backend::{CompanionEngine, Config};

const HELP: &str = "Commands: /continue  /context  /synthesis  /scenario <id>  /reload  /reset  /quit";

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    log::info!(
        "Starting companion engine for '{}' ({} mode, data in {})",
        config.character_id,
        config.memory_mode.as_str(),
        config.data_dir.display()
    );

    let engine = match CompanionEngine::from_config(config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to start engine: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').unwrap_or((line, "")) {
            ("/quit", _) => break,
            ("/continue", _) => match engine.process_continuation().await {
                Ok(reply) => println!("{}", reply),
                Err(e) => log::error!("Continuation failed: {}", e),
            },
            ("/context", rest) => println!("{}", engine.get_assembled_context(rest).await),
            ("/synthesis", _) => match engine.trigger_synthesis_if_due().await {
                Ok(Some(report)) => println!("Synthesis ran ({})", report.reason.label()),
                Ok(None) => println!("Synthesis is not due"),
                Err(e) => log::error!("Synthesis check failed: {}", e),
            },
            ("/scenario", id) => match id.trim().parse::<i64>() {
                Ok(id) => {
                    if let Err(e) = engine.switch_scenario(id) {
                        log::error!("{}", e);
                    }
                }
                Err(_) => println!("Usage: /scenario <id>"),
            },
            ("/reload", _) => engine.reload_character(),
            ("/reset", _) => {
                engine.wait_for_background().await;
                if let Err(e) = engine.reset_memory() {
                    log::error!("Reset failed: {}", e);
                }
            }
            _ => match engine.process_turn(line).await {
                Ok(reply) => println!("{}", reply),
                Err(e) => log::error!("Turn failed: {}", e),
            },
        }
    }

    log::info!("Waiting for background memory work");
    engine.wait_for_background().await;
    Ok(())
}
