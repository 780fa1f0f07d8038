//! `mnemos chat`: interactive session.

use mnemos_config::AppConfig;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::build_session;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(config).await?;
    let info = session.store().info().await;

    println!();
    println!("  Mnemos: interactive mode");
    println!();
    println!("  Model:     {}", config.provider.model);
    println!("  Memory:    {} ({} records)", info.backend, info.records);
    println!("  Commands:  /save_persona /list_personas /save /recall /persist /load /fetch");
    println!("  Type 'exit' or 'quit' to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = Vec::new();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(reply) = session.handle(&line).await else {
            break;
        };

        for notice in &reply.notices {
            println!("  {notice}");
        }
        if !reply.text.is_empty() {
            for text_line in reply.text.lines() {
                println!("  Agent > {text_line}");
            }
            println!();
        }

        pending.retain(|h: &tokio::task::JoinHandle<()>| !h.is_finished());
        pending.extend(reply.autosave);
    }

    // Let in-flight auto-saves land before the process exits.
    for handle in pending {
        let _ = handle.await;
    }
    println!();
    println!("  Goodbye!");
    Ok(())
}
