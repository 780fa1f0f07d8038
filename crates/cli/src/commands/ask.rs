//! `mnemos ask`: a single turn.

use mnemos_config::AppConfig;

use super::build_session;

pub async fn run(config: &AppConfig, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(config).await?;
    let Some(reply) = session.handle(message).await else {
        return Ok(());
    };

    for notice in &reply.notices {
        eprintln!("{notice}");
    }
    println!("{}", reply.text);

    if let Some(handle) = reply.autosave {
        handle.await?;
    }
    Ok(())
}
