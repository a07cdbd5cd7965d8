//! `chattron-core`: serves UI commands as JSON lines over stdin/stdout.
//!
//! One request object per input line, one response object per output line,
//! in request order. EOF on stdin shuts every tool server down.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use chattron::commands::{parse_request, CommandHandler, Response};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = chattron::data_dir();
    chattron::init_tracing(&data_dir);

    let handler = CommandHandler::new(&data_dir);
    match handler.startup().await {
        Ok(failures) => {
            for (key, err) in &failures {
                tracing::warn!(server = %key, error = %err, "server failed to start (non-fatal)");
            }
        }
        Err(e) => tracing::error!(error = %e, "cannot read server configuration"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let (id, request) = parse_request(&line);
        let response = match request {
            Ok(request) => handler.dispatch(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "rejected request");
                Response::error(&e)
            }
        };

        let mut out = serde_json::to_string(&response.with_id(id))
            .context("failed to serialize response")?;
        out.push('\n');
        stdout
            .write_all(out.as_bytes())
            .await
            .context("failed to write stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
    }

    tracing::info!("stdin closed; shutting down");
    handler.shutdown().await;
    Ok(())
}
