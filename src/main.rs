use anyhow::Context;
use assist_stream::client::HttpTransport;
use assist_stream::config::AssistConfig;
use assist_stream::relay;
use assist_stream::session::{FinishReason, InvokeOutcome, SessionController, SessionObserver};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "assist-stream", about = "Streaming assistant client and relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Relay assistant requests and mirror responses to the log
    Serve {
        /// TOML config file; environment variables are used when omitted
        #[arg(long)]
        config: Option<String>,
    },
    /// Send one prompt and print the answer as it streams
    Ask {
        #[arg(long)]
        config: Option<String>,

        /// Override the upstream endpoint
        #[arg(long)]
        endpoint: Option<String>,

        prompt: String,
    },
}

/// Prints the answer incrementally
struct StdoutObserver {
    printed: parking_lot::Mutex<String>,
}

/// What to write when the answer changes from `printed` to `text`: whether a
/// new line is needed first, and the text to write after it.
fn answer_update<'a>(printed: &str, text: &'a str) -> (bool, &'a str) {
    match text.strip_prefix(printed) {
        Some(suffix) => (false, suffix),
        None => (true, text),
    }
}

impl SessionObserver for StdoutObserver {
    fn on_answer(&self, text: &str) {
        let mut printed = self.printed.lock();
        let mut out = std::io::stdout().lock();
        // Replacements that do not extend the printed text start a new line
        let (newline, rest) = answer_update(&printed, text);
        if newline {
            let _ = writeln!(out);
        }
        let _ = write!(out, "{}", rest);
        let _ = out.flush();
        *printed = text.to_string();
    }

    fn on_status(&self, status: Option<&str>) {
        if let Some(status) = status {
            tracing::info!("{}", status);
        }
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<AssistConfig> {
    let config = match path {
        Some(path) => AssistConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path))?,
        None => AssistConfig::from_env().context("loading config from environment")?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("assist_stream=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            let config = load_config(config.as_deref())?;
            config.validate()?;

            tracing::info!("Starting assist relay...");
            tracing::info!("  Listen: {}", config.server.listen_addr);
            tracing::info!("  Upstream: {}", config.upstream.endpoint);

            relay::serve(config).await?;
        }
        Command::Ask {
            config,
            endpoint,
            prompt,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(endpoint) = endpoint {
                config.upstream.endpoint = endpoint;
            }
            config.validate()?;

            let transport = Arc::new(HttpTransport::new(config.upstream.clone())?);
            let observer = Arc::new(StdoutObserver {
                printed: parking_lot::Mutex::new(String::new()),
            });
            let controller = Arc::new(
                SessionController::new(transport, config.session.clone()).with_observer(observer),
            );

            let ask = {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move { controller.send(&prompt).await })
            };

            let outcome = tokio::select! {
                outcome = ask => outcome?,
                _ = tokio::signal::ctrl_c() => {
                    controller.cancel();
                    InvokeOutcome::Finished(FinishReason::Aborted)
                }
            };
            println!();

            match outcome {
                InvokeOutcome::Finished(FinishReason::Error) => anyhow::bail!("session failed"),
                InvokeOutcome::Finished(reason) => {
                    tracing::info!("Finished: {}", reason.as_str());
                }
                InvokeOutcome::Rejected => anyhow::bail!("another stream is already active"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_update_extends_printed_text() {
        assert_eq!(answer_update("", "Hel"), (false, "Hel"));
        assert_eq!(answer_update("Hel", "Hello"), (false, "lo"));
        assert_eq!(answer_update("Hello", "Hello"), (false, ""));
    }

    #[test]
    fn test_answer_update_replacement_reprints_whole_text() {
        assert_eq!(answer_update("Hello", "Goodbye!"), (true, "Goodbye!"));
        assert_eq!(answer_update("Hello world", "Hello"), (true, "Hello"));
        assert_eq!(answer_update("héllo", "hello there"), (true, "hello there"));
    }
}
