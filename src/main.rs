use std::sync::Arc;

use inbox_pilot::config::{HTTP_TIMEOUT, PilotConfig};
use inbox_pilot::llm::{LlmBackend, LlmConfig, create_provider};
use inbox_pilot::mailbox::token::TokenFile;
use inbox_pilot::mailbox::{GmailClient, Mailbox};
use inbox_pilot::notify::{Notifier, TelegramNotifier};
use inbox_pilot::pipeline::{MessageProcessor, Poller};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PilotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export GOOGLE_API_KEY=...");
        std::process::exit(1);
    });

    if config.materialize_token()? {
        eprintln!("   Token file written from GMAIL_TOKEN");
    }

    eprintln!("📬 Inbox Pilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Query: {}", config.gmail.query);
    eprintln!("   Token: {}", config.token_path().display());
    eprintln!("   Poll interval: {}s", config.poll_interval.as_secs());

    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm = create_provider(&LlmConfig {
        backend: LlmBackend::Gemini,
        api_key: config.google_api_key.clone(),
        model: config.model.clone(),
        base_url: None,
        request_timeout: HTTP_TIMEOUT,
    })?;

    // ── Mailbox ──────────────────────────────────────────────────────────
    let token = Arc::new(TokenFile::load(config.token_path(), http.clone())?);
    let mailbox: Arc<dyn Mailbox> =
        Arc::new(GmailClient::new(config.gmail.clone(), http.clone(), token));

    // ── Notifications ────────────────────────────────────────────────────
    let notifier: Option<Arc<dyn Notifier>> = match config.telegram.clone() {
        Some(telegram) => {
            eprintln!("   Notifications: telegram (chat {})", telegram.chat_id);
            Some(Arc::new(TelegramNotifier::new(telegram, http.clone())))
        }
        None => {
            eprintln!("   Notifications: disabled (TELEGRAM_TOKEN / TELEGRAM_CHAT_ID not set)");
            None
        }
    };
    eprintln!();

    let processor = MessageProcessor::new(Arc::clone(&mailbox), llm, notifier);
    let poller = Poller::new(mailbox, processor, config.poll_interval);

    poller
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    eprintln!("Stopped by user.");
    Ok(())
}
