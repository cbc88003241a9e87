use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use console::{style, Term};
use lnwallet::config::{Config, CONFIG_FILE_NAME};
use lnwallet::core::WalletController;
use lnwallet::decoder::Bolt11Decoder;
use lnwallet::events::handlers::LoggingEventHandler;
use lnwallet::events::{EventBus, PollKind, WalletEvent};
use lnwallet::notifications::ConsoleNotifier;
use lnwallet::observability::{init_logging, sanitize_api_key, LoggingConfig};
use lnwallet::repository::LnbitsClient;
use lnwallet::view::WalletView;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{info, warn};

/// Rows shown by `balance`
const RECENT_PAYMENTS: usize = 5;

#[derive(Subcommand)]
enum Commands {
    /// Show the balance and the most recent payments
    Balance,
    /// List payments, newest first
    History {
        /// Hide pending payments
        #[clap(long)]
        paid_only: bool,
    },
    /// Hourly incoming/outgoing totals with the running balance
    Chart,
    /// Create an invoice and wait for it to be paid
    Receive {
        /// Amount in sat
        #[clap(long)]
        amount: u64,
        #[clap(long, default_value = "")]
        memo: String,
    },
    /// Pay a BOLT11 invoice and wait for confirmation
    Send { bolt11: String },
    /// Re-check pending payments with the server
    CheckPending,
}

#[derive(Parser)]
#[clap(version, about)]
struct Cli {
    /// Data directory path (contains config and logs)
    #[clap(long, env = "LNWALLET_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Payments API url (overrides config)
    #[clap(long, env = "LNWALLET_API_URL")]
    api_url: Option<String>,

    /// Admin key (overrides config)
    #[clap(long, env = "LNWALLET_ADMIN_KEY")]
    admin_key: Option<String>,

    /// Invoice key (overrides config)
    #[clap(long, env = "LNWALLET_INVOICE_KEY")]
    invoice_key: Option<String>,

    /// Wallet id (overrides config)
    #[clap(long, env = "LNWALLET_WALLET_ID")]
    wallet_id: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli: Cli = Cli::parse();

    let log_config = LoggingConfig {
        level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
        log_dir: cli.data_dir.join("logs"),
        console_output: std::env::var("NO_CONSOLE_LOG").is_err(),
        file_output: std::env::var("NO_FILE_LOG").is_err(),
        ..Default::default()
    };
    init_logging(log_config)?;

    std::fs::create_dir_all(&cli.data_dir)?;

    let term = Term::stdout();
    let config_path = cli.data_dir.join(CONFIG_FILE_NAME);
    let (mut config, created) = Config::load_or_create(&config_path)?;

    if created {
        term.write_line(&format!(
            "{}{}",
            style("Writing default configuration...").yellow(),
            style("done").white()
        ))?;
    }

    // Override config with CLI arguments
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(admin_key) = cli.admin_key {
        config.admin_key = Some(admin_key);
    }
    if let Some(invoice_key) = cli.invoice_key {
        config.invoice_key = Some(invoice_key);
    }
    if let Some(wallet_id) = cli.wallet_id {
        config.wallet_id = Some(wallet_id);
    }

    let mut wallet = config.wallet()?;
    let repository = LnbitsClient::new(&config.api_url, config.request_timeout())?;
    match repository.wallet_details(&wallet).await {
        Ok(details) => wallet.balance_msat = details.balance,
        Err(e) => warn!(error = %e, "Could not load the wallet balance"),
    }
    info!(
        api_url = %repository.base_url(),
        wallet_id = %wallet.id,
        invoice_key = %sanitize_api_key(&wallet.invoice_key),
        can_spend = wallet.admin_key.is_some(),
        "Wallet configured"
    );

    let event_bus = Arc::new(EventBus::default());
    event_bus
        .register_handler(Arc::new(LoggingEventHandler::new(false)))
        .await;

    let controller = WalletController::new(
        wallet,
        Arc::new(repository),
        Arc::new(Bolt11Decoder),
        Arc::new(ConsoleNotifier::new()),
        event_bus.clone(),
        config.timing.controller_config(),
    );

    let result = run(cli.command, &controller, &event_bus, &term).await;
    controller.shutdown().await;
    result
}

async fn run(
    command: Commands,
    controller: &WalletController,
    event_bus: &EventBus,
    term: &Term,
) -> Result<()> {
    match command {
        Commands::Balance => {
            controller.fetch_payments(false).await?;
            let view = controller.view().await;
            print_balance(term, &view)?;
            print_payments(term, view.payments.iter().take(RECENT_PAYMENTS))?;
        }
        Commands::History { paid_only } => {
            controller.fetch_payments(false).await?;
            let view = controller.view().await;
            let rows = if paid_only {
                &view.paid_payments
            } else {
                &view.payments
            };
            print_payments(term, rows.iter())?;
        }
        Commands::Chart => {
            controller.fetch_payments(false).await?;
            term.write_line(&format!(
                "{:<18} {:>12} {:>12} {:>14}",
                "hour", "in", "out", "balance"
            ))?;
            for bucket in controller.chart().await {
                term.write_line(&format!(
                    "{:<18} {:>12} {:>12} {:>14}",
                    bucket.hour_label,
                    bucket.incoming_sats,
                    bucket.outgoing_sats,
                    bucket.cumulative_balance
                ))?;
            }
        }
        Commands::CheckPending => {
            let count = controller.check_pending_payments().await?;
            let view = controller.view().await;
            term.write_line(&format!("{} payments checked", count))?;
            print_balance(term, &view)?;
        }
        Commands::Receive { amount, memo } => {
            receive(controller, event_bus, term, amount, &memo).await?;
        }
        Commands::Send { bolt11 } => {
            send(controller, event_bus, term, &bolt11).await?;
        }
    }

    Ok(())
}

async fn receive(
    controller: &WalletController,
    event_bus: &EventBus,
    term: &Term,
    amount_sat: u64,
    memo: &str,
) -> Result<()> {
    let mut events = event_bus.subscribe();

    controller.open_receive().await;
    let payment_request = controller.request_invoice(amount_sat, memo).await?;

    term.write_line(&style("Invoice").bold().to_string())?;
    term.write_line(&payment_request)?;
    term.write_line(&style("Waiting for payment (Ctrl-C to stop)...").dim().to_string())?;

    let interrupted = tokio::select! {
        _ = next_event(&mut events, |e| matches!(e, WalletEvent::InvoicePaid { .. })) => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        controller.close_receive().await;
        let grace = controller.config().receive_close_grace;
        term.write_line(&format!(
            "Closed, still watching for {}s...",
            grace.as_secs()
        ))?;

        let outcome = timeout(
            grace + Duration::from_secs(1),
            next_event(&mut events, |e| {
                matches!(
                    e,
                    WalletEvent::InvoicePaid { .. }
                        | WalletEvent::PollStopped {
                            kind: PollKind::Receive,
                            ..
                        }
                )
            }),
        )
        .await;

        if !matches!(outcome, Ok(Some(WalletEvent::InvoicePaid { .. }))) {
            return Ok(());
        }
    }

    term.write_line(&style("Payment received").green().to_string())?;
    print_balance(term, &controller.view().await)?;
    Ok(())
}

async fn send(
    controller: &WalletController,
    event_bus: &EventBus,
    term: &Term,
    bolt11: &str,
) -> Result<()> {
    let mut events = event_bus.subscribe();

    controller.fetch_payments(false).await?;
    controller.open_send().await;
    let invoice = controller.decode(bolt11).await?;

    term.write_line(&format!("{} sat", style(invoice.fsat()).bold()))?;
    if let Some(description) = &invoice.description {
        term.write_line(description)?;
    }
    if let Some(expires) = invoice.expire_date_string() {
        term.write_line(&format!("Expires {}", expires))?;
    }
    term.write_line(&format!("Hash {}", invoice.payment_hash))?;

    controller.pay().await?;

    let outcome = tokio::select! {
        event = next_event(&mut events, |e| {
            matches!(e, WalletEvent::PaymentSucceeded { .. } | WalletEvent::PaymentFailed { .. })
        }) => event,
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(WalletEvent::PaymentSucceeded { .. }) => {
            term.write_line(&style("Payment sent").green().to_string())?;
            print_balance(term, &controller.view().await)?;
            Ok(())
        }
        Some(WalletEvent::PaymentFailed { reason, .. }) => {
            controller.close_send().await;
            Err(anyhow!("Payment failed: {}", reason))
        }
        _ => {
            controller.close_send().await;
            let grace = controller.config().send_close_grace;
            let settled = timeout(
                grace + Duration::from_secs(1),
                next_event(&mut events, |e| {
                    matches!(
                        e,
                        WalletEvent::PaymentSucceeded { .. }
                            | WalletEvent::PollStopped {
                                kind: PollKind::Send,
                                ..
                            }
                    )
                }),
            )
            .await;
            if matches!(settled, Ok(Some(WalletEvent::PaymentSucceeded { .. }))) {
                term.write_line(&style("Payment sent").green().to_string())?;
            } else {
                term.write_line("Stopped waiting, the payment may still settle")?;
            }
            Ok(())
        }
    }
}

/// Wait for the next event accepted by `matches`
async fn next_event<F>(
    events: &mut broadcast::Receiver<WalletEvent>,
    matches: F,
) -> Option<WalletEvent>
where
    F: Fn(&WalletEvent) -> bool,
{
    loop {
        match events.recv().await {
            Ok(event) if matches(&event) => return Some(event),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn print_balance(term: &Term, view: &WalletView) -> Result<()> {
    term.write_line(&format!(
        "{} {}",
        style(&view.formatted_balance).bold(),
        style("sat").dim()
    ))?;
    if view.pending_payments_exist {
        term.write_line(&style("Some payments are still pending").yellow().to_string())?;
    }
    Ok(())
}

fn print_payments<'a>(
    term: &Term,
    payments: impl Iterator<Item = &'a lnwallet::types::Payment>,
) -> Result<()> {
    for payment in payments {
        let amount = if payment.is_out() {
            style(payment.fsat()).red()
        } else {
            style(payment.fsat()).green()
        };
        let memo = if payment.pending {
            format!("{} (pending)", payment.memo)
        } else {
            payment.memo.clone()
        };
        term.write_line(&format!("{:<32} {:<17} {:>14}", memo, payment.date(), amount))?;
    }
    Ok(())
}
