//! `csp serve`: status page, Slack event processing and reminders.
//!
//! Startup sequence:
//! 1. Load config and resolve the bot's identity (`auth.test`, fatal)
//! 2. Publish a placeholder snapshot, then attempt the first rebuild
//! 3. Spawn the event worker (the only consumer of the event queue)
//! 4. Spawn the Socket Mode listener, or mount the webhook routes
//! 5. Spawn the reminder scheduler if enabled
//! 6. Serve HTTP until Ctrl+C, then signal shutdown

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use csp_bot::{Reconciler, ReminderScanner};
use csp_core::config::{load_config, SlackMode};
use csp_core::utils::parse_timezone;
use csp_cron::{OnFireFn, ReminderScheduler};
use csp_page::{ChannelSnapshot, PageBuilder, PageRenderer, SnapshotStore};
use csp_slack::{EventQueue, SlackClient, SocketListener};

use crate::helpers;
use crate::http::{self, AppState};

const EVENT_QUEUE_SIZE: usize = 256;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    helpers::print_banner();

    // 1. Config + identity
    let config = Arc::new(load_config(config_path));
    helpers::ensure_slack_configured(&config)?;

    let client = SlackClient::from_config(&config.slack);
    let bot_id = client
        .auth_test()
        .await
        .context("auth.test failed, check slack.botToken")?;
    info!(bot_id = %bot_id, channel = %config.slack.status_channel, "authenticated with Slack");

    // 2. Snapshot
    let store = Arc::new(SnapshotStore::new(ChannelSnapshot::placeholder(&config.status)));
    let builder = Arc::new(PageBuilder::new(
        client.clone(),
        config.clone(),
        bot_id.clone(),
        store.clone(),
    ));
    if builder.rebuild().await.is_err() {
        warn!("serving the placeholder page until a rebuild succeeds");
    }

    // 3. Event worker
    let queue = Arc::new(EventQueue::new(EVENT_QUEUE_SIZE));
    let shutdown = Arc::new(Notify::new());
    let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    let reconciler = Reconciler::new(client.clone(), builder.clone(), config.clone(), bot_id.clone());
    {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        tasks.push((
            "event worker",
            tokio::spawn(async move { reconciler.run(queue, shutdown).await }),
        ));
    }

    // 4. Transport
    let webhook_queue = match config.slack.mode {
        SlackMode::Socket => {
            let listener = SocketListener::new(
                client.clone(),
                config.slack.app_token.clone(),
                queue.sender(),
                shutdown.clone(),
            );
            tasks.push((
                "socket listener",
                tokio::spawn(async move {
                    if let Err(e) = listener.run().await {
                        error!(error = %format!("{e:#}"), "Socket Mode listener stopped");
                    }
                }),
            ));
            None
        }
        SlackMode::Webhook => Some(queue.clone()),
    };

    // 5. Reminders
    if config.reminders.enabled {
        let scanner = ReminderScanner::new(client.clone(), config.clone(), bot_id.clone(), store.clone());
        let on_fire: OnFireFn = Arc::new(move || {
            let scanner = scanner.clone();
            Box::pin(async move { scanner.scan_and_notify(false).await.map(|_| ()) })
        });
        let scheduler = ReminderScheduler::new(
            &config.reminders.schedule,
            parse_timezone(&config.status.timezone),
            on_fire,
            shutdown.clone(),
        )
        .context("reminders.schedule")?;
        tasks.push((
            "reminder scheduler",
            tokio::spawn(async move { scheduler.run().await }),
        ));
    }

    // 6. HTTP
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        renderer: PageRenderer::new().context("failed to load page template")?,
        queue: webhook_queue,
    });
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let mode = match config.slack.mode {
        SlackMode::Socket => "Socket Mode",
        SlackMode::Webhook => "webhooks",
    };
    println!("  Page:      http://{addr}/");
    println!("  Slack:     {mode}, channel {}", config.slack.status_channel);
    if config.reminders.enabled {
        println!("  Reminders: `{}`", config.reminders.schedule);
    }
    println!();
    println!("  Ctrl+C to stop");
    println!();

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received Ctrl+C, shutting down");
        })
        .await
        .context("HTTP server exited unexpectedly")?;

    println!();
    println!("  Shutting down...");
    shutdown.notify_waiters();
    for (name, task) in tasks {
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!(task = name, "did not stop in time");
        }
    }

    println!("  Stopped. Goodbye!");
    Ok(())
}
