/**
 * XFChat Simulator Entry Point
 *
 * Drives a coordinator against the in-memory loopback remote with injected
 * transient failures, then prints and saves the resulting store snapshot.
 *
 * Usage: xfchat-sim [config.toml]
 */
use std::sync::Arc;
use std::time::Duration;
use xfchat::offline::{Coordinator, FailurePlan, LoopbackRemote, Operation, OperationKind};
use xfchat::shared::{AppConfig, ChatError, RetryConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("XFCHAT_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::builder()
            .user_id("sim-user")
            .retry(RetryConfig {
                max_attempts: 4,
                base_delay_ms: 200,
                max_delay_ms: 2_000,
                jitter: 0.1,
            })
            .build()?,
    };
    tracing::info!(user_id = %config.user_id, "starting simulation");

    let plan = FailurePlan::new()
        .fail_times(OperationKind::SendMessage, 2, ChatError::network("connection reset"))
        .fail_times(OperationKind::SendReaction, 1, ChatError::server(503, "unavailable"))
        .fail_times(OperationKind::MarkAllRead, 1, ChatError::network("timeout"));
    let remote = Arc::new(LoopbackRemote::with_plan(plan).assigning_server_ids());
    remote.set_latency(Duration::from_millis(20));

    let coordinator = Coordinator::builder()
        .config(config)
        .remote(remote.clone())
        .build()?;
    let cleanup = coordinator.spawn_typing_cleanup(Duration::from_secs(1));

    coordinator
        .submit(Operation::create_channel(
            "messaging:general",
            vec!["bob".to_string(), "carol".to_string()],
        ))
        .execute()
        .await?;
    coordinator
        .submit(Operation::watch("messaging:random", 25))
        .execute()
        .await?;

    coordinator.submit(Operation::keystroke("messaging:general")).execute().await?;
    let message = coordinator
        .submit(Operation::send_message("messaging:general", "hello from the simulator"))
        .execute()
        .await?
        .into_message()
        .ok_or("send did not return a message")?;
    coordinator.submit(Operation::stop_typing("messaging:general")).execute().await?;

    coordinator
        .submit(Operation::send_reaction("messaging:general", &message.id, "wave"))
        .execute()
        .await?;
    coordinator
        .submit(Operation::reply("messaging:general", &message.id, "threaded reply"))
        .execute()
        .await?;

    // offline writes are parked and pushed on reconnect
    coordinator.set_online(false).await;
    coordinator
        .submit(Operation::send_message("messaging:random", "written offline"))
        .execute()
        .await?;
    let sweep = coordinator.set_online(true).await;
    tracing::info!(?sweep, "reconnected");

    if let Err(error) = coordinator.submit(Operation::MarkAllRead).execute().await {
        tracing::warn!(%error, "mark all read failed");
    }

    let snapshot = coordinator.store().snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    println!("remote calls: {}", remote.total_calls());
    println!("pending: {:?}", coordinator.pending().stats());

    let path = coordinator.save_store()?;
    tracing::info!(path = %path.display(), "store saved");

    cleanup.abort();
    Ok(())
}
