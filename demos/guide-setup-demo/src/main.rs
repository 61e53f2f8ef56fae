//! Wires a PHD2 client into the task registry and runs
//! `complete_guide_setup` against a locally running PHD2 instance.
//!
//! Not a CLI in any real sense (argument parsing is out of scope for the
//! crate) — just enough `main` to show how the pieces in `task::registry`
//! fit together.

use astro_device_plane::config::Phd2ClientConfig;
use astro_device_plane::phd2::Client;
use astro_device_plane::task;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let client = Arc::new(Client::new(Phd2ClientConfig::default()));
    client.connect().await?;

    let registry = task::build_registry(&client);
    let task = registry
        .create("complete_guide_setup")
        .expect("complete_guide_setup is registered at startup");

    let result = task
        .execute(json!({ "auto_find_star": true, "retry_count": 3 }))
        .await;

    for entry in task.history().await {
        println!("[history] {}", entry.message);
    }

    match result {
        Ok(value) => println!("guide setup complete: {value}"),
        Err(error) => println!("guide setup failed: {error}"),
    }

    client.disconnect().await;
    Ok(())
}
