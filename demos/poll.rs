use std::env;
use std::time::Duration;

use tech_controllers::TechClient;

#[tokio::main]
async fn main() -> tech_controllers::Result<()> {
    tracing_subscriber::fmt::init();

    let username = env::var("TECH_USERNAME").expect("usage: TECH_USERNAME=.. TECH_PASSWORD=.. poll");
    let password = env::var("TECH_PASSWORD").expect("usage: TECH_USERNAME=.. TECH_PASSWORD=.. poll");

    let mut client = TechClient::builder()
        .on_refresh(|udid, snapshot| {
            println!("[{udid}] refreshed at {}", snapshot.fetched_at);
            for zone in snapshot.zones.values() {
                let current = zone
                    .current_temperature
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".into());
                let target = zone
                    .target_temperature
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "  {} | {current} -> {target} | {:?} | {:?}",
                    zone.name, zone.state, zone.action,
                );
            }
            println!("  {} tiles", snapshot.tiles.len());
        })
        .build()?;

    if !client.authenticate(&username, &password).await? {
        eprintln!("login rejected");
        return Ok(());
    }

    let modules = client.list_modules().await?;
    let Some(module) = modules.first() else {
        eprintln!("no modules on this account");
        return Ok(());
    };
    println!("Polling {} ({})...", module.name, module.udid);

    loop {
        if let Err(e) = client.module_data(&module.udid).await {
            if e.is_auth_failure() {
                eprintln!("session rejected: {e}");
                return Err(e);
            }
            eprintln!("update failed: {e}");
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}
