use tech_controllers::TechClient;

/// Run with: cargo test --test integration -- --ignored
/// Requires an eModul account:
///   TECH_USERNAME=... TECH_PASSWORD=... cargo test --test integration -- --ignored
#[tokio::test]
#[ignore]
async fn authenticate_list_and_poll() {
    let username = std::env::var("TECH_USERNAME").expect("TECH_USERNAME not set");
    let password = std::env::var("TECH_PASSWORD").expect("TECH_PASSWORD not set");

    let mut client = TechClient::builder().build().expect("client should build");
    assert!(
        client.authenticate(&username, &password).await.expect("authenticate failed"),
        "credentials rejected"
    );

    let modules = client.list_modules().await.expect("list_modules failed");
    assert!(!modules.is_empty(), "account should have at least one module");

    let udid = &modules[0].udid;
    let snapshot = client.module_data(udid).await.expect("module_data failed");
    println!(
        "{}: {} zones, {} tiles",
        modules[0].name,
        snapshot.zones.len(),
        snapshot.tiles.len()
    );

    // Second read inside the interval comes from the cache.
    let again = client.module_data(udid).await.expect("cached read failed");
    assert_eq!(snapshot.fetched_at, again.fetched_at);
}
