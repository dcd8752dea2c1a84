//! DexScreener client against a local mock server

use sniper::config::MarketDataConfig;
use sniper::errors::LookupError;
use sniper::oracles::{DexScreenerClient, MarketDataProvider, SocialLookup};
use solana_sdk::pubkey::Pubkey;

fn client(base_url: String, requests_per_minute: u32) -> DexScreenerClient {
    DexScreenerClient::new(&MarketDataConfig {
        dexscreener_base_url: base_url,
        requests_per_minute,
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_socials_recognized() {
    let mut server = mockito::Server::new_async().await;
    let mint = Pubkey::new_unique();
    let mock = server
        .mock("GET", format!("/latest/dex/tokens/{mint}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"pairs":[
                {"info":{"socials":[{"type":"website"}]}},
                {"info":{"socials":[{"type":"Telegram","url":"https://t.me/x"}]}}
            ]}"#,
        )
        .create_async()
        .await;

    let dex = client(server.url(), 60);
    assert!(dex.has_socials(&mint).await.unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_no_pairs_means_no_socials() {
    let mut server = mockito::Server::new_async().await;
    let mint = Pubkey::new_unique();
    server
        .mock("GET", format!("/latest/dex/tokens/{mint}").as_str())
        .with_status(200)
        .with_body(r#"{"schemaVersion":"1.0.0","pairs":null}"#)
        .create_async()
        .await;

    let dex = client(server.url(), 60);
    assert!(!dex.has_socials(&mint).await.unwrap());
}

#[tokio::test]
async fn test_http_error_surfaces() {
    let mut server = mockito::Server::new_async().await;
    let mint = Pubkey::new_unique();
    server
        .mock("GET", format!("/latest/dex/tokens/{mint}").as_str())
        .with_status(503)
        .create_async()
        .await;

    let dex = client(server.url(), 60);
    assert!(matches!(dex.has_socials(&mint).await, Err(LookupError::Http(_))));
}

#[tokio::test]
async fn test_pair_stats() {
    let mut server = mockito::Server::new_async().await;
    let pool = Pubkey::new_unique();
    server
        .mock("GET", format!("/latest/dex/pairs/solana/{pool}").as_str())
        .with_status(200)
        .with_body(
            r#"{"pairs":[{
                "url":"https://dexscreener.com/solana/abc",
                "priceUsd":"0.00042",
                "liquidity":{"usd":15230.5},
                "volume":{"h24":99000.0},
                "priceChange":{"h1":-3.2,"h24":120.0}
            }]}"#,
        )
        .create_async()
        .await;

    let dex = client(format!("{}/", server.url()), 60);
    let stats = dex.pair_stats(&pool).await.unwrap().unwrap();
    assert_eq!(stats.price_usd, Some(0.00042));
    assert_eq!(stats.liquidity_usd, Some(15230.5));
    assert_eq!(stats.volume_h24, Some(99000.0));
    assert_eq!(stats.price_change_h1, Some(-3.2));
    assert_eq!(stats.price_change_h24, Some(120.0));
    assert_eq!(stats.url.as_deref(), Some("https://dexscreener.com/solana/abc"));
}

#[tokio::test]
async fn test_rate_limit_refuses_locally() {
    let mut server = mockito::Server::new_async().await;
    let mint = Pubkey::new_unique();
    let mock = server
        .mock("GET", format!("/latest/dex/tokens/{mint}").as_str())
        .with_status(200)
        .with_body(r#"{"pairs":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let dex = client(server.url(), 1);
    assert!(dex.has_socials(&mint).await.is_ok());
    assert!(matches!(dex.has_socials(&mint).await, Err(LookupError::RateLimited)));
    mock.assert_async().await;
}
