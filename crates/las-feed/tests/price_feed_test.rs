//! Price feed integration tests against a local websocket server.

use futures_util::{SinkExt, StreamExt};
use las_core::{Price, ReconnectPolicy};
use las_feed::{BitmexFeed, BitmexFeedConfig, PriceFeed, PriceTick};
use rust_decimal_macros::dec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

fn instrument(price: &str) -> String {
    format!(
        r#"{{"table":"instrument","action":"update","data":[{{"symbol":"XBTUSD","lastPrice":{price}}}]}}"#
    )
}

/// Serve each accepted connection the given frames, then hold it open.
async fn start_server(frames: Vec<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let frames = frames.clone();
            tokio::spawn(async move {
                let Ok(ws) = accept_async(stream).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();
                for frame in frames {
                    if write.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                while read.next().await.is_some() {}
            });
        }
    });
    addr
}

fn config(addr: SocketAddr) -> BitmexFeedConfig {
    BitmexFeedConfig {
        url: format!("ws://{addr}"),
        reconnect: ReconnectPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
        ..BitmexFeedConfig::default()
    }
}

#[tokio::test]
async fn test_feed_forwards_only_material_ticks() {
    let addr = start_server(vec![
        r#"{"info":"Welcome to the BitMEX Realtime API."}"#.to_string(),
        r#"{"success":true,"subscribe":"instrument:XBTUSD"}"#.to_string(),
        instrument("6500"),
        instrument("6500.5"),
        instrument("6501"),
        instrument("6503"),
    ])
    .await;

    let feed = Arc::new(BitmexFeed::new(config(addr)));
    let (tx, mut rx) = mpsc::channel::<PriceTick>(16);
    let shutdown = CancellationToken::new();

    let handle = {
        let feed = feed.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { feed.run(tx, shutdown).await })
    };

    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.asset, "USD");
    assert_eq!(first.price, Price::new(dec!(6500)));
    assert_eq!(second.price, Price::new(dec!(6503)));

    shutdown.cancel();
    let result = timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    tokio_test::assert_ok!(result);
}

#[tokio::test]
async fn test_feed_gives_up_after_reconnect_budget() {
    // Bind then drop so nothing listens on the port
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let mut cfg = config(addr);
    cfg.reconnect.max_attempts = 2;
    let feed = BitmexFeed::new(cfg);
    let (tx, _rx) = mpsc::channel::<PriceTick>(1);

    let result = timeout(Duration::from_secs(5), feed.run(tx, CancellationToken::new()))
        .await
        .unwrap();
    tokio_test::assert_err!(result);
}
