//! Load test for the relay server.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect to the server and wait for the welcome frame
//! - Periodically send action messages stamped with the send time
//! - Receive relayed messages and record relay latency
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 50)
//!   --duration S     Test duration in seconds (default: 30)
//!   --send-rate R    Messages per second per client (default: 1.0)
//!   --url URL        Server URL (default: ws://127.0.0.1:5000/ws)

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use relay_shared::protocol::{Frame, Payload};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Action payload in the shape the browser client sends, plus a timestamp.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionMsg {
    action: String,
    x: f64,
    key: u32,
    sent_at_ms: u64,
}

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
    connect_latency_sum_ms: AtomicU64,
    connect_latency_count: AtomicU64,
    relay_latency_sum_ms: AtomicU64,
    relay_latency_count: AtomicU64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    send_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    // Wait for welcome before sending anything
    let got_welcome = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if Frame::decode(text.as_str()).is_ok_and(|f| f.is_welcome()) {
                        return true;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return false,
                _ => {}
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    if !got_welcome {
        if client_id < 5 {
            eprintln!("Client {} did not get a welcome", client_id);
        }
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }

    metrics
        .connect_latency_sum_ms
        .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);
    metrics.connect_latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let send_interval = if send_rate > 0.0 {
        Duration::from_secs_f64(1.0 / send_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };

    let mut send_timer = tokio::time::interval(send_interval);
    send_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = tokio::time::Instant::now() + duration;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(test_end) => break,

            _ = send_timer.tick() => {
                let msg = {
                    let mut rng = rand::thread_rng();
                    ActionMsg {
                        action: if rng.gen_bool(0.8) { "create" } else { "repulse" }.to_string(),
                        x: rng.gen_range(-200.0..200.0),
                        key: client_id,
                        sent_at_ms: now_ms(),
                    }
                };
                let frame = serde_json::value::to_raw_value(&msg)
                    .map(|raw| Frame::message(Payload::from(raw)))
                    .and_then(|frame| frame.encode());
                let Ok(json) = frame else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                };
                if ws.send(Message::Text(json.into())).await.is_ok() {
                    metrics.messages_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(frame) = Frame::decode(text.as_str()) else {
                            continue;
                        };
                        if !frame.is_message() {
                            continue;
                        }
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        if let Ok(action) = frame.data.parse::<ActionMsg>() {
                            let latency = now_ms().saturating_sub(action.sent_at_ms);
                            metrics.relay_latency_sum_ms.fetch_add(latency, Ordering::Relaxed);
                            metrics.relay_latency_count.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

fn average(sum: &AtomicU64, count: &AtomicU64) -> u64 {
    let count = count.load(Ordering::Relaxed);
    if count > 0 {
        sum.load(Ordering::Relaxed) / count
    } else {
        0
    }
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 50;
    let mut duration_secs: u64 = 30;
    let mut send_rate: f64 = 1.0;
    let mut url = "ws://127.0.0.1:5000/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--send-rate" => {
                i += 1;
                send_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(1.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Relay Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Send rate: {}/s per client", send_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);

        handles.push(tokio::spawn(async move {
            run_client(client_id, url, send_rate, duration, metrics).await;
        }));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            println!(
                "[{:3}s] connected={}, sent={}, received={}, errors={}, avg_relay_latency={}ms",
                elapsed,
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.messages_sent.load(Ordering::Relaxed),
                metrics_clone.messages_received.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
                average(
                    &metrics_clone.relay_latency_sum_ms,
                    &metrics_clone.relay_latency_count
                ),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    // Final stats
    let sent = metrics.messages_sent.load(Ordering::Relaxed);
    let received = metrics.messages_received.load(Ordering::Relaxed);

    println!();
    println!("=== Final Results ===");
    println!("Total messages sent: {}", sent);
    println!("Total messages received: {}", received);
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));
    println!(
        "Average connect latency: {}ms",
        average(
            &metrics.connect_latency_sum_ms,
            &metrics.connect_latency_count
        )
    );
    println!(
        "Average relay latency: {}ms",
        average(&metrics.relay_latency_sum_ms, &metrics.relay_latency_count)
    );

    // Every message should reach every other client
    let expected = sent * num_clients.saturating_sub(1) as u64;
    if expected > 0 {
        println!(
            "Delivery rate: {:.1}% ({} of {} expected)",
            received as f64 / expected as f64 * 100.0,
            received,
            expected
        );
    }
}
