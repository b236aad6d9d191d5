// src/ws.rs
use std::net::SocketAddr;

use crossbeam_channel::Sender;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use warp::{Filter, Rejection, Reply};
use warp::ws::{Message, WebSocket};

use crate::device_info::DeviceInfo;
use crate::types::StatusMessage;

/// Serves the serial channel on `/uart` and the status projection on
/// `/status`.
pub async fn start_server(
    addr: SocketAddr,
    uart_in: Sender<Vec<u8>>,
    uart_out: broadcast::Sender<Vec<u8>>,
    status: broadcast::Sender<StatusMessage>,
    device: &'static DeviceInfo,
) {
    let routes = routes(uart_in, uart_out, status, device);
    info!("WebSocket server running on ws://{}/uart and ws://{}/status", addr, addr);
    warp::serve(routes).run(addr).await;
}

fn routes(
    uart_in: Sender<Vec<u8>>,
    uart_out: broadcast::Sender<Vec<u8>>,
    status: broadcast::Sender<StatusMessage>,
    device: &'static DeviceInfo,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let uart_route = warp::path("uart")
        .and(warp::path::end())
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let uart_in = uart_in.clone();
            let uart_out = uart_out.subscribe();
            ws.on_upgrade(move |socket| handle_uart(socket, uart_in, uart_out))
        });

    let status_route = warp::path("status")
        .and(warp::path::end())
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let status = status.subscribe();
            ws.on_upgrade(move |socket| handle_status(socket, status, device))
        });

    uart_route
        .or(status_route)
        .with(warp::cors().allow_any_origin())
}

fn serial_frame(data: Vec<u8>) -> Message {
    match String::from_utf8(data) {
        Ok(text) => Message::text(text),
        Err(err) => Message::binary(err.into_bytes()),
    }
}

fn json_frame<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Message::text(json)),
        Err(err) => {
            warn!("Cannot encode status message: {}", err);
            None
        }
    }
}

async fn handle_uart(
    ws: WebSocket,
    uart_in: Sender<Vec<u8>>,
    mut uart_out: broadcast::Receiver<Vec<u8>>,
) {
    info!("Serial peer connected");
    let (mut client_tx, mut client_rx) = ws.split();

    // Engine writes -> this peer
    let forwarder = tokio::spawn(async move {
        loop {
            match uart_out.recv().await {
                Ok(data) => {
                    if client_tx.send(serial_frame(data)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Serial peer lagged, {} writes dropped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Peer bytes -> engine command buffer
    while let Some(result) = client_rx.next().await {
        match result {
            Ok(msg) if msg.is_text() || msg.is_binary() => {
                if uart_in.send(msg.as_bytes().to_vec()).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!("Serial peer error: {}", err);
                break;
            }
        }
    }
    forwarder.abort();
    info!("Serial peer disconnected");
}

async fn handle_status(
    ws: WebSocket,
    mut status: broadcast::Receiver<StatusMessage>,
    device: &'static DeviceInfo,
) {
    let (mut client_tx, mut client_rx) = ws.split();

    let hello = StatusMessage::DeviceInfo {
        info: device.clone(),
    };
    if let Some(frame) = json_frame(&hello) {
        if client_tx.send(frame).await.is_err() {
            return;
        }
    }

    let forwarder = tokio::spawn(async move {
        loop {
            match status.recv().await {
                Ok(msg) => {
                    let Some(frame) = json_frame(&msg) else {
                        continue;
                    };
                    if client_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Status client lagged by {}", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Drain until the client goes away
    while let Some(Ok(_)) = client_rx.next().await {}
    forwarder.abort();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device_info::DEVICE_INFO;

    #[test]
    fn serial_frames_prefer_text() {
        assert!(serial_frame(b"SCAN\n".to_vec()).is_text());
        assert!(serial_frame(vec![0xFF, 0xFE]).is_binary());
    }

    #[test]
    fn status_frames_are_json() {
        let frame = json_frame(&StatusMessage::Battery { percent: 3 }).unwrap();
        assert_eq!(frame.to_str().unwrap(), r#"{"type":"BATTERY","percent":3}"#);
    }

    #[tokio::test]
    async fn serial_forwarder_ends_with_the_peer() {
        let (uart_in, _inbound) = crossbeam_channel::unbounded();
        let (uart_out, _) = broadcast::channel(8);
        let (status, _) = broadcast::channel(8);
        let filter = routes(uart_in, uart_out.clone(), status, &DEVICE_INFO);

        let client = warp::test::ws()
            .path("/uart")
            .handshake(filter)
            .await
            .expect("handshake");
        assert_eq!(uart_out.receiver_count(), 1);

        // no engine write follows, so only the disconnect can stop the forwarder
        drop(client);
        for _ in 0..100 {
            if uart_out.receiver_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("forwarder still subscribed after the peer left");
    }
}
