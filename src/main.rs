mod apdu;
mod battery;
mod config;
mod device_info;
mod engine;
mod error;
mod ndef;
mod pcsc_reader;
mod presence;
mod projection;
mod protocol;
mod reader;
mod tag_memory;
mod transport;
mod types;
mod ws;

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{error, info};
use tokio::sync::broadcast;

use crate::battery::{BatteryMonitor, SysfsVoltage, VoltageSource};
use crate::config::Config;
use crate::device_info::DEVICE_INFO;
use crate::engine::Engine;
use crate::projection::BroadcastProjection;
use crate::transport::ChannelTransport;
use crate::types::{Outbound, StatusMessage};

/// Wait before bringing the reader up again after a failed start.
const RESTART_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    env_logger::init();
    println!("Starting NFC BLE bridge...");

    let config = match Config::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Config error: {}", err);
            std::process::exit(1);
        }
    };
    info!(
        "Device {} (serial {})",
        config.system.name, DEVICE_INFO.serial_number
    );

    // Channel: peer -> engine (serial bytes)
    // Crossbeam (Sync) because the engine thread blocks on the reader
    let (uart_in_tx, uart_in_rx) = unbounded::<Vec<u8>>();

    // Channel: engine -> async side
    let (out_tx, out_rx) = unbounded::<Outbound>();

    // Tokio broadcast for distribution to WS clients
    let (uart_tx, _) = broadcast::channel::<Vec<u8>>(100);
    let (status_tx, _) = broadcast::channel::<StatusMessage>(100);

    let engine_config = config.clone();
    std::thread::spawn(move || run_engine(engine_config, uart_in_rx, out_tx));

    // Bridge: sync engine output -> broadcast fan-out
    let uart_bridge = uart_tx.clone();
    let status_bridge = status_tx.clone();
    std::thread::spawn(move || {
        while let Ok(msg) = out_rx.recv() {
            match msg {
                Outbound::Uart(data) => {
                    let _ = uart_bridge.send(data);
                }
                Outbound::Status(status) => {
                    let _ = status_bridge.send(status);
                }
            }
        }
    });

    ws::start_server(
        config.server.addr(),
        uart_in_tx,
        uart_tx,
        status_tx,
        &DEVICE_INFO,
    )
    .await;
}

fn run_engine(config: Config, uart_in: Receiver<Vec<u8>>, out: Sender<Outbound>) {
    let reader = loop {
        match reader::open(&config) {
            Ok(reader) => break reader,
            Err(err) => {
                error!(
                    "Failed to set up NFC reader: {}. Restarting in {:?}",
                    err, RESTART_DELAY
                );
                std::thread::sleep(RESTART_DELAY);
            }
        }
    };

    let transport = ChannelTransport::new(uart_in, out.clone());
    let projection = BroadcastProjection::new(&DEVICE_INFO, out);
    let mut engine = Engine::new(reader, transport, projection, config.nfc.detect_timeout())
        .with_read_mode(config.nfc.read_mode);

    if let Some(path) = &config.system.battery_path {
        info!("Battery voltage from {}", path.display());
        let source: Box<dyn VoltageSource> = Box::new(SysfsVoltage::new(path.clone()));
        let interval = Duration::from_secs(config.system.battery_check_secs);
        engine = engine.with_battery(BatteryMonitor::new(source, interval));
    }

    engine.run();
}
