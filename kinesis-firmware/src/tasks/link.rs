//! Host link tasks
//!
//! UART0 carries length-prefixed postcard frames: commands in, telemetry
//! out.

use defmt::*;
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embedded_io_async::{Read, Write};

use kinesis_core::report::MAX_TELEMETRY_SIZE;

use crate::channels::{COMMANDS, TELEMETRY};
use crate::link::{encode_telemetry, FrameDecoder};

/// Link receive task - decodes command frames
#[embassy_executor::task]
pub async fn link_rx_task(mut rx: BufferedUartRx) {
    info!("Link RX task started");

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 32];

    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Link read error: {:?}", e);
                continue;
            }
        };
        for &byte in &buf[..n] {
            if let Some(command) = decoder.push(byte) {
                trace!("Command: {:?}", command);
                COMMANDS.send(command).await;
            }
        }
    }
}

/// Link transmit task - sends telemetry snapshots
#[embassy_executor::task]
pub async fn link_tx_task(mut tx: BufferedUartTx) {
    info!("Link TX task started");

    let mut buf = [0u8; MAX_TELEMETRY_SIZE + 1];

    loop {
        let telemetry = TELEMETRY.wait().await;
        let frame = match encode_telemetry(&telemetry, &mut buf) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Telemetry encode failed: {:?}", e);
                continue;
            }
        };
        if let Err(e) = tx.write_all(frame).await {
            warn!("Link write error: {:?}", e);
        }
    }
}
