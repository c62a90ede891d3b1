//! BlueZ-backed transport: the real [`TransportLink`] plus device discovery.
//!
//! The ring exposes a vendor GATT service with two characteristics: a write
//! characteristic carrying command frames to the ring and a notify
//! characteristic carrying reply frames back. [`BleLink`] owns the BlueZ
//! device handle, pumps notifications into the frame stream, and maps the
//! BlueZ `Connected` property going false to a [`LinkEvent::Down`].
//!
//! Discovery is deliberately shallow: it reports candidate addresses with
//! name and signal strength and nothing else. Everything protocol-level
//! happens after connect.

use std::time::Duration;

use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty};
use futures::{pin_mut, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, RingdError};
use crate::link::{LinkEvent, TransportLink, CHANNEL_CAPACITY};
use crate::types::DeviceIdentity;

/// Vendor GATT service exposed by the ring.
pub const RING_SERVICE_UUID: bluer::Uuid =
    bluer::Uuid::from_u128(0x0000_fff0_0000_1000_8000_0080_5f9b_34fb);

/// Write characteristic carrying command frames to the ring.
pub const COMMAND_CHAR_UUID: bluer::Uuid =
    bluer::Uuid::from_u128(0x0000_fff6_0000_1000_8000_0080_5f9b_34fb);

/// Notify characteristic carrying reply frames from the ring.
pub const REPLY_CHAR_UUID: bluer::Uuid =
    bluer::Uuid::from_u128(0x0000_fff7_0000_1000_8000_0080_5f9b_34fb);

/// A candidate ring reported by discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredRing {
    /// Bluetooth MAC address.
    pub address: String,
    /// Device name, if broadcast.
    pub name: Option<String>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
}

/// Scan for nearby rings for `scan_duration`.
///
/// The radio-level protocol is opaque here: this is just a producer of
/// candidate [`DeviceIdentity`] addresses for the UI to choose from.
///
/// # Errors
///
/// `AdapterNotFound` when no Bluetooth adapter is present, `ScanFailed`
/// for BlueZ-level discovery errors.
pub async fn discover(scan_duration: Duration) -> Result<Vec<DiscoveredRing>> {
    let session = bluer::Session::new()
        .await
        .map_err(|err| RingdError::ScanFailed(err.to_string()))?;
    let adapter = session
        .default_adapter()
        .await
        .map_err(|_| RingdError::AdapterNotFound)?;
    adapter
        .set_powered(true)
        .await
        .map_err(|err| RingdError::ScanFailed(err.to_string()))?;

    let events = adapter
        .discover_devices()
        .await
        .map_err(|err| RingdError::ScanFailed(err.to_string()))?;
    pin_mut!(events);

    let deadline = tokio::time::sleep(scan_duration);
    pin_mut!(deadline);

    let mut found = Vec::new();
    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = events.next() => match event {
                Some(AdapterEvent::DeviceAdded(address)) => {
                    if let Ok(device) = adapter.device(address) {
                        found.push(DiscoveredRing {
                            address: address.to_string(),
                            name: device.name().await.ok().flatten(),
                            rssi: device.rssi().await.ok().flatten(),
                        });
                    }
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    debug!(count = found.len(), "discovery finished");
    Ok(found)
}

struct Connection {
    device: Device,
    command: Characteristic,
    reply_pump: JoinHandle<()>,
    lifecycle_watch: JoinHandle<()>,
}

impl Connection {
    fn abort_tasks(&self) {
        self.reply_pump.abort();
        self.lifecycle_watch.abort();
    }
}

/// BlueZ-backed link to one ring.
pub struct BleLink {
    adapter: Adapter,
    conn: Mutex<Option<Connection>>,
    frames_tx: broadcast::Sender<Vec<u8>>,
    events_tx: broadcast::Sender<LinkEvent>,
}

impl BleLink {
    /// Opens the default Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// `AdapterNotFound` when no adapter is present, `ScanFailed` for
    /// BlueZ session errors.
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new()
            .await
            .map_err(|err| RingdError::ScanFailed(err.to_string()))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_| RingdError::AdapterNotFound)?;
        adapter
            .set_powered(true)
            .await
            .map_err(|err| RingdError::ScanFailed(err.to_string()))?;

        let (frames_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (events_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            adapter,
            conn: Mutex::new(None),
            frames_tx,
            events_tx,
        })
    }

    /// Locates the ring's command and reply characteristics.
    async fn resolve_characteristics(device: &Device) -> Result<(Characteristic, Characteristic)> {
        let gatt_err =
            |err: bluer::Error| RingdError::ConnectFailed { reason: err.to_string() };

        let mut command = None;
        let mut reply = None;
        for service in device.services().await.map_err(gatt_err)? {
            if service.uuid().await.map_err(gatt_err)? != RING_SERVICE_UUID {
                continue;
            }
            for characteristic in service.characteristics().await.map_err(gatt_err)? {
                let uuid = characteristic.uuid().await.map_err(gatt_err)?;
                if uuid == COMMAND_CHAR_UUID {
                    command = Some(characteristic);
                } else if uuid == REPLY_CHAR_UUID {
                    reply = Some(characteristic);
                }
            }
        }

        match (command, reply) {
            (Some(command), Some(reply)) => Ok((command, reply)),
            _ => Err(RingdError::ConnectFailed {
                reason: "ring GATT service not found on device".into(),
            }),
        }
    }

    fn report_connect_failure(&self, reason: String) {
        let _ = self.events_tx.send(LinkEvent::ConnectFailed { reason });
    }
}

#[async_trait]
impl TransportLink for BleLink {
    async fn connect(&self, identity: &DeviceIdentity) -> Result<()> {
        let address: Address = identity
            .address()
            .parse()
            .map_err(|_| RingdError::InvalidAddress(identity.address().to_string()))?;

        let mut conn = self.conn.lock().await;
        if conn.is_some() {
            return Ok(());
        }

        let device = self
            .adapter
            .device(address)
            .map_err(|_| RingdError::DeviceNotFound(identity.address().to_string()))?;

        if let Err(err) = device.connect().await {
            self.report_connect_failure(err.to_string());
            return Ok(());
        }

        let (command, reply) = match Self::resolve_characteristics(&device).await {
            Ok(pair) => pair,
            Err(err) => {
                let _ = device.disconnect().await;
                self.report_connect_failure(err.to_string());
                return Ok(());
            }
        };

        let notifications = match reply.notify().await {
            Ok(stream) => stream,
            Err(err) => {
                let _ = device.disconnect().await;
                self.report_connect_failure(err.to_string());
                return Ok(());
            }
        };
        let frames_tx = self.frames_tx.clone();
        let reply_pump = tokio::spawn(async move {
            pin_mut!(notifications);
            while let Some(frame) = notifications.next().await {
                let _ = frames_tx.send(frame);
            }
        });

        let lifecycle = match device.events().await {
            Ok(stream) => stream,
            Err(err) => {
                reply_pump.abort();
                let _ = device.disconnect().await;
                self.report_connect_failure(err.to_string());
                return Ok(());
            }
        };
        let events_tx = self.events_tx.clone();
        let lifecycle_watch = tokio::spawn(async move {
            pin_mut!(lifecycle);
            while let Some(event) = lifecycle.next().await {
                if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                    let _ = events_tx.send(LinkEvent::Down {
                        reason: "device disconnected".into(),
                    });
                    break;
                }
            }
        });

        *conn = Some(Connection {
            device,
            command,
            reply_pump,
            lifecycle_watch,
        });
        info!(device = %identity, "BLE link up");
        let _ = self.events_tx.send(LinkEvent::Up);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(connection) = self.conn.lock().await.take() else {
            return Ok(());
        };
        connection.abort_tasks();
        if let Err(err) = connection.device.disconnect().await {
            debug!(%err, "BlueZ disconnect");
        }
        let _ = self.events_tx.send(LinkEvent::Down {
            reason: "local disconnect".into(),
        });
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let Some(connection) = conn.as_ref() else {
            return Err(RingdError::LinkUnavailable);
        };
        if let Err(err) = connection.command.write(frame).await {
            // I/O faults surface as a state transition, never as a send
            // error. The link is unusable until the next connect.
            if let Some(broken) = conn.take() {
                broken.abort_tasks();
            }
            let _ = self.events_tx.send(LinkEvent::Failed {
                reason: err.to_string(),
            });
        }
        Ok(())
    }

    fn frames(&self) -> broadcast::Receiver<Vec<u8>> {
        self.frames_tx.subscribe()
    }

    fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events_tx.subscribe()
    }
}
