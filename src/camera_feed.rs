//! Camera capture on a worker thread.
//!
//! nokhwa cameras are opened and polled entirely inside the worker, which
//! ships decoded RGBA frames over a channel. The main thread drains that
//! channel once per redraw and keeps only the newest frame, so a slow
//! consumer never builds up a backlog.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;

use log::info;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CameraError {
    #[error("no usable camera: {0}")]
    NoDevice(String),
    #[error("camera stream failed: {0}")]
    Stream(String),
}

pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub enum CameraEvent {
    Frame(CameraFrame),
    Failed(CameraError),
}

enum FeedMessage {
    Frame(CameraFrame),
    Failed(CameraError),
}

pub struct CameraFeed {
    rx: Receiver<FeedMessage>,
    failed: bool,
}

impl CameraFeed {
    /// Starts the capture worker for the configured device index.
    pub fn open(index: u32) -> CameraFeed {
        let (tx, rx) = channel();

        let worker_tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("camera-feed".to_string())
            .spawn(move || capture_loop(index, worker_tx));
        if let Err(error) = spawned {
            let _ = tx.send(FeedMessage::Failed(CameraError::Stream(format!(
                "could not start camera thread: {error}"
            ))));
        }

        CameraFeed { rx, failed: false }
    }

    #[cfg(test)]
    fn from_receiver(rx: Receiver<FeedMessage>) -> CameraFeed {
        CameraFeed { rx, failed: false }
    }

    /// Drains the worker channel. Older frames are dropped so only the
    /// newest one is returned; a dead worker is reported exactly once.
    pub fn poll(&mut self) -> Option<CameraEvent> {
        if self.failed {
            return None;
        }

        let mut latest: Option<CameraFrame> = None;
        loop {
            match self.rx.try_recv() {
                Ok(FeedMessage::Frame(frame)) => latest = Some(frame),
                Ok(FeedMessage::Failed(error)) => {
                    self.failed = true;
                    return Some(CameraEvent::Failed(error));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if latest.is_some() {
                        break;
                    }
                    self.failed = true;
                    return Some(CameraEvent::Failed(CameraError::Stream(
                        "camera worker exited".to_string(),
                    )));
                }
            }
        }

        latest.map(CameraEvent::Frame)
    }
}

fn capture_loop(index: u32, tx: Sender<FeedMessage>) {
    let mut camera = match open_camera(index) {
        Ok(camera) => camera,
        Err(error) => {
            let _ = tx.send(FeedMessage::Failed(error));
            return;
        }
    };

    let resolution = camera.resolution();
    info!(
        "camera stream open at {}x{}",
        resolution.width(),
        resolution.height()
    );

    loop {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(error) => {
                let _ = tx.send(FeedMessage::Failed(CameraError::Stream(error.to_string())));
                return;
            }
        };
        let decoded = match buffer.decode_image::<RgbAFormat>() {
            Ok(decoded) => decoded,
            Err(error) => {
                let _ = tx.send(FeedMessage::Failed(CameraError::Stream(error.to_string())));
                return;
            }
        };

        let frame = CameraFrame {
            width: decoded.width(),
            height: decoded.height(),
            rgba: decoded.into_raw(),
        };
        if tx.send(FeedMessage::Frame(frame)).is_err() {
            // The viewer dropped the feed
            return;
        }
    }
}

fn open_camera(index: u32) -> Result<Camera, CameraError> {
    let primary = Camera::new(
        CameraIndex::Index(index),
        RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution),
    );

    let mut camera = match primary {
        Ok(camera) => camera,
        Err(first_error) => {
            // The configured index may not exist; fall back to the first
            // device the backend reports.
            let devices = nokhwa::query(ApiBackend::Auto)
                .map_err(|error| CameraError::NoDevice(error.to_string()))?;
            let Some(device) = devices.first() else {
                return Err(CameraError::NoDevice(first_error.to_string()));
            };
            Camera::new(
                device.index().clone(),
                RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution),
            )
            .map_err(|error| CameraError::NoDevice(error.to_string()))?
        }
    };

    camera
        .open_stream()
        .map_err(|error| CameraError::Stream(error.to_string()))?;
    Ok(camera)
}
