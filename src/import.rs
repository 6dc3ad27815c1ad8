//! Background model imports with latest-wins delivery.
//!
//! Each `begin` call gets a generation number and a worker thread that reads
//! and parses the file off the main thread. Outcomes come back over a
//! channel; `poll` drops everything but the newest generation, so a slow
//! import can never overwrite a later one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;

use log::debug;
use thiserror::Error;

use crate::formats::{ModelFormat, ParseError, ParsedModel};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported model format: '{extension}'")]
    UnsupportedFormat { extension: String },
    #[error("could not read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub struct ImportOutcome {
    pub generation: u64,
    pub path: PathBuf,
    pub result: Result<ParsedModel, ImportError>,
}

pub struct ImportPipeline {
    tx: Sender<ImportOutcome>,
    rx: Receiver<ImportOutcome>,
    generation: u64,
    in_flight: bool,
}

impl ImportPipeline {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx,
            generation: 0,
            in_flight: false,
        }
    }

    /// Starts importing `path` on a worker thread. Files with an unknown
    /// extension fail here, before any spawn or disk access.
    pub fn begin(&mut self, path: &Path) -> Result<u64, ImportError> {
        let Some(format) = ModelFormat::from_path(path) else {
            return Err(ImportError::UnsupportedFormat {
                extension: path
                    .extension()
                    .and_then(|extension| extension.to_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        };

        self.generation += 1;
        self.in_flight = true;
        let generation = self.generation;
        let path = path.to_path_buf();
        let tx = self.tx.clone();

        debug!("import {generation} started for {}", path.display());

        let spawned = thread::Builder::new()
            .name(format!("import-{generation}"))
            .spawn({
                let path = path.clone();
                move || {
                    let result = read_and_parse(format, &path);
                    let _ = tx.send(ImportOutcome {
                        generation,
                        path,
                        result,
                    });
                }
            });

        if let Err(source) = spawned {
            let _ = self.tx.send(ImportOutcome {
                generation,
                path: path.clone(),
                result: Err(ImportError::FileRead { path, source }),
            });
        }

        Ok(generation)
    }

    /// Returns the outcome of the newest import if it has finished. Results
    /// from superseded imports are discarded here.
    pub fn poll(&mut self) -> Option<ImportOutcome> {
        loop {
            match self.rx.try_recv() {
                Ok(outcome) if outcome.generation == self.generation => {
                    self.in_flight = false;
                    return Some(outcome);
                }
                Ok(outcome) => {
                    debug!(
                        "dropping stale import {} for {}",
                        outcome.generation,
                        outcome.path.display()
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }
}

fn read_and_parse(format: ModelFormat, path: &Path) -> Result<ParsedModel, ImportError> {
    let bytes = fs::read(path).map_err(|source| ImportError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut model = format.parse(&bytes)?;
    model.ensure_normals();
    Ok(model)
}
