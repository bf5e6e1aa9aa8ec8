//! FileSink - appends readings to a JSON-lines file
//!
//! Layout under `base_path`:
//!
//! ```text
//! <file_name>                       one JSON object per reading
//! images/<asset>/<seq>_<dp>.png     image datapoints
//! ```

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use contracts::{ContractError, Datapoint, DatapointImage, DatapointValue, Reading, ReadingSet, ReadingSink};
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,

    /// Readings file, relative to `base_path`
    pub file_name: String,

    /// Write image datapoints as PNG files
    pub export_images: bool,
}

impl FileSinkConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));
        let file_name = params
            .get("file_name")
            .cloned()
            .unwrap_or_else(|| "readings.jsonl".to_string());
        let export_images = params
            .get("export_images")
            .map(|v| v != "false")
            .unwrap_or(true);

        Self {
            base_path,
            file_name,
            export_images,
        }
    }
}

/// One line of the readings file
#[derive(Serialize)]
struct ReadingRecord<'a> {
    written_at: DateTime<Utc>,
    #[serde(flatten)]
    reading: &'a Reading,
}

struct FileState {
    writer: BufWriter<File>,
    created_dirs: HashSet<PathBuf>,
    image_seq: u64,
}

pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    state: Mutex<FileState>,
}

impl FileSink {
    /// Create the base directory and open the readings file for append
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.base_path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.base_path.join(&config.file_name))?;

        Ok(Self {
            name: name.into(),
            config,
            state: Mutex::new(FileState {
                writer: BufWriter::new(file),
                created_dirs: HashSet::new(),
                image_seq: 0,
            }),
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, FileSinkConfig::from_params(params))
    }

    pub fn readings_path(&self) -> PathBuf {
        self.config.base_path.join(&self.config.file_name)
    }

    fn state(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_set_to_disk(&self, set: &ReadingSet) -> std::io::Result<()> {
        let mut state = self.state();
        let written_at = Utc::now();
        for reading in set.readings() {
            let record = ReadingRecord {
                written_at,
                reading,
            };
            serde_json::to_writer(&mut state.writer, &record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            state.writer.write_all(b"\n")?;

            if self.config.export_images {
                self.export_images(&mut state, reading)?;
            }
        }
        Ok(())
    }

    fn export_images(&self, state: &mut FileState, reading: &Reading) -> std::io::Result<()> {
        for Datapoint { name, value } in reading.datapoints() {
            let DatapointValue::Image(image) = value else {
                continue;
            };
            let dir = self
                .config
                .base_path
                .join("images")
                .join(sanitize(reading.asset_name()));
            if !state.created_dirs.contains(&dir) {
                fs::create_dir_all(&dir)?;
                state.created_dirs.insert(dir.clone());
            }
            state.image_seq += 1;
            let path = dir.join(format!("{}_{}.png", state.image_seq, sanitize(name)));
            save_image(path, image)?;
        }
        Ok(())
    }

    fn persist_set(&self, set: &ReadingSet) -> Result<(), ContractError> {
        self.write_set_to_disk(set).map_err(|e| {
            error!(sink = %self.name, readings = set.count(), error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

fn save_image(path: PathBuf, image: &DatapointImage) -> std::io::Result<()> {
    let color = match image.depth {
        8 => image::ColorType::L8,
        24 => image::ColorType::Rgb8,
        32 => image::ColorType::Rgba8,
        depth => {
            warn!(depth, path = %path.display(), "unsupported image depth, not exported");
            return Ok(());
        }
    };
    image::save_buffer(path, &image.data, image.width, image.height, color)
        .map_err(std::io::Error::other)
}

/// Keep file names portable
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl ReadingSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, set),
        fields(sink = %self.name, readings = set.count())
    )]
    fn write(&self, set: ReadingSet) -> Result<(), ContractError> {
        self.persist_set(&set)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    fn flush(&self) -> Result<(), ContractError> {
        self.state()
            .writer
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(sink = %self.name, "FileSink flushed");
        Ok(())
    }
}
