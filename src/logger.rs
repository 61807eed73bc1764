use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::ffi::OsStr;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::RgaError;
use crate::types::{RgaModel, ScanWindow, Spectrum};

/// One logged scan pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRecord {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub model: RgaModel,
    /// Pass number within the run, starting at 0.
    pub pass: usize,
    pub window: ScanWindow,
    pub masses: Vec<f64>,
    pub pressures: Vec<f64>,
    pub total_pressure: f64,
}

impl ScanRecord {
    pub fn new(device_id: &str, model: RgaModel, pass: usize, spectrum: Spectrum) -> Self {
        Self {
            timestamp: Utc::now(),
            device_id: device_id.to_string(),
            model,
            pass,
            window: spectrum.window,
            masses: spectrum.masses,
            pressures: spectrum.pressures,
            total_pressure: spectrum.total_pressure,
        }
    }
}

/// Buffered JSONL writer.
///
/// Records are appended one per line on every flush. With `final_format_json`
/// the file is rewritten as a pretty JSON array when the logger is finalized
/// or dropped.
#[derive(Debug)]
pub struct Logger<T>
where
    T: Serialize + DeserializeOwned,
{
    buffer: Vec<T>,
    buffer_size: usize,
    file_path: PathBuf,
    final_format_json: bool,
    written: usize,
}

impl<T> Logger<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new<P: Into<PathBuf>>(file_path: P, buffer_size: usize, final_format_json: bool) -> Self {
        let mut file_path = file_path.into();
        let extension = if final_format_json { "json" } else { "jsonl" };
        if file_path.extension() != Some(OsStr::new(extension)) {
            file_path.set_extension(extension);
        }

        Self {
            buffer: Vec::with_capacity(buffer_size),
            buffer_size: buffer_size.max(1),
            file_path,
            final_format_json,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn add(&mut self, record: T) -> Result<(), RgaError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Append all buffered records to the file.
    pub fn flush(&mut self) -> Result<(), RgaError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| RgaError::Io {
                source,
                context: format!("Could not create {}", parent.display()),
            })?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|source| RgaError::Io {
                source,
                context: format!("Could not open log file {}", self.file_path.display()),
            })?;

        let mut writer = BufWriter::new(file);
        for record in &self.buffer {
            serde_json::to_writer(&mut writer, record)?;
            writeln!(writer).map_err(|source| self.write_error(source))?;
        }
        writer.flush().map_err(|source| self.write_error(source))?;

        self.written += self.buffer.len();
        info!(
            "Logged {} records to {}",
            self.buffer.len(),
            self.file_path.display()
        );
        self.buffer.clear();
        Ok(())
    }

    fn write_error(&self, source: std::io::Error) -> RgaError {
        RgaError::Io {
            source,
            context: format!("Could not write {}", self.file_path.display()),
        }
    }

    /// Rewrite the JSONL file as a JSON array.
    pub fn finalize_as_json(&mut self) -> Result<(), RgaError> {
        self.flush()?;
        if !self.final_format_json || self.written == 0 {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.file_path).map_err(|source| RgaError::Io {
            source,
            context: format!("Could not read {}", self.file_path.display()),
        })?;
        // Already an array after an earlier finalize.
        if content.trim_start().starts_with('[') {
            return Ok(());
        }

        let records = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<T>)
            .collect::<Result<Vec<T>, _>>()?;

        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(&self.file_path, json).map_err(|source| self.write_error(source))?;
        info!("Converted {} records to a JSON array", records.len());
        Ok(())
    }

    /// Records waiting for the next flush.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<T> Drop for Logger<T>
where
    T: Serialize + DeserializeOwned,
{
    fn drop(&mut self) {
        if let Err(e) = self.finalize_as_json() {
            log::error!("Failed to finalize scan log: {e}");
        }
    }
}

pub type ScanLogger = Logger<ScanRecord>;
