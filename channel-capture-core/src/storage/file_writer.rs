use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use num_complex::Complex32;
use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::events::BackendKind;
use crate::processing::sample_format;
use crate::traits::data_writer::DataWriter;

/// Highest numeric suffix tried when naming a capture file.
const MAX_CAPTURE_INDEX: u32 = 9999;

/// Name of the `index`-th capture for a channel.
///
/// Format: `channel-capture-<class>-<baud>-baud-<NNNN>.raw`
pub fn capture_file_name(class_name: &str, baud: u32, index: u32) -> String {
    format!("channel-capture-{}-{}-baud-{:04}.raw", class_name, baud, index)
}

/// Create the first unused capture file in `directory`, starting at 0001.
///
/// Files are created with create-new semantics, so two sessions can never
/// end up sharing one.
pub fn open_capture_file(
    directory: &Path,
    class_name: &str,
    baud: u32,
) -> Result<(File, PathBuf), CaptureError> {
    fs::create_dir_all(directory)
        .map_err(|e| CaptureError::Storage(format!("failed to create directory: {}", e)))?;

    for index in 1..=MAX_CAPTURE_INDEX {
        let path = directory.join(capture_file_name(class_name, baud, index));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(CaptureError::Storage(format!(
                    "failed to open capture file {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    Err(CaptureError::Storage(format!(
        "no free capture file name left in {}",
        directory.display()
    )))
}

/// Raw capture file writer.
///
/// Wraps a file opened by the caller. Keeps a running SHA-256 over the
/// committed bytes so a partial capture can still be verified.
pub struct FileDataWriter {
    file_path: PathBuf,
    file: Option<File>,
    encode_buffer: Vec<u8>,
    hasher: Sha256,
    total_bytes_written: u64,
    last_error: String,
}

impl FileDataWriter {
    pub fn new(file: File, file_path: PathBuf) -> Self {
        Self {
            file_path,
            file: Some(file),
            encode_buffer: Vec::new(),
            hasher: Sha256::new(),
            total_bytes_written: 0,
            last_error: String::new(),
        }
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn write_raw(&mut self, data: &[u8]) -> isize {
        let Some(file) = self.file.as_mut() else {
            self.last_error = "write() failed: capture file is closed".into();
            return 0;
        };

        if let Err(e) = file.write_all(data) {
            self.last_error = format!("write() failed: {}", e);
            log::error!("capture file {}: {}", self.file_path.display(), self.last_error);
            return -1;
        }

        self.hasher.update(data);
        self.total_bytes_written += data.len() as u64;
        data.len() as isize
    }
}

impl DataWriter for FileDataWriter {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn prepare(&mut self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        self.file.is_some()
    }

    fn write(&mut self, samples: &[Complex32]) -> isize {
        let mut buffer = std::mem::take(&mut self.encode_buffer);
        buffer.clear();
        sample_format::encode_samples(samples, &mut buffer);
        let result = self.write_raw(&buffer);
        self.encode_buffer = buffer;
        result
    }

    fn write_blob(&mut self, data: &[u8]) -> isize {
        self.write_raw(data)
    }

    fn close(&mut self) -> bool {
        let Some(mut file) = self.file.take() else {
            return true;
        };

        match file.flush().and_then(|_| file.sync_data()) {
            Ok(()) => true,
            Err(e) => {
                self.last_error = format!("close() failed: {}", e);
                false
            }
        }
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }

    fn describe(&self) -> String {
        self.file_path.display().to_string()
    }

    fn checksum(&self) -> Option<String> {
        Some(hex_encode(&self.hasher.clone().finalize()))
    }
}

impl Drop for FileDataWriter {
    fn drop(&mut self) {
        self.close();
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
