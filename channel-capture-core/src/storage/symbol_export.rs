use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::models::error::CaptureError;
use crate::processing::decider::Symbol;

/// Symbol dump formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolFileFormat {
    /// One decimal symbol per line.
    Text,
    /// One byte per symbol.
    Raw,
    /// C source with a `const uint8_t` array.
    CArray,
}

impl SymbolFileFormat {
    /// Pick a format from a file extension. Image formats belong to the
    /// rendering layer and are rejected like any unknown extension.
    pub fn from_extension(ext: &str) -> Result<Self, CaptureError> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Text),
            "bin" => Ok(Self::Raw),
            "c" | "h" | "cpp" => Ok(Self::CArray),
            other => Err(CaptureError::UnsupportedFormat(format!(
                "cannot export symbols as '.{}'",
                other
            ))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, CaptureError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| CaptureError::UnsupportedFormat("missing file extension".into()))?;
        Self::from_extension(ext)
    }
}

/// Append-only log of decided symbols, as shown by the symbol view.
///
/// Each batch is counted at the width it was decided with, so the payload
/// size stays exact across symbol width changes.
#[derive(Debug, Clone, Default)]
pub struct SymbolLog {
    symbols: Vec<Symbol>,
    bits: u64,
}

impl SymbolLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a batch decided at `bps` bits per symbol.
    pub fn append(&mut self, symbols: &[Symbol], bps: u32) {
        self.symbols.extend_from_slice(symbols);
        self.bits += symbols.len() as u64 * bps as u64;
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.bits = 0;
    }

    /// Payload size in bits.
    pub fn size_bits(&self) -> u64 {
        self.bits
    }

    pub fn size_bytes(&self) -> u64 {
        self.bits >> 3
    }

    /// Write the log to `path`, format chosen by extension. Rejects the
    /// format before the file is created.
    pub fn export(&self, path: &Path) -> Result<(), CaptureError> {
        let format = SymbolFileFormat::from_path(path)?;
        let file = File::create(path)
            .map_err(|e| CaptureError::Storage(format!("failed to create {}: {}", path.display(), e)))?;
        let mut out = BufWriter::new(file);

        match format {
            SymbolFileFormat::Text => {
                for symbol in &self.symbols {
                    writeln!(out, "{}", symbol)?;
                }
            }
            SymbolFileFormat::Raw => out.write_all(&self.symbols)?,
            SymbolFileFormat::CArray => out.write_all(render_c_array(&self.symbols).as_bytes())?,
        }

        out.flush()?;
        Ok(())
    }
}

fn render_c_array(symbols: &[Symbol]) -> String {
    let mut src = String::new();
    let _ = writeln!(src, "#include <stdint.h>");
    let _ = writeln!(src);
    let _ = writeln!(src, "const unsigned int symbols_len = {};", symbols.len());
    let _ = writeln!(src, "const uint8_t symbols[] = {{");
    for row in symbols.chunks(16) {
        let line: Vec<String> = row.iter().map(|s| format!("0x{:02x}", s)).collect();
        let _ = writeln!(src, "  {},", line.join(", "));
    }
    let _ = writeln!(src, "}};");
    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn log() -> SymbolLog {
        let mut log = SymbolLog::new();
        log.append(&[0, 3, 1], 2);
        log.append(&[2], 2);
        log
    }

    #[test]
    fn sizes_count_each_batch_at_its_width() {
        let mut log = log();
        assert_eq!(log.len(), 4);
        assert_eq!(log.size_bits(), 8);
        assert_eq!(log.size_bytes(), 1);

        log.append(&[1, 0, 1], 1);
        assert_eq!(log.size_bits(), 11);
        assert_eq!(log.size_bytes(), 1);
        log.append(&[7, 5], 3);
        assert_eq!(log.size_bits(), 17);
        assert_eq!(log.size_bytes(), 2);
    }

    #[test]
    fn exports_text_and_raw() {
        let dir = tempfile::tempdir().unwrap();
        let log = log();

        let txt = dir.path().join("syms.txt");
        log.export(&txt).unwrap();
        assert_eq!(fs::read_to_string(&txt).unwrap(), "0\n3\n1\n2\n");

        let bin = dir.path().join("syms.BIN");
        log.export(&bin).unwrap();
        assert_eq!(fs::read(&bin).unwrap(), vec![0, 3, 1, 2]);
    }

    #[test]
    fn exports_c_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syms.h");
        log().export(&path).unwrap();

        let src = fs::read_to_string(&path).unwrap();
        assert!(src.contains("symbols_len = 4;"));
        assert!(src.contains("0x00, 0x03, 0x01, 0x02,"));
    }

    #[test]
    fn rejects_images_before_creating_file() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["syms.png", "syms.bmp", "syms.xyz", "syms"] {
            let path = dir.path().join(name);
            let err = log().export(&path).unwrap_err();
            assert!(matches!(err, CaptureError::UnsupportedFormat(_)));
            assert!(!path.exists());
        }
    }

    #[test]
    fn clear_empties_log() {
        let mut log = log();
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.size_bits(), 0);
    }
}
