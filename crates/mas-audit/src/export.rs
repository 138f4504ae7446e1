//! Streaming export of audit records to CSV, JSON or XML.
//!
//! Records are read in `export_batch_size` pages and written straight to the
//! output file (optionally through a gzip encoder). The SHA-256 of the final
//! file on disk is returned with the summary.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use mas_db::helpers::format_datetime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AuditError;
use crate::logger::AuditLogger;
use crate::record::AuditRecord;
use crate::search::AuditFilter;

const CSV_HEADER: &str = "id,event_id,created_at,category,action,severity,user_id,customer_id,\
                          ip_address,session_id,request_id,context,checksum,integrity_ok";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xml,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            other => Err(AuditError::validation(format!(
                "unsupported export format '{other}' (expected csv, json or xml)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub compress: bool,
    /// File name without extension; defaults to `audit-<timestamp>`.
    pub file_stem: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(".mas/exports"),
            compress: false,
            file_stem: None,
        }
    }
}

/// What an export produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub records: u64,
    pub bytes: u64,
    /// SHA-256 of the file as written (after compression).
    pub sha256: String,
    pub compressed: bool,
    pub duration_ms: u64,
}

/// Plain or gzip-compressed file writer.
enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn create(path: &Path, compress: bool) -> io::Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        Ok(if compress {
            Self::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Self::Plain(file)
        })
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Gzip(gz) => gz.finish()?.flush(),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }
}

/// Writes records in one format, tracking separators between them.
struct RecordWriter {
    sink: Sink,
    format: ExportFormat,
    written: u64,
}

impl RecordWriter {
    fn begin(mut sink: Sink, format: ExportFormat) -> io::Result<Self> {
        match format {
            ExportFormat::Csv => writeln!(sink, "{CSV_HEADER}")?,
            ExportFormat::Json => sink.write_all(b"[\n")?,
            ExportFormat::Xml => {
                writeln!(sink, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
                writeln!(
                    sink,
                    r#"<audit_export generated_at="{}">"#,
                    format_datetime(&Utc::now())
                )?;
            }
        }
        Ok(Self {
            sink,
            format,
            written: 0,
        })
    }

    fn write(&mut self, record: &AuditRecord) -> Result<(), AuditError> {
        let io_err = |e: io::Error| AuditError::io("export", e);
        match self.format {
            ExportFormat::Csv => writeln!(self.sink, "{}", csv_row(record)).map_err(io_err)?,
            ExportFormat::Json => {
                if self.written > 0 {
                    self.sink.write_all(b",\n").map_err(io_err)?;
                }
                let json = serde_json::to_string(record)?;
                self.sink.write_all(json.as_bytes()).map_err(io_err)?;
            }
            ExportFormat::Xml => self.sink.write_all(xml_record(record).as_bytes()).map_err(io_err)?,
        }
        self.written += 1;
        Ok(())
    }

    fn end(mut self) -> io::Result<u64> {
        match self.format {
            ExportFormat::Csv => {}
            ExportFormat::Json => self.sink.write_all(b"\n]\n")?,
            ExportFormat::Xml => writeln!(self.sink, "</audit_export>")?,
        }
        self.sink.finish()?;
        Ok(self.written)
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(record: &AuditRecord) -> String {
    let e = &record.event;
    let opt = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
    [
        record.id.to_string(),
        e.event_id.clone(),
        format_datetime(&e.created_at),
        e.category.as_str().to_string(),
        e.action.clone(),
        e.severity.as_str().to_string(),
        opt(e.user_id),
        opt(e.customer_id),
        e.ip_address.clone(),
        e.session_id.clone(),
        e.request_id.clone(),
        e.context.to_string(),
        e.checksum.clone(),
        record.integrity_ok.to_string(),
    ]
    .iter()
    .map(|f| csv_field(f))
    .collect::<Vec<_>>()
    .join(",")
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn xml_record(record: &AuditRecord) -> String {
    let e = &record.event;
    let mut out = format!(
        "  <event id=\"{}\" event_id=\"{}\" integrity_ok=\"{}\">\n",
        record.id,
        xml_escape(&e.event_id),
        record.integrity_ok
    );
    let mut field = |name: &str, value: &str| {
        out.push_str(&format!("    <{name}>{}</{name}>\n", xml_escape(value)));
    };
    field("created_at", &format_datetime(&e.created_at));
    field("category", e.category.as_str());
    field("action", &e.action);
    field("severity", e.severity.as_str());
    field("user_id", &e.user_id.map(|n| n.to_string()).unwrap_or_default());
    field("customer_id", &e.customer_id.map(|n| n.to_string()).unwrap_or_default());
    field("ip_address", &e.ip_address);
    field("session_id", &e.session_id);
    field("request_id", &e.request_id);
    field("context", &e.context.to_string());
    field("checksum", &e.checksum);
    out.push_str("  </event>\n");
    out
}

/// SHA-256 (hex) of a file's contents, streamed.
///
/// # Errors
///
/// Returns `AuditError::Io` if the file cannot be read.
pub fn file_sha256(path: &Path) -> Result<String, AuditError> {
    let mut file = File::open(path).map_err(|e| AuditError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| AuditError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

impl AuditLogger {
    /// Write every event matching `filter` to a new file.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Io` for file failures and `AuditError::Database`
    /// for query failures. A partially written file is removed.
    pub async fn export_to_format(
        &self,
        filter: &AuditFilter,
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<ExportSummary, AuditError> {
        let started = Instant::now();
        std::fs::create_dir_all(&options.output_dir)
            .map_err(|e| AuditError::io(&options.output_dir, e))?;

        let stem = options.file_stem.clone().unwrap_or_else(|| {
            format!("audit-{}", Utc::now().format("%Y%m%dT%H%M%S%.6fZ"))
        });
        let mut name = format!("{stem}.{}", format.extension());
        if options.compress {
            name.push_str(".gz");
        }
        let path = options.output_dir.join(name);

        let result = self.write_export(filter, format, &path, options.compress).await;
        let records = match result {
            Ok(records) => records,
            Err(error) => {
                let _ = std::fs::remove_file(&path);
                tracing::error!(path = %path.display(), %error, "audit export failed");
                return Err(error);
            }
        };

        let bytes = std::fs::metadata(&path)
            .map_err(|e| AuditError::io(&path, e))?
            .len();
        let sha256 = file_sha256(&path)?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(path = %path.display(), %format, records, bytes, "audit export written");

        Ok(ExportSummary {
            path,
            format,
            records,
            bytes,
            sha256,
            compressed: options.compress,
            duration_ms,
        })
    }

    async fn write_export(
        &self,
        filter: &AuditFilter,
        format: ExportFormat,
        path: &Path,
        compress: bool,
    ) -> Result<u64, AuditError> {
        let sink = Sink::create(path, compress).map_err(|e| AuditError::io(path, e))?;
        let mut writer = RecordWriter::begin(sink, format).map_err(|e| AuditError::io(path, e))?;
        self.scan(filter, |record| writer.write(record)).await?;
        writer.end().map_err(|e| AuditError::io(path, e))
    }
}
