use crate::error::{PipelineError, Result};
use flate2::read::GzDecoder;
use kheper_protocol::{DecompressReport, FetchReport};
use sha1::{Digest, Sha1};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn is_http_source(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn has_unsupported_scheme(source: &str) -> bool {
    match source.split_once("://") {
        Some((scheme, _)) => !matches!(scheme, "http" | "https" | "file"),
        None => false,
    }
}

pub fn resolve_url(base_url: &str, name: &str, append_name_to_url: bool) -> String {
    if append_name_to_url {
        format!("{base_url}{name}")
    } else {
        base_url.to_string()
    }
}

struct SourceReader {
    reader: Box<dyn Read>,
    total_bytes: Option<u64>,
    remote: bool,
}

fn open_source_reader(source: &str) -> Result<SourceReader> {
    if has_unsupported_scheme(source) {
        return Err(PipelineError::network(format!(
            "Could not fetch '{source}': unsupported URL scheme"
        )));
    }
    if is_http_source(source) {
        // large matrices take far longer than reqwest's default 30s budget
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| PipelineError::network(format!("Could not build HTTP client: {e}")))?;
        let response = client
            .get(source)
            .send()
            .map_err(|e| PipelineError::network(format!("Could not fetch '{source}': {e}")))?
            .error_for_status()
            .map_err(|e| PipelineError::network(format!("Could not fetch '{source}': {e}")))?;
        let total_bytes = response.content_length();
        return Ok(SourceReader {
            reader: Box::new(response),
            total_bytes,
            remote: true,
        });
    }
    let path = match source.strip_prefix("file://") {
        Some(stripped) => PathBuf::from(stripped),
        None => PathBuf::from(source),
    };
    let file = File::open(&path).map_err(|e| {
        PipelineError::network(format!(
            "Could not fetch '{source}': cannot open '{}': {e}",
            path.display()
        ))
    })?;
    let total_bytes = file.metadata().ok().map(|m| m.len());
    Ok(SourceReader {
        reader: Box::new(BufReader::new(file)),
        total_bytes,
        remote: false,
    })
}

struct ProgressReader<R, F> {
    inner: R,
    callback: F,
    bytes_done: u64,
}

impl<R, F> ProgressReader<R, F> {
    fn new(inner: R, callback: F) -> Self {
        Self {
            inner,
            callback,
            bytes_done: 0,
        }
    }
}

impl<R: Read, F: FnMut(u64)> Read for ProgressReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_done += n as u64;
        (self.callback)(self.bytes_done);
        Ok(n)
    }
}

/// Hashes everything written through it.
struct DigestWriter<W> {
    inner: W,
    hasher: Sha1,
    bytes: u64,
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn part_path(destination: &Path) -> PathBuf {
    let mut tmp: OsString = destination.as_os_str().to_os_string();
    tmp.push(".part");
    PathBuf::from(tmp)
}

/// Copies `reader` into `writer` and flushes it. Any failure removes the
/// part file at `tmp_path`.
fn fill_part_file<R: Read, W: Write>(
    tmp_path: &Path,
    mut reader: R,
    writer: &mut W,
    source: &str,
    remote: bool,
) -> Result<u64> {
    let copied = match std::io::copy(&mut reader, writer) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(tmp_path);
            let message = format!("Transfer of '{source}' was interrupted: {e}");
            return Err(if remote {
                PipelineError::network(message)
            } else {
                PipelineError::io(message)
            });
        }
    };
    if let Err(e) = writer.flush() {
        let _ = fs::remove_file(tmp_path);
        return Err(PipelineError::io(format!(
            "Could not flush '{}': {e}",
            tmp_path.display()
        )));
    }
    Ok(copied)
}

pub fn fetch(
    base_url: &str,
    name: &str,
    destination_folder: &Path,
    append_name_to_url: bool,
) -> Result<FetchReport> {
    let mut noop = |_, _| {};
    fetch_with_progress(base_url, name, destination_folder, append_name_to_url, &mut noop)
}

/// Retrieves `name` into `destination_folder`, overwriting any existing file.
/// `on_progress` receives `(bytes_done, bytes_total)`.
pub fn fetch_with_progress(
    base_url: &str,
    name: &str,
    destination_folder: &Path,
    append_name_to_url: bool,
    on_progress: &mut dyn FnMut(u64, Option<u64>),
) -> Result<FetchReport> {
    fs::create_dir_all(destination_folder).map_err(|e| {
        PipelineError::io(format!(
            "Could not create destination directory '{}': {e}",
            destination_folder.display()
        ))
    })?;
    let source = resolve_url(base_url, name, append_name_to_url);
    let destination = destination_folder.join(name);
    let tmp_path = part_path(&destination);
    log::info!("Fetching '{source}' -> '{}'", destination.display());

    let SourceReader {
        reader,
        total_bytes,
        remote,
    } = open_source_reader(&source)?;
    on_progress(0, total_bytes);
    let file = File::create(&tmp_path).map_err(|e| {
        PipelineError::io(format!("Could not create '{}': {e}", tmp_path.display()))
    })?;
    let mut writer = DigestWriter {
        inner: BufWriter::new(file),
        hasher: Sha1::new(),
        bytes: 0,
    };

    {
        let progress_reader = ProgressReader::new(reader, |done| on_progress(done, total_bytes));
        fill_part_file(&tmp_path, progress_reader, &mut writer, &source, remote)?;
    }
    let DigestWriter { hasher, bytes, .. } = writer;
    on_progress(bytes, total_bytes);
    fs::rename(&tmp_path, &destination).map_err(|e| {
        PipelineError::io(format!(
            "Could not finalize destination '{}': {e}",
            destination.display()
        ))
    })?;

    Ok(FetchReport {
        source,
        output: destination.display().to_string(),
        bytes,
        sha1: hex(&hasher.finalize()),
    })
}

/// Streams `X.gz` into `X` and removes the compressed file on success.
pub fn decompress_gzip(path: &Path) -> Result<DecompressReport> {
    let source = path.display().to_string();
    let Some(output) = source.strip_suffix(".gz").map(PathBuf::from) else {
        return Err(PipelineError::invalid_input(format!(
            "'{source}' does not end in .gz"
        )));
    };
    let input = File::open(path)
        .map_err(|e| PipelineError::io(format!("Could not open '{source}': {e}")))?;
    let tmp_path = part_path(&output);
    let mut writer = BufWriter::new(File::create(&tmp_path).map_err(|e| {
        PipelineError::io(format!("Could not create '{}': {e}", tmp_path.display()))
    })?);
    let mut decoder = GzDecoder::new(BufReader::new(input));
    let bytes = match std::io::copy(&mut decoder, &mut writer) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(PipelineError::io(format!(
                "Could not decompress '{source}': {e}"
            )));
        }
    };
    if let Err(e) = writer.flush() {
        let _ = fs::remove_file(&tmp_path);
        return Err(PipelineError::io(format!(
            "Could not flush '{}': {e}",
            tmp_path.display()
        )));
    }
    fs::rename(&tmp_path, &output).map_err(|e| {
        PipelineError::io(format!(
            "Could not finalize '{}': {e}",
            output.display()
        ))
    })?;
    fs::remove_file(path)
        .map_err(|e| PipelineError::io(format!("Could not remove '{source}': {e}")))?;
    log::info!("Decompressed '{source}' ({bytes} bytes)");
    Ok(DecompressReport {
        source,
        output: output.display().to_string(),
        bytes,
    })
}
