//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use wavlink::adapters::{
    ChunkAck, EncodingProfile, RemoteStorage, SheetClient, TranscodeOutput, Transcoder,
    UploadSession, ValueRender,
};
use wavlink::core::UnmatchedDecider;
use wavlink::domain::RemoteFile;

/// Copies the input bytes to the output; fails inputs whose file name is listed
pub struct FakeTranscoder {
    failing: HashSet<String>,
    pub calls: Mutex<Vec<PathBuf>>,
    healthy: bool,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::new()
        }
    }

    pub fn missing() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(
        &self,
        input: &Path,
        output: &Path,
        _profile: &EncodingProfile,
    ) -> Result<TranscodeOutput> {
        self.calls.lock().unwrap().push(input.to_path_buf());

        let name = input.file_name().unwrap().to_string_lossy().to_string();
        if self.failing.contains(&name) {
            return Ok(TranscodeOutput {
                exit_code: 1,
                diagnostic: format!("{}: Invalid data found when processing input", name),
            });
        }

        let bytes = tokio::fs::read(input).await?;
        tokio::fs::write(output, bytes).await?;
        Ok(TranscodeOutput {
            exit_code: 0,
            diagnostic: String::new(),
        })
    }

    async fn health_check(&self) -> Result<()> {
        if self.healthy {
            Ok(())
        } else {
            anyhow::bail!("No such file or directory")
        }
    }
}

#[derive(Default)]
struct StorageState {
    buffers: BTreeMap<String, Vec<u8>>,
    chunk_sizes: Vec<usize>,
    stored: Vec<(String, Vec<u8>)>,
}

/// Resumable storage that keeps uploads in memory.
///
/// `lag` makes the service acknowledge fewer bytes than it received, so the
/// uploader has to resend the tail of every chunk.
#[derive(Default)]
pub struct MemoryStorage {
    lag: u64,
    failing: HashSet<String>,
    state: Mutex<StorageState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lagging(lag: u64) -> Self {
        Self {
            lag,
            ..Self::default()
        }
    }

    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn link_for(name: &str) -> String {
        format!("https://files.test/{}", name)
    }

    /// Size of every chunk received, in order
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().chunk_sizes.clone()
    }

    /// Completed uploads as (name, content)
    pub fn stored(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().unwrap().stored.clone()
    }
}

#[async_trait]
impl RemoteStorage for MemoryStorage {
    async fn create_resumable_upload(
        &self,
        name: &str,
        _parent_folder_id: &str,
        total_bytes: u64,
        _mime_type: &str,
    ) -> Result<UploadSession> {
        if self.failing.contains(name) {
            anyhow::bail!("storage quota exceeded");
        }
        self.state
            .lock()
            .unwrap()
            .buffers
            .insert(name.to_string(), Vec::new());

        Ok(UploadSession {
            uri: format!("memory://{}", name),
            name: name.to_string(),
            total_bytes,
            completed: None,
        })
    }

    async fn send_chunk(
        &self,
        session: &mut UploadSession,
        offset: u64,
        bytes: Vec<u8>,
    ) -> Result<ChunkAck> {
        let mut state = self.state.lock().unwrap();
        state.chunk_sizes.push(bytes.len());

        let buffer = state.buffers.get_mut(&session.name).unwrap();
        buffer.truncate(offset as usize);
        buffer.extend_from_slice(&bytes);
        let received = buffer.len() as u64;

        if received >= session.total_bytes {
            let content = buffer.clone();
            state.stored.push((session.name.clone(), content));
            session.completed = Some(RemoteFile {
                id: format!("id-{}", session.name),
                link: Self::link_for(&session.name),
            });
            return Ok(ChunkAck {
                done: true,
                bytes_acked: received,
            });
        }

        let acked = received.saturating_sub(self.lag).max(offset + 1);
        buffer.truncate(acked as usize);
        Ok(ChunkAck {
            done: false,
            bytes_acked: acked,
        })
    }

    async fn finalize(&self, session: UploadSession) -> Result<RemoteFile> {
        session
            .completed
            .ok_or_else(|| anyhow::anyhow!("upload not complete"))
    }
}

/// Spreadsheet kept as a sparse `(row, column) -> text` map, 1-based.
///
/// `cells` holds what was stored (formulas included); `shown` overrides what
/// a formatted read returns for cells whose formula displays something else.
#[derive(Default)]
pub struct MemorySheet {
    cells: Mutex<BTreeMap<(u32, u32), String>>,
    shown: BTreeMap<(u32, u32), String>,
    reads: Mutex<Vec<(String, ValueRender)>>,
    writes: Mutex<Vec<String>>,
    fail_on_write: Option<usize>,
}

impl MemorySheet {
    /// Column A from `start_row` downwards; empty strings leave gaps
    pub fn with_names(start_row: u32, names: &[&str]) -> Self {
        let sheet = Self::default();
        {
            let mut cells = sheet.cells.lock().unwrap();
            for (offset, name) in names.iter().enumerate() {
                if !name.is_empty() {
                    cells.insert((start_row + offset as u32, 1), name.to_string());
                }
            }
        }
        sheet
    }

    /// Store `formula` in `a1`, displayed as `shown`
    pub fn with_formula(mut self, a1: &str, formula: &str, shown: &str) -> Self {
        let key = parse_cell(a1);
        self.cells.lock().unwrap().insert(key, formula.to_string());
        self.shown.insert(key, shown.to_string());
        self
    }

    /// Make the `index`-th write (0-based) fail
    pub fn failing_on_write(mut self, index: usize) -> Self {
        self.fail_on_write = Some(index);
        self
    }

    pub fn cell(&self, a1: &str) -> Option<String> {
        let (row, col) = parse_cell(a1);
        self.cells.lock().unwrap().get(&(row, col)).cloned()
    }

    /// Every range read, with the requested rendering
    pub fn reads(&self) -> Vec<(String, ValueRender)> {
        self.reads.lock().unwrap().clone()
    }

    /// Every successful write target, in order
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn row_count(&self) -> usize {
        let cells = self.cells.lock().unwrap();
        let rows: HashSet<u32> = cells.keys().map(|(row, _)| *row).collect();
        rows.len()
    }

    fn record_write(&self, target: &str) -> Result<()> {
        let mut writes = self.writes.lock().unwrap();
        if self.fail_on_write == Some(writes.len()) {
            anyhow::bail!("The caller does not have permission (status 403)");
        }
        writes.push(target.to_string());
        Ok(())
    }
}

/// `Sheet1!B12` / `'My Sheet'!A4` -> (row, column)
fn parse_cell(a1: &str) -> (u32, u32) {
    let cell = a1.rsplit('!').next().unwrap();
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits: String = cell.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();

    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .fold(0u32, |acc, b| acc * 26 + (b - b'A' + 1) as u32);
    (digits.parse().unwrap_or(1), col)
}

#[async_trait]
impl SheetClient for MemorySheet {
    async fn read_range(
        &self,
        _document_id: &str,
        range: &str,
        render: ValueRender,
    ) -> Result<Vec<Vec<String>>> {
        self.reads.lock().unwrap().push((range.to_string(), render));

        // `Sheet1!A4:B` -> rows from 4, columns A..=B
        let (start, end) = range.split_once(':').unwrap();
        let (start_row, first_col) = parse_cell(start);
        let (_, last_col) = parse_cell(end);

        let cells = self.cells.lock().unwrap();
        let value = |row: u32, col: u32| {
            let stored = cells.get(&(row, col)).cloned().unwrap_or_default();
            match render {
                ValueRender::Formatted => self.shown.get(&(row, col)).cloned().unwrap_or(stored),
                ValueRender::Formula => stored,
            }
        };

        let last_row = cells
            .keys()
            .filter(|(row, col)| *row >= start_row && (first_col..=last_col).contains(col))
            .map(|(row, _)| *row)
            .max();

        let Some(last_row) = last_row else {
            return Ok(Vec::new());
        };

        // Like the real service: trailing empty cells are omitted
        let rows = (start_row..=last_row)
            .map(|row| {
                let mut values: Vec<String> =
                    (first_col..=last_col).map(|col| value(row, col)).collect();
                while values.last().map(|v| v.is_empty()).unwrap_or(false) {
                    values.pop();
                }
                values
            })
            .collect();
        Ok(rows)
    }

    async fn write_cell(&self, _document_id: &str, cell: &str, value: &str) -> Result<()> {
        self.record_write(cell)?;
        let key = parse_cell(cell);
        self.cells.lock().unwrap().insert(key, value.to_string());
        Ok(())
    }

    async fn write_range(&self, _document_id: &str, start: &str, rows: &[Vec<String>]) -> Result<()> {
        self.record_write(start)?;
        let (start_row, start_col) = parse_cell(start);

        let mut cells = self.cells.lock().unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                cells.insert((start_row + r as u32, start_col + c as u32), value.clone());
            }
        }
        Ok(())
    }
}

/// Records the names it was asked about and answers with a fixed value
pub struct RecordingDecider {
    answer: bool,
    pub asked: Mutex<Vec<Vec<String>>>,
}

impl RecordingDecider {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<Vec<String>> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl UnmatchedDecider for RecordingDecider {
    async fn decide(&self, names: &[String]) -> bool {
        self.asked.lock().unwrap().push(names.to_vec());
        self.answer
    }
}

/// Write `names` as small fake WAV files into `dir`
pub fn write_sources(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let path = dir.join(name);
            std::fs::write(&path, vec![b'a' + i as u8; 1000 + i * 500]).unwrap();
            path
        })
        .collect()
}
