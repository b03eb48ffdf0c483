// src/replay.rs
//
// Detection source that replays recorded detector output. One JSON object
// per line, each a `DetectionCycleResult`:
//
//   {"person_detected": true, "detections": {"smartphone": [
//       {"label": "smartphone", "confidence": 0.82, "bbox": [120, 80, 190, 170]}]}}
//
// A line that fails to parse fails that cycle's detection only.

use crate::pipeline::DetectionSource;
use crate::types::DetectionCycleResult;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::info;

pub struct JsonlReplaySource<R> {
    lines: Lines<R>,
    current: Option<String>,
    line_no: u64,
}

impl JsonlReplaySource<BufReader<File>> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open replay {}", path.display()))?;
        info!("📂 Replaying detections from {}", path.display());
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: AsyncBufRead + Unpin + Send> JsonlReplaySource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            current: None,
            line_no: 0,
        }
    }
}

impl<R: AsyncBufRead + Unpin + Send> DetectionSource for JsonlReplaySource<R> {
    async fn capture(&mut self) -> Result<bool> {
        loop {
            let Some(line) = self.lines.next_line().await.context("Replay read failed")? else {
                self.current = None;
                return Ok(false);
            };
            self.line_no += 1;
            if !line.trim().is_empty() {
                self.current = Some(line);
                return Ok(true);
            }
        }
    }

    async fn detect(&mut self) -> Result<DetectionCycleResult> {
        let line = self.current.as_deref().context("No frame captured")?;
        serde_json::from_str(line)
            .with_context(|| format!("Bad replay record on line {}", self.line_no))
    }
}
