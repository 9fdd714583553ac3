//! File-backed audio endpoints for headless runs.
//!
//! [`FileSink`] stands in for speakers by writing each played clip to disk.
//! [`PcmFileSource`] stands in for a microphone by replaying a recorded
//! 16 kHz mono file in fixed-size chunks.

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Result, SpeechError};
use crate::recognition::{CaptureDevice, CaptureHandle};
use crate::stt::{AudioSource, SAMPLE_RATE};
use crate::synthesis::{AudioBuffer, AudioSink};

/// Writes every played clip as `sentence_{nnn}.wav` under a directory.
pub struct FileSink {
    dir: PathBuf,
    written: Mutex<Vec<PathBuf>>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn clip_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("sentence_{index:03}.wav"))
    }

    /// Paths written so far, in playback order.
    pub fn written(&self) -> Vec<PathBuf> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn play(&self, buffer: AudioBuffer) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SpeechError::Playback(format!("{}: {e}", self.dir.display())))?;

        let path = self.clip_path(buffer.index);
        tokio::fs::write(&path, &buffer.data)
            .await
            .map_err(|e| SpeechError::Playback(format!("{}: {e}", path.display())))?;

        info!(index = buffer.index, path = %path.display(), bytes = buffer.data.len(), "Played sentence");
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
        Ok(())
    }
}

/// Decode a recording into 16-bit samples.
///
/// WAV input must be 16 kHz mono 16-bit integer PCM. Input without a RIFF
/// header is read as raw little-endian PCM in that format.
pub fn read_samples(bytes: &[u8]) -> Result<Vec<i16>> {
    if !bytes.starts_with(b"RIFF") {
        return Ok(bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect());
    }

    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| SpeechError::Device(format!("invalid WAV file: {e}")))?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE
        || spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
    {
        return Err(SpeechError::Device(format!(
            "unsupported WAV format: {} Hz, {} channel(s), {}-bit {:?} (need {SAMPLE_RATE} Hz mono 16-bit PCM)",
            spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
        )));
    }

    reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SpeechError::Device(format!("corrupt WAV data: {e}")))
}

/// Replays a recorded 16 kHz mono 16-bit file as a capture device.
pub struct PcmFileSource {
    path: PathBuf,
    chunks: Mutex<VecDeque<Vec<i16>>>,
    in_use: Arc<AtomicBool>,
}

impl PcmFileSource {
    /// Load `path` and split it into chunks of `chunk_secs` seconds.
    pub fn open(path: impl AsRef<Path>, chunk_secs: f32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path)
            .map_err(|e| SpeechError::Device(format!("{}: {e}", path.display())))?;
        let samples = read_samples(&bytes)?;

        let chunk_len = ((SAMPLE_RATE as f32 * chunk_secs) as usize).max(1);
        let chunks: VecDeque<Vec<i16>> = samples.chunks(chunk_len).map(<[i16]>::to_vec).collect();
        debug!(path = %path.display(), samples = samples.len(), chunks = chunks.len(), "Loaded audio file");

        Ok(Self {
            path,
            chunks: Mutex::new(chunks),
            in_use: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn remaining_chunks(&self) -> usize {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl AudioSource for PcmFileSource {
    async fn next_chunk(&self) -> Result<Option<Vec<i16>>> {
        Ok(self
            .chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front())
    }
}

struct FileCaptureHandle {
    in_use: Arc<AtomicBool>,
    released: bool,
}

impl CaptureHandle for FileCaptureHandle {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.in_use.store(false, Ordering::SeqCst);
            debug!("Audio file capture released");
        }
    }
}

impl Drop for FileCaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl CaptureDevice for PcmFileSource {
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>> {
        if self.in_use.swap(true, Ordering::SeqCst) {
            return Err(SpeechError::Device(format!(
                "{} is already being captured",
                self.path.display()
            )));
        }
        Ok(Box::new(FileCaptureHandle {
            in_use: self.in_use.clone(),
            released: false,
        }))
    }
}
