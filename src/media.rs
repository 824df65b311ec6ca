//! Media acquisition and admission.
//!
//! Resolves an inbound attachment or URL into one transcription-ready audio
//! file inside a job-scoped temp directory, enforcing the transport and
//! engine size ceilings along the way. External tools (ffmpeg, yt-dlp) are
//! shelled out to with hard timeouts.

use crate::telegram::ChatTransport;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Largest attachment the Bot API lets a bot download.
pub const MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Largest audio file we hand to the speech engine.
pub const MAX_TRANSCRIBE_BYTES: u64 = 50 * 1024 * 1024;

/// Ceiling on a remote URL fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(3600);

/// Ceiling on one ffmpeg extraction or compression pass.
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(600);

/// Opus bitrate for the compression fallback.
const COMPRESS_BITRATE: &str = "32k";

const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "flac", "m4a", "mp3", "oga", "ogg", "opus", "wav", "wma",
];
const VIDEO_EXTENSIONS: &[&str] = &["avi", "m4v", "mkv", "mov", "mp4", "webm"];

/// Error type for media acquisition.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Downloading an attachment through the transport failed.
    #[error("download failed: {0}")]
    DownloadFailed(#[from] crate::telegram::ApiError),
    /// Fetching a remote URL failed.
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    /// ffmpeg could not extract or re-encode the audio track.
    #[error("audio extraction failed: {0}")]
    ExtractFailed(String),
    /// An external tool ran past its ceiling.
    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    Timeout {
        tool: &'static str,
        timeout: Duration,
    },
    /// The artifact is not something we can get audio out of.
    #[error("unsupported media format: {0}")]
    UnsupportedFormat(String),
    /// The job workspace could not be set up or inspected.
    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

/// Error type for size admission.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(
        "attachment is {size} bytes, over the {MAX_DOWNLOAD_BYTES} byte download ceiling"
    )]
    TooLargeForTransport { size: u64 },
    #[error(
        "audio is {size} bytes even after compression, over the {MAX_TRANSCRIBE_BYTES} byte transcription ceiling"
    )]
    TooLargeForTranscription { size: u64 },
}

/// What triggered a transcription job.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Voice {
        file_id: String,
        file_size: Option<u64>,
    },
    VideoNote {
        file_id: String,
        file_size: Option<u64>,
    },
    AudioFile {
        file_id: String,
        file_name: Option<String>,
        file_size: Option<u64>,
    },
    RemoteUrl {
        url: String,
    },
}

impl MediaSource {
    /// Size the transport declared for the artifact, if any.
    pub fn declared_size(&self) -> Option<u64> {
        match self {
            MediaSource::Voice { file_size, .. }
            | MediaSource::VideoNote { file_size, .. }
            | MediaSource::AudioFile { file_size, .. } => *file_size,
            MediaSource::RemoteUrl { .. } => None,
        }
    }

    /// Human-readable name used in the result summary tag.
    pub fn display_name(&self) -> String {
        match self {
            MediaSource::Voice { .. } => "voice_message.ogg".to_string(),
            MediaSource::VideoNote { .. } => "video_note.mp4".to_string(),
            MediaSource::AudioFile { file_name, .. } => file_name
                .clone()
                .unwrap_or_else(|| "audio_file".to_string()),
            MediaSource::RemoteUrl { url } => url
                .rsplit('/')
                .next()
                .filter(|tail| !tail.is_empty())
                .unwrap_or(url)
                .to_string(),
        }
    }
}

/// A transcription-ready audio file.
///
/// Owns the job's temp directory: dropping this value removes the normalized
/// file and every intermediate the job wrote, on success and failure alike.
#[derive(Debug)]
pub struct NormalizedAudio {
    dir: TempDir,
    path: PathBuf,
}

impl NormalizedAudio {
    /// Wrap an already-normalized file living inside `dir`.
    pub fn new(dir: TempDir, path: PathBuf) -> Self {
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> std::io::Result<u64> {
        std::fs::metadata(&self.path).map(|m| m.len())
    }

    fn workspace(&self) -> &Path {
        self.dir.path()
    }
}

/// Pre-download admission: reject attachments the transport won't serve.
///
/// Runs before any bytes move, so an oversized artifact costs nothing.
pub fn admit_attachment(source: &MediaSource) -> Result<(), AdmissionError> {
    if let Some(size) = source.declared_size()
        && size > MAX_DOWNLOAD_BYTES
    {
        return Err(AdmissionError::TooLargeForTransport { size });
    }
    Ok(())
}

/// Post-normalization admission: compress once if the audio is over the
/// engine ceiling, and fail if it still is afterwards.
pub async fn admit_audio(audio: &mut NormalizedAudio) -> anyhow::Result<()> {
    let size = audio.size_bytes()?;
    if size <= MAX_TRANSCRIBE_BYTES {
        return Ok(());
    }

    info!(size, "Audio over the transcription ceiling, compressing");
    let compressed = audio.workspace().join("compressed.ogg");
    compress_audio(audio.path(), &compressed).await?;
    audio.path = compressed;

    let size = audio.size_bytes()?;
    if size > MAX_TRANSCRIBE_BYTES {
        return Err(AdmissionError::TooLargeForTranscription { size }.into());
    }
    debug!(size, "Compression brought audio under the ceiling");
    Ok(())
}

/// Resolve `source` into one normalized audio file in a fresh job directory.
pub async fn acquire(
    transport: &dyn ChatTransport,
    work_dir: &Path,
    source: &MediaSource,
) -> Result<NormalizedAudio, AcquireError> {
    tokio::fs::create_dir_all(work_dir).await?;
    let dir = tempfile::Builder::new()
        .prefix("voicescribe-job-")
        .tempdir_in(work_dir)?;

    let path = match source {
        MediaSource::Voice { file_id, .. } => {
            let dest = dir.path().join("voice.oga");
            transport.download_file(file_id, &dest).await?;
            dest
        }
        MediaSource::AudioFile {
            file_id, file_name, ..
        } => {
            let dest = dir.path().join(audio_filename(file_name.as_deref()));
            transport.download_file(file_id, &dest).await?;
            dest
        }
        MediaSource::VideoNote { file_id, .. } => {
            let video = dir.path().join("video_note.mp4");
            transport.download_file(file_id, &video).await?;
            extract_and_discard_video(&video, dir.path()).await?
        }
        MediaSource::RemoteUrl { url } => {
            let fetched = fetch_url(url, dir.path()).await?;
            match classify(&fetched) {
                FetchedKind::Audio => fetched,
                FetchedKind::Video => extract_and_discard_video(&fetched, dir.path()).await?,
                FetchedKind::Unknown => {
                    return Err(AcquireError::UnsupportedFormat(
                        fetched
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| url.clone()),
                    ));
                }
            }
        }
    };

    Ok(NormalizedAudio::new(dir, path))
}

/// Extract the audio track, then drop the video copy.
///
/// The source video is deleted as soon as extraction succeeds; on failure the
/// partially-written audio file is removed so it can never be mistaken for a
/// finished normalization.
async fn extract_and_discard_video(video: &Path, dir: &Path) -> Result<PathBuf, AcquireError> {
    let audio = dir.join("extracted.ogg");
    match extract_audio(video, &audio).await {
        Ok(()) => {
            if let Err(e) = tokio::fs::remove_file(video).await {
                warn!(error = %e, path = %video.display(), "Failed to remove source video");
            }
            Ok(audio)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&audio).await;
            Err(e)
        }
    }
}

/// Run ffmpeg to pull the audio track out of a video file.
async fn extract_audio(input: &Path, output: &Path) -> Result<(), AcquireError> {
    debug!(input = %input.display(), output = %output.display(), "Extracting audio track");
    let result = tokio::time::timeout(
        FFMPEG_TIMEOUT,
        Command::new("ffmpeg")
            .arg("-nostdin")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-vn", "-ac", "1", "-c:a", "libopus"])
            .arg(output)
            .kill_on_drop(true)
            .output(),
    )
    .await;

    let output_result = match result {
        Err(_) => {
            return Err(AcquireError::Timeout {
                tool: "ffmpeg",
                timeout: FFMPEG_TIMEOUT,
            });
        }
        Ok(r) => r.map_err(|e| AcquireError::ExtractFailed(format!("failed to run ffmpeg: {e}")))?,
    };

    if !output_result.status.success() {
        return Err(AcquireError::ExtractFailed(last_stderr_line(
            &output_result.stderr,
        )));
    }
    Ok(())
}

/// Re-encode to mono low-bitrate Opus. One pass only; no bitrate ladder.
async fn compress_audio(input: &Path, output: &Path) -> Result<(), AcquireError> {
    debug!(input = %input.display(), output = %output.display(), "Compressing audio");
    let result = tokio::time::timeout(
        FFMPEG_TIMEOUT,
        Command::new("ffmpeg")
            .arg("-nostdin")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1", "-c:a", "libopus", "-b:a", COMPRESS_BITRATE])
            .arg(output)
            .kill_on_drop(true)
            .output(),
    )
    .await;

    let output_result = match result {
        Err(_) => {
            return Err(AcquireError::Timeout {
                tool: "ffmpeg",
                timeout: FFMPEG_TIMEOUT,
            });
        }
        Ok(r) => r.map_err(|e| AcquireError::ExtractFailed(format!("failed to run ffmpeg: {e}")))?,
    };

    if !output_result.status.success() {
        return Err(AcquireError::ExtractFailed(last_stderr_line(
            &output_result.stderr,
        )));
    }
    Ok(())
}

/// Fetch a remote URL into `dir` via yt-dlp, returning the downloaded file.
async fn fetch_url(url: &str, dir: &Path) -> Result<PathBuf, AcquireError> {
    info!(url, "Fetching remote media");
    let template = dir.join("fetched.%(ext)s");
    let result = tokio::time::timeout(
        FETCH_TIMEOUT,
        Command::new("yt-dlp")
            .arg("--no-playlist")
            .arg("-o")
            .arg(&template)
            .arg(url)
            .kill_on_drop(true)
            .output(),
    )
    .await;

    let output = match result {
        Err(_) => {
            return Err(AcquireError::Timeout {
                tool: "yt-dlp",
                timeout: FETCH_TIMEOUT,
            });
        }
        Ok(r) => r.map_err(|e| AcquireError::FetchFailed(format!("failed to run yt-dlp: {e}")))?,
    };

    if !output.status.success() {
        return Err(AcquireError::FetchFailed(last_stderr_line(&output.stderr)));
    }

    // yt-dlp substitutes the real extension; find what it wrote.
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with("fetched.")
        {
            return Ok(entry.path());
        }
    }
    Err(AcquireError::FetchFailed(
        "yt-dlp reported success but wrote no file".to_string(),
    ))
}

/// Media kind judged from a fetched file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchedKind {
    Audio,
    Video,
    Unknown,
}

fn classify(path: &Path) -> FetchedKind {
    let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
        return FetchedKind::Unknown;
    };
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        FetchedKind::Audio
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        FetchedKind::Video
    } else {
        FetchedKind::Unknown
    }
}

/// Pick a safe local filename for an audio attachment.
fn audio_filename(file_name: Option<&str>) -> String {
    let Some(name) = file_name else {
        return "audio_file".to_string();
    };
    // Keep only the final path component of whatever the sender named it.
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .filter(|base| !base.is_empty() && *base != "." && *base != "..")
        .unwrap_or("audio_file");
    base.to_string()
}

fn last_stderr_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no tool output")
        .to_string()
}

#[cfg(test)]
#[path = "media_test.rs"]
mod tests;
