//! ffmpeg-backed [`MediaConverter`].
//!
//! Each output gets its own working directory under
//! `<work_dir>/<stream id>/<start ms>/`. Progressive jobs write a single
//! growing file; segmented jobs write `segmentNNNNN.ts` files plus ffmpeg's own
//! `index.m3u8`, which is only read to learn which segments are complete.
//!
//! Progress is parsed from `-progress pipe:1` blocks and published through the
//! handle's [`ProgressReporter`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tcstream_common::{Container, EncoderPayloadKind, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::converter::{
    parse_segment_file_name, EncoderHandle, MediaConverter, OutputInfo, ProgressReporter,
    TranscodeJob, SEGMENT_EXTENSION,
};
use crate::{tools, Error};

/// Playlist ffmpeg maintains inside a segmented output directory.
const ENCODER_PLAYLIST: &str = "index.m3u8";

/// Settings for [`FfmpegConverter`].
#[derive(Debug, Clone)]
pub struct FfmpegSettings {
    /// Path to the ffmpeg binary.
    pub ffmpeg: PathBuf,
    /// Root directory for encoder outputs.
    pub work_dir: PathBuf,
    /// HLS segment duration.
    pub segment_secs: u32,
    /// x264/x265 preset.
    pub preset: String,
}

/// Converter that spawns one ffmpeg process per encoder output.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    settings: FfmpegSettings,
}

impl FfmpegConverter {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }

    /// Locate ffmpeg (configured path first, then `PATH`) and build a converter.
    pub fn discover(
        configured: Option<&Path>,
        work_dir: PathBuf,
        segment_secs: u32,
        preset: impl Into<String>,
    ) -> crate::Result<Self> {
        let ffmpeg = tools::get_tool_path("ffmpeg", configured)?;
        tracing::info!(ffmpeg = %ffmpeg.display(), "Using ffmpeg for transcoding");
        Ok(Self::new(FfmpegSettings {
            ffmpeg,
            work_dir,
            segment_secs,
            preset: preset.into(),
        }))
    }

    pub fn settings(&self) -> &FfmpegSettings {
        &self.settings
    }

    fn output_dir(&self, job: &TranscodeJob, start: Duration) -> PathBuf {
        self.settings
            .work_dir
            .join(job.stream_id.to_string())
            .join(start.as_millis().to_string())
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn get_file_stream(
        &self,
        job: &TranscodeJob,
        start: Duration,
        start_segment: u32,
    ) -> Result<EncoderHandle> {
        if !tokio::fs::try_exists(&job.source).await? {
            return Err(Error::file_not_found(&job.source).into());
        }

        let dir = self.output_dir(job, start);
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;

        let (output, target) = if job.segmented {
            (dir.clone(), dir.join(ENCODER_PLAYLIST))
        } else {
            let file = dir.join(format!("stream.{}", job.container.extension()));
            (file.clone(), file)
        };

        let args = build_args(
            job,
            start,
            start_segment,
            &target,
            self.settings.segment_secs,
            &self.settings.preset,
        );
        tracing::debug!(
            stream_id = %job.stream_id,
            start_secs = start.as_secs_f64(),
            args = ?args,
            "Spawning ffmpeg"
        );

        let child = Command::new(&self.settings.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool_failed("ffmpeg", e.to_string()))?;

        let (handle, reporter) = EncoderHandle::new(OutputInfo {
            kind: EncoderPayloadKind::Video,
            path: output,
            start,
            start_segment,
            segmented: job.segmented,
            streamable: job.segmented || job.container.is_progressive(),
        });

        tokio::spawn(monitor(child, reporter, dir, job.segmented));

        Ok(handle)
    }

    fn hls_segment_time_secs(&self) -> u32 {
        self.settings.segment_secs
    }
}

/// Build the ffmpeg command line for one output.
///
/// `target` is the output file for progressive jobs and the encoder playlist
/// for segmented jobs (segments are written next to it).
pub fn build_args(
    job: &TranscodeJob,
    start: Duration,
    start_segment: u32,
    target: &Path,
    segment_secs: u32,
    preset: &str,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-y",
        "-loglevel",
        "error",
        "-progress",
        "pipe:1",
        "-nostats",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if !start.is_zero() {
        args.push("-ss".into());
        args.push(format!("{:.3}", start.as_secs_f64()));
    }
    args.push("-i".into());
    args.push(job.source.to_string_lossy().into_owned());
    args.extend(["-map", "0:v:0?", "-map", "0:a:0?"].map(String::from));

    let video = video_encoder(&job.video_codec);
    args.push("-c:v".into());
    args.push(video.into());
    if video != "copy" {
        let kbps = job.video_bitrate_kbps;
        args.extend([
            "-preset".to_string(),
            preset.to_string(),
            "-b:v".to_string(),
            format!("{kbps}k"),
            "-maxrate".to_string(),
            format!("{kbps}k"),
            "-bufsize".to_string(),
            format!("{}k", kbps * 2),
        ]);
    }

    let audio = audio_encoder(&job.audio_codec);
    args.push("-c:a".into());
    args.push(audio.into());
    if audio != "copy" {
        args.extend([
            "-b:a".to_string(),
            format!("{}k", job.audio_bitrate_kbps),
            "-ac".to_string(),
            "2".to_string(),
        ]);
    }

    if job.segmented {
        let dir = target.parent().unwrap_or(target);
        let pattern = dir.join(format!("segment%05d.{SEGMENT_EXTENSION}"));
        args.extend([
            "-force_key_frames".to_string(),
            format!("expr:gte(t,n_forced*{segment_secs})"),
            "-output_ts_offset".to_string(),
            format!("{:.3}", start.as_secs_f64()),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            segment_secs.to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-hls_playlist_type".to_string(),
            "event".to_string(),
            "-start_number".to_string(),
            start_segment.to_string(),
            "-hls_segment_filename".to_string(),
            pattern.to_string_lossy().into_owned(),
        ]);
    } else {
        args.push("-f".into());
        args.push(muxer_name(job.container).into());
    }

    args.push(target.to_string_lossy().into_owned());
    args
}

fn video_encoder(codec: &str) -> &'static str {
    match codec.to_ascii_lowercase().as_str() {
        "h264" | "avc" | "avc1" => "libx264",
        "h265" | "hevc" => "libx265",
        "vp9" => "libvpx-vp9",
        "copy" => "copy",
        _ => "libx264",
    }
}

fn audio_encoder(codec: &str) -> &'static str {
    match codec.to_ascii_lowercase().as_str() {
        "aac" => "aac",
        "ac3" => "ac3",
        "opus" => "libopus",
        "mp3" => "libmp3lame",
        "copy" => "copy",
        _ => "aac",
    }
}

fn muxer_name(container: Container) -> &'static str {
    match container {
        Container::Mpegts => "mpegts",
        Container::Mp4 => "mp4",
        Container::Matroska => "matroska",
        Container::Webm => "webm",
    }
}

/// One complete `-progress` block.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ProgressBlock {
    pub out_time: Option<Duration>,
    pub total_size: Option<u64>,
    pub end: bool,
}

/// Accumulates `key=value` lines until a `progress=` line closes the block.
#[derive(Debug, Default)]
pub(crate) struct ProgressParser {
    current: ProgressBlock,
}

impl ProgressParser {
    pub fn feed(&mut self, line: &str) -> Option<ProgressBlock> {
        let line = line.trim();
        if let Some(val) = line.strip_prefix("out_time_us=") {
            if let Ok(us) = val.parse::<i64>() {
                self.current.out_time = Some(Duration::from_micros(us.max(0) as u64));
            }
        } else if let Some(val) = line.strip_prefix("total_size=") {
            if let Ok(size) = val.parse::<u64>() {
                self.current.total_size = Some(size);
            }
        } else if let Some(val) = line.strip_prefix("progress=") {
            self.current.end = val == "end";
            return Some(std::mem::take(&mut self.current));
        }
        None
    }
}

/// Highest segment index listed in an encoder playlist.
///
/// ffmpeg appends a segment to its playlist only after closing the file, so
/// a listed segment is complete.
pub(crate) fn last_listed_segment(playlist: &str) -> Option<u32> {
    playlist
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| parse_segment_file_name(line.trim()))
        .map(|(index, _)| index)
        .max()
}

async fn read_last_segment(dir: &Path) -> Option<u32> {
    let playlist = tokio::fs::read_to_string(dir.join(ENCODER_PLAYLIST)).await.ok()?;
    last_listed_segment(&playlist)
}

async fn next_line(lines: &mut Option<Lines<BufReader<ChildStdout>>>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

async fn stderr_tail<R: AsyncRead + Unpin>(stderr: R) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            tail = line;
        }
    }
    tail
}

async fn discard(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove encoder output");
        }
    }
}

async fn monitor(mut child: Child, reporter: ProgressReporter, dir: PathBuf, segmented: bool) {
    let cancel = reporter.cancel_token();
    let mut lines = child.stdout.take().map(|s| BufReader::new(s).lines());
    let stderr = child.stderr.take().map(|s| tokio::spawn(stderr_tail(s)));
    let mut parser = ProgressParser::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill ffmpeg");
                }
                discard(&dir).await;
                return;
            }
            line = next_line(&mut lines) => {
                let Some(line) = line else { break };
                if let Some(block) = parser.feed(&line) {
                    let last_segment = if segmented { read_last_segment(&dir).await } else { None };
                    reporter.update(|p| {
                        if let Some(out_time) = block.out_time {
                            p.encoded = out_time;
                        }
                        if let Some(size) = block.total_size {
                            p.bytes_written = size;
                        }
                        if last_segment.is_some() {
                            p.last_segment = last_segment;
                        }
                    });
                }
            }
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill ffmpeg");
            }
            discard(&dir).await;
            return;
        }
        status = child.wait() => status,
    };

    match status {
        Ok(status) if status.success() => {
            let last_segment = if segmented { read_last_segment(&dir).await } else { None };
            let size = if segmented {
                None
            } else {
                first_file_size(&dir).await
            };
            reporter.update(|p| {
                if let Some(size) = size {
                    p.bytes_written = size;
                }
                if last_segment.is_some() {
                    p.last_segment = last_segment;
                }
                p.finished = true;
            });
            tracing::debug!(dir = %dir.display(), "ffmpeg finished");
        }
        Ok(status) => {
            let tail = match stderr {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            tracing::error!(status = %status, stderr = %tail, "ffmpeg exited with failure");
            reporter.fail(format!("ffmpeg exited with {status}: {tail}"));
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to wait for ffmpeg");
            reporter.fail(e.to_string());
        }
    }

    // The output stays readable until the owning session lets go of it.
    cancel.cancelled().await;
    discard(&dir).await;
}

async fn first_file_size(dir: &Path) -> Option<u64> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(meta) = entry.metadata().await {
            if meta.is_file() {
                return Some(meta.len());
            }
        }
    }
    None
}
