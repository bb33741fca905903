//! FFmpeg-based encoder and prober.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use super::config::{EncoderBackend, EncoderConfig};
use super::error::EncoderError;
use super::traits::{Encoder, Prober};
use super::types::{FrameJob, FrameOutput, MediaProbe, RenditionJob, RenditionOutput};
use crate::rendition::{INDEX_MANIFEST_NAME, SEGMENT_PATTERN};

/// How a supervised ffmpeg run ended.
enum RunEnd {
    Exited(std::io::Result<(ExitStatus, String)>),
    TimedOut,
    Cancelled,
}

/// FFmpeg-based encoder implementation.
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Creates an encoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    /// Builds ffmpeg arguments for one HLS rendition pass.
    fn build_rendition_args(&self, job: &RenditionJob) -> Vec<String> {
        let r = &job.rendition;
        let mut args = vec!["-y".to_string()];

        if self.config.backend == EncoderBackend::Nvenc {
            args.extend([
                "-hwaccel".to_string(),
                "cuda".to_string(),
                "-hwaccel_output_format".to_string(),
                "cuda".to_string(),
            ]);
        }

        args.extend(["-i".to_string(), job.input_path.to_string_lossy().to_string()]);

        let scale = match self.config.backend {
            EncoderBackend::Nvenc => format!("scale_cuda={}:{}", r.width, r.height),
            EncoderBackend::Software => format!("scale={}:{}", r.width, r.height),
        };

        args.extend([
            "-vf".to_string(),
            scale,
            "-c:v".to_string(),
            self.config.backend.video_codec().to_string(),
            "-preset".to_string(),
            self.config.preset.clone(),
            "-b:v".to_string(),
            format!("{}k", r.bitrate_kbps),
            "-maxrate".to_string(),
            format!("{}k", r.max_bitrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", r.buffer_kbps),
        ]);

        if self.config.backend == EncoderBackend::Nvenc {
            args.extend(["-rc".to_string(), "vbr".to_string()]);
        }

        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            r.segment_secs.to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-hls_segment_filename".to_string(),
            job.output_dir.join(SEGMENT_PATTERN).to_string_lossy().to_string(),
        ]);

        // Log level and progress
        args.extend([
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        args.push(job.output_dir.join(INDEX_MANIFEST_NAME).to_string_lossy().to_string());

        args
    }

    /// Builds ffmpeg arguments for a single-frame capture.
    fn build_frame_args(&self, job: &FrameJob) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-ss".to_string(),
            job.timestamp_secs.to_string(),
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale='min({},iw)':-1", job.max_width),
            "-q:v".to_string(),
            "2".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            job.output_path.to_string_lossy().to_string(),
        ]
    }

    /// Parses ffprobe `-show_format` JSON output.
    fn parse_probe_output(output: &str) -> Result<MediaProbe, EncoderError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            format_long_name: Option<String>,
            duration: Option<String>,
            size: Option<String>,
            bit_rate: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| EncoderError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let format = probe.format;

        Ok(MediaProbe {
            duration_secs: format
                .duration
                .as_deref()
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(0.0),
            size_bytes: format
                .size
                .as_deref()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0),
            bit_rate: format.bit_rate.as_deref().and_then(|b| b.parse::<u64>().ok()),
            format_name: format.format_name,
            format_long_name: format.format_long_name,
        })
    }

    /// Extracts the encoded position in seconds from a `-progress` line.
    fn parse_progress_line(re: &Regex, line: &str) -> Option<f64> {
        let caps = re.captures(line)?;
        let micros = caps.get(1)?.as_str().parse::<f64>().ok()?;
        Some(micros / 1_000_000.0)
    }

    fn spawn_ffmpeg(&self, args: &[String]) -> Result<Child, EncoderError> {
        Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EncoderError::Io(e)
                }
            })
    }

    /// Reads progress from stderr until the child exits.
    async fn drain_and_wait(
        child: &mut Child,
        stderr: ChildStderr,
        tier: &str,
        duration_secs: Option<f64>,
    ) -> std::io::Result<(ExitStatus, String)> {
        let mut reader = BufReader::new(stderr).lines();
        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();
        let progress_interval = Duration::from_secs(5);
        let mut last_progress_log = Instant::now();
        let mut error_output = String::new();

        while let Ok(Some(line)) = reader.next_line().await {
            if line.contains("Error") || line.contains("error") {
                error_output.push_str(&line);
                error_output.push('\n');
            }

            let Some(ref re) = time_regex else { continue };
            let Some(position) = Self::parse_progress_line(re, &line) else {
                continue;
            };

            if last_progress_log.elapsed() >= progress_interval {
                let percent = match duration_secs {
                    Some(d) if d > 0.0 => (position / d * 100.0).min(100.0),
                    _ => 0.0,
                };
                debug!(tier, position_secs = position, percent, "Encode progress");
                last_progress_log = Instant::now();
            }
        }

        let status = child.wait().await?;
        Ok((status, error_output))
    }

    /// Runs ffmpeg to completion, killing it on timeout or cancellation.
    async fn supervise(
        &self,
        args: &[String],
        tier: &str,
        timeout_secs: u64,
        cancel: Option<&tokio_util::sync::CancellationToken>,
        duration_secs: Option<f64>,
    ) -> Result<(), EncoderError> {
        let mut child = self.spawn_ffmpeg(args)?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncoderError::encode_failed("ffmpeg stderr was not captured", None))?;

        let end = {
            let run = Self::drain_and_wait(&mut child, stderr, tier, duration_secs);
            let cancelled = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                result = run => RunEnd::Exited(result),
                _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => RunEnd::TimedOut,
                _ = cancelled => RunEnd::Cancelled,
            }
        };

        match end {
            RunEnd::Exited(Ok((status, error_output))) => {
                if status.success() {
                    Ok(())
                } else {
                    Err(EncoderError::encode_failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ))
                }
            }
            RunEnd::Exited(Err(e)) => Err(EncoderError::Io(e)),
            RunEnd::TimedOut => {
                let _ = child.kill().await;
                Err(EncoderError::Timeout { timeout_secs })
            }
            RunEnd::Cancelled => {
                let _ = child.kill().await;
                Err(EncoderError::Cancelled)
            }
        }
    }

    async fn count_segments(dir: &Path) -> Result<usize, EncoderError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("seg_") && name.ends_with(".ts") {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn check_binary(path: &Path, not_found: EncoderError) -> Result<String, EncoderError> {
        match Command::new(path).arg("-version").output().await {
            Ok(output) => Ok(String::from_utf8_lossy(&output.stdout).to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found),
            Err(e) => Err(EncoderError::Io(e)),
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        match self.config.backend {
            EncoderBackend::Nvenc => "ffmpeg-nvenc",
            EncoderBackend::Software => "ffmpeg-x264",
        }
    }

    async fn encode_rendition(&self, job: RenditionJob) -> Result<RenditionOutput, EncoderError> {
        let start = Instant::now();

        if !job.input_path.exists() {
            return Err(EncoderError::InputNotFound {
                path: job.input_path.clone(),
            });
        }

        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|_| EncoderError::OutputDirectoryFailed {
                path: job.output_dir.clone(),
            })?;

        let duration_secs = self.probe(&job.input_path).await.ok().map(|p| p.duration_secs);
        let args = self.build_rendition_args(&job);

        info!(
            asset_id = job.asset_id,
            tier = job.rendition.tier,
            encoder = self.name(),
            "Starting rendition pass"
        );

        self.supervise(
            &args,
            job.rendition.tier,
            self.config.pass_timeout_secs,
            Some(&job.cancel),
            duration_secs,
        )
        .await?;

        let index_path = job.output_dir.join(INDEX_MANIFEST_NAME);
        if tokio::fs::metadata(&index_path).await.is_err() {
            return Err(EncoderError::encode_failed("Index manifest not created", None));
        }

        Ok(RenditionOutput {
            tier: job.rendition.tier,
            index_path,
            segment_count: Self::count_segments(&job.output_dir).await?,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn capture_frame(&self, job: FrameJob) -> Result<FrameOutput, EncoderError> {
        if !job.input_path.exists() {
            return Err(EncoderError::InputNotFound {
                path: job.input_path.clone(),
            });
        }

        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                EncoderError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }

        let args = self.build_frame_args(&job);
        self.supervise(&args, "frame", self.config.probe_timeout_secs, None, None)
            .await?;

        let output_path = job.output_path.clone();
        let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(&output_path))
            .await
            .map_err(|e| EncoderError::encode_failed(format!("Frame inspection panicked: {}", e), None))?
            .map_err(|e| EncoderError::encode_failed(format!("Frame not readable: {}", e), None))?;

        Ok(FrameOutput { width, height })
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        Self::check_binary(
            &self.config.ffmpeg_path,
            EncoderError::FfmpegNotFound {
                path: self.config.ffmpeg_path.clone(),
            },
        )
        .await?;

        Self::check_binary(
            &self.config.ffprobe_path,
            EncoderError::FfprobeNotFound {
                path: self.config.ffprobe_path.clone(),
            },
        )
        .await?;

        if self.config.backend == EncoderBackend::Nvenc {
            let output = Command::new(&self.config.ffmpeg_path)
                .args(["-hide_banner", "-encoders"])
                .output()
                .await?;
            let listing = String::from_utf8_lossy(&output.stdout);
            if !listing.contains("h264_nvenc") {
                return Err(EncoderError::encode_failed(
                    "ffmpeg build does not provide h264_nvenc",
                    None,
                ));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Prober for FfmpegEncoder {
    async fn probe(&self, path: &Path) -> Result<MediaProbe, EncoderError> {
        if !path.exists() {
            return Err(EncoderError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let command = Command::new(&self.config.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .kill_on_drop(true)
            .output();

        let output = timeout(Duration::from_secs(self.config.probe_timeout_secs), command)
            .await
            .map_err(|_| EncoderError::Timeout {
                timeout_secs: self.config.probe_timeout_secs,
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    EncoderError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EncoderError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Self::parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendition::LADDER;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn rendition_job(tier: usize) -> RenditionJob {
        RenditionJob {
            asset_id: 7,
            input_path: PathBuf::from("/data/uploads/clip.mp4"),
            output_dir: PathBuf::from("/data/streams/7").join(LADDER[tier].tier),
            rendition: LADDER[tier],
            cancel: CancellationToken::new(),
        }
    }

    fn position_of(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_build_rendition_args_nvenc() {
        let encoder =
            FfmpegEncoder::new(EncoderConfig::default().with_backend(EncoderBackend::Nvenc));
        let args = encoder.build_rendition_args(&rendition_job(0));

        assert_eq!(args[position_of(&args, "-hwaccel") + 1], "cuda");
        assert!(position_of(&args, "-hwaccel") < position_of(&args, "-i"));
        assert_eq!(args[position_of(&args, "-vf") + 1], "scale_cuda=1920:1080");
        assert_eq!(args[position_of(&args, "-c:v") + 1], "h264_nvenc");
        assert_eq!(args[position_of(&args, "-b:v") + 1], "5000k");
        assert_eq!(args[position_of(&args, "-bufsize") + 1], "10000k");
        assert_eq!(args[position_of(&args, "-rc") + 1], "vbr");
        assert_eq!(args[position_of(&args, "-hls_time") + 1], "15");
        assert_eq!(
            args[position_of(&args, "-hls_segment_filename") + 1],
            "/data/streams/7/1080p/seg_%03d.ts"
        );
        assert_eq!(args.last().unwrap(), "/data/streams/7/1080p/index.m3u8");
    }

    #[test]
    fn test_build_rendition_args_software() {
        let encoder = FfmpegEncoder::with_defaults();
        let args = encoder.build_rendition_args(&rendition_job(2));

        assert!(!args.contains(&"-hwaccel".to_string()));
        assert!(!args.contains(&"-rc".to_string()));
        assert_eq!(args[position_of(&args, "-vf") + 1], "scale=854:480");
        assert_eq!(args[position_of(&args, "-c:v") + 1], "libx264");
        assert_eq!(args[position_of(&args, "-maxrate") + 1], "1400k");
        assert_eq!(args[position_of(&args, "-hls_time") + 1], "20");
        assert_eq!(args[position_of(&args, "-hls_list_size") + 1], "0");
        assert_eq!(args[position_of(&args, "-progress") + 1], "pipe:2");
    }

    #[test]
    fn test_build_frame_args() {
        let encoder = FfmpegEncoder::with_defaults();
        let job = FrameJob::new(
            PathBuf::from("/data/uploads/clip.mp4"),
            PathBuf::from("/data/thumbnails/7_thumb.jpg"),
        );
        let args = encoder.build_frame_args(&job);

        assert_eq!(args[position_of(&args, "-ss") + 1], "3");
        assert!(position_of(&args, "-ss") < position_of(&args, "-i"));
        assert_eq!(args[position_of(&args, "-frames:v") + 1], "1");
        assert_eq!(args[position_of(&args, "-vf") + 1], "scale='min(300,iw)':-1");
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "format": {
                "filename": "clip.mp4",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "format_long_name": "QuickTime / MOV",
                "duration": "62.080000",
                "size": "18350211",
                "bit_rate": "2364716"
            }
        }"#;

        let probe = FfmpegEncoder::parse_probe_output(json).unwrap();
        assert!((probe.duration_secs - 62.08).abs() < 0.001);
        assert_eq!(probe.size_bytes, 18_350_211);
        assert_eq!(probe.bit_rate, Some(2_364_716));
        assert_eq!(probe.display_format(), "QuickTime / MOV");
    }

    #[test]
    fn test_parse_probe_output_missing_fields() {
        let json = r#"{"format": {"format_name": "mp3"}}"#;
        let probe = FfmpegEncoder::parse_probe_output(json).unwrap();
        assert_eq!(probe.duration_secs, 0.0);
        assert_eq!(probe.bit_rate, None);
        assert_eq!(probe.display_format(), "mp3");
    }

    #[test]
    fn test_parse_probe_output_invalid() {
        let result = FfmpegEncoder::parse_probe_output("not json");
        assert!(matches!(result, Err(EncoderError::ParseError { .. })));
    }

    #[test]
    fn test_parse_progress_line() {
        let re = Regex::new(r"out_time_ms=(\d+)").unwrap();
        assert_eq!(
            FfmpegEncoder::parse_progress_line(&re, "out_time_ms=4500000"),
            Some(4.5)
        );
        assert_eq!(FfmpegEncoder::parse_progress_line(&re, "speed=1.2x"), None);
    }

    #[tokio::test]
    async fn test_encode_missing_input() {
        let encoder = FfmpegEncoder::with_defaults();
        let mut job = rendition_job(0);
        job.input_path = PathBuf::from("/nonexistent/clip.mp4");
        let result = encoder.encode_rendition(job).await;
        assert!(matches!(result, Err(EncoderError::InputNotFound { .. })));
    }

    /// Writes an ffmpeg stand-in that never finishes on its own.
    #[cfg(unix)]
    fn stalled_ffmpeg(dir: &Path) -> EncoderConfig {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        EncoderConfig {
            ffmpeg_path: script,
            ffprobe_path: dir.join("no-ffprobe"),
            ..EncoderConfig::default()
        }
        .with_pass_timeout(1)
    }

    #[cfg(unix)]
    fn stalled_job(dir: &Path) -> RenditionJob {
        let input = dir.join("clip.mp4");
        std::fs::write(&input, b"fake").unwrap();
        let mut job = rendition_job(0);
        job.input_path = input;
        job.output_dir = dir.join("1080p");
        job
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pass_timeout_kills_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FfmpegEncoder::new(stalled_ffmpeg(dir.path()));

        let started = Instant::now();
        let result = encoder.encode_rendition(stalled_job(dir.path())).await;
        assert!(matches!(result, Err(EncoderError::Timeout { timeout_secs: 1 })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FfmpegEncoder::new(stalled_ffmpeg(dir.path()).with_pass_timeout(60));
        let job = stalled_job(dir.path());
        let token = job.cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        });

        let started = Instant::now();
        let result = encoder.encode_rendition(job).await;
        assert!(matches!(result, Err(EncoderError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
