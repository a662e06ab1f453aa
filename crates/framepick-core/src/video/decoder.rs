use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::frame::Frame;
use crate::error::{Error, Result};

/// Sequential, forward-only supplier of decoded frames.
///
/// Implementations release their underlying handle when dropped, so a
/// source is closed on every exit path of whoever owns it.
pub trait FrameSource {
    /// Native frame rate reported by the container. May be zero or negative
    /// when the container does not know it.
    fn fps(&self) -> f64;

    /// Native frame count, if the container records one.
    fn frame_count(&self) -> Option<u64>;

    /// Decode the next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Stream metadata obtained by probing with ffprobe.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProbeResult {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: Option<u64>,
}

fn unreadable(path: &Path, reason: impl Into<String>) -> Error {
    Error::SourceUnreadable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

pub(crate) fn probe(path: &Path) -> Result<ProbeResult> {
    if !path.is_file() {
        return Err(unreadable(path, "file does not exist"));
    }

    info!(?path, "probing video metadata with ffprobe");

    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate,nb_frames",
            "-of", "csv=p=0",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| unreadable(path, format!("failed to run ffprobe (is ffmpeg installed?): {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, ?path, "ffprobe failed");
        return Err(unreadable(path, format!("ffprobe failed: {}", stderr.trim())));
    }

    // Output format: "width,height,num/den,nb_frames"
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().unwrap_or_default().trim();
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 3 {
        error!(%stdout, "unexpected ffprobe output, expected width,height,fps[,frames]");
        return Err(unreadable(path, "no video stream found"));
    }

    let width: u32 = parts[0]
        .parse()
        .map_err(|_| unreadable(path, format!("bad width {:?}", parts[0])))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| unreadable(path, format!("bad height {:?}", parts[1])))?;
    if width == 0 || height == 0 {
        return Err(unreadable(path, format!("invalid dimensions {width}x{height}")));
    }

    let fps = parse_frame_rate(parts[2]);
    if fps <= 0.0 {
        warn!(fps, ?path, "video reports a non-positive frame rate");
    }

    let frame_count = parts.get(3).and_then(|s| s.trim().parse::<u64>().ok());
    if frame_count.is_none() {
        warn!(?path, "container does not record a frame count");
    }

    info!(width, height, fps, ?frame_count, "probe completed");
    Ok(ProbeResult {
        width,
        height,
        fps,
        frame_count,
    })
}

/// Parse ffprobe's `num/den` or plain decimal rate. Unknown rates map to 0.
fn parse_frame_rate(raw: &str) -> f64 {
    let raw = raw.trim();
    if let Some((num, den)) = raw.split_once('/') {
        match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(num), Ok(den)) if den > 0.0 => num / den,
            _ => 0.0,
        }
    } else {
        raw.parse().unwrap_or(0.0)
    }
}

/// ffmpeg arguments for streaming every decoded frame as raw RGB24.
///
/// Frames pass through one-to-one: without `-fps_mode passthrough` the
/// rawvideo muxer forces constant-rate output and variable-rate inputs gain
/// or lose frames.
fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-i".into(), path.into()];
    args.extend(
        [
            "-fps_mode", "passthrough",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "-v", "error",
            "pipe:1",
        ]
        .map(OsString::from),
    );
    args
}

/// Decodes video frames by piping raw RGB24 data from the ffmpeg CLI.
pub struct VideoDecoder {
    child: Child,
    width: u32,
    height: u32,
    fps: f64,
    native_frame_count: Option<u64>,
    decoded: u64,
    frame_bytes: usize,
}

impl VideoDecoder {
    /// Open a video file for decoding.
    pub fn open(path: &Path) -> Result<Self> {
        let info = probe(path)?;

        info!(?path, "spawning ffmpeg decoder process");

        let child = Command::new("ffmpeg")
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| unreadable(path, format!("failed to spawn ffmpeg: {e}")))?;

        let frame_bytes = (info.width as usize) * (info.height as usize) * 3;

        info!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            frame_bytes,
            "video decoder opened"
        );

        Ok(Self {
            child,
            width: info.width,
            height: info.height,
            fps: info.fps,
            native_frame_count: info.frame_count,
            decoded: 0,
            frame_bytes,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reap ffmpeg once stdout is exhausted and surface a failed exit.
    fn finish(&mut self) -> Result<()> {
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = self.child.wait()?;
        if !status.success() {
            error!(%status, stderr = %stderr.trim(), "ffmpeg exited with failure");
            return Err(Error::Decode(format!("ffmpeg exited with {status}: {}", stderr.trim())));
        }
        Ok(())
    }
}

impl FrameSource for VideoDecoder {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<u64> {
        self.native_frame_count
    }

    /// Read the next frame from the ffmpeg pipe, or `None` if the video is finished.
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .ok_or_else(|| Error::Decode("ffmpeg stdout not available".into()))?;

        let mut buf = vec![0u8; self.frame_bytes];
        let mut read = 0;

        while read < self.frame_bytes {
            match stdout.read(&mut buf[read..]) {
                Ok(0) => {
                    if read == 0 {
                        info!(total_frames = self.decoded, "video stream ended");
                        self.child.stdout = None;
                        self.finish()?;
                        return Ok(None);
                    }
                    error!(
                        read_bytes = read,
                        expected_bytes = self.frame_bytes,
                        frame = self.decoded,
                        "ffmpeg stream ended mid-frame"
                    );
                    return Err(Error::Decode(format!(
                        "stream ended mid-frame (read {read}/{} bytes)",
                        self.frame_bytes,
                    )));
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(frame = self.decoded, %e, "failed to read from ffmpeg pipe");
                    return Err(e.into());
                }
            }
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| Error::Decode("raw frame does not match stream dimensions".into()))?;

        let frame_number = self.decoded;
        let timestamp_seconds = if self.fps > 0.0 {
            frame_number as f64 / self.fps
        } else {
            0.0
        };
        self.decoded += 1;

        debug!(frame_number, timestamp_seconds, "decoded frame");

        Ok(Some(Frame::new(image, frame_number, timestamp_seconds)))
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        info!(total_frames = self.decoded, "closing video decoder");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
