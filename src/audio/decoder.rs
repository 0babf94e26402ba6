//! External audio decoding via the ffmpeg CLI
//!
//! Format conversion, resampling, and down-mixing are delegated to an
//! external ffmpeg process that emits a PCM container on its standard
//! output. Both output pipes are drained on dedicated threads while the
//! child runs, so a full pipe buffer can never deadlock the decode, and
//! the child is always reaped before this module returns.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::audio::wav::{demux_channels, WavHeader};
use crate::error::AudioError;

/// Exit-status poll interval while a timeout is armed
const WAIT_POLL: Duration = Duration::from_millis(10);

/// External decoder invocation.
///
/// The default configuration resolves `ffmpeg` from `PATH` and waits for
/// it indefinitely; both are overridable.
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    ffmpeg: PathBuf,
    timeout: Option<Duration>,
}

impl AudioDecoder {
    /// Decoder using `ffmpeg` from `PATH` with no timeout.
    pub fn new() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            timeout: None,
        }
    }

    /// Use a specific ffmpeg binary.
    pub fn with_ffmpeg<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ffmpeg = path.into();
        self
    }

    /// Kill the decoder and fail if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Decode `path` into per-channel waveforms at `sample_rate` Hz.
    ///
    /// Returns one waveform per channel in reversed interleave order (see
    /// [`demux_channels`]). A nonzero decoder exit status, empty output, or
    /// an unreadable container all fail without partial results.
    pub fn decode<P: AsRef<Path>>(
        &self,
        path: P,
        sample_rate: u32,
    ) -> Result<Vec<Vec<f32>>, AudioError> {
        let path = path.as_ref();
        let out = self.run_ffmpeg(path, sample_rate)?;
        if out.is_empty() {
            return Err(AudioError::Decode(format!(
                "decoder produced no output for {}",
                path.display()
            )));
        }

        let header = WavHeader::parse(&out)?;
        debug!(
            channels = header.channels,
            data_start = header.data_start,
            bytes = out.len(),
            "parsed decoded container"
        );
        let payload = &out[header.data_start.min(out.len())..];
        demux_channels(payload, usize::from(header.channels))
    }

    fn run_ffmpeg(&self, path: &Path, sample_rate: u32) -> Result<Vec<u8>, AudioError> {
        let mut child = Command::new(&self.ffmpeg)
            .arg("-nostdin")
            .args(["-threads", "0"])
            .arg("-i")
            .arg(path)
            // The WAV header tells us how many channels we are dealing
            // with, so the stream is NOT flattened to mono here.
            .args(["-f", "wav", "-acodec", "pcm_s16le", "-ar"])
            .arg(sample_rate.to_string())
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AudioError::Decode(format!("failed to spawn {}: {e}", self.ffmpeg.display()))
            })?;

        let stdout = drain_on_thread(child.stdout.take());
        let stderr = drain_on_thread(child.stderr.take());

        // Wait first, join after: the readers only see end-of-file once the
        // child has exited (or been killed), and joining them before
        // inspecting the status guarantees the full streams were drained.
        let status = self.wait(&mut child);
        let out = join_drained(stdout);
        let err = join_drained(stderr);
        let status = status?;

        if !status.success() {
            return Err(AudioError::Decode(format!(
                "decoder exited with {status}: {}",
                String::from_utf8_lossy(&err).trim()
            )));
        }
        Ok(out)
    }

    /// Wait for the child to exit, enforcing the configured timeout.
    ///
    /// Reaps the child on every path; on timeout it is killed first.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, AudioError> {
        let Some(timeout) = self.timeout else {
            return child
                .wait()
                .map_err(|e| AudioError::Decode(format!("failed to wait for decoder: {e}")));
        };

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(AudioError::Decode(format!(
                            "decoder timed out after {timeout:?}"
                        )));
                    }
                    thread::sleep(WAIT_POLL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AudioError::Decode(format!(
                        "failed to wait for decoder: {e}"
                    )));
                }
            }
        }
    }
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode an audio file with the default decoder settings.
pub fn decode_audio<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
) -> Result<Vec<Vec<f32>>, AudioError> {
    AudioDecoder::new().decode(path, sample_rate)
}

type Drain = Option<JoinHandle<Vec<u8>>>;

fn drain_on_thread(pipe: Option<impl Read + Send + 'static>) -> Drain {
    pipe.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A read error ends the drain; truncated output surfaces as a
            // decode or shape error on the calling thread.
            let _ = stream.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drained(handle: Drain) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_a_decode_error() {
        // Fails either at spawn (no ffmpeg installed) or with a nonzero
        // exit status; both are decode errors and neither leaks a child.
        let err = decode_audio("/nonexistent/audio.wav", 16_000).unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn missing_binary_is_a_decode_error() {
        let decoder = AudioDecoder::new().with_ffmpeg("/nonexistent/ffmpeg");
        let err = decoder.decode("/tmp/whatever.wav", 16_000).unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    #[cfg(unix)]
    fn timeout_kills_a_stuck_decoder() {
        use std::os::unix::fs::PermissionsExt;

        // A decoder that ignores its arguments and hangs.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stuck-decoder");
        // exec so the kill reaches the sleeping process itself, not a
        // shell wrapping it; otherwise the orphan would hold the pipe open.
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let decoder = AudioDecoder::new()
            .with_ffmpeg(&script)
            .with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let err = decoder.decode("/dev/null", 16_000).unwrap_err();
        assert!(matches!(err, AudioError::Decode(msg) if msg.contains("timed out")));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
