//! External landmark model driven over a pipe.
//!
//! The helper process (typically a MediaPipe script) prints `READY` once it
//! has loaded its model. For every frame it receives a 12-byte header
//! (width, height, channels as little-endian `u32`) followed by RGB pixels,
//! and answers with one JSON line:
//!
//! ```text
//! {"hands":[{"score":0.93,"landmarks":[{"x":0.5,"y":0.4,"z":0.0}, ...]}],"error":null}
//! ```

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::detect::backend::HandDetector;
use crate::frame::Frame;
use crate::landmark::{HandObservation, Point};

const READY_LINE: &str = "READY";

#[derive(Clone, Debug)]
pub struct SubprocessConfig {
    /// Program to run.
    pub command: String,
    pub args: Vec<String>,
    /// Hands scoring below this are dropped.
    pub min_confidence: f32,
}

#[derive(Deserialize, Debug)]
struct LandmarkJson {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

#[derive(Deserialize, Debug)]
struct HandJson {
    #[serde(default)]
    score: Option<f32>,
    landmarks: Vec<LandmarkJson>,
}

#[derive(Deserialize, Debug)]
struct ResponseJson {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

pub struct SubprocessBackend {
    config: SubprocessConfig,
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SubprocessBackend {
    /// Start the helper and wait for its ready line.
    pub fn spawn(config: SubprocessConfig) -> Result<Self> {
        if config.command.trim().is_empty() {
            bail!("subprocess detector requires a command");
        }
        log::info!("starting hand detector helper: {}", config.command);

        let mut process = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start detector helper {}", config.command))?;

        let stdin = process.stdin.take().context("detector helper has no stdin")?;
        let stdout = process.stdout.take().context("detector helper has no stdout")?;
        let mut backend = Self {
            config,
            process,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let ready = backend.read_line()?;
        if ready.trim() != READY_LINE {
            bail!("detector helper did not signal ready, got: {}", ready.trim());
        }
        log::info!("hand detector helper ready");
        Ok(backend)
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .context("read from detector helper")?;
        if read == 0 {
            bail!("detector helper exited");
        }
        Ok(line)
    }

    fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut header = [0u8; 12];
        header[..4].copy_from_slice(&frame.width.to_le_bytes());
        header[4..8].copy_from_slice(&frame.height.to_le_bytes());
        header[8..].copy_from_slice(&frame.channels().to_le_bytes());
        self.stdin.write_all(&header)?;
        self.stdin.write_all(frame.pixels())?;
        self.stdin.flush()?;
        Ok(())
    }
}

/// Convert one helper response into observations.
fn parse_response(line: &str, min_confidence: f32) -> Result<Vec<HandObservation>> {
    let response: ResponseJson = serde_json::from_str(line)
        .with_context(|| format!("invalid detector response: {}", line.trim()))?;
    if let Some(error) = response.error {
        return Err(anyhow!("detector helper error: {}", error));
    }

    let mut hands = Vec::with_capacity(response.hands.len());
    for hand in response.hands {
        if hand.score.is_some_and(|score| score < min_confidence) {
            continue;
        }
        let points: Vec<Point> = hand
            .landmarks
            .iter()
            .map(|lm| Point::new(lm.x, lm.y, lm.z))
            .collect();
        if points.iter().any(|p| !p.is_finite()) {
            log::warn!("detector reported non-finite landmarks; hand dropped");
            continue;
        }
        let observation = match HandObservation::from_points(&points) {
            Ok(observation) => observation,
            Err(err) => {
                log::warn!("{}; hand dropped", err);
                continue;
            }
        };
        hands.push(match hand.score {
            Some(score) => observation.with_score(score),
            None => observation,
        });
    }
    Ok(hands)
}

impl HandDetector for SubprocessBackend {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>> {
        self.send_frame(frame).context("write frame to detector helper")?;
        let line = self.read_line()?;
        parse_response(&line, self.config.min_confidence)
    }
}

impl Drop for SubprocessBackend {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_json(score: f32, count: usize) -> String {
        let landmarks: Vec<String> = (0..count)
            .map(|i| format!(r#"{{"x":{},"y":0.5,"z":0.0}}"#, i as f32 * 0.01))
            .collect();
        format!(
            r#"{{"score":{},"landmarks":[{}]}}"#,
            score,
            landmarks.join(",")
        )
    }

    #[test]
    fn parses_hands_above_confidence() -> Result<()> {
        let line = format!(
            r#"{{"hands":[{},{}]}}"#,
            hand_json(0.9, 21),
            hand_json(0.2, 21)
        );
        let hands = parse_response(&line, 0.5)?;
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].score, Some(0.9));
        assert!((hands[0].points()[3].x - 0.03).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn drops_hands_with_wrong_landmark_count() -> Result<()> {
        let line = format!(r#"{{"hands":[{}]}}"#, hand_json(0.9, 20));
        assert!(parse_response(&line, 0.5)?.is_empty());
        Ok(())
    }

    #[test]
    fn helper_errors_and_garbage_are_failures() {
        assert!(parse_response(r#"{"hands":[],"error":"model crashed"}"#, 0.5).is_err());
        assert!(parse_response("not json", 0.5).is_err());
    }

    #[test]
    fn empty_response_means_no_hands() -> Result<()> {
        assert!(parse_response(r#"{"hands":[]}"#, 0.5)?.is_empty());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn helper_round_trip_over_pipes() -> Result<()> {
        // Shell helper: announce readiness, then answer each frame with no hands.
        let config = SubprocessConfig {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"echo READY; while head -c 24 >/dev/null; do echo '{"hands":[]}'; done"#
                    .to_string(),
            ],
            min_confidence: 0.5,
        };
        let mut backend = SubprocessBackend::spawn(config)?;
        let frame = Frame::blank(2, 2, 1)?;
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_command_is_rejected() {
        let config = SubprocessConfig {
            command: " ".to_string(),
            args: Vec::new(),
            min_confidence: 0.5,
        };
        assert!(SubprocessBackend::spawn(config).is_err());
    }
}
