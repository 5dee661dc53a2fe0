//! Chapter timestamp generation job
//!
//! Providers answer either `{"timestamps": ["00:00 Intro", ...]}`,
//! `{"timestamps": "00:00 Intro\n..."}` or a bare newline-separated string.
//! Every `M:S` pair is normalised to `MM:SS` before the lines are split into
//! `{time, title}` entries.

use super::VideoContext;
use crate::fallback::FallbackChain;
use crate::job::JobOutput;
use crate::provider::GenerationRequest;
use anyhow::Context;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, OnceLock};

/// Job name
pub const JOB_NAME: &str = "timestamps";

/// Upper bound for the minutes field
pub const MAX_MINUTES: u32 = 999;

pub(crate) const INSTRUCTIONS: &str = "You create YouTube chapter timestamps. \
Respond with a JSON object {\"timestamps\": [\"MM:SS Topic\", ...]} starting at 00:00.";

/// One chapter marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// `MM:SS`
    pub time: String,
    /// Chapter title
    pub title: String,
}

/// Accepted provider output shapes
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimestampsOutput {
    /// Object with a `timestamps` field
    Object {
        /// List or newline-separated text
        timestamps: TimestampLines,
    },
    /// Bare text
    Text(String),
}

/// `timestamps` field contents
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimestampLines {
    /// One entry per line
    List(Vec<String>),
    /// Newline-separated text
    Text(String),
}

impl TimestampsOutput {
    /// Flatten into raw lines
    pub fn into_lines(self) -> Vec<String> {
        let text = match self {
            Self::Object {
                timestamps: TimestampLines::List(lines),
            } => return lines,
            Self::Object {
                timestamps: TimestampLines::Text(text),
            }
            | Self::Text(text) => text,
        };
        text.lines().map(str::to_string).collect()
    }
}

fn clock_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{1,2}):(\d{1,2})").expect("valid timestamp regex"))
}

/// Rewrite every `M:S` pair as `MM:SS`, carrying seconds over 59 into minutes
pub fn normalize_clock(text: &str) -> String {
    clock_pattern()
        .replace_all(text, |caps: &Captures| {
            let mut minutes: u32 = caps[1].parse().unwrap_or(0);
            let mut seconds: u32 = caps[2].parse().unwrap_or(0);
            if seconds >= 60 {
                minutes += seconds / 60;
                seconds %= 60;
            }
            format!("{:02}:{:02}", minutes.min(MAX_MINUTES), seconds)
        })
        .into_owned()
}

/// Normalise and split lines into entries; lines without a title are dropped
pub fn parse_lines<I, S>(lines: I) -> Vec<Timestamp>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let line = normalize_clock(line.as_ref().trim());
            let (time, title) = line.split_once(' ')?;
            let title = title.trim();
            (!title.is_empty()).then(|| Timestamp {
                time: time.trim().to_string(),
                title: title.to_string(),
            })
        })
        .collect()
}

/// Request sent to the text providers
pub fn request(ctx: &VideoContext) -> GenerationRequest {
    GenerationRequest::new(
        INSTRUCTIONS,
        format!("Create chapter timestamps for the following transcript: {}", ctx.transcript()),
    )
    .with_temperature(0.3)
}

/// Generate timestamps through the text chain
pub async fn generate(chain: FallbackChain, ctx: Arc<VideoContext>) -> anyhow::Result<JobOutput> {
    let success = chain
        .run_as::<TimestampsOutput>(&request(&ctx))
        .await
        .context("Timestamps generation failed")?;

    let timestamps = parse_lines(success.output.into_lines());
    anyhow::ensure!(
        !timestamps.is_empty(),
        "Timestamps generation failed: {} returned no usable lines",
        success.provider
    );

    let text = timestamps
        .iter()
        .map(|t| format!("{} {}", t.time, t.title))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(JobOutput::succeeded(format!("Generated {} timestamps", timestamps.len())).with_payload(json!({
        "timestamps": timestamps,
        "text": text,
        "provider": success.provider,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_overflowing_seconds() {
        assert_eq!(normalize_clock("1:75 Setup"), "02:15 Setup");
        assert_eq!(normalize_clock("0:5 Intro"), "00:05 Intro");
    }

    #[test]
    fn carries_into_three_digit_minutes() {
        assert_eq!(normalize_clock("99:99 Outro"), "100:39 Outro");
    }

    #[test]
    fn parses_lines_and_drops_untitled_entries() {
        let parsed = parse_lines(["00:00 Introduction", "", "1:30   Main topic ", "03:45"]);
        assert_eq!(
            parsed,
            vec![
                Timestamp {
                    time: "00:00".into(),
                    title: "Introduction".into()
                },
                Timestamp {
                    time: "01:30".into(),
                    title: "Main topic".into()
                },
            ]
        );
    }

    #[test]
    fn accepts_every_output_shape() {
        let list: TimestampsOutput = serde_json::from_value(json!({ "timestamps": ["00:00 A", "01:00 B"] })).unwrap();
        let text: TimestampsOutput = serde_json::from_value(json!({ "timestamps": "00:00 A\n01:00 B" })).unwrap();
        let bare: TimestampsOutput = serde_json::from_value(json!("00:00 A\n01:00 B")).unwrap();

        for output in [list, text, bare] {
            assert_eq!(parse_lines(output.into_lines()).len(), 2);
        }
    }

    #[test]
    fn rejects_unrelated_shapes() {
        assert!(serde_json::from_value::<TimestampsOutput>(json!({ "chapters": 3 })).is_err());
    }
}
