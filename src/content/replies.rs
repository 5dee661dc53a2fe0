//! Comment reply generation
//!
//! One text chain run drafts a reply for every comment in a batch. A provider
//! answering with fewer replies than comments counts as a failed attempt, so
//! the chain moves on to the next provider.

use super::truncate_chars;
use crate::error::{Error, Result};
use crate::fallback::FallbackChain;
use crate::provider::GenerationRequest;
use serde::{Deserialize, Serialize};

/// Longest reply kept
pub const MAX_REPLY_CHARS: usize = 300;

pub(crate) const INSTRUCTIONS: &str = "You are a YouTube community manager drafting replies to viewer comments. \
Write one warm, specific reply per comment, in the order given, each at most 300 characters. \
Address the commenter's point or question and use emojis sparingly. \
Respond with a JSON object {\"replies\": [{\"reply_text\": string, \"confidence\": number}]}.";

/// A viewer comment to answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment identifier
    pub comment_id: String,
    /// Comment text
    pub comment_text: String,
    /// Display name of the author
    #[serde(default)]
    pub author_name: Option<String>,
}

impl Comment {
    /// Create a comment without author
    pub fn new(comment_id: impl Into<String>, comment_text: impl Into<String>) -> Self {
        Self {
            comment_id: comment_id.into(),
            comment_text: comment_text.into(),
            author_name: None,
        }
    }
}

/// Structured provider output
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyOutput {
    /// Drafted replies, in comment order
    pub replies: Vec<ReplyDraft>,
}

/// One drafted reply, bare text or with a confidence score
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplyDraft {
    /// Reply text only
    Text(String),
    /// Reply text with metadata
    Detailed {
        /// Reply text
        #[serde(alias = "reply")]
        reply_text: String,
        /// Model confidence between 0 and 1
        #[serde(default)]
        confidence: Option<f32>,
    },
}

impl ReplyDraft {
    fn into_parts(self) -> (String, Option<f32>) {
        match self {
            Self::Text(text) => (text, None),
            Self::Detailed { reply_text, confidence } => (reply_text, confidence.map(|c| c.clamp(0.0, 1.0))),
        }
    }
}

/// Reply paired with the comment it answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReply {
    /// Comment identifier
    pub comment_id: String,
    /// Comment text
    pub comment_text: String,
    /// Author of the comment
    pub author_name: Option<String>,
    /// Reply text, at most [`MAX_REPLY_CHARS`] characters
    pub reply: String,
    /// Model confidence, when reported
    pub confidence: Option<f32>,
}

/// Request sent to the text providers
pub fn request(comments: &[Comment]) -> GenerationRequest {
    let listed: Vec<String> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c.comment_text.trim()))
        .collect();
    GenerationRequest::new(
        INSTRUCTIONS,
        format!("Comments to reply to:\n{}", listed.join("\n")),
    )
    .with_temperature(0.7)
}

fn parse(value: serde_json::Value, expected: usize) -> Result<ReplyOutput> {
    let output: ReplyOutput = serde_json::from_value(value)?;
    if output.replies.len() < expected {
        return Err(Error::invalid_input(format!(
            "expected {expected} replies, got {}",
            output.replies.len()
        )));
    }
    Ok(output)
}

/// Draft one reply per comment through the text chain
pub async fn generate(chain: &FallbackChain, comments: &[Comment]) -> Result<Vec<GeneratedReply>> {
    if comments.is_empty() {
        return Err(Error::invalid_input("comments must be provided"));
    }
    tracing::info!(comments = comments.len(), "Generating comment replies");

    let success = chain
        .run_parsed(&request(comments), |value| parse(value, comments.len()))
        .await?;

    let replies = comments
        .iter()
        .zip(success.output.replies)
        .map(|(comment, draft)| {
            let (text, confidence) = draft.into_parts();
            GeneratedReply {
                comment_id: comment.comment_id.clone(),
                comment_text: comment.comment_text.clone(),
                author_name: comment.author_name.clone(),
                reply: truncate_chars(text.trim(), MAX_REPLY_CHARS).trim_end().to_string(),
                confidence,
            }
        })
        .collect();

    tracing::info!(provider = %success.provider, "Comment replies generated");
    Ok(replies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FnProvider;
    use serde_json::json;
    use std::time::Duration;

    fn comments() -> Vec<Comment> {
        vec![
            Comment::new("c1", "Great explanation of lifetimes!"),
            Comment::new("c2", "Can you cover async next?"),
            Comment::new("c3", "The audio was a bit quiet."),
        ]
    }

    #[tokio::test]
    async fn one_bounded_reply_per_comment() {
        let chain = FallbackChain::new(vec![FnProvider::new("primary", |_req| async {
            Ok(json!({
                "replies": [
                    { "reply_text": "Thanks so much! 🙌", "confidence": 0.9 },
                    "Async is next on the list, stay tuned!",
                    { "reply_text": "x".repeat(450), "confidence": 1.7 },
                ]
            }))
        })
        .shared()])
        .unwrap();

        let replies = generate(&chain, &comments()).await.unwrap();

        assert_eq!(replies.len(), 3);
        assert!(replies.iter().all(|r| r.reply.chars().count() <= MAX_REPLY_CHARS));
        let ids: Vec<&str> = replies.iter().map(|r| r.comment_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(replies[0].confidence, Some(0.9));
        assert_eq!(replies[1].confidence, None);
        assert_eq!(replies[2].reply.chars().count(), MAX_REPLY_CHARS);
        assert_eq!(replies[2].confidence, Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn short_answer_falls_through_to_next_provider() {
        let chain = FallbackChain::new(vec![
            FnProvider::new("terse", |_req| async { Ok(json!({ "replies": ["only one"] })) }).shared(),
            FnProvider::new("complete", |_req| async { Ok(json!({ "replies": ["a", "b", "c"] })) }).shared(),
        ])
        .unwrap()
        .with_delay(Duration::from_millis(10));

        let replies = generate(&chain, &comments()).await.unwrap();
        let texts: Vec<&str> = replies.iter().map(|r| r.reply.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let chain = FallbackChain::new(vec![FnProvider::new("unused", |_req| async { Ok(json!({})) }).shared()]).unwrap();
        assert!(matches!(generate(&chain, &[]).await, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn request_lists_comments_in_order() {
        let req = request(&comments());
        assert!(req.prompt.contains("1. Great explanation"));
        assert!(req.prompt.contains("3. The audio"));
        assert_eq!(req.temperature, Some(0.7));
    }
}
