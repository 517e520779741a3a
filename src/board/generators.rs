use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::task::{BoardSummary, Task};
use crate::cache::{GenerationError, Generator};
use crate::constants::MOOD_MESSAGE_MAX_WORDS;
use crate::models::{CompletionOptions, CompletionRequest, Model};

/// Executive summary of the board, as plain text
pub struct InsightGenerator {
    model: Arc<dyn Model>,
    options: CompletionOptions,
}

impl InsightGenerator {
    pub fn new(model: Arc<dyn Model>, options: CompletionOptions) -> Self {
        Self { model, options }
    }
}

pub fn insight_prompt(tasks: &[Task]) -> String {
    let board: Vec<String> = tasks
        .iter()
        .map(|t| format!("- [{}] {} ({})", t.status, t.title, t.tags.join(", ")))
        .collect();

    format!(
        "You are an elite productivity coach. Analyze the following project board state:\n\n\
        {}\n\n\
        Provide a 3-sentence executive summary.\n\
        1. Identify the biggest bottleneck or focus area.\n\
        2. Comment on the balance of the workload.\n\
        3. Suggest the next best move.\n\n\
        Use simple, direct English without jargon. \
        Reply in plain text with no markdown formatting.",
        board.join("\n")
    )
}

#[async_trait]
impl Generator<Task, String> for InsightGenerator {
    async fn generate(&self, tasks: &[Task]) -> anyhow::Result<String> {
        let request = CompletionRequest::prompt(insight_prompt(tasks), self.options);
        let response = self.model.complete(&request).await?;
        debug!("Insight generated by {}", response.model_name);

        let text = response.content.trim();
        if text.is_empty() {
            return Err(GenerationError::Malformed("empty insight".to_string()).into());
        }
        Ok(text.to_string())
    }
}

/// Tone of the dashboard greeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Strict,
    Funny,
    Motivational,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mood::Strict => "strict",
            Mood::Funny => "funny",
            Mood::Motivational => "motivational",
        };
        f.write_str(label)
    }
}

/// Short message addressed to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodMessage {
    pub message: String,
    pub mood: Mood,
}

/// Mood the greeting should take for a board
pub fn mood_for(summary: &BoardSummary) -> Mood {
    if summary.overdue > 0 {
        Mood::Strict
    } else if summary.done * 2 > summary.total {
        Mood::Funny
    } else {
        Mood::Motivational
    }
}

pub fn mood_prompt(summary: &BoardSummary) -> String {
    let tone = match mood_for(summary) {
        Mood::Strict => "Be STRICT and URGENT. Scold the user slightly for missing deadlines.",
        Mood::Funny => "Be FUNNY and CELEBRATORY. Crack a joke about how productive they are.",
        Mood::Motivational => "Be MOTIVATIONAL and stoic.",
    };

    format!(
        "User has {} tasks. {} are overdue. {} are completed.\n\
        {}\n\
        Write a short, punchy message (max {} words) directly to the user.\n\
        Return JSON: {{ \"message\": \"string\", \"mood\": \"strict\" | \"funny\" | \"motivational\" }}",
        summary.total, summary.overdue, summary.done, tone, MOOD_MESSAGE_MAX_WORDS
    )
}

/// Parse the model's JSON answer, tolerating a surrounding code fence
pub fn parse_mood_message(raw: &str) -> Result<MoodMessage, GenerationError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => return Err(GenerationError::Malformed("no JSON object in reply".to_string())),
    };

    let parsed: MoodMessage =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    if parsed.message.trim().is_empty() {
        return Err(GenerationError::Malformed("empty mood message".to_string()));
    }
    Ok(parsed)
}

/// Greeting whose tone follows the board's state
pub struct MoodMessageGenerator {
    model: Arc<dyn Model>,
    options: CompletionOptions,
}

impl MoodMessageGenerator {
    pub fn new(model: Arc<dyn Model>, options: CompletionOptions) -> Self {
        Self { model, options }
    }
}

#[async_trait]
impl Generator<Task, MoodMessage> for MoodMessageGenerator {
    async fn generate(&self, tasks: &[Task]) -> anyhow::Result<MoodMessage> {
        let summary = BoardSummary::of(tasks, Local::now().naive_local());
        let request =
            CompletionRequest::prompt(mood_prompt(&summary), self.options).expecting_json();
        let response = self.model.complete(&request).await?;
        Ok(parse_mood_message(&response.content)?)
    }
}
