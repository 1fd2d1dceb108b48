//! Text completion request/response types exchanged with inference backends

use serde::{Deserialize, Serialize};

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }
}

/// Reason why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Reached max tokens limit
    Length,
    /// Hit a stop sequence or EOS token
    #[default]
    Stop,
    /// Content was filtered by the server
    ContentFilter,
}

/// Sampling parameters for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Repetition penalty (1.0 = none)
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,

    /// Sequences that stop generation
    #[serde(default)]
    pub stop_sequences: Vec<String>,

    /// Random seed for reproducibility (None = random)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_tokens() -> u32 { 300 }
fn default_temperature() -> f32 { 0.8 }
fn default_top_p() -> f32 { 0.95 }
fn default_repetition_penalty() -> f32 { 1.15 }

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
            stop_sequences: Vec::new(),
            seed: None,
        }
    }
}

/// Input for a single text completion on one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCompletionInput {
    /// Fully rendered prompt (chat template already applied)
    pub prompt: String,

    #[serde(flatten)]
    pub params: GenerationParams,
}

/// Output of a single text completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCompletionOutput {
    /// The generated text, excluding the prompt where the backend supports it
    pub text: String,

    pub finish_reason: FinishReason,

    pub usage: TokenUsage,

    /// Wall-clock generation time in milliseconds
    #[serde(default)]
    pub generation_time_ms: u64,
}
