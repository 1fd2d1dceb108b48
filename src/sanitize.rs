//! Output sanitizer
//!
//! Strips template echoes and instruction artifacts from raw model output,
//! then bounds the result to a character budget.

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// Chat-template control tokens, including the neutralized `<im_start>` form
const MARKER_PATTERNS: &[&str] = &[r"<\|[^|>\n]{0,32}\|>", r"</?im_(?:start|end)>"];

/// Reasoning blocks, closed or left open at the end of output
const THINK_PATTERN: &str = r"<think>.*?(?:</think>|\z)";

/// Whole lines that only ever come from echoing our own prompt templates
const ECHO_LINE_PATTERNS: &[&str] = &[
    r"^(?:system|user|assistant)\s*:?$",
    r"^You are a social media user\b",
    r"^You are .{1,120}?\. Your communication style:",
    r"^Rules:$",
    r"^[-*•]\s*(?:Do NOT\b|Don't\b|Write in your own voice|Keep it conversational|Respond naturally to the post|Just write the (?:post|comment) content)",
    r"^Write a natural comment as\b",
];

/// Leading labels whose remainder is kept
const LINE_PREFIX_PATTERNS: &[&str] = &[
    r"^Write a (?:post|comment) about\s*:\s*",
    r"^(?:Post|Comment|Reply|Response|Topic|Answer|assistant|user)\s*:\s*",
];

/// Instruction phrases that leak into otherwise good output
const ARTIFACT_PATTERNS: &[&str] = &[
    r"No hashtags\.*",
    r"Keep it (?:under|short|brief)\b[^.!?\n]*[.!?]?",
    r"Use (?:at least \d+ )?emojis?\b\.?",
    r"Use internet slang\b\.?",
    r"Use sarcasm\b\.?",
    r"No passive voice\b\.?",
    r"Write a short comment\b[^.!?\n]*[.!?]?",
    r"\bInclude [^:.\n]{0,40}:",
    r"\bStory:",
    r"The story must be\b[^.!?\n]*[.!?]?",
    r"\bas an AI(?: language model)?\b[^.!?\n]*[.!?]?",
];

/// Bracketed stage directions and parenthesized instructions
const BRACKET_PATTERNS: &[&str] = &[r"\[[^\]\n]+\]", r"\([^)\n]*instructions?[^)\n]*\)"];

fn compile(pattern: &str, multi_line: bool, dot_all: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(multi_line)
        .dot_matches_new_line(dot_all)
        .build()
        .map_err(|e| Error::Internal(format!("invalid sanitizer pattern '{}': {}", pattern, e)))
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p, false, false)).collect()
}

/// Cleans raw model output
#[derive(Debug, Clone)]
pub struct Sanitizer {
    think: Regex,
    markers: Vec<Regex>,
    echo_lines: Vec<Regex>,
    line_prefixes: Vec<Regex>,
    artifacts: Vec<Regex>,
    brackets: Vec<Regex>,
    extra: Vec<Regex>,
    whitespace: Regex,
    min_length: usize,
}

impl Sanitizer {
    /// Build a sanitizer with additional removal patterns
    pub fn new(extra_patterns: &[String], min_length: usize) -> Result<Self> {
        let extra = extra_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    Error::config_field_invalid("sanitizer.extra_patterns", format!("'{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            think: compile(THINK_PATTERN, false, true)?,
            markers: compile_all(MARKER_PATTERNS)?,
            echo_lines: compile_all(ECHO_LINE_PATTERNS)?,
            line_prefixes: compile_all(LINE_PREFIX_PATTERNS)?,
            artifacts: compile_all(ARTIFACT_PATTERNS)?,
            brackets: compile_all(BRACKET_PATTERNS)?,
            extra,
            whitespace: compile(r"\s+", false, false)?,
            min_length,
        })
    }

    /// Clean `raw` and bound it to `max_length` characters
    ///
    /// Fails with [`Error::EmptyOutput`] when fewer than `min_length`
    /// characters survive.
    pub fn clean(&self, raw: &str, max_length: usize) -> Result<String> {
        let mut text = self.think.replace_all(raw, "").into_owned();
        for re in &self.markers {
            text = re.replace_all(&text, "").into_owned();
        }

        let kept: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !self.echo_lines.iter().any(|re| re.is_match(line)))
            .map(|line| {
                self.line_prefixes
                    .iter()
                    .fold(line.to_string(), |acc, re| re.replace(&acc, "").into_owned())
            })
            .collect();
        let mut text = kept.join(" ");

        for re in self.artifacts.iter().chain(&self.brackets).chain(&self.extra) {
            text = re.replace_all(&text, "").into_owned();
        }

        let text = self.whitespace.replace_all(&text, " ");
        let text = strip_wrapping_quotes(text.trim());
        let text = truncate(text, max_length);

        let chars = text.chars().count();
        if chars < self.min_length || chars == 0 {
            return Err(Error::EmptyOutput {
                chars,
                min: self.min_length,
            });
        }
        Ok(text)
    }
}

/// Remove matching quote pairs around the whole text
fn strip_wrapping_quotes(mut text: &str) -> &str {
    const PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('“', '”'), ('«', '»')];
    loop {
        let mut chars = text.chars();
        let (first, last) = match (chars.next(), chars.next_back()) {
            (Some(f), Some(l)) => (f, l),
            _ => return text,
        };
        if !PAIRS.iter().any(|&(open, close)| open == first && close == last) {
            return text;
        }
        text = text[first.len_utf8()..text.len() - last.len_utf8()].trim();
    }
}

/// Cut to at most `max` chars: sentence end if it keeps at least half, else
/// the last word boundary, else a hard cut
fn truncate(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }

    let sentence_end = (0..max).rev().find(|&i| {
        matches!(chars[i], '.' | '!' | '?') && chars.get(i + 1).map_or(true, |c| c.is_whitespace())
    });
    if let Some(i) = sentence_end {
        if i + 1 >= max / 2 {
            return chars[..=i].iter().collect();
        }
    }

    let cut = if chars[max].is_whitespace() {
        Some(max)
    } else {
        (1..max).rev().find(|&i| chars[i].is_whitespace())
    };
    let end = cut.unwrap_or(max);
    let head: String = chars[..end].iter().collect();
    let trimmed = head.trim_end();
    if trimmed.is_empty() {
        chars[..max].iter().collect()
    } else {
        trimmed.to_string()
    }
}
