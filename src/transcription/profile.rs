//! Named transcriber configurations and their command lines.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    /// `transcribe` or `translate`.
    pub task: String,
    /// e.g. `whisper`, `whispercpp`, `fasterwhisper`.
    pub model_type: String,
    /// e.g. `tiny`, `base`, `small`, `medium`, `large`.
    pub model_size: String,
    /// Language code; unset lets the transcriber detect it.
    pub language: Option<String>,
    pub output_txt: bool,
    pub output_srt: bool,
    pub output_vtt: bool,
    pub word_timestamps: bool,
    /// Appended verbatim (split on whitespace) before the input path.
    pub extra_args: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            task: "transcribe".to_string(),
            model_type: "whisper".to_string(),
            model_size: "tiny".to_string(),
            language: None,
            output_txt: true,
            output_srt: false,
            output_vtt: false,
            word_timestamps: false,
            extra_args: None,
        }
    }
}

/// Lowercases and collapses every run of characters outside `[a-z0-9-]` into `-`.
fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut in_gap = false;
    for c in raw.trim().to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            slug.push(c);
            in_gap = false;
        } else if !in_gap {
            slug.push('-');
            in_gap = true;
        }
    }
    slug.trim_matches('-').to_string()
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

impl Profile {
    /// File-name safe id used to namespace this profile's outputs.
    pub fn identifier(&self) -> String {
        let from_name = slugify(&self.name);
        if !from_name.is_empty() {
            return from_name;
        }
        let fallback = slugify(&format!(
            "{}-{}-{}",
            self.task, self.model_type, self.model_size
        ));
        if fallback.is_empty() {
            "profile".to_string()
        } else {
            fallback
        }
    }

    /// `add [--task T] [--model-type M] [--model-size S] [--language L]
    /// [--txt] [--srt] [--vtt] [--word-timestamps] <extra args> <input>`
    pub fn build_arguments(&self, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["add".into()];

        let mut push_option = |flag: &str, value: &str| {
            if let Some(value) = non_blank(value) {
                args.push(flag.into());
                args.push(value.into());
            }
        };
        push_option("--task", &self.task);
        push_option("--model-type", &self.model_type);
        push_option("--model-size", &self.model_size);
        push_option("--language", self.language.as_deref().unwrap_or(""));

        for (enabled, flag) in [
            (self.output_txt, "--txt"),
            (self.output_srt, "--srt"),
            (self.output_vtt, "--vtt"),
            (self.word_timestamps, "--word-timestamps"),
        ] {
            if enabled {
                args.push(flag.into());
            }
        }

        if let Some(extra) = &self.extra_args {
            args.extend(extra.split_whitespace().map(OsString::from));
        }

        args.push(input.as_os_str().to_owned());
        args
    }
}
