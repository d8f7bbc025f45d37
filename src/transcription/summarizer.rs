use anyhow::Result;
use async_trait::async_trait;

/// Condenses a finished transcript into a short text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// An empty result means there is nothing worth writing.
    async fn summarize(&self, transcript: &str) -> Result<String>;
}

/// Keeps the opening of the transcript.
pub struct ExcerptSummarizer {
    max_chars: usize,
}

impl ExcerptSummarizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for ExcerptSummarizer {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl Summarizer for ExcerptSummarizer {
    fn name(&self) -> &'static str {
        "excerpt"
    }

    async fn summarize(&self, transcript: &str) -> Result<String> {
        if transcript.trim().is_empty() {
            return Ok(String::new());
        }

        let normalized = transcript.replace("\r\n", "\n");
        match normalized.char_indices().nth(self.max_chars) {
            Some((cut, _)) => Ok(format!("{}...", &normalized[..cut])),
            None => Ok(normalized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_short_transcript_kept_whole() {
        let summary = ExcerptSummarizer::new(100)
            .summarize("line one\r\nline two")
            .await
            .unwrap();
        assert_eq!(summary, "line one\nline two");
    }

    #[tokio::test]
    async fn test_long_transcript_truncated_on_char_boundary() {
        let summary = ExcerptSummarizer::new(3)
            .summarize("會議紀錄開始")
            .await
            .unwrap();
        assert_eq!(summary, "會議紀...");
    }

    #[tokio::test]
    async fn test_blank_transcript_yields_nothing() {
        let summary = ExcerptSummarizer::default().summarize("  \n").await.unwrap();
        assert!(summary.is_empty());
    }
}
