const SENTENCE_TERMINATORS: &[char] = &['.', '?', '!', ';', ':', '\n'];

/// Buffers incremental LLM content deltas and flushes complete sentences as
/// they appear. Each flush becomes one `stream_chunk` event
/// and, when the agent has a voice reference, one TTS job.
#[derive(Default)]
pub struct SentenceChunker {
    buffer: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a delta; returns any complete sentences ready to flush, in order.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let mut flushed = Vec::new();

        loop {
            let Some(pos) = self.buffer.find(SENTENCE_TERMINATORS) else { break };
            // All terminators are single-byte ASCII, so `pos + 1` is a valid char boundary.
            let byte_pos = pos + 1;
            let sentence: String = self.buffer.drain(..byte_pos).collect();
            if !sentence.trim().is_empty() {
                flushed.push(sentence);
            }
        }
        flushed
    }

    /// Flush whatever remains, even if it has no terminator — called when
    /// the stream ends or is cancelled.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_on_each_terminator() {
        let mut chunker = SentenceChunker::new();
        let flushed = chunker.push("Hello. How are you? ");
        assert_eq!(flushed, vec!["Hello.".to_string(), " How are you?".to_string()]);
    }

    #[test]
    fn holds_partial_sentence_until_terminator_arrives() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("Hello wor").is_empty());
        let flushed = chunker.push("ld.");
        assert_eq!(flushed, vec!["Hello world.".to_string()]);
    }

    #[test]
    fn finish_flushes_remaining_partial_text() {
        let mut chunker = SentenceChunker::new();
        chunker.push("no terminator yet");
        assert_eq!(chunker.finish(), Some("no terminator yet".to_string()));
        assert_eq!(chunker.finish(), None);
    }
}
