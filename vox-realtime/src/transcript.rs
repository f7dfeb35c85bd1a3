//! Per-turn transcript bookkeeping.
//!
//! Partials append to their direction's buffer. A completed turn emits a
//! final update and empties both buffers; an interruption empties only the
//! model's buffer, since what the user said is still valid.

/// A consolidated transcript snapshot handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscriptUpdate {
    /// Text the user has said this turn.
    pub input: String,
    /// Text the model has said this turn.
    pub output: String,
    /// Whether this closes the turn.
    pub is_final: bool,
}

/// Running input and output text for the current turn.
#[derive(Debug, Clone, Default)]
pub struct TranscriptAccumulator {
    input: String,
    output: String,
}

impl TranscriptAccumulator {
    /// Create empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user-speech fragment and return the running snapshot.
    pub fn append_input(&mut self, text: &str) -> TranscriptUpdate {
        self.input.push_str(text);
        self.snapshot(false)
    }

    /// Append a model-speech fragment and return the running snapshot.
    pub fn append_output(&mut self, text: &str) -> TranscriptUpdate {
        self.output.push_str(text);
        self.snapshot(false)
    }

    /// Close the turn: return the final snapshot and empty both buffers.
    pub fn complete_turn(&mut self) -> TranscriptUpdate {
        TranscriptUpdate {
            input: std::mem::take(&mut self.input),
            output: std::mem::take(&mut self.output),
            is_final: true,
        }
    }

    /// Drop the model's partial speech; keep the user's.
    pub fn interrupt(&mut self) {
        self.output.clear();
    }

    /// Empty both buffers without emitting anything.
    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
    }

    /// Current user text.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Current model text.
    pub fn output(&self) -> &str {
        &self.output
    }

    fn snapshot(&self, is_final: bool) -> TranscriptUpdate {
        TranscriptUpdate { input: self.input.clone(), output: self.output.clone(), is_final }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partials_accumulate_in_order() {
        let mut acc = TranscriptAccumulator::new();
        acc.append_input("Draw ");
        let update = acc.append_input("a cat");
        assert_eq!(update.input, "Draw a cat");
        assert_eq!(update.output, "");
        assert!(!update.is_final);

        let update = acc.append_output("Sure");
        assert_eq!(update.input, "Draw a cat");
        assert_eq!(update.output, "Sure");
    }

    #[test]
    fn test_turn_complete_emits_final_and_resets() {
        let mut acc = TranscriptAccumulator::new();
        acc.append_input("hello");
        acc.append_output("hi ");
        acc.append_output("there");

        let update = acc.complete_turn();
        assert_eq!(
            update,
            TranscriptUpdate {
                input: "hello".to_string(),
                output: "hi there".to_string(),
                is_final: true
            }
        );
        assert_eq!(acc.input(), "");
        assert_eq!(acc.output(), "");
    }

    #[test]
    fn test_interrupt_clears_output_only() {
        let mut acc = TranscriptAccumulator::new();
        acc.append_input("wait, stop");
        acc.append_output("Once upon a");
        acc.interrupt();

        assert_eq!(acc.input(), "wait, stop");
        assert_eq!(acc.output(), "");

        let update = acc.append_output("Okay.");
        assert_eq!(update.output, "Okay.");
        assert_eq!(update.input, "wait, stop");
    }

    #[test]
    fn test_empty_turn_complete() {
        let mut acc = TranscriptAccumulator::new();
        let update = acc.complete_turn();
        assert!(update.is_final);
        assert!(update.input.is_empty() && update.output.is_empty());
    }
}
