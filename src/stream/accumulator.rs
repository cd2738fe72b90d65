/// Running text of the assistant message being streamed
///
/// Deltas are appended in arrival order, each exactly once.
#[derive(Debug, Default, Clone)]
pub struct PartialContentAccumulator {
    text: String,
    deltas: usize,
}

impl PartialContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) {
        self.text.push_str(delta);
        self.deltas += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of deltas applied, empty ones included
    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.deltas = 0;
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
