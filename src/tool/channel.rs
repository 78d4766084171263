/// Requests a tool may send to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolMessage {
    /// Redraw only
    Invalidate,
    /// Commit a history snapshot of the selected layer now
    SaveHistory,
    /// Recompute the composite cache now
    CacheLayers,
}

/// Queue of [`ToolMessage`]s. The engine drains it after every tool callback
/// and performs each request, in order, before returning to the host.
#[derive(Debug, Default)]
pub struct MessageChannel {
    queue: Vec<ToolMessage>,
}

impl MessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, message: ToolMessage) {
        self.queue.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Takes every pending message, oldest first
    pub fn drain(&mut self) -> Vec<ToolMessage> {
        std::mem::take(&mut self.queue)
    }
}
