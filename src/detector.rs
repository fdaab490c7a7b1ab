use tokio::sync::mpsc;

use crate::messages::AgentMessage;

/// Master election and discovery live outside the agent; the agent
/// only consumes `NewMasterDetected` / `NoMasterDetected` events. This
/// detector handles the statically-configured case: it announces the
/// configured endpoint once at startup. Swapping in a real discovery
/// backend means feeding the same two messages from somewhere else.
pub struct MasterDetector {
    master: Option<String>,
}

impl MasterDetector {
    pub fn new(master: Option<String>) -> Self {
        Self { master }
    }

    pub async fn run(self, tx: mpsc::Sender<AgentMessage>) {
        let message = match self.master {
            Some(pid) => AgentMessage::NewMasterDetected { pid },
            None => AgentMessage::NoMasterDetected,
        };
        if tx.send(message).await.is_err() {
            tracing::warn!("Agent queue closed before master announcement");
        }
    }
}
