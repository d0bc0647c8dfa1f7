//! Progress reporting for plan generation
//!
//! Maps each plan status to the stage number, model label and message shown
//! in the client progress UI, and carries live status transitions from the
//! orchestrator to the stream that spawned it.

use planstore::PlanStatus;
use tokio::sync::mpsc;

/// Error message sent when a stream gives up waiting
pub const TIMEOUT_MESSAGE: &str = "Timeout: a geração excedeu o tempo máximo.";

/// Error message sent when the plan id does not exist
pub const NOT_FOUND_MESSAGE: &str = "Plano não encontrado.";

/// What the progress UI shows for one plan status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    /// Stage number (0 on failure, 1-5 through the pipeline)
    pub etapa: u8,
    /// Model label shown to the user, empty when not model-specific
    pub modelo: &'static str,
    /// Progress message in Portuguese
    pub mensagem: &'static str,
}

/// Sent once when the stream opens, before the first status read
pub const CONNECTING: StatusMessage = StatusMessage {
    etapa: 0,
    modelo: "",
    mensagem: "A ligar ao servidor...",
};

/// Get the progress message for a plan status
pub fn status_message(status: PlanStatus) -> StatusMessage {
    match status {
        PlanStatus::Pending => StatusMessage {
            etapa: 1,
            modelo: "",
            mensagem: "A preparar o teu plano...",
        },
        PlanStatus::Analysing => StatusMessage {
            etapa: 2,
            modelo: "GPT-4o",
            mensagem: "O analista está a pesquisar o teu setor e concorrência...",
        },
        PlanStatus::Generating => StatusMessage {
            etapa: 3,
            modelo: "Claude",
            mensagem: "O estratega está a construir o teu plano de marketing...",
        },
        PlanStatus::Reviewing => StatusMessage {
            etapa: 4,
            modelo: "GPT-4o",
            mensagem: "O revisor está a verificar a qualidade e coerência...",
        },
        PlanStatus::Finalising => StatusMessage {
            etapa: 5,
            modelo: "Claude",
            mensagem: "A finalizar e polir o teu plano...",
        },
        PlanStatus::Completed => StatusMessage {
            etapa: 5,
            modelo: "",
            mensagem: "Plano concluído!",
        },
        PlanStatus::Failed => StatusMessage {
            etapa: 0,
            modelo: "",
            mensagem: "Ocorreu um erro. Por favor tenta novamente.",
        },
    }
}

/// Pushes status transitions from a running pipeline to its stream
///
/// Cheap to clone. Sending never blocks and never fails the pipeline: when
/// the client disconnected and the receiver is gone, emits are dropped while
/// the run continues to completion.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<PlanStatus>,
}

impl ProgressSender {
    /// Emit a status transition
    pub fn emit(&self, status: PlanStatus) {
        let _ = self.tx.send(status);
    }
}

/// Create a progress channel pair
pub fn progress_channel() -> (ProgressSender, mpsc::UnboundedReceiver<PlanStatus>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_table() {
        assert_eq!(status_message(PlanStatus::Pending).etapa, 1);
        assert_eq!(status_message(PlanStatus::Analysing).etapa, 2);
        assert_eq!(status_message(PlanStatus::Analysing).modelo, "GPT-4o");
        assert_eq!(status_message(PlanStatus::Generating).etapa, 3);
        assert_eq!(status_message(PlanStatus::Generating).modelo, "Claude");
        assert_eq!(status_message(PlanStatus::Reviewing).etapa, 4);
        assert_eq!(status_message(PlanStatus::Finalising).etapa, 5);
        assert_eq!(status_message(PlanStatus::Completed).etapa, 5);
        assert_eq!(status_message(PlanStatus::Completed).mensagem, "Plano concluído!");
        assert_eq!(status_message(PlanStatus::Failed).etapa, 0);
    }

    #[test]
    fn test_connecting_message() {
        assert_eq!(CONNECTING.etapa, 0);
        assert_eq!(CONNECTING.mensagem, "A ligar ao servidor...");
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let (sender, mut rx) = progress_channel();
        sender.emit(PlanStatus::Analysing);
        sender.emit(PlanStatus::Generating);

        assert_eq!(rx.recv().await, Some(PlanStatus::Analysing));
        assert_eq!(rx.recv().await, Some(PlanStatus::Generating));
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sender, rx) = progress_channel();
        drop(rx);
        sender.emit(PlanStatus::Completed);
    }
}
