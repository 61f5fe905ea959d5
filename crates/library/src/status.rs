use tokio::sync::mpsc::UnboundedSender;

/// A user-visible progress or failure message.
///
/// These are for the on-screen status display, separate from the diagnostic
/// log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub body: String,
    /// Percentage complete, if the message is about a measurable step.
    pub progress: Option<u8>,
}

/// Where status messages go. Sending never fails: a closed or missing
/// receiver just means nobody is watching.
#[derive(Debug, Clone, Default)]
pub struct Status(Option<UnboundedSender<StatusMessage>>);
impl Status {
    pub fn new(sender: UnboundedSender<StatusMessage>) -> Self {
        Self(Some(sender))
    }

    /// Status messages are discarded.
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn message(&self, body: impl Into<String>) {
        self.send(StatusMessage { body: body.into(), progress: None });
    }

    pub fn progress(&self, body: impl Into<String>, done: usize, total: usize) {
        let percent = (done.min(total) * 100).checked_div(total).unwrap_or(100);
        let progress = u8::try_from(percent).ok();
        self.send(StatusMessage { body: body.into(), progress });
    }

    fn send(&self, message: StatusMessage) {
        if let Some(sender) = &self.0 {
            _ = sender.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_messages_are_delivered() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let status = Status::new(sender);
        status.message("Hello");
        status.progress("Working", 1, 4);
        status.progress("Nothing to do", 0, 0);
        assert_eq!(receiver.try_recv().unwrap(), StatusMessage { body: "Hello".into(), progress: None });
        assert_eq!(receiver.try_recv().unwrap().progress, Some(25));
        assert_eq!(receiver.try_recv().unwrap().progress, Some(100));
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        Status::new(sender).message("Anyone there?");
        Status::disabled().message("Nobody");
    }
}
