use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Notice {
    text: String,
    expires_at: Instant,
}

/// Holds at most one user-facing message. Each `raise` replaces the previous
/// message and restarts the expiry window.
#[derive(Debug)]
pub struct TransientNotifier {
    ttl: Duration,
    notice: Option<Notice>,
}

impl TransientNotifier {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, notice: None }
    }

    pub fn raise(&mut self, text: impl Into<String>, now: Instant) {
        self.notice = Some(Notice {
            text: text.into(),
            expires_at: now + self.ttl,
        });
    }

    pub fn current(&self, now: Instant) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|notice| now < notice.expires_at)
            .map(|notice| notice.text.as_str())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.notice.as_ref().map(|notice| notice.expires_at)
    }

    /// Clears the message once its window has passed. Returns true if a
    /// message was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.notice = None;
                true
            }
            _ => false,
        }
    }
}
