use tracing::info;

/// Outbound mail. Delivery is best-effort and never fails the request.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str);
}

/// Logs every message instead of sending it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, body: &str) {
        info!(to, subject, "Outgoing mail: {}", body);
    }
}

pub(crate) fn verification_body(code: &str) -> String {
    format!("Your verification code is {}", code)
}

pub(crate) fn reset_body(token: &str) -> String {
    format!("Your password reset token is {}", token)
}
