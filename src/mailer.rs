//! Outgoing mail. Delivery is fire-and-forget: a failed send is logged and
//! never fails the request that triggered it.

use std::{fmt, sync::Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub trait Mailer: Send + Sync + fmt::Debug {
    fn send(&self, mail: Mail);
}

/// Writes mail to the log instead of delivering it.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, mail: Mail) {
        log::info!("Mail to {}: {}\n{}", mail.to, mail.subject, mail.html);
    }
}

/// Keeps every mail in memory; lets callers inspect what would have been sent.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Mail>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<Mail> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, mail: Mail) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(mail),
            Err(poisoned) => poisoned.into_inner().push(mail),
        }
    }
}
