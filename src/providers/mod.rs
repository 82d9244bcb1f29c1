//! Capability providers served over the envelope protocol.

pub mod extraction;
pub mod notification;
pub mod review;

pub use extraction::{ExtractionProvider, LocalJsonExtractor, VisionExtractor};
pub use notification::{LogNotifier, NotificationProvider, Notifier, SmtpNotifier};
pub use review::ReviewProvider;
