//! `mailroom-dispatch` — domain model of the document dispatch engine.
//!
//! A dispatch **job** forwards a set of archived documents to an external
//! intake mailbox, either one email per document or batched into size/count
//! bounded multi-attachment emails. This crate holds the pure domain side:
//! the Job/Item/Email records and their state machines, the frozen settings
//! snapshot, the batching algorithm, template rendering, and the collaborator
//! ports (document store, mailer, audit log). Persistence and the chunked
//! execution engine live in `mailroom-infra`.

pub mod batching;
pub mod doubles;
pub mod email;
pub mod item;
pub mod job;
pub mod ports;
pub mod settings;
pub mod template;

pub use email::{Email, EmailStatus};
pub use item::{Item, ItemStatus};
pub use job::{Job, JobMode, JobStatus, SourceSelector};
pub use ports::{
    Attachment, AuditEvent, AuditLog, DocumentMeta, DocumentStore, DocumentStoreError, Mailer,
    MailerError, SendReceipt, SettingsProvider,
};
pub use settings::{DispatchSettings, SettingsSnapshot};
