//! Metric and tag names shared with dashboards and alerting rules

pub const ACTOR_CREATED: &str = "actor.lifecycle.created";
pub const ACTOR_TERMINATED: &str = "actor.lifecycle.terminated";
pub const ACTOR_ACTIVE: &str = "actor.lifecycle.active";

pub const MAILBOX_SIZE: &str = "actor.mailbox.size";
pub const MAILBOX_TIME: &str = "actor.mailbox.time";
pub const ENVELOPE_COPIES: &str = "actor.mailbox.envelope.copies";

pub const MESSAGE_PROCESSING: &str = "actor.message.processing";
pub const MESSAGE_ERRORS: &str = "actor.message.errors";
pub const MESSAGE_INFLIGHT: &str = "actor.message.inflight";

pub mod tags {
    pub const ACTOR_CLASS: &str = "actor_class";
    pub const MESSAGE_TYPE: &str = "message_type";
    pub const ERROR_TYPE: &str = "error_type";
}
