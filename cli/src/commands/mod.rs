mod analyze;
mod chat;
mod helpers;
mod log;

pub(crate) use analyze::cmd_analyze;
pub(crate) use chat::cmd_chat;
pub(crate) use log::{cmd_history, cmd_log};
