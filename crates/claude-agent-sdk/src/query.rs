//! The One-Shot Entry (spec §4.6): when no permission callback, hooks, or
//! in-process MCP server are configured, skip the control plane entirely.
//!
//! Direct descendant of the teacher's `ClaudeClient::print` path: spawn in
//! `--print -- <prompt>` mode, close stdin immediately, and parse stdout
//! through the Message Parser. The one piece of the teacher that survives
//! almost unchanged in shape, rebased onto the shared Transport.

use crate::config::{ClaudeAgentOptions, TransportMode};
use crate::env;
use crate::error::SdkError;
use crate::message::{self, Message};
use crate::transport::{StderrSink, Transport};

/// Run `prompt` against `claude` one-shot and return every parsed message,
/// in order, up to and including the terminal Result record.
pub async fn query(
    options: ClaudeAgentOptions,
    prompt: &str,
    stderr_sink: Option<StderrSink>,
) -> Result<Vec<Message>, SdkError> {
    env::init_observability("sdk-rust");
    if let Some(dir) = options.working_dir.as_ref() {
        env::set_pwd(dir);
    }

    let mut transport =
        Transport::spawn(&options, TransportMode::OneShot, Some(prompt), stderr_sink).await?;

    let mut messages = Vec::new();
    while let Some(record) = transport.next_record().await {
        let value = record?;
        messages.push(message::parse_message(&value)?);
    }
    transport.close().await?;
    Ok(messages)
}
