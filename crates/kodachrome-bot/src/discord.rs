//! Discord gateway adapter.
//!
//! Turns `!policy` messages into [`Coordinator::handle_upload`] calls and
//! routes replies back to the originating message.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use kodachrome_core::{Coordinator, ReplySink, Upload};
use serenity::http::Http;
use serenity::model::channel::{Attachment, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::prelude::*;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Discord rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const POLICY_COMMAND: &str = "policy";

/// Whether `content` invokes the policy command under `prefix`.
///
/// Trailing arguments are allowed and ignored; the command name is
/// case-sensitive and must follow the prefix directly.
pub fn is_policy_command(content: &str, prefix: &str) -> bool {
    let Some(rest) = content.trim_start().strip_prefix(prefix) else {
        return false;
    };
    match rest.strip_prefix(POLICY_COMMAND) {
        Some(tail) => tail.is_empty() || tail.starts_with(char::is_whitespace),
        None => false,
    }
}

/// Markdown code fence used in eval output excerpts.
const FENCE: &str = "```";

/// Split `text` into chunks of at most `limit` characters, preferring to
/// break after a newline.
///
/// A chunk that ends inside a code block gets a closing fence and the next
/// chunk reopens it, so every message renders on its own.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text.to_string();

    while rest.chars().count() > limit {
        let budget = if rest.contains(FENCE) {
            limit.saturating_sub(FENCE.len()).max(1)
        } else {
            limit
        };
        let cut = rest
            .char_indices()
            .nth(budget)
            .map_or(rest.len(), |(i, _)| i);
        let split_at = match rest[..cut].rfind('\n') {
            Some(i) if i >= cut / 2 => i + 1,
            _ => cut,
        };

        let mut chunk = rest[..split_at].to_string();
        let mut tail = rest[split_at..].to_string();
        if chunk.matches(FENCE).count() % 2 == 1 {
            chunk.push_str(FENCE);
            tail.insert_str(0, "```\n");
        }
        chunks.push(chunk);
        rest = tail;
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Gateway events the bot subscribes to. `GUILDS` fills the guild cache
/// that `cache_ready` reports from.
pub fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Event handler for the bot.
pub struct Bot {
    coordinator: Coordinator,
    prefix: String,
    downloads: reqwest::Client,
}

impl Bot {
    pub fn new(coordinator: Coordinator, prefix: impl Into<String>) -> Self {
        Self {
            coordinator,
            prefix: prefix.into(),
            downloads: reqwest::Client::new(),
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Bot {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || !is_policy_command(&msg.content, &self.prefix) {
            return;
        }

        info!(
            author = %msg.author.name,
            channel = %msg.channel_id,
            attachments = msg.attachments.len(),
            "Policy command received"
        );

        let uploads: Vec<Box<dyn Upload>> = msg
            .attachments
            .iter()
            .map(|a| Box::new(AttachmentUpload::new(self.downloads.clone(), a)) as Box<dyn Upload>)
            .collect();
        let sink = Arc::new(MessageReply {
            http: Arc::clone(&ctx.http),
            msg,
        });

        // The eval job is detached; its handle is not needed here.
        let _ = self.coordinator.handle_upload(uploads, sink).await;
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "Discord bot connected"
        );
    }

    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        for id in guilds {
            match ctx.cache.guild(id).map(|g| g.name.clone()) {
                Some(name) => info!(guild = %name, guild_id = %id, "Connected to guild"),
                None => debug!(guild_id = %id, "Connected to uncached guild"),
            }
        }
    }
}

/// Attachment body streamed from the Discord CDN.
pub struct AttachmentUpload {
    client: reqwest::Client,
    filename: String,
    url: String,
}

impl AttachmentUpload {
    pub fn new(client: reqwest::Client, attachment: &Attachment) -> Self {
        Self {
            client,
            filename: attachment.filename.clone(),
            url: attachment.url.clone(),
        }
    }
}

#[async_trait]
impl Upload for AttachmentUpload {
    fn filename(&self) -> &str {
        &self.filename
    }

    async fn write_to(&mut self, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> io::Result<u64> {
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(io::Error::other)?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(io::Error::other)? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }
}

/// Replies to the message that issued the command.
struct MessageReply {
    http: Arc<Http>,
    msg: Message,
}

#[async_trait]
impl ReplySink for MessageReply {
    async fn reply(&self, text: &str) -> anyhow::Result<()> {
        let mut chunks = split_message(text, MAX_MESSAGE_CHARS).into_iter();
        if let Some(first) = chunks.next() {
            self.msg.reply(&self.http, first).await?;
        }
        for chunk in chunks {
            if let Err(e) = self.msg.channel_id.say(&self.http, chunk).await {
                warn!(error = %e, "failed to send reply continuation");
                return Err(e.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_command_matching() {
        assert!(is_policy_command("!policy", "!"));
        assert!(is_policy_command("  !policy please", "!"));
        assert!(is_policy_command("?policy\n", "?"));
        assert!(!is_policy_command("!policies", "!"));
        assert!(!is_policy_command("! policy", "!"));
        assert!(!is_policy_command("!Policy", "!"));
        assert!(!is_policy_command("policy", "!"));
        assert!(!is_policy_command("hello !policy", "!"));
    }

    #[test]
    fn test_short_message_is_single_chunk() {
        assert_eq!(split_message("hi", 2000), vec!["hi".to_string()]);
        assert_eq!(split_message("", 2000), vec![String::new()]);
    }

    #[test]
    fn test_split_respects_limit_and_preserves_text() {
        let text = format!("{}\n{}", "a".repeat(1500), "b".repeat(1500));
        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}\n", "a".repeat(1500)));
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_keeps_code_fences_balanced() {
        let stdout = (0..150).map(|i| format!("step {i:04} ok")).collect::<Vec<_>>().join("\n");
        let stderr = "warning: slow frame\n".repeat(70);
        let text = format!(
            "❌ Eval failed (rc=1).\nstdout:\n```{}```\nstderr:\n```{}```",
            &stdout[..1500],
            stderr.trim()
        );
        assert!(text.chars().count() > MAX_MESSAGE_CHARS);

        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_MESSAGE_CHARS);
            assert_eq!(chunk.matches(FENCE).count() % 2, 0, "unbalanced: {chunk:?}");
        }
        assert!(chunks[0].starts_with("❌ Eval failed (rc=1)."));
        assert!(chunks.last().unwrap().contains("warning: slow frame"));
    }

    #[test]
    fn test_gateway_intents_include_guilds() {
        let intents = gateway_intents();
        assert!(intents.contains(GatewayIntents::GUILDS));
        assert!(intents.contains(GatewayIntents::GUILD_MESSAGES));
        assert!(intents.contains(GatewayIntents::DIRECT_MESSAGES));
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
    }

    #[test]
    fn test_split_without_newlines_counts_chars() {
        let text = "é".repeat(4500);
        let chunks = split_message(&text, MAX_MESSAGE_CHARS);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(sizes, vec![2000, 2000, 500]);
        assert_eq!(chunks.concat(), text);
    }
}
