//! Discord event handler for serenity.
//!
//! Converts gateway messages into [`IncomingMessage`]s and hands them to the
//! platform-independent [`MessageHandler`]. Feedback is applied as a reaction.

use super::feedback::{Feedback, FeedbackSink};
use super::handler::{HandleOutcome, MessageHandler};
use crate::media::{Attachment, IncomingMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{Channel, Context, EventHandler, GatewayIntents, Message, ReactionType, Ready};
use std::sync::Arc;
use tracing::{debug, info};

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    handler: Arc<MessageHandler>,
}

impl DiscordHandler {
    /// Wrap a platform-independent handler
    #[must_use]
    pub const fn new(handler: Arc<MessageHandler>) -> Self {
        Self { handler }
    }

    /// Required gateway intents for the bot.
    #[must_use]
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "Discord bot ready"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if !self.handler.should_process(msg.author.bot, msg.channel_id.get()) {
            return;
        }

        let incoming = to_incoming(&ctx, &msg).await;
        let sink = ReactionSink { ctx: &ctx, msg: &msg };
        let outcome = self.handler.handle(&incoming, &sink).await;
        if let HandleOutcome::Submitted {
            feedback,
            queued,
            failed,
        } = outcome
        {
            info!(
                message_id = incoming.id,
                feedback = ?feedback,
                queued,
                failed,
                "Message processed"
            );
        }
    }
}

/// Applies [`Feedback`] as a unicode reaction on the source message
struct ReactionSink<'a> {
    ctx: &'a Context,
    msg: &'a Message,
}

#[async_trait]
impl FeedbackSink for ReactionSink<'_> {
    async fn apply(&self, feedback: Feedback) -> anyhow::Result<()> {
        self.msg
            .react(self.ctx, ReactionType::Unicode(feedback.emoji().to_string()))
            .await?;
        Ok(())
    }
}

async fn to_incoming(ctx: &Context, msg: &Message) -> IncomingMessage {
    let channel_name = match msg.channel_id.to_channel(ctx).await {
        Ok(Channel::Guild(channel)) => channel.name,
        Ok(Channel::Private(channel)) => channel.name(),
        Ok(_) => msg.channel_id.get().to_string(),
        Err(e) => {
            debug!(channel_id = msg.channel_id.get(), error = %e, "Could not resolve channel name");
            msg.channel_id.get().to_string()
        }
    };

    IncomingMessage {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        channel_name,
        author: author_name(msg),
        timestamp: DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now),
        attachments: msg
            .attachments
            .iter()
            .map(|a| Attachment {
                url: a.url.clone(),
                filename: a.filename.clone(),
            })
            .collect(),
        content: msg.content.clone(),
    }
}

/// Server nickname, then global display name, then username
fn author_name(msg: &Message) -> String {
    msg.member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .or_else(|| msg.author.global_name.clone())
        .unwrap_or_else(|| msg.author.name.clone())
}
