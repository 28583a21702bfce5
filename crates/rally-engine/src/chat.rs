use chrono::Utc;
use tracing::{debug, info};

use rally_cache::keys;
use rally_types::api::MessagePage;
use rally_types::error::{Error, Result};
use rally_types::events::GatewayEvent;
use rally_types::models::{MatchId, Message, MessageId, MessageType, PartyId};

use crate::Engine;

pub const MAX_CONTENT_CHARS: usize = 1000;
pub const MAX_MEDIA_URL_CHARS: usize = 500;
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// A message as submitted by its sender, over REST or the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub match_id: MatchId,
    pub content: String,
    pub message_type: MessageType,
    pub media_url: Option<String>,
}

impl NewMessage {
    fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(Error::InvalidRequest("message content is empty".into()));
        }
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(Error::InvalidRequest(format!(
                "message content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }
        if let Some(url) = &self.media_url {
            if url.chars().count() > MAX_MEDIA_URL_CHARS {
                return Err(Error::InvalidRequest(format!(
                    "media url exceeds {} characters",
                    MAX_MEDIA_URL_CHARS
                )));
            }
        }
        Ok(())
    }
}

impl Engine {
    /// Persist a message and push it to the other party's live channels.
    /// The sender gets no echo.
    pub async fn send_message(&self, sender: PartyId, new: NewMessage) -> Result<Message> {
        new.validate()?;
        let recipient = self.counterpart(new.match_id, sender).await?;

        let now = Utc::now();
        let NewMessage {
            match_id,
            content,
            message_type,
            media_url,
        } = new;
        let message = self
            .db("insert_message", move |db| {
                db.insert_message(
                    match_id,
                    sender,
                    &content,
                    message_type,
                    media_url.as_deref(),
                    now,
                )
            })
            .await?;

        self.inner
            .invalidator
            .invalidate(&[keys::match_messages(match_id)])
            .await;
        self.inner
            .dispatcher
            .deliver(&[recipient], &GatewayEvent::chat(&message))
            .await;

        debug!("Message {} sent on match {} by {}", message.id, match_id, sender);
        Ok(message)
    }

    /// One page of a match's messages, newest first. `page` is zero-based.
    /// The first page at the default size is served from the cache.
    pub async fn list_messages(
        &self,
        reader: PartyId,
        match_id: MatchId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage> {
        let limit = match limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        };
        let offset = page
            .checked_mul(limit)
            .ok_or_else(|| Error::InvalidRequest(format!("page {} is out of range", page)))?;

        self.counterpart(match_id, reader).await?;

        let cacheable = page == 0 && limit == DEFAULT_PAGE_LIMIT;
        let key = keys::match_messages(match_id);
        if cacheable {
            if let Some(hit) = self.inner.cache.get_json::<MessagePage>(&key).await {
                return Ok(hit);
            }
        }

        // One extra row tells whether an older page exists.
        let mut messages = self
            .db("get_messages", move |db| {
                db.get_messages(match_id, limit + 1, offset)
            })
            .await?;
        let has_more = messages.len() > limit as usize;
        messages.truncate(limit as usize);

        let result = MessagePage {
            count: messages.len(),
            messages,
            page,
            limit,
            has_more,
        };

        if cacheable {
            self.inner.cache.put_json(&key, &result).await;
        }
        Ok(result)
    }

    pub async fn latest_message(&self, reader: PartyId, match_id: MatchId) -> Result<Option<Message>> {
        self.counterpart(match_id, reader).await?;
        self.db("latest_message", move |db| db.latest_message(match_id))
            .await
    }

    pub async fn unread_count(&self, reader: PartyId, match_id: MatchId) -> Result<u64> {
        self.counterpart(match_id, reader).await?;
        self.db("unread_count", move |db| db.unread_count(match_id, reader))
            .await
    }

    /// Only the sender may delete a message.
    pub async fn delete_message(&self, party: PartyId, id: MessageId) -> Result<()> {
        let message = self
            .db("get_message", move |db| db.get_message(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {}", id)))?;

        if message.sender_id != party {
            return Err(Error::NotAuthorized(format!(
                "party {} did not send message {}",
                party, id
            )));
        }

        let removed = self.db("delete_message", move |db| db.delete_message(id)).await?;
        if !removed {
            return Err(Error::NotFound(format!("message {}", id)));
        }

        self.inner
            .invalidator
            .invalidate(&[keys::match_messages(message.match_id)])
            .await;
        info!("Message {} deleted by {}", id, party);
        Ok(())
    }

    /// Relay a typing indicator to the other party. Nothing is stored.
    pub async fn typing(&self, party: PartyId, match_id: MatchId, is_typing: bool) -> Result<()> {
        let recipient = self.counterpart(match_id, party).await?;
        self.inner
            .dispatcher
            .deliver(
                &[recipient],
                &GatewayEvent::Typing {
                    match_id,
                    party_id: party,
                    is_typing,
                },
            )
            .await;
        Ok(())
    }
}
