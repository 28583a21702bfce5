use tracing::{info, warn};

use rally_gateway::{ChannelId, Connection};
use rally_types::error::{Error, Result};
use rally_types::events::{GatewayCommand, GatewayEvent};
use rally_types::models::PartyId;

use crate::Engine;
use crate::chat::NewMessage;

impl Engine {
    /// Register a live channel for `party`, greet it with `ready`, and tell
    /// it which of its matches are already online. `ready` is queued before
    /// the channel can receive anything else.
    pub async fn open_session(&self, party: PartyId) -> Connection {
        let ready = GatewayEvent::Ready { party_id: party };
        let conn = self
            .inner
            .dispatcher
            .connect_with_greeting(party, &ready)
            .await;
        info!("Party {} opened channel {}", party, conn.channel);

        match self.partners(party).await {
            Ok(partners) => {
                for partner in partners {
                    if !self.inner.dispatcher.registry().is_connected(partner) {
                        continue;
                    }
                    let event = GatewayEvent::Presence {
                        party_id: partner,
                        online: true,
                    };
                    if self
                        .inner
                        .dispatcher
                        .send_to_channel(party, conn.channel, &event)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
            Err(e) => warn!("Could not load partners of {}: {}", party, e),
        }

        conn
    }

    pub async fn close_session(&self, party: PartyId, channel: ChannelId) {
        let went_offline = self.inner.dispatcher.disconnect(party, channel).await;
        info!(
            "Party {} closed channel {}{}",
            party,
            channel,
            if went_offline { " (now offline)" } else { "" }
        );
    }

    /// Execute one command received on a party's channel.
    pub async fn handle_command(&self, party: PartyId, cmd: GatewayCommand) -> Result<()> {
        match cmd {
            GatewayCommand::Chat {
                match_id,
                content,
                message_type,
                media_url,
            } => {
                self.send_message(
                    party,
                    NewMessage {
                        match_id,
                        content,
                        message_type,
                        media_url,
                    },
                )
                .await?;
            }

            GatewayCommand::Typing {
                match_id,
                is_typing,
            } => {
                self.typing(party, match_id, is_typing).await?;
            }
        }
        Ok(())
    }

    /// Report a rejected command back to the channel that sent it.
    pub async fn reject_command(&self, party: PartyId, channel: ChannelId, error: &Error) {
        let event = GatewayEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        };
        if let Err(e) = self
            .inner
            .dispatcher
            .send_to_channel(party, channel, &event)
            .await
        {
            warn!("Error event for channel {} not queued: {}", channel, e);
        }
    }
}
