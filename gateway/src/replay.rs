//! Offline Replay (§4.J): on reconnect, drain durably stored messages that
//! accumulated while the user had no live socket, oldest first.

use mailbox_store::{MailboxListParams, MailboxPort, OfflineMessage};
use presence_store::{PresenceKeys, PresencePort};
use tracing::{info, warn};

use crate::registry::Registry;
use crate::session::OutboundFrame;

/// Reads `offline_message_cnt` for the user; a zero count is a no-op.
/// Otherwise pages the mailbox store until that many payloads have been
/// fetched (or an error/short page ends the batch), delivers the whole
/// batch to the live socket in ascending timestamp order, then resets the
/// counter regardless of whether delivery fully succeeded.
pub async fn replay_offline_messages(
    presence: &dyn PresencePort,
    mailbox: &dyn MailboxPort,
    registry: &Registry,
    env: &str,
    user_id: &str,
    page_size: i64,
) {
    let keys = PresenceKeys { env, user_id };

    let target = match presence.get_int64(&keys.offline_message_cnt()).await {
        Ok(Some(cnt)) if cnt > 0 => cnt,
        Ok(_) => return,
        Err(err) => {
            warn!(user_id, %err, "failed to read offline message count, skipping replay");
            return;
        }
    };

    let batch = fetch_ascending_batch(mailbox, user_id, target, page_size).await;
    let total_replayed = batch.len() as i64;

    if let Some(record) = registry.get_conn(user_id) {
        for message in &batch {
            record.addr.do_send(OutboundFrame(message.payload.clone()));
        }
    } else if total_replayed > 0 {
        warn!(user_id, "socket vanished before replay could be delivered");
    }

    if let Err(err) = presence.set_int64(&keys.offline_message_cnt(), 0, 0).await {
        warn!(user_id, %err, "failed to reset offline message counter after replay");
    }

    info!(user_id, total_replayed, target, "offline replay complete");
}

/// Pages the mailbox store (each page newest-first) until `target` payloads
/// are collected or an error/short page ends the batch. Pages are fetched
/// in descending-time order, so concatenating them in fetch order yields
/// one globally descending sequence — a single reversal of the whole batch
/// at the end, not a per-page reversal, produces ascending (oldest-first)
/// order.
async fn fetch_ascending_batch(
    mailbox: &dyn MailboxPort,
    user_id: &str,
    target: i64,
    page_size: i64,
) -> Vec<OfflineMessage> {
    let mut batch = Vec::new();
    let mut offset = 0i64;

    while (batch.len() as i64) < target {
        let page = match mailbox
            .list_unread_offline_delivery_required_messages(MailboxListParams {
                user_id,
                offset,
                limit: page_size,
            })
            .await
        {
            Ok(page) => page,
            Err(err) => {
                warn!(user_id, %err, "offline replay aborted early on mailbox error");
                break;
            }
        };

        if page.is_empty() {
            break;
        }

        let fetched = page.len() as i64;
        let short_page = fetched < page_size;
        batch.extend(page);
        offset += fetched;
        if short_page {
            break;
        }
    }

    batch.reverse();
    batch
}
