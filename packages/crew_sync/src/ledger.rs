//! Message ledger: append-only ordered collection with monotonic read-state.
//!
//! The ledger is the single owner of the message collection. Appends are
//! idempotent against transport redelivery, read flags only ever move from
//! unread to read, and a full-history `replace_all` never regresses a message
//! the local user already marked read. All unread queries are pure functions
//! recomputed on demand — there are no cached counters to keep in sync.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::models::{Message, MessageId, UserId};

#[derive(Debug, Default)]
pub struct MessageLedger {
    messages: Vec<Message>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message unless one with the same id already exists.
    /// Returns whether the message was actually inserted.
    pub fn append(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!(id = ?message.id, "duplicate message delivery ignored");
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Mark messages as read: only ids in `ids` whose sender is `from_sender`
    /// AND whose receiver is the local user. This is a hard filter — the read
    /// flag must only ever describe messages the local user received, never
    /// ones they sent. Returns the ids actually flipped.
    pub fn mark_read(
        &mut self,
        ids: &HashSet<MessageId>,
        from_sender: UserId,
        local_user: UserId,
        now: DateTime<Utc>,
    ) -> Vec<MessageId> {
        let mut flipped = Vec::new();
        for m in &mut self.messages {
            if m.read
                || m.sender_id != from_sender
                || m.receiver_id != local_user
                || !ids.contains(&m.id)
            {
                continue;
            }
            m.read = true;
            m.read_at = Some(now);
            flipped.push(m.id.clone());
        }
        flipped
    }

    /// Apply an inbound read receipt: `reader` has read `ids`.
    ///
    /// When the reader is the remote party, this confirms messages the local
    /// user SENT to that reader. When the reader is the local user (the server
    /// echoing our own mark-read back), it confirms messages the local user
    /// received. Both directions are monotonic. Returns the flip count.
    pub fn apply_read_receipt(
        &mut self,
        reader: UserId,
        ids: &[MessageId],
        local_user: UserId,
        now: DateTime<Utc>,
    ) -> usize {
        let id_set: HashSet<&MessageId> = ids.iter().collect();
        let mut flipped = 0;
        for m in &mut self.messages {
            if m.read || !id_set.contains(&m.id) {
                continue;
            }
            let applies = if reader == local_user {
                m.receiver_id == local_user
            } else {
                m.sender_id == local_user && m.receiver_id == reader
            };
            if applies {
                m.read = true;
                m.read_at = Some(now);
                flipped += 1;
            }
        }
        flipped
    }

    /// Replace the whole collection with a full-history fetch, preserving the
    /// `read`/`read_at` of any id already marked read locally. Local read
    /// state is authoritative until the server confirms — never the reverse —
    /// which prevents a read flicker back to unread during a sync.
    pub fn replace_all(&mut self, mut incoming: Vec<Message>) {
        let locally_read: HashMap<MessageId, Option<DateTime<Utc>>> = self
            .messages
            .iter()
            .filter(|m| m.read)
            .map(|m| (m.id.clone(), m.read_at))
            .collect();

        for m in &mut incoming {
            if let Some(read_at) = locally_read.get(&m.id) {
                m.read = true;
                m.read_at = *read_at;
            }
        }
        self.messages = incoming;
    }

    /// Resolve "all unread from this sender" to a concrete id set, used when
    /// the caller passes `ids = None` to the outbound mark-read command.
    pub fn resolve_unread_ids(&self, sender: UserId, local_user: UserId) -> Vec<MessageId> {
        self.unread_from(sender, local_user)
            .into_iter()
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn unread_count(&self, local_user: UserId) -> usize {
        self.unread(local_user).len()
    }

    pub fn unread_count_from(&self, sender: UserId, local_user: UserId) -> usize {
        self.unread_from(sender, local_user).len()
    }

    pub fn unread(&self, local_user: UserId) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| !m.read && m.receiver_id == local_user)
            .collect()
    }

    pub fn unread_from(&self, sender: UserId, local_user: UserId) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| !m.read && m.receiver_id == local_user && m.sender_id == sender)
            .collect()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ME: UserId = 2;
    const PARTNER: UserId = 1;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn msg(id: i64, sender: UserId, receiver: UserId) -> Message {
        Message {
            id: MessageId::Int(id),
            sender_id: sender,
            receiver_id: receiver,
            sender_name: None,
            content: format!("message {id}"),
            timestamp: now(),
            read: false,
            read_at: None,
        }
    }

    fn ids(raw: &[i64]) -> HashSet<MessageId> {
        raw.iter().map(|&i| MessageId::Int(i)).collect()
    }

    #[test]
    fn append_is_idempotent() {
        let mut ledger = MessageLedger::new();
        assert!(ledger.append(msg(1, PARTNER, ME)));
        assert!(!ledger.append(msg(1, PARTNER, ME)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn mark_read_filters_by_sender_and_receiver() {
        let mut ledger = MessageLedger::new();
        ledger.append(msg(1, PARTNER, ME)); // received from partner -> flips
        ledger.append(msg(2, ME, PARTNER)); // sent by me -> never flips here
        ledger.append(msg(3, 9, ME)); // wrong sender -> untouched

        let flipped = ledger.mark_read(&ids(&[1, 2, 3]), PARTNER, ME, now());
        assert_eq!(flipped, vec![MessageId::Int(1)]);
        assert!(ledger.get(&MessageId::Int(1)).unwrap().read);
        assert!(!ledger.get(&MessageId::Int(2)).unwrap().read);
        assert!(!ledger.get(&MessageId::Int(3)).unwrap().read);
    }

    #[test]
    fn mark_read_skips_ids_outside_the_set() {
        let mut ledger = MessageLedger::new();
        ledger.append(msg(1, PARTNER, ME));
        ledger.append(msg(2, PARTNER, ME));
        let flipped = ledger.mark_read(&ids(&[2]), PARTNER, ME, now());
        assert_eq!(flipped, vec![MessageId::Int(2)]);
        assert!(!ledger.get(&MessageId::Int(1)).unwrap().read);
    }

    #[test]
    fn replace_all_preserves_local_read_state() {
        let mut ledger = MessageLedger::new();
        ledger.append(msg(1, PARTNER, ME));
        ledger.mark_read(&ids(&[1]), PARTNER, ME, now());
        let local_read_at = ledger.get(&MessageId::Int(1)).unwrap().read_at;

        // Server history still says unread — local wins.
        let incoming = vec![msg(1, PARTNER, ME), msg(2, PARTNER, ME)];
        ledger.replace_all(incoming);

        let m1 = ledger.get(&MessageId::Int(1)).unwrap();
        assert!(m1.read);
        assert_eq!(m1.read_at, local_read_at);
        assert!(!ledger.get(&MessageId::Int(2)).unwrap().read);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn read_is_monotonic_across_any_sequence() {
        let mut ledger = MessageLedger::new();
        ledger.append(msg(1, PARTNER, ME));
        ledger.mark_read(&ids(&[1]), PARTNER, ME, now());

        // replace, re-mark, replace again — never regresses
        ledger.replace_all(vec![msg(1, PARTNER, ME)]);
        assert!(ledger.get(&MessageId::Int(1)).unwrap().read);
        ledger.mark_read(&ids(&[1]), PARTNER, ME, now());
        ledger.replace_all(vec![msg(1, PARTNER, ME)]);
        assert!(ledger.get(&MessageId::Int(1)).unwrap().read);
    }

    #[test]
    fn read_receipt_from_remote_reader_flips_sent_messages() {
        let mut ledger = MessageLedger::new();
        ledger.append(msg(1, ME, PARTNER)); // I sent this to partner
        ledger.append(msg(2, PARTNER, ME)); // partner sent this to me

        let flipped =
            ledger.apply_read_receipt(PARTNER, &[MessageId::Int(1), MessageId::Int(2)], ME, now());
        assert_eq!(flipped, 1);
        assert!(ledger.get(&MessageId::Int(1)).unwrap().read);
        assert!(!ledger.get(&MessageId::Int(2)).unwrap().read);
    }

    #[test]
    fn read_receipt_echo_for_local_reader_confirms_received() {
        let mut ledger = MessageLedger::new();
        ledger.append(msg(1, PARTNER, ME));
        let flipped = ledger.apply_read_receipt(ME, &[MessageId::Int(1)], ME, now());
        assert_eq!(flipped, 1);
        assert!(ledger.get(&MessageId::Int(1)).unwrap().read);

        // Receipts are idempotent.
        let flipped = ledger.apply_read_receipt(ME, &[MessageId::Int(1)], ME, now());
        assert_eq!(flipped, 0);
    }

    #[test]
    fn unread_queries_are_scoped_to_the_local_receiver() {
        let mut ledger = MessageLedger::new();
        ledger.append(msg(1, PARTNER, ME));
        ledger.append(msg(2, PARTNER, ME));
        ledger.append(msg(3, 9, ME));
        ledger.append(msg(4, ME, PARTNER)); // outbound, never counts as unread

        assert_eq!(ledger.unread_count(ME), 3);
        assert_eq!(ledger.unread_count_from(PARTNER, ME), 2);
        assert_eq!(
            ledger.resolve_unread_ids(PARTNER, ME),
            vec![MessageId::Int(1), MessageId::Int(2)]
        );

        ledger.mark_read(&ids(&[1]), PARTNER, ME, now());
        assert_eq!(ledger.unread_count(ME), 2);
        assert_eq!(ledger.unread_count_from(PARTNER, ME), 1);
    }
}
