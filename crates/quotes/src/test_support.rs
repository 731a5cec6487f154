//! In-memory store used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use quoteline_storage::{
    GroupId, MessageIdentity, MessageRecord, MessageStore, NewMessage, NewReaction, Quote,
    ReactionRecord, ReactionStore, RecipientId, RecipientKind, RecipientRecord, RecipientStore,
    StorageClass, StorageError, StorageResult,
};

#[derive(Default)]
pub(crate) struct MemoryStore {
    messages: Mutex<Vec<MessageRecord>>,
    reactions: Mutex<HashMap<MessageIdentity, Vec<ReactionRecord>>>,
    recipients: Mutex<HashMap<RecipientId, RecipientRecord>>,
    members: Mutex<HashMap<GroupId, Vec<RecipientId>>>,
    pub(crate) reaction_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryStore {
    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1
    }
}

impl MessageStore for MemoryStore {
    fn get_message_by_id(
        &self,
        identity: MessageIdentity,
    ) -> StorageResult<Option<MessageRecord>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .iter()
            .find(|record| record.identity == identity)
            .cloned())
    }

    fn all_messages_quoting(
        &self,
        identity: MessageIdentity,
    ) -> StorageResult<Vec<MessageRecord>> {
        let messages = self.messages.lock().unwrap();
        let Some(root) = messages.iter().find(|record| record.identity == identity) else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::from([root.identity]);
        let mut frontier = vec![root.clone()];
        let mut found = Vec::new();
        while let Some(target) = frontier.pop() {
            for record in messages.iter() {
                let quotes_target = record.quote().is_some_and(|quote| {
                    quote.target_sent_ms == target.date_sent_ms
                        && quote.target_author == target.author
                });
                if quotes_target
                    && record.conversation_id == root.conversation_id
                    && seen.insert(record.identity)
                {
                    frontier.push(record.clone());
                    found.push(record.clone());
                }
            }
        }

        found.sort_by(|left, right| {
            right
                .date_received_ms
                .cmp(&left.date_received_ms)
                .then(right.identity.id.cmp(&left.identity.id))
        });
        Ok(found)
    }

    fn insert_message(
        &self,
        class: StorageClass,
        input: NewMessage,
    ) -> StorageResult<MessageRecord> {
        let record = MessageRecord {
            identity: MessageIdentity::new(class, self.next_id().into()),
            conversation_id: input.conversation_id,
            author: input.author,
            date_sent_ms: input.date_sent_ms,
            date_received_ms: input.date_received_ms,
            body: input.body,
            attachment_count: input.attachment_count,
            remote_deleted: input.remote_deleted,
            quote: input.quote.map(|quote| Quote {
                target_sent_ms: quote.target_sent_ms,
                target_author: quote.target_author,
                text: quote.text,
                missing: quote.missing,
            }),
            reactions: Vec::new(),
        };
        self.messages.lock().unwrap().push(record.clone());
        Ok(record)
    }
}

impl ReactionStore for MemoryStore {
    fn reactions_for_messages(
        &self,
        identities: &[MessageIdentity],
    ) -> StorageResult<HashMap<MessageIdentity, Vec<ReactionRecord>>> {
        self.reaction_calls.fetch_add(1, Ordering::SeqCst);
        let reactions = self.reactions.lock().unwrap();
        Ok(identities
            .iter()
            .filter_map(|identity| Some((*identity, reactions.get(identity)?.clone())))
            .collect())
    }

    fn add_reaction(
        &self,
        identity: MessageIdentity,
        input: NewReaction,
    ) -> StorageResult<ReactionRecord> {
        let reaction = ReactionRecord {
            author: input.author,
            emoji: input.emoji,
            date_sent_ms: input.date_sent_ms,
            date_received_ms: input.date_received_ms,
        };
        self.reactions
            .lock()
            .unwrap()
            .entry(identity)
            .or_default()
            .push(reaction.clone());
        Ok(reaction)
    }
}

impl RecipientStore for MemoryStore {
    fn resolve_recipient(&self, recipient_id: RecipientId) -> StorageResult<RecipientRecord> {
        self.recipients
            .lock()
            .unwrap()
            .get(&recipient_id)
            .cloned()
            .ok_or(StorageError::NotFound {
                stage: "memory-resolve-recipient",
                entity: "recipient",
                id: recipient_id.to_string(),
            })
    }

    fn group_members(&self, group_id: GroupId) -> StorageResult<Vec<RecipientId>> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }

    fn create_individual(&self, display_name: &str) -> StorageResult<RecipientRecord> {
        let record = RecipientRecord {
            id: RecipientId::new(self.next_id()),
            kind: RecipientKind::Individual {
                display_name: display_name.to_string(),
            },
        };
        self.recipients
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    fn create_group(&self, title: &str) -> StorageResult<RecipientRecord> {
        let record = RecipientRecord {
            id: RecipientId::new(self.next_id()),
            kind: RecipientKind::Group {
                group_id: GroupId::new_v7(),
                title: title.to_string(),
            },
        };
        self.recipients
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    fn add_group_member(&self, group_id: GroupId, member: RecipientId) -> StorageResult<()> {
        self.members
            .lock()
            .unwrap()
            .entry(group_id)
            .or_default()
            .push(member);
        Ok(())
    }

    fn remove_group_member(&self, group_id: GroupId, member: RecipientId) -> StorageResult<()> {
        if let Some(members) = self.members.lock().unwrap().get_mut(&group_id) {
            members.retain(|existing| *existing != member);
        }
        Ok(())
    }
}
