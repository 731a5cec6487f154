use std::collections::HashMap;

use quoteline_storage::{MessageIdentity, MessageRecord, ReactionRecord, ReactionStore};
use snafu::ResultExt;

use super::error::{QuoteResult, StorageSnafu};

/// Collects message identities, resolves their reactions with a single store
/// call, and rebuilds records with reactions attached.
#[derive(Debug, Default)]
pub struct ReactionHelper {
    identities: Vec<MessageIdentity>,
    reactions: HashMap<MessageIdentity, Vec<ReactionRecord>>,
}

impl ReactionHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_all<'a>(&mut self, records: impl IntoIterator<Item = &'a MessageRecord>) {
        self.identities
            .extend(records.into_iter().map(|record| record.identity));
    }

    pub fn fetch_reactions(&mut self, store: &dyn ReactionStore) -> QuoteResult<()> {
        self.identities.sort_unstable();
        self.identities.dedup();
        self.reactions = store
            .reactions_for_messages(&self.identities)
            .context(StorageSnafu {
                stage: "reaction-helper-fetch",
            })?;
        Ok(())
    }

    pub fn build_updated_models(&self, records: Vec<MessageRecord>) -> Vec<MessageRecord> {
        records
            .into_iter()
            .map(|record| {
                let reactions = self
                    .reactions
                    .get(&record.identity)
                    .cloned()
                    .unwrap_or_default();
                record.with_reactions(reactions)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use quoteline_storage::{NewReaction, RecipientId, StorageResult};

    use super::*;

    #[derive(Default)]
    struct CountingReactions {
        calls: Mutex<Vec<Vec<MessageIdentity>>>,
        stored: HashMap<MessageIdentity, Vec<ReactionRecord>>,
    }

    impl ReactionStore for CountingReactions {
        fn reactions_for_messages(
            &self,
            identities: &[MessageIdentity],
        ) -> StorageResult<HashMap<MessageIdentity, Vec<ReactionRecord>>> {
            self.calls.lock().unwrap().push(identities.to_vec());
            Ok(identities
                .iter()
                .filter_map(|identity| {
                    self.stored
                        .get(identity)
                        .map(|reactions| (*identity, reactions.clone()))
                })
                .collect())
        }

        fn add_reaction(
            &self,
            _identity: MessageIdentity,
            _input: NewReaction,
        ) -> StorageResult<ReactionRecord> {
            unreachable!("read-only fake")
        }
    }

    fn record(identity: MessageIdentity) -> MessageRecord {
        MessageRecord {
            identity,
            conversation_id: RecipientId::new(1),
            author: RecipientId::new(1),
            date_sent_ms: identity.id.get(),
            date_received_ms: identity.id.get(),
            body: String::new(),
            attachment_count: 0,
            remote_deleted: false,
            quote: None,
            reactions: Vec::new(),
        }
    }

    #[test]
    fn reactions_are_fetched_once_and_attached_per_message() {
        let thumbs = ReactionRecord {
            author: RecipientId::new(9),
            emoji: "👍".to_string(),
            date_sent_ms: 1,
            date_received_ms: 2,
        };
        let store = CountingReactions {
            stored: HashMap::from([(MessageIdentity::media(2), vec![thumbs.clone()])]),
            ..Default::default()
        };
        let records = vec![
            record(MessageIdentity::media(2)),
            record(MessageIdentity::media(1)),
        ];

        let mut helper = ReactionHelper::new();
        helper.add_all(&records);
        helper.add_all(&records[..1]);
        helper.fetch_reactions(&store).expect("fetch");
        let updated = helper.build_updated_models(records);

        let calls = store.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![MessageIdentity::media(1), MessageIdentity::media(2)]
        );
        assert_eq!(updated[0].reactions, vec![thumbs]);
        assert!(updated[1].reactions.is_empty());
        assert_eq!(updated[0].identity, MessageIdentity::media(2));
    }
}
