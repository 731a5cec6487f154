use std::collections::HashMap;
use std::sync::Arc;

use quoteline_storage::{
    MessageIdentity, MessageRecord, MessageStore, ReactionStore, RecipientId, RecipientStore,
    Storage,
};
use snafu::ResultExt;

use super::colors::{NameColor, NameColorSource};
use super::error::{QuoteResult, StorageSnafu};
use super::message::{ConversationMessage, display_body};
use super::reactions::ReactionHelper;

/// Builds the quote thread for one message: every reply that quotes it,
/// decorated with reactions, followed by the original itself.
pub struct QuoteThreadAssembler {
    messages: Arc<dyn MessageStore>,
    reactions: Arc<dyn ReactionStore>,
    recipients: Arc<dyn RecipientStore>,
    name_colors: Arc<dyn NameColorSource>,
}

impl QuoteThreadAssembler {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        reactions: Arc<dyn ReactionStore>,
        recipients: Arc<dyn RecipientStore>,
        name_colors: Arc<dyn NameColorSource>,
    ) -> Self {
        Self {
            messages,
            reactions,
            recipients,
            name_colors,
        }
    }

    /// Uses one backend for messages, reactions and recipients.
    pub fn from_storage<S>(storage: Arc<S>, name_colors: Arc<dyn NameColorSource>) -> Self
    where
        S: Storage + 'static,
    {
        Self::new(storage.clone(), storage.clone(), storage, name_colors)
    }

    /// Replies in quote-index order with the original last. A missing
    /// original yields an empty thread rather than an error.
    pub fn assemble_thread(
        &self,
        identity: MessageIdentity,
    ) -> QuoteResult<Vec<ConversationMessage>> {
        let Some(original) = self
            .messages
            .get_message_by_id(identity)
            .context(StorageSnafu {
                stage: "assemble-thread-load-original",
            })?
        else {
            tracing::debug!(%identity, "original message not found; thread is empty");
            return Ok(Vec::new());
        };

        let replies = self
            .messages
            .all_messages_quoting(identity)
            .context(StorageSnafu {
                stage: "assemble-thread-load-replies",
            })?;

        let mut reaction_helper = ReactionHelper::new();
        reaction_helper.add_all(&replies);
        reaction_helper.fetch_reactions(self.reactions.as_ref())?;

        let mut thread = reaction_helper
            .build_updated_models(replies)
            .into_iter()
            .map(|reply| strip_self_quote(reply, original.date_sent_ms))
            .map(ConversationMessage::reply)
            .collect::<Vec<_>>();

        let original_body = display_body(&original);
        thread.push(ConversationMessage::original(original, original_body));

        tracing::debug!(%identity, entries = thread.len(), "assembled quote thread");
        Ok(thread)
    }

    /// Per-author colors for a group conversation; empty for one-to-one chats.
    pub fn resolve_author_colors(
        &self,
        conversation_id: RecipientId,
    ) -> QuoteResult<HashMap<RecipientId, NameColor>> {
        let conversation = self
            .recipients
            .resolve_recipient(conversation_id)
            .context(StorageSnafu {
                stage: "author-colors-resolve-conversation",
            })?;

        match conversation.group_id() {
            Some(group_id) => self.name_colors.color_map_for(group_id),
            None => Ok(HashMap::new()),
        }
    }
}

// A reply quoting the thread root would repeat the snippet already shown as
// the root, so that quote is dropped. Quotes of other messages stay.
fn strip_self_quote(reply: MessageRecord, original_sent_ms: i64) -> MessageRecord {
    let quotes_original = reply
        .quote()
        .is_some_and(|quote| quote.target_sent_ms == original_sent_ms);
    if quotes_original {
        reply.without_quote()
    } else {
        reply
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    use quoteline_storage::{NewMessage, NewReaction, RecipientRecord, StorageClass, StorageError};

    use super::*;
    use crate::colors::GroupAuthorNameColorHelper;
    use crate::error::QuoteError;
    use crate::message::{MEDIA_MESSAGE_BODY, ThreadEntryKind};
    use crate::test_support::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        assembler: QuoteThreadAssembler,
        alice: RecipientId,
        bob: RecipientId,
        group: RecipientRecord,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let alice = store.create_individual("Alice").unwrap().id;
        let bob = store.create_individual("Bob").unwrap().id;
        let group = store.create_group("Lunch").unwrap();
        let group_id = group.group_id().unwrap();
        store.add_group_member(group_id, alice).unwrap();
        store.add_group_member(group_id, bob).unwrap();

        let name_colors = GroupAuthorNameColorHelper::with_default_palette(store.clone());
        let assembler = QuoteThreadAssembler::from_storage(store.clone(), Arc::new(name_colors));

        Fixture {
            store,
            assembler,
            alice,
            bob,
            group,
        }
    }

    fn insert(store: &MemoryStore, input: NewMessage) -> MessageRecord {
        store.insert_message(StorageClass::Media, input).unwrap()
    }

    #[test]
    fn missing_original_yields_empty_thread() {
        let fixture = fixture();

        let thread = fixture
            .assembler
            .assemble_thread(MessageIdentity::media(999))
            .unwrap();

        assert!(thread.is_empty());
        assert_eq!(fixture.store.reaction_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn original_without_replies_is_the_only_entry() {
        let fixture = fixture();
        let original = insert(
            &fixture.store,
            NewMessage::text(fixture.group.id, fixture.alice, 100, "hello"),
        );

        let thread = fixture.assembler.assemble_thread(original.identity).unwrap();

        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].kind, ThreadEntryKind::Original);
        assert_eq!(thread[0].display_body, "hello");
    }

    #[test]
    fn media_only_entries_use_the_media_placeholder() {
        let fixture = fixture();
        let store = &fixture.store;
        let original = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.alice, 100, "").with_attachments(1),
        );
        insert(
            store,
            NewMessage::text(fixture.group.id, fixture.bob, 200, " ")
                .with_attachments(2)
                .quoting(&original),
        );

        let thread = fixture.assembler.assemble_thread(original.identity).unwrap();

        assert_eq!(thread.len(), 2);
        assert!(
            thread
                .iter()
                .all(|entry| entry.display_body == MEDIA_MESSAGE_BODY)
        );
    }

    #[test]
    fn replies_keep_index_order_and_original_comes_last() {
        let fixture = fixture();
        let store = &fixture.store;
        let original = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.alice, 100, "lunch?"),
        );
        let early = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.bob, 200, "yes")
                .with_received_at(210)
                .quoting(&original),
        );
        let late = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.alice, 300, "noon")
                .with_received_at(310)
                .quoting(&early),
        );

        let thread = fixture.assembler.assemble_thread(original.identity).unwrap();
        let order = thread
            .iter()
            .map(ConversationMessage::identity)
            .collect::<Vec<_>>();

        assert_eq!(order, vec![late.identity, early.identity, original.identity]);
        assert!(thread[..2].iter().all(|entry| !entry.is_original()));
        assert!(thread[2].is_original());
    }

    #[test]
    fn self_quotes_are_stripped_and_nested_quotes_kept() {
        let fixture = fixture();
        let store = &fixture.store;
        let original = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.alice, 100, "lunch?"),
        );
        let direct = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.bob, 200, "yes").quoting(&original),
        );
        let nested = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.alice, 300, "noon").quoting(&direct),
        );

        let thread = fixture.assembler.assemble_thread(original.identity).unwrap();
        let find = |identity: MessageIdentity| {
            thread
                .iter()
                .find(|entry| entry.identity() == identity)
                .unwrap()
        };

        assert!(find(direct.identity).record.quote().is_none());
        assert_eq!(
            find(nested.identity).record.quote().map(|quote| quote.target_sent_ms),
            Some(200)
        );
    }

    #[test]
    fn replies_carry_reactions_from_one_batched_lookup() {
        let fixture = fixture();
        let store = &fixture.store;
        let original = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.alice, 100, "lunch?"),
        );
        let first = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.bob, 200, "yes").quoting(&original),
        );
        let second = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.alice, 300, "me too").quoting(&original),
        );
        store
            .add_reaction(
                first.identity,
                NewReaction {
                    author: fixture.alice,
                    emoji: "🎉".to_string(),
                    date_sent_ms: 400,
                    date_received_ms: 401,
                },
            )
            .unwrap();

        let thread = fixture.assembler.assemble_thread(original.identity).unwrap();
        let reactions_of = |identity: MessageIdentity| {
            thread
                .iter()
                .find(|entry| entry.identity() == identity)
                .map(|entry| entry.record.reactions.len())
        };

        assert_eq!(fixture.store.reaction_calls.load(Ordering::SeqCst), 1);
        assert_eq!(reactions_of(first.identity), Some(1));
        assert_eq!(reactions_of(second.identity), Some(0));
    }

    #[test]
    fn repeated_assembly_is_stable() {
        let fixture = fixture();
        let store = &fixture.store;
        let original = insert(
            store,
            NewMessage::text(fixture.group.id, fixture.alice, 100, "lunch?"),
        );
        insert(
            store,
            NewMessage::text(fixture.group.id, fixture.bob, 200, "yes").quoting(&original),
        );

        let first = fixture.assembler.assemble_thread(original.identity).unwrap();
        let second = fixture.assembler.assemble_thread(original.identity).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn direct_conversation_has_no_author_colors() {
        let fixture = fixture();

        let colors = fixture.assembler.resolve_author_colors(fixture.bob).unwrap();

        assert!(colors.is_empty());
    }

    #[test]
    fn group_colors_cover_exactly_the_members_and_persist() {
        let fixture = fixture();
        let group_id = fixture.group.group_id().unwrap();

        let before = fixture
            .assembler
            .resolve_author_colors(fixture.group.id)
            .unwrap();
        assert_eq!(
            before.keys().copied().collect::<HashSet<_>>(),
            HashSet::from([fixture.alice, fixture.bob])
        );

        let carol = fixture.store.create_individual("Carol").unwrap().id;
        fixture.store.add_group_member(group_id, carol).unwrap();
        fixture
            .store
            .remove_group_member(group_id, fixture.alice)
            .unwrap();

        let after = fixture
            .assembler
            .resolve_author_colors(fixture.group.id)
            .unwrap();
        assert_eq!(
            after.keys().copied().collect::<HashSet<_>>(),
            HashSet::from([fixture.bob, carol])
        );
        assert_eq!(after[&fixture.bob], before[&fixture.bob]);
    }

    #[test]
    fn unknown_conversation_is_a_storage_error() {
        let fixture = fixture();

        let result = fixture
            .assembler
            .resolve_author_colors(RecipientId::new(4_242));

        assert!(matches!(
            result,
            Err(QuoteError::Storage {
                source: StorageError::NotFound { .. },
                ..
            })
        ));
    }
}
