pub mod error;
pub mod ids;
pub mod sqlite;
pub mod types;

use std::collections::HashMap;

pub use error::{StorageError, StorageResult};
pub use ids::{GroupId, MessageIdentity, MessageRowId, RecipientId, StorageClass};
pub use sqlite::SqliteStorage;
pub use types::{
    MessageRecord, NewMessage, NewQuote, NewReaction, Quote, ReactionRecord, RecipientKind,
    RecipientRecord,
};

pub trait MessageStore: Send + Sync {
    fn get_message_by_id(
        &self,
        identity: MessageIdentity,
    ) -> StorageResult<Option<MessageRecord>>;
    /// Every message that quotes `identity`, directly or through a chain of
    /// replies, newest received first. The target itself is never returned.
    fn all_messages_quoting(&self, identity: MessageIdentity)
    -> StorageResult<Vec<MessageRecord>>;
    fn insert_message(
        &self,
        class: StorageClass,
        input: NewMessage,
    ) -> StorageResult<MessageRecord>;
}

pub trait ReactionStore: Send + Sync {
    fn reactions_for_messages(
        &self,
        identities: &[MessageIdentity],
    ) -> StorageResult<HashMap<MessageIdentity, Vec<ReactionRecord>>>;
    fn add_reaction(
        &self,
        identity: MessageIdentity,
        input: NewReaction,
    ) -> StorageResult<ReactionRecord>;
}

pub trait RecipientStore: Send + Sync {
    fn resolve_recipient(&self, recipient_id: RecipientId) -> StorageResult<RecipientRecord>;
    fn group_members(&self, group_id: GroupId) -> StorageResult<Vec<RecipientId>>;
    fn create_individual(&self, display_name: &str) -> StorageResult<RecipientRecord>;
    fn create_group(&self, title: &str) -> StorageResult<RecipientRecord>;
    fn add_group_member(&self, group_id: GroupId, member: RecipientId) -> StorageResult<()>;
    fn remove_group_member(&self, group_id: GroupId, member: RecipientId) -> StorageResult<()>;
}

pub trait Storage: MessageStore + ReactionStore + RecipientStore {}

impl<T> Storage for T where T: MessageStore + ReactionStore + RecipientStore {}
