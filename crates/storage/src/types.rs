use serde::Serialize;

use super::ids::{GroupId, MessageIdentity, RecipientId};

/// Reference embedded in a message that points at another message by its
/// send timestamp and author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub target_sent_ms: i64,
    pub target_author: RecipientId,
    pub text: String,
    /// The quoted message was not found locally when this quote was received.
    pub missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionRecord {
    pub author: RecipientId,
    pub emoji: String,
    pub date_sent_ms: i64,
    pub date_received_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub identity: MessageIdentity,
    /// Recipient that owns the conversation this message belongs to.
    pub conversation_id: RecipientId,
    pub author: RecipientId,
    pub date_sent_ms: i64,
    pub date_received_ms: i64,
    pub body: String,
    pub attachment_count: u32,
    pub remote_deleted: bool,
    pub quote: Option<Quote>,
    pub reactions: Vec<ReactionRecord>,
}

impl MessageRecord {
    pub fn quote(&self) -> Option<&Quote> {
        self.quote.as_ref()
    }

    pub fn without_quote(mut self) -> Self {
        self.quote = None;
        self
    }

    pub fn with_reactions(mut self, reactions: Vec<ReactionRecord>) -> Self {
        self.reactions = reactions;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuote {
    pub target_sent_ms: i64,
    pub target_author: RecipientId,
    pub text: String,
    pub missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: RecipientId,
    pub author: RecipientId,
    pub date_sent_ms: i64,
    pub date_received_ms: i64,
    pub body: String,
    pub attachment_count: u32,
    pub remote_deleted: bool,
    pub quote: Option<NewQuote>,
}

impl NewMessage {
    pub fn text(
        conversation_id: RecipientId,
        author: RecipientId,
        date_sent_ms: i64,
        body: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            author,
            date_sent_ms,
            date_received_ms: date_sent_ms,
            body: body.into(),
            attachment_count: 0,
            remote_deleted: false,
            quote: None,
        }
    }

    pub fn with_received_at(mut self, date_received_ms: i64) -> Self {
        self.date_received_ms = date_received_ms;
        self
    }

    pub fn with_attachments(mut self, attachment_count: u32) -> Self {
        self.attachment_count = attachment_count;
        self
    }

    pub fn remote_deleted(mut self) -> Self {
        self.remote_deleted = true;
        self
    }

    pub fn quoting(mut self, target: &MessageRecord) -> Self {
        self.quote = Some(NewQuote {
            target_sent_ms: target.date_sent_ms,
            target_author: target.author,
            text: target.body.clone(),
            missing: false,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReaction {
    pub author: RecipientId,
    pub emoji: String,
    pub date_sent_ms: i64,
    pub date_received_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipientKind {
    Individual { display_name: String },
    Group { group_id: GroupId, title: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientRecord {
    pub id: RecipientId,
    pub kind: RecipientKind,
}

impl RecipientRecord {
    pub fn group_id(&self) -> Option<GroupId> {
        match &self.kind {
            RecipientKind::Group { group_id, .. } => Some(*group_id),
            RecipientKind::Individual { .. } => None,
        }
    }

    pub fn is_group(&self) -> bool {
        self.group_id().is_some()
    }
}
