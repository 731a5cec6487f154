use quoteline_storage::{MessageIdentity, MessageRecord};
use serde::Serialize;

pub const DELETED_MESSAGE_BODY: &str = "This message was deleted.";
pub const MEDIA_MESSAGE_BODY: &str = "Media message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadEntryKind {
    Reply,
    Original,
}

/// One UI-ready row of a quote thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationMessage {
    pub record: MessageRecord,
    pub display_body: String,
    pub kind: ThreadEntryKind,
}

impl ConversationMessage {
    pub fn reply(record: MessageRecord) -> Self {
        let display_body = display_body(&record);
        Self {
            record,
            display_body,
            kind: ThreadEntryKind::Reply,
        }
    }

    pub fn original(record: MessageRecord, display_body: String) -> Self {
        Self {
            record,
            display_body,
            kind: ThreadEntryKind::Original,
        }
    }

    pub fn identity(&self) -> MessageIdentity {
        self.record.identity
    }

    pub fn is_original(&self) -> bool {
        self.kind == ThreadEntryKind::Original
    }
}

/// Text shown for a record, substituting placeholders for bodies that
/// cannot be rendered directly.
pub fn display_body(record: &MessageRecord) -> String {
    if record.remote_deleted {
        return DELETED_MESSAGE_BODY.to_string();
    }

    if record.body.trim().is_empty() && record.attachment_count > 0 {
        return MEDIA_MESSAGE_BODY.to_string();
    }

    record.body.clone()
}

#[cfg(test)]
mod tests {
    use quoteline_storage::RecipientId;

    use super::*;

    fn record(body: &str) -> MessageRecord {
        MessageRecord {
            identity: MessageIdentity::media(1),
            conversation_id: RecipientId::new(1),
            author: RecipientId::new(2),
            date_sent_ms: 10,
            date_received_ms: 11,
            body: body.to_string(),
            attachment_count: 0,
            remote_deleted: false,
            quote: None,
            reactions: Vec::new(),
        }
    }

    #[test]
    fn display_body_uses_placeholders() {
        let mut deleted = record("secret");
        deleted.remote_deleted = true;
        assert_eq!(display_body(&deleted), DELETED_MESSAGE_BODY);

        let mut photo = record("  ");
        photo.attachment_count = 2;
        assert_eq!(display_body(&photo), MEDIA_MESSAGE_BODY);

        assert_eq!(display_body(&record("hello")), "hello");
        assert_eq!(display_body(&record("")), "");
    }
}
