pub mod assembler;
pub mod colors;
pub mod error;
pub mod loader;
pub mod message;
pub mod reactions;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use assembler::QuoteThreadAssembler;
pub use colors::{
    DEFAULT_NAME_COLOR_PALETTE, GroupAuthorNameColorHelper, NameColor, NameColorSource,
    default_palette, parse_palette,
};
pub use error::{QuoteError, QuoteResult};
pub use loader::{PendingLoad, QuoteThreadLoader};
pub use message::{
    ConversationMessage, DELETED_MESSAGE_BODY, MEDIA_MESSAGE_BODY, ThreadEntryKind, display_body,
};
pub use reactions::ReactionHelper;
pub use settings::{QuotelineSettings, SettingsError, SettingsStore};
