use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::{OptionExt, ResultExt, ensure};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::error::{
    ConflictSnafu, InvariantViolationSnafu, NotFoundSnafu, SqliteQuerySnafu,
    SqliteRuntimeInitSnafu, SqliteThreadSpawnSnafu, StorageError, UnsupportedDatabaseLocationSnafu,
};
use super::error::{
    CreateSqliteDirectorySnafu, SqliteConnectOptionsSnafu, SqliteConnectSnafu, SqliteMigrateSnafu,
    SqlitePragmaSnafu, StorageResult,
};
use super::ids::{GroupId, MessageIdentity, MessageRowId, RecipientId, StorageClass};
use super::types::{
    MessageRecord, NewMessage, NewReaction, Quote, ReactionRecord, RecipientKind, RecipientRecord,
};
use super::{MessageStore, ReactionStore, RecipientStore};

/// Upper bound on message identities per reaction query, well under sqlite's
/// bound-parameter limit.
const REACTION_BATCH_SIZE: usize = 400;

const PLAIN_MESSAGE_COLUMNS: &str = "id, conversation_id, author_id, date_sent, date_received, body, attachment_count, remote_deleted, NULL AS quote_target_sent, NULL AS quote_target_author, NULL AS quote_text, 0 AS quote_missing";
const MEDIA_MESSAGE_COLUMNS: &str = "id, conversation_id, author_id, date_sent, date_received, body, attachment_count, remote_deleted, quote_target_sent, quote_target_author, quote_text, quote_missing";

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    database_url: String,
}

impl SqliteStorage {
    /// Opens (creating if needed) a file-backed database and runs migrations.
    ///
    /// In-memory locations are rejected: every store call opens its own
    /// connection, and each in-memory connection would see an empty database.
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure!(
            !is_in_memory_location(database_location),
            UnsupportedDatabaseLocationSnafu {
                stage: "sqlite-open-location",
                location: database_location.to_string(),
                details: "in-memory databases are not shared between store connections",
            }
        );
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        // Explicit PRAGMA writes make bootstrap behavior deterministic for QA checks.
        let _: String = sqlx::query_scalar("PRAGMA journal_mode = WAL;")
            .fetch_one(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-journal-mode",
                pragma: "journal_mode",
            })?;
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-foreign-keys",
                pragma: "foreign_keys",
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;

        Ok(Self { pool, database_url })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    fn run_db_call<T, F>(&self, stage: &'static str, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        // Store traits are sync, so each call executes on a dedicated worker thread
        // with its own current-thread runtime to avoid nested-runtime blocking panics.
        let worker = std::thread::Builder::new()
            .name(format!("sqlite-store-{stage}"))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context(SqliteRuntimeInitSnafu {
                        stage: "sqlite-store-runtime-build",
                    })?;
                runtime.block_on(op)
            })
            .context(SqliteThreadSpawnSnafu {
                stage: "sqlite-store-spawn-worker",
            })?;

        match worker.join() {
            Ok(result) => result,
            Err(_) => InvariantViolationSnafu {
                stage,
                details: "sqlite storage worker thread panicked".to_string(),
            }
            .fail(),
        }
    }
}

impl MessageStore for SqliteStorage {
    fn get_message_by_id(
        &self,
        identity: MessageIdentity,
    ) -> StorageResult<Option<MessageRecord>> {
        let database_url = self.database_url.clone();
        self.run_db_call("message-get", async move {
            let mut connection =
                connect_store_connection(&database_url, "message-get-connect").await?;
            load_message(&mut connection, identity, "message-get-query").await
        })
    }

    fn all_messages_quoting(
        &self,
        identity: MessageIdentity,
    ) -> StorageResult<Vec<MessageRecord>> {
        let database_url = self.database_url.clone();
        self.run_db_call("message-quoting", async move {
            let mut connection =
                connect_store_connection(&database_url, "message-quoting-connect").await?;
            let Some(target) =
                load_message(&mut connection, identity, "message-quoting-load-target").await?
            else {
                return Ok(Vec::new());
            };

            let sql = format!(
                "SELECT {MEDIA_MESSAGE_COLUMNS} FROM media_messages WHERE conversation_id = ? AND quote_target_sent = ? AND quote_target_author = ?"
            );
            let mut visited = HashSet::from([target.identity]);
            let mut pending = VecDeque::from([target]);
            let mut replies = Vec::new();

            // Breadth-first over the reply chain; `visited` keeps quote cycles finite.
            while let Some(quoted) = pending.pop_front() {
                let rows = sqlx::query_as::<_, MessageRow>(&sql)
                    .bind(quoted.conversation_id.get())
                    .bind(quoted.date_sent_ms)
                    .bind(quoted.author.get())
                    .fetch_all(&mut connection)
                    .await
                    .context(SqliteQuerySnafu {
                        stage: "message-quoting-query",
                    })?;

                for row in rows {
                    let reply = message_row_to_record(row, StorageClass::Media)?;
                    if !visited.insert(reply.identity) {
                        continue;
                    }
                    pending.push_back(reply.clone());
                    replies.push(reply);
                }
            }

            replies.sort_by(|left, right| {
                right
                    .date_received_ms
                    .cmp(&left.date_received_ms)
                    .then_with(|| right.identity.id.cmp(&left.identity.id))
            });

            Ok(replies)
        })
    }

    fn insert_message(
        &self,
        class: StorageClass,
        input: NewMessage,
    ) -> StorageResult<MessageRecord> {
        ensure!(
            class == StorageClass::Media || input.quote.is_none(),
            ConflictSnafu {
                stage: "message-insert-plain-quote",
                entity: "plain_message",
                details: "plain messages cannot carry a quote".to_string(),
            }
        );

        let database_url = self.database_url.clone();
        self.run_db_call("message-insert", async move {
            let mut connection =
                connect_store_connection(&database_url, "message-insert-connect").await?;
            let attachment_count = i64::from(input.attachment_count);

            let inserted = match class {
                StorageClass::Plain => sqlx::query(
                    "INSERT INTO plain_messages (conversation_id, author_id, date_sent, date_received, body, attachment_count, remote_deleted) VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(input.conversation_id.get())
                .bind(input.author.get())
                .bind(input.date_sent_ms)
                .bind(input.date_received_ms)
                .bind(input.body.clone())
                .bind(attachment_count)
                .bind(input.remote_deleted)
                .execute(&mut connection)
                .await,
                StorageClass::Media => {
                    let quote = input.quote.as_ref();
                    sqlx::query(
                        "INSERT INTO media_messages (conversation_id, author_id, date_sent, date_received, body, attachment_count, remote_deleted, quote_target_sent, quote_target_author, quote_text, quote_missing) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(input.conversation_id.get())
                    .bind(input.author.get())
                    .bind(input.date_sent_ms)
                    .bind(input.date_received_ms)
                    .bind(input.body.clone())
                    .bind(attachment_count)
                    .bind(input.remote_deleted)
                    .bind(quote.map(|quote| quote.target_sent_ms))
                    .bind(quote.map(|quote| quote.target_author.get()))
                    .bind(quote.map(|quote| quote.text.clone()))
                    .bind(quote.is_some_and(|quote| quote.missing))
                    .execute(&mut connection)
                    .await
                }
            }
            .context(SqliteQuerySnafu {
                stage: "message-insert-apply",
            })?;

            Ok(MessageRecord {
                identity: MessageIdentity::new(class, MessageRowId::new(inserted.last_insert_rowid())),
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
            })
        })
    }
}

impl ReactionStore for SqliteStorage {
    fn reactions_for_messages(
        &self,
        identities: &[MessageIdentity],
    ) -> StorageResult<HashMap<MessageIdentity, Vec<ReactionRecord>>> {
        if identities.is_empty() {
            return Ok(HashMap::new());
        }

        let database_url = self.database_url.clone();
        let identities = identities.to_vec();
        self.run_db_call("reaction-batch", async move {
            let mut connection =
                connect_store_connection(&database_url, "reaction-batch-connect").await?;
            let mut reactions: HashMap<MessageIdentity, Vec<ReactionRecord>> = HashMap::new();

            for chunk in identities.chunks(REACTION_BATCH_SIZE) {
                let mut builder = QueryBuilder::<Sqlite>::new(
                    "SELECT message_class, message_id, author_id, emoji, date_sent, date_received FROM reactions WHERE ",
                );
                {
                    let mut predicates = builder.separated(" OR ");
                    for identity in chunk {
                        predicates.push("(message_class = ");
                        predicates.push_bind_unseparated(identity.class.as_str());
                        predicates.push_unseparated(" AND message_id = ");
                        predicates.push_bind_unseparated(identity.id.get());
                        predicates.push_unseparated(")");
                    }
                }
                builder.push(" ORDER BY date_received ASC, id ASC");

                let rows = builder
                    .build_query_as::<ReactionRow>()
                    .fetch_all(&mut connection)
                    .await
                    .context(SqliteQuerySnafu {
                        stage: "reaction-batch-query",
                    })?;

                for row in rows {
                    let (identity, reaction) = reaction_row_to_record(row)?;
                    reactions.entry(identity).or_default().push(reaction);
                }
            }

            Ok(reactions)
        })
    }

    fn add_reaction(
        &self,
        identity: MessageIdentity,
        input: NewReaction,
    ) -> StorageResult<ReactionRecord> {
        let database_url = self.database_url.clone();
        self.run_db_call("reaction-add", async move {
            let mut connection =
                connect_store_connection(&database_url, "reaction-add-connect").await?;
            ensure_message_exists(&mut connection, identity, "reaction-add-missing-message")
                .await?;

            // One reaction per author per message; a newer reaction replaces the old one.
            sqlx::query(
                "INSERT INTO reactions (message_class, message_id, author_id, emoji, date_sent, date_received) VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT (message_class, message_id, author_id) DO UPDATE SET emoji = excluded.emoji, date_sent = excluded.date_sent, date_received = excluded.date_received",
            )
            .bind(identity.class.as_str())
            .bind(identity.id.get())
            .bind(input.author.get())
            .bind(input.emoji.clone())
            .bind(input.date_sent_ms)
            .bind(input.date_received_ms)
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "reaction-add-upsert",
            })?;

            Ok(ReactionRecord {
                author: input.author,
                emoji: input.emoji,
                date_sent_ms: input.date_sent_ms,
                date_received_ms: input.date_received_ms,
            })
        })
    }
}

impl RecipientStore for SqliteStorage {
    fn resolve_recipient(&self, recipient_id: RecipientId) -> StorageResult<RecipientRecord> {
        let database_url = self.database_url.clone();
        self.run_db_call("recipient-resolve", async move {
            let mut connection =
                connect_store_connection(&database_url, "recipient-resolve-connect").await?;
            let row = sqlx::query_as::<_, RecipientRow>(
                "SELECT id, kind, display_name, group_id, title FROM recipients WHERE id = ?",
            )
            .bind(recipient_id.get())
            .fetch_optional(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "recipient-resolve-query",
            })?
            .context(NotFoundSnafu {
                stage: "recipient-resolve-missing",
                entity: "recipient",
                id: recipient_id.to_string(),
            })?;

            recipient_row_to_record(row)
        })
    }

    fn group_members(&self, group_id: GroupId) -> StorageResult<Vec<RecipientId>> {
        let database_url = self.database_url.clone();
        self.run_db_call("group-members", async move {
            let mut connection =
                connect_store_connection(&database_url, "group-members-connect").await?;
            ensure_group_exists(&mut connection, group_id, "group-members-missing-group").await?;

            let members = sqlx::query_scalar::<_, i64>(
                "SELECT recipient_id FROM group_members WHERE group_id = ? ORDER BY recipient_id ASC",
            )
            .bind(group_id.to_string())
            .fetch_all(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "group-members-query",
            })?;

            Ok(members.into_iter().map(RecipientId::new).collect())
        })
    }

    fn create_individual(&self, display_name: &str) -> StorageResult<RecipientRecord> {
        let database_url = self.database_url.clone();
        let display_name = display_name.trim().to_string();
        self.run_db_call("recipient-create-individual", async move {
            let mut connection =
                connect_store_connection(&database_url, "recipient-create-individual-connect")
                    .await?;
            let inserted = sqlx::query(
                "INSERT INTO recipients (kind, display_name, group_id, title, created_at) VALUES ('individual', ?, NULL, NULL, ?)",
            )
            .bind(display_name.clone())
            .bind(unix_timestamp_seconds())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "recipient-create-individual-insert",
            })?;

            Ok(RecipientRecord {
                id: RecipientId::new(inserted.last_insert_rowid()),
                kind: RecipientKind::Individual { display_name },
            })
        })
    }

    fn create_group(&self, title: &str) -> StorageResult<RecipientRecord> {
        let database_url = self.database_url.clone();
        let title = title.trim().to_string();
        self.run_db_call("recipient-create-group", async move {
            let mut connection =
                connect_store_connection(&database_url, "recipient-create-group-connect").await?;
            let group_id = GroupId::new_v7();
            let inserted = sqlx::query(
                "INSERT INTO recipients (kind, display_name, group_id, title, created_at) VALUES ('group', NULL, ?, ?, ?)",
            )
            .bind(group_id.to_string())
            .bind(title.clone())
            .bind(unix_timestamp_seconds())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "recipient-create-group-insert",
            })?;

            Ok(RecipientRecord {
                id: RecipientId::new(inserted.last_insert_rowid()),
                kind: RecipientKind::Group { group_id, title },
            })
        })
    }

    fn add_group_member(&self, group_id: GroupId, member: RecipientId) -> StorageResult<()> {
        let database_url = self.database_url.clone();
        self.run_db_call("group-member-add", async move {
            let mut connection =
                connect_store_connection(&database_url, "group-member-add-connect").await?;
            ensure_group_exists(&mut connection, group_id, "group-member-add-missing-group")
                .await?;

            sqlx::query(
                "INSERT INTO group_members (group_id, recipient_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(group_id.to_string())
            .bind(member.get())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "group-member-add-insert",
            })?;

            Ok(())
        })
    }

    fn remove_group_member(&self, group_id: GroupId, member: RecipientId) -> StorageResult<()> {
        let database_url = self.database_url.clone();
        self.run_db_call("group-member-remove", async move {
            let mut connection =
                connect_store_connection(&database_url, "group-member-remove-connect").await?;
            let removed = sqlx::query(
                "DELETE FROM group_members WHERE group_id = ? AND recipient_id = ?",
            )
            .bind(group_id.to_string())
            .bind(member.get())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "group-member-remove-delete",
            })?;

            if removed.rows_affected() == 0 {
                return NotFoundSnafu {
                    stage: "group-member-remove-missing",
                    entity: "group_member",
                    id: format!("{group_id}/{member}"),
                }
                .fail();
            }

            Ok(())
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    author_id: i64,
    date_sent: i64,
    date_received: i64,
    body: String,
    attachment_count: i64,
    remote_deleted: bool,
    quote_target_sent: Option<i64>,
    quote_target_author: Option<i64>,
    quote_text: Option<String>,
    quote_missing: bool,
}

#[derive(Debug, FromRow)]
struct ReactionRow {
    message_class: String,
    message_id: i64,
    author_id: i64,
    emoji: String,
    date_sent: i64,
    date_received: i64,
}

#[derive(Debug, FromRow)]
struct RecipientRow {
    id: i64,
    kind: String,
    display_name: Option<String>,
    group_id: Option<String>,
    title: Option<String>,
}

fn message_row_to_record(row: MessageRow, class: StorageClass) -> StorageResult<MessageRecord> {
    let quote = match (row.quote_target_sent, row.quote_target_author) {
        (Some(target_sent_ms), Some(target_author)) => Some(Quote {
            target_sent_ms,
            target_author: RecipientId::new(target_author),
            text: row.quote_text.unwrap_or_default(),
            missing: row.quote_missing,
        }),
        (None, None) => None,
        _ => {
            return InvariantViolationSnafu {
                stage: "message-row-quote-partial",
                details: format!("message '{class}:{}' has a partial quote reference", row.id),
            }
            .fail();
        }
    };

    Ok(MessageRecord {
        identity: MessageIdentity::new(class, MessageRowId::new(row.id)),
        conversation_id: RecipientId::new(row.conversation_id),
        author: RecipientId::new(row.author_id),
        date_sent_ms: row.date_sent,
        date_received_ms: row.date_received,
        body: row.body,
        attachment_count: i64_to_u32(row.attachment_count, "message-row-attachment-count")?,
        remote_deleted: row.remote_deleted,
        quote,
        reactions: Vec::new(),
    })
}

fn reaction_row_to_record(row: ReactionRow) -> StorageResult<(MessageIdentity, ReactionRecord)> {
    let class = StorageClass::parse(&row.message_class).context(InvariantViolationSnafu {
        stage: "reaction-row-message-class",
        details: format!("unknown message class '{}'", row.message_class),
    })?;

    Ok((
        MessageIdentity::new(class, MessageRowId::new(row.message_id)),
        ReactionRecord {
            author: RecipientId::new(row.author_id),
            emoji: row.emoji,
            date_sent_ms: row.date_sent,
            date_received_ms: row.date_received,
        },
    ))
}

fn recipient_row_to_record(row: RecipientRow) -> StorageResult<RecipientRecord> {
    let id = RecipientId::new(row.id);
    let kind = match row.kind.as_str() {
        "individual" => RecipientKind::Individual {
            display_name: row.display_name.unwrap_or_default(),
        },
        "group" => {
            let raw_group_id = row.group_id.context(InvariantViolationSnafu {
                stage: "recipient-row-group-id-missing",
                details: format!("group recipient '{id}' is missing group_id"),
            })?;
            RecipientKind::Group {
                group_id: GroupId::parse(&raw_group_id)?,
                title: row.title.unwrap_or_default(),
            }
        }
        other => {
            return InvariantViolationSnafu {
                stage: "recipient-row-kind",
                details: format!("unknown recipient kind '{other}'"),
            }
            .fail();
        }
    };

    Ok(RecipientRecord { id, kind })
}

async fn connect_store_connection(
    database_url: &str,
    stage: &'static str,
) -> StorageResult<SqliteConnection> {
    let mut connection =
        SqliteConnection::connect(database_url)
            .await
            .context(SqliteConnectSnafu {
                stage,
                database_url: database_url.to_string(),
            })?;

    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&mut connection)
        .await
        .context(SqlitePragmaSnafu {
            stage: "sqlite-store-pragma-foreign-keys",
            pragma: "foreign_keys",
        })?;
    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(&mut connection)
        .await
        .context(SqlitePragmaSnafu {
            stage: "sqlite-store-pragma-busy-timeout",
            pragma: "busy_timeout",
        })?;

    Ok(connection)
}

async fn load_message(
    connection: &mut SqliteConnection,
    identity: MessageIdentity,
    stage: &'static str,
) -> StorageResult<Option<MessageRecord>> {
    let sql = match identity.class {
        StorageClass::Plain => format!("SELECT {PLAIN_MESSAGE_COLUMNS} FROM plain_messages WHERE id = ?"),
        StorageClass::Media => format!("SELECT {MEDIA_MESSAGE_COLUMNS} FROM media_messages WHERE id = ?"),
    };

    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(identity.id.get())
        .fetch_optional(&mut *connection)
        .await
        .context(SqliteQuerySnafu { stage })?;

    row.map(|row| message_row_to_record(row, identity.class))
        .transpose()
}

async fn ensure_message_exists(
    connection: &mut SqliteConnection,
    identity: MessageIdentity,
    stage: &'static str,
) -> StorageResult<()> {
    let sql = match identity.class {
        StorageClass::Plain => "SELECT 1 FROM plain_messages WHERE id = ? LIMIT 1",
        StorageClass::Media => "SELECT 1 FROM media_messages WHERE id = ? LIMIT 1",
    };
    let existing = sqlx::query_scalar::<_, i64>(sql)
        .bind(identity.id.get())
        .fetch_optional(&mut *connection)
        .await
        .context(SqliteQuerySnafu { stage })?;

    if existing.is_none() {
        return NotFoundSnafu {
            stage,
            entity: "message",
            id: identity.to_string(),
        }
        .fail();
    }

    Ok(())
}

async fn ensure_group_exists(
    connection: &mut SqliteConnection,
    group_id: GroupId,
    stage: &'static str,
) -> StorageResult<()> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM recipients WHERE kind = 'group' AND group_id = ? LIMIT 1",
    )
    .bind(group_id.to_string())
    .fetch_optional(&mut *connection)
    .await
    .context(SqliteQuerySnafu { stage })?;

    if existing.is_none() {
        return NotFoundSnafu {
            stage,
            entity: "group",
            id: group_id.to_string(),
        }
        .fail();
    }

    Ok(())
}

fn unix_timestamp_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0_i64, |duration| duration.as_secs() as i64)
}

fn i64_to_u32(value: i64, stage: &'static str) -> StorageResult<u32> {
    value
        .try_into()
        .map_err(|_| StorageError::InvariantViolation {
            stage,
            details: format!("sqlite integer '{value}' cannot map to u32"),
        })
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn is_in_memory_location(database_location: &str) -> bool {
    let location = database_location.trim();
    location == ":memory:" || location.contains(":memory:") || location.contains("mode=memory")
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    format!("sqlite://{database_location}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_locations_normalize_to_sqlite_urls() {
        assert_eq!(
            normalize_database_url("sqlite://already.db"),
            "sqlite://already.db"
        );
        assert_eq!(
            normalize_database_url("data/quoteline.db"),
            "sqlite://data/quoteline.db"
        );
    }

    #[test]
    fn in_memory_locations_are_detected() {
        assert!(is_in_memory_location(":memory:"));
        assert!(is_in_memory_location("sqlite::memory:"));
        assert!(is_in_memory_location("sqlite:file:quoteline?mode=memory&cache=shared"));
        assert!(!is_in_memory_location("data/quoteline.db"));
        assert!(!is_in_memory_location("sqlite://data/memory.db"));
    }

    #[test]
    fn partial_quote_columns_are_rejected() {
        let row = MessageRow {
            id: 7,
            conversation_id: 1,
            author_id: 2,
            date_sent: 100,
            date_received: 101,
            body: "reply".to_string(),
            attachment_count: 0,
            remote_deleted: false,
            quote_target_sent: Some(50),
            quote_target_author: None,
            quote_text: None,
            quote_missing: false,
        };

        assert!(matches!(
            message_row_to_record(row, StorageClass::Media),
            Err(StorageError::InvariantViolation { .. })
        ));
    }
}
