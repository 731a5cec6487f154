use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use snafu::{OptionExt, ResultExt, Snafu};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use quoteline::{
    GroupAuthorNameColorHelper, QuoteError, QuoteThreadAssembler, QuoteThreadLoader,
    SettingsStore,
};
use quoteline::settings::DEFAULT_LOG_FILTER;
use quoteline_storage::{
    MessageIdentity, MessageRecord, MessageStore, NewMessage, NewReaction, ReactionStore,
    RecipientId, RecipientRecord, RecipientStore, SqliteStorage, StorageClass, StorageError,
};

const FIXTURE_BASE_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Clone)]
struct RunnerArgs {
    mode: Mode,
    db_path: Option<String>,
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
enum Mode {
    Scenario(Scenario),
    Thread(MessageIdentity),
    Colors(RecipientId),
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    SeedFixture,
    MissingOriginal,
    SelfQuoteStrip,
    NestedReplyPreserved,
    OriginalLast,
    ReactionBatch,
    DirectColors,
    GroupColors,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "seed_fixture" => Some(Self::SeedFixture),
            "missing_original" => Some(Self::MissingOriginal),
            "self_quote_strip" => Some(Self::SelfQuoteStrip),
            "nested_reply_preserved" => Some(Self::NestedReplyPreserved),
            "original_last" => Some(Self::OriginalLast),
            "reaction_batch" => Some(Self::ReactionBatch),
            "direct_colors" => Some(Self::DirectColors),
            "group_colors" => Some(Self::GroupColors),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::SeedFixture => "seed_fixture",
            Self::MissingOriginal => "missing_original",
            Self::SelfQuoteStrip => "self_quote_strip",
            Self::NestedReplyPreserved => "nested_reply_preserved",
            Self::OriginalLast => "original_last",
            Self::ReactionBatch => "reaction_batch",
            Self::DirectColors => "direct_colors",
            Self::GroupColors => "group_colors",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("one of --scenario, --thread or --colors is required"))]
    MissingMode { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("invalid argument value: {source}"))]
    InvalidArgument {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("storage call failed: {source}"))]
    Storage {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("quote thread query failed: {source}"))]
    Quote {
        stage: &'static str,
        source: QuoteError,
    },
    #[snafu(display("failed to encode output: {source}"))]
    EncodeOutput {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

struct Harness {
    storage: Arc<SqliteStorage>,
    assembler: Arc<QuoteThreadAssembler>,
}

impl Harness {
    fn loader(
        &self,
        message_id: MessageIdentity,
        conversation_id: RecipientId,
    ) -> QuoteThreadLoader {
        QuoteThreadLoader::new(
            Arc::clone(&self.assembler),
            Handle::current(),
            message_id,
            conversation_id,
        )
    }
}

struct ThreadFixture {
    group: RecipientRecord,
    members: Vec<RecipientId>,
    original: MessageRecord,
    direct_reply: MessageRecord,
    nested_reply: MessageRecord,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    let settings_store = load_settings(args.config_path.clone(), std::io::stderr);
    let settings = settings_store.settings();

    let filter = EnvFilter::try_new(&settings.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| settings.database_path.clone());
    println!("db_path={db_path}");

    let storage = Arc::new(SqliteStorage::open(&db_path).await.context(StorageSnafu {
        stage: "runner-open-storage",
    })?);
    tracing::debug!(database_url = storage.database_url(), "runner storage opened");
    let palette = settings.name_colors().context(QuoteSnafu {
        stage: "runner-name-color-palette",
    })?;
    let name_colors = GroupAuthorNameColorHelper::new(storage.clone(), palette).context(
        QuoteSnafu {
            stage: "runner-name-color-helper",
        },
    )?;
    let assembler = Arc::new(QuoteThreadAssembler::from_storage(
        storage.clone(),
        Arc::new(name_colors),
    ));
    let harness = Harness { storage, assembler };

    match args.mode {
        Mode::Thread(identity) => print_thread(&harness, identity).await,
        Mode::Colors(conversation_id) => print_colors(&harness, conversation_id).await,
        Mode::Scenario(scenario) => {
            println!("scenario={}", scenario.name());
            run_scenario(&harness, scenario).await
        }
    }
}

// Settings load before the configured subscriber exists, so their own log
// lines go through a bootstrap subscriber at the default filter.
fn load_settings<W>(config_path: Option<PathBuf>, make_writer: W) -> SettingsStore
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(DEFAULT_LOG_FILTER))
        .with_writer(make_writer)
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(bootstrap, || {
        config_path
            .map(SettingsStore::new)
            .unwrap_or_else(SettingsStore::load)
    })
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut mode = None;
    let mut db_path = None;
    let mut config_path = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;
                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                mode = Some(Mode::Scenario(parsed));
            }
            "--thread" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-thread-value",
                    arg: "--thread",
                })?;
                let identity = MessageIdentity::parse(&value).context(InvalidArgumentSnafu {
                    stage: "parse-args-thread",
                })?;
                mode = Some(Mode::Thread(identity));
            }
            "--colors" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-colors-value",
                    arg: "--colors",
                })?;
                let recipient_id = RecipientId::parse(&value).context(InvalidArgumentSnafu {
                    stage: "parse-args-colors",
                })?;
                mode = Some(Mode::Colors(recipient_id));
            }
            "--db" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-db-value",
                    arg: "--db",
                })?;
                db_path = Some(value);
            }
            "--config" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-config-value",
                    arg: "--config",
                })?;
                config_path = Some(PathBuf::from(value));
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        mode: mode.context(MissingModeSnafu {
            stage: "parse-args-mode-required",
        })?,
        db_path,
        config_path,
    })
}

async fn print_thread(harness: &Harness, identity: MessageIdentity) -> RunnerResult<()> {
    let original = harness
        .storage
        .get_message_by_id(identity)
        .context(StorageSnafu {
            stage: "print-thread-load-original",
        })?;
    let conversation_id = original
        .map(|record| record.conversation_id)
        .unwrap_or(RecipientId::new(0));

    let loader = harness.loader(identity, conversation_id);
    println!("thread_message={}", loader.message_id());
    println!("thread_conversation={}", loader.conversation_id());
    let thread = loader.load_messages().await.context(QuoteSnafu {
        stage: "print-thread-load",
    })?;

    for entry in &thread {
        let line = serde_json::to_string(entry).context(EncodeOutputSnafu {
            stage: "print-thread-encode",
        })?;
        println!("{line}");
    }
    println!("thread_len={}", thread.len());
    println!("runner_ok=true");
    Ok(())
}

async fn print_colors(harness: &Harness, conversation_id: RecipientId) -> RunnerResult<()> {
    let colors = harness
        .loader(MessageIdentity::media(0), conversation_id)
        .load_name_colors()
        .await
        .context(QuoteSnafu {
            stage: "print-colors-load",
        })?;

    // Sorted so repeated runs print identical output.
    let ordered = colors.into_iter().collect::<BTreeMap<_, _>>();
    let line = serde_json::to_string(&ordered).context(EncodeOutputSnafu {
        stage: "print-colors-encode",
    })?;
    println!("{line}");
    println!("color_count={}", ordered.len());
    println!("runner_ok=true");
    Ok(())
}

async fn run_scenario(harness: &Harness, scenario: Scenario) -> RunnerResult<()> {
    match scenario {
        Scenario::SeedFixture => run_seed_fixture(harness),
        Scenario::MissingOriginal => run_missing_original(harness).await,
        Scenario::SelfQuoteStrip => run_self_quote_strip(harness).await,
        Scenario::NestedReplyPreserved => run_nested_reply_preserved(harness).await,
        Scenario::OriginalLast => run_original_last(harness).await,
        Scenario::ReactionBatch => run_reaction_batch(harness).await,
        Scenario::DirectColors => run_direct_colors(harness).await,
        Scenario::GroupColors => run_group_colors(harness).await,
        Scenario::All => run_all(harness).await,
    }
}

async fn run_all(harness: &Harness) -> RunnerResult<()> {
    run_seed_fixture(harness)?;
    run_missing_original(harness).await?;
    run_self_quote_strip(harness).await?;
    run_nested_reply_preserved(harness).await?;
    run_original_last(harness).await?;
    run_reaction_batch(harness).await?;
    run_direct_colors(harness).await?;
    run_group_colors(harness).await?;

    println!("all_passed=true");
    Ok(())
}

fn run_seed_fixture(harness: &Harness) -> RunnerResult<()> {
    let fixture = seed_thread_fixture(harness.storage.as_ref())?;

    println!("conversation={}", fixture.group.id);
    println!("original={}", fixture.original.identity);
    println!("direct_reply={}", fixture.direct_reply.identity);
    println!("nested_reply={}", fixture.nested_reply.identity);
    println!("runner_ok=true");
    Ok(())
}

async fn run_missing_original(harness: &Harness) -> RunnerResult<()> {
    let thread = harness
        .loader(MessageIdentity::media(i64::MAX), RecipientId::new(0))
        .load_messages()
        .await
        .context(QuoteSnafu {
            stage: "scenario-missing-original-load",
        })?;

    println!("missing_original_thread_len={}", thread.len());
    if !thread.is_empty() {
        return ScenarioFailedSnafu {
            stage: "scenario-missing-original-assert",
            scenario: "missing_original",
            reason: format!("expected an empty thread but got {} entries", thread.len()),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_self_quote_strip(harness: &Harness) -> RunnerResult<()> {
    let fixture = seed_thread_fixture(harness.storage.as_ref())?;
    let thread = harness
        .loader(fixture.original.identity, fixture.group.id)
        .load_messages()
        .await
        .context(QuoteSnafu {
            stage: "scenario-self-quote-strip-load",
        })?;

    let direct = thread
        .iter()
        .find(|entry| entry.identity() == fixture.direct_reply.identity)
        .context(ScenarioFailedSnafu {
            stage: "scenario-self-quote-strip-find",
            scenario: "self_quote_strip",
            reason: "direct reply missing from thread".to_string(),
        })?;

    let stripped = direct.record.quote().is_none();
    println!("self_quote_stripped={stripped}");
    if !stripped {
        return ScenarioFailedSnafu {
            stage: "scenario-self-quote-strip-assert",
            scenario: "self_quote_strip",
            reason: "reply quoting the original kept its quote".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_nested_reply_preserved(harness: &Harness) -> RunnerResult<()> {
    let fixture = seed_thread_fixture(harness.storage.as_ref())?;
    let thread = harness
        .loader(fixture.original.identity, fixture.group.id)
        .load_messages()
        .await
        .context(QuoteSnafu {
            stage: "scenario-nested-reply-load",
        })?;

    let nested_quote_target = thread
        .iter()
        .find(|entry| entry.identity() == fixture.nested_reply.identity)
        .and_then(|entry| entry.record.quote())
        .map(|quote| quote.target_sent_ms);

    let preserved = nested_quote_target == Some(fixture.direct_reply.date_sent_ms);
    println!("nested_quote_preserved={preserved}");
    if !preserved {
        return ScenarioFailedSnafu {
            stage: "scenario-nested-reply-assert",
            scenario: "nested_reply_preserved",
            reason: format!(
                "expected nested quote target {} but found {nested_quote_target:?}",
                fixture.direct_reply.date_sent_ms
            ),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_original_last(harness: &Harness) -> RunnerResult<()> {
    let fixture = seed_thread_fixture(harness.storage.as_ref())?;
    let thread = harness
        .loader(fixture.original.identity, fixture.group.id)
        .load_messages()
        .await
        .context(QuoteSnafu {
            stage: "scenario-original-last-load",
        })?;

    let original_last = thread
        .last()
        .is_some_and(|entry| entry.is_original() && entry.identity() == fixture.original.identity);
    let originals = thread.iter().filter(|entry| entry.is_original()).count();

    println!("thread_len={}", thread.len());
    println!("original_last={original_last}");
    if !original_last || originals != 1 || thread.len() != 3 {
        return ScenarioFailedSnafu {
            stage: "scenario-original-last-assert",
            scenario: "original_last",
            reason: format!(
                "expected 3 entries ending with the original, got {} entries and {originals} originals",
                thread.len()
            ),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_reaction_batch(harness: &Harness) -> RunnerResult<()> {
    let fixture = seed_thread_fixture(harness.storage.as_ref())?;
    let reactor = fixture.members[0];
    harness
        .storage
        .add_reaction(
            fixture.direct_reply.identity,
            NewReaction {
                author: reactor,
                emoji: "👍".to_string(),
                date_sent_ms: FIXTURE_BASE_MS + 10_000,
                date_received_ms: FIXTURE_BASE_MS + 10_001,
            },
        )
        .context(StorageSnafu {
            stage: "scenario-reaction-batch-add",
        })?;

    let thread = harness
        .loader(fixture.original.identity, fixture.group.id)
        .load_messages()
        .await
        .context(QuoteSnafu {
            stage: "scenario-reaction-batch-load",
        })?;

    let reaction_counts = thread
        .iter()
        .map(|entry| (entry.identity(), entry.record.reactions.len()))
        .collect::<Vec<_>>();
    let decorated = reaction_counts.iter().all(|(identity, count)| {
        if *identity == fixture.direct_reply.identity {
            *count == 1
        } else {
            *count == 0
        }
    });

    println!("reaction_decorated={decorated}");
    if !decorated {
        return ScenarioFailedSnafu {
            stage: "scenario-reaction-batch-assert",
            scenario: "reaction_batch",
            reason: format!("unexpected reaction counts {reaction_counts:?}"),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_direct_colors(harness: &Harness) -> RunnerResult<()> {
    let friend = harness
        .storage
        .create_individual("Direct friend")
        .context(StorageSnafu {
            stage: "scenario-direct-colors-create",
        })?;

    let colors = harness
        .loader(MessageIdentity::media(0), friend.id)
        .load_name_colors()
        .await
        .context(QuoteSnafu {
            stage: "scenario-direct-colors-load",
        })?;

    println!("direct_color_count={}", colors.len());
    if !colors.is_empty() {
        return ScenarioFailedSnafu {
            stage: "scenario-direct-colors-assert",
            scenario: "direct_colors",
            reason: "one-to-one conversation produced author colors".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

async fn run_group_colors(harness: &Harness) -> RunnerResult<()> {
    let fixture = seed_thread_fixture(harness.storage.as_ref())?;
    let colors = harness
        .loader(fixture.original.identity, fixture.group.id)
        .load_name_colors()
        .await
        .context(QuoteSnafu {
            stage: "scenario-group-colors-load",
        })?;

    let colored = colors.keys().copied().collect::<HashSet<_>>();
    let members = fixture.members.iter().copied().collect::<HashSet<_>>();
    let matches_members = colored == members;

    println!("group_color_count={}", colors.len());
    println!("group_colors_match_members={matches_members}");
    if !matches_members {
        return ScenarioFailedSnafu {
            stage: "scenario-group-colors-assert",
            scenario: "group_colors",
            reason: "color map keys differ from the group member set".to_string(),
        }
        .fail();
    }

    println!("runner_ok=true");
    Ok(())
}

fn seed_thread_fixture(storage: &SqliteStorage) -> RunnerResult<ThreadFixture> {
    let alice = storage
        .create_individual("Alice")
        .context(StorageSnafu {
            stage: "fixture-create-alice",
        })?;
    let bob = storage.create_individual("Bob").context(StorageSnafu {
        stage: "fixture-create-bob",
    })?;
    let group = storage.create_group("Fixture group").context(StorageSnafu {
        stage: "fixture-create-group",
    })?;
    let group_id = group.group_id().context(ScenarioFailedSnafu {
        stage: "fixture-group-id",
        scenario: "seed_fixture",
        reason: "created group has no group id".to_string(),
    })?;

    for member in [alice.id, bob.id] {
        storage
            .add_group_member(group_id, member)
            .context(StorageSnafu {
                stage: "fixture-add-member",
            })?;
    }

    let original = storage
        .insert_message(
            StorageClass::Media,
            NewMessage::text(group.id, alice.id, FIXTURE_BASE_MS, "Anyone up for lunch?"),
        )
        .context(StorageSnafu {
            stage: "fixture-insert-original",
        })?;
    let direct_reply = storage
        .insert_message(
            StorageClass::Media,
            NewMessage::text(group.id, bob.id, FIXTURE_BASE_MS + 1_000, "Count me in")
                .quoting(&original),
        )
        .context(StorageSnafu {
            stage: "fixture-insert-direct-reply",
        })?;
    let nested_reply = storage
        .insert_message(
            StorageClass::Media,
            NewMessage::text(group.id, alice.id, FIXTURE_BASE_MS + 2_000, "Great, noon?")
                .quoting(&direct_reply),
        )
        .context(StorageSnafu {
            stage: "fixture-insert-nested-reply",
        })?;

    Ok(ThreadFixture {
        group,
        members: vec![alice.id, bob.id],
        original,
        direct_reply,
        nested_reply,
    })
}
