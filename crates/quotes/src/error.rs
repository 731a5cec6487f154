use quoteline_storage::StorageError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QuoteError {
    #[snafu(display("store call failed on `{stage}`: {source}"))]
    Storage {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("background worker failed on `{stage}`: {source}"))]
    WorkerJoin {
        stage: &'static str,
        source: tokio::task::JoinError,
    },
    #[snafu(display("background worker for `{stage}` went away before delivering a result"))]
    WorkerGone { stage: &'static str },
    #[snafu(display("name color '{raw}' is not a #RRGGBB hex value"))]
    InvalidNameColor { stage: &'static str, raw: String },
    #[snafu(display("name color palette is empty"))]
    EmptyPalette { stage: &'static str },
}

pub type QuoteResult<T> = Result<T, QuoteError>;
