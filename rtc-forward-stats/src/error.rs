use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("bucket width must be greater than zero")]
    ErrZeroBucketWidth,
    #[error("window length {window:?} is shorter than bucket width {bucket_width:?}")]
    ErrWindowShorterThanBucket {
        window: Duration,
        bucket_width: Duration,
    },
    #[error("window needs {buckets} buckets, more than the maximum of {max}")]
    ErrTooManyBuckets { buckets: u128, max: usize },
    #[error("report interval must be greater than zero")]
    ErrZeroReportInterval,
    #[error("report interval {0:?} is too large to schedule")]
    ErrReportIntervalTooLarge(Duration),
    #[error("periodic reporter requires a running tokio runtime")]
    ErrNoRuntime,
}
