#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Cron job name must not be empty")]
    EmptyName,

    #[error("Cron job {name:?} has a zero period")]
    ZeroPeriod { name: String },
}
