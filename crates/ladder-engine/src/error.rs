use ladder_catalog::{ChartId, EntityRef, FilterId, GameId, LadderId, RecordId};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(EntityRef),

    #[error("{filter} is not {expected} filter")]
    WrongFilterKind {
        filter: FilterId,
        expected: &'static str,
    },

    #[error("materialized index for {record} disagrees with the implication graph: missing {missing:?}, stale {stale:?}")]
    InconsistentIndex {
        record: RecordId,
        missing: Vec<FilterId>,
        stale: Vec<FilterId>,
    },

    #[error("implication {chosen} -> {implied} rejected: {reason}")]
    CyclicImplication {
        chosen: FilterId,
        implied: FilterId,
        reason: String,
    },

    #[error("{ladder} ranks charts of {ladder_game}, but {chart} belongs to {chart_game}")]
    LadderNotApplicable {
        ladder: LadderId,
        ladder_game: GameId,
        chart: ChartId,
        chart_game: GameId,
    },

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn not_found(entity: impl Into<EntityRef>) -> Self {
        EngineError::NotFound(entity.into())
    }
}
