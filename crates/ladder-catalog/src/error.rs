use crate::ids::{ChartGroupId, EntityRef, FilterId, GameId};
use crate::model::ChartGroupKind;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(EntityRef),

    #[error("{0} already exists")]
    DuplicateId(EntityRef),

    #[error("no {0} ids left")]
    IdSpaceExhausted(&'static str),

    #[error("implication {chosen} -> {implied} rejected: {reason}")]
    CyclicImplication {
        chosen: FilterId,
        implied: FilterId,
        reason: String,
    },

    #[error("{group} is not a {expected:?} chart group")]
    WrongGroupKind {
        group: ChartGroupId,
        expected: ChartGroupKind,
    },

    #[error("{entity} does not belong to {game}")]
    ForeignGame { entity: EntityRef, game: GameId },

    #[error("{game} already has a ladder at order {order}")]
    DuplicateLadderOrder { game: GameId, order: i32 },

    #[error("{0} is not a chosen filter")]
    NotChosen(FilterId),

    #[error("{filter} is outside the scope of {scope}")]
    FilterOutOfScope { filter: FilterId, scope: EntityRef },

    #[error("invalid catalog snapshot: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub fn not_found(entity: impl Into<EntityRef>) -> Self {
        CatalogError::NotFound(entity.into())
    }
}
