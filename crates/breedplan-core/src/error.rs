//! The closed set of failures a lifecycle operation can report.
//!
//! Every variant is detected before the transaction writes anything, except
//! [`LifecycleError::Storage`] and the concurrency conflicts surfaced by
//! the database itself.

use serde::Serialize;
use uuid::Uuid;

use breedplan_db::models::{ReproAnchorMode, Species};

/// Dependent records that block a regression, uncommit, dissolve or delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockingCounts {
    pub offspring: i64,
    pub waitlist: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("validation failed: {reason}")]
    ValidationFailed {
        reason: String,
        /// Fields that must be supplied before the request can succeed.
        missing: Vec<&'static str>,
    },

    #[error("cannot change {field}: {reason}")]
    ImmutableFieldViolation { field: &'static str, reason: String },

    #[error("conflict: {reason}")]
    Conflict {
        reason: String,
        blocking: Option<BlockingCounts>,
    },

    #[error("{anchor_mode} anchoring is not available for {species}: {reason}")]
    SpeciesCapabilityViolation {
        species: Species,
        anchor_mode: ReproAnchorMode,
        reason: String,
    },

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl LifecycleError {
    pub fn plan_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "breeding plan",
            id,
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
            missing: Vec::new(),
        }
    }

    pub fn missing_fields(reason: impl Into<String>, missing: Vec<&'static str>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
            missing,
        }
    }

    pub fn immutable(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ImmutableFieldViolation {
            field,
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
            blocking: None,
        }
    }

    pub fn blocked(reason: impl Into<String>, counts: BlockingCounts) -> Self {
        Self::Conflict {
            reason: reason.into(),
            blocking: Some(counts),
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::ImmutableFieldViolation { .. } => "IMMUTABLE_FIELD_VIOLATION",
            Self::Conflict { .. } => "CONFLICT",
            Self::SpeciesCapabilityViolation { .. } => "SPECIES_CAPABILITY_VIOLATION",
            Self::Storage(_) => "STORAGE",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// PostgreSQL error codes that indicate a lost race rather than a bug:
/// unique violation, serialization failure and deadlock.
const CONFLICT_SQLSTATES: [&str; 3] = ["23505", "40001", "40P01"];

impl From<anyhow::Error> for LifecycleError {
    fn from(err: anyhow::Error) -> Self {
        let sqlstate = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<sqlx::Error>())
            .and_then(|e| e.as_database_error())
            .and_then(|db| db.code().map(|c| c.into_owned()));

        match sqlstate {
            Some(code) if CONFLICT_SQLSTATES.contains(&code.as_str()) => Self::Conflict {
                reason: format!("concurrent modification ({code}): {err:#}"),
                blocking: None,
            },
            _ => Self::Storage(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_anyhow_maps_to_storage() {
        let err: LifecycleError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.kind(), "STORAGE");
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn non_database_sqlx_error_maps_to_storage() {
        let err: LifecycleError = anyhow::Error::from(sqlx::Error::RowNotFound)
            .context("failed to fetch breeding plan")
            .into();
        assert!(matches!(err, LifecycleError::Storage(_)));
    }

    #[test]
    fn display_includes_structured_fields() {
        let err = LifecycleError::immutable("birth_date_actual", "already recorded");
        assert_eq!(
            err.to_string(),
            "cannot change birth_date_actual: already recorded"
        );

        let err = LifecycleError::SpeciesCapabilityViolation {
            species: Species::Cat,
            anchor_mode: ReproAnchorMode::Ovulation,
            reason: "induced ovulator".into(),
        };
        assert_eq!(
            err.to_string(),
            "OVULATION anchoring is not available for CAT: induced ovulator"
        );
    }

    #[test]
    fn blocked_carries_counts() {
        let err = LifecycleError::blocked(
            "offspring exist",
            BlockingCounts {
                offspring: 3,
                waitlist: 1,
            },
        );
        match err {
            LifecycleError::Conflict {
                blocking: Some(counts),
                ..
            } => assert_eq!(counts.offspring, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
