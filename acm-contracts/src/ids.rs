//! Identifier newtypes shared across the pipeline.
//!
//! All ids are UUIDv4 per spec.md §6.5 ("all ids ULID or UUID"); we pick UUID
//! since it has first-class `uuid` crate + serde support already used
//! throughout the teacher codebase.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(RunId);
id_newtype!(DocumentId);
id_newtype!(ArtifactId);
id_newtype!(EvalResultId);
id_newtype!(PairwiseComparisonId);
id_newtype!(GenerationTaskId);
