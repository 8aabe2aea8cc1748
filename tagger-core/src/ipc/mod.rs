//! Serializable types handed to the outer interface layer (REST, GUI, CLI).
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` with camelCase
//! field names.

pub mod events;
