//! Domain types shared across modules.
//!
//! [`EntityKind`] tags which horizontal entity a field or table lives on.
//!
//! # Example
//!
//! ```
//! use nh_dycore::types::EntityKind;
//!
//! assert_eq!(EntityKind::Edge.lateral_boundary_rows(), 8);
//! ```

mod entity;

pub use entity::EntityKind;
