//! Container load planning: a 3D packing engine over maximal free spaces,
//! the plan lifecycle around it, and scannable placement identifiers.

pub mod config;
pub mod free_space;
pub mod geometry;
pub mod job;
pub mod lifecycle;
pub mod model;
pub mod optimizer;
pub mod placement_id;
pub mod request;
pub mod types;
