/*
[INPUT]:  Session, PIN and activity domain definitions
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions shared by every component
[UPDATE]: When persisted shapes change or new types added
*/

pub mod enums;
pub mod models;

pub use enums::*;
pub use models::*;
