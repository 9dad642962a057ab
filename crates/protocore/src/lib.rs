//! An embeddable runtime for a prototype-based, dynamically-typed object
//! model over persistently-immutable data structures, with controlled
//! mutable-reference identity and a concurrent generational collector
//! underneath (`protocore_gc`).
//!
//! A [`space::Space`] is the unit of isolation: it owns one garbage
//! collector, one mutable-reference table, one tuple/string interner, and
//! one module registry. Everything else in this crate — values, maps,
//! lists, ropes, objects, execution contexts — is a thin, `Copy`-able
//! handle into cells that collector owns.

pub mod arithmetic;
pub mod attribute;
pub mod bigint;
pub mod callbacks;
pub mod config;
pub mod context;
pub mod error;
pub mod external;
pub(crate) mod kinds;
pub(crate) mod layout;
pub mod list;
pub mod map;
pub mod method;
pub mod module;
pub mod object;
pub mod rope;
pub mod set;
pub mod space;
pub mod thread;
pub mod value;

pub use config::SpaceConfig;
pub use error::{CoreError, CoreResult};
pub use space::Space;
pub use value::Handle;

/// A shared handle to the collector backing one [`space::Space`]. Every
/// container and object constructor in this crate takes one of these to
/// allocate cells, rather than the whole `Space`, so that container logic
/// stays decoupled from space-level concerns (callbacks, module loading).
pub type Gc = std::sync::Arc<protocore_gc::GarbageCollector>;
