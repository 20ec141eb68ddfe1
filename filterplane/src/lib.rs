//! A constant-time IPv6 5-tuple packet classifier and hot-reconfigurable
//! packet pipeline.
//!
//! [`acl::AclCompiler`] turns a list of [`rule::Rule`]s into a
//! [`classify::CompiledFilter`]: a cascade of rectangular lookup tables
//! that resolves any packet to the action of its first matching rule in a
//! fixed number of table reads, independent of rule count. [`pipeline`]
//! chains that (and any other) [`module::Module`] into an ordered,
//! atomically-swappable processing pipeline that [`worker::Worker`] drives
//! against a packet source and sink.

pub mod acl;
pub mod classify;
pub mod collector;
pub mod error;
pub mod lpm64;
pub mod module;
pub mod packet;
pub mod pipeline;
pub mod radix64;
pub mod registry;
pub mod remap;
pub mod rule;
pub mod value_table;
pub mod worker;

pub use acl::AclCompiler;
pub use classify::CompiledFilter;
pub use error::{CompileError, ReconfigureError};
pub use rule::{PortRange, Prefix, Rule};
