//! # netaddr - Named address allocation over a versioned key-value store
//!
//! This library hands out IPv4, MAC and IPv6 addresses from named ranges and
//! binds each one to a caller chosen name. All state lives in a strongly
//! consistent, versioned key-value store; every mutation is one guarded
//! transaction, so any number of processes can allocate from the same
//! ranges without coordinating with each other.
//!
//! ## Key Features
//!
//! - **Hardcoded addresses**: pin a specific address to a name
//! - **Generated addresses**: reuse released addresses first, then advance a
//!   monotonic cursor that skips hardcoded addresses
//! - **Multi-range operations**: spill over into the next range when one is
//!   full, with names kept unique across the whole set
//! - **Strict or tolerant policy** for state that already exists or is gone
//! - **Introspection**: listings, usage and a JSON keyspace export
//!
//! ## Architecture
//!
//! - `address`: range types and the byte codecs for each address kind
//! - `store`: the `KvStore` contract plus in-memory and file backed stores
//! - `allocator`: range registry, allocators, introspection, coordinator
//! - `error`: the `AllocError` taxonomy
//! - `config` / `config_loader`: YAML configuration of the CLI
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use netaddr::address::RangeType;
//! use netaddr::allocator::{AddressRange, Allocator, EngineSettings};
//! use netaddr::store::MemoryStore;
//!
//! let allocator = Allocator::new(MemoryStore::new(), EngineSettings::default());
//! let range = AddressRange::parse(RangeType::Ipv4, "10.0.0.4", "10.0.0.6")?;
//! allocator.create_range("/netaddr/lan/", &range)?;
//!
//! let address = allocator.create_generated_address("/netaddr/lan/", "web")?;
//! assert_eq!(range.format(&address), "10.0.0.4");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`error::AllocError`], built with `thiserror`.
//! The `netaddr` binary reports errors through `color_eyre`.

pub mod address;
pub mod allocator;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod store;

pub use address::RangeType;
pub use allocator::{AddressRange, Allocator, EngineSettings, Policy};
pub use error::AllocError;
pub use store::{FileStore, KvStore, MemoryStore};
