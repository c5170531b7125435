//! Durable persistence contract for jobs, miners, payments, and receipts.
//!
//! Defines the [`Store`] trait, typed operations rather than raw queries,
//! plus [`MemStore`], an in-process reference implementation giving the
//! serializable, cross-entity-transaction semantics the rest of the
//! coordinator relies on.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod error;
mod mem;
mod traits;

pub use error::StoreError;
pub use mem::MemStore;
pub use traits::{PaymentSettlement, Store, StoreStats};
