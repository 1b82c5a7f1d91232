//! Named-graph quad storage for the entry repository.
//!
//! Every statement belongs to a named graph. Terms are interned into a
//! dictionary and quads are kept in four covering indexes so that any
//! combination of bound positions is answered by a prefix scan.

mod store;
mod term;

pub use store::{QuadStore, Transaction};
pub use term::{Literal, Pattern, Quad, Term, Triple};
