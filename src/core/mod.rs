//! Shadow encoding core.
//!
//! Leaf components the shadow engine is assembled from: the gate, the address
//! mapper, the owned arena, the fill strategies, the redzone encoder and the
//! page release contract.

pub mod arena;
pub mod filler;
pub mod gate;
pub mod mapper;
pub mod marker;
pub mod reclaimer;
pub mod redzone;
