//! Live network stream
//!
//! Samples are staged in a bounded buffer and shipped as one framed record
//! whenever the buffer could not take another worst-case sample or the
//! configured wait has passed. Transmission is delegated to a
//! [`NetworkSender`]; failures drop the record and are only counted.

mod assembler;
mod sender;

pub use assembler::{StreamAction, StreamAssembler};
pub use sender::{NetworkSender, NullSender};
