//! Reliable, ordered, fragmented delivery over unreliable datagrams.
//!
//! A single [`Rudp`] instance is one end of a conversation. The engine
//! is pure protocol: datagrams come in through [`Rudp::input`], leave
//! through the closure handed to [`Rudp::update`], and time is always
//! an argument — there is no socket and no clock in here.

mod engine;
mod segment;

pub use engine::{FastAck, Rudp, RudpError};
pub use segment::{
    CMD_ACK, CMD_PUSH, CMD_WASK, CMD_WINS, MTU_DEFAULT, OVERHEAD, SegmentHeader, WND_RCV, WND_SND,
    peek_conv,
};
