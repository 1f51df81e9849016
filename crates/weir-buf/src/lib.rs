mod frame;
mod iobuf;
mod pool;
mod ring;

pub use frame::{FRAME_HEADER_LEN, MsgFrame, SnCounter};
pub use iobuf::IoBuf;
pub use pool::{Pool, PoolId};
pub use ring::{BLOCK_SIZE, BufPos, RingBuffer};
