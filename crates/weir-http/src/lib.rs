//! HTTP/1.x parsing and serving.
//!
//! [`HttpParser`] is a byte-at-a-time resumable state machine feeding
//! an [`HttpSink`]. On the server side, [`HttpLayer`] owns a parser
//! and drives each exchange as an [`HttpMsg`] through the station
//! pipeline; pluggable [`HttpEventer`]s supply and consume bodies.
//! The layer is transport-agnostic: bytes in through
//! [`HttpLayer::feed`], bytes out through its message's output ring.

mod error;
mod eventer;
mod head;
mod layer;
mod mime;
mod msg;
mod parser;
mod station;
mod url;

pub use error::HttpError;
pub use eventer::{DirListEvt, EvtResult, FileReadEvt, FileSaveEvt, HttpEventer, StockErrorEvt};
pub use head::HttpHead;
pub use layer::{HttpLayer, LayerOutcome, WebsiteCfg};
pub use mime::mime_for_path;
pub use msg::{HttpMsg, MsgFlags};
pub use parser::{
    HeadAction, HttpMethod, HttpParser, MessageKind, ParseMode, ParserKind, SinkResult, HttpSink,
};
pub use station::StationId;
pub use url::{Url, simplify_path};
