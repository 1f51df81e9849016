use std::{cell::RefCell, path::PathBuf, rc::Rc};

use weir_buf::RingBuffer;

use crate::{
    HttpEventer, HttpHead, HttpMethod, Url,
    head::reason_phrase,
    station::StationId,
};

bitflags::bitflags! {
    /// Per-exchange state captured from the parser plus output-side
    /// decisions.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct MsgFlags: u16 {
        /// Inbound body uses chunked transfer coding.
        const CHUNKED_IN = 1 << 0;
        /// Outbound body will be chunked.
        const CHUNKED_OUT = 1 << 1;
        const KEEP_ALIVE = 1 << 2;
        const UPGRADE = 1 << 3;
        const CONTENT_LENGTH = 1 << 4;
        const BOUNDARY = 1 << 5;
        const HEAD_DONE = 1 << 6;
        const SKIP_BODY = 1 << 7;
        /// Inbound message fully received.
        const TAILING = 1 << 8;
        /// The eventer's on_open already ran.
        const OPENED = 1 << 9;
    }
}

/// One HTTP exchange: parsed request state, decoded body bytes, and
/// the serialized response awaiting the wire.
pub struct HttpMsg {
    /// Decoded inbound body bytes.
    pub cache_in: RingBuffer,
    /// Serialized outbound head and body.
    pub cache_out: RingBuffer,
    pub head_in: HttpHead,
    pub head_out: HttpHead,
    pub url: Url,
    pub method: HttpMethod,
    pub status: u16,
    pub flags: MsgFlags,
    station: StationId,
    /// Filesystem path the URL resolved to.
    pub real_path: PathBuf,
    pub mime: &'static str,
    event: Option<Rc<RefCell<dyn HttpEventer>>>,
}

impl Default for HttpMsg {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpMsg {
    pub fn new() -> Self {
        Self {
            cache_in: RingBuffer::new(),
            cache_out: RingBuffer::new(),
            head_in: HttpHead::new(),
            head_out: HttpHead::new(),
            url: Url::default(),
            method: HttpMethod::Get,
            status: 200,
            flags: MsgFlags::empty(),
            station: StationId::Init,
            real_path: PathBuf::new(),
            mime: "application/octet-stream",
            event: None,
        }
    }

    #[inline]
    pub fn station(&self) -> StationId {
        self.station
    }

    #[inline]
    pub fn set_station(&mut self, id: StationId) {
        self.station = id;
    }

    pub fn set_event(&mut self, evt: Rc<RefCell<dyn HttpEventer>>) {
        self.event = Some(evt);
    }

    pub fn event(&self) -> Option<Rc<RefCell<dyn HttpEventer>>> {
        self.event.clone()
    }

    pub fn take_event(&mut self) -> Option<Rc<RefCell<dyn HttpEventer>>> {
        self.event.take()
    }

    #[inline]
    pub fn is_keep_alive(&self) -> bool {
        self.flags.contains(MsgFlags::KEEP_ALIVE)
    }

    /// Appends the status line to the outbound cache.
    pub fn write_status(&mut self, code: u16) {
        self.status = code;
        let line = format!("HTTP/1.1 {code} {}\r\n", reason_phrase(code));
        self.cache_out.write(line.as_bytes());
    }

    /// Appends every outbound header after the status line. The head
    /// block stays open; write `\r\n` to close it.
    pub fn dump_head_out(&mut self) {
        let mut buf = Vec::with_capacity(256);
        self.head_out.dump_into(&mut buf);
        self.cache_out.write(&buf);
    }

    /// Appends raw bytes to the outbound cache.
    pub fn write_out(&mut self, bytes: &[u8]) {
        self.cache_out.write(bytes);
    }

    /// Appends one chunked-coded body chunk.
    pub fn write_out_chunk(&mut self, bytes: &[u8]) {
        let prefix = format!("{:x}\r\n", bytes.len());
        self.cache_out.write(prefix.as_bytes());
        self.cache_out.write(bytes);
        self.cache_out.write(b"\r\n");
    }

    /// Terminates a chunked response body.
    pub fn write_out_chunk_end(&mut self) {
        self.cache_out.write(b"0\r\n\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_and_head_serialization() {
        let mut msg = HttpMsg::new();
        msg.head_out.add(b"Host", b"here");
        msg.write_status(404);
        msg.dump_head_out();
        msg.write_out(b"\r\n");
        let mut out = vec![0u8; msg.cache_out.len()];
        msg.cache_out.read(&mut out);
        assert_eq!(out, b"HTTP/1.1 404 Not Found\r\nHost: here\r\n\r\n");
    }

    #[test]
    fn chunk_helpers() {
        let mut msg = HttpMsg::new();
        msg.write_out_chunk(b"hello");
        msg.write_out_chunk_end();
        let mut out = vec![0u8; msg.cache_out.len()];
        msg.cache_out.read(&mut out);
        assert_eq!(out, b"5\r\nhello\r\n0\r\n\r\n");
    }
}
