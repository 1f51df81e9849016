use std::path::PathBuf;

use tracing::{debug, warn};
use weir_buf::RingBuffer;

use crate::{
    HeadAction, HttpError, HttpMsg, HttpParser, HttpSink, ParseMode, ParserKind,
    SinkResult, StationId,
    eventer::ERROR_BODY,
    head::reason_phrase,
    msg::MsgFlags,
    station::{Step, run_pipeline},
};

/// Serving configuration one layer works against.
#[derive(Clone, Debug)]
pub struct WebsiteCfg {
    /// Document root for file targets.
    pub root: PathBuf,
    /// Host header value stamped on responses.
    pub host: String,
    /// Whether keep-alive is honored at all.
    pub keep_alive: bool,
    pub parse_mode: ParseMode,
}

impl Default for WebsiteCfg {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            host: "127.0.0.1".into(),
            keep_alive: true,
            parse_mode: ParseMode::Strict,
        }
    }
}

/// What the transport should do after a layer call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerOutcome {
    /// Close the connection once pending output is flushed.
    pub close: bool,
}

/// One HTTP connection: parser state, the active exchange, and the
/// queue of bytes not yet consumed by the parser.
///
/// Transport-agnostic. The owner feeds inbound bytes with [`feed`],
/// drains [`pending_output`] to the wire, acknowledges with
/// [`consume_output`], and calls [`on_output_drained`] so response
/// streaming can continue.
pub struct HttpLayer {
    parser: HttpParser,
    site: WebsiteCfg,
    msg: Option<HttpMsg>,
    inbuf: RingBuffer,
    close_after: bool,
    messages_served: u64,
}

struct LayerSink<'a> {
    msg: &'a mut Option<HttpMsg>,
    site: &'a WebsiteCfg,
    failed: bool,
}

impl LayerSink<'_> {
    /// The request-side stations only run while the message is still
    /// in its inbound phase; once an error (or the response) started,
    /// late parse events are absorbed.
    fn request_phase(&self) -> bool {
        self.msg
            .as_ref()
            .is_some_and(|m| m.station() < StationId::RespHead)
    }

    /// Runs the station the message was just moved into, once.
    fn step_once(&mut self) -> SinkResult {
        let Some(msg) = self.msg.as_mut() else {
            return SinkResult::Abort;
        };
        match crate::station::step_msg(msg, self.site) {
            Step::Ok | Step::Retry => SinkResult::Continue,
            Step::Error => self.enter_error(),
        }
    }

    /// Runs the pipeline to a settle point (Retry or terminal).
    fn run(&mut self) -> SinkResult {
        let Some(msg) = self.msg.as_mut() else {
            return SinkResult::Abort;
        };
        match run_pipeline(msg, self.site) {
            Step::Ok | Step::Retry => SinkResult::Continue,
            Step::Error => self.enter_error(),
        }
    }

    fn enter_error(&mut self) -> SinkResult {
        self.failed = true;
        if let Some(msg) = self.msg.as_mut() {
            if msg.station() < StationId::Error {
                msg.set_station(StationId::Error);
                let _ = run_pipeline(msg, self.site);
            }
        }
        SinkResult::Continue
    }
}

impl HttpSink for LayerSink<'_> {
    fn on_msg_begin(&mut self) -> SinkResult {
        if self.msg.is_some() {
            // A pipelined request arrived while the previous response
            // is still streaming; hold it until the exchange closes.
            return SinkResult::Pause;
        }
        *self.msg = Some(HttpMsg::new());
        SinkResult::Continue
    }

    fn on_url(&mut self, url: &[u8]) -> SinkResult {
        // A message held back at msg-begin (pipelining pause) has no
        // object yet when parsing resumes; make one now.
        if self.msg.is_none() {
            *self.msg = Some(HttpMsg::new());
        }
        if !self.request_phase() {
            return SinkResult::Continue;
        }
        let Some(msg) = self.msg.as_mut() else {
            return SinkResult::Abort;
        };
        match crate::url::parse_url(url, false) {
            Ok(parsed) => {
                msg.url = parsed;
                msg.set_station(StationId::Path);
                self.step_once()
            }
            Err(_) => SinkResult::Abort,
        }
    }

    fn on_header(&mut self, key: &[u8], value: &[u8]) -> SinkResult {
        if !self.request_phase() {
            return SinkResult::Continue;
        }
        let Some(msg) = self.msg.as_mut() else {
            return SinkResult::Abort;
        };
        msg.head_in.add(key, value);
        SinkResult::Continue
    }

    fn on_head_done(&mut self, parser: &HttpParser) -> HeadAction {
        if !self.request_phase() {
            return HeadAction::Normal;
        }
        let keep_alive = self.site.keep_alive && parser.should_keep_alive();
        let Some(msg) = self.msg.as_mut() else {
            return HeadAction::Abort;
        };
        msg.method = parser.method();
        msg.flags.set(MsgFlags::KEEP_ALIVE, keep_alive);
        msg.flags.set(MsgFlags::CHUNKED_IN, parser.is_chunked());
        msg.flags.set(MsgFlags::UPGRADE, parser.is_upgrade());
        msg.flags.set(MsgFlags::BOUNDARY, parser.boundary().is_some());
        msg.flags
            .set(MsgFlags::CONTENT_LENGTH, parser.content_length().is_some());
        msg.set_station(StationId::Head);
        match self.step_once() {
            SinkResult::Continue => HeadAction::Normal,
            SinkResult::Pause => HeadAction::Pause,
            SinkResult::Abort => HeadAction::Abort,
        }
    }

    fn on_body(&mut self, bytes: &[u8]) -> SinkResult {
        if !self.request_phase() {
            return SinkResult::Continue;
        }
        let Some(msg) = self.msg.as_mut() else {
            return SinkResult::Abort;
        };
        msg.cache_in.write(bytes);
        msg.set_station(StationId::Body);
        self.step_once()
    }

    fn on_msg_end(&mut self) -> SinkResult {
        if !self.request_phase() {
            return SinkResult::Continue;
        }
        let Some(msg) = self.msg.as_mut() else {
            return SinkResult::Abort;
        };
        msg.set_station(StationId::BodyDone);
        self.run()
    }
}

impl HttpLayer {
    pub fn new(site: WebsiteCfg) -> Self {
        let mode = site.parse_mode;
        Self {
            parser: HttpParser::new(ParserKind::Request, mode),
            site,
            msg: None,
            inbuf: RingBuffer::new(),
            close_after: false,
            messages_served: 0,
        }
    }

    #[inline]
    pub fn messages_served(&self) -> u64 {
        self.messages_served
    }

    /// Bytes arrived from the transport.
    pub fn feed(&mut self, bytes: &[u8]) -> LayerOutcome {
        self.inbuf.write(bytes);
        self.pump_parser();
        self.finish_exchange_if_done();
        LayerOutcome { close: self.close_after && self.pending_output().is_empty() }
    }

    /// Serialized response bytes waiting for the wire.
    pub fn pending_output(&self) -> &[u8] {
        self.msg.as_ref().map_or(&[], |m| m.cache_out.peek_head())
    }

    pub fn consume_output(&mut self, n: usize) {
        if let Some(msg) = self.msg.as_mut() {
            msg.cache_out.commit_head(n);
        }
    }

    /// The transport flushed everything it had; resume response
    /// streaming and possibly finish the exchange.
    pub fn on_output_drained(&mut self) -> LayerOutcome {
        if let Some(msg) = self.msg.as_mut() {
            let _ = run_pipeline(msg, &self.site);
        }
        self.finish_exchange_if_done();
        LayerOutcome { close: self.close_after && self.pending_output().is_empty() }
    }

    /// The transport hit end-of-stream.
    pub fn on_eof(&mut self) -> LayerOutcome {
        struct NullSink;
        impl HttpSink for NullSink {}
        let mut sink = NullSink;
        let _ = self.parser.finish(&mut sink);
        self.close_after = true;
        LayerOutcome { close: self.pending_output().is_empty() }
    }

    fn pump_parser(&mut self) {
        if self.close_after {
            // An error response is already on its way out; whatever
            // else the peer sent no longer matters.
            return;
        }
        loop {
            let chunk = self.inbuf.peek_head().to_vec();
            if chunk.is_empty() {
                return;
            }
            let mut sink =
                LayerSink { msg: &mut self.msg, site: &self.site, failed: false };
            match self.parser.parse(&mut sink, &chunk) {
                Ok(consumed) => {
                    let failed = sink.failed;
                    self.inbuf.commit_head(consumed);
                    if failed {
                        // Station pipeline routed to the error station;
                        // the serialized error response is already in
                        // the outbound cache.
                        self.close_after = true;
                    }
                    if self.parser.is_paused() {
                        return;
                    }
                    if self.parser.is_upgrade() {
                        warn!("upgrade requested; tunneling unsupported, closing");
                        self.close_after = true;
                        return;
                    }
                    if consumed == 0 {
                        return;
                    }
                }
                Err(err) => {
                    self.respond_parse_error(&err);
                    return;
                }
            }
        }
    }

    /// Answers a malformed request with a minimal error response and
    /// arranges for close.
    fn respond_parse_error(&mut self, err: &HttpError) {
        debug!(error = %err, "request rejected");
        let code = match err {
            HttpError::HeaderOverflow => 431,
            HttpError::InvalidVersion => 505,
            _ => 400,
        };
        let msg = self.msg.get_or_insert_with(HttpMsg::new);
        msg.cache_out.reset();
        let head = format!(
            "HTTP/1.1 {code} {}\r\nConnection: close\r\nContent-Type: text/html;charset=utf-8\r\nContent-Length: {}\r\n\r\n",
            reason_phrase(code),
            ERROR_BODY.len()
        );
        msg.cache_out.write(head.as_bytes());
        msg.cache_out.write(ERROR_BODY);
        msg.set_station(StationId::RespBodyDone);
        self.close_after = true;
    }

    /// Tears down a finished exchange; with keep-alive the layer is
    /// immediately ready for the next request.
    fn finish_exchange_if_done(&mut self) {
        let Some(msg) = self.msg.as_mut() else {
            return;
        };
        if msg.station() != StationId::RespBodyDone && msg.station() != StationId::Close {
            return;
        }
        if !msg.cache_out.is_empty() {
            return;
        }
        // Drive RespBodyDone into Close and run the close station.
        let _ = run_pipeline(msg, &self.site);
        if msg.station() != StationId::Close {
            return;
        }
        let keep_alive = msg.is_keep_alive();
        let _ = crate::station::step_msg(msg, &self.site);
        self.messages_served += 1;
        self.msg = None;
        if keep_alive && !self.close_after {
            // Resume a pipelined request the parser may be holding.
            if self.parser.is_paused() {
                self.parser.resume();
                self.pump_parser();
            }
        } else {
            self.close_after = true;
        }
    }
}
