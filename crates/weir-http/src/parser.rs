use tracing::trace;

use crate::HttpError;

/// Default cap on bytes consumed before the body starts (request line
/// plus headers, and chunk-size lines / trailers later).
pub const MAX_HEADER_BYTES: usize = 80 * 1024;

const MAX_BOUNDARY: usize = 256;
/// Sentinel: no Content-Length seen.
const LEN_UNSET: u64 = u64::MAX;

/// What the parser accepts on this connection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ParserKind {
    Request,
    Response,
    #[default]
    Both,
}

/// What the current message turned out to be.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MessageKind {
    #[default]
    Unknown,
    Request,
    Response,
}

/// Strictness of wire-format acceptance. Lenient tolerates bare-LF
/// line endings and relaxes the transfer-encoding/content-length
/// interaction rules.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ParseMode {
    #[default]
    Strict,
    Lenient,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    Copy,
    Lock,
    Mkcol,
    Move,
    Propfind,
    Proppatch,
    Search,
    Unlock,
    Bind,
    Rebind,
    Unbind,
    Acl,
    Report,
    Mkactivity,
    Checkout,
    Merge,
    MSearch,
    Notify,
    Subscribe,
    Unsubscribe,
    Purge,
    Mkcalendar,
    Link,
    Unlink,
}

impl HttpMethod {
    fn from_token(token: &[u8]) -> Option<Self> {
        Some(match token {
            b"GET" => Self::Get,
            b"HEAD" => Self::Head,
            b"POST" => Self::Post,
            b"PUT" => Self::Put,
            b"DELETE" => Self::Delete,
            b"CONNECT" => Self::Connect,
            b"OPTIONS" => Self::Options,
            b"TRACE" => Self::Trace,
            b"PATCH" => Self::Patch,
            b"COPY" => Self::Copy,
            b"LOCK" => Self::Lock,
            b"MKCOL" => Self::Mkcol,
            b"MOVE" => Self::Move,
            b"PROPFIND" => Self::Propfind,
            b"PROPPATCH" => Self::Proppatch,
            b"SEARCH" => Self::Search,
            b"UNLOCK" => Self::Unlock,
            b"BIND" => Self::Bind,
            b"REBIND" => Self::Rebind,
            b"UNBIND" => Self::Unbind,
            b"ACL" => Self::Acl,
            b"REPORT" => Self::Report,
            b"MKACTIVITY" => Self::Mkactivity,
            b"CHECKOUT" => Self::Checkout,
            b"MERGE" => Self::Merge,
            b"M-SEARCH" => Self::MSearch,
            b"NOTIFY" => Self::Notify,
            b"SUBSCRIBE" => Self::Subscribe,
            b"UNSUBSCRIBE" => Self::Unsubscribe,
            b"PURGE" => Self::Purge,
            b"MKCALENDAR" => Self::Mkcalendar,
            b"LINK" => Self::Link,
            b"UNLINK" => Self::Unlink,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Patch => "PATCH",
            Self::Copy => "COPY",
            Self::Lock => "LOCK",
            Self::Mkcol => "MKCOL",
            Self::Move => "MOVE",
            Self::Propfind => "PROPFIND",
            Self::Proppatch => "PROPPATCH",
            Self::Search => "SEARCH",
            Self::Unlock => "UNLOCK",
            Self::Bind => "BIND",
            Self::Rebind => "REBIND",
            Self::Unbind => "UNBIND",
            Self::Acl => "ACL",
            Self::Report => "REPORT",
            Self::Mkactivity => "MKACTIVITY",
            Self::Checkout => "CHECKOUT",
            Self::Merge => "MERGE",
            Self::MSearch => "M-SEARCH",
            Self::Notify => "NOTIFY",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Purge => "PURGE",
            Self::Mkcalendar => "MKCALENDAR",
            Self::Link => "LINK",
            Self::Unlink => "UNLINK",
        }
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    struct Flags: u16 {
        const CHUNKED              = 1 << 0;
        const CONNECTION_KEEP_ALIVE = 1 << 1;
        const CONNECTION_CLOSE     = 1 << 2;
        const CONNECTION_UPGRADE   = 1 << 3;
        const TRAILING             = 1 << 4;
        const UPGRADE              = 1 << 5;
        const SKIPBODY             = 1 << 6;
        const CONTENT_LENGTH       = 1 << 7;
        const BOUNDARY             = 1 << 8;
        const HEAD_DONE            = 1 << 9;
        const BOUNDARY_MUST_MATCH  = 1 << 10;
    }
}

/// Return value for most sink callbacks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SinkResult {
    #[default]
    Continue,
    /// Stop consuming; `parse` returns the bytes taken so far and the
    /// parser stays resumable after [`HttpParser::resume`].
    Pause,
    /// Abort the message with a callback error.
    Abort,
}

/// Return value for the headers-complete callback.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum HeadAction {
    #[default]
    Normal,
    /// The message has no body regardless of framing headers (HEAD
    /// response, 204, ...).
    SkipBody,
    /// Treat the rest of the stream as a different protocol.
    Upgrade,
    Pause,
    Abort,
}

/// Receiver of parse events. Spans handed to callbacks are valid only
/// for the duration of the call.
pub trait HttpSink {
    fn on_msg_begin(&mut self) -> SinkResult {
        SinkResult::Continue
    }
    fn on_url(&mut self, _url: &[u8]) -> SinkResult {
        SinkResult::Continue
    }
    fn on_status(&mut self, _status: &[u8]) -> SinkResult {
        SinkResult::Continue
    }
    fn on_header(&mut self, _key: &[u8], _value: &[u8]) -> SinkResult {
        SinkResult::Continue
    }
    fn on_head_done(&mut self, _parser: &HttpParser) -> HeadAction {
        HeadAction::Normal
    }
    fn on_chunk_head(&mut self, _size: u64) -> SinkResult {
        SinkResult::Continue
    }
    fn on_body(&mut self, _bytes: &[u8]) -> SinkResult {
        SinkResult::Continue
    }
    fn on_chunk_tail(&mut self) -> SinkResult {
        SinkResult::Continue
    }
    fn on_msg_end(&mut self) -> SinkResult {
        SinkResult::Continue
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Dead,
    StartReqOrRes,
    ResOrReqH,
    StartReq,
    StartRes,
    ResHttpMatch,
    ResHttpMajor,
    ResHttpMinor,
    ResStatusCodeStart,
    ResStatusCode,
    ResStatusStart,
    ResStatus,
    ResLineAlmostDone,
    ReqMethod,
    ReqSpacesBeforeUrl,
    ReqUrl,
    ReqHttpMatch,
    ReqHttpMajor,
    ReqHttpMinor,
    ReqLineAlmostDone,
    HeaderFieldStart,
    HeaderField,
    HeaderValueDiscardWs,
    HeaderValueDiscardWsAlmostDone,
    HeaderValueDiscardLws,
    HeaderValue,
    HeaderAlmostDone,
    HeaderValueLws,
    HeadersAlmostDone,
    ChunkSizeStart,
    ChunkSize,
    ChunkParameters,
    ChunkSizeAlmostDone,
    ChunkData,
    ChunkDataAlmostDone,
    ChunkDataDone,
    BoundaryBody,
    BodyIdentity,
    BodyIdentityEof,
    MessageDone,
}

/// Classification of the header currently being parsed, decided when
/// the field name completes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
enum HeaderKind {
    #[default]
    General,
    Connection,
    ContentLength,
    ContentType,
    ContentDisposition,
    TransferEncoding,
    Upgrade,
}

/// Multipart body scanning state, preserved across feeds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BoundaryState {
    /// Plain body bytes.
    Body,
    /// Saw CR, waiting for LF.
    CmpPre,
    /// Saw (CR)LF, waiting for the first '-'.
    CmpDash1,
    /// Waiting for the second '-'.
    CmpDash2,
    /// Comparing boundary bytes at `index`.
    Cmp,
    /// Full boundary matched, waiting for LF (part separator).
    CmpDone,
    /// Boundary plus one '-': one more ends the multipart body.
    CmpTail,
}

/// Incremental HTTP/1.x message parser.
///
/// Purely a byte-at-a-time machine: feed any split of the stream and
/// the callback sequence is identical. All state lives in fields;
/// header names, values and the URL accumulate in owned scratch
/// buffers so spans survive arbitrary fragmentation.
pub struct HttpParser {
    kind: ParserKind,
    mode: ParseMode,
    /// Permit Content-Length alongside `Transfer-Encoding: chunked`.
    pub allow_chunked_length: bool,
    max_header_bytes: usize,

    state: State,
    header_kind: HeaderKind,
    boundary_state: BoundaryState,
    message_kind: MessageKind,
    flags: Flags,
    paused: bool,
    error: Option<HttpError>,

    /// Bytes consumed in the current header region (overflow guard).
    nread: usize,
    /// Declared content length, or chunk size while chunk-parsing.
    content_length: u64,
    method: HttpMethod,
    status_code: u16,
    http_major: u8,
    http_minor: u8,
    upgrade: bool,
    uses_transfer_encoding: bool,
    seen_final_chunked: bool,

    index: usize,
    scratch_method: Vec<u8>,
    scratch_url: Vec<u8>,
    scratch_status: Vec<u8>,
    scratch_key: Vec<u8>,
    scratch_value: Vec<u8>,

    boundary: [u8; MAX_BOUNDARY],
    boundary_len: usize,
    /// Candidate boundary marker bytes held back from the body.
    boundary_held: Vec<u8>,
    disp_name: Vec<u8>,
    disp_filename: Vec<u8>,
}

impl HttpParser {
    pub fn new(kind: ParserKind, mode: ParseMode) -> Self {
        let state = match kind {
            ParserKind::Request => State::StartReq,
            ParserKind::Response => State::StartRes,
            ParserKind::Both => State::StartReqOrRes,
        };
        Self {
            kind,
            mode,
            allow_chunked_length: false,
            max_header_bytes: MAX_HEADER_BYTES,
            state,
            header_kind: HeaderKind::General,
            boundary_state: BoundaryState::Body,
            message_kind: MessageKind::Unknown,
            flags: Flags::empty(),
            paused: false,
            error: None,
            nread: 0,
            content_length: LEN_UNSET,
            method: HttpMethod::default(),
            status_code: 0,
            http_major: 0,
            http_minor: 0,
            upgrade: false,
            uses_transfer_encoding: false,
            seen_final_chunked: false,
            index: 0,
            scratch_method: Vec::new(),
            scratch_url: Vec::new(),
            scratch_status: Vec::new(),
            scratch_key: Vec::new(),
            scratch_value: Vec::new(),
            boundary: [0u8; MAX_BOUNDARY],
            boundary_len: 0,
            boundary_held: Vec::new(),
            disp_name: Vec::new(),
            disp_filename: Vec::new(),
        }
    }

    pub fn set_max_header_bytes(&mut self, max: usize) {
        self.max_header_bytes = max;
    }

    #[inline]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    #[inline]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    #[inline]
    pub fn version(&self) -> (u8, u8) {
        (self.http_major, self.http_minor)
    }

    #[inline]
    pub fn message_kind(&self) -> MessageKind {
        self.message_kind
    }

    #[inline]
    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        self.flags.contains(Flags::CHUNKED)
    }

    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        self.flags.contains(Flags::CONTENT_LENGTH).then_some(self.content_length)
    }

    pub fn boundary(&self) -> Option<&[u8]> {
        self.flags.contains(Flags::BOUNDARY).then_some(&self.boundary[..self.boundary_len])
    }

    pub fn disposition_name(&self) -> Option<&[u8]> {
        (!self.disp_name.is_empty()).then_some(self.disp_name.as_slice())
    }

    pub fn disposition_filename(&self) -> Option<&[u8]> {
        (!self.disp_filename.is_empty()).then_some(self.disp_filename.as_slice())
    }

    #[inline]
    pub fn error(&self) -> Option<&HttpError> {
        self.error.as_ref()
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Keep-alive determination per the negotiated version and
    /// Connection tokens.
    pub fn should_keep_alive(&self) -> bool {
        let alive = if self.http_major == 1 && self.http_minor >= 1 {
            !self.flags.contains(Flags::CONNECTION_CLOSE)
        } else {
            self.flags.contains(Flags::CONNECTION_KEEP_ALIVE)
        };
        alive && !self.needs_eof()
    }

    /// True when only connection close can delimit the body.
    fn needs_eof(&self) -> bool {
        if self.message_kind != MessageKind::Response {
            return false;
        }
        if self.status_code / 100 == 1
            || self.status_code == 204
            || self.status_code == 304
            || self.flags.contains(Flags::SKIPBODY)
        {
            return false;
        }
        if self.flags.intersects(Flags::CHUNKED | Flags::BOUNDARY) {
            return false;
        }
        self.content_length == LEN_UNSET
    }

    /// Signals end-of-stream. Completes a read-until-close body or
    /// reports an invalid truncation point.
    pub fn finish(&mut self, sink: &mut dyn HttpSink) -> Result<(), HttpError> {
        match self.state {
            State::BodyIdentityEof => {
                self.state = State::MessageDone;
                let _ = sink.on_msg_end();
                self.restart_message();
                Ok(())
            }
            State::StartReq | State::StartRes | State::StartReqOrRes | State::Dead => Ok(()),
            _ => {
                let err = HttpError::InvalidEofState;
                self.error = Some(err.clone());
                self.state = State::Dead;
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: HttpError) -> HttpError {
        self.error = Some(err.clone());
        self.state = State::Dead;
        err
    }

    fn restart_message(&mut self) {
        self.state = match self.kind {
            ParserKind::Request => State::StartReq,
            ParserKind::Response => State::StartRes,
            ParserKind::Both => State::StartReqOrRes,
        };
        self.message_kind = MessageKind::Unknown;
        self.flags = Flags::empty();
        self.header_kind = HeaderKind::General;
        self.boundary_state = BoundaryState::Body;
        self.nread = 0;
        self.content_length = LEN_UNSET;
        self.method = HttpMethod::default();
        self.status_code = 0;
        self.http_major = 0;
        self.http_minor = 0;
        self.upgrade = false;
        self.uses_transfer_encoding = false;
        self.seen_final_chunked = false;
        self.index = 0;
        self.scratch_method.clear();
        self.scratch_url.clear();
        self.scratch_status.clear();
        self.scratch_key.clear();
        self.scratch_value.clear();
        self.boundary_len = 0;
        self.boundary_held.clear();
        self.disp_name.clear();
        self.disp_filename.clear();
    }

    #[inline]
    fn count_header_byte(&mut self) -> Result<(), HttpError> {
        self.nread += 1;
        if self.nread > self.max_header_bytes {
            return Err(self.fail(HttpError::HeaderOverflow));
        }
        Ok(())
    }

    /// Feeds bytes. Returns how many were consumed; fewer than
    /// `data.len()` means the parser paused or hit an upgrade point.
    pub fn parse(&mut self, sink: &mut dyn HttpSink, data: &[u8]) -> Result<usize, HttpError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.paused {
            return Err(HttpError::Paused);
        }
        if self.state == State::Dead {
            return Err(self.fail(HttpError::ClosedConnection));
        }

        let mut i = 0usize;
        while i < data.len() {
            if self.paused {
                return Ok(i);
            }
            match self.step(sink, data, &mut i) {
                Ok(true) => {}
                // Stop without error: upgrade hand-off.
                Ok(false) => return Ok(i),
                Err(e) => return Err(e),
            }
        }
        Ok(i)
    }

    /// Processes bytes starting at `*i`. Body states consume spans,
    /// everything else single bytes. Returns Ok(false) to stop
    /// consuming without error.
    fn step(
        &mut self,
        sink: &mut dyn HttpSink,
        data: &[u8],
        i: &mut usize,
    ) -> Result<bool, HttpError> {
        let ch = data[*i];
        match self.state {
            State::Dead => return Err(self.fail(HttpError::ClosedConnection)),

            State::StartReqOrRes => {
                if matches!(ch, b'\r' | b'\n') {
                    *i += 1;
                    return Ok(true);
                }
                if ch == b'H' {
                    self.state = State::ResOrReqH;
                    self.scratch_method.push(ch);
                    *i += 1;
                    self.count_header_byte()?;
                    return Ok(true);
                }
                self.state = State::StartReq;
                return Ok(true);
            }

            State::ResOrReqH => {
                if ch == b'T' {
                    // "HT…": response line.
                    self.count_header_byte()?;
                    self.message_kind = MessageKind::Response;
                    self.upgrade = false;
                    self.scratch_method.clear();
                    self.state = State::ResHttpMatch;
                    self.index = 2;
                    *i += 1;
                    self.cb(sink.on_msg_begin(), "msg_begin")?;
                    return Ok(true);
                }
                // Back to request-method accumulation ("HEAD").
                self.message_kind = MessageKind::Request;
                self.upgrade = false;
                self.state = State::ReqMethod;
                self.cb(sink.on_msg_begin(), "msg_begin")?;
                return Ok(true);
            }

            State::StartReq => {
                if matches!(ch, b'\r' | b'\n') {
                    *i += 1;
                    return Ok(true);
                }
                if !ch.is_ascii_uppercase() && ch != b'-' {
                    return Err(self.fail(HttpError::InvalidMethod));
                }
                self.message_kind = MessageKind::Request;
                self.upgrade = false;
                self.state = State::ReqMethod;
                self.cb(sink.on_msg_begin(), "msg_begin")?;
                return Ok(true);
            }

            State::StartRes => {
                if matches!(ch, b'\r' | b'\n') {
                    *i += 1;
                    return Ok(true);
                }
                if ch != b'H' {
                    return Err(self.fail(HttpError::InvalidVersion));
                }
                self.count_header_byte()?;
                self.message_kind = MessageKind::Response;
                self.upgrade = false;
                self.state = State::ResHttpMatch;
                self.index = 1;
                *i += 1;
                self.cb(sink.on_msg_begin(), "msg_begin")?;
                return Ok(true);
            }

            State::ReqMethod => {
                self.count_header_byte()?;
                if ch == b' ' {
                    let Some(method) = HttpMethod::from_token(&self.scratch_method) else {
                        return Err(self.fail(HttpError::InvalidMethod));
                    };
                    self.method = method;
                    self.state = State::ReqSpacesBeforeUrl;
                } else if (ch.is_ascii_uppercase() || ch == b'-') && self.scratch_method.len() < 16
                {
                    self.scratch_method.push(ch);
                } else {
                    return Err(self.fail(HttpError::InvalidMethod));
                }
                *i += 1;
            }

            State::ReqSpacesBeforeUrl => {
                self.count_header_byte()?;
                if ch != b' ' {
                    if !crate::url::is_url_char(ch) {
                        return Err(self.fail(HttpError::InvalidUrl));
                    }
                    self.state = State::ReqUrl;
                    return Ok(true);
                }
                *i += 1;
            }

            State::ReqUrl => {
                self.count_header_byte()?;
                match ch {
                    b' ' => {
                        self.finish_url(sink)?;
                        self.state = State::ReqHttpMatch;
                        self.index = 0;
                    }
                    b'\r' | b'\n' => {
                        // Pre-1.0 style request without a version.
                        self.finish_url(sink)?;
                        self.http_major = 0;
                        self.http_minor = 9;
                        self.state = if ch == b'\r' {
                            State::ReqLineAlmostDone
                        } else {
                            State::HeaderFieldStart
                        };
                    }
                    _ if crate::url::is_url_char(ch) => self.scratch_url.push(ch),
                    _ => return Err(self.fail(HttpError::InvalidUrl)),
                }
                *i += 1;
            }

            State::ReqHttpMatch | State::ResHttpMatch => {
                self.count_header_byte()?;
                const PROTO: &[u8] = b"HTTP/";
                if self.index < PROTO.len() {
                    if ch != PROTO[self.index] {
                        return Err(self.fail(HttpError::InvalidVersion));
                    }
                    self.index += 1;
                } else {
                    // First version digit.
                    if !ch.is_ascii_digit() {
                        return Err(self.fail(HttpError::InvalidVersion));
                    }
                    self.http_major = ch - b'0';
                    self.state = if self.state == State::ReqHttpMatch {
                        State::ReqHttpMajor
                    } else {
                        State::ResHttpMajor
                    };
                }
                *i += 1;
            }

            State::ReqHttpMajor | State::ResHttpMajor => {
                self.count_header_byte()?;
                if ch == b'.' {
                    self.state = if self.state == State::ReqHttpMajor {
                        State::ReqHttpMinor
                    } else {
                        State::ResHttpMinor
                    };
                    self.index = 0;
                } else if ch.is_ascii_digit() {
                    let v = u16::from(self.http_major) * 10 + u16::from(ch - b'0');
                    if v > 255 {
                        return Err(self.fail(HttpError::InvalidVersion));
                    }
                    self.http_major = v as u8;
                } else {
                    return Err(self.fail(HttpError::InvalidVersion));
                }
                *i += 1;
            }

            State::ReqHttpMinor => {
                self.count_header_byte()?;
                match ch {
                    b'\r' => {
                        if self.index == 0 {
                            return Err(self.fail(HttpError::InvalidVersion));
                        }
                        self.state = State::ReqLineAlmostDone;
                    }
                    b'\n' if self.mode == ParseMode::Lenient => {
                        if self.index == 0 {
                            return Err(self.fail(HttpError::InvalidVersion));
                        }
                        self.state = State::HeaderFieldStart;
                    }
                    _ if ch.is_ascii_digit() => {
                        let v = u16::from(self.http_minor) * 10 + u16::from(ch - b'0');
                        if v > 255 || self.index >= 3 {
                            return Err(self.fail(HttpError::InvalidVersion));
                        }
                        self.http_minor = if self.index == 0 { ch - b'0' } else { v as u8 };
                        self.index += 1;
                    }
                    _ => return Err(self.fail(HttpError::InvalidVersion)),
                }
                *i += 1;
            }

            State::ResHttpMinor => {
                self.count_header_byte()?;
                match ch {
                    b' ' => {
                        if self.index == 0 {
                            return Err(self.fail(HttpError::InvalidVersion));
                        }
                        self.state = State::ResStatusCodeStart;
                    }
                    _ if ch.is_ascii_digit() => {
                        let v = u16::from(self.http_minor) * 10 + u16::from(ch - b'0');
                        if v > 255 || self.index >= 3 {
                            return Err(self.fail(HttpError::InvalidVersion));
                        }
                        self.http_minor = if self.index == 0 { ch - b'0' } else { v as u8 };
                        self.index += 1;
                    }
                    _ => return Err(self.fail(HttpError::InvalidVersion)),
                }
                *i += 1;
            }

            State::ReqLineAlmostDone => {
                self.count_header_byte()?;
                if ch != b'\n' {
                    return Err(self.fail(HttpError::LfExpected));
                }
                self.state = State::HeaderFieldStart;
                *i += 1;
            }

            State::ResStatusCodeStart => {
                self.count_header_byte()?;
                if !ch.is_ascii_digit() {
                    return Err(self.fail(HttpError::InvalidStatus));
                }
                self.status_code = u16::from(ch - b'0');
                self.state = State::ResStatusCode;
                *i += 1;
            }

            State::ResStatusCode => {
                self.count_header_byte()?;
                match ch {
                    _ if ch.is_ascii_digit() => {
                        let v = u32::from(self.status_code) * 10 + u32::from(ch - b'0');
                        if v > 999 {
                            return Err(self.fail(HttpError::InvalidStatus));
                        }
                        self.status_code = v as u16;
                    }
                    b' ' => self.state = State::ResStatusStart,
                    b'\r' => self.state = State::ResLineAlmostDone,
                    b'\n' if self.mode == ParseMode::Lenient => {
                        self.finish_status(sink)?;
                        self.state = State::HeaderFieldStart;
                    }
                    _ => return Err(self.fail(HttpError::InvalidStatus)),
                }
                *i += 1;
            }

            State::ResStatusStart | State::ResStatus => {
                self.count_header_byte()?;
                match ch {
                    b'\r' => self.state = State::ResLineAlmostDone,
                    b'\n' if self.mode == ParseMode::Lenient => {
                        self.finish_status(sink)?;
                        self.state = State::HeaderFieldStart;
                    }
                    b'\n' => return Err(self.fail(HttpError::Strict)),
                    _ => {
                        self.state = State::ResStatus;
                        self.scratch_status.push(ch);
                    }
                }
                *i += 1;
            }

            State::ResLineAlmostDone => {
                self.count_header_byte()?;
                if ch != b'\n' {
                    return Err(self.fail(HttpError::LfExpected));
                }
                self.finish_status(sink)?;
                self.state = State::HeaderFieldStart;
                *i += 1;
            }

            State::HeaderFieldStart => {
                self.count_header_byte()?;
                match ch {
                    b'\r' => self.state = State::HeadersAlmostDone,
                    b'\n' => {
                        // Bare-LF blank line; lenient only.
                        if self.mode == ParseMode::Strict {
                            return Err(self.fail(HttpError::Strict));
                        }
                        return self.headers_almost_done(sink, i);
                    }
                    _ if is_token(ch) => {
                        self.scratch_key.clear();
                        self.scratch_value.clear();
                        self.scratch_key.push(ch.to_ascii_lowercase());
                        self.state = State::HeaderField;
                    }
                    _ => return Err(self.fail(HttpError::InvalidHeaderToken)),
                }
                *i += 1;
            }

            State::HeaderField => {
                self.count_header_byte()?;
                match ch {
                    b':' => {
                        self.header_kind = classify_header(&self.scratch_key);
                        self.state = State::HeaderValueDiscardWs;
                    }
                    _ if is_token(ch) => self.scratch_key.push(ch.to_ascii_lowercase()),
                    _ => return Err(self.fail(HttpError::InvalidHeaderToken)),
                }
                *i += 1;
            }

            State::HeaderValueDiscardWs => {
                self.count_header_byte()?;
                match ch {
                    b' ' | b'\t' => {}
                    b'\r' => self.state = State::HeaderValueDiscardWsAlmostDone,
                    b'\n' if self.mode == ParseMode::Lenient => {
                        self.state = State::HeaderValueDiscardLws;
                    }
                    b'\n' => return Err(self.fail(HttpError::Strict)),
                    _ => {
                        self.state = State::HeaderValue;
                        self.scratch_value.push(ch);
                    }
                }
                *i += 1;
            }

            State::HeaderValueDiscardWsAlmostDone => {
                self.count_header_byte()?;
                if ch != b'\n' {
                    return Err(self.fail(HttpError::LfExpected));
                }
                self.state = State::HeaderValueDiscardLws;
                *i += 1;
            }

            State::HeaderValueDiscardLws => {
                if matches!(ch, b' ' | b'\t') {
                    self.count_header_byte()?;
                    self.state = State::HeaderValueDiscardWs;
                    *i += 1;
                } else {
                    // Empty value.
                    self.finish_header(sink)?;
                    self.state = State::HeaderFieldStart;
                }
            }

            State::HeaderValue => {
                self.count_header_byte()?;
                match ch {
                    b'\r' => self.state = State::HeaderAlmostDone,
                    b'\n' if self.mode == ParseMode::Lenient => {
                        self.state = State::HeaderValueLws;
                    }
                    b'\n' => return Err(self.fail(HttpError::Strict)),
                    _ => self.scratch_value.push(ch),
                }
                *i += 1;
            }

            State::HeaderAlmostDone => {
                self.count_header_byte()?;
                if ch != b'\n' {
                    return Err(self.fail(HttpError::LfExpected));
                }
                self.state = State::HeaderValueLws;
                *i += 1;
            }

            State::HeaderValueLws => {
                if matches!(ch, b' ' | b'\t') {
                    // Obsolete line folding: the value continues.
                    self.count_header_byte()?;
                    self.scratch_value.push(b' ');
                    self.state = State::HeaderValue;
                    *i += 1;
                } else {
                    self.finish_header(sink)?;
                    self.state = State::HeaderFieldStart;
                }
            }

            State::HeadersAlmostDone => {
                self.count_header_byte()?;
                if ch != b'\n' {
                    return Err(self.fail(HttpError::LfExpected));
                }
                return self.headers_almost_done(sink, i);
            }

            State::ChunkSizeStart => {
                self.count_header_byte()?;
                let Some(v) = hex_value(ch) else {
                    return Err(self.fail(HttpError::InvalidChunkSize));
                };
                self.content_length = u64::from(v);
                self.state = State::ChunkSize;
                *i += 1;
            }

            State::ChunkSize => {
                self.count_header_byte()?;
                match ch {
                    b'\r' => self.state = State::ChunkSizeAlmostDone,
                    b'\n' if self.mode == ParseMode::Lenient => {
                        return self.chunk_size_done(sink, i);
                    }
                    b';' | b' ' => self.state = State::ChunkParameters,
                    _ => {
                        let Some(v) = hex_value(ch) else {
                            return Err(self.fail(HttpError::InvalidChunkSize));
                        };
                        let next = self
                            .content_length
                            .checked_mul(16)
                            .and_then(|n| n.checked_add(u64::from(v)));
                        let Some(next) = next else {
                            return Err(self.fail(HttpError::InvalidChunkSize));
                        };
                        self.content_length = next;
                    }
                }
                *i += 1;
            }

            State::ChunkParameters => {
                self.count_header_byte()?;
                match ch {
                    b'\r' => self.state = State::ChunkSizeAlmostDone,
                    b'\n' if self.mode == ParseMode::Lenient => {
                        return self.chunk_size_done(sink, i);
                    }
                    _ => {}
                }
                *i += 1;
            }

            State::ChunkSizeAlmostDone => {
                self.count_header_byte()?;
                if ch != b'\n' {
                    return Err(self.fail(HttpError::LfExpected));
                }
                return self.chunk_size_done(sink, i);
            }

            State::ChunkData => {
                let available = data.len() - *i;
                let take = (self.content_length as usize).min(available);
                if take > 0 {
                    let span = &data[*i..*i + take];
                    *i += take;
                    self.content_length -= take as u64;
                    let _ = self.cb(sink.on_body(span), "body")?;
                }
                if self.content_length == 0 {
                    self.state = State::ChunkDataAlmostDone;
                }
            }

            State::ChunkDataAlmostDone => {
                if ch != b'\r' {
                    if self.mode == ParseMode::Lenient && ch == b'\n' {
                        self.state = State::ChunkDataDone;
                        return Ok(true);
                    }
                    return Err(self.fail(HttpError::InvalidChunkSize));
                }
                self.state = State::ChunkDataDone;
                *i += 1;
            }

            State::ChunkDataDone => {
                if ch != b'\n' {
                    return Err(self.fail(HttpError::LfExpected));
                }
                self.nread = 0;
                self.state = State::ChunkSizeStart;
                *i += 1;
                let _ = self.cb(sink.on_chunk_tail(), "chunk_tail")?;
            }

            State::BodyIdentity => {
                let available = data.len() - *i;
                let take = (self.content_length as usize).min(available);
                let span = &data[*i..*i + take];
                *i += take;
                self.content_length -= take as u64;
                let _ = self.cb(sink.on_body(span), "body")?;
                if self.content_length == 0 {
                    return self.message_complete(sink);
                }
            }

            State::BodyIdentityEof => {
                let span = &data[*i..];
                *i = data.len();
                self.cb(sink.on_body(span), "body")?;
            }

            State::BoundaryBody => {
                return self.boundary_step(sink, data, i);
            }

            State::MessageDone => {
                return self.message_complete(sink);
            }
        }
        Ok(true)
    }

    /// Translates a callback result; Ok(true) means the parser is now
    /// paused.
    fn cb(&mut self, r: SinkResult, which: &'static str) -> Result<bool, HttpError> {
        match r {
            SinkResult::Continue => Ok(false),
            SinkResult::Pause => {
                self.paused = true;
                Ok(true)
            }
            SinkResult::Abort => Err(self.fail(HttpError::Callback(which))),
        }
    }

    fn finish_url(&mut self, sink: &mut dyn HttpSink) -> Result<(), HttpError> {
        if self.scratch_url.is_empty() {
            return Err(self.fail(HttpError::InvalidUrl));
        }
        let url = std::mem::take(&mut self.scratch_url);
        let r = sink.on_url(&url);
        self.scratch_url = url;
        self.cb(r, "url").map(|_| ())
    }

    fn finish_status(&mut self, sink: &mut dyn HttpSink) -> Result<(), HttpError> {
        let status = std::mem::take(&mut self.scratch_status);
        let r = sink.on_status(&status);
        self.scratch_status = status;
        self.cb(r, "status").map(|_| ())
    }

    /// Header line complete: run the per-kind value rules, then hand
    /// the pair to the sink.
    fn finish_header(&mut self, sink: &mut dyn HttpSink) -> Result<(), HttpError> {
        while self.scratch_value.last().is_some_and(|c| matches!(c, b' ' | b'\t')) {
            self.scratch_value.pop();
        }

        match self.header_kind {
            HeaderKind::ContentLength => {
                if self.flags.contains(Flags::CONTENT_LENGTH) {
                    return Err(self.fail(HttpError::InvalidContentLength));
                }
                let mut value: u64 = 0;
                if self.scratch_value.is_empty() {
                    return Err(self.fail(HttpError::InvalidContentLength));
                }
                for &c in &self.scratch_value {
                    if !c.is_ascii_digit() {
                        return Err(self.fail(HttpError::InvalidContentLength));
                    }
                    let next = value
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(u64::from(c - b'0')));
                    match next {
                        Some(n) if n != LEN_UNSET => value = n,
                        _ => return Err(self.fail(HttpError::InvalidContentLength)),
                    }
                }
                self.content_length = value;
                self.flags |= Flags::CONTENT_LENGTH;
            }
            HeaderKind::TransferEncoding => {
                self.uses_transfer_encoding = true;
                // Only a FINAL chunked coding delimits the body; a
                // later token (even in a later header) cancels it.
                for token in split_tokens(&self.scratch_value) {
                    self.seen_final_chunked = token.eq_ignore_ascii_case(b"chunked");
                }
                self.flags.set(Flags::CHUNKED, self.seen_final_chunked);
            }
            HeaderKind::Connection => {
                for token in split_tokens(&self.scratch_value) {
                    if token.eq_ignore_ascii_case(b"keep-alive") {
                        self.flags |= Flags::CONNECTION_KEEP_ALIVE;
                    } else if token.eq_ignore_ascii_case(b"close") {
                        self.flags |= Flags::CONNECTION_CLOSE;
                    } else if token.eq_ignore_ascii_case(b"upgrade") {
                        self.flags |= Flags::CONNECTION_UPGRADE;
                    }
                }
            }
            HeaderKind::ContentType => {
                let value = &self.scratch_value;
                if value.len() >= 10 && value[..10].eq_ignore_ascii_case(b"multipart/") {
                    if let Some(boundary) = mime_param(value, b"boundary") {
                        if self.flags.contains(Flags::BOUNDARY)
                            || boundary.is_empty()
                            || boundary.len() > MAX_BOUNDARY
                        {
                            return Err(self.fail(HttpError::InvalidBoundary));
                        }
                        self.boundary[..boundary.len()].copy_from_slice(boundary);
                        self.boundary_len = boundary.len();
                        self.flags |= Flags::BOUNDARY;
                    }
                }
            }
            HeaderKind::ContentDisposition => {
                if let Some(name) = mime_param(&self.scratch_value, b"name") {
                    self.disp_name = name.to_vec();
                }
                if let Some(filename) = mime_param(&self.scratch_value, b"filename") {
                    self.disp_filename = filename.to_vec();
                }
            }
            HeaderKind::Upgrade => self.flags |= Flags::UPGRADE,
            HeaderKind::General => {}
        }

        let key = std::mem::take(&mut self.scratch_key);
        let value = std::mem::take(&mut self.scratch_value);
        let r = sink.on_header(&key, &value);
        self.scratch_key = key;
        self.scratch_value = value;
        self.header_kind = HeaderKind::General;
        self.cb(r, "header").map(|_| ())
    }

    /// Blank line after headers (or trailers, or a multipart part
    /// head). Runs the body-length policy and the head-done callback.
    fn headers_almost_done(
        &mut self,
        sink: &mut dyn HttpSink,
        i: &mut usize,
    ) -> Result<bool, HttpError> {
        // Consume the LF.
        *i += 1;

        if self.flags.contains(Flags::HEAD_DONE) {
            // End of a multipart part head: back to scanning the body.
            if self.flags.contains(Flags::BOUNDARY) {
                self.state = State::BoundaryBody;
                self.boundary_state = BoundaryState::Body;
                self.flags -= Flags::BOUNDARY_MUST_MATCH;
                return Ok(true);
            }
            // End of chunked trailers.
            if self.flags.intersects(Flags::CHUNKED | Flags::TRAILING) {
                return self.message_complete(sink);
            }
        }

        // Transfer-Encoding and Content-Length cannot coexist
        // (RFC 7230 3.3.3) unless leniently told otherwise.
        if self.uses_transfer_encoding && self.flags.contains(Flags::CONTENT_LENGTH) {
            if self.flags.contains(Flags::CHUNKED) {
                if !self.allow_chunked_length {
                    return Err(self.fail(HttpError::UnexpectedContentLength));
                }
            } else if self.mode == ParseMode::Strict {
                return Err(self.fail(HttpError::UnexpectedContentLength));
            }
        }

        self.upgrade = if self.flags.contains(Flags::UPGRADE)
            && self.flags.contains(Flags::CONNECTION_UPGRADE)
        {
            self.message_kind == MessageKind::Request || self.status_code == 101
        } else {
            self.method == HttpMethod::Connect
        };

        match sink.on_head_done(self) {
            HeadAction::Normal => {}
            HeadAction::SkipBody => self.flags |= Flags::SKIPBODY,
            HeadAction::Upgrade => {
                self.upgrade = true;
                self.flags |= Flags::SKIPBODY;
            }
            HeadAction::Pause => self.paused = true,
            HeadAction::Abort => return Err(self.fail(HttpError::Callback("head_done"))),
        }

        self.headers_done(sink)
    }

    fn headers_done(&mut self, sink: &mut dyn HttpSink) -> Result<bool, HttpError> {
        self.flags |= Flags::HEAD_DONE;
        self.nread = 0;

        let has_body = self.flags.intersects(Flags::CHUNKED | Flags::BOUNDARY)
            || (self.content_length > 0 && self.content_length != LEN_UNSET);

        if self.upgrade
            && (self.method == HttpMethod::Connect
                || self.flags.contains(Flags::SKIPBODY)
                || !has_body)
        {
            // The rest of the stream belongs to another protocol.
            return self.message_complete(sink);
        }

        if self.flags.contains(Flags::SKIPBODY) {
            return self.message_complete(sink);
        }
        if self.flags.contains(Flags::CHUNKED) {
            self.state = State::ChunkSizeStart;
            return Ok(true);
        }
        if self.flags.contains(Flags::BOUNDARY) {
            self.state = State::BoundaryBody;
            self.index = 0;
            self.boundary_state = BoundaryState::CmpDash1;
            self.boundary_held.clear();
            self.flags |= Flags::BOUNDARY_MUST_MATCH;
            return Ok(true);
        }
        if self.uses_transfer_encoding {
            // Transfer-Encoding present but not finally chunked.
            if self.message_kind == MessageKind::Request && self.mode == ParseMode::Strict {
                return Err(self.fail(HttpError::InvalidTransferEncoding));
            }
            // Response side: body runs to connection close.
            self.state = State::BodyIdentityEof;
            return Ok(true);
        }
        if self.flags.contains(Flags::CONTENT_LENGTH) {
            if self.content_length == 0 {
                return self.message_complete(sink);
            }
            self.state = State::BodyIdentity;
            return Ok(true);
        }
        if self.needs_eof() {
            self.state = State::BodyIdentityEof;
            return Ok(true);
        }
        self.message_complete(sink)
    }

    fn chunk_size_done(
        &mut self,
        sink: &mut dyn HttpSink,
        i: &mut usize,
    ) -> Result<bool, HttpError> {
        *i += 1;
        self.nread = 0;
        let size = self.content_length;
        if self.cb(sink.on_chunk_head(size), "chunk_head")? {
            // paused; state change still applies below
        }
        if size == 0 {
            // Final chunk: trailers follow, ended by a blank line.
            self.flags |= Flags::TRAILING;
            self.state = State::HeaderFieldStart;
        } else {
            self.state = State::ChunkData;
        }
        Ok(true)
    }

    /// Fires msg_end and resets for the next message. Returns false
    /// (stop consuming) when the connection upgrades: the remaining
    /// bytes belong to another protocol and [`is_upgrade`] stays
    /// observable.
    fn message_complete(&mut self, sink: &mut dyn HttpSink) -> Result<bool, HttpError> {
        trace!(kind = ?self.message_kind, "message complete");
        let upgrade = self.upgrade;
        self.cb(sink.on_msg_end(), "msg_end")?;
        self.restart_message();
        if upgrade {
            self.upgrade = true;
            self.state = State::Dead;
            return Ok(false);
        }
        Ok(true)
    }

    /// Multipart body scanning: emit body bytes, hold back candidate
    /// boundary markers until they match or fail.
    fn boundary_step(
        &mut self,
        sink: &mut dyn HttpSink,
        data: &[u8],
        i: &mut usize,
    ) -> Result<bool, HttpError> {
        let must_match = self.flags.contains(Flags::BOUNDARY_MUST_MATCH);
        let ch = data[*i];

        match self.boundary_state {
            BoundaryState::Body => {
                // Fast-path a run of plain body bytes up to the next
                // CR/LF.
                let start = *i;
                let mut end = *i;
                while end < data.len() && !matches!(data[end], b'\r' | b'\n') {
                    end += 1;
                }
                if end > start {
                    *i = end;
                    let _ = self.cb(sink.on_body(&data[start..end]), "body")?;
                    return Ok(true);
                }
                // CR or LF: candidate marker start.
                self.boundary_held.clear();
                self.boundary_held.push(ch);
                self.boundary_state =
                    if ch == b'\r' { BoundaryState::CmpPre } else { BoundaryState::CmpDash1 };
                *i += 1;
            }

            BoundaryState::CmpPre => {
                if ch == b'\n' {
                    self.boundary_held.push(ch);
                    self.boundary_state = BoundaryState::CmpDash1;
                    *i += 1;
                } else {
                    self.boundary_mismatch(sink, must_match)?;
                }
            }

            BoundaryState::CmpDash1 => {
                if ch == b'-' {
                    self.boundary_held.push(ch);
                    self.boundary_state = BoundaryState::CmpDash2;
                    *i += 1;
                } else {
                    self.boundary_mismatch(sink, must_match)?;
                }
            }

            BoundaryState::CmpDash2 => {
                if ch == b'-' {
                    self.boundary_held.push(ch);
                    self.index = 0;
                    self.boundary_state = BoundaryState::Cmp;
                    *i += 1;
                } else {
                    self.boundary_mismatch(sink, must_match)?;
                }
            }

            BoundaryState::Cmp => {
                if self.index == self.boundary_len {
                    match ch {
                        b'\r' => {
                            self.boundary_held.push(ch);
                            self.boundary_state = BoundaryState::CmpDone;
                            *i += 1;
                        }
                        b'\n' => {
                            // Bare-LF separator: treat as done without
                            // consuming; CmpDone handles it.
                            self.boundary_state = BoundaryState::CmpDone;
                        }
                        b'-' if !must_match => {
                            self.boundary_held.push(ch);
                            self.boundary_state = BoundaryState::CmpTail;
                            *i += 1;
                        }
                        _ => self.boundary_mismatch(sink, must_match)?,
                    }
                } else if ch == self.boundary[self.index] {
                    self.boundary_held.push(ch);
                    self.index += 1;
                    *i += 1;
                } else {
                    self.boundary_mismatch(sink, must_match)?;
                }
            }

            BoundaryState::CmpDone => {
                if ch == b'\n' {
                    // Part separator complete; the marker bytes are
                    // swallowed, the next part's headers follow.
                    self.boundary_held.clear();
                    self.state = State::HeaderFieldStart;
                    self.boundary_state = BoundaryState::Body;
                    self.flags -= Flags::BOUNDARY_MUST_MATCH;
                    *i += 1;
                } else {
                    self.boundary_mismatch(sink, must_match)?;
                }
            }

            BoundaryState::CmpTail => {
                if ch == b'-' {
                    // "--boundary--": multipart body ends here.
                    self.boundary_held.clear();
                    *i += 1;
                    return self.message_complete(sink);
                }
                self.boundary_mismatch(sink, must_match)?;
            }
        }
        Ok(true)
    }

    /// A held marker failed to match: it was body all along (or, for
    /// the mandatory first boundary, an error).
    fn boundary_mismatch(
        &mut self,
        sink: &mut dyn HttpSink,
        must_match: bool,
    ) -> Result<(), HttpError> {
        if must_match {
            return Err(self.fail(HttpError::InvalidBoundary));
        }
        let held = std::mem::take(&mut self.boundary_held);
        if !held.is_empty() {
            let r = sink.on_body(&held);
            self.cb(r, "body")?;
        }
        self.boundary_state = BoundaryState::Body;
        // The current byte is reprocessed in Body state.
        Ok(())
    }
}

#[inline]
fn is_token(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

#[inline]
fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn classify_header(key: &[u8]) -> HeaderKind {
    match key {
        b"connection" | b"proxy-connection" => HeaderKind::Connection,
        b"content-length" => HeaderKind::ContentLength,
        b"content-type" => HeaderKind::ContentType,
        b"content-disposition" => HeaderKind::ContentDisposition,
        b"transfer-encoding" => HeaderKind::TransferEncoding,
        b"upgrade" => HeaderKind::Upgrade,
        _ => HeaderKind::General,
    }
}

/// Comma-separated token iterator with surrounding whitespace
/// stripped.
fn split_tokens(value: &[u8]) -> impl Iterator<Item = &[u8]> {
    value.split(|&c| c == b',').map(|t| {
        let mut t = t;
        while t.first().is_some_and(|c| matches!(c, b' ' | b'\t')) {
            t = &t[1..];
        }
        while t.last().is_some_and(|c| matches!(c, b' ' | b'\t')) {
            t = &t[..t.len() - 1];
        }
        t
    })
}

/// Extracts `name=value` from a MIME-style parameter list, stripping
/// optional quotes.
fn mime_param<'a>(value: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    for part in value.split(|&c| c == b';') {
        let mut part = part;
        while part.first().is_some_and(|c| matches!(c, b' ' | b'\t')) {
            part = &part[1..];
        }
        let Some(eq) = part.iter().position(|&c| c == b'=') else {
            continue;
        };
        if !part[..eq].eq_ignore_ascii_case(name) {
            continue;
        }
        let mut v = &part[eq + 1..];
        while v.last().is_some_and(|c| matches!(c, b' ' | b'\t')) {
            v = &v[..v.len() - 1];
        }
        if v.len() >= 2 && v[0] == b'"' && v[v.len() - 1] == b'"' {
            v = &v[1..v.len() - 1];
        }
        return Some(v);
    }
    None
}
