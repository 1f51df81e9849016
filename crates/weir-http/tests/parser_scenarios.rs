use weir_http::{
    HeadAction, HttpError, HttpMethod, HttpParser, HttpSink, MessageKind, ParseMode, ParserKind,
    SinkResult,
};

/// Records every callback with its argument bytes so runs can be
/// compared across arbitrary input splits.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
struct Recorder {
    events: Vec<(String, Vec<u8>)>,
    head_action: Option<HeadAction>,
}

impl Recorder {
    fn with_head_action(action: HeadAction) -> Self {
        Self { events: Vec::new(), head_action: Some(action) }
    }

    fn names(&self) -> Vec<&str> {
        self.events.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn body(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter(|(n, _)| n == "body")
            .flat_map(|(_, b)| b.iter().copied())
            .collect()
    }
}

impl HttpSink for Recorder {
    fn on_msg_begin(&mut self) -> SinkResult {
        self.events.push(("msg_begin".into(), Vec::new()));
        SinkResult::Continue
    }
    fn on_url(&mut self, url: &[u8]) -> SinkResult {
        self.events.push(("url".into(), url.to_vec()));
        SinkResult::Continue
    }
    fn on_status(&mut self, status: &[u8]) -> SinkResult {
        self.events.push(("status".into(), status.to_vec()));
        SinkResult::Continue
    }
    fn on_header(&mut self, key: &[u8], value: &[u8]) -> SinkResult {
        let mut kv = key.to_vec();
        kv.push(b'=');
        kv.extend_from_slice(value);
        self.events.push(("header".into(), kv));
        SinkResult::Continue
    }
    fn on_head_done(&mut self, _parser: &HttpParser) -> HeadAction {
        self.events.push(("head_done".into(), Vec::new()));
        self.head_action.unwrap_or(HeadAction::Normal)
    }
    fn on_chunk_head(&mut self, size: u64) -> SinkResult {
        self.events.push(("chunk_head".into(), size.to_string().into_bytes()));
        SinkResult::Continue
    }
    fn on_body(&mut self, bytes: &[u8]) -> SinkResult {
        self.events.push(("body".into(), bytes.to_vec()));
        SinkResult::Continue
    }
    fn on_chunk_tail(&mut self) -> SinkResult {
        self.events.push(("chunk_tail".into(), Vec::new()));
        SinkResult::Continue
    }
    fn on_msg_end(&mut self) -> SinkResult {
        self.events.push(("msg_end".into(), Vec::new()));
        SinkResult::Continue
    }
}

fn parse_all(parser: &mut HttpParser, sink: &mut Recorder, input: &[u8]) -> usize {
    let mut consumed = 0;
    while consumed < input.len() {
        let n = parser.parse(sink, &input[consumed..]).expect("parse failed");
        if n == 0 {
            break;
        }
        consumed += n;
    }
    consumed
}

/// Collapses consecutive body events so split-position differences in
/// span boundaries do not affect comparison.
fn normalized(rec: &Recorder) -> Vec<(String, Vec<u8>)> {
    let mut out: Vec<(String, Vec<u8>)> = Vec::new();
    for (name, bytes) in &rec.events {
        if name == "body" {
            if let Some((last, acc)) = out.last_mut() {
                if last == "body" {
                    acc.extend_from_slice(bytes);
                    continue;
                }
            }
        }
        out.push((name.clone(), bytes.clone()));
    }
    out
}

const CHUNKED_POST: &[u8] =
    b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";

#[test]
fn chunked_post_event_sequence() {
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut parser, &mut rec, CHUNKED_POST);
    assert_eq!(consumed, CHUNKED_POST.len());
    assert_eq!(
        rec.names(),
        vec![
            "msg_begin",
            "url",
            "header",
            "head_done",
            "chunk_head",
            "body",
            "chunk_tail",
            "chunk_head",
            "msg_end"
        ]
    );
    assert_eq!(rec.events[1].1, b"/");
    assert_eq!(rec.events[2].1, b"transfer-encoding=chunked");
    assert_eq!(rec.events[4].1, b"5");
    assert_eq!(rec.events[5].1, b"hello");
    assert_eq!(rec.events[7].1, b"0");
}

#[test]
fn byte_by_byte_feeding_matches_single_shot() {
    let mut whole_parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut whole = Recorder::default();
    parse_all(&mut whole_parser, &mut whole, CHUNKED_POST);

    let mut split_parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut split = Recorder::default();
    for b in CHUNKED_POST {
        let n = split_parser.parse(&mut split, std::slice::from_ref(b)).unwrap();
        assert_eq!(n, 1);
    }
    assert_eq!(normalized(&whole), normalized(&split));
}

#[test]
fn every_split_point_gives_identical_events() {
    let input: &[u8] = b"PUT /data?x=1 HTTP/1.1\r\nContent-Length: 11\r\nX-Extra: yes\r\n\r\nhello world";
    let mut reference_parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut reference = Recorder::default();
    parse_all(&mut reference_parser, &mut reference, input);

    for cut in 1..input.len() {
        let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
        let mut rec = Recorder::default();
        parse_all(&mut parser, &mut rec, &input[..cut]);
        parse_all(&mut parser, &mut rec, &input[cut..]);
        assert_eq!(normalized(&reference), normalized(&rec), "split at {cut}");
    }
}

#[test]
fn content_length_body_is_exact() {
    let head = b"POST /exact HTTP/1.1\r\nContent-Length: 5\r\n\r\n";
    let mut input = head.to_vec();
    input.extend_from_slice(b"12345");
    // Trailing bytes of a following pipelined request must not be
    // consumed into the body.
    input.extend_from_slice(b"GET /next HTTP/1.1\r\n\r\n");

    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut parser, &mut rec, &input);
    assert_eq!(consumed, input.len());
    assert_eq!(rec.body(), b"12345");
    let ends: Vec<&str> =
        rec.names().iter().filter(|n| **n == "msg_end").copied().collect();
    assert_eq!(ends.len(), 2, "both pipelined messages complete");
}

#[test]
fn multipart_form_data_extracts_part_body() {
    let input: &[u8] = b"POST /up HTTP/1.1\r\n\
Content-Type: multipart/form-data; boundary=vksoun\r\n\
Content-Length: 78\r\n\r\n\
--vksoun\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\npayload\r\n--vksoun--\r\n";

    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    parse_all(&mut parser, &mut rec, input);

    assert_eq!(rec.body(), b"payload");
    let names = rec.names();
    assert!(names.contains(&"head_done"));
    assert_eq!(*names.last().unwrap(), "msg_end");
    // The part's own header surfaced through the same callback.
    assert!(
        rec.events
            .iter()
            .any(|(n, kv)| n == "header" && kv.starts_with(b"content-disposition="))
    );
}

#[test]
fn multipart_survives_fragmented_boundary() {
    let input: &[u8] = b"POST /up HTTP/1.1\r\n\
Content-Type: multipart/mixed; boundary=\"cut\"\r\n\r\n\
--cut\r\n\r\nbody\r\nwith\r\nlines\r\n--cut--\r\n";

    let mut reference_parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut reference = Recorder::default();
    parse_all(&mut reference_parser, &mut reference, input);
    assert_eq!(reference.body(), b"body\r\nwith\r\nlines");

    for cut in 1..input.len() {
        let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
        let mut rec = Recorder::default();
        parse_all(&mut parser, &mut rec, &input[..cut]);
        parse_all(&mut parser, &mut rec, &input[cut..]);
        assert_eq!(rec.body(), reference.body(), "split at {cut}");
    }
}

#[test]
fn multipart_requires_leading_boundary() {
    let input: &[u8] = b"POST /up HTTP/1.1\r\n\
Content-Type: multipart/form-data; boundary=b\r\n\r\nnot-a-boundary";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    let err = parser.parse(&mut rec, input).unwrap_err();
    assert_eq!(err, HttpError::InvalidBoundary);
}

#[test]
fn header_overflow_is_reported() {
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    parser.set_max_header_bytes(128);
    let mut input = b"GET / HTTP/1.1\r\n".to_vec();
    input.extend_from_slice(b"X-Filler: ");
    input.extend(std::iter::repeat_n(b'a', 200));
    let mut rec = Recorder::default();
    let err = parser.parse(&mut rec, &input).unwrap_err();
    assert_eq!(err, HttpError::HeaderOverflow);
}

#[test]
fn duplicate_content_length_rejected() {
    let input: &[u8] =
        b"POST / HTTP/1.1\r\nContent-Length: 5\r\nContent-Length: 5\r\n\r\n";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    assert_eq!(
        parser.parse(&mut rec, input).unwrap_err(),
        HttpError::InvalidContentLength
    );
}

#[test]
fn chunked_with_content_length_strictness() {
    let input: &[u8] = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n0\r\n\r\n";

    let mut strict = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    assert_eq!(
        strict.parse(&mut rec, input).unwrap_err(),
        HttpError::UnexpectedContentLength
    );

    // The explicit escape hatch permits the combination; chunked
    // framing wins.
    let mut lenient = HttpParser::new(ParserKind::Request, ParseMode::Lenient);
    lenient.allow_chunked_length = true;
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut lenient, &mut rec, input);
    assert_eq!(consumed, input.len());
    assert_eq!(*rec.names().last().unwrap(), "msg_end");
}

#[test]
fn lenient_accepts_bare_lf_line_endings() {
    let input: &[u8] = b"GET /lf HTTP/1.1\nHost: x\n\n";
    let mut strict = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    assert!(strict.parse(&mut rec, input).is_err());

    let mut lenient = HttpParser::new(ParserKind::Request, ParseMode::Lenient);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut lenient, &mut rec, input);
    assert_eq!(consumed, input.len());
    assert_eq!(*rec.names().last().unwrap(), "msg_end");
}

#[test]
fn response_with_length_parses() {
    let input: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc";
    let mut parser = HttpParser::new(ParserKind::Response, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut parser, &mut rec, input);
    assert_eq!(consumed, input.len());
    assert_eq!(parser.status_code(), 200);
    assert_eq!(rec.body(), b"abc");
    assert!(rec.events.iter().any(|(n, b)| n == "status" && b == b"OK"));
}

#[test]
fn response_without_length_reads_to_eof() {
    let input: &[u8] = b"HTTP/1.0 200 OK\r\n\r\nstream-until-close";
    let mut parser = HttpParser::new(ParserKind::Response, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut parser, &mut rec, input);
    assert_eq!(consumed, input.len());
    assert_eq!(rec.body(), b"stream-until-close");
    assert!(!rec.names().contains(&"msg_end"), "body still open");
    parser.finish(&mut rec).unwrap();
    assert_eq!(*rec.names().last().unwrap(), "msg_end");
}

#[test]
fn keep_alive_response_without_length_has_no_body() {
    let input: &[u8] = b"HTTP/1.1 204 No Content\r\n\r\n";
    let mut parser = HttpParser::new(ParserKind::Response, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut parser, &mut rec, input);
    assert_eq!(consumed, input.len());
    assert_eq!(*rec.names().last().unwrap(), "msg_end");
}

#[test]
fn truncated_identity_body_is_an_eof_error() {
    let input: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    parse_all(&mut parser, &mut rec, input);
    assert_eq!(parser.finish(&mut rec).unwrap_err(), HttpError::InvalidEofState);
}

#[test]
fn connect_upgrade_stops_consuming() {
    let input: &[u8] = b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com\r\n\r\nTLSBYTES";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::with_head_action(HeadAction::Normal);
    let consumed = parser.parse(&mut rec, input).unwrap();
    assert!(parser.is_upgrade());
    assert_eq!(&input[consumed..], b"TLSBYTES", "tunnel bytes left untouched");
    assert_eq!(parser.method(), HttpMethod::Connect);
}

#[test]
fn upgrade_header_pair_triggers_upgrade() {
    let input: &[u8] = b"GET /ws HTTP/1.1\r\nConnection: upgrade\r\nUpgrade: websocket\r\n\r\nWSDATA";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parser.parse(&mut rec, input).unwrap();
    assert!(parser.is_upgrade());
    assert_eq!(&input[consumed..], b"WSDATA");
}

#[test]
fn pause_and_resume_mid_message() {
    struct Pauser {
        inner: Recorder,
    }
    impl HttpSink for Pauser {
        fn on_head_done(&mut self, parser: &HttpParser) -> HeadAction {
            self.inner.on_head_done(parser);
            HeadAction::Pause
        }
        fn on_msg_begin(&mut self) -> SinkResult {
            self.inner.on_msg_begin()
        }
        fn on_url(&mut self, url: &[u8]) -> SinkResult {
            self.inner.on_url(url)
        }
        fn on_header(&mut self, k: &[u8], v: &[u8]) -> SinkResult {
            self.inner.on_header(k, v)
        }
        fn on_body(&mut self, b: &[u8]) -> SinkResult {
            self.inner.on_body(b)
        }
        fn on_msg_end(&mut self) -> SinkResult {
            self.inner.on_msg_end()
        }
    }

    let input: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nbody";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut sink = Pauser { inner: Recorder::default() };
    let consumed = parser.parse(&mut sink, input).unwrap();
    assert!(parser.is_paused());
    assert!(consumed < input.len());

    assert_eq!(parser.parse(&mut sink, &input[consumed..]).unwrap_err(), HttpError::Paused);
    parser.resume();
    let rest = parser.parse(&mut sink, &input[consumed..]).unwrap();
    assert_eq!(consumed + rest, input.len());
    assert_eq!(sink.inner.body(), b"body");
    assert_eq!(*sink.inner.names().last().unwrap(), "msg_end");
}

#[test]
fn bad_method_and_bad_version() {
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    assert_eq!(
        parser.parse(&mut rec, b"GE!T / HTTP/1.1\r\n\r\n").unwrap_err(),
        HttpError::InvalidMethod
    );

    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    assert_eq!(
        parser.parse(&mut rec, b"GET / HTPP/1.1\r\n\r\n").unwrap_err(),
        HttpError::InvalidVersion
    );
}

#[test]
fn both_kind_detects_request_and_response() {
    let mut parser = HttpParser::new(ParserKind::Both, ParseMode::Strict);
    let mut rec = Recorder::default();
    parse_all(&mut parser, &mut rec, b"HEAD /x HTTP/1.1\r\n\r\n");
    assert_eq!(parser.message_kind(), MessageKind::Unknown, "reset after message");
    assert_eq!(rec.events[1].1, b"/x");

    let mut parser = HttpParser::new(ParserKind::Both, ParseMode::Strict);
    let mut rec = Recorder::default();
    parse_all(&mut parser, &mut rec, b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
    assert!(rec.events.iter().any(|(n, b)| n == "status" && b == b"Not Found"));
}

#[test]
fn connection_token_scan_sets_flags() {
    let input: &[u8] = b"GET / HTTP/1.0\r\nConnection: foo, Keep-Alive\r\nContent-Length: 0\r\n\r\n";
    struct Keep(bool);
    impl HttpSink for Keep {
        fn on_head_done(&mut self, parser: &HttpParser) -> HeadAction {
            self.0 = parser.should_keep_alive();
            HeadAction::Normal
        }
    }
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut sink = Keep(false);
    parser.parse(&mut sink, input).unwrap();
    assert!(sink.0, "1.0 with keep-alive token stays open");
}

#[test]
fn transfer_encoding_final_token_decides_chunked() {
    // gzip after chunked: chunked is not final, so the body length is
    // undeterminable for a request in strict mode.
    let input: &[u8] =
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked, gzip\r\n\r\n";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    assert_eq!(
        parser.parse(&mut rec, input).unwrap_err(),
        HttpError::InvalidTransferEncoding
    );

    let input: &[u8] = b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n0\r\n\r\n";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut parser, &mut rec, input);
    assert_eq!(consumed, input.len());
    assert_eq!(*rec.names().last().unwrap(), "msg_end");
}

#[test]
fn chunk_extensions_are_skipped() {
    let input: &[u8] =
        b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5;ext=1\r\nhello\r\n0\r\n\r\n";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut parser, &mut rec, input);
    assert_eq!(consumed, input.len());
    assert_eq!(rec.body(), b"hello");
}

#[test]
fn chunked_trailers_surface_as_headers() {
    let input: &[u8] = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\nX-Sum: 9\r\n\r\n";
    let mut parser = HttpParser::new(ParserKind::Request, ParseMode::Strict);
    let mut rec = Recorder::default();
    let consumed = parse_all(&mut parser, &mut rec, input);
    assert_eq!(consumed, input.len());
    assert!(rec.events.iter().any(|(n, kv)| n == "header" && kv == b"x-sum=9"));
    assert_eq!(*rec.names().last().unwrap(), "msg_end");
}
