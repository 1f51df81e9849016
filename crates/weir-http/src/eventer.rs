use std::{
    fs,
    io::{Read, Write},
};

use tracing::{debug, warn};

use crate::{HttpMsg, msg::MsgFlags};

/// Outcome of an eventer callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EvtResult {
    Ok,
    /// Nothing further to produce; the response body is complete.
    Closing,
    Error,
}

/// Pluggable body strategy for one exchange: where the request body
/// goes and where the response body comes from.
pub trait HttpEventer {
    /// Target resolved; acquire resources. Failure routes the message
    /// to the error station.
    fn on_open(&mut self, msg: &mut HttpMsg) -> EvtResult;

    /// A slice of the request body landed in `msg.cache_in`.
    fn on_body_part(&mut self, msg: &mut HttpMsg) -> EvtResult {
        // Default: discard.
        let n = msg.cache_in.len();
        msg.cache_in.commit_head(n);
        EvtResult::Ok
    }

    /// Request fully received; produce the response head and the
    /// first body bytes into `msg.cache_out`.
    fn on_finish(&mut self, msg: &mut HttpMsg) -> EvtResult;

    /// The outbound cache drained; produce more body bytes.
    fn on_sent(&mut self, _msg: &mut HttpMsg) -> EvtResult {
        EvtResult::Closing
    }

    /// Exchange is over (successfully or not); release resources.
    fn on_close(&mut self) {}
}

/// How many file bytes to pull per produced chunk. Sized so a chunk
/// with its framing stays within one ring block.
const READ_STEP: usize = 3 * 1024;

/// Chunk-size prefix: four hex digits plus CRLF, patched in once the
/// read size is known.
const CHUNK_PREFIX: usize = 6;

fn write_common_head(msg: &mut HttpMsg, host: &str) {
    let host = host.to_owned();
    msg.head_out.set(b"Host", host.as_bytes());
    msg.head_out.set(b"Access-Control-Allow-Origin", b"*");
}

/// Streams a file as a chunked response body.
pub struct FileReadEvt {
    file: Option<fs::File>,
    remaining: u64,
    host: String,
}

impl FileReadEvt {
    pub fn new(host: &str) -> Self {
        Self { file: None, remaining: 0, host: host.to_owned() }
    }

    /// Pulls the next chunk of the file into the outbound cache,
    /// reserving the size prefix and patching it afterwards.
    fn produce_chunk(&mut self, msg: &mut HttpMsg) -> EvtResult {
        let Some(file) = self.file.as_mut() else {
            return EvtResult::Error;
        };
        let want = (self.remaining as usize).min(READ_STEP);
        let (pos, space) = msg.cache_out.peek_tail(CHUNK_PREFIX, want);
        let take = want.min(space.len());
        let got = match file.read(&mut space[..take]) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "file read failed mid-body");
                return EvtResult::Error;
            }
        };
        msg.cache_out.commit_tail(got);
        let prefix = format!("{got:04x}\r\n");
        msg.cache_out.rewrite(pos, prefix.as_bytes());
        msg.cache_out.write(b"\r\n");
        self.remaining -= got as u64;
        if got == 0 {
            // Early end of file: the zero-size chunk just written is
            // already the terminator.
            self.file = None;
            return EvtResult::Closing;
        }
        if self.remaining == 0 {
            msg.write_out_chunk_end();
            self.file = None;
            return EvtResult::Closing;
        }
        EvtResult::Ok
    }
}

impl HttpEventer for FileReadEvt {
    fn on_open(&mut self, msg: &mut HttpMsg) -> EvtResult {
        match fs::File::open(&msg.real_path) {
            Ok(file) => {
                self.remaining = file.metadata().map(|m| m.len()).unwrap_or(0);
                self.file = Some(file);
                EvtResult::Ok
            }
            Err(e) => {
                debug!(path = %msg.real_path.display(), error = %e, "open failed");
                EvtResult::Error
            }
        }
    }

    fn on_finish(&mut self, msg: &mut HttpMsg) -> EvtResult {
        if self.file.is_none() {
            return EvtResult::Error;
        }
        let host = self.host.clone();
        write_common_head(msg, &host);
        msg.head_out.set(b"Content-Type", msg.mime.as_bytes());
        msg.head_out.set(b"Transfer-Encoding", b"chunked");
        msg.flags |= MsgFlags::CHUNKED_OUT;
        msg.write_status(200);
        msg.dump_head_out();
        msg.write_out(b"\r\n");
        if self.remaining == 0 {
            msg.write_out_chunk_end();
            self.file = None;
            return EvtResult::Ok;
        }
        match self.produce_chunk(msg) {
            EvtResult::Error => EvtResult::Error,
            _ => EvtResult::Ok,
        }
    }

    fn on_sent(&mut self, msg: &mut HttpMsg) -> EvtResult {
        if self.file.is_none() {
            return EvtResult::Closing;
        }
        self.produce_chunk(msg)
    }

    fn on_close(&mut self) {
        self.file = None;
    }
}

/// Consumes an upload body to disk and answers with a JSON ack.
pub struct FileSaveEvt {
    file: Option<fs::File>,
    written: u64,
    failed: bool,
    host: String,
}

impl FileSaveEvt {
    pub fn new(host: &str) -> Self {
        Self { file: None, written: 0, failed: false, host: host.to_owned() }
    }
}

impl HttpEventer for FileSaveEvt {
    fn on_open(&mut self, msg: &mut HttpMsg) -> EvtResult {
        if let Some(dir) = msg.real_path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        match fs::File::create(&msg.real_path) {
            Ok(file) => {
                self.file = Some(file);
                EvtResult::Ok
            }
            Err(e) => {
                warn!(path = %msg.real_path.display(), error = %e, "create failed");
                EvtResult::Error
            }
        }
    }

    fn on_body_part(&mut self, msg: &mut HttpMsg) -> EvtResult {
        let Some(file) = self.file.as_mut() else {
            return EvtResult::Error;
        };
        loop {
            let view = msg.cache_in.peek_head();
            if view.is_empty() {
                return EvtResult::Ok;
            }
            match file.write_all(view) {
                Ok(()) => {
                    let n = view.len();
                    self.written += n as u64;
                    msg.cache_in.commit_head(n);
                }
                Err(e) => {
                    warn!(error = %e, "upload write failed");
                    self.failed = true;
                    return EvtResult::Error;
                }
            }
        }
    }

    fn on_finish(&mut self, msg: &mut HttpMsg) -> EvtResult {
        // Late body bytes may still sit in the cache.
        if self.on_body_part(msg) == EvtResult::Error {
            self.failed = true;
        }
        if let Some(file) = self.file.take() {
            drop(file);
        } else {
            self.failed = true;
        }
        let host = self.host.clone();
        write_common_head(msg, &host);
        msg.head_out.set(b"Content-Type", b"application/json; charset=utf-8");
        let (code, body): (u16, &[u8]) = if self.failed {
            (500, br#"{"ecode":500,"emsg":"fail"}"#)
        } else {
            (200, br#"{"ecode":0,"emsg":"success"}"#)
        };
        msg.head_out.set(b"Content-Length", body.len().to_string().as_bytes());
        msg.write_status(code);
        msg.dump_head_out();
        msg.write_out(b"\r\n");
        msg.write_out(body);
        debug!(written = self.written, code, "upload finished");
        EvtResult::Ok
    }
}

/// Renders a directory listing as HTML.
pub struct DirListEvt {
    host: String,
    entries: Option<Vec<(String, bool, u64)>>,
}

impl DirListEvt {
    pub fn new(host: &str) -> Self {
        Self { host: host.to_owned(), entries: None }
    }

    fn render(entries: &[(String, bool, u64)], title: &str) -> String {
        let mut html = String::with_capacity(512);
        html.push_str("<html>\n<head><title>");
        html.push_str(title);
        html.push_str("</title></head>\n<body>\n<hr><ul>\n");
        for (name, is_dir, size) in entries {
            let suffix = if *is_dir { "/" } else { "" };
            html.push_str(&format!(
                "<li><a href=\"{name}{suffix}\">{name}{suffix}</a> {size}</li>\n"
            ));
        }
        html.push_str("</ul><hr>\n</body>\n</html>");
        html
    }
}

impl HttpEventer for DirListEvt {
    fn on_open(&mut self, msg: &mut HttpMsg) -> EvtResult {
        let read = match fs::read_dir(&msg.real_path) {
            Ok(rd) => rd,
            Err(e) => {
                debug!(path = %msg.real_path.display(), error = %e, "read_dir failed");
                return EvtResult::Error;
            }
        };
        let mut entries = Vec::new();
        for item in read.flatten() {
            let name = item.file_name().to_string_lossy().into_owned();
            let meta = item.metadata().ok();
            let is_dir = meta.as_ref().is_some_and(|m| m.is_dir());
            let size = meta.map(|m| m.len()).unwrap_or(0);
            entries.push((name, is_dir, size));
        }
        entries.sort();
        self.entries = Some(entries);
        EvtResult::Ok
    }

    fn on_finish(&mut self, msg: &mut HttpMsg) -> EvtResult {
        let Some(entries) = self.entries.take() else {
            return EvtResult::Error;
        };
        let title = msg.url.path_str().to_owned();
        let body = Self::render(&entries, &title);
        let host = self.host.clone();
        write_common_head(msg, &host);
        msg.head_out.set(b"Content-Type", b"text/html;charset=utf-8");
        msg.head_out.set(b"Content-Length", body.len().to_string().as_bytes());
        msg.write_status(200);
        msg.dump_head_out();
        msg.write_out(b"\r\n");
        msg.write_out(body.as_bytes());
        EvtResult::Ok
    }
}

/// Answers every request with a fixed status and a stock body.
pub struct StockErrorEvt {
    code: u16,
}

impl StockErrorEvt {
    pub fn new(code: u16) -> Self {
        Self { code }
    }
}

pub(crate) const ERROR_BODY: &[u8] = b"<html>\n<head>\n<title>ERROR</title>\n</head>\n\
<body>\n<hr><br>*_*<br><hr></body>\n</html>";

impl HttpEventer for StockErrorEvt {
    fn on_open(&mut self, _msg: &mut HttpMsg) -> EvtResult {
        EvtResult::Ok
    }

    fn on_finish(&mut self, msg: &mut HttpMsg) -> EvtResult {
        msg.head_out.set(b"Content-Type", b"text/html;charset=utf-8");
        msg.head_out.set(b"Content-Length", ERROR_BODY.len().to_string().as_bytes());
        msg.write_status(self.code);
        msg.dump_head_out();
        msg.write_out(b"\r\n");
        msg.write_out(ERROR_BODY);
        EvtResult::Ok
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn drain(msg: &mut HttpMsg) -> Vec<u8> {
        let mut out = vec![0u8; msg.cache_out.len()];
        msg.cache_out.read(&mut out);
        out
    }

    #[test]
    fn file_read_streams_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let payload = vec![b'x'; READ_STEP + 100];
        fs::File::create(&path).unwrap().write_all(&payload).unwrap();

        let mut msg = HttpMsg::new();
        msg.real_path = path;
        msg.mime = "text/plain;charset=utf-8";
        let mut evt = FileReadEvt::new("unit");
        assert_eq!(evt.on_open(&mut msg), EvtResult::Ok);
        assert_eq!(evt.on_finish(&mut msg), EvtResult::Ok);
        let head = drain(&mut msg);
        let head_text = String::from_utf8_lossy(&head).into_owned();
        assert!(head_text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head_text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(head_text.contains(&format!("{READ_STEP:04x}\r\n")));

        // Remaining bytes come on the next pull, then the terminator.
        assert_eq!(evt.on_sent(&mut msg), EvtResult::Closing);
        let tail = drain(&mut msg);
        let tail_text = String::from_utf8_lossy(&tail).into_owned();
        assert!(tail_text.starts_with("0064\r\n"));
        assert!(tail_text.ends_with("0\r\n\r\n"));
    }

    #[test]
    fn file_read_missing_file_errors() {
        let mut msg = HttpMsg::new();
        msg.real_path = "/definitely/not/here".into();
        let mut evt = FileReadEvt::new("unit");
        assert_eq!(evt.on_open(&mut msg), EvtResult::Error);
    }

    #[test]
    fn file_save_acknowledges_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("up.bin");

        let mut msg = HttpMsg::new();
        msg.real_path = path.clone();
        let mut evt = FileSaveEvt::new("unit");
        assert_eq!(evt.on_open(&mut msg), EvtResult::Ok);
        msg.cache_in.write(b"part one ");
        assert_eq!(evt.on_body_part(&mut msg), EvtResult::Ok);
        msg.cache_in.write(b"part two");
        assert_eq!(evt.on_finish(&mut msg), EvtResult::Ok);

        assert_eq!(fs::read(&path).unwrap(), b"part one part two");
        let out = String::from_utf8(drain(&mut msg)).unwrap();
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with(r#"{"ecode":0,"emsg":"success"}"#));
    }

    #[test]
    fn dir_list_renders_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::File::create(dir.path().join("b.txt")).unwrap().write_all(b"12345").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let mut msg = HttpMsg::new();
        msg.real_path = dir.path().to_path_buf();
        let mut evt = DirListEvt::new("unit");
        assert_eq!(evt.on_open(&mut msg), EvtResult::Ok);
        assert_eq!(evt.on_finish(&mut msg), EvtResult::Ok);
        let out = String::from_utf8(drain(&mut msg)).unwrap();
        assert!(out.contains("a/"));
        assert!(out.contains("b.txt"));
        assert!(out.contains("12345") || out.contains("> 5<") || out.contains(" 5"));
    }
}
