use std::{cell::RefCell, rc::Rc};

use tracing::debug;

use crate::{
    DirListEvt, EvtResult, FileReadEvt, FileSaveEvt, HttpEventer, HttpMsg, StockErrorEvt,
    eventer::ERROR_BODY,
    layer::WebsiteCfg,
    mime::mime_for_path,
    msg::MsgFlags,
    url::simplify_path,
};

/// Stage of the message pipeline. Each inbound parse event advances
/// the message into a station; output-side stations advance as the
/// wire drains.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StationId {
    Init,
    Path,
    Head,
    Body,
    BodyDone,
    RespHead,
    RespBody,
    RespBodyDone,
    Error,
    Close,
}

/// One station step outcome.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Ok,
    /// Blocked on I/O (outbound cache must drain first); run the
    /// station again after progress.
    Retry,
    Error,
}

/// Runs the station the message currently sits in, once.
pub fn step_msg(msg: &mut HttpMsg, site: &WebsiteCfg) -> Step {
    match msg.station() {
        StationId::Init => Step::Ok,
        StationId::Path => station_path(msg, site),
        StationId::Head => station_head(msg),
        StationId::Body => station_body(msg),
        StationId::BodyDone => station_body_done(msg),
        StationId::RespHead => station_resp_head(msg),
        StationId::RespBody => station_resp_body(msg),
        StationId::RespBodyDone => station_resp_body_done(msg),
        StationId::Error => station_error(msg),
        StationId::Close => station_close(msg),
    }
}

/// Keeps stepping while stations advance; settles on Retry or a
/// terminal station.
pub fn run_pipeline(msg: &mut HttpMsg, site: &WebsiteCfg) -> Step {
    loop {
        let before = msg.station();
        match step_msg(msg, site) {
            Step::Ok => {
                if msg.station() == before || msg.station() == StationId::Close {
                    return Step::Ok;
                }
            }
            Step::Retry => return Step::Retry,
            Step::Error => {
                if msg.station() == StationId::Error {
                    // The error station itself failed; give up.
                    return Step::Error;
                }
                msg.set_station(StationId::Error);
            }
        }
    }
}

/// Resolves the URL to a target: default page, traversal rejection,
/// eventer dispatch by prefix, MIME from the extension.
fn station_path(msg: &mut HttpMsg, site: &WebsiteCfg) -> Step {
    let raw_path = msg.url.path_str().replace('\\', "/");
    if raw_path.contains("/../") || raw_path.ends_with("/..") {
        debug!(path = %raw_path, "path traversal rejected");
        msg.status = 403;
        return Step::Error;
    }

    let mut path = simplify_path(&raw_path);
    if path == "/" {
        path.push_str("index.html");
    }

    let mut upload = false;
    let (evt, rel): (Rc<RefCell<dyn HttpEventer>>, &str) =
        if path.strip_prefix("/lua/").is_some() {
            // Scripted targets are not hosted here.
            (Rc::new(RefCell::new(StockErrorEvt::new(501))), &path[1..])
        } else if let Some(rest) = path.strip_prefix("/fs/") {
            if site.root.join(rest).is_dir() {
                (Rc::new(RefCell::new(DirListEvt::new(&site.host))), rest)
            } else {
                (Rc::new(RefCell::new(FileReadEvt::new(&site.host))), rest)
            }
        } else if let Some(rest) = path.strip_prefix("/up/") {
            upload = true;
            (Rc::new(RefCell::new(FileSaveEvt::new(&site.host))), rest)
        } else {
            (Rc::new(RefCell::new(FileReadEvt::new(&site.host))), &path[1..])
        };

    msg.real_path = site.root.join(rel);
    msg.mime = mime_for_path(&path);
    msg.set_event(evt);

    // Uploads need the target open before body bytes arrive; readers
    // open once the request is complete.
    if upload {
        if let Some(evt) = msg.event() {
            if evt.borrow_mut().on_open(msg) == EvtResult::Error {
                msg.status = 500;
                return Step::Error;
            }
            msg.flags |= MsgFlags::OPENED;
        }
    }

    msg.set_station(StationId::Head);
    Step::Ok
}

/// Mirrors the keep-alive decision into the outbound head.
fn station_head(msg: &mut HttpMsg) -> Step {
    let value: &[u8] = if msg.is_keep_alive() { b"keep-alive" } else { b"close" };
    msg.head_out.set(b"Connection", value);
    msg.set_station(StationId::Body);
    Step::Ok
}

/// Forwards buffered body bytes to the eventer.
fn station_body(msg: &mut HttpMsg) -> Step {
    if let Some(evt) = msg.event() {
        if evt.borrow_mut().on_body_part(msg) == EvtResult::Error {
            msg.status = 500;
            return Step::Error;
        }
    }
    Step::Ok
}

/// Request complete: open the target (unless the upload path already
/// did) and let the eventer produce the response.
fn station_body_done(msg: &mut HttpMsg) -> Step {
    msg.flags |= MsgFlags::TAILING;
    let Some(evt) = msg.event() else {
        msg.status = 404;
        return Step::Error;
    };
    let mut evt_ref = evt.borrow_mut();
    if !msg.flags.contains(MsgFlags::OPENED) {
        if evt_ref.on_open(msg) == EvtResult::Error {
            msg.status = 404;
            return Step::Error;
        }
        msg.flags |= MsgFlags::OPENED;
    }
    match evt_ref.on_finish(msg) {
        EvtResult::Ok | EvtResult::Closing => {
            msg.set_station(StationId::RespHead);
            Step::Ok
        }
        EvtResult::Error => {
            msg.status = if msg.status == 200 { 404 } else { msg.status };
            Step::Error
        }
    }
}

/// Head bytes drain before the body starts flowing.
fn station_resp_head(msg: &mut HttpMsg) -> Step {
    if !msg.cache_out.is_empty() {
        return Step::Retry;
    }
    msg.set_station(StationId::RespBody);
    Step::Ok
}

/// Body streaming: wait for the wire to drain, then pull more from
/// the eventer until it reports completion.
fn station_resp_body(msg: &mut HttpMsg) -> Step {
    if !msg.cache_out.is_empty() {
        return Step::Retry;
    }
    let Some(evt) = msg.event() else {
        msg.set_station(StationId::RespBodyDone);
        return Step::Ok;
    };
    match evt.borrow_mut().on_sent(msg) {
        EvtResult::Ok => Step::Retry,
        EvtResult::Closing => {
            msg.set_station(StationId::RespBodyDone);
            Step::Ok
        }
        EvtResult::Error => Step::Error,
    }
}

fn station_resp_body_done(msg: &mut HttpMsg) -> Step {
    if !msg.cache_out.is_empty() {
        return Step::Retry;
    }
    msg.set_station(StationId::Close);
    Step::Ok
}

/// Resets the outbound cache and serializes a stock error response.
fn station_error(msg: &mut HttpMsg) -> Step {
    msg.cache_out.reset();
    if msg.status == 200 {
        msg.status = 500;
    }
    msg.head_out.remove(b"Transfer-Encoding");
    msg.head_out.set(b"Connection", b"close");
    msg.head_out.set(b"Content-Type", b"text/html;charset=utf-8");
    msg.head_out.set(b"Content-Length", ERROR_BODY.len().to_string().as_bytes());
    msg.flags -= MsgFlags::KEEP_ALIVE;
    let code = msg.status;
    msg.write_status(code);
    msg.dump_head_out();
    msg.write_out(b"\r\n");
    msg.write_out(ERROR_BODY);
    msg.set_station(StationId::RespBodyDone);
    Step::Ok
}

fn station_close(msg: &mut HttpMsg) -> Step {
    if let Some(evt) = msg.take_event() {
        evt.borrow_mut().on_close();
    }
    Step::Ok
}
