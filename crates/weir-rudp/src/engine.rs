use std::collections::VecDeque;

use tracing::{debug, trace, warn};
use weir_timing::Millis;

use crate::segment::{
    CMD_ACK, CMD_PUSH, CMD_WASK, CMD_WINS, MTU_DEFAULT, OVERHEAD, Segment, SegmentHeader, WND_RCV,
    WND_SND,
};

const RTO_NDL: u32 = 30;
const RTO_MIN: u32 = 100;
const RTO_DEF: u32 = 200;
const RTO_MAX: u32 = 60_000;
const ASK_SEND: u32 = 1;
const ASK_TELL: u32 = 2;
const ACK_FAST: u32 = 3;
const INTERVAL: u32 = 100;
const DEADLINK: u32 = 20;
const THRESH_INIT: u32 = 2;
const THRESH_MIN: u32 = 2;
const PROBE_INIT: u32 = 7_000;
const PROBE_LIMIT: u32 = 120_000;
const FASTACK_LIMIT: u32 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RudpError {
    /// Nothing deliverable yet (recv) or the send queue cannot take
    /// the message right now; try again later.
    #[error("retry later")]
    Retry,
    /// Caller buffer smaller than the next message; grow to the given
    /// size and retry.
    #[error("buffer too small, next message is {0} bytes")]
    BufferTooSmall(usize),
    /// Datagram shorter than a header, wrong conversation id, payload
    /// length beyond the datagram, or unknown command.
    #[error("malformed datagram")]
    BadDatagram,
    /// Rejected tuning value.
    #[error("invalid parameter")]
    InvalidParam,
    /// A segment exceeded the retransmit limit; the session is dead.
    #[error("dead link")]
    DeadLink,
}

/// How duplicate-ack hints accumulate on older unacknowledged
/// segments.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FastAck {
    /// Any newer acked sn bumps every older in-flight segment.
    #[default]
    Aggressive,
    /// Only segments also older by timestamp are bumped.
    Conservative,
}

/// One end of a reliable-UDP conversation.
///
/// Sequencing state follows the conventional names: `snd_una` is the
/// first sequence not yet acknowledged by the peer, `snd_nxt` the next
/// sequence to assign, `rcv_nxt` the next sequence expected in order.
/// Invariants: `snd_una <= snd_nxt`; every sn in `snd_buf` lies in
/// `[snd_una, snd_nxt)`; `rcv_queue` is contiguous; in-flight count is
/// bounded by `min(snd_wnd, rmt_wnd, cwnd)`.
pub struct Rudp {
    conv: u32,
    mtu: usize,
    mss: usize,
    dead: bool,

    snd_una: u32,
    snd_nxt: u32,
    rcv_nxt: u32,

    ssthresh: u32,
    rx_rttval: u32,
    rx_srtt: u32,
    rx_rto: u32,
    rx_minrto: u32,

    snd_wnd: u32,
    rcv_wnd: u32,
    rmt_wnd: u32,
    cwnd: u32,
    incr: u32,

    probe: u32,
    ts_probe: Millis,
    probe_wait: u32,

    current: Millis,
    interval: u32,
    ts_flush: Millis,
    updated: bool,

    nodelay: u32,
    fastresend: u32,
    fastlimit: u32,
    fast_ack_mode: FastAck,
    nocwnd: bool,
    stream: bool,

    snd_queue: VecDeque<Segment>,
    snd_buf: VecDeque<Segment>,
    rcv_buf: VecDeque<Segment>,
    rcv_queue: VecDeque<Segment>,
    acklist: Vec<(u32, Millis)>,

    xmit: u32,
    scratch: Vec<u8>,
}

#[inline]
fn time_diff(later: u32, earlier: u32) -> i32 {
    later.wrapping_sub(earlier) as i32
}

impl Rudp {
    pub fn new(conv: u32) -> Self {
        Self {
            conv,
            mtu: MTU_DEFAULT,
            mss: MTU_DEFAULT - OVERHEAD,
            dead: false,
            snd_una: 0,
            snd_nxt: 0,
            rcv_nxt: 0,
            ssthresh: THRESH_INIT,
            rx_rttval: 0,
            rx_srtt: 0,
            rx_rto: RTO_DEF,
            rx_minrto: RTO_MIN,
            snd_wnd: WND_SND,
            rcv_wnd: WND_RCV,
            rmt_wnd: WND_RCV,
            // Initial window of one segment lets the opening flush put
            // the first push on the wire; slow start takes over from
            // there.
            cwnd: 1,
            incr: 0,
            probe: 0,
            ts_probe: Millis::ZERO,
            probe_wait: 0,
            current: Millis::ZERO,
            interval: INTERVAL,
            ts_flush: Millis(INTERVAL),
            updated: false,
            nodelay: 0,
            fastresend: 0,
            fastlimit: FASTACK_LIMIT,
            fast_ack_mode: FastAck::default(),
            nocwnd: false,
            stream: false,
            snd_queue: VecDeque::new(),
            snd_buf: VecDeque::new(),
            rcv_buf: VecDeque::new(),
            rcv_queue: VecDeque::new(),
            acklist: Vec::new(),
            xmit: 0,
            scratch: Vec::with_capacity((MTU_DEFAULT + OVERHEAD) * 3),
        }
    }

    #[inline]
    pub fn conv(&self) -> u32 {
        self.conv
    }

    /// True once a segment has hit the retransmit limit.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Largest message the peer's reassembly window is guaranteed to
    /// take.
    #[inline]
    pub fn max_msg_size(&self) -> usize {
        WND_RCV as usize * self.mss
    }

    /// Segments queued or in flight on the send side.
    #[inline]
    pub fn waiting_send(&self) -> usize {
        self.snd_queue.len() + self.snd_buf.len()
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.snd_buf.len()
    }

    pub fn set_mtu(&mut self, mtu: usize) -> Result<(), RudpError> {
        if mtu <= OVERHEAD {
            return Err(RudpError::InvalidParam);
        }
        self.mtu = mtu;
        self.mss = mtu - OVERHEAD;
        self.scratch = Vec::with_capacity((mtu + OVERHEAD) * 3);
        Ok(())
    }

    pub fn set_interval(&mut self, interval: u32) {
        self.interval = interval.clamp(10, 5_000);
    }

    /// Latency/throughput trade-off knobs.
    ///
    /// `nodelay` 0 doubles a segment's rto on timeout, 1 grows it by
    /// half, 2 grows it by half of the session rto. `resend` enables
    /// fast retransmit after that many duplicate-ack hints. `nc`
    /// disables the congestion window.
    pub fn set_nodelay(&mut self, nodelay: u32, interval: u32, resend: u32, nc: bool) {
        self.nodelay = nodelay;
        self.rx_minrto = if nodelay > 0 { RTO_NDL } else { RTO_MIN };
        self.set_interval(interval);
        self.fastresend = resend;
        self.nocwnd = nc;
    }

    pub fn set_fast_ack_mode(&mut self, mode: FastAck) {
        self.fast_ack_mode = mode;
    }

    /// Stream mode merges queued payloads instead of preserving
    /// message boundaries.
    pub fn set_stream(&mut self, stream: bool) {
        self.stream = stream;
    }

    pub fn set_wndsize(&mut self, snd: u32, rcv: u32) {
        if snd > 0 {
            self.snd_wnd = snd;
        }
        if rcv > 0 {
            // Never below the fragment maximum or reassembly jams.
            self.rcv_wnd = rcv.max(WND_RCV);
        }
    }

    /// Length of the next complete message, or None while fragments
    /// are still missing.
    pub fn peek_size(&self) -> Option<usize> {
        let first = self.rcv_queue.front()?;
        if first.frg == 0 {
            return Some(first.payload.len());
        }
        if self.rcv_queue.len() < usize::from(first.frg) + 1 {
            return None;
        }
        let mut total = 0;
        for seg in &self.rcv_queue {
            total += seg.payload.len();
            if seg.frg == 0 {
                break;
            }
        }
        Some(total)
    }

    /// Delivers the next complete message into `dst`.
    pub fn recv(&mut self, dst: &mut [u8]) -> Result<usize, RudpError> {
        let size = self.peek_size().ok_or(RudpError::Retry)?;
        if size > dst.len() {
            return Err(RudpError::BufferTooSmall(size));
        }
        let recover = self.rcv_queue.len() >= self.rcv_wnd as usize;

        let mut copied = 0;
        while let Some(seg) = self.rcv_queue.pop_front() {
            dst[copied..copied + seg.payload.len()].copy_from_slice(&seg.payload);
            copied += seg.payload.len();
            trace!(sn = seg.sn, "recv");
            if seg.frg == 0 {
                break;
            }
        }
        debug_assert_eq!(copied, size);

        self.promote_contiguous();

        // Window reopened: tell the peer on the next flush.
        if self.rcv_queue.len() < self.rcv_wnd as usize && recover {
            self.probe |= ASK_TELL;
        }
        Ok(copied)
    }

    /// Queues a message for delivery, fragmenting as needed.
    pub fn send(&mut self, mut data: &[u8]) -> Result<(), RudpError> {
        debug_assert!(self.mss > 0);

        // Stream mode: top up the tail segment first.
        if self.stream {
            if let Some(old) = self.snd_queue.back_mut() {
                if old.payload.len() < self.mss {
                    let extend = data.len().min(self.mss - old.payload.len());
                    old.payload.extend_from_slice(&data[..extend]);
                    old.frg = 0;
                    data = &data[extend..];
                }
            }
            if data.is_empty() {
                return Ok(());
            }
        }

        let count = if data.len() <= self.mss {
            1
        } else {
            data.len().div_ceil(self.mss)
        };
        if count >= self.rcv_wnd as usize {
            return Err(RudpError::Retry);
        }

        for i in 0..count {
            let size = data.len().min(self.mss);
            let seg = Segment {
                frg: if self.stream { 0 } else { (count - i - 1) as u8 },
                payload: data[..size].to_vec(),
                ..Segment::default()
            };
            self.snd_queue.push_back(seg);
            data = &data[size..];
        }
        Ok(())
    }

    /// Feeds a raw datagram (possibly several coalesced segments) into
    /// the engine.
    pub fn input(&mut self, data: &[u8]) -> Result<(), RudpError> {
        trace!(bytes = data.len(), "input");
        if data.len() < OVERHEAD {
            return Err(RudpError::BadDatagram);
        }
        let prev_una = self.snd_una;
        let mut max_ack: Option<(u32, Millis)> = None;
        let mut rest = data;

        while rest.len() >= OVERHEAD {
            let hdr = SegmentHeader::decode(rest).ok_or(RudpError::BadDatagram)?;
            if hdr.conv != self.conv {
                return Err(RudpError::BadDatagram);
            }
            rest = &rest[OVERHEAD..];
            if rest.len() < hdr.len as usize {
                return Err(RudpError::BadDatagram);
            }
            if !matches!(hdr.cmd, CMD_PUSH | CMD_ACK | CMD_WASK | CMD_WINS) {
                return Err(RudpError::BadDatagram);
            }

            self.rmt_wnd = u32::from(hdr.wnd);
            self.parse_una(hdr.una);
            self.shrink_buf();

            match hdr.cmd {
                CMD_ACK => {
                    let rtt = self.current.diff(hdr.ts);
                    if rtt >= 0 {
                        self.update_ack(rtt as u32);
                    }
                    self.parse_ack(hdr.sn);
                    self.shrink_buf();
                    max_ack = match (max_ack, self.fast_ack_mode) {
                        (None, _) => Some((hdr.sn, hdr.ts)),
                        (Some((sn, _)), FastAck::Aggressive) if time_diff(hdr.sn, sn) > 0 => {
                            Some((hdr.sn, hdr.ts))
                        }
                        (Some((sn, ts)), FastAck::Conservative)
                            if time_diff(hdr.sn, sn) > 0 && hdr.ts.diff(ts) > 0 =>
                        {
                            Some((hdr.sn, hdr.ts))
                        }
                        (keep, _) => keep,
                    };
                    trace!(sn = hdr.sn, rtt, "input ack");
                }
                CMD_PUSH => {
                    trace!(sn = hdr.sn, ts = hdr.ts.0, "input push");
                    if time_diff(hdr.sn, self.rcv_nxt.wrapping_add(self.rcv_wnd)) < 0 {
                        self.acklist.push((hdr.sn, hdr.ts));
                        if time_diff(hdr.sn, self.rcv_nxt) >= 0 {
                            let seg = Segment {
                                frg: hdr.frg,
                                ts: hdr.ts,
                                sn: hdr.sn,
                                payload: rest[..hdr.len as usize].to_vec(),
                                ..Segment::default()
                            };
                            self.parse_data(seg);
                        }
                    }
                }
                CMD_WASK => {
                    // Answer with a window report on the next flush.
                    self.probe |= ASK_TELL;
                    trace!("input probe");
                }
                CMD_WINS => {
                    trace!(wnd = hdr.wnd, "input window report");
                }
                _ => unreachable!(),
            }
            rest = &rest[hdr.len as usize..];
        }

        if let Some((sn, ts)) = max_ack {
            self.parse_fastack(sn, ts);
        }

        // Acked data frees window: grow it, slow start first, then
        // linearly, clamped by the remote window.
        if time_diff(self.snd_una, prev_una) > 0 && self.cwnd < self.rmt_wnd {
            let mss = self.mss as u32;
            if self.cwnd < self.ssthresh {
                self.cwnd += 1;
                self.incr += mss;
            } else {
                if self.incr < mss {
                    self.incr = mss;
                }
                self.incr += (mss * mss) / self.incr + (mss / 16);
                if (self.cwnd + 1) * mss <= self.incr {
                    self.cwnd = (self.incr + mss - 1) / mss.max(1);
                }
            }
            if self.cwnd > self.rmt_wnd {
                self.cwnd = self.rmt_wnd;
                self.incr = self.rmt_wnd * mss;
            }
        }
        Ok(())
    }

    /// Drives the flush schedule. Call repeatedly with the loop time;
    /// emitted datagrams go to `emit`.
    pub fn update(&mut self, now: Millis, emit: &mut dyn FnMut(&[u8])) {
        self.current = now;
        if !self.updated {
            self.updated = true;
            self.ts_flush = now;
        }

        let mut slap = now.diff(self.ts_flush);
        if !(-10_000..10_000).contains(&slap) {
            self.ts_flush = now;
            slap = 0;
        }
        if slap >= 0 {
            self.ts_flush = self.ts_flush + self.interval;
            if now.reached(self.ts_flush) {
                self.ts_flush = now + self.interval;
            }
            self.flush(emit);
        }
    }

    /// Earliest time the next `update` is useful: the flush tick or
    /// the nearest retransmit deadline, whichever comes first.
    pub fn check(&self, now: Millis) -> Millis {
        if !self.updated {
            return now;
        }
        let mut ts_flush = self.ts_flush;
        if now.diff(ts_flush).abs() >= 10_000 {
            ts_flush = now;
        }
        if now.reached(ts_flush) {
            return now;
        }
        let tm_flush = ts_flush.diff(now);
        let mut tm_packet = i32::MAX;
        for seg in &self.snd_buf {
            let diff = seg.resend_ts.diff(now);
            if diff <= 0 {
                return now;
            }
            tm_packet = tm_packet.min(diff);
        }
        let minimal = tm_packet.min(tm_flush).min(self.interval as i32).max(0);
        now + minimal as u32
    }

    fn promote_contiguous(&mut self) {
        while let Some(seg) = self.rcv_buf.front() {
            if seg.sn == self.rcv_nxt && self.rcv_queue.len() < self.rcv_wnd as usize {
                let seg = self.rcv_buf.pop_front().unwrap();
                self.rcv_queue.push_back(seg);
                self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
            } else {
                break;
            }
        }
    }

    fn parse_data(&mut self, seg: Segment) {
        let sn = seg.sn;
        if time_diff(sn, self.rcv_nxt.wrapping_add(self.rcv_wnd)) >= 0
            || time_diff(sn, self.rcv_nxt) < 0
        {
            return;
        }
        // Insert sorted from the back; duplicates are dropped.
        let mut insert_at = self.rcv_buf.len();
        let mut repeat = false;
        for (i, held) in self.rcv_buf.iter().enumerate().rev() {
            if held.sn == sn {
                repeat = true;
                break;
            }
            if time_diff(sn, held.sn) > 0 {
                break;
            }
            insert_at = i;
        }
        if repeat {
            trace!(sn, "duplicate segment dropped");
        } else {
            self.rcv_buf.insert(insert_at, seg);
        }
        self.promote_contiguous();
    }

    fn parse_una(&mut self, una: u32) {
        while let Some(seg) = self.snd_buf.front() {
            if time_diff(una, seg.sn) > 0 {
                self.snd_buf.pop_front();
            } else {
                break;
            }
        }
    }

    fn parse_ack(&mut self, sn: u32) {
        if time_diff(sn, self.snd_una) < 0 || time_diff(sn, self.snd_nxt) >= 0 {
            return;
        }
        for (i, seg) in self.snd_buf.iter().enumerate() {
            if sn == seg.sn {
                self.snd_buf.remove(i);
                break;
            }
            if time_diff(sn, seg.sn) < 0 {
                break;
            }
        }
    }

    fn parse_fastack(&mut self, sn: u32, ts: Millis) {
        if time_diff(sn, self.snd_una) < 0 || time_diff(sn, self.snd_nxt) >= 0 {
            return;
        }
        for seg in &mut self.snd_buf {
            if time_diff(sn, seg.sn) < 0 {
                break;
            }
            if sn != seg.sn {
                match self.fast_ack_mode {
                    FastAck::Aggressive => seg.fast_acks += 1,
                    FastAck::Conservative => {
                        if ts.diff(seg.ts) >= 0 {
                            seg.fast_acks += 1;
                        }
                    }
                }
            }
        }
    }

    fn shrink_buf(&mut self) {
        self.snd_una = self.snd_buf.front().map_or(self.snd_nxt, |seg| seg.sn);
    }

    fn update_ack(&mut self, rtt: u32) {
        if self.rx_srtt == 0 {
            self.rx_srtt = rtt;
            self.rx_rttval = rtt / 2;
        } else {
            let delta = rtt.abs_diff(self.rx_srtt);
            self.rx_rttval = (3 * self.rx_rttval + delta) / 4;
            self.rx_srtt = (7 * self.rx_srtt + rtt) / 8;
            if self.rx_srtt < 1 {
                self.rx_srtt = 1;
            }
        }
        let rto = self.rx_srtt + self.interval.max(4 * self.rx_rttval);
        self.rx_rto = rto.clamp(self.rx_minrto, RTO_MAX);
    }

    #[inline]
    fn wnd_unused(&self) -> u16 {
        (self.rcv_wnd as usize).saturating_sub(self.rcv_queue.len()) as u16
    }

    fn flush(&mut self, emit: &mut dyn FnMut(&[u8])) {
        // Never flush before the first update supplies a clock.
        if !self.updated {
            return;
        }
        let current = self.current;
        let wnd_unused = self.wnd_unused();
        let mut ctl = SegmentHeader {
            conv: self.conv,
            cmd: CMD_ACK,
            frg: 0,
            wnd: wnd_unused,
            ts: Millis::ZERO,
            sn: 0,
            una: self.rcv_nxt,
            len: 0,
        };

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();

        // Pending acks, batched up to the MTU.
        for &(sn, ts) in &self.acklist {
            if scratch.len() + OVERHEAD > self.mtu {
                emit(&scratch);
                scratch.clear();
            }
            ctl.sn = sn;
            ctl.ts = ts;
            ctl.encode_into(&mut scratch);
        }
        self.acklist.clear();

        // Zero remote window: probe for it with exponential backoff.
        if self.rmt_wnd == 0 {
            if self.probe_wait == 0 {
                self.probe_wait = PROBE_INIT;
                self.ts_probe = current + self.probe_wait;
            } else if current.reached(self.ts_probe) {
                if self.probe_wait < PROBE_INIT {
                    self.probe_wait = PROBE_INIT;
                }
                self.probe_wait += self.probe_wait / 2;
                if self.probe_wait > PROBE_LIMIT {
                    self.probe_wait = PROBE_LIMIT;
                }
                self.ts_probe = current + self.probe_wait;
                self.probe |= ASK_SEND;
                debug!(wait = self.probe_wait, "window probe scheduled");
            }
        } else {
            self.ts_probe = Millis::ZERO;
            self.probe_wait = 0;
        }

        if self.probe & ASK_SEND != 0 {
            ctl.cmd = CMD_WASK;
            ctl.sn = 0;
            ctl.ts = Millis::ZERO;
            if scratch.len() + OVERHEAD > self.mtu {
                emit(&scratch);
                scratch.clear();
            }
            ctl.encode_into(&mut scratch);
        }
        if self.probe & ASK_TELL != 0 {
            ctl.cmd = CMD_WINS;
            ctl.sn = 0;
            ctl.ts = Millis::ZERO;
            if scratch.len() + OVERHEAD > self.mtu {
                emit(&scratch);
                scratch.clear();
            }
            ctl.encode_into(&mut scratch);
        }
        self.probe = 0;

        let mut cwnd = self.snd_wnd.min(self.rmt_wnd);
        if !self.nocwnd {
            cwnd = cwnd.min(self.cwnd);
        }

        // Admit queued segments into the in-flight buffer.
        while time_diff(self.snd_nxt, self.snd_una.wrapping_add(cwnd)) < 0 {
            let Some(mut seg) = self.snd_queue.pop_front() else {
                break;
            };
            seg.ts = current;
            seg.sn = self.snd_nxt;
            self.snd_nxt = self.snd_nxt.wrapping_add(1);
            seg.resend_ts = current;
            seg.rto = self.rx_rto;
            seg.fast_acks = 0;
            seg.xmit = 0;
            self.snd_buf.push_back(seg);
        }

        let resent = if self.fastresend > 0 { self.fastresend } else { u32::MAX };
        let rtomin = if self.nodelay == 0 { self.rx_rto >> 3 } else { 0 };
        let mut lost = false;
        let mut change = false;

        for seg in &mut self.snd_buf {
            let mut needsend = false;
            if seg.xmit == 0 {
                needsend = true;
                seg.xmit = 1;
                seg.rto = self.rx_rto;
                seg.resend_ts = current + seg.rto + rtomin;
            } else if current.reached(seg.resend_ts) {
                needsend = true;
                seg.xmit += 1;
                self.xmit += 1;
                if self.nodelay == 0 {
                    seg.rto += seg.rto.max(self.rx_rto);
                } else {
                    let step = if self.nodelay < 2 { seg.rto } else { self.rx_rto };
                    seg.rto += step / 2;
                }
                seg.resend_ts = current + seg.rto;
                lost = true;
                trace!(sn = seg.sn, xmit = seg.xmit, rto = seg.rto, "rto retransmit");
            } else if seg.fast_acks >= resent && (seg.xmit <= self.fastlimit || self.fastlimit == 0)
            {
                needsend = true;
                seg.xmit += 1;
                seg.fast_acks = 0;
                seg.resend_ts = current + seg.rto;
                change = true;
                trace!(sn = seg.sn, "fast retransmit");
            }

            if needsend {
                seg.ts = current;
                let hdr = SegmentHeader {
                    conv: self.conv,
                    cmd: CMD_PUSH,
                    frg: seg.frg,
                    wnd: wnd_unused,
                    ts: seg.ts,
                    sn: seg.sn,
                    una: self.rcv_nxt,
                    len: seg.payload.len() as u32,
                };
                if scratch.len() + OVERHEAD + seg.payload.len() > self.mtu {
                    emit(&scratch);
                    scratch.clear();
                }
                hdr.encode_into(&mut scratch);
                scratch.extend_from_slice(&seg.payload);

                if seg.xmit >= DEADLINK {
                    self.dead = true;
                    warn!(sn = seg.sn, xmit = seg.xmit, "link declared dead");
                }
            }
        }

        if !scratch.is_empty() {
            emit(&scratch);
            scratch.clear();
        }
        self.scratch = scratch;

        // Fast retransmit halves the threshold against what is in
        // flight; loss collapses the window entirely.
        if change {
            let inflight = self.snd_nxt.wrapping_sub(self.snd_una);
            self.ssthresh = (inflight / 2).max(THRESH_MIN);
            self.cwnd = self.ssthresh.saturating_add(resent);
            self.incr = self.cwnd.saturating_mul(self.mss as u32);
        }
        if lost {
            self.ssthresh = (cwnd / 2).max(THRESH_MIN);
            self.cwnd = 1;
            self.incr = self.mss as u32;
        }
        if self.cwnd < 1 {
            self.cwnd = 1;
            self.incr = self.mss as u32;
        }
    }
}
