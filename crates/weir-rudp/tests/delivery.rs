use rand::{Rng, SeedableRng, rngs::StdRng};
use weir_rudp::{Rudp, RudpError, WND_SND};
use weir_timing::Millis;

/// Lossy, reordering, duplicating two-way channel between a pair of
/// engines, driven in 10 ms steps.
struct Harness {
    a: Rudp,
    b: Rudp,
    to_a: Vec<Vec<u8>>,
    to_b: Vec<Vec<u8>>,
    rng: StdRng,
    loss: f64,
    dup: f64,
    reorder: bool,
    now: u32,
    max_in_flight: usize,
}

impl Harness {
    fn new(conv: u32, seed: u64) -> Self {
        let mut a = Rudp::new(conv);
        let mut b = Rudp::new(conv);
        a.set_nodelay(1, 10, 2, false);
        b.set_nodelay(1, 10, 2, false);
        Self {
            a,
            b,
            to_a: Vec::new(),
            to_b: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            loss: 0.0,
            dup: 0.0,
            reorder: false,
            now: 0,
            max_in_flight: 0,
        }
    }

    fn step(&mut self) {
        self.now += 10;
        let now = Millis(self.now);

        let mut out_b = Vec::new();
        self.a.update(now, &mut |d: &[u8]| out_b.push(d.to_vec()));
        let mut out_a = Vec::new();
        self.b.update(now, &mut |d: &[u8]| out_a.push(d.to_vec()));
        self.max_in_flight = self.max_in_flight.max(self.a.in_flight());

        for d in out_b {
            self.channel_push(d, false);
        }
        for d in out_a {
            self.channel_push(d, true);
        }

        if self.reorder {
            let n = self.to_a.len();
            if n > 1 {
                let i = self.rng.random_range(0..n);
                self.to_a.swap(0, i);
            }
            let n = self.to_b.len();
            if n > 1 {
                let i = self.rng.random_range(0..n);
                self.to_b.swap(0, i);
            }
        }

        for d in std::mem::take(&mut self.to_a) {
            let _ = self.a.input(&d);
        }
        for d in std::mem::take(&mut self.to_b) {
            let _ = self.b.input(&d);
        }
    }

    fn channel_push(&mut self, datagram: Vec<u8>, to_a: bool) {
        if self.loss > 0.0 && self.rng.random_bool(self.loss) {
            return;
        }
        let queue = if to_a { &mut self.to_a } else { &mut self.to_b };
        if self.dup > 0.0 && self.rng.random_bool(self.dup) {
            queue.push(datagram.clone());
        }
        queue.push(datagram);
    }
}

fn messages(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let len = (i * 131) % 3_000 + 1;
            let mut m = vec![0u8; len];
            for (j, b) in m.iter_mut().enumerate() {
                *b = ((i * 7 + j) % 251) as u8;
            }
            m
        })
        .collect()
}

fn run_delivery(seed: u64, loss: f64, dup: f64, reorder: bool) {
    let sent = messages(40);
    let mut h = Harness::new(0x1122_3344, seed);
    h.loss = loss;
    h.dup = dup;
    h.reorder = reorder;

    let mut next_send = 0;
    let mut received = Vec::new();
    let mut buf = vec![0u8; 8 * 1024];
    let mut idle_steps = 0;

    while received.len() < sent.len() && idle_steps < 60_000 {
        while next_send < sent.len() {
            match h.a.send(&sent[next_send]) {
                Ok(()) => next_send += 1,
                Err(RudpError::Retry) => break,
                Err(e) => panic!("send failed: {e}"),
            }
            // Keep a modest backlog so the window stays busy without
            // swamping the queue.
            if next_send - received.len() > 8 {
                break;
            }
        }
        h.step();
        loop {
            match h.b.recv(&mut buf) {
                Ok(n) => {
                    received.push(buf[..n].to_vec());
                    idle_steps = 0;
                }
                Err(RudpError::BufferTooSmall(need)) => {
                    buf.resize(need, 0);
                }
                Err(RudpError::Retry) => break,
                Err(e) => panic!("recv failed: {e}"),
            }
        }
        idle_steps += 1;
        assert!(!h.a.is_dead(), "sender died at message {}", received.len());
    }

    assert_eq!(received.len(), sent.len(), "lost messages (seed {seed})");
    for (i, (got, want)) in received.iter().zip(&sent).enumerate() {
        assert_eq!(got, want, "message {i} corrupted or reordered (seed {seed})");
    }
    assert!(
        h.max_in_flight <= WND_SND as usize,
        "in-flight {} exceeded the send window",
        h.max_in_flight
    );
}

#[test]
fn delivery_over_clean_channel() {
    run_delivery(1, 0.0, 0.0, false);
}

#[test]
fn delivery_with_reordering_and_duplicates() {
    run_delivery(2, 0.0, 0.3, true);
}

#[test]
fn delivery_with_loss() {
    run_delivery(3, 0.15, 0.0, false);
}

#[test]
fn delivery_under_hostile_channel() {
    for seed in 10..14 {
        run_delivery(seed, 0.1, 0.1, true);
    }
}

#[test]
fn blackhole_kills_the_link() {
    let mut tx = Rudp::new(5);
    tx.set_nodelay(2, 10, 2, true);
    tx.send(b"doomed").unwrap();
    let mut now = 0u32;
    // No datagram ever comes back; retransmits must eventually give
    // up instead of spinning forever.
    while !tx.is_dead() && now < 30 * 60 * 1_000 {
        now += 10;
        tx.update(Millis(now), &mut |_d: &[u8]| {});
    }
    assert!(tx.is_dead());
}

#[test]
fn in_flight_never_exceeds_send_window() {
    let conv = 9;
    let mut h = Harness::new(conv, 99);
    for _ in 0..64 {
        let _ = h.a.send(&[0u8; 900]);
    }
    for _ in 0..200 {
        h.step();
        let mut buf = [0u8; 2048];
        while h.b.recv(&mut buf).is_ok() {}
        assert!(h.a.in_flight() <= WND_SND as usize);
    }
}
