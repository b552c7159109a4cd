/// Phase of the Reno-style congestion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionPhase {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

/// A purely reactive Reno-style congestion controller: it has no I/O of
/// its own, it only reacts to `ack_received`, `duplicate_ack` and
/// `timeout_occurred` events the sender engine feeds it.
#[derive(Debug, Clone)]
pub struct CongestionController {
    pub cwnd: f64,
    pub ssthresh: f64,
    pub duplicate_acks: u32,
    pub phase: CongestionPhase,
    last_ack: i64,
    dup_ack_threshold: u32,
}

impl CongestionController {
    pub fn new(init_cwnd: f64, init_ssthresh: f64, dup_ack_threshold: u32) -> Self {
        CongestionController {
            cwnd: init_cwnd,
            ssthresh: init_ssthresh,
            duplicate_acks: 0,
            phase: CongestionPhase::SlowStart,
            last_ack: -1,
            dup_ack_threshold,
        }
    }

    /// Effective window in whole segments.
    pub fn window(&self) -> u32 {
        self.cwnd.floor().max(0.0) as u32
    }

    /// Dispatches a cumulative ACK. A repeat of the previous ack value is
    /// routed to `duplicate_ack` internally, exactly as the reference
    /// congestion controller does.
    pub fn ack_received(&mut self, ack: u32) {
        if ack as i64 == self.last_ack {
            self.duplicate_ack();
            return;
        }

        self.last_ack = ack as i64;
        self.duplicate_acks = 0;

        if self.phase == CongestionPhase::FastRecovery {
            self.cwnd = self.ssthresh;
            self.phase = CongestionPhase::CongestionAvoidance;
            return;
        }

        if self.phase == CongestionPhase::SlowStart {
            self.cwnd += 1.0;
            if self.cwnd >= self.ssthresh {
                self.phase = CongestionPhase::CongestionAvoidance;
            }
        } else {
            self.cwnd += 1.0 / self.cwnd;
        }
    }

    pub fn duplicate_ack(&mut self) {
        self.duplicate_acks += 1;

        if self.phase != CongestionPhase::FastRecovery {
            if self.duplicate_acks == self.dup_ack_threshold {
                self.ssthresh = (self.cwnd / 2.0).max(2.0);
                self.cwnd = self.ssthresh + 3.0;
                self.phase = CongestionPhase::FastRecovery;
            }
        } else {
            self.cwnd += 1.0;
        }
    }

    pub fn timeout_occurred(&mut self) {
        self.ssthresh = (self.cwnd / 2.0).max(2.0);
        self.cwnd = 1.0;
        self.phase = CongestionPhase::SlowStart;
        self.duplicate_acks = 0;
        self.last_ack = -1;
    }
}
