use crate::peer::types::Candidate;
use tracing::{info, warn};

/// Candidates held back until their gate opens.
///
/// Append-only until drained; `drain_and_clear` hands back everything in
/// arrival order and leaves the buffer empty in the same step.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: Vec<Candidate>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: Candidate) {
        self.pending.push(candidate);
    }

    pub fn drain_and_clear(&mut self) -> Vec<Candidate> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Running tally of dispatched local candidates by type
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateStats {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
    pub other: usize,
}

impl CandidateStats {
    pub fn record(&mut self, candidate: &Candidate) {
        match candidate.candidate_type() {
            Some("host") => self.host += 1,
            Some("srflx") | Some("prflx") => self.srflx += 1,
            Some("relay") => self.relay += 1,
            _ => self.other += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.host + self.srflx + self.relay + self.other
    }
}

pub fn analyze_candidates(session_id: &str, stats: &CandidateStats) {
    info!(
        "[{session_id}] Candidate analysis: {} host, {} srflx, {} relay",
        stats.host, stats.srflx, stats.relay
    );

    if stats.relay == 0 {
        warn!("[{session_id}] No TURN relay candidates found! Connection through NAT may fail.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(n: u32) -> Candidate {
        Candidate::new(format!("candidate:{n} 1 udp 1 10.0.0.{n} 9 typ host"), "0", 0)
    }

    #[test]
    fn drain_returns_arrival_order_and_empties() {
        let mut buf = CandidateBuffer::new();
        for n in 1..=3 {
            buf.push(cand(n));
        }
        let drained = buf.drain_and_clear();
        assert_eq!(drained, vec![cand(1), cand(2), cand(3)]);
        assert!(buf.is_empty());
    }

    #[test]
    fn push_after_drain_starts_fresh_batch() {
        let mut buf = CandidateBuffer::new();
        buf.push(cand(1));
        let first = buf.drain_and_clear();
        buf.push(cand(2));
        assert_eq!(first, vec![cand(1)]);
        assert_eq!(buf.drain_and_clear(), vec![cand(2)]);
        assert!(buf.drain_and_clear().is_empty());
    }

    #[test]
    fn stats_count_by_type() {
        let mut stats = CandidateStats::default();
        stats.record(&cand(1));
        stats.record(&Candidate::new("candidate:2 1 udp 1 1.2.3.4 9 typ srflx", "0", 0));
        stats.record(&Candidate::new("candidate:3 1 udp 1 5.6.7.8 9 typ relay", "1", 1));
        stats.record(&Candidate::new("garbage", "1", 1));
        assert_eq!(
            stats,
            CandidateStats {
                host: 1,
                srflx: 1,
                relay: 1,
                other: 1
            }
        );
        assert_eq!(stats.total(), 4);
    }
}
