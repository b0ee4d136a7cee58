//! Per-run compression statistics

use hashbrown::HashMap;
use tracing::info;

/// Counters of one candidate label
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CandidateTally {
    /// Times the candidate was compressed and measured
    pub attempts: u32,
    /// Times it replaced the running winner
    pub improvements: u32,
    /// Times it was the final choice for a sequence
    pub wins: u32,
    /// Error of the sequences it won
    pub summed_error: f64,
    /// Bytes saved over the previous winner, summed over improvements
    pub bytes_saved: i64,
}

/// Context threaded through [`compress`](super::compress) in place of global counters.
///
/// One session per thread; merge them afterwards for a combined report.
#[derive(Debug, Clone, Default)]
pub struct CompressionSession {
    tallies: HashMap<String, CandidateTally>,
    sequences: u32,
    bytes_before: u64,
    bytes_after: u64,
}

impl CompressionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_attempt(&mut self, label: &str) {
        self.entry(label).attempts += 1;
    }

    pub(crate) fn record_improvement(&mut self, label: &str, bytes_saved: i64) {
        let tally = self.entry(label);
        tally.improvements += 1;
        tally.bytes_saved += bytes_saved;
    }

    pub(crate) fn record_win(
        &mut self,
        label: &str,
        error: f32,
        fallback_size: usize,
        final_size: usize,
    ) {
        let tally = self.entry(label);
        tally.wins += 1;
        tally.summed_error += f64::from(error);
        self.sequences += 1;
        self.bytes_before += fallback_size as u64;
        self.bytes_after += final_size as u64;
    }

    fn entry(&mut self, label: &str) -> &mut CandidateTally {
        self.tallies.entry_ref(label).or_default()
    }

    /// Sequences compressed through the selector
    pub fn sequences(&self) -> u32 {
        self.sequences
    }

    pub fn tally(&self, label: &str) -> Option<&CandidateTally> {
        self.tallies.get(label)
    }

    /// Labels sorted by wins, most first
    pub fn ranking(&self) -> Vec<(&str, &CandidateTally)> {
        let mut ranking: Vec<_> =
            self.tallies.iter().map(|(label, tally)| (label.as_str(), tally)).collect();
        ranking.sort_by(|a, b| b.1.wins.cmp(&a.1.wins).then_with(|| a.0.cmp(b.0)));
        ranking
    }

    /// Folds `other` into this session
    pub fn merge(&mut self, other: CompressionSession) {
        for (label, tally) in other.tallies {
            let mine = self.tallies.entry(label).or_default();
            mine.attempts += tally.attempts;
            mine.improvements += tally.improvements;
            mine.wins += tally.wins;
            mine.summed_error += tally.summed_error;
            mine.bytes_saved += tally.bytes_saved;
        }
        self.sequences += other.sequences;
        self.bytes_before += other.bytes_before;
        self.bytes_after += other.bytes_after;
    }

    /// Logs the tallies
    pub fn report(&self) {
        if self.sequences == 0 {
            return;
        }
        info!(
            sequences = self.sequences,
            bytes_before = self.bytes_before,
            bytes_after = self.bytes_after,
            "compression session"
        );
        for (label, tally) in self.ranking() {
            if tally.wins == 0 {
                continue;
            }
            info!(
                candidate = label,
                wins = tally.wins,
                attempts = tally.attempts,
                average_error = tally.summed_error / f64::from(tally.wins),
                bytes_saved = tally.bytes_saved,
                "winner tally"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_and_ranking() {
        let mut session = CompressionSession::new();
        session.record_attempt("Bitwise_Float96");
        session.record_attempt("Linear_PerTrack");
        session.record_improvement("Linear_PerTrack", 120);
        session.record_win("Linear_PerTrack", 0.25, 400, 280);
        session.record_attempt("Linear_PerTrack");
        session.record_win("Linear_PerTrack", 0.5, 400, 300);

        let tally = session.tally("Linear_PerTrack").unwrap();
        assert_eq!(tally.attempts, 2);
        assert_eq!(tally.wins, 2);
        assert_eq!(tally.bytes_saved, 120);
        assert!((tally.summed_error - 0.75).abs() < 1e-6);
        assert_eq!(session.sequences(), 2);
        assert_eq!(session.ranking()[0].0, "Linear_PerTrack");
    }

    #[test]
    fn test_merge() {
        let mut a = CompressionSession::new();
        a.record_attempt("X");
        a.record_win("X", 1.0, 10, 8);
        let mut b = CompressionSession::new();
        b.record_attempt("X");
        b.record_attempt("Y");
        b.record_win("X", 0.5, 10, 6);

        a.merge(b);
        assert_eq!(a.sequences(), 2);
        assert_eq!(a.tally("X").unwrap().attempts, 2);
        assert_eq!(a.tally("X").unwrap().wins, 2);
        assert_eq!(a.tally("Y").unwrap().attempts, 1);
    }
}
