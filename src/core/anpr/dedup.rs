use lru::LruCache;
use std::num::NonZeroUsize;

/// Per-plate cooldown gate.
///
/// Every distinct plate string is its own rate-limited channel: a plate may be
/// persisted again only once strictly more than `cooldown_secs` have passed
/// since its last persist. Timestamps are monotonic seconds.
pub struct DedupGate {
    /// plate text -> last persisted at
    history: LruCache<String, f64>,
}

/// 去重决策结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupDecision {
    pub eligible: bool,
    pub reason: DedupReason,
    /// Seconds since the previous persist of the same plate, if any.
    pub since_last: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupReason {
    EmptyCandidate,  // 空文本，跳过
    FirstSighting,   // 首次出现，保留
    CooldownElapsed, // 冷却结束，保留
    WithinCooldown,  // 冷却中，去重
}

impl DedupGate {
    /// Unbounded history, entries live for the whole process.
    pub fn new() -> Self {
        Self {
            history: LruCache::unbounded(),
        }
    }

    /// History capped at `capacity` plates, least recently used evicted first.
    /// A capacity of 0 means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(cap) => Self {
                history: LruCache::new(cap),
            },
            None => Self::new(),
        }
    }

    pub fn should_persist(&mut self, candidate: &str, now: f64, cooldown_secs: f64) -> bool {
        self.check(candidate, now, cooldown_secs).eligible
    }

    /// Decide and, when eligible, record `now` as the plate's last persist.
    pub fn check(&mut self, candidate: &str, now: f64, cooldown_secs: f64) -> DedupDecision {
        if candidate.is_empty() {
            return DedupDecision {
                eligible: false,
                reason: DedupReason::EmptyCandidate,
                since_last: None,
            };
        }

        let last = self.history.get(candidate).copied();
        let decision = match last {
            None => DedupDecision {
                eligible: true,
                reason: DedupReason::FirstSighting,
                since_last: None,
            },
            Some(t0) => {
                let elapsed = now - t0;
                if !suppresses(cooldown_secs) || elapsed > cooldown_secs {
                    DedupDecision {
                        eligible: true,
                        reason: DedupReason::CooldownElapsed,
                        since_last: Some(elapsed),
                    }
                } else {
                    DedupDecision {
                        eligible: false,
                        reason: DedupReason::WithinCooldown,
                        since_last: Some(elapsed),
                    }
                }
            }
        };

        if decision.eligible {
            self.history.put(candidate.to_string(), now);
        }
        decision
    }

    /// Last persist time without touching LRU order.
    pub fn last_persisted_at(&self, candidate: &str) -> Option<f64> {
        self.history.peek(candidate).copied()
    }

    /// Drop entries whose cooldown has already run out at `now`.
    ///
    /// A dropped entry behaves exactly like an absent one for any later call
    /// with the same cooldown, so this only reclaims memory.
    pub fn evict_expired(&mut self, now: f64, cooldown_secs: f64) -> usize {
        let expired: Vec<String> = self
            .history
            .iter()
            .filter(|(_, &t0)| !suppresses(cooldown_secs) || now - t0 > cooldown_secs)
            .map(|(plate, _)| plate.clone())
            .collect();

        for plate in &expired {
            self.history.pop(plate);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for DedupGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Negative (or NaN) cooldown disables suppression.
fn suppresses(cooldown_secs: f64) -> bool {
    cooldown_secs >= 0.0
}
