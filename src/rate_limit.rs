use std::collections::HashMap;

pub const DEFAULT_BURST: f64 = 5.0;
pub const DEFAULT_REFILL_PER_SEC: f64 = 1.0;

// Token buckets keyed by (sender, thread). Purely in-memory, a restart
// forgives everyone.
pub struct SendRateLimiter {
    burst: f64,
    refill_per_sec: f64,
    buckets: HashMap<(String, String), (f64, f64)>, // (tokens, last_refill_ts)
}

impl SendRateLimiter {
    pub fn new(burst: f64, refill_per_sec: f64) -> Self {
        SendRateLimiter {
            burst,
            refill_per_sec,
            buckets: HashMap::new(),
        }
    }

    pub fn allow_send(&mut self, sender_id: &str, thread_id: &str, now: f64) -> bool {
        let key = (sender_id.to_string(), thread_id.to_string());
        let (tokens, last_refill) = match self.buckets.get(&key) {
            Some(&bucket) => bucket,
            None => {
                self.buckets.insert(key, (self.burst, now));
                return true;
            }
        };
        let elapsed = (now - last_refill).max(0.0);
        let tokens = (tokens + elapsed * self.refill_per_sec).min(self.burst);
        if tokens >= 1.0 {
            self.buckets.insert(key, (tokens - 1.0, now));
            return true;
        }
        self.buckets.insert(key, (tokens, now));
        false
    }

    pub fn remaining_tokens(&self, sender_id: &str, thread_id: &str, now: f64) -> f64 {
        let key = (sender_id.to_string(), thread_id.to_string());
        match self.buckets.get(&key) {
            Some(&(tokens, last_refill)) => {
                let elapsed = (now - last_refill).max(0.0);
                (tokens + elapsed * self.refill_per_sec).min(self.burst)
            }
            None => self.burst,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_limited() {
        let mut limiter = SendRateLimiter::new(3.0, 1.0);
        assert!(limiter.allow_send("u", "t", 0.0)); // initializes the bucket
        assert!(limiter.allow_send("u", "t", 0.0));
        assert!(limiter.allow_send("u", "t", 0.0));
        assert!(limiter.allow_send("u", "t", 0.0));
        assert!(!limiter.allow_send("u", "t", 0.0));
    }

    #[test]
    fn test_refill_over_time() {
        let mut limiter = SendRateLimiter::new(2.0, 1.0);
        limiter.allow_send("u", "t", 0.0);
        limiter.allow_send("u", "t", 0.0);
        limiter.allow_send("u", "t", 0.0);
        assert!(!limiter.allow_send("u", "t", 0.5));
        assert!(limiter.allow_send("u", "t", 2.0));
    }

    #[test]
    fn test_buckets_are_per_sender_and_thread() {
        let mut limiter = SendRateLimiter::new(1.0, 0.0);
        limiter.allow_send("a", "t", 0.0);
        limiter.allow_send("a", "t", 0.0);
        assert!(!limiter.allow_send("a", "t", 0.0));
        assert!(limiter.allow_send("b", "t", 0.0));
        assert!(limiter.allow_send("a", "other", 0.0));
    }

    #[test]
    fn test_remaining_tokens_reports_refill() {
        let mut limiter = SendRateLimiter::new(5.0, 1.0);
        assert_eq!(limiter.remaining_tokens("u", "t", 0.0), 5.0);
        limiter.allow_send("u", "t", 0.0);
        limiter.allow_send("u", "t", 0.0); // consumes one
        let remaining = limiter.remaining_tokens("u", "t", 1.0);
        assert!((remaining - 5.0).abs() < 1e-9); // 4 + 1s refill, capped at burst
    }
}
