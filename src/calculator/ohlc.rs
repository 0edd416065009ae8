use crate::domain::{bar::parse_price, OhlcBar, TradeEvent};

const BUCKET_SECONDS: i64 = 60;

/// Per-symbol mutable bucket state.
///
/// Mutated only by the aggregator's combined ingress/tick loop — never
/// shared behind a lock, since that single-writer discipline is what
/// keeps `update` and `tick` race-free (see the aggregator's design
/// notes on why ingress and tick share one loop).
#[derive(Debug, Clone)]
pub struct OhlcCalculator {
    bar: OhlcBar,
    /// Last second inclusive of the current minute bucket.
    ended_at: i64,
}

impl Default for OhlcCalculator {
    fn default() -> Self {
        Self {
            bar: OhlcBar::zero(),
            ended_at: 0,
        }
    }
}

impl OhlcCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one trade event into the bar, rolling to a new bucket first
    /// if the event falls after the current bucket's end.
    pub fn update(&mut self, event: &TradeEvent) {
        if event.trade_time <= self.ended_at {
            self.update_in_place(event);
        } else {
            self.roll_bucket(event);
        }
    }

    fn update_in_place(&mut self, event: &TradeEvent) {
        if let (Ok(candidate), Ok(high)) =
            (parse_price(&event.price), parse_price(&self.bar.high))
        {
            if candidate > high {
                self.bar.high = event.price.clone();
            }
        }
        if let (Ok(candidate), Ok(low)) = (parse_price(&event.price), parse_price(&self.bar.low)) {
            if candidate < low {
                self.bar.low = event.price.clone();
            }
        }
        if event.trade_time > self.bar.trade_time {
            self.bar.close = event.price.clone();
            self.bar.trade_time = event.trade_time;
        }
    }

    fn roll_bucket(&mut self, event: &TradeEvent) {
        self.bar = OhlcBar::opening_at(&event.price, event.trade_time);
        self.ended_at = end_of_bucket(event.trade_time);
    }

    /// Driven by the aggregator's 1-minute wall-clock ticker. Never
    /// mutates the bar — only advances `ended_at` so a bar with no
    /// trades in a new minute still reports a stable bucket boundary.
    pub fn tick(&mut self, now: i64) {
        self.ended_at = end_of_bucket(now);
    }

    /// A by-value snapshot, unaffected by subsequent `update`/`tick` calls.
    pub fn bar(&self) -> OhlcBar {
        self.bar.clone()
    }

    #[cfg(test)]
    pub(crate) fn ended_at(&self) -> i64 {
        self.ended_at
    }
}

fn end_of_bucket(ts: i64) -> i64 {
    ts.div_euclid(BUCKET_SECONDS) * BUCKET_SECONDS + (BUCKET_SECONDS - 1)
}
