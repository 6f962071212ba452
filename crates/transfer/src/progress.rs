/// Monotonic percentage for one transfer.
///
/// `round(100 * bytes / size)`, clamped to 99 until the final byte lands,
/// then 100. Never decreases.
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    total: u64,
    bytes: u64,
    percent: u8,
}

impl ProgressMeter {
    pub fn new(total: u64) -> Self {
        let mut meter = Self {
            total,
            bytes: 0,
            percent: 0,
        };
        meter.percent = meter.compute(0);
        meter
    }

    /// Records the new byte count and returns the percentage to report.
    pub fn update(&mut self, bytes: u64) -> u8 {
        self.bytes = self.bytes.max(bytes.min(self.total));
        self.percent = self.percent.max(self.compute(self.bytes));
        self.percent
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.bytes == self.total
    }

    fn compute(&self, bytes: u64) -> u8 {
        if bytes >= self.total {
            return 100;
        }
        let rounded = (u128::from(bytes) * 200 + u128::from(self.total)) / (2 * u128::from(self.total));
        rounded.min(99) as u8
    }
}
