use std::time::Instant;
use tracing::info;

/// Logs how long a CLI command took when dropped.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("Finished: {} (took {:.2?})", self.label, self.start.elapsed());
    }
}

/// Thousands separators: 1234567 → "1,234,567".
pub fn fmt_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Whole dollars, or a dash when there is no price.
pub fn fmt_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("${}", fmt_number(p.round() as i64)),
        None => "—".to_string(),
    }
}

pub fn fmt_percent(rate: f64) -> String {
    format!("{:.1}%", rate)
}
