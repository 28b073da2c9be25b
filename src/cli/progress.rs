use newsreel::contexts::StageRecord;
use std::time::Instant;

/// Tallies pipeline stages and prints the end-of-run summary
pub struct ProgressIndicator {
    completed: usize,
    failed: usize,
    start_time: Instant,
}

impl ProgressIndicator {
    pub fn new(start_time: Instant) -> Self {
        Self {
            completed: 0,
            failed: 0,
            start_time,
        }
    }

    pub fn complete_stage(&mut self, record: &StageRecord) {
        let marker = if record.succeeded {
            self.completed += 1;
            "✓"
        } else {
            self.failed += 1;
            "✗"
        };
        println!(
            "  {} {:<18} {:.2}s",
            marker,
            record.stage.to_string(),
            record.duration.as_secs_f64()
        );
    }

    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed();
        println!("\n{}", "=".repeat(60));
        println!("Summary:");
        println!("  Stages run: {}", self.completed + self.failed);
        println!("  Succeeded:  {}", self.completed);
        println!("  Failed:     {}", self.failed);
        println!("  Duration:   {:.2}s", elapsed.as_secs_f64());
        println!("{}", "=".repeat(60));
    }
}
