use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Mutex;

/// Progress reporting capability (spec §6.4 `ProgressCollaborator`), scaled
/// down from the teacher's multi-bar `MultiProgress` UI to the single
/// sequential transfer this crate drives at a time.
#[async_trait]
pub trait ProgressCollaborator: Send + Sync {
    async fn start(&self, label: &str, total: Option<u64>) -> Box<dyn ProgressHandle>;
}

#[async_trait]
pub trait ProgressHandle: Send {
    async fn set_position(&mut self, matched: u64, total: u64);
    async fn finish(&mut self, message: &str);
}

pub struct IndicatifProgressCollaborator {
    quiet: bool,
}

impl IndicatifProgressCollaborator {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

#[async_trait]
impl ProgressCollaborator for IndicatifProgressCollaborator {
    async fn start(&self, label: &str, total: Option<u64>) -> Box<dyn ProgressHandle> {
        if self.quiet {
            return Box::new(NullProgressHandle);
        }
        let pb = match total {
            Some(t) => {
                let pb = ProgressBar::new(t);
                pb.set_style(
                    ProgressStyle::with_template("{prefix} {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.enable_steady_tick(std::time::Duration::from_millis(120));
                pb
            }
        };
        pb.set_prefix(label.to_string());
        Box::new(IndicatifProgressHandle { bar: Mutex::new(pb) })
    }
}

struct IndicatifProgressHandle {
    bar: Mutex<ProgressBar>,
}

#[async_trait]
impl ProgressHandle for IndicatifProgressHandle {
    async fn set_position(&mut self, matched: u64, total: u64) {
        let bar = self.bar.lock().await;
        if bar.length().unwrap_or(0) != total && total > 0 {
            bar.set_length(total);
        }
        bar.set_position(matched.min(total.max(matched)));
    }

    async fn finish(&mut self, message: &str) {
        let bar = self.bar.lock().await;
        bar.finish_with_message(message.to_string());
    }
}

struct NullProgressHandle;

#[async_trait]
impl ProgressHandle for NullProgressHandle {
    async fn set_position(&mut self, _matched: u64, _total: u64) {}
    async fn finish(&mut self, _message: &str) {}
}
