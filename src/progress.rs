use std::sync::{Arc, Mutex};

use indicatif::{ProgressBar, ProgressStyle};

use crate::downloader::ProgressFn;

const TEMPLATE: &str = "{msg} [{bar:40}] {bytes}/{total_bytes} ({eta})";

/// Returns the default progress function, which draws an `indicatif` bar on
/// stderr while a download is running.
pub fn default_progress_fn() -> ProgressFn {
    let bar: Mutex<Option<ProgressBar>> = Mutex::new(None);
    Arc::new(move |src: &str, current: u64, total: u64, mib_per_sec: f64, complete: bool| {
        let mut guard = bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let pb = guard.get_or_insert_with(|| new_bar(src, total));
        pb.set_position(current);
        pb.set_message(format!("{} {mib_per_sec:.2} MiB/s", file_name(src)));
        if complete {
            pb.finish_and_clear();
            *guard = None;
        }
    })
}

fn new_bar(src: &str, total: u64) -> ProgressBar {
    if total == 0 {
        return ProgressBar::new_spinner().with_message(file_name(src).to_owned());
    }
    let style = ProgressStyle::with_template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    ProgressBar::new(total).with_style(style)
}

fn file_name(src: &str) -> &str {
    src.rsplit('/').next().unwrap_or(src)
}
