//! Transfer progress reporting

/// Percentage of the image sent, `None` for an empty image
pub fn progress(bytes_sent: u32, file_size: u32) -> Option<f64> {
    if file_size == 0 {
        return None;
    }

    let p = bytes_sent as f64 / file_size as f64 * 100.0;
    Some(p.min(100.0))
}

/// Snapshot of a session, emitted after each chunk is sent
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Progress {
    /// Index of the chunk just sent
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub bytes_sent: u32,
    pub file_size: u32,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        progress(self.bytes_sent, self.file_size).unwrap_or(100.0)
    }
}

/// Receives progress updates from a running transfer
pub trait Observer {
    fn on_progress(&mut self, progress: &Progress);
}

impl<F> Observer for F
where
    F: FnMut(&Progress),
{
    fn on_progress(&mut self, progress: &Progress) {
        self(progress)
    }
}

impl Observer for () {
    fn on_progress(&mut self, _progress: &Progress) {}
}
