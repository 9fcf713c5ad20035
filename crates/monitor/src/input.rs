//! Driver acknowledgment channels
//!
//! The frame loop polls every [`InputSource`] once per cycle and applies the
//! first acknowledgment it sees.

use api::StatusHub;
use emergency::AckChannel;
use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

/// Non-blocking source of driver acknowledgments
pub trait InputSource: Send {
    fn poll(&mut self) -> Option<AckChannel>;
}

/// Console input: any line acknowledges, `q` stops the monitor
pub struct KeyboardInput {
    rx: Receiver<()>,
}

impl KeyboardInput {
    /// Read from stdin on a background thread
    pub fn spawn(stop: Arc<AtomicBool>) -> Self {
        Self::from_reader(BufReader::new(io::stdin()), stop)
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static, stop: Arc<AtomicBool>) -> Self {
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("keyboard-input".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if line.trim().eq_ignore_ascii_case("q") {
                        info!("Quit requested from keyboard");
                        stop.store(true, Ordering::SeqCst);
                        break;
                    }
                    if tx.send(()).is_err() {
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("Keyboard input unavailable: {}", e);
        }
        Self { rx }
    }
}

impl InputSource for KeyboardInput {
    fn poll(&mut self) -> Option<AckChannel> {
        self.rx.try_recv().ok()?;
        // Several presses within one cycle count once
        while self.rx.try_recv().is_ok() {}
        Some(AckChannel::Keyboard)
    }
}

/// Acknowledgment posted to the status server
pub struct RemoteAckInput {
    hub: StatusHub,
}

impl RemoteAckInput {
    pub fn new(hub: StatusHub) -> Self {
        Self { hub }
    }
}

impl InputSource for RemoteAckInput {
    fn poll(&mut self) -> Option<AckChannel> {
        self.hub.take_user_response().then_some(AckChannel::Remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    #[test]
    fn test_keyboard_presses_and_quit() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut keyboard =
            KeyboardInput::from_reader(Cursor::new("\n\nq\nnever read\n"), Arc::clone(&stop));

        let deadline = Instant::now() + Duration::from_secs(2);
        while !stop.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::yield_now();
        }
        assert!(stop.load(Ordering::SeqCst));

        assert_eq!(keyboard.poll(), Some(AckChannel::Keyboard));
        assert_eq!(keyboard.poll(), None);
    }

    #[test]
    fn test_remote_consumed_once() {
        let hub = StatusHub::new();
        let mut remote = RemoteAckInput::new(hub.clone());
        assert_eq!(remote.poll(), None);

        hub.request_user_response();
        assert_eq!(remote.poll(), Some(AckChannel::Remote));
        assert_eq!(remote.poll(), None);
    }
}
