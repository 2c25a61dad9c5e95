pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod prompt;
pub mod retry;
pub mod runtime;
pub mod tokenizer;

pub use error::{ApiError, ErrorKind};

/// Test doubles shared across module tests.
#[cfg(test)]
pub mod test_utils {
    use crate::retry::{RetryObserver, Sleeper};
    use async_trait::async_trait;
    use std::fmt::Display;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records requested waits and returns immediately.
    #[derive(Default)]
    pub struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    /// Records observer callbacks as short strings:
    /// - `retry <op> <attempt>/<max>`
    /// - `give_up <op> <attempts>`
    /// - `fatal <op> <attempt>`
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl RetryObserver for RecordingObserver {
        fn on_retry(
            &self,
            operation: &str,
            attempt: u32,
            max_attempts: u32,
            _delay: Duration,
            _error: &dyn Display,
        ) {
            self.events
                .lock()
                .unwrap()
                .push(format!("retry {} {}/{}", operation, attempt, max_attempts));
        }

        fn on_give_up(&self, operation: &str, attempts: u32, _error: &dyn Display) {
            self.events
                .lock()
                .unwrap()
                .push(format!("give_up {} {}", operation, attempts));
        }

        fn on_fatal(&self, operation: &str, attempt: u32, _error: &dyn Display) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fatal {} {}", operation, attempt));
        }
    }
}
