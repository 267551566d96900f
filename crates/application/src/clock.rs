use domain::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

/// 固定时间时钟，测试用。
pub mod fixed {
    use super::*;
    use std::sync::Mutex;

    pub struct FixedClock {
        now: Mutex<Timestamp>,
    }

    impl FixedClock {
        pub fn new(now: Timestamp) -> Self {
            Self { now: Mutex::new(now) }
        }

        pub fn set(&self, now: Timestamp) {
            *self.now.lock().unwrap() = now;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            *self.now.lock().unwrap()
        }
    }
}
