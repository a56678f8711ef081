// Fixtures shared by unit tests.

use std::io;
use std::sync::{Arc, Mutex};

use hiklink_api::mock::MockHikConnect;
use hiklink_api::{Camera, Device};
use tracing_subscriber::fmt::MakeWriter;

use crate::config::EntryOptions;
use crate::entry::EntryContext;

pub(crate) fn device(serial: &str, locks: &[(u32, u32)]) -> Device {
    Device {
        id: format!("id-{serial}"),
        serial: serial.into(),
        name: format!("Station {serial}"),
        device_type: "DS-KD8003".into(),
        version: "V2.2.3".into(),
        locks: locks.iter().copied().collect(),
    }
}

pub(crate) fn camera(id: &str, channel: u32) -> Camera {
    Camera {
        id: id.into(),
        name: format!("Gate {id}"),
        channel_number: channel,
        signal_status: 1,
        is_shown: true,
    }
}

pub(crate) fn context(mock: &MockHikConnect) -> Arc<EntryContext<MockHikConnect>> {
    Arc::new(EntryContext::new(
        "entry-1",
        Arc::new(mock.clone()),
        EntryOptions::default(),
    ))
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Subscriber writing plain-text events at `level` and above into this capture.
    pub(crate) fn subscriber(&self, level: tracing::Level) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(level)
            .with_ansi(false)
            .finish()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
