//! Output slot of a registered SQL function.
//!
//! A `CallContext` lives as long as the function registration it belongs to.
//! Every successful call installs its result buffer, releasing the one from
//! the previous call; dropping the context releases whatever is still held.

use tracing::debug;

/// Holds at most one result buffer for one function registration.
#[derive(Debug)]
pub struct CallContext {
    function: &'static str,
    buffer: Option<Box<[u8]>>,
}

impl CallContext {
    pub fn new(function: &'static str) -> Self {
        Self {
            function,
            buffer: None,
        }
    }

    pub fn function(&self) -> &'static str {
        self.function
    }

    /// Release the held buffer, if any, and install `buffer` in its place.
    /// Returns a view of the newly installed buffer.
    pub fn replace(&mut self, buffer: Vec<u8>) -> &[u8] {
        let released = self.buffer.as_ref().map(|b| b.len());
        // `insert` drops the previous buffer before the new one becomes visible
        let installed = self.buffer.insert(buffer.into_boxed_slice());
        debug!(
            function = self.function,
            released_bytes = released,
            installed_bytes = installed.len(),
            "replaced result buffer"
        );
        installed
    }

    /// Release the held buffer and leave the context empty.
    pub fn release_all(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            debug!(
                function = self.function,
                released_bytes = buffer.len(),
                "released result buffer"
            );
        }
    }

    /// The buffer installed by the most recent successful call.
    pub fn current(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// Number of buffers currently held: 0 or 1.
    pub fn live_buffers(&self) -> usize {
        usize::from(self.buffer.is_some())
    }
}

impl Drop for CallContext {
    fn drop(&mut self) {
        self.release_all();
    }
}
