//! In-process transport used by unit tests.

use crate::transport::Transport;
use crate::{GitError, Result};
use std::cell::RefCell;

/// Serves a fixed advertisement and a fixed upload-pack response.
pub(crate) struct ScriptedTransport {
    advertisement: Vec<u8>,
    response: Vec<u8>,
    chunk_size: usize,
    requests: RefCell<Vec<String>>,
    bodies: RefCell<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(advertisement: Vec<u8>, response: Vec<u8>) -> Self {
        Self {
            advertisement,
            response,
            chunk_size: 7,
            requests: RefCell::new(Vec::new()),
            bodies: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub(crate) fn bodies(&self) -> Vec<Vec<u8>> {
        self.bodies.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.borrow_mut().push(format!("GET {}", url));
        Ok(self.advertisement.clone())
    }

    fn post_streaming(
        &self,
        url: &str,
        _content_type: &str,
        _accept: &str,
        body: Vec<u8>,
        sink: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        self.requests.borrow_mut().push(format!("POST {}", url));
        self.bodies.borrow_mut().push(body);
        if self.response.is_empty() {
            return Err(GitError::Network("connection reset".to_string()));
        }
        for chunk in self.response.chunks(self.chunk_size) {
            sink(chunk)?;
        }
        Ok(())
    }
}
