//! A [`Requester`] that records requests instead of sending them to peers.

use std::sync::{Arc, Mutex};

use tangle_consensus::{requester::Requester, types::data_types::CryptoHash};

#[derive(Clone)]
pub(crate) struct RecordingRequester(Arc<Mutex<Vec<CryptoHash>>>);

impl RecordingRequester {
    pub(crate) fn new() -> RecordingRequester {
        RecordingRequester(Arc::new(Mutex::new(Vec::new())))
    }

    /// Every hash requested so far, in request order.
    pub(crate) fn requested(&self) -> Vec<CryptoHash> {
        self.0.lock().unwrap().clone()
    }
}

impl Requester for RecordingRequester {
    fn request(&mut self, hash: CryptoHash) {
        self.0.lock().unwrap().push(hash);
    }
}
