//! A [`KVStore`] over a [`MemDB`] where a transaction arrives in the middle of a read, to exercise
//! readers that race with the solidifier.

use std::sync::{Arc, Mutex};

use tangle_consensus::{
    tangle::{
        pluggables::{KVGet, KVStore},
        Tangle,
    },
    types::transaction::Transaction,
};

use super::mem_db::{MemDB, MemWriteBatch};

#[derive(Clone)]
pub(crate) struct ArrivingDB {
    inner: MemDB,
    arrival: Arc<Mutex<Option<(Vec<u8>, Transaction)>>>,
}

impl ArrivingDB {
    pub(crate) fn new() -> ArrivingDB {
        ArrivingDB {
            inner: MemDB::new(),
            arrival: Arc::new(Mutex::new(None)),
        }
    }

    /// The next read of `key` returns what is stored now, after which `transaction` is stored and
    /// marked solid. Fires once.
    pub(crate) fn arrive_after_read(&self, key: Vec<u8>, transaction: Transaction) {
        *self.arrival.lock().unwrap() = Some((key, transaction));
    }

    /// Whether the armed arrival has happened.
    pub(crate) fn arrived(&self) -> bool {
        self.arrival.lock().unwrap().is_none()
    }
}

impl KVStore for ArrivingDB {
    type WriteBatch = MemWriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) {
        self.inner.write(wb)
    }
}

impl KVGet for ArrivingDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let value = self.inner.get(key);
        let arriving = {
            let mut arrival = self.arrival.lock().unwrap();
            match arrival.as_ref() {
                Some((trigger, _)) if trigger.as_slice() == key => arrival.take(),
                _ => None,
            }
        };
        if let Some((_, transaction)) = arriving {
            let tangle = Tangle::new(self.inner.clone());
            tangle.put_transaction(&transaction).unwrap();
            tangle.set_solid(&[transaction.hash]);
        }
        value
    }
}
