use std::collections::BTreeMap;

use crate::bytecode::Script;
use crate::runtime::value::StackItem;

/// Trigger passed to a script invoked as a normal transaction.
pub const TRIGGER_APPLICATION: i64 = 0x10;
/// Trigger passed to a script asked to verify a transaction.
pub const TRIGGER_VERIFICATION: i64 = 0x00;

/// The chain as a script sees it through syscalls.
pub trait Host {
    fn trigger(&self) -> i64;

    fn storage_get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn storage_put(&mut self, key: &[u8], value: &[u8]);
    fn storage_delete(&mut self, key: &[u8]);
    /// Entries whose key starts with `prefix`, ordered by key.
    fn storage_find(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;

    fn notify(&mut self, state: StackItem);
    fn log(&mut self, message: &[u8]);

    fn check_witness(&self, hash: &[u8]) -> bool;
    fn time(&self) -> i64;
    fn height(&self) -> i64;
    fn transaction_hash(&self) -> Vec<u8>;
    fn block_hash(&self, height: i64) -> Option<Vec<u8>>;

    /// Replace the running contract's code. Returns false if refused.
    fn migrate(&mut self, script: &[u8]) -> bool;

    /// Code deployed under `hash`, if any.
    fn contract(&self, hash: &[u8]) -> Option<Script>;
    /// Storage switches to the callee until the matching
    /// [`Host::leave_contract`].
    fn enter_contract(&mut self, hash: &[u8]);
    fn leave_contract(&mut self);
}

/// A contract deployed next to the one under test.
#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub script: Script,
    pub storage: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// In-process host backed by plain collections.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    pub trigger: i64,
    pub storage: BTreeMap<Vec<u8>, Vec<u8>>,
    pub notifications: Vec<StackItem>,
    pub logs: Vec<String>,
    pub witnesses: Vec<Vec<u8>>,
    pub time: i64,
    pub height: i64,
    pub tx_hash: Vec<u8>,
    pub migrated: Vec<Vec<u8>>,
    pub contracts: BTreeMap<Vec<u8>, DeployedContract>,
    /// Hashes of the contracts currently being called into, innermost last.
    calls: Vec<Vec<u8>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self {
            trigger: TRIGGER_APPLICATION,
            storage: BTreeMap::new(),
            notifications: Vec::new(),
            logs: Vec::new(),
            witnesses: Vec::new(),
            time: 0,
            height: 0,
            tx_hash: vec![0; 32],
            migrated: Vec::new(),
            contracts: BTreeMap::new(),
            calls: Vec::new(),
        }
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&mut self, hash: impl Into<Vec<u8>>, script: Script) {
        self.contracts.insert(
            hash.into(),
            DeployedContract {
                script,
                storage: BTreeMap::new(),
            },
        );
    }

    /// Storage of the innermost running contract.
    fn active_storage(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        match self.calls.last().and_then(|h| self.contracts.get(h)) {
            Some(callee) => &callee.storage,
            None => &self.storage,
        }
    }

    fn active_storage_mut(&mut self) -> &mut BTreeMap<Vec<u8>, Vec<u8>> {
        match self.calls.last().and_then(|h| self.contracts.get_mut(h)) {
            Some(callee) => &mut callee.storage,
            None => &mut self.storage,
        }
    }
}

impl Host for MemoryHost {
    fn trigger(&self) -> i64 {
        self.trigger
    }

    fn storage_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.active_storage().get(key).cloned()
    }

    fn storage_put(&mut self, key: &[u8], value: &[u8]) {
        self.active_storage_mut().insert(key.to_vec(), value.to_vec());
    }

    fn storage_delete(&mut self, key: &[u8]) {
        self.active_storage_mut().remove(key);
    }

    fn storage_find(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.active_storage()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn notify(&mut self, state: StackItem) {
        self.notifications.push(state);
    }

    fn log(&mut self, message: &[u8]) {
        self.logs.push(String::from_utf8_lossy(message).into_owned());
    }

    fn check_witness(&self, hash: &[u8]) -> bool {
        self.witnesses.iter().any(|w| w == hash)
    }

    fn time(&self) -> i64 {
        self.time
    }

    fn height(&self) -> i64 {
        self.height
    }

    fn transaction_hash(&self) -> Vec<u8> {
        self.tx_hash.clone()
    }

    fn block_hash(&self, height: i64) -> Option<Vec<u8>> {
        if height < 0 || height > self.height {
            return None;
        }
        Some(height.to_le_bytes().to_vec())
    }

    fn migrate(&mut self, script: &[u8]) -> bool {
        self.migrated.push(script.to_vec());
        true
    }

    fn contract(&self, hash: &[u8]) -> Option<Script> {
        self.contracts.get(hash).map(|c| c.script.clone())
    }

    fn enter_contract(&mut self, hash: &[u8]) {
        self.calls.push(hash.to_vec());
    }

    fn leave_contract(&mut self) {
        self.calls.pop();
    }
}
