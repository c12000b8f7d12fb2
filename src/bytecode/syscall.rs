use serde::{Deserialize, Serialize};

/// Host services reachable from compiled code.
///
/// The catalogue is fixed: adding or reordering entries changes the encoded
/// bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Syscall {
    /// ( -- trigger )
    GetTrigger,
    /// ( key -- bytes ) empty bytes when the key is absent
    StorageGet,
    /// ( key value -- )
    StoragePut,
    /// ( key -- )
    StorageDelete,
    /// ( prefix -- iterator ) entries whose key starts with prefix, in key order
    StorageFind,
    /// ( iterator -- bool ) advance; false once exhausted
    IteratorNext,
    /// ( iterator -- key )
    IteratorKey,
    /// ( iterator -- value )
    IteratorValue,
    /// ( item -- bytes )
    Serialize,
    /// ( bytes -- item )
    Deserialize,
    /// ( state -- )
    Notify,
    /// ( message -- )
    Log,
    /// ( hash -- bool )
    CheckWitness,
    /// ( -- timestamp )
    GetTime,
    /// ( -- height )
    GetHeight,
    /// ( -- tx ) tx = [hash]
    GetScriptContainer,
    /// ( height -- block ) block = [hash, index] or null
    GetBlock,
    /// ( hash -- account ) account = [hash]
    GetAccount,
    /// ( script -- bool )
    Migrate,
    /// ( hash method params -- result ) run another contract to completion
    ContractCall,
}

impl Syscall {
    pub fn effect(self) -> (i32, i32) {
        use Syscall::*;
        match self {
            GetTrigger | GetTime | GetHeight | GetScriptContainer => (0, 1),
            StorageGet | StorageFind | IteratorNext | IteratorKey | IteratorValue => (1, 1),
            Serialize | Deserialize | CheckWitness | GetBlock | GetAccount | Migrate => (1, 1),
            StoragePut => (2, 0),
            StorageDelete | Notify | Log => (1, 0),
            ContractCall => (3, 1),
        }
    }

    pub fn name(self) -> &'static str {
        use Syscall::*;
        match self {
            GetTrigger => "System.Runtime.GetTrigger",
            StorageGet => "System.Storage.Get",
            StoragePut => "System.Storage.Put",
            StorageDelete => "System.Storage.Delete",
            StorageFind => "System.Storage.Find",
            IteratorNext => "System.Iterator.Next",
            IteratorKey => "System.Iterator.Key",
            IteratorValue => "System.Iterator.Value",
            Serialize => "System.Runtime.Serialize",
            Deserialize => "System.Runtime.Deserialize",
            Notify => "System.Runtime.Notify",
            Log => "System.Runtime.Log",
            CheckWitness => "System.Runtime.CheckWitness",
            GetTime => "System.Runtime.GetTime",
            GetHeight => "System.Blockchain.GetHeight",
            GetScriptContainer => "System.ExecutionEngine.GetScriptContainer",
            GetBlock => "System.Blockchain.GetBlock",
            GetAccount => "System.Blockchain.GetAccount",
            Migrate => "System.Contract.Migrate",
            ContractCall => "System.Contract.Call",
        }
    }
}

impl std::fmt::Display for Syscall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
