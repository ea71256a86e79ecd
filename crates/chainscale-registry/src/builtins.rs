//! Types every chain shares: base aliases and the shapes returned by the
//! standard RPC methods.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{json, Value as Json};

use crate::definition::Definitions;

/// The built-in bundle, in the same format as user type bundles.
pub fn bundle() -> Json {
    json!({
        "AccountId": "[u8; 32]",
        "AccountId32": "[u8; 32]",
        "AccountId20": "[u8; 20]",
        "AccountIndex": "u32",
        "Address": "MultiAddress",
        "LookupSource": "MultiAddress",
        "MultiAddress": { "_enum": {
            "Id": "AccountId",
            "Index": "Compact<AccountIndex>",
            "Raw": "Bytes",
            "Address32": "[u8; 32]",
            "Address20": "[u8; 20]"
        }},
        "Balance": "u128",
        "BalanceOf": "Balance",
        "BlockNumber": "u32",
        "Index": "u32",
        "Nonce": "u32",
        "Moment": "u64",
        "Weight": "u64",
        "Perbill": "u32",
        "Permill": "u32",
        "Percent": "u8",
        "H160": "[u8; 20]",
        "H256": "[u8; 32]",
        "H512": "[u8; 64]",
        "Hash": "H256",
        "BlockHash": "Hash",
        "Signature": "H512",
        "AuthorityId": "AccountId",
        "Proposal": "Call",

        "AccountInfo": {
            "nonce": "Index",
            "consumers": "u32",
            "providers": "u32",
            "sufficients": "u32",
            "data": "AccountData"
        },
        "AccountData": {
            "free": "Balance",
            "reserved": "Balance",
            "miscFrozen": "Balance",
            "feeFrozen": "Balance"
        },

        "ConsensusEngineId": "[u8; 4]",
        "Consensus": "(ConsensusEngineId, Bytes)",
        "Seal": "(ConsensusEngineId, Bytes)",
        "PreRuntime": "(ConsensusEngineId, Bytes)",
        "SealV0": "(u64, Signature)",
        "DigestItem": { "_enum": {
            "Other": "Bytes",
            "AuthoritiesChange": "Vec<AuthorityId>",
            "ChangesTrieRoot": "Hash",
            "SealV0": "SealV0",
            "Consensus": "Consensus",
            "Seal": "Seal",
            "PreRuntime": "PreRuntime",
            "ChangesTrieSignal": "Bytes",
            "RuntimeEnvironmentUpdated": "Null"
        }},
        "Digest": { "logs": "Vec<DigestItem>" },
        "Header": {
            "parentHash": "Hash",
            "number": "Compact<BlockNumber>",
            "stateRoot": "Hash",
            "extrinsicsRoot": "Hash",
            "digest": "Digest"
        },
        "Extrinsic": "Bytes",
        "Block": { "header": "Header", "extrinsics": "Vec<Extrinsic>" },
        "Justification": "(ConsensusEngineId, Bytes)",
        "Justifications": "Vec<Justification>",
        "SignedBlock": { "block": "Block", "justifications": "Option<Justifications>" },

        "RuntimeVersionApi": "([u8; 8], u32)",
        "RuntimeVersion": {
            "specName": "Text",
            "implName": "Text",
            "authoringVersion": "u32",
            "specVersion": "u32",
            "implVersion": "u32",
            "apis": "Vec<RuntimeVersionApi>",
            "transactionVersion": "u32"
        },
        "StorageKey": "Bytes",
        "StorageData": "Bytes",
        "StorageChangeSet": {
            "block": "Hash",
            "changes": "Vec<(StorageKey, Option<StorageData>)>"
        },
        "Health": { "peers": "u64", "isSyncing": "bool", "shouldHavePeers": "bool" },
        "ExtrinsicStatus": { "_enum": {
            "Future": "Null",
            "Ready": "Null",
            "Broadcast": "Vec<Text>",
            "InBlock": "Hash",
            "Retracted": "Hash",
            "FinalityTimeout": "Hash",
            "Finalized": "Hash",
            "Usurped": "Hash",
            "Dropped": "Null",
            "Invalid": "Null"
        }},

        "Phase": { "_enum": {
            "ApplyExtrinsic": "u32",
            "Finalization": "Null",
            "Initialization": "Null"
        }},
        "EventRecord": { "phase": "Phase", "event": "Event", "topics": "Vec<Hash>" },

        "TreasuryProposal": {
            "proposer": "AccountId",
            "value": "Balance",
            "beneficiary": "AccountId",
            "bond": "Balance"
        },
        "TAssetBalance": "u64",
        "IdentityJudgement": { "_enum": {
            "Unknown": "Null",
            "FeePaid": "Balance",
            "Reasonable": "Null",
            "KnownGood": "Null",
            "OutOfDate": "Null",
            "LowQuality": "Null",
            "Erroneous": "Null"
        }}
    })
}

/// Parsed built-in definitions, shared by every registry.
pub fn definitions() -> &'static Definitions {
    static DEFINITIONS: OnceLock<Definitions> = OnceLock::new();
    DEFINITIONS.get_or_init(|| Definitions::from_json(&bundle()).unwrap_or_default())
}

/// Pallet-scoped renames installed in every new registry: within the named
/// pallet, the left name resolves as the right one.
pub fn default_aliases() -> HashMap<String, HashMap<String, String>> {
    let mut aliases: HashMap<String, HashMap<String, String>> = HashMap::new();
    for (pallet, from, to) in [
        ("treasury", "Proposal", "TreasuryProposal"),
        ("assets", "Balance", "TAssetBalance"),
        ("identity", "Judgement", "IdentityJudgement"),
    ] {
        aliases
            .entry(pallet.to_string())
            .or_default()
            .insert(from.to_string(), to.to_string());
    }
    aliases
}
