//! The upgrade chain must produce the same pallet surface whether metadata
//! starts at V9 or was produced natively at a later version.

use std::collections::BTreeSet;

use chainscale_metadata::legacy::{
    ConstantMetadata, ErrorMetadata, EventMetadata, ExtrinsicMetadata, FunctionArgument,
    FunctionMetadata, MetadataV13, MetadataV9, ModuleMetadataV13, ModuleMetadataV9,
    StorageEntryTypeV13, StorageEntryTypeV9, StorageEntryV13, StorageEntryV9,
    StorageMetadataV13, StorageMetadataV9,
};
use chainscale_metadata::{
    decode_metadata, encode_envelope, HasherV9, MetadataLatest, RuntimeMetadata, StorageEntryType,
    StorageHasher, StorageModifier, TypeDescriptor,
};

fn transfer_call() -> FunctionMetadata {
    FunctionMetadata {
        name: "transfer".into(),
        args: vec![
            FunctionArgument { name: "dest".into(), ty: "<T::Lookup as StaticLookup>::Source".into() },
            FunctionArgument { name: "value".into(), ty: "Compact<T::Balance>".into() },
        ],
        docs: vec![" Transfer some liquid free balance.".into()],
    }
}

fn calls() -> Vec<FunctionMetadata> {
    vec![
        transfer_call(),
        FunctionMetadata {
            name: "set_balance".into(),
            args: vec![FunctionArgument { name: "who".into(), ty: "T::AccountId".into() }],
            docs: vec![],
        },
    ]
}

fn events() -> Vec<EventMetadata> {
    vec![
        EventMetadata {
            name: "Transfer".into(),
            args: vec!["AccountId".into(), "AccountId".into(), "Balance".into()],
            docs: vec![],
        },
        EventMetadata {
            name: "Endowed".into(),
            args: vec!["AccountId".into(), "Balance".into()],
            docs: vec![],
        },
    ]
}

fn errors() -> Vec<ErrorMetadata> {
    vec![
        ErrorMetadata { name: "InsufficientBalance".into(), docs: vec![] },
        ErrorMetadata { name: "ExistentialDeposit".into(), docs: vec![] },
    ]
}

fn constants() -> Vec<ConstantMetadata> {
    vec![ConstantMetadata {
        name: "ExistentialDeposit".into(),
        ty: "T::Balance".into(),
        value: 500u128.to_le_bytes().to_vec(),
        docs: vec![],
    }]
}

fn v9_fixture() -> MetadataV9 {
    MetadataV9 {
        modules: vec![
            ModuleMetadataV9 {
                name: "System".into(),
                storage: Some(StorageMetadataV9 {
                    prefix: "System".into(),
                    entries: vec![StorageEntryV9 {
                        name: "Account".into(),
                        modifier: StorageModifier::Default,
                        ty: StorageEntryTypeV9::Map {
                            hasher: HasherV9::Blake2_256,
                            key: "T::AccountId".into(),
                            value: "AccountInfo".into(),
                            linked: false,
                        },
                        default: vec![0; 8],
                        docs: vec![],
                    }],
                }),
                calls: Some(vec![]),
                events: Some(vec![]),
                constants: vec![],
                errors: vec![],
            },
            ModuleMetadataV9 {
                name: "Balances".into(),
                storage: None,
                calls: Some(calls()),
                events: Some(events()),
                constants: constants(),
                errors: errors(),
            },
        ],
    }
}

fn v13_fixture() -> MetadataV13 {
    MetadataV13 {
        modules: vec![
            ModuleMetadataV13 {
                name: "System".into(),
                storage: Some(StorageMetadataV13 {
                    prefix: "System".into(),
                    entries: vec![StorageEntryV13 {
                        name: "Account".into(),
                        modifier: StorageModifier::Default,
                        ty: StorageEntryTypeV13::Map {
                            hasher: StorageHasher::Blake2_256,
                            key: "T::AccountId".into(),
                            value: "AccountInfo".into(),
                            unused: false,
                        },
                        default: vec![0; 8],
                        docs: vec![],
                    }],
                }),
                calls: Some(vec![]),
                events: Some(vec![]),
                constants: vec![],
                errors: vec![],
                index: 0,
            },
            ModuleMetadataV13 {
                name: "Balances".into(),
                storage: None,
                calls: Some(calls()),
                events: Some(events()),
                constants: constants(),
                errors: errors(),
                index: 1,
            },
        ],
        extrinsic: ExtrinsicMetadata::default(),
    }
}

fn surface(meta: &MetadataLatest) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for pallet in &meta.pallets {
        names.insert(format!("pallet {} #{}", pallet.name, pallet.index));
        for call in meta.call_names(pallet) {
            names.insert(format!("call {}.{}", pallet.name, call));
        }
        for event in meta.event_names(pallet) {
            names.insert(format!("event {}.{}", pallet.name, event));
        }
        for error in meta.error_names(pallet) {
            names.insert(format!("error {}.{}", pallet.name, error));
        }
        for constant in &pallet.constants {
            names.insert(format!("constant {}.{}", pallet.name, constant.name));
        }
        if let Some(storage) = &pallet.storage {
            for entry in &storage.entries {
                names.insert(format!("storage {}.{}", storage.prefix, entry.name));
            }
        }
    }
    names
}

#[test]
fn v9_and_native_v13_upgrade_to_the_same_surface() {
    let from_v9 = decode_metadata(&encode_envelope(&RuntimeMetadata::V9(v9_fixture())).unwrap()).unwrap();
    let from_v13 =
        decode_metadata(&encode_envelope(&RuntimeMetadata::V13(v13_fixture())).unwrap()).unwrap();

    assert_eq!(from_v9.source_version, 9);
    assert_eq!(from_v13.source_version, 13);
    assert_eq!(surface(&from_v9), surface(&from_v13));
    assert!(surface(&from_v9).contains("call Balances.transfer"));
    assert!(surface(&from_v9).contains("error Balances.ExistentialDeposit"));
}

#[test]
fn v9_hashers_are_remapped() {
    let latest = RuntimeMetadata::V9(v9_fixture()).into_latest().unwrap();
    let system = latest.pallet("System").unwrap();
    let entry = &system.storage.as_ref().unwrap().entries[0];
    assert_eq!(entry.ty.hashers(), &[StorageHasher::Blake2_256]);
}

#[test]
fn legacy_arguments_become_scoped_historic_nodes() {
    let latest = RuntimeMetadata::V9(v9_fixture()).into_latest().unwrap();
    let balances = latest.pallet("Balances").unwrap();
    let calls = latest.types.variants(balances.calls.unwrap()).unwrap();
    let transfer = &calls[0];
    assert_eq!(transfer.index, 0);
    assert_eq!(transfer.fields[1].name.as_deref(), Some("value"));

    let value_ty = latest.types.get(transfer.fields[1].ty).unwrap();
    assert_eq!(
        value_ty.descriptor,
        TypeDescriptor::Historic {
            name: "Compact<T::Balance>".into(),
            scope: Some("Balances".into()),
        }
    );

    let system = latest.pallet("System").unwrap();
    let StorageEntryType::Map { key, .. } = &system.storage.as_ref().unwrap().entries[0].ty else {
        panic!("expected a map entry");
    };
    assert!(matches!(
        &latest.types.get(*key).unwrap().descriptor,
        TypeDescriptor::Historic { scope: Some(scope), .. } if scope == "System"
    ));
}

#[test]
fn pallets_without_errors_have_no_error_type() {
    let latest = RuntimeMetadata::V13(v13_fixture()).into_latest().unwrap();
    assert!(latest.pallet("System").unwrap().errors.is_none());
    assert!(latest.pallet("Balances").unwrap().errors.is_some());
}

#[test]
fn latest_serializes_to_json() {
    let latest = RuntimeMetadata::V13(v13_fixture()).into_latest().unwrap();
    let json = serde_json::to_value(&latest).unwrap();
    assert_eq!(json["pallets"][1]["name"], "Balances");
    assert_eq!(json["source_version"], 13);
}
