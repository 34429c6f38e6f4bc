use dk_dex::file::{DexFile, DexFileOptions};
use dk_dex::insns::RETURN_VOID_NO_BARRIER;
use dk_dex::ir::*;
use dk_dex::{write, WriterOptions};
use dk_vdex::{
    quicken_dex_file, NoResolver, QuickenResolver, UnquickenOptions, VdexBuilder, VdexError,
    VdexFile,
};

const ACC_PUBLIC: u32 = 0x1;
const NUM_METHODS: u16 = 20;

/// Class `LQuick;` with one field and twenty virtual methods cycling
/// through field reads, virtual calls, nops and casts.
fn sample() -> Vec<u8> {
    let mut header = Header::default();
    let cols = header.collections_mut();

    let quick = cols.add_type("LQuick;");
    let object = cols.add_type("Ljava/lang/Object;");
    let int = cols.add_type("I");
    let void = cols.add_type("V");
    let shorty = cols.type_ids().get(void).unwrap().descriptor;
    let value = cols.add_string("value");

    let proto = cols.proto_ids_mut().push(ProtoId::new(shorty, void, None));
    cols.field_ids_mut().push(FieldId::new(quick, int, value));

    let mut class_data = ClassData::new();
    for i in 0..NUM_METHODS {
        let name = cols.add_string(&format!("m{}", i));
        let method = cols.method_ids_mut().push(MethodId::new(quick, proto, name));
        let insns = match i % 4 {
            // iget v0, v1, field@0
            0 => vec![0x1052, 0x0000, 0x000e],
            // invoke-virtual {v1}, next method
            1 => vec![0x106e, (i + 1) % NUM_METHODS, 0x0001, 0x000e],
            // nop ; check-cast v1, type@1
            2 => vec![0x0000, 0x011f, 0x0001, 0x000e],
            _ => vec![0x000e],
        };
        let code = cols.code_items_mut().push(CodeItem::new(2, 1, 1, insns));
        class_data.virtual_methods.push(MethodItem {
            access_flags: ACC_PUBLIC,
            method,
            code: Some(code),
        });
    }
    let class_data = cols.class_datas_mut().push(class_data);

    let mut class_def = ClassDef::new(quick, ACC_PUBLIC);
    class_def.superclass = Some(object);
    class_def.class_data = Some(class_data);
    cols.add_class_def(class_def).unwrap();

    write(&mut header, &WriterOptions::default()).unwrap()
}

struct Resolver;

impl QuickenResolver for Resolver {
    fn field_offset(&mut self, field_idx: u16) -> Option<u16> {
        Some(8 + 4 * field_idx)
    }

    fn vtable_index(&mut self, method_idx: u16) -> Option<u16> {
        Some(method_idx + 3)
    }

    fn elide_check_cast(&mut self, _type_idx: u16) -> bool {
        true
    }

    fn return_void_no_barrier(&mut self, method_idx: u32) -> bool {
        method_idx % 2 == 0
    }
}

fn quickened_vdex(dex: &[u8]) -> Vec<u8> {
    let mut quickened = dex.to_vec();
    let info = quicken_dex_file(&mut quickened, &mut Resolver).unwrap();
    assert_ne!(quickened, dex);
    assert!(!info.is_empty());
    VdexBuilder::new()
        .add_dex(quickened, Some(info))
        .set_verifier_deps(vec![1, 2, 3])
        .build()
        .unwrap()
}

fn last_units(dex: &[u8]) -> Vec<u16> {
    let dex_file = DexFile::open_with(
        dex,
        DexFileOptions {
            verify_checksum: false,
        },
    )
    .unwrap();
    let class_def = dex_file.class_def(0).unwrap();
    let class_data = dex_file.class_data(class_def.class_data_off).unwrap();
    class_data
        .methods()
        .map(|m| *dex_file.code_item(m.code_off).unwrap().insns.last().unwrap())
        .collect()
}

#[test]
fn lookups_agree_for_every_method() {
    let vdex = VdexFile::from_bytes(quickened_vdex(&sample())).unwrap();
    assert_eq!(vdex.num_dex_files(), 1);
    assert_eq!(vdex.verifier_deps(), &[1, 2, 3]);
    assert_eq!(vdex.quickening_info_offset(0, 0).unwrap(), 0);

    for k in 0..u32::from(NUM_METHODS) {
        let direct = vdex.quickening_info_offset(0, k).unwrap();
        let linear = vdex.quickening_info_offset_linear(0, k).unwrap();
        assert_eq!(direct, linear, "method {}", k);
    }
    assert!(vdex
        .quickening_info_offset(0, u32::from(NUM_METHODS))
        .is_err());
}

#[test]
fn unquicken_restores_the_dex_file() {
    let dex = sample();
    let mut vdex = VdexFile::from_bytes(quickened_vdex(&dex)).unwrap();
    vdex.unquicken(UnquickenOptions {
        decompile_return_instruction: true,
    })
    .unwrap();

    let restored = vdex.dex_file_data(0).unwrap();
    assert_eq!(restored, &dex[..]);
    DexFile::open(restored).unwrap();
}

#[test]
fn return_instructions_are_kept_unless_asked() {
    let dex = sample();
    let mut vdex = VdexFile::from_bytes(quickened_vdex(&dex)).unwrap();
    vdex.unquicken(UnquickenOptions::default()).unwrap();

    let restored = vdex.dex_file_data(0).unwrap();
    assert_ne!(restored, &dex[..]);
    for (i, unit) in last_units(restored).into_iter().enumerate() {
        let expected = if i % 2 == 0 {
            u16::from(RETURN_VOID_NO_BARRIER)
        } else {
            0x000e
        };
        assert_eq!(unit, expected, "method {}", i);
    }
}

#[test]
fn mismatched_tables_are_rejected() {
    let dex = sample();
    let mut quickened = dex.clone();
    quicken_dex_file(&mut quickened, &mut Resolver).unwrap();
    // tables of a pass that did not quicken anything but nops
    let mut plain = dex;
    let info = quicken_dex_file(&mut plain, &mut NoResolver).unwrap();

    let data = VdexBuilder::new()
        .add_dex(quickened, Some(info))
        .build()
        .unwrap();
    let mut vdex = VdexFile::from_bytes(data).unwrap();
    assert!(matches!(
        vdex.unquicken(UnquickenOptions::default()),
        Err(VdexError::Integrity(_))
    ));
}

#[test]
fn tables_without_quickened_code_are_rejected() {
    let dex = sample();
    let mut quickened = dex.clone();
    let info = quicken_dex_file(&mut quickened, &mut Resolver).unwrap();

    // the first method reads its field with a plain iget: its entry is
    // never consumed
    let data = VdexBuilder::new().add_dex(dex.clone(), Some(info)).build().unwrap();
    let mut vdex = VdexFile::from_bytes(data).unwrap();
    assert!(matches!(
        vdex.unquicken(UnquickenOptions::default()),
        Err(VdexError::Integrity(_))
    ));
    assert_eq!(vdex.dex_file_data(0).unwrap(), &dex[..]);
}

#[test]
fn unquickened_container_is_left_alone() {
    let dex = sample();
    let data = VdexBuilder::new().add_dex(dex.clone(), None).build().unwrap();
    let mut vdex = VdexFile::from_bytes(data).unwrap();
    assert_eq!(vdex.header().quickening_info_size, 0);
    assert_eq!(vdex.dex_locations()[0].table_offset, 0);

    vdex.unquicken(UnquickenOptions::default()).unwrap();
    assert_eq!(vdex.dex_file_data(0).unwrap(), &dex[..]);
}

#[test]
fn dex_files_are_independent() {
    let dex = sample();
    let mut first = dex.clone();
    let first_info = quicken_dex_file(&mut first, &mut Resolver).unwrap();
    let data = VdexBuilder::new()
        .add_dex(first, Some(first_info))
        .add_dex(dex.clone(), None)
        .build()
        .unwrap();

    let mut vdex = VdexFile::from_bytes(data).unwrap();
    assert_eq!(vdex.num_dex_files(), 2);
    assert!(vdex.dex_locations().iter().all(|l| l.begin % 4 == 0));

    let options = UnquickenOptions {
        decompile_return_instruction: true,
    };
    let (slots, quickening_info) = vdex.split_for_unquicken();
    for mut slot in slots.into_iter().rev() {
        slot.unquicken(quickening_info, options).unwrap();
    }
    assert_eq!(vdex.dex_file_data(0).unwrap(), &dex[..]);
    assert_eq!(vdex.dex_file_data(1).unwrap(), &dex[..]);
}

#[test]
fn mapped_file_is_never_written() {
    let data = quickened_vdex(&sample());
    let path = std::env::temp_dir().join(format!("dk_vdex_{}.vdex", std::process::id()));
    std::fs::write(&path, &data).unwrap();

    let mut vdex = VdexFile::open(&path).unwrap();
    vdex.unquicken(UnquickenOptions::default()).unwrap();
    assert_ne!(vdex.as_bytes(), &data[..]);
    drop(vdex);

    assert_eq!(std::fs::read(&path).unwrap(), data);
    std::fs::remove_file(&path).unwrap();
}
