use dk_dex::file::{compute_checksum, DexFile};
use dk_dex::ir::*;
use dk_dex::map::MapItemType;
use dk_dex::sections::{section_statistics, PAGE_SIZE};
use dk_dex::visualize::{visualize, VisualizeOptions};
use dk_dex::{parse, write, LayoutLevel, WriterOptions};

const ACC_PUBLIC: u32 = 0x1;
const ACC_STATIC: u32 = 0x8;
const ACC_CONSTRUCTOR: u32 = 0x10000;

/// A single class `LFoo;` with two fields, four methods (two of them with
/// identical bodies), a try block, debug info, static values and a class
/// annotation.
fn sample() -> Header {
    let mut header = Header::default();
    let cols = header.collections_mut();

    let foo = cols.add_type("LFoo;");
    let object = cols.add_type("Ljava/lang/Object;");
    let int = cols.add_type("I");
    let void = cols.add_type("V");
    let exception = cols.add_type("Ljava/lang/Exception;");
    let anno = cols.add_type("LAnno;");
    let shorty_v = cols.type_ids().get(void).unwrap().descriptor;
    let shorty_vi = cols.add_string("VI");
    let shorty_ii = cols.add_string("II");
    let init = cols.add_string("<init>");
    let run = cols.add_string("run");
    let stop = cols.add_string("stop");
    let get = cols.add_string("get");
    let count = cols.add_string("count");
    let zero = cols.add_string("ZERO");
    let source = cols.add_string("Foo.java");
    let value = cols.add_string("value");

    // identical lists, written once by the compact layout
    let params_vi = cols.type_lists_mut().push(TypeList::new(vec![int]));
    let params_ii = cols.type_lists_mut().push(TypeList::new(vec![int]));

    let p_v = cols.proto_ids_mut().push(ProtoId::new(shorty_v, void, None));
    let p_vi = cols
        .proto_ids_mut()
        .push(ProtoId::new(shorty_vi, void, Some(params_vi)));
    let p_ii = cols
        .proto_ids_mut()
        .push(ProtoId::new(shorty_ii, int, Some(params_ii)));

    let f_count = cols.field_ids_mut().push(FieldId::new(foo, int, count));
    let f_zero = cols.field_ids_mut().push(FieldId::new(foo, int, zero));

    let m_init = cols.method_ids_mut().push(MethodId::new(foo, p_v, init));
    let m_run = cols.method_ids_mut().push(MethodId::new(foo, p_vi, run));
    let m_stop = cols.method_ids_mut().push(MethodId::new(foo, p_vi, stop));
    let m_get = cols.method_ids_mut().push(MethodId::new(foo, p_ii, get));

    let debug = cols.debug_infos_mut().push(DebugInfoItem::new(
        12,
        Vec::new(),
        vec![
            DbgInstr::SetPrologueEnd,
            DbgInstr::Special(0x0e),
            DbgInstr::EndSequence,
        ],
    ));

    let mut init_code = CodeItem::new(1, 1, 0, vec![0x000e]);
    init_code.debug_info = Some(debug);
    let init_code = cols.code_items_mut().push(init_code);
    let run_code = cols
        .code_items_mut()
        .push(CodeItem::new(2, 2, 0, vec![0x0000, 0x000e]));
    let stop_code = cols
        .code_items_mut()
        .push(CodeItem::new(2, 2, 0, vec![0x0000, 0x000e]));
    let mut get_code = CodeItem::new(2, 2, 0, vec![0x0000, 0x010f]);
    get_code.tries.push(TryItem {
        start_addr: 0,
        insn_count: 1,
        handler: 0,
    });
    get_code.handlers.push(CatchHandler {
        handlers: vec![TypeAddrPair {
            typ: exception,
            addr: 1,
        }],
        catch_all_addr: None,
    });
    let get_code = cols.code_items_mut().push(get_code);

    let annotation = cols.annotations_mut().push(AnnotationItem::new(
        Visibility::Runtime,
        EncodedAnnotation {
            typ: anno,
            elements: vec![AnnotationElement {
                name: value,
                value: EncodedValue::Int(1),
            }],
        },
    ));
    let set = cols
        .annotation_sets_mut()
        .push(AnnotationSetItem::new(vec![annotation]));
    let mut directory = AnnotationsDirectoryItem::new();
    directory.class_annotation = Some(set);
    let directory = cols.annotations_directories_mut().push(directory);

    let mut class_data = ClassData::new();
    class_data.static_fields.push(FieldItem {
        access_flags: ACC_PUBLIC | ACC_STATIC,
        field: f_zero,
    });
    class_data.instance_fields.push(FieldItem {
        access_flags: ACC_PUBLIC,
        field: f_count,
    });
    class_data.direct_methods.push(MethodItem {
        access_flags: ACC_PUBLIC | ACC_CONSTRUCTOR,
        method: m_init,
        code: Some(init_code),
    });
    for (method, code) in [(m_run, run_code), (m_stop, stop_code), (m_get, get_code)] {
        class_data.virtual_methods.push(MethodItem {
            access_flags: ACC_PUBLIC,
            method,
            code: Some(code),
        });
    }
    let class_data = cols.class_datas_mut().push(class_data);

    let static_values = cols
        .encoded_arrays_mut()
        .push(EncodedArrayItem::new(vec![EncodedValue::Int(7)]));

    let mut class_def = ClassDef::new(foo, ACC_PUBLIC);
    class_def.superclass = Some(object);
    class_def.source_file = Some(source);
    class_def.annotations = Some(directory);
    class_def.class_data = Some(class_data);
    class_def.static_values = Some(static_values);
    cols.add_class_def(class_def).unwrap();

    header
}

fn method_name(cols: &Collections, method: &MethodItem) -> String {
    let id = cols.method_ids().get(method.method).unwrap();
    cols.string(id.name).unwrap()
}

#[test]
fn write_then_read_back() {
    let mut header = sample();
    let data = write(&mut header, &WriterOptions::default()).unwrap();

    assert_eq!(header.file_size() as usize, data.len());
    assert_eq!(header.checksum(), compute_checksum(&data).unwrap());

    let parsed = parse(&data).unwrap();
    let cols = parsed.collections();
    assert_eq!(cols.string_ids().len(), 16);
    assert_eq!(cols.type_ids().len(), 6);
    assert_eq!(cols.proto_ids().len(), 3);
    assert_eq!(cols.field_ids().len(), 2);
    assert_eq!(cols.method_ids().len(), 4);
    assert_eq!(cols.class_defs().len(), 1);
    assert_eq!(cols.type_lists().len(), 2);
    assert_eq!(cols.code_items().len(), 4);

    let class_def = cols.class_defs().get(Idx::new(0)).unwrap();
    assert_eq!(cols.type_descriptor(class_def.class_type).unwrap(), "LFoo;");
    assert_eq!(
        cols.type_descriptor(class_def.superclass.unwrap()).unwrap(),
        "Ljava/lang/Object;"
    );
    assert_eq!(cols.string(class_def.source_file.unwrap()).unwrap(), "Foo.java");

    let class_data = cols.class_datas().get(class_def.class_data.unwrap()).unwrap();
    let names: Vec<String> = class_data.methods().map(|m| method_name(cols, m)).collect();
    assert_eq!(names, ["<init>", "run", "stop", "get"]);

    let get = &class_data.virtual_methods[2];
    let code = cols.code_items().get(get.code.unwrap()).unwrap();
    assert_eq!(code.insns, [0x0000, 0x010f]);
    assert_eq!(code.tries.len(), 1);
    assert_eq!(code.handlers[code.tries[0].handler].handlers[0].addr, 1);

    let init = &class_data.direct_methods[0];
    let code = cols.code_items().get(init.code.unwrap()).unwrap();
    let debug = cols.debug_infos().get(code.debug_info.unwrap()).unwrap();
    assert_eq!(debug.line_start, 12);
    assert_eq!(debug.bytecode.last(), Some(&DbgInstr::EndSequence));

    let values = cols
        .encoded_arrays()
        .get(class_def.static_values.unwrap())
        .unwrap();
    assert_eq!(values.values, [EncodedValue::Int(7)]);

    let directory = cols
        .annotations_directories()
        .get(class_def.annotations.unwrap())
        .unwrap();
    let set = cols
        .annotation_sets()
        .get(directory.class_annotation.unwrap())
        .unwrap();
    let annotation = cols.annotations().get(set.items[0]).unwrap();
    assert_eq!(annotation.visibility, Visibility::Runtime);
    assert_eq!(
        cols.type_descriptor(annotation.annotation.typ).unwrap(),
        "LAnno;"
    );
}

#[test]
fn rewrite_is_stable() {
    let mut header = sample();
    let first = write(&mut header, &WriterOptions::default()).unwrap();
    let mut parsed = parse(&first).unwrap();
    let second = write(&mut parsed, &WriterOptions::default()).unwrap();
    assert_eq!(first, second);
}

/// Class `LEmpty;` with a single static method whose code item holds no
/// register, no instruction and no try.
fn empty_method() -> Header {
    let mut header = Header::default();
    let cols = header.collections_mut();

    let empty = cols.add_type("LEmpty;");
    let void = cols.add_type("V");
    let shorty = cols.type_ids().get(void).unwrap().descriptor;
    let name = cols.add_string("nothing");

    let proto = cols.proto_ids_mut().push(ProtoId::new(shorty, void, None));
    let method = cols.method_ids_mut().push(MethodId::new(empty, proto, name));
    let code = cols.code_items_mut().push(CodeItem::new(0, 0, 0, Vec::new()));

    let mut class_data = ClassData::new();
    class_data.direct_methods.push(MethodItem {
        access_flags: ACC_PUBLIC | ACC_STATIC,
        method,
        code: Some(code),
    });
    let class_data = cols.class_datas_mut().push(class_data);

    let mut class_def = ClassDef::new(empty, ACC_PUBLIC);
    class_def.class_data = Some(class_data);
    cols.add_class_def(class_def).unwrap();

    header
}

#[test]
fn empty_code_item() {
    for options in [WriterOptions::default(), WriterOptions::compact()] {
        let mut header = empty_method();
        let data = write(&mut header, &options).unwrap();

        let dex_file = DexFile::open(&data).unwrap();
        let entry = dex_file.map_item(MapItemType::CodeItem).unwrap();
        assert_eq!(entry.size, 1);
        let start = entry.offset as usize;
        assert_eq!(start % 4, 0);
        assert_eq!(data[start..start + 16], [0; 16], "{:?}", options.level);

        let mut parsed = parse(&data).unwrap();
        let cols = parsed.collections();
        assert_eq!(cols.code_items().len(), 1);
        let code = cols.code_items().get(Idx::new(0)).unwrap();
        assert_eq!(code.registers_size, 0);
        assert!(code.insns.is_empty());
        assert!(code.tries.is_empty());
        assert!(code.handlers.is_empty());
        assert!(code.debug_info.is_none());

        let rewritten = write(&mut parsed, &options).unwrap();
        assert_eq!(rewritten, data, "{:?}", options.level);
    }
}

#[test]
fn map_list_is_sorted_and_aligned() {
    let mut header = sample();
    let data = write(&mut header, &WriterOptions::default()).unwrap();
    let dex_file = DexFile::open(&data).unwrap();
    let map = dex_file.map_list();

    assert!(map.windows(2).all(|w| w[0].offset < w[1].offset));
    assert_eq!(map[0].typ, MapItemType::HeaderItem);
    assert_eq!(map[0].offset, 0);
    assert_eq!(map.last().unwrap().typ, MapItemType::MapList);
    for item in map {
        assert!(item.size > 0, "{} listed while empty", item.typ);
        if !item.typ.is_byte_aligned() {
            assert_eq!(item.offset % 4, 0, "{} is misaligned", item.typ);
        }
        assert_eq!(map.iter().filter(|other| other.typ == item.typ).count(), 1);
    }

    let h = dex_file.header();
    assert_eq!(h.data_off % 8, 0);
    assert_eq!(h.data_size % 8, 0);
    assert_eq!(h.map_off, map.last().unwrap().offset);
}

#[test]
fn compact_layout_shares_identical_items() {
    let mut standard = sample();
    let standard_data = write(&mut standard, &WriterOptions::default()).unwrap();
    let mut compact = sample();
    let compact_data = write(&mut compact, &WriterOptions::compact()).unwrap();

    assert!(compact_data.len() <= standard_data.len());

    // both parameter lists point at the same bytes
    let lists = compact.collections().type_lists();
    let offsets: Vec<Option<u32>> = lists.iter().map(|l| l.offset()).collect();
    assert_eq!(offsets[0], offsets[1]);
    let lists = standard.collections().type_lists();
    assert_ne!(lists.get(Idx::new(0)).unwrap().offset(), lists.get(Idx::new(1)).unwrap().offset());

    let dex_file = DexFile::open(&compact_data).unwrap();
    assert_eq!(dex_file.map_item(MapItemType::TypeList).unwrap().size, 1);
    // code items are left alone unless asked for
    assert_eq!(dex_file.map_item(MapItemType::CodeItem).unwrap().size, 4);

    let parsed = parse(&compact_data).unwrap();
    let cols = parsed.collections();
    assert_eq!(cols.type_lists().len(), 1);
    let protos: Vec<&ProtoId> = cols.proto_ids().iter().collect();
    assert_eq!(protos[1].parameters, protos[2].parameters);
}

#[test]
fn compact_layout_can_share_code() {
    let mut header = sample();
    let options = WriterOptions {
        level: LayoutLevel::Compact,
        dedupe_code_items: true,
        ..WriterOptions::default()
    };
    let data = write(&mut header, &options).unwrap();
    let dex_file = DexFile::open(&data).unwrap();
    assert_eq!(dex_file.map_item(MapItemType::CodeItem).unwrap().size, 3);

    let parsed = parse(&data).unwrap();
    let cols = parsed.collections();
    assert_eq!(cols.code_items().len(), 3);
    let class_data = cols.class_datas().get(Idx::new(0)).unwrap();
    assert_eq!(
        class_data.virtual_methods[0].code,
        class_data.virtual_methods[1].code
    );
}

#[test]
fn dedupe_off_keeps_standard_size() {
    let mut standard = sample();
    let standard_data = write(&mut standard, &WriterOptions::default()).unwrap();
    let mut header = sample();
    let options = WriterOptions {
        dedupe: false,
        ..WriterOptions::compact()
    };
    let data = write(&mut header, &options).unwrap();
    assert_eq!(data.len(), standard_data.len());
}

#[test]
fn diagnostics_on_written_container() {
    let mut header = sample();
    let data = write(&mut header, &WriterOptions::default()).unwrap();
    let parsed = parse(&data).unwrap();

    let stats = section_statistics(&parsed, data.len() as u32, PAGE_SIZE).unwrap();
    let pages: usize = stats.iter().map(|s| s.pages).sum();
    assert_eq!(pages, (data.len() + PAGE_SIZE as usize - 1) / PAGE_SIZE as usize);

    let mut out = Vec::new();
    let records = visualize(&parsed, &mut out, &VisualizeOptions::default()).unwrap();
    assert!(records > 0);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 6 + records);
    assert!(text
        .lines()
        .skip(6)
        .all(|line| line.split(' ').count() == 5));
}
