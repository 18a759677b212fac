//! Synthesized helloworldPackage fixtures: byte-level builders for
//! conformant CAP archives in formats 2.1 / 2.2 / 2.3 (compact and
//! extended) and a 2.3 EXP file. Sizes and the Directory table are computed
//! from the built components so that unedited fixtures decode warning-free.

#![allow(dead_code)]

use capastrophic::envelope;

pub const PACKAGE_AID: [u8; 5] = [0x44; 5];
pub const APPLET_AID: [u8; 6] = [0x44, 0x44, 0x44, 0x44, 0x44, 0x01];
pub const PACKAGE_NAME: &[u8] = b"helloworldPackage";

fn component(tag: u8, info: &[u8]) -> Vec<u8> {
    let mut blob = vec![tag];
    blob.extend_from_slice(&(info.len() as u16).to_be_bytes());
    blob.extend_from_slice(info);
    blob
}

fn component_long(tag: u8, info: &[u8]) -> Vec<u8> {
    let mut blob = vec![tag];
    blob.extend_from_slice(&(info.len() as u32).to_be_bytes());
    blob.extend_from_slice(info);
    blob
}

fn at_least(major: u8, minor: u8, want_major: u8, want_minor: u8) -> bool {
    (major, minor) >= (want_major, want_minor)
}

fn header_info(major: u8, minor: u8, extended: bool) -> Vec<u8> {
    let mut info = vec![0xde, 0xca, 0xff, 0xed, minor, major];
    info.push(if extended { 0x0c } else { 0x04 }); // APPLET (+EXTENDED)

    let package = {
        let mut p = vec![0x00, 0x01, PACKAGE_AID.len() as u8];
        p.extend_from_slice(&PACKAGE_AID);
        p
    };

    if extended {
        info.extend_from_slice(&[0x00, 0x01]); // CAP version 1.0
        info.push(PACKAGE_AID.len() as u8);
        info.extend_from_slice(&PACKAGE_AID);
        info.push(0x01); // package count
        info.extend_from_slice(&package);
        info.push(PACKAGE_NAME.len() as u8);
        info.extend_from_slice(PACKAGE_NAME);
    } else {
        info.extend_from_slice(&package);
        if at_least(major, minor, 2, 2) {
            info.push(PACKAGE_NAME.len() as u8);
            info.extend_from_slice(PACKAGE_NAME);
        }
    }

    info
}

fn applet_info(extended: bool) -> Vec<u8> {
    let mut info = vec![0x01, APPLET_AID.len() as u8];
    info.extend_from_slice(&APPLET_AID);
    if extended {
        info.push(0x00); // install method block index
    }
    info.extend_from_slice(&[0x00, 0x09]); // install method offset
    info
}

fn import_info() -> Vec<u8> {
    // javacard/framework v1.2
    vec![
        0x01, //
        0x02, 0x01, 0x07, 0xa0, 0x00, 0x00, 0x00, 0x62, 0x01, 0x01,
    ]
}

fn constant_pool_info() -> Vec<u8> {
    vec![
        0x00, 0x04, //
        0x06, 0x00, 0x00, 0x09, // StaticMethodref internal @9 (install)
        0x01, 0x00, 0x01, 0x00, // Classref internal @1 (the class)
        0x02, 0x00, 0x01, 0x00, // InstanceFieldref @1 token 0
        0x05, 0x80, 0x03, 0x07, // StaticFieldref external p0.c3 t7
    ]
}

fn class_info(major: u8, minor: u8, extended: bool) -> Vec<u8> {
    let mut info = Vec::new();

    if at_least(major, minor, 2, 2) {
        info.extend_from_slice(&[0x00, 0x04]); // signature pool length
        info.extend_from_slice(&[0x01, 0x20]); // Z
        info.extend_from_slice(&[0x01, 0x10]); // V
    }

    // one Shareable interface, no superinterfaces
    info.push(0xc0);

    // one class extending an external class
    info.push(0x00); // flags nibble 0, implements nothing
    info.extend_from_slice(&[0x80, 0x03]); // super external p0.c3
    info.extend_from_slice(&[0x02, 0x00, 0x00]); // instance size, ref token, ref count
    info.extend_from_slice(&[0x00, 0x01]); // public table base/count
    info.extend_from_slice(&[0x00, 0x00]); // package table base/count
    if extended {
        info.extend_from_slice(&[0x00, 0x00, 0x09]); // block 0, offset 9
    } else {
        info.extend_from_slice(&[0x00, 0x09]);
    }

    if at_least(major, minor, 2, 3) {
        info.push(0x00); // public_virtual_method_token_mapping[1]
        info.push(0x01); // CAP22 inheritable token count
    }

    info
}

fn method_block() -> Vec<u8> {
    let mut block = vec![0x01]; // handler count
    block.extend_from_slice(&[0x00, 0x09, 0x80, 0x03, 0x00, 0x0e, 0x00, 0x01]);
    block.extend_from_slice(&[0x00, 0x21, 0x18, 0x3b, 0x7a]); // method @9
    block.extend_from_slice(&[0x00, 0x10, 0x7a]); // method @14
    block
}

fn method_info_compact() -> Vec<u8> {
    method_block()
}

fn method_info_extended() -> Vec<u8> {
    let block = method_block();
    let mut info = vec![0x01]; // block count
    info.extend_from_slice(&5u32.to_be_bytes()); // block starts after count+offsets
    info.extend_from_slice(&block);
    info
}

fn static_field_info() -> Vec<u8> {
    vec![
        0x00, 0x03, // image_size = 0*2 + 1 + 2
        0x00, 0x00, // reference_count
        0x00, 0x00, // array_init_count
        0x00, 0x01, // default_value_count
        0x00, 0x02, 0xaa, 0xbb, // non-default values
    ]
}

fn ref_location_block() -> Vec<u8> {
    vec![
        0x00, 0x01, 0x0c, // one 1-byte index site at 12
        0x00, 0x02, 0x0d, 0x02, // two 2-byte index sites at 13, 15
    ]
}

fn ref_location_info_extended() -> Vec<u8> {
    let mut info = vec![0x01];
    info.extend_from_slice(&ref_location_block());
    info
}

fn descriptor_classes(extended: bool) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.push(0x01); // class_count

    bytes.extend_from_slice(&[0x00, 0x01]); // token, PUBLIC
    bytes.extend_from_slice(&[0x00, 0x01]); // this_class_ref internal @1
    bytes.push(0x00); // interface_count
    bytes.extend_from_slice(&[0x00, 0x01]); // field_count
    bytes.extend_from_slice(&[0x00, 0x02]); // method_count

    // field: PUBLIC|STATIC, internal static ref, boolean
    bytes.extend_from_slice(&[0x00, 0x09, 0x00, 0x00, 0x00, 0x80, 0x02]);

    // methods mirror the two bodies in Method.cap
    let mut method = |token: u8, offset: u16, type_offset: u16, count: u16, eh: u16| {
        bytes.extend_from_slice(&[token, 0x01]);
        if extended {
            bytes.push(0x00);
        }
        bytes.extend_from_slice(&offset.to_be_bytes());
        bytes.extend_from_slice(&type_offset.to_be_bytes());
        bytes.extend_from_slice(&count.to_be_bytes());
        bytes.extend_from_slice(&eh.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]);
    };
    method(0x00, 0x0009, 0x0002, 0x0003, 0x0001);
    method(0x01, 0x000e, 0x0004, 0x0001, 0x0000);

    bytes
}

fn descriptor_types() -> Vec<u8> {
    vec![
        0x00, 0x04, // one entry per constant pool slot
        0x00, 0x0a, 0xff, 0xff, 0x00, 0x0c, 0x00, 0x0c, //
        0x01, 0x20, // Z
        0x02, 0x35, // BI
    ]
}

fn descriptor_info(extended: bool) -> Vec<u8> {
    let mut info = Vec::new();
    if extended {
        info.push(0x01); // package_count
    }
    info.extend_from_slice(&descriptor_classes(extended));
    info.extend_from_slice(&descriptor_types());
    info
}

fn static_resources_info() -> Vec<u8> {
    vec![
        0x00, 0x01, //
        0x00, 0x01, 0x00, 0x00, 0x00, 0x02, //
        0xca, 0xfe,
    ]
}

fn directory_info(
    major: u8,
    minor: u8,
    extended: bool,
    own_size: u16,
    sizes: &[(u8, u32)],
) -> Vec<u8> {
    let lookup = |tag: u8| -> u32 {
        sizes
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, s)| *s)
            .unwrap_or(0)
    };

    let push_u2 = |info: &mut Vec<u8>, v: u32| info.extend_from_slice(&(v as u16).to_be_bytes());
    let push_wide = |info: &mut Vec<u8>, v: u32| {
        if extended {
            info.extend_from_slice(&v.to_be_bytes());
        } else {
            info.extend_from_slice(&(v as u16).to_be_bytes());
        }
    };

    let mut info = Vec::new();
    push_u2(&mut info, lookup(1)); // header
    push_u2(&mut info, u32::from(own_size)); // directory
    push_u2(&mut info, lookup(3)); // applet
    push_u2(&mut info, lookup(4)); // import
    push_u2(&mut info, lookup(5)); // constant pool
    push_u2(&mut info, lookup(6)); // class
    push_wide(&mut info, lookup(7)); // method
    push_u2(&mut info, lookup(8)); // static field
    push_wide(&mut info, lookup(9)); // reference location
    push_u2(&mut info, lookup(10)); // export
    push_wide(&mut info, lookup(11)); // descriptor
    if at_least(major, minor, 2, 2) {
        push_wide(&mut info, lookup(12)); // debug
    }
    if at_least(major, minor, 2, 3) {
        info.extend_from_slice(&lookup(13).to_be_bytes()); // static resources, u4
    }

    // static field metrics track StaticField.cap
    info.extend_from_slice(&[0x00, 0x03, 0x00, 0x00, 0x00, 0x00]);
    info.push(0x01); // import count
    info.push(0x01); // applet count
    if extended {
        info.push(0x01); // method block count
    }
    info.push(0x00); // custom count

    info
}

fn info_size(blob: &[u8], size_width: usize) -> u32 {
    (blob.len() - 1 - size_width) as u32
}

/// A compact helloworld CAP in format `major.minor`.
pub fn helloworld_cap(major: u8, minor: u8) -> Vec<u8> {
    let header = component(1, &header_info(major, minor, false));
    let applet = component(3, &applet_info(false));
    let import = component(4, &import_info());
    let pool = component(5, &constant_pool_info());
    let class = component(6, &class_info(major, minor, false));
    let method = component(7, &method_info_compact());
    let static_field = component(8, &static_field_info());
    let ref_location = component(9, &ref_location_block());
    let descriptor = component(11, &descriptor_info(false));
    let static_resources = component_long(13, &static_resources_info());

    let mut sizes = vec![
        (1u8, info_size(&header, 2)),
        (3, info_size(&applet, 2)),
        (4, info_size(&import, 2)),
        (5, info_size(&pool, 2)),
        (6, info_size(&class, 2)),
        (7, info_size(&method, 2)),
        (8, info_size(&static_field, 2)),
        (9, info_size(&ref_location, 2)),
        (11, info_size(&descriptor, 2)),
    ];
    if at_least(major, minor, 2, 3) {
        sizes.push((13, info_size(&static_resources, 4)));
    }

    // the directory's own info length is layout-fixed; measure then rebuild
    let own = directory_info(major, minor, false, 0, &sizes).len() as u16;
    let directory = component(2, &directory_info(major, minor, false, own, &sizes));

    let mut entries = vec![
        ("Header.cap".to_string(), header),
        ("Directory.cap".to_string(), directory),
        ("Import.cap".to_string(), import),
        ("Applet.cap".to_string(), applet),
        ("Class.cap".to_string(), class),
        ("Method.cap".to_string(), method),
        ("StaticField.cap".to_string(), static_field),
        ("ConstantPool.cap".to_string(), pool),
        ("RefLocation.cap".to_string(), ref_location),
    ];
    if at_least(major, minor, 2, 3) {
        entries.push(("StaticResources.capx".to_string(), static_resources));
    }
    entries.push(("Descriptor.cap".to_string(), descriptor));

    envelope::write_cap(&entries).expect("fixture archive")
}

/// An extended-format 2.3 helloworld CAP (`.capx` entries, long sizes).
pub fn helloworld_cap_extended() -> Vec<u8> {
    let header = component(1, &header_info(2, 3, true));
    let applet = component(3, &applet_info(true));
    let import = component(4, &import_info());
    let pool = component(5, &constant_pool_info());
    let class = component(6, &class_info(2, 3, true));
    let method = component_long(7, &method_info_extended());
    let static_field = component(8, &static_field_info());
    let ref_location = component_long(9, &ref_location_info_extended());
    let descriptor = component_long(11, &descriptor_info(true));

    let sizes = vec![
        (1u8, info_size(&header, 2)),
        (3, info_size(&applet, 2)),
        (4, info_size(&import, 2)),
        (5, info_size(&pool, 2)),
        (6, info_size(&class, 2)),
        (7, info_size(&method, 4)),
        (8, info_size(&static_field, 2)),
        (9, info_size(&ref_location, 4)),
        (11, info_size(&descriptor, 4)),
    ];

    let own = directory_info(2, 3, true, 0, &sizes).len() as u16;
    let directory = component(2, &directory_info(2, 3, true, own, &sizes));

    let entries = vec![
        ("Header.cap".to_string(), header),
        ("Directory.cap".to_string(), directory),
        ("Import.cap".to_string(), import),
        ("Applet.cap".to_string(), applet),
        ("Class.cap".to_string(), class),
        ("Method.capx".to_string(), method),
        ("StaticField.cap".to_string(), static_field),
        ("ConstantPool.cap".to_string(), pool),
        ("RefLocation.capx".to_string(), ref_location),
        ("Descriptor.capx".to_string(), descriptor),
    ];

    envelope::write_cap(&entries).expect("fixture archive")
}

/// A 2.3 EXP file for helloworldPackage with a single package constant.
pub fn helloworld_exp_2_3() -> Vec<u8> {
    let mut bytes = vec![0x00, 0xfa, 0xca, 0xde, 0x03, 0x02]; // magic, v2.3

    bytes.extend_from_slice(&[0x00, 0x03]); // constant pool count

    // [0] Utf8 "helloworldPackage"
    bytes.push(0x01);
    bytes.extend_from_slice(&(PACKAGE_NAME.len() as u16).to_be_bytes());
    bytes.extend_from_slice(PACKAGE_NAME);

    // [1] Package v1.0, AID 44 44 44 44 44
    bytes.push(0x0d);
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x01]);
    bytes.push(PACKAGE_AID.len() as u8);
    bytes.extend_from_slice(&PACKAGE_AID);

    // [2] Classref -> Utf8 0
    bytes.extend_from_slice(&[0x07, 0x00, 0x00]);

    bytes.extend_from_slice(&[0x00, 0x01]); // this_package -> [1]
    bytes.push(0x00); // referenced package count (2.3)

    bytes.push(0x01); // export class count
    bytes.push(0x00); // token
    bytes.extend_from_slice(&[0x0a, 0x01]); // Public|Interface|Shareable
    bytes.extend_from_slice(&[0x00, 0x00]); // name_index -> Utf8 0
    bytes.extend_from_slice(&[0x00, 0x00]); // supers
    bytes.push(0x00); // interfaces
    bytes.extend_from_slice(&[0x00, 0x00]); // fields
    bytes.extend_from_slice(&[0x00, 0x00]); // methods
    bytes.push(0x00); // CAP22 inheritable token count

    bytes
}

/// Reads the component map back out of an archive for comparisons.
pub fn entries_of(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    envelope::read_cap(bytes)
        .expect("readable archive")
        .into_iter()
        .collect()
}
