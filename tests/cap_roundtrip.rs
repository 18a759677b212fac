mod common;

use capastrophic::cap::{encode_json, Cap};
use capastrophic::cap::flags::HeaderFlags;
use capastrophic::cap::ref_location::absolute_offsets;
use capastrophic::error::Warning;
use capastrophic::support::hex;
use capastrophic::types::Version;

use common::{entries_of, helloworld_cap, helloworld_cap_extended, APPLET_AID};

#[test]
fn unedited_samples_decode_without_warnings() {
    for bytes in [
        helloworld_cap(2, 1),
        helloworld_cap(2, 2),
        helloworld_cap(2, 3),
        helloworld_cap_extended(),
    ] {
        let cap = Cap::decode(&bytes).unwrap();
        assert_eq!(cap.warnings, vec![], "fixture should be self-consistent");
    }
}

#[test]
fn decode_of_2_1_matches_the_sample_shape() {
    let cap = Cap::decode(&helloworld_cap(2, 1)).unwrap();
    let header = cap.header().unwrap();

    assert_eq!(header.version, Version::V2_1);
    assert!(header.flags.contains(HeaderFlags::APPLET));
    assert!(!header.flags.contains(HeaderFlags::EXTENDED));

    let applet = cap.applet().unwrap();
    assert_eq!(applet.applets.len(), 1);
    assert_eq!(applet.applets[0].aid, APPLET_AID);
}

#[test]
fn unedited_roundtrip_is_byte_identical() {
    for bytes in [
        helloworld_cap(2, 1),
        helloworld_cap(2, 2),
        helloworld_cap(2, 3),
        helloworld_cap_extended(),
    ] {
        let cap = Cap::decode(&bytes).unwrap();
        assert_eq!(cap.encode().unwrap(), bytes);
    }
}

#[test]
fn decode_is_deterministic() {
    let bytes = helloworld_cap(2, 3);
    let first = Cap::decode(&bytes).unwrap().to_json();
    let second = Cap::decode(&bytes).unwrap().to_json();
    assert_eq!(first, second);
}

#[test]
fn every_record_reproduces_its_component_blob() {
    let bytes = helloworld_cap(2, 3);
    let cap = Cap::decode(&bytes).unwrap();
    let json = cap.to_json();

    for (name, blob) in entries_of(&bytes) {
        let raw = json[&name]["raw"].as_str().unwrap();
        assert_eq!(hex::decode(raw).unwrap(), blob, "raw mismatch for {name}");
    }
}

#[test]
fn json_path_and_direct_encode_agree() {
    let bytes = helloworld_cap(2, 2);
    let cap = Cap::decode(&bytes).unwrap();
    assert_eq!(encode_json(&cap.to_json()).unwrap(), cap.encode().unwrap());
}

#[test]
fn annotated_header_edit_rewrites_only_the_header() {
    let bytes = helloworld_cap(2, 1);
    let original = entries_of(&bytes);

    let mut json = Cap::decode(&bytes).unwrap().to_json();
    json["Header.cap"]["raw_modified"] =
        "01 000f decaffed 0102040001<(AID Len)05><(AID)5555555555>".into();

    let rebuilt = encode_json(&json).unwrap();
    let edited = entries_of(&rebuilt);

    assert_eq!(original.len(), edited.len());
    for ((name, before), (edited_name, after)) in original.iter().zip(&edited) {
        assert_eq!(name, edited_name);
        if name == "Header.cap" {
            assert_eq!(
                hex::encode(after),
                "01000fdecaffed0102040001055555555555"
            );
        } else {
            assert_eq!(before, after, "{name} should be untouched");
        }
    }
}

#[test]
fn single_byte_edit_stays_local_to_its_component() {
    let bytes = helloworld_cap(2, 1);
    let original = entries_of(&bytes);

    let mut cap = Cap::decode(&bytes).unwrap();
    let method = cap
        .components
        .iter_mut()
        .find(|c| c.name == "Method.cap")
        .unwrap();

    let mut tampered = method.raw.clone();
    let position = tampered.len() - 1;
    tampered[position] ^= 0xff;
    method.raw_modified = hex::encode(&tampered);

    let edited = entries_of(&cap.encode().unwrap());

    for ((name, before), (_, after)) in original.iter().zip(&edited) {
        if name == "Method.cap" {
            let diff: Vec<usize> = (0..before.len()).filter(|i| before[*i] != after[*i]).collect();
            assert_eq!(diff, vec![position]);
        } else {
            assert_eq!(before, after);
        }
    }
}

#[test]
fn present_component_sets_follow_the_version() {
    let names = |bytes: &[u8]| -> Vec<String> {
        Cap::decode(bytes)
            .unwrap()
            .components
            .iter()
            .map(|c| c.name.clone())
            .collect()
    };

    let base = vec![
        "Header.cap",
        "Directory.cap",
        "Import.cap",
        "Applet.cap",
        "Class.cap",
        "Method.cap",
        "StaticField.cap",
        "ConstantPool.cap",
        "RefLocation.cap",
        "Descriptor.cap",
    ];

    assert_eq!(names(&helloworld_cap(2, 1)), base);
    assert_eq!(names(&helloworld_cap(2, 2)), base);

    let with_resources = names(&helloworld_cap(2, 3));
    assert!(with_resources.contains(&"StaticResources.capx".to_string()));

    let extended = names(&helloworld_cap_extended());
    assert!(extended.contains(&"Method.capx".to_string()));
    assert!(extended.contains(&"RefLocation.capx".to_string()));
    assert!(extended.contains(&"Descriptor.capx".to_string()));

    let cap = Cap::decode(&helloworld_cap_extended()).unwrap();
    assert!(cap.context.extended);
    assert_eq!(cap.context.version, Version::V2_3);
}

#[test]
fn corrupted_directory_size_warns_and_decodes() {
    let bytes = helloworld_cap(2, 1);
    let mut entries = entries_of(&bytes);

    let directory = entries
        .iter_mut()
        .find(|(name, _)| name == "Directory.cap")
        .map(|(_, blob)| blob)
        .unwrap();
    // the applet entry is the third size in the table (info offset 4)
    directory[3 + 4 + 1] ^= 0x01;

    let tampered = capastrophic::envelope::write_cap(&entries).unwrap();
    let cap = Cap::decode(&tampered).unwrap();

    assert!(cap.warnings.iter().any(|w| matches!(
        w,
        Warning::InconsistentSize { component, .. } if component == "Applet.cap"
    )));
}

#[test]
fn extended_cap_with_short_size_method_still_decodes() {
    let bytes = helloworld_cap_extended();
    let mut entries = entries_of(&bytes);

    // swap the extended Method for a short-size one under the compact name
    let compact_method = entries_of(&helloworld_cap(2, 3))
        .into_iter()
        .find(|(name, _)| name == "Method.cap")
        .map(|(_, blob)| blob)
        .unwrap();
    for (name, blob) in entries.iter_mut() {
        if name == "Method.capx" {
            *name = "Method.cap".into();
            *blob = compact_method.clone();
        }
    }

    let tampered = capastrophic::envelope::write_cap(&entries).unwrap();
    let cap = Cap::decode(&tampered).unwrap();

    assert!(cap.warnings.iter().any(|w| matches!(
        w,
        Warning::ShortSizeForm { component } if component == "Method.cap"
    )));
    assert_eq!(cap.method().unwrap().size_width, 2);
}

#[test]
fn ref_location_offsets_reconstruct_monotonically() {
    let cap = Cap::decode(&helloworld_cap(2, 1)).unwrap();
    let refloc = cap.ref_location().unwrap();

    for block in &refloc.blocks {
        for deltas in [&block.byte_index_deltas, &block.byte2_index_deltas] {
            let offsets = absolute_offsets(deltas);
            assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}

#[test]
fn static_field_image_arithmetic_holds() {
    let cap = Cap::decode(&helloworld_cap(2, 1)).unwrap();
    let field = cap.static_field().unwrap();

    assert_eq!(
        u32::from(field.image_size),
        2 * u32::from(field.reference_count)
            + u32::from(field.default_value_count)
            + field.non_default_values.len() as u32
    );
}

#[test]
fn methods_are_split_along_descriptor_boundaries() {
    let cap = Cap::decode(&helloworld_cap(2, 1)).unwrap();
    let method = cap.method().unwrap();

    let capastrophic::cap::method::MethodBody::Compact(block) = &method.body else {
        panic!("expected a compact method body");
    };
    assert_eq!(block.split.len(), 2);
    assert_eq!(block.split[0].offset, 9);
    assert_eq!(block.split[0].bytecodes, vec![0x18, 0x3b, 0x7a]);
    assert_eq!(block.split[1].offset, 14);
}

#[test]
fn summary_reports_package_applets_and_imports() {
    let cap = Cap::decode(&helloworld_cap(2, 1)).unwrap();
    let summary = cap.summary();

    assert_eq!(summary.package_aid, common::PACKAGE_AID);
    assert_eq!(summary.package_version, "1.0");
    assert_eq!(summary.applet_aids, vec![APPLET_AID.to_vec()]);
    assert_eq!(summary.imports.len(), 1);
    assert_eq!(summary.imports[0].1, "1.2");
}
