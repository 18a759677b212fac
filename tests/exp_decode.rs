mod common;

use capastrophic::exp::{Exp, ExpConstant};
use capastrophic::support::hex;
use capastrophic::types::Version;

use common::{helloworld_exp_2_3, PACKAGE_AID};

#[test]
fn the_2_3_export_file_names_exactly_one_package() {
    let exp = Exp::decode(&helloworld_exp_2_3()).unwrap();

    assert_eq!(exp.version, Version::V2_3);
    assert!(exp.warnings.is_empty());

    let packages = exp.packages();
    assert_eq!(packages.len(), 1);

    let (index, entry) = packages[0];
    let ExpConstant::Package { aid, version, .. } = entry else {
        panic!("expected a package constant");
    };
    assert_eq!(aid, &PACKAGE_AID);
    assert_eq!(version.to_string(), "1.0");
    assert_eq!(usize::from(exp.this_package), index);
}

#[test]
fn referenced_packages_appear_only_at_2_3() {
    let exp = Exp::decode(&helloworld_exp_2_3()).unwrap();
    assert_eq!(exp.referenced_packages, Some(vec![]));
}

#[test]
fn unedited_roundtrip_is_byte_identical() {
    let bytes = helloworld_exp_2_3();
    let exp = Exp::decode(&bytes).unwrap();
    assert_eq!(exp.encode().unwrap(), bytes);
}

#[test]
fn decode_is_deterministic() {
    let bytes = helloworld_exp_2_3();
    assert_eq!(
        Exp::decode(&bytes).unwrap().to_json(),
        Exp::decode(&bytes).unwrap().to_json()
    );
}

#[test]
fn raw_records_the_exact_source_bytes() {
    let bytes = helloworld_exp_2_3();
    let exp = Exp::decode(&bytes).unwrap();
    let json = exp.to_json();
    assert_eq!(
        hex::decode(json["raw"].as_str().unwrap()).unwrap(),
        bytes
    );
}

#[test]
fn an_edited_export_file_emits_the_edit() {
    let bytes = helloworld_exp_2_3();
    let mut exp = Exp::decode(&bytes).unwrap();
    exp.raw_modified = "00facade 0302 0000 0000 00 (everything stripped)".into();

    assert_eq!(
        exp.encode().unwrap(),
        hex::decode("00facade030200000000 00".replace(' ', "").as_str()).unwrap()
    );
}

#[test]
fn exported_class_shape_matches_the_fixture() {
    let exp = Exp::decode(&helloworld_exp_2_3()).unwrap();
    assert_eq!(exp.classes.len(), 1);

    let class = &exp.classes[0];
    assert_eq!(class.token, 0);
    assert_eq!(class.access_flags.joined_names(), "Public-Interface-Shareable");
    assert!(class.supers.is_empty());
    assert!(class.fields.is_empty());
    assert!(class.methods.is_empty());
    assert_eq!(class.cap22_inheritable_public_method_token_count, Some(0));
}
