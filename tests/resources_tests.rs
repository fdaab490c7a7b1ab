use std::collections::BTreeSet;

use drover_agent::resources::{Resources, Value};

#[test]
fn test_parse_scalars() {
    let resources = Resources::parse("cpus:4;mem:2048").unwrap();
    assert_eq!(resources.get_scalar("cpus"), 4.0);
    assert_eq!(resources.get_scalar("mem"), 2048.0);
    assert_eq!(resources.get_scalar("disk"), 0.0);
}

#[test]
fn test_parse_fractional_scalar() {
    let resources = Resources::parse("cpus:0.5").unwrap();
    assert_eq!(resources.get_scalar("cpus"), 0.5);
}

#[test]
fn test_parse_tolerates_whitespace_and_empty_parts() {
    let resources = Resources::parse(" cpus : 2 ; mem : 512 ; ").unwrap();
    assert_eq!(resources.get_scalar("cpus"), 2.0);
    assert_eq!(resources.get_scalar("mem"), 512.0);
}

#[test]
fn test_parse_ranges() {
    let resources = Resources::parse("ports:[31000-32000,20000-20100]").unwrap();
    match resources.get("ports").unwrap() {
        Value::Ranges(ranges) => {
            // Sorted on parse.
            assert_eq!(ranges, &vec![(20000, 20100), (31000, 32000)]);
        }
        other => panic!("expected ranges, got {other:?}"),
    }
}

#[test]
fn test_parse_coalesces_adjacent_ranges() {
    let resources = Resources::parse("ports:[1-10,11-20,15-30]").unwrap();
    match resources.get("ports").unwrap() {
        Value::Ranges(ranges) => assert_eq!(ranges, &vec![(1, 30)]),
        other => panic!("expected ranges, got {other:?}"),
    }
}

#[test]
fn test_parse_set() {
    let resources = Resources::parse("disks:{sda1,sdb1}").unwrap();
    match resources.get("disks").unwrap() {
        Value::Set(items) => {
            let expected: BTreeSet<String> =
                ["sda1".to_string(), "sdb1".to_string()].into_iter().collect();
            assert_eq!(items, &expected);
        }
        other => panic!("expected set, got {other:?}"),
    }
}

#[test]
fn test_parse_errors() {
    assert!(Resources::parse("cpus").is_err());
    assert!(Resources::parse("cpus:abc").is_err());
    assert!(Resources::parse("ports:[1-2").is_err());
    assert!(Resources::parse("ports:[5-1]").is_err());
    assert!(Resources::parse(":4").is_err());
}

#[test]
fn test_add_scalars() {
    let mut total = Resources::parse("cpus:1;mem:256").unwrap();
    total += Resources::parse("cpus:2;mem:256;disk:10").unwrap();
    assert_eq!(total.get_scalar("cpus"), 3.0);
    assert_eq!(total.get_scalar("mem"), 512.0);
    assert_eq!(total.get_scalar("disk"), 10.0);
}

#[test]
fn test_subtract_scalars() {
    let mut total = Resources::parse("cpus:3;mem:512").unwrap();
    total -= Resources::parse("cpus:1;mem:256").unwrap();
    assert_eq!(total.get_scalar("cpus"), 2.0);
    assert_eq!(total.get_scalar("mem"), 256.0);
}

#[test]
fn test_subtract_to_empty() {
    let mut total = Resources::parse("cpus:1;mem:256").unwrap();
    total -= Resources::parse("cpus:1;mem:256").unwrap();
    assert!(total.is_empty());
}

#[test]
fn test_add_then_subtract_round_trips() {
    let base = Resources::parse("cpus:4;mem:2048").unwrap();
    let slice = Resources::parse("cpus:1;mem:256").unwrap();
    let total = base.clone() + slice.clone();
    let back = total - slice;
    assert_eq!(back, base);
}

#[test]
fn test_add_ranges_merges() {
    let mut total = Resources::parse("ports:[1-10]").unwrap();
    total += Resources::parse("ports:[11-20,40-50]").unwrap();
    match total.get("ports").unwrap() {
        Value::Ranges(ranges) => assert_eq!(ranges, &vec![(1, 20), (40, 50)]),
        other => panic!("expected ranges, got {other:?}"),
    }
}

#[test]
fn test_subtract_ranges_splits() {
    let mut total = Resources::parse("ports:[1-100]").unwrap();
    total -= Resources::parse("ports:[40-60]").unwrap();
    match total.get("ports").unwrap() {
        Value::Ranges(ranges) => assert_eq!(ranges, &vec![(1, 39), (61, 100)]),
        other => panic!("expected ranges, got {other:?}"),
    }
}

#[test]
fn test_subtract_all_ranges_removes_entry() {
    let mut total = Resources::parse("ports:[1-10]").unwrap();
    total -= Resources::parse("ports:[1-10]").unwrap();
    assert!(total.get("ports").is_none());
}

#[test]
fn test_set_union_and_difference() {
    let mut total = Resources::parse("disks:{sda1}").unwrap();
    total += Resources::parse("disks:{sdb1,sdc1}").unwrap();
    total -= Resources::parse("disks:{sda1,sdc1}").unwrap();
    match total.get("disks").unwrap() {
        Value::Set(items) => {
            assert_eq!(items.len(), 1);
            assert!(items.contains("sdb1"));
        }
        other => panic!("expected set, got {other:?}"),
    }
}

#[test]
fn test_display_round_trip() {
    let resources = Resources::parse("cpus:4;mem:2048;ports:[1-10];disks:{sda1,sdb1}").unwrap();
    let reparsed = Resources::parse(&resources.to_string()).unwrap();
    assert_eq!(resources, reparsed);
}

#[test]
fn test_proto_round_trip() {
    let resources = Resources::parse("cpus:2.5;ports:[100-200];disks:{sda1}").unwrap();
    let proto = resources.to_proto();
    assert_eq!(Resources::from_proto(&proto), resources);
}

#[test]
fn test_default_resource_string_parses() {
    let resources = Resources::parse(drover_agent::config::DEFAULT_RESOURCES).unwrap();
    assert_eq!(resources.get_scalar("cpus"), 1.0);
    assert_eq!(resources.get_scalar("mem"), 1024.0);
}
