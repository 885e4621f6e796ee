//! Native validators shipped with the engine

use super::{NativeCheck, Validator, ValidatorKind};
use crate::sandbox::native;

pub const BUILTIN_PREFIX: &str = "builtin/";

struct BuiltinEntry {
    name: &'static str,
    tags: &'static [&'static str],
    requires_connection: bool,
    check: NativeCheck,
}

const BUILTINS: [BuiltinEntry; 4] = [
    BuiltinEntry {
        name: "check_numa",
        tags: &["TAG_1", "TAG_2"],
        requires_connection: false,
        check: native::check_numa,
    },
    BuiltinEntry {
        name: "check_numa_free",
        tags: &["TAG_2"],
        requires_connection: true,
        check: native::check_numa_free,
    },
    BuiltinEntry {
        name: "check_node_kvm",
        tags: &["TAG_1", "TAG_3"],
        requires_connection: false,
        check: native::check_node_kvm,
    },
    BuiltinEntry {
        name: "check_pcie_root_ports",
        tags: &["TAG_4"],
        requires_connection: false,
        check: native::check_pcie_root_ports,
    },
];

/// Builtins in their fixed registration order
pub fn builtin_validators() -> Vec<Validator> {
    BUILTINS
        .iter()
        .map(|entry| {
            Validator::new(
                format!("{BUILTIN_PREFIX}{}", entry.name),
                entry.tags.iter().map(|t| t.to_string()),
                entry.requires_connection,
                ValidatorKind::Builtin(entry.check),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let builtins = builtin_validators();
        let ids: Vec<&str> = builtins.iter().map(|v| v.id()).collect();

        assert_eq!(
            ids,
            vec![
                "builtin/check_numa",
                "builtin/check_numa_free",
                "builtin/check_node_kvm",
                "builtin/check_pcie_root_ports",
            ]
        );
        assert!(builtins.iter().all(|v| v.is_builtin()));
        assert_eq!(
            builtins
                .iter()
                .filter(|v| v.requires_connection())
                .map(|v| v.id())
                .collect::<Vec<_>>(),
            vec!["builtin/check_numa_free"]
        );
    }
}
