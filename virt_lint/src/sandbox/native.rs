//! Native checks behind the `builtin/*` validators

use super::ValidationContext;
use crate::errors::VirtLintResult;
use crate::log_warning;
use crate::warning::{Finding, WarningDomain, WarningLevel};
use crate::xml::parse_int;

const CELL_MEMORY: &str = "/capabilities/host/topology/cells/cell/memory";
const CELL_IDS: &str = "/capabilities/host/topology/cells/cell/@id";

/// Domain memory must fit into at least one host NUMA cell
///
/// A cell fits when it has strictly more memory than the domain. A host
/// without NUMA topology has no cell to fit into.
pub fn check_numa(ctx: &ValidationContext<'_>) -> VirtLintResult<Vec<Finding>> {
    let Some(caps) = ctx.host_capabilities()? else {
        return Ok(Vec::new());
    };
    let Some(dom_mem) = ctx.domain.memory_kib() else {
        return Ok(Vec::new());
    };

    let cells: Vec<u64> = caps
        .eval_texts(CELL_MEMORY)
        .iter()
        .filter_map(|m| parse_int(m).ok())
        .collect();

    if cells.iter().any(|m| *m > dom_mem) {
        return Ok(Vec::new());
    }

    Ok(vec![Finding::new(
        WarningDomain::Domain,
        WarningLevel::Error,
        "Domain would not fit into any host NUMA node",
    )])
}

/// Domain memory must fit into the free memory of at least one NUMA cell
pub fn check_numa_free(ctx: &ValidationContext<'_>) -> VirtLintResult<Vec<Finding>> {
    let Some(caps) = ctx.host_capabilities()? else {
        return Ok(Vec::new());
    };
    let Some(dom_mem) = ctx.domain.memory_kib() else {
        return Ok(Vec::new());
    };

    let mut free_kib = Vec::new();
    for id in caps.eval_texts(CELL_IDS) {
        let Ok(cell) = id.parse::<i32>() else {
            continue;
        };
        if let Some(free) = ctx.caps.cells_free_memory(cell, 1)? {
            free_kib.extend(free.into_iter().map(|bytes| bytes / 1024));
        }
    }

    if free_kib.iter().any(|m| *m > dom_mem) {
        return Ok(Vec::new());
    }

    Ok(vec![Finding::new(
        WarningDomain::Domain,
        WarningLevel::Error,
        "Not enough free memory on any NUMA node",
    )])
}

/// The host must offer a guest matching the domain's arch, emulator, machine and type
pub fn check_node_kvm(ctx: &ValidationContext<'_>) -> VirtLintResult<Vec<Finding>> {
    let query = ctx.domain.domcaps_query();

    // Lookup failures count as "no domain capabilities", host caps may still vouch
    let mut missing = match ctx.caps.domain_capabilities(&query) {
        Ok(found) => found.is_none(),
        Err(e) => {
            log_warning!("Domain capabilities lookup failed", "error" => e);
            true
        }
    };

    if let Some(caps) = ctx.host_capabilities()? {
        let mut predicates = Vec::new();
        if let Some(arch) = &query.arch {
            predicates.push(format!("@name={}", xpath_literal(arch)));
        }
        if let Some(emulator) = &query.emulator {
            predicates.push(format!("emulator/text()={}", xpath_literal(emulator)));
        }
        if let Some(machine) = &query.machine {
            predicates.push(format!("machine/text()={}", xpath_literal(machine)));
        }
        if let Some(virttype) = &query.virttype {
            predicates.push(format!("domain/@type={}", xpath_literal(virttype)));
        }

        let mut expr = String::from("/capabilities/guest/arch");
        if !predicates.is_empty() {
            expr.push_str(&format!("[{}]", predicates.join(" and ")));
        }

        missing = !caps.matches(&expr);
    }

    if !missing {
        return Ok(Vec::new());
    }

    Ok(vec![Finding::new(
        WarningDomain::Node,
        WarningLevel::Warning,
        "No suitable emulator found",
    )])
}

/// q35 guests need a free PCIe root port for hotplug
pub fn check_pcie_root_ports(ctx: &ValidationContext<'_>) -> VirtLintResult<Vec<Finding>> {
    let dom = ctx.domain;

    match dom.virt_type().as_deref() {
        Some("kvm") | Some("qemu") => {}
        _ => return Ok(Vec::new()),
    }
    match dom.machine() {
        Some(machine) if machine.contains("q35") => {}
        _ => return Ok(Vec::new()),
    }

    let doc = dom.document();
    let mut chassis: Vec<u64> = doc
        .eval_texts(
            "/domain/devices/controller[@type='pci' and @model='pcie-root-port']/target/@chassis",
        )
        .iter()
        .filter_map(|c| parse_int(c).ok())
        .collect();

    let buses: Vec<u64> = doc
        .eval_texts("/domain/devices//address[@type='pci']/@bus")
        .iter()
        .filter_map(|b| parse_int(b).ok())
        .collect();
    chassis.retain(|c| !buses.contains(c));

    if !chassis.is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![Finding::new(
        WarningDomain::Domain,
        WarningLevel::Notice,
        "No free PCIe root ports found, hotplug might be not possible",
    )])
}

/// Quote `value` as an XPath 1.0 string literal
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
