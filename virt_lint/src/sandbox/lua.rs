//! Lua script validators
//!
//! Each script gets a fresh interpreter with only the `table`, `string` and `math`
//! libraries and a global `vl` object. The base library functions that reach the
//! host (`dofile`, `loadfile`, `print`, ...) are removed. Findings reported
//! through `vl:add_warning` are collected in call order.

use super::ValidationContext;
use crate::errors::{VirtLintError, VirtLintResult};
use crate::warning::{Finding, WarningDomain, WarningLevel};
use crate::xml::XmlDocument;
use mlua::{Lua, LuaOptions, StdLib, UserData, UserDataFields, UserDataMethods, Value};
use std::cell::RefCell;
use std::path::Path;
use std::str::FromStr;

const MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Base library globals a script must not see
const BLOCKED_GLOBALS: [&str; 6] = [
    "dofile",
    "loadfile",
    "load",
    "print",
    "require",
    "collectgarbage",
];

struct ScriptApi<'s, 'c> {
    ctx: &'s ValidationContext<'c>,
    findings: &'s RefCell<Vec<Finding>>,
}

fn external(err: VirtLintError) -> mlua::Error {
    mlua::Error::external(err)
}

/// Accepts the numeric constants exposed on `vl` or their names
fn enum_arg<T>(value: Value<'_>, what: &str) -> mlua::Result<T>
where
    T: TryFrom<i64, Error = String> + FromStr<Err = String>,
{
    let parsed = match value {
        Value::Integer(i) => T::try_from(i),
        Value::Number(n) if n.fract() == 0.0 => T::try_from(n as i64),
        Value::String(s) => T::from_str(s.to_str()?),
        other => Err(format!("expected a {what}, got {}", other.type_name())),
    };
    parsed.map_err(mlua::Error::RuntimeError)
}

fn xpath_or_nil(doc: &XmlDocument, expr: &str) -> mlua::Result<Option<Vec<String>>> {
    let nodes = doc.eval_nodes(expr).map_err(mlua::Error::RuntimeError)?;
    Ok(if nodes.is_empty() { None } else { Some(nodes) })
}

fn parse_xml(xml: &str) -> mlua::Result<XmlDocument> {
    XmlDocument::parse(xml, "document", None).map_err(external)
}

impl UserData for ScriptApi<'_, '_> {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("WarningDomain_Domain", |_, _| Ok(WarningDomain::Domain as i64));
        fields.add_field_method_get("WarningDomain_Node", |_, _| Ok(WarningDomain::Node as i64));
        fields.add_field_method_get("WarningLevel_Error", |_, _| Ok(WarningLevel::Error as i64));
        fields.add_field_method_get("WarningLevel_Warning", |_, _| Ok(WarningLevel::Warning as i64));
        fields.add_field_method_get("WarningLevel_Notice", |_, _| Ok(WarningLevel::Notice as i64));
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method(
            "add_warning",
            |_, this, (domain, level, msg): (Value<'lua>, Value<'lua>, String)| {
                let domain: WarningDomain = enum_arg(domain, "warning domain")?;
                let level: WarningLevel = enum_arg(level, "warning level")?;
                this.findings
                    .borrow_mut()
                    .push(Finding::new(domain, level, msg));
                Ok(())
            },
        );

        methods.add_method("dom_xml", |_, this, ()| Ok(this.ctx.domain.xml().to_string()));

        methods.add_method("dom_xpath", |_, this, expr: String| {
            xpath_or_nil(this.ctx.domain.document(), &expr)
        });

        methods.add_method("caps_xml", |_, this, ()| {
            this.ctx.caps.host_capabilities().map_err(external)
        });

        methods.add_method("caps_xpath", |_, this, expr: String| {
            match this.ctx.host_capabilities().map_err(external)? {
                Some(doc) => xpath_or_nil(&doc, &expr),
                None => Ok(None),
            }
        });

        methods.add_method("domcaps_xml", |_, this, ()| {
            this.ctx.domain_capabilities().map_err(external)
        });

        methods.add_method("domcaps_xpath", |_, this, expr: String| {
            match this.ctx.domain_capabilities().map_err(external)? {
                Some(xml) => xpath_or_nil(&parse_xml(&xml)?, &expr),
                None => Ok(None),
            }
        });

        methods.add_method("xpath_eval", |_, _, (xml, expr): (String, String)| {
            xpath_or_nil(&parse_xml(&xml)?, &expr)
        });

        methods.add_method(
            "get_cells_free_memory",
            |_, this, (start, max): (i32, i32)| {
                this.ctx.caps.cells_free_memory(start, max).map_err(external)
            },
        );

        methods.add_method("has_connection", |_, this, ()| {
            Ok(this.ctx.connection_available())
        });
    }
}

/// Run the script at `path` as validator `id`
pub fn run_script(
    id: &str,
    path: &Path,
    ctx: &ValidationContext<'_>,
) -> VirtLintResult<Vec<Finding>> {
    let source = std::fs::read_to_string(path).map_err(|e| VirtLintError::execution(id, e))?;

    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )
    .map_err(|e| VirtLintError::execution(id, e))?;
    lua.set_memory_limit(MEMORY_LIMIT)
        .map_err(|e| VirtLintError::execution(id, e))?;

    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
        globals
            .set(name, Value::Nil)
            .map_err(|e| VirtLintError::execution(id, e))?;
    }

    let findings = RefCell::new(Vec::new());
    lua.scope(|scope| {
        let api = scope.create_nonstatic_userdata(ScriptApi {
            ctx,
            findings: &findings,
        })?;
        globals.set("vl", api)?;
        lua.load(source.as_str())
            .set_name(format!("@{}", path.display()))
            .exec()
    })
    .map_err(|e| VirtLintError::execution(id, e))?;

    Ok(findings.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{CapabilityStore, LiveCapabilities};
    use crate::connection::{Connect, TestDriver};
    use crate::domain::DomainDescriptor;
    use assert_matches::assert_matches;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    const DOMAIN: &str = "<domain type='kvm'><name>guest</name>\
        <memory unit='MiB'>512</memory></domain>";

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("check.lua");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn run(body: &str) -> VirtLintResult<Vec<Finding>> {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, body);
        let dom = DomainDescriptor::parse(DOMAIN).unwrap();
        let store = CapabilityStore::new();
        run_script("local/check", &path, &ValidationContext::new(&dom, &store))
    }

    #[test]
    fn test_add_warning_constants_and_names() {
        let findings = run(
            "vl:add_warning(vl.WarningDomain_Node, vl.WarningLevel_Notice, 'first')\n\
             vl:add_warning('domain', 'error', 'second')\n",
        )
        .unwrap();

        assert_eq!(
            findings,
            vec![
                Finding::new(WarningDomain::Node, WarningLevel::Notice, "first"),
                Finding::new(WarningDomain::Domain, WarningLevel::Error, "second"),
            ]
        );
    }

    #[test]
    fn test_add_warning_rejects_unknown_level() {
        assert_matches!(
            run("vl:add_warning(0, 7, 'bad')"),
            Err(VirtLintError::ValidatorExecution { validator, .. }) if validator == "local/check"
        );
    }

    #[test]
    fn test_dom_xpath() {
        let findings = run(
            "local mem = vl:dom_xpath('/domain/memory/@unit')\n\
             if mem[1] == 'MiB' and vl:dom_xpath('/domain/vcpu') == nil then\n\
               vl:add_warning(0, 2, vl:dom_xpath('/domain/name/text()')[1])\n\
             end\n",
        )
        .unwrap();
        assert_eq!(findings[0].msg, "guest");
    }

    #[test]
    fn test_offline_capabilities_are_nil() {
        let findings = run(
            "if vl:caps_xml() == nil and vl:caps_xpath('/capabilities') == nil\n\
               and vl:get_cells_free_memory(0, 1) == nil and not vl:has_connection() then\n\
               vl:add_warning(0, 2, 'offline')\n\
             end\n",
        )
        .unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_live_free_memory() {
        let dir = TempDir::new().unwrap();
        let path = script(
            &dir,
            "local free = vl:get_cells_free_memory(0, 2)\n\
             vl:add_warning(0, 2, tostring(#free) .. ':' .. tostring(free[2] // 1024))\n",
        );
        let dom = DomainDescriptor::parse(DOMAIN).unwrap();
        let driver = TestDriver::new().with_free_memory(vec![1024, 4096]);
        let live = LiveCapabilities::new(Arc::new(driver) as Arc<dyn Connect>);

        let findings = run_script("local/check", &path, &ValidationContext::new(&dom, &live)).unwrap();
        assert_eq!(findings[0].msg, "2:4");
    }

    #[test]
    fn test_restricted_stdlib() {
        assert_matches!(
            run("io.open('/etc/passwd')"),
            Err(VirtLintError::ValidatorExecution { .. })
        );
        assert_matches!(run("os.exit(1)"), Err(VirtLintError::ValidatorExecution { .. }));
    }

    #[test]
    fn test_base_library_host_access_removed() {
        let dir = TempDir::new().unwrap();
        let payload = dir.path().join("payload.lua");
        std::fs::write(&payload, "vl:add_warning(0, 0, 'escaped')").unwrap();

        let dofile = format!("dofile('{}')", payload.display());
        assert_matches!(
            run(&dofile),
            Err(VirtLintError::ValidatorExecution { validator, .. }) if validator == "local/check"
        );
        assert_matches!(
            run("loadfile('/etc/hostname')"),
            Err(VirtLintError::ValidatorExecution { .. })
        );
        assert_matches!(
            run("load('return 1')"),
            Err(VirtLintError::ValidatorExecution { .. })
        );
        assert_matches!(run("print('x')"), Err(VirtLintError::ValidatorExecution { .. }));
        assert_matches!(
            run("require('os')"),
            Err(VirtLintError::ValidatorExecution { .. })
        );

        // The rest of the base library is still there
        let findings = run(
            "vl:add_warning(0, 2, type(tostring) .. ':' .. type(pairs) .. ':' .. type(dofile))",
        )
        .unwrap();
        assert_eq!(findings[0].msg, "function:function:nil");
    }

    #[test]
    fn test_runtime_error_is_attributed() {
        assert_matches!(
            run("error('broken')"),
            Err(VirtLintError::ValidatorExecution { validator, reason })
                if validator == "local/check" && reason.contains("broken")
        );
    }

    #[test]
    fn test_xpath_eval() {
        let findings = run(
            "local r = vl:xpath_eval('<a><b>x</b><b>y</b></a>', '/a/b/text()')\n\
             vl:add_warning(1, 1, table.concat(r, ','))\n",
        )
        .unwrap();
        assert_eq!(findings[0].msg, "x,y");
    }
}
