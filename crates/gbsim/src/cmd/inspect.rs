use std::path::Path;

use gbsim_protocol::{BackendKind, CPortTable};
use gbsim_svc::{ModulesConfig, SessionConfig};

use crate::cmd::InspectArgs;
use crate::exit::{svc_error, CliResult, SUCCESS};
use crate::output::{print_inspect, CPortReport, InspectReport, ModuleReport, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let report = build_report(&args.config)?;
    print_inspect(&report, format);
    Ok(SUCCESS)
}

/// Load the config the way `run` would and describe the result.
fn build_report(path: &Path) -> CliResult<InspectReport> {
    let config =
        ModulesConfig::from_file(path).map_err(|err| svc_error("load config failed", err))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let modules = config
        .load_modules(base_dir)
        .map_err(|err| svc_error("load modules failed", err))?;

    // Device ids are handed out in plug order, like the running session does.
    let table = CPortTable::new();
    let mut next_device_id = SessionConfig::default().first_device_id;
    let mut reports = Vec::with_capacity(modules.len());
    for (module, entry) in modules.iter().zip(&config.modules) {
        table
            .bind_module(module.interface_id, &module.cports, BackendKind::None)
            .map_err(|err| svc_error("bind failed", err.into()))?;

        let device_id = module.device_id.unwrap_or_else(|| {
            let id = next_device_id;
            next_device_id = next_device_id.wrapping_add(1);
            id
        });

        reports.push(ModuleReport {
            interface_id: module.interface_id,
            device_id,
            manifest: entry.manifest.display().to_string(),
            manifest_size: module.manifest.size(),
            cports: module
                .cports
                .iter()
                .map(|cport| CPortReport {
                    cport_id: cport.cport_id,
                    host_cport_id: cport.host_cport_id,
                    protocol: cport.protocol.to_string(),
                    protocol_id: cport.protocol.as_u8(),
                })
                .collect(),
        });
    }

    Ok(InspectReport {
        modules: reports,
        bindings: table.bindings(),
    })
}
