use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gbsim_protocol::BindingInfo;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CPortReport {
    pub cport_id: u16,
    pub host_cport_id: u16,
    pub protocol: String,
    pub protocol_id: u8,
}

#[derive(Debug, Serialize)]
pub struct ModuleReport {
    pub interface_id: u8,
    pub device_id: u8,
    pub manifest: String,
    pub manifest_size: usize,
    pub cports: Vec<CPortReport>,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub modules: Vec<ModuleReport>,
    pub bindings: Vec<BindingInfo>,
}

pub fn print_inspect(report: &InspectReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut modules = Table::new();
            modules
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["INTERFACE", "DEVICE", "MANIFEST", "SIZE", "CPORTS"]);
            for module in &report.modules {
                modules.add_row(vec![
                    module.interface_id.to_string(),
                    module.device_id.to_string(),
                    module.manifest.clone(),
                    module.manifest_size.to_string(),
                    module.cports.len().to_string(),
                ]);
            }
            println!("{modules}");

            let mut bindings = Table::new();
            bindings
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["HOST CPORT", "MODULE", "CPORT", "PROTOCOL"]);
            for binding in &report.bindings {
                bindings.add_row(vec![
                    binding.host_cport_id.to_string(),
                    binding.module_id.to_string(),
                    binding.cport_id.to_string(),
                    binding.protocol.to_string(),
                ]);
            }
            println!("{bindings}");
        }
        OutputFormat::Pretty => {
            for module in &report.modules {
                println!(
                    "interface={} device={} manifest={} ({} bytes)",
                    module.interface_id, module.device_id, module.manifest, module.manifest_size
                );
                for cport in &module.cports {
                    println!(
                        "  cport={} host_cport={} protocol={} ({:#04x})",
                        cport.cport_id, cport.host_cport_id, cport.protocol, cport.protocol_id
                    );
                }
            }
        }
    }
}
